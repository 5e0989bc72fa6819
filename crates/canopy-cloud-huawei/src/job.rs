//! Long-running job payloads
//!
//! Two shapes are in use: the generic async job (`INIT`, `RUNNING`,
//! `SUCCESS`, `FAIL`) with an `entities` map, and the MapReduce job
//! execution whose state is a numeric code.

use crate::client::HuaweiClient;
use canopy_cloud::resource::DEFAULT_PHASE_TIMEOUT;
use canopy_cloud::waiter::wait_for_job;
use canopy_cloud::{Attributes, Context, Result, StateWaiter, UpstreamJob, Value};
use serde::Deserialize;
use std::time::Duration;

/// Budget for a waiter: whatever is left of the current phase.
pub fn phase_budget(ctx: &Context) -> Duration {
    ctx.remaining().unwrap_or(DEFAULT_PHASE_TIMEOUT)
}

/// Async job as returned by `GET .../jobs/{job_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncJob {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub entities: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl UpstreamJob for AsyncJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn entities(&self) -> Attributes {
        self.entities
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
            .collect()
    }
}

impl AsyncJob {
    pub fn waiter(ctx: &Context, description: impl Into<String>) -> StateWaiter {
        StateWaiter::new(description)
            .pending(["INIT", "RUNNING"])
            .target(["SUCCESS"])
            .error(["FAIL"])
            .delay(Duration::from_secs(5))
            .min_timeout(Duration::from_secs(3))
            .timeout(phase_budget(ctx))
    }

    /// Poll `path` until the job succeeds.
    pub async fn wait(client: &HuaweiClient, ctx: &Context, path: &str) -> Result<AsyncJob> {
        let waiter = Self::waiter(ctx, format!("job {}", path.rsplit('/').next().unwrap_or(path)));
        wait_for_job(ctx, &waiter, move || client.get::<AsyncJob>(ctx, path)).await
    }
}

/// Job execution of the MapReduce service
#[derive(Debug, Clone, Deserialize)]
pub struct MrsJob {
    pub id: String,
    #[serde(default)]
    pub cluster_id: String,
    pub job_state: i32,
    #[serde(default)]
    pub job_name: String,
}

#[derive(Debug, Deserialize)]
pub struct MrsJobEnvelope {
    pub job_execution: MrsJob,
}

/// Label of a numeric MapReduce job state.
pub fn mrs_job_state(code: i32) -> &'static str {
    match code {
        -1 => "Terminated",
        2 => "Starting",
        3 => "Running",
        4 => "Completed",
        5 => "Abnormal",
        6 => "Error",
        _ => "Unknown",
    }
}

impl UpstreamJob for MrsJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        mrs_job_state(self.job_state)
    }

    fn entities(&self) -> Attributes {
        [("cluster_id".to_string(), Value::from(self.cluster_id.as_str()))].into()
    }
}

impl MrsJob {
    pub fn waiter(ctx: &Context, description: impl Into<String>) -> StateWaiter {
        StateWaiter::new(description)
            .pending(["Starting", "Running"])
            .target(["Completed"])
            .error(["Error", "Abnormal", "Terminated"])
            .delay(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(15))
            .timeout(phase_budget(ctx))
    }

    pub async fn wait(client: &HuaweiClient, ctx: &Context, job_id: &str) -> Result<MrsJob> {
        let path = format!("v1.1/{}/job-exes/{}", client.project_id(), job_id);
        let path = path.as_str();
        let waiter = Self::waiter(ctx, format!("MapReduce job {}", job_id));
        let fetch = move || async move {
            let envelope: MrsJobEnvelope = client.get(ctx, path).await?;
            Ok(envelope.job_execution)
        };
        wait_for_job(ctx, &waiter, fetch).await
    }
}
