//! MapReduce cluster
//!
//! Creation returns as soon as the order is accepted; the cluster then goes
//! through `starting` before it is `running`. An optional bootstrap script is
//! submitted as a job once the cluster is up. Only `node_num` of a node group
//! changes in place, by scaling out or in.

use crate::client::MrsClient;
use crate::job::{MrsJob, MrsJobEnvelope, phase_budget};
use crate::lookup::{EvsVolumeTypes, VpcNetworks};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use canopy_cloud::customdiff::{
    DiskSizeBounds, NetworkExists, NetworkKind, NetworkLookup, VolumeTypeAvailability,
    VolumeTypeCatalog,
};
use canopy_cloud::suppress::{base64_encoded, semver_prefix};
use canopy_cloud::typed::field;
use canopy_cloud::validation::{int_between, string_in_slice, string_matches};
use canopy_cloud::value::map;
use canopy_cloud::waiter::{Observation, gone_when_not_found};
use canopy_cloud::{
    AttrKey, AttrType, Attribute, Attributes, CloudError, Context, ErrorClassifier, Importer,
    Resource, ResourceData, ResourceType, Result, Schema, StateWaiter, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const TYPE_NAME: &str = "huaweicloud_mapreduce_cluster";

const NAME: AttrKey<String> = AttrKey::new("name");
const VERSION: AttrKey<String> = AttrKey::new("version");
const CLUSTER_TYPE: AttrKey<String> = AttrKey::new("type");
const ZONE: AttrKey<String> = AttrKey::new("availability_zone");
const VPC_ID: AttrKey<String> = AttrKey::new("vpc_id");
const SUBNET_ID: AttrKey<String> = AttrKey::new("subnet_id");
const ADMIN_PASS: AttrKey<String> = AttrKey::new("manager_admin_pass");
const KEY_PAIR: AttrKey<Option<String>> = AttrKey::new("node_key_pair");
const COMPONENTS: AttrKey<Vec<String>> = AttrKey::new("component_list");
const BOOTSTRAP: AttrKey<Option<String>> = AttrKey::new("bootstrap_script");
const STATUS: AttrKey<Option<String>> = AttrKey::new("status");
const TOTAL_NODES: AttrKey<Option<i64>> = AttrKey::new("total_node_num");
const NODE_GROUPS: &str = "node_groups";

/// Script job type of the job submission API
const SCRIPT_JOB_TYPE: i32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct NodeGroup {
    group_name: String,
    node_size: String,
    node_num: i64,
    root_volume: Volume,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_volume: Option<Volume>,
    data_volume_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Volume {
    #[serde(rename = "type")]
    volume_type: String,
    size: i64,
}

impl NodeGroup {
    fn from_block(block: &Attributes) -> std::result::Result<Self, String> {
        let data_volume = match (
            field::<Option<String>>(block, "data_volume_type")?,
            field::<Option<i64>>(block, "data_volume_size")?,
        ) {
            (Some(volume_type), Some(size)) => Some(Volume { volume_type, size }),
            _ => None,
        };
        Ok(Self {
            group_name: field(block, "group_name")?,
            node_size: field(block, "node_size")?,
            node_num: field(block, "node_num")?,
            root_volume: Volume {
                volume_type: field(block, "root_volume_type")?,
                size: field(block, "root_volume_size")?,
            },
            data_volume_count: field::<Option<i64>>(block, "data_volume_count")?.unwrap_or(0),
            data_volume,
        })
    }
}

fn node_groups(value: &Value) -> Result<Vec<NodeGroup>> {
    value
        .as_items()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_map)
        .map(NodeGroup::from_block)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| CloudError::Internal(format!("{}: {}", NODE_GROUPS, e)))
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    cluster_name: &'a str,
    cluster_version: String,
    cluster_type: String,
    region: &'a str,
    availability_zone: String,
    vpc_id: String,
    subnet_id: String,
    components: String,
    login_mode: &'static str,
    manager_admin_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_keypair_name: Option<String>,
    node_groups: Vec<NodeGroup>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    cluster_id: String,
}

#[derive(Debug, Serialize)]
struct SubmitScriptJob<'a> {
    job_type: i32,
    job_name: &'a str,
    cluster_id: &'a str,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ScaleRequest<'a> {
    service_id: &'a str,
    plan_id: &'a str,
    parameters: ScaleParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ScaleParameters<'a> {
    order_id: &'a str,
    scale_type: &'a str,
    node_id: &'a str,
    node_group: &'a str,
    instances: String,
}

#[derive(Debug, Deserialize)]
struct ClusterEnvelope {
    cluster: Cluster,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_id: String,
    pub cluster_name: String,
    /// `starting`, `running`, `scaling-out`, `scaling-in`, `terminating`,
    /// `terminated`, `failed` or `abnormal`
    pub cluster_state: String,
    #[serde(default)]
    pub cluster_version: String,
    #[serde(default)]
    pub cluster_type: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub total_node_num: Option<String>,
    #[serde(default)]
    node_groups: Vec<ClusterNodeGroup>,
    #[serde(default)]
    component_list: Vec<Component>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterNodeGroup {
    group_name: String,
    node_num: i64,
    node_size: String,
    root_volume_type: String,
    root_volume_size: i64,
    #[serde(default)]
    data_volume_type: Option<String>,
    #[serde(default)]
    data_volume_size: Option<i64>,
    #[serde(default)]
    data_volume_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Component {
    component_name: String,
}

impl ClusterNodeGroup {
    fn into_value(self) -> Value {
        map([
            ("group_name", Value::from(self.group_name)),
            ("node_size", self.node_size.into()),
            ("node_num", self.node_num.into()),
            ("root_volume_type", self.root_volume_type.into()),
            ("root_volume_size", self.root_volume_size.into()),
            ("data_volume_type", self.data_volume_type.into()),
            ("data_volume_size", self.data_volume_size.into()),
            ("data_volume_count", self.data_volume_count.into()),
        ])
    }
}

/// The script as the job API wants it: base64, encoded once.
fn encoded_script(script: &str) -> String {
    match STANDARD.decode(script.trim()) {
        Ok(_) => script.trim().to_string(),
        Err(_) => STANDARD.encode(script),
    }
}

/// Node count deltas per group name, positive to scale out.
fn scaling_deltas(old: &[NodeGroup], new: &[NodeGroup]) -> Vec<(String, i64)> {
    let before: BTreeMap<&str, i64> = old
        .iter()
        .map(|g| (g.group_name.as_str(), g.node_num))
        .collect();
    new.iter()
        .filter_map(|g| {
            let delta = g.node_num - before.get(g.group_name.as_str()).copied()?;
            (delta != 0).then(|| (g.group_name.clone(), delta))
        })
        .collect()
}

/// Add `delta` nodes to `group` inside a `node_groups` value.
fn add_nodes(groups: &mut Value, group: &str, delta: i64) {
    let Value::List(items) = groups else {
        return;
    };
    for item in items {
        if let Value::Map(block) = item
            && block.get("group_name").and_then(Value::as_str) == Some(group)
        {
            let current = block.get("node_num").and_then(Value::as_i64).unwrap_or(0);
            block.insert("node_num".to_string(), Value::Int(current + delta));
        }
    }
}

/// Scale the changed groups one at a time. Each finished step is committed,
/// so a failure further on leaves the groups already scaled in state.
async fn scale_groups<F, Fut>(data: &mut ResourceData, mut scale: F) -> Result<()>
where
    F: FnMut(String, i64) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let (old, new) = data.get_change(NODE_GROUPS);
    let (mut scaled, target) = (old.clone(), new.clone());
    let deltas = scaling_deltas(&node_groups(&scaled)?, &node_groups(&target)?);

    data.begin_partial();
    for (group, delta) in deltas {
        scale(group.clone(), delta).await?;
        add_nodes(&mut scaled, &group, delta);
        data.set(NODE_GROUPS, scaled.clone())?;
        data.set_partial(NODE_GROUPS);
    }
    data.set(NODE_GROUPS, target)
}

fn cluster_path(client: &MrsClient, id: &str) -> String {
    format!("v1.1/{}/cluster_infos/{}", client.project_id(), id)
}

async fn observe(client: &MrsClient, ctx: &Context, path: &str) -> Result<Observation<Cluster>> {
    let envelope: ClusterEnvelope = client.get(ctx, path).await?;
    let label = envelope.cluster.cluster_state.clone();
    Ok(Observation::new(envelope.cluster, label))
}

pub struct MrsCluster;

impl MrsCluster {
    async fn wait_running(client: &MrsClient, ctx: &Context, id: &str, pending: &[&str]) -> Result<()> {
        let path = cluster_path(client, id);
        let path = path.as_str();
        StateWaiter::new(format!("cluster {} to be running", id))
            .pending(pending.iter().copied())
            .target(["running"])
            .error(["failed", "abnormal", "terminated"])
            .delay(Duration::from_secs(30))
            .poll_interval(Duration::from_secs(20))
            .timeout(phase_budget(ctx))
            .wait(ctx, move || observe(client, ctx, path))
            .await?;
        Ok(())
    }

    async fn run_bootstrap(client: &MrsClient, ctx: &Context, id: &str, script: &str) -> Result<()> {
        let path = format!("v1.1/{}/jobs/submit-job", client.project_id());
        let body = SubmitScriptJob {
            job_type: SCRIPT_JOB_TYPE,
            job_name: "bootstrap",
            cluster_id: id,
            arguments: encoded_script(script),
        };
        let submitted: MrsJobEnvelope = client.post(ctx, &path, &body).await?;
        let job = MrsJob::wait(client, ctx, &submitted.job_execution.id).await?;
        tracing::info!(cluster = %id, job = %job.id, "Bootstrap script completed");
        Ok(())
    }
}

#[async_trait]
impl Resource for MrsCluster {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<MrsClient>()?;
        let name = data.get_as(NAME)?;
        let key_pair = data.get_as(KEY_PAIR)?;
        let request = CreateRequest {
            cluster_name: &name,
            cluster_version: data.get_as(VERSION)?,
            cluster_type: data.get_as(CLUSTER_TYPE)?,
            region: ctx.region(),
            availability_zone: data.get_as(ZONE)?,
            vpc_id: data.get_as(VPC_ID)?,
            subnet_id: data.get_as(SUBNET_ID)?,
            components: data.get_as(COMPONENTS)?.join(","),
            login_mode: if key_pair.is_some() { "KEYPAIR" } else { "PASSWORD" },
            manager_admin_password: data.get_as(ADMIN_PASS)?,
            node_keypair_name: key_pair,
            node_groups: node_groups(data.get(NODE_GROUPS))?,
        };

        let path = format!("v2/{}/clusters", client.project_id());
        let created: CreateResponse = client.post(ctx, &path, &request).await?;
        data.set_id(created.cluster_id.clone());
        tracing::info!(id = %created.cluster_id, name = %name, "Cluster ordered");

        Self::wait_running(&client, ctx, &created.cluster_id, &["starting"]).await?;
        if let Some(script) = data.get_as(BOOTSTRAP)? {
            Self::run_bootstrap(&client, ctx, &created.cluster_id, &script).await?;
        }
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<MrsClient>()?;
        let envelope: ClusterEnvelope = client.get(ctx, &cluster_path(&client, data.id())).await?;
        let cluster = envelope.cluster;
        // terminated clusters stay listed for a while
        if cluster.cluster_state == "terminated" {
            return Err(CloudError::NotFound(format!("cluster {} is terminated", cluster.cluster_id)));
        }

        data.set_as(NAME, cluster.cluster_name)?;
        data.set_as(VERSION, cluster.cluster_version)?;
        data.set(CLUSTER_TYPE.name(), cluster.cluster_type)?;
        data.set(ZONE.name(), cluster.availability_zone)?;
        data.set(VPC_ID.name(), cluster.vpc_id)?;
        data.set(SUBNET_ID.name(), cluster.subnet_id)?;
        data.set_as(STATUS, Some(cluster.cluster_state))?;
        data.set_as(
            TOTAL_NODES,
            cluster.total_node_num.and_then(|n| n.parse().ok()),
        )?;
        if !cluster.component_list.is_empty() {
            let components: Vec<String> = cluster
                .component_list
                .into_iter()
                .map(|c| c.component_name)
                .collect();
            data.set_as(COMPONENTS, components)?;
        }
        if !cluster.node_groups.is_empty() {
            let groups: Vec<Value> = cluster
                .node_groups
                .into_iter()
                .map(ClusterNodeGroup::into_value)
                .collect();
            data.set(NODE_GROUPS, groups)?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        if !data.has_change(NODE_GROUPS) {
            return Ok(());
        }
        let client = ctx.client::<MrsClient>()?;
        let id = data.id().to_string();

        scale_groups(data, |group, delta| {
            let (client, id) = (Arc::clone(&client), id.clone());
            async move {
                let scale_type = if delta > 0 { "scale_out" } else { "scale_in" };
                let request = ScaleRequest {
                    service_id: "",
                    plan_id: "",
                    parameters: ScaleParameters {
                        order_id: "",
                        scale_type,
                        node_id: "node_orderadd",
                        node_group: &group,
                        instances: delta.abs().to_string(),
                    },
                };
                client.put_unit(ctx, &cluster_path(&client, &id), &request).await?;
                tracing::info!(id = %id, group = %group, delta, "Scaling node group");
                Self::wait_running(&client, ctx, &id, &["scaling-out", "scaling-in"]).await
            }
        })
        .await
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<MrsClient>()?;
        let path = format!("v1.1/{}/clusters/{}", client.project_id(), data.id());
        client.delete(ctx, &path).await?;

        let path = cluster_path(&client, data.id());
        let (client_ref, path_ref) = (client.as_ref(), path.as_str());
        StateWaiter::new(format!("cluster {} to be terminated", data.id()))
            .pending(["running", "terminating", "abnormal"])
            .target(["terminated"])
            .error(["failed"])
            .delay(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(20))
            .timeout(phase_budget(ctx))
            .wait(ctx, move || async move {
                gone_when_not_found(ctx, observe(client_ref, ctx, path_ref).await, "terminated")
            })
            .await?;
        tracing::info!(id = %data.id(), "Cluster terminated");
        Ok(())
    }
}

fn node_group_schema() -> Schema {
    Schema::new()
        .attribute("group_name", Attribute::required_string().force_new())
        .attribute("node_size", Attribute::required_string().force_new())
        .attribute(
            "node_num",
            Attribute::required_int().validate(int_between(1, 500)),
        )
        .attribute("root_volume_type", Attribute::required_string().force_new())
        .attribute("root_volume_size", Attribute::required_int().force_new())
        .attribute("data_volume_type", Attribute::optional_string().force_new())
        .attribute("data_volume_size", Attribute::optional_int().force_new())
        .attribute(
            "data_volume_count",
            Attribute::optional_int()
                .default_value(0)
                .force_new()
                .validate(int_between(0, 20)),
        )
}

pub fn schema() -> Schema {
    Schema::new()
        .attribute(
            NAME.name(),
            Attribute::required_string().force_new().validate(string_matches(
                r"^[A-Za-z][\w\-]{0,63}$",
                "must start with a letter and hold at most 64 letters, digits, '_' or '-'",
            )),
        )
        .attribute(
            VERSION.name(),
            Attribute::required_string()
                .force_new()
                .suppress(semver_prefix()),
        )
        .attribute(
            CLUSTER_TYPE.name(),
            Attribute::optional_string()
                .default_value("ANALYSIS")
                .force_new()
                .validate(string_in_slice(&["ANALYSIS", "STREAMING", "MIXED", "CUSTOM"], false)),
        )
        .attribute(ZONE.name(), Attribute::required_string().force_new())
        .attribute(VPC_ID.name(), Attribute::required_string().force_new())
        .attribute(SUBNET_ID.name(), Attribute::required_string().force_new())
        .attribute(
            ADMIN_PASS.name(),
            Attribute::required_string().sensitive().force_new(),
        )
        .attribute(KEY_PAIR.name(), Attribute::optional_string().force_new())
        .attribute(
            COMPONENTS.name(),
            Attribute::required(AttrType::set(AttrType::String))
                .force_new()
                .min_items(1),
        )
        .attribute(
            NODE_GROUPS,
            Attribute::required(AttrType::blocks(node_group_schema())).min_items(1),
        )
        .attribute(
            BOOTSTRAP.name(),
            Attribute::optional_string()
                .force_new()
                .suppress(base64_encoded())
                .describe("Shell script run once the cluster is up, plain or base64"),
        )
        .attribute(STATUS.name(), Attribute::computed_string())
        .attribute(TOTAL_NODES.name(), Attribute::computed(AttrType::Int))
}

fn build(catalog: Arc<dyn VolumeTypeCatalog>, networks: Arc<dyn NetworkLookup>) -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), MrsCluster)
        .importer(Importer::passthrough())
        .classifier(ErrorClassifier::new().not_found_code("MRS.0011"))
        .custom_diff(VolumeTypeAvailability::new(
            ["node_groups.*.root_volume_type", "node_groups.*.data_volume_type"],
            ZONE.name(),
            catalog,
        ))
        .custom_diff(DiskSizeBounds::new(vec![
            ("node_groups.*.root_volume_size", 4, 32768),
            ("node_groups.*.data_volume_size", 10, 32768),
        ]))
        .custom_diff(NetworkExists::new(
            vec![(VPC_ID.name(), NetworkKind::Vpc), (SUBNET_ID.name(), NetworkKind::Subnet)],
            networks,
        ))
}

pub fn resource_type() -> ResourceType {
    build(EvsVolumeTypes::shared(), VpcNetworks::shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_cloud::{ErrorKind, Lifecycle, Planner, ResourceState, Verdict};

    struct Catalog;

    #[async_trait]
    impl VolumeTypeCatalog for Catalog {
        async fn volume_types(&self, _ctx: &Context, zone: &str) -> Result<Vec<String>> {
            Ok(match zone {
                "az1" => vec!["SAS".to_string(), "SSD".to_string()],
                _ => vec!["SAS".to_string()],
            })
        }
    }

    struct Networks;

    #[async_trait]
    impl NetworkLookup for Networks {
        async fn exists(&self, _ctx: &Context, _kind: NetworkKind, id: &str) -> Result<bool> {
            Ok(!id.starts_with("missing"))
        }
    }

    fn group(name: &str, num: i64, root_type: &str, root_size: i64) -> Value {
        map([
            ("group_name", Value::from(name)),
            ("node_size", "c6.2xlarge".into()),
            ("node_num", num.into()),
            ("root_volume_type", root_type.into()),
            ("root_volume_size", root_size.into()),
        ])
    }

    fn config(zone: &str, groups: Vec<Value>) -> Attributes {
        [
            ("name".to_string(), Value::from("analytics")),
            ("version".to_string(), "3.1.0".into()),
            ("availability_zone".to_string(), zone.into()),
            ("vpc_id".to_string(), "vpc-1".into()),
            ("subnet_id".to_string(), "sub-1".into()),
            ("manager_admin_pass".to_string(), "s3cret!Pass".into()),
            (
                "component_list".to_string(),
                Value::Set(vec!["Hadoop".into(), "Spark2x".into()]),
            ),
            ("node_groups".to_string(), Value::List(groups)),
        ]
        .into()
    }

    #[tokio::test]
    async fn test_volume_type_must_be_offered_in_zone() {
        let rt = build(Arc::new(Catalog), Arc::new(Networks));
        let lifecycle = Lifecycle::new(&rt);
        let ctx = Context::new("r");
        let absent = ResourceState::tombstone();

        let ok = config("az1", vec![group("master", 2, "SSD", 480)]);
        assert_eq!(
            lifecycle.plan(&ctx, &absent, Some(&ok)).await.unwrap().verdict,
            Verdict::Create
        );

        let err = lifecycle
            .plan(&ctx, &absent, Some(&config("az2", vec![group("master", 2, "SSD", 480)])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("not available in az2"));
    }

    #[tokio::test]
    async fn test_hook_errors_accumulate() {
        let rt = build(Arc::new(Catalog), Arc::new(Networks));
        let mut bad = config("az2", vec![group("master", 2, "SSD", 2)]);
        bad.insert("vpc_id".into(), "missing-vpc".into());
        let err = Lifecycle::new(&rt)
            .plan(&Context::new("r"), &ResourceState::tombstone(), Some(&bad))
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("3 errors occurred"), "{}", text);
        assert!(text.contains("between 4 and 32768"));
    }

    #[test]
    fn test_node_num_scales_in_place() {
        let schema = schema();
        let prior_config = config("az1", vec![group("core", 3, "SAS", 480)]);
        let prior = ResourceState::new("c-1").with_attributes(schema.apply_defaults(&prior_config));

        let scaled = config("az1", vec![group("core", 5, "SAS", 480)]);
        let plan = Planner::new(TYPE_NAME, &schema).plan(&prior, Some(&scaled)).unwrap();
        assert_eq!(plan.verdict, Verdict::Update);

        let resized = config("az1", vec![group("core", 3, "SAS", 960)]);
        let plan = Planner::new(TYPE_NAME, &schema).plan(&prior, Some(&resized)).unwrap();
        assert_eq!(plan.verdict, Verdict::ForceNew);
    }

    #[test]
    fn test_scaling_deltas() {
        let groups = |n: i64| node_groups(&Value::List(vec![
            group("master", 2, "SAS", 480),
            group("core", n, "SAS", 480),
        ]))
        .unwrap();
        assert_eq!(scaling_deltas(&groups(3), &groups(5)), vec![("core".to_string(), 2)]);
        assert_eq!(scaling_deltas(&groups(5), &groups(1)), vec![("core".to_string(), -4)]);
        assert!(scaling_deltas(&groups(3), &groups(3)).is_empty());
    }

    #[test]
    fn test_script_is_encoded_once() {
        let plain = "#!/bin/bash\necho hi\n";
        let encoded = encoded_script(plain);
        assert_eq!(STANDARD.decode(&encoded).unwrap(), plain.as_bytes());
        assert_eq!(encoded_script(&encoded), encoded);
    }

    #[test]
    fn test_password_is_masked_in_plan() {
        let schema = schema();
        let plan = Planner::new(TYPE_NAME, &schema)
            .plan(&ResourceState::tombstone(), Some(&config("az1", vec![group("m", 1, "SAS", 480)])))
            .unwrap();
        let rendered = plan.render();
        assert!(!rendered.contains("s3cret!Pass"));
        assert!(rendered.contains("(sensitive value)"));
    }

    #[tokio::test]
    async fn test_failed_scaling_keeps_finished_groups() {
        let schema = Arc::new(schema());
        let prior_config = config(
            "az1",
            vec![group("core", 3, "SAS", 480), group("task", 2, "SAS", 480)],
        );
        let prior = ResourceState::new("c-1").with_attributes(schema.apply_defaults(&prior_config));
        let wanted = config(
            "az1",
            vec![group("core", 5, "SAS", 480), group("task", 4, "SAS", 480)],
        );
        let plan = Planner::new(TYPE_NAME, &schema).plan(&prior, Some(&wanted)).unwrap();
        let mut data = ResourceData::for_update(schema.clone(), &prior, plan.config.clone().unwrap(), &plan);

        let err = scale_groups(&mut data, |group, _delta| async move {
            if group == "task" {
                Err(CloudError::Api(canopy_cloud::ApiError::new(400, "quota exceeded")))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        let failed = data.into_failed_state();
        assert!(failed.is_partial());
        let groups = node_groups(failed.get(NODE_GROUPS)).unwrap();
        let counts: Vec<_> = groups.iter().map(|g| (g.group_name.as_str(), g.node_num)).collect();
        assert_eq!(counts, vec![("core", 5), ("task", 2)]);
    }

    #[tokio::test]
    async fn test_scaling_ends_on_configured_groups() {
        let schema = Arc::new(schema());
        let prior_config = config("az1", vec![group("core", 3, "SAS", 480)]);
        let prior = ResourceState::new("c-1").with_attributes(schema.apply_defaults(&prior_config));
        let wanted = config("az1", vec![group("core", 1, "SAS", 480)]);
        let plan = Planner::new(TYPE_NAME, &schema).plan(&prior, Some(&wanted)).unwrap();
        let mut data = ResourceData::for_update(schema.clone(), &prior, plan.config.clone().unwrap(), &plan);

        scale_groups(&mut data, |_, delta| async move {
            assert_eq!(delta, -2);
            Ok(())
        })
        .await
        .unwrap();
        let state = data.into_state();
        assert_eq!(state.get(NODE_GROUPS), plan.config.unwrap().get(NODE_GROUPS).unwrap());
    }
}
