//! Lifecycle dispatcher
//!
//! Routes a plan verdict to the resource type's handlers:
//!
//! | Verdict   | Handlers                                    |
//! |-----------|---------------------------------------------|
//! | create    | create, read                                |
//! | update    | update, read (partial state on failure)     |
//! | force-new | delete (waits for deletion), create, read   |
//! | destroy   | delete                                      |
//! | no-op     | read                                        |
//!
//! Every handler call runs under a child context bounded by the type's
//! phase budget. Cancellation is checked before each handler and again
//! before state is committed.

use crate::context::Context;
use crate::customdiff::{self, ResourceDiff};
use crate::data::ResourceData;
use crate::diag::Diagnostic;
use crate::error::{CloudError, ErrorKind, Operation, Result};
use crate::plan::{Plan, Planner, Verdict};
use crate::resource::{ResourceType, Timeouts};
use crate::state::ResourceState;
use crate::value::Attributes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failure of one reconcile, with the state the host must persist.
#[derive(Debug, thiserror::Error)]
#[error("{resource_type} {}: {operation} failed ({kind}): {message}", shown_id(.id))]
pub struct ReconcileError {
    pub kind: ErrorKind,
    pub resource_type: String,
    /// Resource ID when known, empty otherwise
    pub id: String,
    pub operation: Operation,
    pub message: String,
    /// Committed state including any sub-steps that succeeded
    pub state: ResourceState,
    #[source]
    pub source: CloudError,
}

fn shown_id(id: &str) -> &str {
    if id.is_empty() { "(new)" } else { id }
}

impl ReconcileError {
    pub fn is_partial(&self) -> bool {
        self.state.is_partial()
    }
}

/// Successful reconcile
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub state: ResourceState,
    pub plan: Plan,
    pub warnings: Vec<Diagnostic>,
}

/// Drives one resource type through its lifecycle.
pub struct Lifecycle<'a> {
    rt: &'a ResourceType,
    timeouts: Timeouts,
}

impl<'a> Lifecycle<'a> {
    pub fn new(rt: &'a ResourceType) -> Self {
        Self {
            rt,
            timeouts: *rt.timeouts(),
        }
    }

    /// User override of a phase budget for this instance.
    pub fn with_timeout(mut self, operation: Operation, budget: Duration) -> Self {
        self.timeouts.set(operation, budget);
        self
    }

    pub fn resource_type(&self) -> &ResourceType {
        self.rt
    }

    fn phase(&self, ctx: &Context, operation: Operation) -> Context {
        self.rt
            .scope(ctx)
            .with_timeout(self.timeouts.for_phase(operation))
    }

    fn fail(
        &self,
        ctx: &Context,
        operation: Operation,
        id: &str,
        error: CloudError,
        state: ResourceState,
    ) -> ReconcileError {
        let kind = self.rt.scope(ctx).classifier().classify(&error);
        let message = error.root().to_string();
        warn!(
            resource_type = %self.rt.name(),
            id = %id,
            operation = %operation,
            kind = %kind,
            partial = state.is_partial(),
            "Reconcile failed: {}",
            message
        );
        ReconcileError {
            kind,
            resource_type: self.rt.name().to_string(),
            id: id.to_string(),
            operation,
            message,
            state,
            source: error,
        }
    }

    /// Pure plan plus custom diff hooks. Hooks see the effective
    /// configuration and may promote changes or reject the plan.
    pub async fn plan(
        &self,
        ctx: &Context,
        prior: &ResourceState,
        config: Option<&Attributes>,
    ) -> Result<Plan> {
        let mut plan = Planner::new(self.rt.name(), self.rt.schema())
            .plan(prior, config)
            .map_err(|e| e.context(Operation::Plan, self.rt.name()))?;

        if let Some(message) = self.rt.deprecation() {
            plan.warnings.push(Diagnostic::warning(
                None,
                format!("resource type {} is deprecated: {}", self.rt.name(), message),
            ));
        }

        if plan.config.is_some() && !self.rt.hooks().is_empty() {
            let ctx = self.phase(ctx, Operation::CustomDiff);
            let mut diff = ResourceDiff::new(&mut plan, prior);
            customdiff::run_all(&ctx, self.rt.hooks(), &mut diff)
                .await
                .map_err(|e| e.context(Operation::CustomDiff, self.rt.name()))?;
        }

        info!(
            resource_type = %self.rt.name(),
            id = %prior.id,
            verdict = %plan.verdict,
            changes = plan.diffs.len(),
            "Plan ready"
        );
        debug!("{}", plan.render());
        Ok(plan)
    }

    /// Observe the upstream. A missing object yields a tombstone, not an
    /// error.
    pub async fn refresh(&self, ctx: &Context, prior: &ResourceState) -> Result<ResourceState> {
        if prior.is_tombstone() {
            return Ok(ResourceState::tombstone());
        }
        let phase = self.phase(ctx, Operation::Read);
        phase.check()?;

        let mut data = ResourceData::for_state(self.rt.schema().clone(), Operation::Read, prior);
        debug!(resource_type = %self.rt.name(), id = %prior.id, "Reading");
        match self.rt.handler().read(&phase, &mut data).await {
            Ok(()) if data.id().is_empty() => {
                info!(resource_type = %self.rt.name(), id = %prior.id, "Resource is gone, removing from state");
                Ok(ResourceState::tombstone())
            }
            Ok(()) => {
                committable(ctx)?;
                let mut state = data.into_state();
                state.touch();
                Ok(state)
            }
            Err(e) if phase.classifier().is_not_found(&e) => {
                info!(
                    resource_type = %self.rt.name(),
                    id = %prior.id,
                    "Resource not found upstream, removing from state"
                );
                Ok(ResourceState::tombstone())
            }
            Err(e) => Err(e.context(Operation::Read, prior.id.clone())),
        }
    }

    /// Carry out `plan` against `prior`.
    pub async fn apply(
        &self,
        ctx: &Context,
        prior: &ResourceState,
        plan: &Plan,
    ) -> std::result::Result<ResourceState, ReconcileError> {
        info!(
            resource_type = %self.rt.name(),
            id = %prior.id,
            verdict = %plan.verdict,
            "Applying"
        );
        match plan.verdict {
            Verdict::NoOp => self
                .refresh(ctx, prior)
                .await
                .map_err(|e| self.fail(ctx, Operation::Read, &prior.id, e, prior.clone())),
            Verdict::Create => self.create(ctx, plan).await,
            Verdict::Update => self.update(ctx, prior, plan).await,
            Verdict::ForceNew => {
                self.delete(ctx, prior).await?;
                info!(resource_type = %self.rt.name(), id = %prior.id, "Prior generation deleted, creating replacement");
                self.create(ctx, plan).await
            }
            Verdict::Destroy => {
                self.delete(ctx, prior).await?;
                Ok(ResourceState::tombstone())
            }
        }
    }

    async fn create(
        &self,
        ctx: &Context,
        plan: &Plan,
    ) -> std::result::Result<ResourceState, ReconcileError> {
        let tombstone = ResourceState::tombstone();
        let config = plan.config.clone().unwrap_or_default();
        let mut data = ResourceData::for_create(self.rt.schema().clone(), config);

        let phase = self.phase(ctx, Operation::Create);
        let result = match phase.check() {
            Ok(()) => self.rt.handler().create(&phase, &mut data).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let id = data.id().to_string();
            return Err(self.fail(ctx, Operation::Create, &id, e, data.into_failed_state()));
        }
        if data.id().is_empty() {
            return Err(self.fail(
                ctx,
                Operation::Create,
                "",
                CloudError::Internal("create handler returned no ID".into()),
                tombstone,
            ));
        }

        let created = data.into_state();
        info!(resource_type = %self.rt.name(), id = %created.id, "Created");
        if let Err(e) = committable(ctx) {
            return Err(self.fail(ctx, Operation::Create, &created.id.clone(), e, created));
        }
        self.read_back(ctx, Operation::Create, created).await
    }

    async fn update(
        &self,
        ctx: &Context,
        prior: &ResourceState,
        plan: &Plan,
    ) -> std::result::Result<ResourceState, ReconcileError> {
        let config = plan.config.clone().unwrap_or_default();
        let mut data = ResourceData::for_update(self.rt.schema().clone(), prior, config, plan);

        let phase = self.phase(ctx, Operation::Update);
        let result = match phase.check() {
            Ok(()) => self.rt.handler().update(&phase, &mut data).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let failed = data.into_failed_state();
            return Err(self.fail(ctx, Operation::Update, &prior.id, e, failed));
        }

        let updated = data.into_state();
        debug!(resource_type = %self.rt.name(), id = %updated.id, "Updated in place");
        if let Err(e) = committable(ctx) {
            return Err(self.fail(ctx, Operation::Update, &prior.id, e, updated));
        }
        self.read_back(ctx, Operation::Update, updated).await
    }

    /// Idempotent: a missing object counts as deleted.
    async fn delete(
        &self,
        ctx: &Context,
        prior: &ResourceState,
    ) -> std::result::Result<(), ReconcileError> {
        if prior.is_tombstone() {
            return Ok(());
        }
        let phase = self.phase(ctx, Operation::Delete);
        let mut data = ResourceData::for_state(self.rt.schema().clone(), Operation::Delete, prior);
        let result = match phase.check() {
            Ok(()) => self.rt.handler().delete(&phase, &mut data).await,
            Err(e) => Err(e),
        };
        match phase.classifier().check_deleted(result) {
            Ok(()) => {
                info!(resource_type = %self.rt.name(), id = %prior.id, "Deleted");
                Ok(())
            }
            Err(e) => Err(self.fail(ctx, Operation::Delete, &prior.id, e, prior.clone())),
        }
    }

    async fn read_back(
        &self,
        ctx: &Context,
        operation: Operation,
        written: ResourceState,
    ) -> std::result::Result<ResourceState, ReconcileError> {
        match self.refresh(ctx, &written).await {
            Ok(state) if state.is_tombstone() => {
                let id = written.id.clone();
                Err(self.fail(
                    ctx,
                    operation,
                    &id,
                    CloudError::NotFound(format!(
                        "{} {} disappeared right after {}",
                        self.rt.name(),
                        id,
                        operation
                    )),
                    written,
                ))
            }
            Ok(state) => Ok(state),
            Err(e) => {
                let id = written.id.clone();
                Err(self.fail(ctx, Operation::Read, &id, e, written))
            }
        }
    }

    /// Adopt an existing upstream object, then read it.
    pub async fn import(&self, ctx: &Context, id: &str) -> Result<ResourceState> {
        let skeleton = self
            .rt
            .import_mode()
            .import(self.rt.name(), id)
            .map_err(|e| e.context(Operation::Import, id))?;
        info!(resource_type = %self.rt.name(), id = %id, "Importing");

        let mut state = self.refresh(ctx, &skeleton).await?;
        if state.is_tombstone() {
            return Err(CloudError::NotFound(format!(
                "cannot import non-existent remote object {} {}",
                self.rt.name(),
                id
            ))
            .context(Operation::Import, id));
        }
        // attributes parsed from the identifier survive a read that does not
        // report them
        for (name, value) in skeleton.attributes {
            state.attributes.entry(name).or_insert(value);
        }
        Ok(state)
    }

    /// Refresh, plan and apply one resource.
    pub async fn reconcile(
        &self,
        ctx: &Context,
        prior: &ResourceState,
        config: Option<&Attributes>,
    ) -> std::result::Result<Reconciled, ReconcileError> {
        let refreshed = self
            .refresh(ctx, prior)
            .await
            .map_err(|e| self.fail(ctx, Operation::Read, &prior.id, e, prior.clone()))?;

        let plan = match self.plan(ctx, &refreshed, config).await {
            Ok(plan) => plan,
            Err(e) => {
                let operation = match &e {
                    CloudError::Operation { operation, .. } => *operation,
                    _ => Operation::Plan,
                };
                return Err(self.fail(ctx, operation, &refreshed.id.clone(), e, refreshed));
            }
        };

        let state = match plan.verdict {
            Verdict::NoOp => refreshed,
            _ => self.apply(ctx, &refreshed, &plan).await?,
        };
        let warnings = plan.warnings.clone();
        Ok(Reconciled {
            state,
            plan,
            warnings,
        })
    }
}

/// Cancellation gate before state is handed back for commit.
fn committable(ctx: &Context) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(CloudError::Cancelled);
    }
    Ok(())
}
