//! Resource type descriptors and the handler contract

use crate::context::Context;
use crate::customdiff::CustomDiffHook;
use crate::classify::ErrorClassifier;
use crate::data::ResourceData;
use crate::error::{CloudError, Operation, Result};
use crate::import::Importer;
use crate::retry::RetryConfig;
use crate::schema::Schema;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Lifecycle handlers of one resource type.
///
/// Handlers call [`Context::check`] before each upstream request and poll
/// long-running jobs with [`crate::waiter::StateWaiter`]. `read` returns a
/// not-found error (or clears the ID) when the object is gone; the
/// lifecycle turns that into a tombstone. `delete` waits until the object is
/// actually gone.
#[async_trait]
pub trait Resource: Send + Sync {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()>;

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()>;

    /// In-place update. Types whose every attribute is force-new keep the
    /// default.
    async fn update(&self, _ctx: &Context, data: &mut ResourceData) -> Result<()> {
        Err(CloudError::Internal(format!(
            "resource {} does not support in-place update",
            data.id()
        )))
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()>;
}

/// Per-phase timeout budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_PHASE_TIMEOUT,
            read: DEFAULT_PHASE_TIMEOUT,
            update: DEFAULT_PHASE_TIMEOUT,
            delete: DEFAULT_PHASE_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Budget of a phase. Import runs under the read budget; plan-time
    /// hooks under the read budget too.
    pub fn for_phase(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Read | Operation::Import | Operation::Plan | Operation::CustomDiff => {
                self.read
            }
        }
    }

    pub fn set(&mut self, operation: Operation, budget: Duration) {
        match operation {
            Operation::Create => self.create = budget,
            Operation::Update => self.update = budget,
            Operation::Delete => self.delete = budget,
            Operation::Read | Operation::Import | Operation::Plan | Operation::CustomDiff => {
                self.read = budget
            }
        }
    }

    pub fn with(mut self, operation: Operation, budget: Duration) -> Self {
        self.set(operation, budget);
        self
    }
}

/// Static descriptor of a resource type, immutable once registered
pub struct ResourceType {
    name: String,
    schema: Arc<Schema>,
    handler: Arc<dyn Resource>,
    timeouts: Timeouts,
    importer: Importer,
    custom_diff: Vec<Arc<dyn CustomDiffHook>>,
    deprecation: Option<String>,
    retry: RetryConfig,
    classifier: Option<ErrorClassifier>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>, schema: Schema, handler: impl Resource + 'static) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            handler: Arc::new(handler),
            timeouts: Timeouts::default(),
            importer: Importer::Unsupported,
            custom_diff: Vec::new(),
            deprecation: None,
            retry: RetryConfig::default(),
            classifier: None,
        }
    }

    pub fn timeout(mut self, operation: Operation, budget: Duration) -> Self {
        self.timeouts.set(operation, budget);
        self
    }

    pub fn importer(mut self, importer: Importer) -> Self {
        self.importer = importer;
        self
    }

    pub fn custom_diff(mut self, hook: Arc<dyn CustomDiffHook>) -> Self {
        self.custom_diff.push(hook);
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecation = Some(message.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Classifier with the vendor error codes of this type's service.
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn handler(&self) -> &dyn Resource {
        self.handler.as_ref()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub(crate) fn timeouts_mut(&mut self) -> &mut Timeouts {
        &mut self.timeouts
    }

    pub fn import_mode(&self) -> &Importer {
        &self.importer
    }

    pub fn hooks(&self) -> &[Arc<dyn CustomDiffHook>] {
        &self.custom_diff
    }

    pub fn deprecation(&self) -> Option<&str> {
        self.deprecation.as_deref()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub(crate) fn retry_config_mut(&mut self) -> &mut RetryConfig {
        &mut self.retry
    }

    /// Context carrying this type's classifier and retry budget.
    pub fn scope(&self, ctx: &Context) -> Context {
        let mut scoped = ctx.clone().with_retry(self.retry.clone());
        if let Some(classifier) = &self.classifier {
            scoped = scoped.with_classifier(classifier.clone());
        }
        scoped
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("timeouts", &self.timeouts)
            .field("importer", &self.importer)
            .field("custom_diff", &self.custom_diff.len())
            .field("deprecation", &self.deprecation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Resource for Noop {
        async fn create(&self, _ctx: &Context, data: &mut ResourceData) -> Result<()> {
            data.set_id("x");
            Ok(())
        }

        async fn read(&self, _ctx: &Context, _data: &mut ResourceData) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _ctx: &Context, _data: &mut ResourceData) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_timeouts() {
        let rt = ResourceType::new("t", Schema::new(), Noop);
        assert_eq!(rt.timeouts().for_phase(Operation::Create), Duration::from_secs(600));
        let rt = rt.timeout(Operation::Delete, Duration::from_secs(30));
        assert_eq!(rt.timeouts().delete, Duration::from_secs(30));
        assert_eq!(rt.timeouts().for_phase(Operation::Import), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_update_unsupported_by_default() {
        let rt = ResourceType::new("t", Schema::new(), Noop);
        let state = crate::state::ResourceState::new("x");
        let mut data = ResourceData::for_state(rt.schema().clone(), Operation::Update, &state);
        let err = rt
            .handler()
            .update(&Context::new("r"), &mut data)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support in-place update"));
    }

    #[test]
    fn test_scope_carries_retry_budget() {
        let rt = ResourceType::new("t", Schema::new(), Noop).retry(RetryConfig::none());
        let ctx = rt.scope(&Context::new("r"));
        assert_eq!(ctx.retry_config().max_attempts, 1);
    }
}
