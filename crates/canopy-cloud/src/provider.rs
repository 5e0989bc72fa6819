//! Provider registry
//!
//! A [`Provider`] is the process-wide catalog of resource types. It is built
//! once at start-up and never mutated afterwards.

use crate::context::Context;
use crate::error::{CloudError, Operation, Result};
use crate::lifecycle::{Lifecycle, ReconcileError, Reconciled};
use crate::resource::ResourceType;
use crate::retry::RetryConfig;
use crate::state::ResourceState;
use crate::value::Attributes;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug)]
pub struct Provider {
    name: String,
    resources: BTreeMap<String, ResourceType>,
}

impl Provider {
    pub fn builder(name: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder {
            name: name.into(),
            resources: Vec::new(),
            timeout_overrides: Vec::new(),
            max_attempts: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self, name: &str) -> Result<&ResourceType> {
        self.resources
            .get(name)
            .ok_or_else(|| CloudError::UnknownResourceType(name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn lifecycle(&self, resource_type: &str) -> Result<Lifecycle<'_>> {
        Ok(Lifecycle::new(self.resource_type(resource_type)?))
    }

    /// Reconcile one instance of `resource_type`.
    pub async fn reconcile(
        &self,
        ctx: &Context,
        resource_type: &str,
        prior: &ResourceState,
        config: Option<&Attributes>,
    ) -> std::result::Result<Reconciled, ReconcileError> {
        let lifecycle = match self.lifecycle(resource_type) {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                return Err(ReconcileError {
                    kind: ctx.classifier().classify(&e),
                    resource_type: resource_type.to_string(),
                    id: prior.id.clone(),
                    operation: Operation::Plan,
                    message: e.to_string(),
                    state: prior.clone(),
                    source: e,
                });
            }
        };
        lifecycle.reconcile(ctx, prior, config).await
    }

    pub async fn import(&self, ctx: &Context, resource_type: &str, id: &str) -> Result<ResourceState> {
        self.lifecycle(resource_type)?.import(ctx, id).await
    }
}

pub struct ProviderBuilder {
    name: String,
    resources: Vec<ResourceType>,
    timeout_overrides: Vec<(Operation, Duration)>,
    max_attempts: Option<u32>,
}

impl ProviderBuilder {
    pub fn resource(mut self, resource_type: ResourceType) -> Self {
        self.resources.push(resource_type);
        self
    }

    /// Phase budget applied to every registered type, replacing the
    /// type's own default.
    pub fn timeout(mut self, operation: Operation, budget: Duration) -> Self {
        self.timeout_overrides.push((operation, budget));
        self
    }

    /// Attempt budget of the bounded retry wrapper for every type.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Fails when two types share a name.
    pub fn build(self) -> Result<Provider> {
        let mut resources = BTreeMap::new();
        for mut rt in self.resources {
            for (operation, budget) in &self.timeout_overrides {
                rt.timeouts_mut().set(*operation, *budget);
            }
            if let Some(attempts) = self.max_attempts {
                *rt.retry_config_mut() = RetryConfig {
                    max_attempts: attempts.max(1),
                    ..rt.retry_config().clone()
                };
            }
            let name = rt.name().to_string();
            if resources.insert(name.clone(), rt).is_some() {
                return Err(CloudError::InvalidConfig(format!(
                    "resource type {} is registered twice in provider {}",
                    name, self.name
                )));
            }
        }
        tracing::debug!(provider = %self.name, resource_types = resources.len(), "Provider built");
        Ok(Provider {
            name: self.name,
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ResourceData;
    use crate::resource::Resource;
    use crate::schema::Schema;
    use async_trait::async_trait;

    struct Nothing;

    #[async_trait]
    impl Resource for Nothing {
        async fn create(&self, _ctx: &Context, data: &mut ResourceData) -> Result<()> {
            data.set_id("n");
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
    fn test_duplicate_registration_rejected() {
        let err = Provider::builder("test")
            .resource(ResourceType::new("a", Schema::new(), Nothing))
            .resource(ResourceType::new("a", Schema::new(), Nothing))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn test_lookup_and_overrides() {
        let provider = Provider::builder("test")
            .resource(ResourceType::new("b", Schema::new(), Nothing))
            .resource(ResourceType::new("a", Schema::new(), Nothing))
            .timeout(Operation::Create, Duration::from_secs(60))
            .max_attempts(2)
            .build()
            .unwrap();
        assert_eq!(provider.resource_types().collect::<Vec<_>>(), vec!["a", "b"]);
        let a = provider.resource_type("a").unwrap();
        assert_eq!(a.timeouts().create, Duration::from_secs(60));
        assert_eq!(a.retry_config().max_attempts, 2);
        assert!(matches!(
            provider.resource_type("zzz"),
            Err(CloudError::UnknownResourceType(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_reconcile() {
        let provider = Provider::builder("test").build().unwrap();
        let err = provider
            .reconcile(&Context::new("r"), "nope", &ResourceState::tombstone(), None)
            .await
            .unwrap_err();
        assert_eq!(err.resource_type, "nope");
    }
}
