//! Provider assembly from configuration

use crate::resources;
use canopy_cloud::{Context, Operation, Provider};
use canopy_config::ProviderConfig;

pub const PROVIDER_NAME: &str = "huaweicloud";

fn phase(name: &str) -> Option<Operation> {
    match name {
        "create" => Some(Operation::Create),
        "read" => Some(Operation::Read),
        "update" => Some(Operation::Update),
        "delete" => Some(Operation::Delete),
        _ => None,
    }
}

/// Registry of every resource type with the configured timeouts and retry
/// budget applied.
pub fn provider(config: &ProviderConfig) -> canopy_cloud::Result<Provider> {
    let mut builder = Provider::builder(PROVIDER_NAME);
    for rt in resources::all() {
        builder = builder.resource(rt);
    }
    for (name, budget) in config.timeouts.iter() {
        if let Some(operation) = phase(name) {
            builder = builder.timeout(operation, budget);
        }
    }
    if let Some(attempts) = config.max_retries {
        builder = builder.max_attempts(attempts);
    }
    builder.build()
}

/// Reconcile context carrying `config` for the service clients.
pub fn context(config: &ProviderConfig) -> Context {
    Context::new(config.region.clone()).with_meta(config.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_config::TimeoutOverrides;
    use std::time::Duration;

    #[test]
    fn test_registers_every_type() {
        let provider = provider(&ProviderConfig::new("ap-southeast-1", "p-1")).unwrap();
        let names: Vec<_> = provider.resource_types().collect();
        assert_eq!(
            names,
            vec![
                "huaweicloud_as_group",
                "huaweicloud_as_policy",
                "huaweicloud_dms_kafka_topic",
                "huaweicloud_elb_loadbalancer",
                "huaweicloud_lts_group",
                "huaweicloud_mapreduce_cluster",
            ]
        );
    }

    #[test]
    fn test_config_overrides_reach_every_type() {
        let mut config = ProviderConfig::new("ap-southeast-1", "p-1");
        config.timeouts = TimeoutOverrides {
            create: Some(90),
            ..Default::default()
        };
        config.max_retries = Some(2);
        let provider = provider(&config).unwrap();
        for name in provider.resource_types() {
            let rt = provider.resource_type(name).unwrap();
            assert_eq!(rt.timeouts().for_phase(Operation::Create), Duration::from_secs(90));
            assert_eq!(rt.retry_config().max_attempts, 2);
        }
    }

    #[test]
    fn test_context_carries_config() {
        let ctx = context(&ProviderConfig::new("eu-west-0", "p-1"));
        assert_eq!(ctx.region(), "eu-west-0");
        assert_eq!(ctx.meta::<ProviderConfig>().map(|c| c.project_id.as_str()), Some("p-1"));
    }
}
