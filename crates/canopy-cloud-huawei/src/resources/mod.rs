//! Resource types of the provider

pub mod as_group;
pub mod as_policy;
pub mod dms_kafka_topic;
pub mod elb_loadbalancer;
pub mod lts_group;
pub mod mapreduce_cluster;

use canopy_cloud::ResourceType;

/// Every resource type, in registration order.
pub fn all() -> Vec<ResourceType> {
    vec![
        as_group::resource_type(),
        as_policy::resource_type(),
        dms_kafka_topic::resource_type(),
        elb_loadbalancer::resource_type(),
        lts_group::resource_type(),
        mapreduce_cluster::resource_type(),
    ]
}
