//! Read-only service lookups used by plan-time checks

use crate::client::{EvsClient, VpcClient};
use async_trait::async_trait;
use canopy_cloud::customdiff::{NetworkKind, NetworkLookup, VolumeTypeCatalog};
use canopy_cloud::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const ZONES_KEY: &str = "RESKEY:availability_zones";
const SOLD_OUT_KEY: &str = "os-vendor-extended:sold_out_availability_zones";

#[derive(Debug, Deserialize)]
struct VolumeTypeList {
    volume_types: Vec<VolumeType>,
}

#[derive(Debug, Deserialize)]
struct VolumeType {
    name: String,
    #[serde(default)]
    extra_specs: BTreeMap<String, String>,
}

fn zone_listed(spec: Option<&String>, zone: &str) -> bool {
    spec.is_some_and(|zones| zones.split(',').any(|z| z.trim() == zone))
}

impl VolumeType {
    fn offered_in(&self, zone: &str) -> bool {
        zone_listed(self.extra_specs.get(ZONES_KEY), zone)
            && !zone_listed(self.extra_specs.get(SOLD_OUT_KEY), zone)
    }
}

/// Volume types of the block storage service
#[derive(Debug, Default, Clone, Copy)]
pub struct EvsVolumeTypes;

impl EvsVolumeTypes {
    pub fn shared() -> Arc<dyn VolumeTypeCatalog> {
        Arc::new(Self)
    }
}

#[async_trait]
impl VolumeTypeCatalog for EvsVolumeTypes {
    async fn volume_types(&self, ctx: &Context, zone: &str) -> Result<Vec<String>> {
        let client = ctx.client::<EvsClient>()?;
        let path = format!("v2/{}/types", client.project_id());
        let list: VolumeTypeList = client.get(ctx, &path).await?;
        let offered: Vec<String> = list
            .volume_types
            .into_iter()
            .filter(|t| t.offered_in(zone))
            .map(|t| t.name)
            .collect();
        tracing::debug!(zone, offered = ?offered, "Listed volume types");
        Ok(offered)
    }
}

/// VPC and subnet existence
#[derive(Debug, Default, Clone, Copy)]
pub struct VpcNetworks;

impl VpcNetworks {
    pub fn shared() -> Arc<dyn NetworkLookup> {
        Arc::new(Self)
    }
}

#[async_trait]
impl NetworkLookup for VpcNetworks {
    async fn exists(&self, ctx: &Context, kind: NetworkKind, id: &str) -> Result<bool> {
        let client = ctx.client::<VpcClient>()?;
        let collection = match kind {
            NetworkKind::Vpc => "vpcs",
            NetworkKind::Subnet => "subnets",
        };
        let path = format!("v1/{}/{}/{}", client.project_id(), collection, id);
        let found = ctx
            .classifier()
            .found(client.get::<serde_json::Value>(ctx, &path).await)?;
        Ok(found.is_some())
    }
}
