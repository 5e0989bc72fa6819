//! Auto Scaling group
//!
//! Tags live behind a separate tag API and are reconciled after the group
//! itself, so a failed update can record the group fields as committed
//! while the tags are retried on the next apply.

use crate::client::AsClient;
use crate::job::phase_budget;
use crate::lookup::VpcNetworks;
use crate::tagging::ActionTags;
use async_trait::async_trait;
use canopy_cloud::customdiff::{NetworkExists, NetworkKind};
use canopy_cloud::tags::{TagReconciler, Tags, tags_from_value, validate_tags};
use canopy_cloud::validation::{int_between, string_matches};
use canopy_cloud::waiter::{Observation, gone_when_not_found};
use canopy_cloud::{
    AttrKey, AttrType, Attribute, Context, ErrorClassifier, Importer, Resource, ResourceData,
    ResourceType, Result, Schema, StateWaiter, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const TYPE_NAME: &str = "huaweicloud_as_group";

const NAME: AttrKey<String> = AttrKey::new("scaling_group_name");
const CONFIGURATION_ID: AttrKey<Option<String>> = AttrKey::new("scaling_configuration_id");
const DESIRE: AttrKey<Option<i64>> = AttrKey::new("desire_instance_number");
const MIN: AttrKey<i64> = AttrKey::new("min_instance_number");
const MAX: AttrKey<i64> = AttrKey::new("max_instance_number");
const COOL_DOWN: AttrKey<i64> = AttrKey::new("cool_down_time");
const VPC_ID: AttrKey<String> = AttrKey::new("vpc_id");
const ZONES: AttrKey<Option<Vec<String>>> = AttrKey::new("available_zones");
const DELETE_PUBLICIP: AttrKey<bool> = AttrKey::new("delete_publicip");
const TAGS: &str = "tags";
const NETWORKS: &str = "networks";
const STATUS: AttrKey<Option<String>> = AttrKey::new("status");
const CURRENT: AttrKey<Option<i64>> = AttrKey::new("current_instance_number");

/// Attributes written by the group update call
const GROUP_FIELDS: [&str; 7] = [
    "scaling_group_name",
    "scaling_configuration_id",
    "desire_instance_number",
    "min_instance_number",
    "max_instance_number",
    "cool_down_time",
    "delete_publicip",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Network {
    id: String,
}

#[derive(Debug, Serialize)]
struct GroupRequest<'a> {
    scaling_group_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaling_configuration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    desire_instance_number: Option<i64>,
    min_instance_number: i64,
    max_instance_number: i64,
    cool_down_time: i64,
    delete_publicip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    vpc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    networks: Option<Vec<Network>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_zones: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CreateGroupResponse {
    scaling_group_id: String,
}

#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    scaling_group: ScalingGroup,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingGroup {
    pub scaling_group_id: String,
    pub scaling_group_name: String,
    /// `INSERVICE`, `PAUSED`, `ERROR` or `DELETING`
    pub scaling_group_status: String,
    #[serde(default)]
    pub scaling_configuration_id: Option<String>,
    #[serde(default)]
    pub desire_instance_number: i64,
    #[serde(default)]
    pub min_instance_number: i64,
    #[serde(default)]
    pub max_instance_number: i64,
    #[serde(default)]
    pub current_instance_number: i64,
    #[serde(default)]
    pub cool_down_time: i64,
    pub vpc_id: String,
    #[serde(default)]
    networks: Vec<Network>,
    #[serde(default)]
    pub available_zones: Vec<String>,
    #[serde(default)]
    pub delete_publicip: bool,
}

fn group_path(client: &AsClient, id: &str) -> String {
    format!("autoscaling-api/v1/{}/scaling_group/{}", client.project_id(), id)
}

fn tag_api<'a>(client: &'a AsClient, id: &str) -> ActionTags<'a> {
    let base = format!("autoscaling-api/v1/{}/scaling_group_tag/{}/tags", client.project_id(), id);
    ActionTags::new(client, base)
}

fn networks(data: &ResourceData) -> Result<Vec<Network>> {
    let ids: Vec<BTreeMap<String, String>> = data.get_as(AttrKey::new(NETWORKS))?;
    Ok(ids
        .into_iter()
        .filter_map(|mut block| block.remove("id"))
        .map(|id| Network { id })
        .collect())
}

fn group_request<'a>(data: &ResourceData, name: &'a str) -> Result<GroupRequest<'a>> {
    Ok(GroupRequest {
        scaling_group_name: name,
        scaling_configuration_id: data.get_as(CONFIGURATION_ID)?,
        desire_instance_number: data.get_as(DESIRE)?,
        min_instance_number: data.get_as(MIN)?,
        max_instance_number: data.get_as(MAX)?,
        cool_down_time: data.get_as(COOL_DOWN)?,
        delete_publicip: data.get_as(DELETE_PUBLICIP)?,
        vpc_id: None,
        networks: None,
        available_zones: None,
    })
}

pub struct AsGroup;

#[async_trait]
impl Resource for AsGroup {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let name = data.get_as(NAME)?;
        let mut request = group_request(data, &name)?;
        request.vpc_id = Some(data.get_as(VPC_ID)?);
        request.networks = Some(networks(data)?);
        request.available_zones = data.get_as(ZONES)?;

        let path = format!("autoscaling-api/v1/{}/scaling_group", client.project_id());
        let created: CreateGroupResponse = client.post(ctx, &path, &request).await?;
        tracing::info!(id = %created.scaling_group_id, name = %name, "Created scaling group");
        data.set_id(created.scaling_group_id);

        let tags = tags_from_value(data.get(TAGS))?;
        let api = tag_api(&client, data.id());
        TagReconciler::new(&api, TYPE_NAME)
            .reconcile(ctx, data.id(), &Tags::new(), &tags)
            .await?;
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let envelope: GroupEnvelope = client.get(ctx, &group_path(&client, data.id())).await?;
        let group = envelope.scaling_group;

        data.set_as(NAME, group.scaling_group_name)?;
        data.set_as(CONFIGURATION_ID, group.scaling_configuration_id)?;
        data.set_as(DESIRE, Some(group.desire_instance_number))?;
        data.set_as(MIN, group.min_instance_number)?;
        data.set_as(MAX, group.max_instance_number)?;
        data.set_as(COOL_DOWN, group.cool_down_time)?;
        data.set_as(VPC_ID, group.vpc_id)?;
        data.set_as(DELETE_PUBLICIP, group.delete_publicip)?;
        data.set_as(ZONES, Some(group.available_zones))?;
        data.set_as(STATUS, Some(group.scaling_group_status))?;
        data.set_as(CURRENT, Some(group.current_instance_number))?;
        let networks: Vec<Value> = group
            .networks
            .into_iter()
            .map(|n| canopy_cloud::value::map([("id", n.id)]))
            .collect();
        data.set(NETWORKS, networks)?;

        let tags = tag_api(&client, data.id()).list(ctx).await?;
        if !tags.is_empty() || !data.get(TAGS).is_null() {
            data.set(TAGS, tags)?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        data.begin_partial();

        if data.has_changes(&GROUP_FIELDS) {
            let name = data.get_as(NAME)?;
            let request = group_request(data, &name)?;
            client
                .put_unit(ctx, &group_path(&client, data.id()), &request)
                .await?;
            for field in GROUP_FIELDS {
                data.set_partial(field);
            }
            tracing::info!(id = %data.id(), "Updated scaling group");
        }

        if data.has_change(TAGS) {
            let (old, new) = data.get_change(TAGS);
            let (old, new) = (tags_from_value(old)?, tags_from_value(new)?);
            TagReconciler::new(&tag_api(&client, data.id()), TYPE_NAME)
                .reconcile(ctx, data.id(), &old, &new)
                .await?;
            data.set_partial(TAGS);
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let path = group_path(&client, data.id());
        client
            .delete(ctx, &format!("{}?force_delete=yes", path))
            .await?;

        let path = path.as_str();
        let client = client.as_ref();
        StateWaiter::new(format!("scaling group {} to be deleted", data.id()))
            .pending(["INSERVICE", "PAUSED", "DELETING"])
            .target(["DELETED"])
            .error(["ERROR"])
            .delay(Duration::from_secs(2))
            .timeout(phase_budget(ctx))
            .wait(ctx, move || async move {
                let result = client.get::<GroupEnvelope>(ctx, path).await.map(|e| {
                    let label = e.scaling_group.scaling_group_status.clone();
                    Observation::new(e.scaling_group, label)
                });
                gone_when_not_found(ctx, result, "DELETED")
            })
            .await?;
        tracing::info!(id = %data.id(), "Deleted scaling group");
        Ok(())
    }
}

pub fn schema() -> Schema {
    Schema::new()
        .attribute(
            NAME.name(),
            Attribute::required_string().validate(string_matches(
                r"^[\w\-]{1,64}$",
                "must be 1 to 64 letters, digits, '_' or '-'",
            )),
        )
        .attribute(CONFIGURATION_ID.name(), Attribute::optional_string())
        .attribute(
            DESIRE.name(),
            Attribute::optional_computed(AttrType::Int).validate(int_between(0, 300)),
        )
        .attribute(
            MIN.name(),
            Attribute::optional_int().default_value(0).validate(int_between(0, 300)),
        )
        .attribute(
            MAX.name(),
            Attribute::optional_int().default_value(0).validate(int_between(0, 300)),
        )
        .attribute(
            COOL_DOWN.name(),
            Attribute::optional_int()
                .default_value(300)
                .validate(int_between(0, 86400)),
        )
        .attribute(VPC_ID.name(), Attribute::required_string().force_new())
        .attribute(
            NETWORKS,
            Attribute::required(AttrType::blocks(
                Schema::new().attribute("id", Attribute::required_string()),
            ))
            .force_new()
            .min_items(1)
            .max_items(5),
        )
        .attribute(
            ZONES.name(),
            Attribute::optional_computed(AttrType::list(AttrType::String)).force_new(),
        )
        .attribute(
            DELETE_PUBLICIP.name(),
            Attribute::optional_bool().default_value(false),
        )
        .attribute(
            TAGS,
            Attribute::optional(AttrType::map(AttrType::String)).validate(validate_tags()),
        )
        .attribute(STATUS.name(), Attribute::computed_string())
        .attribute(CURRENT.name(), Attribute::computed(AttrType::Int))
}

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), AsGroup)
        .importer(Importer::passthrough())
        .classifier(ErrorClassifier::new().not_found_code("AS.2007"))
        .custom_diff(NetworkExists::new(
            vec![
                (VPC_ID.name(), NetworkKind::Vpc),
                ("networks.*.id", NetworkKind::Subnet),
            ],
            VpcNetworks::shared(),
        ))
}
