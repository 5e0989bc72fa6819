//! Log group of the Log Tank Service

use crate::client::LtsClient;
use async_trait::async_trait;
use canopy_cloud::validation::{int_between, string_matches};
use canopy_cloud::{
    AttrKey, AttrType, Attribute, CloudError, Context, ErrorClassifier, Importer, Resource,
    ResourceData, ResourceType, Result, Schema,
};
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "huaweicloud_lts_group";

const GROUP_NAME: AttrKey<String> = AttrKey::new("group_name");
const TTL_IN_DAYS: AttrKey<Option<i64>> = AttrKey::new("ttl_in_days");
const CREATED_AT: AttrKey<Option<String>> = AttrKey::new("created_at");

#[derive(Debug, Serialize)]
struct CreateGroupRequest<'a> {
    log_group_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_in_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreateGroupResponse {
    log_group_id: String,
}

#[derive(Debug, Serialize)]
struct UpdateGroupRequest {
    ttl_in_days: i64,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    log_groups: Vec<LogGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogGroup {
    pub log_group_id: String,
    pub log_group_name: String,
    pub ttl_in_days: i64,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub creation_time: Option<i64>,
}

fn rfc3339_from_millis(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339())
}

pub struct LtsGroup;

impl LtsGroup {
    /// The service has no single-group GET; list and pick.
    async fn find(ctx: &Context, client: &LtsClient, id: &str) -> Result<LogGroup> {
        let path = format!("v2/{}/groups", client.project_id());
        let list: GroupList = client.get(ctx, &path).await?;
        list.log_groups
            .into_iter()
            .find(|g| g.log_group_id == id)
            .ok_or_else(|| CloudError::NotFound(format!("log group {}", id)))
    }
}

#[async_trait]
impl Resource for LtsGroup {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<LtsClient>()?;
        let name = data.get_as(GROUP_NAME)?;
        let request = CreateGroupRequest {
            log_group_name: &name,
            ttl_in_days: data.get_as(TTL_IN_DAYS)?,
        };
        let path = format!("v2/{}/groups", client.project_id());
        let created: CreateGroupResponse = client.post(ctx, &path, &request).await?;
        tracing::info!(id = %created.log_group_id, name = %name, "Created log group");
        data.set_id(created.log_group_id);
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<LtsClient>()?;
        let group = Self::find(ctx, &client, data.id()).await?;
        data.set_as(GROUP_NAME, group.log_group_name)?;
        data.set_as(TTL_IN_DAYS, Some(group.ttl_in_days))?;
        data.set_as(CREATED_AT, group.creation_time.and_then(rfc3339_from_millis))?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        if !data.has_change(TTL_IN_DAYS.name()) {
            return Ok(());
        }
        let Some(ttl_in_days) = data.get_as(TTL_IN_DAYS)? else {
            // unset keeps whatever the server holds
            return Ok(());
        };
        let client = ctx.client::<LtsClient>()?;
        let path = format!("v2/{}/groups/{}", client.project_id(), data.id());
        client
            .post_unit(ctx, &path, &UpdateGroupRequest { ttl_in_days })
            .await?;
        tracing::info!(id = %data.id(), ttl_in_days, "Updated log group retention");
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<LtsClient>()?;
        let path = format!("v2/{}/groups/{}", client.project_id(), data.id());
        client.delete(ctx, &path).await?;
        tracing::info!(id = %data.id(), "Deleted log group");
        Ok(())
    }
}

pub fn schema() -> Schema {
    Schema::new()
        .attribute(
            GROUP_NAME.name(),
            Attribute::required_string().force_new().validate(string_matches(
                r"^[A-Za-z0-9_.\-]{1,64}$",
                "must be 1 to 64 letters, digits, '_', '.' or '-'",
            )),
        )
        .attribute(
            TTL_IN_DAYS.name(),
            Attribute::optional_computed(AttrType::Int)
                .validate(int_between(1, 365))
                .describe("Retention in days; the service keeps 7 when unset"),
        )
        .attribute(CREATED_AT.name(), Attribute::computed_string())
}

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), LtsGroup)
        .importer(Importer::passthrough())
        .classifier(ErrorClassifier::new().not_found_code("LTS.0201"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_cloud::{Planner, ResourceState, Value, Verdict};

    fn config(pairs: &[(&str, Value)]) -> canopy_cloud::Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn existing() -> ResourceState {
        ResourceState::new("g-1")
            .with_attribute("group_name", "app-logs")
            .with_attribute("ttl_in_days", 7)
            .with_attribute("created_at", "2024-05-01T00:00:00+00:00")
    }

    #[test]
    fn test_plan_verdicts() {
        let schema = schema();
        let planner = Planner::new(TYPE_NAME, &schema);

        let unset_ttl = config(&[("group_name", "app-logs".into())]);
        let plan = planner.plan(&existing(), Some(&unset_ttl)).unwrap();
        assert_eq!(plan.verdict, Verdict::NoOp);

        let longer = config(&[("group_name", "app-logs".into()), ("ttl_in_days", 30.into())]);
        assert_eq!(planner.plan(&existing(), Some(&longer)).unwrap().verdict, Verdict::Update);

        let renamed = config(&[("group_name", "other".into())]);
        assert_eq!(planner.plan(&existing(), Some(&renamed)).unwrap().verdict, Verdict::ForceNew);
    }

    #[test]
    fn test_validation() {
        let schema = schema();
        let bad = config(&[("group_name", "has space".into()), ("ttl_in_days", 0.into())]);
        let diags = schema.validate(&bad);
        assert_eq!(diags.errors().count(), 2);

        let computed = config(&[("group_name", "ok".into()), ("created_at", "x".into())]);
        assert!(schema.validate(&computed).has_errors());
    }

    #[test]
    fn test_creation_time() {
        assert_eq!(
            rfc3339_from_millis(1_714_521_600_000).as_deref(),
            Some("2024-05-01T00:00:00+00:00")
        );
    }
}
