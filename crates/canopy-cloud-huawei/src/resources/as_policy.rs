//! Auto Scaling policy
//!
//! An alarm policy points at a monitoring alarm; scheduled and recurring
//! policies carry a `scheduled_policy` block instead.

use crate::client::AsClient;
use async_trait::async_trait;
use canopy_cloud::customdiff::{ActionExclusivity, SchedulingPeriod};
use canopy_cloud::typed::field;
use canopy_cloud::validation::{int_between, string_in_slice, string_matches};
use canopy_cloud::value::map;
use canopy_cloud::{
    AttrKey, AttrType, Attribute, Attributes, CloudError, Context, ErrorClassifier, Importer,
    Policy, Resource, ResourceData, ResourceType, Result, Schema, Value,
};
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "huaweicloud_as_policy";

const NAME: AttrKey<String> = AttrKey::new("scaling_policy_name");
const GROUP_ID: AttrKey<String> = AttrKey::new("scaling_group_id");
const POLICY_TYPE: AttrKey<String> = AttrKey::new("scaling_policy_type");
const ALARM_ID: AttrKey<Option<String>> = AttrKey::new("alarm_id");
const COOL_DOWN: AttrKey<i64> = AttrKey::new("cool_down_time");
const STATUS: AttrKey<Option<String>> = AttrKey::new("policy_status");
const SCHEDULED: &str = "scheduled_policy";
const ACTION: &str = "scaling_policy_action";

/// `(interval, recurrence_type)` pairs the service schedules
const SCHEDULING_PERIODS: [(i64, &str); 4] =
    [(1, "Daily"), (1, "Weekly"), (2, "Weekly"), (1, "Monthly")];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct ScheduledPolicy {
    launch_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recurrence_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recurrence_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct PolicyAction {
    operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_percentage: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PolicyRequest<'a> {
    scaling_policy_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaling_group_id: Option<&'a str>,
    scaling_policy_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alarm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_policy: Option<ScheduledPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaling_policy_action: Option<PolicyAction>,
    cool_down_time: i64,
}

#[derive(Debug, Deserialize)]
struct CreatePolicyResponse {
    scaling_policy_id: String,
}

#[derive(Debug, Deserialize)]
struct PolicyEnvelope {
    scaling_policy: ScalingPolicy,
}

#[derive(Debug, Deserialize)]
struct ScalingPolicy {
    scaling_policy_name: String,
    scaling_group_id: String,
    scaling_policy_type: String,
    #[serde(default)]
    alarm_id: Option<String>,
    #[serde(default)]
    scheduled_policy: Option<ScheduledPolicy>,
    #[serde(default)]
    scaling_policy_action: Option<PolicyAction>,
    #[serde(default)]
    cool_down_time: i64,
    #[serde(default)]
    policy_status: Option<String>,
}

fn first_block(data: &ResourceData, name: &str) -> Option<Attributes> {
    data.get(name)
        .as_items()
        .and_then(|items| items.first())
        .and_then(Value::as_map)
        .cloned()
}

fn scheduled_policy(data: &ResourceData) -> Result<Option<ScheduledPolicy>> {
    let Some(block) = first_block(data, SCHEDULED) else {
        return Ok(None);
    };
    let policy = (|| {
        Ok::<_, String>(ScheduledPolicy {
            launch_time: field(&block, "launch_time")?,
            recurrence_type: field(&block, "recurrence_type")?,
            recurrence_value: field(&block, "recurrence_value")?,
            interval: field(&block, "interval")?,
            start_time: field(&block, "start_time")?,
            end_time: field(&block, "end_time")?,
        })
    })()
    .map_err(|e| CloudError::Internal(format!("{}: {}", SCHEDULED, e)))?;
    Ok(Some(policy))
}

fn policy_action(data: &ResourceData) -> Result<Option<PolicyAction>> {
    let Some(block) = first_block(data, ACTION) else {
        return Ok(None);
    };
    let action = (|| {
        Ok::<_, String>(PolicyAction {
            operation: field(&block, "operation")?,
            instance_number: field(&block, "instance_number")?,
            instance_percentage: field(&block, "instance_percentage")?,
        })
    })()
    .map_err(|e| CloudError::Internal(format!("{}: {}", ACTION, e)))?;
    Ok(Some(action))
}

fn scheduled_value(policy: ScheduledPolicy) -> Value {
    Value::List(vec![map([
        ("launch_time", Value::from(policy.launch_time)),
        ("recurrence_type", policy.recurrence_type.into()),
        ("recurrence_value", policy.recurrence_value.into()),
        ("interval", policy.interval.into()),
        ("start_time", policy.start_time.into()),
        ("end_time", policy.end_time.into()),
    ])])
}

fn action_value(action: PolicyAction) -> Value {
    Value::List(vec![map([
        ("operation", Value::from(action.operation)),
        ("instance_number", action.instance_number.into()),
        ("instance_percentage", action.instance_percentage.into()),
    ])])
}

fn policy_path(client: &AsClient, id: &str) -> String {
    format!("autoscaling-api/v1/{}/scaling_policy/{}", client.project_id(), id)
}

fn request<'a>(data: &ResourceData, name: &'a str) -> Result<PolicyRequest<'a>> {
    Ok(PolicyRequest {
        scaling_policy_name: name,
        scaling_group_id: None,
        scaling_policy_type: data.get_as(POLICY_TYPE)?,
        alarm_id: data.get_as(ALARM_ID)?,
        scheduled_policy: scheduled_policy(data)?,
        scaling_policy_action: policy_action(data)?,
        cool_down_time: data.get_as(COOL_DOWN)?,
    })
}

pub struct AsPolicy;

#[async_trait]
impl Resource for AsPolicy {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let name = data.get_as(NAME)?;
        let group_id = data.get_as(GROUP_ID)?;
        let mut body = request(data, &name)?;
        body.scaling_group_id = Some(&group_id);

        let path = format!("autoscaling-api/v1/{}/scaling_policy", client.project_id());
        let created: CreatePolicyResponse = client.post(ctx, &path, &body).await?;
        tracing::info!(id = %created.scaling_policy_id, group = %group_id, "Created scaling policy");
        data.set_id(created.scaling_policy_id);
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let envelope: PolicyEnvelope = client.get(ctx, &policy_path(&client, data.id())).await?;
        let policy = envelope.scaling_policy;

        data.set_as(NAME, policy.scaling_policy_name)?;
        data.set_as(GROUP_ID, policy.scaling_group_id)?;
        data.set_as(POLICY_TYPE, policy.scaling_policy_type)?;
        data.set_as(ALARM_ID, policy.alarm_id)?;
        data.set_as(COOL_DOWN, policy.cool_down_time)?;
        data.set_as(STATUS, policy.policy_status)?;
        if let Some(scheduled) = policy.scheduled_policy {
            data.set(SCHEDULED, scheduled_value(scheduled))?;
        }
        if let Some(action) = policy.scaling_policy_action {
            data.set(ACTION, action_value(action))?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        let name = data.get_as(NAME)?;
        let body = request(data, &name)?;
        client
            .put_unit(ctx, &policy_path(&client, data.id()), &body)
            .await?;
        tracing::info!(id = %data.id(), "Updated scaling policy");
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<AsClient>()?;
        client.delete(ctx, &policy_path(&client, data.id())).await?;
        tracing::info!(id = %data.id(), "Deleted scaling policy");
        Ok(())
    }
}

fn scheduled_schema() -> Schema {
    Schema::new()
        .attribute(
            "launch_time",
            Attribute::required_string().describe("UTC, `YYYY-MM-DDThh:mmZ` or `hh:mm` when recurring"),
        )
        .attribute(
            "recurrence_type",
            Attribute::optional_string().validate(string_in_slice(&["Daily", "Weekly", "Monthly"], false)),
        )
        .attribute("recurrence_value", Attribute::optional_string())
        .attribute("interval", Attribute::optional_int())
        .attribute("start_time", Attribute::optional_computed(AttrType::String))
        .attribute("end_time", Attribute::optional_string())
}

fn action_schema() -> Schema {
    Schema::new()
        .attribute(
            "operation",
            Attribute::optional_string()
                .default_value("ADD")
                .validate(string_in_slice(&["ADD", "REMOVE", "SET"], false)),
        )
        .attribute(
            "instance_number",
            Attribute::optional_int().validate(int_between(0, 300)),
        )
        .attribute(
            "instance_percentage",
            Attribute::optional_int().validate(int_between(0, 20000)),
        )
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
        .attribute(GROUP_ID.name(), Attribute::required_string().force_new())
        .attribute(
            POLICY_TYPE.name(),
            Attribute::required_string()
                .validate(string_in_slice(&["ALARM", "SCHEDULED", "RECURRENCE"], false)),
        )
        .attribute(ALARM_ID.name(), Attribute::optional_string())
        .attribute(
            SCHEDULED,
            Attribute::optional(AttrType::blocks(scheduled_schema())).max_items(1),
        )
        .attribute(
            ACTION,
            Attribute::optional(AttrType::blocks(action_schema())).max_items(1),
        )
        .attribute(
            COOL_DOWN.name(),
            Attribute::optional_int()
                .default_value(300)
                .validate(int_between(0, 86400)),
        )
        .attribute(STATUS.name(), Attribute::computed_string())
        .policy(Policy::conflicts_with(ALARM_ID.name(), [SCHEDULED]))
        .policy(Policy::required_with(
            "scheduled_policy.0.recurrence_type",
            ["scheduled_policy.0.recurrence_value", "scheduled_policy.0.end_time"],
        ))
}

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), AsPolicy)
        .importer(Importer::passthrough())
        .classifier(ErrorClassifier::new().not_found_code("AS.2018"))
        .custom_diff(SchedulingPeriod::new(
            "scheduled_policy.*",
            "interval",
            "recurrence_type",
            &SCHEDULING_PERIODS,
        ))
        .custom_diff(ActionExclusivity::new(
            "scaling_policy_action.*",
            &["instance_number", "instance_percentage"],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_cloud::{ErrorKind, Lifecycle, ResourceState, Verdict};

    fn base(pairs: Vec<(&str, Value)>) -> Attributes {
        let mut config: Attributes = [
            ("scaling_policy_name".to_string(), Value::from("nightly")),
            ("scaling_group_id".to_string(), Value::from("g-1")),
            ("scaling_policy_type".to_string(), Value::from("RECURRENCE")),
        ]
        .into();
        config.extend(pairs.into_iter().map(|(k, v)| (k.to_string(), v)));
        config
    }

    fn recurrence(interval: i64, unit: &str) -> Value {
        Value::List(vec![map([
            ("launch_time", Value::from("07:00")),
            ("recurrence_type", Value::from(unit)),
            ("recurrence_value", Value::from("1,3,5")),
            ("interval", Value::Int(interval)),
            ("end_time", Value::from("2030-01-01T00:00Z")),
        ])])
    }

    fn action(number: Option<i64>, percentage: Option<i64>) -> Value {
        Value::List(vec![map([
            ("operation", Value::from("ADD")),
            ("instance_number", Value::from(number)),
            ("instance_percentage", Value::from(percentage)),
        ])])
    }

    #[test]
    fn test_alarm_conflicts_with_schedule() {
        let config = base(vec![
            ("alarm_id", "al-1".into()),
            ("scheduled_policy", recurrence(1, "Daily")),
        ]);
        let diags = schema().validate(&config);
        assert!(diags.has_errors());
        assert!(diags.to_string().contains("alarm_id"));
    }

    #[test]
    fn test_recurrence_requires_value_and_end() {
        let config = base(vec![(
            "scheduled_policy",
            Value::List(vec![map([
                ("launch_time", "07:00"),
                ("recurrence_type", "Weekly"),
            ])]),
        )]);
        let diags = schema().validate(&config);
        assert_eq!(diags.errors().count(), 1);
    }

    #[tokio::test]
    async fn test_scheduling_whitelist() {
        let rt = resource_type();
        let lifecycle = Lifecycle::new(&rt);
        let ctx = Context::new("r");
        let absent = ResourceState::tombstone();

        let weekly = base(vec![
            ("scheduled_policy", recurrence(2, "Weekly")),
            ("scaling_policy_action", action(Some(1), None)),
        ]);
        let plan = lifecycle.plan(&ctx, &absent, Some(&weekly)).await.unwrap();
        assert_eq!(plan.verdict, Verdict::Create);

        let monthly = base(vec![
            ("scheduled_policy", recurrence(2, "Monthly")),
            ("scaling_policy_action", action(Some(1), None)),
        ]);
        let err = lifecycle.plan(&ctx, &absent, Some(&monthly)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("2 Monthly"));
    }

    #[tokio::test]
    async fn test_action_needs_exactly_one_amount() {
        let rt = resource_type();
        let lifecycle = Lifecycle::new(&rt);
        let ctx = Context::new("r");
        let both = base(vec![
            ("scheduled_policy", recurrence(1, "Daily")),
            ("scaling_policy_action", action(Some(1), Some(10))),
        ]);
        let err = lifecycle
            .plan(&ctx, &ResourceState::tombstone(), Some(&both))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_request_from_blocks() {
        let policy: ScheduledPolicy = serde_json::from_str(
            r#"{"launch_time":"07:00","recurrence_type":"Daily","recurrence_value":null,"end_time":"2030-01-01T00:00Z"}"#,
        )
        .unwrap();
        let value = scheduled_value(policy.clone());
        let block = value.as_items().unwrap()[0].as_map().unwrap();
        assert_eq!(block["recurrence_type"], Value::from("Daily"));
        assert!(block["interval"].is_null());

        let json = serde_json::to_value(&policy).unwrap();
        assert!(json.get("interval").is_none());
        assert_eq!(json["end_time"], "2030-01-01T00:00Z");
    }
}
