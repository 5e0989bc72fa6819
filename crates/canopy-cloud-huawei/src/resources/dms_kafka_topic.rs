//! Topic of a Kafka instance, addressed as `<instance_id>/<name>`

use crate::client::DmsClient;
use async_trait::async_trait;
use canopy_cloud::customdiff::hook_fn;
use canopy_cloud::pagination::{self, Cursor, Page};
use canopy_cloud::validation::{int_between, string_matches};
use canopy_cloud::{
    AttrKey, Attribute, AttributePath, CloudError, Context, Diagnostics, ErrorClassifier,
    Importer, Resource, ResourceData, ResourceType, Result, Schema, build_id, parse_id,
};
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "huaweicloud_dms_kafka_topic";

const PAGE_SIZE: u64 = 50;

const INSTANCE_ID: AttrKey<String> = AttrKey::new("instance_id");
const NAME: AttrKey<String> = AttrKey::new("name");
const PARTITIONS: AttrKey<i64> = AttrKey::new("partitions");
const REPLICAS: AttrKey<i64> = AttrKey::new("replicas");
const AGING_TIME: AttrKey<i64> = AttrKey::new("aging_time");
const SYNC_REPLICATION: AttrKey<bool> = AttrKey::new("sync_replication");
const SYNC_FLUSHING: AttrKey<bool> = AttrKey::new("sync_flushing");

#[derive(Debug, Serialize)]
struct CreateTopicRequest<'a> {
    id: &'a str,
    partition: i64,
    replication: i64,
    retention_time: i64,
    sync_replication: bool,
    sync_message_flush: bool,
}

#[derive(Debug, Serialize)]
struct UpdateTopicsRequest<'a> {
    topics: Vec<TopicChange<'a>>,
}

#[derive(Debug, Serialize)]
struct TopicChange<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_partition_numbers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention_time: Option<i64>,
}

#[derive(Debug, Serialize)]
struct DeleteTopicsRequest<'a> {
    topics: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct DeleteTopicsResponse {
    #[serde(default)]
    topics: Vec<DeleteOutcome>,
}

#[derive(Debug, Deserialize)]
struct DeleteOutcome {
    id: String,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    pub name: String,
    pub partition: i64,
    pub replication: i64,
    /// Hours
    pub retention_time: i64,
    #[serde(default)]
    pub sync_replication: bool,
    #[serde(default)]
    pub sync_message_flush: bool,
}

fn topics_path(client: &DmsClient, instance_id: &str) -> String {
    format!("v2/{}/instances/{}/topics", client.project_id(), instance_id)
}

/// `(instance_id, name)` of a topic ID.
fn split(id: &str) -> Result<(String, String)> {
    let mut parts = parse_id(id, &[INSTANCE_ID.name(), NAME.name()])?;
    let instance_id = parts.remove(INSTANCE_ID.name()).unwrap_or_default();
    let name = parts.remove(NAME.name()).unwrap_or_default();
    Ok((instance_id, name))
}

pub struct KafkaTopic;

impl KafkaTopic {
    /// Walk the instance's topic pages until `name` turns up.
    async fn find(ctx: &Context, client: &DmsClient, instance_id: &str, name: &str) -> Result<Topic> {
        let base = topics_path(client, instance_id);
        let base = base.as_str();
        let fetch = move |cursor: Option<Cursor>| async move {
            let offset = cursor.and_then(|c| c.offset()).unwrap_or(0);
            let path = format!("{}?offset={}&limit={}", base, offset, PAGE_SIZE);
            let list: TopicList = client.get(ctx, &path).await?;
            Ok(Page::with_offset(list.topics, offset, PAGE_SIZE))
        };
        pagination::find(ctx, fetch, |t: &Topic| t.name == name)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("topic {} of instance {}", name, instance_id)))
    }
}

#[async_trait]
impl Resource for KafkaTopic {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<DmsClient>()?;
        let instance_id = data.get_as(INSTANCE_ID)?;
        let name = data.get_as(NAME)?;
        let request = CreateTopicRequest {
            id: &name,
            partition: data.get_as(PARTITIONS)?,
            replication: data.get_as(REPLICAS)?,
            retention_time: data.get_as(AGING_TIME)?,
            sync_replication: data.get_as(SYNC_REPLICATION)?,
            sync_message_flush: data.get_as(SYNC_FLUSHING)?,
        };
        client
            .post_unit(ctx, &topics_path(&client, &instance_id), &request)
            .await?;
        tracing::info!(instance_id = %instance_id, topic = %name, "Created Kafka topic");
        data.set_id(build_id([&instance_id, &name]));
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let (instance_id, name) = split(data.id())?;
        let client = ctx.client::<DmsClient>()?;
        let topic = Self::find(ctx, &client, &instance_id, &name).await?;
        data.set_as(INSTANCE_ID, instance_id)?;
        data.set_as(NAME, topic.name)?;
        data.set_as(PARTITIONS, topic.partition)?;
        data.set_as(REPLICAS, topic.replication)?;
        data.set_as(AGING_TIME, topic.retention_time)?;
        data.set_as(SYNC_REPLICATION, topic.sync_replication)?;
        data.set_as(SYNC_FLUSHING, topic.sync_message_flush)?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let (instance_id, name) = split(data.id())?;
        let change = TopicChange {
            id: &name,
            new_partition_numbers: data
                .has_change(PARTITIONS.name())
                .then(|| data.get_as(PARTITIONS))
                .transpose()?,
            retention_time: data
                .has_change(AGING_TIME.name())
                .then(|| data.get_as(AGING_TIME))
                .transpose()?,
        };
        if change.new_partition_numbers.is_none() && change.retention_time.is_none() {
            return Ok(());
        }
        let client = ctx.client::<DmsClient>()?;
        let request = UpdateTopicsRequest {
            topics: vec![change],
        };
        client
            .put_unit(ctx, &topics_path(&client, &instance_id), &request)
            .await?;
        tracing::info!(instance_id = %instance_id, topic = %name, "Updated Kafka topic");
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let (instance_id, name) = split(data.id())?;
        let client = ctx.client::<DmsClient>()?;
        let path = format!("{}/delete", topics_path(&client, &instance_id));
        let response: DeleteTopicsResponse = client
            .post(ctx, &path, &DeleteTopicsRequest { topics: [&name] })
            .await?;
        match response.topics.iter().find(|t| t.id == name) {
            Some(outcome) if !outcome.success => Err(CloudError::Internal(format!(
                "the service refused to delete topic {} of instance {}",
                name, instance_id
            ))),
            _ => {
                tracing::info!(instance_id = %instance_id, topic = %name, "Deleted Kafka topic");
                Ok(())
            }
        }
    }
}

pub fn schema() -> Schema {
    Schema::new()
        .attribute(INSTANCE_ID.name(), Attribute::required_string().force_new())
        .attribute(
            NAME.name(),
            Attribute::required_string().force_new().validate(string_matches(
                r"^[A-Za-z0-9._\-]{3,200}$",
                "must be 3 to 200 letters, digits, '.', '_' or '-'",
            )),
        )
        .attribute(
            PARTITIONS.name(),
            Attribute::optional_int()
                .default_value(3)
                .validate(int_between(1, 200)),
        )
        .attribute(
            REPLICAS.name(),
            Attribute::optional_int()
                .default_value(3)
                .force_new()
                .validate(int_between(1, 3)),
        )
        .attribute(
            AGING_TIME.name(),
            Attribute::optional_int()
                .default_value(72)
                .validate(int_between(1, 720))
                .describe("Message retention in hours"),
        )
        .attribute(
            SYNC_REPLICATION.name(),
            Attribute::optional_bool().default_value(false).force_new(),
        )
        .attribute(
            SYNC_FLUSHING.name(),
            Attribute::optional_bool().default_value(false).force_new(),
        )
}

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), KafkaTopic)
        .importer(Importer::composite([INSTANCE_ID.name(), NAME.name()]))
        .classifier(ErrorClassifier::new().not_found_code("DMS.00404022"))
        .custom_diff(hook_fn("partitions-only-grow", |diff| {
            if diff.is_new() || !diff.has_change(PARTITIONS.name()) {
                return Ok(());
            }
            let old = diff.old(PARTITIONS.name()).as_i64();
            let new = diff.get(PARTITIONS.name()).as_i64();
            match (old, new) {
                (Some(old), Some(new)) if new < old => {
                    let mut diags = Diagnostics::new();
                    diags.error(
                        Some(&AttributePath::root(PARTITIONS.name())),
                        format!("partitions can only be increased, from {} to {} requested", old, new),
                    );
                    Err(CloudError::Validation(diags))
                }
                _ => Ok(()),
            }
        }))
}
