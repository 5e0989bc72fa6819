//! Batch tag API shared by several services
//!
//! `POST {base}/action` with `{"action": "create"|"delete", "tags": [...]}`
//! and `GET {base}` listing the current tags.

use crate::client::HuaweiClient;
use async_trait::async_trait;
use canopy_cloud::{Context, Result, TagApi, Tags};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Serialize)]
struct TagAction<'a> {
    action: &'a str,
    tags: Vec<TagEntry>,
}

pub fn entries(tags: &Tags) -> Vec<TagEntry> {
    tags.iter()
        .map(|(key, value)| TagEntry {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

pub fn from_entries(entries: impl IntoIterator<Item = TagEntry>) -> Tags {
    entries.into_iter().map(|t| (t.key, t.value)).collect()
}

pub struct ActionTags<'a> {
    client: &'a HuaweiClient,
    base: String,
}

impl<'a> ActionTags<'a> {
    pub fn new(client: &'a HuaweiClient, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    pub async fn list(&self, ctx: &Context) -> Result<Tags> {
        let list: TagList = self.client.get(ctx, &self.base).await?;
        Ok(from_entries(list.tags))
    }

    async fn act(&self, ctx: &Context, action: &str, tags: &Tags) -> Result<()> {
        let body = TagAction {
            action,
            tags: entries(tags),
        };
        let path = format!("{}/action", self.base);
        self.client.post_unit(ctx, &path, &body).await
    }
}

#[async_trait]
impl TagApi for ActionTags<'_> {
    async fn delete_tags(&self, ctx: &Context, _resource_id: &str, tags: &Tags) -> Result<()> {
        self.act(ctx, "delete", tags).await
    }

    async fn create_tags(&self, ctx: &Context, _resource_id: &str, tags: &Tags) -> Result<()> {
        self.act(ctx, "create", tags).await
    }
}
