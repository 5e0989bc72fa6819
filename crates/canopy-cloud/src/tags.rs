//! Tag reconciliation over a side-channel tag API
//!
//! The upstream tag APIs take whole sets: the reconciler deletes every old
//! tag, then creates every new one.

use crate::context::Context;
use crate::error::{CloudError, MultiError, Result};
use crate::schema::ValidateFn;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

/// Keys: letters, digits and `_ . : = + - @`, 1 to 128 characters.
pub const TAG_KEY_PATTERN: &str = r"^[A-Za-z0-9_.:=+\-@]{1,128}$";

/// Values: the key alphabet plus spaces, up to 255 characters.
pub const TAG_VALUE_PATTERN: &str = r"^[A-Za-z0-9_.:=+\-@ ]{0,255}$";

/// Validator for a `map(string)` tags attribute with the default patterns.
pub fn validate_tags() -> ValidateFn {
    crate::validation::tags(TAG_KEY_PATTERN, TAG_VALUE_PATTERN)
}

/// Batch tag operations of one upstream service
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn delete_tags(&self, ctx: &Context, resource_id: &str, tags: &Tags) -> Result<()>;

    async fn create_tags(&self, ctx: &Context, resource_id: &str, tags: &Tags) -> Result<()>;
}

/// Tags of a state or configuration value. Null is the empty set.
pub fn tags_from_value(value: &Value) -> Result<Tags> {
    match value {
        Value::Null => Ok(Tags::new()),
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| match v.as_str() {
                Some(s) => Ok((k.clone(), s.to_string())),
                None => Err(CloudError::Internal(format!(
                    "tag {} has a non-string value",
                    k
                ))),
            })
            .collect(),
        other => Err(CloudError::Internal(format!(
            "expected a tag map, got {}",
            other.type_name()
        ))),
    }
}

/// Keys to drop and entries to add or overwrite between two tag sets.
pub fn tag_diff(old: &Tags, new: &Tags) -> (Vec<String>, Tags) {
    let removed = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    let added = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (removed, added)
}

pub struct TagReconciler<'a> {
    api: &'a dyn TagApi,
    resource_type: &'a str,
}

impl<'a> TagReconciler<'a> {
    pub fn new(api: &'a dyn TagApi, resource_type: &'a str) -> Self {
        Self { api, resource_type }
    }

    /// Bring the upstream tags of `resource_id` from `old` to `new`.
    ///
    /// Both steps run even if the first fails; their errors come back
    /// together. A not-found from the tag API means the tagged resource
    /// itself is gone and is reported as such.
    pub async fn reconcile(
        &self,
        ctx: &Context,
        resource_id: &str,
        old: &Tags,
        new: &Tags,
    ) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let (removed, added) = tag_diff(old, new);
        tracing::debug!(
            resource_type = %self.resource_type,
            id = %resource_id,
            removed = ?removed,
            added = ?added.keys().collect::<Vec<_>>(),
            "Reconciling tags"
        );

        let mut errors = MultiError::new();
        if !old.is_empty() {
            ctx.check()?;
            let result = self.api.delete_tags(ctx, resource_id, old).await;
            errors.collect(self.parent_gone(ctx, resource_id, result)?);
        }
        if !new.is_empty() {
            ctx.check()?;
            let result = self.api.create_tags(ctx, resource_id, new).await;
            errors.collect(self.parent_gone(ctx, resource_id, result)?);
        }
        errors.into_result()
    }

    /// Outer error: the parent is gone, stop. Inner result: the step outcome.
    fn parent_gone(
        &self,
        ctx: &Context,
        resource_id: &str,
        result: Result<()>,
    ) -> Result<Result<()>> {
        match result {
            Err(e) if ctx.classifier().is_not_found(&e) => Err(CloudError::NotFound(format!(
                "{} {} (while updating tags)",
                self.resource_type, resource_id
            ))),
            other => Ok(other),
        }
    }
}
