//! Committed resource state
//!
//! The host owns a [`ResourceState`] between invocations. An empty ID is the
//! tombstone: the resource no longer exists upstream and the next plan will
//! recreate it.

use crate::path::AttributePath;
use crate::value::{Attributes, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State of a single resource instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Upstream identifier; empty means tombstone
    pub id: String,

    /// Attribute values as last committed
    #[serde(default)]
    pub attributes: Attributes,

    /// Attributes committed by an update that failed part way; `None` when the
    /// last apply completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<BTreeSet<String>>,

    /// Last time the engine committed this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// The "no such resource" state.
    pub fn tombstone() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_tombstone(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Top-level attribute, or null when absent.
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&Value::Null)
    }

    pub fn get_path(&self, path: &AttributePath) -> Option<&Value> {
        crate::schema::lookup(&self.attributes, path)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Stamp the commit time.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Turn this state into a tombstone, dropping every attribute.
    pub fn clear(&mut self) {
        *self = Self::tombstone();
    }
}
