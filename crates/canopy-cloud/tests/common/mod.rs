#![allow(dead_code)]

use async_trait::async_trait;
use canopy_cloud::waiter::{Observation, gone_when_not_found};
use canopy_cloud::{
    ApiError, Attribute, AttrType, Attributes, CloudError, Context, Importer, Resource,
    ResourceData, ResourceType, Result, Schema, StateWaiter, Value,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Object held by the fake upstream
#[derive(Debug, Clone)]
pub struct Object {
    pub attrs: Attributes,
    pub status: String,
    /// Polls left before a deleting object disappears
    pub deleting_polls: Option<u32>,
}

/// In-memory control plane with a call log and scripted behaviour.
#[derive(Default)]
pub struct FakeUpstream {
    objects: Mutex<BTreeMap<String, Object>>,
    counters: Mutex<BTreeMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    /// Reads a deleting object answers with `DELETING` before vanishing
    pub delete_lag: u32,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delete_lag(polls: u32) -> Arc<Self> {
        Arc::new(Self {
            delete_lag: polls,
            ..Default::default()
        })
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Next ID with the given prefix: `g1`, `g2`, ...
    fn next_id(&self, prefix: &str) -> String {
        let mut counters = self.counters.lock().unwrap();
        let n = counters.entry(prefix.to_string()).or_insert(0);
        *n += 1;
        format!("{}{}", prefix, n)
    }

    pub fn create(&self, prefix: &str, attrs: Attributes) -> String {
        let id = self.next_id(prefix);
        self.insert(&id, attrs);
        self.log(format!("CREATE {}", id));
        id
    }

    pub fn insert(&self, id: &str, attrs: Attributes) {
        self.objects.lock().unwrap().insert(
            id.to_string(),
            Object {
                attrs,
                status: "ACTIVE".into(),
                deleting_polls: None,
            },
        );
    }

    pub fn get(&self, id: &str) -> Result<Object> {
        self.log(format!("GET {}", id));
        let mut objects = self.objects.lock().unwrap();
        let Some(object) = objects.get_mut(id) else {
            return Err(CloudError::Api(ApiError::new(404, format!("{} not found", id))));
        };
        let polls = object.deleting_polls;
        match polls {
            Some(0) => {
                objects.remove(id);
                Err(CloudError::Api(ApiError::new(404, format!("{} not found", id))))
            }
            Some(n) => {
                object.deleting_polls = Some(n - 1);
                Ok(object.clone())
            }
            None => Ok(object.clone()),
        }
    }

    pub fn update(&self, id: &str, changes: Attributes) -> Result<()> {
        self.log(format!("UPDATE {}", id));
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(id)
            .ok_or_else(|| CloudError::Api(ApiError::new(404, format!("{} not found", id))))?;
        object.attrs.extend(changes);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.log(format!("DELETE {}", id));
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(id)
            .ok_or_else(|| CloudError::Api(ApiError::new(404, format!("{} not found", id))))?;
        if object.deleting_polls.is_none() {
            object.status = "DELETING".into();
            object.deleting_polls = Some(self.delete_lag);
        }
        Ok(())
    }

    /// Out-of-band removal, e.g. someone deleted the object in the console.
    pub fn remove(&self, id: &str) {
        self.objects.lock().unwrap().remove(id);
    }

    pub fn exists(&self, id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(id)
    }
}

fn str_attr(data: &ResourceData, name: &str) -> String {
    data.get(name).as_str().unwrap_or_default().to_string()
}

async fn delete_and_wait(ctx: &Context, upstream: &FakeUpstream, id: &str) -> Result<()> {
    ctx.check()?;
    upstream.delete(id)?;
    StateWaiter::new(format!("{} to be deleted", id))
        .pending(["DELETING"])
        .target(["DELETED"])
        .poll_interval(Duration::from_secs(1))
        .timeout(Duration::from_secs(60))
        .wait(ctx, move || async move {
            let result = upstream.get(id).map(|o| {
                let status = o.status.clone();
                Observation::new(o, status)
            });
            gone_when_not_found(ctx, result, "DELETED")
        })
        .await?;
    Ok(())
}

/// Log group: `name` is force-new, `ttl_days` is decided by the server.
pub struct LogicalGroup {
    pub upstream: Arc<FakeUpstream>,
}

#[async_trait]
impl Resource for LogicalGroup {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let attrs: Attributes = [
            ("name".to_string(), data.get("name").clone()),
            ("ttl_days".to_string(), Value::Int(7)),
        ]
        .into();
        let id = self.upstream.create("g", attrs);
        data.set_id(id);
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let object = self.upstream.get(data.id())?;
        data.set("name", object.attrs.get("name").cloned().unwrap_or_default())?;
        data.set("ttl_days", object.attrs.get("ttl_days").cloned().unwrap_or_default())?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        delete_and_wait(ctx, &self.upstream, data.id()).await
    }
}

pub fn logical_group(upstream: Arc<FakeUpstream>) -> ResourceType {
    ResourceType::new(
        "logical_group",
        Schema::new()
            .attribute("name", Attribute::required_string().force_new())
            .attribute("ttl_days", Attribute::computed(AttrType::Int)),
        LogicalGroup { upstream },
    )
    .importer(Importer::passthrough())
}

/// Instance pinned to a zone; `size` updates in place.
pub struct Instance {
    pub upstream: Arc<FakeUpstream>,
}

#[async_trait]
impl Resource for Instance {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let attrs: Attributes = [
            ("name".to_string(), data.get("name").clone()),
            ("zone".to_string(), data.get("zone").clone()),
            ("size".to_string(), data.get("size").clone()),
        ]
        .into();
        let id = self.upstream.create("i", attrs);
        data.set_id(id);
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let object = self.upstream.get(data.id())?;
        for name in ["name", "zone", "size"] {
            data.set(name, object.attrs.get(name).cloned().unwrap_or_default())?;
        }
        data.set("status", object.status)?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        if data.has_change("size") {
            let changes: Attributes = [("size".to_string(), data.get("size").clone())].into();
            self.upstream.update(data.id(), changes)?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        delete_and_wait(ctx, &self.upstream, data.id()).await
    }
}

pub fn instance(upstream: Arc<FakeUpstream>) -> ResourceType {
    ResourceType::new(
        "instance",
        Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("zone", Attribute::required_string().force_new())
            .attribute("size", Attribute::optional_int().default_value(1))
            .attribute("status", Attribute::computed_string()),
        Instance { upstream },
    )
}

/// Child object addressed by `<parent_id>/<child_id>`.
pub struct Child {
    pub upstream: Arc<FakeUpstream>,
}

#[async_trait]
impl Resource for Child {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let id = canopy_cloud::build_id([str_attr(data, "parent_id"), str_attr(data, "child_id")]);
        let attrs: Attributes = [("size".to_string(), Value::Int(3))].into();
        self.upstream.insert(&id, attrs);
        data.set_id(id);
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        let parts = canopy_cloud::parse_id(data.id(), &["parent_id", "child_id"])?;
        let key = canopy_cloud::build_id([&parts["parent_id"], &parts["child_id"]]);
        let object = self.upstream.get(&key)?;
        data.set("parent_id", parts["parent_id"].as_str())?;
        data.set("child_id", parts["child_id"].as_str())?;
        data.set("size", object.attrs.get("size").cloned().unwrap_or_default())?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        ctx.check()?;
        self.upstream.delete(data.id())
    }
}

pub fn child(upstream: Arc<FakeUpstream>) -> ResourceType {
    ResourceType::new(
        "child",
        Schema::new()
            .attribute("parent_id", Attribute::required_string().force_new())
            .attribute("child_id", Attribute::required_string().force_new())
            .attribute("size", Attribute::computed(AttrType::Int)),
        Child { upstream },
    )
    .importer(Importer::composite(["parent_id", "child_id"]))
}

pub fn config(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
