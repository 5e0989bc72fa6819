//! Handler view of one resource instance
//!
//! [`ResourceData`] is what create/read/update/delete handlers work on: the
//! effective configuration, the state as it stood before the operation and the
//! working state the handler writes into.

use crate::error::{CloudError, Operation, Result};
use crate::path::AttributePath;
use crate::plan::Plan;
use crate::schema::Schema;
use crate::state::ResourceState;
use crate::typed::{AttrKey, FromValue, IntoValue};
use crate::value::{Attributes, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ResourceData {
    schema: Arc<Schema>,
    operation: Operation,
    id: String,
    config: Option<Attributes>,
    prior: Attributes,
    state: Attributes,
    changed: BTreeSet<String>,
    partial: Option<BTreeSet<String>>,
}

impl ResourceData {
    /// Data for a Create: the working state starts out as the configuration.
    pub fn for_create(schema: Arc<Schema>, config: Attributes) -> Self {
        let changed = config
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone())
            .collect();
        let state = known_values(&config);
        Self {
            schema,
            operation: Operation::Create,
            id: String::new(),
            config: Some(config),
            prior: Attributes::new(),
            state,
            changed,
            partial: None,
        }
    }

    /// Data for a Read or Delete of existing state.
    pub fn for_state(schema: Arc<Schema>, operation: Operation, state: &ResourceState) -> Self {
        Self {
            schema,
            operation,
            id: state.id.clone(),
            config: None,
            prior: state.attributes.clone(),
            state: state.attributes.clone(),
            changed: BTreeSet::new(),
            partial: None,
        }
    }

    /// Data for an in-place Update: configured values overlay the prior state
    /// and attributes the user removed are dropped.
    pub fn for_update(
        schema: Arc<Schema>,
        prior: &ResourceState,
        config: Attributes,
        plan: &Plan,
    ) -> Self {
        let changed: BTreeSet<String> = plan
            .diffs
            .iter()
            .filter_map(|d| d.path.root_name().map(str::to_string))
            .collect();

        let mut state = prior.attributes.clone();
        for name in &changed {
            match config.get(name) {
                Some(v) if v.is_known() && !v.is_null() => {
                    state.insert(name.clone(), v.clone());
                }
                Some(_) => {}
                None => {
                    state.remove(name);
                }
            }
        }

        Self {
            schema,
            operation: Operation::Update,
            id: prior.id.clone(),
            config: Some(config),
            prior: prior.attributes.clone(),
            state,
            changed,
            partial: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record the upstream identifier. An empty ID marks the resource gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new(&self) -> bool {
        self.operation == Operation::Create
    }

    /// Current value of a top-level attribute, or null.
    pub fn get(&self, name: &str) -> &Value {
        self.state.get(name).unwrap_or(&Value::Null)
    }

    pub fn get_path(&self, path: &AttributePath) -> Option<&Value> {
        crate::schema::lookup(&self.state, path)
    }

    /// Typed read through an [`AttrKey`].
    pub fn get_as<T: FromValue>(&self, key: AttrKey<T>) -> Result<T> {
        T::from_value(self.get(key.name()))
            .map_err(|e| CloudError::Internal(format!("attribute {}: {}", key, e)))
    }

    /// Configured value, `None` outside create/update.
    pub fn config(&self) -> Option<&Attributes> {
        self.config.as_ref()
    }

    /// State as it was before this operation started.
    pub fn prior(&self) -> &Attributes {
        &self.prior
    }

    /// Whether the plan changed this top-level attribute.
    pub fn has_change(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn has_changes(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_change(n))
    }

    /// `(old, new)` for a top-level attribute.
    pub fn get_change(&self, name: &str) -> (&Value, &Value) {
        (
            self.prior.get(name).unwrap_or(&Value::Null),
            self.get(name),
        )
    }

    /// Write an observed value.
    ///
    /// A null observation never erases a user-owned attribute, and an
    /// observation the attribute's diff suppression deems equal keeps the
    /// value already in state.
    pub fn set(&mut self, name: &str, value: impl IntoValue) -> Result<()> {
        let attr = self.schema.get(name).ok_or_else(|| {
            CloudError::Internal(format!("{} is not an attribute of this resource", name))
        })?;
        let value = attr
            .ty
            .conform(&value.into_value(), attr.int_to_string)
            .map_err(|e| CloudError::Internal(format!("setting {}: {}", name, e)))?;

        if let Some(current) = self.state.get(name) {
            if value.is_null() && !attr.presence.is_computed() {
                return Ok(());
            }
            let path = AttributePath::root(name);
            if attr.suppresses(&path, current, &value, &self.state) {
                return Ok(());
            }
        }

        if value.is_null() {
            self.state.remove(name);
        } else {
            self.state.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn set_as<T: IntoValue>(&mut self, key: AttrKey<T>, value: T) -> Result<()> {
        self.set(key.name(), value)
    }

    /// Start recording which attributes have been committed upstream, so a
    /// failed update persists only those.
    pub fn begin_partial(&mut self) {
        self.partial.get_or_insert_with(BTreeSet::new);
    }

    /// Mark an attribute as committed upstream.
    pub fn set_partial(&mut self, name: &str) {
        self.partial
            .get_or_insert_with(BTreeSet::new)
            .insert(name.to_string());
    }

    pub fn partial(&self) -> Option<&BTreeSet<String>> {
        self.partial.as_ref()
    }

    /// State after a successful operation.
    pub fn into_state(self) -> ResourceState {
        ResourceState {
            id: self.id,
            attributes: known_values(&self.state),
            partial: None,
            updated_at: None,
        }
    }

    /// State to persist after the handler failed.
    ///
    /// A failed create that already obtained an ID keeps it so the next
    /// refresh can find the resource. A failed update persists the prior
    /// state plus whatever the handler marked as committed.
    pub fn into_failed_state(self) -> ResourceState {
        match self.operation {
            Operation::Create if !self.id.is_empty() => ResourceState {
                id: self.id,
                attributes: known_values(&self.state),
                partial: Some(BTreeSet::new()),
                updated_at: None,
            },
            Operation::Create => ResourceState::tombstone(),
            Operation::Update => {
                let mut attributes = self.prior;
                let tracked = self.partial.is_some();
                let committed = self.partial.unwrap_or_default();
                for name in &committed {
                    match self.state.get(name) {
                        Some(v) if v.is_known() => {
                            attributes.insert(name.clone(), v.clone());
                        }
                        Some(_) => {}
                        None => {
                            attributes.remove(name);
                        }
                    }
                }
                ResourceState {
                    id: self.id,
                    attributes,
                    partial: tracked.then_some(committed),
                    updated_at: None,
                }
            }
            _ => ResourceState {
                id: self.id,
                attributes: self.prior,
                partial: None,
                updated_at: None,
            },
        }
    }
}

fn known_values(attrs: &Attributes) -> Attributes {
    attrs
        .iter()
        .filter(|(_, v)| !v.is_null() && v.is_known())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
