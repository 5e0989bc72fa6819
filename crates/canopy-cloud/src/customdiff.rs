//! Custom diff hooks
//!
//! Hooks run after the pure planner. They may promote a change to
//! force-new, reject the plan or consult the upstream. Every hook runs; the
//! failures are returned together as one [`MultiError`].

use crate::context::Context;
use crate::error::{CloudError, MultiError, Result};
use crate::path::AttributePath;
use crate::plan::{Plan, Verdict};
use crate::schema::lookup;
use crate::state::ResourceState;
use crate::value::{self, Attributes, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What a hook may see and change during planning
pub struct ResourceDiff<'a> {
    plan: &'a mut Plan,
    prior: &'a ResourceState,
    empty: Attributes,
}

impl<'a> ResourceDiff<'a> {
    pub fn new(plan: &'a mut Plan, prior: &'a ResourceState) -> Self {
        Self {
            plan,
            prior,
            empty: Attributes::new(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.plan.resource_type
    }

    pub fn id(&self) -> &str {
        &self.plan.id
    }

    pub fn is_new(&self) -> bool {
        self.plan.verdict == Verdict::Create
    }

    /// Effective configuration
    pub fn config(&self) -> &Attributes {
        self.plan.config.as_ref().unwrap_or(&self.empty)
    }

    pub fn get(&self, name: &str) -> &Value {
        self.config().get(name).unwrap_or(&Value::Null)
    }

    pub fn get_path(&self, path: &AttributePath) -> Option<&Value> {
        lookup(self.config(), path)
    }

    /// Committed value of a top-level attribute
    pub fn old(&self, name: &str) -> &Value {
        self.prior.get(name)
    }

    /// Expand a `list.*.field` selector over the configuration.
    pub fn select(&self, selector: &str) -> Vec<(AttributePath, &Value)> {
        value::select(self.config(), selector)
    }

    pub fn has_change(&self, name: &str) -> bool {
        self.plan.has_change(name)
    }

    /// Whether the attribute needs checking: new resource, or changed.
    pub fn touched(&self, name: &str) -> bool {
        self.is_new() || self.has_change(name)
    }

    /// Promote every change under `name` to force-new.
    pub fn force_new(&mut self, name: &str) -> bool {
        let promoted = self.plan.force_new(name);
        if promoted {
            tracing::debug!(attribute = name, "Custom diff forces replacement");
        }
        promoted
    }

    /// Precompute a value in the effective configuration.
    pub fn set_new(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(config) = self.plan.config.as_mut() {
            config.insert(name.to_string(), value.clone());
        }
        if let Some(d) = self
            .plan
            .diffs
            .iter_mut()
            .find(|d| d.path == AttributePath::root(name))
        {
            d.new = value;
        }
    }
}

#[async_trait]
pub trait CustomDiffHook: Send + Sync {
    /// Used in logs and error context
    fn name(&self) -> &str;

    async fn run(&self, ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()>;
}

/// Run every hook and accumulate their failures.
pub async fn run_all(
    ctx: &Context,
    hooks: &[Arc<dyn CustomDiffHook>],
    diff: &mut ResourceDiff<'_>,
) -> Result<()> {
    let mut errors = MultiError::new();
    for hook in hooks {
        if let Err(e) = ctx.check() {
            errors.push(e);
            break;
        }
        tracing::debug!(hook = hook.name(), resource_type = %diff.resource_type(), "Running custom diff hook");
        if let Err(e) = hook.run(ctx, diff).await {
            tracing::debug!(hook = hook.name(), error = %e, "Custom diff hook failed");
            errors.push(e);
        }
    }
    errors.into_result()
}

/// Several hooks combined into one, with error accumulation.
pub struct All {
    hooks: Vec<Arc<dyn CustomDiffHook>>,
}

pub fn all(hooks: Vec<Arc<dyn CustomDiffHook>>) -> Arc<dyn CustomDiffHook> {
    Arc::new(All { hooks })
}

#[async_trait]
impl CustomDiffHook for All {
    fn name(&self) -> &str {
        "all"
    }

    async fn run(&self, ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        run_all(ctx, &self.hooks, diff).await
    }
}

type CheckFn = dyn Fn(&mut ResourceDiff<'_>) -> Result<()> + Send + Sync;

/// Hook from a plain function, for checks that need no upstream.
pub struct FnHook {
    name: String,
    check: Box<CheckFn>,
}

pub fn hook_fn<F>(name: impl Into<String>, check: F) -> Arc<dyn CustomDiffHook>
where
    F: Fn(&mut ResourceDiff<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHook {
        name: name.into(),
        check: Box::new(check),
    })
}

#[async_trait]
impl CustomDiffHook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        (self.check)(diff)
    }
}

fn invalid(path: &AttributePath, message: impl Into<String>) -> CloudError {
    let mut diags = crate::diag::Diagnostics::new();
    diags.error(Some(path), message);
    CloudError::Validation(diags)
}

/// Force replacement when `attr` changes and `predicate(old, new)` holds.
pub struct ForceNewIf {
    attr: String,
    predicate: Box<dyn Fn(&Value, &Value) -> bool + Send + Sync>,
}

impl ForceNewIf {
    pub fn new(
        attr: impl Into<String>,
        predicate: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Arc<dyn CustomDiffHook> {
        Arc::new(Self {
            attr: attr.into(),
            predicate: Box::new(predicate),
        })
    }
}

#[async_trait]
impl CustomDiffHook for ForceNewIf {
    fn name(&self) -> &str {
        "force-new-if"
    }

    async fn run(&self, _ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        if diff.is_new() || !diff.has_change(&self.attr) {
            return Ok(());
        }
        let old = diff.old(&self.attr).clone();
        let new = diff.get(&self.attr).clone();
        if new.is_known() && (self.predicate)(&old, &new) {
            diff.force_new(&self.attr);
        }
        Ok(())
    }
}

/// Block-storage volume types offered per availability zone
#[async_trait]
pub trait VolumeTypeCatalog: Send + Sync {
    async fn volume_types(&self, ctx: &Context, zone: &str) -> Result<Vec<String>>;
}

/// Fail when a configured volume type is not offered in the zone.
///
/// The zone is taken from the `zone_attr` sibling of each selected value,
/// falling back to the top-level attribute of that name.
pub struct VolumeTypeAvailability {
    selectors: Vec<String>,
    zone_attr: String,
    catalog: Arc<dyn VolumeTypeCatalog>,
}

impl VolumeTypeAvailability {
    pub fn new<I, S>(
        selectors: I,
        zone_attr: impl Into<String>,
        catalog: Arc<dyn VolumeTypeCatalog>,
    ) -> Arc<dyn CustomDiffHook>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            zone_attr: zone_attr.into(),
            catalog,
        })
    }

    fn zone_for(&self, diff: &ResourceDiff<'_>, path: &AttributePath) -> Option<String> {
        let sibling = path
            .parent()
            .filter(|p| !p.is_empty())
            .map(|p| p.attr(self.zone_attr.as_str()))
            .and_then(|p| diff.get_path(&p).cloned());
        let zone = match sibling {
            Some(v) if !v.is_null() => v,
            _ => diff.get(&self.zone_attr).clone(),
        };
        zone.as_str().map(str::to_string)
    }
}

#[async_trait]
impl CustomDiffHook for VolumeTypeAvailability {
    fn name(&self) -> &str {
        "volume-type-availability"
    }

    async fn run(&self, ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        let mut checks: Vec<(AttributePath, String, String)> = Vec::new();
        for selector in &self.selectors {
            let root = selector.split('.').next().unwrap_or_default();
            if !diff.touched(root) {
                continue;
            }
            for (path, value) in diff.select(selector) {
                let Some(volume_type) = value.as_str() else {
                    continue;
                };
                if let Some(zone) = self.zone_for(diff, &path) {
                    checks.push((path, volume_type.to_string(), zone));
                }
            }
        }

        let mut offered: HashMap<String, Vec<String>> = HashMap::new();
        let mut errors = MultiError::new();
        for (path, volume_type, zone) in checks {
            if !offered.contains_key(&zone) {
                ctx.check()?;
                let types = self.catalog.volume_types(ctx, &zone).await?;
                offered.insert(zone.clone(), types);
            }
            let types = offered.get(&zone).map(Vec::as_slice).unwrap_or_default();
            if !types.iter().any(|t| t.eq_ignore_ascii_case(&volume_type)) {
                errors.push(invalid(
                    &path,
                    format!(
                        "volume type {} is not available in {}; offered: [{}]",
                        volume_type,
                        zone,
                        types.join(", ")
                    ),
                ));
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Vpc,
    Subnet,
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Vpc => write!(f, "VPC"),
            NetworkKind::Subnet => write!(f, "subnet"),
        }
    }
}

/// Existence checks against the network service
#[async_trait]
pub trait NetworkLookup: Send + Sync {
    async fn exists(&self, ctx: &Context, kind: NetworkKind, id: &str) -> Result<bool>;
}

/// Fail when a referenced VPC or subnet does not exist.
pub struct NetworkExists {
    references: Vec<(String, NetworkKind)>,
    lookup: Arc<dyn NetworkLookup>,
}

impl NetworkExists {
    pub fn new(references: Vec<(&str, NetworkKind)>, lookup: Arc<dyn NetworkLookup>) -> Arc<dyn CustomDiffHook> {
        Arc::new(Self {
            references: references
                .into_iter()
                .map(|(s, k)| (s.to_string(), k))
                .collect(),
            lookup,
        })
    }
}

#[async_trait]
impl CustomDiffHook for NetworkExists {
    fn name(&self) -> &str {
        "network-exists"
    }

    async fn run(&self, ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        let mut checks = Vec::new();
        for (selector, kind) in &self.references {
            let root = selector.split('.').next().unwrap_or_default();
            if !diff.touched(root) {
                continue;
            }
            for (path, value) in diff.select(selector) {
                if let Some(id) = value.as_str() {
                    checks.push((path, *kind, id.to_string()));
                }
            }
        }

        let mut errors = MultiError::new();
        for (path, kind, id) in checks {
            ctx.check()?;
            if !self.lookup.exists(ctx, kind, &id).await? {
                errors.push(invalid(&path, format!("{} {} does not exist", kind, id)));
            }
        }
        errors.into_result()
    }
}

/// Integer ranges per disk attribute, e.g. system disks 4 to 32768 GB.
pub struct DiskSizeBounds {
    rules: Vec<(String, i64, i64)>,
}

impl DiskSizeBounds {
    pub fn new(rules: Vec<(&str, i64, i64)>) -> Arc<dyn CustomDiffHook> {
        Arc::new(Self {
            rules: rules
                .into_iter()
                .map(|(s, min, max)| (s.to_string(), min, max))
                .collect(),
        })
    }
}

#[async_trait]
impl CustomDiffHook for DiskSizeBounds {
    fn name(&self) -> &str {
        "disk-size-bounds"
    }

    async fn run(&self, _ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        let mut errors = MultiError::new();
        for (selector, min, max) in &self.rules {
            for (path, value) in diff.select(selector) {
                if let Some(size) = value.as_i64()
                    && (size < *min || size > *max)
                {
                    errors.push(invalid(
                        &path,
                        format!("disk size must be between {} and {} GB, got {}", min, max, size),
                    ));
                }
            }
        }
        errors.into_result()
    }
}

/// Restrict `(value, unit)` pairs inside selected blocks to a whitelist.
pub struct SchedulingPeriod {
    blocks: String,
    value_field: String,
    unit_field: String,
    allowed: Vec<(i64, String)>,
}

impl SchedulingPeriod {
    pub fn new(
        blocks: &str,
        value_field: &str,
        unit_field: &str,
        allowed: &[(i64, &str)],
    ) -> Arc<dyn CustomDiffHook> {
        Arc::new(Self {
            blocks: blocks.to_string(),
            value_field: value_field.to_string(),
            unit_field: unit_field.to_string(),
            allowed: allowed.iter().map(|(v, u)| (*v, u.to_string())).collect(),
        })
    }
}

#[async_trait]
impl CustomDiffHook for SchedulingPeriod {
    fn name(&self) -> &str {
        "scheduling-period"
    }

    async fn run(&self, _ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        let mut errors = MultiError::new();
        for (path, block) in diff.select(&self.blocks) {
            let Some(block) = block.as_map() else {
                continue;
            };
            let value = block.get(&self.value_field).and_then(Value::as_i64);
            let unit = block.get(&self.unit_field).and_then(Value::as_str);
            let (Some(value), Some(unit)) = (value, unit) else {
                continue;
            };
            if !self.allowed.iter().any(|(v, u)| *v == value && u == unit) {
                let allowed = self
                    .allowed
                    .iter()
                    .map(|(v, u)| format!("{} {}", v, u))
                    .collect::<Vec<_>>()
                    .join(", ");
                errors.push(invalid(
                    &path.attr(self.value_field.as_str()),
                    format!("period {} {} is not supported; use one of: {}", value, unit, allowed),
                ));
            }
        }
        errors.into_result()
    }
}

/// Within each selected block, exactly one of `fields` must be nonzero.
pub struct ActionExclusivity {
    blocks: String,
    fields: Vec<String>,
}

impl ActionExclusivity {
    pub fn new(blocks: &str, fields: &[&str]) -> Arc<dyn CustomDiffHook> {
        Arc::new(Self {
            blocks: blocks.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }
}

#[async_trait]
impl CustomDiffHook for ActionExclusivity {
    fn name(&self) -> &str {
        "action-exclusivity"
    }

    async fn run(&self, _ctx: &Context, diff: &mut ResourceDiff<'_>) -> Result<()> {
        let mut errors = MultiError::new();
        for (path, block) in diff.select(&self.blocks) {
            let Some(block) = block.as_map() else {
                continue;
            };
            // unknown values cannot be judged until apply
            if self
                .fields
                .iter()
                .any(|f| block.get(f).is_some_and(Value::is_unknown))
            {
                continue;
            }
            let set: Vec<&String> = self
                .fields
                .iter()
                .filter(|f| !block.get(f.as_str()).unwrap_or(&Value::Null).is_zero())
                .collect();
            if set.len() != 1 {
                errors.push(invalid(
                    &path,
                    format!(
                        "exactly one of [{}] must be set to a nonzero value, got {}",
                        self.fields.join(", "),
                        set.len()
                    ),
                ));
            }
        }
        errors.into_result()
    }
}
