//! Diff planner
//!
//! Compares the effective configuration with the committed state and decides
//! what to do with one resource. Planning is pure; hooks that need the
//! upstream run afterwards (see [`crate::customdiff`]).

use crate::diag::Diagnostic;
use crate::error::{CloudError, Result};
use crate::path::AttributePath;
use crate::schema::{Attribute, Presence, Schema};
use crate::state::ResourceState;
use crate::value::{Attributes, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How one attribute changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Add,
    Remove,
    Change,
    /// Any change to this attribute requires destroy-then-create
    ForceNew,
}

impl DiffKind {
    fn marker(self) -> &'static str {
        match self {
            DiffKind::Add => "+",
            DiffKind::Remove => "-",
            DiffKind::Change => "~",
            DiffKind::ForceNew => "-/+",
        }
    }
}

/// One planned attribute change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDiff {
    pub path: AttributePath,
    pub old: Value,
    pub new: Value,
    pub kind: DiffKind,
    /// Render as `(sensitive value)` and never log
    pub sensitive: bool,
}

impl AttributeDiff {
    fn show(&self, value: &Value) -> String {
        if self.sensitive && !value.is_null() {
            "(sensitive value)".to_string()
        } else {
            value.to_string()
        }
    }
}

impl fmt::Display for AttributeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = self.kind.marker();
        match self.kind {
            DiffKind::Add => write!(f, "{} {} = {}", marker, self.path, self.show(&self.new)),
            DiffKind::Remove => write!(f, "{} {} = {}", marker, self.path, self.show(&self.old)),
            DiffKind::Change => write!(
                f,
                "{} {}: {} -> {}",
                marker,
                self.path,
                self.show(&self.old),
                self.show(&self.new)
            ),
            DiffKind::ForceNew => write!(
                f,
                "{} {}: {} -> {} # forces replacement",
                marker,
                self.path,
                self.show(&self.old),
                self.show(&self.new)
            ),
        }
    }
}

/// Resource-level decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NoOp,
    Update,
    ForceNew,
    Create,
    Destroy,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::NoOp => write!(f, "no-op"),
            Verdict::Update => write!(f, "update"),
            Verdict::ForceNew => write!(f, "force-new"),
            Verdict::Create => write!(f, "create"),
            Verdict::Destroy => write!(f, "destroy"),
        }
    }
}

/// Plan for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub resource_type: String,

    /// ID of the prior generation; empty when creating
    pub id: String,

    pub verdict: Verdict,

    /// Sorted by path
    pub diffs: Vec<AttributeDiff>,

    /// Effective configuration (defaults applied); `None` for destroy
    pub config: Option<Attributes>,

    /// Deprecation notices and other non-fatal findings
    #[serde(skip)]
    pub warnings: Vec<Diagnostic>,
}

impl Plan {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            verdict: Verdict::NoOp,
            diffs: Vec::new(),
            config: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.verdict != Verdict::NoOp
    }

    pub fn requires_replace(&self) -> bool {
        self.verdict == Verdict::ForceNew
    }

    pub fn diff(&self, path: &AttributePath) -> Option<&AttributeDiff> {
        self.diffs.iter().find(|d| &d.path == path)
    }

    /// Whether any diff touches the named top-level attribute.
    pub fn has_change(&self, name: &str) -> bool {
        self.diffs.iter().any(|d| d.path.root_name() == Some(name))
    }

    /// Diffs under the named top-level attribute.
    pub fn changes_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AttributeDiff> + 'a {
        self.diffs
            .iter()
            .filter(move |d| d.path.root_name() == Some(name))
    }

    /// Promote every diff under the named attribute to force-new. Returns
    /// whether anything was promoted.
    pub fn force_new(&mut self, name: &str) -> bool {
        let mut promoted = false;
        for d in self.diffs.iter_mut() {
            if d.path.root_name() == Some(name) && d.kind != DiffKind::ForceNew {
                d.kind = DiffKind::ForceNew;
                promoted = true;
            }
        }
        if promoted && self.verdict == Verdict::Update {
            self.verdict = Verdict::ForceNew;
        }
        promoted
    }

    /// Human readable rendering with sensitive values masked.
    pub fn render(&self) -> String {
        let header = match self.verdict {
            Verdict::NoOp => format!("  {} {} is up to date", self.resource_type, self.id),
            Verdict::Update => format!("~ {} {} will be updated in-place", self.resource_type, self.id),
            Verdict::ForceNew => format!("-/+ {} {} must be replaced", self.resource_type, self.id),
            Verdict::Create => format!("+ {} will be created", self.resource_type),
            Verdict::Destroy => format!("- {} {} will be destroyed", self.resource_type, self.id),
        };
        let mut out = header;
        for d in &self.diffs {
            out.push_str("\n    ");
            out.push_str(&d.to_string());
        }
        out
    }
}

/// Counts across plans, e.g. `1 to add, 0 to change, 1 to replace, 0 to destroy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub add: usize,
    pub change: usize,
    pub replace: usize,
    pub destroy: usize,
    pub unchanged: usize,
}

impl PlanSummary {
    pub fn of<'a>(plans: impl IntoIterator<Item = &'a Plan>) -> Self {
        let mut summary = Self::default();
        for plan in plans {
            match plan.verdict {
                Verdict::Create => summary.add += 1,
                Verdict::Update => summary.change += 1,
                Verdict::ForceNew => summary.replace += 1,
                Verdict::Destroy => summary.destroy += 1,
                Verdict::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to replace, {} to destroy",
            self.add, self.change, self.replace, self.destroy
        )
    }
}

/// Pure planner over one resource type's schema
pub struct Planner<'a> {
    resource_type: &'a str,
    schema: &'a Schema,
}

impl<'a> Planner<'a> {
    pub fn new(resource_type: &'a str, schema: &'a Schema) -> Self {
        Self {
            resource_type,
            schema,
        }
    }

    /// Plan `prior` towards `config`. `None` configuration asks for removal.
    ///
    /// Fails with [`CloudError::Validation`] when the configuration violates
    /// the schema or a cross-attribute policy.
    pub fn plan(&self, prior: &ResourceState, config: Option<&Attributes>) -> Result<Plan> {
        let mut plan = Plan::new(self.resource_type, prior.id.clone());

        let Some(config) = config else {
            if prior.exists() {
                plan.verdict = Verdict::Destroy;
            }
            tracing::debug!(resource_type = %self.resource_type, id = %prior.id, verdict = %plan.verdict, "Planned");
            return Ok(plan);
        };

        let diags = self.schema.validate(config);
        if diags.has_errors() {
            return Err(CloudError::Validation(diags));
        }
        plan.warnings = diags.into_iter().collect();

        let effective = self.schema.apply_defaults(&self.schema.conform(config));

        if prior.is_tombstone() {
            for (name, attr) in self.schema.iter() {
                let path = AttributePath::root(name);
                let new = match effective.get(name) {
                    Some(v) => v.clone(),
                    None if attr.presence.is_computed() => Value::Unknown,
                    None => continue,
                };
                plan.diffs.push(AttributeDiff {
                    path,
                    old: Value::Null,
                    new,
                    kind: DiffKind::Add,
                    sensitive: attr.sensitive,
                });
            }
            plan.verdict = Verdict::Create;
            plan.config = Some(effective);
            tracing::debug!(resource_type = %self.resource_type, verdict = %plan.verdict, diffs = plan.diffs.len(), "Planned");
            return Ok(plan);
        }

        // persisted state loses the list/set distinction
        let recorded = self.schema.conform(&prior.attributes);

        let mut diffs = Vec::new();
        for (name, attr) in self.schema.iter() {
            let old = recorded.get(name).unwrap_or(&Value::Null);
            let new = effective.get(name).unwrap_or(&Value::Null);
            diff_attribute(
                &AttributePath::root(name),
                attr,
                old,
                new,
                &effective,
                attr.sensitive,
                &mut diffs,
            );
        }

        plan.verdict = if diffs.iter().any(|d| d.kind == DiffKind::ForceNew) {
            Verdict::ForceNew
        } else if diffs.is_empty() && !prior.is_partial() {
            Verdict::NoOp
        } else {
            Verdict::Update
        };
        if plan.verdict == Verdict::Update && diffs.is_empty() {
            tracing::debug!(id = %prior.id, "Prior apply was partial, finishing it");
        }
        plan.diffs = diffs;
        plan.config = Some(effective);

        tracing::debug!(
            resource_type = %self.resource_type,
            id = %prior.id,
            verdict = %plan.verdict,
            diffs = plan.diffs.len(),
            "Planned"
        );
        Ok(plan)
    }
}

fn diff_attribute(
    path: &AttributePath,
    attr: &Attribute,
    old: &Value,
    new: &Value,
    config: &Attributes,
    sensitive: bool,
    out: &mut Vec<AttributeDiff>,
) {
    // server owned
    if attr.presence == Presence::Computed {
        return;
    }
    if attr.presence == Presence::OptionalComputed && new.is_null() {
        return;
    }
    if old == new {
        return;
    }
    if !new.is_unknown() && attr.suppresses(path, old, new, config) {
        return;
    }

    if let Some(nested) = attr.ty.nested_schema() {
        let before = out.len();
        let descended = match (old, new) {
            (Value::List(a), Value::List(b)) if a.len() == b.len() => {
                for (i, (x, y)) in a.iter().zip(b).enumerate() {
                    diff_block(&path.index(i), nested, x, y, config, sensitive, out);
                }
                true
            }
            (Value::Map(_), Value::Map(_)) => {
                diff_block(path, nested, old, new, config, sensitive, out);
                true
            }
            _ => false,
        };
        if descended {
            if attr.force_new {
                for d in &mut out[before..] {
                    d.kind = DiffKind::ForceNew;
                }
            }
            return;
        }
    }

    let replaces = attr.force_new
        || attr
            .ty
            .nested_schema()
            .is_some_and(|nested| nested.iter().any(|(_, a)| a.force_new));
    let kind = if replaces {
        DiffKind::ForceNew
    } else if old.is_null() {
        DiffKind::Add
    } else if new.is_null() {
        DiffKind::Remove
    } else {
        DiffKind::Change
    };
    out.push(AttributeDiff {
        path: path.clone(),
        old: old.clone(),
        new: new.clone(),
        kind,
        sensitive,
    });
}

fn diff_block(
    path: &AttributePath,
    schema: &Schema,
    old: &Value,
    new: &Value,
    config: &Attributes,
    sensitive: bool,
    out: &mut Vec<AttributeDiff>,
) {
    let empty = Attributes::new();
    let old_block = old.as_map().unwrap_or(&empty);
    let new_block = new.as_map().unwrap_or(&empty);
    for (name, attr) in schema.iter() {
        diff_attribute(
            &path.attr(name),
            attr,
            old_block.get(name).unwrap_or(&Value::Null),
            new_block.get(name).unwrap_or(&Value::Null),
            config,
            sensitive || attr.sensitive,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrType, Attribute, Policy};
    use crate::suppress;
    use crate::value::map;

    fn schema() -> Schema {
        Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("zone", Attribute::optional_string().force_new())
            .attribute(
                "ttl_days",
                Attribute::optional_computed(AttrType::Int).default_value(7),
            )
            .attribute("status", Attribute::computed_string())
            .attribute(
                "password",
                Attribute::optional_string().sensitive(),
            )
            .attribute(
                "dns",
                Attribute::optional_string().suppress(suppress::trailing_dot()),
            )
            .attribute(
                "groups",
                Attribute::optional(AttrType::blocks(
                    Schema::new()
                        .attribute("flavor", Attribute::required_string().force_new())
                        .attribute("count", Attribute::optional_int()),
                )),
            )
            .policy(Policy::conflicts_with("password", ["dns"]))
    }

    fn config(pairs: &[(&str, Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn plan(prior: &ResourceState, cfg: Option<&Attributes>) -> Plan {
        let s = schema();
        Planner::new("test_resource", &s).plan(prior, cfg).unwrap()
    }

    #[test]
    fn test_create_from_tombstone() {
        let cfg = config(&[("name", "grp-A".into())]);
        let p = plan(&ResourceState::tombstone(), Some(&cfg));
        assert_eq!(p.verdict, Verdict::Create);
        assert_eq!(p.config.as_ref().unwrap()["ttl_days"], Value::Int(7));
        let status = p.diff(&AttributePath::root("status")).unwrap();
        assert_eq!(status.new, Value::Unknown);
    }

    #[test]
    fn test_no_op_when_state_matches() {
        let prior = ResourceState::new("g1")
            .with_attribute("name", "grp-A")
            .with_attribute("ttl_days", 7)
            .with_attribute("status", "ACTIVE");
        let cfg = config(&[("name", "grp-A".into())]);
        assert_eq!(plan(&prior, Some(&cfg)).verdict, Verdict::NoOp);
    }

    #[test]
    fn test_optional_computed_left_to_server() {
        let prior = ResourceState::new("g1")
            .with_attribute("name", "a")
            .with_attribute("ttl_days", 30);
        // config leaves ttl unset, the default applies and differs
        let cfg = config(&[("name", "a".into())]);
        let p = plan(&prior, Some(&cfg));
        assert_eq!(p.verdict, Verdict::Update);
        assert!(p.has_change("ttl_days"));
    }

    #[test]
    fn test_force_new_verdict() {
        let prior = ResourceState::new("i1")
            .with_attribute("name", "a")
            .with_attribute("zone", "az1")
            .with_attribute("ttl_days", 7);
        let cfg = config(&[("name", "b".into()), ("zone", "az2".into())]);
        let p = plan(&prior, Some(&cfg));
        assert_eq!(p.verdict, Verdict::ForceNew);
        assert_eq!(
            p.diff(&AttributePath::root("zone")).unwrap().kind,
            DiffKind::ForceNew
        );
        assert_eq!(
            p.diff(&AttributePath::root("name")).unwrap().kind,
            DiffKind::Change
        );
    }

    #[test]
    fn test_suppression_skips_equivalent_values() {
        let prior = ResourceState::new("i1")
            .with_attribute("name", "a")
            .with_attribute("ttl_days", 7)
            .with_attribute("dns", "lb.example.com.");
        let cfg = config(&[("name", "a".into()), ("dns", "lb.example.com".into())]);
        assert_eq!(plan(&prior, Some(&cfg)).verdict, Verdict::NoOp);
    }

    #[test]
    fn test_nested_block_diffs() {
        let prior = ResourceState::new("c1")
            .with_attribute("name", "a")
            .with_attribute("ttl_days", 7)
            .with_attribute(
                "groups",
                Value::List(vec![map([("flavor", Value::from("s2")), ("count", Value::Int(1))])]),
            );

        let scale = config(&[
            ("name", "a".into()),
            (
                "groups",
                Value::List(vec![map([("flavor", Value::from("s2")), ("count", Value::Int(3))])]),
            ),
        ]);
        let p = plan(&prior, Some(&scale));
        assert_eq!(p.verdict, Verdict::Update);
        assert!(p.diff(&AttributePath::parse("groups.0.count")).is_some());

        let reflavor = config(&[
            ("name", "a".into()),
            (
                "groups",
                Value::List(vec![map([("flavor", Value::from("s3")), ("count", Value::Int(1))])]),
            ),
        ]);
        assert_eq!(plan(&prior, Some(&reflavor)).verdict, Verdict::ForceNew);
    }

    #[test]
    fn test_destroy_and_absent() {
        let prior = ResourceState::new("i1");
        assert_eq!(plan(&prior, None).verdict, Verdict::Destroy);
        assert_eq!(plan(&ResourceState::tombstone(), None).verdict, Verdict::NoOp);
    }

    #[test]
    fn test_policy_violation_fails_plan() {
        let s = schema();
        let cfg = config(&[
            ("name", "a".into()),
            ("password", "p".into()),
            ("dns", "x".into()),
        ]);
        let err = Planner::new("t", &s)
            .plan(&ResourceState::tombstone(), Some(&cfg))
            .unwrap_err();
        assert!(matches!(err, CloudError::Validation(_)));
    }

    #[test]
    fn test_render_masks_sensitive_values() {
        let prior = ResourceState::new("i1")
            .with_attribute("name", "a")
            .with_attribute("ttl_days", 7)
            .with_attribute("password", "hunter2");
        let cfg = config(&[("name", "a".into()), ("password", "letmein".into())]);
        let p = plan(&prior, Some(&cfg));
        let text = p.render();
        assert!(text.contains("~ password: (sensitive value) -> (sensitive value)"));
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("letmein"));
    }

    #[test]
    fn test_promote_force_new() {
        let prior = ResourceState::new("i1")
            .with_attribute("name", "a")
            .with_attribute("ttl_days", 7);
        let cfg = config(&[("name", "b".into())]);
        let mut p = plan(&prior, Some(&cfg));
        assert_eq!(p.verdict, Verdict::Update);
        assert!(p.force_new("name"));
        assert_eq!(p.verdict, Verdict::ForceNew);
        assert!(!p.force_new("name"));
    }

    #[test]
    fn test_summary() {
        let mut a = Plan::new("t", "");
        a.verdict = Verdict::Create;
        let mut b = Plan::new("t", "x");
        b.verdict = Verdict::ForceNew;
        let c = Plan::new("t", "y");
        let summary = PlanSummary::of([&a, &b, &c]);
        assert_eq!(
            summary.to_string(),
            "1 to add, 0 to change, 1 to replace, 0 to destroy"
        );
        assert_eq!(summary.unchanged, 1);
    }

    #[test]
    fn test_reloaded_set_is_not_a_change() {
        let s = Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute(
                "zones",
                Attribute::required(AttrType::Set(Box::new(AttrType::String))).force_new(),
            );
        let zones = Value::Set(vec!["az2".into(), "az1".into()]);
        let live = ResourceState::new("lb-1")
            .with_attribute("name", "edge")
            .with_attribute("zones", zones.clone());
        let json = serde_json::to_string(&live).unwrap();
        let reloaded: ResourceState = serde_json::from_str(&json).unwrap();
        assert!(matches!(reloaded.get("zones"), Value::List(_)));

        let cfg = config(&[
            ("name", "edge".into()),
            ("zones", Value::Set(vec!["az1".into(), "az2".into()])),
        ]);
        let planner = Planner::new("test_resource", &s);
        assert_eq!(planner.plan(&live, Some(&cfg)).unwrap().verdict, Verdict::NoOp);
        assert_eq!(planner.plan(&reloaded, Some(&cfg)).unwrap().verdict, Verdict::NoOp);
    }

    #[test]
    fn test_partial_prior_plans_update() {
        let mut prior = ResourceState::new("g1")
            .with_attribute("name", "grp-A")
            .with_attribute("ttl_days", 7);
        prior.partial = Some(["name".to_string()].into());
        let cfg = config(&[("name", "grp-A".into())]);
        let p = plan(&prior, Some(&cfg));
        assert_eq!(p.verdict, Verdict::Update);
        assert!(p.diffs.is_empty());

        prior.partial = None;
        assert_eq!(plan(&prior, Some(&cfg)).verdict, Verdict::NoOp);
    }
}
