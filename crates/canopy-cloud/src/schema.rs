//! Schema registry
//!
//! A [`Schema`] is the declarative attribute tree of one resource type. Each
//! [`Attribute`] carries its semantic type, whether the user or the server owns
//! it, force-new, sensitivity, defaults, validators and diff suppression.
//! Cross-attribute rules (`AtLeastOneOf`, `RequiredWith`, `ConflictsWith`) are
//! schema-level [`Policy`]s checked at plan time.

use crate::diag::Diagnostics;
use crate::path::{AttributePath, PathStep};
use crate::value::{Attributes, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Semantic attribute type
#[derive(Debug, Clone)]
pub enum AttrType {
    String,
    Int,
    Bool,
    Float,
    List(Box<AttrType>),
    Set(Box<AttrType>),
    /// String keys to values of the element type
    Map(Box<AttrType>),
    /// Nested block with its own attribute tree
    Block(Arc<Schema>),
}

impl AttrType {
    pub fn list(elem: AttrType) -> Self {
        AttrType::List(Box::new(elem))
    }

    pub fn set(elem: AttrType) -> Self {
        AttrType::Set(Box::new(elem))
    }

    pub fn map(elem: AttrType) -> Self {
        AttrType::Map(Box::new(elem))
    }

    /// List of nested blocks
    pub fn blocks(schema: Schema) -> Self {
        AttrType::List(Box::new(AttrType::Block(Arc::new(schema))))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, AttrType::List(_) | AttrType::Set(_) | AttrType::Map(_))
    }

    /// Nested schema of a block or of a list/set of blocks.
    pub fn nested_schema(&self) -> Option<&Schema> {
        match self {
            AttrType::Block(schema) => Some(schema),
            AttrType::List(elem) | AttrType::Set(elem) => elem.nested_schema(),
            _ => None,
        }
    }

    fn name(&self) -> String {
        match self {
            AttrType::String => "string".into(),
            AttrType::Int => "int".into(),
            AttrType::Bool => "bool".into(),
            AttrType::Float => "float".into(),
            AttrType::List(e) => format!("list({})", e.name()),
            AttrType::Set(e) => format!("set({})", e.name()),
            AttrType::Map(e) => format!("map({})", e.name()),
            AttrType::Block(_) => "block".into(),
        }
    }

    /// Check `value` against this type and return its normalized form.
    ///
    /// Integer-to-string conversion only happens with `int_to_string`;
    /// integers widen to floats. Null and unknown pass through.
    pub fn conform(&self, value: &Value, int_to_string: bool) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, Value::Unknown) => Ok(Value::Unknown),
            (AttrType::String, Value::String(_)) => Ok(value.clone()),
            (AttrType::String, Value::Int(i)) if int_to_string => Ok(Value::String(i.to_string())),
            (AttrType::Int, Value::Int(_)) => Ok(value.clone()),
            (AttrType::Float, Value::Float(_)) => Ok(value.clone()),
            (AttrType::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (AttrType::Bool, Value::Bool(_)) => Ok(value.clone()),
            (AttrType::List(elem), Value::List(items) | Value::Set(items)) => items
                .iter()
                .map(|v| elem.conform(v, int_to_string))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (AttrType::Set(elem), Value::List(items) | Value::Set(items)) => items
                .iter()
                .map(|v| elem.conform(v, int_to_string))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Set),
            (AttrType::Map(elem), Value::Map(entries)) => entries
                .iter()
                .map(|(k, v)| elem.conform(v, int_to_string).map(|v| (k.clone(), v)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map),
            (AttrType::Block(schema), Value::Map(entries)) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let attr = schema
                        .get(k)
                        .ok_or_else(|| format!("unsupported block attribute '{}'", k))?;
                    out.insert(k.clone(), attr.ty.conform(v, attr.int_to_string)?);
                }
                Ok(Value::Map(out))
            }
            (ty, other) => Err(format!(
                "expected {}, got {}",
                ty.name(),
                other.type_name()
            )),
        }
    }
}

/// Who owns an attribute's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be set by the user
    Required,
    /// May be set by the user
    Optional,
    /// Only ever set by the server
    Computed,
    /// Set by the user, or by the server when the user leaves it unset
    OptionalComputed,
}

impl Presence {
    pub fn is_computed(self) -> bool {
        matches!(self, Presence::Computed | Presence::OptionalComputed)
    }

    pub fn user_settable(self) -> bool {
        !matches!(self, Presence::Computed)
    }
}

/// Validator over a single value: zero or more warnings/errors
pub type ValidateFn = Arc<dyn Fn(&Value, &AttributePath) -> Diagnostics + Send + Sync>;

/// "Treat as equal" predicate: `(path, old, new, config)`
pub type SuppressFn =
    Arc<dyn Fn(&AttributePath, &Value, &Value, &Attributes) -> bool + Send + Sync>;

/// Default for an absent optional attribute
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Func(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Func(f) => f(),
        }
    }
}

/// Attribute descriptor
#[derive(Clone)]
pub struct Attribute {
    pub ty: AttrType,
    pub presence: Presence,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<DefaultValue>,
    pub validators: Vec<ValidateFn>,
    pub diff_suppress: Option<SuppressFn>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    /// Accept integers for a string attribute
    pub int_to_string: bool,
    pub description: String,
    pub deprecated: Option<String>,
}

impl Attribute {
    pub fn new(ty: AttrType, presence: Presence) -> Self {
        Self {
            ty,
            presence,
            force_new: false,
            sensitive: false,
            default: None,
            validators: Vec::new(),
            diff_suppress: None,
            min_items: None,
            max_items: None,
            int_to_string: false,
            description: String::new(),
            deprecated: None,
        }
    }

    pub fn required(ty: AttrType) -> Self {
        Self::new(ty, Presence::Required)
    }

    pub fn optional(ty: AttrType) -> Self {
        Self::new(ty, Presence::Optional)
    }

    pub fn computed(ty: AttrType) -> Self {
        Self::new(ty, Presence::Computed)
    }

    pub fn optional_computed(ty: AttrType) -> Self {
        Self::new(ty, Presence::OptionalComputed)
    }

    pub fn required_string() -> Self {
        Self::required(AttrType::String)
    }

    pub fn optional_string() -> Self {
        Self::optional(AttrType::String)
    }

    pub fn computed_string() -> Self {
        Self::computed(AttrType::String)
    }

    pub fn required_int() -> Self {
        Self::required(AttrType::Int)
    }

    pub fn optional_int() -> Self {
        Self::optional(AttrType::Int)
    }

    pub fn optional_bool() -> Self {
        Self::optional(AttrType::Bool)
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_func(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Func(Arc::new(f)));
        self
    }

    pub fn validate(mut self, validator: ValidateFn) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn suppress(mut self, f: SuppressFn) -> Self {
        self.diff_suppress = Some(f);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn int_to_string(mut self) -> Self {
        self.int_to_string = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    /// Whether `old` and `new` should be treated as equal for this attribute.
    pub fn suppresses(
        &self,
        path: &AttributePath,
        old: &Value,
        new: &Value,
        config: &Attributes,
    ) -> bool {
        self.diff_suppress
            .as_ref()
            .is_some_and(|f| f(path, old, new, config))
    }

    fn validate_value(&self, path: &AttributePath, value: &Value, diags: &mut Diagnostics) {
        if value.is_null() {
            if self.presence == Presence::Required {
                diags.error(Some(path), "required attribute is not set");
            }
            return;
        }

        if !self.presence.user_settable() {
            diags.error(
                Some(path),
                "attribute is computed by the server and cannot be configured",
            );
            return;
        }

        if let Some(message) = &self.deprecated {
            diags.warning(Some(path), format!("attribute is deprecated: {}", message));
        }

        if value.is_unknown() {
            return;
        }

        let conformed = match self.ty.conform(value, self.int_to_string) {
            Ok(v) => v,
            Err(e) => {
                diags.error(Some(path), e);
                return;
            }
        };

        if let Some(items) = conformed.as_items() {
            if let Some(min) = self.min_items
                && items.len() < min
            {
                diags.error(
                    Some(path),
                    format!("at least {} item(s) required, got {}", min, items.len()),
                );
            }
            if let Some(max) = self.max_items
                && items.len() > max
            {
                diags.error(
                    Some(path),
                    format!("at most {} item(s) allowed, got {}", max, items.len()),
                );
            }
        }

        for validator in &self.validators {
            diags.extend(validator(&conformed, path));
        }

        if let Some(nested) = self.ty.nested_schema() {
            match &conformed {
                Value::Map(block) => nested.validate_at(path, block, diags),
                Value::List(items) | Value::Set(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Map(block) = item {
                            nested.validate_at(&path.index(i), block, diags);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("ty", &self.ty)
            .field("presence", &self.presence)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("has_default", &self.default.is_some())
            .field("validators", &self.validators.len())
            .field("has_diff_suppress", &self.diff_suppress.is_some())
            .field("max_items", &self.max_items)
            .finish()
    }
}

/// Cross-attribute rule enforced at plan time
#[derive(Debug, Clone)]
pub enum Policy {
    /// At least one of the paths must be set
    AtLeastOneOf(Vec<AttributePath>),
    /// When `path` is set, every path in `with` must be set too
    RequiredWith {
        path: AttributePath,
        with: Vec<AttributePath>,
    },
    /// When `path` is set, none of `with` may be set
    ConflictsWith {
        path: AttributePath,
        with: Vec<AttributePath>,
    },
}

impl Policy {
    pub fn at_least_one_of<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Policy::AtLeastOneOf(paths.into_iter().map(|p| AttributePath::parse(p.as_ref())).collect())
    }

    pub fn required_with<I, S>(path: &str, with: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Policy::RequiredWith {
            path: AttributePath::parse(path),
            with: with.into_iter().map(|p| AttributePath::parse(p.as_ref())).collect(),
        }
    }

    pub fn conflicts_with<I, S>(path: &str, with: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Policy::ConflictsWith {
            path: AttributePath::parse(path),
            with: with.into_iter().map(|p| AttributePath::parse(p.as_ref())).collect(),
        }
    }

    fn check(&self, config: &Attributes, diags: &mut Diagnostics) {
        let is_set = |p: &AttributePath| lookup(config, p).is_some_and(|v| !v.is_null());
        let names = |paths: &[AttributePath]| {
            paths
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self {
            Policy::AtLeastOneOf(paths) => {
                if !paths.iter().any(is_set) {
                    diags.error(None, format!("one of [{}] must be set", names(paths)));
                }
            }
            Policy::RequiredWith { path, with } => {
                if is_set(path) {
                    let missing: Vec<_> = with.iter().filter(|p| !is_set(p)).cloned().collect();
                    if !missing.is_empty() {
                        diags.error(
                            Some(path),
                            format!("requires [{}] to be set", names(&missing)),
                        );
                    }
                }
            }
            Policy::ConflictsWith { path, with } => {
                if is_set(path) {
                    let conflicting: Vec<_> = with.iter().filter(|p| is_set(p)).cloned().collect();
                    if !conflicting.is_empty() {
                        diags.error(
                            Some(path),
                            format!("conflicts with [{}]", names(&conflicting)),
                        );
                    }
                }
            }
        }
    }
}

/// Resolve `path` against a top-level attribute map.
pub fn lookup<'a>(attrs: &'a Attributes, path: &AttributePath) -> Option<&'a Value> {
    let (first, rest) = path.steps().split_first()?;
    let root = match first {
        PathStep::Attr(name) | PathStep::Key(name) => attrs.get(name)?,
        PathStep::Index(_) => return None,
    };
    let mut current = root;
    for step in rest {
        current = match (step, current) {
            (PathStep::Index(i), Value::List(items) | Value::Set(items)) => items.get(*i)?,
            (PathStep::Attr(k) | PathStep::Key(k), Value::Map(map)) => map.get(k)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Attribute tree of a resource type or nested block
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: BTreeMap<String, Attribute>,
    policies: Vec<Policy>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Descriptor addressed by `path`, descending through nested blocks.
    pub fn descriptor(&self, path: &AttributePath) -> Option<&Attribute> {
        let mut schema = self;
        let mut found: Option<&Attribute> = None;
        for step in path.steps() {
            match step {
                PathStep::Attr(name) => {
                    if let Some(attr) = found {
                        // a named step below a map attribute is a key, not a field
                        if matches!(attr.ty, AttrType::Map(_)) {
                            continue;
                        }
                        schema = attr.ty.nested_schema()?;
                    }
                    found = Some(schema.get(name)?);
                }
                PathStep::Index(_) | PathStep::Key(_) => {}
            }
        }
        found
    }

    /// Whether the value at `path` (or any attribute containing it) is sensitive.
    pub fn is_sensitive(&self, path: &AttributePath) -> bool {
        let mut schema = self;
        for step in path.steps() {
            if let PathStep::Attr(name) = step {
                let Some(attr) = schema.get(name) else {
                    return false;
                };
                if attr.sensitive {
                    return true;
                }
                match attr.ty.nested_schema() {
                    Some(nested) => schema = nested,
                    None => return false,
                }
            }
        }
        false
    }

    /// Effective configuration: defaults applied to absent optional attributes,
    /// recursively inside nested blocks.
    pub fn apply_defaults(&self, config: &Attributes) -> Attributes {
        let mut out = Attributes::new();
        for (name, attr) in &self.attributes {
            let value = match config.get(name) {
                Some(v) if !v.is_null() => attr.apply_nested_defaults(v),
                _ => match (&attr.default, attr.presence) {
                    (Some(default), Presence::Optional | Presence::OptionalComputed) => {
                        default.resolve()
                    }
                    _ => Value::Null,
                },
            };
            if !value.is_null() {
                out.insert(name.clone(), value);
            }
        }
        // attributes unknown to the schema are reported by validation
        for (name, value) in config {
            if !self.attributes.contains_key(name) {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }

    /// Normalize types (e.g. list vs set, declared int-to-string coercion).
    /// Values that fail to conform are left as given; validation reports them.
    pub fn conform(&self, config: &Attributes) -> Attributes {
        config
            .iter()
            .map(|(name, value)| {
                let conformed = self
                    .get(name)
                    .and_then(|attr| attr.ty.conform(value, attr.int_to_string).ok())
                    .unwrap_or_else(|| value.clone());
                (name.clone(), conformed)
            })
            .collect()
    }

    /// Validate a full configuration: types, presence, item counts,
    /// attribute validators and cross-attribute policies.
    pub fn validate(&self, config: &Attributes) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate_at(&AttributePath::default(), config, &mut diags);
        diags
    }

    fn validate_at(&self, base: &AttributePath, config: &Attributes, diags: &mut Diagnostics) {
        for name in config.keys() {
            if !self.attributes.contains_key(name) {
                diags.error(Some(&base.attr(name)), "unsupported attribute");
            }
        }

        for (name, attr) in &self.attributes {
            let path = base.attr(name);
            let value = config.get(name).unwrap_or(&Value::Null);
            attr.validate_value(&path, value, diags);
        }

        if base.is_empty() {
            for policy in &self.policies {
                policy.check(config, diags);
            }
        }
    }
}

impl Attribute {
    fn apply_nested_defaults(&self, value: &Value) -> Value {
        let Some(nested) = self.ty.nested_schema() else {
            return value.clone();
        };
        match value {
            Value::Map(block) => Value::Map(nested.apply_defaults(block)),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Map(block) => Value::Map(nested.apply_defaults(block)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Set(items) => Value::Set(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Map(block) => Value::Map(nested.apply_defaults(block)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation;
    use crate::value::map;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn group_schema() -> Schema {
        Schema::new()
            .attribute("name", Attribute::required_string().force_new())
            .attribute(
                "ttl_days",
                Attribute::optional_computed(AttrType::Int)
                    .default_value(7)
                    .validate(validation::int_between(1, 365)),
            )
            .attribute("id_hint", Attribute::computed_string())
            .attribute("port", Attribute::optional_string().int_to_string())
            .attribute(
                "volumes",
                Attribute::optional(AttrType::blocks(
                    Schema::new()
                        .attribute("type", Attribute::required_string())
                        .attribute("size", Attribute::optional_int().default_value(40)),
                ))
                .max_items(2),
            )
    }

    #[test]
    fn test_required_missing() {
        let diags = group_schema().validate(&Attributes::new());
        assert!(diags.has_errors());
        assert!(diags.to_string().contains("name: required"));
    }

    #[test]
    fn test_computed_cannot_be_set() {
        let diags = group_schema().validate(&attrs(&[
            ("name", "g".into()),
            ("id_hint", "x".into()),
        ]));
        assert!(diags.to_string().contains("id_hint: attribute is computed"));
    }

    #[test]
    fn test_type_mismatch_and_coercion() {
        let schema = group_schema();
        let diags = schema.validate(&attrs(&[("name", 5.into())]));
        assert!(diags.to_string().contains("expected string, got int"));

        // port declares int-to-string
        let diags = schema.validate(&attrs(&[("name", "g".into()), ("port", 8080.into())]));
        assert!(!diags.has_errors(), "{}", diags);
        let conformed = schema.conform(&attrs(&[("port", 8080.into())]));
        assert_eq!(conformed["port"], Value::from("8080"));
    }

    #[test]
    fn test_validators_and_max_items() {
        let schema = group_schema();
        let diags = schema.validate(&attrs(&[
            ("name", "g".into()),
            ("ttl_days", 0.into()),
            (
                "volumes",
                Value::List(vec![
                    map([("type", "SAS")]),
                    map([("type", "SSD")]),
                    map([("type", "GPSSD")]),
                ]),
            ),
        ]));
        let text = diags.to_string();
        assert!(text.contains("ttl_days"));
        assert!(text.contains("at most 2 item(s)"));
    }

    #[test]
    fn test_nested_required() {
        let diags = group_schema().validate(&attrs(&[
            ("name", "g".into()),
            ("volumes", Value::List(vec![map([("size", 10)])])),
        ]));
        assert!(diags.to_string().contains("volumes.0.type: required"));
    }

    #[test]
    fn test_unknown_skips_checks() {
        let diags = group_schema().validate(&attrs(&[("name", Value::Unknown)]));
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_apply_defaults() {
        let schema = group_schema();
        let effective = schema.apply_defaults(&attrs(&[
            ("name", "g".into()),
            ("volumes", Value::List(vec![map([("type", "SAS")])])),
        ]));
        assert_eq!(effective["ttl_days"], Value::Int(7));
        assert_eq!(
            effective["volumes"],
            Value::List(vec![map([("type", Value::from("SAS")), ("size", Value::Int(40))])])
        );
        assert!(!effective.contains_key("id_hint"));
    }

    #[test]
    fn test_policies() {
        let schema = Schema::new()
            .attribute("a", Attribute::optional_string())
            .attribute("b", Attribute::optional_string())
            .attribute("c", Attribute::optional_string())
            .policy(Policy::at_least_one_of(["a", "b"]))
            .policy(Policy::required_with("a", ["c"]))
            .policy(Policy::conflicts_with("b", ["c"]));

        let diags = schema.validate(&Attributes::new());
        assert!(diags.to_string().contains("one of [a, b] must be set"));

        let diags = schema.validate(&attrs(&[("a", "x".into())]));
        assert!(diags.to_string().contains("requires [c]"));

        let diags = schema.validate(&attrs(&[("b", "x".into()), ("c", "y".into())]));
        assert!(diags.to_string().contains("conflicts with [c]"));

        let diags = schema.validate(&attrs(&[("a", "x".into()), ("c", "y".into())]));
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_descriptor_and_sensitivity() {
        let schema = Schema::new()
            .attribute("password", Attribute::optional_string().sensitive())
            .attribute(
                "nodes",
                Attribute::optional(AttrType::blocks(
                    Schema::new().attribute("secret", Attribute::optional_string().sensitive()),
                )),
            );
        assert!(schema.is_sensitive(&AttributePath::parse("password")));
        assert!(schema.is_sensitive(&AttributePath::parse("nodes.0.secret")));
        assert!(!schema.is_sensitive(&AttributePath::parse("nodes")));
        assert!(schema.descriptor(&AttributePath::parse("nodes.0.secret")).is_some());
        assert!(schema.descriptor(&AttributePath::parse("nodes.0.missing")).is_none());
    }

    #[test]
    fn test_unsupported_attribute() {
        let diags = group_schema().validate(&attrs(&[("name", "g".into()), ("bogus", 1.into())]));
        assert!(diags.to_string().contains("bogus: unsupported attribute"));
    }
}
