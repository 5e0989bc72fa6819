//! Standard attribute validators
//!
//! Each constructor returns a [`ValidateFn`] that inspects one conformed value
//! and reports diagnostics against the attribute's path. Null and unknown
//! values are never reported; presence is the schema's job.

use crate::diag::Diagnostics;
use crate::path::AttributePath;
use crate::schema::ValidateFn;
use crate::value::Value;
use regex::Regex;
use std::sync::Arc;

fn skip(value: &Value) -> bool {
    value.is_null() || value.is_unknown()
}

/// Integer within `[min, max]`.
pub fn int_between(min: i64, max: i64) -> ValidateFn {
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if skip(value) {
            return diags;
        }
        match value.as_i64() {
            Some(i) if i < min || i > max => diags.error(
                Some(path),
                format!("expected to be in the range ({} - {}), got {}", min, max, i),
            ),
            Some(_) => {}
            None => diags.error(Some(path), format!("expected int, got {}", value.type_name())),
        }
        diags
    })
}

/// Integer from a fixed set.
pub fn int_in_slice(allowed: &[i64]) -> ValidateFn {
    let allowed = allowed.to_vec();
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if let Some(i) = value.as_i64()
            && !allowed.contains(&i)
        {
            diags.error(
                Some(path),
                format!("expected to be one of {:?}, got {}", allowed, i),
            );
        }
        diags
    })
}

/// String length in characters within `[min, max]`.
pub fn string_len_between(min: usize, max: usize) -> ValidateFn {
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if len < min || len > max {
                diags.error(
                    Some(path),
                    format!(
                        "expected length to be in the range ({} - {}), got {}",
                        min, max, len
                    ),
                );
            }
        }
        diags
    })
}

/// Non-empty string.
pub fn string_not_empty() -> ValidateFn {
    Arc::new(|value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if value.as_str().is_some_and(str::is_empty) {
            diags.error(Some(path), "expected a non-empty string");
        }
        diags
    })
}

/// String from a fixed set, optionally ignoring case.
pub fn string_in_slice(allowed: &[&str], ignore_case: bool) -> ValidateFn {
    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if let Some(s) = value.as_str() {
            let ok = allowed.iter().any(|a| {
                if ignore_case {
                    a.eq_ignore_ascii_case(s)
                } else {
                    a == s
                }
            });
            if !ok {
                diags.error(
                    Some(path),
                    format!("expected to be one of [{}], got {}", allowed.join(", "), s),
                );
            }
        }
        diags
    })
}

/// String matching `pattern`. An invalid pattern is a programming error in
/// the resource definition and is reported on every value.
pub fn string_matches(pattern: &str, message: &str) -> ValidateFn {
    let compiled = Regex::new(pattern).map_err(|e| e.to_string());
    let message = message.to_string();
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        let Some(s) = value.as_str() else {
            return diags;
        };
        match &compiled {
            Ok(re) if !re.is_match(s) => diags.error(Some(path), message.clone()),
            Ok(_) => {}
            Err(e) => diags.error(Some(path), format!("invalid validation pattern: {}", e)),
        }
        diags
    })
}

/// Apply `inner` to every element of a list or set, or every value of a map.
pub fn each(inner: ValidateFn) -> ValidateFn {
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        match value {
            Value::List(items) | Value::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    diags.extend(inner(item, &path.index(i)));
                }
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    diags.extend(inner(v, &path.key(k)));
                }
            }
            other => diags.extend(inner(other, path)),
        }
        diags
    })
}

/// Warn, without failing, when the value is set at all.
pub fn warn_when_set(message: &str) -> ValidateFn {
    let message = message.to_string();
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        if !skip(value) {
            diags.warning(Some(path), message.clone());
        }
        diags
    })
}

/// Keys and values of a tag map against the given patterns.
pub fn tags(key_pattern: &str, value_pattern: &str) -> ValidateFn {
    let keys = Regex::new(key_pattern).map_err(|e| e.to_string());
    let values = Regex::new(value_pattern).map_err(|e| e.to_string());
    Arc::new(move |value: &Value, path: &AttributePath| {
        let mut diags = Diagnostics::new();
        let Some(entries) = value.as_map() else {
            return diags;
        };
        let (Ok(keys), Ok(values)) = (&keys, &values) else {
            diags.error(Some(path), "invalid tag validation pattern");
            return diags;
        };
        for (k, v) in entries {
            if !keys.is_match(k) {
                diags.error(Some(&path.key(k)), format!("invalid tag key {:?}", k));
            }
            match v.as_str() {
                Some(s) if !values.is_match(s) => {
                    diags.error(Some(&path.key(k)), format!("invalid tag value {:?}", s))
                }
                Some(_) => {}
                None if v.is_unknown() => {}
                None => diags.error(Some(&path.key(k)), "tag values must be strings"),
            }
        }
        diags
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(v: &ValidateFn, value: impl Into<Value>) -> Diagnostics {
        v(&value.into(), &AttributePath::root("attr"))
    }

    #[test]
    fn test_int_between() {
        let v = int_between(4, 32768);
        assert!(check(&v, 4).is_empty());
        assert!(check(&v, 32768).is_empty());
        assert!(check(&v, 3).has_errors());
        assert!(check(&v, Value::Null).is_empty());
        assert!(check(&v, Value::Unknown).is_empty());
    }

    #[test]
    fn test_string_in_slice() {
        let v = string_in_slice(&["SAS", "SSD"], true);
        assert!(check(&v, "ssd").is_empty());
        assert!(check(&v, "GPSSD").has_errors());

        let strict = string_in_slice(&["SAS", "SSD"], false);
        assert!(check(&strict, "ssd").has_errors());
    }

    #[test]
    fn test_string_matches() {
        let v = string_matches("^[a-z][a-z0-9-]{0,63}$", "must be lowercase");
        assert!(check(&v, "grp-a").is_empty());
        let diags = check(&v, "Grp");
        assert!(diags.to_string().contains("must be lowercase"));

        let broken = string_matches("(", "x");
        assert!(check(&broken, "a").has_errors());
    }

    #[test]
    fn test_each() {
        let v = each(string_len_between(1, 3));
        let diags = check(&v, Value::List(vec!["ab".into(), "abcd".into()]));
        assert_eq!(diags.len(), 1);
        assert!(diags.to_string().contains("attr.1"));
    }

    #[test]
    fn test_tags() {
        let v = tags(r"^[A-Za-z0-9_.\-]{1,36}$", r"^[A-Za-z0-9_.\-]{0,43}$");
        let ok = crate::value::map([("env", "prod"), ("team", "")]);
        assert!(check(&v, ok).is_empty());
        let bad = crate::value::map([("bad key", "x")]);
        assert!(check(&v, bad).has_errors());
    }

    #[test]
    fn test_warn_when_set() {
        let v = warn_when_set("use tags instead");
        let diags = check(&v, "x");
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);
    }
}
