//! Diff suppression predicates
//!
//! Upstream APIs often echo values back in a different but equivalent form.
//! These predicates tell the planner to treat such pairs as equal.

use crate::path::AttributePath;
use crate::schema::SuppressFn;
use crate::value::{Attributes, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

fn strings<'a>(old: &'a Value, new: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((old.as_str()?, new.as_str()?))
}

fn wrap(f: fn(&str, &str) -> bool) -> SuppressFn {
    Arc::new(move |_: &AttributePath, old: &Value, new: &Value, _: &Attributes| {
        strings(old, new).is_some_and(|(a, b)| f(a, b))
    })
}

pub fn case_insensitive_eq(old: &str, new: &str) -> bool {
    old.to_lowercase() == new.to_lowercase()
}

/// `example.com.` equals `example.com`
pub fn trailing_dot_eq(old: &str, new: &str) -> bool {
    old.trim_end_matches('.') == new.trim_end_matches('.')
}

/// Equal once trailing line breaks are removed from both sides
pub fn stripped_newline_eq(old: &str, new: &str) -> bool {
    let strip = |s: &str| s.trim_end_matches(['\n', '\r']).to_string();
    strip(old) == strip(new)
}

/// `a,b` equals `b, a`
pub fn comma_set_eq(old: &str, new: &str) -> bool {
    let parts = |s: &str| -> BTreeSet<String> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };
    parts(old) == parts(new)
}

/// Hex SHA-256 of the empty input.
pub fn sha256_of_empty() -> String {
    hex::encode(Sha256::digest(b""))
}

/// Empty string equals the canonical digest of empty content.
pub fn empty_sha_eq(old: &str, new: &str) -> bool {
    let canonical = |s: &str| {
        if s.is_empty() {
            sha256_of_empty()
        } else {
            s.to_ascii_lowercase()
        }
    };
    canonical(old) == canonical(new)
}

fn decode_utf8(s: &str) -> Option<String> {
    let bytes = STANDARD.decode(s.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn base64_forms(s: &str) -> Vec<String> {
    let mut forms = vec![s.to_string()];
    if let Some(once) = decode_utf8(s) {
        if let Some(twice) = decode_utf8(&once) {
            forms.push(twice);
        }
        forms.push(once);
    }
    forms
}

/// Equal when one side is the other base64-encoded once or twice; the server
/// may return the payload decoded while the user configured it encoded.
pub fn base64_eq(old: &str, new: &str) -> bool {
    if old == new {
        return true;
    }
    let old_forms = base64_forms(old);
    base64_forms(new).iter().any(|f| old_forms.contains(f))
}

/// `2.7` equals `2.7.1`: one version is a dot-segment prefix of the other.
pub fn semver_prefix_eq(old: &str, new: &str) -> bool {
    let segments = |s: &str| -> Vec<String> {
        s.trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .map(str::to_string)
            .collect()
    };
    let (a, b) = (segments(old), segments(new));
    if a.is_empty() || b.is_empty() || a[0].is_empty() || b[0].is_empty() {
        return old == new;
    }
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

pub fn case_insensitive() -> SuppressFn {
    wrap(case_insensitive_eq)
}

pub fn trailing_dot() -> SuppressFn {
    wrap(trailing_dot_eq)
}

pub fn stripped_newline() -> SuppressFn {
    wrap(stripped_newline_eq)
}

pub fn comma_set() -> SuppressFn {
    wrap(comma_set_eq)
}

pub fn empty_sha() -> SuppressFn {
    wrap(empty_sha_eq)
}

pub fn base64_encoded() -> SuppressFn {
    wrap(base64_eq)
}

pub fn semver_prefix() -> SuppressFn {
    wrap(semver_prefix_eq)
}

/// Suppress any change while `attr` is unset in the configuration, e.g. a
/// field that only matters when its switch is on.
pub fn unless_set(attr: &'static str) -> SuppressFn {
    Arc::new(move |_: &AttributePath, _: &Value, _: &Value, config: &Attributes| {
        config.get(attr).is_none_or(Value::is_null)
    })
}
