//! Composite identifiers
//!
//! `<part1>/<part2>[/<part3>...]`. Empty parts are invalid.

use crate::error::{CloudError, Result};
use std::collections::BTreeMap;

pub const SEPARATOR: char = '/';

/// Join parts with `/`.
pub fn build_id<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split `id` into exactly `names.len()` non-empty parts, keyed by name.
pub fn parse_id(id: &str, names: &[&str]) -> Result<BTreeMap<String, String>> {
    let parts: Vec<&str> = id.split(SEPARATOR).collect();
    if parts.len() != names.len() {
        return Err(CloudError::malformed_id(
            id,
            format!(
                "expected {} parts ({}) separated by '{}', got {}",
                names.len(),
                names.join(", "),
                SEPARATOR,
                parts.len()
            ),
        ));
    }
    if let Some(pos) = parts.iter().position(|p| p.is_empty()) {
        return Err(CloudError::malformed_id(
            id,
            format!("part '{}' is empty", names[pos]),
        ));
    }
    Ok(names
        .iter()
        .zip(parts)
        .map(|(name, part)| (name.to_string(), part.to_string()))
        .collect())
}

/// Split `id` into parts without naming them; at least `min` parts.
pub fn split_id(id: &str, min: usize) -> Result<Vec<&str>> {
    let parts: Vec<&str> = id.split(SEPARATOR).collect();
    if parts.len() < min || parts.iter().any(|p| p.is_empty()) {
        return Err(CloudError::malformed_id(
            id,
            format!("expected at least {} non-empty parts", min),
        ));
    }
    Ok(parts)
}
