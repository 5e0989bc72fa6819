//! Import of existing upstream objects
//!
//! An importer turns a user-supplied identifier into a skeleton state. The
//! lifecycle then runs Read on it to populate the attributes.

use crate::error::{CloudError, Result};
use crate::id::{SEPARATOR, parse_id};
use crate::state::ResourceState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Importer {
    /// Resource type cannot be imported.
    #[default]
    Unsupported,

    /// The identifier is the resource ID.
    Passthrough,

    /// `<part1>/<part2>...`; each part is written to the attribute of the
    /// same position.
    Composite {
        parts: Vec<String>,
        /// Use the last part as the resource ID instead of the whole string.
        id_from_last_part: bool,
    },
}

impl Importer {
    pub fn passthrough() -> Self {
        Importer::Passthrough
    }

    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Importer::Composite {
            parts: parts.into_iter().map(Into::into).collect(),
            id_from_last_part: false,
        }
    }

    pub fn id_from_last_part(self) -> Self {
        match self {
            Importer::Composite { parts, .. } => Importer::Composite {
                parts,
                id_from_last_part: true,
            },
            other => other,
        }
    }

    pub fn is_supported(&self) -> bool {
        *self != Importer::Unsupported
    }

    /// Skeleton state for `id`.
    pub fn import(&self, resource_type: &str, id: &str) -> Result<ResourceState> {
        match self {
            Importer::Unsupported => Err(CloudError::InvalidConfig(format!(
                "resource type {} does not support import",
                resource_type
            ))),
            Importer::Passthrough => {
                if id.is_empty() {
                    return Err(CloudError::malformed_id(id, "identifier is empty"));
                }
                Ok(ResourceState::new(id))
            }
            Importer::Composite {
                parts,
                id_from_last_part,
            } => {
                let names: Vec<&str> = parts.iter().map(String::as_str).collect();
                let values = parse_id(id, &names)?;
                let resource_id = if *id_from_last_part {
                    id.rsplit(SEPARATOR).next().unwrap_or(id).to_string()
                } else {
                    id.to_string()
                };
                let mut state = ResourceState::new(resource_id);
                for (name, value) in values {
                    state.set_attribute(name, value);
                }
                Ok(state)
            }
        }
    }
}
