//! Attribute paths
//!
//! A path addresses a value inside a resource's attribute tree, e.g.
//! `node_groups.0.root_volume_size` or `tags.env`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of an attribute path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathStep {
    /// Named attribute of a resource or nested block
    Attr(String),
    /// Position in a list or set
    Index(usize),
    /// Key of a map attribute
    Key(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributePath(Vec<PathStep>);

impl AttributePath {
    /// Path of a top-level attribute
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![PathStep::Attr(name.into())])
    }

    /// Parse the dotted form. Numeric segments become indices.
    pub fn parse(s: &str) -> Self {
        Self(
            s.split('.')
                .filter(|seg| !seg.is_empty())
                .map(|seg| match seg.parse::<usize>() {
                    Ok(i) => PathStep::Index(i),
                    Err(_) => PathStep::Attr(seg.to_string()),
                })
                .collect(),
        )
    }

    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.push(PathStep::Attr(name.into()))
    }

    pub fn index(&self, i: usize) -> Self {
        self.push(PathStep::Index(i))
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.push(PathStep::Key(key.into()))
    }

    fn push(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Name of the top-level attribute this path starts at.
    pub fn root_name(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathStep::Attr(name)) | Some(PathStep::Key(name)) => Some(name),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Path without its last step.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match step {
                PathStep::Attr(name) | PathStep::Key(name) => write!(f, "{}", name)?,
                PathStep::Index(idx) => write!(f, "{}", idx)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
