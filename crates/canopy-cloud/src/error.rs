//! Engine error types
//!
//! Upstream failures arrive as [`ApiError`]s carrying the HTTP status and an
//! optional vendor code. Whether a failure is retryable, means "not found" or
//! is fatal is decided by [`crate::classify`], never by handlers.

use crate::diag::Diagnostics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Typed error returned by the upstream SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,

    /// Vendor error code, when the body carried one
    pub code: Option<String>,

    /// Human-readable message from the upstream
    pub message: String,

    /// Upstream request identifier for support tickets
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id: {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Closed error taxonomy surfaced to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Retryable,
    Invalid,
    Unauthorized,
    Fatal,
    Timeout,
    Cancelled,
    Validation,
    MultiError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Retryable => write!(f, "retryable"),
            ErrorKind::Invalid => write!(f, "invalid"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::MultiError => write!(f, "multi-error"),
        }
    }
}

/// Lifecycle operation an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Plan,
    CustomDiff,
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Plan => write!(f, "plan"),
            Operation::CustomDiff => write!(f, "custom diff"),
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Import => write!(f, "import"),
        }
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {elapsed:?} waiting for {waiting_for}; last observed state: {last_state}")]
    Timeout {
        waiting_for: String,
        elapsed: Duration,
        last_state: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation failed:\n{0}")]
    Validation(Diagnostics),

    #[error(transparent)]
    Multi(MultiError),

    #[error("Unexpected state '{state}' while waiting for {waiting_for}, expected one of: {expected}")]
    UnexpectedState {
        waiting_for: String,
        state: String,
        expected: String,
    },

    #[error("Malformed identifier '{id}': {reason}")]
    MalformedId { id: String, reason: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} {resource}: {source}")]
    Operation {
        operation: Operation,
        resource: String,
        source: Box<CloudError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Taxonomy kind according to the default classifier.
    pub fn kind(&self) -> ErrorKind {
        crate::classify::classify(self)
    }

    /// Attach the operation and resource the error happened in.
    pub fn context(self, operation: Operation, resource: impl Into<String>) -> Self {
        match self {
            // already carries context
            CloudError::Operation { .. } => self,
            other => CloudError::Operation {
                operation,
                resource: resource.into(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, skipping operation context wrappers.
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn malformed_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::MalformedId {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Accumulator for independent failures (custom diff hooks, tag sub-steps)
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<CloudError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: CloudError) {
        match error {
            CloudError::Multi(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    /// Record the error of `result`, if any, and pass the value through.
    pub fn collect<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CloudError] {
        &self.errors
    }

    pub fn first(&self) -> Option<&CloudError> {
        self.errors.first()
    }

    /// `Ok` when nothing was collected, the error itself when exactly one was,
    /// otherwise all of them.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(CloudError::Multi(self)),
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  * {}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}
