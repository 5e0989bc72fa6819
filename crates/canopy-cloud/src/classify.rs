//! Error classifier
//!
//! The only place where upstream status codes are interpreted. Handlers ask
//! "is this not-found / retryable" through these helpers instead of matching
//! on status themselves.

use crate::error::{ApiError, CloudError, ErrorKind, Result};
use std::collections::BTreeSet;

/// Map an HTTP status to a taxonomy kind.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        409 | 500 | 503 => ErrorKind::Retryable,
        400 => ErrorKind::Invalid,
        401 | 403 => ErrorKind::Unauthorized,
        _ => ErrorKind::Fatal,
    }
}

/// Status classification plus per-resource vendor code overrides.
///
/// Some services answer a missing parent with a 400 and a vendor code instead
/// of a 404; resource types register those codes here.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    not_found_codes: BTreeSet<String>,
    retryable_codes: BTreeSet<String>,
    deleted_codes: BTreeSet<String>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `code` as NotFound regardless of status.
    pub fn not_found_code(mut self, code: impl Into<String>) -> Self {
        self.not_found_codes.insert(code.into());
        self
    }

    /// Treat `code` as Retryable regardless of status.
    pub fn retryable_code(mut self, code: impl Into<String>) -> Self {
        self.retryable_codes.insert(code.into());
        self
    }

    /// Treat `code` on a delete as "already deleted". Only these codes, and
    /// NotFound, let a failed delete count as done.
    pub fn already_deleted_code(mut self, code: impl Into<String>) -> Self {
        self.deleted_codes.insert(code.into());
        self
    }

    pub fn classify_api(&self, err: &ApiError) -> ErrorKind {
        if let Some(code) = &err.code {
            if self.not_found_codes.contains(code) {
                return ErrorKind::NotFound;
            }
            if self.retryable_codes.contains(code) {
                return ErrorKind::Retryable;
            }
        }
        classify_status(err.status)
    }

    pub fn classify(&self, err: &CloudError) -> ErrorKind {
        match err {
            CloudError::Api(api) => self.classify_api(api),
            CloudError::Transport(_) => ErrorKind::Retryable,
            CloudError::Timeout { .. } => ErrorKind::Timeout,
            CloudError::Cancelled => ErrorKind::Cancelled,
            CloudError::Validation(_)
            | CloudError::InvalidConfig(_)
            | CloudError::MalformedId { .. } => ErrorKind::Validation,
            CloudError::Multi(_) => ErrorKind::MultiError,
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::Operation { source, .. } => self.classify(source),
            CloudError::UnexpectedState { .. }
            | CloudError::UnknownResourceType(_)
            | CloudError::Internal(_)
            | CloudError::Json(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self, err: &CloudError) -> bool {
        self.classify(err) == ErrorKind::NotFound
    }

    pub fn is_retryable(&self, err: &CloudError) -> bool {
        self.classify(err) == ErrorKind::Retryable
    }

    fn is_already_deleted(&self, err: &CloudError) -> bool {
        match err.root() {
            CloudError::Api(api) => api
                .code
                .as_ref()
                .is_some_and(|code| self.deleted_codes.contains(code)),
            _ => false,
        }
    }

    /// Delete is idempotent: NotFound and the registered already-deleted
    /// codes count as success. Any other refusal, a plain 400 included, is
    /// returned.
    pub fn check_deleted(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.is_not_found(&e) || self.is_already_deleted(&e) => {
                tracing::debug!("Treating delete error as success: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// For reads: `Ok(None)` when the object is gone, so the caller can
    /// tombstone instead of failing.
    pub fn found<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self.is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Classify with the default classifier.
pub fn classify(err: &CloudError) -> ErrorKind {
    ErrorClassifier::default().classify(err)
}

pub fn is_not_found(err: &CloudError) -> bool {
    classify(err) == ErrorKind::NotFound
}

pub fn is_retryable(err: &CloudError) -> bool {
    classify(err) == ErrorKind::Retryable
}

/// [`ErrorClassifier::check_deleted`] with the default classifier.
pub fn check_deleted(result: Result<()>) -> Result<()> {
    ErrorClassifier::default().check_deleted(result)
}
