//! Canopy Cloud
//!
//! Resource lifecycle engine shared by every Canopy cloud provider. A
//! provider registers [`ResourceType`]s (schema, handlers, hooks, importer)
//! in a [`Provider`]; the host hands the engine prior state plus
//! configuration and gets back the state to commit.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    host runtime                       │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ prior state, config, meta
//! ┌──────────────────────────▼───────────────────────────┐
//! │                    canopy-cloud                       │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────────────┐  │
//! │  │ Planner  │──▶│ CustomDiff│──▶│    Lifecycle    │  │
//! │  │ (schema) │   │   hooks   │   │ create/read/... │  │
//! │  └──────────┘   └───────────┘   └───────┬─────────┘  │
//! │  ┌──────────┐   ┌───────────┐   ┌───────▼─────────┐  │
//! │  │Classifier│   │  Waiter   │   │ Context/clients │  │
//! │  └──────────┘   └───────────┘   └─────────────────┘  │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │             provider crate (REST SDK)                 │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod classify;
pub mod context;
pub mod customdiff;
pub mod data;
pub mod diag;
pub mod error;
pub mod id;
pub mod import;
pub mod lifecycle;
pub mod pagination;
pub mod path;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod state;
pub mod suppress;
pub mod tags;
pub mod typed;
pub mod validation;
pub mod value;
pub mod waiter;

// Re-exports
pub use classify::{ErrorClassifier, check_deleted, classify_status};
pub use context::{Context, ServiceClient};
pub use customdiff::{CustomDiffHook, ResourceDiff};
pub use data::ResourceData;
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use error::{ApiError, CloudError, ErrorKind, MultiError, Operation, Result};
pub use id::{build_id, parse_id};
pub use import::Importer;
pub use lifecycle::{Lifecycle, ReconcileError, Reconciled};
pub use pagination::{Cursor, Page};
pub use path::AttributePath;
pub use plan::{AttributeDiff, DiffKind, Plan, PlanSummary, Planner, Verdict};
pub use provider::{Provider, ProviderBuilder};
pub use resource::{Resource, ResourceType, Timeouts};
pub use retry::RetryConfig;
pub use schema::{AttrType, Attribute, Policy, Presence, Schema};
pub use state::ResourceState;
pub use tags::{TagApi, TagReconciler, Tags};
pub use typed::AttrKey;
pub use value::{Attributes, Value};
pub use waiter::{StateWaiter, UpstreamJob};
