//! Huawei Cloud resource types for the canopy reconcile engine
//!
//! Each resource type is a schema plus a [`canopy_cloud::Resource`] handler
//! talking to one service over HTTP. Service clients are built lazily from
//! the [`canopy_config::ProviderConfig`] stored in the reconcile context.
//!
//! ```ignore
//! let config = ProviderConfig::load()?;
//! let provider = canopy_cloud_huawei::provider(&config)?;
//! let ctx = canopy_cloud_huawei::context(&config);
//!
//! let lifecycle = provider.lifecycle("huaweicloud_lts_group")?;
//! let reconciled = lifecycle.reconcile(&ctx, &prior, Some(&desired)).await?;
//! ```

pub mod client;
pub mod error;
pub mod job;
pub mod logging;
pub mod lookup;
pub mod provider;
pub mod resources;
pub mod tagging;

pub use client::HuaweiClient;
pub use error::{HuaweiError, Result};
pub use logging::init_logging;
pub use provider::{PROVIDER_NAME, context, provider};
