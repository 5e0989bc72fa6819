pub mod error;
pub mod sensitive;

pub use error::*;
pub use sensitive::Sensitive;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "CANOPY_CONFIG_PATH";
pub const ENV_REGION: &str = "CANOPY_REGION";
pub const ENV_PROJECT_ID: &str = "CANOPY_PROJECT_ID";
pub const ENV_AUTH_TOKEN: &str = "CANOPY_AUTH_TOKEN";

/// Per-phase timeout overrides in seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutOverrides {
    pub create: Option<u64>,
    pub read: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

impl TimeoutOverrides {
    /// `(phase, budget)` pairs for the phases that are set.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> {
        [
            ("create", self.create),
            ("read", self.read),
            ("update", self.update),
            ("delete", self.delete),
        ]
        .into_iter()
        .filter_map(|(phase, secs)| secs.map(|s| (phase, Duration::from_secs(s))))
    }
}

/// Provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: String,

    pub project_id: String,

    /// IAM token, sent as `X-Auth-Token`
    pub auth_token: Sensitive<String>,

    /// Service name to base URL, e.g. `lts: https://lts.example.test`
    pub endpoints: BTreeMap<String, String>,

    pub timeouts: TimeoutOverrides,

    /// Attempt budget of the bounded retry wrapper
    pub max_retries: Option<u32>,

    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Locate, parse, apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let path = find_config_file()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env();
        config.validate()?;
        tracing::debug!(path = %path.display(), region = %config.region, "Loaded provider configuration");
        Ok(config)
    }

    /// Parse YAML without overrides or validation.
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Settings from the environment only, for hosts without a file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// `CANOPY_REGION`, `CANOPY_PROJECT_ID` and `CANOPY_AUTH_TOKEN` win over
    /// the file.
    pub fn apply_env(&mut self) {
        if let Ok(region) = std::env::var(ENV_REGION)
            && !region.is_empty()
        {
            self.region = region;
        }
        if let Ok(project) = std::env::var(ENV_PROJECT_ID)
            && !project.is_empty()
        {
            self.project_id = project;
        }
        if let Ok(token) = std::env::var(ENV_AUTH_TOKEN)
            && !token.is_empty()
        {
            self.auth_token = Sensitive::new(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingField("region"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingField("project_id"));
        }
        for (service, url) in &self.endpoints {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidValue {
                    field: format!("endpoints.{}", service),
                    reason: format!("'{}' is not an http(s) URL", url),
                });
            }
        }
        if self.max_retries == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_retries".into(),
                reason: "must be at least 1".into(),
            });
        }
        for (phase, budget) in self.timeouts.iter() {
            if budget.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: format!("timeouts.{}", phase),
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(())
    }

    /// Base URL of `service`: the override, or
    /// `https://<service>.<region>.myhuaweicloud.com`.
    pub fn endpoint(&self, service: &str) -> String {
        match self.endpoints.get(service) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.myhuaweicloud.com", service, self.region),
        }
    }
}

/// Canopy's configuration directory, created if missing.
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("canopy");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the provider configuration file.
///
/// Search order:
/// 1. `CANOPY_CONFIG_PATH`
/// 2. `./canopy.yaml`
/// 3. `./.canopy/config.yaml`
/// 4. `<config dir>/canopy/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points to a missing file", ENV_CONFIG_PATH);
    }

    let current_dir = std::env::current_dir()?;
    let local = current_dir.join("canopy.yaml");
    if local.exists() {
        return Ok(local);
    }

    let hidden = current_dir.join(".canopy").join("config.yaml");
    if hidden.exists() {
        return Ok(hidden);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("canopy").join("config.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}
