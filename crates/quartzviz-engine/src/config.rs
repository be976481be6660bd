use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use quartzviz_contracts::catalog::{CatalogError, ProductCatalog};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::Timeouts;
use crate::runner::PollPolicy;

pub const DEFAULT_API_BASE: &str = "https://ap-east-1.tensorart.cloud/v1";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {name} (also read from {fallback})")]
    Missing {
        name: &'static str,
        fallback: &'static str,
    },
}

/// Startup configuration. Secrets are redacted from `Debug`.
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_base: String,
    pub api_token: String,
    pub llm_api_key: String,
    pub output_dir: PathBuf,
    pub asset_root: PathBuf,
    pub catalog_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => debug!("no .env file; using process environment"),
            Err(err) => warn!(%err, "ignoring unreadable .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &'static str, fallback: &'static str| {
            read(name)
                .or_else(|| read(fallback))
                .ok_or(ConfigError::Missing { name, fallback })
        };

        let api_token = required("QUARTZVIZ_API_TOKEN", "api_key_token")?;
        let llm_api_key = required("QUARTZVIZ_LLM_API_KEY", "groq_api_key")?;
        Ok(Self {
            api_base: read("QUARTZVIZ_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_token,
            llm_api_key,
            output_dir: read("QUARTZVIZ_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            asset_root: read("QUARTZVIZ_ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            catalog_path: read("QUARTZVIZ_CATALOG").map(PathBuf::from),
        })
    }

    /// The JSON catalog when one is configured, otherwise the built-in one.
    pub fn load_catalog(&self) -> Result<ProductCatalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => ProductCatalog::from_json_file(path, self.asset_root.clone()),
            None => Ok(ProductCatalog::builtin(self.asset_root.clone())),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_base", &self.api_base)
            .field("api_token", &"<redacted>")
            .field("llm_api_key", &"<redacted>")
            .field("output_dir", &self.output_dir)
            .field("asset_root", &self.asset_root)
            .field("catalog_path", &self.catalog_path)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub timeouts: Timeouts,
    pub workflow_poll: PollPolicy,
    pub pipeline_poll: PollPolicy,
    /// Wait after each upload before the resource is referenced.
    pub propagation_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            workflow_poll: PollPolicy::workflow(),
            pipeline_poll: PollPolicy::pipeline(),
            propagation_delay: Duration::from_secs(10),
        }
    }
}
