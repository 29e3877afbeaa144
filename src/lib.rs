pub mod api;
pub mod deploy;
pub mod error;
pub mod logging;
pub mod payload;
pub mod provider;
pub mod registry;
pub mod signature;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::fs;

use crate::deploy::Dispatcher;
use crate::error::HookError;
use crate::provider::Provider;

/// Value shipped in example configs; a secret still set to it counts as unset.
pub const SECRET_PLACEHOLDER: &str = "<long token>";

const DEFAULT_DEPLOY_COMMAND: &str = "project_deploy";

fn default_deploy_command() -> String {
    DEFAULT_DEPLOY_COMMAND.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HookConfig {
    /// Directory holding the deploy toolkit, prepended to `PATH`.
    pub toolkit_path: PathBuf,
    #[serde(default = "default_deploy_command")]
    pub deploy_command: String,
    /// Fixed project list location. Resolved from the home directory when unset.
    pub projects_file: Option<PathBuf>,
    pub gitea: Option<ProviderConfig>,
    pub github: Option<ProviderConfig>,
    pub gitlab: Option<ProviderConfig>,
}

impl HookConfig {
    pub fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::Gitea => self.gitea.as_ref(),
            Provider::Github => self.github.as_ref(),
            Provider::Gitlab => self.gitlab.as_ref(),
        }
    }

    /// Returns the usable shared secret for a provider, if one has been set.
    pub fn secret_for(&self, provider: Provider) -> Option<&str> {
        self.provider(provider)
            .and_then(|section| section.configured_secret(provider))
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct ProviderConfig {
    /// HMAC secret for Gitea/GitHub.
    pub secret: Option<String>,
    /// Plain token, GitLab only. Takes precedence over `secret` there.
    pub token: Option<String>,
}

impl ProviderConfig {
    /// The credential this provider uses, unless it is missing, empty or
    /// still the placeholder.
    pub fn configured_secret(&self, provider: Provider) -> Option<&str> {
        let value = match provider {
            Provider::Gitlab => self.token.as_deref().or(self.secret.as_deref()),
            Provider::Gitea | Provider::Github => self.secret.as_deref(),
        };
        value.filter(|s| !s.is_empty() && *s != SECRET_PLACEHOLDER)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Read and parse the TOML configuration file.
pub async fn load_config(path: impl AsRef<Path>) -> Result<HookConfig, HookError> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).await.map_err(|e| {
        HookError::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    parse_config(&config_str).map_err(|e| {
        HookError::ConfigError(format!("Failed to parse config file '{}': {}", path.display(), e))
    })
}

pub fn parse_config(config_str: &str) -> Result<HookConfig, HookError> {
    Ok(toml::from_str(config_str)?)
}

pub struct AppState {
    config: RwLock<HookConfig>,
    pub config_path: PathBuf,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    pub fn new(config: HookConfig, config_path: PathBuf, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            config: RwLock::new(config),
            config_path,
            dispatcher,
        }
    }

    /// Copy of the configuration as it is right now. Requests take one at
    /// entry so a reload never changes settings halfway through a pipeline.
    pub fn config_snapshot(&self) -> HookConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace_config(&self, new_config: HookConfig) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *config = new_config;
    }
}

pub type SharedState = Arc<AppState>;
