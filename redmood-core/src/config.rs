use crate::error::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_STATSD_HOST: &str = "graphite";
pub const DEFAULT_STATSD_PORT: u16 = 8125;
pub const DEFAULT_MODEL_REPO: &str = "bhadresh-savani/bert-base-uncased-emotion";

/// Credentials for a Reddit "script" application. Every field is optional
/// here; missing values only fail when the client first authenticates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsdConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub prefix: Option<String>,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_STATSD_HOST.to_string(),
            port: DEFAULT_STATSD_PORT,
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Hugging Face Hub repository of a BERT sequence-classification checkpoint.
    pub model_repo: String,
    pub revision: String,
    pub weights_file: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_repo: DEFAULT_MODEL_REPO.to_string(),
            revision: "main".to_string(),
            weights_file: "model.safetensors".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditCredentials,
    pub statsd: StatsdConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Reads the optional TOML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(raw).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from environment variables looked up through `lookup`.
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let reddit = &mut self.reddit;
        for (name, slot) in [
            ("CLIENT_ID", &mut reddit.client_id),
            ("CLIENT_SECRET", &mut reddit.client_secret),
            ("USERNAME", &mut reddit.username),
            ("PASSWORD", &mut reddit.password),
            ("USER_AGENT", &mut reddit.user_agent),
        ] {
            if let Some(value) = get(name) {
                debug!("Using {} from environment", name);
                *slot = Some(value);
            }
        }

        if let Some(host) = get("STATSD_HOST") {
            self.statsd.host = host;
        }
        if let Some(port) = get("STATSD_PORT") {
            self.statsd.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "STATSD_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(model) = get("REDMOOD_MODEL") {
            self.classifier.model_repo = model;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.statsd.enabled && self.statsd.host.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "statsd.host must not be empty when statsd is enabled".to_string(),
            }
            .into());
        }
        if self.classifier.model_repo.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "classifier.model_repo must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
