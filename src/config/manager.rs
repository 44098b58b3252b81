use super::{
    mutation::MutationConfig,
    sampling::SamplingConfig,
    search::SearchConfig,
    traits::{ConfigManifest, ConfigSection},
};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables overriding file settings,
/// e.g. `COVSEARCH_SEARCH__MAX_EVALUATIONS=500`
pub const ENV_PREFIX: &str = "COVSEARCH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        self.search.validate()?;
        self.sampling.validate()?;
        self.mutation.validate()?;
        Ok(())
    }

    pub fn manifests(&self) -> Vec<ConfigManifest> {
        vec![
            self.search.to_manifest(),
            self.sampling.to_manifest(),
            self.mutation.to_manifest(),
        ]
    }

    /// Defaults, overridden by `path` (if given) and then by `COVSEARCH_*`
    /// environment variables
    pub fn load_layered(path: Option<&Path>) -> Result<Self, SearchError> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .map_err(|e| SearchError::Configuration(format!("Failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SearchError::Configuration(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SearchError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SearchError::Configuration(format!("Failed to read config: {}", e)))?;

        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| SearchError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn load_layered<P: AsRef<Path>>(&self, path: Option<P>) -> Result<(), SearchError> {
        let config = AppConfig::load_layered(path.as_ref().map(|p| p.as_ref()))?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SearchError> {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let toml_str = toml::to_string_pretty(&*config)
            .map_err(|e| SearchError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| SearchError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply `f` and keep the result only if it validates
    pub fn update<F>(&self, f: F) -> Result<(), SearchError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = config.clone();
        f(&mut updated);
        updated.validate()?;
        *config = updated;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
