//! Module: db::config
//! Responsibility: entity manager configuration and repository profiles.


use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration from '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("configuration names no definitions document")]
    MissingDefinitions,
}

///
/// OrmConfig
///
/// definitions   → optional path of the entity definition document
/// repository    → default repository profile
/// repositories  → named profiles selected by an entity's `repository`
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrmConfig {
    #[serde(default)]
    pub definitions: Option<PathBuf>,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,
}

impl OrmConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Load from disk; a relative `definitions` path is resolved against
    /// the configuration file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&source)?;
        let resolved = match (&config.definitions, path.parent()) {
            (Some(definitions), Some(dir)) if definitions.is_relative() => {
                Some(dir.join(definitions))
            }
            _ => None,
        };
        if resolved.is_some() {
            config.definitions = resolved;
        }

        Ok(config)
    }

    /// Named profile, if registered.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.get(name)
    }
}

///
/// RepositoryConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Field stamped with the current time on every UPDATE.
    #[serde(default)]
    pub modified_at_field: Option<String>,
}
