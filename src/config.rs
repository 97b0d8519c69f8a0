//! Collection-session configuration.
//!
//! A [`CollectConfig`] is loaded from a YAML file and validated before any
//! environment is constructed. [`EnvArgs`] is the environment name +
//! construction kwargs record stored as the container's `env_args`
//! attribute, shared by every episode of a merged session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment construction record persisted with every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvArgs {
    pub env_name: String,
    /// Environment construction kwargs, stored verbatim.
    #[serde(default)]
    pub env_kwargs: serde_json::Value,
}

impl EnvArgs {
    pub fn new(env_name: impl Into<String>, env_kwargs: serde_json::Value) -> Self {
        Self {
            env_name: env_name.into(),
            env_kwargs,
        }
    }

    /// The JSON string stored as the container attribute.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses the container attribute back into a record.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Settings for one data-collection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Samples buffered before a chunk is flushed to disk.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// Extra timesteps collected after the goal first holds, so the tail of
    /// a demonstration settles before the episode ends.
    #[serde(default = "default_collect_more")]
    pub collect_more: usize,

    /// Multiplier applied to the sparse completion reward.
    #[serde(default = "default_reward_scale")]
    pub reward_scale: f64,

    /// Directory episode files are written to.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

fn default_flush_interval() -> usize {
    50
}

fn default_collect_more() -> usize {
    5
}

fn default_reward_scale() -> f64 {
    1.0
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("./demos")
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            collect_more: default_collect_more(),
            reward_scale: default_reward_scale(),
            save_dir: default_save_dir(),
        }
    }
}

impl CollectConfig {
    /// Loads and validates a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "flush_interval".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !self.reward_scale.is_finite() || self.reward_scale < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "reward_scale".to_string(),
                message: format!("must be finite and non-negative, got {}", self.reward_scale),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_args_roundtrip() {
        let args = EnvArgs::new("Tabletop", serde_json::json!({"robots": ["Panda"]}));
        let json = args.to_json().expect("serialize");
        let back = EnvArgs::from_json(&json).expect("deserialize");
        assert_eq!(back, args);
        assert!(json.contains("Tabletop"));
    }

    #[test]
    fn test_defaults() {
        let config = CollectConfig::default();
        assert_eq!(config.flush_interval, 50);
        assert_eq!(config.collect_more, 5);
        assert_eq!(config.reward_scale, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_loading_with_partial_keys() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("collect.yaml");
        std::fs::write(&path, "flush_interval: 10\nsave_dir: /tmp/demos\n").expect("write");
        let config = CollectConfig::from_yaml_file(&path).expect("load");
        assert_eq!(config.flush_interval, 10);
        assert_eq!(config.save_dir, PathBuf::from("/tmp/demos"));
        // unspecified keys keep their defaults
        assert_eq!(config.collect_more, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = CollectConfig {
            flush_interval: 0,
            ..CollectConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let config = CollectConfig {
            reward_scale: -1.0,
            ..CollectConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
