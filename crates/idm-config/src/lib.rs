//! IdM Configuration
//!
//! TOML configuration for the IdM core. Every section is optional and falls
//! back to its defaults:
//!
//! ```toml
//! [logging]
//! level = "info"
//! json = false
//!
//! [events]
//! max_depth = 16
//! disabled_processors = ["audit-processor"]
//!
//! [authorization]
//! max_transitive_depth = 8
//!
//! [[authorization.policies]]
//! id = "identity-read"
//! entity_type = "identity"
//! evaluator = "base-permission"
//! permissions = ["READ"]
//!
//! [bulk]
//! progress_interval = 100
//! ```
//!
//! ## Environment Variables
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IDM_CONFIG` | - | Path of the TOML file read by [`IdmConfig::load_from_env`] |
//! | `IDM_LOG_LEVEL` | - | Overrides `logging.level` |
//! | `IDM_EVENTS_MAX_DEPTH` | - | Overrides `events.max_depth` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use idm_authz::{AuthorizationPolicy, EvaluatorRegistry, DEFAULT_MAX_TRANSITIVE_DEPTH};
pub use idm_common::logging::LoggingConfig;

pub const CONFIG_PATH_ENV: &str = "IDM_CONFIG";
pub const LOG_LEVEL_ENV: &str = "IDM_LOG_LEVEL";
pub const EVENTS_MAX_DEPTH_ENV: &str = "IDM_EVENTS_MAX_DEPTH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    #[error("Invalid policy '{policy_id}': {source}")]
    InvalidPolicy {
        policy_id: String,
        #[source]
        source: idm_authz::AuthorizationError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Deepest allowed chain of secondary events
    pub max_depth: usize,
    /// Processor names that are never registered
    pub disabled_processors: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_depth: 16,
            disabled_processors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub max_transitive_depth: usize,
    /// Policies loaded into the policy store at startup
    pub policies: Vec<AuthorizationPolicy>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            max_transitive_depth: DEFAULT_MAX_TRANSITIVE_DEPTH,
            policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Items between progress log lines
    pub progress_interval: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { progress_interval: 100 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdmConfig {
    pub logging: LoggingConfig,
    pub events: EventsConfig,
    pub authorization: AuthorizationConfig,
    pub bulk: BulkConfig,
}

impl IdmConfig {
    /// Load from a TOML file. Environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            policies = config.authorization.policies.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load the file named by `IDM_CONFIG` (defaults when unset), then apply
    /// the environment overrides.
    pub fn load_from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path)?,
            _ => {
                debug!("{} not set, using default configuration", CONFIG_PATH_ENV);
                Self::default()
            }
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `IDM_*` overrides read through `lookup`.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(raw) = lookup(EVENTS_MAX_DEPTH_ENV) {
            self.events.max_depth = raw.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
                name: EVENTS_MAX_DEPTH_ENV.to_string(),
                message: format!("expected a non-negative integer, got '{}'", raw),
            })?;
        }
        self.check()
    }

    /// Validate the seeded policies against the evaluators in `registry`.
    pub fn validate_policies(&self, registry: &EvaluatorRegistry) -> Result<()> {
        for policy in &self.authorization.policies {
            registry
                .validate(policy)
                .map_err(|source| ConfigError::InvalidPolicy {
                    policy_id: policy.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.bulk.progress_interval == 0 {
            return Err(ConfigError::Invalid("bulk.progress_interval must be positive".into()));
        }
        let mut ids = std::collections::BTreeSet::new();
        for policy in &self.authorization.policies {
            if !ids.insert(policy.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate policy id '{}'", policy.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idm_authz::Permission;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[logging]
level = "debug"
json = true

[events]
max_depth = 4
disabled_processors = ["audit-processor"]

[[authorization.policies]]
id = "identity-read"
entity_type = "identity"
evaluator = "base-permission"
permissions = ["READ", "AUTOCOMPLETE"]

[[authorization.policies]]
id = "valid-identity-delete"
entity_type = "identity"
evaluator = "attribute"
permissions = ["DELETE"]
priority = 5

[authorization.policies.properties]
attribute = "state"
value = "VALID"
"#;

    #[test]
    fn test_defaults() {
        let config = IdmConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.events.max_depth, 16);
        assert_eq!(config.authorization.max_transitive_depth, 8);
        assert!(config.authorization.policies.is_empty());
        assert_eq!(config.bulk.progress_interval, 100);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = IdmConfig::from_toml_str("").unwrap();
        assert_eq!(config.events.max_depth, 16);
        assert_eq!(config.bulk.progress_interval, 100);
    }

    #[test]
    fn test_parse_sections_and_policies() {
        let config = IdmConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.events.max_depth, 4);
        assert_eq!(config.events.disabled_processors, vec!["audit-processor"]);
        assert_eq!(config.authorization.max_transitive_depth, 8);

        let policies = &config.authorization.policies;
        assert_eq!(policies.len(), 2);
        assert!(policies[0].enabled);
        assert!(policies[0].permissions.contains(&Permission::AUTOCOMPLETE));
        assert_eq!(policies[1].priority, 5);
        assert_eq!(
            policies[1].properties.get("value"),
            Some(&serde_json::json!("VALID"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = IdmConfig::load(file.path()).unwrap();
        assert_eq!(config.authorization.policies.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdmConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let err = IdmConfig::from_toml_str("[events]\nmax_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_duplicate_policy_ids_rejected() {
        let toml = r#"
[[authorization.policies]]
id = "p"
entity_type = "identity"
evaluator = "base-permission"

[[authorization.policies]]
id = "p"
entity_type = "role"
evaluator = "base-permission"
"#;
        assert!(matches!(IdmConfig::from_toml_str(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(LOG_LEVEL_ENV, "warn"), (EVENTS_MAX_DEPTH_ENV, " 7 ")].into();
        let mut config = IdmConfig::default();
        config
            .apply_env_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.events.max_depth, 7);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = IdmConfig::default();
        let err = config
            .apply_env_overrides_from(|key| {
                (key == EVENTS_MAX_DEPTH_ENV).then(|| "many".to_string())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvVar { ref name, .. } if name == EVENTS_MAX_DEPTH_ENV
        ));
        assert_eq!(config.events.max_depth, 16);
    }

    #[test]
    fn test_validate_policies() {
        let registry = EvaluatorRegistry::builder().with_defaults().build().unwrap();
        let config = IdmConfig::from_toml_str(SAMPLE).unwrap();
        config.validate_policies(&registry).unwrap();

        let broken = IdmConfig::from_toml_str(
            r#"
[[authorization.policies]]
id = "broken"
entity_type = "identity"
evaluator = "attribute"
permissions = ["READ"]
"#,
        )
        .unwrap();
        let err = broken.validate_policies(&registry).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPolicy { ref policy_id, .. } if policy_id == "broken"
        ));
    }
}
