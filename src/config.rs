use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "ClinicDesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP bind address when `CLINIC_BIND_ADDR` is unset.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Environment variable names for the six backend project keys, in the
/// order they are reported when missing.
pub const ENV_API_KEY: &str = "CLINIC_API_KEY";
pub const ENV_AUTH_DOMAIN: &str = "CLINIC_AUTH_DOMAIN";
pub const ENV_PROJECT_ID: &str = "CLINIC_PROJECT_ID";
pub const ENV_STORAGE_BUCKET: &str = "CLINIC_STORAGE_BUCKET";
pub const ENV_MESSAGING_SENDER_ID: &str = "CLINIC_MESSAGING_SENDER_ID";
pub const ENV_APP_ID: &str = "CLINIC_APP_ID";
pub const ENV_EMULATOR: &str = "CLINIC_EMULATOR";
pub const ENV_BIND_ADDR: &str = "CLINIC_BIND_ADDR";
pub const ENV_DATA_DIR: &str = "CLINIC_DATA_DIR";

/// Get the application data directory
/// ~/ClinicDesk/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,clinic_desk=debug,tower_http=info"
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing backend config keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),
    #[error("Invalid bind address {value}: {reason}")]
    InvalidBindAddr { value: String, reason: String },
}

/// Identifiers of the backend project the service talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    /// Selects the in-memory emulator store instead of the SQLite file.
    pub use_emulator: bool,
}

impl BackendConfig {
    /// Build from an arbitrary key lookup. Every one of the six keys must be
    /// present and non-empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str, missing: &mut Vec<&'static str>| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let mut missing = Vec::new();
        let config = Self {
            api_key: read(ENV_API_KEY, &mut missing),
            auth_domain: read(ENV_AUTH_DOMAIN, &mut missing),
            project_id: read(ENV_PROJECT_ID, &mut missing),
            storage_bucket: read(ENV_STORAGE_BUCKET, &mut missing),
            messaging_sender_id: read(ENV_MESSAGING_SENDER_ID, &mut missing),
            app_id: read(ENV_APP_ID, &mut missing),
            use_emulator: lookup(ENV_EMULATOR).as_deref() == Some("true"),
        };

        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }
        Ok(config)
    }

    /// Presence report for the diagnostics view. The API key is never echoed.
    pub fn presence(&self) -> ConfigPresence {
        fn shown(value: &str) -> String {
            if value.is_empty() {
                "Missing".to_string()
            } else {
                value.to_string()
            }
        }

        ConfigPresence {
            api_key: if self.api_key.is_empty() { "Missing" } else { "Set" },
            auth_domain: shown(&self.auth_domain),
            project_id: shown(&self.project_id),
            storage_bucket: shown(&self.storage_bucket),
            messaging_sender_id: shown(&self.messaging_sender_id),
            app_id: shown(&self.app_id),
            emulator: self.use_emulator,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigPresence {
    pub api_key: &'static str,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub emulator: bool,
}

/// Full runtime configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = BackendConfig::from_lookup(&lookup)?;

        let raw_addr = lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBindAddr {
                value: raw_addr.clone(),
                reason: e.to_string(),
            })?;

        let data_dir = lookup(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);

        Ok(Self {
            backend,
            bind_addr,
            data_dir,
        })
    }

    /// SQLite file for the configured project.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.backend.project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_API_KEY, "key-123".to_string()),
            (ENV_AUTH_DOMAIN, "clinic.example.com".to_string()),
            (ENV_PROJECT_ID, "clinic-dev".to_string()),
            (ENV_STORAGE_BUCKET, "clinic-dev.bucket".to_string()),
            (ENV_MESSAGING_SENDER_ID, "4242".to_string()),
            (ENV_APP_ID, "1:4242:web:abc".to_string()),
        ])
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn backend_config_loads_all_keys() {
        let env = full_env();
        let config = BackendConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.project_id, "clinic-dev");
        assert!(!config.use_emulator);
    }

    #[test]
    fn missing_keys_are_listed_in_order() {
        let mut env = full_env();
        env.remove(ENV_AUTH_DOMAIN);
        env.insert(ENV_APP_ID, "   ".to_string());
        let err = BackendConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::MissingKeys(vec![ENV_AUTH_DOMAIN, ENV_APP_ID]));
        assert_eq!(
            err.to_string(),
            "Missing backend config keys: CLINIC_AUTH_DOMAIN, CLINIC_APP_ID"
        );
    }

    #[test]
    fn emulator_flag_requires_literal_true() {
        let mut env = full_env();
        env.insert(ENV_EMULATOR, "true".to_string());
        assert!(BackendConfig::from_lookup(|k| env.get(k).cloned()).unwrap().use_emulator);

        env.insert(ENV_EMULATOR, "yes".to_string());
        assert!(!BackendConfig::from_lookup(|k| env.get(k).cloned()).unwrap().use_emulator);
    }

    #[test]
    fn presence_hides_api_key() {
        let env = full_env();
        let presence = BackendConfig::from_lookup(|k| env.get(k).cloned())
            .unwrap()
            .presence();
        assert_eq!(presence.api_key, "Set");
        assert_eq!(presence.project_id, "clinic-dev");
    }

    #[test]
    fn app_config_defaults_bind_addr_and_db_path() {
        let mut env = full_env();
        env.insert(ENV_DATA_DIR, "/tmp/clinic".to_string());
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/clinic/clinic-dev.db"));
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let mut env = full_env();
        env.insert(ENV_BIND_ADDR, "not-an-addr".to_string());
        let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
    }
}
