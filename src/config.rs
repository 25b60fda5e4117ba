//! Configuration (SPEC_FULL.md "Configuration").
//!
//! A single YAML file, loaded once at startup and treated as read-only
//! thereafter (§5 "Shared resources"). Values may reference environment
//! variables with `${VAR_NAME}` syntax, expanded before YAML parsing.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub directory: DirectoryConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL used for `meta.location` and the `Location` header
    /// (SPEC_FULL.md "`meta.location` base URL"). Includes scheme, host,
    /// and port; no trailing slash.
    pub base_url: String,
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    8080
}

/// The directory-tool collaborator settings (§6 "Configuration").
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DirectoryConfig {
    /// Distinguished-name string passed to `create` as `Path` (§4.A).
    #[serde(default)]
    pub base_ou: Option<String>,
    /// Plaintext password supplied only to the create path (§6).
    pub default_password: String,
    /// Path to the directory-tool executable; a bare command name is
    /// resolved via `PATH`.
    #[serde(default = "default_tool_path")]
    pub tool_path: String,
    #[serde(default)]
    pub server_hostname: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_path() -> String {
    "pwsh".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://scim_bridge.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR_NAME}`
    /// environment-variable references first.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, AppError> {
        let path = config_path.as_ref();

        if !path.exists() {
            return Err(AppError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        let expanded = Self::expand_env_vars(&content)?;

        let config: AppConfig = serde_yaml::from_str(&expanded).map_err(|e| {
            AppError::Configuration(format!("failed to parse config file {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Zero-config default for local development: in-memory SQLite, a
    /// fixed API key, and no base OU.
    pub fn default_config() -> Self {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: default_port(),
                base_url: "http://127.0.0.1:8080".to_string(),
                tls_cert_path: None,
                tls_key_path: None,
            },
            directory: DirectoryConfig {
                base_ou: None,
                default_password: "ChangeMe123!".to_string(),
                tool_path: default_tool_path(),
                server_hostname: None,
                timeout_secs: default_timeout_secs(),
            },
            auth: AuthConfig {
                api_key: "dev-api-key".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
        }
    }

    /// Replace every `${VAR_NAME}` with the environment variable's value.
    /// A referenced variable that isn't set is a configuration error.
    fn expand_env_vars(content: &str) -> Result<String, AppError> {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            let Some(end) = rest[start..].find('}') else {
                result.push_str(rest);
                return Ok(result);
            };
            let end = start + end;

            result.push_str(&rest[..start]);
            let var_name = &rest[start + 2..end];
            let value = std::env::var(var_name).map_err(|_| {
                AppError::Configuration(format!(
                    "config references undefined environment variable: {}",
                    var_name
                ))
            })?;
            result.push_str(&value);
            rest = &rest[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }
}
