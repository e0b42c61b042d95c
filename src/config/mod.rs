//! Configuration Management
//!
//! This module loads the askdb configuration file.
//!
//! # Configuration Locations
//! - Explicit: the path passed with `--config`
//! - Local: `.askdb/config.json` (team-shareable, per-project)
//! - Global: `~/.config/askdb/config.json` (per-user)
//!
//! # Resolution Precedence
//! The first file found in the order above is used as a whole; missing sections
//! fall back to built-in defaults. With no file at all, defaults are used.
//!
//! # Secrets
//! Secrets are never stored in the file itself. The text-generation API key and the
//! startup connection password are referenced by environment variable name.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::capability::ExecutionPolicy;
use crate::engine::ConnectRequest;
use crate::error::{AskError, Result};

/// Environment variable that overrides the configured API key variable
pub const API_KEY_OVERRIDE_ENV: &str = "ASKDB_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    /// Statement policy for generated SQL
    #[serde(default)]
    pub execution: ExecutionPolicy,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    /// Connection opened when the server starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_connection: Option<StoredConnection>,
}

/// Text-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

const fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: None,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the environment
    ///
    /// `ASKDB_API_KEY` wins over the configured variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(API_KEY_OVERRIDE_ENV)
            .or_else(|_| std::env::var(&self.api_key_env))
            .map_err(|_| {
                AskError::config_error(format!(
                    "Environment variable {} not found for the text-generation API key",
                    self.api_key_env
                ))
            })
    }
}

/// Managed-database TLS policy
///
/// Hosts under one of `managed_host_suffixes` get a forced port and a verified TLS
/// session; all other hosts connect without enforced TLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "default_managed_suffixes")]
    pub managed_host_suffixes: Vec<String>,

    #[serde(default = "default_managed_port")]
    pub managed_port: u16,

    /// PEM trust anchor for managed hosts (None means built-in webpki roots)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

fn default_managed_suffixes() -> Vec<String> {
    vec!["tidbcloud.com".to_string()]
}

const fn default_managed_port() -> u16 {
    4000
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            managed_host_suffixes: default_managed_suffixes(),
            managed_port: default_managed_port(),
            ca_cert: None,
        }
    }
}

impl TlsConfig {
    /// Whether a host belongs to a managed-database domain
    #[must_use]
    pub fn is_managed_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.managed_host_suffixes.iter().any(|suffix| {
            let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
            host == suffix || host.ends_with(&format!(".{suffix}"))
        })
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Schema description settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Sample rows included per table (0 disables sampling)
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

const fn default_sample_rows() -> usize {
    3
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { sample_rows: default_sample_rows() }
    }
}

/// Stored connection configuration
///
/// A `ConnectRequest` that may reference its password through an environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub request: ConnectRequest,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Resolve environment variables and return a connect request
    pub fn resolve(&self) -> Result<ConnectRequest> {
        let mut request = self.request.clone();

        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => request.password = Some(password),
                Err(_) => {
                    return Err(AskError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(request)
    }
}

/// Get path to local config file (`.askdb/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        AskError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".askdb").join("config.json"))
}

/// Get path to global config file (`~/.config/askdb/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AskError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("askdb").join("config.json"))
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path).map_err(|e| {
        AskError::config_error(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents)
        .map_err(|e| AskError::config_error(format!("Invalid config file format: {e}")))
}

/// Load configuration with precedence (explicit, then local, then global)
///
/// An explicit path must exist; local and global files are optional.
pub fn load_with_precedence(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    for path in [local_config_path()?, global_config_path()?] {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading configuration");
            return load_config(&path);
        }
    }

    Ok(AppConfig::default())
}
