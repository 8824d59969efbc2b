//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The Freemius developer secret key is loaded from FS_DEVELOPER_SECRET_KEY
//! or developer_secret_key_file, never stored in the TOML directly.

use common::Secret;
use freemius_api::ApiCredentials;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Env var holding the developer secret key
const SECRET_KEY_ENV: &str = "FS_DEVELOPER_SECRET_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub freemius: FreemiusConfig,
    pub server: ServerConfig,
    pub users: UsersConfig,
}

/// Freemius store credentials and API selection
#[derive(Debug, Deserialize)]
pub struct FreemiusConfig {
    pub store_id: u64,
    pub developer_id: u64,
    #[serde(skip)]
    pub developer_secret_key: Option<Secret<String>>,
    /// Path to a file containing the secret key (alternative to the env var)
    #[serde(default)]
    pub developer_secret_key_file: Option<PathBuf>,
    #[serde(default)]
    pub use_local_api: bool,
    /// Overrides the API root selected by `use_local_api`
    #[serde(default)]
    pub api_root: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// HTTP listener and session settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

/// Local user store location
#[derive(Debug, Deserialize)]
pub struct UsersConfig {
    pub path: PathBuf,
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_session_ttl() -> u64 {
    2 * 24 * 60 * 60
}

impl FreemiusConfig {
    /// Credentials for the identity client. Fails if no secret key was resolved.
    pub fn api_credentials(&self) -> common::Result<ApiCredentials> {
        let developer_secret_key = self.developer_secret_key.clone().ok_or_else(|| {
            common::Error::Config(format!(
                "developer secret key missing: set {SECRET_KEY_ENV} or developer_secret_key_file"
            ))
        })?;
        Ok(ApiCredentials {
            store_id: self.store_id,
            developer_id: self.developer_id,
            developer_secret_key,
            use_local_api: self.use_local_api,
        })
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret key resolution order:
    /// 1. FS_DEVELOPER_SECRET_KEY env var
    /// 2. developer_secret_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.freemius.store_id == 0 {
            return Err(common::Error::Config(
                "store_id must be greater than 0".into(),
            ));
        }

        if config.freemius.developer_id == 0 {
            return Err(common::Error::Config(
                "developer_id must be greater than 0".into(),
            ));
        }

        if config.freemius.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref root) = config.freemius.api_root {
            if !root.starts_with("http://") && !root.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "api_root must start with http:// or https://, got: {root}"
                )));
            }
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.server.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }

        // Resolve secret key: env var takes precedence over file
        if let Ok(key) = std::env::var(SECRET_KEY_ENV) {
            let key = key.trim().to_owned();
            if key.is_empty() {
                return Err(common::Error::Config(format!("{SECRET_KEY_ENV} is empty")));
            }
            config.freemius.developer_secret_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.freemius.developer_secret_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read developer_secret_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if key.is_empty() {
                return Err(common::Error::Config(format!(
                    "developer_secret_key_file {} is empty",
                    key_file.display()
                )));
            }
            config.freemius.developer_secret_key = Some(Secret::new(key));
        }

        if config.freemius.developer_secret_key.is_none() {
            return Err(common::Error::Config(format!(
                "developer secret key missing: set {SECRET_KEY_ENV} or developer_secret_key_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("sso-gateway.toml")
    }
}
