//! Connection configuration: the four-field parameter bag the driver layer
//! needs to open a connection (§6 "Connection configuration"). Loaded in
//! the layered style used throughout this codebase's own config handling —
//! a TOML file under the user's config directory, overridden by
//! environment variables — but trimmed down to exactly the fields the spec
//! names; no session history, no SSH tunnels, no vault integration.

use crate::error::OrmError;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Connection parameters for the target MySQL server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Config {
    /// `<config_dir>/ormcrust/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("ormcrust").join("config.toml"))
    }

    /// Loads the TOML file if present, then applies `ORM_HOST`,
    /// `ORM_USER`, `ORM_PASSWORD`, `ORM_DATABASE` overrides from the
    /// environment on top of it.
    pub fn load() -> Result<Config, OrmError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                debug!("[Config::load] reading config file at {}", path.display());
                let text = fs::read_to_string(&path)
                    .map_err(|e| OrmError::Connection(format!("failed to read {}: {e}", path.display())))?;
                toml::from_str(&text)
                    .map_err(|e| OrmError::Connection(format!("failed to parse {}: {e}", path.display())))?
            }
            _ => {
                debug!("[Config::load] no config file found, starting from defaults");
                Config {
                    host: "localhost".to_string(),
                    user: "root".to_string(),
                    password: String::new(),
                    database: String::new(),
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ORM_HOST") {
            self.host = host;
        }
        if let Ok(user) = std::env::var("ORM_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("ORM_PASSWORD") {
            self.password = password;
        }
        if let Ok(database) = std::env::var("ORM_DATABASE") {
            self.database = database;
        }
    }
}
