//! Configuration handling for the OpenVPN hook

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level or `EnvFilter` directive (e.g. "info", "ovpn_updown=debug")
    pub loglevel: String,
    /// Append logs to this file instead of stderr; empty means stderr
    pub logfile: String,
    /// Upper bound for every database and cache interaction
    pub store_timeout_secs: u64,
    pub pfctl: PfctlConfig,
    pub mysql: MysqlConfig,
    pub memcache: MemcacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PfctlConfig {
    pub enable: bool,
    pub path: String,
    /// Appended to a network codename to form its client table
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    /// host[:port]
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Extra connection URL parameters, e.g. "prefer_socket=false"
    pub properties: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemcacheConfig {
    /// host:port
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            logfile: String::new(),
            store_timeout_secs: 5,
            pfctl: PfctlConfig::default(),
            mysql: MysqlConfig::default(),
            memcache: MemcacheConfig::default(),
        }
    }
}

impl Default for PfctlConfig {
    fn default() -> Self {
        Self {
            enable: true,
            path: "/sbin/pfctl".to_string(),
            suffix: "_clients".to_string(),
        }
    }
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:3306".to_string(),
            username: "root".to_string(),
            password: String::new(),
            database: "echoCTF".to_string(),
            properties: String::new(),
        }
    }
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:11211".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::validate_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Make sure the path exists and is a regular file
    pub fn validate_path(path: &Path) -> Result<(), ConfigError> {
        let meta = std::fs::metadata(path)?;
        if meta.is_dir() {
            return Err(ConfigError::InvalidPath(format!(
                "'{}' is a directory, not a normal file",
                path.display()
            )));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

impl MysqlConfig {
    /// Server address and extra parameters as a URL. Credentials and the
    /// database name are not part of it; they are set field by field so any
    /// character is allowed in them.
    pub fn server_url(&self) -> String {
        let mut url = format!("mysql://{}/", self.host);
        let properties = self.properties.trim_start_matches('?');
        if !properties.is_empty() {
            url.push('?');
            url.push_str(properties);
        }
        url
    }
}

impl MemcacheConfig {
    /// Connection URL understood by `memcache::Client::connect`
    pub fn url(&self, timeout: Duration) -> String {
        format!("memcache://{}?timeout={}", self.host, timeout.as_secs().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.pfctl.enable);
        assert_eq!(config.pfctl.path, "/sbin/pfctl");
        assert_eq!(config.pfctl.suffix, "_clients");
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            loglevel = "debug"

            [pfctl]
            enable = false
            "#,
        )
        .unwrap();

        assert_eq!(config.loglevel, "debug");
        assert!(!config.pfctl.enable);
        assert_eq!(config.pfctl.suffix, "_clients");
        assert_eq!(config.memcache.host, "127.0.0.1:11211");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.pfctl.suffix = "_vpn".to_string();
        config.mysql.database = "ctf".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.pfctl.suffix, "_vpn");
        assert_eq!(loaded.mysql.database, "ctf");
    }

    #[test]
    fn test_load_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidPath(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(&temp_dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_mysql_server_url_has_no_credentials() {
        let mut mysql = MysqlConfig {
            host: "db:3306".to_string(),
            username: "vpn".to_string(),
            password: "s3cr#t".to_string(),
            database: "echoCTF".to_string(),
            properties: String::new(),
        };
        assert_eq!(mysql.server_url(), "mysql://db:3306/");

        mysql.properties = "?prefer_socket=false".to_string();
        assert_eq!(mysql.server_url(), "mysql://db:3306/?prefer_socket=false");
    }

    #[test]
    fn test_memcache_url() {
        let memcache = MemcacheConfig {
            host: "cache:11211".to_string(),
        };
        assert_eq!(
            memcache.url(Duration::from_secs(5)),
            "memcache://cache:11211?timeout=5"
        );
        assert_eq!(
            memcache.url(Duration::from_millis(10)),
            "memcache://cache:11211?timeout=1"
        );
    }
}
