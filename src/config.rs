//! Line-oriented `key = value` configuration loader and the typed view over
//! it that the rest of the gateway uses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config value {key:?} = {value:?} is not a valid {want}")]
    InvalidValue {
        key: String,
        value: String,
        want: &'static str,
    },
}

/// Raw `name -> value` map loaded from a config file, last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct Configure {
    values: BTreeMap<String, String>,
}

impl Configure {
    /// Load a config file. UTF-8 with an optional leading BOM; `#` starts a
    /// comment line; blank names are skipped; later `key = value` lines
    /// override earlier ones for the same key.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&bytes))
    }

    fn parse(bytes: &[u8]) -> Self {
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
        let text = String::from_utf8_lossy(bytes);

        let mut values = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            values.insert(name.to_string(), value.trim().to_string());
        }
        Self { values }
    }

    pub fn find(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.find(name).unwrap_or(default)
    }

    pub fn get_as<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
    {
        match self.find(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: name.to_string(),
                value: raw.to_string(),
                want: std::any::type_name::<T>(),
            }),
        }
    }
}

/// The typed configuration the gateway actually runs on, built once from a
/// loaded [`Configure`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub data_path: PathBuf,
    pub log_path: PathBuf,
    pub http_server_port: u16,
    pub http_keep_alive_timeout_sec: u64,
    pub http_keep_alive_max_count: u32,
    pub irc_close_timeout_sec: u64,
    pub websocket_close_timeout_sec: u64,
    pub ssl_certificate_chain_file: Option<PathBuf>,
    pub ssl_certificate_file: Option<PathBuf>,
    pub ssl_private_key_file: Option<PathBuf>,
    pub ssl_certificate_password: String,
}

impl GatewayConfig {
    pub fn from_configure(conf: &Configure) -> Result<Self, ConfigError> {
        Ok(Self {
            data_path: PathBuf::from(conf.get("data_path", "./Data")),
            log_path: PathBuf::from(conf.get("log_path", "./Data/Log")),
            http_server_port: conf.get_as("http_server_port", 8080)?,
            http_keep_alive_timeout_sec: conf.get_as("http_server_keep_alive_timeout_sec", 5)?,
            http_keep_alive_max_count: conf.get_as("http_server_keep_alive_max_count", 20)?,
            irc_close_timeout_sec: conf.get_as("irc_client_close_timeout_sec", 5)?,
            websocket_close_timeout_sec: conf.get_as("websocket_server_close_timeout_sec", 5)?,
            ssl_certificate_chain_file: conf.find("ssl_certificate_chain_file").map(PathBuf::from),
            ssl_certificate_file: conf.find("ssl_certificate_file").map(PathBuf::from),
            ssl_private_key_file: conf.find("ssl_private_key_file").map(PathBuf::from),
            ssl_certificate_password: conf.get("ssl_certificate_password", "").to_string(),
        })
    }

    pub fn archive_db_path(&self) -> PathBuf {
        self.data_path.join("Archive.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.data_path.join("User.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_bom_comments_and_blank_lines() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"# comment\n\ndata_path = /srv/data\n");
        let conf = Configure::parse(&bytes);
        assert_eq!(conf.find("data_path"), Some("/srv/data"));
    }

    #[test]
    fn trims_key_and_value_whitespace() {
        let conf = Configure::parse(b"  http_server_keep_alive_timeout_sec  =   7  \n");
        assert_eq!(conf.find("http_server_keep_alive_timeout_sec"), Some("7"));
    }

    #[test]
    fn last_write_wins_on_duplicate_keys() {
        let conf = Configure::parse(b"data_path = /first\ndata_path = /second\n");
        assert_eq!(conf.find("data_path"), Some("/second"));
    }

    #[test]
    fn get_as_parses_typed_values_with_default_fallback() {
        let conf = Configure::parse(b"irc_client_close_timeout_sec = 9\n");
        let v: u64 = conf.get_as("irc_client_close_timeout_sec", 5).unwrap();
        assert_eq!(v, 9);
        let v: u64 = conf.get_as("missing_key", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn gateway_config_builds_with_defaults() {
        let conf = Configure::default();
        let cfg = GatewayConfig::from_configure(&conf).unwrap();
        assert_eq!(cfg.data_path, PathBuf::from("./Data"));
        assert_eq!(cfg.http_keep_alive_max_count, 20);
    }
}
