//! Tool configuration.
//!
//! All tools read the same optional TOML file (`SMSGW_CONFIG`, default
//! `/etc/sms-gateway/tools.toml`). Every field has a default, so a host with
//! no file behaves exactly like a stock SMS Gateway install.
//!
//! ```toml
//! [network]
//! netplan_dir = "/etc/netplan"
//!
//! [ssl]
//! php_fpm_socket = "/run/php/php8.3-fpm.sock"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SMSGW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sms-gateway/tools.toml";

/// Upper bound for `sms.dedup_window_minutes` (one week).
pub const MAX_DEDUP_WINDOW_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key} in {path}: {value}")]
    InvalidValue {
        path: PathBuf,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub network: NetworkSettings,
    pub sms: SmsSettings,
    pub ssl: SslSettings,
    pub database: DatabaseSettings,
}

impl ToolsConfig {
    /// Load from `SMSGW_CONFIG` or the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let window = self.sms.dedup_window_minutes;
        if !(0..=MAX_DEDUP_WINDOW_MINUTES).contains(&window) {
            return Err(ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: "sms.dedup_window_minutes".into(),
                value: window.to_string(),
            });
        }
        Ok(())
    }
}

// ── Network ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub netplan_dir: PathBuf,
    /// Command line used to apply a rewritten netplan file.
    pub apply_command: Vec<String>,
    /// Host pinged to decide whether the internet is reachable.
    pub internet_probe: String,
    pub ping_timeout_secs: u64,
    pub apply_timeout_secs: u64,
    /// Interface name prefixes never treated as the primary interface.
    pub ignored_prefixes: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            netplan_dir: PathBuf::from("/etc/netplan"),
            apply_command: vec!["sudo".into(), "netplan".into(), "apply".into()],
            internet_probe: "8.8.8.8".into(),
            ping_timeout_secs: 5,
            apply_timeout_secs: 30,
            ignored_prefixes: vec!["lo".into(), "docker".into(), "br-".into(), "veth".into()],
        }
    }
}

// ── SMS ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    /// Longest message (in characters) accepted for sending.
    pub max_message_chars: usize,
    pub create_timeout_secs: u64,
    pub send_timeout_secs: u64,
    /// Half-width of the duplicate detection window.
    pub dedup_window_minutes: i64,
    pub daemon_interval_secs: u64,
    /// The PHP application's dotenv file holding database credentials.
    pub env_file: PathBuf,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            max_message_chars: 1600,
            create_timeout_secs: 30,
            send_timeout_secs: 60,
            dedup_window_minutes: 5,
            daemon_interval_secs: 30,
            env_file: PathBuf::from("/var/www/html/sms-gateway/config/.env"),
        }
    }
}

// ── SSL ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SslSettings {
    pub ssl_dir: PathBuf,
    pub nginx_ssl_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub cert_file: String,
    pub key_file: String,
    /// nginx site file rewritten by `update_nginx`.
    pub nginx_site: PathBuf,
    pub server_name: String,
    pub web_root: String,
    pub php_fpm_socket: String,
    pub access_log: String,
    pub error_log: String,
}

impl SslSettings {
    pub fn cert_path(&self) -> PathBuf {
        self.ssl_dir.join(&self.cert_file)
    }

    pub fn key_path(&self) -> PathBuf {
        self.ssl_dir.join(&self.key_file)
    }

    pub fn nginx_cert_path(&self) -> PathBuf {
        self.nginx_ssl_dir.join(&self.cert_file)
    }

    pub fn nginx_key_path(&self) -> PathBuf {
        self.nginx_ssl_dir.join(&self.key_file)
    }
}

impl Default for SslSettings {
    fn default() -> Self {
        Self {
            ssl_dir: PathBuf::from("/etc/ssl/sms-gateway"),
            nginx_ssl_dir: PathBuf::from("/etc/nginx/ssl"),
            backup_dir: PathBuf::from("/var/backups/ssl"),
            cert_file: "sms-gateway.crt".into(),
            key_file: "sms-gateway.key".into(),
            nginx_site: PathBuf::from("/etc/nginx/sites-enabled/sms-gateway"),
            server_name: "localhost".into(),
            web_root: "/var/www/html/sms-gateway/public".into(),
            php_fpm_socket: "/var/run/php/php8.3-fpm.sock".into(),
            access_log: "/var/log/nginx/sms-gateway.access.log".into(),
            error_log: "/var/log/nginx/sms-gateway.error.log".into(),
        }
    }
}

// ── Database ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            user: "root".into(),
            password: String::new(),
            database: "sms_gateway".into(),
        }
    }
}

impl DatabaseSettings {
    /// Overlay `DB_*` keys from the PHP application's dotenv file.
    ///
    /// A missing file leaves the settings untouched.
    pub fn apply_env_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        for (key, value) in parse_dotenv(&raw) {
            match key.as_str() {
                "DB_HOST" => self.host = value,
                "DB_PORT" => {
                    self.port = value.parse().map_err(|_| ConfigError::InvalidValue {
                        path: path.to_path_buf(),
                        key,
                        value: value.clone(),
                    })?
                }
                "DB_USER" => self.user = value,
                "DB_PASS" => self.password = value,
                "DB_NAME" => self.database = value,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parse `KEY=value` lines, skipping blanks and `#` comments and stripping
/// one layer of surrounding quotes.
pub fn parse_dotenv(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ToolsConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.network.netplan_dir, PathBuf::from("/etc/netplan"));
        assert_eq!(cfg.sms.max_message_chars, 1600);
        assert_eq!(cfg.ssl.cert_file, "sms-gateway.crt");
        assert_eq!(cfg.database.port, 3306);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[network]\nnetplan_dir = \"/tmp/np\"\n\n[ssl]\nphp_fpm_socket = \"/run/php.sock\""
        )
        .unwrap();

        let cfg = ToolsConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.network.netplan_dir, PathBuf::from("/tmp/np"));
        assert_eq!(cfg.network.internet_probe, "8.8.8.8");
        assert_eq!(cfg.ssl.php_fpm_socket, "/run/php.sock");
        assert_eq!(cfg.ssl.backup_dir, PathBuf::from("/var/backups/ssl"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network\nnetplan_dir = ").unwrap();
        assert!(matches!(
            ToolsConfig::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn dotenv_parsing() {
        let pairs = parse_dotenv(
            "# comment\n\nDB_HOST=db.local\nDB_PASS=\"s3cr=t\"\nDB_USER = 'gateway'\nNOEQUALS\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("DB_HOST".to_string(), "db.local".to_string()),
                ("DB_PASS".to_string(), "s3cr=t".to_string()),
                ("DB_USER".to_string(), "gateway".to_string()),
            ]
        );
    }

    #[test]
    fn dedup_window_must_be_in_range() {
        for value in ["-1", "10081", "9223372036854775807"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[sms]\ndedup_window_minutes = {value}").unwrap();
            match ToolsConfig::load_from(file.path()) {
                Err(ConfigError::InvalidValue { key, value: v, .. }) => {
                    assert_eq!(key, "sms.dedup_window_minutes");
                    assert_eq!(v, value);
                }
                other => panic!("unexpected result for {value}: {other:?}"),
            }
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sms]\ndedup_window_minutes = 0").unwrap();
        assert_eq!(ToolsConfig::load_from(file.path()).unwrap().sms.dedup_window_minutes, 0);
    }

    #[test]
    fn env_file_overrides_database_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "APP_ENV=prod\nDB_HOST=10.0.0.5\nDB_PORT=3307\nDB_USER=sms\nDB_PASS=p@ss\nDB_NAME=gw"
        )
        .unwrap();

        let mut db = DatabaseSettings::default();
        db.apply_env_file(file.path()).unwrap();
        assert_eq!(db.host, "10.0.0.5");
        assert_eq!(db.port, 3307);
        assert_eq!(db.user, "sms");
        assert_eq!(db.password, "p@ss");
        assert_eq!(db.database, "gw");
    }

    #[test]
    fn bad_port_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DB_PORT=abc").unwrap();
        let mut db = DatabaseSettings::default();
        assert!(matches!(
            db.apply_env_file(file.path()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
