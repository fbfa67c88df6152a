use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notification::EmailSettings;
use crate::notification::ntfy::DEFAULT_SERVER;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: Logging,
    pub database: DatabaseConfig,
    pub engine: Engine,
    pub maintenance: Maintenance,
    pub notifications: Notifications,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    /// "compact" or "json"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Local database file, used when `url` is unset
    pub path: String,
    /// Remote libsql server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// Applied to monitors without their own timeout
    pub default_timeout_seconds: u64,
    /// Result bus buffer per subscriber
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Maintenance {
    pub enabled: bool,
    pub tick_seconds: u64,
    pub lookahead_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    /// ntfy server for channels that don't name one
    pub ntfy_server: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "uppe-sentinel.db".into(), url: None, auth_token: None }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self { default_timeout_seconds: 30, event_capacity: 1024 }
    }
}

impl Default for Maintenance {
    fn default() -> Self {
        Self { enabled: true, tick_seconds: 60, lookahead_seconds: 300 }
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self { ntfy_server: DEFAULT_SERVER.into() }
    }
}

impl Engine {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds.max(1))
    }
}

impl Maintenance {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    /// Never shorter than one tick
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_seconds).max(self.tick())
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/sentinel.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/sentinel.toml"))
}

fn mask(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "********" } else { "(unset)" }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        write_title_1(f, "Database")?;
        match &self.database.url {
            Some(url) => {
                write_1(f, "URL", url)?;
                write_1(f, "Auth Token", &mask(&self.database.auth_token))?;
            }
            None => write_1(f, "Path", &self.database.path)?,
        }

        write_title_1(f, "Engine")?;
        write_1(f, "Default Timeout (s)", &self.engine.default_timeout_seconds)?;
        write_1(f, "Event Capacity", &self.engine.event_capacity)?;

        write_title_1(f, "Maintenance")?;
        write_1(f, "Enabled", &self.maintenance.enabled)?;
        write_1(f, "Tick (s)", &self.maintenance.tick_seconds)?;
        write_1(f, "Lookahead (s)", &self.maintenance.lookahead_seconds)?;

        write_title_1(f, "Notifications")?;
        write_1(f, "ntfy Server", &self.notifications.ntfy_server)?;

        write_title_1(f, "Email")?;
        match &self.email {
            Some(email) => {
                write_1(f, "SMTP Host", &email.host)?;
                write_1(f, "SMTP Port", &email.port.map(|p| p.to_string()).unwrap_or_else(|| "(default)".into()))?;
                write_1(f, "Username", &email.username.as_deref().unwrap_or("(unset)"))?;
                write_1(f, "Password", &mask(&email.password))?;
                write_1(f, "From", &email.from.as_deref().unwrap_or("(unset)"))?;
            }
            None => write_1(f, "Transport", &"from SMTP_* environment, if set")?,
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/sentinel.toml
    ///  or the specified path if one does not exist
    ///
    /// ```rust,no_run
    /// use std::path;
    /// use uppe_sentinel::config;
    ///
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Global SMTP settings: the `[email]` section, else `SMTP_*` variables
    pub fn email_settings(&self) -> Option<EmailSettings> {
        self.email.clone().or_else(EmailSettings::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/sentinel.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.engine.default_timeout_seconds, 30);
        assert_eq!(config.maintenance.tick(), Duration::from_secs(60));
        assert_eq!(config.maintenance.lookahead(), Duration::from_secs(300));
        assert_eq!(config.notifications.ntfy_server, "https://ntfy.sh");

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.database.path, config.database.path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sentinel.toml");
        fs::write(
            &path,
            r#"
[engine]
default_timeout_seconds = 10

[email]
host = "smtp.example.com"
port = 587
password = "hunter2"
"#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.engine.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine.event_capacity, 1024);
        assert_eq!(config.logging.level, "info");

        let email = config.email_settings().unwrap();
        assert_eq!(email.host, "smtp.example.com");
        assert_eq!(email.port, Some(587));
    }

    #[test]
    fn test_lookahead_covers_at_least_one_tick() {
        let mut maintenance = Maintenance { enabled: true, tick_seconds: 120, lookahead_seconds: 30 };
        assert_eq!(maintenance.lookahead(), Duration::from_secs(120));

        maintenance.lookahead_seconds = 0;
        assert_eq!(maintenance.lookahead(), Duration::from_secs(120));

        maintenance.tick_seconds = 0;
        assert_eq!(maintenance.lookahead(), Duration::from_secs(1));

        maintenance.lookahead_seconds = 600;
        assert_eq!(maintenance.lookahead(), Duration::from_secs(600));
    }

    #[test]
    fn test_path_without_extension_is_normalized() {
        let temp_dir = tempfile::tempdir().unwrap();
        Config::from_config(Some(temp_dir.path().join("sentinel"))).unwrap();
        assert!(temp_dir.path().join("sentinel.toml").exists());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[engine\nnope").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }

    #[test]
    fn test_display_masks_secrets() {
        let mut config = Config::default();
        config.database.url = Some("libsql://db.example.com".into());
        config.database.auth_token = Some("secret-token".into());
        config.email = Some(EmailSettings {
            host: "smtp.example.com".into(),
            port: None,
            username: Some("alerts".into()),
            password: Some("hunter2".into()),
            from: None,
            secure: None,
        });

        let rendered = config.to_string();
        assert!(rendered.contains("libsql://db.example.com"));
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
    }
}
