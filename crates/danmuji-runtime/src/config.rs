//! Layered settings: built-in defaults, then the TOML file, then CLI flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use danmuji_core::AggregationConfig;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for `{key}`: {detail}")]
    Invalid { key: &'static str, detail: String },
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub ws_path: Option<String>,
    pub combo_window_secs: Option<u64>,
    pub heartbeat_secs: Option<u64>,
    pub prune_tolerance_rows: Option<u16>,
    pub request_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server: String,
    pub ws_path: String,
    pub aggregation: AggregationConfig,
    pub heartbeat: Duration,
    pub prune_tolerance_rows: u16,
    pub request_timeout: Duration,
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:9000".to_string(),
            ws_path: "/api/ws".to_string(),
            aggregation: AggregationConfig::default(),
            heartbeat: Duration::from_secs(20),
            prune_tolerance_rows: 1,
            request_timeout: Duration::from_secs(10),
            log_file: None,
            log_filter: None,
        }
    }
}

impl Settings {
    /// Resolve settings for this invocation.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) => read_optional(&path)?,
                None => FileConfig::default(),
            },
        };
        let mut settings = Self::from_file(file)?;
        if let Some(server) = &cli.server {
            settings.server = normalize_server(server, "server")?;
        }
        if let Some(secs) = cli.combo {
            settings.aggregation = AggregationConfig::with_window_secs(secs);
        }
        Ok(settings)
    }

    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(server) = file.server {
            settings.server = normalize_server(&server, "server")?;
        }
        if let Some(path) = file.ws_path {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    key: "ws_path",
                    detail: format!("{path:?} must start with '/'"),
                });
            }
            settings.ws_path = path;
        }
        if file.combo_window_secs.is_some() {
            settings.aggregation = AggregationConfig {
                combo_window_secs: file.combo_window_secs,
            };
        }
        if let Some(secs) = file.heartbeat_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "heartbeat_secs",
                    detail: "must be greater than 0".to_string(),
                });
            }
            settings.heartbeat = Duration::from_secs(secs);
        }
        if let Some(rows) = file.prune_tolerance_rows {
            settings.prune_tolerance_rows = rows;
        }
        if let Some(secs) = file.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(secs);
        }
        settings.log_file = file.log_file;
        settings.log_filter = file.log_filter;
        Ok(settings)
    }

    /// Websocket base derived from the REST base: `http` -> `ws`,
    /// `https` -> `wss`.
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.server.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server.clone()
        }
    }
}

/// `$XDG_CONFIG_HOME/danmuji/config.toml`, else `~/.config/danmuji/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("danmuji").join("config.toml"));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/danmuji/config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`read_file`], but a missing file means defaults.
fn read_optional(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(FileConfig::default());
    }
    read_file(path)
}

fn normalize_server(raw: &str, key: &'static str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            key,
            detail: format!("{raw:?} must start with http:// or https://"),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use danmuji_core::ComboWindow;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("danmuji").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_file(FileConfig::default()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.aggregation.window(), ComboWindow::Disabled);
        assert_eq!(settings.ws_base(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn file_values_apply() {
        let file = write_config(
            r#"
server = "https://live.example.com/"
ws_path = "/feed"
combo_window_secs = 3
heartbeat_secs = 5
prune_tolerance_rows = 2
log_filter = "debug"
"#,
        );
        let path = file.path().to_str().unwrap();
        let settings = Settings::load(&cli(&["--config", path, "--server", "http://override:1"]))
            .unwrap();
        // CLI wins over the file.
        assert_eq!(settings.server, "http://override:1");
        assert_eq!(settings.ws_path, "/feed");
        assert_eq!(settings.aggregation.window(), ComboWindow::Millis(3000));
        assert_eq!(settings.heartbeat, Duration::from_secs(5));
        assert_eq!(settings.prune_tolerance_rows, 2);
        assert_eq!(settings.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn https_maps_to_wss() {
        let settings = Settings::from_file(FileConfig {
            server: Some("https://live.example.com/".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(settings.server, "https://live.example.com");
        assert_eq!(settings.ws_base(), "wss://live.example.com");
    }

    #[test]
    fn combo_flag_overrides_file() {
        let file = write_config("combo_window_secs = 3\n");
        let path = file.path().to_str().unwrap();
        let settings = Settings::load(&cli(&["--config", path, "--combo", "0"])).unwrap();
        assert_eq!(settings.aggregation.window(), ComboWindow::Disabled);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let file = write_config("colour = \"red\"\n");
        let path = file.path().to_str().unwrap();
        let err = Settings::load(&cli(&["--config", path])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err}");
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let err = Settings::from_file(FileConfig {
            heartbeat_secs: Some(0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("heartbeat_secs"));
    }

    #[test]
    fn bad_server_scheme_is_rejected() {
        let err = Settings::from_file(FileConfig {
            server: Some("127.0.0.1:9000".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "server", .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = Settings::load(&cli(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn implicit_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = read_optional(&dir.path().join("config.toml")).unwrap();
        assert_eq!(file, FileConfig::default());
    }
}
