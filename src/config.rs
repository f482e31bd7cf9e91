// Configuration loading and parsing (draftroom.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Assembled config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the WebSocket server.
    pub port: u16,
    /// SQLite database path.
    pub db_path: String,
    /// Directory for log files.
    pub log_dir: String,
}

// ---------------------------------------------------------------------------
// draftroom.toml sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ServerSection {
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection { port: 9173 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct DatabaseSection {
    /// Absent means the platform data directory.
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct LoggingSection {
    dir: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection { dir: "logs".into() }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration from `draftroom.toml` in the current directory,
/// falling back to defaults when the file is absent.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = Path::new("draftroom.toml");
    if path.exists() {
        load_config_from(path)
    } else {
        assemble(ConfigFile::default())
    }
}

/// Load configuration from an explicit path. Unlike [`load_config`], a
/// missing file here is an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    assemble(file)
}

fn assemble(file: ConfigFile) -> Result<Config, ConfigError> {
    if file.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "port must be non-zero".into(),
        });
    }
    if file.logging.dir.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "logging.dir".into(),
            message: "log directory must not be empty".into(),
        });
    }
    Ok(Config {
        port: file.server.port,
        db_path: file.database.path.unwrap_or_else(default_db_path),
        log_dir: file.logging.dir,
    })
}

/// Default database location under the platform data directory, falling
/// back to the working directory when no home is resolvable (containers).
fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "draftroom")
        .map(|dirs| {
            dirs.data_dir()
                .join("draftroom.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "draftroom.db".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: write a temp config file and load it.
    fn load_str(name: &str, contents: &str) -> Result<Config, ConfigError> {
        let path = std::env::temp_dir().join(format!("draftroom_test_{}_{name}.toml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        let result = load_config_from(&path);
        let _ = std::fs::remove_file(&path);
        result
    }

    #[test]
    fn defaults_when_sections_missing() {
        let config = load_str("empty", "").unwrap();
        assert_eq!(config.port, 9173);
        assert_eq!(config.log_dir, "logs");
        assert!(!config.db_path.is_empty());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = load_str(
            "full",
            r#"
            [server]
            port = 4242

            [database]
            path = "/tmp/draftroom-test.db"

            [logging]
            dir = "log-out"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 4242);
        assert_eq!(config.db_path, "/tmp/draftroom-test.db");
        assert_eq!(config.log_dir, "log-out");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = load_str("partial", "[server]\nport = 8000\n").unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = load_str("broken", "[server\nport = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_port_is_validation_error() {
        let err = load_str("zero_port", "[server]\nport = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "server.port"
        ));
    }

    #[test]
    fn missing_explicit_path_is_file_not_found() {
        let err = load_config_from(Path::new("/nonexistent/draftroom.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
