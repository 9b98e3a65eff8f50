//! Configuration for the relay process.
//!
//! Layered, with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/socket-relay/config.toml`)
//! 4. Compiled defaults
//!
//! The only real knobs are the two listener addresses; their ports must be
//! distinct because both servers run in one process.

use std::path::PathBuf;

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Both listeners resolved to the same port.
    #[error("native and socket.io listeners must use distinct ports (got {native} and {socketio})")]
    BindConflict {
        /// Resolved native WebSocket bind address.
        native: String,
        /// Resolved Socket.IO bind address.
        socketio: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    native_bind: Option<String>,
    socketio_bind: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay process.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Side-by-side WebSocket and Socket.IO message relay")]
pub struct RelayCliArgs {
    /// Address for the raw WebSocket listener.
    #[arg(long, env = "NATIVE_ADDR")]
    pub native_bind: Option<String>,

    /// Address for the Socket.IO listener.
    #[arg(long, env = "SOCKETIO_ADDR")]
    pub socketio_bind: Option<String>,

    /// Path to config file (default: `~/.config/socket-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address for the raw WebSocket server.
    pub native_bind: String,
    /// Bind address for the Socket.IO server.
    pub socketio_bind: String,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            native_bind: "0.0.0.0:8080".to_string(),
            socketio_bind: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or if the two listeners resolve to the same port.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            native_bind: cli
                .native_bind
                .clone()
                .or_else(|| file.server.native_bind.clone())
                .unwrap_or(defaults.native_bind),
            socketio_bind: cli
                .socketio_bind
                .clone()
                .or_else(|| file.server.socketio_bind.clone())
                .unwrap_or(defaults.socketio_bind),
            log_level: cli.log_level.clone(),
        }
    }

    /// Rejects configurations where both listeners share a port.
    fn validate(&self) -> Result<(), ConfigError> {
        let same_port = match (port_of(&self.native_bind), port_of(&self.socketio_bind)) {
            (Some(a), Some(b)) => a == b,
            _ => self.native_bind == self.socketio_bind,
        };
        if same_port {
            return Err(ConfigError::BindConflict {
                native: self.native_bind.clone(),
                socketio: self.socketio_bind.clone(),
            });
        }
        Ok(())
    }
}

/// Extracts the port component of a `host:port` address string.
fn port_of(addr: &str) -> Option<&str> {
    addr.rsplit_once(':').map(|(_, port)| port)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse the TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("socket-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo_ports() {
        let config = RelayConfig::default();
        assert_eq!(config.native_bind, "0.0.0.0:8080");
        assert_eq!(config.socketio_bind, "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn toml_parsing_full() {
        let toml_str = r#"
[server]
native_bind = "127.0.0.1:9001"
socketio_bind = "127.0.0.1:9002"
"#;
        let file: RelayConfigFile = toml::from_str(toml_str).unwrap();
        let cli = RelayCliArgs::default();
        let config = RelayConfig::resolve(&cli, &file);

        assert_eq!(config.native_bind, "127.0.0.1:9001");
        assert_eq!(config.socketio_bind, "127.0.0.1:9002");
    }

    #[test]
    fn toml_parsing_partial() {
        let toml_str = r#"
[server]
socketio_bind = "127.0.0.1:9002"
"#;
        let file: RelayConfigFile = toml::from_str(toml_str).unwrap();
        let cli = RelayCliArgs::default();
        let config = RelayConfig::resolve(&cli, &file);

        assert_eq!(config.native_bind, "0.0.0.0:8080"); // default
        assert_eq!(config.socketio_bind, "127.0.0.1:9002"); // from file
    }

    #[test]
    fn toml_parsing_empty() {
        let file: RelayConfigFile = toml::from_str("").unwrap();
        let cli = RelayCliArgs::default();
        let config = RelayConfig::resolve(&cli, &file);

        assert_eq!(config.native_bind, "0.0.0.0:8080");
        assert_eq!(config.socketio_bind, "0.0.0.0:3000");
    }

    #[test]
    fn cli_overrides_file() {
        let toml_str = r#"
[server]
native_bind = "127.0.0.1:9001"
socketio_bind = "127.0.0.1:9002"
"#;
        let file: RelayConfigFile = toml::from_str(toml_str).unwrap();
        let cli = RelayCliArgs {
            native_bind: Some("0.0.0.0:7000".to_string()),
            socketio_bind: None, // not set on CLI — should fall through to file
            ..Default::default()
        };
        let config = RelayConfig::resolve(&cli, &file);

        assert_eq!(config.native_bind, "0.0.0.0:7000"); // from CLI
        assert_eq!(config.socketio_bind, "127.0.0.1:9002"); // from file
    }

    #[test]
    fn distinct_ports_pass_validation() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn same_port_is_rejected() {
        let config = RelayConfig {
            native_bind: "0.0.0.0:8080".to_string(),
            socketio_bind: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::BindConflict { .. })));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = load_config_file(None);
        assert!(result.is_ok());
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(std::path::Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
