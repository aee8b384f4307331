//! Configuration module for the hello-gate server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug, Default)]
#[command(name = "hello-gate")]
#[command(author = "hello-gate authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP server enforcing a hello/negotiate/bye session protocol", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of pending (not yet accepted) connections
    #[arg(short, long)]
    pub backlog: Option<u32>,

    /// Bytes read from a client per receive
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Close a session after this many consecutive receive errors
    #[arg(long)]
    pub max_receive_errors: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending-connection queue length
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

/// Per-connection session configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Receive buffer capacity in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Consecutive receive errors tolerated before closing (unbounded if unset)
    pub max_receive_errors: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_receive_errors: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backlog() -> u32 {
    10
}

fn default_buffer_size() -> usize {
    // "negotiate\r\n" plus terminator fits
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub buffer_size: usize,
    pub max_receive_errors: Option<u32>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve configuration from already-parsed CLI args.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            buffer_size: cli.buffer_size.unwrap_or(toml_config.session.buffer_size),
            max_receive_errors: cli
                .max_receive_errors
                .or(toml_config.session.max_receive_errors),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be positive"));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be positive"));
        }
        if self.max_receive_errors == Some(0) {
            return Err(ConfigError::Invalid("max_receive_errors must be positive"));
        }
        Ok(())
    }

    /// The `host:port` string the listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.buffer_size, 16);
        assert_eq!(config.max_receive_errors, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            backlog = 128

            [session]
            buffer_size = 64
            max_receive_errors = 3

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.session.buffer_size, 64);
        assert_eq!(config.session.max_receive_errors, Some(3));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[server]\nport = 7000\n").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.session.buffer_size, 16);
    }

    #[test]
    fn test_cli_overrides_file() {
        let path = std::env::temp_dir().join(format!("hello-gate-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nhost = \"0.0.0.0\"\nport = 9000").unwrap();
        drop(file);

        let cli = CliArgs {
            config: Some(path.clone()),
            port: Some(9100),
            ..Default::default()
        };
        let config = Config::from_args(cli).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert_eq!(config.backlog, 10);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = CliArgs::try_parse_from([
            "hello-gate",
            "-H",
            "0.0.0.0",
            "-p",
            "9001",
            "--backlog",
            "32",
            "--buffer-size",
            "128",
        ])
        .unwrap();
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.listen_address(), "0.0.0.0:9001");
        assert_eq!(config.backlog, 32);
        assert_eq!(config.buffer_size, 128);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let cli = CliArgs {
            buffer_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(Config::from_args(cli), Err(ConfigError::Invalid(_))));

        let cli = CliArgs {
            backlog: Some(0),
            ..Default::default()
        };
        assert!(matches!(Config::from_args(cli), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_file() {
        let path = std::env::temp_dir().join(format!("hello-gate-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nport = \"not a number\"\n").unwrap();

        let cli = CliArgs {
            config: Some(path.clone()),
            ..Default::default()
        };
        let result = Config::from_args(cli);
        std::fs::remove_file(&path).unwrap();

        match result {
            Err(ConfigError::TomlParse(p, _)) => assert_eq!(p, path),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let cli = CliArgs {
            config: Some(PathBuf::from("/nonexistent/hello-gate.toml")),
            ..Default::default()
        };
        assert!(matches!(
            Config::from_args(cli),
            Err(ConfigError::FileRead(_, _))
        ));
    }
}
