// ABOUTME: Configuration loading for the gambit server
// ABOUTME: TOML file with per-section defaults; CLI flags override file values

use anyhow::{Context, Result};
use gambit_core::{SupervisorConfig, DEFAULT_CLIENT_QUEUE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket listener settings
    pub server: ServerConfig,
    /// Where engine binaries live
    pub engines: EnginesConfig,
    /// Engine process handling
    pub supervisor: SupervisorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (default: 127.0.0.1)
    pub host: String,
    /// Port to bind (default: 8000)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Root directory holding one sub-directory per engine
    pub dir: PathBuf,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("engines"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Milliseconds an engine gets to exit after a termination request
    pub terminate_grace_ms: u64,
    /// Per-client queue of pending engine lines before the client is dropped
    pub client_queue: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            terminate_grace_ms: 3000,
            client_queue: DEFAULT_CLIENT_QUEUE,
        }
    }
}

impl Config {
    /// Get the config directory for gambit (~/.config/gambit)
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gambit")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from `path` if given (must exist), else from the default location
    /// when present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            terminate_grace: Duration::from_millis(self.supervisor.terminate_grace_ms),
        }
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# gambit configuration
# Location: ~/.config/gambit/config.toml

[server]
host = "127.0.0.1"
port = 8000

[engines]
# One sub-directory per engine, each holding the engine executable.
dir = "engines"

[supervisor]
# How long an engine gets to quit before it is killed.
terminate_grace_ms = 3000
# Engine lines buffered per client before a slow client is disconnected.
client_queue = 256
"#
        .to_string()
    }

    /// Write the default config file to `path` unless one already exists
    pub fn init(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        std::fs::write(path, Self::default_toml())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(true)
    }
}
