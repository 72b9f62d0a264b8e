use crate::middleware::OriginPolicy;
use anyhow::{bail, Context, Result};
use dooray_mcp::{McpServer, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub dooray: DoorayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Endpoint serving POST/GET/DELETE for the MCP protocol.
    #[serde(default = "default_path")]
    pub path: String,

    /// Origins accepted on the MCP endpoint, e.g. `http://localhost` (any
    /// port) or `https://app.example.com:8443`. `*` accepts every origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_path() -> String {
    "/mcp".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "https://localhost".to_string(),
        "http://127.0.0.1".to_string(),
        "https://127.0.0.1".to_string(),
        "http://[::1]".to_string(),
    ]
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            allowed_origins: default_allowed_origins(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Idle limit for a session created by a request without
    /// `Mcp-Session-Id` until a later request presents its id.
    #[serde(default = "default_unclaimed_timeout_secs")]
    pub unclaimed_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Events retained per session for stream resumption.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_unclaimed_timeout_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_event_capacity() -> usize {
    256
}

fn default_max_sessions() -> usize {
    1024
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            unclaimed_timeout_secs: default_unclaimed_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            event_capacity: default_event_capacity(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// How the final result of a streaming tool call reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// The POST stays open and carries the result; progress goes to the stream.
    #[default]
    Wait,
    /// The POST is answered with 202 and the result is pushed to the stream.
    Ack,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default)]
    pub mode: StreamingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorayConfig {
    /// API endpoint; `DOORAY_BASE_URL` takes precedence.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DoorayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read configuration file {}", config_path.display()))?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file {} not found, using defaults", config_path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.http.path.starts_with('/') {
            bail!("http.path must start with '/', got {:?}", self.http.path);
        }
        if self.http.path == "/health" {
            bail!("http.path must not shadow /health");
        }
        if self.session.event_capacity == 0 {
            bail!("session.event_capacity must be at least 1");
        }
        if self.session.max_sessions == 0 {
            bail!("session.max_sessions must be at least 1");
        }
        if self.session.sweep_interval_secs == 0 {
            bail!("session.sweep_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        if self.http.host.contains(':') && !self.http.host.starts_with('[') {
            format!("[{}]:{}", self.http.host, self.http.port)
        } else {
            format!("{}:{}", self.http.host, self.http.port)
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            unclaimed_timeout: Duration::from_secs(self.session.unclaimed_timeout_secs),
            event_capacity: self.session.event_capacity,
            max_sessions: self.session.max_sessions,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.http.keep_alive_secs.max(1))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub config: Arc<ServerConfig>,
    pub origins: Arc<OriginPolicy>,
}

impl AppState {
    pub fn new(server: Arc<McpServer>, config: ServerConfig) -> Result<Self> {
        let origins = OriginPolicy::new(&config.http.allowed_origins)
            .context("Invalid http.allowed_origins")?;

        Ok(Self {
            server,
            config: Arc::new(config),
            origins: Arc::new(origins),
        })
    }

    pub fn streaming_mode(&self) -> StreamingMode {
        self.config.streaming.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.http.port, 8000);
        assert_eq!(config.http.path, "/mcp");
        assert_eq!(config.session.idle_timeout_secs, 1800);
        assert_eq!(config.session.unclaimed_timeout_secs, 60);
        assert_eq!(config.session.event_capacity, 256);
        assert_eq!(config.streaming.mode, StreamingMode::Wait);
        assert!(config.dooray.base_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[http]
port = 9100
allowed_origins = ["https://tools.example.com"]

[session]
event_capacity = 16

[streaming]
mode = "ack"
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.http.port, 9100);
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.allowed_origins, vec!["https://tools.example.com"]);
        assert_eq!(config.session.event_capacity, 16);
        assert_eq!(config.session.max_sessions, 1024);
        assert_eq!(config.streaming.mode, StreamingMode::Ack);
        assert_eq!(config.dooray.timeout_secs, 30);

        let sessions = config.session_config();
        assert_eq!(sessions.event_capacity, 16);
        assert_eq!(sessions.idle_timeout, Duration::from_secs(1800));
        assert_eq!(sessions.unclaimed_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\npath = \"mcp\"").unwrap();
        assert!(ServerConfig::load(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[streaming]\nmode = \"sometimes\"").unwrap();
        assert!(ServerConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_bind_addr_brackets_ipv6() {
        let mut config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");

        config.http.host = "::1".to_string();
        assert_eq!(config.bind_addr(), "[::1]:8000");
    }
}
