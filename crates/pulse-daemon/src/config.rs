//! Configuration for pulse-daemon

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use pulse_engine::EngineConfig;
use pulse_types::NormalizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Upstream feeds and the notification target
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Aggregation, detection, dispatch and reaper settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Live stream connection behaviour
    #[serde(default)]
    pub stream: StreamConfig,

    /// Query API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream and downstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the historical edits service (`GET {base}/edits`)
    #[serde(default = "default_historical_base_url")]
    pub historical_base_url: String,

    /// Tried when the primary historical source cannot be reached
    #[serde(default)]
    pub historical_fallback_url: Option<String>,

    /// Base URL of the spike notification target (`POST {base}/edits/spikes`)
    #[serde(default = "default_notify_base_url")]
    pub notify_base_url: String,

    /// Server-sent-event feed of live changes
    #[serde(default = "default_live_stream_url")]
    pub live_stream_url: String,

    /// Timeout for backfill and notification requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Which edits are kept
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            historical_base_url: default_historical_base_url(),
            historical_fallback_url: None,
            notify_base_url: default_notify_base_url(),
            live_stream_url: default_live_stream_url(),
            request_timeout_secs: default_request_timeout(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Live stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Reconnect when no bytes arrive for this long
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Delay before the first reconnect attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling reconnect delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl StreamConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_historical_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_notify_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_live_stream_url() -> String {
    "https://stream.wikimedia.org/v2/stream/recentchange".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_quiet_period_ms() -> u64 {
    2_000
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8090))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PulseConfig {
    /// Load configuration: built-in defaults, then the optional file, then
    /// `PULSE_*` environment variables (`__` separates nested keys, e.g.
    /// `PULSE_ENGINE__SPIKE__BYTES_THRESHOLD=8000`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&PulseConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with PULSE_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PULSE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("engine.buckets.granularities")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> DaemonResult<()> {
        self.engine
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        for (name, url) in [
            ("sources.historical_base_url", &self.sources.historical_base_url),
            ("sources.notify_base_url", &self.sources.notify_base_url),
            ("sources.live_stream_url", &self.sources.live_stream_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DaemonError::Config(format!(
                    "{name} must be an http(s) URL (got {url:?})"
                )));
            }
        }
        if self.sources.request_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "sources.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.stream.quiet_period_ms == 0 {
            return Err(DaemonError::Config(
                "stream.quiet_period_ms must be > 0".into(),
            ));
        }
        if self.stream.initial_backoff_ms > self.stream.max_backoff_ms {
            return Err(DaemonError::Config(
                "stream.initial_backoff_ms must not exceed stream.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}
