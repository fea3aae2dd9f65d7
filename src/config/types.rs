use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Bot
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub specs: SpecsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Control endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the control endpoint listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Fetch engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Identity of the long-lived worker opened on the engine
    #[serde(rename = "worker-name", default = "default_worker_name")]
    pub worker_name: String,

    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent")]
    pub max_concurrent_fetches: u32,

    /// Interval between idle checks (milliseconds)
    #[serde(rename = "idle-interval-ms", default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Total time allowed for a single fetch (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Time allowed to establish a connection (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum redirect hops followed per fetch
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl EngineConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            max_concurrent_fetches: default_max_concurrent(),
            idle_interval_ms: default_idle_interval_ms(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the bot
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the bot
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the bot
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for bot-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where extraction spec projects live
#[derive(Debug, Clone, Deserialize)]
pub struct SpecsConfig {
    /// Root directory holding one sub-directory per project
    #[serde(default = "default_specs_root")]
    pub root: PathBuf,
}

impl Default for SpecsConfig {
    fn default() -> Self {
        Self {
            root: default_specs_root(),
        }
    }
}

/// Extraction behavior configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub classification: ClassificationPolicy,
}

/// What to do when a fetched page has a non-200 status or is not HTML
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationPolicy {
    /// Answer with the classification error and skip extraction
    #[default]
    ShortCircuit,

    /// Answer with the classification error but still run extraction;
    /// the later success payload is rejected by the completion guard
    FallThrough,
}

fn default_bind() -> String {
    "127.0.0.1:9001".to_string()
}

fn default_worker_name() -> String {
    "slyd".to_string()
}

fn default_max_concurrent() -> u32 {
    16
}

fn default_idle_interval_ms() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

fn default_specs_root() -> PathBuf {
    PathBuf::from("./data/projects")
}
