//! Sumi-Bot: an on-demand page fetch and extraction service
//!
//! This crate keeps one fetch engine running for the lifetime of the process
//! and exposes a JSON control endpoint. Each call schedules exactly one fetch,
//! optionally runs a declarative extraction spec against the fetched page and
//! answers the held-open connection with a single JSON payload.

pub mod config;
pub mod engine;
pub mod extraction;
pub mod server;

use thiserror::Error;

/// Main error type for Sumi-Bot operations
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch engine failed to start: {0}")]
    EngineStart(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while loading an extraction spec bundle
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Failed to read spec file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse spec file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),
}

/// Errors raised while building an extractor or running it on a page
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("unknown extractor '{0}'")]
    UnknownExtractor(String),

    #[error("unknown item type '{0}'")]
    UnknownItemType(String),
}

/// Result type alias for Sumi-Bot operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for spec loading
pub type SpecResult<T> = std::result::Result<T, SpecError>;

/// Result type alias for extraction
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineSupervisor, FetchEngine, FetchOutcome, FetchTask, WorkerId};
pub use extraction::{ExtractorAdapter, FsSpecProvider, Item, SpecProvider};
pub use server::{build_router, build_service, AppState, BotService, ResponsePayload};
