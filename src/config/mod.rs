//! Configuration module for Sumi-Bot
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_bot::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("bot.toml")).unwrap();
//! println!("Engine worker: {}", config.engine.worker_name);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassificationPolicy, Config, EngineConfig, ExtractionConfig, ServerConfig, SpecsConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
