//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and file loading
//! - [`env`]: Environment variable overrides applied after loading
//! - [`validation`]: Startup checks that report every problem at once

mod defaults;
mod env;
mod types;
mod validation;

pub use env::{apply_env, apply_env_from};
pub use types::{ConfigError, Config, CrawlConfig, DatabaseConfig, HttpConfig, SelectorConfig};
pub use validation::{ValidationError, validate};
