// src/config/mod.rs

//! Configuration loading and validation for proctor.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and turn it into executor settings and task descriptors
//!   (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    ConfigFile, ExecutorSection, RawCommand, RawConfigFile, RawEndpoint, RawGracefulShutdown,
    RawPattern, RawReadiness, RawService,
};
