//! # petri_cli - Command Line Host
//!
//! Runs a scene file with the built-in plugins plus whatever plugin
//! binaries the configured directories provide.
//!
//! ```text
//! petri --plugins-dir target/release -p cells.growth-rate 0.2 scene.toml
//! ```

pub mod builtin;
pub mod config;
pub mod host;
pub mod toml_loader;

pub use config::{CliArgs, ConfigError, HostConfig};
pub use host::{create_manager, install_interrupt, plugin_listing, run_scene, HostError, RunSummary};
