//! Ollama installer library
//!
//! Installs, starts, stops and uninstalls a locally managed Ollama executable
//! published as GitHub release assets.
//!
//! - [`install`] - release download, safe archive extraction, install location
//! - [`control`] - finding and terminating running instances by file identity
//! - [`health`] - local health endpoint probe
//! - [`lifecycle`] - the operations exposed on the command line
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod control;
pub mod health;
pub mod install;
pub mod lifecycle;

pub use config::InstallerConfig;
pub use lifecycle::{InstallOutcome, Lifecycle, LifecycleError, LifecycleSettings, Status};
