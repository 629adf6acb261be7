//! Warden Config - Manifest Loading and Hot-Reload
//!
//! The gateway is driven by one manifest file that lists the proxied sites
//! and the access-control list for each origin. This crate parses and
//! validates that file ([`Manifest`]) and watches it for changes
//! ([`FileWatcher`]).
//!
//! # Example
//!
//! ```no_run
//! use warden_config::Manifest;
//!
//! # fn main() -> Result<(), warden_config::ConfigError> {
//! let manifest = Manifest::from_file("manifest.yaml")?;
//! let pool = manifest.policy_pool()?;
//! println!("{} routes, {} origins", manifest.proxies.len(), pool.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod manifest;
pub mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use manifest::{Manifest, ProxyRoute};
pub use watcher::{FileChangeEvent, FileChangeKind, FileWatcher, FileWatcherBuilder};
