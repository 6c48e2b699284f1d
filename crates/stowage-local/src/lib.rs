//! Local filesystem Stowage backend.
//!
//! Kind `local`, URL scheme `file`. The configured `path` is a directory
//! whose subdirectories are containers; files below a container, at any
//! depth, are its items, named by their slash-separated relative path.
//! Item metadata is whatever `stat` reports; arbitrary metadata cannot be
//! stored, so `put` with metadata fails with `NotSupported("metadata")`.
//! The `local-meta` backend builds on [`files`] and [`root`] to add that.
//!
//! Configuration:
//!
//! - `path` (required) -- an existing directory

pub mod files;
mod item;
mod location;
pub mod root;

pub use item::LocalItem;
pub use location::{LocalContainer, LocalLocation};
pub use root::{ContainerDir, Root};

use stowage_core::config::require;
use stowage_core::{Config, Location, Result};
use url::Url;

pub const KIND: &str = "local";
pub const SCHEME: &str = "file";
pub const CONFIG_PATH: &str = "path";

/// Add the `local` kind to the process-wide registry.
pub fn register() -> bool {
    stowage_core::register(KIND, make, recognize, Some(validate))
}

fn make(config: &dyn Config) -> Result<Box<dyn Location>> {
    let root = Root::from_config(KIND, SCHEME, config)?;
    Ok(Box::new(LocalLocation::new(root)))
}

fn validate(config: &dyn Config) -> Result<()> {
    require(config, KIND, CONFIG_PATH).map(|_| ())
}

fn recognize(url: &Url) -> bool {
    url.scheme() == SCHEME
}
