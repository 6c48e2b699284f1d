//! In-memory Stowage backend.
//!
//! Kind `memory`, URL scheme `mem`. Everything lives in process memory and
//! disappears with the location. Item entity tags are BLAKE3 content hashes;
//! the content type is kept apart from the user metadata and merged back in
//! on read.
//!
//! Configuration:
//!
//! - `name` (optional) -- host part of item URLs, `default` when absent

mod item;
mod store;

pub use item::MemoryItem;
pub use store::{MemoryContainer, MemoryLocation};

use stowage_core::{Config, Location, Result};
use url::Url;

pub const KIND: &str = "memory";
pub const SCHEME: &str = "mem";
pub const CONFIG_NAME: &str = "name";

/// Add the `memory` kind to the process-wide registry.
pub fn register() -> bool {
    stowage_core::register(KIND, make, recognize, None)
}

fn make(config: &dyn Config) -> Result<Box<dyn Location>> {
    let name = config
        .config(CONFIG_NAME)
        .unwrap_or_else(|| "default".to_string());
    Ok(Box::new(MemoryLocation::new(&name)?))
}

fn recognize(url: &Url) -> bool {
    url.scheme() == SCHEME
}
