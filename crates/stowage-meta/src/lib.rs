//! Inline metadata for Stowage's local-meta format.
//!
//! Files written by the local-meta backend start with a small header that
//! carries the item's string metadata, followed by the content bytes:
//!
//! - [`codec`] -- header encoding and detection
//! - [`shift`] -- [`ShiftedStream`], which hides the header from readers
//!
//! Consumers only ever see the content region; `logical size = physical size
//! - header size`.

pub mod codec;
pub mod error;
pub mod shift;

pub use codec::{decode, encode, header_size, Decoded, FORMAT_VERSION, MAGIC};
pub use error::{MetaError, MetaResult};
pub use shift::ShiftedStream;
