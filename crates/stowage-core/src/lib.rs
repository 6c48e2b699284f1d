//! Backend-neutral object storage protocol for Stowage.
//!
//! Callers obtain a [`Location`] (a storage endpoint), walk to its
//! [`Container`]s (buckets, directories) and read or write [`Item`]s
//! (blobs, files) without knowing which backend is behind the traits.
//!
//! # Pieces
//!
//! - [`traits`] -- the Location/Container/Item protocol plus the optional
//!   [`ItemRanger`] and [`PreSigner`] capabilities
//! - [`cursor`] -- the `(prefix, cursor, count)` listing protocol, shared by
//!   every backend through [`paginate`]
//! - [`info`] -- [`InfoCell`], the single-flight memoized attribute fetch
//! - [`registry`] -- kind name → factory/recognizer/validator, and [`dial`]
//! - [`metadata`] -- metadata maps, key normalization, entity tag helpers
//! - [`walk`] -- traversals that drive the cursor protocol to exhaustion
//!
//! # Rules
//!
//! 1. The empty string is the cursor sentinel: list start as a request,
//!    end of results as a response.
//! 2. An unknown cursor is a protocol violation ([`Error::BadCursor`]), never
//!    silently treated as the start.
//! 3. Item attributes are fetched at most once per handle; a failure is
//!    cached like a success.
//! 4. Backends never panic on storage failure; every error is typed.

pub mod addr;
pub mod config;
pub mod cursor;
pub mod error;
pub mod info;
pub mod metadata;
pub mod method;
pub mod registry;
#[cfg(feature = "testing")]
pub mod testing;
pub mod traits;
pub mod walk;

pub use config::{Config, ConfigMap};
pub use cursor::{is_cursor_end, paginate, Page, CURSOR_START};
pub use error::{is_not_supported, not_supported, Error, ErrorKind, Result};
pub use info::{InfoCell, InfoState};
pub use metadata::{Metadata, Properties};
pub use method::{ClientMethod, PresignParams};
pub use registry::{dial, kind_by_url, kinds, register, try_register, validate, KindSpec, Registry};
pub use traits::{
    open_range, presign_request, Container, Item, ItemRanger, ItemReader, ItemWriter, Location,
    PreSigner, RangeReader, ReadSeek,
};
pub use walk::{walk_containers, walk_items};
