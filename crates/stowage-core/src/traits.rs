//! The Location / Container / Item protocol.
//!
//! Every backend implements these three traits. Optional capabilities are
//! separate traits reached through capability queries
//! ([`Item::as_ranger`], [`Container::as_presigner`]) so callers can check
//! for them without knowing the concrete backend.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::ops::Range;

use chrono::{DateTime, Utc};
use url::Url;

use crate::cursor::Page;
use crate::error::{not_supported, Error, Result};
use crate::metadata::Metadata;
use crate::method::{ClientMethod, PresignParams};

/// Seekable content stream. Position `0` is the first content byte.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Item content as returned by [`Item::open`].
pub type ItemReader = Box<dyn ReadSeek>;

/// A byte range of item content.
pub type RangeReader = Box<dyn Read + Send>;

/// Writable item content, finished when dropped.
pub type ItemWriter = Box<dyn Write + Send>;

/// An opened storage endpoint.
pub trait Location: Send + Sync + fmt::Debug {
    /// List containers whose name starts with `prefix`, following the cursor
    /// protocol.
    fn containers(&self, prefix: &str, cursor: &str, count: usize)
        -> Result<Page<Box<dyn Container>>>;

    /// Look up a container by ID.
    fn container(&self, id: &str) -> Result<Box<dyn Container>>;

    fn create_container(&self, name: &str) -> Result<Box<dyn Container>>;

    fn remove_container(&self, id: &str) -> Result<()>;

    /// Resolve an item from a URL produced by [`Item::url`].
    fn item_by_url(&self, url: &Url) -> Result<Box<dyn Item>>;

    /// Release the location. Calling it more than once is harmless.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A named grouping of items (a bucket, a directory).
pub trait Container: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// List items whose name starts with `prefix`, following the cursor
    /// protocol.
    fn items(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Item>>>;

    /// Look up an item by ID.
    fn item(&self, id: &str) -> Result<Box<dyn Item>>;

    /// Store exactly `size` bytes from `reader` under `name`.
    fn put(
        &self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        metadata: &Metadata,
    ) -> Result<Box<dyn Item>>;

    /// Create an empty item and return a writer for its content.
    fn create_item(&self, name: &str) -> Result<(Box<dyn Item>, ItemWriter)>;

    fn remove_item(&self, id: &str) -> Result<()>;

    /// Pre-signing capability, when the backend has one.
    fn as_presigner(&self) -> Option<&dyn PreSigner> {
        None
    }
}

/// A stored object. Handles are light: attributes are fetched lazily and
/// memoized, and a fresh handle is the way to observe a fresh state.
pub trait Item: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn url(&self) -> Url;

    /// Content length in bytes.
    fn size(&self) -> Result<u64>;

    fn open(&self) -> Result<ItemReader>;

    fn etag(&self) -> Result<String>;

    fn last_mod(&self) -> Result<DateTime<Utc>>;

    fn metadata(&self) -> Result<Metadata>;

    /// Byte-range capability, when the backend has one.
    fn as_ranger(&self) -> Option<&dyn ItemRanger> {
        None
    }
}

/// Items that can be read from an offset without streaming the prefix.
pub trait ItemRanger {
    /// Open the half-open byte range `range` of the content. A range that
    /// extends past the end is cut at the end.
    fn open_range(&self, range: Range<u64>) -> Result<RangeReader>;
}

/// Containers that can issue pre-signed URLs.
pub trait PreSigner {
    fn presign_request(
        &self,
        method: ClientMethod,
        key: &str,
        params: &PresignParams,
    ) -> Result<Url>;
}

/// Open a byte range of `item`, or fail with `NotSupported("range")`.
pub fn open_range(item: &dyn Item, range: Range<u64>) -> Result<RangeReader> {
    validate_range(&range)?;
    match item.as_ranger() {
        Some(ranger) => ranger.open_range(range),
        None => Err(not_supported("range")),
    }
}

/// Pre-sign a request against `container`, or fail with
/// `NotSupported("presign")`.
pub fn presign_request(
    container: &dyn Container,
    method: ClientMethod,
    key: &str,
    params: &PresignParams,
) -> Result<Url> {
    match container.as_presigner() {
        Some(signer) => signer.presign_request(method, key, params),
        None => Err(not_supported("presign")),
    }
}

pub fn validate_range(range: &Range<u64>) -> Result<()> {
    if range.start > range.end {
        return Err(Error::InvalidArgument(format!(
            "range start {} is past its end {}",
            range.start, range.end
        )));
    }
    Ok(())
}
