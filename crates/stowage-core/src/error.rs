//! Error taxonomy shared by every Stowage backend.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors returned by locations, containers and items.
#[derive(Debug, Error)]
pub enum Error {
    /// No such container or item.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The pagination cursor does not name an entry of the listing.
    #[error("bad cursor: {cursor:?}")]
    BadCursor { cursor: String },

    /// The backend lacks an optional capability.
    #[error("not supported: {feature}")]
    NotSupported { feature: String },

    /// A caller-supplied argument was rejected before touching storage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An embedded metadata header could not be decoded.
    #[error("corrupt metadata in {item}: {reason}")]
    CorruptMetadata { item: String, reason: String },

    /// An embedded metadata header declares more payload than is present.
    #[error("truncated metadata: declared {declared} bytes, {available} available")]
    TruncatedMetadata { declared: u64, available: u64 },

    /// An embedded metadata header carries an unknown format version.
    #[error("incompatible metadata format version {version:#04x}")]
    IncompatibleFormat { version: u8 },

    /// A metadata value cannot be stored by the backend.
    #[error("invalid metadata value for {key:?}: {reason}")]
    InvalidMetadata { key: String, reason: String },

    /// The declared content size differs from the bytes actually written.
    #[error("size mismatch: declared {expected} bytes, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// A kind was registered twice through the strict entry point.
    #[error("kind already registered: {0}")]
    DuplicateKind(String),

    /// No registered kind recognizes the URL.
    #[error("no registered kind matches {0}")]
    NoMatchingKind(String),

    /// The requested kind was never registered.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// A backend rejected its configuration.
    #[error("invalid {kind} configuration: {reason}")]
    Config { kind: String, reason: String },

    /// The memoized info fetch of an item failed; `source` is shared by
    /// every caller that observed the failure.
    #[error("retrieving {op}: {source}")]
    Fetch {
        op: &'static str,
        #[source]
        source: Arc<Error>,
    },

    /// I/O failure of the underlying medium, with the operation that hit it.
    #[error("{op}: {source}")]
    Io {
        op: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadCursor,
    NotSupported,
    InvalidArgument,
    CorruptMetadata,
    SizeMismatch,
    Registry,
    Config,
    Io,
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn io(op: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }

    pub fn config(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a cached info failure with the name of the accessor that saw it.
    pub fn fetch(op: &'static str, source: Arc<Error>) -> Self {
        Self::Fetch { op, source }
    }

    /// Classify the error, looking through [`Error::Fetch`] wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadCursor { .. } => ErrorKind::BadCursor,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::InvalidArgument(_) | Self::InvalidMetadata { .. } => ErrorKind::InvalidArgument,
            Self::CorruptMetadata { .. }
            | Self::TruncatedMetadata { .. }
            | Self::IncompatibleFormat { .. } => ErrorKind::CorruptMetadata,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::DuplicateKind(_) | Self::NoMatchingKind(_) | Self::UnknownKind(_) => {
                ErrorKind::Registry
            }
            Self::Config { .. } => ErrorKind::Config,
            Self::Fetch { source, .. } => source.kind(),
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_not_supported(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
    }
}

/// Build the "operation not supported" sentinel for `feature`.
pub fn not_supported(feature: impl Into<String>) -> Error {
    Error::NotSupported {
        feature: feature.into(),
    }
}

/// True when `err` reports a missing optional capability.
pub fn is_not_supported(err: &Error) -> bool {
    err.is_not_supported()
}

/// Result alias for Stowage operations.
pub type Result<T> = std::result::Result<T, Error>;
