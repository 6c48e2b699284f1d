use std::io;

use thiserror::Error;

/// Failures decoding or encoding an embedded metadata header.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("truncated header: declared {declared} bytes, {available} available")]
    Truncated { declared: u64, available: u64 },

    #[error("incompatible header format version {version:#04x}")]
    IncompatibleFormat { version: u8 },

    #[error("corrupt header: {0}")]
    Corrupt(String),

    #[error("metadata block of {0} bytes does not fit a 32-bit length")]
    TooLarge(usize),

    #[error("encoding metadata: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MetaError {
    /// Convert into the core taxonomy, naming the item the header belongs to.
    pub fn for_item(self, item: &str) -> stowage_core::Error {
        match self {
            Self::Truncated {
                declared,
                available,
            } => stowage_core::Error::TruncatedMetadata {
                declared,
                available,
            },
            Self::IncompatibleFormat { version } => {
                stowage_core::Error::IncompatibleFormat { version }
            }
            Self::Corrupt(reason) => stowage_core::Error::CorruptMetadata {
                item: item.to_string(),
                reason,
            },
            Self::TooLarge(_) | Self::Encode(_) => stowage_core::Error::InvalidMetadata {
                key: "metadata".to_string(),
                reason: format!("{item}: {self}"),
            },
            Self::Io(source) => {
                stowage_core::Error::io(format!("reading metadata header of {item}"), source)
            }
        }
    }
}

impl From<MetaError> for stowage_core::Error {
    fn from(err: MetaError) -> Self {
        err.for_item("metadata header")
    }
}

pub type MetaResult<T> = Result<T, MetaError>;
