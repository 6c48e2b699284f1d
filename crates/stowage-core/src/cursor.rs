//! The cursor pagination protocol shared by every listing.
//!
//! A listing request carries `(prefix, cursor, count)`. The cursor is the
//! name of the first entry to return; the empty string requests the start of
//! the listing and, as a response value, signals that nothing remains.
//! Backends only produce the raw, stably ordered enumeration and hand it to
//! [`paginate`]; prefix filtering, cursor resolution and truncation are the
//! same everywhere.

use tracing::debug;

use crate::error::{Error, Result};

/// Cursor value requesting the first page.
pub const CURSOR_START: &str = "";

/// True when `cursor` is the end-of-results sentinel.
pub fn is_cursor_end(cursor: &str) -> bool {
    cursor.is_empty()
}

/// One page of a listing.
#[derive(Debug)]
pub struct Page<T> {
    /// Entries of this page, in listing order.
    pub items: Vec<T>,
    /// Name of the first entry of the next page, or the end sentinel.
    pub cursor: String,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursor: String::new(),
        }
    }

    /// True when no further page exists.
    pub fn is_last(&self) -> bool {
        is_cursor_end(&self.cursor)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert every entry, keeping the cursor.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            cursor: self.cursor,
        }
    }
}

/// Reject page sizes that could never make progress.
pub fn validate_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::InvalidArgument("count must be at least 1".into()));
    }
    Ok(())
}

/// Apply the listing protocol to a stably ordered enumeration.
///
/// Entries whose name does not start with `prefix` are dropped. A non-start
/// `cursor` must name one of the remaining entries, otherwise the listing
/// fails with [`Error::BadCursor`]. At most `count` entries are returned.
pub fn paginate<T, F>(
    entries: impl IntoIterator<Item = T>,
    prefix: &str,
    cursor: &str,
    count: usize,
    name_of: F,
) -> Result<Page<T>>
where
    F: Fn(&T) -> &str,
{
    validate_count(count)?;

    let mut entries: Vec<T> = entries
        .into_iter()
        .filter(|entry| name_of(entry).starts_with(prefix))
        .collect();

    if cursor != CURSOR_START {
        let Some(start) = entries.iter().position(|entry| name_of(entry) == cursor) else {
            debug!(cursor, prefix, "cursor not present in listing");
            return Err(Error::BadCursor {
                cursor: cursor.to_string(),
            });
        };
        entries.drain(..start);
    }

    let next = if entries.len() > count {
        let rest = entries.split_off(count);
        name_of(&rest[0]).to_string()
    } else {
        String::new()
    };

    Ok(Page {
        items: entries,
        cursor: next,
    })
}
