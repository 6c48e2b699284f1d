use std::io::{Cursor, Read};
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stowage_core::metadata::{from_string_map, CONTENT_TYPE};
use stowage_core::traits::validate_range;
use stowage_core::{Error, InfoCell, Item, ItemRanger, ItemReader, Metadata, RangeReader, Result};
use tracing::debug;
use url::Url;

use crate::store::{Bucket, Object, Shared};

/// Handle to an item of a memory container.
///
/// The record behind the name is fetched once, on first attribute access,
/// and the handle keeps serving that snapshot afterwards.
#[derive(Debug)]
pub struct MemoryItem {
    shared: Arc<Shared>,
    bucket: Arc<Bucket>,
    name: String,
    url: Url,
    info: InfoCell<Arc<Object>>,
}

impl MemoryItem {
    pub(crate) fn lazy(shared: Arc<Shared>, bucket: Arc<Bucket>, name: &str, url: Url) -> Self {
        Self {
            shared,
            bucket,
            name: name.to_string(),
            url,
            info: InfoCell::new(),
        }
    }

    pub(crate) fn resolved(
        shared: Arc<Shared>,
        bucket: Arc<Bucket>,
        name: &str,
        url: Url,
        object: Arc<Object>,
    ) -> Self {
        Self {
            shared,
            bucket,
            name: name.to_string(),
            url,
            info: InfoCell::ready(object),
        }
    }

    fn object(&self, op: &'static str) -> Result<&Arc<Object>> {
        self.info.get_or_fetch_for(op, || {
            self.shared.record_fetch();
            debug!(container = %self.bucket.name, item = %self.name, "fetching item info");
            self.bucket.lookup(&self.name).ok_or_else(|| {
                Error::not_found(format!("item {} in {}", self.name, self.bucket.name))
            })
        })
    }
}

impl Item for MemoryItem {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> Url {
        self.url.clone()
    }

    fn size(&self) -> Result<u64> {
        Ok(self.object("size")?.content.len() as u64)
    }

    fn open(&self) -> Result<ItemReader> {
        let content = Arc::clone(&self.object("content")?.content);
        Ok(Box::new(Cursor::new(content)))
    }

    fn etag(&self) -> Result<String> {
        Ok(self.object("etag")?.etag.clone())
    }

    fn last_mod(&self) -> Result<DateTime<Utc>> {
        Ok(self.object("last modified")?.modified)
    }

    fn metadata(&self) -> Result<Metadata> {
        let object = self.object("metadata")?;
        let mut metadata = from_string_map(object.properties.clone());
        if let Some(content_type) = &object.content_type {
            metadata.insert(CONTENT_TYPE.to_string(), content_type.clone().into());
        }
        Ok(metadata)
    }

    fn as_ranger(&self) -> Option<&dyn ItemRanger> {
        Some(self)
    }
}

impl ItemRanger for MemoryItem {
    fn open_range(&self, range: Range<u64>) -> Result<RangeReader> {
        validate_range(&range)?;
        let content = Arc::clone(&self.object("content")?.content);
        let len = content.len() as u64;
        let start = range.start.min(len);
        let end = range.end.min(len);
        let mut cursor = Cursor::new(content);
        cursor.set_position(start);
        Ok(Box::new(cursor.take(end - start)))
    }
}
