use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use stowage_core::traits::validate_range;
use stowage_core::{InfoCell, Item, ItemRanger, ItemReader, Metadata, RangeReader, Result};
use tracing::debug;
use url::Url;

use crate::files::{file_metadata, io_error, mtime_etag, timestamp};

#[derive(Debug)]
struct FileInfo {
    len: u64,
    modified: DateTime<Utc>,
    metadata: Metadata,
}

/// A file inside a local container.
#[derive(Debug)]
pub struct LocalItem {
    name: String,
    path: PathBuf,
    url: Url,
    info: InfoCell<FileInfo>,
}

impl LocalItem {
    pub(crate) fn new(name: String, path: PathBuf, url: Url) -> Self {
        Self {
            name,
            path,
            url,
            info: InfoCell::new(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn info(&self, op: &'static str) -> Result<&FileInfo> {
        self.info.get_or_fetch_for(op, || {
            debug!(path = %self.path.display(), "stat");
            let stat = fs::metadata(&self.path).map_err(|e| io_error("stat", &self.path, e))?;
            let modified = stat
                .modified()
                .map_err(|e| io_error("reading mtime of", &self.path, e))?;
            Ok(FileInfo {
                len: stat.len(),
                modified: timestamp(modified),
                metadata: file_metadata(&self.path, &stat),
            })
        })
    }

    fn open_file(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| io_error("opening", &self.path, e))
    }
}

impl Item for LocalItem {
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
        Ok(self.info("size")?.len)
    }

    fn open(&self) -> Result<ItemReader> {
        Ok(Box::new(self.open_file()?))
    }

    fn etag(&self) -> Result<String> {
        Ok(mtime_etag(&self.info("etag")?.modified))
    }

    fn last_mod(&self) -> Result<DateTime<Utc>> {
        Ok(self.info("last modified")?.modified)
    }

    fn metadata(&self) -> Result<Metadata> {
        Ok(self.info("metadata")?.metadata.clone())
    }

    fn as_ranger(&self) -> Option<&dyn ItemRanger> {
        Some(self)
    }
}

impl ItemRanger for LocalItem {
    fn open_range(&self, range: Range<u64>) -> Result<RangeReader> {
        validate_range(&range)?;
        let mut file = self.open_file()?;
        file.seek(SeekFrom::Start(range.start))
            .map_err(|e| io_error("seeking in", &self.path, e))?;
        Ok(Box::new(file.take(range.end - range.start)))
    }
}
