use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use stowage_core::metadata::{lookup, parse_http_date, ETAG, LAST_MODIFIED};
use stowage_core::traits::validate_range;
use stowage_core::{
    Error, InfoCell, Item, ItemRanger, ItemReader, Metadata, Properties, RangeReader, Result,
};
use stowage_local::files::{file_metadata, io_error, mtime_etag, timestamp, METADATA_SIZE};
use stowage_meta::{decode, Decoded, MetaError, ShiftedStream};
use tracing::debug;
use url::Url;

/// What one stat plus one header read reveal about an item.
#[derive(Debug)]
struct MetaInfo {
    physical_len: u64,
    header_len: u64,
    modified: DateTime<Utc>,
    properties: Properties,
    stat: Metadata,
}

impl MetaInfo {
    fn logical_len(&self) -> u64 {
        self.physical_len.saturating_sub(self.header_len)
    }
}

/// A file, or a directory marker, inside a local-meta container.
///
/// The header is read at most once per handle for the attribute accessors;
/// every [`Item::open`] reads it again from its own file handle.
#[derive(Debug)]
pub struct LocalMetaItem {
    name: String,
    path: PathBuf,
    url: Url,
    info: InfoCell<MetaInfo>,
}

impl LocalMetaItem {
    pub(crate) fn new(name: String, path: PathBuf, url: Url) -> Self {
        Self {
            name,
            path,
            url,
            info: InfoCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the embedded header, `0` for plain files and directories.
    pub fn header_size(&self) -> Result<u64> {
        Ok(self.info("header size")?.header_len)
    }

    fn info(&self, op: &'static str) -> Result<&MetaInfo> {
        self.info.get_or_fetch_for(op, || self.fetch_info())
    }

    fn fetch_info(&self) -> Result<MetaInfo> {
        let stat = fs::metadata(&self.path).map_err(|e| io_error("stat", &self.path, e))?;
        let modified = stat
            .modified()
            .map_err(|e| io_error("reading mtime of", &self.path, e))?;

        let decoded = if stat.is_dir() {
            Decoded::default()
        } else {
            let mut file = self.open_file()?;
            self.read_header(&mut file)?
        };
        debug!(
            path = %self.path.display(),
            header = decoded.consumed,
            keys = decoded.properties.len(),
            "fetched item info"
        );

        Ok(MetaInfo {
            physical_len: if stat.is_dir() { 0 } else { stat.len() },
            header_len: decoded.consumed,
            modified: timestamp(modified),
            properties: decoded.properties,
            stat: file_metadata(&self.path, &stat),
        })
    }

    fn open_file(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| io_error("opening", &self.path, e))
    }

    fn read_header(&self, file: &mut File) -> Result<Decoded> {
        decode(file).map_err(|err| match err {
            MetaError::Truncated { .. } => Error::CorruptMetadata {
                item: self.name.clone(),
                reason: err.to_string(),
            },
            other => other.for_item(&self.name),
        })
    }

    fn is_dir(&self) -> Result<bool> {
        let stat = fs::metadata(&self.path).map_err(|e| io_error("stat", &self.path, e))?;
        Ok(stat.is_dir())
    }
}

impl Item for LocalMetaItem {
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
        Ok(self.info("size")?.logical_len())
    }

    fn open(&self) -> Result<ItemReader> {
        if self.is_dir()? {
            return Ok(Box::new(io::empty()));
        }
        let mut file = self.open_file()?;
        let decoded = self.read_header(&mut file)?;
        if decoded.is_present() {
            debug!(path = %self.path.display(), header = decoded.consumed, "hiding metadata header");
            let stream = ShiftedStream::new(file, decoded.consumed)
                .map_err(|e| io_error("seeking past header of", &self.path, e))?;
            return Ok(Box::new(stream));
        }
        file.seek(SeekFrom::Start(0))
            .map_err(|e| io_error("rewinding", &self.path, e))?;
        Ok(Box::new(file))
    }

    fn etag(&self) -> Result<String> {
        let info = self.info("etag")?;
        Ok(match lookup(&info.properties, ETAG) {
            Some(etag) => etag.to_string(),
            None => mtime_etag(&info.modified),
        })
    }

    fn last_mod(&self) -> Result<DateTime<Utc>> {
        let info = self.info("last modified")?;
        match lookup(&info.properties, LAST_MODIFIED) {
            Some(value) => parse_http_date(value),
            None => Ok(info.modified),
        }
    }

    /// Stat-derived keys with the embedded metadata laid over them.
    fn metadata(&self) -> Result<Metadata> {
        let info = self.info("metadata")?;
        let mut metadata = info.stat.clone();
        metadata.insert(METADATA_SIZE.to_string(), info.logical_len().into());
        for (key, value) in &info.properties {
            metadata.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(metadata)
    }

    fn as_ranger(&self) -> Option<&dyn ItemRanger> {
        Some(self)
    }
}

impl ItemRanger for LocalMetaItem {
    fn open_range(&self, range: Range<u64>) -> Result<RangeReader> {
        validate_range(&range)?;
        let info = self.info("range")?;
        let len = info.logical_len();
        let (start, end) = (range.start.min(len), range.end.min(len));
        if start == end {
            return Ok(Box::new(io::empty()));
        }
        let mut file = self.open_file()?;
        file.seek(SeekFrom::Start(info.header_len + start))
            .map_err(|e| io_error("seeking in", &self.path, e))?;
        Ok(Box::new(file.take(end - start)))
    }
}
