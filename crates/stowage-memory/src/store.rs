use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use stowage_core::addr::{decoded_segments, expect_scheme, join_segments};
use stowage_core::metadata::{normalize_keys, split_content_type};
use stowage_core::{
    paginate, Container, Error, Item, ItemWriter, Location, Metadata, Page, Properties, Result,
};
use tracing::{debug, info};
use url::Url;

use crate::item::MemoryItem;
use crate::SCHEME;

/// One stored write. Overwriting a name swaps in a new record.
#[derive(Debug)]
pub(crate) struct Object {
    pub(crate) content: Arc<[u8]>,
    pub(crate) content_type: Option<String>,
    pub(crate) properties: Properties,
    pub(crate) modified: DateTime<Utc>,
    pub(crate) etag: String,
}

impl Object {
    fn new(content: Vec<u8>, content_type: Option<String>, properties: Properties) -> Self {
        let etag = blake3::hash(&content).to_hex().to_string();
        Self {
            content: content.into(),
            content_type,
            properties,
            modified: Utc::now(),
            etag,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Bucket {
    pub(crate) name: String,
    pub(crate) objects: RwLock<BTreeMap<String, Arc<Object>>>,
}

impl Bucket {
    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<Object>> {
        self.objects.read().expect("lock poisoned").get(name).cloned()
    }

    fn store(&self, name: &str, object: Object) -> Arc<Object> {
        let object = Arc::new(object);
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), Arc::clone(&object));
        object
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) base: Url,
    buckets: RwLock<BTreeMap<String, Arc<Bucket>>>,
    fetches: AtomicU64,
}

impl Shared {
    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory location.
///
/// Intended for tests and embedding. Containers and items live in ordered
/// maps behind `RwLock`s, so listings come back sorted by name. Item handles
/// fetch their record lazily, once, on first attribute access.
#[derive(Debug, Clone)]
pub struct MemoryLocation {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryLocation {
    /// Create an empty location. `name` becomes the host of item URLs.
    pub fn new(name: &str) -> Result<Self> {
        let base = Url::parse(&format!("{SCHEME}://{name}/"))
            .map_err(|e| Error::config(crate::KIND, format!("bad location name {name:?}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            shared: Arc::new(Shared {
                base,
                buckets: RwLock::new(BTreeMap::new()),
                fetches: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of item records fetched so far by lazily resolved handles.
    pub fn fetch_count(&self) -> u64 {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    fn bucket(&self, id: &str) -> Result<Arc<Bucket>> {
        self.shared
            .buckets
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("container {id}")))
    }

    fn handle(&self, bucket: Arc<Bucket>) -> Box<dyn Container> {
        Box::new(MemoryContainer {
            shared: Arc::clone(&self.shared),
            bucket,
        })
    }
}

impl Location for MemoryLocation {
    fn containers(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Container>>> {
        let buckets: Vec<Arc<Bucket>> = self
            .shared
            .buckets
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        let page = paginate(buckets, prefix, cursor, count, |b| b.name.as_str())?;
        Ok(page.map(|bucket| self.handle(bucket)))
    }

    fn container(&self, id: &str) -> Result<Box<dyn Container>> {
        Ok(self.handle(self.bucket(id)?))
    }

    fn create_container(&self, name: &str) -> Result<Box<dyn Container>> {
        validate_name("container", name)?;
        if name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "container name {name:?} contains '/'"
            )));
        }
        let bucket = {
            let mut buckets = self.shared.buckets.write().expect("lock poisoned");
            Arc::clone(buckets.entry(name.to_string()).or_insert_with(|| {
                info!(container = name, "created container");
                Arc::new(Bucket {
                    name: name.to_string(),
                    objects: RwLock::new(BTreeMap::new()),
                })
            }))
        };
        Ok(self.handle(bucket))
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        match self.shared.buckets.write().expect("lock poisoned").remove(id) {
            Some(_) => {
                info!(container = id, "removed container");
                Ok(())
            }
            None => Err(Error::not_found(format!("container {id}"))),
        }
    }

    fn item_by_url(&self, url: &Url) -> Result<Box<dyn Item>> {
        expect_scheme(url, SCHEME)?;
        if url.host_str() != Some(self.name.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "{url} does not belong to memory location {}",
                self.name
            )));
        }
        let segments = decoded_segments(url)?;
        let Some((container, rest)) = segments.split_first() else {
            return Err(Error::InvalidArgument(format!("{url} names no container")));
        };
        if rest.is_empty() {
            return Err(Error::InvalidArgument(format!("{url} names no item")));
        }
        self.container(container)?.item(&rest.join("/"))
    }
}

/// A container of a [`MemoryLocation`].
#[derive(Debug)]
pub struct MemoryContainer {
    shared: Arc<Shared>,
    bucket: Arc<Bucket>,
}

impl MemoryContainer {
    fn handle(&self, name: &str) -> MemoryItem {
        MemoryItem::lazy(
            Arc::clone(&self.shared),
            Arc::clone(&self.bucket),
            name,
            self.url_of(name),
        )
    }

    fn url_of(&self, name: &str) -> Url {
        join_segments(
            &self.shared.base,
            std::iter::once(self.bucket.name.as_str()).chain(name.split('/')),
        )
    }
}

impl Container for MemoryContainer {
    fn id(&self) -> &str {
        &self.bucket.name
    }

    fn name(&self) -> &str {
        &self.bucket.name
    }

    fn items(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Item>>> {
        let names: Vec<String> = self
            .bucket
            .objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        let page = paginate(names, prefix, cursor, count, |n| n.as_str())?;
        Ok(page.map(|name| Box::new(self.handle(&name)) as Box<dyn Item>))
    }

    fn item(&self, id: &str) -> Result<Box<dyn Item>> {
        if self.bucket.lookup(id).is_none() {
            return Err(Error::not_found(format!("item {id} in {}", self.bucket.name)));
        }
        Ok(Box::new(self.handle(id)))
    }

    fn put(
        &self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        metadata: &Metadata,
    ) -> Result<Box<dyn Item>> {
        validate_name("item", name)?;
        let (content_type, properties) = split_content_type(&normalize_keys(metadata.clone()))?;

        let mut content = Vec::new();
        reader
            .take(size)
            .read_to_end(&mut content)
            .map_err(|e| Error::io(format!("reading content for {name}"), e))?;
        if content.len() as u64 != size {
            debug!(item = name, expected = size, actual = content.len(), "size mismatch");
            return Err(Error::SizeMismatch {
                expected: size,
                actual: content.len() as u64,
            });
        }

        let object = self
            .bucket
            .store(name, Object::new(content, content_type, properties));
        debug!(container = %self.bucket.name, item = name, size, "stored item");
        Ok(Box::new(MemoryItem::resolved(
            Arc::clone(&self.shared),
            Arc::clone(&self.bucket),
            name,
            self.url_of(name),
            object,
        )))
    }

    fn create_item(&self, name: &str) -> Result<(Box<dyn Item>, ItemWriter)> {
        validate_name("item", name)?;
        self.bucket
            .store(name, Object::new(Vec::new(), None, Properties::new()));
        let writer = MemoryWriter {
            bucket: Arc::clone(&self.bucket),
            name: name.to_string(),
            buf: Vec::new(),
            dirty: false,
        };
        Ok((Box::new(self.handle(name)), Box::new(writer)))
    }

    fn remove_item(&self, id: &str) -> Result<()> {
        match self.bucket.objects.write().expect("lock poisoned").remove(id) {
            Some(_) => {
                debug!(container = %self.bucket.name, item = id, "removed item");
                Ok(())
            }
            None => Err(Error::not_found(format!("item {id} in {}", self.bucket.name))),
        }
    }
}

/// Buffers writes and publishes the content on flush and on drop.
struct MemoryWriter {
    bucket: Arc<Bucket>,
    name: String,
    buf: Vec<u8>,
    dirty: bool,
}

impl MemoryWriter {
    fn publish(&mut self) {
        self.bucket.store(
            &self.name,
            Object::new(self.buf.clone(), None, Properties::new()),
        );
        self.dirty = false;
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.publish();
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if self.dirty {
            self.publish();
        }
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("empty {what} name")));
    }
    Ok(())
}
