use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_core::metadata::{normalize_keys, to_string_map};
use stowage_core::{
    paginate, Container, Item, ItemWriter, Location, Metadata, Page, Properties, Result,
};
use stowage_local::files::{
    create_file, flat_entries, io_error, remove_path, resolve, write_atomically,
};
use stowage_local::{ContainerDir, Root};
use stowage_meta::encode;
use tracing::{debug, info, warn};
use url::Url;

use crate::item::LocalMetaItem;

/// A directory of containers whose files carry an embedded metadata header.
#[derive(Clone, Debug)]
pub struct LocalMetaLocation {
    root: Arc<Root>,
}

impl LocalMetaLocation {
    pub fn new(root: Root) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    fn handle(&self, dir: ContainerDir) -> Box<dyn Container> {
        Box::new(LocalMetaContainer {
            root: Arc::clone(&self.root),
            name: dir.name,
            path: dir.path,
        })
    }
}

impl Location for LocalMetaLocation {
    fn containers(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Container>>> {
        Ok(self
            .root
            .containers(prefix, cursor, count)?
            .map(|dir| self.handle(dir)))
    }

    fn container(&self, id: &str) -> Result<Box<dyn Container>> {
        Ok(self.handle(self.root.container(id)?))
    }

    fn create_container(&self, name: &str) -> Result<Box<dyn Container>> {
        Ok(self.handle(self.root.create_container(name)?))
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.root.remove_container(id)
    }

    fn item_by_url(&self, url: &Url) -> Result<Box<dyn Item>> {
        let (container, item) = self.root.split_url(url)?;
        self.container(&container)?.item(&item)
    }
}

/// A container directory of a [`LocalMetaLocation`].
///
/// Listings include subdirectories as `name/` entries; they are the
/// directory markers created by zero-length puts.
#[derive(Debug)]
pub struct LocalMetaContainer {
    root: Arc<Root>,
    name: String,
    path: PathBuf,
}

impl LocalMetaContainer {
    fn handle(&self, name: &str) -> Result<LocalMetaItem> {
        let path = resolve(&self.path, name)?;
        Ok(LocalMetaItem::new(
            name.to_string(),
            path,
            self.root.item_url(&self.name, name),
        ))
    }
}

impl Container for LocalMetaContainer {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Item>>> {
        let entries = flat_entries(&self.path, true)?;
        let page = paginate(entries, prefix, cursor, count, |e| e.name.as_str())?;
        let mut items: Vec<Box<dyn Item>> = Vec::with_capacity(page.items.len());
        for entry in page.items {
            let url = self.root.item_url(&self.name, &entry.name);
            items.push(Box::new(LocalMetaItem::new(entry.name, entry.path, url)));
        }
        Ok(Page {
            items,
            cursor: page.cursor,
        })
    }

    fn item(&self, id: &str) -> Result<Box<dyn Item>> {
        let item = self.handle(id)?;
        fs::metadata(item.path()).map_err(|e| io_error("opening", item.path(), e))?;
        Ok(Box::new(item))
    }

    /// A zero-length put creates a directory marker and writes no header.
    fn put(
        &self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        metadata: &Metadata,
    ) -> Result<Box<dyn Item>> {
        let item = self.handle(name)?;
        if size == 0 {
            fs::create_dir_all(item.path())
                .map_err(|e| io_error("creating directory marker", item.path(), e))?;
            debug!(container = %self.name, item = name, "created directory marker");
            return Ok(Box::new(item));
        }

        let properties = to_string_map(&normalize_keys(metadata.clone()))?;
        let header = encode(&properties).map_err(|e| e.for_item(name))?;
        write_atomically(item.path(), Some(&header), reader, size)?;
        info!(
            container = %self.name,
            item = name,
            size,
            header = header.len(),
            "put item with embedded metadata"
        );
        Ok(Box::new(item))
    }

    /// The new file starts with an empty header; the writer appends content.
    fn create_item(&self, name: &str) -> Result<(Box<dyn Item>, ItemWriter)> {
        let item = self.handle(name)?;
        let header = encode(&Properties::new()).map_err(|e| e.for_item(name))?;
        let mut file = create_file(item.path())?;
        write_header(&mut file, item.path(), &header)?;
        debug!(container = %self.name, item = name, "created item");
        Ok((Box::new(item), Box::new(file)))
    }

    fn remove_item(&self, id: &str) -> Result<()> {
        let item = self.handle(id)?;
        remove_path(item.path())
    }
}

/// Write `header` to the freshly created file at `path`, removing the file
/// if the write fails so no headerless item is left behind.
fn write_header(out: &mut dyn Write, path: &Path, header: &[u8]) -> Result<()> {
    out.write_all(header).map_err(|e| {
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "could not remove partial item");
        }
        io_error("writing header of", path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_header_write_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item");
        fs::write(&path, b"").unwrap();

        let err = write_header(&mut FailingWriter, &path, &[0x12, 0x34, 0x01]).unwrap_err();
        assert!(err.to_string().contains("writing header of"), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn header_write_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item");
        let mut file = create_file(&path).unwrap();
        write_header(&mut file, &path, &[0x12, 0x34, 0x01]).unwrap();
        drop(file);
        assert_eq!(fs::read(&path).unwrap(), vec![0x12, 0x34, 0x01]);
    }
}
