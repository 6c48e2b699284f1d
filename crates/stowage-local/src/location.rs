use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use stowage_core::{
    not_supported, paginate, Container, Error, Item, ItemWriter, Location, Metadata, Page, Result,
};
use tracing::debug;
use url::Url;

use crate::files::{create_file, flat_entries, io_error, remove_path, resolve, write_atomically};
use crate::item::LocalItem;
use crate::root::{ContainerDir, Root};

/// A directory on the local filesystem; each subdirectory is a container
/// and every file below it, at any depth, is an item.
#[derive(Clone, Debug)]
pub struct LocalLocation {
    root: Arc<Root>,
}

impl LocalLocation {
    pub fn new(root: Root) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    fn handle(&self, dir: ContainerDir) -> Box<dyn Container> {
        Box::new(LocalContainer {
            root: Arc::clone(&self.root),
            name: dir.name,
            path: dir.path,
        })
    }
}

impl Location for LocalLocation {
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

/// A container directory of a [`LocalLocation`].
#[derive(Debug)]
pub struct LocalContainer {
    root: Arc<Root>,
    name: String,
    path: PathBuf,
}

impl LocalContainer {
    fn handle(&self, name: &str) -> Result<LocalItem> {
        let path = resolve(&self.path, name)?;
        Ok(LocalItem::new(
            name.to_string(),
            path,
            self.root.item_url(&self.name, name),
        ))
    }
}

impl Container for LocalContainer {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<Box<dyn Item>>> {
        let files = flat_entries(&self.path, false)?;
        let page = paginate(files, prefix, cursor, count, |e| e.name.as_str())?;
        let mut items: Vec<Box<dyn Item>> = Vec::with_capacity(page.items.len());
        for entry in page.items {
            let url = self.root.item_url(&self.name, &entry.name);
            items.push(Box::new(LocalItem::new(entry.name, entry.path, url)));
        }
        Ok(Page {
            items,
            cursor: page.cursor,
        })
    }

    fn item(&self, id: &str) -> Result<Box<dyn Item>> {
        let item = self.handle(id)?;
        let info = fs::metadata(item.path()).map_err(|e| io_error("opening", item.path(), e))?;
        if info.is_dir() {
            return Err(Error::InvalidArgument(format!("{id} is a directory")));
        }
        Ok(Box::new(item))
    }

    fn put(
        &self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        metadata: &Metadata,
    ) -> Result<Box<dyn Item>> {
        if !metadata.is_empty() {
            return Err(not_supported("metadata"));
        }
        let item = self.handle(name)?;
        write_atomically(item.path(), None, reader, size)?;
        debug!(container = %self.name, item = name, size, "put item");
        Ok(Box::new(item))
    }

    fn create_item(&self, name: &str) -> Result<(Box<dyn Item>, ItemWriter)> {
        let item = self.handle(name)?;
        let file = create_file(item.path())?;
        debug!(container = %self.name, item = name, "created item");
        Ok((Box::new(item), Box::new(file)))
    }

    fn remove_item(&self, id: &str) -> Result<()> {
        let item = self.handle(id)?;
        remove_path(item.path())
    }
}
