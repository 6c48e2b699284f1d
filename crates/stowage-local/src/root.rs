use std::fs;
use std::path::{Path, PathBuf};

use stowage_core::addr::{decoded_segments, expect_scheme, join_segments};
use stowage_core::config::require;
use stowage_core::{paginate, Config, Error, Page, Result};
use tracing::{info, warn};
use url::Url;

use crate::files::{io_error, remove_path, validate_container_name};
use crate::CONFIG_PATH;

/// A directory whose subdirectories are containers.
///
/// Both local backends build their locations on a `Root`; they differ only
/// in how items are stored inside a container.
#[derive(Clone, Debug)]
pub struct Root {
    path: PathBuf,
    base: Url,
}

/// A container directory found under a [`Root`].
#[derive(Clone, Debug)]
pub struct ContainerDir {
    pub name: String,
    pub path: PathBuf,
}

impl Root {
    /// Open `path`, which must be an existing directory. Item URLs use
    /// `scheme` followed by the absolute path.
    pub fn open(kind: &str, scheme: &str, path: &Path) -> Result<Self> {
        let info = fs::metadata(path)
            .map_err(|e| Error::config(kind, format!("{}: {e}", path.display())))?;
        if !info.is_dir() {
            return Err(Error::config(
                kind,
                format!("{} must be a directory", path.display()),
            ));
        }
        let path = path
            .canonicalize()
            .map_err(|e| Error::io(format!("resolving {}", path.display()), e))?;

        let scheme_root = Url::parse(&format!("{scheme}:///"))
            .map_err(|e| Error::config(kind, format!("bad scheme {scheme}: {e}")))?;
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let base = join_segments(&scheme_root, parts.iter().map(String::as_str));
        Ok(Self { path, base })
    }

    /// Open the root named by the `path` configuration key.
    pub fn from_config(kind: &str, scheme: &str, config: &dyn Config) -> Result<Self> {
        let path = require(config, kind, CONFIG_PATH)?;
        Self::open(kind, scheme, Path::new(&path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn containers(&self, prefix: &str, cursor: &str, count: usize) -> Result<Page<ContainerDir>> {
        let mut dirs = Vec::new();
        let entries = fs::read_dir(&self.path).map_err(|e| io_error("listing", &self.path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error("listing", &self.path, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| io_error("inspecting", &entry.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping container with a non UTF-8 name");
                continue;
            };
            dirs.push(ContainerDir {
                name,
                path: entry.path(),
            });
        }
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(dirs, prefix, cursor, count, |d| d.name.as_str())
    }

    pub fn container(&self, id: &str) -> Result<ContainerDir> {
        validate_container_name(id)?;
        let path = self.path.join(id);
        match fs::metadata(&path) {
            Ok(info) if info.is_dir() => Ok(ContainerDir {
                name: id.to_string(),
                path,
            }),
            Ok(_) => Err(Error::not_found(format!("container {id}"))),
            Err(e) => Err(io_error("opening container", &path, e)),
        }
    }

    pub fn create_container(&self, name: &str) -> Result<ContainerDir> {
        validate_container_name(name)?;
        let path = self.path.join(name);
        fs::create_dir_all(&path).map_err(|e| io_error("creating container", &path, e))?;
        info!(container = name, root = %self.path.display(), "created container");
        Ok(ContainerDir {
            name: name.to_string(),
            path,
        })
    }

    pub fn remove_container(&self, id: &str) -> Result<()> {
        let dir = self.container(id)?;
        remove_path(&dir.path)?;
        info!(container = id, root = %self.path.display(), "removed container");
        Ok(())
    }

    /// URL of item `name` in `container`.
    pub fn item_url(&self, container: &str, name: &str) -> Url {
        join_segments(
            &self.base,
            std::iter::once(container).chain(name.split('/')),
        )
    }

    /// Split an item URL into container name and item name.
    pub fn split_url(&self, url: &Url) -> Result<(String, String)> {
        expect_scheme(url, self.base.scheme())?;
        let base = decoded_segments(&self.base)?;
        let segments = decoded_segments(url)?;
        let rest = segments
            .strip_prefix(base.as_slice())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("{url} is outside {}", self.path.display()))
            })?;
        match rest {
            [container, item @ ..] if !item.is_empty() => Ok((container.clone(), item.join("/"))),
            _ => Err(Error::InvalidArgument(format!(
                "{url} does not name an item"
            ))),
        }
    }
}
