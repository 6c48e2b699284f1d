//! Stowage: uniform access to object storage.
//!
//! This crate is the entry point for applications. It re-exports the
//! protocol from `stowage-core` and registers the built-in backends:
//!
//! | kind         | scheme      | storage                                  |
//! |--------------|-------------|------------------------------------------|
//! | `local`      | `file`      | plain files under a directory            |
//! | `local-meta` | `file-meta` | files with an embedded metadata header   |
//! | `memory`     | `mem`       | process memory                           |
//!
//! ```no_run
//! use std::io::Cursor;
//! use stowage_sdk::{ConfigMap, Metadata};
//!
//! let config = ConfigMap::new().with("path", "/srv/objects");
//! let location = stowage_sdk::connect("local-meta", &config)?;
//! let photos = location.create_container("photos")?;
//! let body = b"...";
//! photos.put("cat.jpg", &mut Cursor::new(&body[..]), body.len() as u64, &Metadata::new())?;
//! # Ok::<(), stowage_sdk::Error>(())
//! ```

use std::sync::Once;

use tracing::debug;

pub use stowage_core::{
    dial, is_cursor_end, is_not_supported, kind_by_url, kinds, not_supported, open_range,
    presign_request, validate, walk_containers, walk_items, ClientMethod, Config, ConfigMap,
    Container, Error, ErrorKind, Item, ItemRanger, ItemReader, ItemWriter, Location, Metadata,
    Page, PreSigner, PresignParams, RangeReader, ReadSeek, Result, CURSOR_START,
};
pub use stowage_core::{config, metadata};
pub use stowage_local::LocalLocation;
pub use stowage_local_meta::LocalMetaLocation;
pub use stowage_memory::MemoryLocation;
pub use stowage_meta::{MetaError, ShiftedStream, FORMAT_VERSION};

static BUILTIN: Once = Once::new();

/// Register the built-in kinds. Safe to call any number of times from any
/// thread; registration happens once.
pub fn register_builtin() {
    BUILTIN.call_once(|| {
        stowage_local::register();
        stowage_local_meta::register();
        stowage_memory::register();
        debug!(kinds = ?kinds(), "registered built-in kinds");
    });
}

/// Register the built-in kinds if needed, then [`dial`].
pub fn connect(kind_or_url: &str, config: &dyn Config) -> Result<Box<dyn Location>> {
    register_builtin();
    dial(kind_or_url, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::thread;

    #[test]
    fn builtin_kinds_register_once() {
        let handles: Vec<_> = (0..4).map(|_| thread::spawn(register_builtin)).collect();
        for handle in handles {
            handle.join().unwrap();
        }
        register_builtin();

        let kinds = kinds();
        for kind in ["local", "local-meta", "memory"] {
            assert_eq!(kinds.iter().filter(|k| **k == kind).count(), 1, "{kind}");
        }
        let pos = |kind: &str| kinds.iter().position(|k| *k == kind).unwrap();
        assert!(pos("local") < pos("local-meta"));
        assert!(pos("local-meta") < pos("memory"));
    }

    #[test]
    fn schemes_resolve_to_kinds() {
        register_builtin();
        for (url, kind) in [
            ("file:///srv", "local"),
            ("file-meta:///srv", "local-meta"),
            ("mem://default/", "memory"),
        ] {
            let url = url::Url::parse(url).unwrap();
            assert_eq!(kind_by_url(&url).unwrap(), kind);
        }
        let unknown = url::Url::parse("gopher://x").unwrap();
        assert!(matches!(kind_by_url(&unknown), Err(Error::NoMatchingKind(_))));
    }

    #[test]
    fn same_calls_work_on_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        let meta_dir = tempfile::tempdir().unwrap();
        let locations = [
            connect("memory", &ConfigMap::new()).unwrap(),
            connect(
                "local",
                &ConfigMap::new().with("path", dir.path().display().to_string()),
            )
            .unwrap(),
            connect(
                "local-meta",
                &ConfigMap::new().with("path", meta_dir.path().display().to_string()),
            )
            .unwrap(),
        ];
        for location in &locations {
            let c = location.create_container("shared").unwrap();
            c.put("hello.txt", &mut Cursor::new(&b"hello"[..]), 5, &Metadata::new())
                .unwrap();

            let mut names = Vec::new();
            walk_items(c.as_ref(), "", 1, |item| {
                names.push(item.name().to_string());
                Ok(())
            })
            .unwrap();
            assert_eq!(names, vec!["hello.txt"]);

            let mut body = String::new();
            c.item("hello.txt")
                .unwrap()
                .open()
                .unwrap()
                .read_to_string(&mut body)
                .unwrap();
            assert_eq!(body, "hello");

            let err = presign_request(c.as_ref(), ClientMethod::Get, "hello.txt", &PresignParams::default())
                .unwrap_err();
            assert!(is_not_supported(&err));
        }
    }
}
