//! Local filesystem Stowage backend with inline metadata.
//!
//! Kind `local-meta`, URL scheme `file-meta`. Containers are directories
//! under the configured `path`, as for the `local` backend, but every file
//! written through this backend starts with a metadata header (see
//! [`stowage_meta::codec`]). Readers never see the header:
//!
//! - `size` reports the content length, physical length minus header
//! - `open` hides the header behind a [`stowage_meta::ShiftedStream`]
//! - `etag` and `last_mod` prefer the embedded `etag` / `last-modified`
//!   keys over values derived from the file's modification time
//!
//! Files without a header (written by other tools) are served unchanged.
//!
//! Configuration:
//!
//! - `path` (required) -- an existing directory

mod item;
mod location;

pub use item::LocalMetaItem;
pub use location::{LocalMetaContainer, LocalMetaLocation};

use stowage_core::config::require;
use stowage_core::{Config, Location, Result};
use stowage_local::{Root, CONFIG_PATH};
use url::Url;

pub const KIND: &str = "local-meta";
pub const SCHEME: &str = "file-meta";

/// Add the `local-meta` kind to the process-wide registry.
pub fn register() -> bool {
    stowage_core::register(KIND, make, recognize, Some(validate))
}

fn make(config: &dyn Config) -> Result<Box<dyn Location>> {
    let root = Root::from_config(KIND, SCHEME, config)?;
    Ok(Box::new(LocalMetaLocation::new(root)))
}

fn validate(config: &dyn Config) -> Result<()> {
    require(config, KIND, CONFIG_PATH).map(|_| ())
}

fn recognize(url: &Url) -> bool {
    url.scheme() == SCHEME
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::fs;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use stowage_core::metadata::format_http_date;
    use stowage_core::{ConfigMap, Container, Error, ErrorKind, Metadata, CURSOR_START};
    use stowage_meta::{encode, MAGIC};

    fn location() -> (tempfile::TempDir, LocalMetaLocation) {
        let dir = tempfile::tempdir().unwrap();
        let root = Root::open(KIND, SCHEME, dir.path()).unwrap();
        (dir, LocalMetaLocation::new(root))
    }

    fn md(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn read_all(mut r: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    fn put(c: &dyn Container, name: &str, body: &[u8], metadata: &Metadata) {
        c.put(name, &mut Cursor::new(body), body.len() as u64, metadata)
            .unwrap();
    }

    #[test]
    fn conformance() {
        let (_dir, loc) = location();
        stowage_core::testing::run_all(&loc);
    }

    #[test]
    fn dial_requires_a_directory() {
        register();
        let err = stowage_core::dial(KIND, &ConfigMap::new()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let cfg = ConfigMap::new().with(CONFIG_PATH, file.display().to_string());
        assert!(matches!(
            stowage_core::dial(KIND, &cfg),
            Err(Error::Config { .. })
        ));

        let cfg = ConfigMap::new().with(CONFIG_PATH, dir.path().display().to_string());
        stowage_core::dial("file-meta:///ignored", &cfg).unwrap();
    }

    #[test]
    fn size_excludes_the_header() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let metadata = md(&[("Owner", "ops"), ("content-type", "text/plain")]);
        let body = b"0123456789abcdef";
        put(c.as_ref(), "file.txt", body, &metadata);

        let header = encode(
            &[("content-type", "text/plain"), ("owner", "ops")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap();
        let physical = fs::metadata(dir.path().join("c/file.txt")).unwrap().len();
        assert_eq!(physical, (body.len() + header.len()) as u64);

        let item = c.item("file.txt").unwrap();
        assert_eq!(item.size().unwrap(), body.len() as u64);
        assert_eq!(read_all(item.open().unwrap()), body);
    }

    #[test]
    fn seek_to_start_reads_only_content() {
        let (_dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        put(c.as_ref(), "f", b"content bytes", &md(&[("k", "v")]));

        let item = c.item("f").unwrap();
        let mut stream = item.open().unwrap();
        let mut first = [0u8; 7];
        stream.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"content");
        assert_eq!(stream.stream_position().unwrap(), 7);

        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(read_all(&mut stream), b"content bytes");

        assert_eq!(stream.seek(SeekFrom::Start(8)).unwrap(), 8);
        assert_eq!(read_all(&mut stream), b"bytes");
        assert_eq!(item.size().unwrap(), 13);
    }

    #[test]
    fn header_cannot_be_reached_by_seeking() {
        let (_dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        put(c.as_ref(), "f", b"abc", &md(&[("k", "v")]));

        let mut stream = c.item("f").unwrap().open().unwrap();
        let err = stream.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(read_all(&mut stream), b"abc");
    }

    #[test]
    fn embedded_metadata_overrides_stat() {
        let (_dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let when = Utc.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap();
        let http_date = format_http_date(&when);
        put(
            c.as_ref(),
            "tagged",
            b"x",
            &md(&[
                ("ETag", "\"abc123\""),
                ("Last-Modified", http_date.as_str()),
                ("name", "custom"),
            ]),
        );

        let item = c.item("tagged").unwrap();
        assert_eq!(item.etag().unwrap(), "\"abc123\"");
        assert_eq!(item.last_mod().unwrap(), when);
        let metadata = item.metadata().unwrap();
        assert_eq!(metadata["name"], json!("custom"));
        assert_eq!(metadata["etag"], json!("\"abc123\""));
        assert_eq!(metadata["size"], json!(1));
        assert!(metadata.contains_key("inode") || cfg!(not(unix)));
    }

    #[test]
    fn etag_falls_back_to_mtime() {
        let (_dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        put(c.as_ref(), "plain", b"x", &Metadata::new());
        let etag = c.item("plain").unwrap().etag().unwrap();
        assert!(etag.starts_with("W/\""), "{etag}");
    }

    #[test]
    fn files_without_header_pass_through() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let raw = b"written by someone else";
        fs::write(dir.path().join("c/raw.txt"), raw).unwrap();

        let item = c.item("raw.txt").unwrap();
        assert_eq!(item.size().unwrap(), raw.len() as u64);
        assert_eq!(read_all(item.open().unwrap()), raw);
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        fs::write(dir.path().join("c/broken"), &bytes).unwrap();

        let item = c.item("broken").unwrap();
        let err = item.size().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptMetadata);
        assert!(matches!(item.open(), Err(Error::CorruptMetadata { .. })));
    }

    #[test]
    fn reads_files_in_the_established_format() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let mut bytes = vec![0x12, 0x34, 0x01, 5, 0, 0, 0, 0x81, 0xa1, b'a', 0xa1, b'b'];
        bytes.extend_from_slice(b"content");
        fs::write(dir.path().join("c/legacy"), &bytes).unwrap();

        let item = c.item("legacy").unwrap();
        assert_eq!(item.size().unwrap(), 7);
        assert_eq!(item.metadata().unwrap()["a"], json!("b"));
        assert_eq!(read_all(item.open().unwrap()), b"content");
    }

    #[test]
    fn unknown_format_version_is_incompatible() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        fs::write(
            dir.path().join("c/future"),
            [0x12, 0x34, 0x02, 0, 0, 0, 0, b'z'],
        )
        .unwrap();
        let item = c.item("future").unwrap();
        assert!(matches!(
            item.open(),
            Err(Error::IncompatibleFormat { version: 0x02 })
        ));
    }

    #[test]
    fn size_mismatch_leaves_nothing_behind() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let err = c
            .put("partial", &mut Cursor::new(&b"abc"[..]), 9, &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 9, actual: 3 }));
        assert!(!dir.path().join("c/partial").exists());
        assert!(c.items("", CURSOR_START, 10).unwrap().is_empty());
    }

    #[test]
    fn zero_length_put_creates_directory_marker() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        c.put("folder/", &mut Cursor::new(&b""[..]), 0, &Metadata::new())
            .unwrap();
        assert!(dir.path().join("c/folder").is_dir());
        put(c.as_ref(), "folder/inner.txt", b"in", &Metadata::new());

        let page = c.items("", CURSOR_START, 10).unwrap();
        let names: Vec<_> = page.items.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["folder/", "folder/inner.txt"]);
        assert_eq!(page.items[0].size().unwrap(), 0);
        assert!(read_all(page.items[0].open().unwrap()).is_empty());

        c.remove_item("folder/").unwrap();
        assert!(!dir.path().join("c/folder").exists());
    }

    #[test]
    fn non_string_metadata_is_rejected() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("count".into(), json!(3));
        let err = c
            .put("n", &mut Cursor::new(&b"1"[..]), 1, &metadata)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata { .. }));
        assert!(!dir.path().join("c/n").exists());
    }

    #[test]
    fn info_is_a_snapshot_per_handle() {
        let (dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        put(c.as_ref(), "f", b"abc", &md(&[("k", "v")]));
        let item = c.item("f").unwrap();
        assert_eq!(item.size().unwrap(), 3);

        fs::write(dir.path().join("c/f"), b"now a much longer plain file").unwrap();
        assert_eq!(item.size().unwrap(), 3);
        assert_eq!(c.item("f").unwrap().size().unwrap(), 28);
    }

    #[test]
    fn ranges_skip_the_header() {
        let (_dir, loc) = location();
        let c = loc.create_container("c").unwrap();
        put(c.as_ref(), "d", b"0123456789", &md(&[("a", "b")]));
        let item = c.item("d").unwrap();
        let got = read_all(stowage_core::open_range(item.as_ref(), 2..5).unwrap());
        assert_eq!(got, b"234");
        let tail = read_all(stowage_core::open_range(item.as_ref(), 8..50).unwrap());
        assert_eq!(tail, b"89");
    }
}
