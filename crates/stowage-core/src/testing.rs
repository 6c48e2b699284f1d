//! Behavioural checks every backend must pass.
//!
//! Backends call [`run_all`] from their own test modules with a fresh,
//! empty location. The checks panic on the first violation.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::cursor::{is_cursor_end, CURSOR_START};
use crate::error::{Error, ErrorKind};
use crate::metadata::Metadata;
use crate::traits::{open_range, Container, Location};
use crate::walk::walk_items;

/// Run every check against `location`, which must start out empty.
pub fn run_all(location: &dyn Location) {
    container_lifecycle(location);
    put_and_read(location);
    listing_during_put(location);
    pagination(location);
    bad_cursor(location);
    create_item_writer(location);
    item_by_url(location);
    byte_ranges(location);
    missing_entries(location);
    location.close().expect("close");
    location.close().expect("second close");
}

fn fresh(location: &dyn Location, name: &str) -> Box<dyn Container> {
    location
        .create_container(name)
        .unwrap_or_else(|e| panic!("create container {name}: {e}"))
}

fn put_bytes(container: &dyn Container, name: &str, bytes: &[u8]) {
    container
        .put(name, &mut Cursor::new(bytes), bytes.len() as u64, &Metadata::new())
        .unwrap_or_else(|e| panic!("put {name}: {e}"));
}

fn read_item(container: &dyn Container, id: &str) -> Vec<u8> {
    let item = container.item(id).expect("item");
    let mut reader = item.open().expect("open");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).expect("read");
    buf
}

pub fn container_lifecycle(location: &dyn Location) {
    let created = fresh(location, "lifecycle");
    assert_eq!(created.name(), "lifecycle");

    let found = location.container(created.id()).expect("lookup container");
    assert_eq!(found.name(), "lifecycle");

    let page = location.containers("life", CURSOR_START, 10).expect("list");
    assert!(page.items.iter().any(|c| c.name() == "lifecycle"));

    location.remove_container(created.id()).expect("remove");
    let err = location.container(created.id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
}

pub fn put_and_read(location: &dyn Location) {
    let container = fresh(location, "put-read");
    let content = b"the quick brown fox";
    let item = container
        .put("fox.txt", &mut Cursor::new(&content[..]), content.len() as u64, &Metadata::new())
        .expect("put");

    assert_eq!(item.name(), "fox.txt");
    assert_eq!(item.size().expect("size"), content.len() as u64);
    assert!(!item.etag().expect("etag").is_empty());
    item.last_mod().expect("last mod");
    item.metadata().expect("metadata");
    assert_eq!(read_item(container.as_ref(), item.id()), content);

    let mut stream = item.open().expect("open");
    let mut head = [0u8; 3];
    stream.read_exact(&mut head).expect("read head");
    assert_eq!(stream.seek(SeekFrom::Start(0)).expect("rewind"), 0);
    let mut again = Vec::new();
    stream.read_to_end(&mut again).expect("read after rewind");
    assert_eq!(again, content);
    drop(stream);

    // Overwriting replaces the content.
    put_bytes(container.as_ref(), "fox.txt", b"jumps");
    assert_eq!(read_item(container.as_ref(), item.id()), b"jumps");

    let err = container
        .put("short.txt", &mut Cursor::new(&b"abc"[..]), 10, &Metadata::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SizeMismatch, "{err}");
    assert!(container.item("short.txt").is_err());

    container.remove_item(item.id()).expect("remove item");
    assert!(container.item(item.id()).unwrap_err().is_not_found());
}

/// Content source that lists its container on the first read, while the
/// put consuming it is still in progress.
struct ListingReader<'a> {
    container: &'a dyn Container,
    content: Cursor<&'static [u8]>,
    seen: Option<Vec<String>>,
}

impl Read for ListingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.seen.is_none() {
            let page = self
                .container
                .items("", CURSOR_START, 100)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            self.seen = Some(page.items.iter().map(|i| i.name().to_string()).collect());
        }
        self.content.read(buf)
    }
}

pub fn listing_during_put(location: &dyn Location) {
    let container = fresh(location, "mid-put");
    put_bytes(container.as_ref(), "settled.txt", b"done");

    let mut reader = ListingReader {
        container: container.as_ref(),
        content: Cursor::new(&b"in flight"[..]),
        seen: None,
    };
    container
        .put("pending.txt", &mut reader, 9, &Metadata::new())
        .expect("put");
    assert_eq!(reader.seen.expect("content was read"), vec!["settled.txt"]);

    let page = container.items("", CURSOR_START, 100).expect("list");
    let names: Vec<_> = page.items.iter().map(|i| i.name()).collect();
    assert_eq!(names, vec!["pending.txt", "settled.txt"]);
}

pub fn pagination(location: &dyn Location) {
    let container = fresh(location, "paging");
    let names: Vec<String> = (0..7).map(|i| format!("page-{i:02}")).collect();
    for name in &names {
        put_bytes(container.as_ref(), name, name.as_bytes());
    }
    put_bytes(container.as_ref(), "other", b"x");

    let mut seen = Vec::new();
    let mut cursor = CURSOR_START.to_string();
    loop {
        let page = container.items("page-", &cursor, 3).expect("page");
        assert!(page.len() <= 3);
        seen.extend(page.items.iter().map(|i| i.name().to_string()));
        if is_cursor_end(&page.cursor) {
            break;
        }
        cursor = page.cursor;
    }
    assert_eq!(seen, names);

    let mut walked = Vec::new();
    walk_items(container.as_ref(), "page-", 2, |item| {
        walked.push(item.name().to_string());
        Ok(())
    })
    .expect("walk");
    assert_eq!(walked, names);

    let err = container.items("", CURSOR_START, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

pub fn bad_cursor(location: &dyn Location) {
    let container = fresh(location, "bad-cursor");
    put_bytes(container.as_ref(), "a", b"1");
    let err = container.items("", "nonexistent-name", 5).unwrap_err();
    assert!(matches!(err, Error::BadCursor { .. }), "{err}");

    let err = location.containers("", "nonexistent-name", 5).unwrap_err();
    assert!(matches!(err, Error::BadCursor { .. }), "{err}");
}

pub fn create_item_writer(location: &dyn Location) {
    let container = fresh(location, "writer");
    let (item, mut writer) = container.create_item("streamed.bin").expect("create item");
    writer.write_all(b"streamed ").expect("write");
    writer.write_all(b"content").expect("write");
    writer.flush().expect("flush");
    drop(writer);

    assert_eq!(read_item(container.as_ref(), item.id()), b"streamed content");
    let fresh_handle = container.item(item.id()).expect("item");
    assert_eq!(fresh_handle.size().expect("size"), 16);
}

pub fn item_by_url(location: &dyn Location) {
    let container = fresh(location, "by-url");
    put_bytes(container.as_ref(), "located.txt", b"here");
    let item = container.item("located.txt").expect("item");
    let again = location.item_by_url(&item.url()).expect("item by url");
    assert_eq!(again.name(), "located.txt");
    assert_eq!(again.size().expect("size"), 4);
}

pub fn byte_ranges(location: &dyn Location) {
    let container = fresh(location, "ranges");
    put_bytes(container.as_ref(), "digits", b"0123456789");
    let item = container.item("digits").expect("item");
    match open_range(item.as_ref(), 2..5) {
        Ok(mut reader) => {
            let mut buf = String::new();
            reader.read_to_string(&mut buf).expect("read range");
            assert_eq!(buf, "234");

            let mut tail = String::new();
            open_range(item.as_ref(), 8..100)
                .expect("range past end")
                .read_to_string(&mut tail)
                .expect("read tail");
            assert_eq!(tail, "89");
        }
        Err(err) => assert!(err.is_not_supported(), "{err}"),
    }
    #[allow(clippy::reversed_empty_ranges)]
    let err = open_range(item.as_ref(), 5..2).err().expect("reversed range");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

pub fn missing_entries(location: &dyn Location) {
    assert!(location.container("no-such-container").unwrap_err().is_not_found());
    let container = fresh(location, "missing");
    assert!(container.item("no-such-item").unwrap_err().is_not_found());
}
