//! Filesystem plumbing shared by the `local` and `local-meta` backends.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde_json::json;
use stowage_core::metadata::weak_etag;
use stowage_core::{Error, Metadata, Result};
use tempfile::Builder;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const METADATA_PATH: &str = "path";
pub const METADATA_IS_DIR: &str = "is_dir";
pub const METADATA_DIR: &str = "dir";
pub const METADATA_NAME: &str = "name";
pub const METADATA_MODE: &str = "mode";
pub const METADATA_MODE_D: &str = "mode_d";
pub const METADATA_PERM: &str = "perm";
pub const METADATA_INODE: &str = "inode";
pub const METADATA_SIZE: &str = "size";
pub const METADATA_IS_HARDLINK: &str = "is_hardlink";
pub const METADATA_IS_SYMLINK: &str = "is_symlink";
pub const METADATA_LINK: &str = "link";

/// File name prefix of in-progress writes; listings never show these.
pub const TEMP_PREFIX: &str = ".stowage-tmp-";

/// Map an I/O failure on `path`, turning a missing file into `NotFound`.
pub fn io_error(op: &str, path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::not_found(path.display().to_string())
    } else {
        Error::io(format!("{op} {}", path.display()), err)
    }
}

/// Join a slash-separated item name onto `root`, refusing names that would
/// escape it or collide with staging files.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf> {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("empty name".into()));
    }
    let mut path = root.to_path_buf();
    for part in trimmed.split('/').filter(|p| !p.is_empty()) {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !part.starts_with(TEMP_PREFIX) => {
                path.push(part)
            }
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "name {name:?} has an invalid component {part:?}"
                )))
            }
        }
    }
    Ok(path)
}

/// Reject container names that are not a single path component.
pub fn validate_container_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(Error::InvalidArgument(format!(
            "invalid container name {name:?}"
        )));
    }
    Ok(())
}

/// One entry of a flattened directory tree.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Slash-separated path relative to the walked root; directories end in
    /// `/`.
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Walk `root` recursively, sorted by file name at every level. Directories
/// are included as `name/` entries when `with_dirs` is set. In-progress
/// writes and names that are not valid UTF-8 are skipped.
pub fn flat_entries(root: &Path, with_dirs: bool) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let walk = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_temp(e.file_name()));
    for entry in walk {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(err) => io_error("walking", &path, err),
                None => Error::InvalidArgument(format!("filesystem loop at {}", path.display())),
            }
        })?;
        let is_dir = entry.file_type().is_dir();
        if is_dir && !with_dirs {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(parts) = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
        else {
            warn!(path = %entry.path().display(), "skipping entry with a non UTF-8 name");
            continue;
        };
        let mut name = parts.join("/");
        if is_dir {
            name.push('/');
        }
        entries.push(Entry {
            name,
            path: entry.into_path(),
            is_dir,
        });
    }
    Ok(entries)
}

fn is_temp(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with(TEMP_PREFIX))
}

pub fn timestamp(at: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(at)
}

/// Weak entity tag derived from a modification time.
pub fn mtime_etag(modified: &DateTime<Utc>) -> String {
    weak_etag(modified.to_rfc3339().as_bytes())
}

/// Stat-derived metadata of the file at `path`.
pub fn file_metadata(path: &Path, info: &fs::Metadata) -> Metadata {
    let mut md = Metadata::new();
    md.insert(METADATA_PATH.into(), json!(path.display().to_string()));
    md.insert(METADATA_IS_DIR.into(), json!(info.is_dir()));
    md.insert(
        METADATA_DIR.into(),
        json!(path.parent().map(|p| p.display().to_string()).unwrap_or_default()),
    );
    md.insert(
        METADATA_NAME.into(),
        json!(path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()),
    );
    md.insert(METADATA_SIZE.into(), json!(info.len()));

    let link = fs::symlink_metadata(path)
        .ok()
        .filter(|m| m.file_type().is_symlink())
        .and_then(|_| fs::read_link(path).ok());
    md.insert(METADATA_IS_SYMLINK.into(), json!(link.is_some()));
    md.insert(
        METADATA_LINK.into(),
        json!(link.map(|l| l.display().to_string()).unwrap_or_default()),
    );

    unix_metadata(&mut md, info);
    md
}

#[cfg(unix)]
fn unix_metadata(md: &mut Metadata, info: &fs::Metadata) {
    use std::os::unix::fs::MetadataExt;

    let mode = info.mode();
    md.insert(METADATA_MODE.into(), json!(format!("{:o}", mode & 0o7777)));
    md.insert(METADATA_MODE_D.into(), json!(mode.to_string()));
    md.insert(METADATA_PERM.into(), json!(permission_string(info.is_dir(), mode)));
    md.insert(METADATA_INODE.into(), json!(info.ino()));
    md.insert(METADATA_IS_HARDLINK.into(), json!(info.nlink() > 1));
}

#[cfg(not(unix))]
fn unix_metadata(md: &mut Metadata, info: &fs::Metadata) {
    let readonly = info.permissions().readonly();
    md.insert(METADATA_PERM.into(), json!(if readonly { "r" } else { "rw" }));
    md.insert(METADATA_IS_HARDLINK.into(), json!(false));
}

/// `ls -l` style permission string, e.g. `-rw-r--r--`.
#[cfg(unix)]
fn permission_string(is_dir: bool, mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_dir { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Write `header` followed by exactly `size` bytes of `reader` to `path`.
///
/// The data goes to a temporary file in the destination directory that is
/// renamed over `path` only once everything arrived, so a failed write never
/// leaves a partial item behind. Returns the number of content bytes.
pub fn write_atomically(
    path: &Path,
    header: Option<&[u8]>,
    reader: &mut dyn Read,
    size: u64,
) -> Result<u64> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidArgument(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| io_error("creating directory", parent, e))?;

    let mut tmp = Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent)
        .map_err(|e| io_error("creating temporary file in", parent, e))?;
    if let Some(header) = header {
        tmp.write_all(header)
            .map_err(|e| io_error("writing header of", path, e))?;
    }
    let written = io::copy(&mut reader.take(size), &mut tmp)
        .map_err(|e| io_error("writing", path, e))?;
    if written != size {
        warn!(path = %path.display(), expected = size, actual = written, "size mismatch; discarding write");
        return Err(Error::SizeMismatch {
            expected: size,
            actual: written,
        });
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing", path, e))?;
    tmp.persist(path)
        .map_err(|e| io_error("renaming into", path, e.error))?;
    debug!(path = %path.display(), size, "wrote file");
    Ok(written)
}

/// Create (or truncate) the file at `path`, creating parent directories.
pub fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("creating directory", parent, e))?;
    }
    File::create(path).map_err(|e| io_error("creating", path, e))
}

/// Remove the file or directory tree at `path`.
pub fn remove_path(path: &Path) -> Result<()> {
    let info = fs::symlink_metadata(path).map_err(|e| io_error("removing", path, e))?;
    let removed = if info.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| io_error("removing", path, e))?;
    debug!(path = %path.display(), "removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/srv/data");
        assert_eq!(
            resolve(root, "a/b.txt").unwrap(),
            PathBuf::from("/srv/data/a/b.txt")
        );
        assert_eq!(resolve(root, "dir/").unwrap(), PathBuf::from("/srv/data/dir"));
        assert!(resolve(root, "../etc/passwd").is_err());
        assert!(resolve(root, "a/../../x").is_err());
        assert!(resolve(root, "").is_err());
        assert!(resolve(root, &format!("a/{TEMP_PREFIX}x")).is_err());
    }

    #[test]
    fn container_names_are_single_components() {
        assert!(validate_container_name("photos").is_ok());
        assert!(validate_container_name("a/b").is_err());
        assert!(validate_container_name("..").is_err());
        assert!(validate_container_name("").is_err());
    }

    #[test]
    fn flat_entries_walks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b/c/d.txt"), b"d").unwrap();
        fs::write(dir.path().join("b/e.txt"), b"e").unwrap();

        let files: Vec<String> = flat_entries(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(files, vec!["a.txt", "b/c/d.txt", "b/e.txt"]);

        let all: Vec<String> = flat_entries(dir.path(), true)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(all, vec!["a.txt", "b/", "b/c/", "b/c/d.txt", "b/e.txt"]);
    }

    #[test]
    fn flat_entries_skip_in_progress_writes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"r").unwrap();
        fs::write(dir.path().join(format!("{TEMP_PREFIX}x1y2")), b"partial").unwrap();

        let names: Vec<String> = flat_entries(dir.path(), true)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["real.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn flat_entries_skip_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.txt"), b"o").unwrap();
        let odd = dir.path().join(OsStr::from_bytes(b"bad\xff.txt"));
        if fs::write(&odd, b"b").is_err() {
            // Some filesystems refuse such names outright.
            return;
        }
        let names: Vec<String> = flat_entries(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["ok.txt"]);
    }

    #[test]
    fn atomic_write_discards_short_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.bin");
        let err = write_atomically(&path, None, &mut Cursor::new(b"abc"), 10).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 10, actual: 3 }));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 0);

        write_atomically(&path, Some(&b"HDR"[..]), &mut Cursor::new(b"body"), 4).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"HDRbody");
    }

    #[test]
    fn missing_paths_map_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = remove_path(&dir.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn stat_metadata_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();
        let md = file_metadata(&path, &fs::metadata(&path).unwrap());
        for key in [
            METADATA_PATH,
            METADATA_IS_DIR,
            METADATA_DIR,
            METADATA_NAME,
            METADATA_MODE,
            METADATA_MODE_D,
            METADATA_PERM,
            METADATA_INODE,
            METADATA_SIZE,
            METADATA_IS_HARDLINK,
            METADATA_IS_SYMLINK,
            METADATA_LINK,
        ] {
            assert!(md.contains_key(key), "missing {key}");
        }
        assert_eq!(md[METADATA_SIZE], json!(5));
        assert_eq!(md[METADATA_NAME], json!("f.txt"));
        assert_eq!(md[METADATA_IS_DIR], json!(false));
        assert!(md[METADATA_PERM].as_str().unwrap().starts_with('-'));
    }

    #[cfg(unix)]
    #[test]
    fn permission_strings() {
        assert_eq!(permission_string(false, 0o644), "-rw-r--r--");
        assert_eq!(permission_string(true, 0o755), "drwxr-xr-x");
    }
}
