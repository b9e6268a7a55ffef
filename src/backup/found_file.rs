//! Immutable records of scanned files and the path normalization they rely on.
//!
//! A [`FoundFile`] is built once per scan and never mutated. Its identity is
//! the normalized absolute path together with the scan root, which is what
//! the source classifier, change detector and retention engine key on.

use bon::bon;
use chrono::{DateTime, Local};
use getset::{CopyGetters, Getters};
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Case normalization the way the host filesystem compares names.
#[cfg(windows)]
pub fn normcase<S: AsRef<str>>(s: S) -> String {
    s.as_ref().replace('/', "\\").to_lowercase()
}

/// Case normalization the way the host filesystem compares names.
#[cfg(not(windows))]
pub fn normcase<S: AsRef<str>>(s: S) -> String {
    s.as_ref().to_owned()
}

/// Absolute, lexically normalized path. Symlinks are not resolved.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut result = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Lookup key used everywhere a file is identified by path.
pub fn normpath_key<P: AsRef<Path>>(path: P) -> String {
    normcase(normalize_path(path).to_string_lossy())
}

pub fn system_time_to_epoch(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Local date-time for an epoch timestamp with fractional seconds.
pub fn epoch_to_local(epoch: f64) -> Option<DateTime<Local>> {
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).map(|utc| utc.with_timezone(&Local))
}

#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct FoundFile {
    #[getset(get = "pub")]
    path: PathBuf,
    /// Normalized and normcased.
    #[getset(get = "pub")]
    scan_root: PathBuf,
    #[getset(get = "pub")]
    relpath: PathBuf,
    #[getset(get = "pub")]
    key: String,
    #[getset(get_copy = "pub")]
    mtime: f64,
    #[getset(get_copy = "pub")]
    size: u64,
    /// `None` when the hidden view failed.
    #[getset(get_copy = "pub")]
    hidden: Option<bool>,
    /// `None` when the symlink view failed.
    #[getset(get_copy = "pub")]
    symlink: Option<bool>,
}

#[bon]
impl FoundFile {
    /// Synthesizes a record without touching the filesystem.
    ///
    /// When `scan_root` is omitted the parent directory of `path` is used.
    #[builder]
    pub fn new(
        #[builder(into)] path: PathBuf,
        #[builder(into)] scan_root: Option<PathBuf>,
        #[builder(default)] mtime: f64,
        #[builder(default)] size: u64,
        hidden: Option<bool>,
        symlink: Option<bool>,
    ) -> FoundFile {
        let path = normalize_path(path);
        let scan_root = scan_root
            .map(normalize_path)
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let scan_root = PathBuf::from(normcase(scan_root.to_string_lossy()));
        let relpath = relative_to(&path, &scan_root);
        let key = normcase(path.to_string_lossy());

        FoundFile {
            path,
            scan_root,
            relpath,
            key,
            mtime,
            size,
            hidden,
            symlink,
        }
    }
}

impl FoundFile {
    /// Stats `path` and records what the classifier and versioner need.
    pub fn from_path<P1: AsRef<Path>, P2: AsRef<Path>>(path: P1, scan_root: P2) -> io::Result<FoundFile> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let hidden = detect_hidden(path, &metadata).ok();
        let symlink = std::fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .ok();

        Ok(FoundFile::builder()
            .path(path)
            .scan_root(scan_root.as_ref())
            .mtime(system_time_to_epoch(metadata.modified()?))
            .size(metadata.len())
            .maybe_hidden(hidden)
            .maybe_symlink(symlink)
            .build())
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without its last extension. Leading-dot names have no extension.
    pub fn stem(&self) -> String {
        let name = self.name();
        match split_suffix(&name) {
            Some(idx) => name[..idx].to_owned(),
            None => name,
        }
    }

    /// Last extension including the dot, or empty.
    pub fn suffix(&self) -> String {
        let name = self.name();
        match split_suffix(&name) {
            Some(idx) => name[idx..].to_owned(),
            None => String::new(),
        }
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    pub fn modified_local(&self) -> Option<DateTime<Local>> {
        epoch_to_local(self.mtime)
    }
}

fn split_suffix(name: &str) -> Option<usize> {
    name.rfind('.').filter(|idx| *idx > 0 && *idx + 1 < name.len())
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    let depth = root.components().count();
    if PathBuf::from(normcase(path.to_string_lossy())).starts_with(root) {
        path.components().skip(depth).collect()
    } else {
        path.file_name().map(PathBuf::from).unwrap_or_default()
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn detect_hidden(path: &Path, _metadata: &Metadata) -> io::Result<bool> {
    Ok(path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false))
}

#[cfg(target_os = "macos")]
fn detect_hidden(path: &Path, metadata: &Metadata) -> io::Result<bool> {
    use std::os::macos::fs::MetadataExt;
    const UF_HIDDEN: u32 = 0x8000;
    let dotfile = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    Ok(dotfile || metadata.st_flags() & UF_HIDDEN != 0)
}

#[cfg(windows)]
fn detect_hidden(_path: &Path, metadata: &Metadata) -> io::Result<bool> {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    Ok(metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
}

#[cfg(not(any(unix, windows)))]
fn detect_hidden(_path: &Path, _metadata: &Metadata) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "hidden attribute is not available on this platform",
    ))
}

impl PartialEq for FoundFile {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.scan_root == other.scan_root
    }
}

impl Eq for FoundFile {}

impl Hash for FoundFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.scan_root.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path_removes_dot_segments() {
        let normalized = normalize_path("/a/b/../c/./d");
        assert_eq!(normalized, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn test_default_scan_root_is_parent() {
        let file = FoundFile::builder().path("/data/docs/report.txt").build();
        assert_eq!(file.scan_root(), &PathBuf::from(normcase("/data/docs")));
        assert_eq!(file.relpath(), &PathBuf::from("report.txt"));
    }

    #[test]
    fn test_relpath_against_scan_root() {
        let file = FoundFile::builder()
            .path("/data/docs/sub/report.txt")
            .scan_root("/data")
            .build();
        assert_eq!(file.relpath(), &PathBuf::from("docs/sub/report.txt"));
    }

    #[test]
    fn test_stem_and_suffix() {
        let file = FoundFile::builder().path("/d/archive.tar.gz").build();
        assert_eq!(file.stem(), "archive.tar");
        assert_eq!(file.suffix(), ".gz");

        let dotfile = FoundFile::builder().path("/d/.bashrc").build();
        assert_eq!(dotfile.stem(), ".bashrc");
        assert_eq!(dotfile.suffix(), "");

        let bare = FoundFile::builder().path("/d/Makefile").build();
        assert_eq!(bare.stem(), "Makefile");
        assert_eq!(bare.suffix(), "");
    }

    #[test]
    fn test_equality_ignores_mtime_and_size() {
        let a = FoundFile::builder().path("/d/f.txt").mtime(1.0).size(1).build();
        let b = FoundFile::builder().path("/d/./f.txt").mtime(2.0).size(9).build();
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equality_depends_on_scan_root() {
        let a = FoundFile::builder().path("/d/e/f.txt").scan_root("/d").build();
        let b = FoundFile::builder().path("/d/e/f.txt").scan_root("/d/e").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_epoch_to_local_keeps_fraction() {
        let dt = Local.with_ymd_and_hms(2023, 1, 23, 4, 56, 12).unwrap();
        let epoch = dt.timestamp() as f64 + 0.25;
        let back = epoch_to_local(epoch).unwrap();
        assert_eq!(back.day(), 23);
        assert_eq!(back.second(), 12);
        assert_eq!(back.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".hidden"), "abc").unwrap();
        std::fs::write(temp_dir.path().join("plain.txt"), "abcdef").unwrap();

        let hidden = FoundFile::from_path(temp_dir.path().join(".hidden"), temp_dir.path()).unwrap();
        let plain = FoundFile::from_path(temp_dir.path().join("plain.txt"), temp_dir.path()).unwrap();

        assert_eq!(plain.size(), 6);
        assert_eq!(plain.symlink(), Some(false));
        assert_eq!(plain.relpath(), &PathBuf::from("plain.txt"));
        assert!(plain.mtime() > 0.0);
        #[cfg(unix)]
        {
            assert_eq!(hidden.hidden(), Some(true));
            assert_eq!(plain.hidden(), Some(false));
        }
        let _ = hidden;
    }

    #[test]
    fn test_from_path_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FoundFile::from_path(temp_dir.path().join("nope"), temp_dir.path()).is_err());
    }
}
