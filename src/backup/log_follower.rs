//! Following a growing log file, the way `tail -f` does.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};

use function_name::named;
use getset::Getters;

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Only UTF-8 is decoded; invalid sequences become U+FFFD.
pub fn check_encoding(encoding: &str) -> Result<()> {
    match encoding.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "utf8" => Ok(()),
        _ => Err(Error::config(format!("unsupported encoding {encoding:?}, only utf-8 is supported"))),
    }
}

#[derive(Debug, Getters)]
pub struct LogFollower {
    #[getset(get = "pub")]
    path: PathBuf,
    reader: BufReader<File>,
    pos: u64,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
}

impl LogFollower {
    #[named]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(Error::from)
            .with_msg(format!("Cannot open {:?}", path))
            .with_debug_object_and_fn_name(path.clone(), function_path!())?;
        Ok(LogFollower {
            path,
            reader: BufReader::new(file),
            pos: 0,
            pending: Vec::new(),
        })
    }

    /// Complete lines written since the last call, without line endings.
    ///
    /// Starts over from the beginning when the file shrank.
    #[named]
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let len = self
            .reader
            .get_ref()
            .metadata()
            .map_err(Error::from)
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())?
            .len();
        if len < self.pos {
            tracing::debug!("TRUNCATED: {:?}", self.path);
            self.reader.seek(SeekFrom::Start(0))?;
            self.pos = 0;
            self.pending.clear();
        }

        let mut lines = Vec::new();
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .map_err(Error::from)
                .with_debug_object_and_fn_name(self.path.clone(), function_path!())?;
            if read == 0 {
                break;
            }
            self.pos += read as u64;
            if self.pending.last() != Some(&b'\n') {
                break;
            }
            let line = String::from_utf8_lossy(&self.pending);
            lines.push(line.trim_end_matches(['\n', '\r']).to_owned());
            self.pending.clear();
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).create(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_reads_existing_then_appended_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("autobackup.log");
        append(&log, "START: autobackup\r\nCOPY_FILE_TO_[.old]: a\n");
        let mut follower = LogFollower::open(&log).unwrap();

        assert_eq!(
            follower.read_new_lines().unwrap(),
            vec!["START: autobackup", "COPY_FILE_TO_[.old]: a"]
        );
        assert!(follower.read_new_lines().unwrap().is_empty());

        append(&log, "FINISH: autobackup\n");
        assert_eq!(follower.read_new_lines().unwrap(), vec!["FINISH: autobackup"]);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("autobackup.log");
        append(&log, "TOTAL_");
        let mut follower = LogFollower::open(&log).unwrap();

        assert!(follower.read_new_lines().unwrap().is_empty());
        append(&log, "COPIED: 5 bytes\n");
        assert_eq!(follower.read_new_lines().unwrap(), vec!["TOTAL_COPIED: 5 bytes"]);
    }

    #[test]
    fn test_truncated_file_read_from_start() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("autobackup.log");
        append(&log, "first run line one\nfirst run line two\n");
        let mut follower = LogFollower::open(&log).unwrap();
        follower.read_new_lines().unwrap();

        std::fs::write(&log, "new\n").unwrap();

        assert_eq!(follower.read_new_lines().unwrap(), vec!["new"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("autobackup.log");
        std::fs::write(&log, b"caf\xe9\n").unwrap();
        let mut follower = LogFollower::open(&log).unwrap();

        assert_eq!(follower.read_new_lines().unwrap(), vec!["caf\u{fffd}"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let error = LogFollower::open(temp_dir.path().join("none.log")).unwrap_err();
        assert_eq!(error.raw_os_error(), Some(2));
    }

    #[test]
    fn test_check_encoding() {
        assert!(check_encoding("utf-8").is_ok());
        assert!(check_encoding("UTF8").is_ok());
        assert!(check_encoding("cp932").is_err());
    }
}
