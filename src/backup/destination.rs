//! Archive copies: where they go, whether they already exist, creating and
//! deleting them.
//!
//! A copy of `<dir>/<stem><suffix>` lives at
//! `<dir>/<dst_dir_name>/<stem><timestamp>[<seq_sep><seq:04>]<suffix>`, where
//! the timestamp is the source mtime rendered with the configured format.
//! [`DestinationRepository::all_backups`] inverts that naming with a regex.

use crate::backup::archive_pattern::{check_datetime_format, datetime_format_to_regex, to_chrono_format};
use crate::backup::change_detector::same_mtime;
use crate::backup::found_file::{normcase, normpath_key, system_time_to_epoch, FoundFile};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::retention::ArchiveEntry;

use bon::bon;
use filetime::FileTime;
use function_name::named;
use getset::Getters;
use regex::Regex;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};

/// Highest sequence number that fits the four-digit field.
pub const MAX_SEQ_NUM: u32 = 9999;

/// Tells whether an archive path is taken, and by which mtime.
pub trait DestinationView {
    fn existing_mtime(&self, path: &Path) -> Result<Option<f64>>;
}

/// Asks the filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsView;

impl DestinationView for FsView {
    fn existing_mtime(&self, path: &Path) -> Result<Option<f64>> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(Some(system_time_to_epoch(metadata.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Answers from an earlier scan.
impl DestinationView for BTreeMap<String, FoundFile> {
    fn existing_mtime(&self, path: &Path) -> Result<Option<f64>> {
        Ok(self.get(&normpath_key(path)).map(FoundFile::mtime))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    /// Would have been copied; nothing was written.
    DryRun { bytes: u64 },
    AlreadyExists,
}

/// A source file that went through the copy step.
#[derive(Clone, Debug, PartialEq)]
pub struct BackupRecord {
    pub src: FoundFile,
    pub dst: PathBuf,
    pub outcome: CopyOutcome,
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct DestinationRepository {
    dst_dir_name: String,
    datetime_format: String,
    seq_sep: Option<String>,
    dry_run: bool,
    #[getset(skip)]
    chrono_format: String,
    #[getset(skip)]
    check_filepath_re: Regex,
}

#[bon]
impl DestinationRepository {
    /// Without `seq_sep` no sequence number is written and a copy with the
    /// same rendered timestamp overwrites the previous one.
    #[builder]
    pub fn new(
        #[builder(into)] dst_dir_name: String,
        #[builder(into)] datetime_format: String,
        #[builder(into)] seq_sep: Option<String>,
        #[builder(default)] dry_run: bool,
    ) -> Result<DestinationRepository> {
        check_datetime_format(&datetime_format).map_err(Error::config)?;
        let check_filepath_re =
            build_check_filepath_re(&dst_dir_name, &datetime_format, seq_sep.as_deref())?;

        Ok(DestinationRepository {
            chrono_format: to_chrono_format(&datetime_format),
            dst_dir_name,
            datetime_format,
            seq_sep,
            dry_run,
            check_filepath_re,
        })
    }
}

// Must stay the inverse of `DestinationRepository::build_dst_filepath`.
fn build_check_filepath_re(
    dst_dir_name: &str,
    datetime_format: &str,
    seq_sep: Option<&str>,
) -> Result<Regex> {
    let dir_segment = regex::escape(&format!(
        "{MAIN_SEPARATOR_STR}{}{MAIN_SEPARATOR_STR}",
        normcase(dst_dir_name)
    ));
    let datetime = datetime_format_to_regex(datetime_format)
        .map_err(|d| Error::config(format!("unsupported directive {d} in datetime_format")))?;
    let seq = match seq_sep {
        Some(sep) => format!("{}[0-9]{{4}}", regex::escape(&normcase(sep))),
        None => String::new(),
    };

    Ok(Regex::new(&format!(
        r"^(?:(.*{dir_segment}.+){datetime}{seq}(\.[^.].*|))$"
    ))?)
}

impl DestinationRepository {
    fn build_dst_filepath(
        &self,
        dir_path: &Path,
        stem: &str,
        mtime_date: &str,
        seq_num: u32,
        suffix: &str,
    ) -> PathBuf {
        let file_name = match &self.seq_sep {
            Some(sep) => format!("{stem}{mtime_date}{sep}{seq_num:04}{suffix}"),
            None => format!("{stem}{mtime_date}{suffix}"),
        };
        dir_path.join(file_name)
    }

    fn render_mtime(&self, src_file: &FoundFile) -> Result<String> {
        let local = src_file.modified_local().ok_or_else(|| {
            Error::from(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("mtime {} of {:?} is out of range", src_file.mtime(), src_file.path()),
            ))
        })?;
        Ok(local.format(&self.chrono_format).to_string())
    }

    /// Path the copy of `src_file` goes to, and whether an identical copy is
    /// already there.
    ///
    /// With sequence numbers the lowest free number is chosen, unless a taken
    /// one already holds a copy with the same mtime.
    pub fn destination_for<P: DestinationView + ?Sized>(
        &self,
        src_file: &FoundFile,
        view: &P,
    ) -> Result<(PathBuf, bool)> {
        let dst_dir = src_file.parent().join(&self.dst_dir_name);
        let stem = src_file.stem();
        let suffix = src_file.suffix();
        let mtime_date = self.render_mtime(src_file)?;

        if self.seq_sep.is_none() {
            let dst_path = self.build_dst_filepath(&dst_dir, &stem, &mtime_date, 0, &suffix);
            let is_skip = view
                .existing_mtime(&dst_path)?
                .is_some_and(|mtime| same_mtime(mtime, src_file.mtime()));
            return Ok((dst_path, is_skip));
        }

        for seq_num in 0..=MAX_SEQ_NUM {
            let dst_path = self.build_dst_filepath(&dst_dir, &stem, &mtime_date, seq_num, &suffix);
            match view.existing_mtime(&dst_path)? {
                None => return Ok((dst_path, false)),
                Some(mtime) if same_mtime(mtime, src_file.mtime()) => return Ok((dst_path, true)),
                Some(_) => {}
            }
        }
        Err(io::Error::other(format!(
            "sequence numbers 0000-{MAX_SEQ_NUM} for {:?} in {:?} are all taken",
            src_file.path(),
            dst_dir
        ))
        .into())
    }

    /// Copies one file into its archive directory.
    ///
    /// OS errors are logged and yield `None`; they do not stop a batch.
    pub fn create_backup(&self, src_file: &FoundFile) -> Option<BackupRecord> {
        match self.try_create_backup(src_file) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("ERROR: {}", e);
                None
            }
        }
    }

    #[named]
    fn try_create_backup(&self, src_file: &FoundFile) -> Result<BackupRecord> {
        let (dst, is_skip) = self
            .destination_for(src_file, &FsView)
            .with_debug_object_and_fn_name(src_file.path().clone(), function_path!())?;

        if is_skip {
            tracing::info!("SKIP(Already): {:?}", src_file.path());
            return Ok(BackupRecord {
                src: src_file.clone(),
                dst,
                outcome: CopyOutcome::AlreadyExists,
            });
        }

        let outcome = if self.dry_run {
            tracing::info!(
                "DRY_RUN COPY_FILE_TO_[{}]: {:?}",
                self.dst_dir_name,
                src_file.path()
            );
            CopyOutcome::DryRun {
                bytes: src_file.size(),
            }
        } else {
            let bytes = copy_with_times(src_file.path(), &dst)
                .map_err(Error::from)
                .with_msg(format!("Copy {:?} to {:?} failed", src_file.path(), dst))
                .with_debug_object_and_fn_name(src_file.path().clone(), function_path!())?;
            tracing::info!(
                "COPY_FILE_TO_[{}]: {:?}",
                self.dst_dir_name,
                src_file.path()
            );
            CopyOutcome::Copied { bytes }
        };

        Ok(BackupRecord {
            src: src_file.clone(),
            dst,
            outcome,
        })
    }

    /// Copies every file, returning the ones that made it.
    pub fn create_backups<'a, I: IntoIterator<Item = &'a FoundFile>>(
        &self,
        src_files: I,
    ) -> Vec<BackupRecord> {
        src_files
            .into_iter()
            .filter_map(|f| self.create_backup(f))
            .collect()
    }

    /// Every scanned file that is an archive copy, with its base identity.
    pub fn all_backups(&self, all_files: &BTreeMap<String, FoundFile>) -> Vec<ArchiveEntry> {
        all_files
            .iter()
            .filter_map(|(key, file)| {
                let caps = self.check_filepath_re.captures(key)?;
                let base_identity = format!("{}{}", &caps[1], &caps[2]);
                Some(ArchiveEntry::new(file.clone(), base_identity))
            })
            .collect()
    }

    pub fn remove_backup(&self, file: &FoundFile) -> Option<FoundFile> {
        if self.dry_run {
            tracing::warn!("DRY_RUN DELETE_FILE: {:?}", file.path());
            return Some(file.clone());
        }
        match std::fs::remove_file(file.path()) {
            Ok(()) => {
                tracing::warn!("DELETE_FILE: {:?}", file.path());
                Some(file.clone())
            }
            Err(e) => {
                tracing::warn!("ERROR: {:?}: {}", file.path(), e);
                None
            }
        }
    }

    /// Deletes every file, returning the ones actually removed.
    pub fn remove_backups<'a, I: IntoIterator<Item = &'a FoundFile>>(
        &self,
        files: I,
    ) -> Vec<FoundFile> {
        files
            .into_iter()
            .filter_map(|f| self.remove_backup(f))
            .collect()
    }
}

fn copy_with_times(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(dir) = dst.parent() {
        if !dir.exists() {
            std::fs::create_dir(dir)?;
        }
    }
    let bytes = std::fs::copy(src, dst)?;
    let metadata = std::fs::metadata(src)?;
    filetime::set_file_times(
        dst,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> f64 {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp() as f64
    }

    fn repo(seq_sep: Option<&str>) -> DestinationRepository {
        DestinationRepository::builder()
            .dst_dir_name(".old")
            .datetime_format("_%Y-%m-%d")
            .maybe_seq_sep(seq_sep)
            .build()
            .unwrap()
    }

    fn archived(path: &Path, mtime: f64) -> (String, FoundFile) {
        let f = FoundFile::builder().path(path).mtime(mtime).build();
        (f.key().clone(), f)
    }

    #[test]
    fn test_invalid_datetime_format_rejected() {
        let result = DestinationRepository::builder()
            .dst_dir_name(".old")
            .datetime_format("_%Q")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_destination_starts_at_sequence_zero() {
        let src = FoundFile::builder().path("/d/File.txt").mtime(ts(2023, 1, 23, 4)).build();
        let existing: BTreeMap<String, FoundFile> = BTreeMap::new();

        let (dst, is_skip) = repo(Some("_")).destination_for(&src, &existing).unwrap();

        assert_eq!(dst, PathBuf::from("/d/.old/File_2023-01-23_0000.txt"));
        assert!(!is_skip);
    }

    #[test]
    fn test_destination_takes_lowest_free_sequence() {
        let mtime = ts(2023, 1, 23, 4);
        let src = FoundFile::builder().path("/d/File.txt").mtime(mtime).build();
        let existing: BTreeMap<_, _> = [
            archived(Path::new("/d/.old/File_2023-01-23_0000.txt"), mtime - 100.0),
            archived(Path::new("/d/.old/File_2023-01-23_0001.txt"), mtime - 50.0),
        ]
        .into();

        let (dst, is_skip) = repo(Some("_")).destination_for(&src, &existing).unwrap();

        assert_eq!(dst, PathBuf::from("/d/.old/File_2023-01-23_0002.txt"));
        assert!(!is_skip);
    }

    #[test]
    fn test_destination_skips_when_same_mtime_copy_exists() {
        let mtime = ts(2023, 1, 23, 4);
        let src = FoundFile::builder().path("/d/File.txt").mtime(mtime).build();
        let existing: BTreeMap<_, _> = [
            archived(Path::new("/d/.old/File_2023-01-23_0000.txt"), mtime - 100.0),
            archived(Path::new("/d/.old/File_2023-01-23_0001.txt"), mtime),
        ]
        .into();

        let (dst, is_skip) = repo(Some("_")).destination_for(&src, &existing).unwrap();

        assert_eq!(dst, PathBuf::from("/d/.old/File_2023-01-23_0001.txt"));
        assert!(is_skip);
    }

    #[test]
    fn test_destination_without_sequence_overwrites() {
        let mtime = ts(2023, 1, 23, 4);
        let src = FoundFile::builder().path("/d/File.txt").mtime(mtime).build();
        let existing: BTreeMap<_, _> =
            [archived(Path::new("/d/.old/File_2023-01-23.txt"), mtime - 100.0)].into();

        let (dst, is_skip) = repo(None).destination_for(&src, &existing).unwrap();
        assert_eq!(dst, PathBuf::from("/d/.old/File_2023-01-23.txt"));
        assert!(!is_skip);

        let existing: BTreeMap<_, _> =
            [archived(Path::new("/d/.old/File_2023-01-23.txt"), mtime)].into();
        let (_, is_skip) = repo(None).destination_for(&src, &existing).unwrap();
        assert!(is_skip);
    }

    /// Every slot holds an older copy, except optionally the last one.
    struct Crowded {
        last_free: bool,
    }

    impl DestinationView for Crowded {
        fn existing_mtime(&self, path: &Path) -> Result<Option<f64>> {
            let last = path.to_string_lossy().ends_with(&format!("_{MAX_SEQ_NUM}.txt"));
            Ok(if self.last_free && last { None } else { Some(0.0) })
        }
    }

    #[test]
    fn test_destination_uses_last_four_digit_sequence() {
        let src = FoundFile::builder().path("/d/File.txt").mtime(ts(2023, 1, 23, 4)).build();

        let (dst, is_skip) = repo(Some("_"))
            .destination_for(&src, &Crowded { last_free: true })
            .unwrap();

        assert_eq!(dst, PathBuf::from("/d/.old/File_2023-01-23_9999.txt"));
        assert!(!is_skip);
    }

    #[test]
    fn test_destination_fails_when_sequence_exhausted() {
        let src = FoundFile::builder().path("/d/File.txt").mtime(ts(2023, 1, 23, 4)).build();

        let error = repo(Some("_"))
            .destination_for(&src, &Crowded { last_free: false })
            .unwrap_err();

        assert!(error.to_string().contains("are all taken"), "{error}");
    }

    #[test]
    fn test_dotfile_keeps_its_name_as_stem() {
        let src = FoundFile::builder().path("/d/.TestFile21").mtime(ts(2023, 1, 23, 4)).build();
        let existing: BTreeMap<String, FoundFile> = BTreeMap::new();

        let (dst, _) = repo(Some("_")).destination_for(&src, &existing).unwrap();

        assert_eq!(dst, PathBuf::from("/d/.old/.TestFile21_2023-01-23_0000"));
    }

    #[test]
    fn test_all_backups_recovers_base_identity() {
        let files: BTreeMap<_, _> = [
            archived(Path::new("/d/.old/File_2023-01-23_0000.txt"), 0.0),
            archived(Path::new("/d/.old/File_2023-01-23_0001.txt"), 0.0),
            archived(Path::new("/d/.old/Other_2023-01-23_0000"), 0.0),
            archived(Path::new("/d/File.txt"), 0.0),
            archived(Path::new("/d/.old/unrelated.txt"), 0.0),
        ]
        .into();

        let entries = repo(Some("_")).all_backups(&files);
        let mut identities = entries.iter().map(|e| e.base_identity().clone()).collect::<Vec<_>>();
        identities.sort();

        assert_eq!(
            identities,
            vec![
                normcase("/d/.old/File.txt"),
                normcase("/d/.old/File.txt"),
                normcase("/d/.old/Other"),
            ]
        );
    }

    #[test]
    fn test_name_round_trip_through_pattern() {
        let mtime = ts(2022, 12, 31, 23);
        let repo = repo(Some("_"));
        let src = FoundFile::builder().path("/d/sub/report.final.pdf").mtime(mtime).build();
        let (dst, _) = repo.destination_for(&src, &BTreeMap::<String, FoundFile>::new()).unwrap();

        let files: BTreeMap<_, _> = [archived(&dst, mtime)].into();
        let entries = repo.all_backups(&files);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].base_identity(), &normcase("/d/sub/.old/report.final.pdf"));
        assert_eq!(
            entries[0].date(),
            Some(Local.with_ymd_and_hms(2022, 12, 31, 0, 0, 0).unwrap().date_naive())
        );
    }

    #[test]
    fn test_unsequenced_copies_grouped_by_mtime_date() {
        use crate::backup::retention::{files_to_discard, RetentionConfig};

        let files: BTreeMap<_, _> = [
            archived(Path::new("/d/.old/File_2022-12-31.txt"), ts(2023, 1, 1, 0)),
            archived(Path::new("/d/.old/File_2023-01-01.txt"), ts(2023, 1, 1, 1)),
            archived(Path::new("/d/file_2000-01-01_0000.txt"), ts(2000, 1, 1, 0)),
        ]
        .into();
        let entries = repo(None).all_backups(&files);
        assert_eq!(entries.len(), 2);

        let discard = files_to_discard(
            entries,
            chrono::NaiveDate::from_ymd_opt(2023, 1, 22).unwrap(),
            &RetentionConfig::builder().phase1_weeks(2).phase2_months(2).build(),
        );

        assert_eq!(discard.len(), 1);
        assert_eq!(discard[0].name(), "File_2022-12-31.txt");
    }

    #[test]
    fn test_create_backup_copies_and_preserves_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let src_path = temp_dir.path().join("data.txt");
        std::fs::write(&src_path, "hello").unwrap();
        let src = FoundFile::from_path(&src_path, temp_dir.path()).unwrap();
        let repo = repo(Some("_"));

        let record = repo.create_backup(&src).unwrap();

        assert_eq!(record.outcome, CopyOutcome::Copied { bytes: 5 });
        assert!(record.dst.starts_with(temp_dir.path().join(".old")));
        assert_eq!(std::fs::read_to_string(&record.dst).unwrap(), "hello");
        let copied_mtime = FsView.existing_mtime(&record.dst).unwrap().unwrap();
        assert!(same_mtime(copied_mtime, src.mtime()));

        let again = repo.create_backup(&src).unwrap();
        assert_eq!(again.outcome, CopyOutcome::AlreadyExists);
        assert_eq!(again.dst, record.dst);
    }

    #[test]
    fn test_create_backup_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let src = FoundFile::builder()
            .path(temp_dir.path().join("missing.txt"))
            .mtime(ts(2023, 1, 23, 4))
            .build();

        let records = repo(Some("_")).create_backups([&src]);

        assert!(records.is_empty());
    }

    #[test]
    fn test_dry_run_writes_and_deletes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let src_path = temp_dir.path().join("data.txt");
        std::fs::write(&src_path, "hello").unwrap();
        let src = FoundFile::from_path(&src_path, temp_dir.path()).unwrap();
        let repo = DestinationRepository::builder()
            .dst_dir_name(".old")
            .datetime_format("_%Y-%m-%d")
            .seq_sep("_")
            .dry_run(true)
            .build()
            .unwrap();

        let record = repo.create_backup(&src).unwrap();
        assert_eq!(record.outcome, CopyOutcome::DryRun { bytes: 5 });
        assert!(!temp_dir.path().join(".old").exists());

        let removed = repo.remove_backups([&src]);
        assert_eq!(removed, vec![src.clone()]);
        assert!(src_path.exists());
    }

    #[test]
    fn test_remove_backups_reports_only_removed() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.txt");
        std::fs::write(&present, "x").unwrap();
        let present = FoundFile::from_path(&present, temp_dir.path()).unwrap();
        let missing = FoundFile::builder().path(temp_dir.path().join("missing.txt")).build();

        let removed = repo(Some("_")).remove_backups([&present, &missing]);

        assert_eq!(removed, vec![present.clone()]);
        assert!(!present.path().exists());
    }
}
