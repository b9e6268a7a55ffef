//! One backup pass: scan, copy what changed, record it, thin old copies.

use crate::backup::backup_config::BackupConfig;
use crate::backup::change_detector;
use crate::backup::classifier::SourceClassifier;
use crate::backup::destination::{CopyOutcome, DestinationRepository};
use crate::backup::function_path;
use crate::backup::metadata::{Metadata, MetadataStore};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::retention::{files_to_discard, RetentionConfig};
use crate::backup::scanner::{AllFileScanner, ScanRoot};
use crate::backup::target::Target;

use bon::bon;
use chrono::{Local, NaiveDate};
use function_name::named;

/// What a pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub copied: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub metadata_replaced: usize,
    pub metadata_removed: usize,
    pub bytes_copied: u64,
}

pub struct BackupFacade {
    targets: Vec<Target>,
    scanner: AllFileScanner,
    destination: DestinationRepository,
    store: MetadataStore,
}

#[bon]
impl BackupFacade {
    #[builder]
    pub fn new(
        targets: Vec<Target>,
        #[builder(into)] dst_dir_name: String,
        #[builder(into)] datetime_format: String,
        #[builder(into)] seq_sep: Option<String>,
        #[builder(default)] scan_symlink_dir: bool,
        #[builder(default)] dry_run: bool,
        store: MetadataStore,
    ) -> Result<BackupFacade> {
        let scanner = AllFileScanner::builder()
            .roots(targets.iter().map(ScanRoot::from).collect::<Vec<_>>())
            .scan_symlink_dir(scan_symlink_dir)
            .dst_dir_name(dst_dir_name.clone())
            .build();
        let destination = DestinationRepository::builder()
            .dst_dir_name(dst_dir_name)
            .datetime_format(datetime_format)
            .maybe_seq_sep(seq_sep)
            .dry_run(dry_run)
            .build()?;

        Ok(BackupFacade {
            targets,
            scanner,
            destination,
            store,
        })
    }
}

impl BackupFacade {
    pub fn from_config(config: &BackupConfig, store: MetadataStore) -> Result<Self> {
        let common = config.common();
        BackupFacade::builder()
            .targets(config.targets().clone())
            .dst_dir_name(common.destination_dir().clone())
            .datetime_format(common.datetime_format().clone())
            .maybe_seq_sep(common.seq_num_sep())
            .scan_symlink_dir(*common.scan_symlink_dir())
            .dry_run(*common.dry_run())
            .store(store)
            .build()
    }

    /// Runs one pass dated today.
    pub fn execute(&mut self, discard_enabled: bool, retention: &RetentionConfig) -> Result<RunReport> {
        self.execute_on(Local::now().date_naive(), discard_enabled, retention)
    }

    /// Runs one pass as if the current date were `today`.
    ///
    /// Failures copying or deleting a single file are logged and skipped;
    /// anything else aborts the pass. A dry run leaves the metadata store
    /// untouched, so the next real pass still sees every change.
    #[named]
    pub fn execute_on(
        &mut self,
        today: NaiveDate,
        discard_enabled: bool,
        retention: &RetentionConfig,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        let dry_run = *self.destination.dry_run();
        let all_files = self.scanner.all_files().with_debug_object_and_fn_name(today, function_path!())?;
        let sources = SourceClassifier::new(&self.targets, self.destination.dst_dir_name())
            .matching_files(&all_files);

        let stale = self
            .store
            .uncontained_keys(sources.keys())
            .with_debug_object_and_fn_name(today, function_path!())?;
        if dry_run {
            for key in &stale {
                tracing::debug!("DRY_RUN DELETE_FROM_DB: {}", key);
            }
        } else {
            self.store
                .remove_metadatas(&stale)
                .with_debug_object_and_fn_name(today, function_path!())?;
            report.metadata_removed = stale.len();
        }

        let modified = change_detector::modified(sources.values(), &self.store)
            .with_debug_object_and_fn_name(today, function_path!())?;
        for record in self.destination.create_backups(&modified) {
            match record.outcome {
                CopyOutcome::Copied { bytes } => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                CopyOutcome::DryRun { bytes } => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                    continue;
                }
                CopyOutcome::AlreadyExists if dry_run => {
                    report.skipped += 1;
                    continue;
                }
                CopyOutcome::AlreadyExists => report.skipped += 1,
            }
            self.store
                .update_metadata(&Metadata::from(&record.src))
                .with_debug_object_and_fn_name(record.src.key().clone(), function_path!())?;
            report.metadata_replaced += 1;
        }

        if discard_enabled {
            let entries = self.destination.all_backups(&all_files);
            let discard = files_to_discard(entries, today, retention);
            report.deleted = self.destination.remove_backups(&discard).len();
        }

        tracing::info!("TOTAL_COPIED: {} bytes", report.bytes_copied);
        Ok(report)
    }

    /// Closes the metadata store, surfacing any error doing so.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
