use crate::backup::found_file::{normalize_path, FoundFile};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::target::Target;

use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use walkdir::{DirEntry, WalkDir};

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Root directory to walk and whether to descend into subdirectories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub recursive: bool,
}

impl From<&Target> for ScanRoot {
    fn from(target: &Target) -> Self {
        ScanRoot {
            path: normalize_path(target.path()),
            recursive: *target.recursive(),
        }
    }
}

/// Lists every regular file under the configured roots.
///
/// Files are keyed by their normalized path so later stages can look them up
/// and iterate them in a stable order.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct AllFileScanner {
    #[builder(into)]
    roots: Vec<ScanRoot>,
    #[builder(default)]
    scan_symlink_dir: bool,
    #[builder(into)]
    dst_dir_name: String,
}

impl AllFileScanner {
    #[named]
    pub fn all_files(&self) -> Result<BTreeMap<String, FoundFile>> {
        let mut result = BTreeMap::new();
        let mut files_total = 0;
        let mut dirs_total = 0;

        for root in &self.roots {
            let found = if root.recursive {
                self.recursive_scan(&root.path)
            } else {
                self.flat_scan(&root.path)
            }
            .with_debug_object_and_fn_name(root.path.clone(), function_path!())?;

            let files_count = found.len();
            let dirs_count = found
                .iter()
                .map(|f| f.parent().to_path_buf())
                .collect::<HashSet<_>>()
                .len();
            files_total += files_count;
            dirs_total += dirs_count;
            tracing::debug!(
                "SCAN_DIR: ({} files, {} dirs) {:?}",
                files_count,
                dirs_count,
                root.path
            );

            for file in found {
                result.insert(file.key().clone(), file);
            }
        }

        tracing::info!("SCAN_DIR: total {} files, {} dirs", files_total, dirs_total);
        Ok(result)
    }

    fn recursive_scan(&self, root: &Path) -> Result<Vec<FoundFile>> {
        let mut found = Vec::new();
        for res in WalkDir::new(root).min_depth(1).follow_links(self.scan_symlink_dir) {
            match res {
                Ok(de) => {
                    if let Some(file) = self.process_dir_entry(de, root) {
                        found.push(file);
                    }
                }
                Err(e) => {
                    if let Some(ancestor) = e.loop_ancestor() {
                        return Err(Error::ScanLoop {
                            path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                            ancestor: ancestor.to_path_buf(),
                        });
                    }
                    tracing::warn!("SKIP_SCAN: {}", e);
                }
            }
        }
        Ok(found)
    }

    /// Files directly in `root`, plus the archive directory next to them.
    fn flat_scan(&self, root: &Path) -> Result<Vec<FoundFile>> {
        let archive_dir = root.join(&self.dst_dir_name);
        let dirs = if archive_dir.is_dir() {
            vec![root.to_path_buf(), archive_dir]
        } else {
            vec![root.to_path_buf()]
        };

        let found = dirs
            .iter()
            .flat_map(|dir| WalkDir::new(dir).min_depth(1).max_depth(1).into_iter())
            .filter_map(|res| match res {
                Ok(de) => self.process_dir_entry(de, root),
                Err(e) => {
                    tracing::warn!("SKIP_SCAN: {}", e);
                    None
                }
            })
            .collect_vec();
        Ok(found)
    }

    fn process_dir_entry(&self, de: DirEntry, root: &Path) -> Option<FoundFile> {
        let file_type = de.file_type();
        if file_type.is_dir() {
            return None;
        }
        if file_type.is_symlink() && de.path().is_dir() {
            tracing::trace!("Skipping symlinked directory {:?}", de.path());
            return None;
        }

        match FoundFile::from_path(de.path(), root) {
            Ok(file) => {
                tracing::trace!("Found file: {:?}", file.path());
                Some(file)
            }
            Err(e) => {
                tracing::warn!("SKIP_SCAN: {:?}: {}", de.path(), e);
                None
            }
        }
    }
}
