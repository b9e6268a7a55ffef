//! Selects backup sources out of a full scan.

use crate::backup::found_file::{normcase, normpath_key, FoundFile};
use crate::backup::target::Target;

use std::collections::{BTreeMap, HashMap};
use std::path::{PathBuf, MAIN_SEPARATOR_STR};

pub struct SourceClassifier<'a> {
    targets: HashMap<PathBuf, &'a Target>,
    archive_segment: String,
}

impl<'a> SourceClassifier<'a> {
    pub fn new<S: AsRef<str>>(targets: &'a [Target], dst_dir_name: S) -> Self {
        let targets = targets
            .iter()
            .map(|t| (PathBuf::from(normpath_key(t.path())), t))
            .collect();
        let archive_segment = format!(
            "{MAIN_SEPARATOR_STR}{}{MAIN_SEPARATOR_STR}",
            normcase(dst_dir_name.as_ref())
        );
        SourceClassifier {
            targets,
            archive_segment,
        }
    }

    /// Scanned files that are not archive copies and satisfy their target's rules.
    pub fn matching_files(
        &self,
        all_files: &BTreeMap<String, FoundFile>,
    ) -> BTreeMap<String, FoundFile> {
        all_files
            .iter()
            .filter(|(key, file)| {
                if key.contains(&self.archive_segment) {
                    tracing::debug!("NOT_SRC(BkupDir): {:?}", file.path());
                    return false;
                }
                match self.targets.get(file.scan_root()) {
                    Some(target) => is_to_be_caught(file, target),
                    None => {
                        tracing::debug!("NOT_SRC(NoTarget): {:?}", file.path());
                        false
                    }
                }
            })
            .map(|(key, file)| (key.clone(), file.clone()))
            .collect()
    }
}

fn is_to_be_caught(file: &FoundFile, target: &Target) -> bool {
    if !*target.catch_hidden() && is_hidden(file) {
        tracing::debug!("NOT_SRC(Hidden): {:?}", file.path());
        return false;
    }
    if !*target.catch_link() && is_symlink(file) {
        tracing::debug!("NOT_SRC(Symlink): {:?}", file.path());
        return false;
    }

    let relpath = file.relpath().to_string_lossy();
    let caught = target.catch_regex().full_match(&relpath)
        && !target.ignore_regex().full_match(&relpath);
    if !caught {
        tracing::debug!("NOT_SRC(Regex): {:?}", file.path());
    }
    caught
}

fn is_hidden(file: &FoundFile) -> bool {
    file.hidden().unwrap_or_else(|| {
        tracing::debug!("SKIP_HIDDEN_CHECK: {:?}", file.path());
        false
    })
}

fn is_symlink(file: &FoundFile) -> bool {
    file.symlink().unwrap_or_else(|| {
        tracing::debug!("SKIP_SYMLINK_CHECK: {:?}", file.path());
        false
    })
}
