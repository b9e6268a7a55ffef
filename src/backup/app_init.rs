//! Working directories and the pre-run database snapshot.

use crate::backup::backup_config::CommonConfig;
use crate::backup::found_file::{epoch_to_local, system_time_to_epoch};
use crate::backup::function_path;
use crate::backup::metadata::MetadataStore;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};

use function_name::named;

use std::path::{Path, PathBuf};

const SNAPSHOT_DATETIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%6f";

/// Creates the tmp, var and log directories, reporting every one that fails.
#[named]
pub fn create_dirs(common: &CommonConfig) -> Result<()> {
    let dirs = [common.tmp_dirpath(), common.var_dirpath(), common.log_dirpath()];
    let errors = dirs
        .iter()
        .filter_map(|dir| {
            std::fs::create_dir_all(dir)
                .map_err(Error::from)
                .with_msg(format!("Cannot create directory {:?}", dir))
                .err()
        })
        .collect::<Vec<_>>();
    convert_error_vec(errors)
        .with_debug_object_and_fn_name(dirs.map(|d| d.to_path_buf()), function_path!())
}

/// Copies the database to `<db>.<db mtime>` when it exists.
#[named]
pub fn snapshot_db<P: AsRef<Path>>(db_path: P) -> Result<Option<PathBuf>> {
    let db_path = db_path.as_ref();
    if !db_path.is_file() {
        return Ok(None);
    }

    let mtime = std::fs::metadata(db_path)
        .and_then(|m| m.modified())
        .map_err(Error::from)
        .with_debug_object_and_fn_name(db_path.to_path_buf(), function_path!())?;
    let stamp = epoch_to_local(system_time_to_epoch(mtime))
        .map(|dt| dt.format(SNAPSHOT_DATETIME_FORMAT).to_string())
        .unwrap_or_default();
    let mut snapshot_path = db_path.as_os_str().to_owned();
    snapshot_path.push(".");
    snapshot_path.push(stamp);
    let snapshot_path = PathBuf::from(snapshot_path);

    let store = MetadataStore::open(db_path).with_debug_object_and_fn_name(db_path.to_path_buf(), function_path!())?;
    store
        .snapshot_to(&snapshot_path)
        .with_msg(format!("Snapshot of {:?} failed", db_path))
        .with_debug_object_and_fn_name(db_path.to_path_buf(), function_path!())?;
    store.close()?;
    tracing::info!("DB_SNAPSHOT: {:?}", snapshot_path);

    Ok(Some(snapshot_path))
}

/// Prepares the working directories and, for a dry run, snapshots the database.
pub fn init(common: &CommonConfig) -> Result<()> {
    create_dirs(common)?;
    if *common.dry_run() {
        snapshot_db(common.db_path())?;
    }
    Ok(())
}
