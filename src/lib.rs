//! # autobackup
//!
//! Keeps dated copies of files next to where they live and thins old copies.
//!
//! ## Features
//!
//! - **Change detection**: Only files whose mtime changed since the last run are copied
//! - **Versioned copies**: `<dir>/.old/<stem>_<date>_<seq><suffix>`, mtime preserved
//! - **Retention**: Recent copies kept in full, then one per day, then one per week
//! - **Layered configuration**: TOML defaults, user settings and command line flags
//! - **Log viewer**: the `showlog` binary follows `autobackup.log` as it grows
//!
//! ## Quick Start
//!
//! ```no_run
//! use autobackup::backup::backup_config::{BackupConfig, CliOverrides};
//! use autobackup::backup::facade::BackupFacade;
//! use autobackup::backup::metadata::MetadataStore;
//!
//! let config = BackupConfig::load("cnf", CliOverrides::default())?;
//! let store = MetadataStore::open(config.common().db_path())?;
//! let mut facade = BackupFacade::from_config(&config, store)?;
//! let report = facade.execute(
//!     *config.common().discard_old_backup(),
//!     &config.common().retention(),
//! )?;
//! println!("copied {} files", report.copied);
//! facade.close()?;
//! # Ok::<(), autobackup::backup::result_error::error::Error>(())
//! ```

pub mod backup;
