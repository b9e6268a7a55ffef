//! Layered configuration.
//!
//! Built-in defaults, then `<cnf_dirpath>/defaults.toml`, then
//! `<cnf_dirpath>/my_settings.toml`, then command line overrides. TOML layers
//! are merged table by table; arrays are replaced as a whole.

use crate::backup::found_file::normpath_key;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::retention::RetentionConfig;
use crate::backup::target::Target;
use crate::backup::validate::{
    validate_datetime_format, validate_destination_dir, validate_non_empty_path,
    validate_non_empty_str,
};

use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use validator::{Validate, ValidationError};

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const DEFAULT_CNF: &str = "defaults.toml";
pub const USR_CNF: &str = "my_settings.toml";

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(default, deny_unknown_fields)]
#[validate(schema(function = validate_seq_num_sep))]
#[getset(get = "pub")]
pub struct CommonConfig {
    #[validate(custom(function = validate_non_empty_path))]
    tmp_dirpath: PathBuf,
    #[validate(custom(function = validate_non_empty_path))]
    var_dirpath: PathBuf,
    #[validate(custom(function = validate_non_empty_path))]
    log_dirpath: PathBuf,
    #[validate(custom(function = validate_non_empty_str))]
    db_filename: String,
    #[validate(custom(function = validate_destination_dir))]
    destination_dir: String,
    #[validate(custom(function = validate_datetime_format))]
    datetime_format: String,
    use_seq_num: bool,
    #[getset(skip)]
    seq_num_sep: String,
    scan_symlink_dir: bool,
    discard_old_backup: bool,
    discard_phase1_weeks: Option<i64>,
    discard_phase2_months: Option<i64>,
    dry_run: bool,
    debug: bool,
}

impl Default for CommonConfig {
    fn default() -> Self {
        CommonConfig {
            tmp_dirpath: PathBuf::from("tmp"),
            var_dirpath: PathBuf::from("var"),
            log_dirpath: PathBuf::from("var/log"),
            db_filename: "autobackup.db".to_owned(),
            destination_dir: ".old".to_owned(),
            datetime_format: "_%Y-%m-%d".to_owned(),
            use_seq_num: true,
            seq_num_sep: "_".to_owned(),
            scan_symlink_dir: false,
            discard_old_backup: true,
            discard_phase1_weeks: Some(2),
            discard_phase2_months: Some(2),
            dry_run: false,
            debug: false,
        }
    }
}

fn validate_seq_num_sep(common: &CommonConfig) -> std::result::Result<(), ValidationError> {
    if common.use_seq_num && common.seq_num_sep.is_empty() {
        return Err(ValidationError::new("InvalidSeqNumSep")
            .with_message("seq_num_sep must not be empty when use_seq_num is true".into()));
    }

    Ok(())
}

impl CommonConfig {
    /// Separator before the sequence number, absent when sequencing is off.
    pub fn seq_num_sep(&self) -> Option<String> {
        self.use_seq_num.then(|| self.seq_num_sep.clone())
    }

    pub fn db_path(&self) -> PathBuf {
        self.var_dirpath.join(&self.db_filename)
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            phase1_weeks: self.discard_phase1_weeks,
            phase2_months: self.discard_phase2_months,
        }
    }

    fn apply(&mut self, o: CommonOverrides) {
        macro_rules! override_with {
            ($target:ident, $source:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = $source.$field {
                    $target.$field = v;
                })*
            };
        }
        let common = self;
        override_with!(
            common, o;
            tmp_dirpath,
            var_dirpath,
            log_dirpath,
            db_filename,
            destination_dir,
            datetime_format,
            use_seq_num,
            seq_num_sep,
            scan_symlink_dir,
            discard_old_backup,
        );
        if o.discard_phase1_weeks.is_some() {
            common.discard_phase1_weeks = o.discard_phase1_weeks;
        }
        if o.discard_phase2_months.is_some() {
            common.discard_phase2_months = o.discard_phase2_months;
        }
        common.dry_run |= o.dry_run;
        common.debug |= o.debug;
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_unique_targets))]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[serde(default)]
    #[validate(nested)]
    common: CommonConfig,
    #[serde(default)]
    #[validate(nested)]
    targets: Vec<Target>,
}

fn validate_unique_targets(config: &BackupConfig) -> std::result::Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for target in &config.targets {
        if !seen.insert(normpath_key(target.path())) {
            return Err(ValidationError::new("DuplicateTarget")
                .with_message(format!("Duplicate target directory {:?}", target.path()).into()));
        }
    }

    Ok(())
}

/// Values given on the command line. `None` leaves the configured value.
#[derive(Clone, Debug, Default)]
pub struct CommonOverrides {
    pub tmp_dirpath: Option<PathBuf>,
    pub var_dirpath: Option<PathBuf>,
    pub log_dirpath: Option<PathBuf>,
    pub db_filename: Option<String>,
    pub destination_dir: Option<String>,
    pub datetime_format: Option<String>,
    pub use_seq_num: Option<bool>,
    pub seq_num_sep: Option<String>,
    pub scan_symlink_dir: Option<bool>,
    pub discard_old_backup: Option<bool>,
    pub discard_phase1_weeks: Option<i64>,
    pub discard_phase2_months: Option<i64>,
    pub dry_run: bool,
    pub debug: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub common: CommonOverrides,
    /// Replaces the configured targets when not empty.
    pub targets: Vec<Target>,
}

/// Merges `overlay` into `base`, descending into tables present in both.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(overlay_table) => match base.get_mut(&key) {
                Some(Value::Table(base_table)) => merge_tables(base_table, overlay_table),
                _ => {
                    base.insert(key, Value::Table(overlay_table));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

#[named]
fn read_table(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .map_err(Error::from)
        .with_msg(format!("Read config failed: {:?}", path))
        .with_debug_object_and_fn_name(path.to_path_buf(), function_path!())?;
    content
        .parse::<Table>()
        .map_err(Error::from)
        .with_msg(format!("Parse TOML config failed: {:?}", path))
}

impl BackupConfig {
    /// Loads, merges and validates the configuration found in `cnf_dirpath`.
    ///
    /// `my_settings.toml` is created empty when missing.
    #[named]
    pub fn load<P: AsRef<Path>>(cnf_dirpath: P, overrides: CliOverrides) -> Result<BackupConfig> {
        let cnf_dirpath = cnf_dirpath.as_ref();
        let mut table = Table::new();

        let default_cnf = cnf_dirpath.join(DEFAULT_CNF);
        if default_cnf.is_file() {
            merge_tables(&mut table, read_table(&default_cnf)?);
        }

        let usr_cnf = cnf_dirpath.join(USR_CNF);
        std::fs::create_dir_all(cnf_dirpath)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&usr_cnf)
            })
            .map_err(Error::from)
            .with_msg(format!("Cannot create {:?}", usr_cnf))
            .with_debug_object_and_fn_name(usr_cnf.clone(), function_path!())?;
        merge_tables(&mut table, read_table(&usr_cnf)?);

        let mut config = BackupConfig::deserialize(Value::Table(table))
            .map_err(Error::from)
            .with_msg(format!("Invalid configuration in {:?}", cnf_dirpath))?;
        config.apply(overrides);
        config
            .validate()
            .map_err(Error::from)
            .with_msg("Config validation failed")?;

        Ok(config)
    }

    fn apply(&mut self, overrides: CliOverrides) {
        self.common.apply(overrides.common);
        if !overrides.targets.is_empty() {
            self.targets = overrides.targets;
        }
    }
}
