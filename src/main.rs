use autobackup::backup::app_init;
use autobackup::backup::backup_config::{BackupConfig, CliOverrides, CommonOverrides};
use autobackup::backup::facade::BackupFacade;
use autobackup::backup::logging::{early_subscriber, init_logging};
use autobackup::backup::metadata::MetadataStore;
use autobackup::backup::result_error::error::Error;
use autobackup::backup::result_error::result::Result;
use autobackup::backup::result_error::WithMsg;
use autobackup::backup::target::Target;

use clap::Parser;
use tracing::{error, info};

use std::path::PathBuf;
use std::process::ExitCode;

/// Copy changed files into sibling archive directories and thin old copies
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Perform a dry run: no file is copied or deleted and the internal
    /// database is left unchanged (a snapshot of it is still taken)
    #[arg(long = "dry_run")]
    dry_run: bool,
    /// Print DEBUG logs to the console
    #[arg(long)]
    debug: bool,
    /// Directory containing configuration files
    #[arg(long = "cnf_dirpath", default_value = "cnf")]
    cnf_dirpath: PathBuf,
    /// Directory to store temporary files
    #[arg(long = "tmp_dirpath")]
    tmp_dirpath: Option<PathBuf>,
    /// Directory to store variable files
    #[arg(long = "var_dirpath")]
    var_dirpath: Option<PathBuf>,
    /// Directory to log to
    #[arg(long = "log_dirpath")]
    log_dirpath: Option<PathBuf>,
    /// File name of the internal database
    #[arg(long = "db_filename")]
    db_filename: Option<String>,
    /// Name of the directory holding backup copies. Must be a relative path
    #[arg(long = "destination_dir")]
    destination_dir: Option<String>,
    /// strftime format of the timestamp in backup file names
    #[arg(long = "datetime_format")]
    datetime_format: Option<String>,
    /// Whether sequence numbers are used
    #[arg(long = "use_seq_num")]
    use_seq_num: Option<bool>,
    /// Separator between the timestamp and the sequence number
    #[arg(long = "seq_num_sep")]
    seq_num_sep: Option<String>,
    /// Target directory and matching rules in JSON, e.g.
    /// {"path": "path/to/dir", "catch_regex": ".*", "ignore_regex": "", "catch_hidden": true, "catch_link": false, "recursive": true}
    #[arg(long, value_parser = parse_target)]
    target: Vec<Target>,
    /// Whether symbolic links to directories are followed while scanning
    #[arg(long = "scan_symlink_dir")]
    scan_symlink_dir: Option<bool>,
    /// Whether old backup copies are discarded
    #[arg(long = "discard_old_backup")]
    discard_old_backup: Option<bool>,
    /// Weeks, counted back from this week, during which every copy is kept
    #[arg(long = "discard_phase1_weeks", allow_negative_numbers = true)]
    discard_phase1_weeks: Option<i64>,
    /// Months, counted back from this month, before which one copy per week is kept
    #[arg(long = "discard_phase2_months", allow_negative_numbers = true)]
    discard_phase2_months: Option<i64>,
}

fn parse_target(s: &str) -> std::result::Result<Target, String> {
    s.parse::<Target>().map_err(|e| e.to_string())
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        CliOverrides {
            common: CommonOverrides {
                tmp_dirpath: args.tmp_dirpath,
                var_dirpath: args.var_dirpath,
                log_dirpath: args.log_dirpath,
                db_filename: args.db_filename,
                destination_dir: args.destination_dir,
                datetime_format: args.datetime_format,
                use_seq_num: args.use_seq_num,
                seq_num_sep: args.seq_num_sep,
                scan_symlink_dir: args.scan_symlink_dir,
                discard_old_backup: args.discard_old_backup,
                discard_phase1_weeks: args.discard_phase1_weeks,
                discard_phase2_months: args.discard_phase2_months,
                dry_run: args.dry_run,
                debug: args.debug,
            },
            targets: args.target,
        }
    }
}

fn run(config: &BackupConfig) -> Result<()> {
    let common = config.common();
    app_init::init(common)?;

    let store = MetadataStore::open(common.db_path())?;
    let mut facade = BackupFacade::from_config(config, store)?;
    let report = facade.execute(*common.discard_old_backup(), &common.retention())?;
    facade.close()?;

    info!(
        "copied {}, skipped {}, deleted {}",
        report.copied, report.skipped, report.deleted
    );
    Ok(())
}

fn exit_code(e: &Error) -> ExitCode {
    ExitCode::from(e.exit_code())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let cnf_dirpath = args.cnf_dirpath.clone();

    let config = tracing::subscriber::with_default(early_subscriber(), || {
        BackupConfig::load(&cnf_dirpath, args.into())
            .with_msg(format!("Load config from {:?} failed", cnf_dirpath))
            .inspect_err(|e| error!("{e}"))
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => return exit_code(&e),
    };

    if let Err(e) = std::fs::create_dir_all(config.common().log_dirpath()) {
        eprintln!("Cannot create log directory {:?}: {e}", config.common().log_dirpath());
        return exit_code(&Error::from(e));
    }
    let _guard = init_logging(config.common().log_dirpath(), *config.common().debug());

    info!("START: autobackup");
    let res = run(&config);
    info!("FINISH: autobackup");

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            exit_code(&e)
        }
    }
}
