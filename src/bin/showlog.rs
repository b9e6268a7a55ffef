use autobackup::backup::log_follower::{check_encoding, LogFollower};
use autobackup::backup::logging::early_subscriber;
use autobackup::backup::result_error::error::Error;
use autobackup::backup::result_error::result::Result;

use clap::Parser;
use tracing::error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Print a log file and keep printing lines appended to it
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the file to open
    file: PathBuf,
    /// Seconds to wait before checking for new lines
    #[arg(long, default_value_t = 15.0)]
    interval: f64,
    /// Encoding of the file
    #[arg(long, default_value = "utf-8")]
    encoding: String,
}

fn follow(args: &Args) -> Result<()> {
    check_encoding(&args.encoding)?;
    let interval = Duration::try_from_secs_f64(args.interval)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| Error::config(format!("interval must be positive, got {}", args.interval)))?;

    let mut follower = LogFollower::open(&args.file)?;
    loop {
        let lines = follower.read_new_lines()?;
        if lines.is_empty() {
            std::thread::sleep(interval);
            continue;
        }
        for line in lines {
            println!("{line}");
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing::subscriber::with_default(early_subscriber(), || match follow(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    })
}
