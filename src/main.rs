use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use misp_alert::config::DEFAULT_CONFIG_PATH;
use misp_alert::error::RunError;
use misp_alert::runner::{self, Payload};
use std::io::Read;
use std::path::PathBuf;

/// Exit status for an unsupported invocation
const EXIT_BAD_INVOCATION: i32 = 1;

/// Command-line arguments for the MISP alert action
#[derive(Parser)]
#[command(
    name = "misp_alert",
    about = "Create MISP events from the results of a fired alert",
    long_about = "Reads the alert payload from stdin, groups the alert's result rows into \
                  MISP events by event key and starts one submission process per event."
)]
struct Cli {
    /// Run the alert action (the only supported mode)
    #[arg(long)]
    execute: bool,

    /// Path to the installation-wide configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Configuration file path (TOML format)"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable debug logging output")]
    verbose: bool,
}

/// Read the whole payload the host writes to stdin
fn read_payload() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read payload from stdin")?;
    Ok(input)
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn unsupported_mode() -> ! {
    error!("FATAL Unsupported execution mode (expected --execute flag)");
    std::process::exit(EXIT_BAD_INVOCATION);
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            init_logging(false);
            error!("{}", e);
            unsupported_mode();
        }
    };

    init_logging(cli.verbose);

    if !cli.execute {
        unsupported_mode();
    }

    let payload = read_payload()
        .map_err(|e| RunError::InvalidPayload(format!("{:#}", e)))
        .and_then(|input| Payload::from_json(&input));

    let result = payload.and_then(|payload| runner::execute(&payload, &cli.config));

    match result {
        Ok(summary) if summary.report.all_dispatched() => {
            info!(
                "Created {} events from {} rows ({} rows skipped)",
                summary.report.dispatched.len(),
                summary.rows_added,
                summary.rows_skipped
            );
        }
        Ok(summary) => {
            warn!(
                "Created {} events from {} rows, {} failed to dispatch ({} rows skipped)",
                summary.report.dispatched.len(),
                summary.rows_added,
                summary.report.failed.len(),
                summary.rows_skipped
            );
        }
        Err(e) => {
            error!("FATAL {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
