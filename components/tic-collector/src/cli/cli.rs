use crate::helpers::load_config::Config;
use crate::instrumentation::tracing::{init_panic_handler, init_tracing};
use crate::runtime;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tic-collector",
    long_about = "Reads Linky TIC frames from a serial port, appends them to a local CSV log and forwards them to InfluxDB.",
    about = "Linky TIC telemetry collector",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        tic-collector run --config /etc/tic_collector.toml
        tic-collector validate --config ./tic_collector.toml"
)]
pub struct Cli {
    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the collector until interrupted
    Run {
        #[arg(short, long, default_value = "/etc/tic_collector.toml")]
        config: PathBuf,
    },

    /// Validate the configuration file without opening any device
    Validate {
        #[arg(short, long, default_value = "/etc/tic_collector.toml")]
        config: PathBuf,
    },

    /// Display version information
    Version,
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Held until exit so the file writer flushes its buffer.
    let _log_guard = init_tracing(cli.log_dir.as_deref())?;
    init_panic_handler();

    match cli.command {
        Commands::Run { config } => runtime::runtime::run_collector(config).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {}", config.display());
    let mut cfg = Config::load(&config)?;
    if cfg.remote.token.is_some() {
        cfg.remote.token = Some("<redacted>".into());
    }
    println!("Configuration valid:\n{cfg:#?}");
    Ok(())
}

fn show_version() {
    println!("TIC Collector {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_config_and_global_log_dir() {
        let cli = Cli::try_parse_from([
            "tic-collector",
            "run",
            "--config",
            "./tic.toml",
            "--log-dir",
            "/tmp/tic",
        ])
        .unwrap();
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/tic")));
        assert!(matches!(cli.command, Commands::Run { config } if config == PathBuf::from("./tic.toml")));
    }
}
