use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xrates::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Ignore the cached archive and download it again
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for xrates::AppCommand {
    fn from(cmd: Commands) -> xrates::AppCommand {
        match cmd {
            Commands::Rates {
                base,
                targets,
                date,
                max_gap_days,
            } => xrates::AppCommand::Rates {
                base,
                targets,
                date,
                max_gap_days,
            },
            Commands::Currencies { date } => xrates::AppCommand::Currencies { date },
            Commands::Refresh => xrates::AppCommand::Refresh,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show exchange rates relative to a base currency
    Rates {
        /// Base currency, defaults to the configured base
        base: Option<String>,
        /// Currencies to quote, all when omitted
        targets: Vec<String>,
        /// Date as YYYY-MM-DD, defaults to today
        #[arg(short, long)]
        date: Option<String>,
        /// Fail if the closest published rates are older than this many days
        #[arg(long)]
        max_gap_days: Option<u32>,
    },
    /// List the currencies quoted on a date
    Currencies {
        /// Date as YYYY-MM-DD, defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Download the archive again, replacing the cached copy
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => xrates::cli::setup::setup(),
        Some(cmd) => {
            xrates::run_command(cmd.into(), cli.config_path.as_deref(), cli.no_cache).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
