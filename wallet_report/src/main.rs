use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bcli::{BitcoinCli, CliConfig, Network, DEFAULT_CLI};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use wallet_report::{generate_report, ReportConfig, WALLET_NAME};

/// Print balance, unconfirmed outputs and mempool info for one wallet
#[derive(Parser, Debug)]
#[command(name = "wallet-report", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Wallet to report on
    #[arg(short, long, env = "WALLET_REPORT_WALLET", default_value = WALLET_NAME)]
    wallet: String,

    /// Path to the node's command-line client
    #[arg(long, value_name = "PATH", env = "WALLET_REPORT_CLI", default_value = DEFAULT_CLI)]
    cli: String,

    /// Chain flag passed to the client
    #[arg(long, value_enum, env = "WALLET_REPORT_NETWORK", default_value_t = Network::Testnet4)]
    network: Network,

    /// Extra argument passed to the client before every command (repeatable)
    #[arg(long = "cli-arg", value_name = "ARG", allow_hyphen_values = true)]
    cli_args: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn cli_config(&self) -> CliConfig {
        CliConfig {
            program: self.cli.clone(),
            network: self.network,
            extra_args: self.cli_args.clone(),
        }
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the report only
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose, args.debug);

    let cli = BitcoinCli::new(args.cli_config());
    info!(
        "Reporting on wallet {} via {} ({:?})",
        args.wallet,
        cli.config().program,
        args.network
    );

    let config = ReportConfig {
        wallet: args.wallet.clone(),
    };
    let mut stdout = std::io::stdout().lock();
    let summary =
        generate_report(&cli, &config, &mut stdout).context("Failed to write wallet report")?;
    stdout.flush().context("Failed to flush stdout")?;

    Ok(ExitCode::from(u8::try_from(summary.exit_code).unwrap_or(1)))
}
