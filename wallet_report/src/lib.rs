use std::io::Write;

use bcli::{CliOutput, RpcCli, RpcCommand};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

// Wallet reported on when none is given
pub const WALLET_NAME: &str = "testwallet";

// Textual, not numeric: "0" or "0.0" still count as non-zero
pub const ZERO_BALANCE: &str = "0.00000000";

// Depends on the client's exact JSON rendering of listunspent
pub const UNCONFIRMED_PATTERN: &str = "confirmations\": 0";
pub const CONTEXT_LINES: usize = 2;

// Shell convention for a command that could not be found or started
const NOT_RUN_STATUS: i32 = 127;

const MEMPOOL_ONLY: RpcCommand = RpcCommand::ListUnspent {
    min_conf: 0,
    max_conf: 0,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub wallet: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            wallet: WALLET_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    /// Exit status of the last client invocation (`getmempoolinfo`).
    pub exit_code: i32,
}

/// Print `text` lines containing `pattern` plus `after` lines of trailing
/// context each, the way `grep -A <after>` does. Groups that are not
/// contiguous are separated by a `--` line.
pub fn grep_after(text: &str, pattern: &str, after: usize) -> String {
    let mut out = String::new();
    let mut last_printed: Option<usize> = None;
    let mut owed = 0;

    for (i, line) in text.split_terminator('\n').enumerate() {
        if line.contains(pattern) {
            if last_printed.is_some_and(|last| i > last + 1) {
                out.push_str("--\n");
            }
            owed = after;
        } else if owed > 0 {
            owed -= 1;
        } else {
            continue;
        }
        out.push_str(line);
        out.push('\n');
        last_printed = Some(i);
    }
    out
}

// Run one sub-command. Failures never reach the report: they are logged and
// whatever stdout was produced (possibly nothing) is used as-is.
fn capture<C: RpcCli>(cli: &C, wallet: Option<&str>, cmd: &RpcCommand) -> CliOutput {
    match cli.call(wallet, cmd) {
        Ok(output) => {
            if !output.success() {
                warn!(
                    "`{}` exited with {:?}: {}",
                    cmd,
                    output.status,
                    output.stderr_lossy()
                );
            }
            output
        }
        Err(err) => {
            warn!("`{}` not run: {}", cmd, err);
            CliOutput {
                stdout: vec![],
                stderr: err.to_string().into_bytes(),
                status: Some(NOT_RUN_STATUS),
            }
        }
    }
}

fn write_unconfirmed_outputs<C: RpcCli, W: Write>(
    cli: &C,
    wallet: &str,
    label: &str,
    out: &mut W,
) -> Result<(), ReportError> {
    writeln!(out, "{}:", label)?;
    let unspent = capture(cli, Some(wallet), &MEMPOOL_ONLY);
    let text = String::from_utf8_lossy(&unspent.stdout);
    out.write_all(grep_after(&text, UNCONFIRMED_PATTERN, CONTEXT_LINES).as_bytes())?;

    if let Ok(Value::Array(utxos)) = serde_json::from_slice::<Value>(&unspent.stdout) {
        let pending = utxos
            .iter()
            .filter(|utxo| utxo["confirmations"].as_u64() == Some(0))
            .count();
        debug!("{} unconfirmed outputs in wallet {}", pending, wallet);
    }
    Ok(())
}

fn log_mempool_summary(raw: &[u8]) {
    match serde_json::from_slice::<Value>(raw) {
        Ok(info) => debug!(
            "mempool size: {}, bytes: {}",
            info["size"], info["bytes"]
        ),
        Err(err) => debug!("getmempoolinfo output is not JSON: {}", err),
    }
}

/// Write the wallet report for `config.wallet` to `out`.
///
/// The client is called in a fixed order: `loadwallet`, `getbalance`,
/// `getunconfirmedbalance`, `listunspent 0 0` twice, then `getmempoolinfo`.
/// Client failures only affect what is printed; the only error returned is a
/// failure writing to `out`.
pub fn generate_report<C: RpcCli, W: Write>(
    cli: &C,
    config: &ReportConfig,
    out: &mut W,
) -> Result<ReportSummary, ReportError> {
    let wallet = config.wallet.as_str();
    writeln!(out, "=== Wallet: {} ===", wallet)?;

    // Already loaded or not, the report goes on
    match cli.call(None, &RpcCommand::LoadWallet(wallet.to_string())) {
        Ok(output) => debug!("loadwallet {} exited with {:?}", wallet, output.status),
        Err(err) => debug!("loadwallet {} not run: {}", wallet, err),
    }

    let balance = capture(cli, Some(wallet), &RpcCommand::GetBalance).stdout_trimmed();
    writeln!(out, "Balance: {} BTC", balance)?;

    let unconfirmed =
        capture(cli, Some(wallet), &RpcCommand::GetUnconfirmedBalance).stdout_trimmed();
    if unconfirmed != ZERO_BALANCE {
        writeln!(out, "Unconfirmed balance: {} BTC", unconfirmed)?;
    }

    write_unconfirmed_outputs(cli, wallet, "Unconfirmed transactions", out)?;
    write_unconfirmed_outputs(cli, wallet, "Mempool transactions", out)?;

    writeln!(out, "=== Mempool Info ===")?;
    let mempool = capture(cli, None, &RpcCommand::GetMempoolInfo);
    out.write_all(&mempool.stdout)?;
    out.flush()?;
    log_mempool_summary(&mempool.stdout);

    Ok(ReportSummary {
        exit_code: mempool.status.unwrap_or(1),
    })
}
