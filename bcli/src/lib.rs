use std::fmt;
use std::process::{Command, Stdio};

use clap::ValueEnum;
use thiserror::Error;
use tracing::debug;

// Default client binary, resolved through PATH
pub const DEFAULT_CLI: &str = "bitcoin-cli";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Chain selected on the client command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Network {
    Mainnet,
    Testnet,
    #[default]
    Testnet4,
    Signet,
    Regtest,
}

impl Network {
    // Mainnet is the client default and takes no flag
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => None,
            Network::Testnet => Some("-testnet"),
            Network::Testnet4 => Some("-testnet4"),
            Network::Signet => Some("-signet"),
            Network::Regtest => Some("-regtest"),
        }
    }
}

/// The RPC sub-commands the wallet report issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCommand {
    LoadWallet(String),
    GetBalance,
    GetUnconfirmedBalance,
    ListUnspent { min_conf: u32, max_conf: u32 },
    GetMempoolInfo,
}

impl RpcCommand {
    pub fn args(&self) -> Vec<String> {
        match self {
            RpcCommand::LoadWallet(name) => vec!["loadwallet".to_string(), name.clone()],
            RpcCommand::GetBalance => vec!["getbalance".to_string()],
            RpcCommand::GetUnconfirmedBalance => vec!["getunconfirmedbalance".to_string()],
            RpcCommand::ListUnspent { min_conf, max_conf } => vec![
                "listunspent".to_string(),
                min_conf.to_string(),
                max_conf.to_string(),
            ],
            RpcCommand::GetMempoolInfo => vec!["getmempoolinfo".to_string()],
        }
    }
}

impl fmt::Display for RpcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

/// How to reach the node's command-line client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub program: String,
    pub network: Network,
    /// Passed before the sub-command on every call, e.g. `-datadir=/srv/node`.
    pub extra_args: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_CLI.to_string(),
            network: Network::default(),
            extra_args: Vec::new(),
        }
    }
}

impl CliConfig {
    // network flag, extra args, wallet selector, then the sub-command itself
    pub fn command_args(&self, wallet: Option<&str>, cmd: &RpcCommand) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(flag) = self.network.flag() {
            args.push(flag.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        if let Some(wallet) = wallet {
            args.push(format!("-rpcwallet={}", wallet));
        }
        args.extend(cmd.args());
        args
    }
}

/// A finished client invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    // Same text a shell `$(...)` substitution would yield: trailing newlines dropped
    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout)
            .trim_end_matches(['\n', '\r'])
            .to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim_end().to_string()
    }
}

/// Anything that can answer an RPC sub-command the way `bitcoin-cli` does.
pub trait RpcCli {
    fn call(&self, wallet: Option<&str>, cmd: &RpcCommand) -> Result<CliOutput, CliError>;
}

/// Runs the real client binary as a child process.
#[derive(Debug, Clone, Default)]
pub struct BitcoinCli {
    config: CliConfig,
}

impl BitcoinCli {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }
}

impl RpcCli for BitcoinCli {
    fn call(&self, wallet: Option<&str>, cmd: &RpcCommand) -> Result<CliOutput, CliError> {
        let args = self.config.command_args(wallet, cmd);
        debug!("Executing: {} {}", self.config.program, args.join(" "));

        let result = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CliError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        debug!("{} exited with {:?}", cmd, result.status.code());
        Ok(CliOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            status: result.status.code(),
        })
    }
}
