//! Command-line surface for `gateway-agent`.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "gateway-agent")]
#[command(about = "VRRP floating-IP gateway agent", long_about = None)]
pub struct Cli {
    /// Path to the agent's YAML config file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CliHealthMode {
    Basic,
    Internet,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the agent's main loop (probe + reconcile) until terminated.
    Run,
    /// Run one health-check round and exit 0 iff healthy, else 1.
    Check {
        #[arg(long, value_enum)]
        mode: Option<CliHealthMode>,
    },
    /// Render the VRRP daemon config to stdout without applying it.
    Render,
    /// Render, atomic-write, and reload the VRRP daemon.
    Apply,
    /// Diagnose the local host's readiness to run the agent.
    Doctor {
        #[arg(long)]
        fix: bool,
        #[arg(long)]
        json: bool,
    },
    /// Report the agent's current reconciled VRRP state.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Invoked by the VRRP daemon's notify hooks.
    Notify {
        #[arg(value_enum)]
        state: NotifyState,
    },
    /// Print the interface this host would be configured to use.
    DetectIface,
    /// Print the agent's version.
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NotifyState {
    Master,
    Backup,
    Fault,
}

impl std::fmt::Display for NotifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyState::Master => write!(f, "MASTER"),
            NotifyState::Backup => write!(f, "BACKUP"),
            NotifyState::Fault => write!(f, "FAULT"),
        }
    }
}
