use clap::{Args, Parser, Subcommand};
use presence_core::Role;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "presence",
    version,
    about = "Daily QR attendance tokens: issue, scan and list check-ins",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "PRESENCE_CONFIG",
        default_value = "presence.toml"
    )]
    pub config: PathBuf,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Issue today's token now and at every local midnight until interrupted
    Serve,

    /// Return today's attendance code, issuing it if needed
    Generate {
        #[command(flatten)]
        caller: CallerArgs,

        /// Replace today's secret; earlier codes stop validating
        #[arg(long)]
        force: bool,
    },

    /// Check in with a scanned or pasted attendance code
    Scan {
        /// Envelope text as read from the QR code
        value: String,

        #[command(flatten)]
        caller: CallerArgs,

        /// Mark the check-in as typed or pasted rather than camera-scanned
        #[arg(long)]
        manual: bool,
    },

    /// List recorded check-ins
    List {
        #[command(flatten)]
        caller: CallerArgs,

        /// Single day (YYYY-MM-DD)
        #[arg(long, conflicts_with = "month")]
        date: Option<String>,

        /// Calendar month (YYYY-MM)
        #[arg(long)]
        month: Option<String>,

        /// Restrict to one identity (admins only; employees always see their own)
        #[arg(long)]
        identity: Option<String>,

        /// Maximum rows (default 50, max 500)
        #[arg(long)]
        limit: Option<u32>,

        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

/// Authenticated caller, as vouched for by the surrounding login layer.
#[derive(Args)]
pub struct CallerArgs {
    /// Identity id of the caller
    #[arg(long = "as", value_name = "ID")]
    pub id: String,

    /// Role of the caller
    #[arg(long, default_value = "employee")]
    pub role: Role,
}
