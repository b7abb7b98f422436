//! `presence` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments, load configuration and start logging.
//! - Dispatch to issuance, scan, listing and the midnight scheduler.
//!
//! # Invariants
//! - Exit code is 0 on success, including an already-recorded check-in, and
//!   1 on any failure.

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::Cli;
use commands::Runtime;
use error::Result;
use serde_json::json;

fn main() {
    let cli = Cli::parse();
    let json_output = cli.json;

    if let Err(err) = run(cli) {
        if json_output {
            let output = json!({
                "success": false,
                "code": err.code(),
                "error": err.to_string(),
            });
            println!("{output}");
        } else {
            eprintln!("Error: {err}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = Runtime::load(&cli.config)?;
    commands::handle_command(&runtime, cli.command, cli.json)
}
