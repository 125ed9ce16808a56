//! Service entry point.
//!
//! ```text
//! config ─▶ logging ─▶ database pool ─▶ router ─▶ server
//!                                                   │
//!                      SIGINT / SIGTERM ────────────┘ drain, close pool, exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "shared-infra", version, about = "Backend service runtime")]
struct Args {
    /// TOML configuration file (overrides APP_CONFIG_FILE).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match shared_infra::lifecycle::run(args.config.as_deref(), Router::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
