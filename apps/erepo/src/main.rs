//! # erepo
//!
//! Create, populate and tear down entity-resolution repositories.
//!
//! ## Usage
//!
//! ```bash
//! erepo create ./repo
//! erepo add-sources ./repo CUSTOMERS WATCHLIST
//! erepo load ./repo customers.jsonl
//! erepo --json-mode entity ./repo CUSTOMERS 1001
//! erepo destroy ./repo
//! ```

use clap::Parser;
use erepo::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // EREPO_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("EREPO_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "erepo=info,erepo_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        eprintln!("erepo v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
