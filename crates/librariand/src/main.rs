//! librariand — the Librarian daemon.
//!
//! `serve` runs the replication engine: the control loop, the worker pool,
//! every configured clone job and the standing-order check-in. The other
//! subcommands work on the state database directly and are meant for use
//! while the daemon is stopped.
//!
//! # Usage
//!
//! ```text
//! librariand init --data-dir /var/lib/librarian
//! librariand serve --config /etc/librarian.toml
//! librariand search --type names '{"name-matches": "zen.%.uv"}'
//! librariand orders create nightly --conn offsite --search-file nightly.json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod admin;
mod serve;

use admin::{OrderAction, OutputFormat, SearchType};

#[derive(Parser, Debug)]
#[command(name = "librariand", about = "Librarian daemon", version)]
struct Cli {
    /// Path to librarian.toml (default: $LIBRARIAN_CONFIG_PATH, then ./librarian.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter configuration.
    Init {
        /// Data directory recorded in the new configuration.
        #[arg(long, default_value = "/var/lib/librarian")]
        data_dir: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Run clone jobs and standing orders until interrupted.
    Serve,
    /// Run a search against the catalog.
    Search {
        /// What to return.
        #[arg(long = "type", value_enum, default_value_t = SearchType::Files)]
        kind: SearchType,

        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,

        /// Search text, or `-` to read it from stdin.
        search: String,
    },
    /// Manage standing orders.
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,librarian=debug,librariand=debug")
                }),
        )
        .init();

    let cli = Cli::parse();
    let config_path = librarian_core::LibrarianConfig::resolve_path(cli.config);

    match cli.command {
        Command::Init { data_dir, force } => admin::init(&config_path, &data_dir, force),
        Command::Serve => serve::run(&config_path).await,
        Command::Search {
            kind,
            format,
            search,
        } => {
            let state = admin::open_state(&config_path)?;
            let text = admin::read_search_arg(&search)?;
            print!("{}", admin::search(&state, &text, kind, format)?);
            Ok(())
        }
        Command::Orders { action } => {
            let state = admin::open_state(&config_path)?;
            print!("{}", admin::orders(&state, action)?);
            Ok(())
        }
    }
}
