use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use feedsync_cli::cli::{
    init_tracing, resolve_config, run_groups, run_history, run_watch, ArchiveArg, ScopeArgs,
};
use feedsync_core::AccountScope;

#[derive(Parser)]
#[command(name = "feedsync")]
#[command(about = "Live message feed console")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pretty: bool,

    /// Path to JSON config file (apiBaseUrl, wsBaseUrl, authToken, ...)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live feed for a scope
    Watch {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Older history pages to load after the first one
        #[arg(long, default_value_t = 0)]
        older: u32,
    },

    /// Print history for a scope, oldest first
    History {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Number of pages to fetch
        #[arg(long, short = 'n', default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,

        /// Message store to read
        #[arg(long, value_enum, default_value_t = ArchiveArg::Live)]
        archive: ArchiveArg,
    },

    /// List chat filter options
    Groups {
        /// Account id, or "all"
        #[arg(long, short = 'a', default_value = "all")]
        account: String,

        /// Message store to read
        #[arg(long, value_enum, default_value_t = ArchiveArg::Live)]
        archive: ArchiveArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch { scope, older } => {
            run_watch(&config, scope.to_scope()?, older, cli.pretty).await
        }
        Commands::History {
            scope,
            pages,
            archive,
        } => run_history(&config, scope.to_scope()?, pages, archive.into(), cli.pretty).await,
        Commands::Groups { account, archive } => {
            run_groups(&config, AccountScope::parse(&account), archive.into(), cli.pretty).await
        }
    }
}
