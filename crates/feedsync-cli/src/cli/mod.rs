pub mod commands;
pub mod config;
pub mod output;
pub mod scope_args;
pub mod tracing_setup;

pub use commands::{run_groups, run_history, run_watch};
pub use config::{default_config_path, resolve_config};
pub use output::{FeedPrinter, Printer, Record};
pub use scope_args::{ArchiveArg, ScopeArgs};
pub use tracing_setup::init_tracing;
