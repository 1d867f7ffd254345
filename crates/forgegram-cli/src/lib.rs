//! Process wiring for the `forgegram` binary.

mod bootstrap;
mod cli_args;
mod startup;

pub use bootstrap::init_tracing;
pub use cli_args::Cli;
pub use startup::{build_bridge_context, run_bridge, run_cleanup_loop};
