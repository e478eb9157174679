//! CLI command handlers. Each command is in its own file.

mod config;
mod serve;
mod status;

pub use config::run_config;
pub use serve::{apply_overrides, run_serve, ServeOverrides};
pub use status::run_status;
