//! CLI argument parsing and command handling.

mod args;
pub mod enhance;
pub mod help;
pub mod models;

pub use args::{Cli, Command, ConfigAction, EnhanceArgs, GlobalArgs, ModelsAction, ServeArgs};
