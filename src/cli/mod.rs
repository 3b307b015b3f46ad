//! Command-line interface: parsing, execution, output formatting.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::{OutputFormat, format_error, format_value};
pub use parser::{Cli, Commands, FilterArgs, LinkCommands, WorkflowCommands};
