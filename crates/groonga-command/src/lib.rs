//! Groonga commands for groonga-delta.
//!
//! - [`Command`] - a named command with named arguments
//! - [`parse_command_line`] - parse one command in command-line or URI form
//! - [`Parser`] - incremental parser for command logs, splitting `load`
//!   payloads into individual values so that large loads never have to be
//!   held in memory at once

mod command;
mod parser;
mod stream;

pub use command::Command;
pub use parser::{parse_command_line, ParseError};
pub use stream::{ParseEvent, Parser};
