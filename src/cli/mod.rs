//! Command-line interface
//!
//! - init: write a configuration file and a sample schema
//! - check: load schemas and compile every type
//! - validate: JSON instances on stdin, one response line each on stdout
//! - explain: list the compiled rules of a type

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check, explain, init, run, run_command, validate, validate_instance, validate_lines, Config,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_response, ok_response, parse_lines, write_error, write_response, Request};
