//! CLI argument definitions using clap
//!
//! Commands:
//! - protoguard init --config <path>
//! - protoguard check --config <path>
//! - protoguard validate --config <path> --type <message>
//! - protoguard explain --config <path> --type <message>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// protoguard - declarative validation for structured messages
#[derive(Parser, Debug)]
#[command(name = "protoguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a configuration file and a schema directory with a sample schema
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./protoguard.json")]
        config: PathBuf,
    },

    /// Load every schema and compile all rules
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./protoguard.json")]
        config: PathBuf,
    },

    /// Validate JSON instances read from stdin, one per line
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./protoguard.json")]
        config: PathBuf,

        /// Fully qualified message type of every instance
        #[arg(long = "type")]
        type_name: String,
    },

    /// Print the compiled rules of a message type
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./protoguard.json")]
        config: PathBuf,

        /// Fully qualified message type
        #[arg(long = "type")]
        type_name: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from(["protoguard", "validate", "--type", "shop.Order"]).unwrap();
        match cli.command {
            Command::Validate { config, type_name } => {
                assert_eq!(config, PathBuf::from("./protoguard.json"));
                assert_eq!(type_name, "shop.Order");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_type_is_required() {
        assert!(Cli::try_parse_from(["protoguard", "explain"]).is_err());
    }
}
