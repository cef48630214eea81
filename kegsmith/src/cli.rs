// kegsmith/src/cli.rs
//! Command-line argument structure.
use clap::{ArgAction, Parser, Subcommand};
use kegsmith_common::error::Result;
use kegsmith_common::Config;

pub mod caveats;
pub mod info;
pub mod install;
pub mod list;
pub mod status;
pub mod test;

use crate::cli::caveats::Caveats;
use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::test::TestArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "kegsmith", bin_name = "kegsmith")]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a formula from a .json or .toml file
    Install(InstallArgs),
    /// Run an installed formula's self-test
    Test(TestArgs),
    /// Show the caveats of an installed formula
    Caveats(Caveats),
    /// List installed formulas
    List(List),
    /// Show what a formula file would install
    Info(Info),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Test(command) => command.run(config).await,
            Self::Caveats(command) => command.run(config),
            Self::List(command) => command.run(config),
            Self::Info(command) => command.run(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_with_verbosity() {
        let args =
            CliArgs::try_parse_from(["kegsmith", "-vv", "install", "founder-os.toml"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Install(_)));
    }

    #[test]
    fn test_requires_a_name() {
        assert!(CliArgs::try_parse_from(["kegsmith", "test"]).is_err());
        let args = CliArgs::try_parse_from(["kegsmith", "test", "founder-os"]).unwrap();
        assert!(matches!(args.command, Command::Test(_)));
    }
}
