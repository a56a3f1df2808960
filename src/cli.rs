use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Command-line surface for the converge binary.
#[derive(Parser, Debug)]
#[command(
    name = "converge",
    about = "Cross-platform declarative configuration manager",
    version
)]
#[command(group = ArgGroup::new("mode").required(true).args(["plan", "apply"]))]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Show what would be changed without applying
    #[arg(long)]
    pub plan: bool,

    /// Apply the configuration
    #[arg(long)]
    pub apply: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_plan() {
        let cli = Cli::parse_from(["converge", "--config", "site.cfg", "--plan"]);
        assert_eq!(cli.config, PathBuf::from("site.cfg"));
        assert!(cli.plan);
        assert!(!cli.apply);
    }

    #[test]
    fn parse_apply_verbose() {
        let cli = Cli::parse_from(["converge", "-c", "site.cfg", "--apply", "-v"]);
        assert!(cli.apply);
        assert!(cli.verbose);
    }

    #[test]
    fn plan_and_apply_are_mutually_exclusive() {
        let result = Cli::try_parse_from(["converge", "-c", "site.cfg", "--plan", "--apply"]);
        assert!(result.is_err(), "--plan and --apply together should fail");
    }

    #[test]
    fn one_mode_is_required() {
        let result = Cli::try_parse_from(["converge", "-c", "site.cfg"]);
        assert!(result.is_err(), "either --plan or --apply must be given");
    }

    #[test]
    fn config_is_required() {
        let result = Cli::try_parse_from(["converge", "--plan"]);
        assert!(result.is_err(), "--config is required");
    }
}
