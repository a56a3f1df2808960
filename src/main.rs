use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod dsl;
mod engine;
mod error;
mod exec;
mod logging;
mod platform;
mod providers;

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose);

    if args.plan {
        commands::plan::run(&args.config, args.verbose)
    } else {
        commands::apply::run(&args.config, args.verbose)
    }
}
