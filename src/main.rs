mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod steps;
mod store;
mod system;
mod ui;
mod units;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Install(args) => commands::install::run(&ctx, args),
        Command::Step(args) => commands::step::run(&ctx, args),
        Command::Status => commands::status::run(&ctx),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        Command::Marker(cmd) => commands::marker::run(&ctx, cmd),
        Command::Stacks(cmd) => commands::stacks::run(&ctx, cmd),
        Command::Deploy(args) => commands::deploy::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "homestead", &mut io::stdout());
            Ok(())
        }
    }
}
