//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Status-bar shell core for Hyprland
#[derive(Parser, Debug)]
#[command(name = "duskbar", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of the default search path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the bar (default)
    Run,
    /// Send a message to the running bar, e.g. `toggle_popup:wifi-popup` or `workspace:3`
    Msg { message: String },
    /// Print sunrise and sunset for the configured location
    SunTimes {
        /// Day of the year (1-366); today if omitted
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=366))]
        day: Option<u32>,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
