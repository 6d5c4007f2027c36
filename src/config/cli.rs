//! Command-line arguments

use super::Config;
use crate::types::{CompareMode, MirrorError};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Mirror directory trees into backup locations
#[derive(Parser, Debug, Clone)]
#[command(name = "backmirror", version, about)]
pub struct Cli {
    /// Source and destination directory; repeat for more pairs
    #[arg(
        long = "pair",
        num_args = 2,
        value_names = ["SOURCE", "DESTINATION"],
        action = ArgAction::Append,
        required = true
    )]
    pub pair: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Comparison policy
    #[arg(long, value_enum)]
    pub mode: Option<CompareMode>,

    /// Do not copy hidden files and directories
    #[arg(long)]
    pub skip_hidden: bool,

    /// Worker pool size (0 = number of CPUs)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Write a per-run log file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print the final statistics as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase diagnostic output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The `--pair` values grouped as (source, destination)
    pub fn pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.pair
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

impl TryFrom<&Cli> for Config {
    type Error = MirrorError;

    /// Flags override values from `--config`, which override defaults
    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let mut config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(mode) = cli.mode {
            config.compare_mode = mode;
        }
        if cli.skip_hidden {
            config.copy_hidden = false;
        }
        if let Some(workers) = cli.workers {
            config.workers = workers;
        }
        if let Some(log_file) = &cli.log_file {
            config.log_file = Some(log_file.clone());
        }

        config.validate()?;
        Ok(config)
    }
}
