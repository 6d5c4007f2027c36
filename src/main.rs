use anyhow::Context;
use backmirror::config::Cli;
use backmirror::logging::init_tracing;
use backmirror::Config;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Convert CLI args to Config - this validates immediately
    let config = Config::try_from(&cli).context("invalid configuration")?;

    let outcome = backmirror::commands::mirror::run(config, &cli.pairs(), cli.json)?;
    if !outcome.success {
        std::process::exit(1);
    }

    Ok(())
}
