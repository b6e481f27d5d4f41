mod collectors;
mod commands;
mod config;
mod constants;
mod dnsmessage;
mod error;
mod framestream;
mod loggers;
mod processors;
mod proto;
mod tls;
mod transformers;
mod worker;

#[cfg(test)]
mod pipeline_tests;

use clap::{Parser, Subcommand};

use commands::{run::Run, version::Version};

#[derive(Parser, Debug)]
#[command(name = "dnscollector", about = "A DNS telemetry pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the collector pipeline against a YAML config file.
    Run(Run),
    /// Print build/version information as JSON.
    Version(Version),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(run) => run.exec().await,
        Command::Version(version) => {
            version.exec();
            Ok(())
        }
    }
}
