use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drainpipe")]
#[command(about = "Continuous queue listener with asynchronous acknowledgements", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub queue_url: Option<String>,

    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume the queue, acknowledging every message, and serve /health
    Listen {
        /// Replay a JSON fixture file instead of polling SQS
        #[arg(long)]
        fixtures: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}
