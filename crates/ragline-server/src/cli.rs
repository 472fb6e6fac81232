use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "Retrieval-augmented answers over a document corpus", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to the user config dir)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Bind address (overrides config)")]
        host: Option<String>,

        #[arg(long, help = "Bind port (overrides config)")]
        port: Option<u16>,
    },

    #[command(about = "Answer one question and print the result")]
    Query {
        #[arg(help = "The question to answer")]
        query: String,

        #[arg(short = 'k', long, help = "Number of chunks to use")]
        max_chunks: Option<usize>,
    },

    #[command(about = "Show the effective configuration")]
    Config,
}
