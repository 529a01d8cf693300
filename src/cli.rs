use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imagestore")]
#[command(author, version, about = "Image storage service")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the RPC and HTTP servers
    Serve {
        /// Address to bind both listeners to
        #[arg(long)]
        bind: Option<String>,

        /// Public base URL used to build image URLs
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// List blobs on disk that have no metadata record
    ///
    /// Creates in flight on a running server are listed too; do not delete
    /// blobs reported while the server is accepting writes.
    Orphans,

    /// Display version information
    Version,
}
