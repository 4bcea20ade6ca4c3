use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "avcmux")]
#[command(author, version, about = "Repackage raw H.264 Annex-B streams into MP4")]
pub struct Cli {
    /// Path to config file
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
    /// Convert an Annex-B stream into an MP4 file
    Convert {
        /// Source H.264 Annex-B stream
        #[arg(required = true)]
        input: PathBuf,

        /// Destination MP4 file
        #[arg(required = true)]
        output: PathBuf,

        /// Frame width in pixels (default from config)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height in pixels (default from config)
        #[arg(long)]
        height: Option<u32>,

        /// Frames per second (default from config)
        #[arg(long)]
        fps: Option<u32>,

        /// Creation time written into the movie headers (RFC 3339, default now)
        #[arg(long)]
        creation_time: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan an Annex-B stream and display its NAL unit index
    Scan {
        /// Stream to scan
        #[arg(required = true)]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read back an MP4 file and check its sample tables
    Verify {
        /// File to verify
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
