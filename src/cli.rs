use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Settings file path (defaults to ./ffencode.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode one input into one or more outputs
    Encode {
        /// Input file, URL or `pipe:0`
        #[arg(short, long)]
        input: String,

        /// Output file; repeat for several jobs
        #[arg(short, long = "output", required = true)]
        outputs: Vec<String>,

        /// Output width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Output height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Video bitrate, plain numbers are kbit/s
        #[arg(long)]
        video_bitrate: Option<String>,

        /// Audio bitrate, plain numbers are kbit/s
        #[arg(long)]
        audio_bitrate: Option<String>,

        /// Video codec, e.g. libx264
        #[arg(long)]
        video_codec: Option<String>,

        /// Audio codec, e.g. aac
        #[arg(long)]
        audio_codec: Option<String>,

        /// Container format
        #[arg(short, long)]
        format: Option<String>,

        /// Overwrite existing outputs
        #[arg(short = 'y', long)]
        overwrite: bool,

        /// Extra ffmpeg arguments placed before each output
        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Encode every matching file of a directory
    Batch {
        /// Directory searched recursively for inputs
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Directory receiving the outputs
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Extension of the produced files
        #[arg(short, long, default_value = "mp4")]
        extension: String,

        /// Overwrite existing outputs
        #[arg(short = 'y', long)]
        overwrite: bool,
    },

    /// Print media metadata as JSON
    Probe {
        /// Input file or URL
        input: String,
    },

    /// List what the installed ffmpeg supports
    Capabilities {
        #[arg(value_enum)]
        kind: CapabilityKind,
    },

    /// Write a settings file with default values
    InitConfig {
        /// Destination path
        #[arg(default_value = "ffencode.toml")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CapabilityKind {
    Formats,
    Filters,
    Codecs,
    Encoders,
}
