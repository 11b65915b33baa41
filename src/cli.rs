// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use imgferry::output::OutputMode;
use imgferry::types::Platform;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgferry")]
#[command(about = "Pull, push, and move container images with live transfer progress")]
#[command(version)]
pub struct Cli {
    /// Config file (default: imgferry.yml in the current directory)
    #[arg(long, global = true, env = "IMGFERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local image store directory
    #[arg(long, global = true, env = "IMGFERRY_STORE")]
    pub store: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Normal)]
    pub output: OutputMode,

    /// Platform to select from multi-platform images (os/arch[/variant])
    #[arg(long, global = true, value_parser = Platform::parse)]
    pub platform: Option<Platform>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new imgferry.yml configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    #[command(flatten)]
    Image(ImageCommand),
}

#[derive(Subcommand)]
pub enum ImageCommand {
    /// Pull an image into the local store
    Pull {
        reference: String,
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Push a local image to its registry
    Push {
        reference: String,
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Give a local image another name
    Tag { source: String, target: String },

    /// Remove a local image name
    #[command(alias = "remove")]
    Rm { reference: String },

    /// List local images
    #[command(alias = "list")]
    Ls,

    /// Export an image as an OCI layout tar
    Save {
        reference: String,
        /// Destination tar file
        #[arg(short = 'o', long = "file")]
        file: PathBuf,
    },

    /// Import images from an OCI layout tar
    Load { path: PathBuf },

    /// Fetch TARGET and publish it as SOURCE, unless SOURCE is already present
    Mirror {
        source: String,
        target: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args, Clone, Default)]
pub struct AuthArgs {
    /// Registry username
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Registry password or token
    #[arg(long, env = "IMGFERRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}
