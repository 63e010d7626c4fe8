use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "thumbfetch")]
#[command(about = "Download gallery thumbnails through a single background worker", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $THUMBFETCH_CONFIG, then config/thumbfetch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search photos (or list recent ones) and download their thumbnails
    Gallery(GalleryArgs),
    /// Download and decode the given image URLs
    Fetch(FetchArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct GalleryArgs {
    /// Search text; recent photos are listed when omitted
    #[arg(long, short)]
    pub query: Option<String>,

    /// Maximum number of rows to download
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Give up on outstanding thumbnails after this many seconds
    #[arg(long, default_value_t = 60)]
    pub wait_secs: u64,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Image URLs, one row each
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Give up on outstanding images after this many seconds
    #[arg(long, default_value_t = 60)]
    pub wait_secs: u64,
}
