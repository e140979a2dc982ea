use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "depot",
    version,
    about = "Fetch versioned content resources with transparent local caching"
)]
pub struct Cli {
    /// Root directory for cache stores (defaults to the system temp dir)
    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch resources through the engine, caching them locally
    Fetch(FetchArgs),
    /// Destroy a named cache store
    Clean(CleanArgs),
}

#[derive(Args)]
pub struct FetchArgs {
    /// Origin base URL; repeat to register multiple origins
    #[arg(short = 's', long = "server", required = true)]
    pub servers: Vec<String>,

    /// Name of the cache store to use
    #[arg(long, default_value = "default")]
    pub cache: String,

    /// Prefer this origin over load-based selection
    #[arg(long)]
    pub prefer: Option<String>,

    /// Skip the cache lookup and always download
    #[arg(long)]
    pub no_cache: bool,

    /// Directory to write fetched payloads into
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Resource names to fetch
    #[arg(required = true)]
    pub resources: Vec<String>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Name of the cache store to destroy
    pub cache: String,
}
