mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use depot_engine::{ContentClient, DiskStore, EngineConfig, Notification, ResourceQuery};

use crate::cli::{Cli, CleanArgs, Commands, FetchArgs};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn engine_config(cache_root: Option<PathBuf>) -> EngineConfig {
    let mut builder = EngineConfig::builder();
    if let Some(cache_root) = cache_root {
        builder = builder.with_cache_root(cache_root);
    }
    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Fetch(args) => fetch(engine_config(cli.cache_root), args).await,
        Commands::Clean(args) => clean(engine_config(cli.cache_root), args).await,
    }
}

async fn fetch(config: EngineConfig, args: FetchArgs) -> Result<()> {
    let mut client = ContentClient::start(config).context("failed to start engine")?;

    for server in &args.servers {
        client.add_server(server.clone()).await?;
    }

    client.open_cache(&args.cache).await?;
    loop {
        match client.recv().await {
            Some(Notification::CacheReady { name }) => {
                info!(cache = %name, "Cache store ready");
                break;
            }
            Some(Notification::Error { error, .. }) => bail!("cache open failed: {error}"),
            Some(_) => {}
            None => bail!("engine stopped unexpectedly"),
        }
    }

    for (index, resource) in args.resources.iter().enumerate() {
        let mut query = ResourceQuery::new(index as u64 + 1, &args.cache, resource)
            .with_return_cached(!args.no_cache);
        if let Some(prefer) = &args.prefer {
            query = query.with_preferred_server(prefer.clone());
        }
        client.get_resource(query).await?;
    }

    let mut remaining = args.resources.len();
    let mut failed = 0usize;
    while remaining > 0 {
        match client.recv().await {
            Some(Notification::Progress {
                request_id,
                progress,
            }) => {
                info!(request_id, progress, "Downloading");
            }
            Some(Notification::ResourceData(payload)) => {
                info!(
                    request_id = payload.request_id,
                    resource = %payload.resource_name,
                    url = %payload.resource_url,
                    size = payload.resource_data.len(),
                    "Fetched"
                );
                if let Some(output) = &args.output {
                    write_payload(output, &payload.resource_name, &payload.resource_data).await?;
                }
                remaining -= 1;
            }
            Some(Notification::Error { error, request_id }) => {
                error!(request_id = ?request_id, error = %error, "Fetch failed");
                failed += 1;
                remaining -= 1;
            }
            Some(Notification::CacheReady { .. }) => {}
            None => bail!("engine stopped unexpectedly"),
        }
    }

    client.shutdown().await;

    if failed > 0 {
        bail!("{failed} of {} fetches failed", args.resources.len());
    }
    Ok(())
}

async fn write_payload(output: &PathBuf, resource_name: &str, data: &[u8]) -> Result<()> {
    // Resource names may carry path segments; only the final one becomes the
    // local filename
    let filename = resource_name.rsplit('/').next().unwrap_or(resource_name);
    tokio::fs::create_dir_all(output).await?;
    let path = output.join(filename);
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote payload");
    Ok(())
}

async fn clean(config: EngineConfig, args: CleanArgs) -> Result<()> {
    DiskStore::destroy(&config.cache_root, &args.cache)
        .await
        .with_context(|| format!("failed to destroy cache store {:?}", args.cache))?;
    info!(cache = %args.cache, "Cache store destroyed");
    Ok(())
}
