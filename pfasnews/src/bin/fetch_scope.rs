use anyhow::{bail, Context, Result};
use clap::Parser;
use common::{Config, DEFAULT_CONFIG_PATH};
use std::path::{Path, PathBuf};

use pfasnews::news::NewsService;

/// Aggregate one scope once and print the resulting JSON array.
#[derive(Parser, Debug)]
#[command(name = "fetch_scope")]
struct Args {
    /// Scope to aggregate (defaults to "global")
    scope: Option<String>,

    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let override_path = match args.config {
        Some(p) if !p.exists() => bail!("Config file not found: {}", p.display()),
        Some(p) => p,
        None => PathBuf::from("config.toml"),
    };
    let config = Config::load_with_defaults(Some(default_path), Some(&override_path)).await?;
    let service = NewsService::from_config(&config)?;

    let items = service
        .news(args.scope.as_deref())
        .await
        .context("aggregation failed")?;

    let json = serde_json::to_string_pretty(items.as_ref()).context("failed to serialize items")?;
    println!("{}", json);
    eprintln!("{} items", items.len());
    Ok(())
}
