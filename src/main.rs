//! Food Log CLI - log meals with cached AI nutrition estimates
//!
//! Every command prints one JSON document on stdout; logs go to stderr and
//! are controlled with `RUST_LOG`.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use foodlog::app::App;
use foodlog::cli::Cli;
use foodlog::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)?;
    tracing::debug!(
        cache = %config.cache_path.display(),
        ledger = %config.ledger_path.display(),
        "resolved data files"
    );

    let app = App::from_config(&config);
    let output = app.run(cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
