use anyhow::anyhow;
use clap::Parser;
use common::config::Config;
use ordering::pg::PgStore;
use ordering::reconciler::Reconciler;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config/takeout.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config =
        Config::load(&args.config).map_err(|e| anyhow!("failed to load config: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!(project = %config.common.project_name, "starting reconciler");

    let store = Arc::new(PgStore::new(&config.common.database_url).await?);
    store.initialize_schema().await?;

    let reconciler = Reconciler::new(store, config.reconciler);
    reconciler.run().await;

    Ok(())
}
