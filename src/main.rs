use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use carehub_ingest::batch::BatchIngestor;
use carehub_ingest::config::IngestConfig;
use carehub_ingest::db::Db;
use carehub_ingest::storage::ObjectStore;
use carehub_ingest::util::env as env_util;

#[derive(Parser)]
#[command(name = "carehub", about = "Care-facility registry ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion batch over the entity feed and print the summary as JSON.
    Run {
        /// Override the entity feed path from the environment.
        #[arg(long)]
        feed: Option<std::path::PathBuf>,
        /// Ingest at most this many names from the feed.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Resolve presigned image URLs for one facility.
    Images { name: String },
    /// Create the database schema and the object-storage bucket if absent.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    carehub_ingest::logging::init_tracing("info,sqlx=warn,chromiumoxide=warn")?;

    let cli = Cli::parse();
    env_util::preflight_check(
        "carehub",
        &["MINIO_SECRET_KEY"],
        &[
            "DATABASE_URL",
            "ENTITY_FEED",
            "ASSETS_DIR",
            "MINIO_ENDPOINT",
            "MINIO_BUCKET",
            "PROVIDER_STATE",
        ],
    )?;

    let mut cfg = IngestConfig::from_env()?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 5u32);

    match cli.command {
        Command::Run { feed, limit } => {
            if let Some(feed) = feed {
                cfg.feed_path = feed;
            }
            let db = Db::connect(&env_util::db_url()?, max_conns)
                .await
                .context("connecting to database")?;
            if env_util::env_flag("AUTO_MIGRATE", false) {
                db.ensure_schema().await?;
            }
            let store = ObjectStore::connect(&cfg.storage).await?;
            store.ensure_bucket().await?;

            let result = BatchIngestor::new(cfg).run(&db, &store, limit).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Images { name } => {
            let store = ObjectStore::connect(&cfg.storage).await?;
            let main_image = store.main_image(&name).await?;
            let urls = store.list_entity_images(&name).await?;
            info!(entity = %name, count = urls.len(), "resolved images");
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "entity": name,
                    "main_image": main_image,
                    "images": urls,
                }))?
            );
        }
        Command::Migrate => {
            let db = Db::connect(&env_util::db_url()?, max_conns)
                .await
                .context("connecting to database")?;
            db.ensure_schema().await?;
            let store = ObjectStore::connect(&cfg.storage).await?;
            store.ensure_bucket().await?;
            info!("schema and bucket ensured");
        }
    }
    Ok(())
}
