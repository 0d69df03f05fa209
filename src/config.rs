//! Runtime configuration, materialized from the environment once per binary.
//!
//! Everything here has a sensible default so a local run against MinIO and a
//! local Postgres needs nothing beyond `DATABASE_URL`.

use std::path::PathBuf;
use std::time::Duration;

use crate::util::env as env_util;

/// Fixed URL of the external provider-search surface.
pub const DEFAULT_SEARCH_URL: &str = "https://txhhs.my.site.com/TULIP/s/ltc-provider-search";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Delimited feed of target facility names.
    pub feed_path: PathBuf,
    /// Root of per-facility local image directories.
    pub assets_dir: PathBuf,
    /// Fixed state literal injected into every scraped record; the external
    /// search surface is state-scoped and never renders this column.
    pub state: String,
    /// Pause inserted after every query attempt, success or failure.
    pub inter_query_delay: Duration,
    pub scrape: ScrapeConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub search_url: String,
    /// Upper bound for each visibility wait inside a query.
    pub wait_timeout: Duration,
    /// Explicit Chrome/Chromium binary; autodetected when unset.
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub presign_expiry: Duration,
}

impl IngestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        env_util::init_env();
        Ok(Self {
            feed_path: PathBuf::from(
                env_util::env_opt("ENTITY_FEED").unwrap_or_else(|| "data/properties.csv".into()),
            ),
            assets_dir: PathBuf::from(
                env_util::env_opt("ASSETS_DIR").unwrap_or_else(|| "assets".into()),
            ),
            state: env_util::env_opt("PROVIDER_STATE").unwrap_or_else(|| "TX".into()),
            inter_query_delay: Duration::from_millis(env_util::env_parse(
                "SCRAPE_DELAY_MS",
                1500u64,
            )),
            scrape: ScrapeConfig::from_env(),
            storage: StorageConfig::from_env()?,
        })
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        Self {
            search_url: env_util::env_opt("SEARCH_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.into()),
            wait_timeout: Duration::from_millis(env_util::env_parse(
                "SCRAPE_WAIT_TIMEOUT_MS",
                30_000u64,
            )),
            chrome_executable: env_util::env_opt("CHROME_EXECUTABLE").map(PathBuf::from),
            headless: env_util::env_flag("SCRAPE_HEADLESS", true),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint = env_util::env_opt("MINIO_ENDPOINT")
            .unwrap_or_else(|| "http://localhost:9000".into());
        Ok(Self {
            endpoint,
            region: env_util::env_opt("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
            access_key: env_util::env_opt("MINIO_ACCESS_KEY").unwrap_or_else(|| "root".into()),
            secret_key: env_util::env_req("MINIO_SECRET_KEY")?,
            bucket: env_util::env_opt("MINIO_BUCKET").unwrap_or_else(|| "carehub".into()),
            presign_expiry: Duration::from_secs(env_util::env_parse(
                "PRESIGN_EXPIRY_SECS",
                3600u64,
            )),
        })
    }
}
