//! Postgres access: pool construction and the facility upsert.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::PersistenceError;
use crate::scrape::ScrapedRecord;
use crate::util::env as env_util;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // PgBouncer-style poolers choke on server-side prepared statements;
        // opt back in with USE_PREPARED=1 when talking to Postgres directly.
        if !env_util::env_flag("USE_PREPARED", false) {
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Create the facilities table if absent. Gated behind AUTO_MIGRATE (or
    /// the explicit `migrate` subcommand) so routine batch runs never push
    /// DDL at a shared database.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS properties (
                id          BIGSERIAL PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                address     TEXT,
                city        TEXT,
                county      TEXT,
                zipcode     TEXT,
                state       TEXT,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;
        info!("schema ensured (properties)");
        Ok(())
    }

    /// Insert-or-update keyed by facility name. A second ingestion of the
    /// same name overwrites the scraped columns in place and bumps
    /// `updated_at`; it never creates a duplicate row.
    #[instrument(skip(self, record), fields(entity = %name))]
    pub async fn upsert_property(
        &self,
        name: &str,
        record: &ScrapedRecord,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO properties (name, address, city, county, zipcode, state)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (name) DO UPDATE SET
                address    = EXCLUDED.address,
                city       = EXCLUDED.city,
                county     = EXCLUDED.county,
                zipcode    = EXCLUDED.zipcode,
                state      = EXCLUDED.state,
                updated_at = now()",
        )
        .bind(name)
        .bind(&record.address)
        .bind(&record.city)
        .bind(&record.county)
        .bind(&record.zipcode)
        .bind(&record.state)
        .execute(&self.pool)
        .await
        .map_err(|source| PersistenceError {
            name: name.to_string(),
            source,
        })?;
        Ok(())
    }
}
