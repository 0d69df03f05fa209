//! Batch driver: walks the entity feed through one shared automation
//! session, strictly sequentially, isolating per-entity failures.
//!
//! The external site does not tolerate concurrent sessions, so there is no
//! parallelism here by design: one query fully completes (or fails) before
//! the next begins, with a fixed pause between attempts.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::db::Db;
use crate::error::{IngestError, PersistenceError, QueryFailure};
use crate::scrape::{AutomationSession, ScrapedRecord};
use crate::source::EntityNameSource;
use crate::storage::ObjectStore;

/// Seam over `AutomationSession::query_one` so the orchestration policy is
/// testable without a browser.
#[async_trait]
pub trait SearchSession {
    async fn query_one(&self, name: &str) -> Result<ScrapedRecord, QueryFailure>;
}

#[async_trait]
impl SearchSession for AutomationSession {
    async fn query_one(&self, name: &str) -> Result<ScrapedRecord, QueryFailure> {
        AutomationSession::query_one(self, name).await
    }
}

/// Seam over the relational upsert.
#[async_trait]
pub trait RecordWriter {
    async fn upsert(&self, name: &str, record: &ScrapedRecord) -> Result<(), PersistenceError>;
}

#[async_trait]
impl RecordWriter for Db {
    async fn upsert(&self, name: &str, record: &ScrapedRecord) -> Result<(), PersistenceError> {
        self.upsert_property(name, record).await
    }
}

/// Seam over the per-entity image upload.
#[async_trait]
pub trait ImageSink {
    async fn upload_all(&self, name: &str) -> anyhow::Result<Vec<String>>;
}

/// Binds the object store to the local asset root for this run.
pub struct FacilityImageUploader<'a> {
    pub store: &'a ObjectStore,
    pub assets_root: PathBuf,
}

#[async_trait]
impl ImageSink for FacilityImageUploader<'_> {
    async fn upload_all(&self, name: &str) -> anyhow::Result<Vec<String>> {
        self.store.upload_entity_images(name, &self.assets_root).await
    }
}

#[derive(Debug, Serialize)]
pub struct IngestedEntity {
    pub name: String,
    pub record: ScrapedRecord,
    pub images_uploaded: usize,
}

#[derive(Debug, Serialize)]
pub struct FailedEntity {
    pub name: String,
    pub stage: &'static str,
    pub error: String,
}

/// Summary of one ingestion run. Ephemeral: returned to the batch trigger,
/// never persisted.
#[derive(Debug, Default, Serialize)]
pub struct BatchRunResult {
    pub attempted: Vec<String>,
    pub succeeded: Vec<IngestedEntity>,
    pub failed: Vec<FailedEntity>,
    pub success_count: usize,
}

pub struct BatchIngestor {
    cfg: IngestConfig,
}

impl BatchIngestor {
    pub fn new(cfg: IngestConfig) -> Self {
        Self { cfg }
    }

    /// Load the feed and fail fast on an empty batch, before any browser is
    /// launched.
    fn prepare_names(&self, limit: Option<usize>) -> Result<Vec<String>, IngestError> {
        let mut names = EntityNameSource::new(&self.cfg.feed_path).load()?;
        if let Some(limit) = limit {
            names.truncate(limit);
        }
        if names.is_empty() {
            return Err(IngestError::EmptyBatch);
        }
        Ok(names)
    }

    /// Run one ingestion batch end to end. Once iteration starts, the run
    /// always completes and returns a summary; only the pre-flight feed
    /// checks and session setup can error.
    pub async fn run(
        &self,
        db: &Db,
        store: &ObjectStore,
        limit: Option<usize>,
    ) -> Result<BatchRunResult, IngestError> {
        let names = self.prepare_names(limit)?;
        info!(count = names.len(), feed = %self.cfg.feed_path.display(), "starting ingestion batch");

        let session = AutomationSession::open(&self.cfg.scrape).await?;
        let uploader = FacilityImageUploader {
            store,
            assets_root: self.cfg.assets_dir.clone(),
        };
        let result = drive(
            &names,
            &session,
            db,
            &uploader,
            &self.cfg.state,
            self.cfg.inter_query_delay,
        )
        .await;
        // The drive loop cannot error, so this close runs on every path the
        // run can take past session open.
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close automation session");
        }

        info!(
            attempted = result.attempted.len(),
            succeeded = result.success_count,
            failed = result.failed.len(),
            "ingestion batch complete"
        );
        Ok(result)
    }
}

/// The per-entity loop: query, persist, upload, never abort the batch for
/// one entity's failure.
async fn drive<S, W, I>(
    names: &[String],
    session: &S,
    writer: &W,
    images: &I,
    state: &str,
    delay: Duration,
) -> BatchRunResult
where
    S: SearchSession + Sync,
    W: RecordWriter + Sync,
    I: ImageSink + Sync,
{
    let mut result = BatchRunResult::default();
    for name in names {
        result.attempted.push(name.clone());
        match session.query_one(name).await {
            Ok(mut record) => {
                record.state = Some(state.to_string());
                match writer.upsert(name, &record).await {
                    Ok(()) => {
                        // A persisted record with failed uploads is an
                        // accepted partial state; re-running the entity
                        // reconciles it.
                        let images_uploaded = match images.upload_all(name).await {
                            Ok(keys) => keys.len(),
                            Err(e) => {
                                warn!(entity = %name, error = %e, "image upload failed after upsert");
                                0
                            }
                        };
                        result.succeeded.push(IngestedEntity {
                            name: name.clone(),
                            record,
                            images_uploaded,
                        });
                        result.success_count += 1;
                    }
                    Err(e) => {
                        warn!(entity = %name, error = %e, "persistence failed; continuing batch");
                        result.failed.push(FailedEntity {
                            name: name.clone(),
                            stage: "persist",
                            error: e.to_string(),
                        });
                    }
                }
            }
            Err(failure) => {
                warn!(entity = %name, stage = failure.stage.as_str(), error = %failure, "query failed; continuing batch");
                result.failed.push(FailedEntity {
                    name: name.clone(),
                    stage: failure.stage.as_str(),
                    error: failure.cause.to_string(),
                });
            }
        }
        // Pause after every attempt, success or failure, to avoid
        // overwhelming the external site.
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryStage;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn record(city: &str) -> ScrapedRecord {
        ScrapedRecord {
            provider_name: "OAK MANOR".into(),
            address: "100 Main St".into(),
            city: city.into(),
            county: "Travis".into(),
            zipcode: "78701".into(),
            state: None,
        }
    }

    /// Fails for names in `failing`, succeeds otherwise. Tracks call order.
    struct StubSession {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchSession for StubSession {
        async fn query_one(&self, name: &str) -> Result<ScrapedRecord, QueryFailure> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.failing.contains(name) {
                Err(QueryFailure::new(
                    name,
                    QueryStage::AwaitTable,
                    anyhow::anyhow!("results table never became visible"),
                ))
            } else {
                Ok(record("Austin"))
            }
        }
    }

    struct StubWriter {
        fail_for: Option<String>,
        upserts: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl RecordWriter for StubWriter {
        async fn upsert(
            &self,
            name: &str,
            record: &ScrapedRecord,
        ) -> Result<(), PersistenceError> {
            if self.fail_for.as_deref() == Some(name) {
                return Err(PersistenceError {
                    name: name.to_string(),
                    source: sqlx::Error::PoolClosed,
                });
            }
            self.upserts
                .lock()
                .unwrap()
                .push((name.to_string(), record.state.clone()));
            Ok(())
        }
    }

    struct StubImages {
        per_entity: usize,
    }

    #[async_trait]
    impl ImageSink for StubImages {
        async fn upload_all(&self, name: &str) -> anyhow::Result<Vec<String>> {
            Ok((0..self.per_entity)
                .map(|i| format!("{name}/{i}.jpg"))
                .collect())
        }
    }

    fn session(failing: &[&str]) -> StubSession {
        StubSession {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn writer() -> StubWriter {
        StubWriter {
            fail_for: None,
            upserts: Mutex::new(Vec::new()),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn attempted_matches_feed_and_order_is_preserved() {
        let s = session(&[]);
        let w = writer();
        let result = drive(
            &names(&["Oak Manor", "Pine Court"]),
            &s,
            &w,
            &StubImages { per_entity: 2 },
            "TX",
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.attempted, vec!["Oak Manor", "Pine Court"]);
        assert_eq!(result.success_count, 2);
        assert_eq!(*s.calls.lock().unwrap(), vec!["Oak Manor", "Pine Court"]);
        assert_eq!(result.succeeded[0].images_uploaded, 2);
    }

    #[tokio::test]
    async fn query_failure_is_recorded_and_the_batch_continues() {
        let s = session(&["Oak Manor"]);
        let w = writer();
        let result = drive(
            &names(&["Oak Manor", "Pine Court"]),
            &s,
            &w,
            &StubImages { per_entity: 0 },
            "TX",
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].name, "Oak Manor");
        assert_eq!(result.failed[0].stage, "await_table");
        // The session kept serving queries after the failure.
        assert_eq!(*s.calls.lock().unwrap(), vec!["Oak Manor", "Pine Court"]);
        assert_eq!(result.succeeded[0].name, "Pine Court");
    }

    #[tokio::test]
    async fn persistence_failure_is_isolated_like_a_query_failure() {
        let s = session(&[]);
        let w = StubWriter {
            fail_for: Some("Oak Manor".into()),
            upserts: Mutex::new(Vec::new()),
        };
        let result = drive(
            &names(&["Oak Manor", "Pine Court"]),
            &s,
            &w,
            &StubImages { per_entity: 1 },
            "TX",
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed[0].stage, "persist");
        assert_eq!(w.upserts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn state_literal_is_injected_before_persisting() {
        let s = session(&[]);
        let w = writer();
        drive(
            &names(&["Oak Manor"]),
            &s,
            &w,
            &StubImages { per_entity: 0 },
            "TX",
            Duration::ZERO,
        )
        .await;

        let upserts = w.upserts.lock().unwrap();
        assert_eq!(upserts[0], ("Oak Manor".to_string(), Some("TX".to_string())));
    }

    #[test]
    fn empty_feed_fails_fast_before_any_session_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.csv");
        std::fs::write(&feed, "name\n\n   \n").unwrap();

        let mut cfg = crate::config::IngestConfig {
            feed_path: feed,
            assets_dir: dir.path().join("assets"),
            state: "TX".into(),
            inter_query_delay: Duration::ZERO,
            scrape: crate::config::ScrapeConfig {
                search_url: "http://localhost/unused".into(),
                wait_timeout: Duration::from_secs(1),
                chrome_executable: None,
                headless: true,
            },
            storage: crate::config::StorageConfig {
                endpoint: "http://localhost:9000".into(),
                region: "us-east-1".into(),
                access_key: "root".into(),
                secret_key: "password".into(),
                bucket: "carehub".into(),
                presign_expiry: Duration::from_secs(3600),
            },
        };
        let ingestor = BatchIngestor::new(cfg.clone());
        assert!(matches!(
            ingestor.prepare_names(None),
            Err(IngestError::EmptyBatch)
        ));

        // An unreadable feed is the other fatal pre-flight error.
        cfg.feed_path = dir.path().join("missing.csv");
        assert!(matches!(
            BatchIngestor::new(cfg).prepare_names(None),
            Err(IngestError::SourceRead { .. })
        ));
    }

    #[test]
    fn limit_truncates_but_empty_check_still_applies() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.csv");
        std::fs::write(&feed, "name\nOak Manor\nPine Court\nElm Lodge\n").unwrap();

        let cfg = crate::config::IngestConfig {
            feed_path: feed,
            assets_dir: dir.path().join("assets"),
            state: "TX".into(),
            inter_query_delay: Duration::ZERO,
            scrape: crate::config::ScrapeConfig {
                search_url: "http://localhost/unused".into(),
                wait_timeout: Duration::from_secs(1),
                chrome_executable: None,
                headless: true,
            },
            storage: crate::config::StorageConfig {
                endpoint: "http://localhost:9000".into(),
                region: "us-east-1".into(),
                access_key: "root".into(),
                secret_key: "password".into(),
                bucket: "carehub".into(),
                presign_expiry: Duration::from_secs(3600),
            },
        };
        let ingestor = BatchIngestor::new(cfg);
        assert_eq!(
            ingestor.prepare_names(Some(2)).unwrap(),
            vec!["Oak Manor", "Pine Court"]
        );
    }
}
