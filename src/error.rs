//! Error taxonomy for the ingestion pipeline.
//!
//! Only two failures are fatal, and both fire before any browser work:
//! an unreadable entity feed and a feed that yields zero usable names.
//! Everything else is per-entity, recorded in the run summary, and the
//! batch loop keeps going.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal pre-flight errors. Once the batch loop has started iterating, the
/// run always completes and returns a summary instead of raising.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("entity feed {path:?} could not be read: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("entity feed {path:?} has no {column:?} column")]
    SourceMissingColumn { path: PathBuf, column: &'static str },

    #[error("entity feed contained no non-empty names; refusing to launch a browser")]
    EmptyBatch,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The automation step at which a per-entity query gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    TypeName,
    Submit,
    AwaitTable,
    AwaitRows,
    ReadRow,
}

impl QueryStage {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStage::TypeName => "type_name",
            QueryStage::Submit => "submit",
            QueryStage::AwaitTable => "await_table",
            QueryStage::AwaitRows => "await_rows",
            QueryStage::ReadRow => "read_row",
        }
    }
}

impl std::fmt::Display for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity's automation attempt did not complete. Recoverable: the
/// session stays open and the batch moves on to the next name.
#[derive(Debug, Error)]
#[error("query for {name:?} failed at {stage}: {cause}")]
pub struct QueryFailure {
    pub name: String,
    pub stage: QueryStage,
    #[source]
    pub cause: anyhow::Error,
}

impl QueryFailure {
    pub fn new(
        name: impl Into<String>,
        stage: QueryStage,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            cause: cause.into(),
        }
    }
}

/// A store write failed for one entity. Treated like a query failure by the
/// batch driver: logged, recorded, loop continues.
#[derive(Debug, Error)]
#[error("persisting {name:?} failed: {source}")]
pub struct PersistenceError {
    pub name: String,
    #[source]
    pub source: sqlx::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failure_display_names_entity_and_stage() {
        let f = QueryFailure::new(
            "Oak Manor",
            QueryStage::AwaitTable,
            anyhow::anyhow!("results table never appeared"),
        );
        let msg = f.to_string();
        assert!(msg.contains("Oak Manor"));
        assert!(msg.contains("await_table"));
    }
}
