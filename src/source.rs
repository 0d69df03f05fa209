//! Entity feed: an ordered CSV of target facility names.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::IngestError;

/// Header of the one recognized column.
const NAME_COLUMN: &str = "name";

/// Reads the batch's target names from a delimited feed with a header row.
///
/// Row order is preserved; values are trimmed and rows whose name is empty
/// after trimming are dropped rather than errored. Repeated loads of the
/// same feed yield the same sequence.
pub struct EntityNameSource {
    path: PathBuf,
}

impl EntityNameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Vec<String>, IngestError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IngestError::SourceRead {
            path: self.path.clone(),
            source: csv::Error::from(e),
        })?;
        let names = read_names(file, &self.path)?;
        debug!(feed = %self.path.display(), count = names.len(), "loaded entity names");
        Ok(names)
    }
}

fn read_names<R: Read>(reader: R, path: &Path) -> Result<Vec<String>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let source_err = |source: csv::Error| IngestError::SourceRead {
        path: path.to_path_buf(),
        source,
    };

    let headers = rdr.headers().map_err(source_err)?;
    let name_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(NAME_COLUMN))
        .ok_or_else(|| IngestError::SourceMissingColumn {
            path: path.to_path_buf(),
            column: NAME_COLUMN,
        })?;

    let mut names = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(source_err)?;
        let trimmed = record.get(name_idx).unwrap_or("").trim();
        if trimmed.is_empty() {
            continue;
        }
        names.push(trimmed.to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_of(csv: &str) -> Result<Vec<String>, IngestError> {
        read_names(csv.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn drops_rows_with_empty_names() {
        let got = names_of("name\nOak Manor\n\"\"\nPine Court\n").unwrap();
        assert_eq!(got, vec!["Oak Manor", "Pine Court"]);
    }

    #[test]
    fn trims_whitespace_and_preserves_order() {
        let got = names_of("name\n  Oak Manor  \nPine Court\n   \nBrookdale Creekside\n").unwrap();
        assert_eq!(got, vec!["Oak Manor", "Pine Court", "Brookdale Creekside"]);
    }

    #[test]
    fn finds_name_column_case_insensitively_among_others() {
        let got = names_of("id,Name,city\n1,Oak Manor,Austin\n2,Pine Court,Plano\n").unwrap();
        assert_eq!(got, vec!["Oak Manor", "Pine Court"]);
    }

    #[test]
    fn missing_name_column_is_a_read_error() {
        let err = names_of("facility,city\nOak Manor,Austin\n").unwrap_err();
        assert!(matches!(err, IngestError::SourceMissingColumn { .. }));
    }

    #[test]
    fn unreadable_feed_is_a_read_error() {
        let err = EntityNameSource::new("does/not/exist.csv").load().unwrap_err();
        assert!(matches!(err, IngestError::SourceRead { .. }));
    }

    #[test]
    fn repeated_loads_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.csv");
        std::fs::write(&path, "name\nOak Manor\nPine Court\n").unwrap();
        let source = EntityNameSource::new(&path);
        assert_eq!(source.load().unwrap(), source.load().unwrap());
    }
}
