//! JSON Corpus Loader
//!
//! Implements CorpusLoader by reading JSON files from the data directory:
//!
//! ```text
//! <data_dir>/tokens/*.json
//! <data_dir>/components/*.json
//! <data_dir>/guidelines/*.json
//! ```
//!
//! Each file holds a single record or an array of records. A missing
//! sub-directory is an empty collection; a missing data directory is fatal.

use crate::domain::entities::{Component, Guideline, Record, Token};
use crate::domain::ports::{CorpusLoader, LoadOutcome, RecordError};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const TOKENS_DIR: &str = "tokens";
const COMPONENTS_DIR: &str = "components";
const GUIDELINES_DIR: &str = "guidelines";

/// Filesystem-backed corpus loader.
#[derive(Debug, Default, Clone)]
pub struct JsonCorpusLoader;

impl JsonCorpusLoader {
    pub fn new() -> Self {
        Self
    }

    /// Read and validate the whole corpus under `root`.
    fn load_from_dir(root: &Path) -> Result<LoadOutcome, ServiceError> {
        let metadata = fs::metadata(root).map_err(|e| {
            ServiceError::configuration(format!("data directory {:?} is not accessible", root))
                .with_suggestion("Set DESIGN_CORPUS_DATA_DIR to an existing directory")
                .with_cause(e)
        })?;
        if !metadata.is_dir() {
            return Err(ServiceError::configuration(format!(
                "data directory {:?} is not a directory",
                root
            )));
        }

        let mut errors = Vec::new();
        let tokens = Self::load_collection::<Token>(root, TOKENS_DIR, &mut errors)?;
        let components = Self::load_collection::<Component>(root, COMPONENTS_DIR, &mut errors)?;
        let guidelines = Self::load_collection::<Guideline>(root, GUIDELINES_DIR, &mut errors)?;

        Ok(LoadOutcome {
            tokens,
            components,
            guidelines,
            errors,
        })
    }

    /// JSON files directly under `dir`, sorted by name.
    fn json_files(dir: &Path) -> Result<Vec<PathBuf>, ServiceError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_collection<R>(
        root: &Path,
        subdir: &str,
        errors: &mut Vec<RecordError>,
    ) -> Result<Vec<R>, ServiceError>
    where
        R: Record + DeserializeOwned,
    {
        let dir = root.join(subdir);
        if !dir.is_dir() {
            tracing::debug!(?dir, "collection directory absent, treating as empty");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        // lowercase key -> location of first definition
        let mut seen: HashMap<String, String> = HashMap::new();

        for path in Self::json_files(&dir)? {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file_label = format!("{}/{}", subdir, file_name);

            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
                });
            let items = match parsed {
                Ok(Value::Array(items)) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (format!("{}[{}]", file_label, i), item))
                    .collect::<Vec<_>>(),
                Ok(single) => vec![(file_label.clone(), single)],
                Err(message) => {
                    errors.push(RecordError::new(file_label, message));
                    continue;
                }
            };

            for (location, item) in items {
                let record = match serde_json::from_value::<R>(item) {
                    Ok(record) => record,
                    Err(e) => {
                        errors.push(RecordError::new(location, e.to_string()));
                        continue;
                    }
                };
                if let Err(message) = record.validate() {
                    errors.push(RecordError::new(location, message));
                    continue;
                }
                let key = record.key().to_lowercase();
                if let Some(first) = seen.get(&key) {
                    errors.push(RecordError::new(
                        location,
                        format!("duplicate {} '{}' (first defined at {})", R::KIND, record.key(), first),
                    ));
                    continue;
                }
                seen.insert(key, location);
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl CorpusLoader for JsonCorpusLoader {
    async fn load(&self, source: &Path) -> Result<LoadOutcome, ServiceError> {
        let root = source.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load_from_dir(&root))
            .await
            .map_err(|e| ServiceError::internal("corpus load task failed").with_cause(e))?
    }
}
