use std::path::PathBuf;
use tracing::info;
use walkdir::WalkDir;

use crate::data::DatasetSplits;
use crate::errors::TuneError;
use crate::source::RecordSource;
use crate::source::shards::{ShardFormat, load_split_shards, read_shard};

/// Filesystem-backed record source.
///
/// A single file is loaded as the `train` split. A directory is walked for
/// shard files which are assigned to splits by name.
#[derive(Clone, Debug)]
pub struct LocalFileSource {
    id: String,
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.display().to_string(),
            path,
        }
    }

    fn collect_shards(&self) -> Result<Vec<(String, PathBuf)>, TuneError> {
        let mut shards = Vec::new();
        for entry in WalkDir::new(&self.path).follow_links(true) {
            let entry = entry.map_err(|err| TuneError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: format!("failed walking directory: {err}"),
            })?;
            if !entry.file_type().is_file() || ShardFormat::from_path(entry.path()).is_none() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            shards.push((relative, entry.path().to_path_buf()));
        }
        if shards.is_empty() {
            return Err(TuneError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: "directory holds no json, jsonl, ndjson, or parquet shards".to_string(),
            });
        }
        Ok(shards)
    }
}

impl RecordSource for LocalFileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<DatasetSplits, TuneError> {
        if !self.path.exists() {
            return Err(TuneError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: "path does not exist".to_string(),
            });
        }
        let splits = if self.path.is_dir() {
            let shards = self.collect_shards()?;
            load_split_shards(&self.id, &shards)?
        } else {
            DatasetSplits {
                train: read_shard(&self.path)?,
                validation: None,
            }
        };
        info!(
            source_id = %self.id,
            train = splits.train.len(),
            validation = ?splits.validation.as_ref().map(Vec::len),
            "loaded local records"
        );
        Ok(splits)
    }
}
