//! Record collection loading.
//!
//! A record source yields a `train` split and, when the collection ships one,
//! a `validation` split. Sources are either local files/directories or
//! remote hub datasets (feature `huggingface`).

use std::path::{Path, PathBuf};

use crate::data::DatasetSplits;
use crate::errors::TuneError;
use crate::types::{DatasetId, SubsetName};

/// Local file and directory loading.
pub mod local;
/// Shard parsing and split assignment shared by all sources.
pub mod shards;
#[cfg(feature = "huggingface")]
/// Hugging Face hub datasets.
pub mod hub;

#[cfg(feature = "huggingface")]
pub use hub::HuggingFaceSource;
pub use local::LocalFileSource;

/// Loader-facing record source interface.
pub trait RecordSource: Send + Sync {
    /// Stable identifier used in logs and errors.
    fn id(&self) -> &str;
    /// Load every split the source provides.
    fn load(&self) -> Result<DatasetSplits, TuneError>;
}

/// Where a record collection lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetLocation {
    /// A local file or directory.
    Local(PathBuf),
    /// A named remote dataset with an optional subset.
    Hub {
        dataset: DatasetId,
        subset: Option<SubsetName>,
    },
}

impl DatasetLocation {
    /// Existing local paths win; everything else is treated as a remote id.
    pub fn resolve(name_or_path: &str, subset: Option<&str>) -> Self {
        let path = Path::new(name_or_path);
        if path.exists() {
            return DatasetLocation::Local(path.to_path_buf());
        }
        DatasetLocation::Hub {
            dataset: name_or_path.to_string(),
            subset: subset.map(str::to_string),
        }
    }
}

/// Build the source for `location`.
pub fn open_source(
    location: &DatasetLocation,
    cache_dir: Option<&Path>,
) -> Result<Box<dyn RecordSource>, TuneError> {
    match location {
        DatasetLocation::Local(path) => Ok(Box::new(LocalFileSource::new(path.clone()))),
        #[cfg(feature = "huggingface")]
        DatasetLocation::Hub { dataset, subset } => {
            let mut source = HuggingFaceSource::new(dataset.clone(), subset.clone());
            if let Some(dir) = cache_dir {
                source = source.with_cache_dir(dir);
            }
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "huggingface"))]
        DatasetLocation::Hub { dataset, .. } => {
            let _ = cache_dir;
            Err(TuneError::SourceUnavailable {
                source_id: dataset.clone(),
                reason: "path does not exist and hub support is disabled".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_prefers_existing_paths() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("qa.jsonl");
        std::fs::write(&file, "").expect("write");
        let location = DatasetLocation::resolve(file.to_str().expect("utf8"), Some("ignored"));
        assert_eq!(location, DatasetLocation::Local(file));
    }

    #[test]
    fn resolve_falls_back_to_hub_ids() {
        let location = DatasetLocation::resolve("org/qa-pairs-missing", Some("pair"));
        assert_eq!(
            location,
            DatasetLocation::Hub {
                dataset: "org/qa-pairs-missing".to_string(),
                subset: Some("pair".to_string()),
            }
        );
    }

    #[test]
    fn open_source_loads_local_files() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("qa.jsonl");
        std::fs::write(
            &file,
            "{\"query\":\"q1\",\"answer\":\"a1\"}\n{\"query\":\"q2\",\"answer\":\"a2\"}\n",
        )
        .expect("write");
        let source = open_source(&DatasetLocation::Local(file), None).expect("source");
        let splits = source.load().expect("load");
        assert_eq!(splits.train.len(), 2);
        assert!(splits.validation.is_none());
    }
}
