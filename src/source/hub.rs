use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::source::HUB_RETRIES;
use crate::data::DatasetSplits;
use crate::errors::TuneError;
use crate::source::RecordSource;
use crate::source::shards::{ShardFormat, load_split_shards, split_for_path};
use crate::types::{DatasetId, SubsetName};

/// Remote dataset hosted on the Hugging Face hub.
///
/// Repository files are filtered by subset and shard extension, downloaded
/// into the hub cache, and grouped into splits by name.
#[derive(Clone, Debug)]
pub struct HuggingFaceSource {
    dataset: DatasetId,
    subset: Option<SubsetName>,
    cache_dir: Option<PathBuf>,
    token: Option<String>,
}

impl HuggingFaceSource {
    pub fn new(dataset: impl Into<DatasetId>, subset: Option<SubsetName>) -> Self {
        Self {
            dataset: dataset.into(),
            subset,
            cache_dir: None,
            token: std::env::var("HF_TOKEN").ok(),
        }
    }

    /// Override the hub cache directory.
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn unavailable(&self, reason: String) -> TuneError {
        TuneError::SourceUnavailable {
            source_id: self.dataset.clone(),
            reason,
        }
    }

    fn repo_api(&self) -> Result<ApiRepo, TuneError> {
        let mut builder = ApiBuilder::new()
            .with_progress(true)
            .with_retries(HUB_RETRIES)
            .with_token(self.token.clone());
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|err| self.unavailable(format!("failed building hf-hub client: {err}")))?;
        Ok(api.repo(Repo::new(self.dataset.clone(), RepoType::Dataset)))
    }

    fn remote_candidates(&self, repo: &ApiRepo) -> Result<Vec<String>, TuneError> {
        info!(dataset = %self.dataset, subset = ?self.subset, "reading remote file list");
        let listing = repo
            .info()
            .map_err(|err| self.unavailable(format!("failed reading repository info: {err}")))?;
        let mut candidates: Vec<String> = listing
            .siblings
            .into_iter()
            .map(|sibling| sibling.rfilename)
            .filter(|remote| ShardFormat::from_path(Path::new(remote)).is_some())
            .filter(|remote| self.in_subset(remote))
            .collect();
        // Untagged repos load everything as train; otherwise skip test shards.
        if candidates.iter().any(|remote| split_for_path(remote).is_some()) {
            candidates.retain(|remote| split_for_path(remote).is_some());
        }
        candidates.sort();
        if candidates.is_empty() {
            return Err(self.unavailable(format!(
                "no shard files found for subset {:?}",
                self.subset
            )));
        }
        Ok(candidates)
    }

    fn in_subset(&self, remote: &str) -> bool {
        match self.subset.as_deref() {
            None => true,
            Some(subset) => {
                remote.starts_with(&format!("{subset}/"))
                    || remote.contains(&format!("/{subset}/"))
            }
        }
    }
}

impl RecordSource for HuggingFaceSource {
    fn id(&self) -> &str {
        &self.dataset
    }

    fn load(&self) -> Result<DatasetSplits, TuneError> {
        let repo = self.repo_api()?;
        let candidates = self.remote_candidates(&repo)?;
        let mut shards = Vec::with_capacity(candidates.len());
        for remote in candidates {
            let local = repo.get(&remote).map_err(|err| {
                self.unavailable(format!("failed downloading '{remote}' from hf-hub: {err}"))
            })?;
            if !local.exists() {
                warn!(
                    dataset = %self.dataset,
                    remote = %remote,
                    "hf-hub returned a missing cache path"
                );
                return Err(self.unavailable(format!(
                    "hf-hub returned non-existent cache file for '{remote}' at {}",
                    local.display()
                )));
            }
            shards.push((remote, local));
        }
        let splits = load_split_shards(&self.dataset, &shards)?;
        info!(
            dataset = %self.dataset,
            shards = shards.len(),
            train = splits.train.len(),
            validation = ?splits.validation.as_ref().map(Vec::len),
            "loaded hub records"
        );
        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_filter_matches_directory_prefixes() {
        let source = HuggingFaceSource::new("org/qa", Some("pair".to_string()));
        assert!(source.in_subset("pair/train-00000.parquet"));
        assert!(source.in_subset("data/pair/train.jsonl"));
        assert!(!source.in_subset("triplet/train-00000.parquet"));
        assert!(!source.in_subset("pairs/train.jsonl"));

        let unfiltered = HuggingFaceSource::new("org/qa", None);
        assert!(unfiltered.in_subset("anything/train.jsonl"));
    }
}
