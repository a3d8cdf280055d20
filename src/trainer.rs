//! Trainer collaborator seam.
//!
//! Optimization, loss computation and adapter injection happen outside this
//! crate. `EmbeddingTrainer` is the boundary: it exposes the tokenizer used for
//! the corpus, accepts the fit request, and names the checkpoint it produced.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::config::{ModelConfig, TrainingArguments};
use crate::constants::training::{
    BEST_CHECKPOINT_DIR, FIT_REQUEST_FILENAME, REQUEST_FLAG, TRAIN_CORPUS_FILENAME,
    VALIDATION_CORPUS_FILENAME, WANDB_API_KEY_ENV, WANDB_DISABLED_ENV,
};
use crate::errors::TuneError;
use crate::tokenize::{EncodedPair, PairTokenizer};
use crate::types::ModelName;

/// Trained model produced by a fit call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    /// Name used to key result folders (the checkpoint directory name).
    pub name: ModelName,
    /// Backbone the checkpoint was trained from.
    pub base_model: ModelName,
    pub checkpoint_dir: PathBuf,
}

impl ModelHandle {
    /// Handle for an existing checkpoint directory.
    pub fn from_checkpoint(base_model: impl Into<ModelName>, checkpoint_dir: PathBuf) -> Self {
        let name = checkpoint_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| checkpoint_dir.display().to_string());
        Self {
            name,
            base_model: base_model.into(),
            checkpoint_dir,
        }
    }
}

/// Everything the fit routine receives.
#[derive(Clone, Copy, Debug)]
pub struct FitRequest<'a> {
    pub model: &'a ModelConfig,
    pub train: &'a [EncodedPair],
    pub validation: &'a [EncodedPair],
    pub args: &'a TrainingArguments,
}

/// Embedding-trainer capability: tokenize, fit, checkpoint.
pub trait EmbeddingTrainer {
    /// Tokenizer matching the backbone being trained.
    fn tokenizer(&self) -> &dyn PairTokenizer;
    /// Run training to completion.
    fn fit(&self, request: &FitRequest<'_>) -> Result<ModelHandle, TuneError>;
    /// Directory the best checkpoint is written to.
    fn checkpoint_dir(&self, args: &TrainingArguments) -> PathBuf {
        args.output_dir.join(BEST_CHECKPOINT_DIR)
    }
}

/// Serialized fit request read by an external trainer process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitManifest {
    pub model: ModelConfig,
    pub training: TrainingArguments,
    pub train_corpus: PathBuf,
    pub validation_corpus: PathBuf,
    pub train_pairs: usize,
    pub validation_pairs: usize,
    pub checkpoint_dir: PathBuf,
}

/// Trainer that hands the encoded corpora to an external command.
///
/// The corpora are written as JSON Lines next to a `fit_request.json`
/// manifest inside the output directory; the command is invoked with
/// `--request <manifest>` and must exit successfully.
pub struct ProcessTrainer {
    program: String,
    args: Vec<String>,
    tokenizer: Box<dyn PairTokenizer>,
    wandb_api_key: Option<String>,
}

impl ProcessTrainer {
    /// `command` is the program followed by its fixed arguments.
    pub fn new(command: Vec<String>, tokenizer: Box<dyn PairTokenizer>) -> Result<Self, TuneError> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|program| !program.trim().is_empty())
            .ok_or_else(|| {
                TuneError::Configuration("trainer command must not be empty".to_string())
            })?;
        Ok(Self {
            program,
            args: parts.collect(),
            tokenizer,
            wandb_api_key: None,
        })
    }

    /// Forward an experiment-tracking key to the trainer process.
    pub fn with_wandb_api_key(mut self, key: Option<String>) -> Self {
        self.wandb_api_key = key;
        self
    }

    /// Write corpora and manifest; returns the manifest path.
    pub fn materialize(&self, request: &FitRequest<'_>) -> Result<PathBuf, TuneError> {
        let output_dir = &request.args.output_dir;
        fs::create_dir_all(output_dir)?;
        let train_corpus = output_dir.join(TRAIN_CORPUS_FILENAME);
        let validation_corpus = output_dir.join(VALIDATION_CORPUS_FILENAME);
        write_corpus(&train_corpus, request.train)?;
        write_corpus(&validation_corpus, request.validation)?;

        let manifest = FitManifest {
            model: request.model.clone(),
            training: request.args.clone(),
            train_corpus,
            validation_corpus,
            train_pairs: request.train.len(),
            validation_pairs: request.validation.len(),
            checkpoint_dir: self.checkpoint_dir(request.args),
        };
        let manifest_path = output_dir.join(FIT_REQUEST_FILENAME);
        let file = File::create(&manifest_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest)?;
        Ok(manifest_path)
    }
}

impl EmbeddingTrainer for ProcessTrainer {
    fn tokenizer(&self) -> &dyn PairTokenizer {
        self.tokenizer.as_ref()
    }

    fn fit(&self, request: &FitRequest<'_>) -> Result<ModelHandle, TuneError> {
        let manifest_path = self.materialize(request)?;
        info!(
            program = %self.program,
            manifest = %manifest_path.display(),
            train_pairs = request.train.len(),
            validation_pairs = request.validation.len(),
            "starting external trainer"
        );

        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(REQUEST_FLAG).arg(&manifest_path);
        match &self.wandb_api_key {
            Some(key) => {
                command.env(WANDB_API_KEY_ENV, key);
            }
            None => {
                command.env(WANDB_DISABLED_ENV, "true");
            }
        }
        let status = command.status().map_err(|err| {
            TuneError::Trainer(format!("failed launching '{}': {err}", self.program))
        })?;
        if !status.success() {
            return Err(TuneError::Trainer(format!(
                "'{}' exited with {status}",
                self.program
            )));
        }

        let checkpoint_dir = self.checkpoint_dir(request.args);
        if !checkpoint_dir.exists() {
            warn!(
                checkpoint = %checkpoint_dir.display(),
                "trainer finished without creating the best checkpoint directory"
            );
        }
        Ok(ModelHandle::from_checkpoint(
            request.model.base_model(),
            checkpoint_dir,
        ))
    }
}

fn write_corpus(path: &Path, pairs: &[EncodedPair]) -> Result<(), TuneError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for pair in pairs {
        serde_json::to_writer(&mut writer, pair)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PairLabel;
    use crate::tokenize::TokenIds;
    use tempfile::tempdir;

    struct NullTokenizer;

    impl PairTokenizer for NullTokenizer {
        fn encode_text(&self, _text: &str, _max_len: usize) -> Result<TokenIds, TuneError> {
            Ok(TokenIds::default())
        }
    }

    fn encoded(label: PairLabel) -> EncodedPair {
        EncodedPair {
            text1: TokenIds {
                input_ids: vec![1, 2],
                attention_mask: vec![1, 1],
            },
            text2: TokenIds {
                input_ids: vec![3],
                attention_mask: vec![1],
            },
            label,
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(ProcessTrainer::new(Vec::new(), Box::new(NullTokenizer)).is_err());
        assert!(ProcessTrainer::new(vec![" ".to_string()], Box::new(NullTokenizer)).is_err());
    }

    #[test]
    fn materialize_writes_corpora_and_manifest() {
        let dir = tempdir().expect("tempdir");
        let trainer = ProcessTrainer::new(vec!["true".to_string()], Box::new(NullTokenizer))
            .expect("trainer");
        let model = ModelConfig::default();
        let args = TrainingArguments {
            output_dir: dir.path().join("run"),
            ..TrainingArguments::default()
        };
        let train = vec![encoded(PairLabel::Positive), encoded(PairLabel::Negative)];
        let validation = vec![encoded(PairLabel::Negative)];
        let request = FitRequest {
            model: &model,
            train: &train,
            validation: &validation,
            args: &args,
        };

        let manifest_path = trainer.materialize(&request).expect("materialize");
        let manifest: FitManifest =
            serde_json::from_str(&fs::read_to_string(&manifest_path).expect("read")).expect("json");
        assert_eq!(manifest.train_pairs, 2);
        assert_eq!(manifest.validation_pairs, 1);
        assert_eq!(manifest.checkpoint_dir, dir.path().join("run").join("best-checkpoint"));
        assert_eq!(manifest.training, args);

        let lines = fs::read_to_string(&manifest.train_corpus).expect("read");
        let first: EncodedPair =
            serde_json::from_str(lines.lines().next().expect("line")).expect("pair");
        assert_eq!(first, encoded(PairLabel::Positive));
        assert!(lines.lines().nth(1).expect("line").contains("\"label\":0"));
    }

    #[cfg(unix)]
    #[test]
    fn fit_surfaces_trainer_exit_status() {
        let dir = tempdir().expect("tempdir");
        let model = ModelConfig::default();
        let args = TrainingArguments {
            output_dir: dir.path().to_path_buf(),
            ..TrainingArguments::default()
        };
        let train = vec![encoded(PairLabel::Positive)];
        let request = FitRequest {
            model: &model,
            train: &train,
            validation: &train,
            args: &args,
        };

        let ok = ProcessTrainer::new(vec!["true".to_string()], Box::new(NullTokenizer))
            .expect("trainer")
            .fit(&request)
            .expect("fit");
        assert_eq!(ok.name, "best-checkpoint");
        assert_eq!(ok.base_model, "roberta-large");

        let local = ModelConfig {
            pretrained_model_path: Some(PathBuf::from("/weights/my-backbone")),
            ..ModelConfig::default()
        };
        let from_local = ProcessTrainer::new(vec!["true".to_string()], Box::new(NullTokenizer))
            .expect("trainer")
            .fit(&FitRequest {
                model: &local,
                ..request
            })
            .expect("fit");
        assert_eq!(from_local.base_model, "/weights/my-backbone");

        let err = ProcessTrainer::new(vec!["false".to_string()], Box::new(NullTokenizer))
            .expect("trainer")
            .fit(&request)
            .unwrap_err();
        assert!(matches!(err, TuneError::Trainer(_)));
    }

    #[test]
    fn model_handle_uses_checkpoint_dir_name() {
        let handle = ModelHandle::from_checkpoint("base", PathBuf::from("/runs/x/best-checkpoint"));
        assert_eq!(handle.name, "best-checkpoint");
    }
}
