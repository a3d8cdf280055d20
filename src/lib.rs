#![doc = include_str!("../README.md")]

/// CLI runners shared by the binaries.
pub mod apps;
/// Model, adapter, training, data, and evaluation configuration.
pub mod config;
/// Centralized constants used across pairs, splits, sources, and collaborators.
pub mod constants;
/// Record and pair types.
pub mod data;
/// Train-then-evaluate sequencing.
pub mod driver;
/// Benchmark plan, harness seam, and score reports.
pub mod eval;
mod hash;
/// Corpus balance metrics.
pub mod metrics;
/// Contrastive pair construction.
pub mod pairs;
/// Explicit deterministic random sources.
pub mod rng;
/// Record collection loading.
pub mod source;
/// Validation split carving.
pub mod splits;
/// Tokenizer seam and parallel corpus encoding.
pub mod tokenize;
/// Trainer seam and external trainer process.
pub mod trainer;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{
    DataConfig, EvalConfig, HubPublish, InstructionPolicy, LoraConfig, LossConfig, ModelConfig,
    PoolingStrategy, RunConfig, TrainingArguments,
};
pub use data::{DatasetSplits, Pair, PairLabel, Record};
pub use driver::{PreparedCorpora, RunOutcome, prepare_corpora, run_training};
pub use errors::TuneError;
pub use eval::{BenchmarkHarness, EvalModel, ProcessHarness, ScoreReport, TaskSpec, run_benchmarks};
pub use metrics::{CorpusBalance, corpus_balance};
pub use pairs::{PairBuilder, build_contrastive_pairs};
pub use rng::DeterministicRng;
#[cfg(feature = "huggingface")]
pub use source::HuggingFaceSource;
pub use source::{DatasetLocation, LocalFileSource, RecordSource, open_source};
pub use splits::{SplitLabel, TrainValidation, ensure_validation};
pub use tokenize::{EncodedPair, HfPairTokenizer, PairTokenizer, PromptTemplate, TokenIds};
pub use trainer::{EmbeddingTrainer, FitRequest, ModelHandle, ProcessTrainer};
pub use types::{DatasetId, ModelName, SubsetName, TaskName, Text};
