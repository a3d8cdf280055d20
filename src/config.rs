use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::eval::{DEFAULT_EVAL_BATCH_SIZE, UNINSTRUCTED_TASKS};
use crate::constants::seeds::DEFAULT_SEED;
use crate::constants::tokenize::{DEFAULT_MAX_LEN, DEFAULT_WORKERS};
use crate::constants::training::{
    BEPHI2_CLASS_NAME, BEPHI2_TARGET_MODULES, DEFAULT_MODEL_NAME, KBIT_WIDTHS,
};
use crate::errors::TuneError;
use crate::tokenize::PromptTemplate;
use crate::types::{DatasetId, ModelName, SubsetName};

/// How token states are pooled into one sentence embedding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// First token state.
    #[default]
    Cls,
    /// Mean over all non-padding token states.
    Avg,
    /// Mean of the CLS state and the token average.
    #[value(name = "cls_avg")]
    ClsAvg,
    /// Mean of the first and last layer averages.
    #[value(name = "first_last_avg")]
    FirstLastAvg,
}

/// Which benchmark tasks get the retrieval query instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionPolicy {
    /// Every scheduled task (scoring right after training).
    #[default]
    AllTasks,
    /// Every task except the symmetric ones in `UNINSTRUCTED_TASKS`.
    PerTask,
}

impl InstructionPolicy {
    pub fn applies_to(self, task: &str) -> bool {
        match self {
            Self::AllTasks => true,
            Self::PerTask => !UNINSTRUCTED_TASKS.contains(&task),
        }
    }
}

/// Low-rank adapter settings forwarded to the trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    /// Adapter rank.
    pub r: u32,
    /// Adapter scaling numerator.
    pub alpha: u32,
    /// Dropout applied inside adapter layers.
    pub dropout: f32,
    /// Explicit target modules; `None` lets the trainer pick per backbone.
    pub target_modules: Option<Vec<String>>,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            r: 32,
            alpha: 32,
            dropout: 0.1,
            target_modules: None,
        }
    }
}

/// Pretrained backbone and adapter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backbone name or path understood by the trainer.
    pub model_name: ModelName,
    /// Optional local backbone weights overriding `model_name`.
    pub pretrained_model_path: Option<PathBuf>,
    /// Optional adapter weights to resume from.
    pub pretrained_lora_path: Option<PathBuf>,
    /// Optional bidirectional-LLM backbone class (for example `BePhi2Model`).
    pub backbone_class: Option<String>,
    pub pooling: PoolingStrategy,
    /// Maximum tokens per text.
    pub max_len: usize,
    pub is_llm: bool,
    pub apply_lora: bool,
    pub lora: LoraConfig,
    /// Quantized loading width (4, 8 or 16 bits).
    pub load_kbit: Option<u8>,
    /// Gradient checkpointing during k-bit preparation; `None` keeps the trainer default.
    pub kbit_gradient_checkpointing: Option<bool>,
    pub torch_dtype: Option<String>,
    /// Training device; `None` picks the best available.
    pub device: Option<String>,
    /// First layer to make bidirectional in LLM backbones.
    pub start_bilayer_index: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            pretrained_model_path: None,
            pretrained_lora_path: None,
            backbone_class: None,
            pooling: PoolingStrategy::default(),
            max_len: DEFAULT_MAX_LEN,
            is_llm: false,
            apply_lora: false,
            lora: LoraConfig::default(),
            load_kbit: None,
            kbit_gradient_checkpointing: None,
            torch_dtype: None,
            device: None,
            start_bilayer_index: None,
        }
    }
}

impl ModelConfig {
    /// Apply backbone-specific adapter defaults.
    ///
    /// The Phi-2 backbone needs explicit adapter targets and disables
    /// gradient checkpointing during k-bit preparation.
    pub fn with_backbone_defaults(mut self) -> Self {
        if self.backbone_class.as_deref() == Some(BEPHI2_CLASS_NAME) {
            if self.lora.target_modules.is_none() {
                self.lora.target_modules = Some(
                    BEPHI2_TARGET_MODULES
                        .iter()
                        .map(|module| module.to_string())
                        .collect(),
                );
            }
            if self.kbit_gradient_checkpointing.is_none() {
                self.kbit_gradient_checkpointing = Some(false);
            }
        }
        self
    }

    /// Backbone the trainer actually loads: the local weights when given,
    /// otherwise `model_name`.
    pub fn base_model(&self) -> ModelName {
        self.pretrained_model_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| self.model_name.clone())
    }

    pub fn validate(&self) -> Result<(), TuneError> {
        if self.model_name.trim().is_empty() {
            return Err(TuneError::Configuration(
                "model name must not be empty".to_string(),
            ));
        }
        if self.max_len == 0 {
            return Err(TuneError::Configuration(
                "max length must be greater than zero".to_string(),
            ));
        }
        if let Some(bits) = self.load_kbit
            && !KBIT_WIDTHS.contains(&bits)
        {
            return Err(TuneError::Configuration(format!(
                "load_kbit must be one of {KBIT_WIDTHS:?}, got {bits}"
            )));
        }
        if !(0.0..1.0).contains(&self.lora.dropout) {
            return Err(TuneError::Configuration(format!(
                "lora dropout must be within [0, 1), got {}",
                self.lora.dropout
            )));
        }
        if self.apply_lora && self.lora.r == 0 {
            return Err(TuneError::Configuration(
                "lora rank must be greater than zero when adapters are applied".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loss weights and temperatures, passed through to the trainer uninterpreted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    /// Cosine objective weight.
    pub w1: f32,
    /// In-batch negative objective weight.
    pub w2: f32,
    /// Angle objective weight.
    pub w3: f32,
    pub cosine_tau: f32,
    pub ibn_tau: f32,
    pub angle_tau: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            w1: 1.0,
            w2: 35.0,
            w3: 1.0,
            cosine_tau: 20.0,
            ibn_tau: 20.0,
            angle_tau: 1.0,
        }
    }
}

/// Hub publishing target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubPublish {
    /// Target repository, formatted like `organization/model_id`.
    pub model_id: String,
}

impl HubPublish {
    /// Resolve the publish flag pair; publishing without a target is an error.
    pub fn from_flags(push: bool, model_id: Option<String>) -> Result<Option<Self>, TuneError> {
        if !push {
            return Ok(None);
        }
        match model_id {
            Some(model_id) if !model_id.trim().is_empty() => Ok(Some(Self { model_id })),
            _ => Err(TuneError::Configuration(
                "hub publishing requires a target model id".to_string(),
            )),
        }
    }
}

/// Hyperparameter bundle handed to the fit routine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingArguments {
    /// Checkpoint directory.
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub save_steps: usize,
    pub warmup_steps: usize,
    pub logging_steps: usize,
    pub gradient_accumulation_steps: usize,
    pub loss: LossConfig,
    /// Mixed precision; `None` keeps the trainer default.
    pub fp16: Option<bool>,
    pub hub: Option<HubPublish>,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("ckpts"),
            batch_size: 32,
            epochs: 10,
            learning_rate: 1e-5,
            save_steps: 1000,
            warmup_steps: 100,
            logging_steps: 100,
            gradient_accumulation_steps: 1,
            loss: LossConfig::default(),
            fp16: None,
            hub: None,
        }
    }
}

impl TrainingArguments {
    pub fn validate(&self) -> Result<(), TuneError> {
        let positive = [
            ("batch size", self.batch_size),
            ("epochs", self.epochs),
            ("save steps", self.save_steps),
            ("logging steps", self.logging_steps),
            ("gradient accumulation steps", self.gradient_accumulation_steps),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TuneError::Configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TuneError::Configuration(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if let Some(hub) = &self.hub
            && hub.model_id.trim().is_empty()
        {
            return Err(TuneError::Configuration(
                "hub publishing requires a target model id".to_string(),
            ));
        }
        Ok(())
    }
}

/// Record collection and pair-corpus settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DataConfig {
    /// Local path or remote dataset id.
    pub name_or_path: DatasetId,
    pub subset: Option<SubsetName>,
    pub prompt: Option<PromptTemplate>,
    /// Tokenization worker count.
    pub workers: usize,
    /// Seeds the validation carve and corpus shuffles; `None` is nondeterministic.
    pub dataset_seed: Option<u64>,
    /// Hub download cache override.
    pub cache_dir: Option<PathBuf>,
}

impl DataConfig {
    pub fn new(name_or_path: impl Into<DatasetId>) -> Self {
        Self {
            name_or_path: name_or_path.into(),
            subset: None,
            prompt: None,
            workers: DEFAULT_WORKERS,
            dataset_seed: None,
            cache_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), TuneError> {
        if self.name_or_path.trim().is_empty() {
            return Err(TuneError::Configuration(
                "dataset name or path must not be empty".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(TuneError::Configuration(
                "workers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Benchmark run settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Root under which `mteb_results/en/<model>` folders are created.
    pub results_root: PathBuf,
    pub pooling: PoolingStrategy,
    pub batch_size: usize,
    pub instructions: InstructionPolicy,
    /// Embeddings are left unnormalized; normalizing hurts classification scores.
    pub normalize_embeddings: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("."),
            pooling: PoolingStrategy::default(),
            batch_size: DEFAULT_EVAL_BATCH_SIZE,
            instructions: InstructionPolicy::default(),
            normalize_embeddings: false,
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> Result<(), TuneError> {
        if self.batch_size == 0 {
            return Err(TuneError::Configuration(
                "evaluation batch size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full train-then-evaluate run configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Seeds negative sampling and task ordering; `None` is nondeterministic.
    pub seed: Option<u64>,
    pub model: ModelConfig,
    pub data: DataConfig,
    pub training: TrainingArguments,
    /// `None` skips evaluation.
    pub eval: Option<EvalConfig>,
}

impl RunConfig {
    pub fn new(data: DataConfig) -> Self {
        Self {
            seed: Some(DEFAULT_SEED),
            model: ModelConfig::default(),
            data,
            training: TrainingArguments::default(),
            eval: None,
        }
    }

    /// Check every precondition before any dataset or training work starts.
    pub fn validate(&self) -> Result<(), TuneError> {
        self.model.validate()?;
        self.data.validate()?;
        self.training.validate()?;
        if let Some(eval) = &self.eval {
            eval.validate()?;
        }
        Ok(())
    }
}

/// Positive seeds enable seeding; zero or negative disables it.
pub fn seed_from_flag(seed: i64) -> Option<u64> {
    u64::try_from(seed).ok().filter(|seed| *seed > 0)
}
