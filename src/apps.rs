use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use crate::config::{
    DataConfig, EvalConfig, HubPublish, InstructionPolicy, LoraConfig, LossConfig, ModelConfig,
    PoolingStrategy, RunConfig, TrainingArguments, seed_from_flag,
};
use crate::constants::eval::DEFAULT_EVAL_BATCH_SIZE;
use crate::constants::seeds::DEFAULT_SEED;
use crate::constants::tokenize::{DEFAULT_MAX_LEN, DEFAULT_WORKERS};
use crate::constants::training::{DEFAULT_MODEL_NAME, KBIT_WIDTHS};
use crate::driver::run_training;
use crate::errors::TuneError;
use crate::eval::{BenchmarkHarness, EvalModel, ProcessHarness, run_benchmarks};
use crate::source::{DatasetLocation, open_source};
use crate::tokenize::{HfPairTokenizer, PromptTemplate};
use crate::trainer::ProcessTrainer;

#[derive(Debug, Parser)]
#[command(
    name = "angle-train",
    disable_help_subcommand = true,
    about = "Fine-tune a sentence-embedding model on query/answer pairs",
    long_about = "Build a shuffled contrastive corpus (one positive and one sampled negative per record), tokenize it, and hand it to an external trainer command. Optionally score the best checkpoint on the retrieval benchmark battery.",
    after_help = "Set RUST_LOG to adjust log verbosity (default: info)."
)]
struct TrainCli {
    #[arg(long = "model-name", default_value = DEFAULT_MODEL_NAME, help = "Backbone model name")]
    model_name: String,
    #[arg(long = "pretrained-model-path", value_name = "PATH", help = "Local backbone weights")]
    pretrained_model_path: Option<PathBuf>,
    #[arg(
        long = "pretrained-lora-path",
        value_name = "PATH",
        help = "Adapter weights to resume from"
    )]
    pretrained_lora_path: Option<PathBuf>,
    #[arg(long = "bellm-class-name", help = "Bidirectional LLM backbone class, e.g. BePhi2Model")]
    backbone_class: Option<String>,
    #[arg(
        long = "train-name-or-path",
        value_name = "PATH_OR_ID",
        help = "Local dataset path or hub dataset id"
    )]
    train_name_or_path: String,
    #[arg(long = "train-subset-name", help = "Hub dataset subset")]
    train_subset_name: Option<String>,
    #[arg(long, value_parser = parse_prompt, help = "Prompt template containing {text}")]
    prompt: Option<PromptTemplate>,
    #[arg(long = "save-dir", default_value = "ckpts", help = "Checkpoint directory")]
    save_dir: PathBuf,
    #[arg(
        long,
        default_value_t = DEFAULT_SEED as i64,
        allow_negative_numbers = true,
        help = "Seed for negative sampling and task order; 0 or negative disables seeding"
    )]
    seed: i64,
    #[arg(long = "dataset-seed", help = "Seed for the validation carve and corpus shuffles")]
    dataset_seed: Option<u64>,
    #[arg(long, help = "Training device, e.g. cuda or cpu")]
    device: Option<String>,
    #[arg(
        long,
        default_value_t = DEFAULT_WORKERS,
        value_parser = parse_positive_usize,
        help = "Tokenization worker threads"
    )]
    workers: usize,
    #[arg(long, default_value_t = 1.0, help = "Cosine objective weight")]
    w1: f32,
    #[arg(long, default_value_t = 35.0, help = "In-batch negative objective weight")]
    w2: f32,
    #[arg(long, default_value_t = 1.0, help = "Angle objective weight")]
    w3: f32,
    #[arg(long = "angle-tau", default_value_t = 1.0)]
    angle_tau: f32,
    #[arg(long = "cosine-tau", default_value_t = 20.0)]
    cosine_tau: f32,
    #[arg(long = "ibn-tau", default_value_t = 20.0)]
    ibn_tau: f32,
    #[arg(long = "is-llm", help = "Backbone is a decoder LLM")]
    is_llm: bool,
    #[arg(long = "apply-lora", help = "Train low-rank adapters instead of full weights")]
    apply_lora: bool,
    #[arg(
        long = "load-kbit",
        value_parser = parse_kbit,
        help = "Quantized loading width (4, 8 or 16)"
    )]
    load_kbit: Option<u8>,
    #[arg(long = "lora-r", default_value_t = 32)]
    lora_r: u32,
    #[arg(long = "lora-alpha", default_value_t = 32)]
    lora_alpha: u32,
    #[arg(long = "lora-dropout", default_value_t = 0.1)]
    lora_dropout: f32,
    #[arg(long = "learning-rate", default_value_t = 1e-5)]
    learning_rate: f64,
    #[arg(long = "start-bilayer-index", help = "First layer made bidirectional in LLM backbones")]
    start_bilayer_index: Option<usize>,
    #[arg(long = "warmup-steps", default_value_t = 100)]
    warmup_steps: usize,
    #[arg(long = "logging-steps", default_value_t = 100, value_parser = parse_positive_usize)]
    logging_steps: usize,
    #[arg(long = "pooling-strategy", value_enum, default_value_t = PoolingStrategy::Cls)]
    pooling_strategy: PoolingStrategy,
    #[arg(long, default_value_t = 10, value_parser = parse_positive_usize)]
    epochs: usize,
    #[arg(long = "save-steps", default_value_t = 1000, value_parser = parse_positive_usize)]
    save_steps: usize,
    #[arg(long = "batch-size", default_value_t = 32, value_parser = parse_positive_usize)]
    batch_size: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_LEN, value_parser = parse_positive_usize)]
    maxlen: usize,
    #[arg(
        long = "gradient-accumulation-steps",
        default_value_t = 1,
        value_parser = parse_positive_usize
    )]
    gradient_accumulation_steps: usize,
    #[arg(long = "torch-dtype", help = "Backbone dtype, e.g. float32 or bfloat16")]
    torch_dtype: Option<String>,
    #[arg(long, value_name = "BOOL", help = "Mixed precision override")]
    fp16: Option<bool>,
    #[arg(long = "push-to-hub", help = "Publish the trained model to the hub")]
    push_to_hub: bool,
    #[arg(long = "hub-model-id", value_name = "ORG/MODEL", help = "Hub publish target")]
    hub_model_id: Option<String>,
    #[arg(
        long = "wandb-api-key",
        help = "Experiment-tracking key; tracking is disabled without it"
    )]
    wandb_api_key: Option<String>,
    #[arg(long = "cache-dir", value_name = "DIR", help = "Hub download cache override")]
    cache_dir: Option<PathBuf>,
    #[arg(
        long = "trainer-command",
        value_name = "COMMAND",
        help = "External trainer command; invoked with --request <fit_request.json>"
    )]
    trainer_command: String,
    #[arg(long = "run-eval", help = "Score the best checkpoint after training")]
    run_eval: bool,
    #[arg(
        long = "evaluator-command",
        value_name = "COMMAND",
        help = "External evaluator command, required with --run-eval"
    )]
    evaluator_command: Option<String>,
}

impl TrainCli {
    fn into_run_config(self) -> Result<RunConfig, TuneError> {
        let hub = HubPublish::from_flags(self.push_to_hub, self.hub_model_id)?;
        let model = ModelConfig {
            model_name: self.model_name,
            pretrained_model_path: self.pretrained_model_path,
            pretrained_lora_path: self.pretrained_lora_path,
            backbone_class: self.backbone_class,
            pooling: self.pooling_strategy,
            max_len: self.maxlen,
            is_llm: self.is_llm,
            apply_lora: self.apply_lora,
            lora: LoraConfig {
                r: self.lora_r,
                alpha: self.lora_alpha,
                dropout: self.lora_dropout,
                target_modules: None,
            },
            load_kbit: self.load_kbit,
            kbit_gradient_checkpointing: None,
            torch_dtype: self.torch_dtype,
            device: self.device,
            start_bilayer_index: self.start_bilayer_index,
        }
        .with_backbone_defaults();

        let data = DataConfig {
            subset: self.train_subset_name,
            prompt: self.prompt,
            workers: self.workers,
            dataset_seed: self.dataset_seed,
            cache_dir: self.cache_dir,
            ..DataConfig::new(self.train_name_or_path)
        };

        let training = TrainingArguments {
            output_dir: self.save_dir.clone(),
            batch_size: self.batch_size,
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            save_steps: self.save_steps,
            warmup_steps: self.warmup_steps,
            logging_steps: self.logging_steps,
            gradient_accumulation_steps: self.gradient_accumulation_steps,
            loss: LossConfig {
                w1: self.w1,
                w2: self.w2,
                w3: self.w3,
                cosine_tau: self.cosine_tau,
                ibn_tau: self.ibn_tau,
                angle_tau: self.angle_tau,
            },
            fp16: self.fp16,
            hub,
        };

        // Post-train scoring embeds with the training batch size and
        // instructs every task.
        let eval = self.run_eval.then(|| EvalConfig {
            results_root: self.save_dir,
            pooling: self.pooling_strategy,
            batch_size: self.batch_size,
            instructions: InstructionPolicy::AllTasks,
            ..EvalConfig::default()
        });

        let config = RunConfig {
            seed: seed_from_flag(self.seed),
            model,
            data,
            training,
            eval,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "angle-eval",
    disable_help_subcommand = true,
    about = "Score an embedding model on the retrieval benchmark battery",
    after_help = "Results land in <results-root>/mteb_results/en/<model name>."
)]
struct EvalCli {
    #[arg(long = "model-name-or-path", help = "Base model name or path")]
    model_name_or_path: String,
    #[arg(long = "lora-name-or-path", value_name = "PATH", help = "Adapter checkpoint to apply")]
    lora_name_or_path: Option<PathBuf>,
    #[arg(long = "pooling-strategy", value_enum, default_value_t = PoolingStrategy::Cls)]
    pooling_strategy: PoolingStrategy,
    #[arg(
        long = "batch-size",
        default_value_t = DEFAULT_EVAL_BATCH_SIZE,
        value_parser = parse_positive_usize
    )]
    batch_size: usize,
    #[arg(long, default_value_t = DEFAULT_SEED as i64, allow_negative_numbers = true)]
    seed: i64,
    #[arg(long = "results-root", default_value = ".", value_name = "DIR")]
    results_root: PathBuf,
    #[arg(long = "evaluator-command", value_name = "COMMAND")]
    evaluator_command: String,
}

impl EvalCli {
    fn eval_config(&self) -> EvalConfig {
        EvalConfig {
            results_root: self.results_root.clone(),
            pooling: self.pooling_strategy,
            batch_size: self.batch_size,
            instructions: InstructionPolicy::PerTask,
            ..EvalConfig::default()
        }
    }
}

/// Install the `RUST_LOG`-driven subscriber used by the binaries.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run_train<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) =
        parse_cli::<TrainCli, _>(std::iter::once("angle-train".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let wandb_api_key = cli.wandb_api_key.clone();
    let trainer_command = split_command(&cli.trainer_command);
    let harness = match (cli.run_eval, cli.evaluator_command.as_deref()) {
        (false, _) => None,
        (true, Some(command)) => Some(ProcessHarness::new(split_command(command))?),
        (true, None) => {
            return Err(TuneError::Configuration(
                "--run-eval requires --evaluator-command".to_string(),
            )
            .into());
        }
    };
    let config = cli.into_run_config()?;

    let location =
        DatasetLocation::resolve(&config.data.name_or_path, config.data.subset.as_deref());
    let source = open_source(&location, config.data.cache_dir.as_deref())?;
    let tokenizer = HfPairTokenizer::from_pretrained(&config.model.base_model())?;
    let trainer = ProcessTrainer::new(trainer_command, Box::new(tokenizer))?
        .with_wandb_api_key(wandb_api_key);

    let outcome = run_training(
        &config,
        source.as_ref(),
        &trainer,
        harness.as_ref().map(|harness| harness as &dyn BenchmarkHarness),
    )?;

    println!("=== training ===");
    println!("checkpoint: {}", outcome.model.checkpoint_dir.display());
    println!(
        "train pairs: {} | validation pairs: {}{}",
        outcome.corpora.train.len(),
        outcome.corpora.validation.len(),
        if outcome.corpora.carved_validation {
            " (validation carved from train)"
        } else {
            ""
        }
    );
    if let Some(report) = outcome.scores {
        println!("=== benchmarks ===");
        println!("model: {} | tasks: {}", report.model, report.tasks.len());
    }
    Ok(())
}

pub fn run_eval<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) =
        parse_cli::<EvalCli, _>(std::iter::once("angle-eval".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let config = cli.eval_config();
    let harness = ProcessHarness::new(split_command(&cli.evaluator_command))?;
    let model = EvalModel::new(&cli.model_name_or_path, cli.lora_name_or_path, &config);
    let report = run_benchmarks(&harness, &model, &config, seed_from_flag(cli.seed))?;

    println!("=== benchmarks ===");
    println!("model: {}", report.model);
    for (task, outcome) in &report.tasks {
        println!("{task} [{}]", outcome.split);
    }
    Ok(())
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_kbit(raw: &str) -> Result<u8, String> {
    let bits = raw
        .parse::<u8>()
        .map_err(|_| format!("Could not parse --load-kbit value '{raw}'"))?;
    if !KBIT_WIDTHS.contains(&bits) {
        return Err(format!("--load-kbit must be one of {KBIT_WIDTHS:?}"));
    }
    Ok(bits)
}

fn parse_prompt(raw: &str) -> Result<PromptTemplate, String> {
    PromptTemplate::parse(raw).map_err(|err| err.to_string())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_cli(extra: &[&str]) -> Result<TrainCli, clap::Error> {
        let base = [
            "angle-train",
            "--train-name-or-path",
            "data/qa.jsonl",
            "--trainer-command",
            "python fit.py",
        ];
        TrainCli::try_parse_from(base.iter().chain(extra.iter()))
    }

    #[test]
    fn train_defaults_match_reference_run() {
        let config = train_cli(&[]).expect("cli").into_run_config().expect("config");
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.data.workers, 25);
        assert_eq!(config.model.model_name, "roberta-large");
        assert_eq!(config.training.output_dir, PathBuf::from("ckpts"));
        assert_eq!(config.training.loss.w2, 35.0);
        assert!(config.training.hub.is_none());
        assert!(config.eval.is_none());
    }

    #[test]
    fn push_to_hub_without_target_fails_before_training() {
        let err = train_cli(&["--push-to-hub"])
            .expect("cli")
            .into_run_config()
            .unwrap_err();
        assert!(matches!(err, TuneError::Configuration(_)));

        let config = train_cli(&["--push-to-hub", "--hub-model-id", "org/model"])
            .expect("cli")
            .into_run_config()
            .expect("config");
        assert_eq!(
            config.training.hub.map(|hub| hub.model_id),
            Some("org/model".to_string())
        );
    }

    #[test]
    fn seed_zero_or_negative_disables_seeding() {
        for flag in ["0", "-5"] {
            let config = train_cli(&["--seed", flag])
                .expect("cli")
                .into_run_config()
                .expect("config");
            assert_eq!(config.seed, None);
        }
    }

    #[test]
    fn invalid_flags_are_rejected_by_the_parser() {
        assert!(train_cli(&["--workers", "0"]).is_err());
        assert!(train_cli(&["--load-kbit", "3"]).is_err());
        assert!(train_cli(&["--prompt", "no placeholder"]).is_err());
        assert!(train_cli(&["--pooling-strategy", "max"]).is_err());
    }

    #[test]
    fn phi2_backbone_defaults_flow_into_config() {
        let config = train_cli(&["--bellm-class-name", "BePhi2Model", "--apply-lora"])
            .expect("cli")
            .into_run_config()
            .expect("config");
        assert_eq!(
            config.model.lora.target_modules,
            Some(vec!["fc2".to_string(), "Wqkv".to_string(), "fc1".to_string()])
        );
    }

    #[test]
    fn run_eval_targets_the_save_dir() {
        let config = train_cli(&[
            "--run-eval",
            "--save-dir",
            "runs/a",
            "--pooling-strategy",
            "first_last_avg",
            "--batch-size",
            "16",
        ])
        .expect("cli")
        .into_run_config()
        .expect("config");
        let eval = config.eval.expect("eval");
        assert_eq!(eval.results_root, PathBuf::from("runs/a"));
        assert_eq!(eval.pooling, PoolingStrategy::FirstLastAvg);
        assert_eq!(eval.batch_size, config.training.batch_size);
        assert_eq!(eval.batch_size, 16);
        assert_eq!(eval.instructions, InstructionPolicy::AllTasks);
    }


    #[test]
    fn eval_cli_parses_defaults() {
        let cli = EvalCli::try_parse_from([
            "angle-eval",
            "--model-name-or-path",
            "roberta-large",
            "--evaluator-command",
            "python mteb_task.py",
        ])
        .expect("cli");
        assert_eq!(cli.batch_size, 300);
        assert_eq!(cli.pooling_strategy, PoolingStrategy::Cls);
        let config = cli.eval_config();
        assert_eq!(config.instructions, InstructionPolicy::PerTask);
        assert_eq!(config.batch_size, 300);
        assert_eq!(split_command(&cli.evaluator_command), vec!["python", "mteb_task.py"]);
    }
}
