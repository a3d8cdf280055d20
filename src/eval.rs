//! Retrieval benchmark plan and score reporting.
//!
//! Scoring itself belongs to an external harness. This module decides which
//! tasks run, on which split, in which order, and where their results land.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::config::{EvalConfig, InstructionPolicy, PoolingStrategy};
use crate::constants::eval::{
    BENCHMARK_TASKS, DEV_SPLIT, DEV_SPLIT_TASKS, MODEL_SETTINGS_FILENAME, RESULTS_LANGUAGE,
    RESULTS_SUBDIR, RETRIEVAL_INSTRUCTION, SCORE_REPORT_FILENAME, SKIPPED_TASKS, TEST_SPLIT,
};
use crate::constants::seeds::TASK_ORDER_LABEL;
use crate::errors::TuneError;
use crate::rng::DeterministicRng;
use crate::trainer::ModelHandle;
use crate::types::{ModelName, TaskName};

/// One scheduled benchmark task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: TaskName,
    /// Evaluation split (`test`, or `dev` for MSMARCO).
    pub split: String,
    /// Query instruction for retrieval tasks.
    pub instruction: Option<String>,
}

impl TaskSpec {
    pub fn for_task(name: &str, instructions: InstructionPolicy) -> Self {
        let split = if DEV_SPLIT_TASKS.contains(&name) {
            DEV_SPLIT
        } else {
            TEST_SPLIT
        };
        Self {
            name: name.to_string(),
            split: split.to_string(),
            instruction: instructions
                .applies_to(name)
                .then(|| RETRIEVAL_INSTRUCTION.to_string()),
        }
    }
}

/// Every benchmark task except the skipped ones, in seeded random order.
pub fn benchmark_plan(seed: Option<u64>, instructions: InstructionPolicy) -> Vec<TaskSpec> {
    let mut plan: Vec<TaskSpec> = BENCHMARK_TASKS
        .iter()
        .filter(|name| !SKIPPED_TASKS.contains(*name))
        .map(|name| TaskSpec::for_task(name, instructions))
        .collect();
    let mut rng = DeterministicRng::derived(seed, TASK_ORDER_LABEL);
    plan.shuffle(&mut rng);
    plan
}

/// Embedding model as the harness sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalModel {
    /// Keys the results folder.
    pub name: ModelName,
    pub base_model: ModelName,
    /// Adapter checkpoint applied on top of the base model.
    pub checkpoint_dir: Option<PathBuf>,
    pub pooling: PoolingStrategy,
    pub batch_size: usize,
    pub normalize_embeddings: bool,
}

impl EvalModel {
    /// Model named after the checkpoint directory, or the base model when
    /// no checkpoint is given.
    pub fn new(base_model: &str, checkpoint_dir: Option<PathBuf>, config: &EvalConfig) -> Self {
        let name = checkpoint_dir
            .as_deref()
            .and_then(Path::file_name)
            .or_else(|| Path::new(base_model).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| base_model.to_string());
        Self {
            name,
            base_model: base_model.to_string(),
            checkpoint_dir,
            pooling: config.pooling,
            batch_size: config.batch_size,
            normalize_embeddings: config.normalize_embeddings,
        }
    }

    pub fn from_handle(handle: &ModelHandle, config: &EvalConfig) -> Self {
        Self {
            name: handle.name.clone(),
            ..Self::new(&handle.base_model, Some(handle.checkpoint_dir.clone()), config)
        }
    }
}

/// Result of one benchmark task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: TaskName,
    pub split: String,
    /// Harness-defined score payload, kept verbatim.
    pub scores: Value,
}

/// Benchmark harness collaborator.
pub trait BenchmarkHarness {
    fn run_task(
        &self,
        model: &EvalModel,
        task: &TaskSpec,
        output_folder: &Path,
    ) -> Result<TaskOutcome, TuneError>;
}

/// Harness that runs an external evaluator command once per task.
///
/// The command receives `--task`, `--split`, `--output-folder`,
/// `--model-settings` and, for instructed tasks, `--instruction`. It must
/// write `<output-folder>/<task>.json`.
#[derive(Clone, Debug)]
pub struct ProcessHarness {
    program: String,
    args: Vec<String>,
}

impl ProcessHarness {
    /// `command` is the program followed by its fixed arguments.
    pub fn new(command: Vec<String>) -> Result<Self, TuneError> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|program| !program.trim().is_empty())
            .ok_or_else(|| {
                TuneError::Configuration("evaluator command must not be empty".to_string())
            })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl BenchmarkHarness for ProcessHarness {
    fn run_task(
        &self,
        model: &EvalModel,
        task: &TaskSpec,
        output_folder: &Path,
    ) -> Result<TaskOutcome, TuneError> {
        let settings_path = output_folder.join(MODEL_SETTINGS_FILENAME);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&settings_path)?), model)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--task")
            .arg(&task.name)
            .arg("--split")
            .arg(&task.split)
            .arg("--output-folder")
            .arg(output_folder)
            .arg("--model-settings")
            .arg(&settings_path);
        if let Some(instruction) = &task.instruction {
            command.arg("--instruction").arg(instruction);
        }
        let status = command.status().map_err(|err| {
            TuneError::Evaluation(format!("failed launching '{}': {err}", self.program))
        })?;
        if !status.success() {
            return Err(TuneError::Evaluation(format!(
                "'{}' exited with {status} on task {}",
                self.program, task.name
            )));
        }
        read_task_scores(task, output_folder)
    }
}

/// Read the scores a harness wrote for `task`.
pub fn read_task_scores(task: &TaskSpec, output_folder: &Path) -> Result<TaskOutcome, TuneError> {
    let path = output_folder.join(format!("{}.json", task.name));
    let raw = fs::read_to_string(&path).map_err(|err| {
        TuneError::Evaluation(format!(
            "missing results for task {} at {}: {err}",
            task.name,
            path.display()
        ))
    })?;
    Ok(TaskOutcome {
        task: task.name.clone(),
        split: task.split.clone(),
        scores: serde_json::from_str(&raw)?,
    })
}

/// Aggregated benchmark results for one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub model: ModelName,
    pub evaluated_at: DateTime<Utc>,
    /// Outcomes keyed by task name, in execution order.
    pub tasks: IndexMap<TaskName, TaskOutcome>,
}

impl ScoreReport {
    pub fn new(model: impl Into<ModelName>) -> Self {
        Self {
            model: model.into(),
            evaluated_at: Utc::now(),
            tasks: IndexMap::new(),
        }
    }

    /// Write `score_report.json` into `folder`.
    pub fn write_to(&self, folder: &Path) -> Result<PathBuf, TuneError> {
        let path = folder.join(SCORE_REPORT_FILENAME);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), self)?;
        Ok(path)
    }
}

/// `<root>/mteb_results/en/<model name>`.
pub fn results_folder(root: &Path, model_name: &str) -> PathBuf {
    root.join(RESULTS_SUBDIR)
        .join(RESULTS_LANGUAGE)
        .join(model_name)
}

/// Run the full plan and persist the aggregated report.
pub fn run_benchmarks<H>(
    harness: &H,
    model: &EvalModel,
    config: &EvalConfig,
    seed: Option<u64>,
) -> Result<ScoreReport, TuneError>
where
    H: BenchmarkHarness + ?Sized,
{
    config.validate()?;
    let output_folder = results_folder(&config.results_root, &model.name);
    fs::create_dir_all(&output_folder)?;

    let plan = benchmark_plan(seed, config.instructions);
    let mut report = ScoreReport::new(model.name.clone());
    for task in &plan {
        info!(
            task = %task.name,
            split = %task.split,
            model = %model.name,
            "running benchmark task"
        );
        let outcome = harness.run_task(model, task, &output_folder)?;
        report.tasks.insert(task.name.clone(), outcome);
    }
    report.evaluated_at = Utc::now();
    let path = report.write_to(&output_folder)?;
    info!(tasks = report.tasks.len(), report = %path.display(), "benchmarks finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct RecordingHarness {
        seen: RefCell<Vec<TaskSpec>>,
    }

    impl BenchmarkHarness for RecordingHarness {
        fn run_task(
            &self,
            _model: &EvalModel,
            task: &TaskSpec,
            output_folder: &Path,
        ) -> Result<TaskOutcome, TuneError> {
            assert!(output_folder.is_dir());
            self.seen.borrow_mut().push(task.clone());
            Ok(TaskOutcome {
                task: task.name.clone(),
                split: task.split.clone(),
                scores: json!({ "ndcg_at_10": 0.5 }),
            })
        }
    }

    #[test]
    fn plan_covers_every_task_with_expected_splits() {
        let plan = benchmark_plan(Some(42), InstructionPolicy::AllTasks);
        assert_eq!(plan.len(), 15);
        assert!(plan.iter().all(|task| task.name != "MSMARCOv2"));
        for task in &plan {
            let expected = if task.name == "MSMARCO" { "dev" } else { "test" };
            assert_eq!(task.split, expected, "task {}", task.name);
            assert_eq!(task.instruction.as_deref(), Some(RETRIEVAL_INSTRUCTION));
        }
        let mut names: Vec<&str> = plan.iter().map(|task| task.name.as_str()).collect();
        names.sort_unstable();
        let mut expected: Vec<&str> = BENCHMARK_TASKS.to_vec();
        expected.sort_unstable();
        assert_eq!(names, expected);
    }

    #[test]
    fn plan_order_is_seed_deterministic() {
        assert_eq!(
            benchmark_plan(Some(7), InstructionPolicy::default()),
            benchmark_plan(Some(7), InstructionPolicy::default())
        );
        assert!(
            benchmark_plan(Some(7), EvalConfig::default().instructions)
                .iter()
                .all(|task| task.instruction.as_deref() == Some(RETRIEVAL_INSTRUCTION))
        );
    }

    #[test]
    fn per_task_plan_leaves_symmetric_tasks_uninstructed() {
        let plan = benchmark_plan(Some(42), InstructionPolicy::PerTask);
        assert_eq!(plan.len(), 15);
        for task in &plan {
            let symmetric = task.name == "ArguAna" || task.name == "QuoraRetrieval";
            assert_eq!(task.instruction.is_none(), symmetric, "task {}", task.name);
        }
        let order = |plan: &[TaskSpec]| plan.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
        assert_eq!(
            order(&plan),
            order(&benchmark_plan(Some(42), InstructionPolicy::AllTasks))
        );
    }

    #[test]
    fn results_folder_is_keyed_by_model_name() {
        assert_eq!(
            results_folder(Path::new("/runs"), "best-checkpoint"),
            PathBuf::from("/runs/mteb_results/en/best-checkpoint")
        );
    }

    #[test]
    fn eval_model_name_prefers_checkpoint_dir() {
        let config = EvalConfig::default();
        let with_ckpt = EvalModel::new(
            "roberta-large",
            Some(PathBuf::from("ckpts/best-checkpoint")),
            &config,
        );
        assert_eq!(with_ckpt.name, "best-checkpoint");
        assert!(!with_ckpt.normalize_embeddings);
        assert_eq!(with_ckpt.batch_size, 300);

        let bare = EvalModel::new("models/phi-2", None, &config);
        assert_eq!(bare.name, "phi-2");
    }

    #[test]
    fn run_benchmarks_writes_report_in_plan_order() {
        let dir = tempdir().expect("tempdir");
        let config = EvalConfig {
            results_root: dir.path().to_path_buf(),
            ..EvalConfig::default()
        };
        let model = EvalModel::new("roberta-large", Some(PathBuf::from("x/ckpt")), &config);
        let harness = RecordingHarness {
            seen: RefCell::new(Vec::new()),
        };

        let report = run_benchmarks(&harness, &model, &config, Some(42)).expect("run");
        let seen = harness.seen.into_inner();
        assert_eq!(seen, benchmark_plan(Some(42), InstructionPolicy::AllTasks));
        assert_eq!(
            report.tasks.keys().cloned().collect::<Vec<_>>(),
            seen.iter().map(|task| task.name.clone()).collect::<Vec<_>>()
        );

        let written = dir
            .path()
            .join("mteb_results/en/ckpt")
            .join(SCORE_REPORT_FILENAME);
        let parsed: ScoreReport =
            serde_json::from_str(&fs::read_to_string(written).expect("read")).expect("json");
        assert_eq!(parsed.tasks.len(), 15);
        assert_eq!(parsed.model, "ckpt");
    }

    #[test]
    fn missing_task_results_are_evaluation_errors() {
        let dir = tempdir().expect("tempdir");
        let task = TaskSpec::for_task("NQ", InstructionPolicy::PerTask);
        let err = read_task_scores(&task, dir.path()).unwrap_err();
        assert!(matches!(err, TuneError::Evaluation(_)));

        fs::write(dir.path().join("NQ.json"), r#"{"test": {"ndcg_at_10": 0.41}}"#).expect("write");
        let outcome = read_task_scores(&task, dir.path()).expect("scores");
        assert_eq!(outcome.scores["test"]["ndcg_at_10"], json!(0.41));
    }

    #[test]
    fn empty_evaluator_command_is_rejected() {
        assert!(ProcessHarness::new(Vec::new()).is_err());
    }
}
