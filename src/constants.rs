/// Constants used by seed derivation.
pub mod seeds {
    /// Golden-ratio increment of the splitmix64 generator.
    pub const SPLITMIX_INCREMENT: u64 = 0x9E3779B97F4A7C15;
    /// Default run seed applied when the caller does not override it.
    pub const DEFAULT_SEED: u64 = 42;
    /// Label mixed into the run seed for per-split negative sampling.
    pub const NEGATIVE_SAMPLING_LABEL: &str = "negative_sampling";
    /// Label mixed into the dataset seed for per-split corpus shuffles.
    pub const CORPUS_SHUFFLE_LABEL: &str = "corpus_shuffle";
    /// Label mixed into the run seed for benchmark task ordering.
    pub const TASK_ORDER_LABEL: &str = "benchmark_task_order";
}

/// Constants used by split carving and split-name resolution.
pub mod splits {
    /// Fraction of the train split carved out for validation when none exists.
    pub const VALIDATION_FRACTION: f64 = 0.2;
    /// Canonical train split name.
    pub const TRAIN_SPLIT: &str = "train";
    /// Canonical validation split name.
    pub const VALIDATION_SPLIT: &str = "validation";
    /// File-name tokens that identify validation shards.
    pub const VALIDATION_ALIASES: [&str; 3] = ["validation", "valid", "dev"];
}

/// Constants used by record loading.
pub mod source {
    /// Field holding the query text of a record.
    pub const QUERY_FIELD: &str = "query";
    /// Field holding the answer text of a record.
    pub const ANSWER_FIELD: &str = "answer";
    /// File extensions accepted as record shards.
    pub const SHARD_EXTENSIONS: [&str; 4] = ["json", "jsonl", "ndjson", "parquet"];
    /// Retry budget handed to the hub client.
    pub const HUB_RETRIES: usize = 5;
}

/// Constants used by the tokenizer hand-off.
pub mod tokenize {
    /// Placeholder substituted with pair text inside prompt templates.
    pub const PROMPT_PLACEHOLDER: &str = "{text}";
    /// Default maximum token length per text.
    pub const DEFAULT_MAX_LEN: usize = 512;
    /// Default tokenization worker count.
    pub const DEFAULT_WORKERS: usize = 25;
    /// File name probed inside model directories.
    pub const TOKENIZER_FILENAME: &str = "tokenizer.json";
}

/// Constants used by training configuration and the trainer hand-off.
pub mod training {
    /// Default backbone name.
    pub const DEFAULT_MODEL_NAME: &str = "roberta-large";
    /// Backbone class that needs explicit adapter targets.
    pub const BEPHI2_CLASS_NAME: &str = "BePhi2Model";
    /// Adapter target modules used for the Phi-2 backbone.
    pub const BEPHI2_TARGET_MODULES: [&str; 3] = ["fc2", "Wqkv", "fc1"];
    /// Directory under the output dir holding the best checkpoint.
    pub const BEST_CHECKPOINT_DIR: &str = "best-checkpoint";
    /// Materialized train corpus file name.
    pub const TRAIN_CORPUS_FILENAME: &str = "train.jsonl";
    /// Materialized validation corpus file name.
    pub const VALIDATION_CORPUS_FILENAME: &str = "validation.jsonl";
    /// Serialized fit request file name.
    pub const FIT_REQUEST_FILENAME: &str = "fit_request.json";
    /// Flag passed to the external trainer command.
    pub const REQUEST_FLAG: &str = "--request";
    /// Environment variable carrying the experiment-tracking key.
    pub const WANDB_API_KEY_ENV: &str = "WANDB_API_KEY";
    /// Environment variable disabling experiment tracking.
    pub const WANDB_DISABLED_ENV: &str = "WANDB_DISABLED";
    /// Quantization widths accepted for k-bit loading.
    pub const KBIT_WIDTHS: [u8; 3] = [4, 8, 16];
}

/// Constants used by the benchmark plan and score reporting.
pub mod eval {
    /// Retrieval benchmark battery run after training.
    pub const BENCHMARK_TASKS: [&str; 15] = [
        "ArguAna",
        "ClimateFEVER",
        "CQADupstackRetrieval",
        "DBPedia",
        "FEVER",
        "FiQA2018",
        "HotpotQA",
        "MSMARCO",
        "NFCorpus",
        "NQ",
        "QuoraRetrieval",
        "SCIDOCS",
        "SciFact",
        "Touche2020",
        "TRECCOVID",
    ];
    /// Tasks never scheduled because they have no test split.
    pub const SKIPPED_TASKS: [&str; 1] = ["MSMARCOv2"];
    /// Tasks scored on `dev` instead of `test`.
    pub const DEV_SPLIT_TASKS: [&str; 1] = ["MSMARCO"];
    /// Tasks scored without a query instruction by the standalone evaluator.
    pub const UNINSTRUCTED_TASKS: [&str; 2] = ["ArguAna", "QuoraRetrieval"];
    /// Default evaluation split.
    pub const TEST_SPLIT: &str = "test";
    /// Evaluation split for tasks listed in `DEV_SPLIT_TASKS`.
    pub const DEV_SPLIT: &str = "dev";
    /// Instruction prepended to retrieval queries.
    pub const RETRIEVAL_INSTRUCTION: &str =
        "Represent this sentence for searching relevant passages: ";
    /// Results directory under the results root.
    pub const RESULTS_SUBDIR: &str = "mteb_results";
    /// Language directory under the results subdir.
    pub const RESULTS_LANGUAGE: &str = "en";
    /// Aggregated report file name written into the model's results folder.
    pub const SCORE_REPORT_FILENAME: &str = "score_report.json";
    /// Default embedding batch size for evaluation runs.
    pub const DEFAULT_EVAL_BATCH_SIZE: usize = 300;
    /// Embedding-model settings file handed to the evaluator command.
    pub const MODEL_SETTINGS_FILENAME: &str = "model_settings.json";
}
