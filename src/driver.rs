//! Train-then-evaluate sequencing.

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::constants::seeds::{CORPUS_SHUFFLE_LABEL, NEGATIVE_SAMPLING_LABEL};
use crate::data::{DatasetSplits, Pair};
use crate::errors::TuneError;
use crate::eval::{BenchmarkHarness, EvalModel, ScoreReport, run_benchmarks};
use crate::metrics::{CorpusBalance, corpus_balance};
use crate::pairs::PairBuilder;
use crate::rng::derive_seed;
use crate::source::RecordSource;
use crate::splits::{SplitLabel, ensure_validation};
use crate::tokenize::{EncodedPair, PairTokenizer, TokenizeOptions, tokenize_corpus};
use crate::trainer::{EmbeddingTrainer, FitRequest, ModelHandle};

/// Encoded corpora for both splits plus their balance stats.
#[derive(Clone, Debug)]
pub struct PreparedCorpora {
    pub train: Vec<EncodedPair>,
    pub validation: Vec<EncodedPair>,
    pub train_balance: Option<CorpusBalance>,
    pub validation_balance: Option<CorpusBalance>,
    /// Whether validation was carved out of train.
    pub carved_validation: bool,
}

/// What a finished run produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub model: ModelHandle,
    pub corpora: PreparedCorpora,
    pub scores: Option<ScoreReport>,
}

/// Pair builder for one split; negatives and shuffle draw from independent
/// per-split streams.
pub fn pair_builder_for(config: &RunConfig, split: SplitLabel) -> PairBuilder {
    PairBuilder::new(
        derive_seed(config.seed, &format!("{NEGATIVE_SAMPLING_LABEL}|{split}")),
        derive_seed(
            config.data.dataset_seed,
            &format!("{CORPUS_SHUFFLE_LABEL}|{split}"),
        ),
    )
}

/// Build the shuffled pair corpus for every split.
pub fn build_split_pairs(
    config: &RunConfig,
    splits: DatasetSplits,
) -> Result<(Vec<Pair>, Vec<Pair>, bool), TuneError> {
    let splits = ensure_validation(splits, config.data.dataset_seed)?;
    let train = pair_builder_for(config, SplitLabel::Train).build(&splits.train)?;
    let validation =
        pair_builder_for(config, SplitLabel::Validation).build(&splits.validation)?;
    Ok((train, validation, splits.carved))
}

/// Build and tokenize both corpora.
pub fn prepare_corpora<T>(
    config: &RunConfig,
    splits: DatasetSplits,
    tokenizer: &T,
) -> Result<PreparedCorpora, TuneError>
where
    T: PairTokenizer + ?Sized,
{
    let (train_pairs, validation_pairs, carved_validation) = build_split_pairs(config, splits)?;
    let options = TokenizeOptions {
        max_len: config.model.max_len,
        prompt: config.data.prompt.clone(),
        workers: config.data.workers,
    };
    let train = tokenize_corpus(tokenizer, &train_pairs, &options)?;
    let validation = tokenize_corpus(tokenizer, &validation_pairs, &options)?;
    let corpora = PreparedCorpora {
        train,
        validation,
        train_balance: corpus_balance(&train_pairs),
        validation_balance: corpus_balance(&validation_pairs),
        carved_validation,
    };
    log_balance(SplitLabel::Train, corpora.train_balance.as_ref());
    log_balance(SplitLabel::Validation, corpora.validation_balance.as_ref());
    Ok(corpora)
}

fn log_balance(split: SplitLabel, balance: Option<&CorpusBalance>) {
    match balance {
        Some(balance) => info!(
            split = %split,
            pairs = balance.total,
            positives = balance.positives,
            negatives = balance.negatives,
            distinct_queries = balance.distinct_queries,
            distinct_answers = balance.distinct_answers,
            "contrastive corpus ready"
        ),
        None => warn!(split = %split, "contrastive corpus is empty"),
    }
}

/// Run the whole pipeline: load, pair, tokenize, fit, then optionally score.
///
/// Every configuration precondition is checked before the dataset is
/// touched. A configured evaluation without a harness is rejected up front.
pub fn run_training<S, T>(
    config: &RunConfig,
    source: &S,
    trainer: &T,
    harness: Option<&dyn BenchmarkHarness>,
) -> Result<RunOutcome, TuneError>
where
    S: RecordSource + ?Sized,
    T: EmbeddingTrainer + ?Sized,
{
    config.validate()?;
    if config.eval.is_some() && harness.is_none() {
        return Err(TuneError::Configuration(
            "evaluation is enabled but no benchmark harness is configured".to_string(),
        ));
    }

    info!(
        source_id = %source.id(),
        seed = ?config.seed,
        dataset_seed = ?config.data.dataset_seed,
        "loading dataset"
    );
    let splits = source.load()?;
    info!(
        source_id = %source.id(),
        records = splits.total_records(),
        shipped_validation = splits.validation.is_some(),
        "dataset loaded"
    );
    let corpora = prepare_corpora(config, splits, trainer.tokenizer())?;

    let model_config = config.model.clone().with_backbone_defaults();
    let request = FitRequest {
        model: &model_config,
        train: &corpora.train,
        validation: &corpora.validation,
        args: &config.training,
    };
    let model = trainer.fit(&request)?;
    info!(
        model = %model.name,
        checkpoint = %model.checkpoint_dir.display(),
        "training finished"
    );

    let scores = match (&config.eval, harness) {
        (Some(eval), Some(harness)) => {
            let eval_model = EvalModel::from_handle(&model, eval);
            Some(run_benchmarks(harness, &eval_model, eval, config.seed)?)
        }
        _ => None,
    };
    Ok(RunOutcome {
        model,
        corpora,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::data::Record;

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|idx| Record::new(format!("q{idx}"), format!("a{idx}")))
            .collect()
    }

    fn config(seed: Option<u64>, dataset_seed: Option<u64>) -> RunConfig {
        let mut data = DataConfig::new("unused");
        data.dataset_seed = dataset_seed;
        RunConfig {
            seed,
            ..RunConfig::new(data)
        }
    }

    #[test]
    fn split_builders_use_independent_streams() {
        let seeded = config(Some(42), Some(7));
        let train = pair_builder_for(&seeded, SplitLabel::Train);
        let validation = pair_builder_for(&seeded, SplitLabel::Validation);
        assert_ne!(train.sampling_seed, validation.sampling_seed);
        assert_ne!(train.shuffle_seed, validation.shuffle_seed);
        assert!(train.sampling_seed.is_some());

        let unseeded = pair_builder_for(&config(None, None), SplitLabel::Train);
        assert_eq!(unseeded, PairBuilder::new(None, None));
    }

    #[test]
    fn missing_validation_is_carved_before_pairing() {
        let splits = DatasetSplits {
            train: records(10),
            validation: None,
        };
        let (train, validation, carved) =
            build_split_pairs(&config(Some(42), Some(3)), splits).expect("pairs");
        assert!(carved);
        assert_eq!(train.len(), 16);
        assert_eq!(validation.len(), 4);
    }

    #[test]
    fn validation_negatives_come_from_validation_records() {
        let splits = DatasetSplits {
            train: records(6),
            validation: Some(vec![Record::new("vq1", "va1"), Record::new("vq2", "va2")]),
        };
        let (_, validation, carved) =
            build_split_pairs(&config(Some(1), Some(1)), splits).expect("pairs");
        assert!(!carved);
        assert!(validation.iter().all(|pair| pair.text2.starts_with("va")));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let build = || {
            build_split_pairs(
                &config(Some(42), Some(9)),
                DatasetSplits {
                    train: records(25),
                    validation: None,
                },
            )
            .expect("pairs")
        };
        assert_eq!(build(), build());
    }
}
