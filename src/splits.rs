use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::constants::splits::{
    TRAIN_SPLIT, VALIDATION_ALIASES, VALIDATION_FRACTION, VALIDATION_SPLIT,
};
use crate::data::{DatasetSplits, Record};
use crate::errors::TuneError;
use crate::rng::DeterministicRng;

/// Logical dataset partitions used during training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
}

impl SplitLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => TRAIN_SPLIT,
            SplitLabel::Validation => VALIDATION_SPLIT,
        }
    }

    /// Resolve a raw split name (`train`, `validation`, `valid`, `dev`).
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered == TRAIN_SPLIT {
            return Some(SplitLabel::Train);
        }
        VALIDATION_ALIASES
            .iter()
            .any(|alias| *alias == lowered)
            .then_some(SplitLabel::Validation)
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Train and validation records ready for pair construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainValidation {
    pub train: Vec<Record>,
    pub validation: Vec<Record>,
    /// True when validation was carved out of train rather than shipped.
    pub carved: bool,
}

impl TrainValidation {
    pub fn records(&self, label: SplitLabel) -> &[Record] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
        }
    }
}

/// Return `(train, validation)` sizes for carving `fraction` of `total`.
///
/// Validation gets `ceil(total * fraction)`; train keeps the rest.
pub fn split_counts(total: usize, fraction: f64) -> (usize, usize) {
    let validation = ((total as f64) * fraction).ceil() as usize;
    let validation = validation.min(total);
    (total - validation, validation)
}

/// Carve a validation split out of `records` with a seeded permutation.
pub fn carve_validation(
    records: Vec<Record>,
    fraction: f64,
    seed: Option<u64>,
) -> Result<(Vec<Record>, Vec<Record>), TuneError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(TuneError::Configuration(format!(
            "validation fraction must be within (0, 1), got {fraction}"
        )));
    }
    let total = records.len();
    let (train_count, validation_count) = split_counts(total, fraction);
    if train_count == 0 || validation_count == 0 {
        return Err(TuneError::Configuration(format!(
            "cannot carve a {fraction} validation split from {total} records: \
             train would hold {train_count} and validation {validation_count}"
        )));
    }

    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = DeterministicRng::from_optional_seed(seed);
    order.shuffle(&mut rng);

    let mut slots: Vec<Option<Record>> = records.into_iter().map(Some).collect();
    let mut train = Vec::with_capacity(train_count);
    let mut validation = Vec::with_capacity(validation_count);
    for (position, idx) in order.into_iter().enumerate() {
        let Some(record) = slots[idx].take() else {
            continue;
        };
        if position < train_count {
            train.push(record);
        } else {
            validation.push(record);
        }
    }
    Ok((train, validation))
}

/// Use the shipped validation split, or carve 20% of train when absent.
pub fn ensure_validation(
    splits: DatasetSplits,
    seed: Option<u64>,
) -> Result<TrainValidation, TuneError> {
    match splits.validation {
        Some(validation) => Ok(TrainValidation {
            train: splits.train,
            validation,
            carved: false,
        }),
        None => {
            let total = splits.train.len();
            let (train, validation) = carve_validation(splits.train, VALIDATION_FRACTION, seed)?;
            info!(
                total,
                train = train.len(),
                validation = validation.len(),
                seeded = seed.is_some(),
                "carved validation split from train"
            );
            Ok(TrainValidation {
                train,
                validation,
                carved: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|idx| Record::new(format!("q{idx}"), format!("a{idx}")))
            .collect()
    }

    #[test]
    fn split_counts_round_validation_up() {
        assert_eq!(split_counts(10, 0.2), (8, 2));
        assert_eq!(split_counts(11, 0.2), (8, 3));
        assert_eq!(split_counts(2, 0.2), (1, 1));
        assert_eq!(split_counts(1, 0.2), (0, 1));
        assert_eq!(split_counts(0, 0.2), (0, 0));
    }

    #[test]
    fn carve_sizes_sum_to_total() {
        for total in [2usize, 5, 17, 100] {
            let (train, validation) =
                carve_validation(records(total), VALIDATION_FRACTION, Some(3)).expect("carve");
            assert_eq!(train.len() + validation.len(), total);
            assert_eq!(validation.len(), split_counts(total, VALIDATION_FRACTION).1);
        }
    }

    #[test]
    fn carve_is_seed_deterministic() {
        let first = carve_validation(records(40), VALIDATION_FRACTION, Some(11)).expect("carve");
        let second = carve_validation(records(40), VALIDATION_FRACTION, Some(11)).expect("carve");
        assert_eq!(first, second);

        let other = carve_validation(records(40), VALIDATION_FRACTION, Some(12)).expect("carve");
        assert_ne!(first, other);
    }

    #[test]
    fn carve_is_a_partition() {
        let (train, validation) =
            carve_validation(records(25), VALIDATION_FRACTION, Some(1)).expect("carve");
        let mut seen: Vec<String> = train
            .iter()
            .chain(validation.iter())
            .map(|record| record.query.clone())
            .collect();
        seen.sort();
        let mut expected: Vec<String> = records(25).into_iter().map(|r| r.query).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn carve_rejects_single_record() {
        let err = carve_validation(records(1), VALIDATION_FRACTION, Some(1)).unwrap_err();
        assert!(matches!(err, TuneError::Configuration(_)));
    }

    #[test]
    fn carve_rejects_bad_fraction() {
        assert!(carve_validation(records(10), 0.0, None).is_err());
        assert!(carve_validation(records(10), 1.0, None).is_err());
    }

    #[test]
    fn ensure_validation_keeps_shipped_split() {
        let splits = DatasetSplits {
            train: records(3),
            validation: Some(vec![Record::new("vq", "va")]),
        };
        let resolved = ensure_validation(splits, Some(7)).expect("resolve");
        assert!(!resolved.carved);
        assert_eq!(resolved.train, records(3));
        assert_eq!(resolved.records(SplitLabel::Validation).len(), 1);
    }

    #[test]
    fn ensure_validation_carves_when_missing() {
        let splits = DatasetSplits {
            train: records(10),
            validation: None,
        };
        let resolved = ensure_validation(splits, Some(7)).expect("resolve");
        assert!(resolved.carved);
        assert_eq!(resolved.train.len(), 8);
        assert_eq!(resolved.validation.len(), 2);
    }

    #[test]
    fn split_label_resolves_aliases() {
        assert_eq!(SplitLabel::from_name("train"), Some(SplitLabel::Train));
        assert_eq!(SplitLabel::from_name("Validation"), Some(SplitLabel::Validation));
        assert_eq!(SplitLabel::from_name("dev"), Some(SplitLabel::Validation));
        assert_eq!(SplitLabel::from_name("test"), None);
        assert_eq!(SplitLabel::Validation.to_string(), "validation");
    }
}
