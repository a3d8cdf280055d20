//! Contrastive pair construction.
//!
//! Every record yields one positive pair (its own query and answer) and one
//! negative pair (its query and an answer drawn by rejection sampling from
//! the same record set). Positives come first, then negatives, and the whole
//! corpus is shuffled once.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::debug;

use crate::data::{Pair, Record};
use crate::errors::TuneError;
use crate::rng::DeterministicRng;

/// Builds the labeled contrastive corpus for one split.
///
/// `sampling_seed` drives negative draws and `shuffle_seed` drives the final
/// corpus shuffle. A missing seed falls back to entropy for that stage only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairBuilder {
    pub sampling_seed: Option<u64>,
    pub shuffle_seed: Option<u64>,
}

impl PairBuilder {
    pub fn new(sampling_seed: Option<u64>, shuffle_seed: Option<u64>) -> Self {
        Self {
            sampling_seed,
            shuffle_seed,
        }
    }

    /// Produce `2 * records.len()` shuffled pairs.
    pub fn build(&self, records: &[Record]) -> Result<Vec<Pair>, TuneError> {
        let mut sampling_rng = DeterministicRng::from_optional_seed(self.sampling_seed);
        let mut shuffle_rng = DeterministicRng::from_optional_seed(self.shuffle_seed);
        build_contrastive_pairs(records, &mut sampling_rng, &mut shuffle_rng)
    }
}

/// Positives ++ negatives, shuffled with `shuffle_rng`.
pub fn build_contrastive_pairs<S, H>(
    records: &[Record],
    sampling_rng: &mut S,
    shuffle_rng: &mut H,
) -> Result<Vec<Pair>, TuneError>
where
    S: Rng + ?Sized,
    H: Rng + ?Sized,
{
    let mut pairs = positive_pairs(records);
    pairs.extend(negative_pairs(records, sampling_rng)?);
    shuffle_pairs(&mut pairs, shuffle_rng);
    debug!(records = records.len(), pairs = pairs.len(), "built contrastive pairs");
    Ok(pairs)
}

/// One positive pair per record, in input order.
pub fn positive_pairs(records: &[Record]) -> Vec<Pair> {
    records
        .iter()
        .map(|record| Pair::positive(&record.query, &record.answer))
        .collect()
}

/// One negative pair per record, in input order.
///
/// Candidates are drawn uniformly over all records and redrawn while their
/// answer equals the anchor's answer. Fails up front when fewer than two
/// distinct answers exist, since the redraw loop could never finish.
pub fn negative_pairs<R>(records: &[Record], rng: &mut R) -> Result<Vec<Pair>, TuneError>
where
    R: Rng + ?Sized,
{
    if records.is_empty() {
        return Ok(Vec::new());
    }
    ensure_distinct_answers(records)?;

    let total = records.len();
    let mut pairs = Vec::with_capacity(total);
    for record in records {
        let mut candidate = &records[rng.random_range(0..total)].answer;
        while *candidate == record.answer {
            candidate = &records[rng.random_range(0..total)].answer;
        }
        pairs.push(Pair::negative(&record.query, candidate));
    }
    Ok(pairs)
}

/// Check that at least two distinct answer strings exist.
pub fn ensure_distinct_answers(records: &[Record]) -> Result<(), TuneError> {
    let mut distinct = HashSet::new();
    for record in records {
        distinct.insert(record.answer.as_str());
        if distinct.len() >= 2 {
            return Ok(());
        }
    }
    Err(TuneError::DegenerateAnswers {
        records: records.len(),
        distinct: distinct.len(),
    })
}

/// Shuffle the full corpus in place.
pub fn shuffle_pairs<R>(pairs: &mut [Pair], rng: &mut R)
where
    R: Rng + ?Sized,
{
    pairs.shuffle(rng);
}
