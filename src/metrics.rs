use std::collections::HashSet;

use crate::data::Pair;

/// Label balance and text diversity of one contrastive corpus.
#[derive(Clone, Debug, PartialEq)]
pub struct CorpusBalance {
    pub total: usize,
    pub positives: usize,
    pub negatives: usize,
    pub positive_share: f64,
    pub distinct_queries: usize,
    pub distinct_answers: usize,
}

/// Compute balance metrics for a corpus.
pub fn corpus_balance(pairs: &[Pair]) -> Option<CorpusBalance> {
    if pairs.is_empty() {
        return None;
    }
    let total = pairs.len();
    let positives = pairs.iter().filter(|pair| pair.is_positive()).count();
    let distinct_queries = pairs
        .iter()
        .map(|pair| pair.text1.as_str())
        .collect::<HashSet<_>>()
        .len();
    let distinct_answers = pairs
        .iter()
        .map(|pair| pair.text2.as_str())
        .collect::<HashSet<_>>()
        .len();
    Some(CorpusBalance {
        total,
        positives,
        negatives: total - positives,
        positive_share: positives as f64 / total as f64,
        distinct_queries,
        distinct_answers,
    })
}
