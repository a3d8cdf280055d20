use serde::{Deserialize, Serialize};

pub use crate::types::Text;

/// One query/answer training example.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub query: Text,
    pub answer: Text,
}

impl Record {
    pub fn new(query: impl Into<Text>, answer: impl Into<Text>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }
}

/// Pair label; serialized as `1` (positive) or `0` (negative).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PairLabel {
    Positive,
    Negative,
}

impl PairLabel {
    pub fn as_u8(self) -> u8 {
        match self {
            PairLabel::Positive => 1,
            PairLabel::Negative => 0,
        }
    }
}

impl From<PairLabel> for u8 {
    fn from(value: PairLabel) -> Self {
        value.as_u8()
    }
}

impl TryFrom<u8> for PairLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PairLabel::Positive),
            0 => Ok(PairLabel::Negative),
            other => Err(format!("pair label must be 0 or 1, got {other}")),
        }
    }
}

/// Labeled contrastive example.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub text1: Text,
    pub text2: Text,
    pub label: PairLabel,
}

impl Pair {
    pub fn positive(query: &str, answer: &str) -> Self {
        Self {
            text1: query.to_string(),
            text2: answer.to_string(),
            label: PairLabel::Positive,
        }
    }

    pub fn negative(query: &str, answer: &str) -> Self {
        Self {
            text1: query.to_string(),
            text2: answer.to_string(),
            label: PairLabel::Negative,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.label == PairLabel::Positive
    }
}

/// Loaded record collection addressable by split.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetSplits {
    pub train: Vec<Record>,
    /// `None` when the source shipped no held-out split.
    pub validation: Option<Vec<Record>>,
}

impl DatasetSplits {
    pub fn total_records(&self) -> usize {
        self.train.len() + self.validation.as_ref().map_or(0, Vec::len)
    }
}
