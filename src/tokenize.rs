//! Tokenizer hand-off for shuffled pair corpora.
//!
//! Encoding is applied pair-by-pair. With more than one worker the corpus is
//! mapped on a dedicated rayon pool; the indexed parallel iterator keeps the
//! output in input order, so the worker count only changes throughput.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::constants::tokenize::{PROMPT_PLACEHOLDER, TOKENIZER_FILENAME};
use crate::data::{Pair, PairLabel};
use crate::errors::TuneError;

/// Token ids and attention mask for one text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIds {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenIds {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    fn truncate(&mut self, max_len: usize) {
        self.input_ids.truncate(max_len);
        self.attention_mask.truncate(max_len);
    }
}

/// Encoded form of one pair, consumed by the trainer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPair {
    pub text1: TokenIds,
    pub text2: TokenIds,
    pub label: PairLabel,
}

/// Tokenizer collaborator.
pub trait PairTokenizer: Send + Sync {
    /// Encode one text, truncated to at most `max_len` tokens.
    fn encode_text(&self, text: &str, max_len: usize) -> Result<TokenIds, TuneError>;
}

/// Prompt template with a `{text}` placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn parse(template: impl Into<String>) -> Result<Self, TuneError> {
        let template = template.into();
        if !template.contains(PROMPT_PLACEHOLDER) {
            return Err(TuneError::Configuration(format!(
                "prompt template must contain {PROMPT_PLACEHOLDER}: {template:?}"
            )));
        }
        Ok(Self(template))
    }

    pub fn apply(&self, text: &str) -> String {
        self.0.replace(PROMPT_PLACEHOLDER, text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = TuneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PromptTemplate> for String {
    fn from(value: PromptTemplate) -> Self {
        value.0
    }
}

/// Parameters of the tokenization step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenizeOptions {
    pub max_len: usize,
    pub prompt: Option<PromptTemplate>,
    pub workers: usize,
}

/// Encode a single pair, applying the prompt template to both texts.
pub fn encode_pair<T>(
    tokenizer: &T,
    pair: &Pair,
    max_len: usize,
    prompt: Option<&PromptTemplate>,
) -> Result<EncodedPair, TuneError>
where
    T: PairTokenizer + ?Sized,
{
    let encode = |text: &str| match prompt {
        Some(template) => tokenizer.encode_text(&template.apply(text), max_len),
        None => tokenizer.encode_text(text, max_len),
    };
    Ok(EncodedPair {
        text1: encode(&pair.text1)?,
        text2: encode(&pair.text2)?,
        label: pair.label,
    })
}

/// Encode a corpus, preserving pair order.
pub fn tokenize_corpus<T>(
    tokenizer: &T,
    pairs: &[Pair],
    options: &TokenizeOptions,
) -> Result<Vec<EncodedPair>, TuneError>
where
    T: PairTokenizer + ?Sized,
{
    if options.workers == 0 {
        return Err(TuneError::Configuration(
            "tokenization needs at least one worker".to_string(),
        ));
    }
    let prompt = options.prompt.as_ref();
    if options.workers == 1 || pairs.len() < 2 {
        return pairs
            .iter()
            .map(|pair| encode_pair(tokenizer, pair, options.max_len, prompt))
            .collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .thread_name(|idx| format!("tokenize-{idx}"))
        .build()
        .map_err(|err| TuneError::Tokenizer(format!("failed building worker pool: {err}")))?;
    debug!(pairs = pairs.len(), workers = options.workers, "tokenizing corpus in parallel");
    pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| encode_pair(tokenizer, pair, options.max_len, prompt))
            .collect()
    })
}

/// `tokenizers`-backed collaborator.
pub struct HfPairTokenizer {
    tokenizer: Tokenizer,
}

impl HfPairTokenizer {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Load from a model directory or an explicit `tokenizer.json` path.
    pub fn from_path(model_path: &Path) -> Result<Self, TuneError> {
        let tokenizer_path = tokenizer_file_for(model_path)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|err| {
            TuneError::Tokenizer(format!(
                "failed loading {}: {err}",
                tokenizer_path.display()
            ))
        })?;
        info!(path = %tokenizer_path.display(), "loaded tokenizer");
        Ok(Self::new(tokenizer))
    }

    /// Load from a local path, or fetch `tokenizer.json` for a hub model id.
    pub fn from_pretrained(name_or_path: &str) -> Result<Self, TuneError> {
        let path = Path::new(name_or_path);
        if path.exists() {
            return Self::from_path(path);
        }
        Self::from_hub(name_or_path)
    }

    #[cfg(feature = "huggingface")]
    fn from_hub(model_id: &str) -> Result<Self, TuneError> {
        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_progress(false)
            .with_token(std::env::var("HF_TOKEN").ok())
            .build()
            .map_err(|err| TuneError::Tokenizer(format!("failed building hf-hub client: {err}")))?;
        let local = api.model(model_id.to_string()).get(TOKENIZER_FILENAME).map_err(|err| {
            TuneError::Tokenizer(format!(
                "failed downloading {TOKENIZER_FILENAME} for '{model_id}': {err}"
            ))
        })?;
        Self::from_path(&local)
    }

    #[cfg(not(feature = "huggingface"))]
    fn from_hub(model_id: &str) -> Result<Self, TuneError> {
        Err(TuneError::Tokenizer(format!(
            "'{model_id}' is not a local path and hub support is disabled"
        )))
    }
}

impl PairTokenizer for HfPairTokenizer {
    fn encode_text(&self, text: &str, max_len: usize) -> Result<TokenIds, TuneError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|err| TuneError::Tokenizer(err.to_string()))?;
        let mut ids = TokenIds {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        };
        ids.truncate(max_len);
        Ok(ids)
    }
}

fn tokenizer_file_for(model_path: &Path) -> Result<PathBuf, TuneError> {
    if model_path
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new(TOKENIZER_FILENAME))
    {
        return Ok(model_path.to_path_buf());
    }
    if model_path.is_dir() {
        return Ok(model_path.join(TOKENIZER_FILENAME));
    }
    model_path
        .parent()
        .map(|parent| parent.join(TOKENIZER_FILENAME))
        .ok_or_else(|| {
            TuneError::Tokenizer(format!("model path {} has no parent", model_path.display()))
        })
}
