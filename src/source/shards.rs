use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::source::{ANSWER_FIELD, QUERY_FIELD, SHARD_EXTENSIONS};
use crate::data::{DatasetSplits, Record};
use crate::errors::TuneError;
use crate::splits::SplitLabel;

/// Supported shard encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardFormat {
    /// A JSON array of objects, or JSON Lines stored under `.json`.
    Json,
    /// One JSON object per line.
    JsonLines,
    /// Apache Parquet.
    Parquet,
}

impl ShardFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())?;
        if !SHARD_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        match ext.as_str() {
            "json" => Some(ShardFormat::Json),
            "jsonl" | "ndjson" => Some(ShardFormat::JsonLines),
            "parquet" => Some(ShardFormat::Parquet),
            _ => None,
        }
    }
}

/// Assign a shard path to a split by its name tokens.
///
/// A directory matches when the whole component is a split name (`train/`,
/// `dev/`). A file name matches when one of its `-`, `_` or `.` separated
/// tokens is (`train-00000.parquet`, `qa-train-shard.jsonl`). Train wins over
/// validation. Returns `None` for test shards and untagged files.
pub fn split_for_path(path: &str) -> Option<SplitLabel> {
    let normalized = path.replace('\\', "/");
    let (dirs, file_name) = normalized
        .rsplit_once('/')
        .unwrap_or(("", normalized.as_str()));
    let mut found = None;
    for label in dirs
        .split('/')
        .chain(file_name.split(['-', '_', '.']))
        .filter_map(SplitLabel::from_name)
    {
        if label == SplitLabel::Train {
            return Some(label);
        }
        found = Some(label);
    }
    found
}

/// Convert one decoded row into a record.
pub fn record_from_value(value: &Value, origin: &str, row: usize) -> Result<Record, TuneError> {
    let object = value.as_object().ok_or_else(|| TuneError::InvalidRecord {
        origin: origin.to_string(),
        row,
        reason: "expected a JSON object".to_string(),
    })?;
    let field = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TuneError::InvalidRecord {
                origin: origin.to_string(),
                row,
                reason: format!("missing string field '{name}'"),
            })
    };
    Ok(Record {
        query: field(QUERY_FIELD)?,
        answer: field(ANSWER_FIELD)?,
    })
}

/// Read every record from one shard file.
pub fn read_shard(path: &Path) -> Result<Vec<Record>, TuneError> {
    let format = ShardFormat::from_path(path).ok_or_else(|| TuneError::SourceUnavailable {
        source_id: path.display().to_string(),
        reason: format!("unsupported shard extension (expected one of {SHARD_EXTENSIONS:?})"),
    })?;
    match format {
        ShardFormat::Json => read_json(path),
        ShardFormat::JsonLines => read_json_lines(path),
        ShardFormat::Parquet => read_parquet(path),
    }
}

fn read_json(path: &Path) -> Result<Vec<Record>, TuneError> {
    let raw = fs::read_to_string(path)?;
    if !raw.trim_start().starts_with('[') {
        return parse_json_lines(&raw, path);
    }
    let origin = path.display().to_string();
    let rows: Vec<Value> = serde_json::from_str(&raw)?;
    rows.iter()
        .enumerate()
        .map(|(row, value)| record_from_value(value, &origin, row))
        .collect()
}

fn read_json_lines(path: &Path) -> Result<Vec<Record>, TuneError> {
    let raw = fs::read_to_string(path)?;
    parse_json_lines(&raw, path)
}

fn parse_json_lines(raw: &str, path: &Path) -> Result<Vec<Record>, TuneError> {
    let origin = path.display().to_string();
    let mut records = Vec::new();
    for (row, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|err| TuneError::InvalidRecord {
            origin: origin.clone(),
            row,
            reason: err.to_string(),
        })?;
        records.push(record_from_value(&value, &origin, row)?);
    }
    Ok(records)
}

#[cfg(feature = "huggingface")]
fn read_parquet(path: &Path) -> Result<Vec<Record>, TuneError> {
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use parquet::record::Field;

    let origin = path.display().to_string();
    let unavailable = |reason: String| TuneError::SourceUnavailable {
        source_id: origin.clone(),
        reason,
    };
    let file = fs::File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| unavailable(format!("failed reading parquet shard: {err}")))?;
    let rows = reader
        .get_row_iter(None)
        .map_err(|err| unavailable(format!("failed iterating parquet rows: {err}")))?;

    let mut records = Vec::new();
    for (row_idx, row) in rows.enumerate() {
        let row = row
            .map_err(|err| unavailable(format!("failed reading parquet row {row_idx}: {err}")))?;
        let mut query = None;
        let mut answer = None;
        for (name, field) in row.get_column_iter() {
            if let Field::Str(text) = field {
                if name == QUERY_FIELD {
                    query = Some(text.clone());
                } else if name == ANSWER_FIELD {
                    answer = Some(text.clone());
                }
            }
        }
        match (query, answer) {
            (Some(query), Some(answer)) => records.push(Record { query, answer }),
            _ => {
                return Err(TuneError::InvalidRecord {
                    origin: origin.clone(),
                    row: row_idx,
                    reason: format!("missing string columns '{QUERY_FIELD}' and '{ANSWER_FIELD}'"),
                });
            }
        }
    }
    Ok(records)
}

#[cfg(not(feature = "huggingface"))]
fn read_parquet(path: &Path) -> Result<Vec<Record>, TuneError> {
    Err(TuneError::SourceUnavailable {
        source_id: path.display().to_string(),
        reason: "parquet shards require the `huggingface` feature".to_string(),
    })
}

/// Group shard paths into splits and load them.
///
/// When no shard carries a split token, every shard belongs to `train`.
pub fn load_split_shards(
    source_id: &str,
    shards: &[(String, PathBuf)],
) -> Result<DatasetSplits, TuneError> {
    let mut grouped: BTreeMap<String, (Option<SplitLabel>, PathBuf)> = BTreeMap::new();
    for (name, path) in shards {
        grouped.insert(name.clone(), (split_for_path(name), path.clone()));
    }
    let any_tagged = grouped.values().any(|(label, _)| label.is_some());

    let mut train = Vec::new();
    let mut validation: Option<Vec<Record>> = None;
    for (name, (label, path)) in &grouped {
        let label = match (label, any_tagged) {
            (Some(label), _) => *label,
            (None, false) => SplitLabel::Train,
            (None, true) => {
                tracing::debug!(
                    source_id,
                    shard = %name,
                    "skipping shard outside train/validation"
                );
                continue;
            }
        };
        let records = read_shard(path)?;
        tracing::debug!(
            source_id,
            shard = %name,
            split = %label,
            records = records.len(),
            "loaded shard"
        );
        match label {
            SplitLabel::Train => train.extend(records),
            SplitLabel::Validation => validation.get_or_insert_with(Vec::new).extend(records),
        }
    }
    if train.is_empty() {
        return Err(TuneError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: "no train records found".to_string(),
        });
    }
    Ok(DatasetSplits { train, validation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn split_for_path_matches_common_layouts() {
        assert_eq!(split_for_path("data/train-00000-of-00001.parquet"), Some(SplitLabel::Train));
        assert_eq!(split_for_path("pair/train/part.jsonl"), Some(SplitLabel::Train));
        assert_eq!(split_for_path("qa-train-shard.jsonl"), Some(SplitLabel::Train));
        assert_eq!(split_for_path("validation.jsonl"), Some(SplitLabel::Validation));
        assert_eq!(split_for_path("data/dev-0001.json"), Some(SplitLabel::Validation));
        assert_eq!(split_for_path("data/test-0001.json"), None);
        assert_eq!(split_for_path("qa.jsonl"), None);
        assert_eq!(split_for_path("Data\\DEV\\part.json"), Some(SplitLabel::Validation));
    }

    #[test]
    fn split_names_inside_longer_words_do_not_match() {
        assert_eq!(split_for_path("pretrain/test-00000.parquet"), None);
        assert_eq!(split_for_path("invalid/test.jsonl"), None);
        assert_eq!(split_for_path("pairs_dev/test-0.jsonl"), None);
        assert_eq!(split_for_path("trainer-notes.jsonl"), None);
        assert_eq!(split_for_path("devices/train.jsonl"), Some(SplitLabel::Train));
    }

    #[test]
    fn record_from_value_requires_both_fields() {
        let ok = record_from_value(&json!({"query": "q", "answer": "a", "extra": 1}), "f", 0)
            .expect("record");
        assert_eq!(ok, Record::new("q", "a"));

        let err = record_from_value(&json!({"query": "q"}), "f", 3).unwrap_err();
        match err {
            TuneError::InvalidRecord { row, reason, .. } => {
                assert_eq!(row, 3);
                assert!(reason.contains("answer"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(record_from_value(&json!({"query": "q", "answer": 5}), "f", 0).is_err());
        assert!(record_from_value(&json!(["q", "a"]), "f", 0).is_err());
    }

    #[test]
    fn json_shards_accept_arrays_and_lines() {
        let dir = tempdir().expect("tempdir");
        let array = dir.path().join("array.json");
        fs::write(&array, r#"[{"query":"q1","answer":"a1"},{"query":"q2","answer":"a2"}]"#)
            .expect("write");
        let lines = dir.path().join("lines.json");
        fs::write(&lines, "{\"query\":\"q1\",\"answer\":\"a1\"}\n\n{\"query\":\"q2\",\"answer\":\"a2\"}\n")
            .expect("write");

        assert_eq!(read_shard(&array).expect("array").len(), 2);
        assert_eq!(read_shard(&lines).expect("lines").len(), 2);
    }

    #[test]
    fn json_lines_report_bad_rows() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"query\":\"q1\",\"answer\":\"a1\"}\nnot json\n").expect("write");
        let err = read_shard(&path).unwrap_err();
        assert!(matches!(err, TuneError::InvalidRecord { row: 1, .. }));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("qa.csv");
        fs::write(&path, "query,answer\n").expect("write");
        assert!(matches!(
            read_shard(&path).unwrap_err(),
            TuneError::SourceUnavailable { .. }
        ));
    }

    #[test]
    fn load_split_shards_groups_by_token() {
        let dir = tempdir().expect("tempdir");
        let train = dir.path().join("train.jsonl");
        let valid = dir.path().join("validation.jsonl");
        let test = dir.path().join("test.jsonl");
        fs::write(&train, "{\"query\":\"q1\",\"answer\":\"a1\"}\n").expect("write");
        fs::write(&valid, "{\"query\":\"q2\",\"answer\":\"a2\"}\n").expect("write");
        fs::write(&test, "{\"query\":\"q3\",\"answer\":\"a3\"}\n").expect("write");

        let shards = vec![
            ("train.jsonl".to_string(), train),
            ("validation.jsonl".to_string(), valid),
            ("test.jsonl".to_string(), test),
        ];
        let splits = load_split_shards("local", &shards).expect("splits");
        assert_eq!(splits.train, vec![Record::new("q1", "a1")]);
        assert_eq!(splits.validation, Some(vec![Record::new("q2", "a2")]));
    }

    #[test]
    fn untagged_shards_all_belong_to_train() {
        let dir = tempdir().expect("tempdir");
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");
        fs::write(&first, "{\"query\":\"q1\",\"answer\":\"a1\"}\n").expect("write");
        fs::write(&second, "{\"query\":\"q2\",\"answer\":\"a2\"}\n").expect("write");
        let shards = vec![("b.jsonl".to_string(), second), ("a.jsonl".to_string(), first)];
        let splits = load_split_shards("local", &shards).expect("splits");
        assert_eq!(
            splits.train,
            vec![Record::new("q1", "a1"), Record::new("q2", "a2")]
        );
        assert!(splits.validation.is_none());
    }
}
