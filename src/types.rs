/// Free text carried by records and pairs.
/// Examples: `what is the boiling point of water?`, `100 degrees Celsius at sea level.`
pub type Text = String;
/// Identifier for a record collection (local path or remote dataset id).
/// Examples: `data/qa.jsonl`, `sentence-transformers/natural-questions`
pub type DatasetId = String;
/// Optional remote dataset subset name.
/// Examples: `pair`, `triplet`
pub type SubsetName = String;
/// Benchmark task identifier understood by the evaluation harness.
/// Examples: `ArguAna`, `MSMARCO`, `TRECCOVID`
pub type TaskName = String;
/// Model name used to key checkpoints and result folders.
/// Examples: `roberta-large`, `best-checkpoint`
pub type ModelName = String;
