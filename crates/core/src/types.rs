/// Prompt identifiers as assigned by the prompt source.
pub type PromptId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
