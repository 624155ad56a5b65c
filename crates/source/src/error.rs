use relay_core::types::PromptId;

/// Errors from fetching prompts or recording successes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The prompt API returned a non-2xx status code.
    #[error("Prompt API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backing store answered but refused the operation.
    #[error("Prompt source rejected the request: {0}")]
    Rejected(String),

    /// No prompt with this id exists in the backing store.
    #[error("Unknown prompt id: {0}")]
    UnknownPrompt(PromptId),

    /// Reading or writing the prompts file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload could not be parsed as prompt records.
    #[error("Failed to parse prompts: {0}")]
    Parse(#[from] serde_json::Error),
}
