/// Errors raised by domain validation.
///
/// Anything returned from here is fatal to the operation that triggered it:
/// a scheduling run refuses to start, a configuration refuses to load.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}
