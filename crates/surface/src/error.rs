/// Errors from interacting with the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    /// The targeted element is not (or no longer) on the page.
    #[error("Element not found: {0}")]
    ElementMissing(String),

    /// The element exists but the interaction failed.
    #[error("Interaction failed: {0}")]
    Interaction(String),

    /// The surface is no longer usable (page closed, driver gone).
    #[error("Surface unavailable: {0}")]
    Unavailable(String),
}
