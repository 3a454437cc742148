use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Applied,
    Unavailable,
}

/// Best-effort removal of provider overlays from a loaded embed. Never
/// relied on for correctness.
pub trait EmbedCleanup {
    fn apply(&self, url: &str) -> CleanupOutcome;
}

/// Third-party embeds are cross-origin, so there is nothing to reach into.
pub struct CrossOrigin;

impl EmbedCleanup for CrossOrigin {
    fn apply(&self, url: &str) -> CleanupOutcome {
        debug!("Overlay cleanup unavailable for cross-origin embed {url}");
        CleanupOutcome::Unavailable
    }
}
