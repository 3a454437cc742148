use thiserror::Error;

/// Faults the engine can observe. These travel as data through state and
/// host callbacks; only `SourcesExhausted` and `ResolutionEmpty` are ever
/// shown to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackFault {
    #[error("no stream available for this match")]
    ResolutionEmpty,

    #[error("no load signal within the load timeout")]
    LoadTimeout,

    #[error("network error while loading manifest: {0}")]
    Network(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("fatal playback error: {0}")]
    Fatal(String),

    #[error("all sources failed (primary {primary})")]
    SourcesExhausted { primary: String },
}

impl PlaybackFault {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackFault::ResolutionEmpty | PlaybackFault::SourcesExhausted { .. }
        )
    }
}
