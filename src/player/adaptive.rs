//! Manifest-based playback state machine.
//!
//! The controller never touches a decoder itself. Each event yields a list of
//! effects that the surface owning the decoder carries out.

use log::{debug, info, warn};

use crate::error::PlaybackFault;
use crate::hls::ladder::QualityLadder;
use crate::model::{AUTO_QUALITY, QualityLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveState {
    Idle,
    Loading,
    Playing,
    Buffering,
    Recovering,
    FatalError,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Media,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveEvent {
    /// Decoder attached to the sink, manifest requested.
    Attach,
    ManifestParsed(Vec<QualityLevel>),
    /// The decoder settled on a level.
    LevelSwitched(i32),
    Stalled,
    /// Buffer refilled, frames flowing again.
    Resumed,
    Error {
        kind: ErrorKind,
        fatal: bool,
        details: String,
    },
    SelectQuality(i32),
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveEffect {
    Loaded,
    ReloadManifest,
    RecoverMediaError,
    SetLevel(i32),
    QualityChanged {
        level: QualityLevel,
        automatic: bool,
    },
    Buffering { stalls: u32 },
    Resumed,
    /// Primary exhausted; hand over to the fallback controller.
    Escalate(PlaybackFault),
    Detach,
}

#[derive(Debug)]
pub struct AdaptiveController {
    state: AdaptiveState,
    ladder: QualityLadder,
    stall_threshold: u32,
    stalls: u32,
    downgrade_applied: bool,
    media_recovery_pending: bool,
}

impl AdaptiveController {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            state: AdaptiveState::Idle,
            ladder: QualityLadder::new(),
            stall_threshold: stall_threshold.max(1),
            stalls: 0,
            downgrade_applied: false,
            media_recovery_pending: false,
        }
    }

    pub fn state(&self) -> AdaptiveState {
        self.state
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn downgrade_applied(&self) -> bool {
        self.downgrade_applied
    }

    pub fn handle(&mut self, event: AdaptiveEvent) -> Vec<AdaptiveEffect> {
        use AdaptiveState::*;

        if self.state == Ended {
            debug!("Ignoring {event:?} on a torn down controller");
            return Vec::new();
        }

        match event {
            AdaptiveEvent::Teardown => {
                self.state = Ended;
                vec![AdaptiveEffect::Detach]
            }
            _ if self.state == FatalError => {
                debug!("Ignoring {event:?} after fatal error");
                Vec::new()
            }
            AdaptiveEvent::Attach => {
                if self.state == Idle {
                    self.state = Loading;
                }
                Vec::new()
            }
            AdaptiveEvent::ManifestParsed(levels) => self.on_manifest(levels),
            AdaptiveEvent::LevelSwitched(index) => self.on_level_switched(index),
            AdaptiveEvent::Stalled => self.on_stall(),
            AdaptiveEvent::Resumed => match self.state {
                Buffering | Recovering => {
                    self.state = Playing;
                    self.media_recovery_pending = false;
                    vec![AdaptiveEffect::Resumed]
                }
                _ => Vec::new(),
            },
            AdaptiveEvent::Error {
                kind,
                fatal,
                details,
            } => self.on_error(kind, fatal, details),
            AdaptiveEvent::SelectQuality(index) => self.on_select(index),
        }
    }

    fn on_manifest(&mut self, levels: Vec<QualityLevel>) -> Vec<AdaptiveEffect> {
        let first_load = self.state == AdaptiveState::Loading || self.state == AdaptiveState::Idle;
        info!("Manifest parsed with {} quality levels", levels.len());
        self.ladder.load(levels);
        self.state = AdaptiveState::Playing;
        self.media_recovery_pending = false;

        let mut effects = Vec::new();
        if first_load {
            effects.push(AdaptiveEffect::Loaded);
        }
        effects.push(AdaptiveEffect::SetLevel(self.ladder.selected()));
        effects
    }

    fn on_level_switched(&mut self, index: i32) -> Vec<AdaptiveEffect> {
        self.ladder.record_playing(index);
        match self.ladder.level(index) {
            Some(level) => vec![AdaptiveEffect::QualityChanged {
                level,
                automatic: !self.ladder.is_manual(),
            }],
            None => Vec::new(),
        }
    }

    fn on_stall(&mut self) -> Vec<AdaptiveEffect> {
        if !matches!(
            self.state,
            AdaptiveState::Playing | AdaptiveState::Buffering
        ) {
            return Vec::new();
        }

        self.state = AdaptiveState::Buffering;
        self.stalls += 1;
        let mut effects = vec![AdaptiveEffect::Buffering {
            stalls: self.stalls,
        }];

        if self.stalls >= self.stall_threshold
            && !self.downgrade_applied
            && !self.ladder.is_manual()
            && !self.ladder.at_lowest()
        {
            if let Some(level) = self.ladder.step_down() {
                info!(
                    "{} buffer stalls, dropping quality to {}",
                    self.stalls,
                    level.label()
                );
                self.downgrade_applied = true;
                self.stalls = 0;
                effects.push(AdaptiveEffect::SetLevel(level.index));
                effects.push(AdaptiveEffect::QualityChanged {
                    level,
                    automatic: true,
                });
            }
        }

        effects
    }

    fn on_error(&mut self, kind: ErrorKind, fatal: bool, details: String) -> Vec<AdaptiveEffect> {
        if !fatal {
            debug!("Non-fatal {kind:?} error: {details}");
            return Vec::new();
        }

        match kind {
            ErrorKind::Network => {
                warn!("{}, reloading manifest", PlaybackFault::Network(details));
                self.state = AdaptiveState::Recovering;
                vec![AdaptiveEffect::ReloadManifest]
            }
            ErrorKind::Media if !self.media_recovery_pending => {
                warn!("Media error, resetting decoder: {details}");
                self.state = AdaptiveState::Recovering;
                self.media_recovery_pending = true;
                vec![AdaptiveEffect::RecoverMediaError]
            }
            ErrorKind::Media => {
                warn!("Media error recovery failed: {details}");
                self.state = AdaptiveState::FatalError;
                vec![AdaptiveEffect::Escalate(PlaybackFault::Media(details))]
            }
            ErrorKind::Other => {
                warn!("Fatal playback error: {details}");
                self.state = AdaptiveState::FatalError;
                vec![AdaptiveEffect::Escalate(PlaybackFault::Fatal(details))]
            }
        }
    }

    fn on_select(&mut self, index: i32) -> Vec<AdaptiveEffect> {
        if !self.ladder.select_manual(index) {
            warn!("Quality level {index} is not available");
            return Vec::new();
        }

        let mut effects = vec![AdaptiveEffect::SetLevel(index)];
        if index != AUTO_QUALITY {
            if let Some(level) = self.ladder.level(index) {
                effects.push(AdaptiveEffect::QualityChanged {
                    level,
                    automatic: false,
                });
            }
        }
        effects
    }
}
