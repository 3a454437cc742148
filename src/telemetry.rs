use log::debug;

use crate::error::PlaybackFault;
use crate::model::{QualityLevel, Stream};

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    MatchSelected { match_id: String },
    SourceChanged { provider: String, stream_index: u32 },
    QualityChanged {
        index: i32,
        height: u64,
        automatic: bool,
    },
    Buffering { stalls: u32 },
    Fullscreen { entered: bool },
}

/// Fire-and-forget analytics.
pub trait TelemetrySink {
    fn emit(&self, event: TelemetryEvent);
}

pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        debug!("telemetry: {event:?}");
    }
}

/// Callbacks into the UI hosting the playback surface.
pub trait PlayerHost {
    fn on_load(&self) {}
    fn on_error(&self, _fault: &PlaybackFault) {}
    fn on_quality_change(&self, _level: &QualityLevel) {}
    /// The surface must (re)load `stream`.
    fn on_reload(&self, _stream: &Stream) {}
}

pub struct NoopHost;

impl PlayerHost for NoopHost {}
