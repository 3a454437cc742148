/// Swallows the first interactions on a third-party embed so that its
/// pop-out triggers hit an inert overlay.
#[derive(Debug, Clone)]
pub struct InteractionGate {
    threshold: u32,
    absorbed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Absorbed { remaining: u32 },
    PassThrough,
}

impl InteractionGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            absorbed: 0,
        }
    }

    pub fn absorbed(&self) -> u32 {
        self.absorbed
    }

    pub fn is_transparent(&self) -> bool {
        self.absorbed >= self.threshold
    }

    pub fn remaining(&self) -> u32 {
        self.threshold.saturating_sub(self.absorbed)
    }

    pub fn on_interaction(&mut self) -> GateDecision {
        if self.is_transparent() {
            return GateDecision::PassThrough;
        }
        self.absorbed += 1;
        GateDecision::Absorbed {
            remaining: self.remaining(),
        }
    }

    /// Progress text for the overlay, `None` once transparent.
    pub fn message(&self) -> Option<String> {
        match self.remaining() {
            0 => None,
            1 => Some("Tap 1 more time to start the stream".into()),
            n => Some(format!("Tap {n} more times to start the stream")),
        }
    }
}
