use std::time::{Duration, Instant};

use super::timer::Deadline;

/// Player controls that hide themselves after a quiet period.
#[derive(Debug)]
pub struct ControlsVisibility {
    visible: bool,
    hide: Deadline,
    delay: Duration,
}

impl ControlsVisibility {
    pub fn new(delay: Duration) -> Self {
        Self {
            visible: false,
            hide: Deadline::default(),
            delay,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self, now: Instant) {
        self.visible = true;
        self.hide.arm(now, self.delay);
    }

    pub fn poll(&mut self, now: Instant) {
        if self.hide.fire(now) {
            self.visible = false;
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.hide.at()
    }

    pub fn cancel(&mut self) {
        self.hide.cancel();
        self.visible = false;
    }
}
