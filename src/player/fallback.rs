//! Primary/backup URL pair of one playback attempt.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

use super::timer::Deadline;
use crate::error::PlaybackFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Loading,
    Loaded,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackEvent {
    Loaded,
    LoadFailed(String),
    Interacted,
    /// The decoder reported media actually flowing.
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackEffect {
    Loaded,
    SwitchTo(String),
    Exhausted(PlaybackFault),
}

#[derive(Debug)]
pub struct FallbackController {
    primary: String,
    fallback: Option<String>,
    on_fallback: bool,
    state: FallbackState,
    interacted: bool,
    playing: bool,
    failure_reported: bool,
    switch_timer_used: bool,
    load_deadline: Deadline,
    switch_deadline: Deadline,
    load_timeout: Duration,
    switch_delay: Duration,
}

impl FallbackController {
    pub fn new(
        primary: String,
        fallback: Option<String>,
        load_timeout: Duration,
        switch_delay: Duration,
        now: Instant,
    ) -> Self {
        let fallback = fallback.filter(|url| *url != primary);
        let mut load_deadline = Deadline::default();
        load_deadline.arm(now, load_timeout);

        Self {
            primary,
            fallback,
            on_fallback: false,
            state: FallbackState::Loading,
            interacted: false,
            playing: false,
            failure_reported: false,
            switch_timer_used: false,
            load_deadline,
            switch_deadline: Deadline::default(),
            load_timeout,
            switch_delay,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    pub fn active_url(&self) -> &str {
        match (&self.fallback, self.on_fallback) {
            (Some(fallback), true) => fallback,
            _ => &self.primary,
        }
    }

    pub fn fallback_tried(&self) -> bool {
        self.on_fallback
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        super::timer::earliest([self.load_deadline.at(), self.switch_deadline.at()])
    }

    pub fn handle(&mut self, event: FallbackEvent, now: Instant) -> Vec<FallbackEffect> {
        if self.state == FallbackState::Exhausted {
            return Vec::new();
        }

        match event {
            FallbackEvent::Loaded => self.on_loaded(now),
            FallbackEvent::LoadFailed(reason) => self.on_failed(reason, now),
            FallbackEvent::Interacted => {
                self.interacted = true;
                self.switch_deadline.cancel();
                Vec::new()
            }
            FallbackEvent::Playing => {
                if !self.playing {
                    debug!("{} is playing, keeping it", self.active_url());
                }
                self.playing = true;
                self.switch_deadline.cancel();
                Vec::new()
            }
        }
    }

    /// Fires whichever timers are due.
    pub fn poll(&mut self, now: Instant) -> Vec<FallbackEffect> {
        let mut effects = Vec::new();

        if self.load_deadline.fire(now) && self.state == FallbackState::Loading {
            info!(
                "{} ({:?}) for {}, assuming it plays",
                PlaybackFault::LoadTimeout,
                self.load_timeout,
                self.active_url()
            );
            effects.extend(self.on_loaded(now));
        }

        if self.switch_deadline.fire(now)
            && !self.interacted
            && !self.failure_reported
            && !self.on_fallback
        {
            if let Some(fallback) = self.fallback.clone() {
                info!(
                    "No interaction {:?} after load, switching to backup {fallback}",
                    self.switch_delay
                );
                effects.extend(self.swap(fallback, now));
            }
        }

        effects
    }

    /// Drops all pending timers.
    pub fn cancel(&mut self) {
        self.load_deadline.cancel();
        self.switch_deadline.cancel();
    }

    fn on_loaded(&mut self, now: Instant) -> Vec<FallbackEffect> {
        if self.state != FallbackState::Loading {
            return Vec::new();
        }
        self.state = FallbackState::Loaded;
        self.load_deadline.cancel();

        if !self.on_fallback
            && self.fallback.is_some()
            && !self.switch_timer_used
            && !self.interacted
            && !self.playing
        {
            self.switch_timer_used = true;
            self.switch_deadline.arm(now, self.switch_delay);
        }

        vec![FallbackEffect::Loaded]
    }

    fn on_failed(&mut self, reason: String, now: Instant) -> Vec<FallbackEffect> {
        self.failure_reported = true;
        self.cancel();

        if !self.on_fallback {
            if let Some(fallback) = self.fallback.clone() {
                warn!("Primary {} failed ({reason}), trying backup", self.primary);
                return self.swap(fallback, now);
            }
        }

        warn!("{} failed ({reason}), no backup left", self.active_url());
        self.state = FallbackState::Exhausted;
        vec![FallbackEffect::Exhausted(PlaybackFault::SourcesExhausted {
            primary: self.primary.clone(),
        })]
    }

    fn swap(&mut self, fallback: String, now: Instant) -> Vec<FallbackEffect> {
        debug!("Swapping {} -> {fallback}", self.primary);
        self.on_fallback = true;
        self.playing = false;
        self.state = FallbackState::Loading;
        self.switch_deadline.cancel();
        self.load_deadline.arm(now, self.load_timeout);
        vec![FallbackEffect::SwitchTo(fallback)]
    }
}
