use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::{Duration, Instant};

use super::timer::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownParts {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl CountdownParts {
    /// Splits a positive duration, rounding partial seconds up so that
    /// "0s" is never shown before the match is live.
    pub fn from_remaining(remaining: TimeDelta) -> Self {
        let millis = remaining.num_milliseconds().max(0);
        let total = (millis + 999) / 1000;
        Self {
            days: total / 86_400,
            hours: total % 86_400 / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for CountdownParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let CountdownParts {
            days,
            hours,
            minutes,
            seconds,
        } = *self;
        if days > 0 {
            write!(f, "{days}d {hours:02}h {minutes:02}m {seconds:02}s")
        } else if hours > 0 {
            write!(f, "{hours}h {minutes:02}m {seconds:02}s")
        } else if minutes > 0 {
            write!(f, "{minutes}m {seconds:02}s")
        } else {
            write!(f, "{seconds}s")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    Remaining {
        remaining: TimeDelta,
        parts: CountdownParts,
    },
    Opened,
}

/// Keeps the embed away until the scheduled start. Once open it stays open.
#[derive(Debug)]
pub struct CountdownGate {
    start_time: DateTime<Utc>,
    opened: bool,
    tick: Deadline,
    interval: Duration,
}

impl CountdownGate {
    pub fn new(
        start_time: DateTime<Utc>,
        interval: Duration,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Self {
        let mut gate = Self {
            start_time,
            opened: false,
            tick: Deadline::default(),
            interval,
        };
        if start_time - wall <= TimeDelta::zero() {
            gate.opened = true;
        } else {
            gate.tick.arm(now, interval);
        }
        gate
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Time left, `None` once the gate has opened.
    pub fn remaining(&self, wall: DateTime<Utc>) -> Option<TimeDelta> {
        if self.opened {
            return None;
        }
        Some((self.start_time - wall).max(TimeDelta::zero()))
    }

    pub fn poll(&mut self, now: Instant, wall: DateTime<Utc>) -> Option<CountdownTick> {
        if self.opened || !self.tick.fire(now) {
            return None;
        }

        let remaining = self.start_time - wall;
        if remaining <= TimeDelta::zero() {
            self.opened = true;
            return Some(CountdownTick::Opened);
        }

        self.tick.arm(now, self.interval);
        Some(CountdownTick::Remaining {
            remaining,
            parts: CountdownParts::from_remaining(remaining),
        })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tick.at()
    }

    pub fn cancel(&mut self) {
        self.tick.cancel();
    }
}
