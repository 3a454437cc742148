use crate::model::{AUTO_QUALITY, QualityLevel};

/// Available and selected quality levels of one manifest-based stream.
#[derive(Debug, Clone)]
pub struct QualityLadder {
    levels: Vec<QualityLevel>,
    selected: i32,
    manual: bool,
    playing: Option<i32>,
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            selected: AUTO_QUALITY,
            manual: false,
            playing: None,
        }
    }
}

impl QualityLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the level list after a manifest parse. A pinned level that
    /// still exists is kept, anything else goes back to automatic.
    pub fn load(&mut self, levels: Vec<QualityLevel>) {
        self.levels = levels;
        self.playing = None;
        if !self.contains(self.selected) {
            self.selected = AUTO_QUALITY;
            self.manual = false;
        }
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn selected(&self) -> i32 {
        self.selected
    }

    pub fn is_auto(&self) -> bool {
        self.selected == AUTO_QUALITY
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn level(&self, index: i32) -> Option<QualityLevel> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.levels.get(i))
            .copied()
    }

    /// Viewer choice. `AUTO_QUALITY` hands selection back to the decoder.
    /// Returns false for an index outside the ladder.
    pub fn select_manual(&mut self, index: i32) -> bool {
        if index == AUTO_QUALITY {
            self.selected = AUTO_QUALITY;
            self.manual = false;
            return true;
        }
        if !self.contains(index) {
            return false;
        }
        self.selected = index;
        self.manual = true;
        true
    }

    /// Decoder report of the level it actually switched to.
    pub fn record_playing(&mut self, index: i32) {
        if self.contains(index) {
            self.playing = Some(index);
        }
    }

    /// Index currently in effect. Under automatic selection with no decoder
    /// report yet, the top of the ladder is assumed.
    pub fn effective(&self) -> Option<i32> {
        if self.levels.is_empty() {
            return None;
        }
        if !self.is_auto() {
            return Some(self.selected);
        }
        let top = self.levels.len() as i32 - 1;
        Some(self.playing.unwrap_or(top))
    }

    pub fn at_lowest(&self) -> bool {
        self.effective().map(|index| index <= 0).unwrap_or(true)
    }

    /// Pins selection one step below the effective level.
    pub fn step_down(&mut self) -> Option<QualityLevel> {
        let current = self.effective()?;
        if current <= 0 {
            return None;
        }
        self.selected = current - 1;
        self.playing = Some(self.selected);
        self.level(self.selected)
    }

    fn contains(&self, index: i32) -> bool {
        self.level(index).is_some()
    }
}
