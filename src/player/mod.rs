use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

use crate::model::Stream;

pub mod adaptive;
pub mod controls;
pub mod countdown;
pub mod embed;
pub mod fallback;
pub mod interaction;
pub mod timer;

static MANIFEST_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.m3u8($|[?#])").expect("valid manifest regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStrategy {
    /// Manifest handled by the adaptive streaming controller.
    Adaptive,
    /// Generic third-party embed behind the interaction gate.
    Embed,
}

impl fmt::Display for PlayerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerStrategy::Adaptive => f.write_str("adaptive (hls)"),
            PlayerStrategy::Embed => f.write_str("embed"),
        }
    }
}

pub fn dispatch(embed_url: &str) -> PlayerStrategy {
    let is_manifest = match Url::parse(embed_url) {
        Ok(url) => url.path().to_ascii_lowercase().ends_with(".m3u8"),
        Err(_) => MANIFEST_SUFFIX.is_match(embed_url),
    };

    if is_manifest {
        PlayerStrategy::Adaptive
    } else {
        PlayerStrategy::Embed
    }
}

/// Remembers the strategy of the last stream so it is only recomputed when
/// the stream identity changes.
#[derive(Debug, Default)]
pub struct StrategyCache {
    last: Option<(Stream, PlayerStrategy)>,
    evaluations: u32,
}

impl StrategyCache {
    pub fn strategy_for(&mut self, stream: &Stream) -> PlayerStrategy {
        if let Some((cached, strategy)) = &self.last {
            if cached == stream {
                return *strategy;
            }
        }
        let strategy = dispatch(&stream.embed_url);
        self.evaluations += 1;
        self.last = Some((stream.clone(), strategy));
        strategy
    }

    pub fn evaluations(&self) -> u32 {
        self.evaluations
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests;
