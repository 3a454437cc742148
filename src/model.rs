use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality index meaning "let the decoder pick".
pub const AUTO_QUALITY: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub teams: Option<Teams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teams {
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub provider: String,
    pub provider_match_id: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hd: bool,
    /// Playable URL published by the provider itself (typically a
    /// manifest). Replaces the embed template for stream index 1.
    #[serde(default)]
    pub direct_url: Option<String>,
}

impl Source {
    pub fn direct(
        provider: impl Into<String>,
        provider_match_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Source {
            direct_url: Some(url.into()),
            ..Source::new(provider, provider_match_id)
        }
    }

    pub fn new(provider: impl Into<String>, provider_match_id: impl Into<String>) -> Self {
        Source {
            provider: provider.into(),
            provider_match_id: provider_match_id.into(),
            language: None,
            hd: false,
            direct_url: None,
        }
    }
}

/// A playable unit derived from a [`Source`] and a stream index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub provider: String,
    pub provider_match_id: String,
    pub stream_index: u32,
    pub language: String,
    pub is_hd: bool,
    pub embed_url: String,
    /// Stamped by the session when the stream becomes active.
    pub resolved_at: Option<DateTime<Utc>>,
}

// Identity only: provider, id, index and URL. Metadata and the resolution
// timestamp never force a reload.
impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.provider_match_id == other.provider_match_id
            && self.stream_index == other.stream_index
            && self.embed_url == other.embed_url
    }
}

impl Eq for Stream {}

impl Stream {
    pub fn matches_source(&self, source: &Source) -> bool {
        self.provider == source.provider && self.provider_match_id == source.provider_match_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityLevel {
    pub index: i32,
    pub width: u64,
    pub height: u64,
    pub bitrate_bps: u64,
}

impl QualityLevel {
    pub fn label(&self) -> String {
        if self.height > 0 {
            format!("{}p", self.height)
        } else if self.bitrate_bps > 0 {
            format!("{} kbps", self.bitrate_bps / 1000)
        } else {
            "unknown".into()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub sources_checked: usize,
    pub sources_with_streams: usize,
    pub provider_names: Vec<String>,
}
