use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use url::Url;

pub mod cache;

use cache::DomainCache;

/// Tunable timings and thresholds of the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPolicy {
    /// Buffer stalls tolerated before the one automatic quality downgrade.
    pub stall_threshold: u32,
    /// How long a loaded primary embed may sit without interaction before
    /// switching to the fallback.
    pub fallback_delay: Duration,
    /// No load signal within this window counts as loaded.
    pub load_timeout: Duration,
    /// Interactions swallowed by the interaction gate.
    pub interaction_threshold: u32,
    pub countdown_tick: Duration,
    pub controls_hide_delay: Duration,
    /// Stream indices resolved per source beyond the mandatory first one.
    pub extra_streams: u32,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            stall_threshold: 3,
            fallback_delay: Duration::from_secs(20),
            load_timeout: Duration::from_secs(15),
            interaction_threshold: 3,
            countdown_tick: Duration::from_secs(1),
            controls_hide_delay: Duration::from_secs(3),
            extra_streams: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DomainDocument {
    domain: String,
}

/// Process-wide embed domain. Read on every resolution, written only on
/// refresh.
pub struct EmbedDomainConfig {
    domain: RwLock<String>,
    cache: Option<Mutex<DomainCache>>,
}

impl EmbedDomainConfig {
    pub fn new(domain: &str) -> Result<Self> {
        Ok(EmbedDomainConfig {
            domain: RwLock::new(normalize_domain(domain)?),
            cache: None,
        })
    }

    /// Starts from the explicit domain if given, else the cached one.
    pub fn with_cache(explicit: Option<&str>, cache: DomainCache) -> Result<Self> {
        let domain = match explicit {
            Some(domain) => normalize_domain(domain)?,
            None => match cache.load() {
                Some((domain, fresh)) => {
                    if !fresh {
                        warn!("Cached embed domain {domain} is stale, consider refreshing");
                    }
                    normalize_domain(&domain)?
                }
                None => bail!("No embed domain configured and none cached"),
            },
        };

        Ok(EmbedDomainConfig {
            domain: RwLock::new(domain),
            cache: Some(Mutex::new(cache)),
        })
    }

    /// First run without a cached domain: the endpoint is the only source.
    pub fn bootstrap(client: &Client, endpoint: &Url, cache: DomainCache) -> Result<Self> {
        let document = fetch_document(client, endpoint)?;
        let config = Self::with_cache(Some(&document.domain), cache)?;
        config.set(&document.domain)?;
        Ok(config)
    }

    pub fn current(&self) -> String {
        self.domain
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, domain: &str) -> Result<()> {
        let domain = normalize_domain(domain)?;
        debug!("Embed domain set to {domain}");
        *self
            .domain
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = domain.clone();

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .store(&domain);
        }
        Ok(())
    }

    /// Fetches `{ "domain": "..." }` from `endpoint` and makes it current.
    pub fn refresh(&self, client: &Client, endpoint: &Url) -> Result<String> {
        let document = fetch_document(client, endpoint)?;
        self.set(&document.domain)?;
        Ok(self.current())
    }
}

fn fetch_document(client: &Client, endpoint: &Url) -> Result<DomainDocument> {
    info!("Fetching embed domain from {endpoint}");
    client
        .get(endpoint.clone())
        .send()
        .context("Failed to request embed domain")?
        .error_for_status()
        .context("Embed domain endpoint returned an error")?
        .json()
        .context("Malformed embed domain document")
}

pub fn normalize_domain(domain: &str) -> Result<String> {
    let trimmed = domain.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).with_context(|| format!("Invalid embed domain: {domain}"))?;
    if url.cannot_be_a_base() {
        bail!("Embed domain must be an absolute URL: {domain}");
    }
    Ok(trimmed.to_string())
}
