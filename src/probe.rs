use anyhow::{Context, Result, bail};
use log::debug;
use reqwest::blocking::Client;
use std::fs;
use std::time::Duration;
use url::Url;

use crate::hls::{ManifestVariant, parse_master_playlist};
use crate::model::Match;
use crate::player::PlayerStrategy;

const MAX_ATTEMPTS: u32 = 3;

/// What an attempt to load a surface URL found.
#[derive(Debug)]
pub enum ProbeOutcome {
    Manifest(Vec<ManifestVariant>),
    Page,
    TimedOut,
    Failed(String),
}

/// Reads a match record from a local file or an http(s) URL.
pub fn load_match(client: &Client, input: &str) -> Result<Match> {
    let body = match Url::parse(input) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => client
            .get(url)
            .send()
            .context("Failed to request match record")?
            .error_for_status()
            .context("Match service returned an error")?
            .text()
            .context("Failed to read match record")?,
        _ => fs::read_to_string(input).with_context(|| format!("Reading match file {input}"))?,
    };

    serde_json::from_str(&body).context("Malformed match record")
}

pub fn probe(client: &Client, url: &str, strategy: PlayerStrategy) -> ProbeOutcome {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(err) => return ProbeOutcome::Failed(format!("invalid URL {url}: {err}")),
    };

    let result = fetch_with_retries(client, &url).and_then(|(final_url, body)| match strategy {
        PlayerStrategy::Adaptive => {
            parse_master_playlist(&final_url, &body).map(ProbeOutcome::Manifest)
        }
        PlayerStrategy::Embed => Ok(ProbeOutcome::Page),
    });

    match result {
        Ok(outcome) => outcome,
        Err(err) if is_timeout(&err) => ProbeOutcome::TimedOut,
        Err(err) => ProbeOutcome::Failed(format!("{err:#}")),
    }
}

fn fetch_with_retries(client: &Client, url: &Url) -> Result<(Url, String)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch(client, url) {
            Ok(fetched) => return Ok(fetched),
            Err(err) if attempt < MAX_ATTEMPTS && is_transient(&err) => {
                debug!("Fetching {url} failed (attempt {attempt}): {err:#}");
                std::thread::sleep(Duration::from_millis(750));
            }
            Err(err) => return Err(err),
        }
    }
}

fn fetch(client: &Client, url: &Url) -> Result<(Url, String)> {
    let response = client
        .get(url.clone())
        .send()
        .with_context(|| format!("Requesting {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!(HttpStatus(status.as_u16()));
    }

    let final_url = response.url().clone();
    let body = response.text().context("Reading response body failed")?;
    Ok((final_url, body))
}

#[derive(Debug)]
struct HttpStatus(u16);

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server returned status {}", self.0)
    }
}

impl std::error::Error for HttpStatus {}

fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|cause| cause.is_timeout())
}

fn is_transient(err: &anyhow::Error) -> bool {
    if is_timeout(err) {
        return false;
    }
    err.chain().any(|cause| {
        cause
            .downcast_ref::<HttpStatus>()
            .map(|status| status.0 >= 500)
            .or_else(|| {
                cause
                    .downcast_ref::<reqwest::Error>()
                    .map(|e| e.is_connect() || e.is_request())
            })
            .unwrap_or(false)
    })
}
