use anyhow::{Context, Result, bail};
use url::Url;

use crate::model::QualityLevel;

pub mod ladder;

#[derive(Debug, Clone)]
pub struct ManifestVariant {
    pub uri: Url,
    pub level: QualityLevel,
}

/// Extracts the quality variants of a master playlist, lowest bitrate
/// first. A media playlist yields an empty list.
pub fn parse_master_playlist(base_url: &Url, body: &str) -> Result<Vec<ManifestVariant>> {
    if !body.trim_start().starts_with("#EXTM3U") {
        bail!("Not an HLS playlist");
    }

    let mut variants = Vec::new();
    let mut pending_attrs: Option<Vec<(String, String)>> = None;

    for line in body.lines().map(str::trim) {
        if line.starts_with("#EXT-X-STREAM-INF:") {
            let attrs = parse_attribute_line(line.trim_start_matches("#EXT-X-STREAM-INF:"));
            pending_attrs = Some(attrs);
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(attrs) = pending_attrs.take() {
            let uri = resolve_url(base_url, line)
                .with_context(|| format!("Resolving stream URI from master playlist: {line}"))?;

            let mut bandwidth = 0;
            let mut resolution = None;

            for (key, value) in attrs {
                match key.as_str() {
                    "BANDWIDTH" => bandwidth = value.parse().unwrap_or(0),
                    "AVERAGE-BANDWIDTH" if bandwidth == 0 => bandwidth = value.parse().unwrap_or(0),
                    "RESOLUTION" => resolution = parse_resolution(&value),
                    _ => {}
                }
            }

            let (width, height) = resolution.unwrap_or((0, 0));
            if bandwidth == 0 {
                // rough estimate so unlabeled variants still sort sensibly
                bandwidth = height * 1000;
            }

            variants.push(ManifestVariant {
                uri,
                level: QualityLevel {
                    index: 0,
                    width,
                    height,
                    bitrate_bps: bandwidth,
                },
            });
        }
    }

    variants.sort_by(|a, b| {
        a.level
            .bitrate_bps
            .cmp(&b.level.bitrate_bps)
            .then(a.level.height.cmp(&b.level.height))
    });
    for (index, variant) in variants.iter_mut().enumerate() {
        variant.level.index = index as i32;
    }

    Ok(variants)
}

pub fn levels(variants: &[ManifestVariant]) -> Vec<QualityLevel> {
    variants.iter().map(|variant| variant.level).collect()
}

fn resolve_url(base: &Url, input: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(input) {
        return Ok(url);
    }

    base.join(input).context("Failed to resolve relative URL")
}

fn parse_attribute_line(value: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in value.chars() {
        match ch {
            ',' if !in_quotes => {
                if !current.is_empty() {
                    pairs.push(current.trim().to_string());
                    current.clear();
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        pairs.push(current.trim().to_string());
    }

    pairs
        .into_iter()
        .filter_map(|pair| {
            pair.split_once('=').map(|(k, v)| {
                let val = v.trim().trim_matches('"').to_string();
                (k.trim().to_string(), val)
            })
        })
        .collect()
}

fn parse_resolution(value: &str) -> Option<(u64, u64)> {
    let (w, h) = value.split_once('x')?;
    let width = w.parse().ok()?;
    let height = h.parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests;
