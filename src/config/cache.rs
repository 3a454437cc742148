use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
struct CacheFile {
    embed_domain: Option<DomainEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct DomainEntry {
    domain: String,
    stored_at: u64,
}

const CACHE_TTL_DOMAIN: u64 = 24 * 60 * 60; // 1 day

/// Last known good embed domain, persisted between runs.
pub struct DomainCache {
    path: PathBuf,
    data: CacheFile,
}

impl DomainCache {
    pub fn new() -> Self {
        let path = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("matchcast")
            .join("embed_domain.json");
        Self::at(path)
    }

    pub fn at(path: PathBuf) -> Self {
        let data = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CacheFile>(&bytes).ok())
            .unwrap_or_default();

        DomainCache { path, data }
    }

    /// Returns the cached domain and whether it is still fresh.
    pub fn load(&self) -> Option<(String, bool)> {
        self.data.embed_domain.as_ref().map(|entry| {
            let fresh = entry.stored_at + CACHE_TTL_DOMAIN > now_secs();
            (entry.domain.clone(), fresh)
        })
    }

    pub fn store(&mut self, domain: &str) {
        self.data.embed_domain = Some(DomainEntry {
            domain: domain.to_string(),
            stored_at: now_secs(),
        });
        if let Err(err) = persist(&self.path, &self.data) {
            log::debug!("Could not persist embed domain cache: {err}");
        }
    }
}

fn persist(path: &PathBuf, data: &CacheFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec(data)?)?;
    fs::rename(tmp, path)?;
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_domain_survives_reload() {
        let path = std::env::temp_dir()
            .join(format!("matchcast-cache-{}", std::process::id()))
            .join("embed_domain.json");

        let mut cache = DomainCache::at(path.clone());
        cache.store("https://embed.example");

        let reloaded = DomainCache::at(path.clone());
        assert_eq!(
            reloaded.load(),
            Some(("https://embed.example".to_string(), true))
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_yields_nothing() {
        let cache = DomainCache::at(std::env::temp_dir().join("matchcast-does-not-exist.json"));
        assert!(cache.load().is_none());
    }
}
