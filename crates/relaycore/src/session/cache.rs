//! Client-side Local Session Cache (spec.md §4.4).
//!
//! Sessions live only on the machine running the client; the remote server
//! never persists one. Writes are atomic: serialize to a temp file in the
//! same directory, then rename over the cache file, so a crash mid-write
//! never corrupts a previously-good cache.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::defaults::{DEFAULT_SESSION_CACHE_FILENAME, DEFAULT_SESSION_EXPIRY_SECS};
use crate::errors::{AppResult, SessionError};
use crate::models::SessionRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    session_record: SessionRecord,
    cached_at: i64,
}

/// `remote_url -> service_tag -> profile -> entry`, matching the original's
/// three-level nesting so multiple remotes/services/profiles can coexist.
type SessionMap = HashMap<String, HashMap<String, HashMap<String, CacheEntry>>>;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub remote_url: String,
    pub service_tag: String,
    pub profile: String,
    pub cached_at: i64,
    pub age_seconds: i64,
    pub expired: bool,
    pub has_cookies: bool,
    pub has_headers: bool,
}

/// Client-side cache of authenticated remote sessions.
#[derive(Debug, Clone)]
pub struct LocalSessionCache {
    cache_dir: PathBuf,
    sessions_file: PathBuf,
    sessions: Arc<RwLock<SessionMap>>,
}

impl LocalSessionCache {
    pub async fn open(cache_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let cache_dir = cache_dir.into();
        tokio::fs::create_dir_all(&cache_dir).await?;
        let sessions_file = cache_dir.join(DEFAULT_SESSION_CACHE_FILENAME);
        let sessions = load_sessions(&sessions_file).await;

        let cache = Self { cache_dir, sessions_file, sessions: Arc::new(RwLock::new(sessions)) };
        let removed = cache.cleanup_expired_inner(now_secs()).await?;
        if removed > 0 {
            tracing::info!(removed, "pruned expired sessions from local cache on startup");
        }
        Ok(cache)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub async fn store_session(
        &self,
        remote_url: &str,
        service_tag: &str,
        profile: &str,
        session_record: SessionRecord,
    ) -> AppResult<()> {
        let entry = CacheEntry { session_record, cached_at: now_secs() };
        {
            let mut sessions = self.sessions.write().await;
            sessions
                .entry(remote_url.to_string())
                .or_default()
                .entry(service_tag.to_string())
                .or_default()
                .insert(profile.to_string(), entry);
        }
        self.persist().await?;
        tracing::info!(service_tag, profile, remote_url, "cached remote session");
        Ok(())
    }

    pub async fn get_session(
        &self,
        remote_url: &str,
        service_tag: &str,
        profile: &str,
    ) -> AppResult<Option<SessionRecord>> {
        let expired = {
            let sessions = self.sessions.read().await;
            match sessions.get(remote_url).and_then(|s| s.get(service_tag)).and_then(|p| p.get(profile)) {
                Some(entry) => {
                    let age = now_secs() - entry.cached_at;
                    if age >= DEFAULT_SESSION_EXPIRY_SECS {
                        Some(())
                    } else {
                        return Ok(Some(entry.session_record.clone()));
                    }
                }
                None => return Ok(None),
            }
        };
        if expired.is_some() {
            self.delete_session(remote_url, service_tag, profile).await?;
        }
        Ok(None)
    }

    pub async fn has_session(&self, remote_url: &str, service_tag: &str, profile: &str) -> AppResult<bool> {
        Ok(self.get_session(remote_url, service_tag, profile).await?.is_some())
    }

    pub async fn delete_session(&self, remote_url: &str, service_tag: &str, profile: &str) -> AppResult<bool> {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let removed = sessions
                .get_mut(remote_url)
                .and_then(|by_service| by_service.get_mut(service_tag))
                .map(|by_profile| by_profile.remove(profile).is_some())
                .unwrap_or(false);

            if let Some(by_service) = sessions.get_mut(remote_url) {
                if by_service.get(service_tag).is_some_and(|p| p.is_empty()) {
                    by_service.remove(service_tag);
                }
            }
            if sessions.get(remote_url).is_some_and(|s| s.is_empty()) {
                sessions.remove(remote_url);
            }
            removed
        };
        if removed {
            self.persist().await?;
            tracing::info!(service_tag, profile, remote_url, "deleted cached remote session");
        }
        Ok(removed)
    }

    pub async fn list_sessions(&self, remote_url: Option<&str>) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let now = now_secs();
        let mut out = Vec::new();

        for (remote, by_service) in sessions.iter() {
            if let Some(filter) = remote_url {
                if filter != remote {
                    continue;
                }
            }
            for (service_tag, by_profile) in by_service.iter() {
                for (profile, entry) in by_profile.iter() {
                    let age = now - entry.cached_at;
                    out.push(SessionSummary {
                        remote_url: remote.clone(),
                        service_tag: service_tag.clone(),
                        profile: profile.clone(),
                        cached_at: entry.cached_at,
                        age_seconds: age,
                        expired: age >= DEFAULT_SESSION_EXPIRY_SECS,
                        has_cookies: !entry.session_record.cookies.is_empty(),
                        has_headers: !entry.session_record.headers.is_empty(),
                    });
                }
            }
        }
        out
    }

    pub async fn cleanup_expired(&self) -> AppResult<usize> {
        self.cleanup_expired_inner(now_secs()).await
    }

    async fn cleanup_expired_inner(&self, now: i64) -> AppResult<usize> {
        let mut removed = 0usize;
        {
            let mut sessions = self.sessions.write().await;
            for by_service in sessions.values_mut() {
                for by_profile in by_service.values_mut() {
                    let before = by_profile.len();
                    by_profile.retain(|_, entry| now - entry.cached_at < DEFAULT_SESSION_EXPIRY_SECS);
                    removed += before - by_profile.len();
                }
                by_service.retain(|_, p| !p.is_empty());
            }
            sessions.retain(|_, s| !s.is_empty());
        }
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> AppResult<()> {
        let snapshot = self.sessions.read().await.clone();
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let cache_dir = self.cache_dir.clone();
        let dest = self.sessions_file.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&cache_dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| SessionError::CacheIo { message: e.to_string() })??;

        Ok(())
    }
}

async fn load_sessions(path: &Path) -> SessionMap {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to parse local session cache, starting empty");
            SessionMap::new()
        }),
        Err(_) => SessionMap::new(),
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cookie;

    fn sample_record() -> SessionRecord {
        let mut rec = SessionRecord::new("atvp", "default", now_secs());
        rec.cookies.insert(
            "sid".to_string(),
            Cookie { value: "abc".into(), domain: String::new(), path: "/".into(), secure: false, expires: None },
        );
        rec
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSessionCache::open(dir.path()).await.unwrap();
        cache.store_session("https://r", "atvp", "default", sample_record()).await.unwrap();

        let fetched = cache.get_session("https://r", "atvp", "default").await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn delete_removes_empty_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSessionCache::open(dir.path()).await.unwrap();
        cache.store_session("https://r", "atvp", "default", sample_record()).await.unwrap();
        assert!(cache.delete_session("https://r", "atvp", "default").await.unwrap());
        assert!(cache.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = LocalSessionCache::open(dir.path()).await.unwrap();
            cache.store_session("https://r", "atvp", "default", sample_record()).await.unwrap();
        }
        let cache = LocalSessionCache::open(dir.path()).await.unwrap();
        assert!(cache.has_session("https://r", "atvp", "default").await.unwrap());
    }

    #[tokio::test]
    async fn list_sessions_filters_by_remote() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSessionCache::open(dir.path()).await.unwrap();
        cache.store_session("https://a", "atvp", "default", sample_record()).await.unwrap();
        cache.store_session("https://b", "atvp", "default", sample_record()).await.unwrap();

        let all = cache.list_sessions(None).await;
        assert_eq!(all.len(), 2);
        let filtered = cache.list_sessions(Some("https://a")).await;
        assert_eq!(filtered.len(), 1);
    }
}
