//! In-memory session provider

use crate::error::Result;
use crate::provider::Provider;
use crate::session::{Session, SessionValues};
use async_trait::async_trait;
use cookie::Cookie;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct MemoryEntry {
    values: Arc<RwLock<SessionValues>>,
    accessed_at: Instant,
}

impl MemoryEntry {
    fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(SessionValues::new())),
            accessed_at: Instant::now(),
        }
    }
}

/// In-memory session provider
///
/// Sessions handed out share storage with the provider, so values written
/// by a handler are visible to other requests right away.
/// Fast but non-persistent - sessions are lost on restart.
#[derive(Clone)]
pub struct MemoryProvider {
    sessions: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    max_lifetime: Duration,
}

impl MemoryProvider {
    /// Create a new memory provider
    pub fn new(max_lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_lifetime,
        }
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn read(&self, sid: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(sid.to_string()).or_insert_with(MemoryEntry::new);
        entry.accessed_at = Instant::now();

        Ok(Session::from_shared(sid, Arc::clone(&entry.values)))
    }

    async fn read_existing(&self, sid: &str) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;

        // Expired but not yet collected
        if sessions
            .get(sid)
            .is_some_and(|entry| entry.accessed_at.elapsed() > self.max_lifetime)
        {
            sessions.remove(sid);
            return Ok(None);
        }

        Ok(sessions.get_mut(sid).map(|entry| {
            entry.accessed_at = Instant::now();
            Session::from_shared(sid, Arc::clone(&entry.values))
        }))
    }

    async fn exists(&self, sid: &str) -> Result<bool> {
        let sessions = self.sessions.read().await;
        Ok(sessions.contains_key(sid))
    }

    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let mut entry = sessions.remove(old_sid).unwrap_or_else(MemoryEntry::new);
        entry.accessed_at = Instant::now();

        let session = Session::from_shared(sid, Arc::clone(&entry.values));
        sessions.insert(sid.to_string(), entry);

        Ok(session)
    }

    async fn destroy(&self, sid: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(sid);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let sessions = self.sessions.read().await;
        Ok(sessions.len())
    }

    async fn gc(&self) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.accessed_at.elapsed() <= self.max_lifetime);

        debug!(removed = before - sessions.len(), "memory session gc");
        Ok(())
    }

    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get_mut(session.id()) {
            entry.accessed_at = Instant::now();
        }

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider_basic() {
        let provider = MemoryProvider::new(Duration::from_secs(60));

        assert!(!provider.exists("sid-1").await.unwrap());

        // Read creates
        let session = provider.read("sid-1").await.unwrap();
        assert!(provider.exists("sid-1").await.unwrap());
        session.set("user", "alice").await.unwrap();

        // Writes are visible without release
        let again = provider.read("sid-1").await.unwrap();
        assert_eq!(again.get::<String>("user").await, Some("alice".to_string()));
        assert_eq!(provider.count().await.unwrap(), 1);

        // Destroy
        provider.destroy("sid-1").await.unwrap();
        assert!(!provider.exists("sid-1").await.unwrap());
        assert_eq!(provider.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_provider_regenerate() {
        let provider = MemoryProvider::new(Duration::from_secs(60));

        let session = provider.read("old").await.unwrap();
        session.set("cart", 3).await.unwrap();

        let moved = provider.regenerate("old", "new").await.unwrap();
        assert_eq!(moved.id(), "new");
        assert_eq!(moved.get::<u32>("cart").await, Some(3));
        assert!(!provider.exists("old").await.unwrap());
        assert!(provider.exists("new").await.unwrap());

        // Unknown old id yields an empty session
        let fresh = provider.regenerate("missing", "other").await.unwrap();
        assert!(fresh.is_empty().await);
        assert_eq!(provider.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_memory_provider_gc() {
        let provider = MemoryProvider::new(Duration::from_millis(50));

        provider.read("stale").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        provider.read("fresh").await.unwrap();

        provider.gc().await.unwrap();

        assert!(!provider.exists("stale").await.unwrap());
        assert!(provider.exists("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_provider_release_does_not_resurrect() {
        let provider = MemoryProvider::new(Duration::from_secs(60));

        let session = provider.read("sid").await.unwrap();
        provider.destroy("sid").await.unwrap();

        assert!(provider.release(&session).await.unwrap().is_none());
        assert!(!provider.exists("sid").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_provider_read_existing() {
        let provider = MemoryProvider::new(Duration::from_millis(50));

        assert!(provider.read_existing("unknown").await.unwrap().is_none());
        assert!(!provider.exists("unknown").await.unwrap());

        let session = provider.read("known").await.unwrap();
        session.set("n", 1).await.unwrap();
        let found = provider.read_existing("known").await.unwrap().unwrap();
        assert_eq!(found.get::<u32>("n").await, Some(1));

        // Past max_lifetime the record is gone even before gc runs
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(provider.read_existing("known").await.unwrap().is_none());
        assert_eq!(provider.count().await.unwrap(), 0);
    }
}
