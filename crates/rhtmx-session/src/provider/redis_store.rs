//! Redis session provider

use crate::config::RedisConfig;
use crate::error::Result;
use crate::provider::Provider;
use crate::session::{Session, SessionRecord};
use async_trait::async_trait;
use cookie::Cookie;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Redis session provider
///
/// Stores each session as JSON under `<key_prefix><sid>` with a TTL of
/// `max_lifetime`, so Redis itself expires idle sessions.
#[derive(Clone)]
pub struct RedisProvider {
    manager: ConnectionManager,
    config: RedisConfig,
    max_lifetime: Duration,
}

impl RedisProvider {
    /// Create a new Redis provider
    pub async fn new(config: RedisConfig, max_lifetime: Duration) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self {
            manager,
            config,
            max_lifetime,
        })
    }

    /// Get the full key with prefix
    fn full_key(&self, sid: &str) -> String {
        format!("{}{}", self.config.key_prefix, sid)
    }

    fn ttl_secs(&self) -> u64 {
        self.max_lifetime.as_secs().max(1)
    }

    /// Test connection to Redis
    pub async fn ping(&self) -> Result<bool> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(pong == "PONG")
    }

    async fn session_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", self.config.key_prefix);

        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<String> = conn.scan_match(&pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }

        Ok(keys)
    }

    async fn store(&self, sid: &str, record: &SessionRecord) -> Result<()> {
        let mut conn = self.manager.clone();
        let ttl = self.ttl_secs();

        conn.set_ex::<_, _, ()>(self.full_key(sid), record.to_json()?, ttl)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Provider for RedisProvider {
    async fn read(&self, sid: &str) -> Result<Session> {
        let mut conn = self.manager.clone();
        let json: Option<String> = conn.get(self.full_key(sid)).await?;

        let record = match json {
            Some(json) => SessionRecord::from_json(&json).unwrap_or_else(|e| {
                warn!("Discarding unreadable session {}: {}", sid, e);
                SessionRecord::empty()
            }),
            None => SessionRecord::empty(),
        };

        // Refresh the TTL
        self.store(sid, &record).await?;

        Ok(record.into_session(sid))
    }

    async fn read_existing(&self, sid: &str) -> Result<Option<Session>> {
        let mut conn = self.manager.clone();

        // GETEX reads and refreshes the TTL in one step
        let json: Option<String> = redis::cmd("GETEX")
            .arg(self.full_key(sid))
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await?;

        Ok(json.map(|json| {
            SessionRecord::from_json(&json)
                .unwrap_or_else(|e| {
                    warn!("Discarding unreadable session {}: {}", sid, e);
                    SessionRecord::empty()
                })
                .into_session(sid)
        }))
    }

    async fn exists(&self, sid: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(self.full_key(sid)).await?;

        Ok(exists)
    }

    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session> {
        if self.exists(old_sid).await? {
            let mut conn = self.manager.clone();
            conn.rename::<_, _, ()>(self.full_key(old_sid), self.full_key(sid))
                .await?;
            conn.expire::<_, ()>(self.full_key(sid), self.ttl_secs() as i64)
                .await?;
        }

        self.read(sid).await
    }

    async fn destroy(&self, sid: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(self.full_key(sid)).await?;

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.session_keys().await?.len())
    }

    // Keys carry a TTL; Redis expires them on its own
    async fn gc(&self) -> Result<()> {
        Ok(())
    }

    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let record = session.to_record().await;
        let mut conn = self.manager.clone();

        // XX: only overwrite a live key, a destroyed session stays gone
        let stored: Option<String> = redis::cmd("SET")
            .arg(self.full_key(session.id()))
            .arg(record.to_json()?)
            .arg("XX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await?;

        if stored.is_none() {
            debug!("Session {} was destroyed, not persisting", session.id());
        }

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
