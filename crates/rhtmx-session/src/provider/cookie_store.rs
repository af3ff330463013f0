//! Cookie session provider
//!
//! Keeps the whole session client-side in one encrypted, authenticated
//! cookie. The "session id" handed to this provider is the cookie value.

use crate::config::CookieConfig;
use crate::error::{Result, SessionError};
use crate::provider::Provider;
use crate::session::{Session, SessionRecord};
use async_trait::async_trait;
use cookie::{Cookie, CookieJar, Key};
use std::time::Duration;
use tracing::{debug, warn};

const MIN_SECRET_LEN: usize = 32;

// Browsers drop cookies above this size
const MAX_COOKIE_LEN: usize = 4096;

/// Cookie session provider
#[derive(Clone)]
pub struct CookieProvider {
    key: Key,
    cookie_name: String,
    max_lifetime: Duration,
}

impl CookieProvider {
    /// Create a new cookie provider. The secret must be at least 32 bytes.
    pub fn new(config: &CookieConfig, cookie_name: &str, max_lifetime: Duration) -> Result<Self> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(SessionError::Config(format!(
                "cookie provider secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            key: Key::derive_from(config.secret.as_bytes()),
            cookie_name: cookie_name.to_string(),
            max_lifetime,
        })
    }

    /// Decrypt a cookie value into a record.
    /// Tampered, foreign or expired values yield `None`.
    fn open(&self, value: &str) -> Option<SessionRecord> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(self.cookie_name.clone(), value.to_string()));

        let cookie = jar.private(&self.key).get(&self.cookie_name)?;
        let record = SessionRecord::from_json(cookie.value()).ok()?;

        if record.is_expired(self.max_lifetime) {
            debug!("cookie session expired");
            return None;
        }

        Some(record)
    }

    fn seal(&self, record: &SessionRecord) -> Result<Cookie<'static>> {
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key)
            .add(Cookie::new(self.cookie_name.clone(), record.to_json()?));

        let cookie = jar
            .get(&self.cookie_name)
            .cloned()
            .ok_or_else(|| SessionError::Crypto("failed to seal session cookie".to_string()))?;

        if cookie.value().len() > MAX_COOKIE_LEN {
            warn!(
                len = cookie.value().len(),
                "session cookie exceeds {} bytes and may be dropped by the browser", MAX_COOKIE_LEN
            );
        }

        Ok(cookie)
    }
}

#[async_trait]
impl Provider for CookieProvider {
    async fn read(&self, sid: &str) -> Result<Session> {
        let record = self.open(sid).unwrap_or_else(SessionRecord::empty);
        Ok(record.into_session(sid))
    }

    // The data travels with the request, so there is nothing to look up
    async fn exists(&self, _sid: &str) -> Result<bool> {
        Ok(true)
    }

    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session> {
        let record = self.open(old_sid).unwrap_or_else(SessionRecord::empty);
        Ok(record.into_session(sid))
    }

    async fn destroy(&self, _sid: &str) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }

    async fn gc(&self) -> Result<()> {
        Ok(())
    }

    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let record = session.to_record().await;
        Ok(Some(self.seal(&record)?))
    }

    fn manages_cookie(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "cookie"
    }
}
