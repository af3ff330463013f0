//! Storage providers for sessions

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;
use cookie::Cookie;
use std::sync::Arc;
use std::time::Duration;

pub mod cookie_store;
pub mod file;
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "mysql")]
pub mod mysql_store;

/// Trait for session storage providers
///
/// A session id maps to at most one record. Providers expire records that
/// have not been accessed for longer than the `max_lifetime` they were
/// created with.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Read the session with this id, creating an empty record if none exists
    async fn read(&self, sid: &str) -> Result<Session>;

    /// Read the session only if a record already exists for this id.
    /// Never creates a record.
    async fn read_existing(&self, sid: &str) -> Result<Option<Session>> {
        if self.exists(sid).await? {
            self.read(sid).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Check if a record exists for this id
    async fn exists(&self, sid: &str) -> Result<bool>;

    /// Move the record of `old_sid` to `sid`, keeping its values.
    /// Creates an empty record when `old_sid` is unknown.
    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session>;

    /// Delete the record for this id
    async fn destroy(&self, sid: &str) -> Result<()>;

    /// Number of active sessions
    async fn count(&self) -> Result<usize>;

    /// Remove expired records
    async fn gc(&self) -> Result<()>;

    /// Persist the session at the end of a request.
    /// A record destroyed in the meantime stays destroyed.
    /// Returns a cookie to attach to the response when the provider keeps
    /// session data client-side.
    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>>;

    /// Whether the provider owns the session cookie itself
    fn manages_cookie(&self) -> bool {
        false
    }

    /// Get provider name
    fn name(&self) -> &'static str;
}

/// Create a provider from config
pub async fn create_provider(
    config: &ProviderConfig,
    cookie_name: &str,
    max_lifetime: Duration,
) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::Memory => Ok(Arc::new(memory::MemoryProvider::new(max_lifetime))),
        ProviderConfig::File(config) => {
            let provider = file::FileProvider::new(config.clone(), max_lifetime).await?;
            Ok(Arc::new(provider))
        }
        ProviderConfig::Cookie(config) => {
            let provider = cookie_store::CookieProvider::new(config, cookie_name, max_lifetime)?;
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "redis")]
        ProviderConfig::Redis(config) => {
            let provider = redis_store::RedisProvider::new(config.clone(), max_lifetime).await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "redis"))]
        ProviderConfig::Redis(_) => Err(crate::error::SessionError::Config(
            "redis provider requires the 'redis' feature to be enabled".to_string(),
        )),
        #[cfg(feature = "mysql")]
        ProviderConfig::Mysql(config) => {
            let provider = mysql_store::MysqlProvider::new(config.clone(), max_lifetime).await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "mysql"))]
        ProviderConfig::Mysql(_) => Err(crate::error::SessionError::Config(
            "mysql provider requires the 'mysql' feature to be enabled".to_string(),
        )),
    }
}
