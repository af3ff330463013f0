//! Session manager - binds session ids to cookies and drives the provider

use crate::config::{HashFunc, ManagerConfig};
use crate::error::Result;
use crate::provider::{create_provider, Provider};
use crate::session::Session;
use crate::sid;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use cookie::time::Duration as CookieDuration;
use cookie::Cookie;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const HASH_KEY_LEN: usize = 16;

/// Session manager
///
/// Cheap to clone; clones share the provider.
#[derive(Clone)]
pub struct Manager {
    provider: Arc<dyn Provider>,
    config: ManagerConfig,
}

impl Manager {
    /// Create a manager and the provider named in `config`
    pub async fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;

        let provider =
            create_provider(&config.provider, &config.cookie_name, config.max_lifetime()).await?;

        Ok(Self::with_provider(provider, config))
    }

    /// Create a manager around an already built provider
    pub fn with_provider(provider: Arc<dyn Provider>, mut config: ManagerConfig) -> Self {
        if config.hash_key.is_empty() {
            config.hash_key = sid::random_key(HASH_KEY_LEN);
        }

        info!(
            provider = provider.name(),
            cookie = %config.cookie_name,
            max_lifetime_secs = config.max_lifetime().as_secs(),
            "Session manager ready"
        );

        Self { provider, config }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Start the session for a request.
    ///
    /// Reuses the session named by the request cookie when the provider knows
    /// it; otherwise issues a new id and (if enabled) a `Set-Cookie` on
    /// `response`.
    pub async fn session_start(
        &self,
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
        response: &mut HeaderMap,
    ) -> Result<Session> {
        if let Some(sid) = self.request_sid(headers) {
            if let Some(session) = self.provider.read_existing(&sid).await? {
                return Ok(session);
            }
            debug!("Unknown session id in cookie, issuing a new one");
        }

        let sid = self.new_sid(remote_addr)?;
        let session = self.provider.read(&sid).await?;

        if self.config.enable_set_cookie && !self.provider.manages_cookie() {
            append_cookie(response, &self.session_cookie(&sid))?;
        }

        debug!(sid = %short(&sid), "New session started");
        Ok(session)
    }

    /// Destroy the session named by the request cookie and expire the cookie.
    /// Does nothing when the request carries no session cookie.
    pub async fn session_destroy(&self, headers: &HeaderMap, response: &mut HeaderMap) -> Result<()> {
        let Some(sid) = self.request_sid(headers) else {
            return Ok(());
        };

        self.provider.destroy(&sid).await?;
        append_cookie(response, &self.removal_cookie())?;

        Ok(())
    }

    /// Persist a session at the end of a request
    pub async fn session_release(&self, session: &Session, response: &mut HeaderMap) -> Result<()> {
        if let Some(cookie) = self.provider.release(session).await? {
            append_cookie(response, &self.finish_cookie(cookie))?;
        }
        Ok(())
    }

    /// Read a session directly by id
    pub async fn get_session_store(&self, sid: &str) -> Result<Session> {
        self.provider.read(sid).await
    }

    /// Move the session named by the request cookie to a fresh id.
    /// Without a session cookie a new, empty session is started.
    pub async fn session_regenerate_id(
        &self,
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
        response: &mut HeaderMap,
    ) -> Result<Session> {
        let sid = self.new_sid(remote_addr)?;

        let session = match self.request_sid(headers) {
            Some(old_sid) => self.provider.regenerate(&old_sid, &sid).await?,
            None => self.provider.read(&sid).await?,
        };

        if !self.provider.manages_cookie() {
            append_cookie(response, &self.session_cookie(&sid))?;
        }

        debug!(sid = %short(&sid), "Session id regenerated");
        Ok(session)
    }

    /// Persist `session`, then move it to a fresh id and emit the new cookie
    pub async fn regenerate_session(
        &self,
        session: &Session,
        remote_addr: Option<SocketAddr>,
        response: &mut HeaderMap,
    ) -> Result<Session> {
        let sid = self.new_sid(remote_addr)?;

        if self.provider.manages_cookie() {
            let fresh = Session::with_values(sid, session.values().await);
            self.session_release(&fresh, response).await?;
            return Ok(fresh);
        }

        self.provider.release(session).await?;
        let fresh = self.provider.regenerate(session.id(), &sid).await?;
        append_cookie(response, &self.session_cookie(&sid))?;

        debug!(sid = %short(&sid), "Session id regenerated");
        Ok(fresh)
    }

    /// Delete `session` and expire its cookie
    pub async fn destroy_session(&self, session: &Session, response: &mut HeaderMap) -> Result<()> {
        self.provider.destroy(session.id()).await?;
        append_cookie(response, &self.removal_cookie())?;

        debug!(sid = %short(session.id()), "Session destroyed");
        Ok(())
    }

    /// Number of active sessions
    pub async fn active_sessions(&self) -> Result<usize> {
        self.provider.count().await
    }

    /// Change the hash function and key used for new session ids
    pub fn set_hash_func(&mut self, func: HashFunc, key: impl Into<String>) {
        self.config.hash_func = func;
        self.config.hash_key = key.into();
    }

    /// Mark cookies `Secure`
    pub fn set_secure(&mut self, secure: bool) {
        self.config.secure = secure;
    }

    /// Run one garbage collection pass
    pub async fn run_gc(&self) -> Result<()> {
        self.provider.gc().await
    }

    /// Spawn a task running garbage collection every `gc_lifetime` seconds.
    /// The first pass runs immediately.
    pub fn spawn_gc(&self) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let period = self.config.gc_interval().max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = provider.gc().await {
                    warn!("Session gc failed on {} provider: {}", provider.name(), e);
                }
            }
        })
    }

    fn new_sid(&self, remote_addr: Option<SocketAddr>) -> Result<String> {
        sid::generate(self.config.hash_func, &self.config.hash_key, remote_addr)
    }

    /// Session id carried by the request cookie, if any
    fn request_sid(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == self.config.cookie_name && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
    }

    fn session_cookie(&self, sid: &str) -> Cookie<'static> {
        self.finish_cookie(Cookie::new(self.config.cookie_name.clone(), sid.to_string()))
    }

    /// Apply path, flags and lifetime to a session cookie
    fn finish_cookie(&self, mut cookie: Cookie<'static>) -> Cookie<'static> {
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_secure(self.config.secure);

        if self.config.cookie_lifetime > 0 {
            cookie.set_max_age(CookieDuration::seconds(self.config.cookie_lifetime as i64));
        }

        cookie
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.config.cookie_name.clone(), "");
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.make_removal();
        cookie
    }
}

fn append_cookie(response: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<()> {
    let value = HeaderValue::from_str(&cookie.encoded().to_string())?;
    response.append(SET_COOKIE, value);
    Ok(())
}

/// Leading part of an id, enough to correlate log lines
fn short(sid: &str) -> &str {
    sid.get(..8).unwrap_or(sid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CookieConfig, ProviderConfig};

    async fn create_test_manager() -> Manager {
        let config = ManagerConfig {
            cookie_name: "sid".to_string(),
            provider: ProviderConfig::Memory,
            ..ManagerConfig::default()
        };
        Manager::new(config).await.unwrap()
    }

    fn set_cookies(response: &HeaderMap) -> Vec<Cookie<'static>> {
        response
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse_encoded(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    fn request_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_start_without_cookie_sets_cookie() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();

        let session = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name(), "sid");
        assert_eq!(cookies[0].value(), session.id());
        assert_eq!(cookies[0].path(), Some("/"));
        assert_eq!(cookies[0].http_only(), Some(true));
        assert_eq!(cookies[0].max_age(), None);
        assert_eq!(session.id().len(), 40);
    }

    #[tokio::test]
    async fn test_start_with_known_cookie_reuses_session() {
        let manager = create_test_manager().await;

        let mut response = HeaderMap::new();
        let first = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();
        first.set("visits", 1).await.unwrap();

        let mut response = HeaderMap::new();
        let headers = request_with(&format!("other=1; sid={}", first.id()));
        let second = manager.session_start(&headers, None, &mut response).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.get::<u32>("visits").await, Some(1));
        assert!(response.get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_start_with_unknown_cookie_issues_new_id() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();

        let headers = request_with("sid=forged");
        let session = manager.session_start(&headers, None, &mut response).await.unwrap();

        assert_ne!(session.id(), "forged");
        assert_eq!(set_cookies(&response)[0].value(), session.id());
        assert_eq!(manager.active_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_with_expired_cookie_issues_new_id() {
        let provider = Arc::new(crate::provider::memory::MemoryProvider::new(Duration::from_millis(50)));
        let config = ManagerConfig {
            cookie_name: "sid".to_string(),
            ..ManagerConfig::default()
        };
        let manager = Manager::with_provider(provider, config);

        let mut response = HeaderMap::new();
        let old = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Expired but gc has not run yet
        let mut response = HeaderMap::new();
        let headers = request_with(&format!("sid={}", old.id()));
        let session = manager.session_start(&headers, None, &mut response).await.unwrap();

        assert_ne!(session.id(), old.id());
        assert!(!manager.provider().exists(old.id()).await.unwrap());
        assert_eq!(manager.active_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_respects_enable_set_cookie() {
        let config = ManagerConfig {
            enable_set_cookie: false,
            ..ManagerConfig::default()
        };
        let manager = Manager::new(config).await.unwrap();
        let mut response = HeaderMap::new();

        manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        assert!(response.get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_cookie_attributes_follow_config() {
        let config = ManagerConfig {
            cookie_lifetime: 3600,
            secure: true,
            ..ManagerConfig::default()
        };
        let manager = Manager::new(config).await.unwrap();
        let mut response = HeaderMap::new();

        manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        let cookie = &set_cookies(&response)[0];
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(3600)));
    }

    #[tokio::test]
    async fn test_md5_hash_func() {
        let mut manager = create_test_manager().await;
        manager.set_hash_func(HashFunc::Md5, "");
        let mut response = HeaderMap::new();

        let session = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        assert_eq!(session.id().len(), 32);
    }

    #[tokio::test]
    async fn test_set_secure() {
        let mut manager = create_test_manager().await;
        manager.set_secure(true);
        let mut response = HeaderMap::new();

        manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        assert_eq!(set_cookies(&response)[0].secure(), Some(true));
    }

    #[tokio::test]
    async fn test_spawn_gc_expires_sessions() {
        let config = ManagerConfig {
            gc_lifetime: 1,
            max_lifetime: 1,
            ..ManagerConfig::default()
        };
        let manager = Manager::new(config).await.unwrap();
        let mut response = HeaderMap::new();
        manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();
        assert_eq!(manager.active_sessions().await.unwrap(), 1);

        let gc = manager.spawn_gc();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        gc.abort();

        assert_eq!(manager.active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_destroy() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();
        let session = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        let mut response = HeaderMap::new();
        let headers = request_with(&format!("sid={}", session.id()));
        manager.session_destroy(&headers, &mut response).await.unwrap();

        assert!(!manager.provider().exists(session.id()).await.unwrap());
        let cookie = &set_cookies(&response)[0];
        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }

    #[tokio::test]
    async fn test_destroy_without_cookie_is_noop() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();

        manager.session_destroy(&HeaderMap::new(), &mut response).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_id_keeps_values() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();
        let session = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();
        session.set("user", "alice").await.unwrap();

        let mut response = HeaderMap::new();
        let headers = request_with(&format!("sid={}", session.id()));
        let regenerated = manager
            .session_regenerate_id(&headers, None, &mut response)
            .await
            .unwrap();

        assert_ne!(regenerated.id(), session.id());
        assert_eq!(regenerated.get::<String>("user").await, Some("alice".to_string()));
        assert!(!manager.provider().exists(session.id()).await.unwrap());
        assert_eq!(set_cookies(&response)[0].value(), regenerated.id());
        assert_eq!(manager.active_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_regenerate_id_without_cookie_starts_new_session() {
        let manager = create_test_manager().await;
        let mut response = HeaderMap::new();

        let session = manager
            .session_regenerate_id(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();

        assert!(session.is_empty().await);
        assert!(manager.provider().exists(session.id()).await.unwrap());
        assert_eq!(set_cookies(&response)[0].value(), session.id());
    }

    #[tokio::test]
    async fn test_get_session_store() {
        let manager = create_test_manager().await;
        let session = manager.get_session_store("known").await.unwrap();
        session.set("k", "v").await.unwrap();

        let again = manager.get_session_store("known").await.unwrap();
        assert_eq!(again.get::<String>("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_cookie_provider_roundtrip_through_manager() {
        let config = ManagerConfig {
            cookie_name: "state".to_string(),
            provider: ProviderConfig::Cookie(CookieConfig {
                secret: "manager-test-secret-that-is-long-enough".to_string(),
            }),
            ..ManagerConfig::default()
        };
        let manager = Manager::new(config).await.unwrap();

        // The provider owns the cookie, so start emits nothing
        let mut response = HeaderMap::new();
        let session = manager
            .session_start(&HeaderMap::new(), None, &mut response)
            .await
            .unwrap();
        assert!(response.get(SET_COOKIE).is_none());

        session.set("cart", vec!["apple"]).await.unwrap();
        manager.session_release(&session, &mut response).await.unwrap();
        let cookie = set_cookies(&response).remove(0);
        assert_eq!(cookie.name(), "state");
        assert_eq!(cookie.http_only(), Some(true));

        let headers = request_with(&cookie.encoded().stripped().to_string());
        let mut response = HeaderMap::new();
        let restored = manager.session_start(&headers, None, &mut response).await.unwrap();
        assert_eq!(restored.get::<Vec<String>>("cart").await, Some(vec!["apple".to_string()]));
    }

    #[tokio::test]
    async fn test_run_gc() {
        let config = ManagerConfig {
            gc_lifetime: 1,
            max_lifetime: 1,
            ..ManagerConfig::default()
        };
        let manager = Manager::new(config).await.unwrap();
        manager.get_session_store("old").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        manager.run_gc().await.unwrap();

        assert_eq!(manager.active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ManagerConfig {
            gc_lifetime: 0,
            ..ManagerConfig::default()
        };
        assert!(Manager::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_feature_provider_rejected() {
        #[cfg(not(feature = "redis"))]
        {
            let config = ManagerConfig {
                provider: ProviderConfig::Redis(Default::default()),
                ..ManagerConfig::default()
            };
            assert!(Manager::new(config).await.is_err());
        }
    }
}
