//! Session handle and its persisted record

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

pub type SessionValues = HashMap<String, Value>;

/// What should happen to a session when its request completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Persist through the provider
    #[default]
    Active,

    /// Persist, then move to a fresh id
    Regenerate,

    /// Delete the record and expire the cookie
    Destroyed,
}

/// A session bound to one id
///
/// Cloning is cheap and clones share the same values. Providers that keep
/// sessions in memory hand out handles sharing their own storage, so writes
/// are visible without a release.
#[derive(Clone)]
pub struct Session {
    id: String,
    values: Arc<RwLock<SessionValues>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    /// Create an empty session
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_values(id, SessionValues::new())
    }

    pub fn with_values(id: impl Into<String>, values: SessionValues) -> Self {
        Self::from_shared(id, Arc::new(RwLock::new(values)))
    }

    pub(crate) fn from_shared(id: impl Into<String>, values: Arc<RwLock<SessionValues>>) -> Self {
        Self {
            id: id.into(),
            values,
            lifecycle: Arc::new(Mutex::new(Lifecycle::Active)),
        }
    }

    /// The session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get a typed value. Returns `None` when missing or of another shape.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.read().await;
        values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get the raw JSON value
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// Set a value
    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.write().await.insert(key.into(), value);
        Ok(())
    }

    /// Delete a value, returning it if present
    pub async fn delete(&self, key: &str) -> Option<Value> {
        self.values.write().await.remove(key)
    }

    /// Remove all values
    pub async fn flush(&self) {
        self.values.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    /// Ask the session middleware to destroy this session once the request completes
    pub fn invalidate(&self) {
        self.set_lifecycle(Lifecycle::Destroyed);
    }

    /// Ask the session middleware to move this session to a new id once the
    /// request completes. Has no effect on an invalidated session.
    pub fn regenerate_id(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if *lifecycle != Lifecycle::Destroyed {
            *lifecycle = Lifecycle::Regenerate;
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()) = lifecycle;
    }

    /// Snapshot of all values
    pub async fn values(&self) -> SessionValues {
        self.values.read().await.clone()
    }

    /// Persistable form of the session, stamped with the current time
    pub async fn to_record(&self) -> SessionRecord {
        SessionRecord::new(self.values().await)
    }
}

/// Persisted form of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub values: SessionValues,

    /// Last time the session was read or written
    pub accessed_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(values: SessionValues) -> Self {
        Self {
            values,
            accessed_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(SessionValues::new())
    }

    /// Time since last access
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.accessed_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Check if the record outlived `max_lifetime`
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.age() > max_lifetime
    }

    pub fn into_session(self, id: impl Into<String>) -> Session {
        Session::with_values(id, self.values)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
