//! SQL session provider
//!
//! Targets MySQL, but runs on any sqlx `Any` URL whose dialect accepts `?`
//! placeholders (SQLite is used for the tests).

use crate::config::MysqlConfig;
use crate::error::{Result, SessionError};
use crate::provider::Provider;
use crate::session::{Session, SessionValues};
use async_trait::async_trait;
use chrono::Utc;
use cookie::Cookie;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{AnyPool, Row};
use std::time::Duration;
use tracing::{debug, warn};

/// SQL session provider
///
/// Table layout:
///
/// ```sql
/// CREATE TABLE session (
///     session_key    VARCHAR(64) NOT NULL PRIMARY KEY,
///     session_data   TEXT,
///     session_expiry BIGINT NOT NULL
/// );
/// ```
///
/// `session_expiry` holds the unix time of the last access.
#[derive(Clone)]
pub struct MysqlProvider {
    pool: AnyPool,
    table: String,
    max_lifetime: Duration,
}

impl MysqlProvider {
    /// Connect and make sure the session table exists
    pub async fn new(config: MysqlConfig, max_lifetime: Duration) -> Result<Self> {
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        Self::with_pool(pool, &config.table, max_lifetime).await
    }

    /// Use an existing pool
    pub async fn with_pool(pool: AnyPool, table: &str, max_lifetime: Duration) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SessionError::Config(format!("invalid session table name: {:?}", table)));
        }

        let provider = Self {
            pool,
            table: table.to_string(),
            max_lifetime,
        };
        provider.ensure_table().await?;

        Ok(provider)
    }

    async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                session_key VARCHAR(64) NOT NULL PRIMARY KEY,
                session_data TEXT,
                session_expiry BIGINT NOT NULL
            )",
            self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_empty(&self, sid: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (session_key, session_data, session_expiry) VALUES (?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(sid.to_string())
            .bind("{}".to_string())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_values(sid: &str, data: Option<String>) -> SessionValues {
    match data.as_deref() {
        None | Some("") => SessionValues::new(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!("Discarding unreadable session {}: {}", sid, e);
            SessionValues::new()
        }),
    }
}

#[async_trait]
impl Provider for MysqlProvider {
    async fn read(&self, sid: &str) -> Result<Session> {
        if let Some(session) = self.read_existing(sid).await? {
            return Ok(session);
        }

        self.insert_empty(sid).await?;
        Ok(Session::new(sid))
    }

    async fn read_existing(&self, sid: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT session_data FROM {} WHERE session_key = ?", self.table);
        let Some(row) = sqlx::query(&sql)
            .bind(sid.to_string())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let data: Option<String> = row.try_get("session_data")?;

        let touch = format!("UPDATE {} SET session_expiry = ? WHERE session_key = ?", self.table);
        sqlx::query(&touch)
            .bind(Utc::now().timestamp())
            .bind(sid.to_string())
            .execute(&self.pool)
            .await?;

        Ok(Some(Session::with_values(sid, decode_values(sid, data))))
    }

    async fn exists(&self, sid: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE session_key = ?", self.table);
        let count: i64 = sqlx::query(&sql)
            .bind(sid.to_string())
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        Ok(count > 0)
    }

    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session> {
        if self.exists(old_sid).await? {
            let sql = format!("UPDATE {} SET session_key = ? WHERE session_key = ?", self.table);
            sqlx::query(&sql)
                .bind(sid.to_string())
                .bind(old_sid.to_string())
                .execute(&self.pool)
                .await?;
        }

        self.read(sid).await
    }

    async fn destroy(&self, sid: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE session_key = ?", self.table);
        sqlx::query(&sql)
            .bind(sid.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query(&sql).fetch_one(&self.pool).await?.try_get(0)?;

        Ok(count.max(0) as usize)
    }

    async fn gc(&self) -> Result<()> {
        let cutoff = Utc::now().timestamp() - self.max_lifetime.as_secs() as i64;
        let sql = format!("DELETE FROM {} WHERE session_expiry < ?", self.table);
        let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;

        debug!(removed = result.rows_affected(), "mysql session gc");
        Ok(())
    }

    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let data = serde_json::to_string(&session.values().await)?;
        let sql = format!(
            "UPDATE {} SET session_data = ?, session_expiry = ? WHERE session_key = ?",
            self.table
        );
        sqlx::query(&sql)
            .bind(data)
            .bind(Utc::now().timestamp())
            .bind(session.id().to_string())
            .execute(&self.pool)
            .await?;

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}
