//! File session provider

use crate::config::FileConfig;
use crate::error::{Result, SessionError};
use crate::provider::Provider;
use crate::session::{Session, SessionRecord};
use async_trait::async_trait;
use cookie::Cookie;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File session provider
///
/// Stores each session as a JSON file at `<save_path>/<sid[0]>/<sid[1]>/<sid>`.
/// The file modification time is the last access time.
/// Persistent across restarts, suitable for single-instance deployments.
#[derive(Clone)]
pub struct FileProvider {
    config: FileConfig,
    max_lifetime: Duration,
}

impl FileProvider {
    /// Create a new file provider
    pub async fn new(config: FileConfig, max_lifetime: Duration) -> Result<Self> {
        fs::create_dir_all(&config.save_path).await?;

        Ok(Self {
            config,
            max_lifetime,
        })
    }

    /// Ids come from client cookies; only plain alphanumerics map to a path
    fn is_valid_sid(sid: &str) -> bool {
        sid.len() >= 2 && sid.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Get the file path for a session id
    fn sid_to_path(&self, sid: &str) -> Result<PathBuf> {
        if !Self::is_valid_sid(sid) {
            return Err(SessionError::Config(format!("invalid session id for file provider: {:?}", sid)));
        }

        Ok(self
            .config
            .save_path
            .join(&sid[0..1])
            .join(&sid[1..2])
            .join(sid))
    }

    async fn load_record(&self, path: &Path) -> Result<Option<SessionRecord>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await?;
        match SessionRecord::from_json(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Discarding unreadable session file {:?}: {}", path, e);
                Ok(Some(SessionRecord::empty()))
            }
        }
    }

    async fn write_record(&self, path: &Path, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, record.to_json()?).await?;
        Ok(())
    }

    fn session_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.config.save_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
    }
}

#[async_trait]
impl Provider for FileProvider {
    async fn read(&self, sid: &str) -> Result<Session> {
        let path = self.sid_to_path(sid)?;
        let mut record = self
            .load_record(&path)
            .await?
            .unwrap_or_else(SessionRecord::empty);

        // Rewrite to refresh the access time
        record.accessed_at = chrono::Utc::now();
        self.write_record(&path, &record).await?;

        Ok(record.into_session(sid))
    }

    async fn read_existing(&self, sid: &str) -> Result<Option<Session>> {
        if !Self::is_valid_sid(sid) {
            return Ok(None);
        }

        let path = self.sid_to_path(sid)?;
        let Some(mut record) = self.load_record(&path).await? else {
            return Ok(None);
        };

        record.accessed_at = chrono::Utc::now();
        self.write_record(&path, &record).await?;

        Ok(Some(record.into_session(sid)))
    }

    async fn exists(&self, sid: &str) -> Result<bool> {
        if !Self::is_valid_sid(sid) {
            return Ok(false);
        }
        Ok(self.sid_to_path(sid)?.exists())
    }

    async fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Session> {
        let new_path = self.sid_to_path(sid)?;

        let record = if Self::is_valid_sid(old_sid) {
            let old_path = self.sid_to_path(old_sid)?;
            let record = self.load_record(&old_path).await?;
            if record.is_some() {
                fs::remove_file(&old_path).await?;
            }
            record
        } else {
            None
        };

        let mut record = record.unwrap_or_else(SessionRecord::empty);
        record.accessed_at = chrono::Utc::now();
        self.write_record(&new_path, &record).await?;

        Ok(record.into_session(sid))
    }

    async fn destroy(&self, sid: &str) -> Result<()> {
        if !Self::is_valid_sid(sid) {
            return Ok(());
        }

        let path = self.sid_to_path(sid)?;
        if path.exists() {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.session_files().count())
    }

    async fn gc(&self) -> Result<()> {
        let now = SystemTime::now();
        let expired: Vec<PathBuf> = self
            .session_files()
            .filter(|entry| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|idle| idle > self.max_lifetime)
            })
            .map(|entry| entry.into_path())
            .collect();

        let removed = expired.len();
        for path in expired {
            fs::remove_file(&path).await.ok();
        }

        debug!(removed, "file session gc");
        Ok(())
    }

    async fn release(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let path = self.sid_to_path(session.id())?;
        if !path.exists() {
            debug!("Session {} was destroyed, not persisting", session.id());
            return Ok(None);
        }

        let record = session.to_record().await;
        self.write_record(&path, &record).await?;

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_provider(temp_dir: &TempDir, max_lifetime: Duration) -> FileProvider {
        let config = FileConfig {
            save_path: temp_dir.path().to_path_buf(),
        };
        FileProvider::new(config, max_lifetime).await.unwrap()
    }

    #[tokio::test]
    async fn test_file_provider_basic() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;

        // Read creates the file
        let session = provider.read("abcdef").await.unwrap();
        assert!(provider.exists("abcdef").await.unwrap());
        assert!(temp_dir.path().join("a").join("b").join("abcdef").exists());

        // Values persist on release
        session.set("user", "alice").await.unwrap();
        provider.release(&session).await.unwrap();

        let again = provider.read("abcdef").await.unwrap();
        assert_eq!(again.get::<String>("user").await, Some("alice".to_string()));
        assert_eq!(provider.count().await.unwrap(), 1);

        // Destroy
        provider.destroy("abcdef").await.unwrap();
        assert!(!provider.exists("abcdef").await.unwrap());
        assert_eq!(provider.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_provider_persistence() {
        let temp_dir = TempDir::new().unwrap();

        // Write with one provider instance
        {
            let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;
            let session = provider.read("persist01").await.unwrap();
            session.set("theme", "dark").await.unwrap();
            provider.release(&session).await.unwrap();
        }

        // Create new provider instance (simulating restart)
        {
            let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;
            let session = provider.read("persist01").await.unwrap();
            assert_eq!(session.get::<String>("theme").await, Some("dark".to_string()));
        }
    }

    #[tokio::test]
    async fn test_file_provider_regenerate() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;

        let session = provider.read("old123").await.unwrap();
        session.set("cart", 2).await.unwrap();
        provider.release(&session).await.unwrap();

        let moved = provider.regenerate("old123", "new456").await.unwrap();
        assert_eq!(moved.id(), "new456");
        assert_eq!(moved.get::<u32>("cart").await, Some(2));
        assert!(!provider.exists("old123").await.unwrap());
        assert!(provider.exists("new456").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_provider_release_does_not_resurrect() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;

        let session = provider.read("gone01").await.unwrap();
        session.set("user", "alice").await.unwrap();
        provider.destroy("gone01").await.unwrap();

        provider.release(&session).await.unwrap();
        assert!(!provider.exists("gone01").await.unwrap());
        assert_eq!(provider.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_provider_read_existing() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;

        assert!(provider.read_existing("nobody").await.unwrap().is_none());
        assert!(!provider.exists("nobody").await.unwrap());
        assert!(provider.read_existing("../up").await.unwrap().is_none());

        let session = provider.read("known1").await.unwrap();
        session.set("theme", "dark").await.unwrap();
        provider.release(&session).await.unwrap();

        let found = provider.read_existing("known1").await.unwrap().unwrap();
        assert_eq!(found.get::<String>("theme").await, Some("dark".to_string()));
    }

    #[tokio::test]
    async fn test_file_provider_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_secs(60)).await;

        assert!(!provider.exists("../../etc/passwd").await.unwrap());
        assert!(provider.read("../escape").await.is_err());
        assert!(provider.destroy("..").await.is_ok());
    }

    #[tokio::test]
    async fn test_file_provider_gc() {
        let temp_dir = TempDir::new().unwrap();
        let provider = create_test_provider(&temp_dir, Duration::from_millis(100)).await;

        provider.read("stale1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        provider.read("fresh1").await.unwrap();

        provider.gc().await.unwrap();

        assert!(!provider.exists("stale1").await.unwrap());
        assert!(provider.exists("fresh1").await.unwrap());
    }
}
