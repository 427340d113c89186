//! Session cache file
//!
//! A single JSON document mapping account email to its session token and last
//! known credit balance. The file is always rewritten in full; writes use an
//! atomic temp-file + rename so a crash mid-write leaves the previous snapshot
//! intact.
//!
//! The cache holds no lock of its own. Callers that read-modify-write it (the
//! account pool) serialize access themselves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Cached session state for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    /// Value of the `sessionid` cookie. Older caches call this `session_id`.
    #[serde(alias = "session_id")]
    pub session_token: String,
    /// Last known credit balance
    #[serde(default)]
    pub credit: i64,
}

/// Email → cached session
pub type SessionMap = HashMap<String, CachedSession>;

/// Location of the session cache on disk.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, returning an error if the file exists but is unreadable
    /// or not a JSON object. A missing file is an empty cache.
    ///
    /// Individual entries that do not parse (for example an entry without a
    /// token) are skipped rather than failing the whole load.
    pub async fn load(&self) -> Result<SessionMap> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = %self.path.display(), "session cache not found");
            return Ok(SessionMap::new());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(format!("reading session cache: {e}")))?;
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|e| Error::CacheParse(format!("parsing session cache: {e}")))?;

        let mut sessions = SessionMap::with_capacity(raw.len());
        for (email, value) in raw {
            match serde_json::from_value::<CachedSession>(value) {
                Ok(session) => {
                    sessions.insert(email, session);
                }
                Err(e) => warn!(email = %email, error = %e, "skipping unusable cache entry"),
            }
        }

        info!(path = %self.path.display(), accounts = sessions.len(), "loaded session cache");
        Ok(sessions)
    }

    /// Load the cache, treating any failure as an empty cache.
    pub async fn read(&self) -> SessionMap {
        match self.load().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session cache unreadable, starting empty");
                SessionMap::new()
            }
        }
    }

    /// Replace the cache with the given mapping.
    ///
    /// Writes to a temporary file next to the target and renames it over the
    /// cache. Permissions are 0600 on unix since the file holds session tokens.
    pub async fn write(&self, sessions: &SessionMap) -> Result<()> {
        let json = serde_json::to_string_pretty(sessions)
            .map_err(|e| Error::CacheParse(format!("serializing session cache: {e}")))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating cache directory: {e}")))?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Io("cache path has no file name".into()))?;
        let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing temp cache file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(|e| Error::Io(format!("setting cache file permissions: {e}")))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::Io(format!("renaming temp cache file: {e}")))?;

        debug!(path = %self.path.display(), accounts = sessions.len(), "persisted session cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str, credit: i64) -> CachedSession {
        CachedSession {
            session_token: token.into(),
            credit,
        }
    }

    #[tokio::test]
    async fn write_then_read_yields_equal_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("cache.json"));

        let mut sessions = SessionMap::new();
        sessions.insert("a@example.com".into(), session("tok_a", 10));
        sessions.insert("b@example.com".into(), session("tok_b", -3));
        cache.write(&sessions).await.unwrap();

        assert_eq!(cache.read().await, sessions);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("absent.json"));
        assert!(cache.load().await.unwrap().is_empty());
        assert!(!cache.path().exists(), "reading must not create the file");
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let cache = CacheFile::new(path);
        assert!(matches!(cache.load().await, Err(Error::CacheParse(_))));
        assert!(cache.read().await.is_empty());
    }

    #[tokio::test]
    async fn accepts_legacy_session_id_field_and_skips_broken_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(
            &path,
            r#"{
                "old@example.com": {"session_id": "tok_old", "credit": 42},
                "broken@example.com": {"credit": 5}
            }"#,
        )
        .await
        .unwrap();

        let sessions = CacheFile::new(path).read().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions["old@example.com"], session("tok_old", 42));
    }

    #[tokio::test]
    async fn write_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("cache.json"));

        let mut first = SessionMap::new();
        first.insert("a@example.com".into(), session("tok_a", 1));
        first.insert("b@example.com".into(), session("tok_b", 2));
        cache.write(&first).await.unwrap();

        let mut second = SessionMap::new();
        second.insert("b@example.com".into(), session("tok_b", 0));
        cache.write(&second).await.unwrap();

        assert_eq!(cache.read().await, second);
    }

    #[tokio::test]
    async fn write_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("nested/store/cache.json"));
        cache.write(&SessionMap::new()).await.unwrap();
        assert!(cache.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = CacheFile::new(dir.path().join("cache.json"));
        let mut sessions = SessionMap::new();
        sessions.insert("a@example.com".into(), session("tok_a", 1));
        cache.write(&sessions).await.unwrap();

        let metadata = tokio::fs::metadata(cache.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "cache file must be 0600, got {mode:o}");
    }
}
