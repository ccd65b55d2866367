//! Session Memory Store: one JSON document per session, persisted with a write-to-tmp,
//! backup-then-rename protocol that survives a crash mid-write.
//!
//! The teacher SDK keeps conversation state purely in-process (`Client`'s message `Vec`); this
//! module is new, grounded on the "write-to-tmp-then-rename" idiom this lineage's example repos
//! use for other durable artifacts (manifest/checkpoint files), using the `tempfile` crate for
//! the same-filesystem temp file and `tokio::fs` for the rest.

use crate::error::{Error, Result};
use crate::types::{validate_session_id, Message, Session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;

const RENAME_ATTEMPTS: u32 = 5;
const RENAME_BACKOFF_MS: u64 = 100;

/// Crash-safe, directory-backed store for [`Session`] documents.
pub struct MemoryStore {
    root: PathBuf,
    locks: StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("session.json")
    }

    /// Per-path serialized lock: operations on the same file queue behind one another;
    /// different paths proceed independently.
    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn create(&self, id: &str) -> Result<Session> {
        validate_session_id(id)?;
        let now = now_millis();
        let session = Session::new(id, now);
        let path = self.session_path(id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        write_atomic(&path, &session).await?;
        Ok(session)
    }

    pub async fn load_session(&self, id: &str) -> Result<Session> {
        validate_session_id(id)?;
        let path = self.session_path(id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        read_with_recovery(&path).await
    }

    pub async fn append_message(&self, id: &str, message: Message) -> Result<Session> {
        validate_session_id(id)?;
        let path = self.session_path(id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        let mut session = read_with_recovery(&path).await?;
        let now = now_millis();
        session.push(message, now);
        write_atomic(&path, &session).await?;
        Ok(session)
    }

    /// Replace the message prefix `[0, upto)` with a single summary message, for compaction.
    pub async fn replace_prefix(&self, id: &str, upto: usize, summary: Message) -> Result<Session> {
        validate_session_id(id)?;
        let path = self.session_path(id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        let mut session = read_with_recovery(&path).await?;
        let upto = upto.min(session.messages.len());
        let mut rest = session.messages.split_off(upto);
        session.messages.clear();
        session.messages.push(summary);
        session.messages.append(&mut rest);
        session.compaction_count += 1;
        session.updated_at = now_millis();
        write_atomic(&path, &session).await?;
        Ok(session)
    }

    /// Load every session under the store root matching `filter`. Ids that fail validation or
    /// whose document is unreadable are skipped rather than failing the whole query.
    pub async fn query_sessions(&self, filter: impl Fn(&Session) -> bool) -> Result<Vec<Session>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::ReadDirFailed(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::ReadDirFailed(e.to_string()))?
        {
            let Some(id) = entry.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if validate_session_id(&id).is_err() {
                continue;
            }
            if let Ok(session) = self.load_session(&id).await {
                if filter(&session) {
                    out.push(session);
                }
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        validate_session_id(id)?;
        let dir = self.session_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::other(format!("failed to delete session {id}: {e}"))),
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("json.bak")
}

fn corrupt_path(path: &Path, now: i64) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(format!(".corrupt-{now}"));
    PathBuf::from(s)
}

/// Write `value` to `path` atomically: ensure the parent directory exists, back up any existing
/// primary, write to a temp file in the same directory, then rename into place with retry on
/// transient failures.
async fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::other("session path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::CreateDirFailed(e.to_string()))?;

    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let _ = tokio::fs::copy(path, backup_path(path)).await;
    }

    let pid = std::process::id();
    let now = now_millis();
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("session.json");
    let tmp_path = tempfile::Builder::new()
        .prefix(&format!("{file_name}.{pid}.{now}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::other(format!("failed to create temp session file: {e}")))?
        .into_temp_path()
        .keep()
        .map_err(|e| Error::other(format!("failed to keep temp session file: {e}")))?;

    let json = serde_json::to_vec_pretty(value)?;
    let write_result = tokio::fs::write(&tmp_path, &json).await;
    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::other(format!("failed to write temp session file: {e}")));
    }

    let mut last_err = None;
    for attempt in 1..=RENAME_ATTEMPTS {
        match tokio::fs::rename(&tmp_path, path).await {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(std::time::Duration::from_millis(RENAME_BACKOFF_MS * attempt as u64)).await;
            }
        }
    }

    let _ = tokio::fs::remove_file(&tmp_path).await;

    if let Some(e) = last_err {
        return Err(Error::other(format!("failed to rename session file into place: {e}")));
    }
    Ok(())
}

async fn try_parse(path: &Path) -> Option<Session> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Read `path` applying the primary/backup recovery algorithm.
async fn read_with_recovery(path: &Path) -> Result<Session> {
    let backup = backup_path(path);
    let primary_exists = tokio::fs::try_exists(path).await.unwrap_or(false);

    if !primary_exists {
        if let Some(session) = try_parse(&backup).await {
            let _ = tokio::fs::copy(&backup, path).await;
            return Ok(session);
        }
        return Err(Error::other(format!("session file not found: {}", path.display())));
    }

    if let Some(session) = try_parse(path).await {
        return Ok(session);
    }

    // Primary exists but failed to parse: it is corrupt.
    if let Some(session) = try_parse(&backup).await {
        let now = now_millis();
        let _ = tokio::fs::rename(path, corrupt_path(path, now)).await;
        let _ = tokio::fs::copy(&backup, path).await;
        return Ok(session);
    }

    Err(Error::corrupt(format!(
        "both primary and backup unreadable for {}",
        path.display()
    )))
}
