//! Plan Artifact Store: one deliberative plan (markdown + metadata) per session.
//!
//! Shares the Memory Store's write-to-tmp-then-rename primitive for `meta.json` (same crash-safe
//! guarantee, no reason to duplicate a second protocol for a second kind of durable artifact);
//! `plan.md` itself is written directly since it has no backup/recovery requirement in the
//! specification beyond "create overwrites". Session ids are validated against the same
//! character class [`crate::types::validate_session_id`] enforces elsewhere, so a plan path is
//! always `{root}/{sessionId}/...` and never escapes the store root.

use crate::error::Result;
use crate::types::{validate_session_id, Plan, PlanMeta};
use std::path::{Path, PathBuf};

/// Directory-backed store for one [`Plan`] per session.
pub struct PlanStore {
    root: PathBuf,
}

impl PlanStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn plan_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn plan_path(&self, session_id: &str) -> PathBuf {
        self.plan_dir(session_id).join("plan.md")
    }

    fn meta_path(&self, session_id: &str) -> PathBuf {
        self.plan_dir(session_id).join("meta.json")
    }

    /// Create or overwrite the plan for `session_id`. Returns `INVALID_SESSION_ID` for a
    /// malformed id rather than writing anywhere.
    pub async fn create(&self, session_id: &str, title: &str, content: &str, now: i64) -> Result<Plan> {
        validate_session_id(session_id)?;
        let dir = self.plan_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| crate::error::Error::CreateDirFailed(e.to_string()))?;

        let plan_path = self.plan_path(session_id);
        let meta_path = self.meta_path(session_id);

        let existing_created_at = try_read_meta(&meta_path).await.map(|m| m.created_at);
        let meta = PlanMeta {
            id: session_id.to_string(),
            title: title.to_string(),
            session_id: session_id.to_string(),
            created_at: existing_created_at.unwrap_or(now),
            updated_at: now,
            file_path: plan_path.to_string_lossy().into_owned(),
        };

        write_plan_md(&plan_path, content).await?;
        write_meta_atomic(&meta_path, &meta).await?;

        Ok(Plan { meta, content: content.to_string() })
    }

    /// Read the plan for `session_id`, or `None` if it doesn't exist or the id is invalid.
    pub async fn read(&self, session_id: &str) -> Option<Plan> {
        if validate_session_id(session_id).is_err() {
            return None;
        }
        let meta = try_read_meta(&self.meta_path(session_id)).await?;
        let content = tokio::fs::read_to_string(self.plan_path(session_id)).await.ok()?;
        Some(Plan { meta, content })
    }

    /// Remove the plan directory for `session_id`. A no-op (not an error) for an invalid id or
    /// an already-absent plan.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        if validate_session_id(session_id).is_err() {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(self.plan_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::error::Error::other(format!(
                "failed to delete plan for {session_id}: {e}"
            ))),
        }
    }
}

async fn try_read_meta(path: &Path) -> Option<PlanMeta> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn write_plan_md(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| crate::error::Error::other(format!("failed to write plan markdown: {e}")))
}

/// Same write-to-tmp-then-rename shape [`crate::memory::write_atomic`] uses for sessions,
/// kept as a private copy here since the two stores have independent on-disk layouts and no
/// other code needs a shared generic writer.
async fn write_meta_atomic(path: &Path, meta: &PlanMeta) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| crate::error::Error::other("plan meta path has no parent directory"))?;
    let pid = std::process::id();
    let now: i64 = meta.updated_at;
    let rand_suffix: u32 = rand::random();
    let tmp_path = parent.join(format!("meta.json.{pid}.{now}.{rand_suffix:08x}.tmp"));

    let json = serde_json::to_vec_pretty(meta)?;
    if let Err(e) = tokio::fs::write(&tmp_path, &json).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(crate::error::Error::other(format!("failed to write temp plan meta: {e}")));
    }

    let result = tokio::fs::rename(&tmp_path, path).await;
    let _ = tokio::fs::remove_file(&tmp_path).await;
    if let Err(e) = result {
        return Err(crate::error::Error::other(format!("failed to rename plan meta into place: {e}")));
    }
    Ok(())
}
