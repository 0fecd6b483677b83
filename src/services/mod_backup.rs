use crate::error::{ModpilotError, Result};
use jiff::Zoned;
use std::path::{Path, PathBuf};

/// Copy-aside store for single mod files, kept apart from the full server
/// archives.
///
/// Layout: `<root>/<project-id>/<YYYYmmdd_HHMMSS>_<millis>_<filename>`.
/// Names sort chronologically, so the newest backup is the greatest name.
#[derive(Debug, Clone)]
pub struct ModBackupStore {
    root: PathBuf,
    max_per_mod: usize,
}

impl ModBackupStore {
    pub fn new(root: impl Into<PathBuf>, max_per_mod: usize) -> Self {
        Self {
            root: root.into(),
            max_per_mod: max_per_mod.max(1),
        }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    /// Copy `file` aside and prune older copies of the same project.
    pub async fn snapshot(&self, project_id: &str, file: &Path) -> Result<PathBuf> {
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ModpilotError::Backup(format!("Invalid file {}", file.display())))?;

        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ModpilotError::Backup(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let now = Zoned::now();
        let stamp = now.strftime("%Y%m%d_%H%M%S").to_string();
        let mut millis = i32::from(now.millisecond());
        let mut target = dir.join(format!("{stamp}_{millis:03}_{filename}"));
        while tokio::fs::try_exists(&target).await.unwrap_or(false) {
            millis += 1;
            target = dir.join(format!("{stamp}_{millis:03}_{filename}"));
        }

        tokio::fs::copy(file, &target).await.map_err(|e| {
            ModpilotError::Backup(format!(
                "Failed to copy {} to {}: {e}",
                file.display(),
                target.display()
            ))
        })?;
        tracing::debug!(backup = %target.display(), "mod file copied aside");

        if let Err(e) = self.prune(project_id).await {
            tracing::warn!(project = project_id, "failed to prune mod backups: {e}");
        }

        Ok(target)
    }

    /// Backups of a project, newest first.
    pub async fn list(&self, project_id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.project_dir(project_id);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                backups.push(entry.path());
            }
        }

        backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(backups)
    }

    pub async fn latest(&self, project_id: &str) -> Result<Option<PathBuf>> {
        Ok(self.list(project_id).await?.into_iter().next())
    }

    /// Put `backup` back at `target`, overwriting whatever is there.
    pub async fn restore(&self, backup: &Path, target: &Path) -> Result<()> {
        tokio::fs::copy(backup, target).await.map_err(|e| {
            ModpilotError::Rollback(format!(
                "Failed to restore {} from {}: {e}",
                target.display(),
                backup.display()
            ))
        })?;
        Ok(())
    }

    /// Keep the newest `max_per_mod` backups; returns how many were removed.
    pub async fn prune(&self, project_id: &str) -> Result<usize> {
        let backups = self.list(project_id).await?;
        let mut removed = 0;
        for stale in backups.iter().skip(self.max_per_mod) {
            tokio::fs::remove_file(stale).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn snapshot_copies_into_project_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("modx-1.0.jar");
        fs::write(&file, b"old contents").unwrap();
        let store = ModBackupStore::new(dir.path().join("mod_backups"), 3);

        let backup = store.snapshot("P1", &file).await.unwrap();

        assert!(backup.starts_with(dir.path().join("mod_backups").join("P1")));
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_modx-1.0.jar"));
        assert_eq!(name.len(), "YYYYmmdd_HHMMSS_mmm_modx-1.0.jar".len());
        assert_eq!(fs::read(&backup).unwrap(), b"old contents");
        assert_eq!(store.latest("P1").await.unwrap(), Some(backup));
    }

    #[tokio::test]
    async fn repeated_snapshots_do_not_collide() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.jar");
        fs::write(&file, b"x").unwrap();
        let store = ModBackupStore::new(dir.path().join("b"), 5);

        let first = store.snapshot("P1", &file).await.unwrap();
        let second = store.snapshot("P1", &file).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.list("P1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn prune_keeps_newest() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("P1");
        fs::create_dir_all(&project).unwrap();
        for name in [
            "20240101_000000_000_a.jar",
            "20240102_000000_000_a.jar",
            "20240103_000000_000_a.jar",
            "20240104_000000_000_a.jar",
        ] {
            fs::write(project.join(name), b"x").unwrap();
        }
        let store = ModBackupStore::new(dir.path(), 2);

        assert_eq!(store.prune("P1").await.unwrap(), 2);
        let left: Vec<_> = store
            .list("P1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            left,
            vec!["20240104_000000_000_a.jar", "20240103_000000_000_a.jar"]
        );
    }

    #[tokio::test]
    async fn restore_overwrites_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.jar");
        fs::write(&target, vec![1u8; 10]).unwrap();
        let store = ModBackupStore::new(dir.path().join("b"), 3);
        let backup = store.snapshot("P1", &target).await.unwrap();

        fs::write(&target, vec![2u8; 50]).unwrap();
        store.restore(&backup, &target).await.unwrap();

        assert_eq!(fs::metadata(&target).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn unknown_project_has_no_backups() {
        let dir = tempdir().unwrap();
        let store = ModBackupStore::new(dir.path(), 3);
        assert!(store.latest("missing").await.unwrap().is_none());
    }
}
