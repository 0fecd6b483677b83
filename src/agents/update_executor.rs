use crate::agents::compatibility::ResolvedMod;
use crate::agents::report::{FailureKind, UpdateOutcome};
use crate::agents::update_planner::UpdatePlanAction;
use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpRequest, HttpTransport};
use crate::registry::retry::RetryPolicy;
use crate::services::mod_backup::ModBackupStore;
use crate::services::server::StartupProbe;
use crate::utils::PathValidator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Applies one planned action: backup, download, verify, and roll back on
/// a failed verification.
///
/// `execute` never returns an error; every failure becomes
/// `UpdateOutcome::Failed` for that mod alone.
pub struct UpdateExecutor {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    backups: ModBackupStore,
    probe: Option<Arc<dyn StartupProbe>>,
    // Held from backup to rollback while a probe is configured: the server
    // boots from the whole mods directory, so only one mod may be in flux.
    apply_lock: Mutex<()>,
}

impl UpdateExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        backups: ModBackupStore,
        probe: Option<Arc<dyn StartupProbe>>,
    ) -> Self {
        Self {
            transport,
            policy: policy.without_pacing(),
            backups,
            probe,
            apply_lock: Mutex::new(()),
        }
    }

    pub async fn execute(&self, action: UpdatePlanAction) -> UpdateOutcome {
        match action {
            UpdatePlanAction::NoOp { resolved, .. } => UpdateOutcome::Skipped {
                name: resolved.project_name,
                version: resolved.version_label,
            },
            UpdatePlanAction::Add { resolved, path } => self.apply(resolved, path).await,
            UpdatePlanAction::Replace {
                resolved,
                existing_path,
            } => self.apply(resolved, existing_path).await,
        }
    }

    async fn apply(&self, resolved: ResolvedMod, path: PathBuf) -> UpdateOutcome {
        let _guard = match self.probe {
            Some(_) => Some(self.apply_lock.lock().await),
            None => None,
        };
        let name = resolved.project_name.clone();

        let had_previous = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if had_previous {
            if let Err(e) = self.backups.snapshot(&resolved.project_id, &path).await {
                tracing::error!(mod_name = %name, "backup failed: {e}");
                return UpdateOutcome::failed(name, FailureKind::Backup, e.to_string());
            }
        }

        if let Err(e) = self.download(&resolved, &path).await {
            tracing::error!(mod_name = %name, "download failed: {e}");
            return UpdateOutcome::failed(name, FailureKind::Download, e.to_string());
        }
        tracing::info!(mod_name = %name, version = %resolved.version_label, "mod file written");

        if let Err(e) = self.verify().await {
            tracing::warn!(mod_name = %name, "{e}, rolling back");
            return match self.rollback(&resolved, &path, had_previous).await {
                Ok(()) => UpdateOutcome::failed(
                    name,
                    FailureKind::RolledBack,
                    format!("rolled back: {e}"),
                ),
                Err(rollback) => {
                    tracing::error!(
                        mod_name = %name,
                        file = %path.display(),
                        "{rollback}; manual intervention required"
                    );
                    UpdateOutcome::failed(
                        name,
                        FailureKind::RollbackFailed,
                        format!("rollback failed, fix {} manually: {rollback}", path.display()),
                    )
                }
            };
        }

        UpdateOutcome::Updated {
            name,
            version: resolved.version_label,
            newly_added: !had_previous,
        }
    }

    /// Fetch into `.<filename>.part` next to the target, then rename over it.
    async fn download(&self, resolved: &ResolvedMod, path: &Path) -> Result<()> {
        let url = PathValidator::validate_download_url(&resolved.download_url)?;
        let response = self
            .policy
            .send(self.transport.as_ref(), HttpRequest::get(url.as_str()))
            .await
            .map_err(|e| ModpilotError::Download(e.to_string()))?;

        let part = path.with_file_name(format!(".{}.part", resolved.filename));
        if let Err(e) = tokio::fs::write(&part, &response.body).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ModpilotError::Download(format!(
                "Failed to write {}: {e}",
                part.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&part, path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ModpilotError::Download(format!(
                "Failed to move {} into place: {e}",
                path.display()
            )));
        }

        tracing::debug!(file = %path.display(), bytes = response.body.len(), "download complete");
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        match &self.probe {
            Some(probe) => probe.verify().await,
            None => Ok(()),
        }
    }

    async fn rollback(&self, resolved: &ResolvedMod, path: &Path, had_previous: bool) -> Result<()> {
        if !had_previous {
            return tokio::fs::remove_file(path).await.map_err(|e| {
                ModpilotError::Rollback(format!("Failed to remove {}: {e}", path.display()))
            });
        }

        let backup = self
            .backups
            .latest(&resolved.project_id)
            .await
            .map_err(|e| ModpilotError::Rollback(e.to_string()))?
            .ok_or_else(|| {
                ModpilotError::Rollback(format!("no backup found for {}", resolved.project_name))
            })?;
        self.backups.restore(&backup, path).await?;
        tracing::info!(file = %path.display(), backup = %backup.display(), "previous file restored");
        Ok(())
    }
}
