use crate::agents::compatibility::ResolvedMod;
use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpRequest, HttpTransport};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do with one resolved mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlanAction {
    NoOp {
        resolved: ResolvedMod,
        reason: String,
    },
    Add {
        resolved: ResolvedMod,
        path: PathBuf,
    },
    Replace {
        resolved: ResolvedMod,
        existing_path: PathBuf,
    },
}

impl UpdatePlanAction {
    pub fn resolved(&self) -> &ResolvedMod {
        match self {
            UpdatePlanAction::NoOp { resolved, .. }
            | UpdatePlanAction::Add { resolved, .. }
            | UpdatePlanAction::Replace { resolved, .. } => resolved,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, UpdatePlanAction::NoOp { .. })
    }
}

impl fmt::Display for UpdatePlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePlanAction::NoOp { resolved, reason } => write!(
                f,
                "{} {}: {}",
                resolved.project_name, resolved.version_label, reason
            ),
            UpdatePlanAction::Add { resolved, .. } => write!(
                f,
                "{} {}: install {}",
                resolved.project_name, resolved.version_label, resolved.filename
            ),
            UpdatePlanAction::Replace {
                resolved,
                existing_path,
            } => write!(
                f,
                "{} {}: replace {}",
                resolved.project_name,
                resolved.version_label,
                existing_path.display()
            ),
        }
    }
}

/// Compares a resolved release with the file already in the mods directory.
///
/// Equality is by byte count only: a same-size file is taken as current.
pub struct UpdatePlanner {
    transport: Arc<dyn HttpTransport>,
    mods_dir: PathBuf,
}

impl UpdatePlanner {
    pub fn new(transport: Arc<dyn HttpTransport>, mods_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            mods_dir: mods_dir.into(),
        }
    }

    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    pub async fn plan(&self, resolved: ResolvedMod) -> UpdatePlanAction {
        let local_path = self.mods_dir.join(&resolved.filename);

        let local_size = match tokio::fs::metadata(&local_path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                return UpdatePlanAction::Add {
                    resolved,
                    path: local_path,
                };
            }
        };

        match self.remote_size(&resolved.download_url).await {
            Ok(remote_size) if remote_size == local_size => UpdatePlanAction::NoOp {
                resolved,
                reason: "already up to date".to_string(),
            },
            Ok(remote_size) => {
                tracing::debug!(
                    file = %resolved.filename,
                    local_size,
                    remote_size,
                    "size differs"
                );
                UpdatePlanAction::Replace {
                    resolved,
                    existing_path: local_path,
                }
            }
            Err(e) => {
                tracing::debug!(file = %resolved.filename, "remote size unknown ({e}), replacing");
                UpdatePlanAction::Replace {
                    resolved,
                    existing_path: local_path,
                }
            }
        }
    }

    async fn remote_size(&self, url: &str) -> Result<u64> {
        let response = self.transport.send(HttpRequest::head(url)).await?;
        if !response.is_success() {
            return Err(ModpilotError::Upstream {
                url: url.to_string(),
                status: response.status,
            });
        }
        response
            .content_length
            .ok_or_else(|| ModpilotError::Download(format!("no content-length for {url}")))
    }
}
