use crate::error::{ModpilotError, Result};
use crate::registry::{ProjectMetadata, ReleaseMetadata};
use crate::utils::PathValidator;

const DIAGNOSTIC_RELEASES: usize = 5;

/// A mod whose installable release has been chosen for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMod {
    pub project_id: String,
    pub project_name: String,
    pub release_id: String,
    pub version_label: String,
    pub download_url: String,
    pub filename: String,
    /// Size advertised by the registry, if any.
    pub size_bytes: Option<u64>,
}

/// Picks the release to install for a `(game version, loader)` target.
///
/// Releases are trusted to arrive newest-first; the first compatible one
/// wins and no version ordering is applied on top.
#[derive(Debug, Clone)]
pub struct CompatibilityResolver {
    game_version: String,
    loader: String,
}

impl CompatibilityResolver {
    pub fn new(game_version: impl Into<String>, loader: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            loader: loader.into().to_lowercase(),
        }
    }

    pub fn target(&self) -> String {
        format!("{} ({})", self.game_version, self.loader)
    }

    pub fn is_compatible(&self, release: &ReleaseMetadata) -> bool {
        release.game_versions.iter().any(|v| v == &self.game_version)
            && release
                .loaders
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&self.loader))
    }

    pub fn select<'a>(&self, releases: &'a [ReleaseMetadata]) -> Option<&'a ReleaseMetadata> {
        releases.iter().find(|release| self.is_compatible(release))
    }

    pub fn resolve(
        &self,
        project: &ProjectMetadata,
        releases: &[ReleaseMetadata],
    ) -> Result<ResolvedMod> {
        let Some(release) = self.select(releases) else {
            let labels: Vec<&str> = releases
                .iter()
                .take(DIAGNOSTIC_RELEASES)
                .map(|r| r.version_label.as_str())
                .collect();
            tracing::warn!(
                project = %project.title,
                target = %self.target(),
                available = ?labels,
                "no compatible release"
            );
            return Err(ModpilotError::NoCompatibleRelease {
                project: project.title.clone(),
                target: self.target(),
            });
        };

        let file = release
            .primary_file()
            .ok_or_else(|| ModpilotError::EmptyRelease {
                project: project.title.clone(),
                release: release.version_label.clone(),
            })?;
        let filename = PathValidator::validate_filename(&file.filename)?;

        Ok(ResolvedMod {
            project_id: project.id.clone(),
            project_name: project.title.clone(),
            release_id: release.release_id.clone(),
            version_label: release.version_label.clone(),
            download_url: file.url.clone(),
            filename: filename.to_string(),
            size_bytes: file.size_bytes,
        })
    }
}
