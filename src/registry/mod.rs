use crate::error::{ModpilotError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

pub mod curseforge;
pub mod factory;
pub mod http;
pub mod modrinth;
pub mod retry;

pub use curseforge::CurseForgeClient;
pub use factory::{RegistryFactory, RegistrySet};
pub use http::{HttpTransport, ReqwestTransport};
pub use modrinth::ModrinthClient;
pub use retry::RetryPolicy;

static MODRINTH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:mod|plugin|datapack|resourcepack)/([^/]+)").expect("valid Modrinth path pattern")
});
static CURSEFORGE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/mc-mods/([^/]+)").expect("valid CurseForge path pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Modrinth,
    CurseForge,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Modrinth => write!(f, "Modrinth"),
            SourceType::CurseForge => write!(f, "CurseForge"),
        }
    }
}

/// A configured reference to a mod in one of the registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModSource {
    pub source_type: SourceType,
    pub reference: String,
}

impl ModSource {
    pub fn new(source_type: SourceType, reference: impl Into<String>) -> Self {
        Self {
            source_type,
            reference: reference.into().trim().to_string(),
        }
    }

    /// Extract the project slug from a bare slug or a project page URL.
    pub fn project_ref(&self) -> Result<String> {
        let reference = self.reference.as_str();
        if reference.is_empty() {
            return Err(ModpilotError::InvalidSource("empty reference".to_string()));
        }

        if !reference.contains('/') {
            return Ok(reference.to_string());
        }

        let url = Url::parse(reference)
            .map_err(|_| ModpilotError::InvalidSource(format!("not a URL: {reference}")))?;

        let re = match self.source_type {
            SourceType::Modrinth => &*MODRINTH_PATH,
            SourceType::CurseForge => &*CURSEFORGE_PATH,
        };

        re.captures(url.path())
            .and_then(|captures| captures.get(1))
            .map(|slug| slug.as_str().to_string())
            .filter(|slug| !slug.is_empty())
            .ok_or_else(|| {
                ModpilotError::InvalidSource(format!(
                    "unrecognised {} URL: {reference}",
                    self.source_type
                ))
            })
    }
}

/// Title and registry-internal id of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    pub url: String,
    pub filename: String,
    pub size_bytes: Option<u64>,
}

/// One published release of a project.
///
/// `files` is ordered and its first element is the canonical download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub release_id: String,
    pub version_label: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub files: Vec<ReleaseFile>,
}

impl ReleaseMetadata {
    pub fn primary_file(&self) -> Option<&ReleaseFile> {
        self.files.first()
    }
}

/// Read-only view of a package registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn project_metadata(&self, reference: &str) -> Result<ProjectMetadata>;

    /// Releases of a project, newest first.
    async fn releases(&self, project: &ProjectMetadata) -> Result<Vec<ReleaseMetadata>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_slug() {
        let source = ModSource::new(SourceType::Modrinth, " fabric-api ");
        assert_eq!(source.project_ref().unwrap(), "fabric-api");
    }

    #[test]
    fn extracts_modrinth_slug_from_url() {
        let source = ModSource::new(
            SourceType::Modrinth,
            "https://modrinth.com/mod/lithium/versions",
        );
        assert_eq!(source.project_ref().unwrap(), "lithium");
    }

    #[test]
    fn extracts_curseforge_slug_from_url() {
        let source = ModSource::new(
            SourceType::CurseForge,
            "https://www.curseforge.com/minecraft/mc-mods/jei",
        );
        assert_eq!(source.project_ref().unwrap(), "jei");
    }

    #[test]
    fn path_patterns_do_not_cross_registries() {
        let modrinth = ModSource::new(
            SourceType::Modrinth,
            "https://www.curseforge.com/minecraft/mc-mods/jei",
        );
        assert!(modrinth.project_ref().is_err());

        let curseforge = ModSource::new(SourceType::CurseForge, "https://modrinth.com/mod/sodium");
        assert!(curseforge.project_ref().is_err());

        // repeated lookups reuse the compiled patterns
        for _ in 0..3 {
            let source = ModSource::new(SourceType::Modrinth, "https://modrinth.com/plugin/luckperms");
            assert_eq!(source.project_ref().unwrap(), "luckperms");
        }
    }

    #[test]
    fn rejects_url_without_project_path() {
        let source = ModSource::new(SourceType::Modrinth, "https://modrinth.com/discover/");
        let err = source.project_ref().unwrap_err();
        assert!(matches!(err, ModpilotError::InvalidSource(_)));
    }
}
