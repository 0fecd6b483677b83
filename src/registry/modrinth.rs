use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpRequest, HttpTransport};
use crate::registry::retry::RetryPolicy;
use crate::registry::{ProjectMetadata, RegistryClient, ReleaseFile, ReleaseMetadata};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

pub const MODRINTH_API: &str = "https://api.modrinth.com/v2";

/// Modrinth v2 API client
pub struct ModrinthClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    base_url: &'static str,
    /// Server-side `(game_version, loader)` narrowing of version listings.
    filter: Option<(String, String)>,
}

impl ModrinthClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            base_url: MODRINTH_API,
            filter: None,
        }
    }

    pub fn with_filter(mut self, game_version: &str, loader: &str) -> Self {
        self.filter = Some((game_version.to_string(), loader.to_string()));
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(self.base_url)
            .map_err(|e| ModpilotError::Config(format!("Invalid Modrinth base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ModpilotError::Config("Modrinth base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn versions_url(&self, project_id: &str) -> Result<Url> {
        let mut url = self.endpoint(&["project", project_id, "version"])?;
        if let Some((game_version, loader)) = &self.filter {
            url.query_pairs_mut()
                .append_pair("game_versions", &format!("[\"{game_version}\"]"))
                .append_pair("loaders", &format!("[\"{loader}\"]"));
        }
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let request = HttpRequest::get(url.as_str()).header("Accept", "application/json");
        let response = self.policy.send(self.transport.as_ref(), request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }
}

#[async_trait]
impl RegistryClient for ModrinthClient {
    async fn project_metadata(&self, reference: &str) -> Result<ProjectMetadata> {
        let url = self.endpoint(&["project", reference])?;
        let project: ModrinthProject = self.get_json(url).await?;

        Ok(ProjectMetadata {
            title: project.title.unwrap_or_else(|| reference.to_string()),
            id: project.id.unwrap_or_else(|| reference.to_string()),
        })
    }

    async fn releases(&self, project: &ProjectMetadata) -> Result<Vec<ReleaseMetadata>> {
        let url = self.versions_url(&project.id)?;
        let versions: Vec<ModrinthVersion> = self.get_json(url).await?;

        tracing::debug!(
            project = %project.title,
            count = versions.len(),
            "fetched Modrinth versions"
        );

        Ok(versions.into_iter().map(ReleaseMetadata::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ModrinthProject {
    id: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModrinthVersion {
    id: String,
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    files: Vec<ModrinthFile>,
}

#[derive(Debug, Deserialize)]
struct ModrinthFile {
    url: String,
    filename: String,
    size: Option<u64>,
}

impl From<ModrinthVersion> for ReleaseMetadata {
    fn from(version: ModrinthVersion) -> Self {
        ReleaseMetadata {
            release_id: version.id,
            version_label: version.version_number,
            game_versions: version.game_versions,
            loaders: version.loaders,
            files: version
                .files
                .into_iter()
                .map(|file| ReleaseFile {
                    url: file.url,
                    filename: file.filename,
                    size_bytes: file.size,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Reply, ScriptedTransport};
    use crate::registry::http::HttpMethod;
    use std::time::Duration;

    fn client(transport: Arc<ScriptedTransport>) -> ModrinthClient {
        ModrinthClient::new(
            transport,
            RetryPolicy::new(2, Duration::from_millis(10), Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn reads_project_title() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            HttpMethod::Get,
            "https://api.modrinth.com/v2/project/sodium",
            vec![Reply::json(200, r#"{"id":"AANobbMI","slug":"sodium","title":"Sodium"}"#)],
        );

        let project = client(transport).project_metadata("sodium").await.unwrap();
        assert_eq!(project.id, "AANobbMI");
        assert_eq!(project.title, "Sodium");
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(transport)
            .project_metadata("does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, ModpilotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn translates_versions_in_registry_order() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            HttpMethod::Get,
            "https://api.modrinth.com/v2/project/AANobbMI/version",
            vec![Reply::json(
                200,
                r#"[
                    {"id":"v2","version_number":"0.5.8","game_versions":["1.20.1"],
                     "loaders":["fabric","quilt"],
                     "files":[{"url":"https://cdn.modrinth.com/sodium-0.5.8.jar","filename":"sodium-0.5.8.jar","size":1024}]},
                    {"id":"v1","version_number":"0.5.3","game_versions":["1.20.1"],
                     "loaders":["fabric"],"files":[]}
                ]"#,
            )],
        );

        let project = ProjectMetadata {
            id: "AANobbMI".to_string(),
            title: "Sodium".to_string(),
        };
        let releases = client(transport).releases(&project).await.unwrap();

        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].release_id, "v2");
        assert_eq!(releases[0].version_label, "0.5.8");
        assert_eq!(releases[0].loaders, vec!["fabric", "quilt"]);
        assert_eq!(
            releases[0].primary_file().unwrap().size_bytes,
            Some(1024)
        );
        assert!(releases[1].files.is_empty());
    }

    #[test]
    fn filter_is_encoded_into_query() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport).with_filter("1.20.1", "fabric");
        let url = client.versions_url("sodium").unwrap();

        assert_eq!(url.path(), "/v2/project/sodium/version");
        assert_eq!(
            url.query(),
            Some("game_versions=%5B%221.20.1%22%5D&loaders=%5B%22fabric%22%5D")
        );
    }
}
