use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpRequest, HttpTransport};
use crate::registry::retry::RetryPolicy;
use crate::registry::{ProjectMetadata, RegistryClient, ReleaseFile, ReleaseMetadata};
use async_trait::async_trait;
use jiff::Timestamp;
use serde::Deserialize;
use std::cmp::Reverse;
use std::sync::Arc;
use url::Url;

pub const CURSEFORGE_API: &str = "https://api.curseforge.com/v1";
const MINECRAFT_GAME_ID: &str = "432";

/// CurseForge Core API client
///
/// CurseForge mixes game versions and loader names in one `gameVersions`
/// list and returns files unordered; both are normalized here so releases
/// look the same as Modrinth's to the resolver.
pub struct CurseForgeClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    api_key: Option<String>,
}

impl CurseForgeClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        api_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            policy,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(CURSEFORGE_API)
            .map_err(|e| ModpilotError::Config(format!("Invalid CurseForge base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ModpilotError::Config("CurseForge base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &Url) -> Result<T> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ModpilotError::Config("mods.curseforge_api_key is required for CurseForge sources".into())
        })?;

        let request = HttpRequest::get(url.as_str())
            .header("Accept", "application/json")
            .header("x-api-key", api_key);
        let response = self.policy.send(self.transport.as_ref(), request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }
}

#[async_trait]
impl RegistryClient for CurseForgeClient {
    async fn project_metadata(&self, reference: &str) -> Result<ProjectMetadata> {
        let mut url = self.endpoint(&["mods", "search"])?;
        url.query_pairs_mut()
            .append_pair("gameId", MINECRAFT_GAME_ID)
            .append_pair("slug", reference);

        let search: Envelope<Vec<CurseForgeMod>> = self.get_json(&url).await?;
        let project = search
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ModpilotError::NotFound {
                url: url.to_string(),
            })?;

        Ok(ProjectMetadata {
            id: project.id.to_string(),
            title: project.name,
        })
    }

    async fn releases(&self, project: &ProjectMetadata) -> Result<Vec<ReleaseMetadata>> {
        let url = self.endpoint(&["mods", project.id.as_str(), "files"])?;
        let files: Envelope<Vec<CurseForgeFile>> = self.get_json(&url).await?;

        let mut files = files.data;
        files.sort_by_key(|file| Reverse(file.timestamp()));

        tracing::debug!(
            project = %project.title,
            count = files.len(),
            "fetched CurseForge files"
        );

        Ok(files.into_iter().map(ReleaseMetadata::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CurseForgeMod {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseForgeFile {
    id: u64,
    display_name: String,
    file_name: String,
    download_url: Option<String>,
    file_length: Option<u64>,
    file_date: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
}

impl CurseForgeFile {
    fn timestamp(&self) -> Option<Timestamp> {
        self.file_date
            .as_deref()
            .and_then(|date| date.parse::<Timestamp>().ok())
    }
}

impl From<CurseForgeFile> for ReleaseMetadata {
    fn from(file: CurseForgeFile) -> Self {
        let (game_versions, loaders): (Vec<String>, Vec<String>) = file
            .game_versions
            .into_iter()
            .partition(|entry| entry.starts_with(|c: char| c.is_ascii_digit()));

        let files = file
            .download_url
            .map(|url| ReleaseFile {
                url,
                filename: file.file_name,
                size_bytes: file.file_length,
            })
            .into_iter()
            .collect();

        ReleaseMetadata {
            release_id: file.id.to_string(),
            version_label: file.display_name,
            game_versions,
            loaders: loaders.into_iter().map(|l| l.to_lowercase()).collect(),
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Reply, ScriptedTransport};
    use crate::registry::http::HttpMethod;
    use std::time::Duration;

    const SEARCH_URL: &str = "https://api.curseforge.com/v1/mods/search?gameId=432&slug=jei";
    const FILES_URL: &str = "https://api.curseforge.com/v1/mods/238222/files";

    fn client(transport: Arc<ScriptedTransport>, key: Option<&str>) -> CurseForgeClient {
        CurseForgeClient::new(
            transport,
            RetryPolicy::new(1, Duration::from_millis(10), Duration::ZERO),
            key.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn searches_by_slug_with_api_key() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            HttpMethod::Get,
            SEARCH_URL,
            vec![Reply::json(
                200,
                r#"{"data":[{"id":238222,"name":"Just Enough Items (JEI)","slug":"jei"}]}"#,
            )],
        );

        let project = client(transport.clone(), Some("secret"))
            .project_metadata("jei")
            .await
            .unwrap();

        assert_eq!(project.id, "238222");
        assert_eq!(project.title, "Just Enough Items (JEI)");
        let sent = transport.sent_requests();
        assert!(
            sent[0]
                .headers
                .iter()
                .any(|(name, value)| name == "x-api-key" && value == "secret")
        );
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(HttpMethod::Get, SEARCH_URL, vec![Reply::json(200, r#"{"data":[]}"#)]);

        let err = client(transport, Some("secret"))
            .project_metadata("jei")
            .await
            .unwrap_err();
        assert!(matches!(err, ModpilotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(transport.clone(), Some("  "))
            .project_metadata("jei")
            .await
            .unwrap_err();

        assert!(matches!(err, ModpilotError::Config(_)));
        assert!(transport.sent_requests().is_empty());
    }

    #[tokio::test]
    async fn files_are_sorted_newest_first_and_split() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            HttpMethod::Get,
            FILES_URL,
            vec![Reply::json(
                200,
                r#"{"data":[
                    {"id":1,"displayName":"jei 15.2.0","fileName":"jei-15.2.0.jar",
                     "downloadUrl":"https://edge.forgecdn.net/jei-15.2.0.jar","fileLength":500,
                     "fileDate":"2023-08-01T10:00:00Z","gameVersions":["1.20.1","Forge"]},
                    {"id":2,"displayName":"jei 15.3.0","fileName":"jei-15.3.0.jar",
                     "downloadUrl":null,"fileLength":600,
                     "fileDate":"2023-10-01T10:00:00Z","gameVersions":["1.20.1","NeoForge","Forge"]}
                ]}"#,
            )],
        );

        let project = ProjectMetadata {
            id: "238222".to_string(),
            title: "JEI".to_string(),
        };
        let releases = client(transport, Some("secret"))
            .releases(&project)
            .await
            .unwrap();

        assert_eq!(releases[0].release_id, "2");
        assert!(releases[0].files.is_empty());
        assert_eq!(releases[0].loaders, vec!["neoforge", "forge"]);
        assert_eq!(releases[1].game_versions, vec!["1.20.1"]);
        assert_eq!(releases[1].primary_file().unwrap().size_bytes, Some(500));
    }
}
