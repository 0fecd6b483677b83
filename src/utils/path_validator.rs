use crate::error::{ModpilotError, Result};
use std::path::{Component, Path};
use url::Url;

/// Guards against registry data escaping the mods directory.
pub struct PathValidator;

impl PathValidator {
    /// Accepts only a bare file name: no separators, no `.`/`..`, not empty.
    pub fn validate_filename(name: &str) -> Result<&str> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed != name {
            return Err(ModpilotError::InvalidFilename(format!("'{name}'")));
        }

        if name.contains(['/', '\\', '\0']) {
            return Err(ModpilotError::InvalidFilename(format!(
                "'{name}' contains a path separator"
            )));
        }

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(name),
            _ => Err(ModpilotError::InvalidFilename(format!(
                "'{name}' is not a plain file name"
            ))),
        }
    }

    /// Download URLs must be absolute http(s) URLs.
    pub fn validate_download_url(raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|e| ModpilotError::Download(format!("Invalid download URL '{raw}': {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ModpilotError::Download(format!(
                "Unsupported download scheme '{other}' in {raw}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_jar_name() {
        assert_eq!(
            PathValidator::validate_filename("sodium-fabric-0.5.8+mc1.20.1.jar").unwrap(),
            "sodium-fabric-0.5.8+mc1.20.1.jar"
        );
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for name in ["../evil.jar", "mods/evil.jar", "..\\evil.jar", "..", ".", "", " a.jar"] {
            let err = PathValidator::validate_filename(name).unwrap_err();
            assert!(matches!(err, ModpilotError::InvalidFilename(_)), "{name}");
        }
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(PathValidator::validate_filename("/etc/passwd").is_err());
    }

    #[test]
    fn download_url_requires_http() {
        assert!(PathValidator::validate_download_url("https://cdn.modrinth.com/a.jar").is_ok());
        assert!(PathValidator::validate_download_url("file:///etc/passwd").is_err());
        assert!(PathValidator::validate_download_url("not a url").is_err());
    }
}
