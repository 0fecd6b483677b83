use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModpilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid mod source: {0}")]
    InvalidSource(String),

    #[error("Project not found: {url}")]
    NotFound { url: String },

    #[error("Rate limit exceeded after {retries} retries: {url}")]
    RateLimited { url: String, retries: u32 },

    #[error("Registry returned status {status}: {url}")]
    Upstream { url: String, status: u16 },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("No compatible version for {target}")]
    NoCompatibleRelease { project: String, target: String },

    #[error("Release {release} of {project} has no files")]
    EmptyRelease { project: String, release: String },

    #[error("Unsafe file name from registry: {0}")]
    InvalidFilename(String),

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Startup verification failed: {0}")]
    Verification(String),

    #[error("Rollback failed: {0}")]
    Rollback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModpilotError {
    /// Whether a failed request is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ModpilotError::Network(_) | ModpilotError::RateLimited { .. } => true,
            ModpilotError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModpilotError>;
