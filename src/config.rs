use crate::error::{ModpilotError, Result};
use crate::registry::{ModSource, SourceType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SUPPORTED_LOADERS: &[&str] = &["fabric", "forge", "quilt", "neoforge"];
const SUPPORTED_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const CONFIG_FILE: &str = "config.toml";

/// Fully typed application configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub minecraft: MinecraftConfig,
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub mods: ModsConfig,
    pub backup: BackupConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinecraftConfig {
    pub version: String,
    pub modloader: String,
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            version: "1.20.1".to_string(),
            modloader: "fabric".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub server: PathBuf,
    pub mods: PathBuf,
    pub backups: PathBuf,
    pub mod_backups: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let server = PathBuf::from("server");
        Self {
            mods: server.join("mods"),
            server,
            backups: PathBuf::from("backups"),
            mod_backups: PathBuf::from("backups").join("mods"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub jar_name: String,
    pub java_flags: Vec<String>,
    pub stop_command: String,
    pub session_name: String,
    /// Seconds to wait for the server to stop.
    pub max_stop_wait: u64,
    /// Seconds to wait for the server to come up.
    pub startup_timeout: u64,
    /// Seconds a verification probe waits after startup before checking for a crash.
    pub verify_settle: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jar_name: "server.jar".to_string(),
            java_flags: vec!["-Xms4G".to_string(), "-Xmx4G".to_string()],
            stop_command: "stop".to_string(),
            session_name: "minecraft".to_string(),
            max_stop_wait: 300,
            startup_timeout: 120,
            verify_settle: 10,
        }
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }

    pub fn max_stop_wait(&self) -> Duration {
        Duration::from_secs(self.max_stop_wait)
    }

    pub fn verify_settle(&self) -> Duration {
        Duration::from_secs(self.verify_settle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModsConfig {
    pub chunk_size: usize,
    pub max_retries: u32,
    /// Base for the exponential backoff, in seconds.
    pub base_delay: f64,
    /// Fixed pause before every registry request, in seconds.
    pub request_delay: f64,
    /// Pause between resolution chunks, in seconds.
    pub chunk_delay: f64,
    /// Total request timeout, in seconds.
    pub timeout: u64,
    pub concurrent_downloads: usize,
    pub verify_startup: bool,
    pub modrinth_sources: Vec<String>,
    pub curseforge_sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curseforge_api_key: Option<String>,
}

impl Default for ModsConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            max_retries: 3,
            base_delay: 2.0,
            request_delay: 1.0,
            chunk_delay: 2.0,
            timeout: 30,
            concurrent_downloads: 5,
            verify_startup: false,
            modrinth_sources: Vec::new(),
            curseforge_sources: Vec::new(),
            curseforge_api_key: None,
        }
    }
}

impl ModsConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// All configured sources, Modrinth first, in file order.
    pub fn sources(&self) -> Vec<ModSource> {
        let modrinth = self
            .modrinth_sources
            .iter()
            .map(|reference| ModSource::new(SourceType::Modrinth, reference));
        let curseforge = self
            .curseforge_sources
            .iter()
            .map(|reference| ModSource::new(SourceType::CurseForge, reference));
        modrinth.chain(curseforge).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub max_backups: usize,
    pub max_mod_backups: usize,
    pub include_logs: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 5,
            max_mod_backups: 3,
            include_logs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub discord_webhook: String,
    /// Minutes before restart at which a warning is sent, largest first.
    pub warning_intervals: Vec<u64>,
    pub warning_message: String,
    pub success_notifications: bool,
    pub error_notifications: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            discord_webhook: String::new(),
            warning_intervals: vec![15, 10, 5, 1],
            warning_message: "Server will restart in {minutes} minute(s) for mod updates"
                .to_string(),
            success_notifications: true,
            error_notifications: true,
        }
    }
}

impl NotificationConfig {
    pub fn warning_for(&self, minutes: u64) -> String {
        self.warning_message
            .replace("{minutes}", &minutes.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the first default location found.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_default(),
        };

        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    ModpilotError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Self::parse(&content)?
            }
            None => {
                tracing::warn!("no configuration file found, using defaults");
                Config::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ModpilotError::Config(format!("Failed to serialize configuration: {e}")))
    }

    /// Write the default configuration to `path`.
    ///
    /// Returns `false` without touching anything when the file exists and
    /// `force` is not set.
    pub fn write_default(path: &Path, force: bool) -> Result<bool> {
        if path.is_dir() {
            return Err(ModpilotError::Config(format!(
                "{} is a directory",
                path.display()
            )));
        }
        if path.exists() && !force {
            return Ok(false);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Config::default().to_toml()?)?;
        Ok(true)
    }

    /// Normalize and check values the pipeline relies on.
    pub fn validate(&mut self) -> Result<()> {
        let loader = self.minecraft.modloader.trim().to_lowercase();
        if !SUPPORTED_LOADERS.contains(&loader.as_str()) {
            return Err(ModpilotError::Config(format!(
                "Unsupported modloader '{}'. Must be one of {}",
                self.minecraft.modloader,
                SUPPORTED_LOADERS.join(", ")
            )));
        }
        self.minecraft.modloader = loader;

        if self.minecraft.version.trim().is_empty() {
            return Err(ModpilotError::Config(
                "minecraft.version must not be empty".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_lowercase();
        if !SUPPORTED_LEVELS.contains(&level.as_str()) {
            return Err(ModpilotError::Config(format!(
                "Invalid log level '{}'. Must be one of {}",
                self.logging.level,
                SUPPORTED_LEVELS.join(", ")
            )));
        }
        self.logging.level = level;

        if self.mods.chunk_size == 0 {
            return Err(ModpilotError::Config(
                "mods.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.mods.concurrent_downloads == 0 {
            return Err(ModpilotError::Config(
                "mods.concurrent_downloads must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("base_delay", self.mods.base_delay),
            ("request_delay", self.mods.request_delay),
            ("chunk_delay", self.mods.chunk_delay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModpilotError::Config(format!(
                    "mods.{name} must be a non-negative number of seconds"
                )));
            }
        }

        if self.mods.sources().is_empty() {
            tracing::warn!("no mod sources configured");
        }

        Ok(())
    }

    fn find_default() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "modpilot") {
            candidates.push(dirs.config_dir().join(CONFIG_FILE));
        }
        candidates.into_iter().find(|candidate| candidate.is_file())
    }
}
