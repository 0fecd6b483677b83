use crate::config::BackupConfig;
use crate::error::{ModpilotError, Result};
use async_trait::async_trait;
use jiff::Zoned;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const ARCHIVE_PREFIX: &str = "server_backup_";
const ARCHIVE_SUFFIX: &str = ".zip";

/// Whole-server snapshot taken around a maintenance run.
#[async_trait]
pub trait BackupService: Send + Sync {
    async fn create_backup(&self) -> bool;
    async fn prune_backups(&self);
}

/// Zips the server directory into `server_backup_<YYYYmmdd_HHMMSS>_<millis>.zip`.
pub struct ArchiveBackupManager {
    server_dir: PathBuf,
    backup_dir: PathBuf,
    config: BackupConfig,
}

impl ArchiveBackupManager {
    pub fn new(server_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, config: BackupConfig) -> Self {
        Self {
            server_dir: server_dir.into(),
            backup_dir: backup_dir.into(),
            config,
        }
    }

    /// Existing archives, newest first.
    pub fn list_archives(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut archives: Vec<PathBuf> = std::fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
                    })
            })
            .collect();

        archives.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(archives)
    }

    /// A fresh archive name; the millisecond part is bumped past existing files.
    fn archive_path(&self) -> PathBuf {
        let now = Zoned::now();
        let stamp = now.strftime("%Y%m%d_%H%M%S").to_string();
        let mut millis = i32::from(now.millisecond());
        loop {
            let path = self
                .backup_dir
                .join(format!("{ARCHIVE_PREFIX}{stamp}_{millis:03}{ARCHIVE_SUFFIX}"));
            if !path.exists() {
                return path;
            }
            millis += 1;
        }
    }

    /// Path of the backup directory relative to the server directory, when nested.
    fn nested_backup_dir(&self) -> Option<PathBuf> {
        let server = self.server_dir.canonicalize().ok()?;
        let backups = self.backup_dir.canonicalize().ok()?;
        backups
            .strip_prefix(&server)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

fn write_archive(
    server_dir: &Path,
    archive: &Path,
    excluded: &[PathBuf],
) -> Result<usize> {
    let file = File::create_new(archive)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    let walker = WalkDir::new(server_dir).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(server_dir)
            .map(|rel| !excluded.iter().any(|skip| rel == skip.as_path()))
            .unwrap_or(true)
    });

    for entry in walker {
        let entry = entry.map_err(|e| ModpilotError::Backup(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(server_dir)
            .map_err(|e| ModpilotError::Backup(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(|e| ModpilotError::Backup(e.to_string()))?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)
                .map_err(|e| ModpilotError::Backup(e.to_string()))?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
            files += 1;
        }
    }

    zip.finish()
        .map_err(|e| ModpilotError::Backup(e.to_string()))?;
    Ok(files)
}

#[async_trait]
impl BackupService for ArchiveBackupManager {
    async fn create_backup(&self) -> bool {
        if !self.config.enabled {
            tracing::info!("backups disabled, skipping");
            return true;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.backup_dir).await {
            tracing::error!(dir = %self.backup_dir.display(), "cannot create backup directory: {e}");
            return false;
        }

        let archive = self.archive_path();
        let mut excluded: Vec<PathBuf> = self.nested_backup_dir().into_iter().collect();
        if !self.config.include_logs {
            excluded.push(PathBuf::from("logs"));
        }

        tracing::info!(archive = %archive.display(), "creating server backup");
        let server_dir = self.server_dir.clone();
        let target = archive.clone();
        let result =
            tokio::task::spawn_blocking(move || write_archive(&server_dir, &target, &excluded))
                .await;

        match result {
            Ok(Ok(files)) => {
                tracing::info!(files, "server backup created");
                true
            }
            Ok(Err(e)) => {
                tracing::error!("backup failed: {e}");
                let _ = tokio::fs::remove_file(&archive).await;
                false
            }
            Err(e) => {
                tracing::error!("backup task failed: {e}");
                let _ = tokio::fs::remove_file(&archive).await;
                false
            }
        }
    }

    async fn prune_backups(&self) {
        let archives = match self.list_archives() {
            Ok(archives) => archives,
            Err(e) => {
                tracing::error!("cannot list backups: {e}");
                return;
            }
        };

        for stale in archives.iter().skip(self.config.max_backups) {
            match tokio::fs::remove_file(stale).await {
                Ok(()) => tracing::info!(archive = %stale.display(), "removed old backup"),
                Err(e) => tracing::error!(archive = %stale.display(), "failed to remove backup: {e}"),
            }
        }
    }
}
