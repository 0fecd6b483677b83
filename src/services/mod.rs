//! Capabilities the pipeline consumes: server control, whole-server
//! backups, per-mod copy-aside backups and operator notifications.

pub mod backup;
pub mod mod_backup;
pub mod notifier;
pub mod server;

pub use backup::{ArchiveBackupManager, BackupService};
pub use notifier::{DiscordNotifier, Notifier};
pub use server::{LifecycleProbe, ScreenServer, ServerLifecycle, StartupProbe};
