use crate::agents::{BatchCoordinator, FailureKind, UpdateOutcome, UpdatePlanAction, UpdateReport};
use crate::cli::{BackupAction, ServerAction};
use crate::config::{Config, NotificationConfig};
use crate::registry::{HttpTransport, ModSource, ReqwestTransport, SourceType};
use crate::services::{
    ArchiveBackupManager, BackupService, DiscordNotifier, LifecycleProbe, Notifier, ScreenServer,
    ServerLifecycle, StartupProbe,
};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Long-lived collaborators shared by the commands.
struct Services {
    transport: Arc<dyn HttpTransport>,
    notifier: Arc<dyn Notifier>,
    server: Arc<dyn ServerLifecycle>,
}

impl Services {
    fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::new(config.mods.timeout()).context("Failed to set up HTTP client")?,
        );
        let notifier: Arc<dyn Notifier> =
            Arc::new(DiscordNotifier::new(transport.clone(), &config.notifications));
        let server: Arc<dyn ServerLifecycle> = Arc::new(ScreenServer::new(
            config.server.clone(),
            &config.paths.server,
        ));

        Ok(Self {
            transport,
            notifier,
            server,
        })
    }

    fn probe(&self, config: &Config) -> Arc<dyn StartupProbe> {
        Arc::new(LifecycleProbe::new(
            self.server.clone(),
            config.server.startup_timeout(),
            config.server.verify_settle(),
        ))
    }

    fn coordinator(&self, config: &Config, probe: Option<Arc<dyn StartupProbe>>) -> BatchCoordinator {
        BatchCoordinator::from_config(config, self.transport.clone(), self.notifier.clone(), probe)
            .with_progress(std::io::stderr().is_terminal())
    }
}

fn print_sources(sources: &[ModSource]) {
    println!("   Found {} mod source(s):", sources.len());
    for source in sources {
        println!(
            "   • {} ({})",
            source.reference.bright_cyan(),
            source.source_type.to_string().dimmed()
        );
    }
}

fn print_target(config: &Config) {
    println!(
        "   Target: Minecraft {} with {}",
        config.minecraft.version.bright_cyan(),
        config.minecraft.modloader.bright_cyan()
    );
}

/// Execute the update workflow
pub async fn execute_update(config: &Config) -> Result<()> {
    println!("{}", "Starting mod update process...".cyan().bold());
    let services = Services::from_config(config)?;

    println!("\n{}", "1. Reading mod sources...".yellow());
    let sources = config.mods.sources();
    print_target(config);
    print_sources(&sources);

    let probe = if config.mods.verify_startup {
        if services.server.is_running().await {
            println!(
                "{}",
                "⚠ Server is running, startup verification skipped (use `modpilot maintenance`)"
                    .yellow()
            );
            None
        } else {
            Some(services.probe(config))
        }
    } else {
        None
    };

    println!("\n{}", "2. Resolving and applying updates...".yellow());
    let report = services
        .coordinator(config, probe)
        .run(&sources)
        .await
        .context("Mod update failed")?;
    println!("{}", "✓ Update completed".green());

    print_update_report(&report);
    Ok(())
}

/// Execute the check workflow (dry-run)
pub async fn execute_check(config: &Config) -> Result<()> {
    println!("{}", "Checking for available mod updates...".cyan().bold());
    let services = Services::from_config(config)?;

    println!("\n{}", "1. Reading mod sources...".yellow());
    let sources = config.mods.sources();
    print_target(config);
    print_sources(&sources);

    if sources.is_empty() {
        println!("\n{}", "No mod sources configured".yellow());
        return Ok(());
    }

    println!("\n{}", "2. Resolving releases and comparing local files...".yellow());
    let plan = services.coordinator(config, None).check(&sources).await;
    println!("{}", "✓ Check completed".green());

    let pending: Vec<&UpdatePlanAction> =
        plan.actions.iter().filter(|action| !action.is_noop()).collect();

    if pending.is_empty() && plan.failures.is_empty() {
        println!("\n{}", "✨ All mods are up to date!".green().bold());
        return Ok(());
    }

    if !pending.is_empty() {
        println!("\n{}", "📦 Available Updates:".cyan().bold());
        for action in &pending {
            let marker = match action {
                UpdatePlanAction::Add { .. } => "new".green(),
                _ => "update".yellow(),
            };
            println!("  • {} ({})", action, marker);
        }
    }

    let current = plan.actions.len() - pending.len();
    if current > 0 {
        println!("\n{}", format!("{current} mod(s) already up to date").dimmed());
    }

    if !plan.failures.is_empty() {
        println!("\n{}", "Could not resolve:".red().bold());
        for failure in &plan.failures {
            println!("  • {}", failure.to_string().red());
        }
    }

    if !pending.is_empty() {
        println!("\n{}", "To apply these updates, run:".dimmed());
        println!("  {}", "modpilot update".cyan());
    }
    Ok(())
}

/// Execute the list workflow - display installed mod files
pub fn execute_list(config: &Config) -> Result<()> {
    let mods_dir = &config.paths.mods;
    println!(
        "{}",
        format!("Listing mods in {}...", mods_dir.display()).cyan().bold()
    );

    if !mods_dir.is_dir() {
        println!("\n{}", "Mods directory does not exist yet".yellow());
        return Ok(());
    }

    let mut jars: Vec<(String, u64)> = std::fs::read_dir(mods_dir)
        .with_context(|| format!("Failed to read {}", mods_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.ends_with(".jar") {
                return None;
            }
            let size = entry.metadata().ok()?.len();
            Some((name, size))
        })
        .collect();
    jars.sort();

    if jars.is_empty() {
        println!("\n{}", "No mods installed".yellow());
        return Ok(());
    }

    println!();
    for (name, size) in &jars {
        println!("  • {} {}", name.white().bold(), format_size(*size).dimmed());
    }

    let total: u64 = jars.iter().map(|(_, size)| size).sum();
    println!(
        "\n{}",
        format!("Total: {} mod(s), {}", jars.len(), format_size(total)).cyan()
    );
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= KIB * KIB {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Execute the maintenance workflow
pub async fn execute_maintenance(config: &Config, skip_warnings: bool) -> Result<()> {
    println!("{}", "Starting server maintenance...".cyan().bold());
    let services = Services::from_config(config)?;
    let backups = ArchiveBackupManager::new(
        &config.paths.server,
        &config.paths.backups,
        config.backup.clone(),
    );
    let probe = config.mods.verify_startup.then(|| services.probe(config));
    let coordinator = services.coordinator(config, probe);

    let cycle = MaintenanceCycle {
        server: services.server.as_ref(),
        backups: &backups,
        notifier: services.notifier.as_ref(),
        coordinator: &coordinator,
        notifications: &config.notifications,
    };

    match cycle.run(&config.mods.sources(), skip_warnings).await {
        Ok(report) => {
            print_update_report(&report);
            println!(
                "\n{}",
                "✨ Maintenance completed successfully!".green().bold()
            );
            Ok(())
        }
        Err(e) => {
            services
                .notifier
                .notify("Maintenance Failed", &format!("❌ {e:#}"), true)
                .await;
            Err(e)
        }
    }
}

/// Warn, stop, back up, update, prune and restart, in that order.
struct MaintenanceCycle<'a> {
    server: &'a dyn ServerLifecycle,
    backups: &'a dyn BackupService,
    notifier: &'a dyn Notifier,
    coordinator: &'a BatchCoordinator,
    notifications: &'a NotificationConfig,
}

impl MaintenanceCycle<'_> {
    async fn run(&self, sources: &[ModSource], skip_warnings: bool) -> Result<UpdateReport> {
        self.notifier
            .notify("Maintenance", "🔄 Beginning maintenance...", false)
            .await;

        println!("\n{}", "1. Stopping server...".yellow());
        if self.server.is_running().await {
            if !skip_warnings {
                countdown(self.notifier, self.notifications).await;
            }
            self.notifier
                .notify("Maintenance", "🔄 Stopping server...", false)
                .await;
            if !self.server.stop().await {
                bail!("Failed to stop server");
            }
            println!("{}", "✓ Server stopped".green());
        } else {
            println!("{}", "   Server is not running".dimmed());
        }

        println!("\n{}", "2. Backing up server...".yellow());
        if !self.backups.create_backup().await {
            self.restart().await;
            bail!("Backup failed");
        }
        println!("{}", "✓ Backup created".green());

        println!("\n{}", "3. Updating mods...".yellow());
        let outcome = self.coordinator.run(sources).await;
        if outcome.is_ok() {
            println!("{}", "✓ Mods updated".green());
        }

        println!("\n{}", "4. Pruning old backups...".yellow());
        self.backups.prune_backups().await;

        println!("\n{}", "5. Starting server...".yellow());
        let restarted = self.restart().await;

        let report = outcome.context("Mod update failed")?;
        if !restarted {
            bail!("Server restart failed");
        }

        self.notifier
            .notify(
                "Maintenance Complete",
                "✅ Server maintenance completed successfully",
                false,
            )
            .await;
        Ok(report)
    }

    async fn restart(&self) -> bool {
        self.notifier
            .notify("Maintenance", "🔄 Starting server...", false)
            .await;
        let started = self.server.start().await;
        if started {
            println!("{}", "✓ Server started".green());
        } else {
            println!("{}", "⚠ Server failed to start".red());
        }
        started
    }
}

/// Post the configured countdown warnings, sleeping between them.
async fn countdown(notifier: &dyn Notifier, config: &NotificationConfig) {
    let mut intervals = config.warning_intervals.clone();
    intervals.sort_unstable_by(|a, b| b.cmp(a));
    intervals.dedup();

    for (index, minutes) in intervals.iter().enumerate() {
        println!("   {}", config.warning_for(*minutes).dimmed());
        notifier
            .notify("Server Restart Warning", &config.warning_for(*minutes), false)
            .await;

        let next = intervals.get(index + 1).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_secs((minutes - next) * 60)).await;
    }
}

/// Execute the health workflow
pub async fn execute_health(config: &Config) -> Result<()> {
    println!("{}", "Checking modpilot health...".cyan().bold());
    let checks = health_checks(config);

    println!();
    for check in &checks {
        let label = match check.level {
            HealthLevel::Ok => "OK   ".green().bold(),
            HealthLevel::Warn => "WARN ".yellow().bold(),
            HealthLevel::Error => "ERROR".red().bold(),
        };
        println!("  {} {}", label, check.message);
    }

    let server = ScreenServer::new(config.server.clone(), &config.paths.server);
    let state = if server.is_running().await {
        "running".green()
    } else {
        "stopped".yellow()
    };
    println!("\n   Server is {}", state);

    let errors = checks
        .iter()
        .filter(|check| check.level == HealthLevel::Error)
        .count();
    if errors > 0 {
        bail!("{errors} health check(s) failed");
    }
    println!("\n{}", "✨ Everything looks good!".green().bold());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthLevel {
    Ok,
    Warn,
    Error,
}

#[derive(Debug)]
struct HealthCheck {
    level: HealthLevel,
    message: String,
}

impl HealthCheck {
    fn new(level: HealthLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

fn health_checks(config: &Config) -> Vec<HealthCheck> {
    let mut checks = Vec::new();
    let paths = &config.paths;

    if paths.server.is_dir() {
        checks.push(HealthCheck::new(
            HealthLevel::Ok,
            format!("Server directory {}", paths.server.display()),
        ));
    } else {
        checks.push(HealthCheck::new(
            HealthLevel::Error,
            format!("Server directory {} not found", paths.server.display()),
        ));
    }

    let jar = paths.server.join(&config.server.jar_name);
    if jar.is_file() {
        checks.push(HealthCheck::new(HealthLevel::Ok, format!("Server jar {}", jar.display())));
    } else {
        checks.push(HealthCheck::new(
            HealthLevel::Error,
            format!("Server jar {} not found", jar.display()),
        ));
    }

    for (name, dir) in [("Mods", &paths.mods), ("Backup", &paths.backups)] {
        if dir.is_dir() {
            checks.push(HealthCheck::new(
                HealthLevel::Ok,
                format!("{name} directory {}", dir.display()),
            ));
        } else {
            checks.push(HealthCheck::new(
                HealthLevel::Warn,
                format!("{name} directory {} will be created", dir.display()),
            ));
        }
    }

    let sources = config.mods.sources();
    if sources.is_empty() {
        checks.push(HealthCheck::new(HealthLevel::Warn, "No mod sources configured"));
    } else {
        checks.push(HealthCheck::new(
            HealthLevel::Ok,
            format!("{} mod source(s) configured", sources.len()),
        ));
    }

    let uses_curseforge = sources
        .iter()
        .any(|source| source.source_type == SourceType::CurseForge);
    if uses_curseforge && config.mods.curseforge_api_key.is_none() {
        checks.push(HealthCheck::new(
            HealthLevel::Error,
            "CurseForge sources configured without mods.curseforge_api_key",
        ));
    }

    for source in &sources {
        if let Err(e) = source.project_ref() {
            checks.push(HealthCheck::new(HealthLevel::Error, e.to_string()));
        }
    }

    if config.notifications.discord_webhook.trim().is_empty() {
        checks.push(HealthCheck::new(
            HealthLevel::Warn,
            "No Discord webhook configured, notifications are disabled",
        ));
    } else {
        checks.push(HealthCheck::new(HealthLevel::Ok, "Discord webhook configured"));
    }

    checks
}

fn print_update_report(report: &UpdateReport) {
    if report.sources == 0 {
        println!("\n{}", "No mod sources configured".yellow());
        return;
    }

    if report.nothing_resolved() {
        println!(
            "\n{}",
            format!("✗ None of the {} mod source(s) could be resolved", report.sources)
                .red()
                .bold()
        );
    }

    let updated = report.updated();
    if !updated.is_empty() {
        println!("\n{}", "📦 Updated:".cyan().bold());
        for outcome in updated {
            println!("  • {}", outcome.to_string().green());
        }
    }

    let failed = report.failed();
    if !failed.is_empty() {
        println!("\n{}", "Failed:".red().bold());
        for outcome in failed {
            let line = outcome.to_string();
            match outcome {
                UpdateOutcome::Failed {
                    kind: FailureKind::RollbackFailed,
                    ..
                } => println!("  • {} {}", line.red().bold(), "(manual fix needed)".red()),
                _ => println!("  • {}", line.red()),
            }
        }
    }

    println!(
        "\n{}",
        format!(
            "Updated: {}  Up to date: {}  Failed: {}",
            report.updated().len(),
            report.skipped().len(),
            report.failed().len()
        )
        .dimmed()
    );
}

/// Execute a server control command
pub async fn execute_server(config: &Config, action: ServerAction) -> Result<()> {
    let server = ScreenServer::new(config.server.clone(), &config.paths.server);

    match action {
        ServerAction::Start => {
            println!("{}", "Starting server...".cyan().bold());
            if !server.start().await {
                bail!("Failed to start server");
            }
            println!("{}", "✓ Server is now running".green());
        }
        ServerAction::Stop => {
            println!("{}", "Stopping server...".cyan().bold());
            if !server.stop().await {
                bail!("Failed to stop server");
            }
            println!("{}", "✓ Server has been stopped".green());
        }
        ServerAction::Restart { skip_warnings } => {
            println!("{}", "Restarting server...".cyan().bold());
            let services = Services::from_config(config)?;
            restart_server(
                services.server.as_ref(),
                services.notifier.as_ref(),
                &config.notifications,
                skip_warnings,
            )
            .await?;
            println!("{}", "✓ Server has been restarted".green());
        }
        ServerAction::Status => {
            println!("{}", "Server status".cyan().bold());
            println!("   Session: {}", config.server.session_name.bright_cyan());
            if server.is_running().await {
                println!("{}", "✓ Server is running".green());
            } else {
                println!("{}", "✗ Server is not running".red());
            }
        }
    }
    Ok(())
}

/// Warn, stop and start the server, notifying the result.
async fn restart_server(
    server: &dyn ServerLifecycle,
    notifier: &dyn Notifier,
    notifications: &NotificationConfig,
    skip_warnings: bool,
) -> Result<()> {
    if server.is_running().await {
        if !skip_warnings {
            countdown(notifier, notifications).await;
        }
        println!("{}", "   Stopping server...".dimmed());
        if !server.stop().await {
            notifier
                .notify("Server Restart Failed", "❌ Failed to stop server", true)
                .await;
            bail!("Failed to stop server");
        }
    }

    println!("{}", "   Starting server...".dimmed());
    if !server.start().await {
        notifier
            .notify("Server Restart Failed", "❌ Server failed to start", true)
            .await;
        bail!("Server failed to start");
    }

    notifier
        .notify("Server Restarted", "✅ Server restarted successfully", false)
        .await;
    Ok(())
}

/// Execute a backup command
pub async fn execute_backup(config: &Config, action: BackupAction) -> Result<()> {
    let manager = ArchiveBackupManager::new(
        &config.paths.server,
        &config.paths.backups,
        config.backup.clone(),
    );

    match action {
        BackupAction::Create => {
            println!("{}", "Creating server backup...".cyan().bold());
            if !config.backup.enabled {
                println!("{}", "Backups are disabled, nothing written".yellow());
                return Ok(());
            }
            if !manager.create_backup().await {
                bail!("Backup failed");
            }
            manager.prune_backups().await;
            if let Some(latest) = manager.list_archives()?.first() {
                println!(
                    "{}",
                    format!("✓ Backup created: {}", latest.display()).green()
                );
            }
        }
        BackupAction::List => {
            println!(
                "{}",
                format!("Listing backups in {}...", config.paths.backups.display())
                    .cyan()
                    .bold()
            );
            let rows = archive_rows(&manager.list_archives()?);
            if rows.is_empty() {
                println!("\n{}", "No backups found".yellow());
                return Ok(());
            }

            println!();
            println!("  {}", format!("{:<40} {:<20} {}", "Name", "Created", "Size").bold());
            for row in &rows {
                println!(
                    "  {} {} {}",
                    format!("{:<40}", row.name).white(),
                    format!("{:<20}", row.created).dimmed(),
                    format_size(row.size).dimmed()
                );
            }
            println!("\n{}", format!("Total: {} backup(s)", rows.len()).cyan());
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct ArchiveRow {
    name: String,
    created: String,
    size: u64,
}

fn archive_rows(archives: &[PathBuf]) -> Vec<ArchiveRow> {
    archives
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let metadata = std::fs::metadata(path).ok()?;
            let created = metadata
                .modified()
                .ok()
                .and_then(|modified| Timestamp::try_from(modified).ok())
                .map(|ts| {
                    ts.to_zoned(TimeZone::system())
                        .strftime("%Y-%m-%d %H:%M:%S")
                        .to_string()
                })
                .unwrap_or_else(|| "unknown".to_string());
            Some(ArchiveRow {
                name,
                created,
                size: metadata.len(),
            })
        })
        .collect()
}

/// Execute the init-config workflow
pub fn execute_init_config(output: &Path, force: bool) -> Result<()> {
    println!("{}", "Creating default configuration...".cyan().bold());

    let written = Config::write_default(output, force)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if !written {
        println!(
            "{}",
            format!("⚠ {} already exists", output.display()).yellow()
        );
        println!("   Use {} to overwrite it", "--force".cyan());
        return Ok(());
    }

    println!(
        "{}",
        format!("✓ Configuration written to {}", output.display()).green()
    );
    println!("\n{}", "Next steps:".cyan().bold());
    println!("  1. Set the server paths and list mods under mods.modrinth_sources");
    println!("  2. Validate the setup:  {}", "modpilot health".cyan());
    println!("  3. Apply updates:       {}", "modpilot update".cyan());
    Ok(())
}
