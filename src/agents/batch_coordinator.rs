use crate::agents::compatibility::{CompatibilityResolver, ResolvedMod};
use crate::agents::report::{FailureKind, UpdateOutcome, UpdateReport};
use crate::agents::update_executor::UpdateExecutor;
use crate::agents::update_planner::{UpdatePlanAction, UpdatePlanner};
use crate::config::Config;
use crate::error::Result;
use crate::registry::http::HttpTransport;
use crate::registry::{ModSource, RegistryFactory, RegistrySet, RetryPolicy};
use crate::services::mod_backup::ModBackupStore;
use crate::services::notifier::Notifier;
use crate::services::server::StartupProbe;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Resolution results: successes keyed by project id, failures as outcomes.
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: BTreeMap<String, ResolvedMod>,
    pub failures: Vec<UpdateOutcome>,
}

/// Planned actions plus the sources that failed to resolve.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub actions: Vec<UpdatePlanAction>,
    pub failures: Vec<UpdateOutcome>,
}

/// Drives resolve -> plan -> execute for every configured source.
pub struct BatchCoordinator {
    registries: RegistrySet,
    resolver: CompatibilityResolver,
    planner: UpdatePlanner,
    executor: UpdateExecutor,
    notifier: Arc<dyn Notifier>,
    chunk_size: usize,
    chunk_delay: Duration,
    concurrency: usize,
    show_progress: bool,
}

impl BatchCoordinator {
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        notifier: Arc<dyn Notifier>,
        probe: Option<Arc<dyn StartupProbe>>,
    ) -> Self {
        let probe = if config.mods.verify_startup { probe } else { None };

        Self {
            registries: RegistryFactory::from_config(transport.clone(), config),
            resolver: CompatibilityResolver::new(
                &config.minecraft.version,
                &config.minecraft.modloader,
            ),
            planner: UpdatePlanner::new(transport.clone(), &config.paths.mods),
            executor: UpdateExecutor::new(
                transport,
                RetryPolicy::from_config(&config.mods),
                ModBackupStore::new(&config.paths.mod_backups, config.backup.max_mod_backups),
                probe,
            ),
            notifier,
            chunk_size: config.mods.chunk_size.max(1),
            chunk_delay: config.mods.chunk_delay(),
            concurrency: config.mods.concurrent_downloads.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        let pb = ProgressBar::new(len as u64);
        if !self.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::default_bar().template("  [{bar:40}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }

    async fn resolve_one(&self, source: &ModSource) -> Result<ResolvedMod> {
        let reference = source.project_ref()?;
        let client = self.registries.client(source.source_type);
        let project = client.project_metadata(&reference).await?;
        let releases = client.releases(&project).await?;
        self.resolver.resolve(&project, &releases)
    }

    /// Resolve sources chunk by chunk, pausing `chunk_delay` between chunks.
    pub async fn resolve_all(&self, sources: &[ModSource]) -> Resolution {
        let mut resolution = Resolution::default();
        let chunks: Vec<&[ModSource]> = sources.chunks(self.chunk_size).collect();
        let pb = self.progress_bar(sources.len());

        for (index, chunk) in chunks.iter().enumerate() {
            pb.set_message(format!("Resolving chunk {}/{}", index + 1, chunks.len()));

            let results = join_all(
                chunk
                    .iter()
                    .map(|source| async move { (source, self.resolve_one(source).await) }),
            )
            .await;

            for (source, result) in results {
                match result {
                    Ok(resolved) => {
                        tracing::debug!(
                            mod_name = %resolved.project_name,
                            version = %resolved.version_label,
                            "resolved"
                        );
                        resolution
                            .resolved
                            .insert(resolved.project_id.clone(), resolved);
                    }
                    Err(e) => {
                        tracing::warn!(source = %source.reference, "{e}");
                        resolution.failures.push(UpdateOutcome::failed(
                            source.reference.clone(),
                            FailureKind::Resolution,
                            e.to_string(),
                        ));
                    }
                }
                pb.inc(1);
            }

            if index + 1 < chunks.len() && !self.chunk_delay.is_zero() {
                tracing::debug!(delay_secs = self.chunk_delay.as_secs_f64(), "pacing before next chunk");
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        pb.finish_and_clear();
        resolution
    }

    pub async fn plan_all(&self, resolved: BTreeMap<String, ResolvedMod>) -> Vec<UpdatePlanAction> {
        stream::iter(resolved.into_values())
            .map(|resolved| self.planner.plan(resolved))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn execute_all(&self, actions: Vec<UpdatePlanAction>) -> Vec<UpdateOutcome> {
        let pb = self.progress_bar(actions.len());
        pb.set_message("Applying updates");

        let outcomes: Vec<UpdateOutcome> = stream::iter(actions)
            .map(|action| {
                let pb = &pb;
                async move {
                    pb.set_message(format!("Updating {}", action.resolved().project_name));
                    let outcome = self.executor.execute(action).await;
                    pb.inc(1);
                    outcome
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        pb.finish_and_clear();
        outcomes
    }

    /// Resolve and plan without touching the mods directory.
    pub async fn check(&self, sources: &[ModSource]) -> UpdatePlan {
        let resolution = self.resolve_all(sources).await;
        UpdatePlan {
            actions: self.plan_all(resolution.resolved).await,
            failures: resolution.failures,
        }
    }

    async fn pipeline(&self, sources: &[ModSource]) -> Result<UpdateReport> {
        if sources.is_empty() {
            tracing::warn!("no mod sources configured");
            return Ok(UpdateReport::default());
        }

        tokio::fs::create_dir_all(self.planner.mods_dir()).await?;

        let resolution = self.resolve_all(sources).await;
        let resolved = resolution.resolved.len();
        tracing::info!(resolved, failed = resolution.failures.len(), "resolution finished");

        let mut outcomes = resolution.failures;
        if resolved > 0 {
            let actions = self.plan_all(resolution.resolved).await;
            outcomes.extend(self.execute_all(actions).await);
        }

        Ok(UpdateReport::new(sources.len(), resolved, outcomes))
    }

    /// Run the whole pipeline and notify the outcome.
    ///
    /// Per-mod problems end up in the report; only faults that stop the run
    /// as a whole are returned, after being notified as errors.
    pub async fn run(&self, sources: &[ModSource]) -> Result<UpdateReport> {
        match self.pipeline(sources).await {
            Ok(report) => {
                self.notifier
                    .notify(report.title(), &report.notification_body(), report.is_error())
                    .await;
                Ok(report)
            }
            Err(e) => {
                tracing::error!("mod update failed: {e}");
                self.notifier
                    .notify("Mod Update Error", &e.to_string(), true)
                    .await;
                Err(e)
            }
        }
    }
}
