use std::fmt;

/// Why a mod did not end up updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Resolution,
    Backup,
    Download,
    /// Verification failed and the previous file was restored.
    RolledBack,
    /// Verification failed and restoring the previous file failed too.
    RollbackFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Resolution => "resolution",
            FailureKind::Backup => "backup",
            FailureKind::Download => "download",
            FailureKind::RolledBack => "rolled back",
            FailureKind::RollbackFailed => "rollback failed",
        };
        f.write_str(label)
    }
}

/// Result of one mod's trip through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        name: String,
        version: String,
        newly_added: bool,
    },
    Skipped {
        name: String,
        version: String,
    },
    Failed {
        name: String,
        reason: String,
        kind: FailureKind,
    },
}

impl UpdateOutcome {
    pub fn name(&self) -> &str {
        match self {
            UpdateOutcome::Updated { name, .. }
            | UpdateOutcome::Skipped { name, .. }
            | UpdateOutcome::Failed { name, .. } => name,
        }
    }

    pub fn failed(name: impl Into<String>, kind: FailureKind, reason: impl Into<String>) -> Self {
        UpdateOutcome::Failed {
            name: name.into(),
            reason: reason.into(),
            kind,
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Updated {
                name,
                version,
                newly_added: true,
            } => write!(f, "{name} {version} (new)"),
            UpdateOutcome::Updated { name, version, .. } => write!(f, "{name} -> {version}"),
            UpdateOutcome::Skipped { name, version } => write!(f, "{name} {version}"),
            UpdateOutcome::Failed { name, reason, .. } => write!(f, "{name}: {reason}"),
        }
    }
}

/// Aggregate of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Number of configured sources.
    pub sources: usize,
    /// Number of sources that resolved to a release.
    pub resolved: usize,
    pub outcomes: Vec<UpdateOutcome>,
}

impl UpdateReport {
    pub fn new(sources: usize, resolved: usize, mut outcomes: Vec<UpdateOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.name().cmp(b.name()));
        Self {
            sources,
            resolved,
            outcomes,
        }
    }

    pub fn updated(&self) -> Vec<&UpdateOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Updated { .. }))
            .collect()
    }

    pub fn skipped(&self) -> Vec<&UpdateOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Skipped { .. }))
            .collect()
    }

    pub fn failed(&self) -> Vec<&UpdateOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Failed { .. }))
            .collect()
    }

    /// Sources were configured but none could be resolved.
    pub fn nothing_resolved(&self) -> bool {
        self.sources > 0 && self.resolved == 0
    }

    pub fn is_error(&self) -> bool {
        self.nothing_resolved()
            || self.outcomes.iter().any(|o| {
                matches!(
                    o,
                    UpdateOutcome::Failed {
                        kind: FailureKind::RollbackFailed,
                        ..
                    }
                )
            })
    }

    pub fn title(&self) -> &'static str {
        if self.nothing_resolved() {
            "Mod Update Error"
        } else {
            "Mod Update Summary"
        }
    }

    pub fn notification_body(&self) -> String {
        if self.sources == 0 {
            return "No mod sources configured".to_string();
        }

        let mut sections = Vec::new();
        let (added, replaced): (Vec<&UpdateOutcome>, Vec<&UpdateOutcome>) =
            self.updated().into_iter().partition(|o| {
                matches!(
                    o,
                    UpdateOutcome::Updated {
                        newly_added: true,
                        ..
                    }
                )
            });

        if self.nothing_resolved() {
            sections.push(format!(
                "❌ No mod could be resolved ({} sources)",
                self.sources
            ));
        } else if added.is_empty() && replaced.is_empty() {
            sections.push(format!(
                "✅ All mods are up to date! ({}/{})",
                self.skipped().len(),
                self.sources
            ));
        }

        if !replaced.is_empty() {
            sections.push(bulleted("📦 **Updated Mods:**", &replaced));
        }
        if !added.is_empty() {
            sections.push(bulleted("🆕 **Added Mods:**", &added));
        }
        let failed = self.failed();
        if !failed.is_empty() {
            sections.push(bulleted("❌ **Failed Mods:**", &failed));
        }

        sections.push(format!(
            "📊 **Statistics:**\nTotal Mods: {}\nUpdated: {}\nUp to date: {}\nFailed: {}",
            self.sources,
            added.len() + replaced.len(),
            self.skipped().len(),
            failed.len()
        ));

        sections.join("\n\n")
    }
}

fn bulleted(heading: &str, outcomes: &[&UpdateOutcome]) -> String {
    let lines: Vec<String> = outcomes.iter().map(|o| format!("- {o}")).collect();
    format!("{heading}\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updated(name: &str, newly_added: bool) -> UpdateOutcome {
        UpdateOutcome::Updated {
            name: name.to_string(),
            version: "1.0".to_string(),
            newly_added,
        }
    }

    fn skipped(name: &str) -> UpdateOutcome {
        UpdateOutcome::Skipped {
            name: name.to_string(),
            version: "1.0".to_string(),
        }
    }

    #[test]
    fn counts_and_orders_outcomes() {
        let report = UpdateReport::new(
            4,
            3,
            vec![
                skipped("Zeta"),
                UpdateOutcome::failed("beta", FailureKind::Resolution, "not found"),
                updated("Alpha", false),
                updated("Gamma", true),
            ],
        );

        assert_eq!(report.updated().len(), 2);
        assert_eq!(report.skipped().len(), 1);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.outcomes[0].name(), "Alpha");
        assert!(!report.is_error());
    }

    #[test]
    fn body_lists_updates_and_failures() {
        let report = UpdateReport::new(
            3,
            2,
            vec![
                updated("Sodium", false),
                updated("Lithium", true),
                UpdateOutcome::failed("Iris", FailureKind::RolledBack, "rolled back: crash"),
            ],
        );
        let body = report.notification_body();

        assert!(body.contains("📦 **Updated Mods:**\n- Sodium -> 1.0"));
        assert!(body.contains("🆕 **Added Mods:**\n- Lithium 1.0 (new)"));
        assert!(body.contains("❌ **Failed Mods:**\n- Iris: rolled back: crash"));
        assert!(body.contains("Updated: 2\nUp to date: 0\nFailed: 1"));
        assert!(!body.contains("All mods are up to date"));
    }

    #[test]
    fn all_skipped_is_up_to_date() {
        let report = UpdateReport::new(2, 2, vec![skipped("a"), skipped("b")]);
        assert!(report.notification_body().starts_with("✅ All mods are up to date! (2/2)"));
        assert_eq!(report.title(), "Mod Update Summary");
    }

    #[test]
    fn nothing_resolved_is_reported_as_error() {
        let report = UpdateReport::new(
            2,
            0,
            vec![
                UpdateOutcome::failed("a", FailureKind::Resolution, "not found"),
                UpdateOutcome::failed("b", FailureKind::Resolution, "not found"),
            ],
        );

        assert!(report.nothing_resolved());
        assert!(report.is_error());
        assert_eq!(report.title(), "Mod Update Error");
        assert!(report.notification_body().contains("No mod could be resolved (2 sources)"));
    }

    #[test]
    fn empty_source_list_has_dedicated_message() {
        let report = UpdateReport::new(0, 0, Vec::new());
        assert!(!report.is_error());
        assert_eq!(report.notification_body(), "No mod sources configured");
    }

    #[test]
    fn rollback_failure_flags_error() {
        let report = UpdateReport::new(
            1,
            1,
            vec![UpdateOutcome::failed("a", FailureKind::RollbackFailed, "manual fix needed")],
        );
        assert!(report.is_error());
        assert_eq!(FailureKind::RollbackFailed.to_string(), "rollback failed");
    }
}
