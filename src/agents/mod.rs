// Update pipeline, leaves first:
// - CompatibilityResolver: picks the release to install
// - UpdatePlanner: compares it with the file on disk
// - UpdateExecutor: backup, download, verify, rollback
// - BatchCoordinator: chunked resolution, bounded execution, report
pub mod batch_coordinator;
pub mod compatibility;
pub mod report;
pub mod update_executor;
pub mod update_planner;

pub use batch_coordinator::BatchCoordinator;
pub use report::{FailureKind, UpdateOutcome, UpdateReport};
pub use update_planner::UpdatePlanAction;
