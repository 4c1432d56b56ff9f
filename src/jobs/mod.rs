// Batch jobs: checkpointed runs of the dedupe and score passes with a
// JSON + CSV report at the end.

pub mod progress;
pub mod report;
pub mod runner;

pub use progress::{RunCheckpoint, UnitResult, UnitStatus};
pub use report::{write_report, RunSummary};
pub use runner::{run_dedupe, run_score, RunOptions};
