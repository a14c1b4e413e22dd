//! Daily orchestration.
//!
//! A run is four ordered steps over shared storage:
//! 1. biometric sync (tolerant, retried)
//! 2. remote scan (tolerant)
//! 3. report generation (tolerant, falls back to an error report)
//! 4. delivery (critical, decides the exit status)

pub mod daily;
pub mod runner;
pub mod schedule;

pub use daily::{DailyPipeline, STEP_BIOMETRICS, STEP_DELIVERY, STEP_REPORT, STEP_SCAN};
pub use runner::{
    PipelineStep, RunResult, StepFuture, StepOutcome, StepRecord, StepRunner, Tolerance,
};
pub use schedule::{next_fire_after, run_scheduled};
