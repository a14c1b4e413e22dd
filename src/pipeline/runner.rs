//! Ordered step execution with per-step retry and failure isolation.
//!
//! Each step is checked for availability, then run up to `retry.attempts`
//! times with a `base_delay * 2^attempt` sleep between tries. A tolerant
//! failure is logged and the run continues; a critical failure stops the
//! remaining steps. Nothing is rolled back.

use std::future::Future;
use std::pin::Pin;

use tracing::{info, warn};

use crate::config::RetryPolicy;

/// Boxed future returned by a step action: `Ok(detail)` or `Err(reason)`.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

type Action<'a> = Box<dyn Fn() -> StepFuture<'a> + Send + Sync + 'a>;
type Predicate<'a> = Box<dyn Fn() -> bool + Send + Sync + 'a>;

/// How a step failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    /// Log and continue with the next step.
    Tolerant,
    /// Abort the remaining steps.
    Critical,
}

/// One step of a pipeline run.
pub struct PipelineStep<'a> {
    name: String,
    tolerance: Tolerance,
    retry: RetryPolicy,
    delivers: bool,
    requirements: Vec<(String, Predicate<'a>)>,
    action: Action<'a>,
}

impl<'a> PipelineStep<'a> {
    /// A tolerant, single-attempt step.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> StepFuture<'a> + Send + Sync + 'a,
    {
        Self {
            name: name.into(),
            tolerance: Tolerance::Tolerant,
            retry: RetryPolicy::once(),
            delivers: false,
            requirements: Vec::new(),
            action: Box::new(action),
        }
    }

    pub fn critical(mut self) -> Self {
        self.tolerance = Tolerance::Critical;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Mark this as the delivery step that decides the run's final status.
    pub fn delivers(mut self) -> Self {
        self.delivers = true;
        self
    }

    /// Skip the step with `reason` unless `predicate` holds when the step is reached.
    pub fn requires<P>(mut self, reason: impl Into<String>, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'a,
    {
        self.requirements.push((reason.into(), Box::new(predicate)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn unmet_requirement(&self) -> Option<&str> {
        self.requirements
            .iter()
            .find(|(_, available)| !available())
            .map(|(reason, _)| reason.as_str())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded { attempts: u32, detail: String },
    Failed { attempts: u32, reason: String },
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Outcomes of the steps that were reached, in order.
    pub steps: Vec<StepRecord>,
    /// Name of the critical step that stopped the run.
    pub aborted_at: Option<String>,
    pub success: bool,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }

    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.outcome)
    }
}

/// Runs steps in order, once.
#[derive(Debug, Default)]
pub struct StepRunner;

impl StepRunner {
    pub fn new() -> Self {
        Self
    }

    /// Success means the delivery step ran and succeeded; a run without a
    /// delivery step succeeds when it was not aborted.
    pub async fn run(&self, steps: Vec<PipelineStep<'_>>) -> RunResult {
        let total = steps.len();
        let has_delivery = steps.iter().any(|s| s.delivers);
        let mut result = RunResult::default();
        let mut delivered = false;

        for (index, step) in steps.iter().enumerate() {
            info!(step = %step.name, "[{}/{}] Starting", index + 1, total);
            let outcome = run_step(step).await;

            match &outcome {
                StepOutcome::Succeeded { attempts, detail } => {
                    info!(step = %step.name, attempts, "OK: {detail}");
                    delivered |= step.delivers;
                }
                StepOutcome::Skipped { reason } => {
                    info!(step = %step.name, "SKIP: {reason}");
                }
                StepOutcome::Failed { attempts, reason } => {
                    warn!(step = %step.name, attempts, "FAIL: {reason}");
                }
            }

            let abort = step.tolerance == Tolerance::Critical
                && matches!(outcome, StepOutcome::Failed { .. });
            result.steps.push(StepRecord {
                name: step.name.clone(),
                outcome,
            });
            if abort {
                warn!(step = %step.name, "Critical step failed, aborting run");
                result.aborted_at = Some(step.name.clone());
                break;
            }
        }

        result.success = if has_delivery {
            delivered
        } else {
            result.aborted_at.is_none()
        };
        info!(success = result.success, "Pipeline run finished");
        result
    }
}

async fn run_step(step: &PipelineStep<'_>) -> StepOutcome {
    if let Some(reason) = step.unmet_requirement() {
        return StepOutcome::Skipped {
            reason: reason.to_string(),
        };
    }

    let attempts = step.retry.attempts.max(1);
    let mut last_error = String::new();
    for attempt in 0..attempts {
        match (step.action)().await {
            Ok(detail) => {
                return StepOutcome::Succeeded {
                    attempts: attempt + 1,
                    detail,
                };
            }
            Err(reason) => {
                warn!(
                    step = %step.name,
                    "Attempt {}/{} failed: {reason}",
                    attempt + 1,
                    attempts
                );
                last_error = reason;
                if attempt + 1 < attempts {
                    tokio::time::sleep(step.retry.delay_after(attempt)).await;
                }
            }
        }
    }
    StepOutcome::Failed {
        attempts,
        reason: last_error,
    }
}
