//! Step results for best-effort sequences.
//!
//! A stage is a list of steps that each succeed, fail, or are skipped. A
//! failed step is logged and recorded; it never stops the steps after it.

use anyhow::Result;
use serde::Serialize;
use std::fmt;

/// One item (module, script) that failed inside an otherwise completed step.
#[derive(Debug)]
pub struct Failure {
    pub item: String,
    pub error: anyhow::Error,
}

impl Failure {
    pub fn new(item: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            item: item.into(),
            error,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.item, self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed.
    Ok,
    /// Step (or some item in it) failed; the sequence went on.
    Failed,
    /// Step not attempted.
    Skipped,
}

/// Result of a single step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub details: Option<String>,
}

/// Ordered results of one stage invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub steps: Vec<StepResult>,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            steps: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, status: StepStatus, details: Option<String>) {
        self.steps.push(StepResult {
            name: name.to_string(),
            status,
            details,
        });
    }

    /// Record a step that either fully succeeded or failed.
    pub fn record<T>(&mut self, name: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.push(name, StepStatus::Ok, None);
                Some(value)
            }
            Err(e) => {
                log::warn!("[{}] {} failed: {:#}", self.stage, name, e);
                self.push(name, StepStatus::Failed, Some(format!("{:#}", e)));
                None
            }
        }
    }

    /// Record a step that ran over many items and collected per-item failures.
    pub fn record_failures(&mut self, name: &str, result: Result<Vec<Failure>>) {
        match result {
            Ok(failures) if failures.is_empty() => self.push(name, StepStatus::Ok, None),
            Ok(failures) => {
                for failure in &failures {
                    log::warn!("[{}] {}: {}", self.stage, name, failure);
                }
                let details = failures
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                self.push(name, StepStatus::Failed, Some(details));
            }
            Err(e) => {
                log::warn!("[{}] {} failed: {:#}", self.stage, name, e);
                self.push(name, StepStatus::Failed, Some(format!("{:#}", e)));
            }
        }
    }

    /// Record a step that was deliberately not attempted.
    pub fn skip(&mut self, name: &str, reason: &str) {
        log::info!("[{}] skip {}: {}", self.stage, name, reason);
        self.push(name, StepStatus::Skipped, Some(reason.to_string()));
    }

    /// Fold a nested stage's steps in, prefixed with its name.
    pub fn absorb(&mut self, nested: StageReport) {
        for step in nested.steps {
            self.steps.push(StepResult {
                name: format!("{}/{}", nested.stage, step.name),
                ..step
            });
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Status of the named step, if it was recorded.
    pub fn status(&self, name: &str) -> Option<StepStatus> {
        self.step(name).map(|s| s.status)
    }

    pub fn fail_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count()
    }

    /// Log a one-line summary of the stage.
    pub fn log_summary(&self) {
        let ok = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Ok)
            .count();
        log::info!(
            "[{}] done: {}/{} steps ok, {} failed",
            self.stage,
            ok,
            self.steps.len(),
            self.fail_count()
        );
        if let Ok(json) = serde_json::to_string(self) {
            log::debug!("[{}] report: {}", self.stage, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_record_keeps_going_after_failure() {
        let mut report = StageReport::new("post-fs-data");
        report.record::<()>("first", Err(anyhow!("boom")));
        report.record("second", Ok(()));

        assert_eq!(report.status("first"), Some(StepStatus::Failed));
        assert_eq!(report.status("second"), Some(StepStatus::Ok));
        assert_eq!(report.fail_count(), 1);
    }

    #[test]
    fn test_partial_failures_mark_step_failed() {
        let mut report = StageReport::new("service");
        report.record_failures(
            "module-scripts",
            Ok(vec![Failure::new("broken", anyhow!("exit 1"))]),
        );
        let step = report.step("module-scripts").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(step.details.as_deref().unwrap().contains("broken"));
    }

    #[test]
    fn test_absorb_prefixes_names() {
        let mut outer = StageReport::new("post-fs-data");
        let mut inner = StageReport::new("post-mount");
        inner.skip("module-scripts", "safe mode");
        outer.absorb(inner);
        assert_eq!(
            outer.status("post-mount/module-scripts"),
            Some(StepStatus::Skipped)
        );
    }
}
