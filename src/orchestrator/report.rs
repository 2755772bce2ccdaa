//! Aggregate outcome of a run.

use crate::discovery::BuildContext;
use crate::error::ShipError;
use crate::logging::Logger;
use crate::tag::Tag;

/// How one build context ended.
#[derive(Debug)]
pub enum Outcome {
    /// The image was built.
    Built,
    /// Dry run: the build would have been attempted.
    Planned,
    /// Tagging, extraction or the build failed.
    Failed(ShipError),
}

/// Result for a single build context.
#[derive(Debug)]
pub struct ContextResult {
    pub context: BuildContext,
    pub tag: Option<Tag>,
    pub digest: Option<String>,
    pub outcome: Outcome,
}

impl ContextResult {
    pub(crate) fn built(context: BuildContext, tag: Tag, digest: String) -> Self {
        Self {
            context,
            tag: Some(tag),
            digest: Some(digest),
            outcome: Outcome::Built,
        }
    }

    pub(crate) fn planned(context: BuildContext, tag: Tag) -> Self {
        Self {
            context,
            tag: Some(tag),
            digest: None,
            outcome: Outcome::Planned,
        }
    }

    pub(crate) fn failed(
        context: BuildContext,
        tag: Option<Tag>,
        digest: Option<String>,
        error: ShipError,
    ) -> Self {
        Self {
            context,
            tag,
            digest,
            outcome: Outcome::Failed(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&ShipError> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Tag if one was derived, otherwise the context location.
    pub fn label(&self) -> String {
        match &self.tag {
            Some(tag) => tag.to_string(),
            None => self.context.display_name(),
        }
    }
}

/// Per-context results in the order contexts were discovered.
#[derive(Debug, Default)]
pub struct RunReport {
    results: Vec<ContextResult>,
}

impl RunReport {
    pub(crate) fn record(&mut self, result: ContextResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ContextResult] {
        &self.results
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Built))
    }

    pub fn planned(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Planned))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ContextResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    /// Print the end-of-run summary.
    pub(crate) fn print_summary(&self, log: &Logger) {
        if self.results.is_empty() {
            log.info("No build contexts found");
            return;
        }

        log.info("Build summary:");
        log.info(format!("  Contexts attempted: {}", self.attempted()));
        if self.planned() > 0 {
            log.info(format!("  Planned (dry run): {}", self.planned()));
        }
        log.info(format!("  Succeeded: {}", self.succeeded()));
        log.info(format!("  Failed: {}", self.failed()));

        for result in &self.results {
            match &result.outcome {
                Outcome::Built => {
                    log.info(format!("  ok      {}", result.label()));
                    if let Some(digest) = &result.digest {
                        log.verbose(1, format!("          source {digest}"));
                    }
                }
                Outcome::Planned => log.info(format!("  planned {}", result.label())),
                Outcome::Failed(err) => {
                    log.info(format!("  FAILED  {}: {err}", result.label()))
                }
            }
        }
    }
}
