use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chunker::Chunker,
    config::ReviewSettings,
    error::ReviewError,
    gateway::{ChatGateway, ChatRequest},
    prompt::{build_prompt, PromptContext, REVIEW_SYSTEM_PROMPT},
    recovery::recover_findings,
    types::{ProgressEvent, ReviewFinding, ReviewReport, ReviewUnit, RiskType, Stance, TextWindow},
};

/// Standard-mode input.
#[derive(Debug, Clone, Copy)]
pub struct ReviewRequest<'a> {
    pub text: &'a str,
    pub risks: &'a [RiskType],
    pub stance: Stance,
}

/// Drives a review: one gateway call per unit, partial results kept.
///
/// Failures local to a unit (transport, provider, unparseable reply) are
/// reported on the progress channel and never abort the run. Only invalid
/// settings and cancellation end a run early.
pub struct Reviewer {
    gateway: Arc<dyn ChatGateway>,
    settings: ReviewSettings,
    progress: Option<UnboundedSender<ProgressEvent>>,
    cancel: CancellationToken,
}

enum UnitOutcome {
    Done { findings: Vec<ReviewFinding>, skipped: usize },
    Failed(String),
    Cancelled,
}

impl Reviewer {
    pub fn new(gateway: Arc<dyn ChatGateway>, settings: ReviewSettings) -> Self {
        Self {
            gateway,
            settings,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    pub(crate) fn gateway(&self) -> &dyn ChatGateway {
        self.gateway.as_ref()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // A caller that stopped listening does not stop the review.
            let _ = tx.send(event);
        }
    }

    /// Splits the text, reviews every window and merges findings in window
    /// order. With `concurrency > 1` several windows are in flight at once,
    /// but results and progress are still delivered in window order.
    ///
    /// Cancellation stops the run at the next window boundary and returns
    /// [`ReviewError::Cancelled`]; findings gathered so far are discarded,
    /// since the only canceller is a caller that has stopped listening.
    pub async fn review(&self, req: &ReviewRequest<'_>) -> Result<ReviewReport, ReviewError> {
        self.settings.validate()?;
        let chunker = Chunker::new(self.settings.window_size, self.settings.overlap)?;
        let windows = chunker.chunk(req.text);
        let total = windows.len();

        info!(
            total,
            chars = req.text.chars().count(),
            concurrency = self.settings.concurrency,
            "review started"
        );
        self.emit(ProgressEvent::info(format!(
            "Document split into {total} part(s) for review."
        )));

        let mut outcomes = stream::iter(windows)
            .map(|window| self.review_window(window, req, total))
            .buffered(self.settings.concurrency);

        let mut reviews = Vec::new();
        let mut failed = 0usize;
        let mut index = 0usize;
        while let Some(outcome) = outcomes.next().await {
            index += 1;
            match outcome {
                UnitOutcome::Done { findings, skipped } => {
                    info!(unit = index, total, findings = findings.len(), skipped, "unit reviewed");
                    self.emit(ProgressEvent::info(format!(
                        "Part {index}/{total} done, {} finding(s).",
                        findings.len()
                    )));
                    reviews.extend(findings);
                }
                UnitOutcome::Failed(message) => {
                    failed += 1;
                    warn!(unit = index, total, "unit failed: {}", message);
                    self.emit(ProgressEvent::error(message));
                }
                UnitOutcome::Cancelled => {
                    warn!(unit = index, total, "review cancelled");
                    self.emit(ProgressEvent::error("Review cancelled."));
                    return Err(ReviewError::Cancelled);
                }
            }
        }

        info!(total, failed, findings = reviews.len(), "review finished");
        self.emit(ProgressEvent::info(format!(
            "Review complete: {} finding(s) across {total} part(s).",
            reviews.len()
        )));
        Ok(ReviewReport { reviews })
    }

    async fn review_window(&self, window: TextWindow, req: &ReviewRequest<'_>, total: usize) -> UnitOutcome {
        if self.is_cancelled() {
            return UnitOutcome::Cancelled;
        }
        let n = window.index + 1;
        let ctx = PromptContext {
            stance: req.stance,
            risks: req.risks,
            document: req.text,
        };
        let prompt = build_prompt(&ReviewUnit::Window(window), &ctx);
        let request = ChatRequest::new(prompt).with_system(REVIEW_SYSTEM_PROMPT);

        let reply = match self.gateway.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => return UnitOutcome::Failed(format!("Part {n}/{total} failed: {e}")),
        };

        match recover_findings(&reply) {
            Ok(recovered) => UnitOutcome::Done {
                findings: recovered.findings,
                skipped: recovered.skipped,
            },
            Err(e) => UnitOutcome::Failed(format!("Part {n}/{total} could not be parsed, skipped: {e}")),
        }
    }
}
