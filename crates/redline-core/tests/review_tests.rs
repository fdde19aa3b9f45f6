use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use redline_core::{
    config::ReviewSettings,
    error::{ChunkingError, GatewayError, ReviewError},
    gateway::{ChatGateway, ChatRequest},
    review::{ReviewRequest, Reviewer},
    OutlineRow, ProgressEvent, RiskType, Stance,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Replies from a queue, in call order, and records every prompt it saw.
#[derive(Default)]
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<String, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Connectivity("no scripted reply".into())))
    }
}

/// Answers with one finding quoting the window's marker letter. Earlier
/// windows take longer, so completion order is the reverse of window order.
struct SlowFirstGateway;

#[async_trait]
impl ChatGateway for SlowFirstGateway {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let marker = ["A", "B", "C", "D"]
            .into_iter()
            .find(|m| request.prompt.contains(&m.repeat(10)))
            .unwrap_or("?");
        let delay = match marker {
            "A" => 80,
            "B" => 40,
            "C" => 10,
            _ => 0,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(finding_json(marker, "policy"))
    }
}

/// Answers normally but cancels the run during its first call.
struct CancelOnFirstCall {
    token: CancellationToken,
    calls: Mutex<usize>,
}

#[async_trait]
impl ChatGateway for CancelOnFirstCall {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, GatewayError> {
        *self.calls.lock().unwrap() += 1;
        self.token.cancel();
        Ok(finding_json("kept", "policy"))
    }
}

fn finding_json(snippet: &str, risk_type: &str) -> String {
    format!(
        r#"{{"reviews":[{{"original_text_snippet":"{snippet}","risk_type":"{risk_type}","risk_level":"medium","reason":"r","suggestion":"s"}}]}}"#
    )
}

fn settings(window_size: usize, overlap: usize, concurrency: usize) -> ReviewSettings {
    ReviewSettings {
        window_size,
        overlap,
        outline_delay_ms: 0,
        concurrency,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn request(text: &str) -> ReviewRequest<'_> {
    ReviewRequest {
        text,
        risks: &[],
        stance: Stance::PartyA,
    }
}

// ── Standard mode ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_unit_keeps_other_findings() {
    let gateway = ScriptedGateway::new(vec![
        Ok(finding_json("first", "policy")),
        Err(GatewayError::Connectivity("connection reset".into())),
        Ok(format!("```json\n{}\n```", finding_json("third", "execution"))),
    ]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway.clone(), settings(10, 0, 1)).with_progress(tx);

    let report = reviewer.review(&request(&"z".repeat(30))).await.unwrap();

    let snippets: Vec<&str> = report.reviews.iter().map(|f| f.original_text_snippet.as_str()).collect();
    assert_eq!(snippets, vec!["first", "third"]);
    assert_eq!(gateway.calls(), 3);

    let events = drain(&mut rx);
    let errors: Vec<&ProgressEvent> = events.iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    match errors[0] {
        ProgressEvent::Log { message, .. } => assert!(message.contains("Part 2/3")),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_reply_contributes_nothing() {
    let gateway = ScriptedGateway::new(vec![
        Ok("Sorry, I cannot help with that.".into()),
        Ok(finding_json("kept", "financial")),
    ]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway, settings(10, 0, 1)).with_progress(tx);

    let report = reviewer.review(&request(&"q".repeat(20))).await.unwrap();
    assert_eq!(report.reviews.len(), 1);
    assert_eq!(report.reviews[0].risk_type, RiskType::Financial);

    let errors = drain(&mut rx).into_iter().filter(|e| e.is_error()).count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_all_units_failing_is_an_empty_report() {
    let gateway = ScriptedGateway::new(vec![]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway, settings(10, 0, 1)).with_progress(tx);

    let report = reviewer.review(&request(&"q".repeat(25))).await.unwrap();
    assert!(report.reviews.is_empty());
    assert_eq!(drain(&mut rx).into_iter().filter(|e| e.is_error()).count(), 3);
}

#[tokio::test]
async fn test_concurrent_review_keeps_window_order() {
    let text = format!("{}{}{}{}", "A".repeat(10), "B".repeat(10), "C".repeat(10), "D".repeat(10));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(Arc::new(SlowFirstGateway), settings(10, 0, 4)).with_progress(tx);

    let report = reviewer.review(&request(&text)).await.unwrap();
    let snippets: Vec<&str> = report.reviews.iter().map(|f| f.original_text_snippet.as_str()).collect();
    assert_eq!(snippets, vec!["A", "B", "C", "D"]);

    let parts: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Log { message, .. } if message.starts_with("Part ") => Some(message),
            _ => None,
        })
        .collect();
    assert!(parts[0].starts_with("Part 1/4"));
    assert!(parts[3].starts_with("Part 4/4"));
}

#[tokio::test]
async fn test_prompt_carries_stance_and_risks() {
    let gateway = ScriptedGateway::new(vec![Ok(r#"{"reviews": []}"#.into())]);
    let reviewer = Reviewer::new(gateway.clone(), settings(100, 10, 1));
    let req = ReviewRequest {
        text: "The Contractor shall indemnify the Employer.",
        risks: &[RiskType::Execution],
        stance: Stance::PartyB,
    };

    reviewer.review(&req).await.unwrap();
    let prompt = gateway.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(Stance::PartyB.label()));
    assert!(prompt.contains("Execution risk"));
    assert!(!prompt.contains("Policy risk"));
    assert!(prompt.contains("The Contractor shall indemnify the Employer."));
}

#[tokio::test]
async fn test_invalid_window_makes_no_calls() {
    let gateway = ScriptedGateway::new(vec![]);
    let reviewer = Reviewer::new(gateway.clone(), settings(100, 100, 1));

    let err = reviewer.review(&request("text")).await.unwrap_err();
    assert_eq!(
        err,
        ReviewError::Chunking(ChunkingError::OverlapTooLarge {
            window_size: 100,
            overlap: 100
        })
    );
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
    let gateway = ScriptedGateway::new(vec![]);
    let reviewer = Reviewer::new(gateway.clone(), settings(100, 10, 0));
    assert!(matches!(
        reviewer.review(&request("text")).await,
        Err(ReviewError::Configuration(_))
    ));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_review_stops_before_calling() {
    let gateway = ScriptedGateway::new(vec![Ok(finding_json("x", "policy"))]);
    let token = CancellationToken::new();
    token.cancel();
    let reviewer = Reviewer::new(gateway.clone(), settings(10, 0, 1)).with_cancellation(token);

    let err = reviewer.review(&request(&"c".repeat(30))).await.unwrap_err();
    assert_eq!(err, ReviewError::Cancelled);
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_stops_and_drops_partial_findings() {
    let token = CancellationToken::new();
    let gateway = Arc::new(CancelOnFirstCall {
        token: token.clone(),
        calls: Mutex::new(0),
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway.clone(), settings(10, 0, 1))
        .with_progress(tx)
        .with_cancellation(token);

    let err = reviewer.review(&request(&"m".repeat(30))).await.unwrap_err();
    assert_eq!(err, ReviewError::Cancelled);
    assert_eq!(*gateway.calls.lock().unwrap(), 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| e.is_error()));
}

#[tokio::test]
#[traced_test]
async fn test_unit_failure_is_logged() {
    let gateway = ScriptedGateway::new(vec![Err(GatewayError::Timeout(60))]);
    let reviewer = Reviewer::new(gateway, settings(100, 10, 1));

    let report = reviewer.review(&request("short")).await.unwrap();
    assert!(report.reviews.is_empty());
    assert!(logs_contain("unit failed"));
    assert!(logs_contain("timed out after 60s"));
}

// ── Outline mode ─────────────────────────────────────────────────────────

fn rows(names: &[&str]) -> Vec<OutlineRow> {
    names
        .iter()
        .enumerate()
        .map(|(row, name)| OutlineRow {
            row: row + 1,
            item_name: name.to_string(),
            description: format!("check {name}"),
        })
        .collect()
}

#[tokio::test]
async fn test_outline_answers_every_row_even_when_all_fail() {
    let gateway = ScriptedGateway::new(vec![]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway.clone(), settings(100, 10, 1)).with_progress(tx);
    let checklist = rows(&["Parties", "Term", "Payment", "Termination"]);

    let answers = reviewer
        .review_outline("Full contract text.", &checklist, Stance::PartyA)
        .await
        .unwrap();

    assert_eq!(answers.len(), checklist.len());
    for (answer, row) in answers.iter().zip(&checklist) {
        assert_eq!(answer.row, row.row);
        assert_eq!(answer.item_name, row.item_name);
        assert!(answer.result.starts_with("Review failed"));
    }
    assert_eq!(gateway.calls(), 4);

    let events = drain(&mut rx);
    let steps = events.iter().filter(|e| matches!(e, ProgressEvent::Step { .. })).count();
    assert_eq!(steps, 4);
    assert_eq!(events.iter().filter(|e| e.is_error()).count(), 4);
}

#[tokio::test]
async fn test_outline_sends_whole_document_per_row() {
    let gateway = ScriptedGateway::new(vec![
        Ok("  Satisfied: clause 1 names both parties.  ".into()),
        Err(GatewayError::Provider {
            status: 429,
            body: "rate limited".into(),
        }),
    ]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reviewer = Reviewer::new(gateway.clone(), settings(10, 0, 1)).with_progress(tx);
    let document = "Clause 1. Parties. ".repeat(20);

    let answers = reviewer
        .review_outline(&document, &rows(&["Parties", "Governing law"]), Stance::PartyB)
        .await
        .unwrap();

    assert_eq!(answers[0].result, "Satisfied: clause 1 names both parties.");
    assert!(answers[1].result.contains("429"));

    let prompts = gateway.prompts.lock().unwrap().clone();
    assert!(prompts.iter().all(|p| p.contains(&document)));
    assert!(prompts[1].contains("Governing law"));
    assert!(prompts[1].contains("check Governing law"));

    match &drain(&mut rx)[1] {
        ProgressEvent::Step { current, total, label } => {
            assert_eq!((*current, *total), (1, 2));
            assert_eq!(label, "Parties");
        }
        other => panic!("expected step, got {other:?}"),
    }
}

#[tokio::test]
async fn test_outline_with_no_rows() {
    let gateway = ScriptedGateway::new(vec![]);
    let reviewer = Reviewer::new(gateway.clone(), ReviewSettings::default());
    let answers = reviewer.review_outline("doc", &[], Stance::PartyA).await.unwrap();
    assert!(answers.is_empty());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_outline_pauses_between_rows_but_not_after_last() {
    let gateway = ScriptedGateway::new(vec![Ok("a".into()), Ok("b".into()), Ok("c".into())]);
    let mut with_delay = settings(10, 0, 1);
    with_delay.outline_delay_ms = 50;
    let reviewer = Reviewer::new(gateway.clone(), with_delay);

    let started = tokio::time::Instant::now();
    let answers = reviewer
        .review_outline("doc", &rows(&["Parties", "Payment", "Term"]), Stance::PartyA)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(answers.len(), 3);
    assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_outline_cancelled() {
    let gateway = ScriptedGateway::new(vec![]);
    let token = CancellationToken::new();
    token.cancel();
    let reviewer = Reviewer::new(gateway.clone(), settings(10, 0, 1)).with_cancellation(token);
    let result = reviewer.review_outline("doc", &rows(&["Parties"]), Stance::PartyA).await;
    assert_eq!(result.unwrap_err(), ReviewError::Cancelled);
    assert_eq!(gateway.calls(), 0);
}
