use std::{convert::Infallible, future::Future, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use chrono::Utc;
use redline_agent::assist;
use redline_core::{
    error::{GatewayError, ReviewError},
    outline::parse_checklist,
    provider::{mask_key, Provider, ProviderConfig},
    report::{render_markdown_report, render_outline_markdown, DEFAULT_REPORT_TITLE},
    review::{ReviewRequest, Reviewer},
    OutlineAnswer, OutlineRow, ProgressEvent, ReviewFinding, RiskType, Stance,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{AppState, ProviderSelection};

// ── Error helpers ─────────────────────────────────────────────────────────

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("internal error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}

pub(crate) fn bad_request(e: impl std::fmt::Display) -> ApiError {
    warn!("rejected request: {e}");
    (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
}

fn bad_gateway(e: GatewayError) -> ApiError {
    warn!("assist lookup failed: {e}");
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct ReviewBody {
    pub text: String,
    #[serde(default)]
    pub risks: Vec<RiskType>,
    #[serde(default)]
    pub stance: Stance,
    pub provider: Option<ProviderSelection>,
}

#[derive(Deserialize)]
pub(crate) struct OutlineBody {
    pub text: String,
    /// Raw tab- or comma-separated checklist.
    pub checklist: Option<String>,
    /// Pre-parsed rows; take precedence over `checklist`.
    pub rows: Option<Vec<OutlineRow>>,
    #[serde(default)]
    pub stance: Stance,
    pub provider: Option<ProviderSelection>,
}

#[derive(Deserialize)]
pub(crate) struct ReportBody {
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub reviews: Vec<ReviewFinding>,
}

#[derive(Deserialize)]
pub(crate) struct OutlineReportBody {
    pub answers: Vec<OutlineAnswer>,
}

#[derive(Deserialize)]
pub(crate) struct AssistBody {
    pub query: String,
    pub provider: Option<ProviderSelection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettingsBody {
    pub provider: String,
    pub api_key: String,
    pub model: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView {
    configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

impl From<Option<&ProviderConfig>> for SettingsView {
    fn from(config: Option<&ProviderConfig>) -> Self {
        match config {
            Some(c) => Self {
                configured: true,
                provider: Some(c.provider),
                model: Some(c.effective_model().to_string()),
                api_key: Some(mask_key(&c.api_key)),
            },
            None => Self {
                configured: false,
                provider: None,
                model: None,
                api_key: None,
            },
        }
    }
}

// ── Health / providers / settings ─────────────────────────────────────────

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn get_providers() -> Json<Value> {
    Json(json!(Provider::table()))
}

pub(crate) async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    let current = state.remembered().or_else(|| state.config.default_provider_config());
    Json(json!(SettingsView::from(current.as_ref())))
}

pub(crate) async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<Value>, ApiError> {
    let provider: Provider = body.provider.parse().map_err(bad_request)?;
    let mut config = ProviderConfig::new(provider, body.api_key.trim());
    config.model = body.model.filter(|m| !m.trim().is_empty());
    config.validate().map_err(bad_request)?;

    state.store.save(&config).map_err(internal)?;
    let view = SettingsView::from(Some(&config));
    state.remember(config);
    Ok(Json(json!(view)))
}

// ── Review streams ────────────────────────────────────────────────────────

fn json_event(name: &str, value: &impl Serialize) -> Event {
    match serde_json::to_string(value) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => Event::default()
            .event("error")
            .data(json!({ "error": e.to_string() }).to_string()),
    }
}

/// Runs one review in the background and streams it as SSE: `progress`
/// events while it runs, then a single `result` (or `error`) event.
/// Dropping the stream cancels the run at the next unit boundary.
fn stream_run<T, F, Fut>(run: F) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
    F: FnOnce(mpsc::UnboundedSender<ProgressEvent>, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ReviewError>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let forward = {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(ev) = progress_rx.recv().await {
                    if tx.send(json_event("progress", &ev)).is_err() {
                        break;
                    }
                }
            })
        };
        let watch = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tx.closed().await;
                cancel.cancel();
            })
        };

        let result = run(progress_tx, cancel).await;
        // Progress must be flushed before the terminal event.
        let _ = forward.await;
        watch.abort();

        let last = match result {
            Ok(value) => json_event("result", &value),
            Err(e) => {
                warn!("review run ended early: {e}");
                json_event("error", &json!({ "error": e.to_string() }))
            }
        };
        let _ = tx.send(last);
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

pub(crate) async fn post_review(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.config.review_settings().map_err(bad_request)?;
    let gateway = state.gateway(body.provider.as_ref()).map_err(bad_request)?;
    info!(
        chars = body.text.chars().count(),
        risks = body.risks.len(),
        "review requested"
    );

    Ok(stream_run(move |progress, cancel| async move {
        let reviewer = Reviewer::new(gateway, settings)
            .with_progress(progress)
            .with_cancellation(cancel);
        let request = ReviewRequest {
            text: &body.text,
            risks: &body.risks,
            stance: body.stance,
        };
        reviewer.review(&request).await
    }))
}

pub(crate) async fn post_outline(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OutlineBody>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.config.review_settings().map_err(bad_request)?;
    let rows = match (body.rows, body.checklist.as_deref()) {
        (Some(rows), _) => rows,
        (None, Some(checklist)) => parse_checklist(checklist),
        (None, None) => return Err(bad_request("request needs `rows` or `checklist`")),
    };
    let gateway = state.gateway(body.provider.as_ref()).map_err(bad_request)?;
    info!(rows = rows.len(), chars = body.text.chars().count(), "outline review requested");

    let text = body.text;
    let stance = body.stance;
    Ok(stream_run(move |progress, cancel| async move {
        let reviewer = Reviewer::new(gateway, settings)
            .with_progress(progress)
            .with_cancellation(cancel);
        let answers = reviewer.review_outline(&text, &rows, stance).await?;
        Ok::<_, ReviewError>(json!({ "answers": answers }))
    }))
}

// ── Reports ───────────────────────────────────────────────────────────────

const MARKDOWN: &str = "text/markdown; charset=utf-8";

pub(crate) async fn post_report(Json(body): Json<ReportBody>) -> impl IntoResponse {
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_REPORT_TITLE);
    let markdown = render_markdown_report(title, &body.text, &body.reviews, Utc::now());
    ([(header::CONTENT_TYPE, MARKDOWN)], markdown)
}

pub(crate) async fn post_outline_report(Json(body): Json<OutlineReportBody>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, MARKDOWN)], render_outline_markdown(&body.answers))
}

// ── Assist ────────────────────────────────────────────────────────────────

pub(crate) async fn post_assist_company(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssistBody>,
) -> Result<Json<Value>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let gateway = state.gateway(body.provider.as_ref()).map_err(bad_request)?;
    let result = assist::company_profile(gateway.as_ref(), &body.query)
        .await
        .map_err(bad_gateway)?;
    Ok(Json(json!({ "result": result })))
}

pub(crate) async fn post_assist_cases(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssistBody>,
) -> Result<Json<Value>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let gateway = state.gateway(body.provider.as_ref()).map_err(bad_request)?;
    let result = assist::similar_cases(gateway.as_ref(), &body.query)
        .await
        .map_err(bad_gateway)?;
    Ok(Json(json!({ "result": result })))
}

// ── SSE logs ──────────────────────────────────────────────────────────────

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting ring to avoid race
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx).map(|data| Ok::<_, Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
