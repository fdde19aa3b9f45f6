use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use redline_agent::{assist, openai::parse_completion, ProviderClient};
use redline_core::{
    config::GatewayOptions,
    error::{ConfigurationError, GatewayError},
    gateway::{ChatGateway, ChatRequest},
    provider::{Provider, ProviderConfig},
};
use serde_json::{json, Value};
use tracing_test::traced_test;

const KEY: &str = "sk-secret-test-key-0042";

// ── Mock upstream ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

async fn spawn_upstream(path: &'static str, status: StatusCode, reply: Value, delay: Duration) -> (String, Seen) {
    let seen = Seen::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        path,
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let recorder = recorder.clone();
            let reply = reply.clone();
            async move {
                recorder.bodies.lock().unwrap().push(body);
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                recorder.auth.lock().unwrap().push(auth);
                tokio::time::sleep(delay).await;
                (status, Json(reply))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn completion(content: &str) -> Value {
    json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

fn options(base_url: &str, timeout_secs: u64) -> GatewayOptions {
    GatewayOptions {
        base_url: base_url.to_string(),
        timeout_secs,
        max_tokens: 1024,
    }
}

fn client(provider: Provider, base_url: &str) -> ProviderClient {
    ProviderClient::new(ProviderConfig::new(provider, KEY), options(base_url, 5)).unwrap()
}

// ── Successful calls ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_completion_returns_message_content() {
    let (url, seen) = spawn_upstream(
        "/chat/completions",
        StatusCode::OK,
        completion(r#"{"reviews": []}"#),
        Duration::ZERO,
    )
    .await;
    let gateway = client(Provider::Deepseek, &url);

    let request = ChatRequest::new("review this").with_system("be precise");
    let reply = gateway.complete(&request).await.unwrap();
    assert_eq!(reply, r#"{"reviews": []}"#);

    let body = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "deepseek-chat");
    assert_eq!(body["stream"], false);
    assert_eq!(body["max_tokens"], 1024);
    assert_eq!(
        body["messages"],
        json!([
            {"role": "system", "content": "be precise"},
            {"role": "user", "content": "review this"}
        ])
    );
    assert_eq!(seen.auth.lock().unwrap()[0], format!("Bearer {KEY}"));
}

#[tokio::test]
async fn test_provider_endpoint_and_model_override() {
    let (url, seen) = spawn_upstream(
        "/api/v3/chat/completions",
        StatusCode::OK,
        completion("ok"),
        Duration::ZERO,
    )
    .await;
    let config = ProviderConfig::new(Provider::Doubao, KEY).with_model("doubao-lite-4k");
    let gateway = ProviderClient::new(config, options(&format!("{url}/"), 5)).unwrap();
    assert_eq!(gateway.endpoint(), format!("{url}/api/v3/chat/completions"));

    assert_eq!(gateway.complete(&ChatRequest::new("hi")).await.unwrap(), "ok");
    let body = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "doubao-lite-4k");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_success_status_is_provider_error() {
    let (url, _) = spawn_upstream(
        "/compatible-mode/v1/chat/completions",
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "rate limited"}}),
        Duration::ZERO,
    )
    .await;
    let gateway = client(Provider::Tongyi, &url);

    match gateway.complete(&ChatRequest::new("hi")).await.unwrap_err() {
        GatewayError::Provider { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("rate limited"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_object_in_ok_body() {
    let (url, _) = spawn_upstream(
        "/chat/completions",
        StatusCode::OK,
        json!({"error": {"message": "model not found", "code": "invalid_model"}}),
        Duration::ZERO,
    )
    .await;
    let err = client(Provider::Deepseek, &url)
        .complete(&ChatRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::ProviderReported("model not found".into()));
}

#[tokio::test]
async fn test_missing_choices_is_malformed() {
    let (url, _) = spawn_upstream("/chat/completions", StatusCode::OK, json!({"id": "x"}), Duration::ZERO).await;
    let err = client(Provider::Deepseek, &url)
        .complete(&ChatRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::MalformedReply(_)));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let (url, _) = spawn_upstream(
        "/chat/completions",
        StatusCode::OK,
        completion("late"),
        Duration::from_secs(5),
    )
    .await;
    let gateway = ProviderClient::new(ProviderConfig::new(Provider::Deepseek, KEY), options(&url, 1)).unwrap();
    let err = gateway.complete(&ChatRequest::new("hi")).await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout(1));
}

#[tokio::test]
async fn test_shared_client_still_times_out_per_call() {
    let (url, _) = spawn_upstream(
        "/chat/completions",
        StatusCode::OK,
        completion("late"),
        Duration::from_secs(5),
    )
    .await;
    let shared = reqwest::Client::new();
    let fast = ProviderClient::with_client(
        ProviderConfig::new(Provider::Deepseek, KEY),
        options(&url, 1),
        shared.clone(),
    )
    .unwrap();
    let err = fast.complete(&ChatRequest::new("hi")).await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout(1));
}

#[tokio::test]
async fn test_shared_client_serves_several_gateways() {
    let (url, seen) = spawn_upstream(
        "/chat/completions",
        StatusCode::OK,
        completion("ok"),
        Duration::ZERO,
    )
    .await;
    let shared = reqwest::Client::new();
    for model in ["m-one", "m-two"] {
        let gateway = ProviderClient::with_client(
            ProviderConfig::new(Provider::Deepseek, KEY).with_model(model),
            options(&url, 5),
            shared.clone(),
        )
        .unwrap();
        assert_eq!(gateway.complete(&ChatRequest::new("hi")).await.unwrap(), "ok");
    }
    let models: Vec<Value> = seen.bodies.lock().unwrap().iter().map(|b| b["model"].clone()).collect();
    assert_eq!(models, vec![json!("m-one"), json!("m-two")]);
}

#[tokio::test]
async fn test_unreachable_host_is_connectivity_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(Provider::Deepseek, &format!("http://{addr}"))
        .complete(&ChatRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Connectivity(_)));
}

#[test]
fn test_missing_key_fails_at_construction() {
    let result = ProviderClient::new(
        ProviderConfig::new(Provider::Tongyi, ""),
        GatewayOptions::for_provider(Provider::Tongyi),
    );
    assert_eq!(
        result.err(),
        Some(ConfigurationError::MissingApiKey("tongyi".into()))
    );
}

#[tokio::test]
#[traced_test]
async fn test_api_key_is_never_logged() {
    let (url, _) = spawn_upstream(
        "/chat/completions",
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "bad key"}}),
        Duration::ZERO,
    )
    .await;
    let _ = client(Provider::Deepseek, &url).complete(&ChatRequest::new("hi")).await;
    assert!(logs_contain("calling chat completion API"));
    assert!(logs_contain("non-2xx"));
    assert!(!logs_contain(KEY));
}

// ── Completion parsing ───────────────────────────────────────────────────

#[test]
fn test_parse_completion() {
    assert_eq!(parse_completion(&completion("hello").to_string()).unwrap(), "hello");
    assert!(matches!(
        parse_completion("<html>gateway error</html>"),
        Err(GatewayError::MalformedReply(_))
    ));
    assert_eq!(
        parse_completion(r#"{"error": "quota exceeded"}"#),
        Err(GatewayError::ProviderReported("quota exceeded".into()))
    );
    assert_eq!(
        parse_completion(r#"{"error": null, "choices": [{"message": {"content": "x"}}]}"#),
        Ok("x".into())
    );
}

// ── Assist lookups ───────────────────────────────────────────────────────

struct EchoGateway {
    prompts: Mutex<Vec<String>>,
    reply: Result<String, GatewayError>,
}

#[async_trait]
impl ChatGateway for EchoGateway {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.reply.clone()
    }
}

#[tokio::test]
async fn test_company_profile() {
    let gateway = EchoGateway {
        prompts: Mutex::default(),
        reply: Ok("  Registered in 2010; no litigation found.\n".into()),
    };
    let profile = assist::company_profile(&gateway, " Acme Trading Co. ").await.unwrap();
    assert_eq!(profile, "Registered in 2010; no litigation found.");
    let prompt = gateway.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("\"Acme Trading Co.\""));
    assert!(prompt.contains("litigation"));
}

#[tokio::test]
async fn test_similar_cases_propagates_errors() {
    let gateway = EchoGateway {
        prompts: Mutex::default(),
        reply: Err(GatewayError::Timeout(60)),
    };
    let err = assist::similar_cases(&gateway, "late delivery penalty").await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout(60));
    assert!(gateway.prompts.lock().unwrap()[0].contains("late delivery penalty"));
}
