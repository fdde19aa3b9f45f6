use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use redline_core::provider::Provider;
use tracing::{info, warn};

use crate::AppState;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Request headers passed through to the provider.
const FORWARDED: [HeaderName; 3] = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    response
}

/// Forwards `/api/proxy/<provider>/<rest>` to `<provider host>/<rest>` for
/// browser clients that cannot call the providers directly.
pub(crate) async fn forward(
    State(state): State<Arc<AppState>>,
    Path((provider, rest)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<Provider>() else {
        warn!(provider = %provider, "proxy request for unknown provider");
        return (StatusCode::BAD_REQUEST, "Invalid API Service").into_response();
    };

    if method == Method::OPTIONS {
        return with_cors(StatusCode::NO_CONTENT.into_response());
    }

    let mut url = format!(
        "{}/{}",
        state.config.base_url(provider).trim_end_matches('/'),
        rest.trim_start_matches('/')
    );
    if let Some(q) = query {
        url.push('?');
        url.push_str(&q);
    }

    let mut upstream = state.http.request(method.clone(), &url).body(body);
    for name in FORWARDED {
        if let Some(value) = headers.get(&name) {
            upstream = upstream.header(name, value.clone());
        }
    }

    info!(provider = %provider, method = %method, path = %rest, "proxying provider request");
    let response = match upstream.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(provider = %provider, "proxy upstream request failed: {}", e.without_url());
            return with_cors((StatusCode::BAD_GATEWAY, "Upstream request failed").into_response());
        },
    };

    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!(provider = %provider, "proxy upstream body failed: {}", e.without_url());
            return with_cors((StatusCode::BAD_GATEWAY, "Upstream request failed").into_response());
        },
    };

    let mut out = (status, bytes).into_response();
    if let Some(ct) = content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    with_cors(out)
}
