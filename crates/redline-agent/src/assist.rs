//! Single-shot lookups offered next to a review. Not aggregated: a gateway
//! failure goes straight back to the caller.

use redline_core::{
    error::GatewayError,
    gateway::{ChatGateway, ChatRequest},
};
use tracing::info;

pub async fn company_profile(gateway: &dyn ChatGateway, name: &str) -> Result<String, GatewayError> {
    let prompt = format!(
        "Investigate the company \"{}\". Summarise its registration details, litigation \
         history and industry qualifications. Keep it concise.",
        name.trim()
    );
    lookup(gateway, "company_profile", prompt).await
}

pub async fn similar_cases(gateway: &dyn ChatGateway, query: &str) -> Result<String, GatewayError> {
    let prompt = format!(
        "Find legal cases similar to \"{}\". For each, give the judgment outcome, the key \
         points of the ruling and the legal basis. Keep it concise.",
        query.trim()
    );
    lookup(gateway, "similar_cases", prompt).await
}

async fn lookup(gateway: &dyn ChatGateway, kind: &str, prompt: String) -> Result<String, GatewayError> {
    let reply = gateway.complete(&ChatRequest::new(prompt)).await?;
    info!(kind, reply_len = reply.len(), "assist lookup answered");
    Ok(reply.trim().to_string())
}
