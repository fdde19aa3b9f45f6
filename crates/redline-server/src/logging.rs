use std::{collections::VecDeque, sync::Arc};

use chrono::Utc;
use tokio::sync::broadcast;

/// Lines kept for clients that connect to `/api/logs` late.
pub const RING_CAPACITY: usize = 500;

/// Mirrors every event as a JSON line `{ts, level, message, category}` into
/// a broadcast channel and a bounded replay ring.
pub struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: Arc<std::sync::Mutex<VecDeque<String>>>,
}

struct MessageVisitor<'a> {
    message: &'a mut String,
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message.clear();
            use std::fmt::Write;
            let _ = write!(self.message, "{value:?}");
            // Strip surrounding quotes added by Debug on &str
            if self.message.starts_with('"') && self.message.ends_with('"') && self.message.len() >= 2 {
                *self.message = self.message[1..self.message.len() - 1].to_string();
            }
        }
    }
}

/// `review` for the aggregator and reply recovery, `gateway` for provider
/// traffic, `system` for everything else.
pub fn category(target: &str) -> &'static str {
    if target.contains("review") || target.contains("outline") || target.contains("recovery") {
        "review"
    } else if target.contains("agent") || target.contains("proxy") {
        "gateway"
    } else {
        "system"
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut message = String::new();
        event.record(&mut MessageVisitor {
            message: &mut message,
        });

        let json = serde_json::json!({
            "ts": Utc::now().timestamp(),
            "level": level,
            "message": message,
            "category": category(event.metadata().target()),
        })
        .to_string();

        let _ = self.tx.send(json.clone());
        if let Ok(mut ring) = self.ring.lock() {
            ring.push_back(json);
            if ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }
    }
}
