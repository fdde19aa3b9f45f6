use serde::{Deserialize, Serialize};

// ── Review vocabulary ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskType {
    Policy,
    Financial,
    Execution,
}

impl RiskType {
    pub const ALL: [RiskType; 3] = [RiskType::Policy, RiskType::Financial, RiskType::Execution];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Financial => "financial",
            Self::Execution => "execution",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Policy => "Policy risk",
            Self::Financial => "Financial risk",
            Self::Execution => "Execution risk",
        }
    }

    /// Accepts the English enum value in any case, or the Chinese label the
    /// models tend to echo back from the UI vocabulary.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" | "政策风险" | "政策" => Some(Self::Policy),
            "financial" | "finance" | "财务风险" | "财务" => Some(Self::Financial),
            "execution" | "执行风险" | "执行" => Some(Self::Execution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High risk",
            Self::Medium => "Medium risk",
            Self::Low => "Low risk",
        }
    }

    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "高风险" | "高" => Some(Self::High),
            "medium" | "moderate" | "中等风险" | "中风险" | "中" => Some(Self::Medium),
            "low" | "低风险" | "低" => Some(Self::Low),
            _ => None,
        }
    }
}

/// The party whose interests the review protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stance {
    #[default]
    PartyA,
    PartyB,
}

impl Stance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PartyA => "Party A (rights holder / principal)",
            Self::PartyB => "Party B (obligor / contractor)",
        }
    }
}

// ── Review units ─────────────────────────────────────────────────────────

/// One bounded slice of the document. Offsets are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextWindow {
    pub index: usize,
    pub start_offset: usize,
    pub text: String,
}

/// One row of a review checklist (outline mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRow {
    /// Zero-based line index in the source checklist.
    pub row: usize,
    pub item_name: String,
    #[serde(default)]
    pub description: String,
}

/// A single model call's worth of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewUnit {
    Window(TextWindow),
    Row(OutlineRow),
}

impl ReviewUnit {
    pub fn label(&self) -> String {
        match self {
            Self::Window(w) => format!("part {}", w.index + 1),
            Self::Row(r) => r.item_name.clone(),
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────────

/// One structured risk record extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub original_text_snippet: String,
    pub risk_type: RiskType,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub suggestion: String,
}

/// Aggregate output of a standard-mode review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub reviews: Vec<ReviewFinding>,
}

/// Exactly one per checklist row, failed rows included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineAnswer {
    pub row: usize,
    pub item_name: String,
    pub description: String,
    pub result: String,
}

// ── Progress ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Info,
    Error,
}

/// Ephemeral progress notification for the caller's running log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log { level: ProgressLevel, message: String },
    Step { current: usize, total: usize, label: String },
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: ProgressLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Log {
            level: ProgressLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Log {
                level: ProgressLevel::Error,
                ..
            }
        )
    }
}
