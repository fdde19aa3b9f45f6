use serde_json::Value;
use tracing::debug;

use crate::{
    error::RecoveryError,
    repair::repair_json,
    types::{ReviewFinding, RiskLevel, RiskType},
};

/// A pure text transformation applied to a raw reply before parsing.
pub type CleanupStep = fn(&str) -> String;

/// Cleanup stages in the order they run; each consumes the previous output.
pub const CLEANUP_STEPS: [(&str, CleanupStep); 5] = [
    ("fence", extract_fenced),
    ("trim", trim),
    ("comments", strip_line_comments),
    ("quotes", normalize_quotes),
    ("braces", trim_to_braces),
];

/// Which parser accepted the cleaned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRoute {
    Strict,
    Repaired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub route: ParseRoute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredFindings {
    pub findings: Vec<ReviewFinding>,
    /// Entries of `reviews` that could not be decoded.
    pub skipped: usize,
    pub route: ParseRoute,
}

// ── Cleanup stages ───────────────────────────────────────────────────────

/// Content of the first ```json block, else of the first fenced block of any
/// tag, else the input unchanged. An unterminated block runs to the end.
pub fn extract_fenced(raw: &str) -> String {
    const FENCE: &str = "```";
    // ASCII lowercasing keeps byte offsets aligned with `raw`.
    let lower = raw.to_ascii_lowercase();
    if let Some(pos) = lower.find("```json") {
        return until_fence(&raw[pos + "```json".len()..]).to_string();
    }
    if let Some(pos) = raw.find(FENCE) {
        return until_fence(skip_info_string(&raw[pos + FENCE.len()..])).to_string();
    }
    raw.to_string()
}

fn until_fence(body: &str) -> &str {
    body.find("```").map_or(body, |end| &body[..end])
}

fn skip_info_string(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest))
            if first
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            rest
        }
        _ => body,
    }
}

pub fn trim(s: &str) -> String {
    s.trim().to_string()
}

/// Drops `//` to end of line outside of double-quoted strings.
pub fn strip_line_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Typographic quotation marks to their ASCII equivalents.
pub fn normalize_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            c => c,
        })
        .collect()
}

/// Keeps the span from the first `{` to the last `}` when both exist.
pub fn trim_to_braces(s: &str) -> String {
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => s[start..=end].to_string(),
        _ => s.to_string(),
    }
}

pub fn clean(raw: &str) -> String {
    CLEANUP_STEPS
        .iter()
        .fold(raw.to_string(), |text, (_, step)| step(&text))
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// Strict parse, then a repair pass. Text with no object or array opener is
/// not worth repairing: a bareword reply is prose, not data.
pub fn parse_cleaned(cleaned: &str) -> Result<Recovered, RecoveryError> {
    let strict_err = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => {
            return Ok(Recovered {
                value,
                route: ParseRoute::Strict,
            })
        }
        Err(e) => e,
    };

    if !cleaned.contains(['{', '[']) {
        return Err(RecoveryError {
            detail: format!("reply contains no JSON object ({strict_err})"),
        });
    }

    let repaired = repair_json(cleaned);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!(strict_error = %strict_err, "reply accepted after JSON repair");
            Ok(Recovered {
                value,
                route: ParseRoute::Repaired,
            })
        }
        Err(repair_err) => Err(RecoveryError {
            detail: format!("strict parse: {strict_err}; after repair: {repair_err}"),
        }),
    }
}

pub fn recover_value(raw: &str) -> Result<Recovered, RecoveryError> {
    parse_cleaned(&clean(raw))
}

/// Full recovery of one unit's reply. A parsed value without a `reviews`
/// array yields zero findings rather than an error.
pub fn recover_findings(raw: &str) -> Result<RecoveredFindings, RecoveryError> {
    let recovered = recover_value(raw)?;
    let (findings, skipped) = decode_findings(&recovered.value);
    Ok(RecoveredFindings {
        findings,
        skipped,
        route: recovered.route,
    })
}

// ── Finding decoding ─────────────────────────────────────────────────────

/// Decodes each `reviews` entry on its own so one bad entry does not sink
/// the rest. Returns the findings and the number of entries dropped.
pub fn decode_findings(value: &Value) -> (Vec<ReviewFinding>, usize) {
    let Some(items) = value.get("reviews").and_then(Value::as_array) else {
        return (Vec::new(), 0);
    };
    let mut skipped = 0;
    let findings = items
        .iter()
        .filter_map(|item| {
            let finding = decode_finding(item);
            if finding.is_none() {
                skipped += 1;
            }
            finding
        })
        .collect();
    (findings, skipped)
}

fn field<'a>(item: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| item.get(*name))
}

fn text_field(item: &Value, names: &[&str]) -> String {
    match field(item, names) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn decode_finding(item: &Value) -> Option<ReviewFinding> {
    item.as_object()?;
    let risk_type = field(item, &["risk_type", "riskType", "type"])?
        .as_str()
        .and_then(RiskType::parse_lenient)?;
    let risk_level = field(item, &["risk_level", "riskLevel", "level"])?
        .as_str()
        .and_then(RiskLevel::parse_lenient)?;
    Some(ReviewFinding {
        original_text_snippet: text_field(item, &["original_text_snippet", "originalTextSnippet", "snippet"]),
        risk_type,
        risk_level,
        reason: text_field(item, &["reason"]),
        suggestion: text_field(item, &["suggestion"]),
    })
}
