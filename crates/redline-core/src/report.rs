use chrono::{DateTime, Utc};

use crate::{
    highlight::highlight_segments,
    types::{OutlineAnswer, ReviewFinding},
};

pub const DEFAULT_REPORT_TITLE: &str = "Legal Document Review Report";

/// Markdown review report: risk summary followed by the original text with
/// every quoted snippet marked `==like this==`.
pub fn render_markdown_report(
    title: &str,
    text: &str,
    findings: &[ReviewFinding],
    generated_at: DateTime<Utc>,
) -> String {
    let mut s = String::new();
    s.push_str(&format!("# {title}\n\n"));
    s.push_str(&format!(
        "_Generated: {}_\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    s.push_str("## Risk summary\n\n");
    if findings.is_empty() {
        s.push_str("No significant risks found.\n\n");
    }
    for (i, f) in findings.iter().enumerate() {
        s.push_str(&format!(
            "### {}. [{}] [{}]\n\n",
            i + 1,
            f.risk_type.label(),
            f.risk_level.label()
        ));
        s.push_str(&format!("**Reason:** {}\n\n", f.reason));
        s.push_str(&format!("**Suggestion:** {}\n\n", f.suggestion));
        if !f.original_text_snippet.is_empty() {
            s.push_str(&format!("> _\"{}\"_\n\n", f.original_text_snippet.replace('\n', " ")));
        }
    }

    s.push_str("## Original text (annotated)\n\n");
    for segment in highlight_segments(text, findings) {
        match segment.finding {
            Some(_) => s.push_str(&mark_lines(&segment.text)),
            None => s.push_str(&segment.text),
        }
    }
    if !s.ends_with('\n') {
        s.push('\n');
    }
    s
}

/// `==…==` does not span line breaks, so each line is marked separately.
fn mark_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("=={line}==")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Three-column checklist table: item, description, result.
pub fn render_outline_markdown(answers: &[OutlineAnswer]) -> String {
    let mut s = String::from("| Review item | Description | Result |\n|---|---|---|\n");
    for a in answers {
        s.push_str(&format!(
            "| {} | {} | {} |\n",
            table_cell(&a.item_name),
            table_cell(&a.description),
            table_cell(&a.result)
        ));
    }
    s
}

fn table_cell(text: &str) -> String {
    text.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}
