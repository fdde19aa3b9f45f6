use std::time::Duration;

use tracing::{info, warn};

use crate::{
    error::ReviewError,
    gateway::ChatRequest,
    prompt::{build_prompt, PromptContext, OUTLINE_SYSTEM_PROMPT},
    review::Reviewer,
    types::{OutlineAnswer, OutlineRow, ProgressEvent, ReviewUnit, Stance},
};

/// Parses a tabular checklist: one row per line, cells separated by tabs
/// (or commas when a line has no tab), with CSV-style double quoting so a
/// quoted cell may contain the separator. Column one is the item name,
/// column two its description. Blank lines are dropped before numbering, so
/// `row` is the index among non-blank lines (header rows included), which
/// is how spreadsheet exports count rows for writing answers back.
pub fn parse_checklist(text: &str) -> Vec<OutlineRow> {
    text.lines()
        .map(|line| {
            let sep = if line.contains('\t') { '\t' } else { ',' };
            split_cells(line, sep)
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .enumerate()
        .filter_map(|(row, cells)| {
            let mut cells = cells.into_iter();
            let item_name = cells.next().unwrap_or_default();
            let description = cells.next().unwrap_or_default();
            if item_name.is_empty() || is_header(&item_name) {
                return None;
            }
            Some(OutlineRow {
                row,
                item_name,
                description,
            })
        })
        .collect()
}

/// Splits one line on `sep`, honouring double-quoted cells and `""` escapes.
/// Cells are trimmed.
fn split_cells(line: &str, sep: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if cell.trim().is_empty() => {
                cell.clear();
                quoted = true;
            }
            c if c == sep && !quoted => cells.push(std::mem::take(&mut cell).trim().to_string()),
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

fn is_header(cell: &str) -> bool {
    let lower = cell.to_lowercase();
    cell.contains("审查项目")
        || cell.contains("说明")
        || (cell.contains("项目") && cell.chars().count() < 3)
        || matches!(lower.as_str(), "item" | "item name" | "review item" | "checklist item")
}

impl Reviewer {
    /// Answers each checklist row against the whole document, one call per
    /// row, with a fixed pause between calls. Always returns one answer per
    /// row; a failed row carries the error text as its result. A cancelled
    /// run returns [`ReviewError::Cancelled`] without the answers so far.
    pub async fn review_outline(
        &self,
        document: &str,
        rows: &[OutlineRow],
        stance: Stance,
    ) -> Result<Vec<OutlineAnswer>, ReviewError> {
        self.settings().validate()?;
        let total = rows.len();
        let delay = Duration::from_millis(self.settings().outline_delay_ms);
        let ctx = PromptContext {
            stance,
            risks: &[],
            document,
        };

        info!(total, chars = document.chars().count(), "outline review started");
        self.emit(ProgressEvent::info(format!("Checklist has {total} item(s) to review.")));

        let mut answers = Vec::with_capacity(total);
        for (i, row) in rows.iter().enumerate() {
            if self.is_cancelled() {
                warn!(row = i + 1, total, "outline review cancelled");
                self.emit(ProgressEvent::error("Review cancelled."));
                return Err(ReviewError::Cancelled);
            }

            self.emit(ProgressEvent::Step {
                current: i + 1,
                total,
                label: row.item_name.clone(),
            });

            let prompt = build_prompt(&ReviewUnit::Row(row.clone()), &ctx);
            let request = ChatRequest::new(prompt).with_system(OUTLINE_SYSTEM_PROMPT);
            let result = match self.gateway().complete(&request).await {
                Ok(reply) => {
                    info!(row = i + 1, total, reply_len = reply.len(), "checklist item answered");
                    reply.trim().to_string()
                }
                Err(e) => {
                    warn!(row = i + 1, total, item = %row.item_name, "checklist item failed: {}", e);
                    self.emit(ProgressEvent::error(format!("Item \"{}\" failed: {e}", row.item_name)));
                    format!("Review failed: {e}")
                }
            };

            answers.push(OutlineAnswer {
                row: row.row,
                item_name: row.item_name.clone(),
                description: row.description.clone(),
                result,
            });

            if i + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(total, "outline review finished");
        self.emit(ProgressEvent::info(format!("Checklist review complete: {total} item(s).")));
        Ok(answers)
    }
}
