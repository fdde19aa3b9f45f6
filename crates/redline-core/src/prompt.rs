use crate::types::{OutlineRow, ReviewUnit, RiskType, Stance, TextWindow};

/// System instruction for standard-mode calls.
pub const REVIEW_SYSTEM_PROMPT: &str =
    "You are a helpful, professional legal assistant. Output valid, plain JSON only.";

/// System instruction for outline-mode calls.
pub const OUTLINE_SYSTEM_PROMPT: &str =
    "You are a meticulous legal reviewer. Answer checklist items precisely and concisely.";

/// Inputs shared by every unit of a run.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub stance: Stance,
    /// Requested categories (standard mode). Empty means all three.
    pub risks: &'a [RiskType],
    /// Full document text (outline mode only).
    pub document: &'a str,
}

pub fn build_prompt(unit: &ReviewUnit, ctx: &PromptContext<'_>) -> String {
    match unit {
        ReviewUnit::Window(w) => build_window_prompt(w, ctx),
        ReviewUnit::Row(r) => build_row_prompt(r, ctx),
    }
}

fn risk_list(risks: &[RiskType]) -> String {
    let risks = if risks.is_empty() { &RiskType::ALL[..] } else { risks };
    risks
        .iter()
        .map(|r| format!("{} ({})", r.label(), r.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_window_prompt(window: &TextWindow, ctx: &PromptContext<'_>) -> String {
    let mut s = String::new();
    s.push_str("You are a professional legal review assistant.\n");
    s.push_str(&format!(
        "Review the following excerpt of a legal document from the standpoint of {}.\n\n",
        ctx.stance.label()
    ));
    s.push_str(&format!("Focus on these risks: {}.\n\n", risk_list(ctx.risks)));
    s.push_str(RISK_LEVEL_RUBRIC);
    s.push_str("\n---\nDocument excerpt:\n");
    s.push_str(&window.text);
    s.push_str("\n---\n\n");
    s.push_str(OUTPUT_SCHEMA);
    s
}

fn build_row_prompt(row: &OutlineRow, ctx: &PromptContext<'_>) -> String {
    let mut s = String::new();
    s.push_str("You are a professional legal review assistant.\n");
    s.push_str(&format!(
        "Review the complete legal document below from the standpoint of {} \
         and answer one checklist item.\n\n",
        ctx.stance.label()
    ));
    s.push_str(&format!("Checklist item: {}\n", row.item_name));
    if !row.description.is_empty() {
        s.push_str(&format!("Item description: {}\n", row.description));
    }
    s.push_str("\n---\nDocument:\n");
    s.push_str(ctx.document);
    s.push_str("\n---\n\n");
    s.push_str(
        "State whether the document satisfies this item, quote the relevant clause \
         where one exists, and note any gap or recommended change. Answer in plain \
         text in the language of the document, without markdown headings.",
    );
    s
}

const RISK_LEVEL_RUBRIC: &str = "Risk levels:\n\
- high: large room for improvement; problems are likely\n\
- medium: some room for improvement; problems are possible in similar situations\n\
- low: problems are unlikely; only minor improvements are possible\n";

const OUTPUT_SCHEMA: &str = r#"Return the result as JSON with exactly this structure:
{
  "reviews": [
    {
      "original_text_snippet": "the exact original text that causes the issue",
      "risk_type": "policy|financial|execution",
      "risk_level": "high|medium|low",
      "reason": "why this is a risk",
      "suggestion": "how to amend it"
    }
  ]
}
"risk_type" must be exactly one of "policy", "financial", "execution".
"risk_level" must be exactly one of "high", "medium", "low".
Write "reason" and "suggestion" in the language of the document.
If no risk is found, return {"reviews": []}.

Important: the output must be a valid, plain JSON string.
1. Do not wrap it in markdown code fences (such as ```json).
2. Strings must not contain unescaped control characters such as raw newlines.
3. Use single quotes or escaped double quotes for quotations inside strings.
4. Do not add comments."#;
