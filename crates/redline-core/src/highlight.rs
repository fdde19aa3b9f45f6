use serde::Serialize;

use crate::types::ReviewFinding;

/// A run of document text, highlighted when it quotes a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    /// Index into the findings list of the snippet this run matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<usize>,
}

/// Cuts `text` into plain and highlighted segments.
///
/// Scans left to right, each time taking the earliest occurrence of any
/// finding's snippet at or after the cursor (ties go to the earlier
/// finding). Snippets that never occur in the text are ignored, and
/// matches never overlap. Concatenating the segments yields `text`.
pub fn highlight_segments(text: &str, findings: &[ReviewFinding]) -> Vec<Segment> {
    let snippets: Vec<(usize, &str)> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| (i, f.original_text_snippet.as_str()))
        .filter(|(_, s)| !s.is_empty() && text.contains(s))
        .collect();

    let mut segments = Vec::new();
    let mut cursor = 0;
    while cursor < text.len() {
        let next = snippets
            .iter()
            .filter_map(|&(i, s)| text[cursor..].find(s).map(|pos| (cursor + pos, i, s)))
            .min_by_key(|&(pos, i, _)| (pos, i));

        let Some((pos, finding, snippet)) = next else {
            segments.push(Segment {
                text: text[cursor..].to_string(),
                finding: None,
            });
            break;
        };
        if pos > cursor {
            segments.push(Segment {
                text: text[cursor..pos].to_string(),
                finding: None,
            });
        }
        segments.push(Segment {
            text: snippet.to_string(),
            finding: Some(finding),
        });
        cursor = pos + snippet.len();
    }
    segments
}
