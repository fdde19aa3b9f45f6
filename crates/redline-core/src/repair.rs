//! Tolerant rewrite of almost-JSON into JSON.
//!
//! Handles what chat models typically get wrong: trailing or missing commas,
//! unquoted keys and bareword values, single-quoted strings, raw control
//! characters and stray double quotes inside strings, comments, mismatched
//! closers, and output cut off mid-string or mid-object. The result is not
//! guaranteed to parse; callers still run it through a strict parser.

const STRUCTURAL: [char; 4] = [',', '}', ']', ':'];

#[derive(Default)]
struct Repairer {
    out: String,
    /// Open containers, `{` or `[`.
    stack: Vec<char>,
    /// A complete value was just emitted in the current container.
    after_value: bool,
    /// The top-level value has been closed; anything further is ignored.
    done: bool,
}

pub fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut r = Repairer::default();
    let mut i = 0;

    while i < chars.len() && !r.done {
        let c = chars[i];
        match c {
            '"' | '\'' => i = r.string(&chars, i),
            '{' | '[' => {
                r.begin_value();
                r.out.push(c);
                r.stack.push(c);
                r.after_value = false;
                i += 1;
            }
            '}' | ']' => {
                r.close(c);
                i += 1;
            }
            ',' => {
                r.comma();
                i += 1;
            }
            ':' => {
                r.trim_trailing_whitespace();
                r.out.push(':');
                r.after_value = false;
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            c if c.is_whitespace() => {
                r.out.push(c);
                i += 1;
            }
            c if c == '-' || c.is_ascii_digit() => i = r.number(&chars, i),
            c if c.is_alphabetic() || c == '_' || c == '$' => i = r.bareword(&chars, i),
            // Anything else outside a string is noise.
            _ => i += 1,
        }
    }

    r.finish()
}

impl Repairer {
    fn last_significant(&self) -> Option<char> {
        self.out.chars().rev().find(|c| !c.is_whitespace())
    }

    fn expecting_key(&self) -> bool {
        self.stack.last() == Some(&'{') && matches!(self.last_significant(), Some('{') | Some(','))
    }

    fn trim_trailing_whitespace(&mut self) {
        let len = self.out.trim_end().len();
        self.out.truncate(len);
    }

    fn drop_trailing_comma(&mut self) {
        let len = self.out.trim_end().len();
        if self.out[..len].ends_with(',') {
            self.out.truncate(len - 1);
        }
    }

    /// Called before any value or key starts.
    fn begin_value(&mut self) {
        if self.after_value {
            self.trim_trailing_whitespace();
            self.out.push(',');
            self.after_value = false;
        }
    }

    fn fill_missing_value(&mut self) {
        if self.last_significant() == Some(':') {
            self.out.push_str("null");
            self.after_value = true;
        }
    }

    fn value_done(&mut self) {
        self.after_value = true;
        if self.stack.is_empty() {
            self.done = true;
        }
    }

    fn comma(&mut self) {
        self.fill_missing_value();
        if self.after_value {
            self.out.push(',');
            self.after_value = false;
        }
    }

    fn close(&mut self, closer: char) {
        let opener = if closer == '}' { '{' } else { '[' };
        if !self.stack.contains(&opener) {
            return;
        }
        self.fill_missing_value();
        self.drop_trailing_comma();
        while let Some(top) = self.stack.pop() {
            if top == opener {
                self.out.push(closer);
                break;
            }
            self.out.push(if top == '{' { '}' } else { ']' });
        }
        self.value_done();
    }

    fn string(&mut self, chars: &[char], start: usize) -> usize {
        let quote = chars[start];
        self.begin_value();
        self.out.push('"');
        let mut j = start + 1;

        while j < chars.len() {
            let ch = chars[j];
            match ch {
                '\\' => {
                    match chars.get(j + 1) {
                        Some(&n) if matches!(n, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                            self.out.push('\\');
                            self.out.push(n);
                        }
                        Some(&'\'') => self.out.push('\''),
                        Some(&n) => {
                            self.out.push_str("\\\\");
                            self.push_string_char(n);
                        }
                        None => self.out.push_str("\\\\"),
                    }
                    j += 2;
                    continue;
                }
                c if c == quote => {
                    if closes_string(chars, j + 1, self.stack.last() == Some(&'{')) {
                        self.out.push('"');
                        self.value_done();
                        return j + 1;
                    }
                    // A quote the model forgot to escape.
                    self.push_string_char(c);
                }
                c => self.push_string_char(c),
            }
            j += 1;
        }

        // Cut off mid-string.
        self.out.push('"');
        self.value_done();
        j
    }

    fn push_string_char(&mut self, c: char) {
        match c {
            '"' => self.out.push_str("\\\""),
            '\n' => self.out.push_str("\\n"),
            '\r' => self.out.push_str("\\r"),
            '\t' => self.out.push_str("\\t"),
            c if (c as u32) < 0x20 => self.out.push_str(&format!("\\u{:04x}", c as u32)),
            c => self.out.push(c),
        }
    }

    fn number(&mut self, chars: &[char], start: usize) -> usize {
        let is_key = self.expecting_key();
        self.begin_value();
        let mut j = start;
        while j < chars.len() && (chars[j].is_ascii_digit() || matches!(chars[j], '-' | '+' | '.' | 'e' | 'E')) {
            j += 1;
        }
        let literal: String = chars[start..j].iter().collect();
        if !is_key && serde_json::from_str::<serde_json::Number>(&literal).is_ok() {
            self.out.push_str(&literal);
        } else {
            self.out.push_str(&format!("\"{literal}\""));
        }
        self.value_done();
        j
    }

    fn bareword(&mut self, chars: &[char], start: usize) -> usize {
        let is_key = self.expecting_key();
        self.begin_value();
        let mut j = start;
        while j < chars.len() && (chars[j].is_alphanumeric() || matches!(chars[j], '_' | '$' | '-' | '.')) {
            j += 1;
        }
        let word: String = chars[start..j].iter().collect();
        let literal = match word.as_str() {
            _ if is_key => None,
            "true" | "True" => Some("true"),
            "false" | "False" => Some("false"),
            "null" | "None" | "undefined" => Some("null"),
            _ => None,
        };
        match literal {
            Some(l) => self.out.push_str(l),
            None => {
                self.out.push('"');
                for c in word.chars() {
                    self.push_string_char(c);
                }
                self.out.push('"');
            }
        }
        self.value_done();
        j
    }

    fn finish(mut self) -> String {
        self.fill_missing_value();
        self.drop_trailing_comma();
        while let Some(top) = self.stack.pop() {
            self.drop_trailing_comma();
            self.out.push(if top == '{' { '}' } else { ']' });
        }
        self.out.trim().to_string()
    }
}

/// Whether a quote at `chars[at - 1]` ends its string: it does when the next
/// significant character is structural, the input ends, or a new quoted
/// token starts on a following line (a missing comma between entries).
///
/// Inside an object a following comma only counts when what comes after it
/// can start the next key, so a quoted phrase followed by `,` and more
/// prose stays inside its string.
fn closes_string(chars: &[char], at: usize, in_object: bool) -> bool {
    let mut saw_newline = false;
    for (k, &c) in chars.iter().enumerate().skip(at) {
        if c == '\n' {
            saw_newline = true;
        }
        if c.is_whitespace() {
            continue;
        }
        if c == ',' && in_object {
            return starts_key(chars, k + 1);
        }
        return STRUCTURAL.contains(&c) || (saw_newline && matches!(c, '"' | '\'' | '{'));
    }
    true
}

/// Whether the text at `from` can begin an object key (or close the object).
fn starts_key(chars: &[char], from: usize) -> bool {
    let mut rest = chars[from.min(chars.len())..]
        .iter()
        .copied()
        .skip_while(|c| c.is_whitespace())
        .peekable();
    match rest.peek().copied() {
        None => true,
        Some('"' | '\'' | '{' | '[' | '}' | ']') => true,
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
            let mut tail = rest.skip_while(|c| c.is_alphanumeric() || matches!(*c, '_' | '$' | '-' | '.'));
            tail.find(|c| !c.is_whitespace()) == Some(':')
        }
        Some(_) => false,
    }
}
