//! Tolerant JSON recovery for oracle responses.
//!
//! Candidates are tried cheapest first: the raw text, the text without code
//! fences, the first balanced object, and finally a repaired rendition. The
//! first candidate that parses to a JSON object wins.

use serde_json::Value;

/// Parses the first JSON object that can be salvaged from `raw`.
pub fn recover_json(raw: &str) -> Option<Value> {
    let stripped = strip_fences(raw);
    let mut candidates = vec![raw.trim().to_string(), stripped.clone()];
    if let Some(object) = extract_json_object(&stripped) {
        candidates.push(object);
    }
    candidates.push(repair(&stripped));

    candidates
        .into_iter()
        .filter(|candidate| !candidate.is_empty())
        .find_map(|candidate| match serde_json::from_str::<Value>(&candidate) {
            Ok(value) if value.is_object() => Some(value),
            _ => None,
        })
}

/// Removes Markdown code fences (with or without a language tag).
pub fn strip_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = rest[idx + 3..]
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// First balanced `{...}` in `raw`, ignoring braces inside string literals.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..=start + offset].trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn closer(open: char) -> char {
    if open == '[' {
        ']'
    } else {
        '}'
    }
}

fn next_significant(chars: &[char], from: usize) -> Option<(usize, char)> {
    chars
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, c)| !c.is_whitespace())
        .map(|(idx, c)| (idx, *c))
}

/// Decides whether a quote inside a string literal ends it, by looking at
/// what follows: a separator or the end of input means it does.
fn closes_string(chars: &[char], from: usize) -> bool {
    match next_significant(chars, from) {
        None => true,
        Some((_, ',' | '}' | ':')) => true,
        Some((idx, ']')) => matches!(
            next_significant(chars, idx + 1),
            None | Some((_, ',' | '}' | ']'))
        ),
        Some(_) => false,
    }
}

fn last_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

fn trim_trailing_comma(out: &mut String) {
    let keep = out.trim_end().len();
    out.truncate(keep);
    if out.ends_with(',') {
        out.pop();
    }
}

/// Best-effort structural repair of almost-JSON.
///
/// Quotes bare keys, escapes stray backslashes and inner quotes, drops
/// control characters and trailing commas, closes an unterminated string and
/// balances brackets. Text after the root value closes is discarded.
pub fn repair(text: &str) -> String {
    let start = text.find(|c: char| c == '{' || c == '[').unwrap_or(0);
    let chars: Vec<char> = text[start..].chars().collect();
    let mut out = String::with_capacity(chars.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        if in_string {
            match ch {
                '\\' => match chars.get(idx + 1) {
                    Some(&next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                        out.push('\\');
                        out.push(next);
                        idx += 2;
                        continue;
                    }
                    _ => out.push_str("\\\\"),
                },
                '"' if closes_string(&chars, idx + 1) => {
                    out.push('"');
                    in_string = false;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
            idx += 1;
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push('"');
            }
            '{' | '[' => {
                stack.push(ch);
                out.push(ch);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                let expected = if ch == '}' { '{' } else { '[' };
                while let Some(&open) = stack.last() {
                    if open == expected {
                        break;
                    }
                    stack.pop();
                    out.push(closer(open));
                }
                if stack.pop().is_some() {
                    out.push(ch);
                }
                if stack.is_empty() {
                    break;
                }
            }
            c if (c.is_ascii_alphabetic() || c == '_')
                && stack.last() == Some(&'{')
                && matches!(last_significant(&out), Some('{' | ',')) =>
            {
                let mut end = idx;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '-')
                {
                    end += 1;
                }
                out.push('"');
                out.extend(&chars[idx..end]);
                out.push('"');
                idx = end;
                continue;
            }
            c if c.is_control() && !c.is_whitespace() => {}
            c => out.push(c),
        }
        idx += 1;
    }

    if in_string {
        out.push('"');
    }
    trim_trailing_comma(&mut out);
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(open) = stack.pop() {
        out.push(closer(open));
    }
    out
}
