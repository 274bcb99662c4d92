//! Balanced-bracket scanning over shell call text
//!
//! The scanner walks characters with an explicit stack of expected closers, so
//! arbitrarily deep `{...}` / `[...]` / `(...)` nesting is handled. Quoted
//! string literals (single or double quotes, backslash escapes) are skipped as
//! opaque text, which keeps brackets inside values such as `"a)b"` from
//! confusing the match.

use crate::error::{ParseError, Result};

/// Find the byte index of the bracket closing the one at `open`.
///
/// # Arguments
/// * `input` - Text to scan
/// * `open` - Byte index of an opening `(`, `[` or `{`
///
/// # Returns
/// * `Result<usize>` - Byte index of the matching closer, or `MalformedQuery`
pub fn matching_close(input: &str, open: usize) -> Result<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    let tail = input.get(open..).ok_or_else(|| {
        ParseError::MalformedQuery(format!("bracket position {open} is out of range"))
    })?;

    match tail.chars().next() {
        Some('(' | '[' | '{') => {}
        other => {
            return Err(ParseError::MalformedQuery(format!(
                "expected an opening bracket at position {open}, found {other:?}"
            ))
            .into());
        }
    }

    for (offset, ch) in tail.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ')' | ']' | '}' => {
                let expected = stack.pop().ok_or_else(|| {
                    ParseError::MalformedQuery(format!(
                        "unexpected '{ch}' at position {}",
                        open + offset
                    ))
                })?;
                if expected != ch {
                    return Err(ParseError::MalformedQuery(format!(
                        "expected '{expected}' but found '{ch}' at position {}",
                        open + offset
                    ))
                    .into());
                }
                if stack.is_empty() {
                    return Ok(open + offset);
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(ParseError::MalformedQuery("unterminated string literal".to_string()).into());
    }
    Err(ParseError::MalformedQuery(format!(
        "unbalanced brackets: {} left open",
        stack.len()
    ))
    .into())
}
