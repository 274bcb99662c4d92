//! Chained modifier calls after the primary operation
//!
//! Handles tails such as `.limit(10).skip(5)`. Only `limit` and `skip` have an
//! effect; they are applied limit-then-skip no matter how they are written.

use tracing::warn;

use crate::error::{ParseError, Result};

use super::scanner::matching_close;

/// One `.name(argument)` segment of a modifier tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCall {
    pub name: String,
    pub argument: String,
}

/// Cursor modifiers extracted from a tail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

/// Split a modifier tail into its chained calls
pub fn split_chain(tail: &str) -> Result<Vec<ChainCall>> {
    let mut calls = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &tail[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        if !trimmed.starts_with('.') {
            return Err(ParseError::MalformedQuery(format!(
                "expected '.' before chained call, found '{trimmed}'"
            ))
            .into());
        }
        pos += 1;

        let open = tail[pos..].find('(').map(|i| pos + i).ok_or_else(|| {
            ParseError::MalformedQuery(format!("chained call '{}' has no '('", &tail[pos..]))
        })?;
        let name = tail[pos..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            return Err(
                ParseError::MalformedQuery(format!("invalid chained call name '{name}'")).into(),
            );
        }

        let close = matching_close(tail, open)?;
        calls.push(ChainCall {
            name: name.to_string(),
            argument: tail[open + 1..close].trim().to_string(),
        });
        pos = close + 1;
    }

    Ok(calls)
}

impl Modifiers {
    /// Extract `limit` and `skip` from a modifier tail
    ///
    /// The first occurrence of each wins. Other chained calls are ignored.
    pub fn from_tail(tail: &str) -> Result<Self> {
        let mut modifiers = Modifiers::default();

        for call in split_chain(tail)? {
            match call.name.to_ascii_lowercase().as_str() {
                "limit" if modifiers.limit.is_none() => {
                    modifiers.limit = Some(parse_number(&call)?);
                }
                "skip" if modifiers.skip.is_none() => {
                    modifiers.skip = Some(parse_number(&call)?);
                }
                "limit" | "skip" => {}
                _ => warn!("Ignoring unsupported chained call '{}'", call.name),
            }
        }

        Ok(modifiers)
    }

    /// True when neither modifier is present
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.skip.is_none()
    }
}

fn parse_number<T: std::str::FromStr>(call: &ChainCall) -> Result<T> {
    call.argument.parse::<T>().map_err(|_| {
        ParseError::MalformedQuery(format!(
            "{}() expects a number, got '{}'",
            call.name, call.argument
        ))
        .into()
    })
}
