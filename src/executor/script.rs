//! Server-side evaluation of `;`-terminated statements
//!
//! Disabled unless `allow_server_eval` is set: the statement runs as arbitrary
//! JavaScript on the server, and servers from 4.2 on no longer provide the
//! `eval` command at all (the call then fails with `CommandNotFound`).

use mongodb::bson::doc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{ExecutionError, Result};
use crate::parser::ScriptCall;

/// Evaluation implementation
impl super::QueryResolver {
    /// Evaluate a script through the server's `eval` command
    ///
    /// The statement is expected to assign its outcome to `result`.
    ///
    /// # Returns
    /// * `Result<Value>` - The command's `retval`, or `null`
    pub(super) async fn evaluate_script(&self, script: &ScriptCall) -> Result<Value> {
        if !self.allow_server_eval {
            return Err(ExecutionError::UnsupportedOperation(
                "server-side script evaluation is disabled (set allow_server_eval)".to_string(),
            )
            .into());
        }

        let database = self.database(script.database.as_deref())?;
        let code = format!("var result=null;{}result;", rewrite_object_ids(&script.script));

        warn!("Evaluating script server-side on '{}'", database.name());
        debug!("eval: {}", code);

        let reply = database.run_command(doc! { "eval": code }).await?;
        Ok(reply
            .get("retval")
            .cloned()
            .map(codec::bson_to_value)
            .unwrap_or(Value::Null))
    }
}

/// Rewrite `{"$oid": "<hex>"}` literals into `ObjectId("<hex>")` calls
///
/// Whitespace around every token is tolerated and the tag is matched
/// case-insensitively; the hex digits are lowercased.
pub fn rewrite_object_ids(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut rest = script;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match match_oid_literal(candidate) {
            Some((len, hex)) => {
                out.push_str(&format!("ObjectId(\"{hex}\")"));
                rest = &candidate[len..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Length of the object-id literal at the start of `input` and its hex value
fn match_oid_literal(input: &str) -> Option<(usize, String)> {
    let rest = input.strip_prefix('{')?.trim_start();
    let rest = rest.strip_prefix('"')?.trim_start();
    let rest = strip_prefix_ignore_case(rest, codec::OID_TAG)?.trim_start();
    let rest = rest.strip_prefix('"')?.trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?.trim_start();

    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let hex = rest[..end].to_ascii_lowercase();

    let rest = rest[end..].trim_start();
    let rest = rest.strip_prefix('"')?.trim_start();
    let rest = rest.strip_prefix('}')?;

    Some((input.len() - rest.len(), hex))
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &input[prefix.len()..])
}
