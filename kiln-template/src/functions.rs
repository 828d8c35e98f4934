//! Function library
//!
//! Filters and functions added on top of the minijinja builtins: string
//! helpers, dates, base64 and identifiers. Every helper that can grow its
//! output checks it against [`MAX_OUTPUT_BYTES`](crate::MAX_OUTPUT_BYTES).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::format::{Item, StrftimeItems};
use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind};
use std::fmt::Write;

use crate::MAX_OUTPUT_BYTES;

/// Adds the kiln filters and functions to `env`.
pub fn register(env: &mut Environment<'_>) {
    // strings
    env.add_filter("trim_prefix", trim_prefix);
    env.add_filter("trim_suffix", trim_suffix);
    env.add_filter("nospace", nospace);
    env.add_filter("quote", quote);
    env.add_filter("squote", squote);
    env.add_filter("repeat", repeat);
    env.add_filter("trunc", trunc);

    // dates
    env.add_function("now", now);
    env.add_filter("date", date);

    // encoding
    env.add_filter("b64enc", b64enc);
    env.add_filter("b64dec", b64dec);

    // defaults and identifiers
    env.add_function("coalesce", coalesce);
    env.add_function("uuidv4", uuidv4);
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn trim_prefix(value: &str, prefix: &str) -> String {
    value.strip_prefix(prefix).unwrap_or(value).to_string()
}

fn trim_suffix(value: &str, suffix: &str) -> String {
    value.strip_suffix(suffix).unwrap_or(value).to_string()
}

fn nospace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn quote(value: &str) -> String {
    format!("{:?}", value)
}

fn squote(value: &str) -> String {
    format!("'{}'", value)
}

fn repeat(value: &str, count: i64) -> Result<String, Error> {
    let count = usize::try_from(count).map_err(|_| invalid("negative repeat count"))?;
    match value.len().checked_mul(count) {
        Some(len) if len <= MAX_OUTPUT_BYTES => Ok(value.repeat(count)),
        _ => Err(invalid(format!(
            "repeat would exceed {} bytes",
            MAX_OUTPUT_BYTES
        ))),
    }
}

/// Keeps the first `n` characters, or the last `-n` when `n` is negative.
fn trunc(value: &str, n: i64) -> String {
    let chars: Vec<char> = value.chars().collect();
    let keep = usize::try_from(n.unsigned_abs())
        .unwrap_or(usize::MAX)
        .min(chars.len());
    if n >= 0 {
        chars[..keep].iter().collect()
    } else {
        chars[chars.len() - keep..].iter().collect()
    }
}

/// Current time in Unix seconds
fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Formats Unix seconds with a strftime pattern, in UTC.
fn date(seconds: i64, pattern: &str) -> Result<String, Error> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(invalid(format!("invalid date format {:?}", pattern)));
    }
    let time = chrono::DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| invalid(format!("timestamp {} out of range", seconds)))?;

    let mut out = String::new();
    write!(out, "{}", time.format_with_items(items.into_iter()))
        .map_err(|_| invalid(format!("cannot format date with {:?}", pattern)))?;
    Ok(out)
}

fn b64enc(value: &str) -> String {
    STANDARD.encode(value)
}

fn b64dec(value: &str) -> Result<String, Error> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| invalid(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| invalid("decoded value is not UTF-8"))
}

/// First argument that is defined and not empty
fn coalesce(values: Rest<Value>) -> Value {
    values
        .iter()
        .find(|v| !v.is_undefined() && !v.is_none() && v.is_true())
        .cloned()
        .unwrap_or_else(|| Value::from(""))
}

fn uuidv4() -> String {
    uuid::Uuid::new_v4().to_string()
}
