//! Props sanitation.
//!
//! Two passes exist and each runs exactly once per request:
//!
//! - [`stringify_unsafe_integers`] at the dispatcher, so integers a
//!   JavaScript-side consumer could not represent exactly (Discord
//!   snowflakes) travel as strings.
//! - [`coerce_fields`] at the worker, where the component's declared numeric
//!   fields are known. Only those paths are touched; a numeric-looking string
//!   anywhere else stays a string.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};

/// Largest integer an IEEE-754 double represents exactly.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

static NUMERIC_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("static regex"));

/// Parse a plain base-10 number string.
///
/// Integers that do not fit an `i64` are left alone rather than rounded.
pub fn parse_numeric_string(s: &str) -> Option<Number> {
    if !NUMERIC_STRING.is_match(s) {
        return None;
    }
    if s.contains('.') {
        s.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        s.parse::<i64>().ok().map(Number::from)
    }
}

/// Coerce numeric-looking strings at the given field paths.
///
/// A path is a dot-separated list of object keys; a key suffixed with `[]`
/// walks every element of the array stored under it, e.g. `amount` or
/// `entries[].score`. Missing keys are skipped. Returns how many values
/// were converted.
pub fn coerce_fields(props: &mut Value, paths: &[&str]) -> usize {
    paths
        .iter()
        .map(|path| {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            coerce_path(props, &segments)
        })
        .sum()
}

fn coerce_path(value: &mut Value, segments: &[&str]) -> usize {
    let Some((head, rest)) = segments.split_first() else {
        return coerce_leaf(value);
    };

    let (key, each) = match head.strip_suffix("[]") {
        Some(key) => (key, true),
        None => (*head, false),
    };

    let Some(child) = value.as_object_mut().and_then(|map| map.get_mut(key)) else {
        return 0;
    };

    if each {
        match child.as_array_mut() {
            Some(items) => items.iter_mut().map(|item| coerce_path(item, rest)).sum(),
            None => 0,
        }
    } else {
        coerce_path(child, rest)
    }
}

fn coerce_leaf(value: &mut Value) -> usize {
    let number = match value {
        Value::String(s) => parse_numeric_string(s),
        _ => None,
    };
    match number {
        Some(n) => {
            *value = Value::Number(n);
            1
        }
        None => 0,
    }
}

/// Replace integers outside `±MAX_SAFE_INTEGER` with their decimal string.
pub fn stringify_unsafe_integers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            let unsafe_int = if let Some(i) = n.as_i64() {
                !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i)
            } else if let Some(u) = n.as_u64() {
                u > MAX_SAFE_INTEGER as u64
            } else {
                false
            };
            if unsafe_int {
                *value = Value::String(n.to_string());
            }
        }
        Value::Array(items) => items.iter_mut().for_each(stringify_unsafe_integers),
        Value::Object(map) => map.values_mut().for_each(stringify_unsafe_integers),
        _ => {}
    }
}
