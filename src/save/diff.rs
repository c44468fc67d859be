//! Structural comparison of value trees

use tracing::warn;

use crate::value::{Map, Value};

use super::pack::Sections;

/// Count the differences between two values, logging each one
///
/// `context` names the position of `a`/`b` in their root values; nested
/// positions extend it as `context.key[3]`. Keys present on one side only
/// count one each, and a list length mismatch counts the longer length.
pub fn diff(a: &Value, b: &Value, context: &str) -> usize {
    match (a, b) {
        (Value::Map(a), Value::Map(b)) => diff_maps(a, b, context),
        (Value::List(a), Value::List(b)) => diff_lists(a, b, context),
        _ => diff_scalars(a, b, context),
    }
}

/// Count the differences between two unpacked files
pub fn diff_sections(a: &Sections, b: &Sections) -> usize {
    let mut diffs = extra_keys(a, b, "sections");
    for (name, value) in a {
        if let Some(other) = b.get(name) {
            diffs += diff(value, other, name);
        }
    }
    diffs
}

fn extra_keys(a: &Map, b: &Map, context: &str) -> usize {
    let a_extra: Vec<&str> = a.keys().filter(|k| !b.contains_key(*k)).map(String::as_str).collect();
    let b_extra: Vec<&str> = b.keys().filter(|k| !a.contains_key(*k)).map(String::as_str).collect();
    if !a_extra.is_empty() {
        warn!(context, keys = ?a_extra, "extra keys in a");
    }
    if !b_extra.is_empty() {
        warn!(context, keys = ?b_extra, "extra keys in b");
    }
    a_extra.len() + b_extra.len()
}

fn diff_maps(a: &Map, b: &Map, context: &str) -> usize {
    let mut diffs = extra_keys(a, b, context);
    for (key, value) in a {
        if let Some(other) = b.get(key) {
            diffs += diff(value, other, &format!("{context}.{key}"));
        }
    }
    diffs
}

fn diff_lists(a: &[Value], b: &[Value], context: &str) -> usize {
    if a.len() != b.len() {
        warn!(context, a = a.len(), b = b.len(), "list length mismatch");
        return a.len().max(b.len());
    }
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(i, (a, b))| diff(a, b, &format!("{context}[{i}]")))
        .sum()
}

fn diff_scalars(a: &Value, b: &Value, context: &str) -> usize {
    if a == b {
        return 0;
    }
    warn!(
        context,
        a = ?a,
        a_type = a.type_name(),
        b = ?b,
        b_type = b.type_name(),
        "value mismatch"
    );
    1
}
