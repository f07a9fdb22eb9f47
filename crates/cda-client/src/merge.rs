//! Merging of split pagination results back into their original shape.

use serde_json::{Map, Value};

use crate::pagination::SPLIT_ALIAS_PREFIX;

/// Collapse every `splitted_<skip>_<name>` key of a response tree back into
/// a single concatenated array under `<name>`.
///
/// The merge is applied post-order over the whole tree; arrays keep their
/// order, scalars pass through unchanged. Chunks are appended in encounter
/// order, which matches the ascending-skip order the query rewrite emits.
///
/// Format constraint: the alias is decoded as prefix, numeric skip, then the
/// real field name rejoined from all remaining segments (the name itself may
/// contain underscores).
#[must_use]
pub fn merge_split_results(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(merge_split_results).collect())
        }
        Value::Object(entries) => {
            let mut merged = Map::new();
            for (key, value) in entries {
                match split_alias_field_name(&key) {
                    Some(name) => append_chunk(&mut merged, name, value),
                    None => {
                        merged.insert(key, merge_split_results(value));
                    }
                }
            }
            Value::Object(merged)
        }
        scalar => scalar,
    }
}

/// Decode the real field name out of a split alias, or `None` if the key is
/// not one.
fn split_alias_field_name(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(SPLIT_ALIAS_PREFIX)?;
    let (skip, name) = rest.split_once('_')?;
    if skip.is_empty() || !skip.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

fn append_chunk(merged: &mut Map<String, Value>, name: &str, value: Value) {
    let slot = merged
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    match (slot, value) {
        (Value::Array(accumulated), Value::Array(chunk)) => {
            accumulated.extend(chunk.into_iter().map(merge_split_results));
        }
        // A split alias over a non-array value has no chunks to concatenate.
        (slot, value) => *slot = merge_split_results(value),
    }
}
