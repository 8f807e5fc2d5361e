// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process query evaluation.
//!
//! Used by the local backend directly, and by remote backends for the part of
//! a query their native dialect cannot express (see [`super::translate`]).
//!
//! A record whose data lacks the filtered field never matches that filter,
//! whatever the operator. Values of different JSON types never compare as
//! ordered, so `Lt`/`Gt` across types is false.

use serde_json::Value;
use std::cmp::Ordering;

use super::types::{Filter, FilterOp, Query, Record, Sort, SortDirection};

/// Resolve a dot-separated path (`"profile.address.city"`) inside `data`.
pub fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Field lookup on a record; `id` falls back to the record id.
fn record_field<'a>(record: &'a Record, path: &str, id: &'a Value) -> Option<&'a Value> {
    field_value(&record.data, path).or(if path == "id" { Some(id) } else { None })
}

/// Ordering for two JSON values of the same scalar type.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Does `value` (the field) satisfy `op` against `operand`?
pub fn satisfies(value: &Value, op: FilterOp, operand: &Value) -> bool {
    match op {
        FilterOp::Eq => values_equal(value, operand),
        FilterOp::Ne => !values_equal(value, operand),
        FilterOp::Lt => compare_values(value, operand) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare_values(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare_values(value, operand) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare_values(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => operand
            .as_array()
            .is_some_and(|options| options.iter().any(|o| values_equal(value, o))),
        FilterOp::NotIn => operand
            .as_array()
            .is_some_and(|options| !options.iter().any(|o| values_equal(value, o))),
        FilterOp::Contains => match (value, operand) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), element) => items.iter().any(|i| values_equal(i, element)),
            _ => false,
        },
        FilterOp::Prefix => match (value, operand) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
    }
}

/// True when `record` passes every filter.
pub fn matches(record: &Record, filters: &[Filter]) -> bool {
    let id = Value::String(record.id.clone());
    filters.iter().all(|f| {
        record_field(record, &f.field, &id).is_some_and(|v| satisfies(v, f.op, &f.value))
    })
}

/// Rank used to order values of different types: missing < null < bool < number < string < other.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(_) => 5,
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Stable multi-key sort; ties fall back to record id.
pub fn sort_records(records: &mut [Record], sort: &[Sort]) {
    records.sort_by(|a, b| {
        let a_id = Value::String(a.id.clone());
        let b_id = Value::String(b.id.clone());
        for key in sort {
            let ordering = compare_fields(
                record_field(a, &key.field, &a_id),
                record_field(b, &key.field, &b_id),
            );
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    });
}

/// Apply `offset` then `limit`.
pub fn window<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Full evaluation: filter, sort, offset, limit.
pub fn evaluate(records: impl IntoIterator<Item = Record>, query: &Query) -> Vec<Record> {
    let mut selected: Vec<Record> = records
        .into_iter()
        .filter(|r| matches(r, &query.filters))
        .collect();
    sort_records(&mut selected, &query.sort);
    window(selected, query.offset, query.limit)
}
