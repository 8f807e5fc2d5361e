// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query translation into a backend's native dialect.
//!
//! A translator returns the part of the query the backend can run natively
//! plus whatever must be finished in-process:
//!
//! ```text
//! Query ──► translator ──► native query ──► backend ──► rows
//!                 │                                      │
//!                 └── residual filters / window ─────────┴──► Translated::finish ──► results
//! ```
//!
//! # Document (structured query JSON)
//!
//! Prefix becomes a range (`>= p AND < p + U+F8FF`); substring search has
//! no native form and is always residual. The dialect has no offset, so any
//! offset is reported in `emulated_offset` for cursor-based skipping.

use serde_json::{json, Map, Value};

use super::query::evaluate;
use super::types::{Filter, FilterOp, Query, Record, SortDirection};

/// Native query plus the in-process remainder.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated<N> {
    pub native: N,
    /// Filters the native query could not express
    pub residual: Vec<Filter>,
    /// Sort/offset/limit must be applied in-process; the native query is unbounded
    pub window_in_process: bool,
    /// Offset the caller must skip by advancing a cursor
    pub emulated_offset: Option<usize>,
}

impl<N> Translated<N> {
    /// Apply the in-process remainder to the native results.
    pub fn finish(&self, rows: Vec<Record>, query: &Query) -> Vec<Record> {
        if !self.window_in_process && self.residual.is_empty() {
            return rows;
        }
        let remainder = Query {
            collection: query.collection.clone(),
            filters: self.residual.clone(),
            sort: query.sort.clone(),
            limit: if self.window_in_process { query.limit } else { None },
            offset: if self.window_in_process { query.offset } else { None },
        };
        evaluate(rows, &remainder)
    }
}

/// Translator into a structured-query JSON body.
pub struct DocumentTranslator;

impl DocumentTranslator {
    pub fn translate(query: &Query) -> Translated<Value> {
        let mut filters = Vec::new();
        let mut residual = Vec::new();
        let mut negations = 0usize;

        for filter in &query.filters {
            // The dialect allows a single not-equal / not-in per query
            let negation = matches!(filter.op, FilterOp::Ne | FilterOp::NotIn);
            if negation && negations > 0 {
                residual.push(filter.clone());
                continue;
            }
            match Self::translate_filter(filter) {
                Some(mut native) => {
                    negations += usize::from(negation);
                    filters.append(&mut native);
                }
                None => residual.push(filter.clone()),
            }
        }

        let mut body = Map::new();
        body.insert("from".into(), json!([{ "collectionId": query.collection }]));

        match filters.len() {
            0 => {}
            1 => {
                body.insert("where".into(), filters.remove(0));
            }
            _ => {
                body.insert(
                    "where".into(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if !query.sort.is_empty() {
            let order: Vec<Value> = query
                .sort
                .iter()
                .map(|s| {
                    let path = if s.field == "id" { "__name__" } else { s.field.as_str() };
                    json!({
                        "field": { "fieldPath": path },
                        "direction": match s.direction {
                            SortDirection::Asc => "ASCENDING",
                            SortDirection::Desc => "DESCENDING",
                        }
                    })
                })
                .collect();
            body.insert("orderBy".into(), Value::Array(order));
        }

        let window_in_process = !residual.is_empty();
        let mut emulated_offset = None;
        if !window_in_process {
            if let Some(limit) = query.limit {
                body.insert("limit".into(), json!(limit));
            }
            emulated_offset = query.offset.filter(|o| *o > 0);
        }

        Translated {
            native: Value::Object(body),
            residual,
            window_in_process,
            emulated_offset,
        }
    }

    fn field_filter(path: &str, op: &str, value: &Value) -> Value {
        json!({
            "fieldFilter": {
                "field": { "fieldPath": path },
                "op": op,
                "value": encode_value(value),
            }
        })
    }

    fn translate_filter(filter: &Filter) -> Option<Vec<Value>> {
        let path = if filter.field == "id" { "__name__" } else { filter.field.as_str() };

        let op = match (filter.op, &filter.value) {
            (FilterOp::Eq, _) => "EQUAL",
            (FilterOp::Ne, _) => "NOT_EQUAL",
            (FilterOp::Lt, _) => "LESS_THAN",
            (FilterOp::Lte, _) => "LESS_THAN_OR_EQUAL",
            (FilterOp::Gt, _) => "GREATER_THAN",
            (FilterOp::Gte, _) => "GREATER_THAN_OR_EQUAL",
            (FilterOp::In, Value::Array(_)) => "IN",
            (FilterOp::NotIn, Value::Array(_)) => "NOT_IN",
            (FilterOp::Contains, Value::String(_)) => return None,
            (FilterOp::Contains, _) => "ARRAY_CONTAINS",
            (FilterOp::Prefix, Value::String(prefix)) => {
                let upper = format!("{}\u{f8ff}", prefix);
                return Some(vec![
                    Self::field_filter(path, "GREATER_THAN_OR_EQUAL", &filter.value),
                    Self::field_filter(path, "LESS_THAN", &Value::String(upper)),
                ]);
            }
            _ => return None,
        };

        Some(vec![Self::field_filter(path, op, &filter.value)])
    }
}

/// Encode a JSON value in the typed document wire format.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}
