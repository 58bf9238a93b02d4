// src/store/filter.rs
// Filter DSL -> SQL predicate translation.
//
// A filter is a JSON object mapping field name to either a scalar (implicit
// `$eq`) or an operator object (`{"$in": [...]}` etc.). This mirrors the
// shape produced by the self-query parser, so the two components share one
// representation without an intermediate conversion step.

use serde_json::Value;
use tracing::warn;

pub type Filter = serde_json::Map<String, Value>;

const KNOWN_OPERATORS: &[&str] = &["$eq", "$in", "$nin", "$ne", "$gt", "$gte", "$lt", "$lte", "$contains"];

/// Translate a filter map into a SQL `WHERE`-clause body (without the
/// leading `WHERE`). An empty filter translates to `1=1`.
pub fn filter_to_sql(filter: &Filter) -> String {
    let mut clauses = Vec::new();
    for (field, value) in filter {
        if let Some(clause) = field_clause(field, value) {
            clauses.push(clause);
        }
    }
    if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    }
}

fn field_clause(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Object(ops) => {
            let mut sub_clauses = Vec::new();
            for (op, operand) in ops {
                match operator_clause(field, op, operand) {
                    Some(clause) => sub_clauses.push(clause),
                    None => warn!("ignoring unknown filter operator '{op}' for field '{field}'"),
                }
            }
            if sub_clauses.is_empty() {
                None
            } else {
                Some(sub_clauses.join(" AND "))
            }
        }
        Value::Array(_) => None,
        scalar => Some(format!("{field} = {}", scalar_to_sql(scalar))),
    }
}

fn operator_clause(field: &str, op: &str, operand: &Value) -> Option<String> {
    if !KNOWN_OPERATORS.contains(&op) {
        return None;
    }
    match op {
        "$eq" => Some(format!("{field} = {}", scalar_to_sql(operand))),
        "$ne" => Some(format!("{field} != {}", scalar_to_sql(operand))),
        "$gt" => Some(format!("{field} > {}", scalar_to_sql(operand))),
        "$gte" => Some(format!("{field} >= {}", scalar_to_sql(operand))),
        "$lt" => Some(format!("{field} < {}", scalar_to_sql(operand))),
        "$lte" => Some(format!("{field} <= {}", scalar_to_sql(operand))),
        "$in" => Some(format!("{field} IN {}", in_list_to_sql(operand))),
        "$nin" => Some(format!("{field} NOT IN {}", in_list_to_sql(operand))),
        "$contains" => Some(format!("{field} LIKE {}", contains_pattern(operand))),
        _ => None,
    }
}

fn scalar_to_sql(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", escape_sql_string(s)),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Null => "NULL".to_string(),
        other => format!("'{}'", escape_sql_string(&other.to_string())),
    }
}

/// Build a `(v1, v2, ...)` tuple. A single-element list emits `(v)`, not the
/// Python-tuple-literal gotcha `(v,)`; an empty list emits `()`.
fn in_list_to_sql(operand: &Value) -> String {
    let items = operand.as_array().cloned().unwrap_or_else(|| vec![operand.clone()]);
    let rendered: Vec<String> = items.iter().map(scalar_to_sql).collect();
    format!("({})", rendered.join(", "))
}

fn contains_pattern(operand: &Value) -> String {
    let text = match operand {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("'%\"{}\"%'", escape_sql_string(&text))
}

fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}
