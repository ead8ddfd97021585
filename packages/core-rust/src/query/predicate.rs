//! Predicate document parsing.
//!
//! A predicate document associates field names with either a literal value
//! (equality) or an operator document (`{"age": {"$gt": 21}}`). The single
//! recognized top-level operator is `$or`, whose disjunct documents are kept
//! raw for [`or_set`](super::or_set) to expand.

use crate::value::{Document, Value};

use super::QueryError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One operator applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Ne(Value),
    Nin(Vec<Value>),
    Regex { pattern: String, options: String },
    All(Vec<Value>),
    ElemMatch(Document),
    Exists(bool),
    Type(i64),
    Mod { divisor: i64, remainder: i64 },
    Near(Vec<Value>),
    Not(Vec<FieldOp>),
}

/// All operators applied to a single field within one conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub ops: Vec<FieldOp>,
}

/// A parsed predicate: per-field operators plus raw `$or` disjuncts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedPredicate {
    pub fields: Vec<FieldPredicate>,
    pub or_clauses: Vec<Document>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a predicate document.
///
/// # Errors
///
/// Returns [`QueryError::BadQuery`] for unknown operators, operator
/// documents mixing `$`- and plain keys, and malformed operator payloads.
pub fn parse_predicate(query: &Document) -> Result<ParsedPredicate, QueryError> {
    let mut parsed = ParsedPredicate::default();

    for (field, value) in query {
        if field == "$or" {
            parsed.or_clauses = parse_or_clauses(value)?;
            continue;
        }
        if field.starts_with('$') {
            return Err(QueryError::BadQuery(format!(
                "unknown top-level operator: {field}"
            )));
        }
        parsed.fields.push(FieldPredicate {
            field: field.clone(),
            ops: parse_field_value(field, value)?,
        });
    }

    Ok(parsed)
}

fn parse_or_clauses(value: &Value) -> Result<Vec<Document>, QueryError> {
    let Value::Array(clauses) = value else {
        return Err(QueryError::BadQuery("$or requires an array".to_string()));
    };
    if clauses.is_empty() {
        return Err(QueryError::BadQuery(
            "$or requires a nonempty array".to_string(),
        ));
    }
    clauses
        .iter()
        .map(|c| match c {
            Value::Map(doc) => Ok(doc.clone()),
            _ => Err(QueryError::BadQuery(
                "$or array elements must be documents".to_string(),
            )),
        })
        .collect()
}

/// Parses the value side of one field: either an operator document or a
/// literal equality.
fn parse_field_value(field: &str, value: &Value) -> Result<Vec<FieldOp>, QueryError> {
    match value {
        Value::Map(m) if m.keys().any(|k| k.starts_with('$')) => {
            if !m.keys().all(|k| k.starts_with('$')) {
                return Err(QueryError::BadQuery(format!(
                    "field {field} mixes operators and plain keys"
                )));
            }
            parse_op_document(field, m)
        }
        other => Ok(vec![FieldOp::Eq(other.clone())]),
    }
}

fn parse_op_document(
    field: &str,
    ops: &std::collections::BTreeMap<String, Value>,
) -> Result<Vec<FieldOp>, QueryError> {
    // $options only modifies a sibling $regex.
    let options = match ops.get("$options") {
        Some(Value::String(s)) => {
            if !ops.contains_key("$regex") {
                return Err(QueryError::BadQuery(format!(
                    "field {field} has $options without $regex"
                )));
            }
            s.clone()
        }
        Some(_) => {
            return Err(QueryError::BadQuery(format!(
                "field {field} has a non-string $options"
            )))
        }
        None => String::new(),
    };

    let mut out = Vec::new();
    for (op, arg) in ops {
        let parsed = match op.as_str() {
            "$options" => continue,
            "$eq" => FieldOp::Eq(arg.clone()),
            "$lt" => FieldOp::Lt(arg.clone()),
            "$lte" => FieldOp::Lte(arg.clone()),
            "$gt" => FieldOp::Gt(arg.clone()),
            "$gte" => FieldOp::Gte(arg.clone()),
            "$ne" => FieldOp::Ne(arg.clone()),
            "$in" => FieldOp::In(require_array(field, op, arg)?),
            "$nin" => FieldOp::Nin(require_array(field, op, arg)?),
            "$all" => FieldOp::All(require_array(field, op, arg)?),
            "$near" => FieldOp::Near(require_array(field, op, arg)?),
            "$regex" => match arg {
                Value::String(pattern) => FieldOp::Regex {
                    pattern: pattern.clone(),
                    options: options.clone(),
                },
                _ => {
                    return Err(QueryError::BadQuery(format!(
                        "field {field} has a non-string $regex"
                    )))
                }
            },
            "$elemMatch" => match arg {
                Value::Map(doc) => FieldOp::ElemMatch(doc.clone()),
                _ => {
                    return Err(QueryError::BadQuery(format!(
                        "field {field} has a non-document $elemMatch"
                    )))
                }
            },
            "$exists" => match arg {
                Value::Bool(b) => FieldOp::Exists(*b),
                Value::Int(i) => FieldOp::Exists(*i != 0),
                _ => {
                    return Err(QueryError::BadQuery(format!(
                        "field {field} has a non-boolean $exists"
                    )))
                }
            },
            "$type" => match arg.as_i64() {
                Some(t) => FieldOp::Type(t),
                None => {
                    return Err(QueryError::BadQuery(format!(
                        "field {field} has a non-numeric $type"
                    )))
                }
            },
            "$mod" => parse_mod(field, arg)?,
            "$not" => match arg {
                Value::Map(inner) if inner.keys().all(|k| k.starts_with('$')) => {
                    FieldOp::Not(parse_op_document(field, inner)?)
                }
                _ => {
                    return Err(QueryError::BadQuery(format!(
                        "field {field} has a $not without an operator document"
                    )))
                }
            },
            other => {
                return Err(QueryError::BadQuery(format!(
                    "unknown operator {other} on field {field}"
                )))
            }
        };
        out.push(parsed);
    }
    Ok(out)
}

fn require_array(field: &str, op: &str, arg: &Value) -> Result<Vec<Value>, QueryError> {
    match arg {
        Value::Array(a) => Ok(a.clone()),
        _ => Err(QueryError::BadQuery(format!(
            "field {field} requires an array for {op}"
        ))),
    }
}

fn parse_mod(field: &str, arg: &Value) -> Result<FieldOp, QueryError> {
    if let Value::Array(a) = arg {
        if let [d, r] = a.as_slice() {
            if let (Some(divisor), Some(remainder)) = (d.as_i64(), r.as_i64()) {
                if divisor != 0 {
                    return Ok(FieldOp::Mod { divisor, remainder });
                }
            }
        }
    }
    Err(QueryError::BadQuery(format!(
        "field {field} requires [divisor, remainder] for $mod"
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
