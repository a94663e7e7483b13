//! The typed query model and its wire dialect.
//!
//! Callers speak a uniform document dialect: `{field: value}` for equality,
//! `{field: {$op: value}}` for comparisons, and top-level `$and` / `$or`
//! lists. Internally queries are a tagged union; adapters pattern-match on it
//! to emit their native language, and [`Query::matches`] evaluates it against
//! plain documents (used by the in-memory adapter and the engine's in-process
//! security filtering).

use serde_json::{Map, Value};

use omnistore_model::entity::Document;
use omnistore_core::{StorageError, StorageResult};

/// A storage-neutral query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every record.
    All,
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Regex(String, String),
    And(Vec<Query>),
    Or(Vec<Query>),
}

impl Query {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq(field.into(), value.into())
    }

    pub fn and(parts: Vec<Query>) -> Self {
        Query::And(parts)
    }

    pub fn or(parts: Vec<Query>) -> Self {
        Query::Or(parts)
    }

    /// Parse the wire dialect.
    pub fn from_document(doc: &Document) -> StorageResult<Self> {
        let mut parts = Vec::with_capacity(doc.len());
        for (key, value) in doc {
            match key.as_str() {
                "$and" => parts.push(Query::And(parse_branch_list(key, value)?)),
                "$or" => parts.push(Query::Or(parse_branch_list(key, value)?)),
                field => parts.push(parse_field(field, value)?),
            }
        }
        Ok(match parts.len() {
            0 => Query::All,
            1 => parts.remove(0),
            _ => Query::And(parts),
        })
    }

    /// Serialize back to the wire dialect.
    pub fn to_document(&self) -> Document {
        let mut doc = Map::new();
        match self {
            Query::All => {}
            Query::Eq(f, v) => {
                doc.insert(f.clone(), v.clone());
            }
            Query::Ne(f, v) => {
                doc.insert(f.clone(), op_object("$ne", v.clone()));
            }
            Query::Gt(f, v) => {
                doc.insert(f.clone(), op_object("$gt", v.clone()));
            }
            Query::Gte(f, v) => {
                doc.insert(f.clone(), op_object("$gte", v.clone()));
            }
            Query::Lt(f, v) => {
                doc.insert(f.clone(), op_object("$lt", v.clone()));
            }
            Query::Lte(f, v) => {
                doc.insert(f.clone(), op_object("$lte", v.clone()));
            }
            Query::In(f, vs) => {
                doc.insert(f.clone(), op_object("$in", Value::Array(vs.clone())));
            }
            Query::Regex(f, pattern) => {
                doc.insert(
                    f.clone(),
                    op_object("$regex", Value::String(pattern.clone())),
                );
            }
            Query::And(parts) => {
                doc.insert("$and".into(), branch_array(parts));
            }
            Query::Or(parts) => {
                doc.insert("$or".into(), branch_array(parts));
            }
        }
        doc
    }

    /// Evaluate the query against a document.
    ///
    /// Field paths may be dotted; path segments crossing arrays match when
    /// any element matches (so `acl.principal_id` works against an ACL list).
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::All => true,
            Query::Eq(f, v) => candidates(doc, f).iter().any(|c| values_equal(c, v)),
            Query::Ne(f, v) => !candidates(doc, f).iter().any(|c| values_equal(c, v)),
            Query::Gt(f, v) => cmp_any(doc, f, v, |o| o == std::cmp::Ordering::Greater),
            Query::Gte(f, v) => cmp_any(doc, f, v, |o| o != std::cmp::Ordering::Less),
            Query::Lt(f, v) => cmp_any(doc, f, v, |o| o == std::cmp::Ordering::Less),
            Query::Lte(f, v) => cmp_any(doc, f, v, |o| o != std::cmp::Ordering::Greater),
            Query::In(f, vs) => candidates(doc, f)
                .iter()
                .any(|c| vs.iter().any(|v| values_equal(c, v))),
            Query::Regex(f, pattern) => match regex::Regex::new(pattern) {
                Ok(re) => candidates(doc, f)
                    .iter()
                    .any(|c| c.as_str().is_some_and(|s| re.is_match(s))),
                Err(_) => false,
            },
            Query::And(parts) => parts.iter().all(|q| q.matches(doc)),
            Query::Or(parts) => parts.iter().any(|q| q.matches(doc)),
        }
    }
}

fn op_object(op: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(op.into(), value);
    Value::Object(obj)
}

fn branch_array(parts: &[Query]) -> Value {
    Value::Array(parts.iter().map(|q| Value::Object(q.to_document())).collect())
}

fn parse_branch_list(key: &str, value: &Value) -> StorageResult<Vec<Query>> {
    let Value::Array(items) = value else {
        return Err(StorageError::Query(format!("{key} expects a list")));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => Query::from_document(obj),
            _ => Err(StorageError::Query(format!("{key} entries must be objects"))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Value) -> StorageResult<Query> {
    let Value::Object(ops) = value else {
        return Ok(Query::Eq(field.to_string(), value.clone()));
    };
    // An object without operator keys is a literal equality match.
    if !ops.keys().any(|k| k.starts_with('$')) {
        return Ok(Query::Eq(field.to_string(), value.clone()));
    }

    let mut parts = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let field = field.to_string();
        parts.push(match op.as_str() {
            "$eq" => Query::Eq(field, operand.clone()),
            "$ne" => Query::Ne(field, operand.clone()),
            "$gt" => Query::Gt(field, operand.clone()),
            "$gte" => Query::Gte(field, operand.clone()),
            "$lt" => Query::Lt(field, operand.clone()),
            "$lte" => Query::Lte(field, operand.clone()),
            "$in" => match operand {
                Value::Array(items) => Query::In(field, items.clone()),
                _ => return Err(StorageError::Query("$in expects a list".into())),
            },
            "$regex" => match operand {
                Value::String(pattern) => Query::Regex(field, pattern.clone()),
                _ => return Err(StorageError::Query("$regex expects a string".into())),
            },
            other => {
                return Err(StorageError::Query(format!("unknown operator: {other}")));
            }
        });
    }
    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        Query::And(parts)
    })
}

/// Resolve a (possibly dotted) path to all candidate leaf values.
fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = match doc.get(path) {
        // Fast path: the literal key exists (dots allowed in keys).
        Some(v) => return flatten(v),
        None => Vec::new(),
    };
    let mut segments = path.split('.');
    if let Some(first) = segments.next() {
        if let Some(v) = doc.get(first) {
            current = vec![v];
        }
    }
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(obj) => {
                    if let Some(v) = obj.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(obj) = item {
                            if let Some(v) = obj.get(segment) {
                                next.push(v);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current.into_iter().flat_map(flatten).collect()
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn cmp_any(doc: &Document, field: &str, v: &Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    candidates(doc, field)
        .iter()
        .any(|c| compare_values(c, v).is_some_and(&pred))
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}
