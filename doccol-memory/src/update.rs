//! Update operators for in-memory documents.

use bson::{Bson, Document};

use doccol_core::error::{DocumentStoreError, DocumentStoreResult};

/// A parsed update document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
}

/// Parses `{ "$set": {...}, "$unset": {...}, "$inc": {...} }`.
///
/// Replacement documents (no operators) and updates touching `_id` are rejected.
pub(crate) fn parse_update(update: &Document) -> DocumentStoreResult<Vec<UpdateOp>> {
    if update.is_empty() {
        return Err(DocumentStoreError::Store("update document must not be empty".into()));
    }

    let mut ops = Vec::new();

    for (operator, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ if !operator.starts_with('$') => {
                return Err(DocumentStoreError::Store(
                    "update document must only contain update operators".into(),
                ));
            },
            _ => return Err(DocumentStoreError::Store(format!("{operator} needs a document"))),
        };

        for (field, value) in fields {
            if field == "_id" || field.starts_with("_id.") {
                return Err(DocumentStoreError::Store("the _id field is immutable".into()));
            }

            ops.push(match operator.as_str() {
                "$set" => UpdateOp::Set(field.clone(), value.clone()),
                "$unset" => UpdateOp::Unset(field.clone()),
                "$inc" => match value {
                    Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => UpdateOp::Inc(field.clone(), value.clone()),
                    _ => return Err(DocumentStoreError::Store(format!(
                        "$inc on {field:?} needs a numeric amount"
                    ))),
                },
                operator if operator.starts_with('$') => {
                    return Err(DocumentStoreError::Store(format!("unknown update operator: {operator}")));
                },
                _ => return Err(DocumentStoreError::Store(
                    "update document must only contain update operators".into(),
                )),
            });
        }
    }

    Ok(ops)
}

/// Applies the operators to `document` and reports whether anything changed.
///
/// Either every operator applies or the document is left untouched.
pub(crate) fn apply_update(document: &mut Document, ops: &[UpdateOp]) -> DocumentStoreResult<bool> {
    let mut updated = document.clone();

    for op in ops {
        match op {
            UpdateOp::Set(path, value) => {
                let (parent, key) = parent_of(&mut updated, path)?;
                parent.insert(key, value.clone());
            },
            UpdateOp::Unset(path) => {
                unset(&mut updated, path);
            },
            UpdateOp::Inc(path, amount) => {
                let (parent, key) = parent_of(&mut updated, path)?;
                let current = parent.get(key).cloned().unwrap_or(Bson::Int32(0));
                let sum = add(&current, amount).ok_or_else(|| DocumentStoreError::Store(format!(
                    "cannot apply $inc to non-numeric field {path:?}"
                )))?;
                parent.insert(key, sum);
            },
        }
    }

    let changed = updated != *document;
    if changed {
        *document = updated;
    }

    Ok(changed)
}

/// Finds the document holding the last segment of `path`, creating intermediate documents
/// as needed.
fn parent_of<'a, 'p>(document: &'a mut Document, path: &'p str) -> DocumentStoreResult<(&'a mut Document, &'p str)> {
    let (parents, key) = match path.rsplit_once('.') {
        Some((parents, key)) => (Some(parents), key),
        None => (None, path),
    };

    let mut parent = document;
    for segment in parents.into_iter().flat_map(|parents| parents.split('.')) {
        if !parent.contains_key(segment) {
            parent.insert(segment, Document::new());
        }

        parent = match parent.get_mut(segment) {
            Some(Bson::Document(child)) => child,
            _ => return Err(DocumentStoreError::Store(format!(
                "cannot create field {path:?}: {segment:?} is not a document"
            ))),
        };
    }

    Ok((parent, key))
}

fn unset(document: &mut Document, path: &str) {
    match path.split_once('.') {
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset(child, rest);
            }
        },
        None => {
            document.remove(path);
        },
    }
}

/// Adds two numbers, widening to the larger of the two types.
fn add(current: &Bson, amount: &Bson) -> Option<Bson> {
    Some(match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a)? + b),
        _ => return None,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}
