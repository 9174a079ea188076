//! Parses filter documents into [`Expr`] trees.
//!
//! This is the inverse of [`Expr::into_document`](doccol_core::query::Expr::into_document),
//! extended to the shorthand forms callers write by hand: implicit equality
//! (`{ "name": "John" }`), several operators on one field (`{ "age": { "$gt": 1, "$lt": 9 } }`),
//! field-level `$not`, and `$nor`.

use bson::{Bson, Document};

use doccol_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp},
};

/// Parses a whole filter document. An empty document matches everything.
pub(crate) fn parse_filter(filter: &Document) -> DocumentStoreResult<Expr> {
    let clauses = filter
        .iter()
        .map(|(key, value)| parse_clause(key, value))
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    Ok(collapse(clauses))
}

fn parse_clause(key: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match key {
        "$and" => Ok(Expr::And(parse_list(key, value)?)),
        "$or" => Ok(Expr::Or(parse_list(key, value)?)),
        "$nor" => Ok(Expr::Or(parse_list(key, value)?).not()),
        operator if operator.starts_with('$') => Err(unknown_operator(operator)),
        field => parse_field(field, value),
    }
}

fn parse_list(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => return Err(DocumentStoreError::Store(format!(
            "{operator} needs a non-empty array"
        ))),
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(filter) => parse_filter(filter),
            _ => Err(DocumentStoreError::Store(format!(
                "{operator} entries must be documents"
            ))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match value {
        Bson::Document(operators) if is_operator_document(operators) => {
            let clauses = operators
                .iter()
                .map(|(operator, argument)| parse_operator(field, operator, argument))
                .collect::<DocumentStoreResult<Vec<_>>>()?;

            Ok(collapse(clauses))
        },
        _ => Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
    }
}

fn parse_operator(field: &str, operator: &str, argument: &Bson) -> DocumentStoreResult<Expr> {
    match operator {
        "$exists" => Ok(Expr::Exists(field.to_string(), truthy(argument))),
        "$not" => match argument {
            Bson::Document(operators) if is_operator_document(operators) => {
                Ok(parse_field(field, argument)?.not())
            },
            _ => Err(DocumentStoreError::Store("$not needs an operator document".into())),
        },
        _ => match FieldOp::from_operator(operator) {
            Some(op @ (FieldOp::AnyOf | FieldOp::NoneOf)) if !matches!(argument, Bson::Array(_)) => {
                Err(DocumentStoreError::Store(format!("{} needs an array", op.operator())))
            },
            Some(op) => Ok(Expr::field(field.to_string(), op, argument.clone())),
            None => Err(unknown_operator(operator)),
        },
    }
}

/// A document whose first key is an operator is an operator document; otherwise it is a
/// literal value to compare against.
fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn collapse(mut clauses: Vec<Expr>) -> Expr {
    match clauses.len() {
        1 => clauses.remove(0),
        _ => Expr::And(clauses),
    }
}

fn unknown_operator(operator: &str) -> DocumentStoreError {
    DocumentStoreError::Store(format!("unknown operator: {operator}"))
}
