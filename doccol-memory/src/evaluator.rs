//! Query expression evaluation for in-memory document filtering.
//!
//! Field paths resolve through embedded documents and arrays, and comparisons follow the
//! store's rules: an array field matches when any of its elements does, a missing field
//! equals null, numbers compare across integer and floating point types, and strings
//! compare through the active collation when there is one.

use std::cmp::Ordering;
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use icu_collator::{
    Collator, CollatorBorrowed, CollatorPreferences,
    options::{CollatorOptions, Strength},
};

use doccol_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    index::{Collation, CollationStrength},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// 32 and 64-bit integers share one variant; integers and doubles still compare with
/// each other by numeric value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    /// Key order is significant, as it is for the store.
    Map(Vec<(&'a str, Comparable<'a>)>),
    /// Values with no ordering of their own (binary, regex, ...), compared by equality only.
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>()
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Orders two values of the same kind. Values of different kinds are unordered.
    pub fn compare(&self, other: &Self, collator: Option<&CollatorBorrowed<'_>>) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => Some(a.cmp(b)),
            (Comparable::Double(a), Comparable::Double(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Double(b)) => compare_int_double(*a, *b),
            (Comparable::Double(a), Comparable::Int(b)) => compare_int_double(*b, *a).map(Ordering::reverse),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => Some(match collator {
                Some(collator) => collator.compare(a, b),
                None => a.cmp(b),
            }),
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    match left.compare(right, collator)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            },
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
                    match left_key.cmp(right_key) {
                        Ordering::Equal => {},
                        ordering => return Some(ordering),
                    }
                    match left.compare(right, collator)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            },
            (Comparable::Opaque(a), Comparable::Opaque(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    pub fn equals(&self, other: &Self, collator: Option<&CollatorBorrowed<'_>>) -> bool {
        self.compare(other, collator) == Some(Ordering::Equal)
    }
}

/// Orders an integer against a double without rounding the integer to 53 bits.
fn compare_int_double(int: i64, double: f64) -> Option<Ordering> {
    // 2^63, the first double above every i64.
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    if double.is_nan() {
        return None;
    }
    if double >= I64_BOUND {
        return Some(Ordering::Less);
    }
    if double < -I64_BOUND {
        return Some(Ordering::Greater);
    }

    let whole = double.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(double - whole)),
        ordering => Some(ordering),
    }
}

/// Builds an ICU collator for a collation policy.
///
/// The `en` tailoring is empty in CLDR, so the root collation rules apply.
pub(crate) fn collator_for(collation: &Collation) -> DocumentStoreResult<CollatorBorrowed<'static>> {
    if collation.locale != Collation::CASE_INSENSITIVE_LOCALE {
        return Err(DocumentStoreError::Store(format!(
            "unsupported collation locale {:?}",
            collation.locale
        )));
    }

    let mut options = CollatorOptions::default();
    options.strength = Some(match collation.strength {
        CollationStrength::Primary => Strength::Primary,
        CollationStrength::Secondary => Strength::Secondary,
        CollationStrength::Tertiary => Strength::Tertiary,
    });

    Collator::try_new(CollatorPreferences::default(), options)
        .map_err(|e| DocumentStoreError::Store(format!("collator unavailable: {e}")))
}

/// Resolves a dotted path to every value it reaches.
///
/// Arrays met along the way are traversed: `tags.name` reaches the `name` of every embedded
/// document in `tags`, and a numeric segment addresses an array position.
pub(crate) fn resolve_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let first = match segments.next().and_then(|segment| document.get(segment)) {
        Some(value) => value,
        None => return Vec::new(),
    };

    segments.fold(vec![first], |values, segment| {
        values
            .into_iter()
            .flat_map(|value| step(value, segment))
            .collect()
    })
}

fn step<'a>(value: &'a Bson, segment: &str) -> Vec<&'a Bson> {
    match value {
        Bson::Document(doc) => doc.get(segment).into_iter().collect(),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(position) => items.get(position).into_iter().collect(),
            Err(_) => items
                .iter()
                .filter_map(|item| item.as_document().and_then(|doc| doc.get(segment)))
                .collect(),
        },
        _ => Vec::new(),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    collator: Option<&'a CollatorBorrowed<'static>>,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document, collator: Option<&'a CollatorBorrowed<'static>>) -> Self {
        Self { document, collator }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Equality as the store applies it: a direct match, a match against any array element,
    /// or null against a missing field.
    fn matches_eq(&self, values: &[&Bson], expected: &Bson) -> bool {
        let expected = Comparable::from(expected);

        if values.is_empty() {
            return matches!(expected, Comparable::Null);
        }

        values.iter().any(|value| {
            let value = Comparable::from(*value);

            value.equals(&expected, self.collator)
                || match &value {
                    Comparable::Array(items) => items
                        .iter()
                        .any(|item| item.equals(&expected, self.collator)),
                    _ => false,
                }
        })
    }

    fn matches_range(&self, values: &[&Bson], op: &FieldOp, bound: &Bson) -> bool {
        let bound = Comparable::from(bound);
        let accepts = |ordering: Ordering| match op {
            FieldOp::Gt => ordering == Ordering::Greater,
            FieldOp::Gte => ordering != Ordering::Less,
            FieldOp::Lt => ordering == Ordering::Less,
            FieldOp::Lte => ordering != Ordering::Greater,
            _ => false,
        };

        if values.is_empty() {
            return matches!(bound, Comparable::Null) && matches!(op, FieldOp::Gte | FieldOp::Lte);
        }

        values.iter().any(|value| {
            let value = Comparable::from(*value);
            let direct = value.compare(&bound, self.collator).is_some_and(accepts);

            direct
                || match &value {
                    Comparable::Array(items) => items
                        .iter()
                        .any(|item| item.compare(&bound, self.collator).is_some_and(accepts)),
                    _ => false,
                }
        })
    }

    fn matches_any_of(&self, values: &[&Bson], candidates: &Bson) -> DocumentStoreResult<bool> {
        match candidates {
            Bson::Array(candidates) => Ok(
                candidates
                    .iter()
                    .any(|candidate| self.matches_eq(values, candidate))
            ),
            _ => Err(DocumentStoreError::Store("$in/$nin needs an array".into())),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!resolve_path(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let values = resolve_path(self.document, field);

        match op {
            FieldOp::Eq => Ok(self.matches_eq(&values, value)),
            FieldOp::Ne => Ok(!self.matches_eq(&values, value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => Ok(self.matches_range(&values, op, value)),
            FieldOp::AnyOf => self.matches_any_of(&values, value),
            FieldOp::NoneOf => Ok(!self.matches_any_of(&values, value)?),
        }
    }
}
