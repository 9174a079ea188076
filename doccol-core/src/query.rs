//! Filter expressions.
//!
//! The client forwards filters to the store as opaque [`bson::Document`]s. This module offers
//! a typed way to build those documents: construct an [`Expr`] with [`Filter`] and compile it
//! with [`Expr::into_document`]. Backends that evaluate filters themselves walk the same
//! [`Expr`] tree through [`QueryVisitor`].
//!
//! ```ignore
//! use doccol::query::Filter;
//!
//! let filter = Filter::eq("city", "Paris")
//!     .and(Filter::gte("age", 18))
//!     .into_document()?;
//!
//! assert_eq!(
//!     filter,
//!     doc! { "$and": [{ "city": { "$eq": "Paris" } }, { "age": { "$gte": 18 } }] },
//! );
//! ```

use bson::{Bson, Document, doc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match, or array membership).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

impl FieldOp {
    /// The store operator this comparison compiles to.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        }
    }

    /// Looks up a comparison by its store operator.
    pub fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "$eq" => Some(FieldOp::Eq),
            "$ne" => Some(FieldOp::Ne),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            "$in" => Some(FieldOp::AnyOf),
            "$nin" => Some(FieldOp::NoneOf),
            _ => None,
        }
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name (or dotted path) to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Compiles this expression into a store-native filter document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Store`] if an `AnyOf`/`NoneOf` value is not an array.
    pub fn into_document(self) -> DocumentStoreResult<Document> {
        FilterDocumentWriter.visit_expr(&self)
    }
}

impl TryFrom<Expr> for Document {
    type Error = DocumentStoreError;

    fn try_from(expr: Expr) -> Result<Self, Self::Error> {
        expr.into_document()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is present (even if null).
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// Walks an [`Expr`] tree.
///
/// Implemented by the document writer below and by backends that evaluate filters in
/// process.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Compiles expressions into the store's filter document syntax.
struct FilterDocumentWriter;

impl QueryVisitor for FilterDocumentWriter {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    // Top-level `$not` is not valid filter syntax; a single-element `$nor` is equivalent.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf) && !matches!(value, Bson::Array(_)) {
            return Err(DocumentStoreError::Store(format!(
                "{} on {field:?} requires an array value",
                op.operator()
            )));
        }

        Ok(doc! {
            field: { op.operator(): value.clone() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparison() {
        let filter = Filter::gt("age", 21).into_document().unwrap();

        assert_eq!(filter, doc! { "age": { "$gt": 21 } });
    }

    #[test]
    fn test_chained_and_flattens() {
        let filter = Filter::eq("city", "Paris")
            .and(Filter::gte("age", 18))
            .and(Filter::exists("name"))
            .into_document()
            .unwrap();

        assert_eq!(
            filter,
            doc! { "$and": [
                { "city": { "$eq": "Paris" } },
                { "age": { "$gte": 18 } },
                { "name": { "$exists": true } },
            ] }
        );
    }

    #[test]
    fn test_not_compiles_to_nor() {
        let filter = Filter::eq("city", "Paris").not().into_document().unwrap();

        assert_eq!(filter, doc! { "$nor": [{ "city": { "$eq": "Paris" } }] });
    }

    #[test]
    fn test_membership_operators() {
        let filter = Filter::or([
            Filter::any_of("city", ["Paris", "London"]),
            Filter::none_of("age", [1, 2]),
        ])
        .into_document()
        .unwrap();

        assert_eq!(
            filter,
            doc! { "$or": [
                { "city": { "$in": ["Paris", "London"] } },
                { "age": { "$nin": [1, 2] } },
            ] }
        );
    }

    #[test]
    fn test_membership_requires_array() {
        let err = Expr::field("city".into(), FieldOp::AnyOf, Bson::from("Paris"))
            .into_document()
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }

    #[test]
    fn test_operator_names_round_trip() {
        for op in [
            FieldOp::Eq, FieldOp::Ne, FieldOp::Gt, FieldOp::Gte,
            FieldOp::Lt, FieldOp::Lte, FieldOp::AnyOf, FieldOp::NoneOf,
        ] {
            assert_eq!(FieldOp::from_operator(op.operator()), Some(op));
        }
        assert_eq!(FieldOp::from_operator("$regex"), None);
    }
}
