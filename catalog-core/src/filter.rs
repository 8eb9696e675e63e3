//! Filter construction for selecting records.
//!
//! A [`Filter`] is a conjunction of [`Predicate`]s, each pairing a field path with a
//! [`Condition`]. An empty filter matches every record in the collection.
//!
//! # Example
//!
//! ```ignore
//! use catalog::filter::Filter;
//!
//! // { author: "J.K. Rowling" }
//! let by_author = Filter::eq("author", "J.K. Rowling");
//!
//! // { publishedYear: { greaterThan: 2000 }, genre: "Fantasy" }
//! let recent_fantasy = Filter::gt("publishedYear", 2000).and_eq("genre", "Fantasy");
//! ```
//!
//! Field names may be dotted paths (`products.productId`) reaching into embedded
//! documents and arrays of documents.

use bson::{Bson, Document, doc};

use crate::error::{StoreError, StoreResult};

/// Match condition applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal to the value. Matches arrays containing the value, and `Null` matches missing fields.
    Eq(Bson),
    /// Not equal to the value. Matches records where the field is missing.
    Ne(Bson),
    /// Strictly greater than the value.
    GreaterThan(Bson),
    /// Greater than or equal to the value.
    GreaterThanOrEqual(Bson),
    /// Strictly less than the value.
    LessThan(Bson),
    /// Less than or equal to the value.
    LessThanOrEqual(Bson),
    /// Equal to any of the values.
    AnyOf(Vec<Bson>),
    /// The field is present (`true`) or absent (`false`).
    Exists(bool),
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

/// A conjunction of predicates selecting records from a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Creates a filter that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter from a single predicate.
    pub fn field(field: impl Into<String>, condition: Condition) -> Self {
        Self::all().and(field, condition)
    }

    /// Matches records where `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::Eq(value.into()))
    }

    /// Matches records where `field` does not equal `value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::Ne(value.into()))
    }

    /// Matches records where `field` is strictly greater than `value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::GreaterThan(value.into()))
    }

    /// Matches records where `field` is greater than or equal to `value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::GreaterThanOrEqual(value.into()))
    }

    /// Matches records where `field` is strictly less than `value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::LessThan(value.into()))
    }

    /// Matches records where `field` is less than or equal to `value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, Condition::LessThanOrEqual(value.into()))
    }

    /// Matches records where `field` equals any of `values`.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::field(field, Condition::AnyOf(values.into_iter().map(Into::into).collect()))
    }

    /// Matches records where `field` is present.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::field(field, Condition::Exists(true))
    }

    /// Matches records where `field` is absent.
    pub fn not_exists(field: impl Into<String>) -> Self {
        Self::field(field, Condition::Exists(false))
    }

    /// Adds a predicate to this filter.
    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.predicates.push(Predicate { field: field.into(), condition });
        self
    }

    /// Adds an equality predicate to this filter.
    pub fn and_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.and(field, Condition::Eq(value.into()))
    }

    /// Merges the predicates of another filter into this one.
    pub fn merge(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns `true` if this filter matches every record.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Checks that every predicate names a usable field path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for empty paths, empty path segments, or
    /// segments starting with `$`.
    pub fn validate(&self) -> StoreResult<()> {
        for predicate in &self.predicates {
            validate_path(&predicate.field)?;
        }

        Ok(())
    }

    /// Renders this filter as a store query document.
    ///
    /// Predicates on distinct fields share one document; a field named twice puts
    /// every predicate under `$and`.
    pub fn to_document(&self) -> Document {
        match QueryDocument.visit_filter(self) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }
}

/// Checks that `path` is a dotted field path the stores can address.
pub(crate) fn validate_path(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::Validation("field path must not be empty".into()));
    }

    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(StoreError::Validation(format!(
                "field path `{path}` contains an empty segment"
            )));
        }
        if segment.starts_with('$') {
            return Err(StoreError::Validation(format!(
                "field path `{path}` must not start a segment with `$`"
            )));
        }
    }

    Ok(())
}

/// Visitor over a filter's predicates, implemented by each backend to evaluate
/// or translate filters.
pub trait FilterVisitor {
    type Output;
    type Error;

    /// Visits the conjunction of `outputs`, one per predicate, in filter order.
    fn visit_all(&mut self, outputs: Vec<Self::Output>) -> Result<Self::Output, Self::Error>;

    fn visit_predicate(
        &mut self,
        field: &str,
        condition: &Condition,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, filter: &Filter) -> Result<Self::Output, Self::Error> {
        let outputs = filter
            .predicates()
            .iter()
            .map(|predicate| self.visit_predicate(&predicate.field, &predicate.condition))
            .collect::<Result<Vec<_>, _>>()?;

        self.visit_all(outputs)
    }
}

/// Renders filters as store query documents (`{ field: { $op: value } }`).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryDocument;

impl FilterVisitor for QueryDocument {
    type Output = Document;
    type Error = std::convert::Infallible;

    fn visit_all(&mut self, outputs: Vec<Document>) -> Result<Document, Self::Error> {
        let mut merged = Document::new();
        let mut repeated = false;

        for (field, condition) in outputs.iter().flatten() {
            if merged.contains_key(field) {
                repeated = true;
                break;
            }
            merged.insert(field.clone(), condition.clone());
        }

        if repeated {
            return Ok(doc! { "$and": outputs });
        }

        Ok(merged)
    }

    fn visit_predicate(&mut self, field: &str, condition: &Condition) -> Result<Document, Self::Error> {
        let condition = match condition {
            Condition::Eq(value) => doc! { "$eq": value.clone() },
            Condition::Ne(value) => doc! { "$ne": value.clone() },
            Condition::GreaterThan(value) => doc! { "$gt": value.clone() },
            Condition::GreaterThanOrEqual(value) => doc! { "$gte": value.clone() },
            Condition::LessThan(value) => doc! { "$lt": value.clone() },
            Condition::LessThanOrEqual(value) => doc! { "$lte": value.clone() },
            Condition::AnyOf(values) => doc! { "$in": values.clone() },
            Condition::Exists(present) => doc! { "$exists": *present },
        };

        Ok(doc! { field: condition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_accumulate_predicates_in_order() {
        let filter = Filter::gt("publishedYear", 1950).and_eq("genre", "Fiction");

        assert_eq!(
            filter.predicates(),
            &[
                Predicate { field: "publishedYear".into(), condition: Condition::GreaterThan(Bson::Int32(1950)) },
                Predicate { field: "genre".into(), condition: Condition::Eq(Bson::String("Fiction".into())) },
            ]
        );
        assert!(!filter.is_empty());
        assert!(Filter::all().is_empty());
    }

    #[test]
    fn renders_query_document_for_diagnostics() {
        let filter = Filter::eq("author", "Harper Lee").merge(Filter::any_of("genre", ["Fiction", "Fantasy"]));

        assert_eq!(
            filter.to_document(),
            doc! {
                "author": { "$eq": "Harper Lee" },
                "genre": { "$in": ["Fiction", "Fantasy"] },
            }
        );
    }

    #[test]
    fn repeated_fields_render_under_and() {
        let filter = Filter::gt("publishedYear", 1940).and("publishedYear", Condition::LessThan(1960.into()));

        assert_eq!(
            filter.to_document(),
            doc! {
                "$and": [
                    { "publishedYear": { "$gt": 1940 } },
                    { "publishedYear": { "$lt": 1960 } },
                ]
            }
        );
        assert_eq!(Filter::all().to_document(), doc! {});
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(Filter::eq("author", "x").validate().is_ok());
        assert!(Filter::eq("products.productId", 101).validate().is_ok());

        for path in ["", "products.", ".title", "$where", "a.$b"] {
            assert!(
                matches!(Filter::eq(path, 1).validate(), Err(StoreError::Validation(_))),
                "expected `{path}` to be rejected"
            );
        }
    }
}
