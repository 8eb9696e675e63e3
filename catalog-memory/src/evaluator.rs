//! Filter evaluation and value ordering for in-memory records.
//!
//! Values compare the way a document database compares them: integers and doubles
//! are one numeric class, and values of different classes are ordered by class
//! (`MinKey < Null < Number < String < Document < Array < Binary < ObjectId < Bool
//! < DateTime < Timestamp < Regex < MaxKey`) and never equal each other. Range
//! predicates only match values of the operand's class.
//!
//! Decimal128, JavaScript code and DB pointers have no numeric or structural view
//! here; they rank together between regexes and `MaxKey` and order by their
//! display form.

use std::cmp::Ordering;

use bson::{Binary, Bson, DateTime, Document, Timestamp, oid::ObjectId};

use catalog_core::{
    error::{StoreError, StoreResult},
    filter::{Condition, Filter, FilterVisitor},
    pipeline::SortDirection,
};

/// Comparable view over a borrowed BSON value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    MinKey,
    Null,
    /// Int32 and Int64, compared exactly.
    Int(i64),
    Double(f64),
    String(&'a str),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    Binary(&'a Binary),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Timestamp(Timestamp),
    /// Ordered by display form.
    Regex(&'a Bson),
    /// Types without a natural order; ordered by their display form.
    Other(&'a Bson),
    MaxKey,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::MinKey => Comparable::MinKey,
            Bson::MaxKey => Comparable::MaxKey,
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Binary(binary) => Comparable::Binary(binary),
            Bson::ObjectId(oid) => Comparable::ObjectId(*oid),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::Timestamp(value) => Comparable::Timestamp(*value),
            regex @ Bson::RegularExpression(_) => Comparable::Regex(regex),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::MinKey => 0,
            Comparable::Null => 1,
            Comparable::Int(_) | Comparable::Double(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Binary(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Timestamp(_) => 10,
            Comparable::Regex(_) => 11,
            Comparable::Other(_) => 12,
            Comparable::MaxKey => 13,
        }
    }

    /// Total order across all values, used by sort stages and range predicates.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::MinKey, Comparable::MinKey)
            | (Comparable::Null, Comparable::Null)
            | (Comparable::MaxKey, Comparable::MaxKey) => Ordering::Equal,
            (Comparable::Int(a), Comparable::Int(b)) => a.cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => compare_doubles(*a, *b),
            (Comparable::Int(a), Comparable::Double(b)) => compare_int_double(*a, *b),
            (Comparable::Double(a), Comparable::Int(b)) => compare_int_double(*b, *a).reverse(),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((left_key, left), (right_key, right)) in a.iter().zip(b) {
                    let ordering = left_key
                        .cmp(right_key)
                        .then_with(|| left.total_cmp(right));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (left, right) in a.iter().zip(b) {
                    let ordering = left.total_cmp(right);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Binary(a), Comparable::Binary(b)) => a
                .bytes
                .len()
                .cmp(&b.bytes.len())
                .then_with(|| u8::from(a.subtype).cmp(&u8::from(b.subtype)))
                .then_with(|| a.bytes.cmp(&b.bytes)),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Timestamp(a), Comparable::Timestamp(b)) => {
                (a.time, a.increment).cmp(&(b.time, b.increment))
            }
            (Comparable::Regex(a), Comparable::Regex(b)) | (Comparable::Other(a), Comparable::Other(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.to_string().cmp(&b.to_string())
                }
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    pub(crate) fn same_class(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

/// NaN sorts below every other number and equals itself.
fn compare_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer with a double.
///
/// Rounding `int` to the nearest double is monotonic, so a strict difference after
/// rounding is the true order. A tie means `double` is integral and within
/// `i64`'s magnitude, where the comparison finishes in `i128`.
fn compare_int_double(int: i64, double: f64) -> Ordering {
    if double.is_nan() {
        return Ordering::Greater;
    }

    match (int as f64).partial_cmp(&double) {
        Some(Ordering::Equal) | None => i128::from(int).cmp(&(double as i128)),
        Some(ordering) => ordering,
    }
}

/// Collects every value reachable through a dotted path.
///
/// Arrays of documents along the path fan out: `products.productId` yields the
/// `productId` of every element of `products`. A missing field yields nothing.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = document.get(first) {
            descend(value, rest, &mut found);
        }
    }

    found
}

fn descend<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((first, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(next) = document.get(first) {
                descend(next, rest, found);
            }
        }
        Bson::Array(items) => {
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                descend(item, segments, found);
            }
        }
        _ => {}
    }
}

/// The single value a path resolves to: the value itself, `Null` when missing,
/// or an array of every reached value when the path fans out.
pub(crate) fn resolve(document: &Document, path: &str) -> Bson {
    let mut found = lookup(document, path);

    match found.len() {
        0 => Bson::Null,
        1 => found.remove(0).clone(),
        _ => Bson::Array(found.into_iter().cloned().collect()),
    }
}

/// Sort key for a path: missing values sort as `Null`; arrays sort by their
/// smallest element ascending and their largest element descending.
pub(crate) fn sort_key<'a>(document: &'a Document, path: &str, direction: SortDirection) -> Comparable<'a> {
    let candidates = lookup(document, path)
        .into_iter()
        .flat_map(|value| match value {
            Bson::Array(items) if !items.is_empty() => items.iter().collect::<Vec<_>>(),
            Bson::Array(_) => Vec::new(),
            value => vec![value],
        })
        .map(Comparable::from);

    let key = match direction {
        SortDirection::Ascending => candidates.min_by(|a, b| a.total_cmp(b)),
        SortDirection::Descending => candidates.max_by(|a, b| a.total_cmp(b)),
    };

    key.unwrap_or(Comparable::Null)
}

/// Evaluates filters against a single stored document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, filter: &Filter) -> StoreResult<bool> {
        self.visit_filter(filter)
    }

    /// Returns `true` if `document` satisfies every predicate of `filter`.
    pub fn matches(document: &'a Document, filter: &Filter) -> StoreResult<bool> {
        if filter.is_empty() {
            return Ok(true);
        }

        DocumentEvaluator::new(document).evaluate(filter)
    }
}

/// Values a predicate tests: each reached value, plus the elements of reached arrays.
fn candidates<'a>(values: &[&'a Bson]) -> impl Iterator<Item = Comparable<'a>> {
    values
        .iter()
        .flat_map(|value| {
            let mut expanded = vec![Comparable::from(*value)];
            if let Bson::Array(items) = value {
                expanded.extend(items.iter().map(Comparable::from));
            }
            expanded
        })
        .collect::<Vec<_>>()
        .into_iter()
}

fn equals_any(values: &[&Bson], operand: &Bson) -> bool {
    let operand = Comparable::from(operand);

    if matches!(operand, Comparable::Null) && values.is_empty() {
        return true;
    }

    candidates(values).any(|candidate| candidate == operand)
}

fn compares_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    candidates(values)
        .filter(|candidate| candidate.same_class(&operand))
        .any(|candidate| accept(candidate.total_cmp(&operand)))
}

impl FilterVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = StoreError;

    fn visit_all(&mut self, outputs: Vec<bool>) -> Result<bool, Self::Error> {
        Ok(outputs.into_iter().all(|matched| matched))
    }

    fn visit_predicate(&mut self, field: &str, condition: &Condition) -> Result<bool, Self::Error> {
        let values = lookup(self.document, field);

        Ok(match condition {
            Condition::Eq(operand) => equals_any(&values, operand),
            Condition::Ne(operand) => !equals_any(&values, operand),
            Condition::GreaterThan(operand) => compares_any(&values, operand, Ordering::is_gt),
            Condition::GreaterThanOrEqual(operand) => compares_any(&values, operand, Ordering::is_ge)
                || (operand == &Bson::Null && values.is_empty()),
            Condition::LessThan(operand) => compares_any(&values, operand, Ordering::is_lt),
            Condition::LessThanOrEqual(operand) => compares_any(&values, operand, Ordering::is_le)
                || (operand == &Bson::Null && values.is_empty()),
            Condition::AnyOf(operands) => operands.iter().any(|operand| equals_any(&values, operand)),
            Condition::Exists(present) => values.is_empty() != *present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: &Document, filter: Filter) -> bool {
        DocumentEvaluator::matches(document, &filter).unwrap()
    }

    #[test]
    fn numbers_compare_across_widths() {
        let book = doc! { "publishedYear": 1960_i64, "rating": 4.8 };

        assert!(matches(&book, Filter::eq("publishedYear", 1960)));
        assert!(matches(&book, Filter::gt("rating", 4)));
        assert!(!matches(&book, Filter::lt("publishedYear", 1960.0)));
        assert!(matches(&book, Filter::lte("publishedYear", 1960.0)));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let order = doc! { "orderId": 9_007_199_254_740_992_i64 };

        assert!(!matches(&order, Filter::eq("orderId", 9_007_199_254_740_993_i64)));
        assert!(matches(&order, Filter::lt("orderId", 9_007_199_254_740_993_i64)));
        assert!(matches(&order, Filter::eq("orderId", 9_007_199_254_740_992.0)));

        let next = doc! { "orderId": 9_007_199_254_740_993_i64 };
        assert!(!matches(&next, Filter::eq("orderId", 9_007_199_254_740_992.0)));
        assert!(matches(&next, Filter::gt("orderId", 9_007_199_254_740_992.0)));
        assert!(matches(&doc! { "orderId": i64::MAX }, Filter::lt("orderId", 9.3e18)));
        assert!(matches(&doc! { "orderId": i64::MAX }, Filter::gt("orderId", f64::NAN)));
    }

    #[test]
    fn special_types_rank_in_store_order() {
        let values = [
            Bson::MinKey,
            Bson::Null,
            Bson::Int32(1),
            Bson::String("a".into()),
            Bson::Boolean(false),
            Bson::Timestamp(Timestamp { time: 1, increment: 0 }),
            Bson::MaxKey,
        ];
        for pair in values.windows(2) {
            let (low, high) = (Comparable::from(&pair[0]), Comparable::from(&pair[1]));
            assert_eq!(low.total_cmp(&high), Ordering::Less, "{} < {}", pair[0], pair[1]);
        }

        let oid = Bson::ObjectId(ObjectId::new());
        let binary = Bson::Binary(Binary { subtype: bson::spec::BinarySubtype::Generic, bytes: vec![1] });
        assert_eq!(Comparable::from(&binary).total_cmp(&Comparable::from(&oid)), Ordering::Less);
        assert_eq!(Comparable::from(&oid).total_cmp(&Comparable::from(&Bson::Boolean(true))), Ordering::Less);
        assert_eq!(
            Comparable::from(&Bson::DateTime(DateTime::from_millis(0)))
                .total_cmp(&Comparable::from(&Bson::Timestamp(Timestamp { time: 0, increment: 0 }))),
            Ordering::Less
        );
    }

    #[test]
    fn range_predicates_stay_within_type_class() {
        let book = doc! { "title": "1984", "publishedYear": 1949 };

        assert!(!matches(&book, Filter::gt("title", 10)));
        assert!(!matches(&book, Filter::lt("publishedYear", "2000")));
        assert!(matches(&book, Filter::gt("title", "1000")));
    }

    #[test]
    fn missing_fields() {
        let book = doc! { "title": "1984" };

        assert!(!matches(&book, Filter::eq("rating", 4.5)));
        assert!(matches(&book, Filter::ne("rating", 4.5)));
        assert!(matches(&book, Filter::eq("rating", Bson::Null)));
        assert!(matches(&book, Filter::not_exists("rating")));
        assert!(!matches(&book, Filter::exists("rating")));
        assert!(!matches(&book, Filter::gt("rating", 0)));
    }

    #[test]
    fn arrays_match_on_any_element() {
        let order = doc! {
            "orderId": 5001,
            "tags": ["gift", "express"],
            "products": [
                { "productId": 101, "quantity": 1 },
                { "productId": 102, "quantity": 3 },
            ],
        };

        assert!(matches(&order, Filter::eq("tags", "gift")));
        assert!(matches(&order, Filter::eq("tags", vec!["gift", "express"])));
        assert!(matches(&order, Filter::eq("products.productId", 102)));
        assert!(matches(&order, Filter::gt("products.quantity", 2)));
        assert!(!matches(&order, Filter::eq("products.productId", 103)));
        assert!(matches(&order, Filter::any_of("products.productId", [100, 101])));
    }

    #[test]
    fn predicates_are_conjunctive() {
        let book = doc! { "genre": "Fiction", "publishedYear": 1960 };

        assert!(matches(&book, Filter::eq("genre", "Fiction").and_eq("publishedYear", 1960)));
        assert!(!matches(&book, Filter::eq("genre", "Fiction").and_eq("publishedYear", 1961)));
        assert!(matches(&book, Filter::all()));
    }

    #[test]
    fn total_order_ranks_types_and_puts_missing_first() {
        let rated = doc! { "rating": 4.5 };
        let unrated = doc! { "title": "x" };
        let text = doc! { "rating": "good" };

        let missing = sort_key(&unrated, "rating", SortDirection::Ascending);
        let number = sort_key(&rated, "rating", SortDirection::Ascending);
        let string = sort_key(&text, "rating", SortDirection::Ascending);

        assert_eq!(missing.total_cmp(&number), Ordering::Less);
        assert_eq!(number.total_cmp(&string), Ordering::Less);
    }

    #[test]
    fn array_sort_keys_use_extreme_elements() {
        let document = doc! { "scores": [3, 9, 1] };

        assert!(sort_key(&document, "scores", SortDirection::Ascending) == Comparable::Int(1));
        assert!(sort_key(&document, "scores", SortDirection::Descending) == Comparable::Int(9));
    }

    #[test]
    fn resolve_collapses_fan_out() {
        let order = doc! { "products": [{ "productId": 101 }, { "productId": 102 }], "userId": 1 };

        assert_eq!(resolve(&order, "userId"), Bson::Int32(1));
        assert_eq!(resolve(&order, "products.productId"), Bson::Array(vec![101.into(), 102.into()]));
        assert_eq!(resolve(&order, "shipping"), Bson::Null);
    }
}
