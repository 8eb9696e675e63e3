//! Aggregation pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Stages run exactly in the order
//! they were added: `sort` then `limit` yields the top records, `limit` then `sort`
//! sorts an arbitrary prefix.
//!
//! # Example
//!
//! ```ignore
//! use catalog::pipeline::{Pipeline, Reducer, SortDirection};
//!
//! // Total number of books per genre
//! let per_genre = Pipeline::new().group_by("genre", [("totalBooks", Reducer::Count)]);
//!
//! // Average published year of all books
//! let average = Pipeline::new().group_all([("avgPublishedYear", Reducer::Average("publishedYear".into()))]);
//!
//! // Top-rated book
//! let top = Pipeline::new().sort("rating", SortDirection::Descending).limit(1);
//! ```

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    filter::{Filter, validate_path},
    record::ID_FIELD,
};

/// Sort direction for sort stages and indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// The store's numeric encoding: `1` or `-1`.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Accumulator computed per group.
#[derive(Debug, Clone, PartialEq)]
pub enum Reducer {
    /// Number of records in the group.
    Count,
    /// Mean of the numeric values of the field; null if the group has none.
    Average(String),
}

/// A named reducer output of a group stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub output: String,
    pub reducer: Reducer,
}

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps only records matching the filter.
    Match(Filter),
    /// Groups records by the value of `key` (all records together when `None`).
    ///
    /// Emits one document per group: `{ _id: <key value>, <output>: <reduced value>, .. }`.
    GroupBy {
        key: Option<String>,
        accumulators: Vec<Accumulator>,
    },
    /// Orders records by a field. Missing values sort first in ascending order.
    Sort { field: String, direction: SortDirection },
    /// Keeps at most `n` records.
    Limit(u64),
}

/// An ordered sequence of aggregation stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    /// Appends a group stage keyed on `key`.
    pub fn group_by<O: Into<String>>(
        self,
        key: impl Into<String>,
        accumulators: impl IntoIterator<Item = (O, Reducer)>,
    ) -> Self {
        self.stage(Stage::GroupBy {
            key: Some(key.into()),
            accumulators: collect_accumulators(accumulators),
        })
    }

    /// Appends a group stage that folds every record into a single group.
    pub fn group_all<O: Into<String>>(self, accumulators: impl IntoIterator<Item = (O, Reducer)>) -> Self {
        self.stage(Stage::GroupBy {
            key: None,
            accumulators: collect_accumulators(accumulators),
        })
    }

    pub fn sort(self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.stage(Stage::Sort { field: field.into(), direction })
    }

    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Checks every stage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for `limit(0)`, malformed field paths,
    /// group stages without outputs, and outputs that are empty, named `_id`,
    /// dotted, start with `$`, or repeat.
    pub fn validate(&self) -> StoreResult<()> {
        for stage in &self.stages {
            match stage {
                Stage::Match(filter) => filter.validate()?,
                Stage::GroupBy { key, accumulators } => {
                    if let Some(key) = key {
                        validate_path(key)?;
                    }
                    if accumulators.is_empty() {
                        return Err(StoreError::Validation(
                            "group stage must define at least one output".into(),
                        ));
                    }
                    for (position, accumulator) in accumulators.iter().enumerate() {
                        validate_output(&accumulator.output)?;
                        if accumulators[..position].iter().any(|a| a.output == accumulator.output) {
                            return Err(StoreError::Validation(format!(
                                "group output `{}` is defined twice",
                                accumulator.output
                            )));
                        }
                        if let Reducer::Average(field) = &accumulator.reducer {
                            validate_path(field)?;
                        }
                    }
                }
                Stage::Sort { field, .. } => validate_path(field)?,
                Stage::Limit(0) => {
                    return Err(StoreError::Validation("limit must be positive".into()));
                }
                Stage::Limit(_) => {}
            }
        }

        Ok(())
    }

    /// Renders the pipeline as store stage documents.
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages
            .iter()
            .map(|stage| {
                let mut document = Document::new();
                match stage {
                    Stage::Match(filter) => {
                        document.insert("$match", filter.to_document());
                    }
                    Stage::GroupBy { key, accumulators } => {
                        let mut group = Document::new();
                        group.insert(
                            ID_FIELD,
                            key.as_ref()
                                .map(|key| Bson::String(format!("${key}")))
                                .unwrap_or(Bson::Null),
                        );
                        for accumulator in accumulators {
                            let reduced = match &accumulator.reducer {
                                Reducer::Count => bson::doc! { "$sum": 1 },
                                Reducer::Average(field) => bson::doc! { "$avg": format!("${field}") },
                            };
                            group.insert(accumulator.output.clone(), reduced);
                        }
                        document.insert("$group", group);
                    }
                    Stage::Sort { field, direction } => {
                        let mut sort = Document::new();
                        sort.insert(field.clone(), direction.as_i32());
                        document.insert("$sort", sort);
                    }
                    Stage::Limit(n) => {
                        document.insert("$limit", i64::try_from(*n).unwrap_or(i64::MAX));
                    }
                }
                document
            })
            .collect()
    }
}

fn collect_accumulators<O: Into<String>>(accumulators: impl IntoIterator<Item = (O, Reducer)>) -> Vec<Accumulator> {
    accumulators
        .into_iter()
        .map(|(output, reducer)| Accumulator { output: output.into(), reducer })
        .collect()
}

fn validate_output(output: &str) -> StoreResult<()> {
    if output.is_empty() || output == ID_FIELD || output.starts_with('$') || output.contains('.') {
        return Err(StoreError::Validation(format!(
            "`{output}` is not a valid group output name"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn stages_keep_insertion_order() {
        let top = Pipeline::new().sort("rating", SortDirection::Descending).limit(1);
        let prefix = Pipeline::new().limit(1).sort("rating", SortDirection::Descending);

        assert_ne!(top, prefix);
        assert_eq!(
            top.to_documents(),
            vec![doc! { "$sort": { "rating": -1 } }, doc! { "$limit": 1_i64 }]
        );
    }

    #[test]
    fn renders_group_stages() {
        let per_genre = Pipeline::new().group_by("genre", [("totalBooks", Reducer::Count)]);
        let average = Pipeline::new()
            .group_all([("avgPublishedYear", Reducer::Average("publishedYear".into()))]);

        assert_eq!(
            per_genre.to_documents(),
            vec![doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } }]
        );
        assert_eq!(
            average.to_documents(),
            vec![doc! { "$group": { "_id": null, "avgPublishedYear": { "$avg": "$publishedYear" } } }]
        );
    }

    #[test]
    fn validation_rejects_bad_stages() {
        assert!(Pipeline::new().validate().is_ok());

        for pipeline in [
            Pipeline::new().limit(0),
            Pipeline::new().sort("", SortDirection::Ascending),
            Pipeline::new().group_by("genre", Vec::<(String, Reducer)>::new()),
            Pipeline::new().group_by("genre", [("_id", Reducer::Count)]),
            Pipeline::new().group_by("genre", [("$total", Reducer::Count)]),
            Pipeline::new().group_by("genre", [("n", Reducer::Count), ("n", Reducer::Count)]),
            Pipeline::new().filter(Filter::eq("$where", 1)),
        ] {
            assert!(matches!(pipeline.validate(), Err(StoreError::Validation(_))), "{pipeline:?}");
        }
    }
}
