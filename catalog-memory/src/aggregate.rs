//! In-memory execution of aggregation pipelines.

use bson::{Bson, Document};

use catalog_core::{
    error::StoreResult,
    pipeline::{Accumulator, Pipeline, Reducer, SortDirection, Stage},
    record::ID_FIELD,
};

use crate::evaluator::{Comparable, DocumentEvaluator, resolve, sort_key};

/// Runs every stage of `pipeline` over `records`, in order.
pub(crate) fn run(records: Vec<Document>, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
    pipeline
        .stages()
        .iter()
        .try_fold(records, |records, stage| apply(records, stage))
}

fn apply(mut records: Vec<Document>, stage: &Stage) -> StoreResult<Vec<Document>> {
    match stage {
        Stage::Match(filter) => {
            let mut kept = Vec::with_capacity(records.len());
            for record in records {
                if DocumentEvaluator::matches(&record, filter)? {
                    kept.push(record);
                }
            }
            Ok(kept)
        }
        Stage::GroupBy { key, accumulators } => Ok(group(&records, key.as_deref(), accumulators)),
        Stage::Sort { field, direction } => {
            // `sort_by` is stable, so ties keep their incoming order.
            records.sort_by(|a, b| {
                let ordering = sort_key(a, field, *direction).total_cmp(&sort_key(b, field, *direction));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
            Ok(records)
        }
        Stage::Limit(n) => {
            records.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
            Ok(records)
        }
    }
}

/// Running state of one reducer within one group.
#[derive(Debug, Clone, Copy)]
enum Tally {
    Count(i64),
    Average { sum: f64, values: u64 },
}

impl Tally {
    fn new(reducer: &Reducer) -> Self {
        match reducer {
            Reducer::Count => Tally::Count(0),
            Reducer::Average(_) => Tally::Average { sum: 0.0, values: 0 },
        }
    }

    fn add(&mut self, reducer: &Reducer, record: &Document) {
        match (self, reducer) {
            (Tally::Count(count), Reducer::Count) => *count += 1,
            (Tally::Average { sum, values }, Reducer::Average(field)) => {
                let value = match resolve(record, field) {
                    Bson::Int32(value) => f64::from(value),
                    Bson::Int64(value) => value as f64,
                    Bson::Double(value) => value,
                    _ => return,
                };
                *sum += value;
                *values += 1;
            }
            _ => {}
        }
    }

    fn finish(self) -> Bson {
        match self {
            Tally::Count(count) => match i32::try_from(count) {
                Ok(count) => Bson::Int32(count),
                Err(_) => Bson::Int64(count),
            },
            Tally::Average { values: 0, .. } => Bson::Null,
            Tally::Average { sum, values } => Bson::Double(sum / values as f64),
        }
    }
}

/// Groups records by key, in order of each key's first appearance.
fn group(records: &[Document], key: Option<&str>, accumulators: &[Accumulator]) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<Tally>)> = Vec::new();

    for record in records {
        let value = key.map_or(Bson::Null, |key| resolve(record, key));
        let position = match groups
            .iter()
            .position(|(existing, _)| Comparable::from(existing) == Comparable::from(&value))
        {
            Some(position) => position,
            None => {
                let tallies = accumulators.iter().map(|a| Tally::new(&a.reducer)).collect();
                groups.push((value, tallies));
                groups.len() - 1
            }
        };

        let (_, tallies) = &mut groups[position];
        for (tally, accumulator) in tallies.iter_mut().zip(accumulators) {
            tally.add(&accumulator.reducer, record);
        }
    }

    groups
        .into_iter()
        .map(|(value, tallies)| {
            let mut document = Document::new();
            document.insert(ID_FIELD, value);
            for (tally, accumulator) in tallies.into_iter().zip(accumulators) {
                document.insert(accumulator.output.clone(), tally.finish());
            }
            document
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use catalog_core::filter::Filter;

    fn books() -> Vec<Document> {
        vec![
            doc! { "title": "1984", "genre": "Dystopian", "publishedYear": 1949, "rating": 4.7 },
            doc! { "title": "To Kill a Mockingbird", "genre": "Fiction", "publishedYear": 1960, "rating": 4.8 },
            doc! { "title": "The Great Gatsby", "genre": "Fiction", "publishedYear": 1925 },
        ]
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let pipeline = Pipeline::new().group_by(
            "genre",
            [("totalBooks", Reducer::Count), ("avgRating", Reducer::Average("rating".into()))],
        );

        assert_eq!(
            run(books(), &pipeline).unwrap(),
            vec![
                doc! { "_id": "Dystopian", "totalBooks": 1, "avgRating": 4.7 },
                doc! { "_id": "Fiction", "totalBooks": 2, "avgRating": 4.8 },
            ]
        );
    }

    #[test]
    fn missing_keys_group_under_null() {
        let mut records = books();
        records.push(doc! { "title": "Untitled" });

        let groups = run(records, &Pipeline::new().group_by("genre", [("n", Reducer::Count)])).unwrap();
        assert_eq!(groups.last(), Some(&doc! { "_id": null, "n": 1 }));
    }

    #[test]
    fn average_without_numeric_values_is_null() {
        let pipeline = Pipeline::new()
            .filter(Filter::eq("title", "The Great Gatsby"))
            .group_all([("avgRating", Reducer::Average("rating".into()))]);

        assert_eq!(run(books(), &pipeline).unwrap(), vec![doc! { "_id": null, "avgRating": null }]);
    }

    #[test]
    fn stages_apply_in_order() {
        let top = Pipeline::new().sort("publishedYear", SortDirection::Descending).limit(1);
        let prefix = Pipeline::new().limit(1).sort("publishedYear", SortDirection::Descending);

        assert_eq!(run(books(), &top).unwrap()[0].get_str("title").unwrap(), "To Kill a Mockingbird");
        assert_eq!(run(books(), &prefix).unwrap()[0].get_str("title").unwrap(), "1984");
    }

    #[test]
    fn sort_puts_missing_values_first_and_is_stable() {
        let sorted = run(books(), &Pipeline::new().sort("rating", SortDirection::Ascending)).unwrap();
        let titles = sorted.iter().map(|d| d.get_str("title").unwrap()).collect::<Vec<_>>();

        assert_eq!(titles, ["The Great Gatsby", "1984", "To Kill a Mockingbird"]);

        let by_genre = run(books(), &Pipeline::new().sort("genre", SortDirection::Descending)).unwrap();
        let titles = by_genre.iter().map(|d| d.get_str("title").unwrap()).collect::<Vec<_>>();

        assert_eq!(titles, ["To Kill a Mockingbird", "The Great Gatsby", "1984"]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let pipeline = Pipeline::new().group_all([("n", Reducer::Count)]);
        assert!(run(Vec::new(), &pipeline).unwrap().is_empty());
    }
}
