use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A book in the library catalog.
///
/// `isbn` identifies a book in practice, but nothing enforces its uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub title: String,
    pub author: String,
    pub published_year: i32,
    pub genre: String,
    #[serde(rename = "ISBN")]
    pub isbn: String,
    /// Absent until a rating is assigned, typically by a bulk update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl Record for Book {
    fn collection_name() -> &'static str {
        "books"
    }
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        published_year: i32,
        genre: impl Into<String>,
        isbn: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            published_year,
            genre: genre.into(),
            isbn: isbn.into(),
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// The five books the library is seeded with.
    pub fn samples() -> Vec<Book> {
        vec![
            Book::new("The Great Gatsby", "F. Scott Fitzgerald", 1925, "Fiction", "9780743273565"),
            Book::new("1984", "George Orwell", 1949, "Dystopian", "9780451524935"),
            Book::new("To Kill a Mockingbird", "Harper Lee", 1960, "Fiction", "9780061120084"),
            Book::new("The Catcher in the Rye", "J.D. Salinger", 1951, "Fiction", "9780316769488"),
            Book::new(
                "Harry Potter and the Sorcerer's Stone",
                "J.K. Rowling",
                1997,
                "Fantasy",
                "9780590353427",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordExt;
    use bson::doc;

    #[test]
    fn serializes_with_stored_field_names() {
        let book = Book::samples().remove(1);

        assert_eq!(
            book.to_document().unwrap(),
            doc! {
                "title": "1984",
                "author": "George Orwell",
                "publishedYear": 1949,
                "genre": "Dystopian",
                "ISBN": "9780451524935",
            }
        );
    }

    #[test]
    fn rating_is_read_back_when_present() {
        let book = Book::from_document(doc! {
            "title": "1984",
            "author": "George Orwell",
            "publishedYear": 1949,
            "genre": "Dystopian",
            "ISBN": "9780451524935",
            "rating": 4.5,
        })
        .unwrap();

        assert_eq!(book.rating, Some(4.5));
    }
}
