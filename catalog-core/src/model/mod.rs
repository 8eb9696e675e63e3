//! The catalog's record types.
//!
//! Field names match the stored documents exactly (`publishedYear`, `ISBN`,
//! `userId`, ...). References between users, products and orders are plain
//! integers; the catalog does not check that they point at existing records.

mod book;
mod order;
mod product;
mod user;

pub use book::Book;
pub use order::{Order, OrderLine};
pub use product::Product;
pub use user::User;
