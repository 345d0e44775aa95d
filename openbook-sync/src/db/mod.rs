//! Catalog persistence operations
//!
//! Every write is a single atomic statement keyed by a natural key, so
//! concurrent genre batches touching the same genre name or book key
//! converge on the same row without extra locking.

pub mod books;
pub mod genres;

pub use books::{link_book_to_genre, upsert_book, BookRow};
pub use genres::upsert_genre;
