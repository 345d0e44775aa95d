//! Book persistence and book-genre links

use crate::services::normalizer::NormalizedBook;
use openbook_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Stored book row
#[derive(Debug, Clone, PartialEq)]
pub struct BookRow {
    pub book_id: i64,
    pub external_key: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub published_year: Option<i32>,
}

/// Insert or refresh a book by external key and return its internal id.
///
/// On conflict the mutable fields are overwritten; `book_id` and
/// `created_at` are kept.
pub async fn upsert_book(conn: &mut SqliteConnection, book: &NormalizedBook) -> Result<i64> {
    let book_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO books (
            external_key, title, author, description, cover_url, published_year,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(external_key) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            description = excluded.description,
            cover_url = excluded.cover_url,
            published_year = excluded.published_year,
            updated_at = CURRENT_TIMESTAMP
        RETURNING book_id
        "#,
    )
    .bind(&book.external_key)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.description)
    .bind(&book.cover_url)
    .bind(book.published_year)
    .fetch_one(conn)
    .await?;

    Ok(book_id)
}

/// Link a book to a genre. Returns `false` if the link already existed.
pub async fn link_book_to_genre(
    conn: &mut SqliteConnection,
    book_id: i64,
    genre_id: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO book_genres (book_id, genre_id, created_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(book_id, genre_id) DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(genre_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Total number of stored books
pub async fn count_books(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Total number of book-genre links
pub async fn count_links(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM book_genres")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Load book by external key
pub async fn load_book_by_key(pool: &SqlitePool, external_key: &str) -> Result<Option<BookRow>> {
    let row = sqlx::query(
        r#"
        SELECT book_id, external_key, title, author, description, cover_url, published_year
        FROM books
        WHERE external_key = ?
        "#,
    )
    .bind(external_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| BookRow {
        book_id: row.get("book_id"),
        external_key: row.get("external_key"),
        title: row.get("title"),
        author: row.get("author"),
        description: row.get("description"),
        cover_url: row.get("cover_url"),
        published_year: row.get("published_year"),
    }))
}

/// Genre names linked to a book, sorted
pub async fn genres_for_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT g.genre_name
        FROM book_genres bg
        JOIN genres g ON g.genre_id = bg.genre_id
        WHERE bg.book_id = ?
        ORDER BY g.genre_name
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::genres::upsert_genre;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        openbook_common::db::create_catalog_schema(&pool)
            .await
            .expect("Schema initialization failed");
        pool
    }

    fn book(key: &str, title: &str) -> NormalizedBook {
        NormalizedBook {
            external_key: key.to_string(),
            title: title.to_string(),
            author: "Jane Austen".to_string(),
            published_year: Some(1813),
            cover_url: None,
            description: format!("\"{}\" is a work", title),
        }
    }

    #[tokio::test]
    async fn test_upsert_book_preserves_id_and_refreshes_fields() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = upsert_book(&mut conn, &book("/works/OL1W", "Draft Title"))
            .await
            .unwrap();
        let second = upsert_book(&mut conn, &book("/works/OL1W", "Pride and Prejudice"))
            .await
            .unwrap();
        drop(conn);

        assert_eq!(first, second);
        assert_eq!(count_books(&pool).await.unwrap(), 1);

        let loaded = load_book_by_key(&pool, "/works/OL1W")
            .await
            .unwrap()
            .expect("Book not found");
        assert_eq!(loaded.book_id, first);
        assert_eq!(loaded.title, "Pride and Prejudice");
        assert_eq!(loaded.published_year, Some(1813));
    }

    #[tokio::test]
    async fn test_link_ignores_duplicates() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let book_id = upsert_book(&mut conn, &book("/works/OL2W", "Emma")).await.unwrap();
        let genre_id = upsert_genre(&mut conn, "classics").await.unwrap();

        assert!(link_book_to_genre(&mut conn, book_id, genre_id).await.unwrap());
        assert!(!link_book_to_genre(&mut conn, book_id, genre_id).await.unwrap());
        drop(conn);

        assert_eq!(count_links(&pool).await.unwrap(), 1);
        assert_eq!(genres_for_book(&pool, book_id).await.unwrap(), vec!["classics"]);
    }
}
