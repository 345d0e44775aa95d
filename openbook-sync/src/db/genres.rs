//! Genre tag persistence

use openbook_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Insert the genre if new and return its id either way.
///
/// The no-op update makes `RETURNING` yield the existing row on conflict.
pub async fn upsert_genre(conn: &mut SqliteConnection, genre_name: &str) -> Result<i64> {
    let genre_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO genres (genre_name) VALUES (?)
        ON CONFLICT(genre_name) DO UPDATE SET
            genre_name = excluded.genre_name
        RETURNING genre_id
        "#,
    )
    .bind(genre_name)
    .fetch_one(conn)
    .await?;

    Ok(genre_id)
}

/// Look up a genre id by name
pub async fn find_genre_id(pool: &SqlitePool, genre_name: &str) -> Result<Option<i64>> {
    let genre_id = sqlx::query_scalar("SELECT genre_id FROM genres WHERE genre_name = ?")
        .bind(genre_name)
        .fetch_optional(pool)
        .await?;

    Ok(genre_id)
}

/// Number of books tagged with `genre_name`
pub async fn count_books_in_genre(pool: &SqlitePool, genre_name: &str) -> Result<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM book_genres bg
        JOIN genres g ON g.genre_id = bg.genre_id
        WHERE g.genre_name = ?
        "#,
    )
    .bind(genre_name)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn test_upsert_genre_returns_stable_id() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = upsert_genre(&mut conn, "fiction").await.unwrap();
        let again = upsert_genre(&mut conn, "fiction").await.unwrap();
        let other = upsert_genre(&mut conn, "classics").await.unwrap();
        drop(conn);

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(find_genre_id(&pool, "fiction").await.unwrap(), Some(first));
        assert_eq!(find_genre_id(&pool, "poetry").await.unwrap(), None);
    }
}
