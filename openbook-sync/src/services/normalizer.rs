//! Record normalizer
//!
//! Turns one raw work into a persistable book, or rejects it. A work needs
//! an external key, a non-blank title and at least one author entry.
//! Rejection is a normal outcome: callers count it as skipped and move on.

use super::catalog_client::RawWork;
use thiserror::Error;

pub const UNKNOWN_AUTHOR: &str = "Unknown";
const UNKNOWN_YEAR: &str = "an unspecified year";

/// Book ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBook {
    pub external_key: String,
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    pub cover_url: Option<String>,
    pub description: String,
}

/// Why a raw work was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("missing external key")]
    MissingKey,
    #[error("missing or blank title")]
    MissingTitle,
    #[error("no author entries")]
    MissingAuthors,
}

/// Validates and transforms raw works
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    cover_url_template: String,
}

impl RecordNormalizer {
    /// `cover_url_template` must contain `{id}`, replaced by the cover id
    pub fn new(cover_url_template: impl Into<String>) -> Self {
        Self {
            cover_url_template: cover_url_template.into(),
        }
    }

    pub fn normalize(&self, raw: &RawWork) -> Result<NormalizedBook, RejectReason> {
        // Stored as received; whitespace only counts for emptiness
        let external_key = raw
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(RejectReason::MissingKey)?;

        let title = raw
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RejectReason::MissingTitle)?;

        let first_author = raw
            .authors
            .as_ref()
            .and_then(|authors| authors.first())
            .ok_or(RejectReason::MissingAuthors)?;

        let author = first_author
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_AUTHOR);

        let published_year = raw.first_publish_year.filter(|&y| y != 0);
        let cover_url = raw
            .cover_id
            .filter(|&id| id > 0)
            .map(|id| self.cover_url(id));
        let description = describe(title, author, published_year);

        Ok(NormalizedBook {
            external_key: external_key.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            published_year,
            cover_url,
            description,
        })
    }

    fn cover_url(&self, cover_id: i64) -> String {
        self.cover_url_template.replace("{id}", &cover_id.to_string())
    }
}

/// Synthesized description used for every imported book
pub fn describe(title: &str, author: &str, year: Option<i32>) -> String {
    let year = year
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());
    format!(
        "\"{}\" is a work written by {}, first published in {}.",
        title, author, year
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog_client::RawAuthor;

    const TEMPLATE: &str = "https://covers.openlibrary.org/b/id/{id}-L.jpg";

    fn work(key: Option<&str>, title: Option<&str>, authors: Option<Vec<&str>>) -> RawWork {
        RawWork {
            key: key.map(String::from),
            title: title.map(String::from),
            authors: authors.map(|names| {
                names
                    .into_iter()
                    .map(|n| RawAuthor {
                        name: Some(n.to_string()),
                        key: None,
                    })
                    .collect()
            }),
            first_publish_year: None,
            cover_id: None,
        }
    }

    #[test]
    fn test_full_record() {
        let mut raw = work(Some("/works/OL45W"), Some("  Dune "), Some(vec!["Frank Herbert", "Other"]));
        raw.first_publish_year = Some(1965);
        raw.cover_id = Some(8231856);

        let book = RecordNormalizer::new(TEMPLATE).normalize(&raw).unwrap();

        assert_eq!(book.external_key, "/works/OL45W");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.published_year, Some(1965));
        assert_eq!(
            book.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/8231856-L.jpg")
        );
        assert_eq!(
            book.description,
            "\"Dune\" is a work written by Frank Herbert, first published in 1965."
        );
    }

    #[test]
    fn test_defaults_when_optional_fields_absent() {
        let mut raw = work(Some("OL1"), Some("Anonymous Tales"), Some(vec![]));
        raw.authors = Some(vec![RawAuthor::default()]);

        let book = RecordNormalizer::new(TEMPLATE).normalize(&raw).unwrap();

        assert_eq!(book.author, UNKNOWN_AUTHOR);
        assert_eq!(book.published_year, None);
        assert_eq!(book.cover_url, None);
        assert!(book.description.ends_with("first published in an unspecified year."));
    }

    #[test]
    fn test_rejections() {
        let normalizer = RecordNormalizer::new(TEMPLATE);
        let cases = [
            (work(None, Some("T"), Some(vec!["A"])), RejectReason::MissingKey),
            (work(Some("  "), Some("T"), Some(vec!["A"])), RejectReason::MissingKey),
            (work(Some("K"), None, Some(vec!["A"])), RejectReason::MissingTitle),
            (work(Some("K"), Some("   "), Some(vec!["A"])), RejectReason::MissingTitle),
            (work(Some("K"), Some("T"), None), RejectReason::MissingAuthors),
            (work(Some("K"), Some("T"), Some(vec![])), RejectReason::MissingAuthors),
        ];

        for (raw, expected) in cases {
            assert_eq!(normalizer.normalize(&raw), Err(expected), "{:?}", raw);
        }
    }

    #[test]
    fn test_zero_year_and_cover_count_as_absent() {
        let normalizer = RecordNormalizer::new(TEMPLATE);
        let mut raw = work(Some("K"), Some("T"), Some(vec!["A"]));
        raw.first_publish_year = Some(0);
        raw.cover_id = Some(0);

        let book = normalizer.normalize(&raw).unwrap();
        assert_eq!(book.published_year, None);
        assert_eq!(book.cover_url, None);

        raw.cover_id = Some(-1);
        assert_eq!(normalizer.normalize(&raw).unwrap().cover_url, None);
    }

    #[test]
    fn test_key_stored_unchanged() {
        let raw = work(Some(" /works/OL7W "), Some("T"), Some(vec!["A"]));

        let book = RecordNormalizer::new(TEMPLATE).normalize(&raw).unwrap();

        assert_eq!(book.external_key, " /works/OL7W ");
    }
}
