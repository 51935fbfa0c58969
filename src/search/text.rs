//! Case-insensitive token matching for text search.

use crate::image::ImageRecord;

/// A parsed text query.
///
/// Every whitespace-separated token must occur, case-insensitively, as a
/// substring of the filename, the description or one of the tags. A query
/// with no tokens matches every record.
///
/// # Example
///
/// ```rust
/// use gallerydb::search::TextQuery;
///
/// let query = TextQuery::parse("  Sunset  BEACH ");
/// assert_eq!(query.tokens(), ["sunset", "beach"]);
/// assert!(TextQuery::parse("").is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextQuery {
    tokens: Vec<String>,
}

impl TextQuery {
    /// Splits `query` on whitespace and lowercases each token.
    pub fn parse(query: &str) -> Self {
        Self {
            tokens: query.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    /// Returns the lowercased tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns true if the query has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns `true` if `record` contains every token.
    pub fn matches(&self, record: &ImageRecord) -> bool {
        if self.tokens.is_empty() {
            return true;
        }

        let filename = record.filename.to_lowercase();
        let description = record.description.to_lowercase();
        let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();

        self.tokens.iter().all(|token| {
            filename.contains(token.as_str())
                || description.contains(token.as_str())
                || tags.iter().any(|tag| tag.contains(token.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ExtractedFeatures, NewImage};
    use crate::types::{ImageId, Timestamp, UserId};

    fn record(filename: &str, description: &str, tags: &[&str]) -> ImageRecord {
        ImageRecord::pending(
            ImageId::new(1),
            &NewImage::new(filename, vec![]),
            UserId::new("u"),
            Timestamp::from_millis(0),
        )
        .completed(ExtractedFeatures {
            embedding: vec![1.0],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            description: description.to_string(),
            colors: vec![],
        })
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(TextQuery::parse("   ").matches(&record("a.jpg", "", &[])));
    }

    #[test]
    fn test_token_sources() {
        let r = record("IMG_0042.jpg", "Sunset over the Bay", &["Ocean", "golden hour"]);

        assert!(TextQuery::parse("img_0042").matches(&r));
        assert!(TextQuery::parse("SUNSET").matches(&r));
        assert!(TextQuery::parse("ocea").matches(&r));
        assert!(TextQuery::parse("golden").matches(&r));
    }

    #[test]
    fn test_all_tokens_required() {
        let r = record("beach.jpg", "waves", &["sand"]);

        assert!(TextQuery::parse("beach sand").matches(&r));
        assert!(!TextQuery::parse("beach mountain").matches(&r));
    }

    #[test]
    fn test_failed_records_still_match_on_filename() {
        let r = ImageRecord::pending(
            ImageId::new(1),
            &NewImage::new("holiday.png", vec![]),
            UserId::new("u"),
            Timestamp::from_millis(0),
        )
        .failed("boom");

        assert!(TextQuery::parse("holiday").matches(&r));
    }
}
