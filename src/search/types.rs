//! Response shapes returned by search operations.

use serde::Serialize;

use crate::image::ImageRecord;

/// One page of text search results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchPage {
    /// Matching records on this page, newest upload first.
    pub images: Vec<ImageRecord>,

    /// Number of matching records across all pages.
    pub total: usize,

    /// 1-based page number.
    pub page: usize,

    /// Requested page size.
    pub page_size: usize,

    /// Whether a later page holds more matches.
    pub has_more: bool,
}

impl SearchPage {
    /// Cuts one page out of the full, ordered match list.
    pub(crate) fn from_matches(matches: Vec<ImageRecord>, page: usize, page_size: usize) -> Self {
        let total = matches.len();
        let start = (page - 1).saturating_mul(page_size);
        let images: Vec<ImageRecord> = matches.into_iter().skip(start).take(page_size).collect();
        let has_more = start.saturating_add(images.len()) < total;

        Self {
            images,
            total,
            page,
            page_size,
            has_more,
        }
    }
}

/// A record ranked by distance to a query.
///
/// Used for similar-image results (cosine distance) and color filter results
/// (CIELAB ΔE distance). Lower is closer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredImage {
    /// The matching record.
    #[serde(flatten)]
    pub image: ImageRecord,

    /// Distance from the query.
    pub distance: f32,
}
