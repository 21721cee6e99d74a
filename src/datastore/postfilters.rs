//! Ways to filter posts based on their fields. Filter semantics work just like SQL:
//! If a field is unset, its filter won't be applied.
//! If set, filter out posts that don't match the filter.
use chrono::{offset::Utc, DateTime};

/// Filters that can be applied to queries on the datastore.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PostFilters {
    pub author_id: Option<i32>,
    /// Posts by any of these authors. An empty list matches nothing.
    pub author_in: Option<Vec<i32>>,
    pub group_id: Option<i32>,
    /// Case-insensitive substring of the post text
    pub text_contains: Option<String>,
    /// Inclusive lower bound on pub_date
    pub published_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on pub_date
    pub published_before: Option<DateTime<Utc>>,
}

impl PostFilters {
    pub fn by_author(author_id: i32) -> Self {
        Self {
            author_id: Some(author_id),
            ..Default::default()
        }
    }

    pub fn in_group(group_id: i32) -> Self {
        Self {
            group_id: Some(group_id),
            ..Default::default()
        }
    }

    pub fn by_any_author(author_ids: Vec<i32>) -> Self {
        Self {
            author_in: Some(author_ids),
            ..Default::default()
        }
    }
}

/// A slice of the newest-first post listing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}
