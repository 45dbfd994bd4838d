//! Shared query parameter types for API handlers.

use pumpflix_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use serde::Deserialize;

/// Generic pagination parameters (`?limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// `(limit, offset)` clamped to the allowed range.
    pub fn clamped(&self) -> (i64, i64) {
        (
            clamp_limit(self.limit, DEFAULT_LIMIT, MAX_LIMIT),
            clamp_offset(self.offset),
        )
    }
}

/// `?include_archived=true` on list endpoints with soft-archiving.
#[derive(Debug, Default, Deserialize)]
pub struct IncludeArchivedParams {
    #[serde(default)]
    pub include_archived: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
