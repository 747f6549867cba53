//! Pagination — request normalization and the paginated response envelope.
//!
//! One normalization policy applies to every paginated read: `page` is
//! clamped to at least 1, `limit` to the closed range `[1, 100]`. From the
//! normalized pair and a total count the envelope derives `totalPages`,
//! `hasNext`, and `hasPrevious`; nothing here is ever persisted.

use serde::Serialize;

use crate::history::PageWindow;

/// Page number used when the caller supplies none.
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when the caller supplies none.
pub const DEFAULT_LIMIT: u64 = 10;

/// Hard upper bound on page size.
pub const MAX_LIMIT: u64 = 100;

/// A normalized `(page, limit)` pair.
///
/// Constructing one through [`PageRequest::new`] is the only way to obtain
/// it, so downstream code can rely on the clamps having been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl PageRequest {
    /// Normalizes raw pagination input, defaulting absent values.
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        let page = page.unwrap_or(DEFAULT_PAGE).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Self { page, limit }
    }

    /// The 1-based page number, always >= 1.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// The page size, always in `[1, 100]`.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The offset/count slice a store should apply for this request.
    pub fn window(&self) -> PageWindow {
        let offset = (self.page - 1).saturating_mul(self.limit);
        PageWindow {
            offset: usize::try_from(offset).unwrap_or(usize::MAX),
            limit: self.limit as usize,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A request-scoped page of results plus derived navigation metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Paginated<T> {
    /// Assembles the envelope from a page of data, the normalized request
    /// that produced it, and the total number of matching records.
    pub fn assemble(data: Vec<T>, request: PageRequest, total: u64) -> Self {
        let total_pages = total.div_ceil(request.limit);
        Self {
            data,
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
            has_next: request.page < total_pages,
            has_previous: request.page > 1,
        }
    }
}
