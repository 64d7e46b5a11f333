//! Page-based pagination and its metadata

use crate::core::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Page request; offset is `(page - 1) * limit`
///
/// A `limit` of zero disables pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationRequest {
    #[serde(default)]
    pub limit: i32,

    #[serde(default = "default_page")]
    pub page: i32,
}

fn default_page() -> i32 {
    1
}

impl Default for PaginationRequest {
    fn default() -> Self {
        Self::unpaged()
    }
}

impl PaginationRequest {
    pub fn new(page: i32, limit: i32) -> Self {
        Self { limit, page }
    }

    /// Return every record in one page
    pub fn unpaged() -> Self {
        Self { limit: 0, page: 1 }
    }

    pub fn is_paged(&self) -> bool {
        self.limit > 0
    }

    /// Offset of the first record of the page, clamped to valid values
    pub fn offset(&self) -> u64 {
        if self.limit <= 0 {
            return 0;
        }
        (self.page.max(1) as u64 - 1) * self.limit as u64
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.limit < 0 {
            return Err(StoreError::invalid_query(format!(
                "limit must be >= 0, got {}",
                self.limit
            )));
        }
        if self.page < 1 {
            return Err(StoreError::invalid_query(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        Ok(())
    }
}

/// Pagination metadata describing the returned page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationResponse {
    /// Total number of items after filters and search
    pub total_items: u64,

    /// Only set when the request was paged
    pub total_pages: Option<u64>,

    /// Only set when the request was paged
    pub current_page: Option<u64>,

    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationResponse {
    /// Compute metadata for `total_items` records under `request`
    pub fn new(request: &PaginationRequest, total_items: u64) -> Self {
        if !request.is_paged() {
            return Self {
                total_items,
                total_pages: None,
                current_page: None,
                has_next: false,
                has_prev: false,
            };
        }

        let limit = request.limit as u64;
        let page = request.page.max(1) as u64;
        let total_pages = total_items.div_ceil(limit);

        Self {
            total_items,
            total_pages: Some(total_pages),
            current_page: Some(page),
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Slice `records` to the requested page.
///
/// Pages past the end come back empty rather than failing.
pub fn paginate<T>(records: Vec<T>, request: &PaginationRequest) -> (Vec<T>, PaginationResponse) {
    let meta = PaginationResponse::new(request, records.len() as u64);
    if !request.is_paged() {
        return (records, meta);
    }

    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let page = records
        .into_iter()
        .skip(offset)
        .take(request.limit as usize)
        .collect();
    (page, meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_first_page() {
        let (page, meta) = paginate(items(23), &PaginationRequest::new(1, 10));
        assert_eq!(page.len(), 10);
        assert_eq!(page[0], 0);
        assert_eq!(meta.total_items, 23);
        assert_eq!(meta.total_pages, Some(3));
        assert_eq!(meta.current_page, Some(1));
        assert!(meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn test_last_partial_page() {
        let (page, meta) = paginate(items(23), &PaginationRequest::new(3, 10));
        assert_eq!(page, vec![20, 21, 22]);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let (page, meta) = paginate(items(23), &PaginationRequest::new(4, 10));
        assert!(page.is_empty());
        assert!(!meta.has_next);
        assert!(meta.has_prev);
        assert_eq!(meta.current_page, Some(4));
    }

    #[test]
    fn test_zero_limit_returns_everything() {
        let (page, meta) = paginate(items(23), &PaginationRequest::new(3, 0));
        assert_eq!(page.len(), 23);
        assert_eq!(meta.total_items, 23);
        assert_eq!(meta.total_pages, None);
        assert_eq!(meta.current_page, None);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn test_empty_collection() {
        let (page, meta) = paginate(Vec::<usize>::new(), &PaginationRequest::new(1, 10));
        assert!(page.is_empty());
        assert_eq!(meta.total_pages, Some(0));
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let (page, meta) = paginate(items(5), &PaginationRequest::new(i32::MAX, i32::MAX));
        assert!(page.is_empty());
        assert!(meta.has_prev);
    }

    #[test]
    fn test_validate() {
        assert!(PaginationRequest::new(1, 0).validate().is_ok());
        assert!(PaginationRequest::new(0, 10).validate().is_err());
        assert!(PaginationRequest::new(1, -1).validate().is_err());
    }
}
