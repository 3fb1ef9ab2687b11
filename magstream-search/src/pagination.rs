//! Page arithmetic over a complete result list.

use crate::types::{SearchPage, SearchResult};

/// Page used when the client does not ask for one.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when the client does not ask for one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Requested page and page size, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    /// Results per page
    pub limit: u32,
}

impl PageRequest {
    /// Applies defaults and clamps zero values to 1.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).max(1),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Cuts `results` down to the requested page.
///
/// Pages past the last one come back with an empty result list and the
/// real totals.
pub fn paginate(results: Vec<SearchResult>, request: PageRequest) -> SearchPage {
    let total_results = results.len();
    let per_page = request.limit as usize;
    let total_pages = total_results.div_ceil(per_page);
    let offset = (request.page as usize - 1).saturating_mul(per_page);

    SearchPage {
        total_results,
        current_page: request.page,
        per_page: request.limit,
        total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        results: results.into_iter().skip(offset).take(per_page).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(count: usize) -> Vec<SearchResult> {
        (0..count)
            .map(|i| SearchResult {
                name: format!("result {i}"),
                size: 1024,
                seeders: 1,
                leechers: 0,
                magnet: format!("magnet:?xt=urn:btih:{i:040x}"),
            })
            .collect()
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        assert_eq!(PageRequest::default(), PageRequest { page: 1, limit: 10 });
        assert_eq!(
            PageRequest::new(Some(0), Some(0)),
            PageRequest { page: 1, limit: 1 }
        );
        assert_eq!(
            PageRequest::new(Some(3), Some(25)),
            PageRequest { page: 3, limit: 25 }
        );
    }

    #[test]
    fn test_paginate_middle_page() {
        let page = paginate(results(25), PageRequest::new(Some(2), Some(10)));
        assert_eq!(page.total_results, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.per_page, 10);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.results[0].name, "result 10");
    }

    #[test]
    fn test_paginate_last_partial_page() {
        let page = paginate(results(25), PageRequest::new(Some(3), Some(10)));
        assert_eq!(page.results.len(), 5);
        assert_eq!(page.results[4].name, "result 24");
    }

    #[test]
    fn test_paginate_past_end_is_empty() {
        let page = paginate(results(5), PageRequest::new(Some(4), Some(10)));
        assert_eq!(page.total_results, 5);
        assert_eq!(page.total_pages, 1);
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_paginate_no_results() {
        let page = paginate(Vec::new(), PageRequest::default());
        assert_eq!(page.total_pages, 0);
        assert!(page.results.is_empty());
    }
}
