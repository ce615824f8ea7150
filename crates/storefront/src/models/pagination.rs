//! Page arithmetic for the product listing.

/// Where the current page sits in a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based current page.
    pub current: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u64,
}

impl Pagination {
    /// Build pagination for a requested page.
    ///
    /// Missing or zero pages are treated as page 1. A zero page size is
    /// treated as 1.
    #[must_use]
    pub fn new(requested: Option<u32>, per_page: u32, total: u64) -> Self {
        Self {
            current: requested.filter(|p| *p > 0).unwrap_or(1),
            per_page: per_page.max(1),
            total,
        }
    }

    /// Rows to skip to reach the current page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.current - 1) * u64::from(self.per_page)
    }

    /// Number of the last page, `ceil(total / per_page)`. Zero when empty.
    #[must_use]
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(u64::from(self.per_page))
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.current > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.current) * u64::from(self.per_page) < self.total
    }

    #[must_use]
    pub fn previous(&self) -> u32 {
        self.current.saturating_sub(1).max(1)
    }

    #[must_use]
    pub fn next(&self) -> u32 {
        self.current.saturating_add(1)
    }

    /// Whether a separate link to page 1 is needed before the previous link.
    #[must_use]
    pub fn shows_first_link(&self) -> bool {
        self.current > 2
    }

    /// Whether a separate link to the last page is needed after the next link.
    #[must_use]
    pub fn shows_last_link(&self) -> bool {
        u64::from(self.next()) < self.last_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_of_several() {
        let page = Pagination::new(None, 2, 5);
        assert_eq!(page.current, 1);
        assert_eq!(page.offset(), 0);
        assert_eq!(page.last_page(), 3);
        assert!(!page.has_previous());
        assert!(page.has_next());
        assert_eq!(page.next(), 2);
    }

    #[test]
    fn test_last_page() {
        let page = Pagination::new(Some(3), 2, 5);
        assert_eq!(page.offset(), 4);
        assert!(page.has_previous());
        assert!(!page.has_next());
        assert_eq!(page.previous(), 2);
    }

    #[test]
    fn test_exact_multiple_has_no_extra_page() {
        let page = Pagination::new(Some(2), 2, 4);
        assert_eq!(page.last_page(), 2);
        assert!(!page.has_next());
    }

    #[test]
    fn test_zero_inputs_are_clamped() {
        let page = Pagination::new(Some(0), 0, 0);
        assert_eq!(page.current, 1);
        assert_eq!(page.per_page, 1);
        assert_eq!(page.last_page(), 0);
        assert!(!page.has_next());
    }

    #[test]
    fn test_edge_links() {
        let middle = Pagination::new(Some(3), 1, 10);
        assert!(middle.shows_first_link());
        assert!(middle.shows_last_link());

        let second = Pagination::new(Some(2), 1, 3);
        assert!(!second.shows_first_link());
        assert!(!second.shows_last_link());
    }
}
