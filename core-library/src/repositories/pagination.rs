//! Pagination helper types for repository queries

use serde::{Deserialize, Serialize};

/// Offset/limit pagination request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of rows to skip
    pub offset: u32,
    /// Maximum number of rows to return
    pub limit: u32,
}

impl PageRequest {
    /// Create a new page request
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(20, 10);
    /// assert_eq!(request.limit, 20);
    /// assert_eq!(request.offset, 10);
    /// ```
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { offset, limit }
    }

    /// First `limit` rows
    pub fn first(limit: u32) -> Self {
        Self::new(limit, 0)
    }

    /// Request for the page following this one
    pub fn next(&self) -> Self {
        Self::new(self.limit, self.offset.saturating_add(self.limit))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(50)
    }
}

/// Paginated response containing items and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of rows matching the query
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Create a new paginated response
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::{Page, PageRequest};
    ///
    /// let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(10, 0));
    /// assert_eq!(page.items.len(), 3);
    /// assert!(page.has_next());
    /// ```
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            offset: request.offset,
            limit: request.limit,
        }
    }

    /// Check if rows remain after this page
    pub fn has_next(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_default() {
        let request = PageRequest::default();
        assert_eq!(request.offset, 0);
        assert_eq!(request.limit, 50);
    }

    #[test]
    fn test_page_request_next() {
        let request = PageRequest::new(20, 0).next().next();
        assert_eq!(request.offset, 40);
        assert_eq!(request.limit, 20);
    }

    #[test]
    fn test_page_has_next() {
        let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(3, 0));
        assert!(page.has_next());

        let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(3, 22));
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(10, 0));
        let mapped = page.map(|x| x * 2);

        assert_eq!(mapped.items, vec![2, 4, 6]);
        assert_eq!(mapped.total, 25);
    }
}
