//! Pagination requests and result pages.
//!
//! Pagination is computed, not cursor based: a [`PageRequest`] resolves into a
//! [`PageWindow`] (limit and skip) that is sent with each query, so no server-side
//! cursor outlives a call.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use doccol::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<i64>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<i64>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<i64>,
    previous_page: Option<i64>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<i64>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<i64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// A request for one page of a query.
///
/// Pages are 1-indexed. The limit override replaces the client's configured page size
/// for this request only.
///
/// # Example
///
/// ```ignore
/// use doccol::page::PageRequest;
///
/// let request = PageRequest::new(3).with_limit(20);
/// let window = request.resolve(100)?;
///
/// assert_eq!(window.limit, 20);
/// assert_eq!(window.skip, 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// The page number (1-indexed).
    pub page: i64,
    /// Overrides the configured page size when set.
    pub limit: Option<u64>,
    /// Compares strings in the filter with the case-insensitive collation.
    pub case_insensitive: bool,
}

impl PageRequest {
    /// Requests the given page with the configured page size.
    pub fn new(page: i64) -> Self {
        Self {
            page,
            limit: None,
            case_insensitive: false,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    /// Resolves this request into a concrete limit and skip.
    ///
    /// The effective limit is the override if present, otherwise `default_page_size`.
    /// The skip is always `(page - 1) * effective_limit`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPage`] when `page < 1`, and
    /// [`DocumentStoreError::Store`] if the skip does not fit in 64 bits.
    pub fn resolve(&self, default_page_size: u64) -> DocumentStoreResult<PageWindow> {
        if self.page < 1 {
            return Err(DocumentStoreError::InvalidPage(self.page));
        }

        let limit = self.limit.unwrap_or(default_page_size);
        let skip = (self.page as u64 - 1)
            .checked_mul(limit)
            .ok_or_else(|| DocumentStoreError::Store(format!(
                "page {} with limit {} skips past the addressable range",
                self.page, limit
            )))?;

        Ok(PageWindow { page: self.page, limit, skip })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1)
    }
}

/// The limit/skip pair a [`PageRequest`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// The page number this window was computed for.
    pub page: i64,
    /// Maximum number of documents to return.
    pub limit: u64,
    /// Number of matching documents to skip.
    pub skip: u64,
}

impl PageWindow {
    /// Wraps the fetched items in a [`Page`] with navigation metadata.
    ///
    /// `count` is the total number of documents matching the query.
    pub fn into_page<T>(self, items: Vec<T>, count: u64) -> Page<T> {
        let end = self.skip.saturating_add(items.len() as u64);

        Page::builder(items)
            .with_count(count)
            .with_next_page(if end < count { Some(self.page + 1) } else { None })
            .with_previous_page(if self.page > 1 { Some(self.page - 1) } else { None })
            .build()
    }
}
