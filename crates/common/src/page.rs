//! Pagination request and response types.

use serde::{Deserialize, Serialize};

const MAX_PER_PAGE: u32 = 100;
const DEFAULT_PER_PAGE: u32 = 20;

/// A pagination request: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub per_page: u32,
}

impl Page {
    /// Creates a page request, clamping the size into `1..=100`.
    pub fn new(number: u32, per_page: u32) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// First page with the default size.
    pub fn first() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }

    /// Number of items to skip. Widened before multiplying so a huge page
    /// number from a query string cannot overflow.
    pub fn offset(&self) -> usize {
        (u64::from(self.number - 1) * u64::from(self.per_page)) as usize
    }

    /// Page size as usize.
    pub fn limit(&self) -> usize {
        self.per_page as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first()
    }
}

/// One page of results together with the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Paginated<T> {
    /// Assembles a page of results.
    pub fn new(items: Vec<T>, page: Page, total: u64) -> Self {
        Self {
            items,
            page: page.number,
            per_page: page.per_page,
            total,
        }
    }

    /// Total number of pages.
    pub fn pages(&self) -> u64 {
        self.total.div_ceil(self.per_page as u64).max(1)
    }
}
