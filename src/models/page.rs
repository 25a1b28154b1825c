use serde::{Deserialize, Serialize};

/// One page of a backend collection (Spring `Page` shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub page_number: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            content: Vec::new(),
            total_elements: 0,
            total_pages: 0,
            page_number: 0,
            page_size: 0,
            first: true,
            last: true,
        }
    }

    /// Wraps a direct lookup result as a one-element page
    pub fn single(item: T) -> Self {
        Self {
            content: vec![item],
            total_elements: 1,
            total_pages: 1,
            page_number: 0,
            page_size: 1,
            first: true,
            last: true,
        }
    }
}

/// Operator-facing 1-based page position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub current: u64,
    pub total_pages: u64,
}

impl PageWindow {
    pub fn new(current: u64, total_elements: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_elements.div_ceil(page_size)
        };
        Self {
            current: current.max(1),
            total_pages,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.current > 1
    }

    pub fn has_next(&self) -> bool {
        self.current < self.total_pages
    }

    pub fn prev(&self) -> u64 {
        self.current.saturating_sub(1).max(1)
    }

    pub fn next(&self) -> u64 {
        (self.current + 1).min(self.total_pages.max(1))
    }

    /// Shown as "1 of 1" even for an empty result
    pub fn display_total(&self) -> u64 {
        self.total_pages.max(1)
    }
}

/// Converts a 1-based UI page into the backend's 0-based index
pub fn backend_index(page: u64) -> u64 {
    page.max(1) - 1
}
