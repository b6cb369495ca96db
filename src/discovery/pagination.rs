use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Offset pagination over a known total count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginator {
    page_size: usize,
    page: usize,
    total: usize,
}

impl Paginator {
    /// A zero page size is bumped to 1.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 0,
            total: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// At least 1, so an empty result still has a (blank) first page.
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size).max(1)
    }

    /// Move to page `n`, clamped to the valid range. Returns the page landed on.
    pub fn go_to_page(&mut self, n: usize) -> usize {
        self.page = n.min(self.total_pages() - 1);
        self.page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> usize {
        self.go_to_page(self.page.saturating_sub(1))
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    /// Update the total and re-clamp the current page.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.go_to_page(self.page);
    }

    pub fn reset(&mut self) {
        self.page = 0;
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }

    /// Index range of the current page within `total` items
    pub fn range(&self) -> Range<usize> {
        let start = self.offset().min(self.total);
        let end = start.saturating_add(self.page_size).min(self.total);
        start..end
    }

    /// Slice the current page out of a full in-memory list.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset().min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }
}

/// Incrementally growing window for "load more" style browsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadMore {
    initial: usize,
    step: usize,
    loaded: usize,
}

impl LoadMore {
    pub fn new(initial: usize, step: usize) -> Self {
        Self {
            initial,
            step: step.max(1),
            loaded: initial,
        }
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// Grow the window by one step. Returns the new loaded count.
    pub fn load_more(&mut self) -> usize {
        self.loaded = self.loaded.saturating_add(self.step);
        self.loaded
    }

    pub fn has_more(&self, total: usize) -> bool {
        self.loaded < total
    }

    pub fn reset(&mut self) {
        self.loaded = self.initial;
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.loaded.min(items.len())]
    }
}
