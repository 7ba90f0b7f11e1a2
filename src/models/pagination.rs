//! Page-number pagination for list views

use serde::Serialize;

/// Why a requested page could not be served
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("Page is not 'last', nor can it be converted to an int.")]
    NotAnInteger,
    #[error("Invalid page ({0}): That page contains no results")]
    Empty(u32),
}

/// Splits `total` items into pages of `per_page`.
///
/// An empty list still has a single (empty) first page.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    pub total: i64,
    pub per_page: u32,
}

impl Paginator {
    pub fn new(total: i64, per_page: u32) -> Self {
        Self {
            total: total.max(0),
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self) -> u32 {
        let per_page = i64::from(self.per_page);
        (((self.total + per_page - 1) / per_page) as u32).max(1)
    }

    /// Resolve the raw `page` query value. Missing means the first page,
    /// `last` means the final one.
    pub fn resolve(&self, raw: Option<&str>) -> Result<u32, PageError> {
        let number = match raw.map(str::trim) {
            None | Some("") => 1,
            Some("last") => self.num_pages(),
            Some(value) => value.parse::<u32>().map_err(|_| PageError::NotAnInteger)?,
        };
        if number == 0 || number > self.num_pages() {
            return Err(PageError::Empty(number));
        }
        Ok(number)
    }

    pub fn offset(&self, page: u32) -> i64 {
        i64::from(page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// A resolved page, as exposed to templates
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub number: u32,
    pub num_pages: u32,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<u32>,
    pub previous_page_number: Option<u32>,
    /// 1-based index of the first item on this page
    pub start_index: i64,
}

impl PageInfo {
    pub fn new(paginator: &Paginator, number: u32) -> Self {
        let num_pages = paginator.num_pages();
        let has_next = number < num_pages;
        let has_previous = number > 1;
        Self {
            number,
            num_pages,
            count: paginator.total,
            has_next,
            has_previous,
            next_page_number: has_next.then(|| number + 1),
            previous_page_number: has_previous.then(|| number - 1),
            start_index: if paginator.total == 0 {
                0
            } else {
                paginator.offset(number) + 1
            },
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}
