//! Common view utilities and shared types
//!
//! This module contains helpers used across the archive, entry and category
//! views: query parameters, archive URLs and template rendering.

use axum::response::Html;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, ViewError};
use crate::models::PageInfo;
use crate::services::archives::{monday_of, week_number};

// ============================================================================
// Query Types
// ============================================================================

/// `?page=N` or `?page=last`
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }
}

// ============================================================================
// Archive URLs
// ============================================================================

pub fn year_url(date: NaiveDate) -> String {
    format!("/{}/", date.format("%Y"))
}

pub fn month_url(date: NaiveDate) -> String {
    format!("/{}/", date.format("%Y/%m"))
}

/// Week archive containing `date`, numbered like `%W`
pub fn week_url(date: NaiveDate) -> String {
    let monday = monday_of(date);
    format!("/{:04}/week/{:02}/", monday.year(), week_number(monday))
}

pub fn day_url(date: NaiveDate) -> String {
    format!("/{}/", date.format("%Y/%m/%d"))
}

/// A date with the archive page it points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateLink {
    pub date: NaiveDate,
    pub url: String,
}

impl DateLink {
    pub fn new(date: NaiveDate, url: fn(NaiveDate) -> String) -> Self {
        Self {
            url: url(date),
            date,
        }
    }

    pub fn all(dates: &[NaiveDate], url: fn(NaiveDate) -> String) -> Vec<Self> {
        dates.iter().map(|d| Self::new(*d, url)).collect()
    }

    pub fn maybe(date: Option<NaiveDate>, url: fn(NaiveDate) -> String) -> Option<Self> {
        date.map(|d| Self::new(d, url))
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Add the pagination variables of a list page
pub fn insert_page(context: &mut TeraContext, page: &PageInfo) {
    context.insert("page", page);
    context.insert("is_paginated", &page.is_paginated());
}

/// Render the first existing template of `candidates`
pub fn render(
    state: &AppState,
    candidates: &[String],
    context: &TeraContext,
) -> Result<Html<String>, ViewError> {
    Ok(Html(state.theme.render_first(candidates, context)?))
}
