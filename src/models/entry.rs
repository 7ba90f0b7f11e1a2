//! Entry model
//!
//! This module provides:
//! - `Entry`, a blog post filed under categories and published on sites
//! - `EntryStatus` for the publication state
//! - `EntryInput`, the full set of editable fields used by the admin forms

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Category;

/// Entry entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier
    pub id: i64,
    pub title: String,
    /// URL-friendly slug, unique per publication day
    pub slug: String,
    pub status: EntryStatus,
    /// Date the entry is filed under in the archives
    pub publication_date: DateTime<Utc>,
    /// Entry is hidden before this instant when set
    pub start_publication: Option<DateTime<Utc>>,
    /// Entry is hidden from this instant on when set
    pub end_publication: Option<DateTime<Utc>>,
    /// Markdown content
    pub content: String,
    pub lead: String,
    pub excerpt: String,
    /// Comma separated tags
    pub tags: String,
    /// Listed on the home page and in the archives
    pub in_home: bool,
    /// Only the administrator may read it
    pub login_required: bool,
    /// Readers must provide this password when non-empty
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Categories the entry is filed under, ordered by title
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Sites the entry is published on
    #[serde(default)]
    pub sites: Vec<i64>,
}

impl Entry {
    /// True when `now` falls inside the optional publication window
    pub fn is_actual(&self, now: DateTime<Utc>) -> bool {
        self.start_publication.map_or(true, |start| start <= now)
            && self.end_publication.map_or(true, |end| end > now)
    }

    /// Published and inside its publication window
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Published && self.is_actual(now)
    }

    pub fn is_protected(&self) -> bool {
        !self.password.is_empty()
    }

    /// Tags split on commas, trimmed, without empty items
    pub fn tags_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Publication day in the site's local time zone
    pub fn publication_day(&self, tz: &FixedOffset) -> NaiveDate {
        self.publication_date.with_timezone(tz).date_naive()
    }

    /// Public URL `/{YYYY}/{MM}/{DD}/{slug}/`
    pub fn absolute_url(&self, tz: &FixedOffset) -> String {
        format!(
            "/{}/{}/",
            self.publication_day(tz).format("%Y/%m/%d"),
            self.slug
        )
    }

    /// Lead if set, otherwise the excerpt
    pub fn summary(&self) -> &str {
        if self.lead.trim().is_empty() {
            &self.excerpt
        } else {
            &self.lead
        }
    }
}

/// Entry publication status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Work in progress, only previewable by the administrator
    #[default]
    Draft,
    /// Finished but withheld from the public site
    Hidden,
    /// Public
    Published,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 3] = [EntryStatus::Draft, EntryStatus::Hidden, EntryStatus::Published];

    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Hidden => "hidden",
            EntryStatus::Published => "published",
        }
    }

    /// Parse status from database string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(EntryStatus::Draft),
            "hidden" => Some(EntryStatus::Hidden),
            "published" => Some(EntryStatus::Published),
            _ => None,
        }
    }

    /// Human readable label for admin screens
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "Draft",
            EntryStatus::Hidden => "Hidden",
            EntryStatus::Published => "Published",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Editable fields of an entry, used both to create and to update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInput {
    pub title: String,
    pub slug: String,
    pub status: EntryStatus,
    pub publication_date: DateTime<Utc>,
    pub start_publication: Option<DateTime<Utc>>,
    pub end_publication: Option<DateTime<Utc>>,
    pub content: String,
    pub lead: String,
    pub excerpt: String,
    pub tags: String,
    pub in_home: bool,
    pub login_required: bool,
    pub password: String,
    pub category_ids: Vec<i64>,
    pub site_ids: Vec<i64>,
}

impl EntryInput {
    /// A draft with the given title and slug, published now, listed on the home page
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            status: EntryStatus::Draft,
            publication_date: Utc::now(),
            start_publication: None,
            end_publication: None,
            content: String::new(),
            lead: String::new(),
            excerpt: String::new(),
            tags: String::new(),
            in_home: true,
            login_required: false,
            password: String::new(),
            category_ids: Vec::new(),
            site_ids: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_publication_date(mut self, date: DateTime<Utc>) -> Self {
        self.publication_date = date;
        self
    }

    pub fn with_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_publication = start;
        self.end_publication = end;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_categories(mut self, category_ids: Vec<i64>) -> Self {
        self.category_ids = category_ids;
        self
    }

    pub fn with_sites(mut self, site_ids: Vec<i64>) -> Self {
        self.site_ids = site_ids;
        self
    }

    pub fn with_in_home(mut self, in_home: bool) -> Self {
        self.in_home = in_home;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_login_required(mut self, login_required: bool) -> Self {
        self.login_required = login_required;
        self
    }
}

impl From<&Entry> for EntryInput {
    fn from(entry: &Entry) -> Self {
        Self {
            title: entry.title.clone(),
            slug: entry.slug.clone(),
            status: entry.status,
            publication_date: entry.publication_date,
            start_publication: entry.start_publication,
            end_publication: entry.end_publication,
            content: entry.content.clone(),
            lead: entry.lead.clone(),
            excerpt: entry.excerpt.clone(),
            tags: entry.tags.clone(),
            in_home: entry.in_home,
            login_required: entry.login_required,
            password: entry.password.clone(),
            category_ids: entry.categories.iter().map(|c| c.id).collect(),
            site_ids: entry.sites.clone(),
        }
    }
}
