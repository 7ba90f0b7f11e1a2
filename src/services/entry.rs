//! Entry service
//!
//! Business logic behind the public pages and the entry admin:
//! - archive listings (index, year, month, week, day) over the published
//!   entries listed on the home page, with pagination and date lists
//! - detail lookup by local publication day and slug
//! - previous/next entry links
//! - admin form cleaning, create, update, delete

use crate::config::Config;
use crate::db::repositories::{CategoryRepository, EntryFilter, EntryOrder, EntryRepository};
use crate::models::{category_url, Entry, EntryInput, EntryStatus, PageError, PageInfo, Paginator, TreeChoice};
use crate::services::archives::{distinct_days, ArchiveNavigator, ArchivePeriod};
use crate::services::category::{generate_slug, is_valid_slug, tree_paths};
use crate::services::forms::{format_local_datetime, FormData, FormErrors};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Error types for entry service operations
#[derive(Debug, thiserror::Error)]
pub enum EntryServiceError {
    /// Entry, page or period not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The submitted form did not validate
    #[error("Invalid entry: {0}")]
    Invalid(FormErrors),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<PageError> for EntryServiceError {
    fn from(err: PageError) -> Self {
        EntryServiceError::NotFound(err.to_string())
    }
}

/// Archive behavior, read from the site and blog configuration
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub site_id: i64,
    pub time_zone: FixedOffset,
    pub pagination: u32,
    pub allow_empty: bool,
    pub allow_future: bool,
}

impl ArchiveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            site_id: config.site.id,
            time_zone: config.site.time_zone(),
            pagination: u32::try_from(config.blog.pagination).unwrap_or(u32::MAX),
            allow_empty: config.blog.allow_empty,
            allow_future: config.blog.allow_future,
        }
    }

    /// Current local date
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.time_zone).date_naive()
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A category as linked from an entry
#[derive(Debug, Clone, Serialize)]
pub struct CategoryLink {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub url: String,
}

/// An entry prepared for templates
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: Entry,
    pub url: String,
    /// Publication day in the site's time zone
    pub published_on: NaiveDate,
    pub tags_list: Vec<String>,
    pub category_links: Vec<CategoryLink>,
    pub is_visible: bool,
    pub is_protected: bool,
}

/// One page of an archive
#[derive(Debug)]
pub struct ArchivePage {
    pub entries: Vec<EntryView>,
    pub page: PageInfo,
    /// Periods with entries, one level finer than the archive
    pub date_list: Vec<NaiveDate>,
    /// Absent on the index, which has no reference date
    pub navigation: Option<ArchiveNavigator>,
}

/// Fields of the entry admin form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryForm {
    pub title: String,
    pub slug: String,
    pub status: String,
    pub publication_date: String,
    pub start_publication: String,
    pub end_publication: String,
    pub content: String,
    pub lead: String,
    pub excerpt: String,
    pub tags: String,
    pub in_home: bool,
    pub login_required: bool,
    pub password: String,
    pub categories: Vec<String>,
    pub sites: Vec<String>,
}

impl EntryForm {
    pub fn from_data(data: &FormData) -> Self {
        Self {
            title: data.text("title"),
            slug: data.text("slug"),
            status: data.text("status"),
            publication_date: data.text("publication_date"),
            start_publication: data.text("start_publication"),
            end_publication: data.text("end_publication"),
            content: data.raw("content"),
            lead: data.raw("lead"),
            excerpt: data.raw("excerpt"),
            tags: data.text("tags"),
            in_home: data.checked("in_home"),
            login_required: data.checked("login_required"),
            password: data.text("password"),
            categories: data.all("categories"),
            sites: data.all("sites"),
        }
    }

    /// Initial values for a new entry
    pub fn blank(tz: &FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            status: EntryStatus::Draft.as_str().to_string(),
            publication_date: format_local_datetime(&now, tz),
            in_home: true,
            ..Self::default()
        }
    }

    /// Initial values when editing an existing entry
    pub fn from_entry(entry: &Entry, tz: &FixedOffset) -> Self {
        Self {
            title: entry.title.clone(),
            slug: entry.slug.clone(),
            status: entry.status.as_str().to_string(),
            publication_date: format_local_datetime(&entry.publication_date, tz),
            start_publication: entry
                .start_publication
                .map(|d| format_local_datetime(&d, tz))
                .unwrap_or_default(),
            end_publication: entry
                .end_publication
                .map(|d| format_local_datetime(&d, tz))
                .unwrap_or_default(),
            content: entry.content.clone(),
            lead: entry.lead.clone(),
            excerpt: entry.excerpt.clone(),
            tags: entry.tags.clone(),
            in_home: entry.in_home,
            login_required: entry.login_required,
            password: entry.password.clone(),
            categories: entry.categories.iter().map(|c| c.id.to_string()).collect(),
            sites: entry.sites.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn data(&self) -> FormData {
        let mut pairs = vec![
            ("publication_date".to_string(), self.publication_date.clone()),
            ("start_publication".to_string(), self.start_publication.clone()),
            ("end_publication".to_string(), self.end_publication.clone()),
        ];
        pairs.extend(self.categories.iter().map(|c| ("categories".to_string(), c.clone())));
        pairs.extend(self.sites.iter().map(|s| ("sites".to_string(), s.clone())));
        FormData::new(pairs)
    }
}

/// Entry service
pub struct EntryService {
    repo: Arc<dyn EntryRepository>,
    categories: Arc<dyn CategoryRepository>,
    settings: ArchiveSettings,
}

impl EntryService {
    pub fn new(
        repo: Arc<dyn EntryRepository>,
        categories: Arc<dyn CategoryRepository>,
        settings: ArchiveSettings,
    ) -> Self {
        Self {
            repo,
            categories,
            settings,
        }
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    /// Published entries listed on the home page, minus future ones when
    /// they are not allowed
    fn archive_filter(&self, now: DateTime<Utc>) -> EntryFilter {
        let filter = EntryFilter::published_and_inhome(self.settings.site_id, now);
        if self.settings.allow_future {
            filter
        } else {
            filter.not_after(now)
        }
    }

    /// Local days holding archive entries, ascending
    pub async fn archive_days(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, EntryServiceError> {
        let dates = self
            .repo
            .publication_dates(&self.archive_filter(now))
            .await
            .context("Failed to list publication dates")?;
        Ok(distinct_days(&dates, &self.settings.time_zone))
    }

    /// Latest entries, newest first; `date_list` holds the years with entries, newest first
    pub async fn archive_index(
        &self,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ArchivePage, EntryServiceError> {
        let filter = self.archive_filter(now);
        let (entries, page) = self.paginate(&filter, page).await?;

        let mut date_list = crate::services::archives::date_list(
            &self.archive_days(now).await?,
            crate::services::archives::DateKind::Year,
        );
        date_list.reverse();

        Ok(ArchivePage {
            entries,
            page,
            date_list,
            navigation: None,
        })
    }

    /// Entries of a year, month, week or day, oldest period granularity in `date_list`
    pub async fn archive_period(
        &self,
        period: ArchivePeriod,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ArchivePage, EntryServiceError> {
        use crate::services::archives::{date_list, DateKind};

        if !self.settings.allow_future && period.start() > self.settings.today(now) {
            return Err(EntryServiceError::NotFound(format!(
                "Future {:?} not available because allow_future is False.",
                period
            )));
        }

        let (start, end) = period.utc_range(&self.settings.time_zone);
        let filter = self.archive_filter(now).between(Some(start), Some(end));
        let (entries, page) = self.paginate(&filter, page).await?;

        let days = self.archive_days(now).await?;
        let in_period: Vec<NaiveDate> = days
            .iter()
            .copied()
            .filter(|d| *d >= period.start() && *d < period.end())
            .collect();
        let dates = match period {
            ArchivePeriod::Year(_) => date_list(&in_period, DateKind::Month),
            _ => date_list(&in_period, DateKind::Day),
        };

        Ok(ArchivePage {
            entries,
            page,
            date_list: dates,
            navigation: Some(ArchiveNavigator::new(period.start(), days)),
        })
    }

    async fn paginate(
        &self,
        filter: &EntryFilter,
        page: Option<&str>,
    ) -> Result<(Vec<EntryView>, PageInfo), EntryServiceError> {
        let total = self.repo.count(filter).await.context("Failed to count entries")?;
        if total == 0 && !self.settings.allow_empty {
            return Err(EntryServiceError::NotFound("No entries available".to_string()));
        }

        let paginator = Paginator::new(total, self.settings.pagination);
        let number = paginator.resolve(page)?;
        let entries = self
            .repo
            .find(filter, EntryOrder::PublicationDesc, paginator.offset(number), paginator.limit())
            .await
            .context("Failed to list entries")?;

        Ok((self.present(entries).await?, PageInfo::new(&paginator, number)))
    }

    /// Published entries of a category, paginated
    pub async fn category_entries(
        &self,
        category_id: i64,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<EntryView>, PageInfo), EntryServiceError> {
        let filter = EntryFilter::published(self.settings.site_id, now).in_category(category_id);
        let total = self.repo.count(&filter).await.context("Failed to count entries")?;
        let paginator = Paginator::new(total, self.settings.pagination);
        let number = paginator.resolve(page)?;
        let entries = self
            .repo
            .find(&filter, EntryOrder::PublicationDesc, paginator.offset(number), paginator.limit())
            .await
            .context("Failed to list category entries")?;
        Ok((self.present(entries).await?, PageInfo::new(&paginator, number)))
    }

    /// The on-site entry with `slug` published on the local day `day`,
    /// whatever its status. Entries dated after `now` are not found unless
    /// `allow_future` is set.
    pub async fn find_for_day(
        &self,
        day: NaiveDate,
        slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Entry>, EntryServiceError> {
        let (start, end) = ArchivePeriod::Day(day).utc_range(&self.settings.time_zone);
        let mut filter = EntryFilter::on_site(self.settings.site_id)
            .between(Some(start), Some(end))
            .with_slug(slug);
        if !self.settings.allow_future {
            filter = filter.not_after(now);
        }
        Ok(self
            .repo
            .find_first(&filter, EntryOrder::PublicationDesc)
            .await
            .context("Failed to get entry by date and slug")?)
    }

    /// Published entries right before and after `entry` in publication order
    pub async fn previous_next(
        &self,
        entry: &Entry,
        now: DateTime<Utc>,
    ) -> Result<(Option<EntryView>, Option<EntryView>), EntryServiceError> {
        let published = EntryFilter::published(self.settings.site_id, now);
        let previous = self
            .repo
            .find_first(
                &published.clone().before(entry.publication_date, entry.id),
                EntryOrder::PublicationDesc,
            )
            .await
            .context("Failed to get previous entry")?;
        let next = self
            .repo
            .find_first(
                &published.after(entry.publication_date, entry.id),
                EntryOrder::PublicationAsc,
            )
            .await
            .context("Failed to get next entry")?;

        let mut views = self.present(previous.into_iter().chain(next.iter().cloned()).collect()).await?;
        let next_view = if next.is_some() { views.pop() } else { None };
        Ok((views.pop(), next_view))
    }

    /// Attach URLs, tags and category links for templates
    pub async fn present(&self, entries: Vec<Entry>) -> Result<Vec<EntryView>, EntryServiceError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let all = self.categories.list().await.context("Failed to list categories")?;
        let paths = tree_paths(&all);
        let now = Utc::now();
        let tz = self.settings.time_zone;

        Ok(entries
            .into_iter()
            .map(|entry| EntryView {
                url: entry.absolute_url(&tz),
                published_on: entry.publication_day(&tz),
                tags_list: entry.tags_list(),
                category_links: entry
                    .categories
                    .iter()
                    .map(|c| CategoryLink {
                        id: c.id,
                        title: c.title.clone(),
                        slug: c.slug.clone(),
                        url: category_url(paths.get(&c.id).map(String::as_str).unwrap_or(&c.slug)),
                    })
                    .collect(),
                is_visible: entry.is_visible(now),
                is_protected: entry.is_protected(),
                entry,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Entry>, EntryServiceError> {
        Ok(self.repo.get_by_id(id).await.context("Failed to get entry by ID")?)
    }

    /// Number of entries, whatever their status or site
    pub async fn total(&self) -> Result<i64, EntryServiceError> {
        Ok(self
            .repo
            .count(&EntryFilter::default())
            .await
            .context("Failed to count entries")?)
    }

    /// Admin changelist, newest first, optionally searched in title and content
    pub async fn admin_list(
        &self,
        search: Option<&str>,
        page: Option<&str>,
    ) -> Result<(Vec<EntryView>, PageInfo), EntryServiceError> {
        let mut filter = EntryFilter::default();
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            filter = filter.matching(term);
        }
        let total = self.repo.count(&filter).await.context("Failed to count entries")?;
        let paginator = Paginator::new(total, 50);
        let number = paginator.resolve(page)?;
        let entries = self
            .repo
            .find(&filter, EntryOrder::PublicationDesc, paginator.offset(number), paginator.limit())
            .await
            .context("Failed to list entries")?;
        Ok((self.present(entries).await?, PageInfo::new(&paginator, number)))
    }

    /// Category options of the entry form, indented by depth
    pub async fn category_choices(&self) -> Result<Vec<TreeChoice>, EntryServiceError> {
        let categories = self.categories.list().await.context("Failed to list categories")?;
        Ok(categories.iter().map(TreeChoice::from_category).collect())
    }

    /// Validate a submitted form. `instance_id` is the entry being edited.
    pub async fn clean(
        &self,
        form: &EntryForm,
        instance_id: Option<i64>,
    ) -> Result<EntryInput, EntryServiceError> {
        let mut errors = FormErrors::new();
        let tz = self.settings.time_zone;
        let data = form.data();

        let title = form.title.trim().to_string();
        if title.is_empty() {
            errors.required("title");
        }

        let slug = if form.slug.trim().is_empty() {
            generate_slug(&title)
        } else {
            form.slug.trim().to_string()
        };
        if slug.is_empty() {
            if !title.is_empty() {
                errors.required("slug");
            }
        } else if !is_valid_slug(&slug) {
            errors.add(
                "slug",
                "invalid",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
            );
        }

        let status = match form.status.trim() {
            "" => EntryStatus::Draft,
            raw => EntryStatus::parse(raw).unwrap_or_else(|| {
                errors.add(
                    "status",
                    "invalid_choice",
                    format!("Select a valid choice. {} is not one of the available choices.", raw),
                );
                EntryStatus::Draft
            }),
        };

        let publication_date = data.datetime("publication_date", &tz, &mut errors);
        if form.publication_date.trim().is_empty() {
            errors.required("publication_date");
        }
        let start_publication = data.datetime("start_publication", &tz, &mut errors);
        let end_publication = data.datetime("end_publication", &tz, &mut errors);
        if let (Some(start), Some(end)) = (start_publication, end_publication) {
            if end <= start {
                errors.add(
                    "end_publication",
                    "invalid_window",
                    "End publication must be after start publication.",
                );
            }
        }

        let category_ids = data.ids("categories", &mut errors);
        if !category_ids.is_empty() {
            let known: Vec<i64> = self
                .categories
                .list()
                .await
                .context("Failed to list categories")?
                .iter()
                .map(|c| c.id)
                .collect();
            for id in &category_ids {
                if !known.contains(id) {
                    errors.add(
                        "categories",
                        "invalid_choice",
                        format!("Select a valid choice. {} is not one of the available choices.", id),
                    );
                }
            }
        }

        let mut site_ids = data.ids("sites", &mut errors);
        if site_ids.is_empty() {
            site_ids.push(self.settings.site_id);
        }

        if let (Some(date), false) = (publication_date, slug.is_empty()) {
            let day = date.with_timezone(&tz).date_naive();
            let (start, end) = ArchivePeriod::Day(day).utc_range(&tz);
            let mut filter = EntryFilter::default()
                .between(Some(start), Some(end))
                .with_slug(slug.clone());
            if let Some(id) = instance_id {
                filter = filter.excluding(id);
            }
            if self.repo.count(&filter).await.context("Failed to check slug uniqueness")? > 0 {
                errors.add(
                    "slug",
                    "unique_for_date",
                    "Slug must be unique for Publication date date.",
                );
            }
        }

        let Some(publication_date) = publication_date else {
            return Err(EntryServiceError::Invalid(errors));
        };
        if !errors.is_empty() {
            return Err(EntryServiceError::Invalid(errors));
        }

        Ok(EntryInput {
            title,
            slug,
            status,
            publication_date,
            start_publication,
            end_publication,
            content: form.content.clone(),
            lead: form.lead.clone(),
            excerpt: form.excerpt.clone(),
            tags: form.tags.trim().to_string(),
            in_home: form.in_home,
            login_required: form.login_required,
            password: form.password.clone(),
            category_ids,
            site_ids,
        })
    }

    pub async fn create(&self, form: &EntryForm) -> Result<Entry, EntryServiceError> {
        let input = self.clean(form, None).await?;
        let created = self.repo.create(&input).await.context("Failed to create entry")?;
        tracing::info!("Created entry '{}' ({})", created.title, created.id);
        Ok(created)
    }

    pub async fn update(&self, id: i64, form: &EntryForm) -> Result<Entry, EntryServiceError> {
        if self.get_by_id(id).await?.is_none() {
            return Err(EntryServiceError::NotFound(id.to_string()));
        }
        let input = self.clean(form, Some(id)).await?;
        let updated = self.repo.update(id, &input).await.context("Failed to update entry")?;
        tracing::info!("Updated entry '{}' ({})", updated.title, updated.id);
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), EntryServiceError> {
        if self.get_by_id(id).await?.is_none() {
            return Err(EntryServiceError::NotFound(id.to_string()));
        }
        self.repo.delete(id).await.context("Failed to delete entry")?;
        tracing::info!("Deleted entry {}", id);
        Ok(())
    }
}
