//! Date-based archive views
//!
//! - GET / - Latest entries
//! - GET /today/ - Entries of the current local day
//! - GET /{year}/ - Entries of a year
//! - GET /{year}/week/{week}/ - Entries of a `%W` week
//! - GET /{year}/{month}/ - Entries of a month
//! - GET /{year}/{month}/{day}/ - Entries of a day

use axum::{
    extract::{Path, Query, State},
    response::Html,
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use tera::Context as TeraContext;

use crate::api::common::{
    day_url, insert_page, month_url, render, week_url, year_url, DateLink, PageQuery,
};
use crate::api::middleware::{AppState, ViewError};
use crate::services::{ArchivePage, ArchivePeriod, TemplateParts};
use crate::theme::archive_template_names;

/// Build the archives router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/today/", get(today))
        .route("/{year}/", get(year))
        .route("/{year}/week/{week}/", get(week))
        .route("/{year}/{month}/", get(month))
        .route("/{year}/{month}/{day}/", get(day))
}

/// Variables shared by every archive page
fn archive_context(archive: &ArchivePage, date_url: fn(chrono::NaiveDate) -> String) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("entry_list", &archive.entries);
    context.insert("date_list", &DateLink::all(&archive.date_list, date_url));
    insert_page(&mut context, &archive.page);
    context
}

/// GET / - Latest entries with the years holding entries
async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let archive = state.entries.archive_index(query.page(), Utc::now()).await?;
    let context = archive_context(&archive, year_url);

    render(
        &state,
        &archive_template_names("entry_archive.html", &TemplateParts::default()),
        &context,
    )
}

/// GET /{year}/
async fn year(
    State(state): State<AppState>,
    Path(year): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let period = ArchivePeriod::year(&year)?;
    let archive = state
        .entries
        .archive_period(period, query.page(), Utc::now())
        .await?;

    let mut context = archive_context(&archive, month_url);
    context.insert("year", &period.start().format("%Y").to_string());
    if let Some(nav) = &archive.navigation {
        context.insert("previous_year", &DateLink::maybe(nav.previous_year(), year_url));
        context.insert("next_year", &DateLink::maybe(nav.next_year(), year_url));
    }

    render(
        &state,
        &archive_template_names("entry_archive_year.html", &period.template_parts()),
        &context,
    )
}

/// GET /{year}/{month}/
async fn month(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let period = ArchivePeriod::month(&year, &month)?;
    let archive = state
        .entries
        .archive_period(period, query.page(), Utc::now())
        .await?;

    let mut context = archive_context(&archive, day_url);
    context.insert("month", &period.start());
    if let Some(nav) = &archive.navigation {
        context.insert("previous_month", &DateLink::maybe(nav.previous_month(), month_url));
        context.insert("next_month", &DateLink::maybe(nav.next_month(), month_url));
    }

    render(
        &state,
        &archive_template_names("entry_archive_month.html", &period.template_parts()),
        &context,
    )
}

/// GET /{year}/week/{week}/
async fn week(
    State(state): State<AppState>,
    Path((year, week)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let period = ArchivePeriod::week(&year, &week)?;
    let archive = state
        .entries
        .archive_period(period, query.page(), Utc::now())
        .await?;

    let mut context = archive_context(&archive, day_url);
    context.insert("week", &period.start());
    context.insert("week_end_day", &(period.start() + Duration::days(6)));
    if let Some(nav) = &archive.navigation {
        context.insert("previous_week", &DateLink::maybe(nav.previous_week(), week_url));
        context.insert("next_week", &DateLink::maybe(nav.next_week(), week_url));
    }

    render(
        &state,
        &archive_template_names("entry_archive_week.html", &period.template_parts()),
        &context,
    )
}

/// GET /{year}/{month}/{day}/
async fn day(
    State(state): State<AppState>,
    Path((year, month, day)): Path<(String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let period = ArchivePeriod::day(&year, &month, &day)?;
    day_archive(&state, period, query.page(), "entry_archive_day.html").await
}

/// GET /today/ - The day archive of the current local date
async fn today(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let period = ArchivePeriod::Day(state.entries.settings().today(Utc::now()));
    day_archive(&state, period, query.page(), "entry_archive_today.html").await
}

async fn day_archive(
    state: &AppState,
    period: ArchivePeriod,
    page: Option<&str>,
    template: &str,
) -> Result<Html<String>, ViewError> {
    let archive = state.entries.archive_period(period, page, Utc::now()).await?;

    let mut context = archive_context(&archive, day_url);
    context.insert("day", &period.start());
    if let Some(nav) = &archive.navigation {
        context.insert("previous_day", &DateLink::maybe(nav.previous_day(), day_url));
        context.insert("next_day", &DateLink::maybe(nav.next_day(), day_url));
        context.insert("previous_month", &DateLink::maybe(nav.previous_month(), month_url));
        context.insert("next_month", &DateLink::maybe(nav.next_month(), month_url));
    }

    render(
        state,
        &archive_template_names(template, &period.template_parts()),
        &context,
    )
}
