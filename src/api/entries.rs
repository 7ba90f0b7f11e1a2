//! Entry detail view
//!
//! - GET /{year}/{month}/{day}/{slug}/ - Read an entry
//! - POST /{year}/{month}/{day}/{slug}/ - Submit the password of a protected entry
//!
//! Entries that are not visible yet (draft, hidden, outside their publication
//! window) are only shown to the administrator, as a preview.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tera::Context as TeraContext;
use tokio::sync::OnceCell;

use crate::api::common::render;
use crate::api::middleware::{cookie_value, is_admin, AppState, ViewError};
use crate::models::Entry;
use crate::services::auth::entry_cookie_name;
use crate::services::{sign_entry_access, verify_entry_access, ArchivePeriod, TemplateParts};
use crate::theme::archive_template_names;

/// Build the entry router
pub fn router() -> Router<AppState> {
    Router::new().route("/{year}/{month}/{day}/{slug}/", get(detail).post(unlock))
}

/// Body of the password form
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub entry_password: String,
}

/// The entry addressed by a request, fetched at most once
struct EntryLookup<'a> {
    state: &'a AppState,
    day: NaiveDate,
    slug: String,
    entry: OnceCell<Option<Entry>>,
}

impl<'a> EntryLookup<'a> {
    fn new(state: &'a AppState, day: NaiveDate, slug: String) -> Self {
        Self {
            state,
            day,
            slug,
            entry: OnceCell::new(),
        }
    }

    async fn get(&self) -> Result<&Entry, ViewError> {
        let entry = self
            .entry
            .get_or_try_init(|| self.state.entries.find_for_day(self.day, &self.slug, Utc::now()))
            .await?;
        entry.as_ref().ok_or_else(|| {
            ViewError::not_found(format!("No entry found matching the query: {}", self.slug))
        })
    }
}

/// What the visitor may see of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Render the entry; `preview` when only the administrator may see it
    Granted { preview: bool },
    /// Ask for the entry password
    PasswordRequired,
}

/// Visibility, login and password checks, in that order
async fn check_access(
    state: &AppState,
    lookup: &EntryLookup<'_>,
    headers: &HeaderMap,
) -> Result<Access, ViewError> {
    let entry = lookup.get().await?;
    let admin = is_admin(state, headers);

    let visible = entry.is_visible(Utc::now());
    if !visible && !admin {
        return Err(ViewError::not_found(format!(
            "No entry found matching the query: {}",
            entry.slug
        )));
    }

    if entry.login_required && !admin {
        return Err(ViewError::Unauthorized(
            "This entry is reserved to the site administrator.".to_string(),
        ));
    }

    if entry.is_protected() {
        let unlocked = cookie_value(headers, &entry_cookie_name(entry.id)).map_or(false, |token| {
            verify_entry_access(&state.config.site.secret_key, entry.id, &entry.password, &token)
        });
        if !unlocked {
            return Ok(Access::PasswordRequired);
        }
    }

    Ok(Access::Granted { preview: !visible })
}

fn parse_day(year: &str, month: &str, day: &str) -> Result<NaiveDate, ViewError> {
    Ok(ArchivePeriod::day(year, month, day)?.start())
}

/// GET /{year}/{month}/{day}/{slug}/
async fn detail(
    State(state): State<AppState>,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Result<Html<String>, ViewError> {
    let lookup = EntryLookup::new(&state, parse_day(&year, &month, &day)?, slug);

    match check_access(&state, &lookup, &headers).await? {
        Access::PasswordRequired => render_password(&state, lookup.get().await?, None).await,
        Access::Granted { preview } => render_entry(&state, &lookup, preview).await,
    }
}

/// POST /{year}/{month}/{day}/{slug}/ - Unlock a password protected entry
async fn unlock(
    State(state): State<AppState>,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Form(form): Form<PasswordForm>,
) -> Result<Response, ViewError> {
    let lookup = EntryLookup::new(&state, parse_day(&year, &month, &day)?, slug);

    let preview = match check_access(&state, &lookup, &headers).await? {
        Access::Granted { preview } => preview,
        Access::PasswordRequired => {
            let entry = lookup.get().await?;
            if form.entry_password != entry.password {
                tracing::debug!("Wrong password submitted for entry {}", entry.id);
                return Ok(render_password(&state, entry, Some("Invalid password."))
                    .await?
                    .into_response());
            }

            let token = sign_entry_access(&state.config.site.secret_key, entry.id, &entry.password)
                .map_err(|e| ViewError::internal(format!("{:#}", e)))?;
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                entry_cookie_name(entry.id),
                token
            );
            let html = render_entry(&state, &lookup, !entry.is_visible(Utc::now())).await?;
            return Ok(([(header::SET_COOKIE, cookie)], html).into_response());
        }
    };

    Ok(render_entry(&state, &lookup, preview).await?.into_response())
}

async fn render_password(
    state: &AppState,
    entry: &Entry,
    error: Option<&str>,
) -> Result<Html<String>, ViewError> {
    let view = present_one(state, entry).await?;
    let mut context = TeraContext::new();
    context.insert("entry", &view);
    context.insert("error", &error);
    render(state, &["password.html".to_string()], &context)
}

async fn render_entry(
    state: &AppState,
    lookup: &EntryLookup<'_>,
    preview: bool,
) -> Result<Html<String>, ViewError> {
    let entry = lookup.get().await?;
    let (previous_entry, next_entry) = state.entries.previous_next(entry, Utc::now()).await?;

    let mut context = TeraContext::new();
    context.insert("entry", &present_one(state, entry).await?);
    context.insert("is_preview", &preview);
    context.insert("previous_entry", &previous_entry);
    context.insert("next_entry", &next_entry);
    insert_content(&mut context, state, &entry.content);

    render(
        state,
        &archive_template_names("entry_detail.html", &TemplateParts::for_day(lookup.day)),
        &context,
    )
}

async fn present_one(
    state: &AppState,
    entry: &Entry,
) -> Result<crate::services::EntryView, ViewError> {
    state
        .entries
        .present(vec![entry.clone()])
        .await?
        .pop()
        .ok_or_else(|| ViewError::internal("Entry could not be prepared for rendering"))
}

/// Markdown conversion of the content, with its table of contents when it
/// has headings
#[cfg(feature = "markdown")]
fn insert_content(context: &mut TeraContext, state: &AppState, content: &str) {
    let rendered = state.markdown.render(content);
    if let Some(toc) = rendered.toc_html() {
        context.insert("toc", &toc);
    }
    context.insert("html_content", &rendered.html);
}

#[cfg(not(feature = "markdown"))]
fn insert_content(_context: &mut TeraContext, _state: &AppState, _content: &str) {
    tracing::warn!("Markdown support is not compiled in, entry content is rendered as is");
}
