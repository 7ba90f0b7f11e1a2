//! Admin views
//!
//! HTML administration of the category tree and the entries, behind HTTP
//! Basic authentication of the configured administrator:
//! - GET /admin/ - Dashboard
//! - /admin/categories/ - List (`?q=` search, `?parent=` filter), add, change, delete
//! - /admin/entries/ - List (`?q=` search, `?page=`), add, change, delete
//!
//! Invalid submissions re-render the form with the errors of each field.
//! Successful ones redirect to the list.

use axum::{
    extract::{Path, Query, State},
    middleware as axum_middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::common::{insert_page, render};
use crate::api::middleware::{require_admin, AppState, ViewError};
use crate::db::repositories::CategoryFilter;
use crate::models::{Category, Entry, EntryStatus};
use crate::services::{
    CategoryForm, CategoryListItem, CategoryServiceError, EntryForm, EntryServiceError, FormData,
    FormErrors,
};
use crate::theme::escape_text;

const CATEGORY_LIST_URL: &str = "/admin/categories/";
const ENTRY_LIST_URL: &str = "/admin/entries/";

/// Build the admin router, every route requiring the administrator
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/", get(index))
        .route("/admin/categories/", get(category_list))
        .route("/admin/categories/add/", get(category_add_form).post(category_add))
        .route("/admin/categories/{id}/change/", get(category_change_form).post(category_change))
        .route("/admin/categories/{id}/delete/", get(category_delete_confirm).post(category_delete))
        .route("/admin/entries/", get(entry_list))
        .route("/admin/entries/add/", get(entry_add_form).post(entry_add))
        .route("/admin/entries/{id}/change/", get(entry_change_form).post(entry_change))
        .route("/admin/entries/{id}/delete/", get(entry_delete_confirm).post(entry_delete))
        .route_layer(axum_middleware::from_fn_with_state(state, require_admin))
}

/// Submitted form fields, repeated names kept in order
type FormPairs = Form<Vec<(String, String)>>;

/// GET /admin/
async fn index(State(state): State<AppState>) -> Result<Html<String>, ViewError> {
    let mut context = TeraContext::new();
    context.insert("category_count", &state.categories.parent_choices().await?.len());
    context.insert("entry_count", &state.entries.total().await?);
    render(&state, &["admin/index.html".to_string()], &context)
}

// ============================================================================
// Categories
// ============================================================================

/// Query parameters of the category changelist
#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    pub q: Option<String>,
    pub parent: Option<String>,
}

/// A row of the category changelist
#[derive(Debug, Serialize)]
pub struct CategoryRow {
    #[serde(flatten)]
    pub item: CategoryListItem,
    /// `/{tree_path}/`, linked to the public page of the category
    pub tree_path_link: String,
}

impl From<CategoryListItem> for CategoryRow {
    fn from(item: CategoryListItem) -> Self {
        Self {
            tree_path_link: tree_path_link(&item.tree_path, &item.url),
            item,
        }
    }
}

/// Tree path column: a link opening the category in a new window, or the
/// plain path when there is no URL to point to
pub fn tree_path_link(tree_path: &str, url: &str) -> String {
    let label = format!("/{}/", escape_text(tree_path));
    if tree_path.is_empty() || url.is_empty() {
        return label;
    }
    format!(r#"<a href="{}" target="blank">{}</a>"#, escape_text(url), label)
}

/// GET /admin/categories/
async fn category_list(
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Html<String>, ViewError> {
    let selected_parent = query.parent.as_deref().and_then(|p| p.trim().parse::<i64>().ok());
    let filter = CategoryFilter {
        search: query.q.clone(),
        parent_id: selected_parent,
    };
    let rows: Vec<CategoryRow> = state
        .categories
        .search(&filter)
        .await?
        .into_iter()
        .map(CategoryRow::from)
        .collect();

    let mut context = TeraContext::new();
    context.insert("categories", &rows);
    context.insert("query", query.q.as_deref().unwrap_or_default());
    context.insert("selected_parent", &selected_parent);
    context.insert("parent_choices", &state.categories.parent_choices().await?);
    render(&state, &["admin/category_list.html".to_string()], &context)
}

async fn render_category_form(
    state: &AppState,
    form: &CategoryForm,
    errors: &FormErrors,
    category: Option<&Category>,
) -> Result<Html<String>, ViewError> {
    let action_url = match category {
        Some(c) => format!("/admin/categories/{}/change/", c.id),
        None => "/admin/categories/add/".to_string(),
    };

    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", &errors.messages());
    context.insert("parent_choices", &state.categories.parent_choices().await?);
    context.insert("category", &category);
    context.insert("action_url", &action_url);
    render(state, &["admin/category_form.html".to_string()], &context)
}

async fn get_category(state: &AppState, id: i64) -> Result<Category, ViewError> {
    state
        .categories
        .get_by_id(id)
        .await?
        .ok_or_else(|| ViewError::not_found(format!("Category with ID \"{}\" doesn't exist.", id)))
}

/// GET /admin/categories/add/
async fn category_add_form(State(state): State<AppState>) -> Result<Html<String>, ViewError> {
    render_category_form(&state, &CategoryForm::default(), &FormErrors::new(), None).await
}

/// POST /admin/categories/add/
async fn category_add(
    State(state): State<AppState>,
    Form(pairs): FormPairs,
) -> Result<Response, ViewError> {
    let form = CategoryForm::from_data(&FormData::from(pairs));
    match state.categories.create(&form).await {
        Ok(_) => Ok(Redirect::to(CATEGORY_LIST_URL).into_response()),
        Err(CategoryServiceError::Invalid(errors)) => {
            Ok(render_category_form(&state, &form, &errors, None).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/categories/{id}/change/
async fn category_change_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ViewError> {
    let category = get_category(&state, id).await?;
    render_category_form(
        &state,
        &CategoryForm::from_category(&category),
        &FormErrors::new(),
        Some(&category),
    )
    .await
}

/// POST /admin/categories/{id}/change/
async fn category_change(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(pairs): FormPairs,
) -> Result<Response, ViewError> {
    let category = get_category(&state, id).await?;
    let form = CategoryForm::from_data(&FormData::from(pairs));
    match state.categories.update(id, &form).await {
        Ok(_) => Ok(Redirect::to(CATEGORY_LIST_URL).into_response()),
        Err(CategoryServiceError::Invalid(errors)) => Ok(render_category_form(
            &state,
            &form,
            &errors,
            Some(&category),
        )
        .await?
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/categories/{id}/delete/
async fn category_delete_confirm(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ViewError> {
    let category = get_category(&state, id).await?;
    let mut context = delete_context(
        "category",
        &category.title,
        format!("/admin/categories/{}/delete/", id),
        CATEGORY_LIST_URL,
    );
    if let Some(warning) = delete_warning(&category) {
        context.insert("warning", &warning);
    }
    render(&state, &["admin/delete_confirmation.html".to_string()], &context)
}

/// What happens to the subtree of a category about to be deleted
fn delete_warning(category: &Category) -> Option<String> {
    if category.is_leaf() {
        return None;
    }
    let count = category.descendant_count();
    let noun = if count == 1 { "subcategory" } else { "subcategories" };
    Some(format!(
        "It has {} {}. Its direct children will become top level categories.",
        count, noun
    ))
}

/// POST /admin/categories/{id}/delete/
async fn category_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, ViewError> {
    state.categories.delete(id).await?;
    Ok(Redirect::to(CATEGORY_LIST_URL))
}

// ============================================================================
// Entries
// ============================================================================

/// Query parameters of the entry changelist
#[derive(Debug, Default, Deserialize)]
pub struct EntryListQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

/// An option of the status select box
#[derive(Debug, Serialize)]
struct StatusChoice {
    value: &'static str,
    label: &'static str,
}

/// GET /admin/entries/
async fn entry_list(
    State(state): State<AppState>,
    Query(query): Query<EntryListQuery>,
) -> Result<Html<String>, ViewError> {
    let (entries, page) = state
        .entries
        .admin_list(query.q.as_deref(), query.page.as_deref())
        .await?;

    let mut context = TeraContext::new();
    context.insert("entry_list", &entries);
    context.insert("query", query.q.as_deref().unwrap_or_default());
    insert_page(&mut context, &page);
    render(&state, &["admin/entry_list.html".to_string()], &context)
}

async fn render_entry_form(
    state: &AppState,
    form: &EntryForm,
    errors: &FormErrors,
    entry: Option<&Entry>,
) -> Result<Html<String>, ViewError> {
    let action_url = match entry {
        Some(e) => format!("/admin/entries/{}/change/", e.id),
        None => "/admin/entries/add/".to_string(),
    };
    let statuses: Vec<StatusChoice> = EntryStatus::ALL
        .iter()
        .map(|s| StatusChoice {
            value: s.as_str(),
            label: s.label(),
        })
        .collect();

    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", &errors.messages());
    context.insert("category_choices", &state.entries.category_choices().await?);
    context.insert("statuses", &statuses);
    context.insert("entry", &entry);
    context.insert("action_url", &action_url);
    render(state, &["admin/entry_form.html".to_string()], &context)
}

async fn get_entry(state: &AppState, id: i64) -> Result<Entry, ViewError> {
    state
        .entries
        .get_by_id(id)
        .await?
        .ok_or_else(|| ViewError::not_found(format!("Entry with ID \"{}\" doesn't exist.", id)))
}

/// GET /admin/entries/add/
async fn entry_add_form(State(state): State<AppState>) -> Result<Html<String>, ViewError> {
    let form = EntryForm::blank(&state.entries.settings().time_zone, Utc::now());
    render_entry_form(&state, &form, &FormErrors::new(), None).await
}

/// POST /admin/entries/add/
async fn entry_add(
    State(state): State<AppState>,
    Form(pairs): FormPairs,
) -> Result<Response, ViewError> {
    let form = EntryForm::from_data(&FormData::from(pairs));
    match state.entries.create(&form).await {
        Ok(_) => Ok(Redirect::to(ENTRY_LIST_URL).into_response()),
        Err(EntryServiceError::Invalid(errors)) => {
            Ok(render_entry_form(&state, &form, &errors, None).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/entries/{id}/change/
async fn entry_change_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ViewError> {
    let entry = get_entry(&state, id).await?;
    let form = EntryForm::from_entry(&entry, &state.entries.settings().time_zone);
    render_entry_form(&state, &form, &FormErrors::new(), Some(&entry)).await
}

/// POST /admin/entries/{id}/change/
async fn entry_change(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(pairs): FormPairs,
) -> Result<Response, ViewError> {
    let entry = get_entry(&state, id).await?;
    let form = EntryForm::from_data(&FormData::from(pairs));
    match state.entries.update(id, &form).await {
        Ok(_) => Ok(Redirect::to(ENTRY_LIST_URL).into_response()),
        Err(EntryServiceError::Invalid(errors)) => Ok(render_entry_form(
            &state,
            &form,
            &errors,
            Some(&entry),
        )
        .await?
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/entries/{id}/delete/
async fn entry_delete_confirm(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ViewError> {
    let entry = get_entry(&state, id).await?;
    let context = delete_context(
        "entry",
        &entry.title,
        format!("/admin/entries/{}/delete/", id),
        ENTRY_LIST_URL,
    );
    render(&state, &["admin/delete_confirmation.html".to_string()], &context)
}

/// POST /admin/entries/{id}/delete/
async fn entry_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, ViewError> {
    state.entries.delete(id).await?;
    Ok(Redirect::to(ENTRY_LIST_URL))
}

fn delete_context(kind: &str, name: &str, action_url: String, cancel_url: &str) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("object_kind", kind);
    context.insert("object_name", name);
    context.insert("action_url", &action_url);
    context.insert("cancel_url", cancel_url);
    context
}
