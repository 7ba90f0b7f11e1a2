//! Category views
//!
//! - GET /categories/ - Category tree with published entry counts
//! - GET /categories/{tree_path}/ - Published entries of a category

use axum::{
    extract::{Path, Query, State},
    response::Html,
    routing::get,
    Router,
};
use chrono::Utc;
use tera::Context as TeraContext;

use crate::api::common::{insert_page, render, PageQuery};
use crate::api::middleware::{AppState, ViewError};
use crate::db::repositories::EntryFilter;
use crate::theme::category_template_names;

/// Build the categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories/", get(category_list))
        .route("/categories/{*tree_path}", get(category_detail))
}

/// GET /categories/
async fn category_list(State(state): State<AppState>) -> Result<Html<String>, ViewError> {
    let filter = EntryFilter::published(state.config.site.id, Utc::now());
    let categories = state.categories.list_with_counts(&filter).await?;

    let mut context = TeraContext::new();
    context.insert("categories", &categories);
    render(&state, &["category_list.html".to_string()], &context)
}

/// GET /categories/{tree_path}/
///
/// Only the last segment of the path identifies the category.
async fn category_detail(
    State(state): State<AppState>,
    Path(tree_path): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let category = state.categories.get_by_tree_path(&tree_path).await?;
    let (entries, page) = state
        .entries
        .category_entries(category.id, query.page(), Utc::now())
        .await?;

    let mut context = TeraContext::new();
    context.insert("tree_path", &state.categories.tree_path(&category).await?);
    context.insert("category", &category);
    context.insert("entry_list", &entries);
    insert_page(&mut context, &page);

    render(
        &state,
        &category_template_names("category_detail.html", &category.slug),
        &context,
    )
}
