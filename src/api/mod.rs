//! HTTP layer - HTML views and routing
//!
//! This module contains all the pages of the blog:
//! - Date-based archives and today's entries
//! - Entry detail, with preview, login and password protection
//! - Category list and category archives
//! - The administration of categories and entries

pub mod admin;
pub mod archives;
pub mod categories;
pub mod common;
pub mod entries;
pub mod middleware;

use axum::{middleware as axum_middleware, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use middleware::{AppState, ViewError};

/// Every page of the site, without layers
pub fn build_site_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(archives::router())
        .merge(entries::router())
        .merge(categories::router())
        .merge(admin::router(state))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    build_site_router(state.clone())
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::render_error_pages,
                )),
        )
        .with_state(state)
}

async fn not_found() -> ViewError {
    ViewError::not_found("The requested page does not exist.")
}
