//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ViewError` and the middleware turning it into a themed error page
//! - HTTP Basic authentication of the site administrator

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{SqlxCategoryRepository, SqlxEntryRepository};
use crate::db::DynDatabasePool;
use crate::services::{
    authenticate_admin, ArchiveSettings, BasicCredentials, CategoryService, CategoryServiceError,
    EntryService, EntryServiceError, PeriodError,
};
#[cfg(feature = "markdown")]
use crate::services::MarkdownRenderer;
use crate::theme::{ThemeEngine, ThemeError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub entries: Arc<EntryService>,
    pub categories: Arc<CategoryService>,
    pub theme: Arc<ThemeEngine>,
    #[cfg(feature = "markdown")]
    pub markdown: Arc<MarkdownRenderer>,
}

impl AppState {
    /// Wire repositories, services and the theme engine on top of `pool`
    pub fn new(config: Config, pool: DynDatabasePool) -> anyhow::Result<Self> {
        let theme = ThemeEngine::from_config(&config)?;
        Ok(Self::with_theme(config, pool, theme))
    }

    /// Same as `new` with an already built theme engine
    pub fn with_theme(config: Config, pool: DynDatabasePool, theme: ThemeEngine) -> Self {
        let entry_repo = SqlxEntryRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool);

        let entries = EntryService::new(
            entry_repo.clone(),
            category_repo.clone(),
            ArchiveSettings::from_config(&config),
        );
        let categories = CategoryService::new(category_repo, entry_repo);

        #[cfg(feature = "markdown")]
        let markdown = MarkdownRenderer::with_extensions(&config.blog.markdown_extensions);

        Self {
            config: Arc::new(config),
            entries: Arc::new(entries),
            categories: Arc::new(categories),
            theme: Arc::new(theme),
            #[cfg(feature = "markdown")]
            markdown: Arc::new(markdown),
        }
    }
}

/// Error returned by the HTML views
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The administrator must authenticate first
    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ViewError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ViewError::NotFound(_) => StatusCode::NOT_FOUND,
            ViewError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ViewError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ViewError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Theme template rendering the error page
    pub fn template(&self) -> &'static str {
        match self {
            ViewError::NotFound(_) => "404.html",
            ViewError::BadRequest(_) => "400.html",
            ViewError::Unauthorized(_) => "login.html",
            ViewError::Internal(_) => "500.html",
        }
    }
}

/// Marker left on error responses, replaced by a themed page in
/// `render_error_pages`
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub template: &'static str,
    pub message: String,
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ViewError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "An error occurred while rendering this page.".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, message.clone()).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="Marigold administration", charset="UTF-8""#),
            );
        }
        response.extensions_mut().insert(ErrorPage {
            template: self.template(),
            message,
        });
        response
    }
}

impl From<EntryServiceError> for ViewError {
    fn from(err: EntryServiceError) -> Self {
        match err {
            EntryServiceError::NotFound(message) => ViewError::NotFound(message),
            EntryServiceError::Invalid(errors) => ViewError::BadRequest(errors.to_string()),
            EntryServiceError::InternalError(e) => ViewError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<CategoryServiceError> for ViewError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(message) => {
                ViewError::NotFound(format!("Category not found: {}", message))
            }
            CategoryServiceError::Invalid(errors) => ViewError::BadRequest(errors.to_string()),
            CategoryServiceError::InternalError(e) => ViewError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<PeriodError> for ViewError {
    fn from(err: PeriodError) -> Self {
        ViewError::NotFound(err.to_string())
    }
}

impl From<ThemeError> for ViewError {
    fn from(err: ThemeError) -> Self {
        ViewError::Internal(err.to_string())
    }
}

/// Replace the body of `ViewError` responses by the theme's error page
pub async fn render_error_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    let html = state
        .theme
        .render_error(page.template, parts.status.as_u16(), &page.message);
    parts.extensions.remove::<ErrorPage>();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Response::from_parts(parts, Body::from(html))
}

/// True when the request carries the administrator's Basic credentials
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(BasicCredentials::parse)
        .map_or(false, |credentials| {
            authenticate_admin(&state.config.admin, &credentials)
        })
}

/// Admin authorization middleware
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ViewError> {
    if !is_admin(&state, request.headers()) {
        tracing::debug!("Rejected admin request to {}", request.uri().path());
        return Err(ViewError::Unauthorized(
            "Authentication as the site administrator is required.".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

/// Value of the cookie `name`, if the request sent it
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; marigold_entry_3=abc; other=x"),
        );
        assert_eq!(cookie_value(&headers, "marigold_entry_3").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, "marigold_entry_4"), None);
    }

    #[test]
    fn test_view_error_status_and_template() {
        assert_eq!(ViewError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ViewError::not_found("x").template(), "404.html");
        assert_eq!(
            ViewError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ViewError::internal("x").template(), "500.html");
    }

    #[test]
    fn test_unauthorized_response_asks_for_basic_credentials() {
        let response = ViewError::Unauthorized("login".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.starts_with("Basic realm="));
        assert!(response.extensions().get::<ErrorPage>().is_some());
    }

    #[test]
    fn test_internal_error_hides_details() {
        let response = ViewError::internal("database exploded").into_response();
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.template, "500.html");
        assert!(!page.message.contains("database"));
    }
}
