//! HTTP tests of the public pages and the admin, against an in-memory
//! database and the built-in templates.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use chrono::{DateTime, TimeZone, Utc};

use marigold::api::{self, AppState};
use marigold::config::Config;
use marigold::db::repositories::{
    CategoryRepository, EntryRepository, SqlxCategoryRepository, SqlxEntryRepository,
};
use marigold::db::{create_test_pool, migrations};
use marigold::models::{Category, Entry, EntryInput, EntryStatus};
use marigold::services::BasicCredentials;
use marigold::theme::{context_processor, ThemeEngine};

const ADMIN_PASSWORD: &str = "marigold-admin";

struct Site {
    server: TestServer,
    entries: Arc<dyn EntryRepository>,
    categories: Arc<dyn CategoryRepository>,
}

/// Argon2id hash with small parameters so the tests stay fast
fn light_hash(password: &str) -> String {
    let params = Params::new(256, 1, 1, None).unwrap();
    let salt = SaltString::from_b64("bWFyaWdvbGR0ZXN0").unwrap();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn admin_auth() -> HeaderValue {
    let credentials = BasicCredentials {
        username: "admin".to_string(),
        password: ADMIN_PASSWORD.to_string(),
    };
    HeaderValue::from_str(&credentials.header_value()).unwrap()
}

async fn site_with(configure: impl FnOnce(&mut Config)) -> Site {
    let mut config = Config::default();
    config.admin.password_hash = light_hash(ADMIN_PASSWORD);
    config.site.secret_key = "test-secret".to_string();
    config.blog.markdown_extensions = vec!["tables".to_string(), "toc".to_string()];
    configure(&mut config);

    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let theme = ThemeEngine::new(None, context_processor(&config)).expect("Failed to load templates");
    let state = AppState::with_theme(config, pool.clone(), theme);
    let server = TestServer::new(api::build_router(state)).expect("Failed to start test server");

    Site {
        server,
        entries: SqlxEntryRepository::boxed(pool.clone()),
        categories: SqlxCategoryRepository::boxed(pool),
    }
}

async fn site() -> Site {
    site_with(|_| {}).await
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn published(title: &str, slug: &str, date: DateTime<Utc>) -> EntryInput {
    EntryInput::new(title, slug)
        .with_status(EntryStatus::Published)
        .with_publication_date(date)
        .with_sites(vec![1])
}

impl Site {
    async fn entry(&self, input: EntryInput) -> Entry {
        self.entries.create(&input).await.expect("Failed to create entry")
    }

    async fn category(&self, title: &str, slug: &str, parent_id: Option<i64>) -> Category {
        self.categories
            .create(&Category::new(
                title.to_string(),
                slug.to_string(),
                String::new(),
                parent_id,
            ))
            .await
            .expect("Failed to create category")
    }
}

fn assert_status(response: &TestResponse, status: StatusCode) {
    assert_eq!(response.status_code(), status, "body: {}", response.text());
}

// ============================================================================
// Archives
// ============================================================================

#[tokio::test]
async fn test_index_lists_published_entries() {
    let site = site().await;
    site.entry(published("Hello world", "hello-world", at(2024, 5, 1))).await;
    site.entry(EntryInput::new("Secret draft", "secret-draft").with_sites(vec![1])).await;

    let response = site.server.get("/").await;
    assert_status(&response, StatusCode::OK);
    let html = response.text();
    assert!(html.contains("Hello world"));
    assert!(html.contains("/2024/05/01/hello-world/"));
    assert!(!html.contains("Secret draft"));
    assert!(html.contains(&format!("Marigold {}", env!("CARGO_PKG_VERSION"))));
}

#[tokio::test]
async fn test_analytics_token_is_rendered() {
    let site = site_with(|config| config.site.analytics_token = "G-TEST42".to_string()).await;
    let html = site.server.get("/").await.text();
    assert!(html.contains("G-TEST42"));
}

#[tokio::test]
async fn test_year_archive_navigation() {
    let site = site().await;
    site.entry(published("Old", "old", at(2022, 3, 1))).await;
    site.entry(published("Middle", "middle", at(2023, 7, 14))).await;
    site.entry(published("New", "new", at(2024, 1, 2))).await;

    let response = site.server.get("/2023/").await;
    assert_status(&response, StatusCode::OK);
    let html = response.text();
    assert!(html.contains("Middle"));
    assert!(!html.contains("/2024/01/02/new/"));
    assert!(html.contains("href=\"/2022/\""));
    assert!(html.contains("href=\"/2024/\""));
    assert!(html.contains("href=\"/2023/07/\""));
}

#[tokio::test]
async fn test_month_week_and_day_archives() {
    let site = site().await;
    // Saturday 9 March 2024, week 10
    site.entry(published("March entry", "march-entry", at(2024, 3, 9))).await;

    for path in ["/2024/03/", "/2024/week/10/", "/2024/03/09/"] {
        let response = site.server.get(path).await;
        assert_status(&response, StatusCode::OK);
        assert!(response.text().contains("March entry"), "missing entry on {}", path);
    }

    let html = site.server.get("/2024/week/10/").await.text();
    assert!(html.contains("March 4"));
    assert!(html.contains("March 10, 2024"));
}

#[tokio::test]
async fn test_invalid_periods_are_not_found() {
    let site = site().await;
    for path in ["/2024/13/", "/2024/02/30/", "/24/", "/2024/week/54/"] {
        let response = site.server.get(path).await;
        assert_status(&response, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_empty_archive_depends_on_allow_empty() {
    let site = site().await;
    assert_status(&site.server.get("/2019/").await, StatusCode::OK);

    let strict = site_with(|config| config.blog.allow_empty = false).await;
    let response = strict.server.get("/2019/").await;
    assert_status(&response, StatusCode::NOT_FOUND);
    assert!(response.text().contains("Page not found"));
}

#[tokio::test]
async fn test_future_periods_depend_on_allow_future() {
    let site = site_with(|config| config.blog.allow_future = false).await;
    let next_year = Utc::now().format("%Y").to_string().parse::<i32>().unwrap() + 1;

    let response = site.server.get(&format!("/{}/", next_year)).await;
    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_future_entries_hidden_without_allow_future() {
    let site = site_with(|config| config.blog.allow_future = false).await;
    let soon = Utc::now() + chrono::Duration::hours(2);
    site.entry(published("Coming soon", "coming-soon", soon)).await;
    let url = format!("{}coming-soon/", soon.format("/%Y/%m/%d/"));

    assert!(!site.server.get("/").await.text().contains("Coming soon"));
    let year = site.server.get(&soon.format("/%Y/").to_string()).await;
    assert!(!year.text().contains("Coming soon"));
    assert_status(&site.server.get(&url).await, StatusCode::NOT_FOUND);

    let open = self::site().await;
    open.entry(published("Coming soon", "coming-soon", soon)).await;
    assert_status(&open.server.get(&url).await, StatusCode::OK);
}

#[tokio::test]
async fn test_pagination() {
    let site = site_with(|config| config.blog.pagination = 2).await;
    for day in 1..=3 {
        site.entry(published(&format!("Entry {}", day), &format!("entry-{}", day), at(2024, 1, day)))
            .await;
    }

    let first = site.server.get("/").await.text();
    assert!(first.contains("Entry 3"));
    assert!(!first.contains("Entry 1<"));
    assert!(first.contains("?page=2"));

    let last = site.server.get("/").add_query_param("page", "last").await;
    assert_status(&last, StatusCode::OK);
    assert!(last.text().contains("Entry 1"));

    let missing = site.server.get("/").add_query_param("page", "9").await;
    assert_status(&missing, StatusCode::NOT_FOUND);
}

// ============================================================================
// Entry detail
// ============================================================================

#[cfg(feature = "markdown")]
#[tokio::test]
async fn test_entry_detail_renders_markdown_and_neighbours() {
    let site = site().await;
    site.entry(published("Before", "before", at(2024, 4, 30))).await;
    site.entry(
        published("Main", "main", at(2024, 5, 1))
            .with_content("## Intro\n\nSome *emphasis*.\n\n## Details\n"),
    )
    .await;
    site.entry(published("After", "after", at(2024, 5, 2))).await;

    let response = site.server.get("/2024/05/01/main/").await;
    assert_status(&response, StatusCode::OK);
    let html = response.text();
    assert!(html.contains("<h2 id=\"intro\">Intro</h2>"));
    assert!(html.contains("<em>emphasis</em>"));
    assert!(html.contains("class=\"toc\""));
    assert!(html.contains("href=\"#details\""));
    assert!(html.contains("/2024/04/30/before/"));
    assert!(html.contains("/2024/05/02/after/"));
}

#[cfg(feature = "markdown")]
#[tokio::test]
async fn test_entry_without_headings_has_no_toc() {
    let site = site().await;
    site.entry(published("Plain", "plain", at(2024, 5, 1)).with_content("Just a paragraph."))
        .await;

    let html = site.server.get("/2024/05/01/plain/").await.text();
    assert!(html.contains("<p>Just a paragraph.</p>"));
    assert!(!html.contains("class=\"toc\""));
}

#[tokio::test]
async fn test_entry_detail_requires_matching_day() {
    let site = site().await;
    site.entry(published("Dated", "dated", at(2024, 5, 1))).await;

    assert_status(&site.server.get("/2024/05/01/dated/").await, StatusCode::OK);
    assert_status(&site.server.get("/2024/05/02/dated/").await, StatusCode::NOT_FOUND);
    assert_status(&site.server.get("/2024/05/01/other/").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_draft_is_only_previewed_by_admin() {
    let site = site().await;
    site.entry(
        EntryInput::new("Work in progress", "wip")
            .with_publication_date(at(2024, 5, 1))
            .with_sites(vec![1]),
    )
    .await;

    let anonymous = site.server.get("/2024/05/01/wip/").await;
    assert_status(&anonymous, StatusCode::NOT_FOUND);

    let admin = site
        .server
        .get("/2024/05/01/wip/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await;
    assert_status(&admin, StatusCode::OK);
    let html = admin.text();
    assert!(html.contains("Work in progress"));
    assert!(html.contains("Preview"));
}

#[tokio::test]
async fn test_login_required_entry() {
    let site = site().await;
    site.entry(published("Members", "members", at(2024, 5, 1)).with_login_required(true))
        .await;

    let anonymous = site.server.get("/2024/05/01/members/").await;
    assert_status(&anonymous, StatusCode::UNAUTHORIZED);
    assert!(anonymous.headers().contains_key(header::WWW_AUTHENTICATE));
    assert!(anonymous.text().contains("Login required"));

    let admin = site
        .server
        .get("/2024/05/01/members/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await;
    assert_status(&admin, StatusCode::OK);
}

#[tokio::test]
async fn test_password_protected_entry() {
    let site = site().await;
    site.entry(
        published("Locked", "locked", at(2024, 5, 1))
            .with_content("The hidden words")
            .with_password("sesame"),
    )
    .await;
    let url = "/2024/05/01/locked/";

    let form = site.server.get(url).await;
    assert_status(&form, StatusCode::OK);
    assert!(form.text().contains("entry_password"));
    assert!(!form.text().contains("The hidden words"));

    let wrong = site.server.post(url).form(&[("entry_password", "nope")]).await;
    assert_status(&wrong, StatusCode::OK);
    assert!(wrong.text().contains("Invalid password."));
    assert!(!wrong.headers().contains_key(header::SET_COOKIE));

    let right = site.server.post(url).form(&[("entry_password", "sesame")]).await;
    assert_status(&right, StatusCode::OK);
    assert!(right.text().contains("The hidden words"));
    let cookie = right
        .headers()
        .get(header::SET_COOKIE)
        .expect("missing access cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("marigold_entry_"));

    let again = site
        .server
        .get(url)
        .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .await;
    assert!(again.text().contains("The hidden words"));

    let forged = site
        .server
        .get(url)
        .add_header(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}=deadbeef", cookie.split('=').next().unwrap())).unwrap(),
        )
        .await;
    assert!(!forged.text().contains("The hidden words"));
}

// ============================================================================
// Categories
// ============================================================================

#[tokio::test]
async fn test_category_pages() {
    let site = site().await;
    let lang = site.category("Languages", "lang", None).await;
    let rust = site.category("Rust", "rust", Some(lang.id)).await;
    site.entry(published("Ownership", "ownership", at(2024, 2, 1)).with_categories(vec![rust.id]))
        .await;
    site.entry(published("Elsewhere", "elsewhere", at(2024, 2, 2))).await;

    let list = site.server.get("/categories/").await;
    assert_status(&list, StatusCode::OK);
    let html = list.text();
    assert!(html.contains("/categories/lang/rust/"));
    assert!(html.contains("(1)"));

    let detail = site.server.get("/categories/lang/rust/").await;
    assert_status(&detail, StatusCode::OK);
    let html = detail.text();
    assert!(html.contains("Ownership"));
    assert!(!html.contains("Elsewhere"));

    // only the last segment matters
    assert_status(&site.server.get("/categories/whatever/rust/").await, StatusCode::OK);
    assert_status(&site.server.get("/categories/nope/").await, StatusCode::NOT_FOUND);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_requires_credentials() {
    let site = site().await;

    let anonymous = site.server.get("/admin/").await;
    assert_status(&anonymous, StatusCode::UNAUTHORIZED);
    assert!(anonymous.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = BasicCredentials {
        username: "admin".to_string(),
        password: "guess".to_string(),
    };
    let rejected = site
        .server
        .get("/admin/")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&wrong.header_value()).unwrap(),
        )
        .await;
    assert_status(&rejected, StatusCode::UNAUTHORIZED);

    let admin = site
        .server
        .get("/admin/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await;
    assert_status(&admin, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_category_crud() {
    let site = site().await;

    let created = site
        .server
        .post("/admin/categories/add/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .form(&[("title", "Web Development"), ("parent", ""), ("description", ""), ("slug", "")])
        .await;
    assert_status(&created, StatusCode::SEE_OTHER);
    assert_eq!(created.headers()[header::LOCATION], "/admin/categories/");

    let list = site
        .server
        .get("/admin/categories/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await;
    let html = list.text();
    assert!(html.contains(
        r#"<a href="/categories/web-development/" target="blank">/web-development/</a>"#
    ));

    let category = site.categories.get_by_slug("web-development").await.unwrap().unwrap();
    let self_parent = site
        .server
        .post(&format!("/admin/categories/{}/change/", category.id))
        .add_header(header::AUTHORIZATION, admin_auth())
        .form(&[
            ("title", "Web Development"),
            ("parent", category.id.to_string().as_str()),
            ("description", ""),
            ("slug", "web-development"),
        ])
        .await;
    assert_status(&self_parent, StatusCode::OK);
    assert!(self_parent.text().contains("A category cannot be parent of itself."));

    let deleted = site
        .server
        .post(&format!("/admin/categories/{}/delete/", category.id))
        .add_header(header::AUTHORIZATION, admin_auth())
        .await;
    assert_status(&deleted, StatusCode::SEE_OTHER);
    assert!(site.categories.get_by_id(category.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_admin_category_search_and_parent_filter() {
    let site = site().await;
    let lang = site.category("Languages", "lang", None).await;
    site.category("Rust", "rust", Some(lang.id)).await;
    site.category("Cooking", "cooking", None).await;

    let by_parent = site
        .server
        .get("/admin/categories/")
        .add_query_param("parent", lang.id)
        .add_header(header::AUTHORIZATION, admin_auth())
        .await
        .text();
    assert!(by_parent.contains("/lang/rust/"));
    assert!(!by_parent.contains("/cooking/"));

    let searched = site
        .server
        .get("/admin/categories/")
        .add_query_param("q", "cook")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await
        .text();
    assert!(searched.contains("/cooking/"));
    assert!(!searched.contains("/lang/rust/"));
}

#[tokio::test]
async fn test_admin_entry_add_and_validation() {
    let site = site().await;
    let category = site.category("Rust", "rust", None).await;

    let invalid = site
        .server
        .post("/admin/entries/add/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .form(&[("title", ""), ("status", "published"), ("publication_date", "not a date")])
        .await;
    assert_status(&invalid, StatusCode::OK);
    assert!(invalid.text().contains("errorlist"));

    let category_id = category.id.to_string();
    let created = site
        .server
        .post("/admin/entries/add/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .form(&[
            ("title", "Hello admin"),
            ("slug", ""),
            ("status", "published"),
            ("publication_date", "2024-06-01 10:30"),
            ("content", "Body"),
            ("in_home", "on"),
            ("categories", category_id.as_str()),
        ])
        .await;
    assert_status(&created, StatusCode::SEE_OTHER);

    let page = site.server.get("/2024/06/01/hello-admin/").await;
    assert_status(&page, StatusCode::OK);
    assert!(page.text().contains("/categories/rust/"));

    let duplicate = site
        .server
        .post("/admin/entries/add/")
        .add_header(header::AUTHORIZATION, admin_auth())
        .form(&[
            ("title", "Hello admin"),
            ("status", "published"),
            ("publication_date", "2024-06-01 18:00"),
        ])
        .await;
    assert_status(&duplicate, StatusCode::OK);
    assert!(duplicate.text().contains("Slug must be unique for Publication date date."));
}

#[tokio::test]
async fn test_admin_entry_list_search() {
    let site = site().await;
    site.entry(published("Async Rust", "async-rust", at(2024, 1, 1))).await;
    site.entry(published("Gardening", "gardening", at(2024, 1, 2))).await;

    let html = site
        .server
        .get("/admin/entries/")
        .add_query_param("q", "async")
        .add_header(header::AUTHORIZATION, admin_auth())
        .await
        .text();
    assert!(html.contains("Async Rust"));
    assert!(!html.contains("Gardening"));
}

#[tokio::test]
async fn test_unknown_page_uses_theme() {
    let site = site().await;
    let response = site.server.get("/no/such/page/at/all/").await;
    assert_status(&response, StatusCode::NOT_FOUND);
    assert!(response.text().contains("Page not found"));
}
