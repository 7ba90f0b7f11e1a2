//! Entry repository
//!
//! Database operations for entries and their category and site links.
//!
//! Public pages never list raw rows: they go through an `EntryFilter`, which
//! expresses the published, published-and-in-home and on-site querysets plus
//! date ranges and category membership.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Category, Entry, EntryInput, EntryStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::category::{row_to_category_mysql, row_to_category_sqlite};
use super::{bind_mysql, bind_sqlite, like_pattern, SqlValue, WhereClause};

const ENTRY_COLUMNS: &str = "id, title, slug, status, publication_date, start_publication, \
     end_publication, content, lead_text, excerpt, tags, in_home, login_required, password, \
     created_at, last_update";

/// Which entries a query should see
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Published and inside the publication window at this instant
    pub published_at: Option<DateTime<Utc>>,
    /// Attached to this site
    pub site_id: Option<i64>,
    /// Only entries listed (or not) on the home page
    pub in_home: Option<bool>,
    /// Filed under this category
    pub category_id: Option<i64>,
    /// Inclusive lower bound of the publication date
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound of the publication date
    pub date_until: Option<DateTime<Utc>>,
    /// Published no later than this instant, kept apart from the period bounds
    pub not_after: Option<DateTime<Utc>>,
    pub slug: Option<String>,
    /// Matched against title and content
    pub search: Option<String>,
    pub exclude_id: Option<i64>,
    /// Strictly before this (date, id) position
    pub before: Option<(DateTime<Utc>, i64)>,
    /// Strictly after this (date, id) position
    pub after: Option<(DateTime<Utc>, i64)>,
}

impl EntryFilter {
    /// Entries attached to a site, whatever their status
    pub fn on_site(site_id: i64) -> Self {
        Self {
            site_id: Some(site_id),
            ..Self::default()
        }
    }

    /// Entries readers may see on a site at `now`
    pub fn published(site_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            published_at: Some(now),
            site_id: Some(site_id),
            ..Self::default()
        }
    }

    /// Published entries that are also listed on the home page
    pub fn published_and_inhome(site_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            in_home: Some(true),
            ..Self::published(site_id, now)
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_until = until;
        self
    }

    /// Hide entries dated after `cutoff`
    pub fn not_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.not_after = Some(cutoff);
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn matching(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn excluding(mut self, id: i64) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn before(mut self, date: DateTime<Utc>, id: i64) -> Self {
        self.before = Some((date, id));
        self
    }

    pub fn after(mut self, date: DateTime<Utc>, id: i64) -> Self {
        self.after = Some((date, id));
        self
    }

    fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        if let Some(now) = self.published_at {
            clause.push(
                "status = ? AND (start_publication IS NULL OR start_publication <= ?) \
                 AND (end_publication IS NULL OR end_publication > ?)",
                [
                    SqlValue::Text(EntryStatus::Published.as_str().to_string()),
                    SqlValue::Time(now),
                    SqlValue::Time(now),
                ],
            );
        }
        if let Some(site_id) = self.site_id {
            clause.push(
                "id IN (SELECT entry_id FROM entry_sites WHERE site_id = ?)",
                [SqlValue::Int(site_id)],
            );
        }
        if let Some(in_home) = self.in_home {
            clause.push("in_home = ?", [SqlValue::Bool(in_home)]);
        }
        if let Some(category_id) = self.category_id {
            clause.push(
                "id IN (SELECT entry_id FROM entry_categories WHERE category_id = ?)",
                [SqlValue::Int(category_id)],
            );
        }
        if let Some(from) = self.date_from {
            clause.push("publication_date >= ?", [SqlValue::Time(from)]);
        }
        if let Some(until) = self.date_until {
            clause.push("publication_date < ?", [SqlValue::Time(until)]);
        }
        if let Some(cutoff) = self.not_after {
            clause.push("publication_date <= ?", [SqlValue::Time(cutoff)]);
        }
        if let Some(slug) = &self.slug {
            clause.push("slug = ?", [SqlValue::Text(slug.clone())]);
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            clause.push(
                "(title LIKE ? ESCAPE '!' OR content LIKE ? ESCAPE '!')",
                [SqlValue::Text(pattern.clone()), SqlValue::Text(pattern)],
            );
        }
        if let Some(id) = self.exclude_id {
            clause.push("id <> ?", [SqlValue::Int(id)]);
        }
        if let Some((date, id)) = self.before {
            clause.push(
                "(publication_date < ? OR (publication_date = ? AND id < ?))",
                [SqlValue::Time(date), SqlValue::Time(date), SqlValue::Int(id)],
            );
        }
        if let Some((date, id)) = self.after {
            clause.push(
                "(publication_date > ? OR (publication_date = ? AND id > ?))",
                [SqlValue::Time(date), SqlValue::Time(date), SqlValue::Int(id)],
            );
        }
        clause
    }
}

/// Sort order of entry lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryOrder {
    /// Newest first
    #[default]
    PublicationDesc,
    /// Oldest first
    PublicationAsc,
}

impl EntryOrder {
    fn sql(&self) -> &'static str {
        match self {
            EntryOrder::PublicationDesc => "publication_date DESC, id DESC",
            EntryOrder::PublicationAsc => "publication_date ASC, id ASC",
        }
    }
}

/// Entry repository trait
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Create an entry together with its category and site links
    async fn create(&self, input: &EntryInput) -> Result<Entry>;

    /// Get entry by ID, with categories and sites
    async fn get_by_id(&self, id: i64) -> Result<Option<Entry>>;

    /// Matching entries, with categories and sites
    async fn find(
        &self,
        filter: &EntryFilter,
        order: EntryOrder,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Entry>>;

    /// First matching entry in the given order
    async fn find_first(&self, filter: &EntryFilter, order: EntryOrder) -> Result<Option<Entry>>;

    /// Number of matching entries
    async fn count(&self, filter: &EntryFilter) -> Result<i64>;

    /// Publication dates of the matching entries, oldest first
    async fn publication_dates(&self, filter: &EntryFilter) -> Result<Vec<DateTime<Utc>>>;

    /// Number of matching entries per category
    async fn count_by_category(&self, filter: &EntryFilter) -> Result<HashMap<i64, i64>>;

    /// Replace every editable field and the links of an entry
    async fn update(&self, id: i64, input: &EntryInput) -> Result<Entry>;

    /// Delete an entry and its links
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based entry repository implementation
pub struct SqlxEntryRepository {
    pool: DynDatabasePool,
}

impl SqlxEntryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EntryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl EntryRepository for SqlxEntryRepository {
    async fn create(&self, input: &EntryInput) -> Result<Entry> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_entry_sqlite(self.pool.sqlite()?, input).await?,
            DatabaseDriver::Mysql => create_entry_mysql(self.pool.mysql()?, input).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Entry not found after create"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Entry>> {
        let filter = EntryFilter::default();
        let mut clause = filter.where_clause();
        clause.push("id = ?", [SqlValue::Int(id)]);
        let sql = format!("SELECT {} FROM entries{}", ENTRY_COLUMNS, clause.sql());

        let entries = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_entries_sqlite(self.pool.sqlite()?, &sql, clause.values()).await,
            DatabaseDriver::Mysql => fetch_entries_mysql(self.pool.mysql()?, &sql, clause.values()).await,
        }
        .context("Failed to get entry by ID")?;

        Ok(entries.into_iter().next())
    }

    async fn find(
        &self,
        filter: &EntryFilter,
        order: EntryOrder,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Entry>> {
        let clause = filter.where_clause();
        let sql = format!(
            "SELECT {} FROM entries{} ORDER BY {} LIMIT {} OFFSET {}",
            ENTRY_COLUMNS,
            clause.sql(),
            order.sql(),
            limit.max(0),
            offset.max(0)
        );

        let entries = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_entries_sqlite(self.pool.sqlite()?, &sql, clause.values()).await,
            DatabaseDriver::Mysql => fetch_entries_mysql(self.pool.mysql()?, &sql, clause.values()).await,
        };
        entries.context("Failed to list entries")
    }

    async fn find_first(&self, filter: &EntryFilter, order: EntryOrder) -> Result<Option<Entry>> {
        Ok(self.find(filter, order, 0, 1).await?.into_iter().next())
    }

    async fn count(&self, filter: &EntryFilter) -> Result<i64> {
        let clause = filter.where_clause();
        let sql = format!("SELECT COUNT(*) AS count FROM entries{}", clause.sql());

        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = bind_sqlite(sqlx::query(&sql), clause.values())
                    .fetch_one(self.pool.sqlite()?)
                    .await;
                row.map(|r| r.get::<i64, _>("count"))
            }
            DatabaseDriver::Mysql => {
                let row = bind_mysql(sqlx::query(&sql), clause.values())
                    .fetch_one(self.pool.mysql()?)
                    .await;
                row.map(|r| r.get::<i64, _>("count"))
            }
        };
        count.context("Failed to count entries")
    }

    async fn publication_dates(&self, filter: &EntryFilter) -> Result<Vec<DateTime<Utc>>> {
        let clause = filter.where_clause();
        let sql = format!(
            "SELECT publication_date FROM entries{} ORDER BY publication_date",
            clause.sql()
        );

        let dates = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&sql), clause.values())
                .fetch_all(self.pool.sqlite()?)
                .await
                .map(|rows| rows.iter().map(|r| r.get("publication_date")).collect()),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&sql), clause.values())
                .fetch_all(self.pool.mysql()?)
                .await
                .map(|rows| rows.iter().map(|r| r.get("publication_date")).collect()),
        };
        dates.context("Failed to list publication dates")
    }

    async fn count_by_category(&self, filter: &EntryFilter) -> Result<HashMap<i64, i64>> {
        let clause = filter.where_clause();
        let sql = format!(
            "SELECT category_id, COUNT(*) AS count FROM entry_categories \
             WHERE entry_id IN (SELECT id FROM entries{}) GROUP BY category_id",
            clause.sql()
        );

        let counts = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&sql), clause.values())
                .fetch_all(self.pool.sqlite()?)
                .await
                .map(|rows| {
                    rows.iter()
                        .map(|r| (r.get::<i64, _>("category_id"), r.get::<i64, _>("count")))
                        .collect()
                }),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&sql), clause.values())
                .fetch_all(self.pool.mysql()?)
                .await
                .map(|rows| {
                    rows.iter()
                        .map(|r| (r.get::<i64, _>("category_id"), r.get::<i64, _>("count")))
                        .collect()
                }),
        };
        counts.context("Failed to count entries per category")
    }

    async fn update(&self, id: i64, input: &EntryInput) -> Result<Entry> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_entry_sqlite(self.pool.sqlite()?, id, input).await?,
            DatabaseDriver::Mysql => update_entry_mysql(self.pool.mysql()?, id, input).await?,
        }
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Entry not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sqls = [
            "DELETE FROM entry_categories WHERE entry_id = ?",
            "DELETE FROM entry_sites WHERE entry_id = ?",
            "DELETE FROM entries WHERE id = ?",
        ];
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                for sql in sqls {
                    sqlx::query(sql).bind(id).execute(&mut *tx).await?;
                }
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                for sql in sqls {
                    sqlx::query(sql).bind(id).execute(&mut *tx).await?;
                }
                tx.commit().await?;
            }
        }
        Ok(())
    }
}

/// One `?` per id, comma separated
fn id_placeholders(ids: &[i64]) -> String {
    vec!["?"; ids.len()].join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_entry_sqlite(pool: &SqlitePool, input: &EntryInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO entries (title, slug, status, publication_date, start_publication,
            end_publication, content, lead_text, excerpt, tags, in_home, login_required,
            password, created_at, last_update)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(input.status.as_str())
    .bind(input.publication_date)
    .bind(input.start_publication)
    .bind(input.end_publication)
    .bind(&input.content)
    .bind(&input.lead)
    .bind(&input.excerpt)
    .bind(&input.tags)
    .bind(input.in_home)
    .bind(input.login_required)
    .bind(&input.password)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create entry")?;
    let id = result.last_insert_rowid();

    for category_id in dedup(&input.category_ids) {
        sqlx::query("INSERT INTO entry_categories (entry_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to category")?;
    }
    for site_id in dedup(&input.site_ids) {
        sqlx::query("INSERT INTO entry_sites (entry_id, site_id) VALUES (?, ?)")
            .bind(id)
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to site")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_entry_sqlite(pool: &SqlitePool, id: i64, input: &EntryInput) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE entries
        SET title = ?, slug = ?, status = ?, publication_date = ?, start_publication = ?,
            end_publication = ?, content = ?, lead_text = ?, excerpt = ?, tags = ?,
            in_home = ?, login_required = ?, password = ?, last_update = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(input.status.as_str())
    .bind(input.publication_date)
    .bind(input.start_publication)
    .bind(input.end_publication)
    .bind(&input.content)
    .bind(&input.lead)
    .bind(&input.excerpt)
    .bind(&input.tags)
    .bind(input.in_home)
    .bind(input.login_required)
    .bind(&input.password)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to update entry")?;

    sqlx::query("DELETE FROM entry_categories WHERE entry_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for category_id in dedup(&input.category_ids) {
        sqlx::query("INSERT INTO entry_categories (entry_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to category")?;
    }

    sqlx::query("DELETE FROM entry_sites WHERE entry_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for site_id in dedup(&input.site_ids) {
        sqlx::query("INSERT INTO entry_sites (entry_id, site_id) VALUES (?, ?)")
            .bind(id)
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to site")?;
    }

    tx.commit().await?;
    Ok(())
}

async fn fetch_entries_sqlite(pool: &SqlitePool, sql: &str, values: &[SqlValue]) -> Result<Vec<Entry>> {
    let rows = bind_sqlite(sqlx::query(sql), values).fetch_all(pool).await?;
    let mut entries = rows
        .iter()
        .map(row_to_entry_sqlite)
        .collect::<Result<Vec<_>>>()?;
    if entries.is_empty() {
        return Ok(entries);
    }

    let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    let values: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Int(*id)).collect();

    let category_sql = format!(
        "SELECT ec.entry_id AS entry_id, c.id, c.title, c.slug, c.description, c.parent_id, \
         c.lft, c.rght, c.tree_id, c.level, c.created_at \
         FROM entry_categories ec JOIN categories c ON c.id = ec.category_id \
         WHERE ec.entry_id IN ({}) ORDER BY c.title, c.id",
        id_placeholders(&ids)
    );
    let mut categories: HashMap<i64, Vec<Category>> = HashMap::new();
    for row in bind_sqlite(sqlx::query(&category_sql), &values)
        .fetch_all(pool)
        .await?
    {
        categories
            .entry(row.get("entry_id"))
            .or_default()
            .push(row_to_category_sqlite(&row)?);
    }

    let site_sql = format!(
        "SELECT entry_id, site_id FROM entry_sites WHERE entry_id IN ({}) ORDER BY site_id",
        id_placeholders(&ids)
    );
    let mut sites: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in bind_sqlite(sqlx::query(&site_sql), &values)
        .fetch_all(pool)
        .await?
    {
        sites.entry(row.get("entry_id")).or_default().push(row.get("site_id"));
    }

    for entry in entries.iter_mut() {
        entry.categories = categories.remove(&entry.id).unwrap_or_default();
        entry.sites = sites.remove(&entry.id).unwrap_or_default();
    }
    Ok(entries)
}

fn row_to_entry_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Entry> {
    let status_str: String = row.get("status");
    let status = EntryStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid entry status: {}", status_str))?;

    Ok(Entry {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        status,
        publication_date: row.get("publication_date"),
        start_publication: row.get("start_publication"),
        end_publication: row.get("end_publication"),
        content: row.get("content"),
        lead: row.get("lead_text"),
        excerpt: row.get("excerpt"),
        tags: row.get("tags"),
        in_home: row.get("in_home"),
        login_required: row.get("login_required"),
        password: row.get("password"),
        created_at: row.get("created_at"),
        last_update: row.get("last_update"),
        categories: Vec::new(),
        sites: Vec::new(),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_entry_mysql(pool: &MySqlPool, input: &EntryInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO entries (title, slug, status, publication_date, start_publication,
            end_publication, content, lead_text, excerpt, tags, in_home, login_required,
            password, created_at, last_update)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(input.status.as_str())
    .bind(input.publication_date)
    .bind(input.start_publication)
    .bind(input.end_publication)
    .bind(&input.content)
    .bind(&input.lead)
    .bind(&input.excerpt)
    .bind(&input.tags)
    .bind(input.in_home)
    .bind(input.login_required)
    .bind(&input.password)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create entry")?;
    let id = result.last_insert_id() as i64;

    for category_id in dedup(&input.category_ids) {
        sqlx::query("INSERT INTO entry_categories (entry_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to category")?;
    }
    for site_id in dedup(&input.site_ids) {
        sqlx::query("INSERT INTO entry_sites (entry_id, site_id) VALUES (?, ?)")
            .bind(id)
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to site")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_entry_mysql(pool: &MySqlPool, id: i64, input: &EntryInput) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE entries
        SET title = ?, slug = ?, status = ?, publication_date = ?, start_publication = ?,
            end_publication = ?, content = ?, lead_text = ?, excerpt = ?, tags = ?,
            in_home = ?, login_required = ?, password = ?, last_update = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(input.status.as_str())
    .bind(input.publication_date)
    .bind(input.start_publication)
    .bind(input.end_publication)
    .bind(&input.content)
    .bind(&input.lead)
    .bind(&input.excerpt)
    .bind(&input.tags)
    .bind(input.in_home)
    .bind(input.login_required)
    .bind(&input.password)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to update entry")?;

    sqlx::query("DELETE FROM entry_categories WHERE entry_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for category_id in dedup(&input.category_ids) {
        sqlx::query("INSERT INTO entry_categories (entry_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to category")?;
    }

    sqlx::query("DELETE FROM entry_sites WHERE entry_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for site_id in dedup(&input.site_ids) {
        sqlx::query("INSERT INTO entry_sites (entry_id, site_id) VALUES (?, ?)")
            .bind(id)
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link entry to site")?;
    }

    tx.commit().await?;
    Ok(())
}

async fn fetch_entries_mysql(pool: &MySqlPool, sql: &str, values: &[SqlValue]) -> Result<Vec<Entry>> {
    let rows = bind_mysql(sqlx::query(sql), values).fetch_all(pool).await?;
    let mut entries = rows
        .iter()
        .map(row_to_entry_mysql)
        .collect::<Result<Vec<_>>>()?;
    if entries.is_empty() {
        return Ok(entries);
    }

    let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    let values: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Int(*id)).collect();

    let category_sql = format!(
        "SELECT ec.entry_id AS entry_id, c.id, c.title, c.slug, c.description, c.parent_id, \
         c.lft, c.rght, c.tree_id, c.level, c.created_at \
         FROM entry_categories ec JOIN categories c ON c.id = ec.category_id \
         WHERE ec.entry_id IN ({}) ORDER BY c.title, c.id",
        id_placeholders(&ids)
    );
    let mut categories: HashMap<i64, Vec<Category>> = HashMap::new();
    for row in bind_mysql(sqlx::query(&category_sql), &values)
        .fetch_all(pool)
        .await?
    {
        categories
            .entry(row.get("entry_id"))
            .or_default()
            .push(row_to_category_mysql(&row)?);
    }

    let site_sql = format!(
        "SELECT entry_id, site_id FROM entry_sites WHERE entry_id IN ({}) ORDER BY site_id",
        id_placeholders(&ids)
    );
    let mut sites: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in bind_mysql(sqlx::query(&site_sql), &values)
        .fetch_all(pool)
        .await?
    {
        sites.entry(row.get("entry_id")).or_default().push(row.get("site_id"));
    }

    for entry in entries.iter_mut() {
        entry.categories = categories.remove(&entry.id).unwrap_or_default();
        entry.sites = sites.remove(&entry.id).unwrap_or_default();
    }
    Ok(entries)
}

fn row_to_entry_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Entry> {
    let status_str: String = row.get("status");
    let status = EntryStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid entry status: {}", status_str))?;

    Ok(Entry {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        status,
        publication_date: row.get("publication_date"),
        start_publication: row.get("start_publication"),
        end_publication: row.get("end_publication"),
        content: row.get("content"),
        lead: row.get("lead_text"),
        excerpt: row.get("excerpt"),
        tags: row.get("tags"),
        in_home: row.get("in_home"),
        login_required: row.get("login_required"),
        password: row.get("password"),
        created_at: row.get("created_at"),
        last_update: row.get("last_update"),
        categories: Vec::new(),
        sites: Vec::new(),
    })
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
