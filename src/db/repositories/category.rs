//! Category repository
//!
//! Database operations for the category tree.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL
//!
//! Every structural write (create, update, delete) renumbers the tree so
//! ancestor and descendant lookups stay single range queries.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{number_tree, Category, TreePosition};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::{bind_mysql, bind_sqlite, like_pattern, SqlValue, WhereClause};

const CATEGORY_COLUMNS: &str =
    "id, title, slug, description, parent_id, lft, rght, tree_id, level, created_at";

/// Admin list filters
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    /// Matched against title and description
    pub search: Option<String>,
    /// Only direct children of this category
    pub parent_id: Option<i64>,
}

impl CategoryFilter {
    fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            clause.push(
                "(title LIKE ? ESCAPE '!' OR description LIKE ? ESCAPE '!')",
                [SqlValue::Text(pattern.clone()), SqlValue::Text(pattern)],
            );
        }
        if let Some(parent_id) = self.parent_id {
            clause.push("parent_id = ?", [SqlValue::Int(parent_id)]);
        }
        clause
    }
}

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category and renumber the tree
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories in tree order
    async fn list(&self) -> Result<Vec<Category>>;

    /// Categories matching the admin filters, in tree order
    async fn search(&self, filter: &CategoryFilter) -> Result<Vec<Category>>;

    /// Ancestors of a category, root first
    async fn get_ancestors(&self, category: &Category) -> Result<Vec<Category>>;

    /// Update a category and renumber the tree
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category. Its children become roots.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken, optionally ignoring one category
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Recompute the preorder numbering from the parent links
    async fn rebuild(&self) -> Result<()>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_where(&self, clause: &WhereClause, order: &str) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories{} ORDER BY {}",
            CATEGORY_COLUMNS,
            clause.sql(),
            order
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_categories_sqlite(self.pool.sqlite()?, &sql, clause.values()).await,
            DatabaseDriver::Mysql => fetch_categories_mysql(self.pool.mysql()?, &sql, clause.values()).await,
        }
    }

    async fn fetch_one_where(&self, clause: &WhereClause) -> Result<Option<Category>> {
        Ok(self.fetch_where(clause, "id").await?.into_iter().next())
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.sqlite()?, category).await?,
            DatabaseDriver::Mysql => create_category_mysql(self.pool.mysql()?, category).await?,
        };
        self.rebuild().await?;
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after create"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let mut clause = WhereClause::new();
        clause.push("id = ?", [SqlValue::Int(id)]);
        self.fetch_one_where(&clause)
            .await
            .context("Failed to get category by ID")
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let mut clause = WhereClause::new();
        clause.push("slug = ?", [SqlValue::Text(slug.to_string())]);
        self.fetch_one_where(&clause)
            .await
            .context("Failed to get category by slug")
    }

    async fn list(&self) -> Result<Vec<Category>> {
        self.fetch_where(&WhereClause::new(), "tree_id, lft")
            .await
            .context("Failed to list categories")
    }

    async fn search(&self, filter: &CategoryFilter) -> Result<Vec<Category>> {
        self.fetch_where(&filter.where_clause(), "tree_id, lft")
            .await
            .context("Failed to search categories")
    }

    async fn get_ancestors(&self, category: &Category) -> Result<Vec<Category>> {
        let mut clause = WhereClause::new();
        clause.push(
            "tree_id = ? AND lft < ? AND rght > ?",
            [
                SqlValue::Int(category.tree_id.into()),
                SqlValue::Int(category.lft.into()),
                SqlValue::Int(category.rght.into()),
            ],
        );
        self.fetch_where(&clause, "lft")
            .await
            .context("Failed to get category ancestors")
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_category_sqlite(self.pool.sqlite()?, category).await?,
            DatabaseDriver::Mysql => update_category_mysql(self.pool.mysql()?, category).await?,
        }
        self.rebuild().await?;
        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_category_sqlite(self.pool.sqlite()?, id).await?,
            DatabaseDriver::Mysql => delete_category_mysql(self.pool.mysql()?, id).await?,
        }
        self.rebuild().await
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let mut clause = WhereClause::new();
        clause.push("slug = ?", [SqlValue::Text(slug.to_string())]);
        if let Some(id) = exclude_id {
            clause.push("id <> ?", [SqlValue::Int(id)]);
        }
        Ok(self.fetch_one_where(&clause).await?.is_some())
    }

    async fn rebuild(&self) -> Result<()> {
        let categories = self.fetch_where(&WhereClause::new(), "id").await?;
        let current: HashMap<i64, &Category> = categories.iter().map(|c| (c.id, c)).collect();

        let changed: Vec<TreePosition> = number_tree(&categories)
            .into_iter()
            .filter(|pos| {
                current.get(&pos.id).map_or(false, |c| {
                    (c.lft, c.rght, c.tree_id, c.level) != (pos.lft, pos.rght, pos.tree_id, pos.level)
                })
            })
            .collect();

        if changed.is_empty() {
            return Ok(());
        }
        tracing::debug!("Renumbering {} categories", changed.len());

        let written = match self.pool.driver() {
            DatabaseDriver::Sqlite => write_positions_sqlite(self.pool.sqlite()?, &changed).await,
            DatabaseDriver::Mysql => write_positions_mysql(self.pool.mysql()?, &changed).await,
        };
        written.context("Failed to renumber category tree")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn fetch_categories_sqlite(
    pool: &SqlitePool,
    sql: &str,
    values: &[SqlValue],
) -> Result<Vec<Category>> {
    let rows = bind_sqlite(sqlx::query(sql), values).fetch_all(pool).await?;
    rows.iter().map(row_to_category_sqlite).collect()
}

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (title, slug, description, parent_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.title)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(result.last_insert_rowid())
}

async fn update_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE categories
        SET title = ?, slug = ?, description = ?, parent_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&category.title)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(category.id)
    .execute(pool)
    .await
    .context("Failed to update category")?;

    Ok(())
}

async fn delete_category_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE categories SET parent_id = NULL WHERE parent_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach child categories")?;
    sqlx::query("DELETE FROM entry_categories WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to unlink entries from category")?;
    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete category")?;

    tx.commit().await?;
    Ok(())
}

async fn write_positions_sqlite(pool: &SqlitePool, positions: &[TreePosition]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for pos in positions {
        sqlx::query("UPDATE categories SET lft = ?, rght = ?, tree_id = ?, level = ? WHERE id = ?")
            .bind(pos.lft)
            .bind(pos.rght)
            .bind(pos.tree_id)
            .bind(pos.level)
            .bind(pos.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub(super) fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        parent_id: row.get("parent_id"),
        lft: row.get("lft"),
        rght: row.get("rght"),
        tree_id: row.get("tree_id"),
        level: row.get("level"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn fetch_categories_mysql(
    pool: &MySqlPool,
    sql: &str,
    values: &[SqlValue],
) -> Result<Vec<Category>> {
    let rows = bind_mysql(sqlx::query(sql), values).fetch_all(pool).await?;
    rows.iter().map(row_to_category_mysql).collect()
}

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (title, slug, description, parent_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.title)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(result.last_insert_id() as i64)
}

async fn update_category_mysql(pool: &MySqlPool, category: &Category) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE categories
        SET title = ?, slug = ?, description = ?, parent_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&category.title)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(category.id)
    .execute(pool)
    .await
    .context("Failed to update category")?;

    Ok(())
}

async fn delete_category_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE categories SET parent_id = NULL WHERE parent_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach child categories")?;
    sqlx::query("DELETE FROM entry_categories WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to unlink entries from category")?;
    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete category")?;

    tx.commit().await?;
    Ok(())
}

async fn write_positions_mysql(pool: &MySqlPool, positions: &[TreePosition]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for pos in positions {
        sqlx::query("UPDATE categories SET lft = ?, rght = ?, tree_id = ?, level = ? WHERE id = ?")
            .bind(pos.lft)
            .bind(pos.rght)
            .bind(pos.tree_id)
            .bind(pos.level)
            .bind(pos.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub(super) fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        parent_id: row.get("parent_id"),
        lft: row.get("lft"),
        rght: row.get("rght"),
        tree_id: row.get("tree_id"),
        level: row.get("level"),
        created_at: row.get("created_at"),
    })
}
