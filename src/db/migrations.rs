//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! supported driver, and tracked in the `_migrations` table.
//!
//! ```ignore
//! use marigold::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All schema migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    // Category tree. lft/rght/tree_id/level hold the preorder numbering that is
    // rebuilt after every structural change; parent_id is the source of truth.
    Migration {
        version: 1,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                lft INTEGER NOT NULL DEFAULT 0,
                rght INTEGER NOT NULL DEFAULT 0,
                tree_id INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);
            CREATE INDEX IF NOT EXISTS idx_categories_tree ON categories(tree_id, lft);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                description TEXT NOT NULL,
                parent_id BIGINT NULL,
                lft INT NOT NULL DEFAULT 0,
                rght INT NOT NULL DEFAULT 0,
                tree_id INT NOT NULL DEFAULT 0,
                level INT NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_categories_parent (parent_id),
                INDEX idx_categories_tree (tree_id, lft),
                FOREIGN KEY (parent_id) REFERENCES categories(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 2,
        name: "create_entries",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                publication_date TIMESTAMP NOT NULL,
                start_publication TIMESTAMP,
                end_publication TIMESTAMP,
                content TEXT NOT NULL DEFAULT '',
                lead_text TEXT NOT NULL DEFAULT '',
                excerpt TEXT NOT NULL DEFAULT '',
                tags VARCHAR(255) NOT NULL DEFAULT '',
                in_home BOOLEAN NOT NULL DEFAULT 1,
                login_required BOOLEAN NOT NULL DEFAULT 0,
                password VARCHAR(50) NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_update TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (status IN ('draft', 'hidden', 'published'))
            );
            CREATE INDEX IF NOT EXISTS idx_entries_slug_date ON entries(slug, publication_date);
            CREATE INDEX IF NOT EXISTS idx_entries_status_date ON entries(status, publication_date);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS entries (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                publication_date DATETIME NOT NULL,
                start_publication DATETIME NULL,
                end_publication DATETIME NULL,
                content LONGTEXT NOT NULL,
                lead_text TEXT NOT NULL,
                excerpt TEXT NOT NULL,
                tags VARCHAR(255) NOT NULL DEFAULT '',
                in_home BOOLEAN NOT NULL DEFAULT TRUE,
                login_required BOOLEAN NOT NULL DEFAULT FALSE,
                password VARCHAR(50) NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_update DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_entries_slug_date (slug, publication_date),
                INDEX idx_entries_status_date (status, publication_date),
                CHECK (status IN ('draft', 'hidden', 'published'))
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 3,
        name: "create_entry_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS entry_categories (
                entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (entry_id, category_id)
            );
            CREATE INDEX IF NOT EXISTS idx_entry_categories_category ON entry_categories(category_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS entry_categories (
                entry_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (entry_id, category_id),
                INDEX idx_entry_categories_category (category_id),
                FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 4,
        name: "create_entry_sites",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS entry_sites (
                entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
                site_id INTEGER NOT NULL,
                PRIMARY KEY (entry_id, site_id)
            );
            CREATE INDEX IF NOT EXISTS idx_entry_sites_site ON entry_sites(site_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS entry_sites (
                entry_id BIGINT NOT NULL,
                site_id BIGINT NOT NULL,
                PRIMARY KEY (entry_id, site_id),
                INDEX idx_entry_sites_site (site_id),
                FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
];

/// Run all pending migrations, returning how many were applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_category_slug_is_unique() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();

        sqlx::query("INSERT INTO categories (title, slug) VALUES ('A', 'a')")
            .execute(sqlite)
            .await
            .expect("first insert");
        let dup = sqlx::query("INSERT INTO categories (title, slug) VALUES ('B', 'a')")
            .execute(sqlite)
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_deleting_parent_category_orphans_children() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();

        sqlx::query("INSERT INTO categories (id, title, slug) VALUES (1, 'Parent', 'parent')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO categories (id, title, slug, parent_id) VALUES (2, 'Child', 'child', 1)",
        )
        .execute(sqlite)
        .await
        .unwrap();

        sqlx::query("DELETE FROM categories WHERE id = 1")
            .execute(sqlite)
            .await
            .unwrap();

        let parent: Option<i64> = sqlx::query("SELECT parent_id FROM categories WHERE id = 2")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get("parent_id");
        assert!(parent.is_none());
    }

    #[tokio::test]
    async fn test_entry_status_values() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();

        for status in ["draft", "hidden", "published"] {
            let result = sqlx::query(
                "INSERT INTO entries (title, slug, status, publication_date) VALUES ('t', ?, ?, CURRENT_TIMESTAMP)",
            )
            .bind(format!("slug-{}", status))
            .bind(status)
            .execute(sqlite)
            .await;
            assert!(result.is_ok(), "status {} should be accepted", status);
        }

        let invalid = sqlx::query(
            "INSERT INTO entries (title, slug, status, publication_date) VALUES ('t', 'x', 'archived', CURRENT_TIMESTAMP)",
        )
        .execute(sqlite)
        .await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_entry_links_cascade_on_delete() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();

        sqlx::query("INSERT INTO categories (id, title, slug) VALUES (1, 'C', 'c')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO entries (id, title, slug, publication_date) VALUES (1, 't', 't', CURRENT_TIMESTAMP)",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query("INSERT INTO entry_categories (entry_id, category_id) VALUES (1, 1)")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO entry_sites (entry_id, site_id) VALUES (1, 1)")
            .execute(sqlite)
            .await
            .unwrap();

        sqlx::query("DELETE FROM entries WHERE id = 1")
            .execute(sqlite)
            .await
            .unwrap();

        let links: i64 = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM entry_categories) + (SELECT COUNT(*) FROM entry_sites) AS count",
        )
        .fetch_one(sqlite)
        .await
        .unwrap()
        .get("count");
        assert_eq!(links, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- just a note\n;CREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- comment\n  -- another"));
        assert!(!is_comment_only("-- comment\nSELECT 1"));
    }

    #[test]
    fn test_truncate_sql() {
        let long = "x".repeat(150);
        assert_eq!(truncate_sql(&long).len(), 103);
        assert_eq!(truncate_sql("SELECT 1"), "SELECT 1");
    }
}
