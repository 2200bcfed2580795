//! src/services/catalog.rs
//!
//! ObjectCatalog, the durable name → object directory, and its SQLite
//! implementation. Entries are write-once; there is no update path.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::{NewObject, StoredObject},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, info};

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[async_trait]
pub trait ObjectCatalog: Send + Sync {
    /// Bind `object.name` to the object. Fails with `DuplicateName` when the
    /// name is already bound.
    async fn register(&self, object: NewObject) -> StoreResult<StoredObject>;

    /// Look up a committed object by name.
    async fn resolve(&self, name: &str) -> StoreResult<StoredObject>;

    /// Cheap readiness probe.
    async fn health_check(&self) -> StoreResult<()>;

    /// Release the backing connection, if any.
    async fn close(&self) {}
}

/// Catalog backed by a shared SQLite connection pool.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Arc<SqlitePool>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Pinned to a single connection that never idles out, since every
    /// SQLite `:memory:` connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let catalog = Self::new(Arc::new(pool));
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(strip_sql_comments)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(&stmt).execute(&*self.db).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectCatalog for SqliteCatalog {
    async fn register(&self, object: NewObject) -> StoreResult<StoredObject> {
        let name = object.name.clone();
        let record = object.into_stored(Utc::now());

        let inserted = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, name, original_filename, content_type,
                size_bytes, chunk_count, etag, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, original_filename, content_type,
                      size_bytes, chunk_count, etag, created_at
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.original_filename)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(record.chunk_count)
        .bind(&record.etag)
        .bind(record.created_at)
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(stored) => Ok(stored),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateName(name)),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn resolve(&self, name: &str) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, name, original_filename, content_type,
                    size_bytes, chunk_count, etag, created_at
             FROM objects WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(name.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "unexpected probe result: {value}"
            ))));
        }
        Ok(())
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Drop `--` comment lines so a statement preceded by a comment block is
/// not mistaken for an empty one.
fn strip_sql_comments(stmt: &str) -> String {
    stmt.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
