//! Schema-per-file database wrapper.
//!
//! Each store owns one `SQLite` file named `{name}.{version}.sqlite3`. A
//! (name, version) pair is a distinct store: bumping the version starts from
//! an empty file, and older files are simply never opened again. There is no
//! migration machinery.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::Result;

/// DDL for one store.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Store name, e.g. "library".
    pub name: &'static str,
    /// Schema version, e.g. "v1alpha".
    pub version: &'static str,
    /// Statements run in order to create the schema.
    pub create: &'static [&'static str],
    /// Statements run in order to tear the schema down.
    pub drop: &'static [&'static str],
}

impl Schema {
    fn file_name(&self) -> String {
        format!("{}.{}.sqlite3", self.name, self.version)
    }
}

/// A pooled connection to one store's file.
///
/// The pool hands each connection to one task at a time; connections are
/// never shared concurrently.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    schema: Schema,
}

impl Database {
    /// Opens (creating if needed) the store's database file under `dir`.
    ///
    /// On first creation the schema's DDL runs in one transaction before the
    /// database is handed out.
    pub async fn open(schema: Schema, dir: &Path) -> Result<Self> {
        let path: PathBuf = dir.join(schema.file_name());
        let fresh = !path.exists();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        debug!(path = %path.display(), fresh, "opened database");

        let database = Self { pool, schema };
        if fresh {
            database.run(schema.create).await?;
        }
        Ok(database)
    }

    async fn run(&self, statements: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Starts a transaction for a consistent multi-query read.
    ///
    /// Dropping the guard without committing rolls back, which for a pure
    /// read is a no-op.
    pub async fn snapshot(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Starts a read-write transaction.
    ///
    /// Commits only on an explicit `commit()`; dropping the guard rolls
    /// back, leaving the store unchanged on any error path.
    pub async fn transaction(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Drops and recreates the schema, discarding all rows.
    pub async fn reset(&self) -> Result<()> {
        let mut statements: Vec<&str> = Vec::new();
        statements.extend_from_slice(self.schema.drop);
        statements.extend_from_slice(self.schema.create);
        self.run(&statements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Schema = Schema {
        name: "scratch",
        version: "v1",
        create: &["CREATE TABLE Item (value TEXT NOT NULL)"],
        drop: &["DROP TABLE IF EXISTS Item"],
    };

    #[tokio::test]
    async fn reopening_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();

        let database = Database::open(SCHEMA, dir.path()).await.unwrap();
        let mut tx = database.transaction().await.unwrap();
        sqlx::query("INSERT INTO Item (value) VALUES ('x')")
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        drop(database);

        let database = Database::open(SCHEMA, dir.path()).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Item")
            .fetch_one(&mut *database.snapshot().await.unwrap())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(SCHEMA, dir.path()).await.unwrap();

        let mut tx = database.transaction().await.unwrap();
        sqlx::query("INSERT INTO Item (value) VALUES ('x')")
            .execute(&mut *tx)
            .await
            .unwrap();
        drop(tx);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Item")
            .fetch_one(&mut *database.snapshot().await.unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn distinct_versions_are_distinct_stores() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = Database::open(SCHEMA, dir.path()).await.unwrap();
        let mut tx = v1.transaction().await.unwrap();
        sqlx::query("INSERT INTO Item (value) VALUES ('x')")
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let v2 = Database::open(Schema { version: "v2", ..SCHEMA }, dir.path())
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Item")
            .fetch_one(&mut *v2.snapshot().await.unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn reset_discards_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(SCHEMA, dir.path()).await.unwrap();
        let mut tx = database.transaction().await.unwrap();
        sqlx::query("INSERT INTO Item (value) VALUES ('x')")
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        database.reset().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Item")
            .fetch_one(&mut *database.snapshot().await.unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
