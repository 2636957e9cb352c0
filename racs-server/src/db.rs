//! Store connection and migrations

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open (or create) the on-disk store.
///
/// The pool is capped at a single connection: SQLite is our single-writer
/// store and the per-project worker discipline already serializes writes per
/// project, so one connection keeps the write ordering trivial.
pub async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Apply schema creation statements.
///
/// The two `ALTER TABLE` statements bring pre-existing databases up to the
/// current schema; on a database that already has the columns they fail and
/// the failure is ignored.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registries(
            name TEXT PRIMARY KEY,
            url TEXT,
            user TEXT,
            password TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects(
            id INTEGER PRIMARY KEY,
            name TEXT,
            source TEXT,
            branch TEXT,
            destination TEXT,
            tag TEXT,
            buildSpec TEXT,
            packageSpec TEXT,
            state TEXT,
            version INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks(
            id INTEGER PRIMARY KEY,
            project INTEGER,
            type TEXT,
            state TEXT,
            time TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS triggers(
            project INTEGER,
            target INTEGER,
            state TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Columns added after the initial schema shipped; duplicate-column
    // errors on existing databases are expected.
    for statement in [
        "ALTER TABLE projects ADD COLUMN buildHash BLOB",
        "ALTER TABLE projects ADD COLUMN labels TEXT",
    ] {
        if let Err(err) = sqlx::query(statement).execute(pool).await {
            tracing::debug!("Skipping migration '{}': {}", statement, err);
        }
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.expect("open memory db");
    run_migrations(&pool).await.expect("migrate");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Second run hits the already-exists paths, including both ALTERs.
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO projects(name, source, branch, destination, tag, buildSpec, packageSpec, state, version) VALUES('a', 'b', 'c', 'd', 'e', 'BuildSpec', 'PackageSpec', 'NONE', 0)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE projects SET buildHash = x'00', labels = 'x' WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();
    }
}
