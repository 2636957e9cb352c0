//! Registry Repository

use racs_core::domain::registry::Registry;
use sqlx::SqlitePool;

/// Insert or replace a registry row, keyed by name.
pub async fn upsert(
    pool: &SqlitePool,
    name: &str,
    url: &str,
    user: &str,
    password: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("REPLACE INTO registries(name, url, user, password) VALUES(?, ?, ?, ?)")
        .bind(name)
        .bind(url)
        .bind(user)
        .bind(password)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load every registry; last-login clocks start at the epoch so the first
/// push refreshes the login.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<Registry>, sqlx::Error> {
    let rows: Vec<(String, String, String, String)> =
        sqlx::query_as("SELECT name, url, user, password FROM registries")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(name, url, user, password)| Registry::new(name, url, user, password))
        .collect())
}
