//! Trigger Repository
//!
//! Trigger edges are only ever rewritten wholesale: replacing a project's
//! triggers deletes all of its rows and inserts the new set.

use racs_core::domain::state::State;
use sqlx::SqlitePool;

/// Replace every outgoing trigger edge of `project` with `edges`.
pub async fn replace(
    pool: &SqlitePool,
    project: i64,
    edges: &[(i64, State)],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM triggers WHERE project = ?")
        .bind(project)
        .execute(pool)
        .await?;

    for (target, stage) in edges {
        sqlx::query("INSERT INTO triggers(project, target, state) VALUES(?, ?, ?)")
            .bind(project)
            .bind(target)
            .bind(stage.name())
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Every trigger edge, for startup reconciliation.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<(i64, i64, String)>, sqlx::Error> {
    sqlx::query_as("SELECT project, target, state FROM triggers")
        .fetch_all(pool)
        .await
}
