//! Task Repository

use racs_core::domain::task::TaskState;
use sqlx::SqlitePool;

/// Insert a RUNNING task row and return `(id, time)`; the store assigns
/// both the id and the creation timestamp.
pub async fn create(pool: &SqlitePool, project: i64, kind: &str) -> Result<(i64, String), sqlx::Error> {
    let row: (i64, String) = sqlx::query_as(
        r#"
        INSERT INTO tasks(project, type, state, time)
        VALUES(?, ?, 'RUNNING', datetime('now'))
        RETURNING id, time
        "#,
    )
    .bind(project)
    .bind(kind)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn update_state(pool: &SqlitePool, id: i64, state: TaskState) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE tasks SET state = ? WHERE id = ?")
        .bind(state.name())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Current lifecycle state string of one task, if it exists.
pub async fn state(pool: &SqlitePool, id: i64) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT state FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Every task row in id order, for startup reconciliation.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>("SELECT project, id, type, state, time FROM tasks ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn delete_for_project(pool: &SqlitePool, project: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tasks WHERE project = ?")
        .bind(project)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
pub struct TaskRow {
    pub project: i64,
    pub id: i64,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub state: String,
    pub time: String,
}
