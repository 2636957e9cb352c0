//! Project Repository
//!
//! Handles all database operations related to projects. Column names follow
//! the on-disk schema; note `source` is the project's git URL.

use racs_core::domain::project::ProjectCore;
use racs_core::domain::state::State;
use sqlx::SqlitePool;

/// Insert a new project row and return its assigned id.
pub async fn create(
    pool: &SqlitePool,
    name: &str,
    url: &str,
    branch: &str,
    destination: &str,
    tag: &str,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO projects(name, source, branch, destination, tag, buildSpec, packageSpec, state, version)
        VALUES(?, ?, ?, ?, ?, 'BuildSpec', 'PackageSpec', ?, 0)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(url)
    .bind(branch)
    .bind(destination)
    .bind(tag)
    .bind(State::CreateSuccess.name())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Persist the metadata fields mutated by a project update.
pub async fn update_meta(pool: &SqlitePool, id: i64, core: &ProjectCore) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET name = ?, labels = ?, source = ?, branch = ?, destination = ?, tag = ?,
            buildSpec = ?, packageSpec = ?
        WHERE id = ?
        "#,
    )
    .bind(&core.name)
    .bind(&core.labels)
    .bind(&core.url)
    .bind(&core.branch)
    .bind(&core.destination)
    .bind(&core.tag)
    .bind(&core.build_spec)
    .bind(&core.package_spec)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_state(pool: &SqlitePool, id: i64, state: State) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET state = ? WHERE id = ?")
        .bind(state.name())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_version(pool: &SqlitePool, id: i64, version: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET version = ? WHERE id = ?")
        .bind(version)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_build_hash(pool: &SqlitePool, id: i64, hash: &[u8]) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET buildHash = ? WHERE id = ?")
        .bind(hash)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load every project row, for startup reconciliation.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<(i64, ProjectCore)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, name, labels, source, branch, destination, tag,
               buildSpec, packageSpec, buildHash, state, version
        FROM projects
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| (r.id, r.into_core())).collect())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    labels: Option<String>,
    source: String,
    branch: String,
    destination: String,
    tag: String,
    #[sqlx(rename = "buildSpec")]
    build_spec: String,
    #[sqlx(rename = "packageSpec")]
    package_spec: String,
    #[sqlx(rename = "buildHash")]
    build_hash: Option<Vec<u8>>,
    state: String,
    version: i64,
}

impl ProjectRow {
    fn into_core(self) -> ProjectCore {
        // A state string this binary does not recognize leaves the project
        // quiescent until the user re-triggers.
        let state = self.state.parse::<State>().unwrap_or_else(|err| {
            tracing::warn!("Project {}: {}; loading as NONE", self.id, err);
            State::None
        });

        ProjectCore {
            name: self.name,
            labels: self.labels.unwrap_or_default(),
            url: self.source,
            branch: self.branch,
            destination: self.destination,
            tag: self.tag,
            build_spec: self.build_spec,
            package_spec: self.package_spec,
            build_hash: self.build_hash.unwrap_or_default(),
            state,
            version: self.version,
            tasks: Vec::new(),
            triggers: std::collections::HashMap::new(),
            prepare_dep: None,
            package_dep: None,
        }
    }
}
