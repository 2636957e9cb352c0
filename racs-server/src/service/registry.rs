//! Registry Service
//!
//! Registry upserts and the lazy `podman login` refresh performed before a
//! push. Logins are cached for an hour per registry.

use std::process::Stdio;

use chrono::Utc;
use racs_core::domain::registry::Registry;
use tokio::process::Command;
use tracing::{info, warn};

use crate::repository::registry_repository;
use crate::state::AppState;

/// Create or replace a registry, in the store and in memory.
pub async fn create(
    state: &AppState,
    name: &str,
    url: &str,
    user: &str,
    password: &str,
) -> Result<(), sqlx::Error> {
    registry_repository::upsert(&state.pool, name, url, user, password).await?;

    let registry = Registry::new(name.into(), url.into(), user.into(), password.into());
    state
        .registries
        .lock()
        .unwrap()
        .insert(registry.name.clone(), registry);

    info!("Registry created {} {} {} ******", name, url, user);
    Ok(())
}

/// Resolve a destination to its registry URL, refreshing the cached
/// `podman login` when it is older than an hour and credentials exist.
///
/// Returns `None` for unknown destinations; the push then degrades to a
/// no-op command. Login failures are ignored; the push itself reports the
/// real error into its task log.
pub async fn login(state: &AppState, name: &str) -> Option<String> {
    let url;
    let refresh;
    {
        let mut registries = state.registries.lock().unwrap();
        let registry = registries.get_mut(name)?;
        url = registry.url.clone();
        if registry.login_stale(Utc::now()) {
            refresh = (!registry.user.is_empty()).then(|| {
                (
                    registry.url.clone(),
                    registry.user.clone(),
                    registry.password.clone(),
                )
            });
            registry.last_login = Utc::now();
        } else {
            refresh = None;
        }
    }

    if let Some((login_url, user, password)) = refresh {
        let status = Command::new("podman")
            .args(["login", &login_url, "-u", &user, "-p", &password])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if !status.success() => {
                warn!("podman login {} exited with {}", login_url, status);
            }
            Ok(_) => {}
            Err(err) => warn!("podman login {} failed to spawn: {}", login_url, err),
        }
    }

    Some(url)
}
