//! Image housekeeping
//!
//! Builder and artifact images accumulate quickly; a background loop asks
//! podman to prune anything unused for five minutes, once a minute.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time;
use tracing::{info, warn};

pub fn spawn() -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            info!("Pruning images");
            let status = Command::new("podman")
                .args(["image", "prune", "-f", "--filter", "until=5m"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if !status.success() => {
                    warn!("podman image prune exited with {}", status);
                }
                Ok(_) => {}
                Err(err) => warn!("podman image prune failed to spawn: {}", err),
            }
        }
    })
}
