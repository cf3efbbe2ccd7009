//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;
use tracing::{info, warn};

/// Ensure the directory holding the data file exists.
///
/// A missing data file is fine (the store starts empty), a missing parent
/// directory is created so the first save can succeed.
pub async fn ensure_data_dir(data_file: &Path) -> anyhow::Result<()> {
    let Some(parent) = data_file.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if tokio::fs::metadata(parent).await.is_err() {
        warn!(dir = %parent.display(), "data directory not found; creating it");
    }
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", parent.display()))?;
    if tokio::fs::metadata(data_file).await.is_err() {
        info!(file = %data_file.display(), "data file not present yet; store will start empty");
    }
    Ok(())
}
