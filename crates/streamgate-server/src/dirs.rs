use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Per-user data directory for the key ledger when none is configured.
pub fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "streamgate")
        .context("could not determine a home directory for streamgate data")?;
    let dir = dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create data dir {}", dir.display()))?;
    Ok(dir)
}

/// Explicit data dir when given, per-user default otherwise.
pub fn resolve_data_dir(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(d) => {
            std::fs::create_dir_all(d).with_context(|| {
                format!(
                    "create data dir {} — fix permissions on the host, for example: \
                     `sudo chown -R $(id -u):$(id -g) {}`",
                    d.display(),
                    d.display()
                )
            })?;
            Ok(d.clone())
        }
        None => data_dir(),
    }
}
