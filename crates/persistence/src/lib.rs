#![deny(warnings)]

//! Persistence layer: game snapshots as JSON save files.

use sim_core::GameSnapshot;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("save file IO failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where the CLI keeps its save unless told otherwise.
pub fn default_save_path() -> PathBuf {
    PathBuf::from("saves").join("stock-clicker.json")
}

/// Serializes a snapshot as pretty JSON.
pub fn encode(snapshot: &GameSnapshot) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Parses a save. `null` and unreadable JSON both yield `None`, which
/// restores a default game.
pub fn decode(text: &str) -> Option<GameSnapshot> {
    match serde_json::from_str::<Option<GameSnapshot>>(text) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%err, "unreadable save; starting from defaults");
            None
        }
    }
}

/// Writes the save next to its final location first, then renames it over
/// the old one, so a crash mid-write leaves the previous save intact.
pub async fn write_save(
    path: impl AsRef<Path>,
    snapshot: &GameSnapshot,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let text = encode(snapshot)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text).await?;
    fs::rename(&tmp, path).await?;
    info!(path = %path.display(), "game saved");
    Ok(())
}

/// Reads a save. A missing file is not an error: it means a new game.
pub async fn read_save(path: impl AsRef<Path>) -> Result<Option<GameSnapshot>, PersistenceError> {
    let path = path.as_ref();
    match fs::read_to_string(path).await {
        Ok(text) => Ok(decode(&text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no save found");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
