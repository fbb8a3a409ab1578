//! JSON file persistence for the store.
//!
//! The whole state is rewritten after every merge that changes a value:
//! serialise compactly to a sibling `*.tmp` file, then rename over the
//! target so a crash never leaves a half-written store behind.

use std::path::Path;

use thiserror::Error;

use super::change::StoreState;

/// Errors raised while opening a persisted store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Load the state at `path`.  A missing file is an empty store.
pub fn load(path: &Path) -> Result<StoreState, StoreError> {
    if !path.exists() {
        return Ok(StoreState::new());
    }
    let bytes = std::fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(StoreState::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Atomically replace the file at `path` with `state`.
pub fn save(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(state)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
