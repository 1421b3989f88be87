use crate::core::{DbError, Result};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Reads and parses a collection file. `Ok(None)` when it does not exist.
pub async fn read_json(path: &Path) -> Result<Option<Value>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(DbError::IoError(format!(
                "Failed to read '{}': {}",
                path.display(),
                err
            )));
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| DbError::parse(path, err))
}

pub fn encode(value: &Value, pretty: bool) -> Result<Vec<u8>> {
    let encoded = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    encoded.map_err(|err| DbError::IoError(format!("Failed to encode JSON: {}", err)))
}

/// Writes `bytes` next to `path` and renames over it, so readers of the
/// file see either the old or the new content.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|err| {
                DbError::persistence(
                    path,
                    format!("failed to create directory '{}': {}", parent.display(), err),
                )
            })?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await.map_err(|err| {
        DbError::persistence(
            path,
            format!("failed to write temp file '{}': {}", tmp.display(), err),
        )
    })?;

    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(DbError::persistence(
            path,
            format!("failed to rename '{}': {}", tmp.display(), err),
        ));
    }
    Ok(())
}
