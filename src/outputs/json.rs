//! JSON snapshot writing.
//!
//! Every persisted file is replaced whole: the content goes to a hidden
//! sibling temp file first and is then renamed over the target, so readers
//! never observe a half-written snapshot.
//!
//! Output is pretty-printed UTF-8 with two-space indentation; non-ASCII text
//! is written as-is.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::error::HarvestError;

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Replace `path` with `contents` via temp file + rename.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!(bytes = contents.len(), "Replaced file");
    Ok(())
}

/// Serialize `value` as indented JSON and replace `path` with it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json_pretty<T>(path: &Path, value: &T) -> Result<(), HarvestError>
where
    T: Serialize + ?Sized,
{
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(path, &json).await?;
    info!(path = %path.display(), "Wrote JSON snapshot");
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub async fn read_json<T>(path: &Path) -> Result<Option<T>, HarvestError>
where
    T: DeserializeOwned,
{
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_write_json_pretty_replaces_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("articles.json");

        write_json_pretty(&path, &json!([{"title": "旧"}])).await.unwrap();
        write_json_pretty(&path, &json!([{"title": "新"}])).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"新\""));
        assert!(text.contains("\n  {"));
        assert!(!tmp.path().join(".articles.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/out/daily.md");
        write_atomic(&path, b"# hi\n").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# hi\n");
    }

    #[tokio::test]
    async fn test_read_json_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let missing: Option<Value> = read_json(&tmp.path().join("nope.json")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_read_json_corrupt_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let res: Result<Option<Value>, _> = read_json(&path).await;
        assert!(matches!(res, Err(HarvestError::Json(_))));
    }
}
