//! JSON persistence for the target list.

use super::Target;
use crate::error::PersistenceError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Loads targets from `path`. A missing file is an empty list.
#[tracing::instrument]
pub async fn load_targets(path: &Path) -> Result<Vec<Target>, PersistenceError> {
    Ok(read_json::<Vec<Target>>(path).await?.unwrap_or_default())
}

/// Saves targets to `path` without ever leaving a half-written file behind.
#[tracing::instrument(skip(targets), fields(count = targets.len()))]
pub async fn save_targets(path: &Path, targets: &[Target]) -> Result<(), PersistenceError> {
    write_json_atomically(path, &targets).await
}

/// Reads and decodes a JSON file, `Ok(None)` if it does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, PersistenceError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Writes pretty JSON to a uniquely named sibling temp file, then renames it
/// over `path`. Concurrent writers never share a temp file.
pub(crate) async fn write_json_atomically<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_vec_pretty(value)?;
    let dest = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || replace_file(&dest, &data))
        .await
        .map_err(std::io::Error::other)
        .and_then(|r| r);
    result.map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn replace_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overlapping_writes_leave_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");

        let mut handles = Vec::new();
        for i in 0..16usize {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let targets: Vec<Target> = (0..=i)
                    .map(|n| Target::new(format!("t{n}"), "127.0.0.1:80", "tcp").with_id(n.to_string()))
                    .collect();
                save_targets(&path, &targets).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = load_targets(&path).await.unwrap();
        assert!(!loaded.is_empty());
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["servers.json".to_string()]);
    }
}
