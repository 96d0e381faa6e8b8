//! Atomic file writes shared by the state stores

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Write `contents` to a sibling temp file, then rename it over `path`.
///
/// `private` files are created with mode 0600 on Unix.
pub(crate) async fn write_atomic(
    path: &Path,
    contents: &[u8],
    private: bool,
) -> Result<(), StorageError> {
    let staged = stage(path, contents, private).await?;
    commit(&staged, path).await
}

/// Write `contents` to the sibling temp file of `path` and return its path
pub(crate) async fn stage(
    path: &Path,
    contents: &[u8],
    private: bool,
) -> Result<PathBuf, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let tmp_path = temp_path(path);
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| StorageError::io(&tmp_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if private {
            let mode = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&tmp_path, mode).await {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(StorageError::io(&tmp_path, e));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(tmp_path)
}

/// Rename a staged file over `path`; the temp file is removed on failure
pub(crate) async fn commit(staged: &Path, path: &Path) -> Result<(), StorageError> {
    if let Err(e) = tokio::fs::rename(staged, path).await {
        discard(staged).await;
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

/// Remove a staged file, ignoring errors
pub(crate) async fn discard(staged: &Path) {
    let _ = tokio::fs::remove_file(staged).await;
}

/// Read a file, mapping "not found" to `None`
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first", false).await.unwrap();
        write_atomic(&path, b"second", false).await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some("second"));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent")).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.com.key");
        write_atomic(&path, b"key", true).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
