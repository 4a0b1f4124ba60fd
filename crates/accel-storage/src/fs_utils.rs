//! Filesystem helpers for atomic replacement.
//!
//! Every artifact a concurrent reader may look at is written to a temporary
//! sibling first and renamed into place, so readers observe either the old
//! value or the new one and never a partial write.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::error::StorageResult;

/// Temporary sibling path for `path`, hidden from listings.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Replace `path` with `data` atomically.
pub async fn atomic_write(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> StorageResult<()> {
    let path = path.as_ref();
    let tmp = temp_sibling(path);

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data.as_ref()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Stream `reader` into `path` atomically, returning the number of bytes written.
pub async fn atomic_write_from<R>(path: impl AsRef<Path>, reader: &mut R) -> StorageResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let path = path.as_ref();
    let tmp = temp_sibling(path);

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        Ok::<u64, std::io::Error>(written)
    }
    .await;

    match result {
        Ok(written) => Ok(written),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            Err(e.into())
        }
    }
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first. On EXDEV it copies to a temporary sibling of `dst`,
/// renames that into place and removes the source.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy: {} -> {}",
                src.display(),
                dst.display()
            );
            let tmp = temp_sibling(dst);
            if let Err(e) = fs::copy(src, &tmp).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&tmp, dst).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");

        atomic_write(&path, b"first").await.unwrap();
        atomic_write(&path, b"second").await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        atomic_write(dir.path().join("a"), b"x").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_atomic_write_from_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.bin");
        let mut reader: &[u8] = b"streamed payload";

        let written = atomic_write_from(&path, &mut reader).await.unwrap();

        assert_eq!(written, 16);
        assert_eq!(fs::read(&path).await.unwrap(), b"streamed payload");
    }

    #[tokio::test]
    async fn test_atomic_write_into_missing_dir_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a");
        assert!(atomic_write(&path, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("out.mp4");
        fs::write(&src, b"video").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
