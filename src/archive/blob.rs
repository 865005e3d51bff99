use crate::archive::{ArchiveError, ArchiveResult};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

/// Trait for blob store backends
///
/// `upload` must never replace an existing object: it behaves like a write
/// with a generation-match precondition of zero.
pub trait BlobStore {
    /// Copies `bucket/remote_path` to `local_path`, replacing any local file
    fn download(&self, bucket: &str, remote_path: &str, local_path: &Path) -> ArchiveResult<()>;

    /// Copies `local_path` to `bucket/remote_path`
    ///
    /// Fails with [`ArchiveError::UploadConflict`] if the object exists.
    fn upload(&self, bucket: &str, local_path: &Path, remote_path: &str) -> ArchiveResult<()>;
}

/// Blob store backed by a directory tree
///
/// Each bucket is a subdirectory of `root` and object names map to relative
/// paths inside it, which suits mounted bucket filesystems and tests.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an object name to a path, rejecting names that escape the bucket
    fn object_path(&self, bucket: &str, remote_path: &str) -> ArchiveResult<PathBuf> {
        let relative = Path::new(remote_path);
        let is_safe = !remote_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_safe || bucket.is_empty() || bucket.contains('/') {
            return Err(ArchiveError::InvalidPath(format!("{}/{}", bucket, remote_path)));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn download(&self, bucket: &str, remote_path: &str, local_path: &Path) -> ArchiveResult<()> {
        let source = self.object_path(bucket, remote_path)?;
        if !source.is_file() {
            return Err(ArchiveError::NotFound {
                bucket: bucket.to_string(),
                remote_path: remote_path.to_string(),
            });
        }

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::copy(&source, local_path)?;

        tracing::info!(
            "Downloaded {}/{} to {}",
            bucket,
            remote_path,
            local_path.display()
        );
        Ok(())
    }

    fn upload(&self, bucket: &str, local_path: &Path, remote_path: &str) -> ArchiveResult<()> {
        let target = self.object_path(bucket, remote_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut source = fs::File::open(local_path)?;
        let mut destination = match OpenOptions::new().write(true).create_new(true).open(&target)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ArchiveError::UploadConflict {
                    bucket: bucket.to_string(),
                    remote_path: remote_path.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = io::copy(&mut source, &mut destination).and_then(|_| destination.sync_all())
        {
            // A half-written object would block every retry with a conflict
            let _ = fs::remove_file(&target);
            return Err(e.into());
        }

        tracing::info!(
            "Uploaded {} to {}/{}",
            local_path.display(),
            bucket,
            remote_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("buckets"));
        (dir, store)
    }

    #[test]
    fn test_upload_then_download() {
        let (dir, store) = store();
        let local = dir.path().join("artifact.gz");
        fs::write(&local, b"payload").unwrap();

        store.upload("data", &local, "out/story_metas_1.gz").unwrap();

        let copy = dir.path().join("copy.gz");
        store.download("data", "out/story_metas_1.gz", &copy).unwrap();
        assert_eq!(fs::read(&copy).unwrap(), b"payload");
    }

    #[test]
    fn test_upload_refuses_existing_object() {
        let (dir, store) = store();
        let local = dir.path().join("artifact.gz");
        fs::write(&local, b"first").unwrap();
        store.upload("data", &local, "story_metas_1.gz").unwrap();

        fs::write(&local, b"second").unwrap();
        let result = store.upload("data", &local, "story_metas_1.gz");
        assert!(matches!(result, Err(ArchiveError::UploadConflict { .. })));

        let stored = store.root().join("data").join("story_metas_1.gz");
        assert_eq!(fs::read(stored).unwrap(), b"first");
        assert_eq!(fs::read(&local).unwrap(), b"second");
    }

    #[test]
    fn test_download_missing_object() {
        let (dir, store) = store();
        let result = store.download("data", "urldir/1.txt", &dir.path().join("1.txt"));
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (dir, store) = store();
        let local = dir.path().join("artifact.gz");
        fs::write(&local, b"x").unwrap();

        assert!(matches!(
            store.upload("data", &local, "../escape.gz"),
            Err(ArchiveError::InvalidPath(_))
        ));
        assert!(matches!(
            store.upload("data", &local, "/abs.gz"),
            Err(ArchiveError::InvalidPath(_))
        ));
        assert!(matches!(
            store.upload("a/b", &local, "x.gz"),
            Err(ArchiveError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_upload_missing_local_file() {
        let (dir, store) = store();
        let result = store.upload("data", &dir.path().join("absent.gz"), "x.gz");
        assert!(matches!(result, Err(ArchiveError::Io(_))));
        assert!(!store.root().join("data").join("x.gz").exists());
    }
}
