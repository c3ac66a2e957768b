//! Atomic token publication
//!
//! Tokens are written to `<path>.tmp` in the target's directory and renamed
//! over the target, so a reader sees either the previous token or the new
//! one and never a partial write. Rename is only atomic within a single
//! filesystem, which is why the temp file must be a sibling of the target.

use std::ffi::OsString;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PublishError;

/// Token files are readable and writable by the owner only
pub const TOKEN_FILE_MODE: u32 = 0o600;

/// Token directory is owner rwx only
pub const TOKEN_DIR_MODE: u32 = 0o700;

/// Writes tokens atomically to a fixed path
#[derive(Debug, Clone)]
pub struct TokenPublisher {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl TokenPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp: OsString = path.clone().into_os_string();
        tmp.push(".tmp");

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    /// Path the token is published to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path used while a publish is in progress
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Atomically replace the token file with `secret`.
    ///
    /// The bytes are written verbatim; no trailing newline is added.
    pub fn publish(&self, secret: &[u8]) -> Result<(), PublishError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir(dir).map_err(|source| PublishError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        if let Err(source) = self.write_tmp(secret) {
            self.remove_tmp();
            return Err(PublishError::WriteTemp {
                path: self.tmp_path.clone(),
                source,
            });
        }

        if let Err(source) = fs::rename(&self.tmp_path, &self.path) {
            self.remove_tmp();
            return Err(PublishError::Rename {
                path: self.path.clone(),
                source,
            });
        }

        Ok(())
    }

    fn write_tmp(&self, secret: &[u8]) -> std::io::Result<()> {
        // A temp file left over from a crash may carry looser permissions;
        // the mode below only applies on creation.
        let _ = fs::remove_file(&self.tmp_path);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(TOKEN_FILE_MODE);
        }

        let mut file = options.open(&self.tmp_path)?;
        file.write_all(secret)?;
        file.sync_all()?;
        Ok(())
    }

    fn remove_tmp(&self) {
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            debug!(
                path = ?self.tmp_path,
                error = %e,
                "Failed to remove temp token file"
            );
        }
    }
}

fn create_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(TOKEN_DIR_MODE);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_publish_round_trip() {
        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));

        publisher.publish(b"tok_abc123").unwrap();

        let content = fs::read(publisher.path()).unwrap();
        assert_eq!(content, b"tok_abc123");
        assert!(!publisher.tmp_path().exists());
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let publisher = TokenPublisher::new("/var/run/github/token");
        assert_eq!(
            publisher.tmp_path(),
            Path::new("/var/run/github/token.tmp")
        );
    }

    #[test]
    fn test_publish_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("var/run/github/token");
        let publisher = TokenPublisher::new(&target);

        publisher.publish(b"ghs_nested").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "ghs_nested");
    }

    #[test]
    fn test_publish_same_value_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));

        publisher.publish(b"ghs_same").unwrap();
        let first = fs::read(publisher.path()).unwrap();
        publisher.publish(b"ghs_same").unwrap();
        let second = fs::read(publisher.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, b"ghs_same");
    }

    #[test]
    fn test_publish_overwrites_previous_token() {
        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));

        publisher.publish(b"ghs_old_token_that_is_longer").unwrap();
        publisher.publish(b"ghs_new").unwrap();

        assert_eq!(fs::read(publisher.path()).unwrap(), b"ghs_new");
    }

    #[cfg(unix)]
    #[test]
    fn test_publish_uses_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let token_dir = dir.path().join("github");
        let publisher = TokenPublisher::new(token_dir.join("token"));

        publisher.publish(b"ghs_perm").unwrap();

        let file_mode = fs::metadata(publisher.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, TOKEN_FILE_MODE);

        let dir_mode = fs::metadata(&token_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, TOKEN_DIR_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_tmp_file_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));
        fs::write(publisher.tmp_path(), b"stale").unwrap();
        fs::set_permissions(publisher.tmp_path(), fs::Permissions::from_mode(0o644)).unwrap();

        publisher.publish(b"ghs_fresh").unwrap();

        let mode = fs::metadata(publisher.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, TOKEN_FILE_MODE);
        assert_eq!(fs::read(publisher.path()).unwrap(), b"ghs_fresh");
    }

    #[test]
    fn test_interrupted_write_leaves_target_intact() {
        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));
        publisher.publish(b"ghs_previous").unwrap();

        // Simulate a crash after a partial temp write but before rename
        fs::write(publisher.tmp_path(), b"ghs_ne").unwrap();
        assert_eq!(fs::read(publisher.path()).unwrap(), b"ghs_previous");

        publisher.publish(b"ghs_next").unwrap();
        assert_eq!(fs::read(publisher.path()).unwrap(), b"ghs_next");
        assert!(!publisher.tmp_path().exists());
    }

    #[test]
    fn test_rename_failure_cleans_up_and_keeps_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("token");
        // A non-empty directory at the target path makes rename fail
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"previous").unwrap();
        let publisher = TokenPublisher::new(&target);

        let err = publisher.publish(b"ghs_new").unwrap_err();

        assert!(matches!(err, PublishError::Rename { .. }));
        assert!(!publisher.tmp_path().exists());
        assert_eq!(fs::read(target.join("keep")).unwrap(), b"previous");
    }

    #[test]
    fn test_temp_write_failure_keeps_target() {
        let dir = tempdir().unwrap();
        let publisher = TokenPublisher::new(dir.path().join("token"));
        publisher.publish(b"ghs_previous").unwrap();

        // A directory at the temp path makes the temp write fail
        fs::create_dir(publisher.tmp_path()).unwrap();

        let err = publisher.publish(b"ghs_new").unwrap_err();

        assert!(matches!(err, PublishError::WriteTemp { .. }));
        assert_eq!(fs::read(publisher.path()).unwrap(), b"ghs_previous");
    }

    #[test]
    fn test_directory_creation_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let publisher = TokenPublisher::new(blocker.join("token"));

        let err = publisher.publish(b"ghs_new").unwrap_err();

        assert!(matches!(err, PublishError::CreateDir { .. }));
    }
}
