//! Host-filesystem target.

use std::fs;
use std::io;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use crate::error::ExtractError;
use crate::error::Result;

use super::Metadata;
use super::NodeKind;
use super::Target;
use super::copy_limited;

/// [`Target`] implementation that maps directly onto the host filesystem.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use unpax::target::{DiskTarget, Target};
///
/// let target = DiskTarget::new();
/// target.create_dir(Path::new("/tmp/out/sub"), 0o755)?;
/// # Ok::<(), unpax::ExtractError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskTarget;

impl DiskTarget {
    /// Creates a disk target.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Target for DiskTarget {
    fn create_dir(&self, path: &Path, mode: u32) -> Result<()> {
        fs::create_dir_all(path)?;
        set_permissions(path, mode)?;
        Ok(())
    }

    fn create_file(
        &self,
        path: &Path,
        src: &mut dyn Read,
        mode: u32,
        overwrite: bool,
        max_size: i64,
    ) -> Result<u64> {
        match fs::symlink_metadata(path) {
            Ok(existing) => {
                if !overwrite {
                    return Err(ExtractError::AlreadyExists {
                        path: path.to_path_buf(),
                    });
                }
                if existing.is_dir() {
                    return Err(ExtractError::Io(io::Error::new(
                        io::ErrorKind::IsADirectory,
                        format!("is a directory: {}", path.display()),
                    )));
                }
                // Remove rather than truncate so an existing symlink is
                // replaced instead of written through.
                fs::remove_file(path)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        let copied = copy_limited(src, &mut writer, max_size);
        writer.flush()?;
        let written = copied?;

        set_permissions(path, mode)?;
        Ok(written)
    }

    fn create_symlink(&self, link_target: &str, path: &Path, overwrite: bool) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(existing) => {
                if !overwrite {
                    return Err(ExtractError::AlreadyExists {
                        path: path.to_path_buf(),
                    });
                }
                if existing.is_dir() {
                    fs::remove_dir(path).map_err(|err| {
                        if err.kind() == io::ErrorKind::DirectoryNotEmpty {
                            ExtractError::AlreadyExists {
                                path: path.to_path_buf(),
                            }
                        } else {
                            err.into()
                        }
                    })?;
                } else {
                    fs::remove_file(path)?;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        symlink(link_target, path)?;
        Ok(())
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        let meta = fs::symlink_metadata(path)?;
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            NodeKind::Dir
        } else if file_type.is_file() {
            NodeKind::File
        } else if file_type.is_symlink() {
            NodeKind::Symlink
        } else {
            NodeKind::Other
        };
        let link_target = if kind == NodeKind::Symlink {
            fs::read_link(path).ok()
        } else {
            None
        };
        Ok(Metadata {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: meta.len(),
            mode: mode_of(&meta),
            modified: meta.modified().ok(),
            kind,
            link_target,
        })
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o555
    } else {
        0o755
    }
}

#[cfg(unix)]
fn symlink(link_target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link_target, path)
}

#[cfg(windows)]
fn symlink(link_target: &str, path: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(link_target, path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_dir_with_intermediates() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let path = temp.path().join("a/b/c");

        target.create_dir(&path, 0o755).unwrap();
        assert!(path.is_dir());
        // Idempotent
        target.create_dir(&path, 0o755).unwrap();
    }

    #[test]
    fn test_create_file_and_read_back() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let path = temp.path().join("out.txt");

        let n = target
            .create_file(&path, &mut &b"payload"[..], 0o644, false, -1)
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_create_file_exists_without_overwrite() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let path = temp.path().join("dup");

        target
            .create_file(&path, &mut &b"1"[..], 0o644, false, -1)
            .unwrap();
        let err = target
            .create_file(&path, &mut &b"2"[..], 0o644, false, -1)
            .unwrap_err();
        assert!(matches!(err, ExtractError::AlreadyExists { .. }));

        target
            .create_file(&path, &mut &b"2"[..], 0o644, true, -1)
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"2");
    }

    #[test]
    fn test_create_file_cap_writes_exactly_max() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let path = temp.path().join("capped");

        let err = target
            .create_file(&path, &mut &b"0123456789"[..], 0o644, false, 4)
            .unwrap_err();
        assert!(matches!(err, ExtractError::QuotaExceeded { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"0123");
    }

    #[test]
    #[cfg(unix)]
    fn test_create_file_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let path = temp.path().join("script.sh");

        target
            .create_file(&path, &mut &b"#!/bin/sh"[..], 0o755, false, -1)
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    #[cfg(unix)]
    fn test_create_symlink_and_lstat() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let link = temp.path().join("link");

        target.create_symlink("target.txt", &link, false).unwrap();

        let meta = target.lstat(&link).unwrap();
        assert!(meta.is_symlink());
        assert_eq!(
            meta.link_target,
            Some(std::path::PathBuf::from("target.txt"))
        );

        let err = target
            .create_symlink("other.txt", &link, false)
            .unwrap_err();
        assert!(matches!(err, ExtractError::AlreadyExists { .. }));

        target.create_symlink("other.txt", &link, true).unwrap();
        assert_eq!(
            fs::read_link(&link).unwrap(),
            std::path::PathBuf::from("other.txt")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_create_symlink_never_replaces_nonempty_dir() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let dir = temp.path().join("occupied");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("child"), "x").unwrap();

        let err = target.create_symlink("elsewhere", &dir, true).unwrap_err();
        assert!(matches!(err, ExtractError::AlreadyExists { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_overwrite_replaces_symlink_not_its_target() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let victim = temp.path().join("victim.txt");
        fs::write(&victim, "original").unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&victim, &link).unwrap();

        target
            .create_file(&link, &mut &b"new"[..], 0o644, true, -1)
            .unwrap();

        // The symlink is replaced by a regular file; the old target is intact.
        assert!(target.lstat(&link).unwrap().is_file());
        assert_eq!(fs::read(&victim).unwrap(), b"original");
    }

    #[test]
    fn test_lstat_missing() {
        let temp = TempDir::new().unwrap();
        let target = DiskTarget::new();
        let err = target.lstat(&temp.path().join("ghost")).unwrap_err();
        assert!(crate::target::is_not_found(&err));
    }
}
