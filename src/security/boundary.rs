//! Safe-write boundary.
//!
//! Every file, directory and symlink creation request passes through
//! [`Boundary`] before reaching the target. The checks run in order:
//! name restrictions, absolute-prefix stripping, lexical traversal
//! rejection, a per-component symlink walk over the existing intermediate
//! directories, and — for symlinks — the same two checks again on the
//! resolved link destination so a link cannot point outside the root.

use std::io::Read;
use std::path::Path;

use crate::config::Config;
use crate::error::ExtractError;
use crate::error::Result;
use crate::target::Target;
use crate::target::is_not_found;

use super::names;
use super::paths;

/// Policy-enforcing mediator between the extraction pipeline and a target.
pub(crate) struct Boundary<'a> {
    target: &'a dyn Target,
    dest: &'a Path,
    config: &'a Config,
}

impl<'a> Boundary<'a> {
    pub(crate) fn new(target: &'a dyn Target, dest: &'a Path, config: &'a Config) -> Self {
        Self {
            target,
            dest,
            config,
        }
    }

    /// Creates a directory entry after full validation.
    pub(crate) fn create_dir(&self, name: &str, mode: u32) -> Result<()> {
        let rel = self.secure_name(name)?;
        self.check_intermediates(&rel)?;
        self.target.create_dir(&self.dest.join(&rel), mode)
    }

    /// Creates a regular file entry after full validation, returning the
    /// number of bytes written.
    ///
    /// Missing parent directories are created with
    /// `custom_create_dir_mode` before the write.
    pub(crate) fn create_file(
        &self,
        name: &str,
        src: &mut dyn Read,
        mode: u32,
        max_size: i64,
    ) -> Result<u64> {
        let rel = self.secure_name(name)?;
        self.check_intermediates(&rel)?;
        self.ensure_parent(&rel)?;
        self.target
            .create_file(&self.dest.join(&rel), src, mode, self.config.overwrite, max_size)
    }

    /// Creates a symlink entry after full validation of both the link
    /// location and the resolved link destination.
    pub(crate) fn create_symlink(&self, name: &str, link_target: &str) -> Result<()> {
        let rel = self.secure_name(name)?;
        if link_target.is_empty() {
            return Err(ExtractError::InvalidName {
                name: name.to_owned(),
                reason: "empty symlink target",
            });
        }
        if paths::is_absolute_link_target(link_target) {
            return Err(ExtractError::AbsoluteLinkTarget {
                name: name.to_owned(),
                target: link_target.to_owned(),
            });
        }

        // Where the link resolves to, relative to the destination root; the
        // link must not point outside it.
        let resolved = paths::join(paths::parent(&rel), link_target);
        if paths::escapes_root(&resolved) {
            return Err(ExtractError::PathTraversal {
                name: format!("{name} -> {link_target}"),
            });
        }

        self.check_intermediates(&rel)?;
        if resolved != "." {
            self.check_intermediates(&resolved)?;
        }
        self.ensure_parent(&rel)?;
        self.target
            .create_symlink(link_target, &self.dest.join(&rel), self.config.overwrite)
    }

    /// Runs the name check, absolute-prefix stripping and lexical
    /// traversal rejection, yielding the cleaned relative path.
    fn secure_name(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(ExtractError::InvalidName {
                name: String::new(),
                reason: "empty name",
            });
        }
        let stripped = paths::strip_absolute_prefix(name);
        names::check_name(stripped)?;
        let cleaned = paths::clean(stripped);
        if cleaned == "." || cleaned == ".." || paths::escapes_root(&cleaned) {
            return Err(ExtractError::PathTraversal {
                name: name.to_owned(),
            });
        }
        Ok(cleaned)
    }

    /// Walks the existing intermediate directories of `rel` and rejects
    /// (or, with `follow_symlinks`, warns about) symlinked elements.
    ///
    /// A non-existent intermediate short-circuits the walk.
    fn check_intermediates(&self, rel: &str) -> Result<()> {
        let components: Vec<&str> = rel.split('/').collect();
        let mut acc = self.dest.to_path_buf();
        for component in &components[..components.len().saturating_sub(1)] {
            acc.push(component);
            match self.target.lstat(&acc) {
                Ok(meta) if meta.is_symlink() => {
                    let link = meta.link_target.unwrap_or_default();
                    if self.config.follow_symlinks {
                        tracing::warn!(
                            path = %acc.display(),
                            target = %link.display(),
                            "following symlink in extraction path"
                        );
                    } else {
                        return Err(ExtractError::SymlinkInPath {
                            path: acc,
                            target: link,
                        });
                    }
                }
                Ok(_) => {}
                Err(ref err) if is_not_found(err) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Creates the parent directory of `rel` when it does not exist yet.
    fn ensure_parent(&self, rel: &str) -> Result<()> {
        let parent = paths::parent(rel);
        if parent == "." {
            return Ok(());
        }
        let full = self.dest.join(parent);
        match self.target.lstat(&full) {
            Ok(_) => Ok(()),
            Err(ref err) if is_not_found(err) => self
                .target
                .create_dir(&full, self.config.custom_create_dir_mode),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::target::MemoryFs;
    use std::path::Path;

    fn boundary_over<'a>(fs: &'a MemoryFs, config: &'a Config) -> Boundary<'a> {
        Boundary::new(fs, Path::new("."), config)
    }

    #[test]
    fn test_create_file_plain() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let n = boundary
            .create_file("file.txt", &mut &b"data"[..], 0o644, -1)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(fs.read_file("file.txt").unwrap(), b"data");
    }

    #[test]
    fn test_create_file_creates_missing_parents() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        boundary
            .create_file("deep/nested/file.txt", &mut &b"x"[..], 0o644, -1)
            .unwrap();
        assert!(fs.stat("deep").unwrap().is_dir());
        assert_eq!(
            fs.stat("deep/nested").unwrap().mode,
            config.custom_create_dir_mode
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let err = boundary
            .create_file("../escape", &mut &b"x"[..], 0o644, -1)
            .unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));

        let err = boundary
            .create_file("ok/../../escape", &mut &b"x"[..], 0o644, -1)
            .unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
    }

    #[test]
    fn test_absolute_prefix_stripped() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        boundary
            .create_file("/abs/file", &mut &b"x"[..], 0o644, -1)
            .unwrap();
        assert!(fs.stat("abs/file").unwrap().is_file());
    }

    #[test]
    fn test_empty_name_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let err = boundary.create_dir("", 0o755).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidName { .. }));
        // "/" strips to nothing
        let err = boundary.create_dir("/", 0o755).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidName { .. }));
    }

    #[test]
    #[cfg(not(windows))]
    fn test_absolute_symlink_target_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let err = boundary
            .create_symlink("testLink", "/absolute-target")
            .unwrap_err();
        assert!(matches!(err, ExtractError::AbsoluteLinkTarget { .. }));
    }

    #[test]
    fn test_symlink_escaping_root_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let err = boundary.create_symlink("link", "../outside").unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));

        // Escape through a subdirectory
        let err = boundary
            .create_symlink("sub/link", "../../outside")
            .unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
    }

    #[test]
    fn test_symlink_within_root_allowed() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        boundary
            .create_file("target.txt", &mut &b"x"[..], 0o644, -1)
            .unwrap();
        boundary.create_symlink("link", "target.txt").unwrap();
        assert!(fs.lstat(Path::new("link")).unwrap().is_symlink());

        // Sibling-relative target staying inside the root
        boundary
            .create_file("sub/inner.txt", &mut &b"y"[..], 0o644, -1)
            .unwrap();
        boundary.create_symlink("sub/link", "../target.txt").unwrap();
    }

    #[test]
    fn test_symlinked_intermediate_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        // First entry plants a symlink pointing at the parent directory.
        boundary.create_symlink("sub/to-parent", "../").unwrap();
        // Writing through it must fire the per-component check.
        let err = boundary
            .create_file("sub/to-parent/one-above", &mut &b"x"[..], 0o644, -1)
            .unwrap_err();
        assert!(
            matches!(err, ExtractError::SymlinkInPath { .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_symlinked_intermediate_followed_when_configured() {
        let fs = MemoryFs::new();
        let config = Config {
            follow_symlinks: true,
            ..Config::default()
        };
        let boundary = boundary_over(&fs, &config);

        boundary.create_dir("real", 0o755).unwrap();
        boundary.create_symlink("alias", "real").unwrap();
        boundary
            .create_file("alias/file", &mut &b"x"[..], 0o644, -1)
            .unwrap();
    }

    #[test]
    fn test_overwrite_disabled_surfaces_exists() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        boundary
            .create_file("dup", &mut &b"1"[..], 0o644, -1)
            .unwrap();
        let err = boundary
            .create_file("dup", &mut &b"2"[..], 0o644, -1)
            .unwrap_err();
        assert!(matches!(err, ExtractError::AlreadyExists { .. }));
    }

    #[test]
    #[cfg(not(windows))]
    fn test_forbidden_character_rejected() {
        let fs = MemoryFs::new();
        let config = Config::default();
        let boundary = boundary_over(&fs, &config);

        let err = boundary
            .create_file("bad|name", &mut &b"x"[..], 0o644, -1)
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidName { .. }));
    }
}
