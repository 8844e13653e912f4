//! In-memory filesystem implementing the target contract.
//!
//! [`MemoryFs`] is a concurrent-safe, path-addressed entry map. It
//! satisfies [`Target`] for host-free extraction and adds the read-side
//! operations tests need: open, stat, lstat, readlink, remove, read_dir,
//! read_file, sub and glob.
//!
//! Paths are slash-separated relative paths; the root `"."` is implicit
//! and always readable. Permission bits are stored but not enforced.

use std::collections::BTreeMap;
use std::io;
use std::io::Cursor;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::SystemTime;

use crate::error::ExtractError;
use crate::error::Result;
use crate::security::paths;

use super::Metadata;
use super::NodeKind;
use super::Target;
use super::copy_limited;

/// Symlink substitutions permitted during one path resolution.
const MAX_LINK_FOLLOWS: usize = 255;

/// Mode for directories created implicitly as intermediates.
const IMPLICIT_DIR_MODE: u32 = 0o755;

type NodeMap = BTreeMap<String, Node>;

#[derive(Debug, Clone)]
enum NodeData {
    File(Arc<[u8]>),
    Dir,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    mode: u32,
    modified: SystemTime,
}

impl Node {
    fn metadata(&self, name: &str) -> Metadata {
        let (kind, size, link_target) = match &self.data {
            NodeData::File(data) => (NodeKind::File, data.len() as u64, None),
            NodeData::Dir => (NodeKind::Dir, 0, None),
            NodeData::Symlink(target) => (
                NodeKind::Symlink,
                target.len() as u64,
                Some(PathBuf::from(target)),
            ),
        };
        Metadata {
            name: name.to_owned(),
            size,
            mode: self.mode,
            modified: Some(self.modified),
            kind,
            link_target,
        }
    }
}

/// Concurrent in-memory filesystem.
///
/// Cloning is cheap and shares storage; [`MemoryFs::sub`] returns a
/// subtree-scoped view over the same storage.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unpax::target::{MemoryFs, Target};
///
/// let fs = MemoryFs::new();
/// fs.create_dir(Path::new("docs"), 0o755)?;
/// fs.create_file(Path::new("docs/a.txt"), &mut &b"hi"[..], 0o644, false, -1)?;
///
/// assert_eq!(fs.read_file("docs/a.txt")?, b"hi");
/// assert_eq!(fs.read_dir("docs")?.len(), 1);
/// # Ok::<(), unpax::ExtractError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    nodes: Arc<RwLock<NodeMap>>,
    root: String,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, NodeMap> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, NodeMap> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Normalises an externally supplied path into a storage key.
    ///
    /// The input must be a valid UTF-8, slash-clean relative path that
    /// does not escape the root. `"."` addresses the (implicit) root.
    fn normalize(&self, path: &Path) -> Result<String> {
        let raw = path.to_str().ok_or_else(|| err_invalid(path))?;
        let cleaned = paths::clean(raw);
        if cleaned.starts_with('/') || paths::escapes_root(&cleaned) {
            return Err(err_invalid(path));
        }
        if self.root.is_empty() || cleaned == "." {
            if cleaned == "." && !self.root.is_empty() {
                return Ok(self.root.clone());
            }
            Ok(cleaned)
        } else {
            Ok(paths::join(&self.root, &cleaned))
        }
    }

    /// Resolves symlinks in `key`, left to right.
    ///
    /// Intermediate symlinks are always substituted (target joined against
    /// the parent directory); the terminal component follows only when
    /// `follow_terminal` is set. At most [`MAX_LINK_FOLLOWS`]
    /// substitutions are performed per resolution.
    fn resolve(&self, key: &str, follow_terminal: bool) -> Result<String> {
        let nodes = self.read_lock();
        let mut follows = 0;
        resolve_in(&nodes, key, follow_terminal, &mut follows)
    }

    /// Opens an entry for reading, following symlinks.
    ///
    /// Directories may be opened; the resulting handle fails `read` but
    /// supports [`MemoryFile::read_dir`].
    pub fn open(&self, path: impl AsRef<Path>) -> Result<MemoryFile> {
        let key = self.normalize(path.as_ref())?;
        let resolved = self.resolve(&key, true)?;
        if resolved == "." {
            return Ok(MemoryFile::dir(
                self.root_metadata(),
                self.list_dir(&resolved)?,
            ));
        }
        let (meta, data) = {
            let nodes = self.read_lock();
            let node = nodes
                .get(&resolved)
                .ok_or_else(|| err_not_found(&resolved))?;
            let meta = node.metadata(paths::base(&resolved));
            let data = match &node.data {
                NodeData::File(data) => Some(Arc::clone(data)),
                NodeData::Dir => None,
                NodeData::Symlink(_) => return Err(err_not_found(&resolved)),
            };
            (meta, data)
        };
        match data {
            Some(data) => Ok(MemoryFile::file(meta, data)),
            None => {
                let entries = self.list_dir(&resolved)?;
                Ok(MemoryFile::dir(meta, entries))
            }
        }
    }

    /// Returns metadata, following a terminal symlink.
    pub fn stat(&self, path: impl AsRef<Path>) -> Result<Metadata> {
        let key = self.normalize(path.as_ref())?;
        let resolved = self.resolve(&key, true)?;
        if resolved == "." {
            return Ok(self.root_metadata());
        }
        let nodes = self.read_lock();
        nodes
            .get(&resolved)
            .map(|node| node.metadata(paths::base(&resolved)))
            .ok_or_else(|| err_not_found(&key))
    }

    /// Reads the target of a symlink.
    pub fn readlink(&self, path: impl AsRef<Path>) -> Result<String> {
        let meta = self.lstat_impl(path.as_ref())?;
        match meta.link_target {
            Some(target) => Ok(target.to_string_lossy().into_owned()),
            None => Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symlink: {}", path.as_ref().display()),
            ))),
        }
    }

    /// Reads a whole file, following symlinks.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let mut file = self.open(path)?;
        let mut out = Vec::new();
        file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Removes an entry; directories are removed recursively.
    ///
    /// Removing a missing entry is not an error. Symlinks are removed,
    /// never followed.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let key = self.normalize(path.as_ref())?;
        if key == "." {
            return Err(err_invalid(path.as_ref()));
        }
        let mut nodes = self.write_lock();
        nodes.remove(&key);
        let prefix = format!("{key}/");
        nodes.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    /// Lists a directory's entries, sorted by name.
    pub fn read_dir(&self, path: impl AsRef<Path>) -> Result<Vec<Metadata>> {
        let key = self.normalize(path.as_ref())?;
        let resolved = self.resolve(&key, true)?;
        self.list_dir(&resolved)
    }

    /// Returns a subtree-scoped view sharing this filesystem's storage.
    pub fn sub(&self, path: impl AsRef<Path>) -> Result<Self> {
        let key = self.normalize(path.as_ref())?;
        let resolved = self.resolve(&key, true)?;
        if resolved != "." {
            let nodes = self.read_lock();
            match nodes.get(&resolved) {
                Some(node) if matches!(node.data, NodeData::Dir) => {}
                Some(_) => return Err(err_not_dir(&resolved)),
                None => return Err(err_not_found(&resolved)),
            }
        }
        Ok(Self {
            nodes: Arc::clone(&self.nodes),
            root: if resolved == "." {
                self.root.clone()
            } else {
                resolved
            },
        })
    }

    /// Returns the stored paths matching a glob pattern, sorted.
    pub fn glob(&self, pattern: &str) -> Vec<String> {
        let nodes = self.read_lock();
        let prefix = if self.root.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root)
        };
        nodes
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rel| glob_match::glob_match(pattern, rel))
            .map(ToOwned::to_owned)
            .collect()
    }

    fn root_metadata(&self) -> Metadata {
        Metadata {
            name: ".".to_owned(),
            size: 0,
            mode: IMPLICIT_DIR_MODE,
            modified: None,
            kind: NodeKind::Dir,
            link_target: None,
        }
    }

    fn list_dir(&self, resolved: &str) -> Result<Vec<Metadata>> {
        let nodes = self.read_lock();
        if resolved != "." {
            match nodes.get(resolved) {
                Some(node) if matches!(node.data, NodeData::Dir) => {}
                Some(_) => return Err(err_not_dir(resolved)),
                None => return Err(err_not_found(resolved)),
            }
        }
        let prefix = if resolved == "." {
            String::new()
        } else {
            format!("{resolved}/")
        };
        // BTreeMap iteration keeps the listing sorted by name.
        Ok(nodes
            .iter()
            .filter_map(|(key, node)| {
                let rel = key.strip_prefix(&prefix)?;
                if rel.is_empty() || rel.contains('/') {
                    return None;
                }
                Some(node.metadata(rel))
            })
            .collect())
    }

    fn lstat_impl(&self, path: &Path) -> Result<Metadata> {
        let key = self.normalize(path)?;
        if key == "." {
            return Ok(self.root_metadata());
        }
        // Resolve symlinks in the parent chain only.
        let parent = paths::parent(&key);
        let resolved_parent = if parent == "." {
            String::new()
        } else {
            self.resolve(parent, true)?
        };
        let full = if resolved_parent.is_empty() || resolved_parent == "." {
            paths::base(&key).to_owned()
        } else {
            paths::join(&resolved_parent, paths::base(&key))
        };
        let nodes = self.read_lock();
        nodes
            .get(&full)
            .map(|node| node.metadata(paths::base(&full)))
            .ok_or_else(|| err_not_found(&key))
    }

    fn has_children(nodes: &NodeMap, key: &str) -> bool {
        let prefix = format!("{key}/");
        nodes.keys().any(|k| k.starts_with(&prefix))
    }

    /// Resolves the parent chain of `key` (following symlinks, as a real
    /// filesystem would) and returns the storage key for the final
    /// component.
    fn storage_key(nodes: &NodeMap, key: &str) -> Result<String> {
        let parent = paths::parent(key);
        if parent == "." {
            return Ok(key.to_owned());
        }
        let mut follows = 0;
        let resolved = resolve_in(nodes, parent, true, &mut follows)?;
        if resolved != "." {
            match nodes.get(&resolved) {
                Some(node) if matches!(node.data, NodeData::Dir) => {}
                Some(_) => return Err(err_not_dir(parent)),
                None => return Err(err_not_found(parent)),
            }
        }
        Ok(paths::join(&resolved, paths::base(key)))
    }
}

impl Target for MemoryFs {
    fn create_dir(&self, path: &Path, mode: u32) -> Result<()> {
        let key = self.normalize(path)?;
        if key == "." {
            return Ok(());
        }
        let mut nodes = self.write_lock();
        let components: Vec<&str> = key.split('/').collect();
        let mut acc = String::from(".");
        for (i, component) in components.iter().enumerate() {
            let is_last = i + 1 == components.len();
            let next = paths::join(&acc, component);
            match nodes.get(&next) {
                Some(node) => match &node.data {
                    NodeData::Dir => acc = next,
                    NodeData::Symlink(_) => {
                        // Follow an existing symlinked intermediate the way
                        // the host filesystem would.
                        let mut follows = 0;
                        let resolved = resolve_in(&nodes, &next, true, &mut follows)?;
                        match nodes.get(&resolved) {
                            Some(node) if matches!(node.data, NodeData::Dir) => acc = resolved,
                            _ => return Err(err_not_dir(&next)),
                        }
                    }
                    NodeData::File(_) => return Err(err_not_dir(&next)),
                },
                None => {
                    nodes.insert(
                        next.clone(),
                        Node {
                            data: NodeData::Dir,
                            mode: if is_last { mode } else { IMPLICIT_DIR_MODE },
                            modified: SystemTime::now(),
                        },
                    );
                    acc = next;
                }
            }
        }
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
        let key = self.normalize(path)?;
        if key == "." {
            return Err(err_invalid(path));
        }
        let storage = {
            let nodes = self.read_lock();
            let storage = Self::storage_key(&nodes, &key)?;
            match nodes.get(&storage) {
                Some(node) if matches!(node.data, NodeData::Dir) => {
                    return Err(ExtractError::Io(io::Error::new(
                        io::ErrorKind::IsADirectory,
                        format!("is a directory: {key}"),
                    )));
                }
                Some(_) if !overwrite => {
                    return Err(ExtractError::AlreadyExists {
                        path: path.to_path_buf(),
                    });
                }
                _ => {}
            }
            storage
        };

        let mut data = Vec::new();
        let written = copy_limited(src, &mut data, max_size)?;
        self.write_lock().insert(
            storage,
            Node {
                data: NodeData::File(Arc::from(data)),
                mode,
                modified: SystemTime::now(),
            },
        );
        Ok(written)
    }

    fn create_symlink(&self, link_target: &str, path: &Path, overwrite: bool) -> Result<()> {
        let key = self.normalize(path)?;
        if key == "." {
            return Err(err_invalid(path));
        }
        let mut nodes = self.write_lock();
        let key = Self::storage_key(&nodes, &key)?;
        if let Some(existing) = nodes.get(&key) {
            let non_empty_dir =
                matches!(existing.data, NodeData::Dir) && Self::has_children(&nodes, &key);
            if !overwrite || non_empty_dir {
                return Err(ExtractError::AlreadyExists {
                    path: path.to_path_buf(),
                });
            }
            nodes.remove(&key);
        }
        nodes.insert(
            key,
            Node {
                data: NodeData::Symlink(link_target.to_owned()),
                mode: 0o777,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        self.lstat_impl(path)
    }
}

fn resolve_in(
    nodes: &NodeMap,
    key: &str,
    follow_terminal: bool,
    follows: &mut usize,
) -> Result<String> {
    if key == "." || key.is_empty() {
        return Ok(".".to_owned());
    }
    let components: Vec<&str> = key.split('/').collect();
    let mut resolved = String::from(".");
    for (i, component) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        let next = paths::join(&resolved, component);
        if paths::escapes_root(&next) {
            return Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid path: {key}"),
            )));
        }
        match nodes.get(&next) {
            Some(node) => match &node.data {
                NodeData::Symlink(target) if !is_last || follow_terminal => {
                    *follows += 1;
                    if *follows > MAX_LINK_FOLLOWS {
                        return Err(ExtractError::Io(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("too many links: {key}"),
                        )));
                    }
                    let substituted = paths::join(&resolved, target);
                    resolved = resolve_in(nodes, &substituted, true, follows)?;
                }
                NodeData::File(_) if !is_last => {
                    return Err(ExtractError::Io(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {next}"),
                    )));
                }
                _ => resolved = next,
            },
            None if is_last => resolved = next,
            None => return Err(err_not_found(key)),
        }
    }
    Ok(resolved)
}

/// Readable handle produced by [`MemoryFs::open`].
#[derive(Debug)]
pub struct MemoryFile {
    meta: Metadata,
    content: FileContent,
}

#[derive(Debug)]
enum FileContent {
    File(Cursor<Arc<[u8]>>),
    Dir { entries: Vec<Metadata>, pos: usize },
}

impl MemoryFile {
    fn file(meta: Metadata, data: Arc<[u8]>) -> Self {
        Self {
            meta,
            content: FileContent::File(Cursor::new(data)),
        }
    }

    fn dir(meta: Metadata, entries: Vec<Metadata>) -> Self {
        Self {
            meta,
            content: FileContent::Dir { entries, pos: 0 },
        }
    }

    /// Metadata of the opened entry.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Reads directory entries with pagination.
    ///
    /// `n <= 0` returns all remaining entries; `n > 0` returns up to `n`
    /// and an empty vector once the listing is exhausted. Entries arrive
    /// sorted by name.
    pub fn read_dir(&mut self, n: isize) -> Result<Vec<Metadata>> {
        match &mut self.content {
            FileContent::File(_) => Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", self.meta.name),
            ))),
            FileContent::Dir { entries, pos } => {
                let remaining = entries.len() - *pos;
                let take = if n <= 0 {
                    remaining
                } else {
                    remaining.min(usize::try_from(n).unwrap_or(remaining))
                };
                let batch = entries[*pos..*pos + take].to_vec();
                *pos += take;
                Ok(batch)
            }
        }
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.content {
            FileContent::File(cursor) => cursor.read(buf),
            FileContent::Dir { .. } => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", self.meta.name),
            )),
        }
    }
}

fn err_invalid(path: &Path) -> ExtractError {
    ExtractError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid path: {}", path.display()),
    ))
}

fn err_not_found(path: &str) -> ExtractError {
    ExtractError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {path}"),
    ))
}

fn err_not_dir(path: &str) -> ExtractError {
    ExtractError::Io(io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("not a directory: {path}"),
    ))
}
