//! The declarative description a tree is built from.
//!
//! A [`TreeSpec`] maps paths to entries: plain content for files, nested
//! [`DirSpec`]s for directories, and marker values built with [`file`],
//! [`dir`], [`symlink`], and [`load`] when metadata or special kinds are
//! needed. Intermediate path segments are created as directories with
//! default metadata.
//!
//! ```
//! use mirage::{dir, file, symlink};
//!
//! let spec = mirage::TreeSpec::new()
//!     .entry("/path/to/file.txt", "file content here")
//!     .entry("/path/empty", dir().mode(0o700))
//!     .entry("/path/link", symlink("to/file.txt"))
//!     .entry("/path/to/strict.txt", file().contents("locked").mode(0o400));
//! # mirage::activate(spec).unwrap();
//! # mirage::restore();
//! ```

use crate::error::Error;
use crate::node::{Node, NodeId, ROOT};
use crate::tree::Tree;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// An ordered mapping from path to entry, describing the initial tree.
#[derive(Debug, Clone, Default)]
pub struct TreeSpec {
    entries: Vec<(PathBuf, Entry)>,
}

impl TreeSpec {
    /// An empty description: just a root (plus the configured cwd and temp
    /// directories).
    pub fn new() -> TreeSpec {
        TreeSpec::default()
    }

    /// Add an entry. Relative paths resolve against the activation-time
    /// working directory.
    pub fn entry(mut self, path: impl Into<PathBuf>, entry: impl Into<Entry>) -> TreeSpec {
        self.entries.push((path.into(), entry.into()));
        self
    }

    /// Materialize into a tree. Fails without side effects on conflicting or
    /// malformed entries; `extra_dirs` are created last with defaults.
    pub(crate) fn materialize(
        &self,
        uid: u32,
        gid: u32,
        cwd: &Path,
        extra_dirs: &[PathBuf],
    ) -> Result<Tree, Error> {
        let now = SystemTime::now();
        let mut builder = TreeBuilder {
            tree: Tree::new(uid, gid, now),
            implicit: HashSet::new(),
            uid,
            gid,
            now,
        };
        for (path, entry) in &self.entries {
            let abs = if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            };
            builder.insert(&abs, entry)?;
        }
        for dir in extra_dirs {
            builder.ensure_dirs(dir)?;
        }
        Ok(builder.tree)
    }
}

impl<P: Into<PathBuf>, E: Into<Entry>, const N: usize> From<[(P, E); N]> for TreeSpec {
    fn from(entries: [(P, E); N]) -> TreeSpec {
        let mut spec = TreeSpec::new();
        for (path, entry) in entries {
            spec = spec.entry(path, entry);
        }
        spec
    }
}

/// One node of the description.
#[derive(Debug, Clone)]
pub enum Entry {
    File(FileSpec),
    Dir(DirSpec),
    Symlink(SymlinkSpec),
}

impl From<FileSpec> for Entry {
    fn from(spec: FileSpec) -> Entry {
        Entry::File(spec)
    }
}

impl From<DirSpec> for Entry {
    fn from(spec: DirSpec) -> Entry {
        Entry::Dir(spec)
    }
}

impl From<SymlinkSpec> for Entry {
    fn from(spec: SymlinkSpec) -> Entry {
        Entry::Symlink(spec)
    }
}

impl From<&str> for Entry {
    fn from(contents: &str) -> Entry {
        Entry::File(file().contents(contents))
    }
}

impl From<String> for Entry {
    fn from(contents: String) -> Entry {
        Entry::File(file().contents(contents.into_bytes()))
    }
}

impl From<&[u8]> for Entry {
    fn from(contents: &[u8]) -> Entry {
        Entry::File(file().contents(contents))
    }
}

impl From<Vec<u8>> for Entry {
    fn from(contents: Vec<u8>) -> Entry {
        Entry::File(file().contents(contents))
    }
}

/// A file marker with content and optional metadata overrides.
pub fn file() -> FileSpec {
    FileSpec::default()
}

/// A directory marker, optionally holding nested entries.
pub fn dir() -> DirSpec {
    DirSpec::default()
}

/// A symbolic link marker. The target is stored as written and may dangle.
pub fn symlink(target: impl Into<PathBuf>) -> SymlinkSpec {
    SymlinkSpec {
        target: target.into(),
    }
}

/// A file whose contents are read from the real filesystem at activation
/// time, before the backend switch is installed.
pub fn load(path: impl Into<PathBuf>) -> FileSpec {
    FileSpec {
        contents: Contents::FromDisk(path.into()),
        ..FileSpec::default()
    }
}

#[derive(Debug, Clone)]
enum Contents {
    Bytes(Vec<u8>),
    FromDisk(PathBuf),
}

impl Default for Contents {
    fn default() -> Self {
        Contents::Bytes(Vec::new())
    }
}

/// Metadata overrides shared by file and directory markers.
#[derive(Debug, Clone, Copy, Default)]
struct MetaSpec {
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    atime: Option<SystemTime>,
    mtime: Option<SystemTime>,
    ctime: Option<SystemTime>,
    birthtime: Option<SystemTime>,
}

impl MetaSpec {
    /// Stamp the overrides onto a freshly created node.
    fn apply(&self, node: &mut Node) {
        if let Some(mode) = self.mode {
            node.mode = mode & 0o7777;
        }
        if let Some(uid) = self.uid {
            node.uid = uid;
        }
        if let Some(gid) = self.gid {
            node.gid = gid;
        }
        if let Some(atime) = self.atime {
            node.atime = atime;
        }
        if let Some(mtime) = self.mtime {
            node.mtime = mtime;
        }
        if let Some(ctime) = self.ctime {
            node.ctime = ctime;
        }
        if let Some(birthtime) = self.birthtime {
            node.crtime = birthtime;
        }
    }
}

macro_rules! meta_setters {
    () => {
        /// Permission bits; the default depends on the entry kind.
        pub fn mode(mut self, mode: u32) -> Self {
            self.meta.mode = Some(mode);
            self
        }

        /// Owning user id; defaults to the session uid.
        pub fn uid(mut self, uid: u32) -> Self {
            self.meta.uid = Some(uid);
            self
        }

        /// Owning group id; defaults to the session gid.
        pub fn gid(mut self, gid: u32) -> Self {
            self.meta.gid = Some(gid);
            self
        }

        /// Access timestamp override.
        pub fn atime(mut self, atime: SystemTime) -> Self {
            self.meta.atime = Some(atime);
            self
        }

        /// Modification timestamp override.
        pub fn mtime(mut self, mtime: SystemTime) -> Self {
            self.meta.mtime = Some(mtime);
            self
        }

        /// Change timestamp override.
        pub fn ctime(mut self, ctime: SystemTime) -> Self {
            self.meta.ctime = Some(ctime);
            self
        }

        /// Creation timestamp override.
        pub fn birthtime(mut self, birthtime: SystemTime) -> Self {
            self.meta.birthtime = Some(birthtime);
            self
        }
    };
}

/// Builder for a file entry; see [`file`] and [`load`].
#[derive(Debug, Clone, Default)]
pub struct FileSpec {
    contents: Contents,
    meta: MetaSpec,
}

impl FileSpec {
    /// The file's byte content. Defaults to empty.
    pub fn contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = Contents::Bytes(contents.into());
        self
    }

    meta_setters!();
}

/// Builder for a directory entry; see [`dir`].
#[derive(Debug, Clone, Default)]
pub struct DirSpec {
    entries: Vec<(String, Entry)>,
    meta: MetaSpec,
}

impl DirSpec {
    /// Add a child entry by name.
    pub fn entry(mut self, name: impl Into<String>, entry: impl Into<Entry>) -> Self {
        self.entries.push((name.into(), entry.into()));
        self
    }

    meta_setters!();
}

/// A symbolic link entry; see [`symlink`].
#[derive(Debug, Clone)]
pub struct SymlinkSpec {
    target: PathBuf,
}

struct TreeBuilder {
    tree: Tree,
    /// Directories created as intermediate segments. An explicit definition
    /// may claim one of these exactly once.
    implicit: HashSet<NodeId>,
    uid: u32,
    gid: u32,
    now: SystemTime,
}

impl TreeBuilder {
    /// Walk `path`, creating missing directories with defaults. Fails when a
    /// non-directory is in the way.
    fn ensure_dirs(&mut self, path: &Path) -> Result<NodeId, Error> {
        let mut cur = ROOT;
        for comp in path.components() {
            match comp {
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => cur = self.tree.dir_parent(cur),
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| Error::Description("non-UTF-8 path".into()))?;
                    match self.tree.child(cur, name) {
                        Some(id) if self.tree.node(id).is_dir() => cur = id,
                        Some(_) => {
                            return Err(Error::Description(format!(
                                "{} is not a directory",
                                path.display()
                            )))
                        }
                        None => {
                            let id = self
                                .tree
                                .alloc(Node::dir(cur, 0o755, self.uid, self.gid, self.now));
                            self.tree
                                .insert_child(cur, name, id, self.now)
                                .expect("fresh name");
                            self.implicit.insert(id);
                            cur = id;
                        }
                    }
                }
                Component::Prefix(_) => {
                    return Err(Error::Description(format!(
                        "unsupported path prefix in {}",
                        path.display()
                    )))
                }
            }
        }
        Ok(cur)
    }

    fn insert(&mut self, path: &Path, entry: &Entry) -> Result<(), Error> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Description(format!("{} has no file name", path.display())))?
            .to_owned();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => self.ensure_dirs(p)?,
            _ => ROOT,
        };

        match entry {
            Entry::Dir(spec) => {
                let id = match self.tree.child(parent, &name) {
                    // An implicitly created directory may be claimed once.
                    Some(id) if self.tree.node(id).is_dir() && self.implicit.remove(&id) => id,
                    Some(_) => {
                        return Err(Error::Description(format!(
                            "duplicate entry {}",
                            path.display()
                        )))
                    }
                    None => {
                        let id = self
                            .tree
                            .alloc(Node::dir(parent, 0o755, self.uid, self.gid, self.now));
                        self.tree
                            .insert_child(parent, &name, id, self.now)
                            .expect("fresh name");
                        id
                    }
                };
                spec.meta.apply(self.tree.node_mut(id));
                for (child_name, child_entry) in &spec.entries {
                    self.insert(&path.join(child_name), child_entry)?;
                }
                Ok(())
            }
            Entry::File(spec) => {
                if self.tree.child(parent, &name).is_some() {
                    return Err(Error::Description(format!(
                        "duplicate entry {}",
                        path.display()
                    )));
                }
                let contents = match &spec.contents {
                    Contents::Bytes(bytes) => bytes.clone(),
                    Contents::FromDisk(real) => std::fs::read(real).map_err(|err| {
                        Error::Description(format!("load {}: {err}", real.display()))
                    })?,
                };
                let mut node = Node::file(contents, 0o644, self.uid, self.gid, self.now);
                spec.meta.apply(&mut node);
                let id = self.tree.alloc(node);
                self.tree
                    .insert_child(parent, &name, id, self.now)
                    .expect("fresh name");
                Ok(())
            }
            Entry::Symlink(spec) => {
                if self.tree.child(parent, &name).is_some() {
                    return Err(Error::Description(format!(
                        "duplicate entry {}",
                        path.display()
                    )));
                }
                let id = self.tree.alloc(Node::symlink(
                    spec.target.clone(),
                    self.uid,
                    self.gid,
                    self.now,
                ));
                self.tree
                    .insert_child(parent, &name, id, self.now)
                    .expect("fresh name");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn nested_paths_create_intermediate_dirs() {
        let spec = TreeSpec::new().entry("/a/b/c.txt", "hello");
        let tree = spec.materialize(1000, 1000, Path::new("/"), &[]).unwrap();
        let a = tree.child(ROOT, "a").unwrap();
        let b = tree.child(a, "b").unwrap();
        let c = tree.child(b, "c.txt").unwrap();
        assert!(tree.node(c).is_file());
        assert_eq!(tree.node(c).len(), 5);
    }

    #[test]
    fn explicit_dir_claims_implicit_one() {
        let spec = TreeSpec::new()
            .entry("/a/b", "x")
            .entry("/a", dir().mode(0o700));
        let tree = spec.materialize(1000, 1000, Path::new("/"), &[]).unwrap();
        let a = tree.child(ROOT, "a").unwrap();
        assert_eq!(tree.node(a).mode, 0o700);
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let spec = TreeSpec::new().entry("/a", "x").entry("/a", "y");
        assert!(spec.materialize(1000, 1000, Path::new("/"), &[]).is_err());
    }

    #[test]
    fn relative_entries_resolve_against_cwd() {
        let spec = TreeSpec::new().entry("notes.txt", "hi");
        let tree = spec
            .materialize(1000, 1000, Path::new("/home/user"), &[])
            .unwrap();
        let home = tree.child(ROOT, "home").unwrap();
        let user = tree.child(home, "user").unwrap();
        assert!(tree.child(user, "notes.txt").is_some());
    }
}
