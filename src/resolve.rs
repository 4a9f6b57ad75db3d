//! Path resolution against a [`Tree`].
//!
//! Translates a path string into a node id by walking segments from the root
//! (absolute paths) or the virtual working directory (relative paths),
//! substituting symlink targets as they are encountered and checking traverse
//! permission on every directory entered. Resolution never mutates the tree.

use crate::error::{eacces, einval, eloop, enoent, enotdir};
use crate::node::{Access, NodeId, NodeKind, ROOT};
use crate::tree::Tree;
use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path};

/// Whether a trailing symlink is substituted or returned as-is. Operations on
/// the link itself (lstat, readlink, unlink, rename, symlink creation) use
/// [`Follow::NoFollowLast`]; everything else follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Follow {
    All,
    NoFollowLast,
}

/// A successfully resolved path: the node, the directory holding its entry,
/// and the entry name itself. The root reports itself as its own parent with
/// an empty name.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) id: NodeId,
    pub(crate) parent: NodeId,
    pub(crate) name: String,
}

/// One pending segment of the walk. Symlink substitution splices the target's
/// segments onto the front of the worklist.
#[derive(Debug)]
enum Seg {
    Root,
    Up,
    Name(String),
}

pub(crate) struct Resolver<'a> {
    pub(crate) tree: &'a Tree,
    /// Absolute virtual working directory, used for relative paths.
    pub(crate) cwd: &'a Path,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    /// Symlink-chain budget; exceeding it is the ELOOP shape.
    pub(crate) max_symlinks: usize,
}

impl Resolver<'_> {
    pub(crate) fn lookup(&self, path: &Path, follow: Follow) -> io::Result<Resolved> {
        if path.as_os_str().is_empty() {
            return Err(enoent());
        }
        // A trailing slash requires the final node to be a directory and
        // forces symlink substitution on the last segment.
        let want_dir = trailing_slash(path);

        let mut work = VecDeque::new();
        if !path.is_absolute() {
            push_back(&mut work, self.cwd)?;
        }
        push_back(&mut work, path)?;

        let mut cur = ROOT;
        let mut followed = 0usize;

        while let Some(seg) = work.pop_front() {
            match seg {
                Seg::Root => cur = ROOT,
                // `..` at the root stays at the root via the parent pointer.
                Seg::Up => cur = self.tree.dir_parent(cur),
                Seg::Name(name) => {
                    let dir = self.tree.node(cur);
                    if !dir.allows(self.uid, self.gid, Access::Exec) {
                        return Err(eacces());
                    }
                    let child = self.tree.child(cur, &name).ok_or_else(enoent)?;
                    let node = self.tree.node(child);
                    let last = work.is_empty();

                    if node.is_symlink() && (!last || follow == Follow::All || want_dir) {
                        followed += 1;
                        if followed > self.max_symlinks {
                            return Err(eloop());
                        }
                        let target = match &node.kind {
                            NodeKind::Symlink { target } => target.clone(),
                            _ => unreachable!(),
                        };
                        // Absolute targets restart at the root; relative ones
                        // continue from the directory holding the link.
                        push_front(&mut work, &target)?;
                        continue;
                    }

                    if !last {
                        if !node.is_dir() {
                            return Err(enotdir());
                        }
                        cur = child;
                    } else {
                        if want_dir && !node.is_dir() {
                            return Err(enotdir());
                        }
                        return Ok(Resolved {
                            id: child,
                            parent: cur,
                            name,
                        });
                    }
                }
            }
        }

        // The path normalized away to a directory ("/", ".", "a/..", ...).
        let parent = self.tree.dir_parent(cur);
        Ok(Resolved {
            id: cur,
            parent,
            name: self
                .tree
                .name_of(parent, cur)
                .unwrap_or_default()
                .to_owned(),
        })
    }

    /// Resolve everything but the final segment, returning the parent
    /// directory and the unresolved final name. Used by creating operations.
    pub(crate) fn lookup_parent(&self, path: &Path) -> io::Result<(NodeId, String)> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(einval)?
            .to_owned();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let resolved = self.lookup(parent, Follow::All)?;
        if !self.tree.node(resolved.id).is_dir() {
            return Err(enotdir());
        }
        Ok((resolved.id, name))
    }

    /// Rebuild the absolute, symlink-free path of a directory by walking the
    /// parent pointers up to the root.
    pub(crate) fn dir_path(&self, mut dir: NodeId) -> std::path::PathBuf {
        let mut names = Vec::new();
        while dir != ROOT {
            let parent = self.tree.dir_parent(dir);
            if let Some(name) = self.tree.name_of(parent, dir) {
                names.push(name.to_owned());
            }
            dir = parent;
        }
        let mut path = std::path::PathBuf::from("/");
        for name in names.iter().rev() {
            path.push(name);
        }
        path
    }
}

fn trailing_slash(path: &Path) -> bool {
    let bytes = path.as_os_str().as_encoded_bytes();
    bytes.len() > 1 && bytes.ends_with(b"/")
}

fn push_back(work: &mut VecDeque<Seg>, path: &Path) -> io::Result<()> {
    for comp in path.components() {
        match comp {
            Component::RootDir => work.push_back(Seg::Root),
            Component::CurDir => {}
            Component::ParentDir => work.push_back(Seg::Up),
            Component::Normal(name) => {
                work.push_back(Seg::Name(name.to_str().ok_or_else(einval)?.to_owned()))
            }
            Component::Prefix(_) => return Err(einval()),
        }
    }
    Ok(())
}

fn push_front(work: &mut VecDeque<Seg>, path: &Path) -> io::Result<()> {
    let mut segs = VecDeque::new();
    push_back(&mut segs, path)?;
    while let Some(seg) = segs.pop_back() {
        work.push_front(seg);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    fn fixture() -> (Tree, NodeId) {
        let now = SystemTime::now();
        let mut tree = Tree::new(1000, 1000, now);
        let dir = tree.alloc(Node::dir(ROOT, 0o755, 1000, 1000, now));
        tree.insert_child(ROOT, "home", dir, now).unwrap();
        let file = tree.alloc(Node::file(b"data".to_vec(), 0o644, 1000, 1000, now));
        tree.insert_child(dir, "notes.txt", file, now).unwrap();
        (tree, file)
    }

    fn resolver<'a>(tree: &'a Tree, cwd: &'a Path) -> Resolver<'a> {
        Resolver {
            tree,
            cwd,
            uid: 1000,
            gid: 1000,
            max_symlinks: 32,
        }
    }

    #[test]
    fn absolute_and_relative_walks_agree() {
        let (tree, file) = fixture();
        let cwd = PathBuf::from("/home");
        let r = resolver(&tree, &cwd);

        let abs = r.lookup(Path::new("/home/notes.txt"), Follow::All).unwrap();
        let rel = r.lookup(Path::new("notes.txt"), Follow::All).unwrap();
        assert_eq!(abs.id, file);
        assert_eq!(rel.id, file);

        let dotted = r
            .lookup(Path::new("/home/../home/./notes.txt"), Follow::All)
            .unwrap();
        assert_eq!(dotted.id, file);
    }

    #[test]
    fn trailing_slash_on_file_is_not_a_directory() {
        let (tree, _) = fixture();
        let cwd = PathBuf::from("/");
        let r = resolver(&tree, &cwd);
        let err = r
            .lookup(Path::new("/home/notes.txt/"), Follow::All)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTDIR));
    }

    #[test]
    fn symlink_cycle_hits_the_budget() {
        let now = SystemTime::now();
        let mut tree = Tree::new(1000, 1000, now);
        let a = tree.alloc(Node::symlink(PathBuf::from("/b"), 1000, 1000, now));
        let b = tree.alloc(Node::symlink(PathBuf::from("/a"), 1000, 1000, now));
        tree.insert_child(ROOT, "a", a, now).unwrap();
        tree.insert_child(ROOT, "b", b, now).unwrap();

        let cwd = PathBuf::from("/");
        let r = resolver(&tree, &cwd);
        let err = r.lookup(Path::new("/a"), Follow::All).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ELOOP));
    }

    #[test]
    fn traverse_requires_exec_on_intermediates() {
        let now = SystemTime::now();
        let mut tree = Tree::new(1000, 1000, now);
        let locked = tree.alloc(Node::dir(ROOT, 0o600, 1000, 1000, now));
        tree.insert_child(ROOT, "locked", locked, now).unwrap();
        let file = tree.alloc(Node::file(Vec::new(), 0o644, 1000, 1000, now));
        tree.insert_child(locked, "f", file, now).unwrap();

        let cwd = PathBuf::from("/");
        let r = resolver(&tree, &cwd);
        let err = r.lookup(Path::new("/locked/f"), Follow::All).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
    }
}
