use indexmap::IndexMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// Identifier of a node in the arena.
///
/// Directories refer to their children by id, hard links are two directory
/// entries carrying the same id. Ids are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) u64);

/// The root directory of every tree.
pub(crate) const ROOT: NodeId = NodeId(0);

/// Access classes used by permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
    Exec,
}

impl Access {
    /// The "other" permission bits for this class; shifted left by 3/6 for
    /// group/owner.
    fn bits(self) -> u32 {
        match self {
            Access::Read => 0o4,
            Access::Write => 0o2,
            Access::Exec => 0o1,
        }
    }
}

/// What kind of entity a node (or a stat snapshot) is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    File {
        content: Vec<u8>,
        /// Directory entries referencing this node. Content is freed only
        /// when this reaches zero and no open descriptor remains.
        nlink: u32,
    },
    Dir {
        /// Child name to node id, in insertion order. Uniqueness of names is
        /// the map key invariant.
        children: IndexMap<String, NodeId>,
        /// The owning directory; the root is its own parent. `..` traversal
        /// and path reconstruction use this.
        parent: NodeId,
    },
    Symlink {
        /// Stored as written; may be absolute, relative, or dangling.
        target: PathBuf,
    },
}

/// A file, directory, or symbolic link plus its metadata.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) mode: u32,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) atime: SystemTime,
    pub(crate) mtime: SystemTime,
    pub(crate) ctime: SystemTime,
    pub(crate) crtime: SystemTime,
}

impl Node {
    fn new(kind: NodeKind, mode: u32, uid: u32, gid: u32, now: SystemTime) -> Node {
        Node {
            kind,
            mode: mode & 0o7777,
            uid,
            gid,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
        }
    }

    pub(crate) fn file(content: Vec<u8>, mode: u32, uid: u32, gid: u32, now: SystemTime) -> Node {
        Node::new(NodeKind::File { content, nlink: 1 }, mode, uid, gid, now)
    }

    pub(crate) fn dir(parent: NodeId, mode: u32, uid: u32, gid: u32, now: SystemTime) -> Node {
        Node::new(
            NodeKind::Dir {
                children: IndexMap::new(),
                parent,
            },
            mode,
            uid,
            gid,
            now,
        )
    }

    pub(crate) fn symlink(target: PathBuf, uid: u32, gid: u32, now: SystemTime) -> Node {
        // Symlinks are always lrwxrwxrwx; the target's bits are what count.
        Node::new(NodeKind::Symlink { target }, 0o777, uid, gid, now)
    }

    pub(crate) fn kind(&self) -> FileKind {
        match self.kind {
            NodeKind::File { .. } => FileKind::File,
            NodeKind::Dir { .. } => FileKind::Dir,
            NodeKind::Symlink { .. } => FileKind::Symlink,
        }
    }

    pub(crate) fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. })
    }

    pub(crate) fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub(crate) fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink { .. })
    }

    /// Size as reported by stat: content length for files, zero otherwise.
    /// Derived, never stored, so it cannot drift.
    pub(crate) fn len(&self) -> u64 {
        match &self.kind {
            NodeKind::File { content, .. } => content.len() as u64,
            _ => 0,
        }
    }

    pub(crate) fn children(&self) -> Option<&IndexMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Dir { children, .. } => Some(children),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut IndexMap<String, NodeId>> {
        match &mut self.kind {
            NodeKind::Dir { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Whether the given effective uid/gid may access this node for the
    /// requested class. Owner, group, then other bits apply, in that order;
    /// uid 0 passes every check.
    pub(crate) fn allows(&self, uid: u32, gid: u32, access: Access) -> bool {
        if uid == 0 {
            return true;
        }
        let shift = if uid == self.uid {
            6
        } else if gid == self.gid {
            3
        } else {
            0
        };
        self.mode >> shift & access.bits() == access.bits()
    }
}
