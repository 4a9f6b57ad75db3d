//! The arena owning every node of a virtual tree.
//!
//! All methods operate on node ids already produced by the resolver; nothing
//! in here parses paths. Mutations follow the check-then-write discipline:
//! every failure is reported before the first visible change.

use crate::error::eexist;
use crate::node::{Node, NodeId, NodeKind, ROOT};
use indexmap::IndexMap;
use std::io;
use std::time::SystemTime;

pub(crate) struct Tree {
    nodes: IndexMap<NodeId, Node>,
    next_id: u64,
}

impl Tree {
    /// Create a tree holding only a root directory owned by `uid`/`gid`.
    pub(crate) fn new(uid: u32, gid: u32, now: SystemTime) -> Tree {
        let mut nodes = IndexMap::new();
        nodes.insert(ROOT, Node::dir(ROOT, 0o755, uid, gid, now));
        Tree { nodes, next_id: 1 }
    }

    /// Move a node into the arena, returning its id. Ids are never reused.
    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(&id).expect("node missing from arena")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).expect("node missing from arena")
    }

    /// Look up `name` in a directory node.
    pub(crate) fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.node(dir).children().and_then(|c| c.get(name).copied())
    }

    /// The parent of a directory; the root is its own parent.
    pub(crate) fn dir_parent(&self, dir: NodeId) -> NodeId {
        match &self.node(dir).kind {
            NodeKind::Dir { parent, .. } => *parent,
            _ => panic!("dir_parent on non-directory"),
        }
    }

    pub(crate) fn set_dir_parent(&mut self, dir: NodeId, parent: NodeId) {
        match &mut self.node_mut(dir).kind {
            NodeKind::Dir { parent: p, .. } => *p = parent,
            _ => panic!("set_dir_parent on non-directory"),
        }
    }

    /// Name of `child` within `dir`. Used when reconstructing paths.
    pub(crate) fn name_of(&self, dir: NodeId, child: NodeId) -> Option<&str> {
        self.node(dir)
            .children()
            .and_then(|c| c.iter().find(|(_, id)| **id == child))
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn is_empty_dir(&self, dir: NodeId) -> bool {
        self.node(dir).children().is_some_and(|c| c.is_empty())
    }

    /// Attach an existing node under a new name. Fails with the EEXIST shape
    /// when the name is taken. Bumps the directory's mtime/ctime.
    pub(crate) fn insert_child(
        &mut self,
        dir: NodeId,
        name: &str,
        child: NodeId,
        now: SystemTime,
    ) -> io::Result<()> {
        let children = self
            .node_mut(dir)
            .children_mut()
            .expect("insert_child on non-directory");
        if children.contains_key(name) {
            return Err(eexist());
        }
        children.insert(name.to_owned(), child);
        self.touch_dir(dir, now);
        Ok(())
    }

    /// Remove a directory entry without touching link counts. The caller has
    /// already validated that the entry exists.
    pub(crate) fn detach_child(&mut self, dir: NodeId, name: &str, now: SystemTime) -> NodeId {
        let children = self
            .node_mut(dir)
            .children_mut()
            .expect("detach_child on non-directory");
        let id = children.shift_remove(name).expect("entry missing");
        self.touch_dir(dir, now);
        id
    }

    /// Remove a directory entry and drop the link it represented. File link
    /// counts decrement; the node stays in the arena (possibly orphaned)
    /// until [`Tree::reap`] — open descriptors keep it readable.
    pub(crate) fn unlink_child(&mut self, dir: NodeId, name: &str, now: SystemTime) -> NodeId {
        let id = self.detach_child(dir, name, now);
        let node = self.node_mut(id);
        if let NodeKind::File { nlink, .. } = &mut node.kind {
            *nlink = nlink.saturating_sub(1);
            node.ctime = now;
        }
        id
    }

    /// Attach `target` under an additional name, sharing the node: the
    /// hard-link mechanism. The shared link count increments.
    pub(crate) fn add_link(
        &mut self,
        dir: NodeId,
        name: &str,
        target: NodeId,
        now: SystemTime,
    ) -> io::Result<()> {
        self.insert_child(dir, name, target, now)?;
        let node = self.node_mut(target);
        if let NodeKind::File { nlink, .. } = &mut node.kind {
            *nlink += 1;
        }
        node.ctime = now;
        Ok(())
    }

    pub(crate) fn link_count(&self, id: NodeId) -> u32 {
        match &self.node(id).kind {
            NodeKind::File { nlink, .. } => *nlink,
            NodeKind::Symlink { .. } => 1,
            NodeKind::Dir { .. } => 2 + self.subdir_count(id) as u32,
        }
    }

    fn subdir_count(&self, dir: NodeId) -> usize {
        self.node(dir)
            .children()
            .map(|c| c.values().filter(|id| self.node(**id).is_dir()).count())
            .unwrap_or(0)
    }

    /// Whether a node is no longer reachable through any directory entry.
    pub(crate) fn is_orphan(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::File { nlink, .. } => *nlink == 0,
            // Directories and symlinks are dropped eagerly on removal.
            _ => false,
        }
    }

    /// Drop a node from the arena, freeing its content.
    pub(crate) fn reap(&mut self, id: NodeId) {
        self.nodes.shift_remove(&id);
    }

    pub(crate) fn content_len(&self, id: NodeId) -> u64 {
        self.node(id).len()
    }

    /// Copy up to `buf.len()` bytes from `offset`; short reads at end of
    /// content. Updates the access timestamp.
    pub(crate) fn read_at(
        &mut self,
        id: NodeId,
        buf: &mut [u8],
        offset: u64,
        now: SystemTime,
    ) -> usize {
        let node = self.node_mut(id);
        let n = match &node.kind {
            NodeKind::File { content, .. } => {
                let start = (offset as usize).min(content.len());
                let end = start.saturating_add(buf.len()).min(content.len());
                buf[..end - start].copy_from_slice(&content[start..end]);
                end - start
            }
            _ => 0,
        };
        node.atime = now;
        n
    }

    /// Write bytes at `offset`, zero-filling any gap past the current end.
    /// Updates mtime/ctime; size is derived from the new content length.
    pub(crate) fn write_at(
        &mut self,
        id: NodeId,
        offset: u64,
        data: &[u8],
        now: SystemTime,
    ) -> usize {
        let node = self.node_mut(id);
        match &mut node.kind {
            NodeKind::File { content, .. } => {
                let end = offset as usize + data.len();
                if end > content.len() {
                    content.resize(end, 0);
                }
                content[offset as usize..end].copy_from_slice(data);
                node.mtime = now;
                node.ctime = now;
                data.len()
            }
            _ => 0,
        }
    }

    /// Truncate or zero-extend the content to `len` bytes.
    pub(crate) fn truncate(&mut self, id: NodeId, len: u64, now: SystemTime) {
        let node = self.node_mut(id);
        if let NodeKind::File { content, .. } = &mut node.kind {
            content.resize(len as usize, 0);
            node.mtime = now;
            node.ctime = now;
        }
    }

    pub(crate) fn set_mode(&mut self, id: NodeId, mode: u32, now: SystemTime) {
        let node = self.node_mut(id);
        node.mode = mode & 0o7777;
        node.ctime = now;
    }

    pub(crate) fn set_owner(
        &mut self,
        id: NodeId,
        uid: Option<u32>,
        gid: Option<u32>,
        now: SystemTime,
    ) {
        let node = self.node_mut(id);
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        node.ctime = now;
    }

    fn touch_dir(&mut self, dir: NodeId, now: SystemTime) {
        let node = self.node_mut(dir);
        node.mtime = now;
        node.ctime = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn tree() -> Tree {
        Tree::new(1000, 1000, SystemTime::now())
    }

    #[test]
    fn hard_link_shares_content_until_last_name_drops() {
        let mut t = tree();
        let now = SystemTime::now();
        let f = t.alloc(Node::file(b"abc".to_vec(), 0o644, 1000, 1000, now));
        t.insert_child(ROOT, "a", f, now).unwrap();
        t.add_link(ROOT, "b", f, now).unwrap();
        assert_eq!(t.link_count(f), 2);

        t.write_at(f, 3, b"def", now);
        let mut buf = [0u8; 6];
        assert_eq!(t.read_at(f, &mut buf, 0, now), 6);
        assert_eq!(&buf, b"abcdef");

        t.unlink_child(ROOT, "a", now);
        assert_eq!(t.link_count(f), 1);
        assert!(!t.is_orphan(f));
        t.unlink_child(ROOT, "b", now);
        assert!(t.is_orphan(f));
    }

    #[test]
    fn write_past_end_zero_fills() {
        let mut t = tree();
        let now = SystemTime::now();
        let f = t.alloc(Node::file(b"x".to_vec(), 0o644, 1000, 1000, now));
        t.insert_child(ROOT, "f", f, now).unwrap();

        t.write_at(f, 4, b"y", now);
        let mut buf = [0u8; 5];
        assert_eq!(t.read_at(f, &mut buf, 0, now), 5);
        assert_eq!(&buf, b"x\0\0\0y");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut t = tree();
        let now = SystemTime::now();
        let f = t.alloc(Node::file(Vec::new(), 0o644, 1000, 1000, now));
        t.insert_child(ROOT, "f", f, now).unwrap();
        let g = t.alloc(Node::file(Vec::new(), 0o644, 1000, 1000, now));
        assert!(t.insert_child(ROOT, "f", g, now).is_err());
    }
}
