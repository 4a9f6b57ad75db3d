//! The in-memory tree as a [`Backend`].
//!
//! Owns the node arena, the open descriptor table, and the virtual working
//! directory for the lifetime of one session. Every operation resolves paths
//! through [`Resolver`], checks its preconditions, and only then performs a
//! single mutation, so failures never leave partial state behind.

use super::{Backend, DirEntryData, FileHandle, OpenHow, Stat};
use crate::error::{eacces, ebadf, ebusy, eexist, einval, eisdir, enotdir, enotempty, eperm};
use crate::fd::{FdTable, OpenFile, OpenFlags};
use crate::node::{Access, Node, NodeId, NodeKind, ROOT};
use crate::resolve::{Follow, Resolver};
use crate::tree::Tree;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub(crate) struct VirtualBackend {
    tree: Tree,
    fds: FdTable,
    /// Absolute virtual working directory, independent of the process cwd.
    cwd: PathBuf,
    uid: u32,
    gid: u32,
    max_symlinks: usize,
}

impl VirtualBackend {
    pub(crate) fn new(tree: Tree, cwd: PathBuf, uid: u32, gid: u32, max_symlinks: usize) -> Self {
        VirtualBackend {
            tree,
            fds: FdTable::default(),
            cwd,
            uid,
            gid,
            max_symlinks,
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            tree: &self.tree,
            cwd: &self.cwd,
            uid: self.uid,
            gid: self.gid,
            max_symlinks: self.max_symlinks,
        }
    }

    fn check(&self, id: NodeId, access: Access) -> io::Result<()> {
        if self.tree.node(id).allows(self.uid, self.gid, access) {
            Ok(())
        } else {
            Err(eacces())
        }
    }

    /// Write + traverse on a directory, required by every entry mutation.
    fn check_entry_mutation(&self, dir: NodeId) -> io::Result<()> {
        self.check(dir, Access::Write)?;
        self.check(dir, Access::Exec)
    }

    fn stat_of(&self, id: NodeId) -> Stat {
        let node = self.tree.node(id);
        Stat {
            len: node.len(),
            kind: node.kind(),
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            nlink: self.tree.link_count(id) as u64,
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
            crtime: node.crtime,
        }
    }

    /// Drop an unreachable node once the last descriptor lets go of it.
    fn reap_if_unused(&mut self, id: NodeId) {
        if self.tree.is_orphan(id) && self.fds.refs(id) == 0 {
            self.tree.reap(id);
        }
    }

    // ==== descriptor operations ====
    //
    // These are addressed by fd, not path, and are reachable only through a
    // handle this backend produced. They keep working on nodes that have been
    // unlinked while open.

    pub(crate) fn fd_read(&mut self, fd: u64, buf: &mut [u8]) -> io::Result<usize> {
        let (node, pos) = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            if !of.flags.read {
                return Err(ebadf());
            }
            (of.node, of.pos)
        };
        if self.tree.node(node).is_dir() {
            return Err(eisdir());
        }
        let n = self.tree.read_at(node, buf, pos, SystemTime::now());
        if let Some(of) = self.fds.get_mut(fd) {
            of.pos = pos + n as u64;
        }
        Ok(n)
    }

    pub(crate) fn fd_read_at(&mut self, fd: u64, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let node = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            if !of.flags.read {
                return Err(ebadf());
            }
            of.node
        };
        if self.tree.node(node).is_dir() {
            return Err(eisdir());
        }
        Ok(self.tree.read_at(node, buf, offset, SystemTime::now()))
    }

    pub(crate) fn fd_write(&mut self, fd: u64, buf: &[u8]) -> io::Result<usize> {
        let (node, pos, append) = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            if !of.flags.write {
                return Err(ebadf());
            }
            (of.node, of.pos, of.flags.append)
        };
        let offset = if append {
            self.tree.content_len(node)
        } else {
            pos
        };
        let n = self.tree.write_at(node, offset, buf, SystemTime::now());
        if let Some(of) = self.fds.get_mut(fd) {
            of.pos = offset + n as u64;
        }
        Ok(n)
    }

    pub(crate) fn fd_write_at(&mut self, fd: u64, buf: &[u8], offset: u64) -> io::Result<usize> {
        let node = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            if !of.flags.write {
                return Err(ebadf());
            }
            of.node
        };
        Ok(self.tree.write_at(node, offset, buf, SystemTime::now()))
    }

    pub(crate) fn fd_seek(&mut self, fd: u64, pos: SeekFrom) -> io::Result<u64> {
        let (node, cur) = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            (of.node, of.pos)
        };
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(offset) => self.tree.content_len(node) as i128 + offset as i128,
            SeekFrom::Current(offset) => cur as i128 + offset as i128,
        };
        if new_pos < 0 {
            return Err(einval());
        }
        let of = self.fds.get_mut(fd).ok_or_else(ebadf)?;
        of.pos = new_pos as u64;
        Ok(of.pos)
    }

    pub(crate) fn fd_set_len(&mut self, fd: u64, len: u64) -> io::Result<()> {
        let node = {
            let of = self.fds.get(fd).ok_or_else(ebadf)?;
            if !of.flags.write {
                return Err(einval());
            }
            of.node
        };
        self.tree.truncate(node, len, SystemTime::now());
        Ok(())
    }

    pub(crate) fn fd_stat(&self, fd: u64) -> io::Result<Stat> {
        let of = self.fds.get(fd).ok_or_else(ebadf)?;
        Ok(self.stat_of(of.node))
    }

    /// New descriptor over the same node. Cursors are independent from the
    /// moment of duplication.
    pub(crate) fn fd_dup(&mut self, fd: u64) -> io::Result<u64> {
        let of = self.fds.get(fd).ok_or_else(ebadf)?;
        let dup = OpenFile {
            node: of.node,
            pos: of.pos,
            flags: of.flags,
        };
        Ok(self.fds.alloc(dup))
    }

    /// There is no durability model: sync just validates the descriptor.
    pub(crate) fn fd_sync(&self, fd: u64) -> io::Result<()> {
        self.fds.get(fd).map(|_| ()).ok_or_else(ebadf)
    }

    pub(crate) fn fd_close(&mut self, fd: u64) {
        if let Some(of) = self.fds.close(fd) {
            self.reap_if_unused(of.node);
        }
    }

    /// Recursively delete a directory's contents. Preconditions are checked
    /// per level; open descriptors keep unlinked file nodes alive.
    fn remove_tree(&mut self, dir: NodeId) -> io::Result<()> {
        self.check(dir, Access::Read)?;
        self.check_entry_mutation(dir)?;
        let now = SystemTime::now();
        let children: Vec<(String, NodeId)> = self
            .tree
            .node(dir)
            .children()
            .map(|c| c.iter().map(|(n, id)| (n.clone(), *id)).collect())
            .unwrap_or_default();
        for (name, id) in children {
            if self.tree.node(id).is_dir() {
                self.remove_tree(id)?;
                self.tree.detach_child(dir, &name, now);
                self.tree.reap(id);
            } else {
                self.tree.unlink_child(dir, &name, now);
                self.reap_if_unused(id);
            }
        }
        Ok(())
    }
}

impl Backend for VirtualBackend {
    fn stat(&mut self, path: &Path, follow: bool) -> io::Result<Stat> {
        let follow = if follow {
            Follow::All
        } else {
            Follow::NoFollowLast
        };
        let resolved = self.resolver().lookup(path, follow)?;
        Ok(self.stat_of(resolved.id))
    }

    fn open(&mut self, path: &Path, how: &OpenHow) -> io::Result<FileHandle> {
        let writable = how.write || how.append;
        if !how.read && !writable {
            return Err(einval());
        }
        if (how.truncate || how.create || how.create_new) && !writable {
            return Err(einval());
        }
        if how.truncate && how.append {
            return Err(einval());
        }

        let now = SystemTime::now();
        let flags = OpenFlags {
            read: how.read,
            write: writable,
            append: how.append,
        };

        let node = match self.resolver().lookup(path, Follow::All) {
            Ok(resolved) => {
                if how.create_new {
                    return Err(eexist());
                }
                let node = self.tree.node(resolved.id);
                if node.is_dir() && flags.write {
                    return Err(eisdir());
                }
                if flags.read {
                    self.check(resolved.id, Access::Read)?;
                }
                if flags.write {
                    self.check(resolved.id, Access::Write)?;
                }
                if how.truncate {
                    self.tree.truncate(resolved.id, 0, now);
                }
                resolved.id
            }
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) && (how.create || how.create_new) => {
                // A trailing slash asks for a directory; open cannot create one.
                if path.as_os_str().as_encoded_bytes().ends_with(b"/") {
                    return Err(eisdir());
                }
                let (parent, name) = self.resolver().lookup_parent(path)?;
                if let Some(existing) = self.tree.child(parent, &name) {
                    // A dangling symlink: creating through it targets the
                    // link destination, except under create_new.
                    if let NodeKind::Symlink { target } = &self.tree.node(existing).kind {
                        if how.create_new {
                            return Err(eexist());
                        }
                        let target = target.clone();
                        let full = if target.is_absolute() {
                            target
                        } else {
                            self.resolver().dir_path(parent).join(target)
                        };
                        return self.open(&full, how);
                    }
                    return Err(eexist());
                }
                self.check_entry_mutation(parent)?;
                let id = self
                    .tree
                    .alloc(Node::file(Vec::new(), how.mode, self.uid, self.gid, now));
                self.tree.insert_child(parent, &name, id, now)?;
                tracing::trace!(target: crate::TRACING_TARGET, path = %path.display(), "create");
                id
            }
            Err(err) => return Err(err),
        };

        let fd = self.fds.alloc(OpenFile {
            node,
            pos: 0,
            flags,
        });
        Ok(FileHandle::Virtual(fd))
    }

    fn create_dir(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        let now = SystemTime::now();
        let (parent, name) = self.resolver().lookup_parent(path)?;
        if self.tree.child(parent, &name).is_some() {
            return Err(eexist());
        }
        self.check_entry_mutation(parent)?;
        let id = self
            .tree
            .alloc(Node::dir(parent, mode, self.uid, self.gid, now));
        self.tree.insert_child(parent, &name, id, now)?;
        tracing::trace!(target: crate::TRACING_TARGET, path = %path.display(), "mkdir");
        Ok(())
    }

    fn remove_dir(&mut self, path: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let resolved = self.resolver().lookup(path, Follow::NoFollowLast)?;
        if resolved.id == ROOT {
            return Err(ebusy());
        }
        if !self.tree.node(resolved.id).is_dir() {
            return Err(enotdir());
        }
        if !self.tree.is_empty_dir(resolved.id) {
            return Err(enotempty());
        }
        self.check_entry_mutation(resolved.parent)?;
        self.tree.detach_child(resolved.parent, &resolved.name, now);
        self.tree.reap(resolved.id);
        tracing::trace!(target: crate::TRACING_TARGET, path = %path.display(), "rmdir");
        Ok(())
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let resolved = self.resolver().lookup(path, Follow::NoFollowLast)?;
        if !self.tree.node(resolved.id).is_dir() {
            return Err(enotdir());
        }
        if resolved.id == ROOT {
            return Err(ebusy());
        }
        self.check_entry_mutation(resolved.parent)?;
        self.remove_tree(resolved.id)?;
        self.tree.detach_child(resolved.parent, &resolved.name, now);
        self.tree.reap(resolved.id);
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let resolved = self.resolver().lookup(path, Follow::NoFollowLast)?;
        if self.tree.node(resolved.id).is_dir() {
            return Err(eisdir());
        }
        self.check_entry_mutation(resolved.parent)?;
        self.tree.unlink_child(resolved.parent, &resolved.name, now);
        self.reap_if_unused(resolved.id);
        tracing::trace!(target: crate::TRACING_TARGET, path = %path.display(), "unlink");
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let src = self.resolver().lookup(from, Follow::NoFollowLast)?;
        if src.id == ROOT {
            return Err(ebusy());
        }
        let (to_parent, to_name) = self.resolver().lookup_parent(to)?;
        self.check_entry_mutation(src.parent)?;
        self.check_entry_mutation(to_parent)?;

        let src_is_dir = self.tree.node(src.id).is_dir();
        if src_is_dir {
            // A directory cannot be moved into its own subtree.
            let mut cur = to_parent;
            loop {
                if cur == src.id {
                    return Err(einval());
                }
                if cur == ROOT {
                    break;
                }
                cur = self.tree.dir_parent(cur);
            }
        }

        match self.tree.child(to_parent, &to_name) {
            // Source and destination are the same node: nothing to do.
            Some(dest) if dest == src.id => return Ok(()),
            Some(dest) => {
                let dest_is_dir = self.tree.node(dest).is_dir();
                if src_is_dir {
                    if !dest_is_dir {
                        return Err(enotdir());
                    }
                    if !self.tree.is_empty_dir(dest) {
                        return Err(enotempty());
                    }
                    self.tree.detach_child(to_parent, &to_name, now);
                    self.tree.reap(dest);
                } else {
                    if dest_is_dir {
                        return Err(eisdir());
                    }
                    self.tree.unlink_child(to_parent, &to_name, now);
                    self.reap_if_unused(dest);
                }
            }
            None => {}
        }

        // Reparent the node, preserving its identity; no content moves.
        self.tree.detach_child(src.parent, &src.name, now);
        self.tree.insert_child(to_parent, &to_name, src.id, now)?;
        if src_is_dir {
            self.tree.set_dir_parent(src.id, to_parent);
        }
        tracing::trace!(
            target: crate::TRACING_TARGET,
            from = %from.display(),
            to = %to.display(),
            "rename"
        );
        Ok(())
    }

    fn hard_link(&mut self, original: &Path, link: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let orig = self.resolver().lookup(original, Follow::All)?;
        if self.tree.node(orig.id).is_dir() {
            return Err(eperm());
        }
        let (parent, name) = self.resolver().lookup_parent(link)?;
        if self.tree.child(parent, &name).is_some() {
            return Err(eexist());
        }
        self.check_entry_mutation(parent)?;
        self.tree.add_link(parent, &name, orig.id, now)?;
        tracing::trace!(
            target: crate::TRACING_TARGET,
            original = %original.display(),
            link = %link.display(),
            "link"
        );
        Ok(())
    }

    fn symlink(&mut self, original: &Path, link: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let (parent, name) = self.resolver().lookup_parent(link)?;
        if self.tree.child(parent, &name).is_some() {
            return Err(eexist());
        }
        self.check_entry_mutation(parent)?;
        // The target is stored as written; it may dangle until resolve time.
        let id = self
            .tree
            .alloc(Node::symlink(original.to_path_buf(), self.uid, self.gid, now));
        self.tree.insert_child(parent, &name, id, now)?;
        Ok(())
    }

    fn read_link(&mut self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolver().lookup(path, Follow::NoFollowLast)?;
        match &self.tree.node(resolved.id).kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(einval()),
        }
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<Vec<DirEntryData>> {
        let resolved = self.resolver().lookup(path, Follow::All)?;
        let node = self.tree.node(resolved.id);
        if !node.is_dir() {
            return Err(enotdir());
        }
        self.check(resolved.id, Access::Read)?;
        let entries = node
            .children()
            .expect("directory")
            .iter()
            .map(|(name, id)| DirEntryData {
                path: path.join(name),
                file_name: name.clone().into(),
                kind: self.tree.node(*id).kind(),
            })
            .collect();
        self.tree.node_mut(resolved.id).atime = SystemTime::now();
        Ok(entries)
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        let resolved = self.resolver().lookup(path, Follow::All)?;
        let node = self.tree.node(resolved.id);
        if self.uid != 0 && self.uid != node.uid {
            return Err(eperm());
        }
        self.tree.set_mode(resolved.id, mode, SystemTime::now());
        Ok(())
    }

    fn chown(&mut self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let resolved = self.resolver().lookup(path, Follow::All)?;
        let node = self.tree.node(resolved.id);
        if self.uid != 0 {
            // Unprivileged chown may only adjust the group of an owned node.
            if self.uid != node.uid || uid.is_some_and(|u| u != node.uid) {
                return Err(eperm());
            }
        }
        self.tree
            .set_owner(resolved.id, uid, gid, SystemTime::now());
        Ok(())
    }

    fn canonicalize(&mut self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolver().lookup(path, Follow::All)?;
        if self.tree.node(resolved.id).is_dir() {
            Ok(self.resolver().dir_path(resolved.id))
        } else {
            Ok(self.resolver().dir_path(resolved.parent).join(&resolved.name))
        }
    }

    fn current_dir(&mut self) -> io::Result<PathBuf> {
        Ok(self.cwd.clone())
    }

    fn set_current_dir(&mut self, path: &Path) -> io::Result<()> {
        let resolved = self.resolver().lookup(path, Follow::All)?;
        if !self.tree.node(resolved.id).is_dir() {
            return Err(enotdir());
        }
        self.check(resolved.id, Access::Exec)?;
        self.cwd = self.resolver().dir_path(resolved.id);
        tracing::debug!(target: crate::TRACING_TARGET, cwd = %self.cwd.display(), "chdir");
        Ok(())
    }
}
