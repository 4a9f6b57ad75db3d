//! The open descriptor table of a virtual session.

use crate::node::NodeId;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OpenFlags {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) append: bool,
}

/// An open handle: the node it references, the cursor, and the mode it was
/// opened with. Created by open, mutated by read/write/seek, destroyed by
/// close or by session teardown.
#[derive(Debug)]
pub(crate) struct OpenFile {
    pub(crate) node: NodeId,
    pub(crate) pos: u64,
    pub(crate) flags: OpenFlags,
}

#[derive(Default)]
pub(crate) struct FdTable {
    files: IndexMap<u64, OpenFile>,
    next_fd: u64,
}

impl FdTable {
    pub(crate) fn alloc(&mut self, file: OpenFile) -> u64 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, file);
        fd
    }

    pub(crate) fn get(&self, fd: u64) -> Option<&OpenFile> {
        self.files.get(&fd)
    }

    pub(crate) fn get_mut(&mut self, fd: u64) -> Option<&mut OpenFile> {
        self.files.get_mut(&fd)
    }

    pub(crate) fn close(&mut self, fd: u64) -> Option<OpenFile> {
        self.files.shift_remove(&fd)
    }

    /// Number of open descriptors referencing `node`. Unlinked nodes are
    /// kept alive while this is non-zero.
    pub(crate) fn refs(&self, node: NodeId) -> usize {
        self.files.values().filter(|f| f.node == node).count()
    }
}
