//! Deferred filesystem entry points mirroring `tokio::fs`.
//!
//! Every function here evaluates its operation **eagerly** against the
//! currently selected backend and returns an [`Op`] that is already settled;
//! awaiting it is a pure suspension point. The asynchrony is an interface
//! contract, not concurrent tree access — which is exactly what makes
//! [`bypass`](crate::bypass) compose with deferred work:
//!
//! ```
//! use mirage::aio;
//!
//! # tokio_test::block_on(async {
//! mirage::activate([("/data/file.txt", "virtual")]).unwrap();
//!
//! // The stat runs against the real backend inside the bypass window; the
//! // returned Op settles later, after virtual mode is already back.
//! let pending = mirage::bypass(|| aio::metadata("/"));
//! assert!(mirage::fs::exists("/data/file.txt"));
//! let real_root = pending.await.unwrap();
//! assert!(real_root.is_dir());
//! # mirage::restore();
//! # });
//! ```
//!
//! Code that builds its own futures (`async` blocks) defers the operation
//! calls themselves; those observe whichever backend is selected when the
//! future is polled.

use crate::fs as sync_fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

// Re-export types that are the same.
pub use sync_fs::{DirEntry, FileType, Metadata, Permissions, ReadDir};

/// A deferred operation: evaluated at creation, observed on await.
///
/// Settles with the outcome captured when the entry point was called,
/// independent of backend switches that happen in between.
#[derive(Debug)]
pub struct Op<T> {
    output: Option<io::Result<T>>,
}

impl<T> Op<T> {
    fn new(output: io::Result<T>) -> Op<T> {
        Op {
            output: Some(output),
        }
    }
}

impl<T: Unpin> Future for Op<T> {
    type Output = io::Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(
            self.get_mut()
                .output
                .take()
                .expect("operation polled after completion"),
        )
    }
}

/// Deferred version of [`fs::canonicalize`](crate::fs::canonicalize).
pub fn canonicalize<P: AsRef<Path>>(path: P) -> Op<PathBuf> {
    Op::new(sync_fs::canonicalize(path))
}

/// Deferred version of [`fs::chown`](crate::fs::chown).
pub fn chown<P: AsRef<Path>>(path: P, uid: Option<u32>, gid: Option<u32>) -> Op<()> {
    Op::new(sync_fs::chown(path, uid, gid))
}

/// Deferred version of [`fs::copy`](crate::fs::copy).
pub fn copy<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Op<u64> {
    Op::new(sync_fs::copy(from, to))
}

/// Deferred version of [`fs::create_dir`](crate::fs::create_dir).
pub fn create_dir<P: AsRef<Path>>(path: P) -> Op<()> {
    Op::new(sync_fs::create_dir(path))
}

/// Deferred version of [`fs::create_dir_all`](crate::fs::create_dir_all).
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Op<()> {
    Op::new(sync_fs::create_dir_all(path))
}

/// Deferred version of [`fs::hard_link`](crate::fs::hard_link).
pub fn hard_link<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> Op<()> {
    Op::new(sync_fs::hard_link(original, link))
}

/// Deferred version of [`fs::metadata`](crate::fs::metadata).
pub fn metadata<P: AsRef<Path>>(path: P) -> Op<Metadata> {
    Op::new(sync_fs::metadata(path))
}

/// Deferred version of [`fs::read`](crate::fs::read).
pub fn read<P: AsRef<Path>>(path: P) -> Op<Vec<u8>> {
    Op::new(sync_fs::read(path))
}

/// Deferred version of [`fs::read_dir`](crate::fs::read_dir).
pub fn read_dir<P: AsRef<Path>>(path: P) -> Op<ReadDir> {
    Op::new(sync_fs::read_dir(path))
}

/// Deferred version of [`fs::read_link`](crate::fs::read_link).
pub fn read_link<P: AsRef<Path>>(path: P) -> Op<PathBuf> {
    Op::new(sync_fs::read_link(path))
}

/// Deferred version of [`fs::read_to_string`](crate::fs::read_to_string).
pub fn read_to_string<P: AsRef<Path>>(path: P) -> Op<String> {
    Op::new(sync_fs::read_to_string(path))
}

/// Deferred version of [`fs::remove_dir`](crate::fs::remove_dir).
pub fn remove_dir<P: AsRef<Path>>(path: P) -> Op<()> {
    Op::new(sync_fs::remove_dir(path))
}

/// Deferred version of [`fs::remove_dir_all`](crate::fs::remove_dir_all).
pub fn remove_dir_all<P: AsRef<Path>>(path: P) -> Op<()> {
    Op::new(sync_fs::remove_dir_all(path))
}

/// Deferred version of [`fs::remove_file`](crate::fs::remove_file).
pub fn remove_file<P: AsRef<Path>>(path: P) -> Op<()> {
    Op::new(sync_fs::remove_file(path))
}

/// Deferred version of [`fs::rename`](crate::fs::rename).
pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Op<()> {
    Op::new(sync_fs::rename(from, to))
}

/// Deferred version of [`fs::set_permissions`](crate::fs::set_permissions).
pub fn set_permissions<P: AsRef<Path>>(path: P, perm: Permissions) -> Op<()> {
    Op::new(sync_fs::set_permissions(path, perm))
}

/// Deferred version of [`fs::symlink`](crate::fs::symlink).
pub fn symlink<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> Op<()> {
    Op::new(sync_fs::symlink(original, link))
}

/// Deferred version of [`fs::symlink_metadata`](crate::fs::symlink_metadata).
pub fn symlink_metadata<P: AsRef<Path>>(path: P) -> Op<Metadata> {
    Op::new(sync_fs::symlink_metadata(path))
}

/// Deferred version of [`fs::try_exists`](crate::fs::try_exists).
pub fn try_exists<P: AsRef<Path>>(path: P) -> Op<bool> {
    Op::new(sync_fs::try_exists(path))
}

/// Deferred version of [`fs::write`](crate::fs::write).
pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Op<()> {
    Op::new(sync_fs::write(path, contents))
}

/// A deferred file handle.
///
/// The async equivalent of [`fs::File`](crate::fs::File), implementing
/// [`tokio::io::AsyncRead`], [`AsyncWrite`](tokio::io::AsyncWrite), and
/// [`AsyncSeek`](tokio::io::AsyncSeek). Like its sync counterpart it stays
/// bound to the backend that opened it.
#[derive(Debug)]
pub struct File {
    inner: sync_fs::File,
}

impl File {
    /// Opens a file in read-only mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Op<File> {
        Op::new(sync_fs::File::open(path).map(|inner| File { inner }))
    }

    /// Opens a file in write-only mode, creating it if needed and truncating
    /// it otherwise.
    pub fn create<P: AsRef<Path>>(path: P) -> Op<File> {
        Op::new(sync_fs::File::create(path).map(|inner| File { inner }))
    }

    /// Converts a sync [`fs::File`](crate::fs::File) into a deferred one.
    pub fn from_std(inner: sync_fs::File) -> File {
        File { inner }
    }

    /// Converts this handle into its sync counterpart.
    pub fn into_std(self) -> sync_fs::File {
        self.inner
    }

    /// Deferred version of [`fs::File::sync_all`](crate::fs::File::sync_all).
    pub fn sync_all(&self) -> Op<()> {
        Op::new(self.inner.sync_all())
    }

    /// Deferred version of [`fs::File::sync_data`](crate::fs::File::sync_data).
    pub fn sync_data(&self) -> Op<()> {
        Op::new(self.inner.sync_data())
    }

    /// Deferred version of [`fs::File::set_len`](crate::fs::File::set_len).
    pub fn set_len(&self, size: u64) -> Op<()> {
        Op::new(self.inner.set_len(size))
    }

    /// Deferred version of [`fs::File::metadata`](crate::fs::File::metadata).
    pub fn metadata(&self) -> Op<Metadata> {
        Op::new(self.inner.metadata())
    }

    /// Deferred version of [`fs::File::try_clone`](crate::fs::File::try_clone).
    pub fn try_clone(&self) -> Op<File> {
        Op::new(self.inner.try_clone().map(|inner| File { inner }))
    }

    /// Reads bytes at `offset` without moving the cursor.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Op<usize> {
        use std::os::unix::fs::FileExt;
        Op::new(self.inner.read_at(buf, offset))
    }

    /// Writes bytes at `offset` without moving the cursor.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Op<usize> {
        use std::os::unix::fs::FileExt;
        Op::new(self.inner.write_at(buf, offset))
    }
}

impl tokio::io::AsyncRead for File {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        use std::io::Read;
        let slice = buf.initialize_unfilled();
        match self.inner.read(slice) {
            Ok(n) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}

impl tokio::io::AsyncWrite for File {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        use std::io::Write;
        Poll::Ready(self.inner.write(buf))
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        use std::io::Write;
        Poll::Ready(self.inner.flush())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl tokio::io::AsyncSeek for File {
    fn start_seek(mut self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        use std::io::Seek;
        self.inner.seek(position)?;
        Ok(())
    }

    fn poll_complete(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        use std::io::Seek;
        Poll::Ready(self.inner.stream_position())
    }
}

/// Options for opening files through the deferred surface.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    inner: sync_fs::OpenOptions,
}

impl OpenOptions {
    /// Creates a blank new set of options.
    pub fn new() -> Self {
        OpenOptions {
            inner: sync_fs::OpenOptions::new(),
        }
    }

    /// Sets the option for read access.
    pub fn read(&mut self, read: bool) -> &mut Self {
        self.inner.read(read);
        self
    }

    /// Sets the option for write access.
    pub fn write(&mut self, write: bool) -> &mut Self {
        self.inner.write(write);
        self
    }

    /// Sets the option for append mode.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.inner.append(append);
        self
    }

    /// Sets the option for truncating an existing file on open.
    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.inner.truncate(truncate);
        self
    }

    /// Sets the option for creating the file if it does not exist.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.inner.create(create);
        self
    }

    /// Sets the option for creating a new file, failing if it already
    /// exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.inner.create_new(create_new);
        self
    }

    /// Opens a file at `path` with the options specified by `self`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Op<File> {
        Op::new(self.inner.open(path).map(|inner| File { inner }))
    }
}

impl std::os::unix::fs::OpenOptionsExt for OpenOptions {
    fn mode(&mut self, mode: u32) -> &mut Self {
        std::os::unix::fs::OpenOptionsExt::mode(&mut self.inner, mode);
        self
    }

    fn custom_flags(&mut self, flags: i32) -> &mut Self {
        std::os::unix::fs::OpenOptionsExt::custom_flags(&mut self.inner, flags);
        self
    }
}

/// A builder for creating directories through the deferred surface.
#[derive(Debug, Default)]
pub struct DirBuilder {
    inner: sync_fs::DirBuilder,
}

impl DirBuilder {
    /// Creates a new builder with default options.
    pub fn new() -> Self {
        DirBuilder {
            inner: sync_fs::DirBuilder::new(),
        }
    }

    /// Sets the option for recursive directory creation.
    pub fn recursive(&mut self, recursive: bool) -> &mut Self {
        self.inner.recursive(recursive);
        self
    }

    /// Creates the directory at the given path.
    pub fn create<P: AsRef<Path>>(&self, path: P) -> Op<()> {
        Op::new(self.inner.create(path))
    }
}

impl std::os::unix::fs::DirBuilderExt for DirBuilder {
    fn mode(&mut self, mode: u32) -> &mut Self {
        std::os::unix::fs::DirBuilderExt::mode(&mut self.inner, mode);
        self
    }
}
