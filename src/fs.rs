//! Filesystem types mirroring `std::fs`.
//!
//! Drop-in replacements for:
//! - [`File`] - File handle with `std::io::{Read, Write, Seek}` and
//!   `std::os::unix::fs::FileExt` impls
//! - [`OpenOptions`] - Options for opening files
//! - [`Metadata`] - File metadata
//! - [`ReadDir`] - Iterator over directory entries
//! - [`DirEntry`] - An entry inside a directory
//! - [`FileType`] - Representation of a file type
//! - [`Permissions`] - Permission bits
//! - [`DirBuilder`] - Directory creation options
//! - Free functions: [`canonicalize`], [`chown`], [`copy`], [`create_dir`],
//!   [`create_dir_all`], [`exists`], [`hard_link`], [`metadata`], [`read`],
//!   [`read_dir`], [`read_link`], [`read_to_string`], [`remove_dir`],
//!   [`remove_dir_all`], [`remove_file`], [`rename`], [`set_permissions`],
//!   [`symlink`], [`symlink_metadata`], [`try_exists`], [`write`]
//!
//! Every call routes through whichever backend is currently selected: the
//! in-memory tree while a session is [`activate`](crate::activate)d, the
//! platform filesystem otherwise and inside [`bypass`](crate::bypass)
//! callbacks. Failures carry the same errno the real backend would produce.
//!
//! An open [`File`] is bound to the backend that opened it for its whole
//! lifetime. Reads and writes on a virtual handle keep going to the tree
//! during a bypass window, and keep working on files unlinked while open.

use crate::backend::{real, DirEntryData, FileHandle, OpenHow, Stat};
use crate::error::enotdir;
use crate::node::FileKind;
use crate::session::Controller;
use std::io::{self, ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the canonical, absolute form of a path with all intermediate
/// components normalized and symbolic links resolved.
pub fn canonicalize<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.canonicalize(&path))
}

/// Changes the ownership of a file or directory.
///
/// Mirrors `std::os::unix::fs::chown`. `None` leaves the respective id
/// unchanged. Open descriptors are not re-validated.
pub fn chown<P: AsRef<Path>>(path: P, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.chown(&path, uid, gid))
}

/// Copies the contents of one file to another, returning the number of bytes
/// copied.
///
/// Note: this does not copy file permissions or other metadata.
pub fn copy<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<u64> {
    let contents = read(from)?;
    let len = contents.len() as u64;
    write(to, contents)?;
    Ok(len)
}

/// Creates a new, empty directory at the provided path.
pub fn create_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.create_dir(&path, 0o755))
}

/// Creates a directory and all of its parent components if they are missing.
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> io::Result<()> {
    create_dir_all_with_mode(path.as_ref(), 0o755)
}

fn create_dir_all_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    // Collect the missing ancestors, then create from the root down.
    let mut missing = Vec::new();
    let mut current = Some(path);
    while let Some(p) = current {
        if p.as_os_str().is_empty() {
            break;
        }
        match metadata(p) {
            Ok(md) if md.is_dir() => break,
            Ok(_) => return Err(enotdir()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                missing.push(p.to_path_buf());
                current = p.parent();
            }
            Err(err) => return Err(err),
        }
    }
    for dir in missing.into_iter().rev() {
        match Controller::with_backend(|b| b.create_dir(&dir, mode)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Returns `true` if the path points at an existing entity.
///
/// Follows symbolic links, so a dangling link reports `false`.
pub fn exists<P: AsRef<Path>>(path: P) -> bool {
    metadata(path).is_ok()
}

/// Returns `Ok(true)` if the path points at an existing entity, preserving
/// errors other than not-found.
pub fn try_exists<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    match metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Creates a hard link on the filesystem: a second name for the same file.
///
/// Both names refer to the same content; the content is freed only when the
/// last name is removed and no open handle remains.
pub fn hard_link<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> io::Result<()> {
    let original = original.as_ref().to_path_buf();
    let link = link.as_ref().to_path_buf();
    Controller::with_backend(|b| b.hard_link(&original, &link))
}

/// Returns metadata for a file or directory, following symbolic links.
pub fn metadata<P: AsRef<Path>>(path: P) -> io::Result<Metadata> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.stat(&path, true)).map(Metadata)
}

/// Read the entire contents of a file into a bytes vector.
pub fn read<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Returns an iterator over the entries within a directory.
///
/// The listing order is the order entries were created in.
pub fn read_dir<P: AsRef<Path>>(path: P) -> io::Result<ReadDir> {
    let path = path.as_ref().to_path_buf();
    let entries = Controller::with_backend(|b| b.read_dir(&path))?;
    Ok(ReadDir {
        entries: entries.into_iter(),
    })
}

/// Reads the target of a symbolic link.
pub fn read_link<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.read_link(&path))
}

/// Read the entire contents of a file into a UTF-8 string.
pub fn read_to_string<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let bytes = read(path)?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

/// Removes an empty directory.
pub fn remove_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.remove_dir(&path))
}

/// Removes a directory and all of its contents.
pub fn remove_dir_all<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.remove_dir_all(&path))
}

/// Removes a file or symbolic link from the filesystem.
///
/// A file that is still open stays readable and writable through its handle;
/// its content is freed on the last close.
pub fn remove_file<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.remove_file(&path))
}

/// Renames a file or directory, replacing the destination where the standard
/// semantics allow it.
///
/// The node is reparented, preserving its identity; content never moves.
pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<()> {
    let from = from.as_ref().to_path_buf();
    let to = to.as_ref().to_path_buf();
    Controller::with_backend(|b| b.rename(&from, &to))
}

/// Set the permissions of a file or directory.
pub fn set_permissions<P: AsRef<Path>>(path: P, perm: Permissions) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.set_mode(&path, perm.mode))
}

/// Creates a new symbolic link on the filesystem.
///
/// The target is stored as written and resolved lazily; creating a link to a
/// missing target succeeds.
pub fn symlink<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> io::Result<()> {
    let original = original.as_ref().to_path_buf();
    let link = link.as_ref().to_path_buf();
    Controller::with_backend(|b| b.symlink(&original, &link))
}

/// Returns metadata for a path without following a trailing symbolic link.
pub fn symlink_metadata<P: AsRef<Path>>(path: P) -> io::Result<Metadata> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.stat(&path, false)).map(Metadata)
}

/// Write a slice as the entire contents of a file, creating it if needed and
/// truncating it otherwise.
pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_ref())
}

/// A file handle.
///
/// Drop-in replacement for `std::fs::File`. The handle is bound to the
/// backend that opened it: once open, it is unaffected by bypass windows and
/// by the path being unlinked. After [`restore`](crate::restore), operations
/// on surviving virtual handles fail with the EBADF shape.
#[derive(Debug)]
pub struct File {
    inner: FileHandle,
}

impl File {
    /// Attempts to open a file in read-only mode.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<File> {
        OpenOptions::new().read(true).open(path)
    }

    /// Opens a file in write-only mode, creating it if it doesn't exist and
    /// truncating it if it does.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    /// Opens a file in read-write mode, failing if it already exists.
    pub fn create_new<P: AsRef<Path>>(path: P) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
    }

    /// Queries metadata about the underlying file.
    pub fn metadata(&self) -> io::Result<Metadata> {
        match &self.inner {
            FileHandle::Real(file) => Ok(Metadata(real::stat_from(&file.metadata()?))),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_stat(fd)).map(Metadata)
            }
        }
    }

    /// Truncates or extends the file to the specified size, zero-filling any
    /// extension.
    pub fn set_len(&self, size: u64) -> io::Result<()> {
        match &self.inner {
            FileHandle::Real(file) => file.set_len(size),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_set_len(fd, size))
            }
        }
    }

    /// Syncs all data and metadata to disk.
    ///
    /// The virtual tree has no durability model, so this only validates the
    /// handle.
    pub fn sync_all(&self) -> io::Result<()> {
        match &self.inner {
            FileHandle::Real(file) => file.sync_all(),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_sync(fd))
            }
        }
    }

    /// Syncs file data to disk; see [`File::sync_all`].
    pub fn sync_data(&self) -> io::Result<()> {
        match &self.inner {
            FileHandle::Real(file) => file.sync_data(),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_sync(fd))
            }
        }
    }

    /// Creates a new independently owned handle to the underlying file.
    ///
    /// The two handles read and write at independent cursors.
    pub fn try_clone(&self) -> io::Result<File> {
        match &self.inner {
            FileHandle::Real(file) => Ok(File {
                inner: FileHandle::Real(file.try_clone()?),
            }),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                let dup = Controller::with_session(|s| s.fd_dup(fd))?;
                Ok(File {
                    inner: FileHandle::Virtual(dup),
                })
            }
        }
    }
}

impl io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            FileHandle::Real(file) => file.read(buf),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_read(fd, buf))
            }
        }
    }
}

impl io::Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            FileHandle::Real(file) => file.write(buf),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_write(fd, buf))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            FileHandle::Real(file) => file.flush(),
            FileHandle::Virtual(_) => Ok(()),
        }
    }
}

impl io::Seek for File {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            FileHandle::Real(file) => file.seek(pos),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_seek(fd, pos))
            }
        }
    }
}

impl std::os::unix::fs::FileExt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match &self.inner {
            FileHandle::Real(file) => std::os::unix::fs::FileExt::read_at(file, buf, offset),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_read_at(fd, buf, offset))
            }
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        match &self.inner {
            FileHandle::Real(file) => std::os::unix::fs::FileExt::write_at(file, buf, offset),
            FileHandle::Virtual(fd) => {
                let fd = *fd;
                Controller::with_session(|s| s.fd_write_at(fd, buf, offset))
            }
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if let FileHandle::Virtual(fd) = self.inner {
            Controller::with_session_if_set(|s| s.fd_close(fd));
        }
    }
}

/// Options and flags for opening files.
///
/// Drop-in replacement for `std::fs::OpenOptions`.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    how: OpenHow,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Creates a blank new set of options.
    pub fn new() -> Self {
        OpenOptions {
            how: OpenHow::default(),
        }
    }

    /// Sets the option for read access.
    pub fn read(&mut self, read: bool) -> &mut Self {
        self.how.read = read;
        self
    }

    /// Sets the option for write access.
    pub fn write(&mut self, write: bool) -> &mut Self {
        self.how.write = write;
        self
    }

    /// Sets the option for append mode. Writes go to the end of the file
    /// regardless of the cursor.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.how.append = append;
        self
    }

    /// Sets the option for truncating an existing file on open.
    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.how.truncate = truncate;
        self
    }

    /// Sets the option for creating the file if it does not exist.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.how.create = create;
        self
    }

    /// Sets the option for creating a new file, failing if it already
    /// exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.how.create_new = create_new;
        self
    }

    /// Opens a file at `path` with the options specified by `self`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> io::Result<File> {
        let path = path.as_ref().to_path_buf();
        Controller::with_backend(|b| b.open(&path, &self.how)).map(|inner| File { inner })
    }
}

impl std::os::unix::fs::OpenOptionsExt for OpenOptions {
    fn mode(&mut self, mode: u32) -> &mut Self {
        self.how.mode = mode;
        self
    }

    fn custom_flags(&mut self, flags: i32) -> &mut Self {
        // Passed through to the real backend; the virtual one ignores them.
        self.how.custom_flags = flags;
        self
    }
}

/// Metadata information about a file.
///
/// Drop-in replacement for `std::fs::Metadata`, including the
/// `std::os::unix::fs::MetadataExt` accessors.
#[derive(Debug, Clone)]
pub struct Metadata(pub(crate) Stat);

fn unix_time(time: SystemTime) -> (i64, i64) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i64),
        Err(err) => (-(err.duration().as_secs() as i64), 0),
    }
}

impl Metadata {
    /// Returns the size of the file in bytes.
    #[allow(clippy::len_without_is_empty)] // is_empty() is not part of std::fs::Metadata
    pub fn len(&self) -> u64 {
        self.0.len
    }

    /// Returns true if this metadata is for a regular file.
    pub fn is_file(&self) -> bool {
        self.0.kind == FileKind::File
    }

    /// Returns true if this metadata is for a directory.
    pub fn is_dir(&self) -> bool {
        self.0.kind == FileKind::Dir
    }

    /// Returns true if this metadata is for a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.0.kind == FileKind::Symlink
    }

    /// Returns the file type for this metadata.
    pub fn file_type(&self) -> FileType {
        FileType { kind: self.0.kind }
    }

    /// Returns the last modification time.
    pub fn modified(&self) -> io::Result<SystemTime> {
        Ok(self.0.mtime)
    }

    /// Returns the last access time.
    pub fn accessed(&self) -> io::Result<SystemTime> {
        Ok(self.0.atime)
    }

    /// Returns the creation time.
    pub fn created(&self) -> io::Result<SystemTime> {
        Ok(self.0.crtime)
    }

    /// Returns the permissions of the file.
    pub fn permissions(&self) -> Permissions {
        Permissions { mode: self.0.mode }
    }
}

impl std::os::unix::fs::MetadataExt for Metadata {
    fn dev(&self) -> u64 {
        0
    }

    fn ino(&self) -> u64 {
        0
    }

    fn mode(&self) -> u32 {
        let type_bits = match self.0.kind {
            FileKind::Symlink => 0o120000,
            FileKind::Dir => 0o040000,
            FileKind::File => 0o100000,
        };
        type_bits | self.0.mode
    }

    fn nlink(&self) -> u64 {
        self.0.nlink
    }

    fn uid(&self) -> u32 {
        self.0.uid
    }

    fn gid(&self) -> u32 {
        self.0.gid
    }

    fn rdev(&self) -> u64 {
        0
    }

    fn size(&self) -> u64 {
        self.0.len
    }

    fn atime(&self) -> i64 {
        unix_time(self.0.atime).0
    }

    fn atime_nsec(&self) -> i64 {
        unix_time(self.0.atime).1
    }

    fn mtime(&self) -> i64 {
        unix_time(self.0.mtime).0
    }

    fn mtime_nsec(&self) -> i64 {
        unix_time(self.0.mtime).1
    }

    fn ctime(&self) -> i64 {
        unix_time(self.0.ctime).0
    }

    fn ctime_nsec(&self) -> i64 {
        unix_time(self.0.ctime).1
    }

    fn blksize(&self) -> u64 {
        4096
    }

    fn blocks(&self) -> u64 {
        self.0.len.div_ceil(512)
    }
}

/// Representation of a file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    kind: FileKind,
}

impl FileType {
    /// Returns true if this file type is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    /// Returns true if this file type is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Returns true if this file type is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Representation of permission bits.
///
/// Drop-in replacement for `std::fs::Permissions`, including
/// `std::os::unix::fs::PermissionsExt`. Unlike the informational-only
/// permissions of some simulations, these bits are enforced by the virtual
/// backend against the session's uid/gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions {
    mode: u32,
}

impl Permissions {
    /// Returns true if these permissions describe an unwritable file.
    pub fn readonly(&self) -> bool {
        self.mode & 0o200 == 0
    }

    /// Modifies the readonly flag for this set of permissions.
    pub fn set_readonly(&mut self, readonly: bool) {
        if readonly {
            self.mode &= !0o222;
        } else {
            self.mode |= 0o200;
        }
    }

    /// Create permissions from mode bits.
    pub fn from_mode(mode: u32) -> Self {
        Permissions { mode }
    }

    /// Returns the underlying raw mode bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }
}

impl std::os::unix::fs::PermissionsExt for Permissions {
    fn mode(&self) -> u32 {
        self.mode
    }

    fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    fn from_mode(mode: u32) -> Self {
        Permissions { mode }
    }
}

/// Iterator over directory entries, returned by [`read_dir`].
///
/// The listing is a snapshot taken at the `read_dir` call; later mutations
/// are not reflected.
pub struct ReadDir {
    entries: std::vec::IntoIter<DirEntryData>,
}

impl Iterator for ReadDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|data| Ok(DirEntry { data }))
    }
}

/// An entry inside a directory, yielded by [`ReadDir`].
pub struct DirEntry {
    data: DirEntryData,
}

impl DirEntry {
    /// Returns the full path to this entry.
    pub fn path(&self) -> PathBuf {
        self.data.path.clone()
    }

    /// Returns the file name of this entry.
    pub fn file_name(&self) -> std::ffi::OsString {
        self.data.file_name.clone()
    }

    /// Returns metadata for this entry without following symlinks.
    pub fn metadata(&self) -> io::Result<Metadata> {
        symlink_metadata(&self.data.path)
    }

    /// Returns the file type of this entry as captured at listing time.
    pub fn file_type(&self) -> io::Result<FileType> {
        Ok(FileType {
            kind: self.data.kind,
        })
    }
}

/// A builder for creating directories with options.
///
/// Drop-in replacement for `std::fs::DirBuilder`, including
/// `std::os::unix::fs::DirBuilderExt`.
#[derive(Debug)]
pub struct DirBuilder {
    recursive: bool,
    mode: u32,
}

impl Default for DirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DirBuilder {
    /// Creates a new builder with default options.
    pub fn new() -> Self {
        DirBuilder {
            recursive: false,
            mode: 0o755,
        }
    }

    /// Sets the option for recursive directory creation.
    pub fn recursive(&mut self, recursive: bool) -> &mut Self {
        self.recursive = recursive;
        self
    }

    /// Creates the directory at the given path.
    pub fn create<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        if self.recursive {
            create_dir_all_with_mode(path, self.mode)
        } else {
            let path = path.to_path_buf();
            let mode = self.mode;
            Controller::with_backend(|b| b.create_dir(&path, mode))
        }
    }
}

impl std::os::unix::fs::DirBuilderExt for DirBuilder {
    fn mode(&mut self, mode: u32) -> &mut Self {
        self.mode = mode;
        self
    }
}
