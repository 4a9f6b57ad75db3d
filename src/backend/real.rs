//! The platform filesystem as a [`Backend`].
//!
//! Every capability maps one-to-one onto `std::fs`, `std::env`, or the Unix
//! extension traits. This is what serves the operation surface whenever no
//! virtual session is selected, and during bypass windows.

use super::{Backend, DirEntryData, FileHandle, OpenHow, Stat};
use crate::node::FileKind;
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) struct RealBackend;

fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

pub(crate) fn stat_from(md: &std::fs::Metadata) -> Stat {
    let ft = md.file_type();
    let kind = if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    };
    Stat {
        len: md.len(),
        kind,
        mode: md.mode() & 0o7777,
        uid: md.uid(),
        gid: md.gid(),
        nlink: md.nlink(),
        atime: timestamp(md.atime(), md.atime_nsec()),
        mtime: timestamp(md.mtime(), md.mtime_nsec()),
        ctime: timestamp(md.ctime(), md.ctime_nsec()),
        crtime: md.created().unwrap_or(UNIX_EPOCH),
    }
}

impl Backend for RealBackend {
    fn stat(&mut self, path: &Path, follow: bool) -> io::Result<Stat> {
        let md = if follow {
            std::fs::metadata(path)?
        } else {
            std::fs::symlink_metadata(path)?
        };
        Ok(stat_from(&md))
    }

    fn open(&mut self, path: &Path, how: &OpenHow) -> io::Result<FileHandle> {
        let file = std::fs::OpenOptions::new()
            .read(how.read)
            .write(how.write)
            .append(how.append)
            .truncate(how.truncate)
            .create(how.create)
            .create_new(how.create_new)
            .mode(how.mode)
            .custom_flags(how.custom_flags)
            .open(path)?;
        Ok(FileHandle::Real(file))
    }

    fn create_dir(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        std::os::unix::fs::DirBuilderExt::mode(&mut std::fs::DirBuilder::new(), mode).create(path)
    }

    fn remove_dir(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn hard_link(&mut self, original: &Path, link: &Path) -> io::Result<()> {
        std::fs::hard_link(original, link)
    }

    fn symlink(&mut self, original: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(original, link)
    }

    fn read_link(&mut self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<Vec<DirEntryData>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            let kind = if ft.is_dir() {
                FileKind::Dir
            } else if ft.is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::File
            };
            entries.push(DirEntryData {
                path: entry.path(),
                file_name: entry.file_name(),
                kind,
            });
        }
        Ok(entries)
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn chown(&mut self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::chown(path, uid, gid)
    }

    fn canonicalize(&mut self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn current_dir(&mut self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn set_current_dir(&mut self, path: &Path) -> io::Result<()> {
        std::env::set_current_dir(path)
    }
}
