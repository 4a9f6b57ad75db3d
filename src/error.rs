use std::io;

/// Error returned by session lifecycle operations.
///
/// Operation surface calls never return this type; they fail with
/// [`std::io::Error`] values carrying the same errno a real backend would
/// produce, so code under test cannot tell virtual failures apart from real
/// ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A virtual session is already installed. Call [`restore`](crate::restore)
    /// before activating a new one.
    #[error("a virtual filesystem session is already active")]
    AlreadyActive,

    /// No virtual session is installed.
    #[error("no virtual filesystem session is active")]
    NotActive,

    /// The tree description could not be materialized. Nothing was installed.
    #[error("invalid tree description: {0}")]
    Description(String),
}

/// A specialized [`Result`] type for session lifecycle operations.
///
/// [`Result`]: std::result::Result
pub type Result<T = ()> = std::result::Result<T, Error>;

// Errno-shaped I/O errors. Using the raw OS error keeps the kind, errno and
// message identical to what the real backend produces for the same failure.

pub(crate) fn enoent() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOENT)
}

pub(crate) fn eexist() -> io::Error {
    io::Error::from_raw_os_error(libc::EEXIST)
}

pub(crate) fn enotdir() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOTDIR)
}

pub(crate) fn eisdir() -> io::Error {
    io::Error::from_raw_os_error(libc::EISDIR)
}

pub(crate) fn enotempty() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOTEMPTY)
}

pub(crate) fn eacces() -> io::Error {
    io::Error::from_raw_os_error(libc::EACCES)
}

pub(crate) fn ebadf() -> io::Error {
    io::Error::from_raw_os_error(libc::EBADF)
}

pub(crate) fn eloop() -> io::Error {
    io::Error::from_raw_os_error(libc::ELOOP)
}

pub(crate) fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

pub(crate) fn eperm() -> io::Error {
    io::Error::from_raw_os_error(libc::EPERM)
}

pub(crate) fn ebusy() -> io::Error {
    io::Error::from_raw_os_error(libc::EBUSY)
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    #[test]
    fn errno_maps_to_std_kinds() {
        assert_eq!(super::enoent().kind(), ErrorKind::NotFound);
        assert_eq!(super::eexist().kind(), ErrorKind::AlreadyExists);
        assert_eq!(super::eacces().kind(), ErrorKind::PermissionDenied);
        assert_eq!(super::enotdir().kind(), ErrorKind::NotADirectory);
        assert_eq!(super::eisdir().kind(), ErrorKind::IsADirectory);
        assert_eq!(super::enotempty().kind(), ErrorKind::DirectoryNotEmpty);
        assert_eq!(super::eloop().kind(), ErrorKind::FilesystemLoop);
    }
}
