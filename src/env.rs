//! Working-directory accessors mirroring `std::env`.
//!
//! While a session is active these read and mutate the virtual working
//! directory, a value independent of the real process cwd; the real cwd is
//! left untouched by [`set_current_dir`] and becomes visible again inside
//! [`bypass`](crate::bypass) and after [`restore`](crate::restore).

use crate::session::Controller;
use std::io;
use std::path::{Path, PathBuf};

/// Returns the current working directory as seen through the selected
/// backend.
pub fn current_dir() -> io::Result<PathBuf> {
    Controller::with_backend(|b| b.current_dir())
}

/// Changes the current working directory of the selected backend.
///
/// Virtually, the path must resolve to a directory with traverse permission;
/// subsequent relative path resolution starts there.
pub fn set_current_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref().to_path_buf();
    Controller::with_backend(|b| b.set_current_dir(&path))
}
