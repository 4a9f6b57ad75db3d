use crate::backend::VirtualBackend;
use crate::config::Config;
use crate::error::Result;
use crate::model::TreeSpec;
use crate::session::Controller;
use std::path::PathBuf;

/// A builder that can be used to configure a virtual filesystem session.
///
/// ## Examples
///
/// Activate with default configuration:
///
/// ```
/// mirage::Builder::new().activate(mirage::TreeSpec::new()).unwrap();
/// mirage::restore();
/// ```
///
/// Vary the session parameters with the respective builder methods:
///
/// ```
/// let mut builder = mirage::Builder::new();
/// builder.create_tmp(false).max_symlinks(8);
///
/// builder.activate([("/data/config.toml", "answer = 42")]).unwrap();
/// # mirage::restore();
/// ```
///
/// A builder with a set of options can activate repeatedly (one session at a
/// time), giving each test the same environment.
pub struct Builder {
    config: Config,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            config: Config::default(),
        }
    }

    /// Whether the activation-time working directory exists in the tree.
    ///
    /// Defaults to true so that relative paths resolve out of the box.
    pub fn create_cwd(&mut self, value: bool) -> &mut Self {
        self.config.create_cwd = value;
        self
    }

    /// Whether the platform temp directory exists in the tree.
    ///
    /// Defaults to true; code that writes scratch files keeps working.
    pub fn create_tmp(&mut self, value: bool) -> &mut Self {
        self.config.create_tmp = value;
        self
    }

    /// Effective uid used for permission checks and new-node ownership.
    ///
    /// Defaults to the real process euid. Setting 0 disables enforcement.
    pub fn uid(&mut self, value: u32) -> &mut Self {
        self.config.uid = Some(value);
        self
    }

    /// Effective gid used for permission checks and new-node ownership.
    pub fn gid(&mut self, value: u32) -> &mut Self {
        self.config.gid = Some(value);
        self
    }

    /// Symlink-chain budget before resolution reports a loop.
    ///
    /// Defaults to 32.
    pub fn max_symlinks(&mut self, value: usize) -> &mut Self {
        self.config.max_symlinks = value;
        self
    }

    /// Build a tree from `spec` and install it as the active backend.
    ///
    /// The whole tree is materialized before anything is installed, so a
    /// description error leaves the real backend untouched. Fails with
    /// [`Error::AlreadyActive`](crate::Error::AlreadyActive) while another
    /// session is installed.
    pub fn activate(&self, spec: impl Into<TreeSpec>) -> Result {
        if Controller::is_active() {
            return Err(crate::Error::AlreadyActive);
        }

        let uid = self.config.uid.unwrap_or_else(|| unsafe { libc::geteuid() });
        let gid = self.config.gid.unwrap_or_else(|| unsafe { libc::getegid() });

        // The real backend is still selected here: load() markers and the
        // activation cwd read real state.
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut extra_dirs = Vec::new();
        if self.config.create_cwd {
            extra_dirs.push(cwd.clone());
        }
        if self.config.create_tmp {
            extra_dirs.push(std::env::temp_dir());
        }

        let tree = spec.into().materialize(uid, gid, &cwd, &extra_dirs)?;
        let session = VirtualBackend::new(tree, cwd, uid, gid, self.config.max_symlinks);
        Controller::install(session)
    }
}
