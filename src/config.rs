#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Create the activation-time working directory inside the tree.
    pub(crate) create_cwd: bool,
    /// Create the platform temp directory inside the tree.
    pub(crate) create_tmp: bool,
    /// Effective uid for permission checks; defaults to the process euid.
    pub(crate) uid: Option<u32>,
    /// Effective gid for permission checks; defaults to the process egid.
    pub(crate) gid: Option<u32>,
    /// Symlink-chain budget before resolution fails with the ELOOP shape.
    pub(crate) max_symlinks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            create_cwd: true,
            create_tmp: true,
            uid: None,
            gid: None,
            max_symlinks: 32,
        }
    }
}
