//! Mirage is a drop-in in-memory filesystem for deterministic tests. Code
//! under test talks to [`mirage::fs`](crate::fs), [`mirage::aio`](crate::aio)
//! and [`mirage::env`](crate::env) exactly as it would `std::fs`, `tokio::fs`
//! and `std::env`; while a session is active every operation is served from a
//! virtual tree, and the real disk is never touched.
//!
//! # Sessions
//!
//! A session starts with [`activate`], which builds the tree from a
//! declarative description, and ends with [`restore`], which discards it:
//!
//! ```
//! mirage::activate([("/path/to/file", "content")]).unwrap();
//!
//! assert_eq!(mirage::fs::read_to_string("/path/to/file").unwrap(), "content");
//! mirage::fs::write("/path/to/file", "changed").unwrap();
//!
//! mirage::restore();
//! // The real filesystem never saw any of it.
//! ```
//!
//! Descriptions are nested path-to-content mappings. Strings and byte
//! vectors become files; the [`file`], [`dir`], [`symlink`] and [`load`]
//! markers add metadata, nesting, links, and real-disk content:
//!
//! ```
//! use mirage::{dir, file, symlink};
//!
//! let spec = mirage::TreeSpec::new()
//!     .entry("/app/config.toml", "debug = false")
//!     .entry("/app/cache", dir().mode(0o700))
//!     .entry("/app/current", symlink("config.toml"))
//!     .entry("/secret", file().contents("k3y").mode(0o000).uid(0).gid(0));
//!
//! // Permission bits are enforced against the session uid.
//! mirage::Builder::new().uid(1000).gid(1000).activate(spec).unwrap();
//! assert!(mirage::fs::read("/secret").is_err());
//! mirage::restore();
//! ```
//!
//! When no session is active the same entry points delegate to the real
//! filesystem, so the shim types can be compiled into code unconditionally.
//!
//! # Bypass
//!
//! [`bypass`] temporarily re-selects the real backend for the duration of a
//! callback, then reinstates virtual mode — also on panic:
//!
//! ```
//! mirage::activate([("/a/b", "hi")]).unwrap();
//!
//! // The file exists virtually, but not really.
//! assert!(mirage::fs::exists("/a/b"));
//! assert!(!mirage::bypass(|| mirage::fs::exists("/a/b")));
//!
//! // Virtual mode is back.
//! assert!(mirage::fs::exists("/a/b"));
//! mirage::restore();
//! ```
//!
//! Callbacks may return a deferred operation from [`aio`](crate::aio); the
//! operation is evaluated against the real backend inside the window, while
//! the settlement is observed later, under virtual mode. See the module docs
//! of [`aio`](crate::aio).
//!
//! # Working directory
//!
//! The virtual working directory starts at the activation-time real cwd and
//! is mutated with [`env::set_current_dir`](crate::env::set_current_dir)
//! without ever touching the real process cwd.
//!
//! # Tracing
//!
//! The `tracing` crate is used to emit session lifecycle events and tree
//! mutations. To see them, install a
//! [`tracing-subscriber`](https://docs.rs/tracing-subscriber) in your test
//! and set `RUST_LOG=mirage=debug` (or `trace` for per-operation events).

mod backend;

mod builder;
pub use builder::Builder;

mod config;

mod error;
pub use error::{Error, Result};

mod fd;

mod model;
pub use model::{dir, file, load, symlink, DirSpec, Entry, FileSpec, SymlinkSpec, TreeSpec};

mod node;
mod resolve;

mod session;
use session::Controller;

mod tree;

pub mod aio;
pub mod env;
pub mod fs;

pub(crate) const TRACING_TARGET: &str = "mirage";

/// Build a virtual tree from `description` and install it as the process's
/// filesystem, with default configuration.
///
/// Equivalent to `Builder::new().activate(description)`; see [`Builder`] for
/// the available options. Fails with [`Error::AlreadyActive`] while another
/// session is installed — nothing is replaced implicitly.
///
/// ```
/// mirage::activate([("/greeting", "hello")]).unwrap();
/// assert_eq!(mirage::fs::read("/greeting").unwrap(), b"hello");
/// mirage::restore();
/// ```
pub fn activate(description: impl Into<TreeSpec>) -> Result {
    Builder::new().activate(description)
}

/// Tear down the active session and reinstate the real filesystem.
///
/// Unconditional: the tree, every open descriptor, and the virtual working
/// directory are discarded, even mid-bypass or with deferred operations
/// pending. Idempotent — calling it without an active session is a no-op.
pub fn restore() {
    Controller::teardown();
}

/// Run `f` with the real filesystem visible, then reinstate virtual mode.
///
/// The switch is scoped to the callback's synchronous execution: errors and
/// panics propagate unchanged, and nested calls are no-op wrappers. When `f`
/// returns a deferred operation from [`aio`](crate::aio), the operation has
/// already run against the real backend by the time `bypass` returns; the
/// caller awaits its settlement under virtual mode.
///
/// ```
/// mirage::activate(mirage::TreeSpec::new()).unwrap();
///
/// // Cargo.toml exists on the real disk, not in the virtual tree.
/// assert!(!mirage::fs::exists("Cargo.toml"));
/// assert!(mirage::bypass(|| mirage::fs::exists("Cargo.toml")));
/// mirage::restore();
/// ```
///
/// # Panics
///
/// Panics when called without an active session.
pub fn bypass<R>(f: impl FnOnce() -> R) -> R {
    let _guard = Controller::begin_bypass();
    f()
}

/// Fallible variant of [`bypass`] for callers that cannot guarantee an
/// active session: fails with [`Error::NotActive`] instead of panicking.
pub fn try_bypass<R>(f: impl FnOnce() -> R) -> Result<R> {
    let _guard = Controller::try_begin_bypass()?;
    Ok(f())
}

/// Whether a virtual session is currently installed (bypassed or not).
pub fn is_active() -> bool {
    Controller::is_active()
}
