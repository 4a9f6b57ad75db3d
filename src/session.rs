//! The process-wide backend switch.
//!
//! Exactly one controller exists per thread of execution, holding the current
//! session (if any) and the bypass depth. All shim entry points route through
//! [`Controller::with_backend`], which picks the virtual backend while a
//! session is installed and not bypassed, and the real backend otherwise.
//!
//! State machine: `Inactive` (no session) → `Active` (session installed) →
//! `Bypassing` (session retained, real backend selected) → `Active` when the
//! bypass guard drops → `Inactive` on teardown. Teardown is unconditional and
//! idempotent.

use crate::backend::{Backend, RealBackend, VirtualBackend};
use crate::error::{ebadf, Error};
use std::cell::RefCell;
use std::io;

pub(crate) struct Controller {
    session: Option<VirtualBackend>,
    bypass_depth: usize,
}

thread_local! {
    static CONTROLLER: RefCell<Controller> = const {
        RefCell::new(Controller {
            session: None,
            bypass_depth: 0,
        })
    };
}

impl Controller {
    /// Run `f` against whichever backend is currently selected.
    pub(crate) fn with_backend<R>(f: impl FnOnce(&mut dyn Backend) -> R) -> R {
        CONTROLLER.with(|cell| {
            let mut ctrl = cell.borrow_mut();
            if ctrl.bypass_depth == 0 {
                if let Some(session) = ctrl.session.as_mut() {
                    return f(session);
                }
            }
            f(&mut RealBackend)
        })
    }

    /// Access the session for descriptor-bound operations. Descriptors stay
    /// bound to the backend that opened them, so this ignores the bypass
    /// switch; without a session the descriptor is gone and the EBADF shape
    /// is the answer.
    pub(crate) fn with_session<R>(
        f: impl FnOnce(&mut VirtualBackend) -> io::Result<R>,
    ) -> io::Result<R> {
        CONTROLLER.with(|cell| {
            let mut ctrl = cell.borrow_mut();
            match ctrl.session.as_mut() {
                Some(session) => f(session),
                None => Err(ebadf()),
            }
        })
    }

    /// Run `f` only if a session exists. Drop paths use this.
    pub(crate) fn with_session_if_set(f: impl FnOnce(&mut VirtualBackend)) {
        CONTROLLER.with(|cell| {
            if let Ok(mut ctrl) = cell.try_borrow_mut() {
                if let Some(session) = ctrl.session.as_mut() {
                    f(session);
                }
            }
        });
    }

    /// Install a fully built session. The tree was materialized before this
    /// point, so a failure here retains nothing.
    pub(crate) fn install(session: VirtualBackend) -> Result<(), Error> {
        CONTROLLER.with(|cell| {
            let mut ctrl = cell.borrow_mut();
            if ctrl.session.is_some() {
                return Err(Error::AlreadyActive);
            }
            ctrl.session = Some(session);
            ctrl.bypass_depth = 0;
            tracing::info!(target: crate::TRACING_TARGET, "virtual filesystem activated");
            Ok(())
        })
    }

    /// Discard the session, its tree, and every open descriptor. Idempotent;
    /// valid from any state, including mid-bypass.
    pub(crate) fn teardown() {
        CONTROLLER.with(|cell| {
            let mut ctrl = cell.borrow_mut();
            if ctrl.session.take().is_some() {
                tracing::info!(target: crate::TRACING_TARGET, "virtual filesystem restored");
            }
            ctrl.bypass_depth = 0;
        });
    }

    pub(crate) fn is_active() -> bool {
        CONTROLLER.with(|cell| cell.borrow().session.is_some())
    }

    /// Select the real backend until the returned guard drops. Nests; only
    /// the outermost level actually flips anything observable. Bypassing the
    /// real filesystem for itself is a usage error.
    pub(crate) fn try_begin_bypass() -> Result<BypassGuard, Error> {
        CONTROLLER.with(|cell| {
            let mut ctrl = cell.borrow_mut();
            if ctrl.session.is_none() {
                return Err(Error::NotActive);
            }
            ctrl.bypass_depth += 1;
            tracing::debug!(
                target: crate::TRACING_TARGET,
                depth = ctrl.bypass_depth,
                "bypass enter"
            );
            Ok(BypassGuard { _private: () })
        })
    }

    /// Like [`Controller::try_begin_bypass`], panicking on misuse.
    pub(crate) fn begin_bypass() -> BypassGuard {
        Self::try_begin_bypass().expect("bypass requires an active virtual filesystem session")
    }
}

/// Re-selects the virtual backend when dropped, including during unwinding,
/// so a panicking bypass callback still leaves virtual mode active.
#[must_use = "virtual mode is re-selected when the guard drops"]
pub(crate) struct BypassGuard {
    _private: (),
}

impl Drop for BypassGuard {
    fn drop(&mut self) {
        CONTROLLER.with(|cell| {
            if let Ok(mut ctrl) = cell.try_borrow_mut() {
                ctrl.bypass_depth = ctrl.bypass_depth.saturating_sub(1);
                tracing::debug!(
                    target: crate::TRACING_TARGET,
                    depth = ctrl.bypass_depth,
                    "bypass exit"
                );
            }
        });
    }
}
