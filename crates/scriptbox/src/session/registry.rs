//! Per-execution-context session registry.
//!
//! One registry lives inside each [`crate::engine::ExecContext`], so
//! concurrently running test files never share session state. The registry
//! owns the session; command adapters only ever hold the opaque handle.
//!
//! At most one session is active at a time. Spawning while a session is
//! live closes the prior session's process first, so no child is orphaned
//! by a replacement.

use super::{Session, SessionHandle};

/// Owner of the (single) active interactive session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Option<Session>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly spawned session, closing any prior one.
    pub fn insert(&mut self, session: Session) -> SessionHandle {
        if let Some(mut prior) = self.active.take() {
            tracing::debug!(handle = %prior.handle(), "replacing active session");
            if let Err(err) = prior.close() {
                tracing::warn!(error = %err, "failed to close replaced session");
            }
        }
        let handle = session.handle();
        self.active = Some(session);
        handle
    }

    /// Handle of the live session, if any.
    pub fn active_handle(&self) -> Option<SessionHandle> {
        self.active
            .as_ref()
            .filter(|session| session.is_running())
            .map(Session::handle)
    }

    /// Mutable access to the session behind `handle`, if it is still live.
    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut Session> {
        self.active
            .as_mut()
            .filter(|session| session.handle() == handle && session.is_running())
    }

    /// Close the session behind `handle`.
    ///
    /// Idempotent: a stale or unknown handle is a no-op, since cleanup
    /// paths close unconditionally.
    pub fn close(&mut self, handle: SessionHandle) -> crate::error::Result<()> {
        match self.active.as_mut() {
            Some(session) if session.handle() == handle => {
                session.close()?;
                self.active = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Close whatever is active. Used by unconditional teardown.
    pub fn close_all(&mut self) {
        if let Some(mut session) = self.active.take() {
            if let Err(err) = session.close() {
                tracing::warn!(error = %err, "failed to close session during teardown");
            }
        }
    }
}
