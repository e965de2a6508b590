//! The user-agent seam for interactive redirects.
//!
//! The flows in this crate never open a browser themselves. They hand a
//! [`RedirectRequest`] plus a single-shot [`ResponseHandle`] to whatever
//! [`UserAgent`] the application injected, then suspend until the handle is
//! resolved. `ResponseHandle::resolve` consumes the handle, so exactly one
//! terminal outcome can ever be delivered per redirect; a second callback
//! from a confused platform layer has nowhere to go.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use url::Url;

/// What a redirect is for, so agents can label windows or pick capture
/// rules per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Authorization-code login redirect.
    Login,
    /// RP-initiated logout redirect.
    Logout,
}

/// A redirect the user agent must present.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    /// Which flow this redirect belongs to.
    pub kind: RedirectKind,
    /// Provider URL to open.
    pub url: Url,
    /// Redirect target whose query string carries the terminal response.
    pub callback: Url,
}

/// Terminal outcome of one presented redirect.
#[derive(Debug)]
pub enum RedirectOutcome {
    /// The agent observed the redirect back to the callback URI; the query
    /// parameters it carried are attached.
    Completed(HashMap<String, String>),
    /// The user dismissed the interactive session without completing it.
    Cancelled,
    /// The agent could not run the redirect at all.
    Failed(String),
}

/// Single-shot resolution handle for a presented redirect.
///
/// Dropping the handle unresolved tells the waiting flow the agent gave up.
#[derive(Debug)]
pub struct ResponseHandle {
    tx: oneshot::Sender<RedirectOutcome>,
}

impl ResponseHandle {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<RedirectOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the redirect's one terminal outcome.
    ///
    /// If the flow that presented the redirect has since been dropped, the
    /// outcome is discarded with a warning.
    pub fn resolve(self, outcome: RedirectOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::warn!("redirect outcome arrived after the flow stopped waiting");
        }
    }
}

/// Presents provider redirects to the user.
///
/// Implementations open `request.url` however fits the platform (system
/// browser, embedded web view, a scripted test double) and later resolve
/// the handle exactly once with what came back to `request.callback`.
/// `present` must not block; resolution happens whenever the interactive
/// session finishes.
pub trait UserAgent: Send + Sync {
    /// Start presenting `request`; report the terminal outcome through
    /// `handle`.
    fn present(&self, request: RedirectRequest, handle: ResponseHandle);
}

/// At-most-one-pending guard for a flow's interactive redirects.
///
/// Claiming an occupied slot fails instead of replacing the outstanding
/// redirect. The claim is released when the [`SlotGuard`] drops, which also
/// covers the waiting task being cancelled mid-flow.
#[derive(Debug, Default)]
pub(crate) struct RedirectSlot {
    pending: Mutex<bool>,
}

/// Marker for a claim attempt while a redirect is already outstanding.
#[derive(Debug)]
pub(crate) struct AlreadyPending;

impl RedirectSlot {
    pub(crate) fn claim(&self) -> Result<SlotGuard<'_>, AlreadyPending> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if *pending {
            return Err(AlreadyPending);
        }
        *pending = true;
        Ok(SlotGuard { slot: self })
    }
}

pub(crate) struct SlotGuard<'a> {
    slot: &'a RedirectSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self
            .slot
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending = false;
    }
}
