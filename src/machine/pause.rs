//! Scoped pause handles.

use crossbeam_channel::{bounded, Sender};
use tracing::warn;

use super::dispatcher::Request;

/// Keeps the machine paused while alive.
///
/// Returned by [`Machine::auto_pause`](super::Machine::auto_pause). Guards
/// nest: the machine resumes only when the last one is dropped, and only if
/// it was meant to be running. Dropping blocks until the dispatcher has
/// processed the release, so the run state observed right after the drop is
/// already up to date.
#[must_use = "the machine resumes as soon as the guard is dropped"]
pub struct AutoPause {
    requests: Sender<Request>,
}

impl AutoPause {
    pub(super) fn new(requests: Sender<Request>) -> Self {
        Self { requests }
    }
}

impl Drop for AutoPause {
    fn drop(&mut self) {
        let (reply, done) = bounded(1);
        if self.requests.send(Request::Unpause { reply }).is_err() {
            // Dispatcher already gone; nothing left to resume.
            return;
        }
        if let Ok(Err(e)) = done.recv() {
            warn!(error = %e, "failed to release pause");
        }
    }
}
