use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::trace;

use super::ManagerCore;
use crate::Delta;
use crate::Error;
use crate::Result;
use crate::WatchRequest;

/// Client cursor over a manager's delta stream.
///
/// Each call to [`next`](Self::next) blocks until at least one change has
/// happened since the previous call, then returns the whole batch in the
/// order the store recorded it. The first call returns the full current
/// state. Cursors advance atomically with the reply: a cancelled or
/// crashed poll never loses its position.
///
/// `next` and `stop` may be called from different tasks; `stop` wins a
/// race with an outstanding `next`, which then observes
/// [`Error::WatcherStopped`].
#[derive(Debug)]
pub struct Watcher {
    id: u64,
    core: Arc<ManagerCore>,
    stopped: AtomicBool,
}

impl Watcher {
    pub(crate) fn new(
        id: u64,
        core: Arc<ManagerCore>,
    ) -> Self {
        Self {
            id,
            core,
            stopped: AtomicBool::new(false),
        }
    }

    /// Identifier of this watcher within its manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the next non-empty batch of deltas.
    ///
    /// Fails with [`Error::WatcherStopped`] once this watcher or its
    /// manager has been stopped, and with the manager's terminal error
    /// if the backing failed.
    pub async fn next(&self) -> Result<Vec<Delta>> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::WatcherStopped);
        }
        let (reply, rx) = oneshot::channel();
        let req = WatchRequest::Next {
            watcher_id: self.id,
            reply,
        };
        if self.core.request_tx.send(req).is_err() {
            return Err(self.core.terminal_error());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(self.core.terminal_error()),
        }
    }

    /// Stop this watcher and release the references held on its behalf.
    ///
    /// Wakes any pending [`next`](Self::next) with
    /// [`Error::WatcherStopped`]; returns once the manager has processed
    /// the stop. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let (done, rx) = oneshot::channel();
        let req = WatchRequest::Stop {
            watcher_id: self.id,
            done: Some(done),
        };
        if self.core.request_tx.send(req).is_err() {
            // Manager already gone; its shutdown released every reference.
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::Acquire) {
            trace!(watcher_id = self.id, "watcher dropped without stop");
            let req = WatchRequest::Stop {
                watcher_id: self.id,
                done: None,
            };
            let _ = self.core.request_tx.send(req);
        }
    }
}
