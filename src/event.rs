//! Requests submitted by watcher handles to the manager loop.

use tokio::sync::oneshot;

use crate::Delta;
use crate::Result;

#[derive(Debug)]
pub(crate) enum WatchRequest {
    /// A `Watcher::next` poll. Per watcher, the newest outstanding poll is
    /// the one served by the next respond round; older ones stay parked.
    Next {
        watcher_id: u64,
        reply: oneshot::Sender<Result<Vec<Delta>>>,
    },

    /// A watcher stop. `done` is `None` when the stop was posted from a
    /// drop and nobody awaits the acknowledgement.
    Stop {
        watcher_id: u64,
        done: Option<oneshot::Sender<()>>,
    },
}
