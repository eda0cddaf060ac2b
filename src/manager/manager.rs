use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::Backing;
use crate::BackingError;
use crate::Delta;
use crate::Error;
use crate::ManagerConfig;
use crate::Result;
use crate::Store;
use crate::WatchRequest;

use super::Watcher;

/// State shared between the manager front, its watchers, and the loop.
pub(crate) struct ManagerCore {
    pub(crate) request_tx: mpsc::UnboundedSender<WatchRequest>,
    next_watcher_id: AtomicU64,
    terminal: ArcSwapOption<Error>,
}

impl std::fmt::Debug for ManagerCore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ManagerCore")
            .field("next_watcher_id", &self.next_watcher_id)
            .finish()
    }
}

impl ManagerCore {
    pub(crate) fn new(request_tx: mpsc::UnboundedSender<WatchRequest>) -> Self {
        Self {
            request_tx,
            next_watcher_id: AtomicU64::new(1),
            terminal: ArcSwapOption::empty(),
        }
    }

    /// Terminal status of the manager, for watchers that observe it after
    /// the loop has gone away. Reads as a clean stop until the loop has
    /// recorded anything else.
    pub(crate) fn terminal_error(&self) -> Error {
        match self.terminal.load_full() {
            Some(err) => (*err).clone(),
            None => Error::WatcherStopped,
        }
    }
}

/// Front handle to a spawned store manager.
///
/// The manager is a single task owning a [`Store`]: it seeds the store
/// from its [`Backing`], applies every upstream change, and services
/// watcher polls. Mint client cursors with [`watch`](Self::watch); shut
/// the loop down with [`stop`](Self::stop).
#[derive(Debug)]
pub struct StoreManager {
    core: Arc<ManagerCore>,
    shutdown_tx: watch::Sender<()>,
    join: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl StoreManager {
    /// Spawn a manager over `backing`. Must be called from within a tokio
    /// runtime.
    pub fn spawn(
        backing: Arc<dyn Backing>,
        config: ManagerConfig,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let core = Arc::new(ManagerCore::new(request_tx));
        let looper = ManagerLoop::new(backing, config, request_rx, shutdown_rx, Arc::clone(&core));
        let join = tokio::spawn(looper.run());
        Self {
            core,
            shutdown_tx,
            join: Mutex::new(Some(join)),
        }
    }

    /// Mint a new watcher positioned before all current state: its first
    /// `next()` returns the full current contents of the store.
    pub fn watch(&self) -> Watcher {
        let id = self.core.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        Watcher::new(id, Arc::clone(&self.core))
    }

    /// Stop the manager and report its terminal status.
    ///
    /// Every watcher still attached observes [`Error::WatcherStopped`].
    /// Returns `Ok(())` on a clean stop, or the backing error if the loop
    /// had already failed. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        let join = self.join.lock().await.take();
        if let Some(join) = join {
            return match join.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Ok(()),
            };
        }
        match self.core.terminal_error() {
            Error::WatcherStopped => Ok(()),
            err => Err(err),
        }
    }
}

/// Manager-side view of one watcher.
#[derive(Debug, Default)]
pub(crate) struct WatcherCursor {
    /// Highest store revno already delivered to this watcher.
    pub(crate) revno: i64,
    /// Set once the watcher has stopped; later requests are refused.
    pub(crate) stopped: bool,
    /// Outstanding polls, newest first.
    pub(crate) pending: VecDeque<oneshot::Sender<Result<Vec<Delta>>>>,
}

/// The event loop. Sole owner and sole mutator of the store.
pub(crate) struct ManagerLoop {
    pub(crate) store: Store,
    backing: Arc<dyn Backing>,
    config: ManagerConfig,
    request_rx: mpsc::UnboundedReceiver<WatchRequest>,
    shutdown: watch::Receiver<()>,
    core: Arc<ManagerCore>,
    pub(crate) cursors: HashMap<u64, WatcherCursor>,
}

impl ManagerLoop {
    pub(crate) fn new(
        backing: Arc<dyn Backing>,
        config: ManagerConfig,
        request_rx: mpsc::UnboundedReceiver<WatchRequest>,
        shutdown: watch::Receiver<()>,
        core: Arc<ManagerCore>,
    ) -> Self {
        Self {
            store: Store::new(),
            backing,
            config,
            request_rx,
            shutdown,
            core,
            cursors: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        info!("store manager started");
        let outcome = self.serve().await;
        self.backing.unwatch().await;
        let terminal = match outcome {
            Ok(()) => Error::WatcherStopped,
            Err(e) => {
                error!(%e, "store manager failed");
                Error::Backing(Arc::new(e))
            }
        };
        self.shut_down(terminal.clone());
        info!("store manager stopped");
        match terminal {
            Error::WatcherStopped => Ok(()),
            err => Err(err),
        }
    }

    async fn serve(&mut self) -> std::result::Result<(), BackingError> {
        let (change_tx, mut change_rx) = mpsc::channel(self.config.change_queue_size);
        self.backing.watch(change_tx).await?;
        // Changes that race the seed are harmless: every change is
        // resolved by a fresh fetch, and update and remove are both
        // idempotent against the store.
        self.backing.get_all(&mut self.store).await?;
        debug!(
            entities = self.store.len(),
            revno = self.store.latest_revno(),
            "store seeded"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    debug!("shutdown signal received");
                    return Ok(());
                }

                change = change_rx.recv() => {
                    let change = change.ok_or(BackingError::ChangeStreamClosed)?;
                    trace!(kind = %change.kind, id = %change.id, hint = change.hint, "upstream change");
                    self.backing.changed(&mut self.store, change).await?;
                    self.respond();
                }

                Some(req) = self.request_rx.recv() => {
                    self.handle(req);
                    self.respond();
                }
            }
        }
    }

    /// Process one watcher request.
    pub(crate) fn handle(
        &mut self,
        req: WatchRequest,
    ) {
        match req {
            WatchRequest::Next { watcher_id, reply } => {
                let cursor = self.cursors.entry(watcher_id).or_default();
                if cursor.stopped {
                    let _ = reply.send(Err(Error::WatcherStopped));
                    return;
                }
                cursor.pending.push_front(reply);
            }
            WatchRequest::Stop { watcher_id, done } => {
                self.stop_watcher(watcher_id);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }
    }

    fn stop_watcher(
        &mut self,
        watcher_id: u64,
    ) {
        let cursor = self.cursors.entry(watcher_id).or_default();
        if cursor.stopped {
            return;
        }
        cursor.stopped = true;
        let revno = cursor.revno;
        let pending = std::mem::take(&mut cursor.pending);
        for reply in pending {
            let _ = reply.send(Err(Error::WatcherStopped));
        }
        debug!(watcher_id, revno, "watcher stopped");
        self.leave(revno);
    }

    /// Reply to every watcher whose newest parked poll can now be
    /// satisfied. Called after every store mutation and request.
    pub(crate) fn respond(&mut self) {
        let latest = self.store.latest_revno();
        let ready: Vec<u64> = self
            .cursors
            .iter()
            .filter(|(_, c)| !c.stopped && !c.pending.is_empty() && c.revno < latest)
            .map(|(&id, _)| id)
            .collect();
        for watcher_id in ready {
            let revno = self.cursors[&watcher_id].revno;
            let changes = self.store.changes_since(revno);
            if changes.is_empty() {
                continue;
            }
            self.seen(revno);
            if self.config.log_deltas {
                for d in &changes {
                    trace!(watcher_id, entity = %d.entity_id(), removed = d.removed, "delta");
                }
            }
            let cursor = self.cursors.get_mut(&watcher_id).expect("ready cursor disappeared");
            cursor.revno = latest;
            let reply = cursor.pending.pop_front().expect("ready cursor lost its request");
            let _ = reply.send(Ok(changes));
        }
    }

    /// Account for a watcher having just been told about every entry newer
    /// than `revno`: entries it now observes for the first time gain a
    /// reference; tombstones of entries it had observed lose one.
    fn seen(
        &mut self,
        revno: i64,
    ) {
        for at in self.store.revnos_since(revno) {
            let Some(entry) = self.store.entry_at(at) else {
                continue;
            };
            let creation_revno = entry.creation_revno;
            let removed = entry.removed;
            if creation_revno > revno {
                if !removed {
                    self.store.inc_ref(at);
                }
            } else if removed {
                self.store.dec_ref(at);
            }
        }
    }

    /// Release the references held on behalf of a watcher whose last
    /// delivered position was `watcher_revno`.
    ///
    /// Skips entries the watcher never observed (created after its
    /// position) and tombstones whose removal it had already consumed.
    fn leave(
        &mut self,
        watcher_revno: i64,
    ) {
        for at in self.store.all_revnos() {
            let Some(entry) = self.store.entry_at(at) else {
                continue;
            };
            let creation_revno = entry.creation_revno;
            let removed = entry.removed;
            let revno = entry.revno;
            if creation_revno <= watcher_revno && (!removed || revno > watcher_revno) {
                self.store.dec_ref(at);
            }
        }
    }

    /// Record the terminal status and reply to every request that raced
    /// the shutdown, parked or still queued.
    fn shut_down(
        &mut self,
        terminal: Error,
    ) {
        self.core.terminal.store(Some(Arc::new(terminal.clone())));
        self.request_rx.close();
        while let Ok(req) = self.request_rx.try_recv() {
            match req {
                WatchRequest::Next { reply, .. } => {
                    let _ = reply.send(Err(terminal.clone()));
                }
                WatchRequest::Stop { done, .. } => {
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
            }
        }
        for cursor in self.cursors.values_mut() {
            for reply in std::mem::take(&mut cursor.pending) {
                let _ = reply.send(Err(terminal.clone()));
            }
        }
    }
}
