use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use super::Backing;
use super::Change;
use crate::BackingError;
use crate::Entity;
use crate::EntityId;
use crate::Store;

/// In-process [`Backing`] over a plain entity list.
///
/// Entities seed the store in the order they were first inserted.
/// Mutations through [`update_entity`](Self::update_entity) and
/// [`delete_entity`](Self::delete_entity) publish change notifications to
/// the channel registered via `watch`. [`fail_fetches`](Self::fail_fetches)
/// makes every subsequent fetch fail, which drives the manager's failure
/// path in tests.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entities: Vec<(EntityId, Arc<dyn Entity>)>,
    watch_tx: Option<mpsc::Sender<Change>>,
    fetch_error: Option<String>,
    upstream_revno: i64,
}

impl Inner {
    fn position(
        &self,
        id: &EntityId,
    ) -> Option<usize> {
        self.entities.iter().position(|(eid, _)| eid == id)
    }

    /// Notifications are published without blocking; a full channel means
    /// the manager loop is gone or wedged and the notification is dropped.
    fn notify(
        &mut self,
        id: &EntityId,
    ) {
        self.upstream_revno += 1;
        if let Some(tx) = &self.watch_tx {
            let change = Change {
                kind: id.kind.clone(),
                id: id.id.clone(),
                hint: self.upstream_revno,
            };
            if tx.try_send(change).is_err() {
                warn!(entity = %id, "dropping change notification (channel closed or full)");
            }
        }
    }
}

impl MemoryBacking {
    pub fn new(initial: impl IntoIterator<Item = Arc<dyn Entity>>) -> Self {
        let entities = initial.into_iter().map(|info| (info.entity_id(), info)).collect();
        Self {
            inner: Mutex::new(Inner {
                entities,
                ..Inner::default()
            }),
        }
    }

    /// Insert or replace an entity and notify the watch channel.
    pub fn update_entity(
        &self,
        info: Arc<dyn Entity>,
    ) {
        let mut inner = self.inner.lock();
        let id = info.entity_id();
        match inner.position(&id) {
            Some(i) => inner.entities[i].1 = info,
            None => inner.entities.push((id.clone(), info)),
        }
        inner.notify(&id);
    }

    /// Delete an entity and notify the watch channel.
    pub fn delete_entity(
        &self,
        id: &EntityId,
    ) {
        let mut inner = self.inner.lock();
        if let Some(i) = inner.position(id) {
            inner.entities.remove(i);
        }
        inner.notify(id);
    }

    /// Make every subsequent fetch (and seed) fail with `msg`.
    pub fn fail_fetches(
        &self,
        msg: impl Into<String>,
    ) {
        self.inner.lock().fetch_error = Some(msg.into());
    }

    /// Number of entities currently held upstream.
    pub fn len(&self) -> usize {
        self.inner.lock().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Backing for MemoryBacking {
    async fn get_all(
        &self,
        store: &mut Store,
    ) -> Result<(), BackingError> {
        let inner = self.inner.lock();
        if let Some(msg) = &inner.fetch_error {
            return Err(BackingError::Fetch(msg.clone()));
        }
        for (_, info) in &inner.entities {
            store.update(Arc::clone(info));
        }
        Ok(())
    }

    async fn watch(
        &self,
        tx: mpsc::Sender<Change>,
    ) -> Result<(), BackingError> {
        let mut inner = self.inner.lock();
        if inner.watch_tx.is_some() {
            return Err(BackingError::AlreadyWatched);
        }
        inner.watch_tx = Some(tx);
        Ok(())
    }

    async fn unwatch(&self) {
        self.inner.lock().watch_tx = None;
    }

    async fn fetch(
        &self,
        id: &EntityId,
    ) -> Result<Arc<dyn Entity>, BackingError> {
        let inner = self.inner.lock();
        if let Some(msg) = &inner.fetch_error {
            return Err(BackingError::Fetch(msg.clone()));
        }
        match inner.position(id) {
            Some(i) => Ok(Arc::clone(&inner.entities[i].1)),
            None => Err(BackingError::NotFound(id.clone())),
        }
    }
}
