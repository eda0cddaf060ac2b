use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::BackingError;
use crate::Entity;
use crate::EntityId;
use crate::Store;

/// A change notification from the upstream source.
///
/// `hint` carries the upstream revision that triggered the notification.
/// It is advisory only: the manager always re-fetches the entity, so a
/// stale or zero hint is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: String,
    pub id: String,
    pub hint: i64,
}

impl Change {
    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.kind.as_str(), self.id.as_str())
    }
}

/// Upstream collaborator the manager pulls state and notifications from.
///
/// Any failure from these operations is terminal for the manager that
/// owns the store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Backing: Send + Sync + 'static {
    /// Seed the store with the full current state.
    async fn get_all(
        &self,
        store: &mut Store,
    ) -> Result<(), BackingError>;

    /// Begin delivering change notifications on `tx`.
    async fn watch(
        &self,
        tx: mpsc::Sender<Change>,
    ) -> Result<(), BackingError>;

    /// Stop delivery and release watch resources. Best effort: runs on
    /// the shutdown path where a failure has no observer.
    async fn unwatch(&self);

    /// Fetch the current value of one entity.
    ///
    /// Returns [`BackingError::NotFound`] when the entity no longer
    /// exists upstream; the caller turns that into a removal.
    async fn fetch(
        &self,
        id: &EntityId,
    ) -> Result<Arc<dyn Entity>, BackingError>;

    /// Fetch and apply one change to the store.
    async fn changed(
        &self,
        store: &mut Store,
        change: Change,
    ) -> Result<(), BackingError> {
        match self.fetch(&change.entity_id()).await {
            Ok(info) => {
                store.update(info);
                Ok(())
            }
            Err(BackingError::NotFound(id)) => {
                store.remove(&id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
