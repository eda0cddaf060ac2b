//! Entity identity and the delta wire shape.
//!
//! Entity values are supplied by collaborators and are opaque to this
//! crate: the store and manager only ever ask a value for its identity.

use std::fmt;
use std::sync::Arc;

/// Unique identity of an observable entity.
///
/// `kind` is a short tag such as `"machine"` or `"service"`; `id` is
/// unique within that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub kind: String,
    pub id: String,
}

impl EntityId {
    pub fn new(
        kind: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// An externally defined entity value.
///
/// The one capability the store needs is a stable identity; everything
/// else about the value is opaque and carried by reference.
pub trait Entity: fmt::Debug + Send + Sync {
    /// Stable identity of this entity.
    fn entity_id(&self) -> EntityId;
}

/// One step in the change stream.
///
/// When `removed` is true the value still identifies the entity (via its
/// [`EntityId`]) so consumers can drop it from their local view. Revision
/// numbers are not exported; ordering within and across batches is the
/// order the store recorded the changes.
#[derive(Debug, Clone)]
pub struct Delta {
    pub entity: Arc<dyn Entity>,
    pub removed: bool,
}

impl Delta {
    /// Identity of the entity this delta describes.
    pub fn entity_id(&self) -> EntityId {
        self.entity.entity_id()
    }
}
