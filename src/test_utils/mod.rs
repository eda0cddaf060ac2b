//! Shared fixtures and assertions for store and manager tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Delta;
use crate::Entity;
use crate::EntityId;
use crate::Store;

/// Machine fixture entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub id: String,
    pub instance_id: String,
}

impl MachineInfo {
    pub fn new(id: &str) -> Arc<dyn Entity> {
        Arc::new(Self {
            id: id.to_string(),
            instance_id: String::new(),
        })
    }

    pub fn with_instance(
        id: &str,
        instance_id: &str,
    ) -> Arc<dyn Entity> {
        Arc::new(Self {
            id: id.to_string(),
            instance_id: instance_id.to_string(),
        })
    }
}

impl Entity for MachineInfo {
    fn entity_id(&self) -> EntityId {
        EntityId::new("machine", self.id.as_str())
    }
}

/// Service fixture entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub exposed: bool,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Arc<dyn Entity> {
        Arc::new(Self {
            name: name.to_string(),
            exposed: false,
        })
    }

    pub fn exposed(name: &str) -> Arc<dyn Entity> {
        Arc::new(Self {
            name: name.to_string(),
            exposed: true,
        })
    }
}

impl Entity for ServiceInfo {
    fn entity_id(&self) -> EntityId {
        EntityId::new("service", self.name.as_str())
    }
}

pub fn machine_id(id: &str) -> EntityId {
    EntityId::new("machine", id)
}

pub fn service_id(name: &str) -> EntityId {
    EntityId::new("service", name)
}

/// Expected shape of one store entry, in sequence order.
pub struct ExpectedEntry {
    pub creation_revno: i64,
    pub revno: i64,
    pub removed: bool,
    pub ref_count: usize,
    pub info: Arc<dyn Entity>,
}

impl ExpectedEntry {
    /// A live, unreferenced entry.
    pub fn live(
        creation_revno: i64,
        revno: i64,
        info: Arc<dyn Entity>,
    ) -> Self {
        Self {
            creation_revno,
            revno,
            removed: false,
            ref_count: 0,
            info,
        }
    }
}

/// Entity values are opaque, so fixtures are compared by their debug
/// rendering.
pub fn entity_repr(info: &Arc<dyn Entity>) -> String {
    format!("{info:?}")
}

/// Assert the full state of a store: latest revno, entry order and
/// contents, and index consistency.
pub fn assert_store_contents(
    store: &Store,
    latest_revno: i64,
    expect: &[ExpectedEntry],
) {
    assert_eq!(store.latest_revno(), latest_revno, "latest revno");
    let positions = store.all_revnos();
    assert_eq!(positions.len(), expect.len(), "entry count");
    for (at, want) in positions.iter().zip(expect) {
        let entry = store.entry_at(*at).unwrap();
        assert_eq!(entry.creation_revno, want.creation_revno, "creation revno");
        assert_eq!(entry.revno, want.revno, "entry revno");
        assert_eq!(entry.removed, want.removed, "removed flag");
        assert_eq!(entry.ref_count, want.ref_count, "ref count");
        assert_eq!(entity_repr(&entry.info), entity_repr(&want.info), "entity value");
        assert_eq!(
            store.revno_of(&want.info.entity_id()),
            Some(entry.revno),
            "index position"
        );
    }
}

/// Assert the structural invariants that must hold after every mutation.
pub fn assert_store_invariants(store: &Store) {
    let mut last = i64::MIN;
    let mut seen_ids = Vec::new();
    for at in store.all_revnos() {
        let entry = store.entry_at(at).unwrap();
        assert_eq!(entry.revno, at, "entry revno matches its position");
        assert!(entry.revno > last, "entries ordered by revno");
        last = entry.revno;
        assert!(entry.creation_revno <= entry.revno, "creation revno bound");
        assert!(entry.revno <= store.latest_revno(), "latest revno bound");
        assert!(
            !(entry.removed && entry.ref_count == 0),
            "fully consumed tombstone still present"
        );
        let id = entry.info.entity_id();
        assert_eq!(store.revno_of(&id), Some(at), "index covers entry");
        seen_ids.push(id);
    }
    seen_ids.sort_by(|a, b| format!("{a}").cmp(&format!("{b}")));
    seen_ids.dedup();
    assert_eq!(seen_ids.len(), store.len(), "no two entries share an id");
}

/// Grab an extra reference on an entry, standing in for a watcher that
/// has observed it.
pub fn store_inc_ref(
    store: &mut Store,
    id: &EntityId,
) {
    let at = store.revno_of(id).expect("inc_ref of unknown id");
    store.inc_ref(at);
}

/// Release a reference on an entry.
pub fn store_dec_ref(
    store: &mut Store,
    id: &EntityId,
) {
    let at = store.revno_of(id).expect("dec_ref of unknown id");
    store.dec_ref(at);
}

/// Reference count currently held on an entry.
pub fn store_ref_count(
    store: &Store,
    id: &EntityId,
) -> usize {
    let at = store.revno_of(id).expect("ref_count of unknown id");
    store.entry_at(at).unwrap().ref_count
}

/// Batches arrive in revno order but cross-batch comparisons are set
/// comparisons: map each delta to its entity id, keeping the value for a
/// live delta and `None` for a removal. Panics when an id appears twice
/// in one set.
pub fn delta_map(deltas: &[Delta]) -> HashMap<EntityId, Option<String>> {
    let mut m = HashMap::new();
    for d in deltas {
        let id = d.entity_id();
        let value = if d.removed {
            None
        } else {
            Some(entity_repr(&d.entity))
        };
        if m.insert(id.clone(), value).is_some() {
            panic!("{id} mentioned twice in delta set");
        }
    }
    m
}

/// Assert that two delta sets describe the same view of the world.
pub fn assert_deltas_equal(
    got: &[Delta],
    want: &[Delta],
) {
    assert_eq!(delta_map(got), delta_map(want));
}
