//! The versioned store at the heart of the multiwatcher.
//!
//! Entries are kept in ascending revision order; any mutation that changes
//! an entry's revision moves it to the tail, so a watcher at revision `r`
//! only ever scans the suffix with `revno > r`. Removed entries survive as
//! reference-counted tombstones until every watcher that observed the
//! entity has consumed its removal.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;

use tracing::trace;

use crate::Delta;
use crate::Entity;
use crate::EntityId;

/// One live-or-tombstoned entity known to the store.
#[derive(Debug, Clone)]
pub(crate) struct EntityEntry {
    /// Current value, or the last value prior to removal.
    pub(crate) info: Arc<dyn Entity>,
    /// Store revision at which this incarnation of the entity appeared.
    pub(crate) creation_revno: i64,
    /// Store revision of the most recent change to this entry.
    pub(crate) revno: i64,
    /// True iff the entity has been deleted upstream.
    pub(crate) removed: bool,
    /// Number of live watchers that have observed this entry.
    pub(crate) ref_count: usize,
}

/// In-memory versioned collection of entity entries.
///
/// Single-threaded by construction: only the manager loop that owns a
/// store ever touches it. `latest_revno` is strictly increasing and is
/// bumped exactly when a mutation produces an externally observable delta.
#[derive(Debug, Default)]
pub struct Store {
    /// Entries in ascending revno order. Revnos are unique, so the revno
    /// doubles as the sequence position.
    entries: BTreeMap<i64, EntityEntry>,
    /// EntityId to current sequence position.
    index: HashMap<EntityId, i64>,
    latest_revno: i64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest revision this store has assigned.
    pub fn latest_revno(&self) -> i64 {
        self.latest_revno
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the value for an entity, stamping it with a fresh
    /// revision and moving it to the tail of the sequence.
    ///
    /// Updating a tombstoned entry resurrects it: the entry restarts its
    /// lifecycle with `creation_revno` equal to the new revision and no
    /// references. Watchers observe the resurrection as an ordinary update
    /// delta, never as a second removal.
    pub fn update(
        &mut self,
        info: Arc<dyn Entity>,
    ) {
        let id = info.entity_id();
        self.latest_revno += 1;
        let revno = self.latest_revno;
        match self.index.get(&id) {
            Some(&at) => {
                let mut entry = self.entries.remove(&at).expect("index out of sync with entries");
                if entry.removed {
                    entry.creation_revno = revno;
                    entry.removed = false;
                    entry.ref_count = 0;
                }
                entry.info = info;
                entry.revno = revno;
                self.entries.insert(revno, entry);
            }
            None => {
                trace!(entity = %id, revno, "new entity");
                self.entries.insert(
                    revno,
                    EntityEntry {
                        info,
                        creation_revno: revno,
                        revno,
                        removed: false,
                        ref_count: 0,
                    },
                );
            }
        }
        self.index.insert(id, revno);
    }

    /// Record the upstream deletion of an entity.
    ///
    /// Unknown ids and already-removed entries are no-ops. An entry no
    /// watcher has observed is deleted outright without consuming a
    /// revision; otherwise the entry becomes a tombstone at a fresh
    /// revision so every observer still receives the removal.
    pub fn remove(
        &mut self,
        id: &EntityId,
    ) {
        let Some(&at) = self.index.get(id) else {
            return;
        };
        let entry = self.entries.get_mut(&at).expect("index out of sync with entries");
        if entry.removed {
            return;
        }
        if entry.ref_count == 0 {
            trace!(entity = %id, "deleting unobserved entity");
            self.entries.remove(&at);
            self.index.remove(id);
            return;
        }
        self.latest_revno += 1;
        let revno = self.latest_revno;
        let mut entry = self.entries.remove(&at).expect("index out of sync with entries");
        entry.revno = revno;
        entry.removed = true;
        self.entries.insert(revno, entry);
        self.index.insert(id.clone(), revno);
    }

    /// Current value for a live entity, or `None` when the entity is
    /// unknown or removed.
    pub fn get(
        &self,
        id: &EntityId,
    ) -> Option<Arc<dyn Entity>> {
        let at = self.index.get(id)?;
        let entry = &self.entries[at];
        if entry.removed {
            return None;
        }
        Some(Arc::clone(&entry.info))
    }

    /// Deltas for every entry changed after `revno`, in ascending revision
    /// order.
    ///
    /// An entry that is removed and was also created after `revno`
    /// describes an entity the caller has never seen; it is suppressed.
    /// Calling with a negative revision yields all reportable entries.
    pub fn changes_since(
        &self,
        revno: i64,
    ) -> Vec<Delta> {
        self.entries
            .range((Bound::Excluded(revno), Bound::Unbounded))
            .filter(|(_, e)| !(e.removed && e.creation_revno > revno))
            .map(|(_, e)| Delta {
                entity: Arc::clone(&e.info),
                removed: e.removed,
            })
            .collect()
    }

    /// Sequence positions of entries changed after `revno`, ascending.
    pub(crate) fn revnos_since(
        &self,
        revno: i64,
    ) -> Vec<i64> {
        self.entries
            .range((Bound::Excluded(revno), Bound::Unbounded))
            .map(|(&at, _)| at)
            .collect()
    }

    /// Sequence positions of all entries, ascending.
    pub(crate) fn all_revnos(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn entry_at(
        &self,
        at: i64,
    ) -> Option<&EntityEntry> {
        self.entries.get(&at)
    }

    pub(crate) fn revno_of(
        &self,
        id: &EntityId,
    ) -> Option<i64> {
        self.index.get(id).copied()
    }

    /// Record that one more live watcher has observed the entry at `at`.
    pub(crate) fn inc_ref(
        &mut self,
        at: i64,
    ) {
        let entry = self.entries.get_mut(&at).expect("inc_ref of unknown entry");
        entry.ref_count += 1;
    }

    /// Release one watcher's reference to the entry at `at`, deleting the
    /// entry when the last reference against a tombstone drops.
    pub(crate) fn dec_ref(
        &mut self,
        at: i64,
    ) {
        let entry = self.entries.get_mut(&at).expect("dec_ref of unknown entry");
        if entry.ref_count == 0 {
            panic!("negative reference count for {}", entry.info.entity_id());
        }
        entry.ref_count -= 1;
        if entry.ref_count > 0 || !entry.removed {
            return;
        }
        let id = entry.info.entity_id();
        trace!(entity = %id, "tombstone fully consumed");
        self.entries.remove(&at);
        self.index.remove(&id);
    }
}
