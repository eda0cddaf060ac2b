//! The store manager: one loop, one store, many watchers.
//!
//! ```text
//! Backing:
//!   watch() -> mpsc::send(Change)            [upstream notifications]
//!                     |
//! ManagerLoop (spawned in StoreManager::spawn):
//!   select! -> backing.changed() -> Store mutation -> respond()
//!           -> WatchRequest::Next / Stop ----^
//!                     |
//! Watchers:
//!   next() -> oneshot::Receiver<Result<Vec<Delta>>>
//! ```
//!
//! The loop is the only code that ever touches the store, so no locking
//! guards it. Watchers communicate exclusively by posting requests; a
//! watcher that never polls simply leaves its newest request parked and
//! costs the store at most its unconsumed tombstones.

mod manager;
mod watcher;


pub use manager::StoreManager;
pub use watcher::Watcher;

pub(crate) use manager::ManagerCore;
