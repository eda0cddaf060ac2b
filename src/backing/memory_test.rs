mod tests {
    use tokio::sync::mpsc;

    use crate::test_utils::*;
    use crate::Backing;
    use crate::BackingError;
    use crate::Change;
    use crate::MemoryBacking;
    use crate::Store;

    #[tokio::test]
    async fn get_all_seeds_the_store() {
        let backing = MemoryBacking::new([MachineInfo::new("0"), ServiceInfo::new("logging")]);
        let mut store = Store::new();
        backing.get_all(&mut store).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get(&machine_id("0")).is_some());
        assert!(store.get(&service_id("logging")).is_some());
        assert_store_invariants(&store);
    }

    #[tokio::test]
    async fn get_all_seeds_in_insertion_order() {
        let backing = MemoryBacking::new([ServiceInfo::new("wordpress"), MachineInfo::new("0")]);
        let mut store = Store::new();
        backing.get_all(&mut store).await.unwrap();

        let deltas = store.changes_since(0);
        assert_eq!(deltas[0].entity_id(), service_id("wordpress"));
        assert_eq!(deltas[1].entity_id(), machine_id("0"));
    }

    #[tokio::test]
    async fn mutations_notify_the_watch_channel() {
        let backing = MemoryBacking::default();
        let (tx, mut rx) = mpsc::channel(10);
        backing.watch(tx).await.unwrap();

        backing.update_entity(MachineInfo::new("0"));
        let change = rx.recv().await.unwrap();
        assert_eq!(
            change,
            Change {
                kind: "machine".to_string(),
                id: "0".to_string(),
                hint: 1,
            }
        );

        backing.delete_entity(&machine_id("0"));
        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, "machine");
        assert_eq!(change.id, "0");
        assert_eq!(change.hint, 2);
    }

    #[tokio::test]
    async fn fetch_distinguishes_not_found() {
        let backing = MemoryBacking::new([MachineInfo::new("0")]);

        let info = backing.fetch(&machine_id("0")).await.unwrap();
        assert_eq!(info.entity_id(), machine_id("0"));

        let err = backing.fetch(&machine_id("1")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "entity machine/1 not found");
    }

    #[tokio::test]
    async fn fail_fetches_poisons_fetch_and_seed() {
        let backing = MemoryBacking::new([MachineInfo::new("0")]);
        backing.fail_fetches("some error");

        let err = backing.fetch(&machine_id("0")).await.unwrap_err();
        assert_eq!(err.to_string(), "some error");
        assert!(!err.is_not_found());

        let mut store = Store::new();
        let err = backing.get_all(&mut store).await.unwrap_err();
        assert_eq!(err.to_string(), "some error");
    }

    #[tokio::test]
    async fn changed_applies_updates_and_removals() {
        let backing = MemoryBacking::new([MachineInfo::new("0")]);
        let mut store = Store::new();

        let change = Change {
            kind: "machine".to_string(),
            id: "0".to_string(),
            hint: 0,
        };
        backing.changed(&mut store, change.clone()).await.unwrap();
        assert!(store.get(&machine_id("0")).is_some());

        // The entity vanishes upstream: the same change now removes it.
        backing.delete_entity(&machine_id("0"));
        backing.changed(&mut store, change).await.unwrap();
        assert!(store.get(&machine_id("0")).is_none());
        assert_store_invariants(&store);
    }

    #[tokio::test]
    async fn watch_is_exclusive_until_unwatch() {
        let backing = MemoryBacking::default();
        let (tx, mut rx) = mpsc::channel(10);
        backing.watch(tx).await.unwrap();

        let (tx2, _rx2) = mpsc::channel(10);
        let err = backing.watch(tx2).await.unwrap_err();
        assert!(matches!(err, BackingError::AlreadyWatched));

        backing.unwatch().await;
        backing.update_entity(MachineInfo::new("0"));
        assert!(rx.try_recv().is_err());

        let (tx3, mut rx3) = mpsc::channel(10);
        backing.watch(tx3).await.unwrap();
        backing.update_entity(MachineInfo::new("1"));
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn len_tracks_upstream_contents() {
        let backing = MemoryBacking::default();
        assert!(backing.is_empty());
        backing.update_entity(MachineInfo::new("0"));
        backing.update_entity(MachineInfo::with_instance("0", "i-0"));
        assert_eq!(backing.len(), 1);
        backing.delete_entity(&machine_id("0"));
        assert!(backing.is_empty());
    }
}
