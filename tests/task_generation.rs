use std::collections::HashSet;
use std::sync::Arc;

use tuple_design::{
    AttributeFilter, DesignError, ImageId, ImageRecord, InMemoryRecordStore, PairKey, PoolAdmin,
    RecordStore, TaskConfig, TaskGenerator, TaskLedger,
};

fn active_pool(size: usize) -> (Arc<InMemoryRecordStore>, Vec<ImageId>) {
    let store = InMemoryRecordStore::new();
    let ids: Vec<ImageId> = (0..size).map(|idx| format!("img_{idx:03}")).collect();
    store
        .register_images(ids.iter().map(ImageRecord::new).collect())
        .unwrap();
    store.activate_images(&ids).unwrap();
    (Arc::new(store), ids)
}

fn pair_config(num_images: usize) -> TaskConfig {
    TaskConfig {
        num_images,
        tuple_size: 2,
        min_occurrences: 1,
        keep_blocks: Some(1),
        reject_blocks: Some(1),
        ..TaskConfig::default()
    }
}

#[test]
fn committed_task_is_readable_from_the_ledger() {
    let (store, _) = active_pool(12);
    let generator = TaskGenerator::new(Arc::clone(&store), 31);
    let (draft, record) = generator.generate_and_register(&pair_config(6)).unwrap();

    let stored = store.task(&draft.id).unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.tuples.len(), draft.trial_count());
    assert_eq!(stored.tuples.len(), stored.tuple_kinds.len());
    assert!(!stored.practice);
    assert_eq!(stored.attribute, draft.attribute);
}

#[test]
fn later_tasks_never_reuse_committed_pairs() {
    let (store, _) = active_pool(12);
    let generator = TaskGenerator::new(Arc::clone(&store), 77);
    let mut committed: HashSet<PairKey> = HashSet::new();
    for _ in 0..3 {
        let (draft, _) = generator.generate_and_register(&pair_config(6)).unwrap();
        for pair in draft.pairs() {
            assert!(committed.insert(pair.clone()), "pair {pair} was reused");
            assert!(store.pair_exists(&pair).unwrap());
        }
    }
    assert_eq!(committed.len(), 9);
}

#[test]
fn exposure_counts_follow_design_occurrences() {
    let (store, ids) = active_pool(4);
    let generator = TaskGenerator::new(Arc::clone(&store), 5);
    let config = TaskConfig {
        num_images: 4,
        tuple_size: 2,
        min_occurrences: 3,
        keep_blocks: Some(1),
        reject_blocks: Some(1),
        ..TaskConfig::default()
    };
    let (draft, _) = generator.generate_and_register(&config).unwrap();
    assert_eq!(draft.design.len(), 6);
    for id in &ids {
        assert_eq!(store.image(id).unwrap().unwrap().times_seen, 3);
    }
    let stats = store.exposure_stats(&AttributeFilter::any()).unwrap().unwrap();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.min, 3);
}

#[test]
fn practice_tasks_leave_history_and_exposure_untouched() {
    let (store, ids) = active_pool(12);
    let generator = TaskGenerator::new(Arc::clone(&store), 9);
    let config = TaskConfig {
        practice: true,
        ..pair_config(6)
    };
    let (draft, record) = generator.generate_and_register(&config).unwrap();
    assert!(record.practice);
    for pair in draft.pairs() {
        assert!(!store.pair_exists(&pair).unwrap());
    }
    for id in &ids {
        assert_eq!(store.image(id).unwrap().unwrap().times_seen, 0);
    }
    assert!(store.task(&draft.id).unwrap().is_some());
}

#[test]
fn practice_pairs_can_be_recorded_on_request() {
    let (store, _) = active_pool(12);
    let generator = TaskGenerator::new(Arc::clone(&store), 10);
    let config = TaskConfig {
        practice: true,
        store_practice_pairs: true,
        ..pair_config(6)
    };
    let (draft, _) = generator.generate_and_register(&config).unwrap();
    for pair in draft.pairs() {
        assert!(store.pair_exists(&pair).unwrap());
    }
}

#[test]
fn conflicting_registration_writes_nothing() {
    let (store, ids) = active_pool(8);
    let generator = TaskGenerator::new(Arc::clone(&store), 13);
    let (first, _) = generator.generate_and_register(&pair_config(8)).unwrap();
    let seen_before: Vec<u64> = ids
        .iter()
        .map(|id| store.image(id).unwrap().unwrap().times_seen)
        .collect();

    let mut replay = first.clone();
    replay.id = "task_replayed".to_string();
    let err = generator.register(&replay, &pair_config(8)).unwrap_err();
    assert!(matches!(err, DesignError::PairConflict { .. }));

    assert!(store.task("task_replayed").unwrap().is_none());
    let seen_after: Vec<u64> = ids
        .iter()
        .map(|id| store.image(id).unwrap().unwrap().times_seen)
        .collect();
    assert_eq!(seen_before, seen_after);
}

#[test]
fn unknown_images_are_rejected_at_registration() {
    let (store, _) = active_pool(6);
    let generator = TaskGenerator::new(Arc::clone(&store), 21);
    let mut draft = generator.generate(&pair_config(6)).unwrap();
    draft.design[0][0] = "img_missing".to_string();
    let err = store.register_task(&draft, true).unwrap_err();
    assert!(matches!(err, DesignError::UnknownImage(id) if id == "img_missing"));
    assert!(store.task(&draft.id).unwrap().is_none());
}

#[test]
fn filtered_tasks_only_draw_tagged_images() {
    let (store, ids) = active_pool(20);
    let tagged: Vec<ImageId> = ids.iter().step_by(2).cloned().collect();
    assert_eq!(
        store
            .add_attributes(&tagged, &["portrait".to_string()])
            .unwrap(),
        10
    );
    let generator = TaskGenerator::new(Arc::clone(&store), 4);
    let config = TaskConfig {
        image_filter: AttributeFilter::any_of(["portrait"]),
        ..pair_config(8)
    };
    let (draft, record) = generator.generate_and_register(&config).unwrap();
    assert!(draft.images().all(|id| tagged.iter().any(|tag| tag == id)));
    assert_eq!(record.image_attributes, vec!["portrait".to_string()]);

    let too_many = TaskConfig {
        num_images: 11,
        ..config
    };
    assert!(matches!(
        generator.generate(&too_many),
        Err(DesignError::InsufficientPool {
            requested: 11,
            available: 10
        })
    ));
}

#[test]
fn activating_new_images_rebalances_surplus() {
    let (store, ids) = active_pool(6);
    let generator = TaskGenerator::new(Arc::clone(&store), 3);
    generator.generate_and_register(&pair_config(6)).unwrap();
    for id in &ids {
        assert_eq!(store.get_surplus(id).unwrap(), 0);
    }

    let newcomers: Vec<ImageId> = vec!["img_new_0".to_string(), "img_new_1".to_string()];
    store
        .register_images(newcomers.iter().map(ImageRecord::new).collect())
        .unwrap();
    assert_eq!(store.activate_images(&newcomers).unwrap(), 2);
    for id in &ids {
        assert_eq!(store.get_surplus(id).unwrap(), 1);
    }
    for id in &newcomers {
        assert_eq!(store.get_surplus(id).unwrap(), 0);
    }

    // Re-activating already active images changes nothing.
    assert_eq!(store.activate_images(&newcomers).unwrap(), 0);
    assert_eq!(store.get_surplus(&ids[0]).unwrap(), 1);
}

#[test]
fn overtaken_draft_is_refused_and_regeneration_avoids_its_pairs() {
    // Four images with every image in two pairs: any two designs share a pair.
    let (store, _) = active_pool(4);
    let config = TaskConfig {
        min_occurrences: 2,
        ..pair_config(4)
    };
    let leader = TaskGenerator::new(Arc::clone(&store), 61);
    let follower = TaskGenerator::new(Arc::clone(&store), 62);
    let leading = leader.generate(&config).unwrap();
    let overtaken = follower.generate(&config).unwrap();
    assert_ne!(leading.id, overtaken.id);

    leader.register(&leading, &config).unwrap();
    let committed = leading.pairs();
    let err = follower.register(&overtaken, &config).unwrap_err();
    match err {
        DesignError::PairConflict { pair } => assert!(committed.contains(&pair)),
        other => panic!("expected a pair conflict, got {other}"),
    }
    assert!(store.task(&overtaken.id).unwrap().is_none());
    for pair in overtaken.pairs().difference(&committed) {
        assert!(!store.pair_exists(pair).unwrap());
    }

    let fresh_config = TaskConfig {
        min_occurrences: 1,
        ..config
    };
    let (fresh, _) = follower.generate_and_register(&fresh_config).unwrap();
    assert!(fresh.pairs().is_disjoint(&committed));
    for pair in committed.iter().chain(fresh.pairs().iter()) {
        assert!(store.pair_exists(pair).unwrap());
    }
}
