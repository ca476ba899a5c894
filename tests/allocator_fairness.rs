use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;

use tuple_design::metrics::selection_skew;
use tuple_design::{
    AllocationRequest, DesignError, ImageId, ImageRecord, InMemoryRecordStore, PoolAdmin,
    RecordStore, ScanCursor, allocate_images,
};

fn fresh_pool(size: usize) -> (InMemoryRecordStore, Vec<ImageId>) {
    let store = InMemoryRecordStore::new();
    let ids: Vec<ImageId> = (0..size).map(|idx| format!("img_{idx:03}")).collect();
    store
        .register_images(ids.iter().map(ImageRecord::new).collect())
        .unwrap();
    store.activate_images(&ids).unwrap();
    (store, ids)
}

#[test]
fn hundred_image_pool_yields_ten_distinct_active_images() {
    let (store, ids) = fresh_pool(100);
    let mut rng = StdRng::seed_from_u64(42);
    let allocation = allocate_images(
        &store,
        &AllocationRequest::new(10),
        &ScanCursor::start(),
        &mut rng,
    )
    .unwrap();
    assert_eq!(allocation.images.len(), 10);
    let distinct: HashSet<&ImageId> = allocation.images.iter().collect();
    assert_eq!(distinct.len(), 10);
    assert!(allocation.images.iter().all(|id| ids.contains(id)));
    assert_eq!(allocation.throttled, 0);
}

#[test]
fn repeated_allocations_cover_a_fresh_pool_evenly() {
    let (store, _) = fresh_pool(30);
    let mut rng = StdRng::seed_from_u64(3);
    let mut cursor = ScanCursor::start();
    let mut counts: HashMap<ImageId, usize> = HashMap::new();
    for _ in 0..300 {
        let allocation =
            allocate_images(&store, &AllocationRequest::new(6), &cursor, &mut rng).unwrap();
        cursor = allocation.cursor;
        for id in allocation.images {
            *counts.entry(id).or_default() += 1;
        }
    }
    assert_eq!(counts.len(), 30);
    let skew = selection_skew(&counts).unwrap();
    assert_eq!(skew.total, 1800);
    assert!(skew.min > 0);
    assert!(skew.ratio < 3.0, "selection ratio too skewed: {}", skew.ratio);
}

#[test]
fn over_exposed_images_are_throttled_until_their_credit_runs_out() {
    let store = InMemoryRecordStore::new();
    let heavy: Vec<ImageId> = (0..5).map(|idx| format!("heavy_{idx}")).collect();
    let light: Vec<ImageId> = (0..15).map(|idx| format!("light_{idx:02}")).collect();
    let mut records: Vec<ImageRecord> = heavy
        .iter()
        .map(|id| ImageRecord::new(id.clone()).with_times_seen(1_000))
        .collect();
    records.extend(light.iter().map(ImageRecord::new));
    store.register_images(records).unwrap();
    let all: Vec<ImageId> = heavy.iter().chain(&light).cloned().collect();
    assert_eq!(store.activate_images(&all).unwrap(), 20);
    for id in &heavy {
        assert_eq!(store.get_surplus(id).unwrap(), 1_000);
    }

    let mut rng = StdRng::seed_from_u64(2024);
    let mut cursor = ScanCursor::start();
    let mut counts: HashMap<ImageId, usize> = HashMap::new();
    let mut throttled = 0usize;
    for _ in 0..200 {
        let allocation =
            allocate_images(&store, &AllocationRequest::new(5), &cursor, &mut rng).unwrap();
        cursor = allocation.cursor;
        throttled += allocation.throttled;
        for id in allocation.images {
            *counts.entry(id).or_default() += 1;
        }
    }

    let least_light = light
        .iter()
        .map(|id| counts.get(id).copied().unwrap_or(0))
        .min()
        .unwrap();
    for id in &heavy {
        let picked = counts.get(id).copied().unwrap_or(0);
        assert!(
            picked <= least_light,
            "{id} picked {picked} times, least-picked fresh image {least_light}"
        );
    }
    assert!(throttled > 0);
    let spent: i64 = heavy
        .iter()
        .map(|id| 1_000 - store.get_surplus(id).unwrap())
        .sum();
    assert_eq!(spent, throttled as i64);
}

#[test]
fn practice_allocations_ignore_exposure_credit() {
    let store = InMemoryRecordStore::new();
    let ids: Vec<ImageId> = (0..8).map(|idx| format!("img_{idx}")).collect();
    store
        .register_images(
            ids.iter()
                .map(|id| ImageRecord::new(id.clone()).with_times_seen(50))
                .collect(),
        )
        .unwrap();
    store.activate_images(&ids).unwrap();

    let mut rng = StdRng::seed_from_u64(8);
    let allocation = allocate_images(
        &store,
        &AllocationRequest::new(8).practice(true),
        &ScanCursor::start(),
        &mut rng,
    )
    .unwrap();
    assert_eq!(allocation.images.len(), 8);
    assert_eq!(allocation.throttled, 0);
    for id in &ids {
        assert_eq!(store.get_surplus(id).unwrap(), 50);
    }
}

#[test]
fn deactivated_images_are_never_allocated() {
    let (store, ids) = fresh_pool(12);
    let retired: Vec<ImageId> = ids[..4].to_vec();
    assert_eq!(store.deactivate_images(&retired).unwrap(), 4);

    let mut rng = StdRng::seed_from_u64(5);
    let allocation = allocate_images(
        &store,
        &AllocationRequest::new(8),
        &ScanCursor::start(),
        &mut rng,
    )
    .unwrap();
    assert_eq!(allocation.images.len(), 8);
    assert!(allocation.images.iter().all(|id| !retired.contains(id)));

    let err = allocate_images(
        &store,
        &AllocationRequest::new(9),
        &ScanCursor::start(),
        &mut rng,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DesignError::InsufficientPool {
            requested: 9,
            available: 8
        }
    ));
}
