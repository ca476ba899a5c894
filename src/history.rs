//! Pair history lookups scoped to a candidate pool.

use std::collections::HashSet;
use tracing::debug;

use crate::data::{PairKey, PairSet, tuple_pairs};
use crate::errors::DesignError;
use crate::store::RecordStore;
use crate::types::ImageId;

/// Pairs among `candidates` that already co-occurred in a registered design.
///
/// Each stored pair is reached through its canonical first member, so one
/// prefix scan per candidate covers every pair whose members are both
/// candidates.
pub fn preexisting_pairs<S>(store: &S, candidates: &[ImageId]) -> Result<PairSet, DesignError>
where
    S: RecordStore + ?Sized,
{
    let members: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut observed = PairSet::new();
    for candidate in candidates {
        for pair in store.pairs_with_prefix(candidate)? {
            if members.contains(pair.second()) {
                observed.insert(pair);
            }
        }
    }
    debug!(
        candidates = candidates.len(),
        observed = observed.len(),
        "loaded pair history for candidate pool"
    );
    Ok(observed)
}

/// True when no pair inside `tuple` appears in `observed`.
pub fn tuple_permitted(tuple: &[ImageId], observed: &PairSet) -> bool {
    tuple_pairs(tuple).all(|pair| !observed.contains(&pair))
}

/// Like [`tuple_permitted`], but checks every pair against the store directly.
///
/// Useful for validating a hand-built tuple without loading a full exclusion set.
pub fn tuple_permitted_in_store<S>(store: &S, tuple: &[ImageId]) -> Result<bool, DesignError>
where
    S: RecordStore + ?Sized,
{
    for pair in tuple_pairs(tuple) {
        if store.pair_exists(&pair)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// First pair of `tuple` found in `observed`, if any.
pub fn first_conflict<'a>(tuple: &[ImageId], observed: &'a PairSet) -> Option<&'a PairKey> {
    tuple_pairs(tuple).find_map(|pair| observed.get(&pair))
}
