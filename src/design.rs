//! Greedy round-based construction of pair-disjoint tuple designs.
//!
//! Rounds relax a per-image occurrence ceiling from `0` up to
//! `tuple_size + min_occurrences - 1`. Inside each round every size-`t` index
//! combination is visited in lexicographic order and accepted when it adds no
//! already-observed pair, keeps every member under the round ceiling, and
//! still helps at least one member toward the occurrence target.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::constants::design::{DEFAULT_MIN_OCCURRENCES, DEFAULT_TUPLE_SIZE};
use crate::data::{Design, ImageTuple, PairSet};
use crate::errors::DesignError;
use crate::heuristics::estimate_design_capacity;
use crate::types::ImageId;
use crate::utils::Combinations;

/// Shape of a design run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignParams {
    /// Images per tuple (`t`).
    pub tuple_size: usize,
    /// Minimum appearances per candidate (`j`).
    pub min_occurrences: usize,
}

impl Default for DesignParams {
    fn default() -> Self {
        Self {
            tuple_size: DEFAULT_TUPLE_SIZE,
            min_occurrences: DEFAULT_MIN_OCCURRENCES,
        }
    }
}

impl DesignParams {
    /// Design with tuples of `tuple_size` and at least `min_occurrences` appearances per image.
    pub fn new(tuple_size: usize, min_occurrences: usize) -> Self {
        Self {
            tuple_size,
            min_occurrences,
        }
    }

    /// Check the parameters against a pool of `candidates` images.
    pub fn validate(&self, candidates: usize) -> Result<(), DesignError> {
        if candidates == 0 {
            return Err(DesignError::Configuration(
                "design requires at least one candidate image".into(),
            ));
        }
        if self.tuple_size < 2 {
            return Err(DesignError::Configuration(format!(
                "tuple_size must be at least 2 (got {})",
                self.tuple_size
            )));
        }
        if self.tuple_size > candidates {
            return Err(DesignError::Configuration(format!(
                "tuple_size {} exceeds candidate pool of {candidates}",
                self.tuple_size
            )));
        }
        if self.min_occurrences == 0 {
            return Err(DesignError::Configuration(
                "min_occurrences must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Symmetric candidate-index pair matrix for one design run.
struct PairMatrix {
    size: usize,
    seen: Vec<bool>,
}

impl PairMatrix {
    fn new(size: usize) -> Self {
        Self {
            size,
            seen: vec![false; size * size],
        }
    }

    fn mark(&mut self, a: usize, b: usize) {
        self.seen[a * self.size + b] = true;
        self.seen[b * self.size + a] = true;
    }

    fn contains(&self, a: usize, b: usize) -> bool {
        self.seen[a * self.size + b]
    }

    fn any_in(&self, combo: &[usize]) -> bool {
        combo.iter().enumerate().any(|(pos, &a)| {
            combo[pos + 1..]
                .iter()
                .any(|&b| self.contains(a, b))
        })
    }

    fn mark_all(&mut self, combo: &[usize]) {
        for (pos, &a) in combo.iter().enumerate() {
            for &b in &combo[pos + 1..] {
                self.mark(a, b);
            }
        }
    }
}

/// Build a design over `candidates` that never repeats a pair and never uses a pair from `excluded`.
///
/// The search is deterministic: identical candidate order, parameters and
/// exclusions always yield the same tuple sequence. When the rounds run out
/// before every candidate reaches `min_occurrences`, the run fails with
/// [`DesignError::DesignInfeasible`]; partial designs are never returned.
pub fn build_design(
    candidates: &[ImageId],
    params: DesignParams,
    excluded: &PairSet,
) -> Result<Design, DesignError> {
    params.validate(candidates.len())?;

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(candidates.len());
    for (idx, id) in candidates.iter().enumerate() {
        if index.insert(id.as_str(), idx).is_some() {
            return Err(DesignError::Configuration(format!(
                "duplicate candidate image '{id}'"
            )));
        }
    }

    let n = candidates.len();
    let t = params.tuple_size;
    let j = params.min_occurrences;

    let mut observed = PairMatrix::new(n);
    let mut excluded_in_pool = 0usize;
    for pair in excluded {
        if let (Some(&a), Some(&b)) = (index.get(pair.first()), index.get(pair.second())) {
            observed.mark(a, b);
            excluded_in_pool += 1;
        }
    }

    let capacity = estimate_design_capacity(n as u128, t as u128, j as u128, excluded_in_pool as u128);
    if !capacity.occurrence_target_reachable {
        warn!(
            candidates = n,
            tuple_size = t,
            min_occurrences = j,
            max_per_image = %capacity.max_occurrences_per_image,
            "occurrence target exceeds per-image pair capacity"
        );
    }

    let mut occurrences = vec![0usize; n];
    let mut tuples: Vec<ImageTuple> = Vec::new();
    let reached = |occurrences: &[usize]| occurrences.iter().all(|count| *count >= j);

    'rounds: for ceiling in 0..t + j {
        for combo in Combinations::new(n, t) {
            if reached(&occurrences) {
                break 'rounds;
            }
            if observed.any_in(&combo) {
                continue;
            }
            if combo.iter().any(|&idx| occurrences[idx] > ceiling) {
                continue;
            }
            if combo.iter().all(|&idx| occurrences[idx] >= j) {
                continue;
            }
            observed.mark_all(&combo);
            for &idx in &combo {
                occurrences[idx] += 1;
            }
            tuples.push(combo.iter().map(|&idx| candidates[idx].clone()).collect());
        }
    }

    if !reached(&occurrences) {
        let short: Vec<(ImageId, usize)> = candidates
            .iter()
            .zip(&occurrences)
            .filter(|(_, count)| **count < j)
            .map(|(id, count)| (id.clone(), *count))
            .collect();
        debug!(
            candidates = n,
            tuples = tuples.len(),
            short = short.len(),
            "design search exhausted its rounds"
        );
        return Err(DesignError::DesignInfeasible {
            tuple_size: t,
            min_occurrences: j,
            short,
        });
    }

    debug!(
        candidates = n,
        tuples = tuples.len(),
        excluded = excluded_in_pool,
        "built design"
    );
    Ok(Design {
        tuples,
        candidates: candidates.to_vec(),
        occurrences,
        tuple_size: t,
        min_occurrences: j,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PairKey;

    fn ids(values: &[&str]) -> Vec<ImageId> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn tuple(values: &[&str]) -> ImageTuple {
        ids(values)
    }

    #[test]
    fn six_images_in_pairs_cover_everything_once() {
        let design = build_design(
            &ids(&["A", "B", "C", "D", "E", "F"]),
            DesignParams::new(2, 1),
            &PairSet::new(),
        )
        .unwrap();
        assert_eq!(
            design.tuples,
            vec![tuple(&["A", "B"]), tuple(&["C", "D"]), tuple(&["E", "F"])]
        );
        assert_eq!(design.occurrences, vec![1; 6]);
    }

    #[test]
    fn full_pair_coverage_when_every_pair_is_needed() {
        let design = build_design(
            &ids(&["A", "B", "C", "D"]),
            DesignParams::new(2, 3),
            &PairSet::new(),
        )
        .unwrap();
        assert_eq!(design.len(), 6);
        assert_eq!(design.pairs().len(), 6);
        assert_eq!(design.occurrences, vec![3; 4]);
    }

    #[test]
    fn excluded_pair_makes_occurrence_target_infeasible() {
        let mut excluded = PairSet::new();
        excluded.insert(PairKey::new("B", "A"));
        let err = build_design(&ids(&["A", "B", "C", "D"]), DesignParams::new(2, 3), &excluded)
            .unwrap_err();
        match err {
            DesignError::DesignInfeasible {
                tuple_size,
                min_occurrences,
                short,
            } => {
                assert_eq!(tuple_size, 2);
                assert_eq!(min_occurrences, 3);
                assert_eq!(short, vec![("A".to_string(), 2), ("B".to_string(), 2)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn excluded_pairs_never_appear_and_foreign_pairs_are_ignored() {
        let candidates = ids(&["a", "b", "c", "d", "e", "f", "g"]);
        let mut excluded = PairSet::new();
        excluded.insert(PairKey::new("a", "b"));
        excluded.insert(PairKey::new("c", "e"));
        excluded.insert(PairKey::new("a", "zz"));
        let design = build_design(&candidates, DesignParams::new(3, 1), &excluded).unwrap();
        let pairs = design.pairs();
        assert!(!pairs.contains(&PairKey::new("a", "b")));
        assert!(!pairs.contains(&PairKey::new("c", "e")));
        assert!(design.occurrences.iter().all(|count| *count >= 1));
    }

    #[test]
    fn builder_is_deterministic() {
        let candidates: Vec<ImageId> = (0..15).map(|idx| format!("img_{idx:02}")).collect();
        let params = DesignParams::new(3, 2);
        let first = build_design(&candidates, params, &PairSet::new()).unwrap();
        let second = build_design(&candidates, params, &PairSet::new()).unwrap();
        assert_eq!(first.tuples, second.tuples);
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        let pool = ids(&["a", "b", "c"]);
        for params in [
            DesignParams::new(1, 1),
            DesignParams::new(4, 1),
            DesignParams::new(2, 0),
        ] {
            assert!(matches!(
                build_design(&pool, params, &PairSet::new()),
                Err(DesignError::Configuration(_))
            ));
        }
        assert!(matches!(
            build_design(&[], DesignParams::new(2, 1), &PairSet::new()),
            Err(DesignError::Configuration(_))
        ));
        assert!(matches!(
            build_design(&ids(&["a", "b", "a"]), DesignParams::new(2, 1), &PairSet::new()),
            Err(DesignError::Configuration(msg)) if msg.contains("duplicate")
        ));
    }
}
