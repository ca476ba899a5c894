use serde::Serialize;

/// Combinatorial bounds for a design over `candidates` images.
///
/// These are estimates for reporting; the design builder never consults them
/// to skip its search.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesignCapacity {
    /// Candidate images (`n`).
    pub candidates: u128,
    /// Images per tuple (`t`).
    pub tuple_size: u128,
    /// Occurrence target (`j`).
    pub min_occurrences: u128,
    /// Unordered pairs inside one tuple, `t * (t - 1) / 2`.
    pub pairs_per_tuple: u128,
    /// Pairs among the candidates not already excluded by history.
    pub available_pairs: u128,
    /// Tuples an image can join before it must repeat a pair, `(n - 1) / (t - 1)`.
    pub max_occurrences_per_image: u128,
    /// Fewest tuples that can give every image `j` appearances, `ceil(n * j / t)`.
    pub min_tuples: u128,
    /// Most pair-disjoint tuples the available pairs allow.
    pub max_tuples: u128,
    /// False when the bounds already rule out reaching the target.
    pub occurrence_target_reachable: bool,
}

/// Bound a design over `candidates` images when `excluded_pairs` pairs among them are already used.
pub fn estimate_design_capacity(
    candidates: u128,
    tuple_size: u128,
    min_occurrences: u128,
    excluded_pairs: u128,
) -> DesignCapacity {
    let mut capacity = DesignCapacity {
        candidates,
        tuple_size,
        min_occurrences,
        ..DesignCapacity::default()
    };
    if tuple_size < 2 || candidates < tuple_size {
        return capacity;
    }

    capacity.pairs_per_tuple = pairs_in(tuple_size);
    capacity.available_pairs = pairs_in(candidates).saturating_sub(excluded_pairs);
    capacity.max_occurrences_per_image = (candidates - 1) / (tuple_size - 1);
    capacity.min_tuples = candidates
        .saturating_mul(min_occurrences)
        .div_ceil(tuple_size);
    capacity.max_tuples = capacity.available_pairs / capacity.pairs_per_tuple;
    capacity.occurrence_target_reachable = min_occurrences <= capacity.max_occurrences_per_image
        && capacity.min_tuples <= capacity.max_tuples;
    capacity
}

/// Trials a worker sees when each design tuple is shown once per enabled category.
pub fn trials_for_design(tuples: u128, keep_blocks: usize, reject_blocks: usize) -> u128 {
    let categories = u128::from(keep_blocks > 0) + u128::from(reject_blocks > 0);
    tuples.saturating_mul(categories)
}

fn pairs_in(size: u128) -> u128 {
    size.saturating_mul(size.saturating_sub(1)) / 2
}

/// Render `value` with a comma between every group of three digits.
pub fn format_u128_with_commas(value: u128) -> String {
    let raw = value.to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    grouped_reversed.chars().rev().collect()
}

/// Share of `available_pairs` a design consumes, as a percentage with two
/// decimals; `n/a` when no pairs are available.
pub fn format_pair_utilization(used_pairs: u128, available_pairs: u128) -> String {
    if available_pairs == 0 {
        return "n/a".to_string();
    }
    let share = used_pairs as f64 / available_pairs as f64 * 100.0;
    format!("{share:.2}%")
}
