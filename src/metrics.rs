use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ImageId;

/// Min/mean/max summary of per-image exposure counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExposureSummary {
    /// Images counted.
    pub images: usize,
    /// Sum of exposure counts.
    pub total: u64,
    /// Smallest count.
    pub min: u64,
    /// Largest count.
    pub max: u64,
    /// Mean count.
    pub mean: f64,
}

/// Summarize exposure counts. Returns `None` for an empty input.
pub fn exposure_summary<I>(counts: I) -> Option<ExposureSummary>
where
    I: IntoIterator<Item = u64>,
{
    let mut images = 0usize;
    let mut total = 0u64;
    let mut min = u64::MAX;
    let mut max = 0u64;
    for count in counts {
        images += 1;
        total = total.saturating_add(count);
        min = min.min(count);
        max = max.max(count);
    }
    if images == 0 {
        return None;
    }
    Some(ExposureSummary {
        images,
        total,
        min,
        max,
        mean: total as f64 / images as f64,
    })
}

/// Aggregate skew metrics for per-image selection counts.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionSkew {
    /// Total selections.
    pub total: usize,
    /// Distinct images selected.
    pub images: usize,
    /// Fewest selections of one image.
    pub min: usize,
    /// Most selections of one image.
    pub max: usize,
    /// Mean selections per image.
    pub mean: f64,
    /// Share of the most-selected image.
    pub max_share: f64,
    /// Share of the least-selected image.
    pub min_share: f64,
    /// `max / min`; infinite when some image has zero selections.
    pub ratio: f64,
    /// Per-image breakdown, most selected first.
    pub per_image: Vec<ImageShare>,
}

/// Per-image share of all selections.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageShare {
    /// Image id.
    pub image: ImageId,
    /// Selections of this image.
    pub count: usize,
    /// Fraction of all selections.
    pub share: f64,
}

/// Compute skew metrics from per-image selection counts.
pub fn selection_skew(counts: &HashMap<ImageId, usize>) -> Option<SelectionSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let images = counts.len();
    let share = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_image: Vec<ImageShare> = counts
        .iter()
        .map(|(image, count)| ImageShare {
            image: image.clone(),
            count: *count,
            share: share(*count),
        })
        .collect();
    per_image.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.image.cmp(&b.image)));
    Some(SelectionSkew {
        total,
        images,
        min,
        max,
        mean: total as f64 / images as f64,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_image,
    })
}
