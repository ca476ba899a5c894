//! Exposure-balancing image allocation over the active pool.
//!
//! Each visited image passes a coin flip with probability `count / active`.
//! For real tasks an image that wins the flip while still carrying positive
//! surplus credit is skipped and its credit decremented; images at or below
//! zero are taken. Credits strictly decrease, so the scan always terminates.

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::attributes::AttributeFilter;
use crate::constants::allocator::SCAN_PAGE_SIZE;
use crate::errors::DesignError;
use crate::store::{RecordStore, ScanCursor};
use crate::types::ImageId;

/// What to allocate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Number of distinct images wanted.
    pub count: usize,
    /// Candidate predicate over image attributes.
    pub filter: AttributeFilter,
    /// Practice allocations ignore surplus credit.
    pub practice: bool,
}

impl AllocationRequest {
    /// Request `count` images from the whole active pool.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Restrict the request to images matching `filter`.
    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Mark the request as a practice allocation.
    pub fn practice(mut self, practice: bool) -> Self {
        self.practice = practice;
        self
    }
}

/// Result of one allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Selected ids in acceptance order.
    pub images: Vec<ImageId>,
    /// Cursor to pass into the next allocation.
    pub cursor: ScanCursor,
    /// Coin-flip winners skipped because of positive surplus credit.
    pub throttled: usize,
    /// Total images visited by the scan (including revisits after wrap-around).
    pub visited: usize,
}

/// Select `request.count` distinct active images, resuming the scan at `cursor`.
pub fn allocate_images<S, R>(
    store: &S,
    request: &AllocationRequest,
    cursor: &ScanCursor,
    rng: &mut R,
) -> Result<Allocation, DesignError>
where
    S: RecordStore + ?Sized,
    R: Rng,
{
    if request.count == 0 {
        return Ok(Allocation {
            images: Vec::new(),
            cursor: cursor.clone(),
            throttled: 0,
            visited: 0,
        });
    }

    let mut available = store.count_active(&request.filter)?;
    if available < request.count {
        return Err(DesignError::InsufficientPool {
            requested: request.count,
            available,
        });
    }
    let probability = request.count as f64 / available as f64;

    let mut selected: IndexSet<ImageId> = IndexSet::with_capacity(request.count);
    let mut cursor = cursor.clone();
    let mut throttled = 0usize;
    let mut visited = 0usize;
    let mut next_recount = available;

    while selected.len() < request.count {
        let page = store.scan_active(&request.filter, &cursor, SCAN_PAGE_SIZE)?;
        if page.images.is_empty() {
            return Err(DesignError::store(format!(
                "store reported {available} active image(s) but the scan returned none"
            )));
        }
        for id in page.images {
            visited += 1;
            cursor = ScanCursor::after(id.as_str());
            if selected.contains(&id) || !rng.random_bool(probability) {
                continue;
            }
            if !request.practice {
                let surplus = store.get_surplus(&id)?;
                if surplus > 0 {
                    let remaining = store.decrement_surplus(&id)?;
                    trace!(image = %id, remaining, "throttled over-sampled image");
                    throttled += 1;
                    continue;
                }
            }
            selected.insert(id);
            if selected.len() == request.count {
                break;
            }
        }

        // The pool may shrink under a concurrent deactivation; re-check once per cycle.
        if selected.len() < request.count && visited >= next_recount {
            available = store.count_active(&request.filter)?;
            if available < request.count {
                return Err(DesignError::InsufficientPool {
                    requested: request.count,
                    available,
                });
            }
            next_recount = visited + available;
        }
    }

    debug!(
        requested = request.count,
        visited,
        throttled,
        practice = request.practice,
        "allocated images"
    );
    Ok(Allocation {
        images: selected.into_iter().collect(),
        cursor,
        throttled,
        visited,
    })
}
