//! Cold-start handling for users without click history.
//!
//! Blends four contextual popularity slices so that no single context
//! dimension dominates, then backfills from global popularity:
//!
//! | slice                 | share |
//! |-----------------------|-------|
//! | OS global             | 2/10  |
//! | device global         | 2/10  |
//! | OS + country          | 3/10  |
//! | device + country      | rest  |

use crate::artifacts::SegmentTables;
use crate::error::{AppError, Result};
use crate::models::{ItemId, RequestContext};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub trait ColdStartHandler: Send + Sync {
    /// Exactly `min(k, available)` unique items for an anonymous context.
    fn recommend(&self, context: &RequestContext, k: usize) -> Result<Vec<ItemId>>;
    fn name(&self) -> &'static str;
}

/// Per-slice targets for a request of size `k`. Always sums to `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaAllocation {
    pub os_global: usize,
    pub device_global: usize,
    pub os_regional: usize,
    pub device_regional: usize,
}

impl QuotaAllocation {
    pub fn for_k(k: usize) -> Self {
        let global_share = k * 2 / 10;
        let regional_share = k * 3 / 10;

        Self {
            os_global: global_share,
            device_global: global_share,
            os_regional: regional_share,
            device_regional: k - 2 * global_share - regional_share,
        }
    }

    pub fn total(&self) -> usize {
        self.os_global + self.device_global + self.os_regional + self.device_regional
    }
}

/// Context-aware popularity for cold-start users.
pub struct ContextualPopularity {
    segments: Option<SegmentTables>,
    global: Option<Arc<Vec<ItemId>>>,
}

impl ContextualPopularity {
    pub fn new(segments: Option<SegmentTables>, global: Option<Arc<Vec<ItemId>>>) -> Self {
        Self { segments, global }
    }

    /// Global-popularity-only handler, used when no segment tables exist.
    pub fn global_only(global: Arc<Vec<ItemId>>) -> Self {
        Self::new(None, Some(global))
    }

    pub fn has_segments(&self) -> bool {
        self.segments.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Appends up to `quota` unseen items from `items`, in order.
fn extend_from(
    items: Option<&[ItemId]>,
    quota: usize,
    selected: &mut Vec<ItemId>,
    seen: &mut HashSet<ItemId>,
) -> usize {
    let Some(items) = items else {
        return 0;
    };

    let mut added = 0;
    for &item in items {
        if added >= quota {
            break;
        }
        if seen.insert(item) {
            selected.push(item);
            added += 1;
        }
    }
    added
}

impl ColdStartHandler for ContextualPopularity {
    fn recommend(&self, context: &RequestContext, k: usize) -> Result<Vec<ItemId>> {
        let global = self.global.as_deref().filter(|items| !items.is_empty());
        if !self.has_segments() && global.is_none() {
            return Err(AppError::ColdStart(
                "No popularity tables loaded".to_string(),
            ));
        }

        let device = context.device_or_unknown();
        let os = context.os_or_unknown();
        let country = context.country_code();

        let allocation = QuotaAllocation::for_k(k);
        let mut selected = Vec::with_capacity(k);
        let mut seen = HashSet::with_capacity(k);

        if let Some(segments) = &self.segments {
            extend_from(segments.os(os), allocation.os_global, &mut selected, &mut seen);
            extend_from(
                segments.device(device),
                allocation.device_global,
                &mut selected,
                &mut seen,
            );
            extend_from(
                segments.os_region(os, &country),
                allocation.os_regional,
                &mut selected,
                &mut seen,
            );
            extend_from(
                segments.device_region(device, &country),
                allocation.device_regional,
                &mut selected,
                &mut seen,
            );
        }

        let from_context = selected.len();

        if selected.len() < k {
            let remaining = k - selected.len();
            extend_from(
                global.map(Vec::as_slice),
                remaining,
                &mut selected,
                &mut seen,
            );
        }

        debug!(
            k,
            device,
            os,
            country = %country,
            from_context,
            from_global = selected.len() - from_context,
            "Cold-start blend complete"
        );

        Ok(selected)
    }

    fn name(&self) -> &'static str {
        "contextual_popularity"
    }
}
