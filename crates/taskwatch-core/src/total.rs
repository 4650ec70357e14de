//! Canonical total derivation across tracked tabs.
//!
//! Precedence, not summation:
//! 1. any task-detail tab present: the maximum detail count wins;
//! 2. otherwise listing tabs: max per canonical listing URL, summed across
//!    distinct listing URLs;
//! 3. otherwise the sum of any remaining (unclassified) tabs.

use std::collections::BTreeMap;

use crate::canonical::{Canonicalizer, PageKind};
use crate::types::{TabId, TabRecord};

/// Intermediate partition of the tab set, useful for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TotalBreakdown {
    /// Canonical listing URL -> highest count reported by any tab on it.
    pub listing_groups: BTreeMap<String, u32>,
    /// Highest count among detail tabs, `None` if there are none.
    pub detail_max: Option<u32>,
    /// Sum of tabs that classify as neither listing nor detail.
    pub fallback_sum: u32,
}

impl TotalBreakdown {
    pub fn total(&self) -> u32 {
        if let Some(max) = self.detail_max {
            return max;
        }
        if !self.listing_groups.is_empty() {
            return self
                .listing_groups
                .values()
                .fold(0u32, |acc, c| acc.saturating_add(*c));
        }
        self.fallback_sum
    }
}

pub fn breakdown(tabs: &BTreeMap<TabId, TabRecord>, canon: &Canonicalizer) -> TotalBreakdown {
    let mut out = TotalBreakdown::default();
    for record in tabs.values() {
        let location = canon.classify(&record.origin);
        match location.kind {
            PageKind::TaskDetail => {
                out.detail_max = Some(out.detail_max.map_or(record.count, |m| m.max(record.count)));
            }
            PageKind::Listing => {
                let slot = out.listing_groups.entry(location.canonical).or_insert(0);
                *slot = (*slot).max(record.count);
            }
            // Unreachable while records are evicted on non-qualifying URLs,
            // kept so a stray record is counted once rather than dropped.
            PageKind::Other => {
                out.fallback_sum = out.fallback_sum.saturating_add(record.count);
            }
        }
    }
    out
}

/// Canonical aggregate count for a tab set.
pub fn derive_total(tabs: &BTreeMap<TabId, TabRecord>, canon: &Canonicalizer) -> u32 {
    breakdown(tabs, canon).total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::RouteConfig;

    const LIST_ALL: &str = "https://chatgpt.com/codex";
    const LIST_PLAN: &str = "https://chatgpt.com/plan";
    const DETAIL_A: &str = "https://chatgpt.com/codex/tasks/a";
    const DETAIL_B: &str = "https://chatgpt.com/codex/tasks/b";

    fn tabs(entries: &[(TabId, &str, u32)]) -> BTreeMap<TabId, TabRecord> {
        entries
            .iter()
            .map(|(id, origin, count)| {
                let mut record = TabRecord::empty(origin, "", 0);
                record.count = *count;
                (*id, record)
            })
            .collect()
    }

    fn canon() -> Canonicalizer {
        Canonicalizer::new(&RouteConfig::default())
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(derive_total(&BTreeMap::new(), &canon()), 0);
    }

    #[test]
    fn same_listing_view_takes_max() {
        let t = tabs(&[(1, LIST_ALL, 2), (2, "https://chatgpt.com/codex/", 5)]);
        assert_eq!(derive_total(&t, &canon()), 5);
    }

    #[test]
    fn distinct_listing_views_are_additive() {
        let t = tabs(&[(1, LIST_ALL, 2), (2, LIST_PLAN, 3)]);
        assert_eq!(derive_total(&t, &canon()), 5);
    }

    #[test]
    fn detail_takes_precedence_over_listings() {
        let t = tabs(&[(1, LIST_ALL, 1), (2, LIST_PLAN, 1), (3, DETAIL_A, 5)]);
        assert_eq!(derive_total(&t, &canon()), 5);
    }

    #[test]
    fn detail_tabs_take_max_not_sum() {
        let t = tabs(&[(1, DETAIL_A, 1), (2, DETAIL_B, 3)]);
        assert_eq!(derive_total(&t, &canon()), 3);
    }

    #[test]
    fn idle_detail_masks_busy_listing() {
        let t = tabs(&[(1, LIST_ALL, 4), (2, DETAIL_A, 0)]);
        assert_eq!(derive_total(&t, &canon()), 0);
    }

    #[test]
    fn fallback_tabs_are_summed_when_nothing_else_exists() {
        let t = tabs(&[(1, "https://chatgpt.com/", 2), (2, "garbage", 1)]);
        let b = breakdown(&t, &canon());
        assert_eq!(b.fallback_sum, 3);
        assert_eq!(b.total(), 3);
    }

    #[test]
    fn fallback_is_ignored_when_listing_exists() {
        let t = tabs(&[(1, "https://chatgpt.com/", 2), (2, LIST_ALL, 1)]);
        assert_eq!(derive_total(&t, &canon()), 1);
    }

    #[test]
    fn derivation_is_pure() {
        let t = tabs(&[(1, LIST_ALL, 2), (2, LIST_PLAN, 3), (3, LIST_ALL, 4)]);
        let c = canon();
        assert_eq!(derive_total(&t, &c), derive_total(&t, &c));
        assert_eq!(derive_total(&t, &c), 7);
    }
}
