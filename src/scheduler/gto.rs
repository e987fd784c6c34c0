use super::{ordering, Selection};
use crate::warp::{self, WarpMask, MAX_WARPS_PER_CORE};
use smallvec::SmallVec;

/// Greedy-then-oldest warp scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    ordering: ordering::Ordering,
    last_issued_warp: Option<usize>,
}

impl Scheduler {
    #[must_use]
    pub fn new(ordering: ordering::Ordering) -> Self {
        Self {
            ordering,
            last_issued_warp: None,
        }
    }

    /// Eligible warps in priority order.
    #[must_use]
    pub fn prioritized_warps(
        &self,
        warps: &warp::Contexts,
        stalled: &WarpMask,
    ) -> SmallVec<[usize; MAX_WARPS_PER_CORE]> {
        let mut eligible: SmallVec<[(usize, &warp::Context); MAX_WARPS_PER_CORE]> = warps
            .iter()
            .enumerate()
            .filter(|(warp_id, warp)| super::is_eligible(warp, stalled[*warp_id]))
            .collect();

        ordering::order_by_priority(
            &mut eligible,
            self.ordering,
            self.last_issued_warp,
            ordering::sort_warps_by_oldest,
        );
        eligible.into_iter().map(|(warp_id, _)| warp_id).collect()
    }
}

impl super::Scheduler for Scheduler {
    fn select(&self, warps: &warp::Contexts, stalled: &WarpMask) -> Selection {
        if warps.all_done() {
            return Selection {
                warp_id: None,
                all_done: true,
            };
        }
        let prioritized = self.prioritized_warps(warps, stalled);
        log::trace!(
            "gto scheduler: greedy={:?} prioritized warp ids: {:?}",
            self.last_issued_warp,
            prioritized
        );
        Selection {
            warp_id: prioritized.first().copied(),
            all_done: false,
        }
    }

    fn issued(&mut self, warps: &mut warp::Contexts, warp_id: usize) {
        self.last_issued_warp = Some(warp_id);
        warps.bump_age(warp_id);
    }

    fn last_issued(&self) -> Option<usize> {
        self.last_issued_warp
    }

    fn reset(&mut self) {
        self.last_issued_warp = None;
    }
}
