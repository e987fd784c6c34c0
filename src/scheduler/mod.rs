pub mod gto;
pub mod ordering;

use crate::{config, warp};

/// Outcome of one scheduling decision.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub warp_id: Option<usize>,
    /// Every warp is done or was never launched.
    pub all_done: bool,
}

pub trait Scheduler: Send + Sync + std::fmt::Debug + 'static {
    /// Select the warp to fetch for this cycle.
    ///
    /// `stalled` marks warps that must not be selected even though they are ready.
    #[must_use]
    fn select(&self, warps: &warp::Contexts, stalled: &warp::WarpMask) -> Selection;

    /// The fetch unit accepted the selected warp.
    fn issued(&mut self, warps: &mut warp::Contexts, warp_id: usize);

    #[must_use]
    fn last_issued(&self) -> Option<usize>;

    fn reset(&mut self);
}

/// A warp can be selected only if it is launched, ready and not stalled.
#[must_use]
pub fn is_eligible(warp: &warp::Context, stalled: bool) -> bool {
    warp.valid && warp.status == warp::Status::Ready && !stalled
}

#[must_use]
pub fn from_config(config: &config::Core) -> Box<dyn Scheduler> {
    let ordering = match config.scheduler {
        config::SchedulerKind::GTO => ordering::Ordering::GREEDY_THEN_PRIORITY_FUNC,
        config::SchedulerKind::OLDEST => ordering::Ordering::PRIORITY_FUNC_ONLY,
    };
    Box::new(gto::Scheduler::new(ordering))
}

#[cfg(test)]
mod tests {
    use super::{gto, ordering::Ordering, Scheduler, Selection};
    use crate::warp::{mask_from_bits, warp_mask_from_bits, Contexts, Status, WarpMask};

    fn ready_warps(ages: &[u8]) -> Contexts {
        let mut warps = Contexts::new(ages.len());
        for (warp_id, age) in ages.iter().enumerate() {
            warps.init(warp_id, 0, mask_from_bits(u32::MAX));
            warps.set_age(warp_id, *age);
        }
        warps
    }

    #[test]
    fn test_selects_oldest_ready_warp() {
        let mut warps = ready_warps(&[5, 10, 3, 7]);
        let mut scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        let selection = scheduler.select(&warps, &WarpMask::ZERO);
        assert_eq!(selection.warp_id, Some(1));

        // warp 1 is fetching, the ready warps keep aging
        warps.set_status(1, Status::Running);
        scheduler.issued(&mut warps, 1);
        let ages: Vec<u8> = warps.iter().map(|warp| warp.age).collect();
        assert_eq!(ages, vec![6, 0, 4, 8]);
        assert_eq!(scheduler.last_issued(), Some(1));

        // a blocked warp does not age
        warps.set_status(3, Status::Blocked);
        scheduler.issued(&mut warps, 1);
        let ages: Vec<u8> = warps.iter().map(|warp| warp.age).collect();
        assert_eq!(ages, vec![7, 0, 5, 8]);
    }

    #[test]
    fn test_greedy_reselects_last_issued_warp() {
        let mut warps = ready_warps(&[5, 10, 3, 7]);
        let mut scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        scheduler.issued(&mut warps, 1);
        assert_eq!(warps.get(1).age, 0);
        assert_eq!(scheduler.select(&warps, &WarpMask::ZERO).warp_id, Some(1));

        // without greed the oldest wins
        let mut oldest = gto::Scheduler::new(Ordering::PRIORITY_FUNC_ONLY);
        oldest.issued(&mut warps, 1);
        assert_eq!(oldest.select(&warps, &WarpMask::ZERO).warp_id, Some(3));
    }

    #[test]
    fn test_ties_break_on_lowest_warp_id() {
        let warps = ready_warps(&[4, 9, 9, 1]);
        let scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        assert_eq!(scheduler.select(&warps, &WarpMask::ZERO).warp_id, Some(1));
        assert_eq!(
            scheduler.prioritized_warps(&warps, &WarpMask::ZERO).as_slice(),
            &[1, 2, 0, 3]
        );
    }

    #[test]
    fn test_never_selects_stalled_or_not_ready_warps() {
        let mut warps = ready_warps(&[1, 2, 3, 4]);
        let mut scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        warps.set_status(3, Status::Blocked);
        warps.set_status(2, Status::Running);
        let stalled = warp_mask_from_bits(0b0010);
        assert_eq!(scheduler.select(&warps, &stalled).warp_id, Some(0));

        // greedy warp is skipped while it is stalled
        scheduler.issued(&mut warps, 0);
        assert_eq!(scheduler.select(&warps, &warp_mask_from_bits(0b0001)).warp_id, Some(1));

        let all_stalled = warp_mask_from_bits(0b0011);
        assert_eq!(
            scheduler.select(&warps, &all_stalled),
            Selection {
                warp_id: None,
                all_done: false
            }
        );
    }

    #[test]
    fn test_all_done() {
        let mut warps = Contexts::new(3);
        warps.init(0, 0, mask_from_bits(1));
        let scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        assert!(!scheduler.select(&warps, &WarpMask::ZERO).all_done);
        warps.set_mask(0, mask_from_bits(0));
        assert_eq!(
            scheduler.select(&warps, &WarpMask::ZERO),
            Selection {
                warp_id: None,
                all_done: true
            }
        );
    }

    #[test]
    fn test_no_starvation_when_greedy_warp_stalls_periodically() {
        let num_warps = 4;
        let mut warps = ready_warps(&[0; 4]);
        let mut scheduler = gto::Scheduler::new(Ordering::GREEDY_THEN_PRIORITY_FUNC);
        let mut visited = [0; 4];
        let mut stalled = WarpMask::ZERO;
        let mut streak = 0;

        for _ in 0..64 {
            let selection = scheduler.select(&warps, &stalled);
            stalled = WarpMask::ZERO;
            let Some(warp_id) = selection.warp_id else {
                continue;
            };
            visited[warp_id] += 1;
            if scheduler.last_issued() == Some(warp_id) {
                streak += 1;
            } else {
                streak = 1;
            }
            scheduler.issued(&mut warps, warp_id);
            // e.g. a taken branch redirect after three instructions
            if streak == 3 {
                stalled.set(warp_id, true);
            }
        }
        assert!(
            visited.iter().all(|&count| count > 0),
            "every one of {num_warps} warps issues: {visited:?}"
        );
    }
}
