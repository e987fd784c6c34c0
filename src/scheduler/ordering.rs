use crate::warp;

/// Oldest warp first.
///
/// Warps are ordered by decreasing age, ties are broken by the lower warp id.
pub fn sort_warps_by_oldest(
    lhs: &(usize, &warp::Context),
    rhs: &(usize, &warp::Context),
) -> std::cmp::Ordering {
    let (lhs_idx, lhs_warp) = lhs;
    let (rhs_idx, rhs_warp) = rhs;
    rhs_warp
        .age
        .cmp(&lhs_warp.age)
        .then_with(|| lhs_idx.cmp(rhs_idx))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ordering {
    // The item that issued last is prioritized first then the
    // sorted result of the priority_function
    GREEDY_THEN_PRIORITY_FUNC = 0,
    // No greedy scheduling based on last to issue.
    //
    // Only the priority function determines priority
    PRIORITY_FUNC_ONLY,
}

pub fn order_by_priority<F>(
    warps: &mut [(usize, &warp::Context)],
    ordering: Ordering,
    last_issued_warp: Option<usize>,
    priority_func: F,
) where
    F: FnMut(&(usize, &warp::Context), &(usize, &warp::Context)) -> std::cmp::Ordering,
{
    warps.sort_unstable_by(priority_func);

    match ordering {
        Ordering::GREEDY_THEN_PRIORITY_FUNC => {
            // move greedy warp to the start
            let Some(greedy_idx) = last_issued_warp else {
                return;
            };
            if let Some(sorted_greedy_idx) = warps.iter().position(|(idx, _)| *idx == greedy_idx)
            {
                warps[..=sorted_greedy_idx].rotate_right(1);
                log::trace!("added greedy warp: {}", greedy_idx);
            }
        }
        Ordering::PRIORITY_FUNC_ONLY => {}
    }
}
