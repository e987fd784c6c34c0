use crate::warp::WarpMask;
use bitvec::array::BitArray;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, strum::AsRefStr)]
pub enum Kind {
    /// Block-wide rendezvous on a named barrier.
    Sync,
    /// Warp-level sync, no block-wide rendezvous.
    Warp,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("barrier id {bar_id} out of range (core has {num_barriers} barriers)")]
pub struct InvalidBarrier {
    pub bar_id: usize,
    pub num_barriers: usize,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone)]
pub struct BarrierSet {
    num_barriers: usize,
    bar_id_to_warps: Box<[WarpMask]>,
    active_warps: WarpMask,
    warps_at_barrier: WarpMask,
    pub num_releases: u64,
}

impl BarrierSet {
    #[must_use]
    pub fn new(num_barriers: usize) -> Self {
        Self {
            num_barriers,
            active_warps: BitArray::ZERO,
            warps_at_barrier: BitArray::ZERO,
            bar_id_to_warps: vec![BitArray::ZERO; num_barriers].into_boxed_slice(),
            num_releases: 0,
        }
    }

    /// Start tracking a new set of launched warps.
    pub fn launch(&mut self, warps: WarpMask) {
        self.active_warps = warps;
        self.warps_at_barrier = BitArray::ZERO;
        self.bar_id_to_warps.fill(BitArray::ZERO);
    }

    #[must_use]
    pub fn active_warps(&self) -> WarpMask {
        self.active_warps
    }

    #[must_use]
    pub fn arrived(&self, bar_id: usize) -> Option<WarpMask> {
        self.bar_id_to_warps.get(bar_id).copied()
    }

    /// Check whether warp is waiting for barrier
    #[must_use]
    pub fn is_waiting_at_barrier(&self, warp_id: usize) -> bool {
        self.warps_at_barrier[warp_id]
    }

    fn release(&mut self, bar_id: usize) -> Option<WarpMask> {
        let at_barrier = self.bar_id_to_warps[bar_id];
        let missing = self.active_warps & !at_barrier;
        if at_barrier.not_any() || missing.any() {
            return None;
        }
        // all warps have reached barrier, so release waiting warps
        self.bar_id_to_warps[bar_id] = BitArray::ZERO;
        self.warps_at_barrier &= !at_barrier;
        self.num_releases += 1;
        log::debug!(
            "barrier {}: released warps {:?}",
            bar_id,
            at_barrier.iter_ones().collect::<Vec<_>>()
        );
        Some(at_barrier)
    }

    /// Warp hit a block barrier.
    ///
    /// Returns the set of warps to wake if this arrival completed the barrier.
    pub fn arrive(&mut self, bar_id: usize, warp_id: usize) -> Result<Option<WarpMask>, InvalidBarrier> {
        if bar_id >= self.num_barriers {
            return Err(InvalidBarrier {
                bar_id,
                num_barriers: self.num_barriers,
            });
        }
        debug_assert!(self.active_warps[warp_id], "warp {warp_id} is not active");
        self.bar_id_to_warps[bar_id].set(warp_id, true);
        self.warps_at_barrier.set(warp_id, true);
        Ok(self.release(bar_id))
    }

    /// Warp-level sync.
    ///
    /// Only the syncing warp is involved, so it is woken immediately.
    #[must_use]
    pub fn warp_sync(&self, warp_id: usize) -> WarpMask {
        let mut woken = WarpMask::ZERO;
        woken.set(warp_id, true);
        woken
    }

    /// Warp exited and can unblock barriers the remaining warps wait on.
    pub fn warp_exited(&mut self, warp_id: usize) -> WarpMask {
        self.active_warps.set(warp_id, false);
        self.warps_at_barrier.set(warp_id, false);

        let mut released = WarpMask::ZERO;
        for bar_id in 0..self.num_barriers {
            self.bar_id_to_warps[bar_id].set(warp_id, false);
            if let Some(warps) = self.release(bar_id) {
                released |= warps;
            }
        }
        released
    }
}
