use bitvec::{array::BitArray, BitArr};
use serde::Serialize;

/// Warp size.
///
/// Number of threads per warp.
pub const WARP_SIZE: usize = 32;

/// Maximum number of warp slots a core can hold.
pub const MAX_WARPS_PER_CORE: usize = 32;

/// Thread active mask.
///
/// Bitmask where a 1 at position i means that thread i is active for the current instruction.
pub type ActiveMask = BitArr!(for WARP_SIZE, in u32);

/// Warp mask.
///
/// Bitmask where a 1 at position i means that warp i is part of the set.
pub type WarpMask = BitArr!(for MAX_WARPS_PER_CORE, in u32);

/// One 32-bit value per lane.
pub type Lanes = [u32; WARP_SIZE];

#[must_use]
pub fn mask_from_bits(bits: u32) -> ActiveMask {
    BitArray::new([bits])
}

#[must_use]
pub fn mask_bits(mask: &ActiveMask) -> u32 {
    mask.data[0]
}

#[must_use]
pub fn warp_mask_from_bits(bits: u32) -> WarpMask {
    BitArray::new([bits])
}

#[must_use]
pub fn warp_mask_bits(mask: &WarpMask) -> u32 {
    mask.data[0]
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::AsRefStr, strum::Display,
)]
pub enum Status {
    /// Slot not launched.
    #[default]
    Idle,
    /// Eligible for scheduling.
    Ready,
    /// The fetch unit holds an outstanding instruction request for the warp.
    Running,
    /// Terminal return is draining through the back end.
    Waiting,
    /// Waiting at a block barrier.
    Blocked,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Next fetch PC.
    pub pc: u32,
    pub active_mask: ActiveMask,
    pub status: Status,
    pub age: u8,
    pub valid: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            pc: 0,
            active_mask: BitArray::ZERO,
            status: Status::Idle,
            age: 0,
            valid: false,
        }
    }
}

impl Context {
    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.valid || self.status == Status::Done
    }
}

/// Warp context store.
///
/// Holds the per-warp architectural control state, indexed by warp id.
#[derive(Debug, Clone)]
pub struct Contexts {
    warps: Box<[Context]>,
}

impl Contexts {
    #[must_use]
    pub fn new(num_warps: usize) -> Self {
        assert!(
            num_warps <= MAX_WARPS_PER_CORE,
            "at most {MAX_WARPS_PER_CORE} warps per core (got {num_warps})"
        );
        Self {
            warps: vec![Context::default(); num_warps].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.warps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warps.is_empty()
    }

    #[must_use]
    pub fn get(&self, warp_id: usize) -> &Context {
        &self.warps[warp_id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> + '_ {
        self.warps.iter()
    }

    /// Launch a warp.
    pub fn init(&mut self, warp_id: usize, pc: u32, active_mask: ActiveMask) {
        let warp = &mut self.warps[warp_id];
        *warp = Context {
            pc,
            active_mask,
            status: Status::Ready,
            age: 0,
            valid: true,
        };
        if active_mask.not_any() {
            warp.status = Status::Done;
        }
    }

    /// Return a warp slot to the unlaunched state.
    pub fn reset(&mut self, warp_id: usize) {
        self.warps[warp_id] = Context::default();
    }

    pub fn set_pc(&mut self, warp_id: usize, pc: u32) {
        self.warps[warp_id].pc = pc;
    }

    /// Replace the active mask.
    ///
    /// An empty mask retires the warp.
    pub fn set_mask(&mut self, warp_id: usize, active_mask: ActiveMask) {
        let warp = &mut self.warps[warp_id];
        warp.active_mask = active_mask;
        if active_mask.not_any() {
            warp.status = Status::Done;
        }
    }

    pub fn set_status(&mut self, warp_id: usize, status: Status) {
        let warp = &mut self.warps[warp_id];
        if warp.active_mask.not_any() && warp.valid {
            // an empty mask pins the warp to done
            warp.status = Status::Done;
            return;
        }
        warp.status = status;
    }

    pub fn set_age(&mut self, warp_id: usize, age: u8) {
        self.warps[warp_id].age = age;
    }

    /// Age every other ready warp and reset the issued warp's age.
    pub fn bump_age(&mut self, issued_warp_id: usize) {
        for (warp_id, warp) in self.warps.iter_mut().enumerate() {
            if warp_id == issued_warp_id {
                warp.age = 0;
            } else if warp.status == Status::Ready {
                warp.age = warp.age.saturating_add(1);
            }
        }
    }

    /// All warps are either done or were never launched.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.warps.iter().all(Context::is_done)
    }

    /// Launched warps that have not yet finished.
    #[must_use]
    pub fn active_warps(&self) -> WarpMask {
        let mut mask = WarpMask::ZERO;
        for (warp_id, warp) in self.warps.iter().enumerate() {
            mask.set(warp_id, !warp.is_done());
        }
        mask
    }
}
