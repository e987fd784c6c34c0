use crate::warp::{ActiveMask, Lanes, WARP_SIZE};

/// Number of general purpose registers per thread.
pub const NUM_REGISTERS: usize = 32;

/// Registers seeded at warp launch.
pub mod special {
    pub const THREAD_IDX: u32 = 1;
    pub const BLOCK_IDX: u32 = 2;
    pub const BLOCK_DIM: u32 = 3;
    pub const GRID_DIM: u32 = 4;
    pub const WARP_IDX: u32 = 5;
    pub const LANE_IDX: u32 = 6;
}

/// Launch parameters seeded into the special registers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub thread_base: u32,
    pub block_idx: u32,
    pub block_dim: u32,
    pub grid_dim: u32,
}

/// Per-warp register file.
///
/// 32 registers of 32 lanes each, register 0 reads as zero.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    warps: Box<[[Lanes; NUM_REGISTERS]]>,
}

impl RegisterFile {
    #[must_use]
    pub fn new(num_warps: usize) -> Self {
        Self {
            warps: vec![[[0; WARP_SIZE]; NUM_REGISTERS]; num_warps].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn read(&self, warp_id: usize, reg: u32) -> Lanes {
        if reg == 0 {
            return [0; WARP_SIZE];
        }
        self.warps[warp_id][reg as usize]
    }

    /// Read the three source ports of an instruction.
    #[must_use]
    pub fn read_ports(&self, warp_id: usize, regs: [u32; 3]) -> [Lanes; 3] {
        regs.map(|reg| self.read(warp_id, reg))
    }

    /// Masked write port.
    pub fn write(&mut self, warp_id: usize, reg: u32, mask: &ActiveMask, values: &Lanes) {
        if reg == 0 {
            return;
        }
        let target = &mut self.warps[warp_id][reg as usize];
        for lane in mask.iter_ones() {
            target[lane] = values[lane];
        }
    }

    pub fn reset(&mut self, warp_id: usize) {
        self.warps[warp_id] = [[0; WARP_SIZE]; NUM_REGISTERS];
    }

    /// Clear the warp and seed the special registers.
    pub fn seed(&mut self, warp_id: usize, seed: &Seed) {
        self.reset(warp_id);
        let regs = &mut self.warps[warp_id];
        for lane in 0..WARP_SIZE {
            let thread_in_block = (warp_id * WARP_SIZE + lane) as u32;
            regs[special::THREAD_IDX as usize][lane] = seed.thread_base.wrapping_add(thread_in_block);
            regs[special::BLOCK_IDX as usize][lane] = seed.block_idx;
            regs[special::BLOCK_DIM as usize][lane] = seed.block_dim;
            regs[special::GRID_DIM as usize][lane] = seed.grid_dim;
            regs[special::WARP_IDX as usize][lane] = warp_id as u32;
            regs[special::LANE_IDX as usize][lane] = lane as u32;
        }
    }
}
