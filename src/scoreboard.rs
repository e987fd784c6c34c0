use crate::register_file::NUM_REGISTERS;
use serde::Serialize;

/// Pipeline stage currently holding a register's producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::AsRefStr)]
pub enum Stage {
    EX,
    MEM,
    WB,
}

impl Stage {
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::EX => Some(Self::MEM),
            Self::MEM => Some(Self::WB),
            Self::WB => None,
        }
    }
}

/// A pending register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub stage: Stage,
    pub is_load: bool,
    /// Unique id of the producing instruction.
    pub uid: u64,
}

/// Result of a hazard check for one source register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Hazard {
    pub hazard: bool,
    pub fwd_valid: bool,
    pub fwd_stage: Option<Stage>,
    pub load_use: bool,
}

/// Scoreboard access.
///
/// The scoreboard keeps track of registers with in-flight writers for every warp of the core.
pub trait Access {
    /// Check a source register for a RAW hazard.
    #[must_use]
    fn check(&self, warp_id: usize, reg: u32) -> Hazard;

    /// Any of the source registers is produced by a load still in execute.
    #[must_use]
    fn load_use(&self, warp_id: usize, sources: &[u32]) -> bool {
        sources.iter().any(|&reg| self.check(warp_id, reg).load_use)
    }

    /// Get all registers with pending writes for a warp.
    #[must_use]
    fn pending_writes(&self, warp_id: usize) -> Vec<u32>;

    /// Reserve the destination register of an instruction entering execute.
    fn reserve(&mut self, warp_id: usize, reg: u32, is_load: bool, uid: u64);

    /// Move the entry one stage down if it is still owned by `uid` in stage `from`.
    fn advance(&mut self, warp_id: usize, reg: u32, from: Stage, uid: u64);

    /// Release the entry after writeback if it is owned by `uid` in stage WB.
    fn release(&mut self, warp_id: usize, reg: u32, uid: u64);

    /// Drop every pending entry of a warp.
    fn flush_warp(&mut self, warp_id: usize);
}

/// Scoreboard implementation
#[derive(Debug, Clone)]
pub struct Scoreboard {
    warp_registers: Box<[[Option<Entry>; NUM_REGISTERS]]>,
}

impl Scoreboard {
    #[must_use]
    pub fn new(num_warps: usize) -> Self {
        Self {
            warp_registers: vec![[None; NUM_REGISTERS]; num_warps].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn entry(&self, warp_id: usize, reg: u32) -> Option<&Entry> {
        self.warp_registers
            .get(warp_id)
            .and_then(|regs| regs.get(reg as usize))
            .and_then(Option::as_ref)
    }

    pub fn clear(&mut self) {
        for regs in self.warp_registers.iter_mut() {
            *regs = [None; NUM_REGISTERS];
        }
    }
}

impl Access for Scoreboard {
    fn check(&self, warp_id: usize, reg: u32) -> Hazard {
        if reg == 0 {
            return Hazard::default();
        }
        let Some(entry) = self.entry(warp_id, reg) else {
            return Hazard::default();
        };
        // loads have no value before the memory stage
        let load_use = entry.is_load && entry.stage == Stage::EX;
        Hazard {
            hazard: true,
            fwd_valid: !load_use,
            fwd_stage: Some(entry.stage),
            load_use,
        }
    }

    fn pending_writes(&self, warp_id: usize) -> Vec<u32> {
        self.warp_registers[warp_id]
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(reg, _)| reg as u32)
            .collect()
    }

    fn reserve(&mut self, warp_id: usize, reg: u32, is_load: bool, uid: u64) {
        if reg == 0 {
            return;
        }
        let slot = &mut self.warp_registers[warp_id][reg as usize];
        if let Some(older) = slot {
            assert_ne!(
                older.uid, uid,
                "instruction {uid} reserved register {reg} of warp {warp_id} twice"
            );
            log::trace!(
                "scoreboard: warp {} register {} overwritten by {} (was {} in {:?})",
                warp_id,
                reg,
                uid,
                older.uid,
                older.stage
            );
        } else {
            log::trace!("scoreboard: warp {} reserves register: {}", warp_id, reg);
        }
        *slot = Some(Entry {
            stage: Stage::EX,
            is_load,
            uid,
        });
    }

    fn advance(&mut self, warp_id: usize, reg: u32, from: Stage, uid: u64) {
        if reg == 0 {
            return;
        }
        let Some(entry) = &mut self.warp_registers[warp_id][reg as usize] else {
            return;
        };
        if entry.uid != uid || entry.stage != from {
            return;
        }
        if let Some(next) = from.next() {
            entry.stage = next;
        }
    }

    fn release(&mut self, warp_id: usize, reg: u32, uid: u64) {
        if reg == 0 {
            return;
        }
        let slot = &mut self.warp_registers[warp_id][reg as usize];
        if slot.is_some_and(|entry| entry.uid == uid && entry.stage == Stage::WB) {
            log::trace!("scoreboard: warp {} releases register: {}", warp_id, reg);
            *slot = None;
        }
    }

    fn flush_warp(&mut self, warp_id: usize) {
        log::trace!(
            "scoreboard: flush warp {} (pending {:?})",
            warp_id,
            self.pending_writes(warp_id)
        );
        self.warp_registers[warp_id] = [None; NUM_REGISTERS];
    }
}
