//! Pipeline stages and the latches between them.
//!
//! Every latch carries the warp identity of the instruction it holds, so one
//! pipeline is shared by all warps of the core.

pub mod decode;
pub mod execute;
pub mod fetch;
pub mod memory;
pub mod writeback;

use crate::forwarding::Producer;
use crate::instruction::DecodedInstruction;
use crate::mem;
use crate::warp::{ActiveMask, Lanes};
use serde::Serialize;

/// IF/ID latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub warp_id: usize,
    pub pc: u32,
    pub raw: u32,
    /// The instruction memory returned a word for this pc.
    pub valid: bool,
    pub active_mask: ActiveMask,
}

/// ID/EX latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub instr: DecodedInstruction,
    pub operands: [Lanes; 3],
}

/// EX/MEM latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub instr: DecodedInstruction,
    /// Lanes the instruction executed for.
    pub mask: ActiveMask,
    pub result: Lanes,
    pub access: Option<mem::Request>,
    /// Last instruction of the warp.
    pub terminal: bool,
}

/// MEM/WB latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub instr: DecodedInstruction,
    pub mask: ActiveMask,
    pub result: Lanes,
    pub terminal: bool,
}

impl Executed {
    /// Result forwarded out of execute.
    ///
    /// Loads have no value before the memory stage.
    #[must_use]
    pub fn producer(&self) -> Option<Producer<'_>> {
        if self.instr.is_load() {
            return None;
        }
        producer(&self.instr, self.mask, &self.result)
    }
}

impl Completed {
    #[must_use]
    pub fn producer(&self) -> Option<Producer<'_>> {
        producer(&self.instr, self.mask, &self.result)
    }
}

fn producer<'a>(
    instr: &DecodedInstruction,
    mask: ActiveMask,
    values: &'a Lanes,
) -> Option<Producer<'a>> {
    let reg = instr.dest()?;
    Some(Producer {
        warp_id: instr.warp_id,
        reg,
        mask,
        values,
    })
}

/// Reason the pipeline did not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::AsRefStr)]
pub enum Stall {
    /// Memory stage waits for the data memory.
    Memory,
    /// Execute waits for a multi-cycle FPU operation.
    Fpu,
    /// Decode waits for a load still in execute.
    LoadUse,
}
