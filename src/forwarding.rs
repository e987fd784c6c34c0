//! Operand bypass network.
//!
//! Decode reads its operands through this unit. A producer only supplies the
//! lanes that were active when it executed, every other lane falls through to
//! the next older producer and finally to the register file.

use crate::warp::{ActiveMask, Lanes};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::AsRefStr)]
pub enum Source {
    EX,
    MEM,
    WB,
    RegisterFile,
}

/// A register value leaving a pipeline stage this cycle.
#[derive(Debug, Clone, Copy)]
pub struct Producer<'a> {
    pub warp_id: usize,
    pub reg: u32,
    pub mask: ActiveMask,
    pub values: &'a Lanes,
}

impl<'a> Producer<'a> {
    fn supplies(&self, warp_id: usize, reg: u32) -> bool {
        reg != 0 && self.warp_id == warp_id && self.reg == reg
    }
}

/// Stage outputs in priority order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Producers<'a> {
    pub ex: Option<Producer<'a>>,
    pub mem: Option<Producer<'a>>,
    pub wb: Option<Producer<'a>>,
}

impl<'a> Producers<'a> {
    fn in_priority_order(&self) -> [(Source, Option<&Producer<'a>>); 3] {
        [
            (Source::EX, self.ex.as_ref()),
            (Source::MEM, self.mem.as_ref()),
            (Source::WB, self.wb.as_ref()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub values: Lanes,
    /// Highest priority source that supplied at least one lane.
    pub source: Source,
}

/// Resolve one source operand.
#[must_use]
pub fn resolve(
    warp_id: usize,
    reg: u32,
    producers: &Producers<'_>,
    register_file: &Lanes,
) -> Operand {
    let mut values = *register_file;
    let mut source = Source::RegisterFile;
    if reg == 0 {
        return Operand { values, source };
    }
    let mut resolved = ActiveMask::ZERO;

    for (stage, producer) in producers.in_priority_order() {
        let Some(producer) = producer else {
            continue;
        };
        if !producer.supplies(warp_id, reg) {
            continue;
        }
        let lanes = producer.mask & !resolved;
        if lanes.not_any() {
            continue;
        }
        for lane in lanes.iter_ones() {
            values[lane] = producer.values[lane];
        }
        if source == Source::RegisterFile {
            source = stage;
        }
        resolved |= lanes;
    }

    if source != Source::RegisterFile {
        log::trace!(
            "forwarding: warp {} register {} from {} (lanes {:#010x})",
            warp_id,
            reg,
            source.as_ref(),
            resolved.data[0]
        );
    }
    Operand { values, source }
}
