use super::{Executed, Issued};
use crate::barrier;
use crate::branch_predictor::{Btfn, Resolution};
use crate::core::Error;
use crate::func_unit::alu;
use crate::instruction::{Class, DecodedInstruction, Format, Opcode, ShuffleOp, VoteOp};
use crate::mem;
use crate::simt_stack::{self, SimtStack};
use crate::warp::{ActiveMask, Lanes, WARP_SIZE};

/// Control flow events of one executed instruction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// A divergent branch pushed a reconvergence entry.
    pub diverged: bool,
    /// The instruction sits at the top entry's reconvergence pc.
    pub reconverged: bool,
    /// Return of some lanes resumed lanes parked on the stack.
    pub resumed: bool,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub executed: Executed,
    /// Divergence stack after this instruction.
    pub stack: SimtStack,
    pub next_pc: u32,
    pub next_mask: ActiveMask,
    /// The front end assumed a different pc or mask for the warp.
    pub redirect: bool,
    pub resolution: Option<Resolution>,
    pub barrier: Option<(barrier::Kind, usize)>,
    pub terminal: bool,
    pub control: Control,
}

/// Lanes an instruction executes for.
///
/// At a reconvergence point the lanes recorded on the stack rejoin.
#[must_use]
pub fn effective_mask(instr: &DecodedInstruction, stack: &SimtStack) -> ActiveMask {
    if stack.at_reconvergence(instr.pc) {
        stack.top().active_mask
    } else {
        instr.active_mask
    }
}

fn vote(op: VoteOp, mask: ActiveMask, values: &Lanes) -> u32 {
    let mut predicate = ActiveMask::ZERO;
    for lane in mask.iter_ones() {
        predicate.set(lane, values[lane] != 0);
    }
    match op {
        VoteOp::All => u32::from(predicate == mask),
        VoteOp::Any => u32::from(predicate.any()),
        VoteOp::Ballot => predicate.data[0],
    }
}

fn shuffle(op: ShuffleOp, mask: ActiveMask, values: &Lanes, lanes: &Lanes) -> Lanes {
    let mut result = [0; WARP_SIZE];
    for lane in mask.iter_ones() {
        let operand = lanes[lane] as usize;
        let src = match op {
            ShuffleOp::Idx => Some(operand),
            ShuffleOp::Up => lane.checked_sub(operand),
            ShuffleOp::Down => lane.checked_add(operand),
            ShuffleOp::Xor => Some(lane ^ operand),
        };
        // out of range or inactive source lanes keep their own value
        result[lane] = match src {
            Some(src) if src < WARP_SIZE && mask[src] => values[src],
            _ => values[lane],
        };
    }
    result
}

/// Execute the instruction held in the ID/EX latch.
///
/// Works on a copy of the warp's divergence stack, the core commits the
/// returned stack together with the rest of the outcome.
#[tracing::instrument(name = "execute", skip_all, fields(warp_id = issued.instr.warp_id, pc = issued.instr.pc))]
pub fn execute(
    issued: &Issued,
    stack: &SimtStack,
    predictor: &Btfn,
    fpu_result: Option<&Lanes>,
) -> Result<Outcome, Error> {
    let instr = &issued.instr;
    let warp_id = instr.warp_id;
    let illegal = || Error::IllegalInstruction {
        warp_id,
        pc: instr.pc,
        raw: instr.raw,
    };
    let stack_error = |source: simt_stack::Error| Error::Stack { warp_id, source };

    let opcode = instr.opcode.ok_or_else(illegal)?;
    let mut stack = stack.clone();
    let mut control = Control::default();

    let mut mask = instr.active_mask;
    if stack.at_reconvergence(instr.pc) {
        let entry = stack.pop().map_err(stack_error)?;
        log::trace!("execute: {} reconverges {}", instr, entry);
        mask = entry.active_mask;
        control.reconverged = true;
    }

    let [a, b, _] = &issued.operands;
    let imm = instr.imm as u32;
    let fallthrough = instr.fallthrough_pc();

    let mut result = [0; WARP_SIZE];
    let mut next_pc = fallthrough;
    let mut next_mask = mask;
    let mut access = None;
    let mut resolution = None;
    let mut terminal = false;

    match opcode.class() {
        Class::Alu => {
            let uses_imm = matches!(opcode.format(), Format::I | Format::U);
            for lane in mask.iter_ones() {
                let rhs = if uses_imm { imm } else { b[lane] };
                result[lane] = alu::evaluate(opcode, a[lane], rhs, instr.pc);
            }
        }
        Class::Fpu => {
            debug_assert!(fpu_result.is_some(), "{instr} executes without fpu result");
            if let Some(values) = fpu_result {
                result = *values;
            }
        }
        Class::Load | Class::Store => {
            let (size, _) = opcode.access().ok_or_else(illegal)?;
            let is_write = opcode.class() == Class::Store;
            let mut lane_addr = [0; WARP_SIZE];
            let mut lane_wdata = [0; WARP_SIZE];
            for lane in mask.iter_ones() {
                lane_addr[lane] = a[lane].wrapping_add(imm);
                if is_write {
                    lane_wdata[lane] = b[lane];
                }
            }
            access = Some(mem::Request {
                lane_valid: mask,
                lane_addr,
                lane_wdata,
                is_write,
                size,
            });
        }
        Class::Branch => {
            let mut taken_mask = ActiveMask::ZERO;
            for lane in mask.iter_ones() {
                taken_mask.set(lane, alu::branch_taken(opcode, a[lane], b[lane]));
            }
            let not_taken_mask = mask & !taken_mask;
            let target = instr.pc.wrapping_add_signed(instr.imm);

            if taken_mask.any() && not_taken_mask.any() {
                if stack.is_empty() || stack.top().reconvergence_pc != fallthrough {
                    stack
                        .push(simt_stack::Entry {
                            reconvergence_pc: fallthrough,
                            active_mask: mask,
                            taken_mask,
                        })
                        .map_err(stack_error)?;
                    control.diverged = true;
                }
                // otherwise the not taken lanes are already parked at the fallthrough
                next_mask = taken_mask;
            }
            let actual_taken = taken_mask.any();
            if actual_taken {
                next_pc = target;
            }
            resolution = Some(predictor.evaluate(warp_id, instr.pc, actual_taken, target));
        }
        Class::Jump => {
            let target = match opcode {
                Opcode::JALR => {
                    let mut targets = mask.iter_ones().map(|lane| a[lane].wrapping_add(imm) & !1);
                    let target = targets.next().unwrap_or(fallthrough);
                    // the stack only reconverges two paths, lanes must agree
                    if let Some(other) = targets.find(|&other| other != target) {
                        return Err(Error::DivergentJump {
                            warp_id,
                            pc: instr.pc,
                            target,
                            other,
                        });
                    }
                    target
                }
                _ => instr.pc.wrapping_add_signed(instr.imm),
            };
            for lane in mask.iter_ones() {
                result[lane] = fallthrough;
            }
            next_pc = target;
            resolution = Some(predictor.evaluate(warp_id, instr.pc, true, target));
        }
        Class::Return => {
            stack.retire_lanes(mask);
            let mut parked = None;
            while !stack.is_empty() {
                let entry = stack.pop().map_err(stack_error)?;
                if entry.active_mask.any() {
                    parked = Some(entry);
                    break;
                }
            }
            match parked {
                Some(entry) => {
                    log::trace!("execute: {} resumes {}", instr, entry);
                    next_pc = entry.reconvergence_pc;
                    next_mask = entry.active_mask;
                    control.resumed = true;
                }
                None => terminal = true,
            }
        }
        Class::Barrier | Class::WarpSync => {}
        Class::Vote => {
            let op = instr.vote_op.ok_or_else(illegal)?;
            let value = vote(op, mask, a);
            for lane in mask.iter_ones() {
                result[lane] = value;
            }
        }
        Class::Shuffle => {
            let op = instr.shuffle_op.ok_or_else(illegal)?;
            result = shuffle(op, mask, a, b);
        }
    }

    let barrier = instr.barrier();
    let redirect = next_pc != instr.predicted_next_pc
        || next_mask != instr.active_mask
        || matches!(barrier, Some((barrier::Kind::Sync, _)))
        || terminal;

    Ok(Outcome {
        executed: Executed {
            instr: instr.clone(),
            mask,
            result,
            access,
            terminal,
        },
        stack,
        next_pc,
        next_mask,
        redirect,
        resolution,
        barrier,
        terminal,
        control,
    })
}
