//! Integer datapath.

use crate::instruction::Opcode;

/// Upper immediate shift of `LUI` and `AUIPC`.
pub const UPPER_IMMEDIATE_SHIFT: u32 = 12;

fn upper(imm: u32) -> u32 {
    (imm & 0xF_FFFF) << UPPER_IMMEDIATE_SHIFT
}

/// Evaluate an integer operation for one lane.
///
/// `b` is the second register operand or the immediate of I and U format instructions.
#[must_use]
pub fn evaluate(opcode: Opcode, a: u32, b: u32, pc: u32) -> u32 {
    use Opcode::*;
    let (sa, sb) = (a as i32, b as i32);
    match opcode {
        ADD | ADDI => a.wrapping_add(b),
        SUB => a.wrapping_sub(b),
        MUL => a.wrapping_mul(b),
        MULH => ((i64::from(sa) * i64::from(sb)) >> 32) as u32,
        DIV => match (sa, sb) {
            (_, 0) => u32::MAX,
            (i32::MIN, -1) => i32::MIN as u32,
            _ => (sa / sb) as u32,
        },
        DIVU => a.checked_div(b).unwrap_or(u32::MAX),
        REM => match (sa, sb) {
            (_, 0) => a,
            (i32::MIN, -1) => 0,
            _ => (sa % sb) as u32,
        },
        REMU => a.checked_rem(b).unwrap_or(a),
        AND | ANDI => a & b,
        OR | ORI => a | b,
        XOR | XORI => a ^ b,
        NOT => !a,
        SLL | SLLI => a << (b & 31),
        SRL | SRLI => a >> (b & 31),
        SRA | SRAI => (sa >> (b & 31)) as u32,
        SLT | SLTI => u32::from(sa < sb),
        SLTU | SLTIU => u32::from(a < b),
        SEQ => u32::from(a == b),
        SNE => u32::from(a != b),
        SGE => u32::from(sa >= sb),
        SGEU => u32::from(a >= b),
        LUI => upper(b),
        AUIPC => pc.wrapping_add(upper(b)),
        other => {
            log::warn!("alu: {} is not an integer operation", other);
            0
        }
    }
}

/// Per-lane branch condition.
#[must_use]
pub fn branch_taken(opcode: Opcode, a: u32, b: u32) -> bool {
    use Opcode::*;
    match opcode {
        BEQ => a == b,
        BNE => a != b,
        BLT => (a as i32) < (b as i32),
        BGE => (a as i32) >= (b as i32),
        BLTU => a < b,
        BGEU => a >= b,
        _ => false,
    }
}
