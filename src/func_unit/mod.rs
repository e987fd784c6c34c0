pub mod alu;
pub mod fpu;

pub use fpu::SoftFpu;

use crate::instruction::Opcode;
use crate::warp::{ActiveMask, Lanes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
    Madd,
    Msub,
    Sqrt,
    Abs,
    Neg,
    Min,
    Max,
    /// Float to signed integer.
    CvtWS,
    /// Signed integer to float.
    CvtSW,
    CmpEq,
    CmpLt,
    CmpLe,
}

impl FpuOp {
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        let op = match opcode {
            Opcode::FADD => Self::Add,
            Opcode::FSUB => Self::Sub,
            Opcode::FMUL => Self::Mul,
            Opcode::FDIV => Self::Div,
            Opcode::FMADD => Self::Madd,
            Opcode::FMSUB => Self::Msub,
            Opcode::FSQRT => Self::Sqrt,
            Opcode::FABS => Self::Abs,
            Opcode::FNEG => Self::Neg,
            Opcode::FMIN => Self::Min,
            Opcode::FMAX => Self::Max,
            Opcode::FCVTWS => Self::CvtWS,
            Opcode::FCVTSW => Self::CvtSW,
            Opcode::FCMPEQ => Self::CmpEq,
            Opcode::FCMPLT => Self::CmpLt,
            Opcode::FCMPLE => Self::CmpLe,
            _ => return None,
        };
        Some(op)
    }
}

/// Floating point unit.
///
/// The core starts one operation at a time and polls for its result.
/// Only divide and square root take more than one cycle.
pub trait Fpu: crate::engine::cycle::Component {
    fn start(&mut self, op: FpuOp, a: &Lanes, b: &Lanes, c: &Lanes, active_mask: ActiveMask);

    #[must_use]
    fn busy(&self) -> bool;

    #[must_use]
    fn result_valid(&self) -> bool;

    fn take_result(&mut self) -> Option<Lanes>;
}
