use crate::{barrier, mem::AccessSize, warp::ActiveMask};
use smallvec::SmallVec;

/// Width of every instruction in bytes.
pub const INSTRUCTION_SIZE: u32 = 4;

/// The opcode occupies the top seven bits `[31:25]`.
pub const OPCODE_SHIFT: u32 = 25;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::FromRepr,
    strum::EnumIter,
    strum::AsRefStr,
    strum::Display,
)]
#[repr(u8)]
pub enum Opcode {
    ADD = 0x00,
    ADDI = 0x01,
    SUB = 0x02,
    MUL = 0x03,
    MULH = 0x04,
    DIV = 0x05,
    DIVU = 0x06,
    REM = 0x07,
    REMU = 0x08,

    AND = 0x10,
    ANDI = 0x11,
    OR = 0x12,
    ORI = 0x13,
    XOR = 0x14,
    XORI = 0x15,
    NOT = 0x16,
    SLL = 0x17,
    SLLI = 0x18,
    SRL = 0x19,
    SRLI = 0x1A,
    SRA = 0x1B,
    SRAI = 0x1C,

    FADD = 0x20,
    FSUB = 0x21,
    FMUL = 0x22,
    FDIV = 0x23,
    FMADD = 0x24,
    FMSUB = 0x25,
    FSQRT = 0x26,
    FABS = 0x27,
    FNEG = 0x28,
    FMIN = 0x29,
    FMAX = 0x2A,
    FCVTWS = 0x2B,
    FCVTSW = 0x2C,
    FCMPEQ = 0x2D,
    FCMPLT = 0x2E,
    FCMPLE = 0x2F,

    LW = 0x30,
    LH = 0x31,
    LHU = 0x32,
    LB = 0x33,
    LBU = 0x34,
    SW = 0x35,
    SH = 0x36,
    SB = 0x37,

    SLT = 0x40,
    SLTI = 0x41,
    SLTU = 0x42,
    SLTIU = 0x43,
    SEQ = 0x44,
    SNE = 0x45,
    SGE = 0x46,
    SGEU = 0x47,

    BEQ = 0x50,
    BNE = 0x51,
    BLT = 0x52,
    BGE = 0x53,
    BLTU = 0x54,
    BGEU = 0x55,
    JAL = 0x56,
    JALR = 0x57,
    RET = 0x58,
    BAR = 0x59,
    WSYNC = 0x5A,
    VOTE = 0x5B,
    SHFL = 0x5C,

    LUI = 0x69,
    AUIPC = 0x6A,
}

/// Encoding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `opcode | rd | rs1 | rs2 | func`, FMADD and FMSUB carry `rs3` in the func bits
    R,
    /// `opcode | rd | rs1 | imm15`
    I,
    /// `opcode | rs2 | rs1 | offset15`
    S,
    /// `opcode | rs2 | rs1 | offset15`
    B,
    /// `opcode | rd | imm20`
    U,
    /// opcode only
    Ctrl,
}

/// Functional class, selects the execute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum Class {
    Alu,
    Fpu,
    Load,
    Store,
    Branch,
    Jump,
    Return,
    Barrier,
    WarpSync,
    Vote,
    Shuffle,
}

impl Opcode {
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::from_repr((raw >> OPCODE_SHIFT) as u8)
    }

    #[must_use]
    pub fn format(self) -> Format {
        use Opcode::*;
        match self {
            ADDI | ANDI | ORI | XORI | SLLI | SRLI | SRAI | SLTI | SLTIU | JALR | LW | LH | LHU
            | LB | LBU | BAR => Format::I,
            SW | SH | SB => Format::S,
            BEQ | BNE | BLT | BGE | BLTU | BGEU => Format::B,
            LUI | AUIPC | JAL => Format::U,
            RET | WSYNC => Format::Ctrl,
            _ => Format::R,
        }
    }

    #[must_use]
    pub fn class(self) -> Class {
        use Opcode::*;
        match self as u8 {
            0x20..=0x2F => Class::Fpu,
            _ => match self {
                LW | LH | LHU | LB | LBU => Class::Load,
                SW | SH | SB => Class::Store,
                BEQ | BNE | BLT | BGE | BLTU | BGEU => Class::Branch,
                JAL | JALR => Class::Jump,
                RET => Class::Return,
                BAR => Class::Barrier,
                WSYNC => Class::WarpSync,
                VOTE => Class::Vote,
                SHFL => Class::Shuffle,
                _ => Class::Alu,
            },
        }
    }

    /// Three-source FPU operation with `rs3` in `[9:5]`.
    #[must_use]
    pub fn has_rs3(self) -> bool {
        matches!(self, Opcode::FMADD | Opcode::FMSUB)
    }

    /// Width and sign extension of a memory access.
    #[must_use]
    pub fn access(self) -> Option<(AccessSize, bool)> {
        use Opcode::*;
        match self {
            LW | SW => Some((AccessSize::Word, false)),
            LH => Some((AccessSize::Half, true)),
            LHU | SH => Some((AccessSize::Half, false)),
            LB => Some((AccessSize::Byte, true)),
            LBU | SB => Some((AccessSize::Byte, false)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::AsRefStr)]
#[repr(u32)]
pub enum VoteOp {
    All = 0,
    Any = 1,
    Ballot = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::AsRefStr)]
#[repr(u32)]
pub enum ShuffleOp {
    Idx = 0,
    Up = 1,
    Down = 2,
    Xor = 3,
}

/// Raw bit fields of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub opcode: u32,
    pub rd: u32,
    pub rs1: u32,
    pub rs2: u32,
    pub rs3: u32,
    pub func: u32,
    pub imm15: i32,
    pub imm20: i32,
}

impl Fields {
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self {
            opcode: raw >> OPCODE_SHIFT,
            rd: (raw >> 20) & 0x1F,
            rs1: (raw >> 15) & 0x1F,
            rs2: (raw >> 10) & 0x1F,
            rs3: (raw >> 5) & 0x1F,
            func: raw & 0x3FF,
            // sign extend the low 15 and 20 bits
            imm15: ((raw << 17) as i32) >> 17,
            imm20: ((raw << 12) as i32) >> 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub uid: u64,
    pub raw: u32,
    pub pc: u32,
    pub warp_id: usize,
    pub active_mask: ActiveMask,
    /// `None` for an illegal instruction word.
    pub opcode: Option<Opcode>,
    pub rd: u32,
    /// Source registers of the three read ports, 0 when unused.
    pub rs: [u32; 3],
    pub imm: i32,
    pub func: u32,
    pub vote_op: Option<VoteOp>,
    pub shuffle_op: Option<ShuffleOp>,
    /// Next PC the front end fetched after this instruction.
    pub predicted_next_pc: u32,
}

impl std::fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &str = match &self.opcode {
            Some(op) => op.as_ref(),
            None => "ILLEGAL",
        };
        write!(
            f,
            "{}[pc={:#06x},warp={},uid={}]",
            name, self.pc, self.warp_id, self.uid
        )
    }
}

/// Expand an instruction word.
#[must_use]
pub fn decode(
    raw: u32,
    pc: u32,
    warp_id: usize,
    active_mask: ActiveMask,
    uid: u64,
) -> DecodedInstruction {
    let fields = Fields::new(raw);
    let mut instr = DecodedInstruction {
        uid,
        raw,
        pc,
        warp_id,
        active_mask,
        opcode: None,
        rd: 0,
        rs: [0; 3],
        imm: 0,
        func: fields.func,
        vote_op: None,
        shuffle_op: None,
        predicted_next_pc: pc.wrapping_add(INSTRUCTION_SIZE),
    };
    let Some(opcode) = Opcode::from_raw(raw) else {
        return instr;
    };

    match opcode.format() {
        Format::R => {
            instr.rd = fields.rd;
            instr.rs = [fields.rs1, fields.rs2, 0];
            if opcode.has_rs3() {
                instr.rs[2] = fields.rs3;
            }
        }
        Format::I => {
            instr.rd = fields.rd;
            instr.rs = [fields.rs1, 0, 0];
            instr.imm = fields.imm15;
        }
        Format::S | Format::B => {
            instr.rs = [fields.rs1, fields.rd, 0];
            instr.imm = fields.imm15;
        }
        Format::U => {
            instr.rd = fields.rd;
            instr.imm = fields.imm20;
        }
        Format::Ctrl => {}
    }

    match opcode {
        Opcode::VOTE => {
            instr.vote_op = VoteOp::from_repr(fields.func);
            if instr.vote_op.is_none() {
                return instr;
            }
        }
        Opcode::SHFL => {
            instr.shuffle_op = ShuffleOp::from_repr(fields.func);
            if instr.shuffle_op.is_none() {
                return instr;
            }
        }
        _ => {}
    }
    instr.opcode = Some(opcode);
    instr
}

impl DecodedInstruction {
    #[must_use]
    pub fn class(&self) -> Option<Class> {
        self.opcode.map(Opcode::class)
    }

    #[must_use]
    pub fn is_legal(&self) -> bool {
        self.opcode.is_some()
    }

    #[must_use]
    pub fn is_load(&self) -> bool {
        self.class() == Some(Class::Load)
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self.class(), Some(Class::Load | Class::Store))
    }

    #[must_use]
    pub fn is_fpu(&self) -> bool {
        self.class() == Some(Class::Fpu)
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.class() == Some(Class::Branch)
    }

    /// Destination register, if the instruction writes one.
    #[must_use]
    pub fn dest(&self) -> Option<u32> {
        let writes = matches!(
            self.class(),
            Some(
                Class::Alu
                    | Class::Fpu
                    | Class::Load
                    | Class::Jump
                    | Class::Vote
                    | Class::Shuffle
            )
        );
        (writes && self.rd != 0).then_some(self.rd)
    }

    /// Source registers that are actually read.
    #[must_use]
    pub fn sources(&self) -> SmallVec<[u32; 3]> {
        self.rs.iter().copied().filter(|&reg| reg != 0).collect()
    }

    /// Barrier kind and id for synchronization instructions.
    #[must_use]
    pub fn barrier(&self) -> Option<(barrier::Kind, usize)> {
        match self.opcode? {
            Opcode::BAR => Some((barrier::Kind::Sync, self.imm as u16 as usize)),
            Opcode::WSYNC => Some((barrier::Kind::Warp, 0)),
            _ => None,
        }
    }

    #[must_use]
    pub fn fallthrough_pc(&self) -> u32 {
        self.pc.wrapping_add(INSTRUCTION_SIZE)
    }
}

/// Instruction encoders.
pub mod encode {
    use super::{Opcode, ShuffleOp, VoteOp, OPCODE_SHIFT};

    fn op(opcode: Opcode) -> u32 {
        (opcode as u32) << OPCODE_SHIFT
    }

    #[must_use]
    pub fn r(opcode: Opcode, rd: u32, rs1: u32, rs2: u32) -> u32 {
        op(opcode) | ((rd & 0x1F) << 20) | ((rs1 & 0x1F) << 15) | ((rs2 & 0x1F) << 10)
    }

    #[must_use]
    pub fn r3(opcode: Opcode, rd: u32, rs1: u32, rs2: u32, rs3: u32) -> u32 {
        r(opcode, rd, rs1, rs2) | ((rs3 & 0x1F) << 5)
    }

    #[must_use]
    pub fn i(opcode: Opcode, rd: u32, rs1: u32, imm: i32) -> u32 {
        op(opcode) | ((rd & 0x1F) << 20) | ((rs1 & 0x1F) << 15) | (imm as u32 & 0x7FFF)
    }

    /// Store `rs2` to `offset(rs1)`.
    #[must_use]
    pub fn s(opcode: Opcode, rs2: u32, rs1: u32, offset: i32) -> u32 {
        op(opcode) | ((rs2 & 0x1F) << 20) | ((rs1 & 0x1F) << 15) | (offset as u32 & 0x7FFF)
    }

    /// Branch comparing `rs1` against `rs2`, offset relative to the branch.
    #[must_use]
    pub fn b(opcode: Opcode, rs1: u32, rs2: u32, offset: i32) -> u32 {
        s(opcode, rs2, rs1, offset)
    }

    #[must_use]
    pub fn u(opcode: Opcode, rd: u32, imm: i32) -> u32 {
        op(opcode) | ((rd & 0x1F) << 20) | (imm as u32 & 0xF_FFFF)
    }

    #[must_use]
    pub fn nop() -> u32 {
        i(Opcode::ADDI, 0, 0, 0)
    }

    #[must_use]
    pub fn li(rd: u32, imm: i32) -> u32 {
        i(Opcode::ADDI, rd, 0, imm)
    }

    #[must_use]
    pub fn mv(rd: u32, rs: u32) -> u32 {
        i(Opcode::ADDI, rd, rs, 0)
    }

    #[must_use]
    pub fn j(offset: i32) -> u32 {
        u(Opcode::JAL, 0, offset)
    }

    #[must_use]
    pub fn ret() -> u32 {
        op(Opcode::RET)
    }

    #[must_use]
    pub fn bar(id: u32) -> u32 {
        i(Opcode::BAR, 0, 0, id as i32)
    }

    #[must_use]
    pub fn wsync() -> u32 {
        op(Opcode::WSYNC)
    }

    #[must_use]
    pub fn vote(op: VoteOp, rd: u32, rs1: u32) -> u32 {
        r(Opcode::VOTE, rd, rs1, 0) | op as u32
    }

    #[must_use]
    pub fn shfl(op: ShuffleOp, rd: u32, rs1: u32, rs2: u32) -> u32 {
        r(Opcode::SHFL, rd, rs1, rs2) | op as u32
    }
}
