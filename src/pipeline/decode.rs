use super::{Fetched, Issued};
use crate::branch_predictor::{Btfn, Prediction};
use crate::forwarding::{self, Producers};
use crate::instruction;
use crate::register_file::RegisterFile;
use crate::scoreboard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub issued: Issued,
    /// Prediction for a conditional branch.
    pub prediction: Option<Prediction>,
    /// A source is produced by a load still in execute.
    pub load_use: bool,
}

/// Decode the instruction held in the IF/ID latch.
///
/// Operands are read through the bypass network, the scoreboard is only
/// consulted for load-use hazards.
#[must_use]
pub fn decode<S>(
    fetched: &Fetched,
    uid: u64,
    producers: &Producers<'_>,
    registers: &RegisterFile,
    scoreboard: &S,
) -> Output
where
    S: scoreboard::Access + ?Sized,
{
    let warp_id = fetched.warp_id;
    let mut instr = instruction::decode(
        fetched.raw,
        fetched.pc,
        warp_id,
        fetched.active_mask,
        uid,
    );
    if !fetched.valid {
        instr.opcode = None;
    }

    let operands = instr.rs.map(|reg| {
        let operand =
            forwarding::resolve(warp_id, reg, producers, &registers.read(warp_id, reg));
        if reg != 0 {
            log::trace!(
                "decode: {} reads r{} from {}",
                instr,
                reg,
                operand.source.as_ref()
            );
        }
        operand.values
    });

    let sources = instr.sources();
    let load_use = scoreboard.load_use(warp_id, &sources);

    let prediction = instr
        .is_branch()
        .then(|| Btfn::predict(instr.pc, instr.imm));
    if let Some(Prediction { taken: true, target }) = prediction {
        instr.predicted_next_pc = target;
    }

    Output {
        issued: Issued { instr, operands },
        prediction,
        load_use,
    }
}
