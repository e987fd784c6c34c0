use super::Completed;
use crate::register_file::RegisterFile;

/// Commit the masked register write of a completed instruction.
///
/// Returns the written register.
pub fn writeback(completed: &Completed, registers: &mut RegisterFile) -> Option<u32> {
    let instr = &completed.instr;
    let reg = instr.dest()?;
    registers.write(instr.warp_id, reg, &completed.mask, &completed.result);
    log::trace!(
        "writeback: {} writes r{} lanes={:#010x}",
        instr,
        reg,
        completed.mask.data[0]
    );
    Some(reg)
}
