use super::{lanes, launch, run};
use crate::config;
use crate::instruction::{encode, Opcode};
use crate::register_file::special::{LANE_IDX, WARP_IDX};
use crate::warp::{Status, WARP_SIZE};
use color_eyre::eyre;
use pretty_assertions_sorted as diff;

fn config(num_warps: usize) -> config::Core {
    config::Core {
        num_warps,
        ..config::Core::default()
    }
}

#[test]
fn test_divergent_if_else() -> eyre::Result<()> {
    let program = vec![
        // 0x00: odd lanes take the then path
        encode::i(Opcode::ANDI, 7, LANE_IDX, 1),
        encode::b(Opcode::BEQ, 7, 0, 12),
        encode::li(8, 111),
        encode::j(8),
        // 0x10: even lanes
        encode::li(8, 222),
        // 0x14
        encode::i(Opcode::ADDI, 9, 8, 1),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;

    let expected = lanes(|lane| if lane % 2 == 1 { 111 } else { 222 });
    diff::assert_eq!(core.registers().read(0, 8), expected);
    diff::assert_eq!(core.registers().read(0, 9), expected.map(|value| value + 1));

    let stats = core.stats();
    assert_eq!(stats.control.divergences, 1);
    assert_eq!(stats.control.resumes, 1);
    assert!(stats.branch.mispredictions > 0);
    assert!(core.stack(0).is_empty());
    assert_eq!(core.warps().get(0).status, Status::Done);
    Ok(())
}

#[test]
fn test_loop_with_lane_dependent_trip_count() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::ADDI, 8, LANE_IDX, 1),
        encode::li(7, 0),
        // 0x08: loop body
        encode::i(Opcode::ADDI, 7, 7, 1),
        encode::b(Opcode::BLT, 7, 8, -4),
        // 0x10: reconverged
        encode::mv(9, 7),
        encode::i(Opcode::ADDI, 10, 0, 5),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;

    let trip_count = lanes(|lane| lane + 1);
    diff::assert_eq!(core.registers().read(0, 7), trip_count);
    diff::assert_eq!(core.registers().read(0, 9), trip_count);
    // every lane executes after the loop
    assert_eq!(core.registers().read(0, 10), [5; WARP_SIZE]);

    let stats = core.stats();
    assert_eq!(stats.control.divergences, 1);
    assert_eq!(stats.control.reconvergences, 1);
    assert!(stats.control.predicted_redirects > 0);
    assert!(stats.branch.predicted_taken > 0);
    Ok(())
}

#[test]
fn test_uniform_branch_does_not_diverge() -> eyre::Result<()> {
    let program = vec![
        encode::b(Opcode::BEQ, 0, 0, 8),
        encode::li(7, 1),
        encode::li(8, 2),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;
    assert_eq!(core.registers().read(0, 7), [0; WARP_SIZE]);
    assert_eq!(core.registers().read(0, 8), [2; WARP_SIZE]);
    assert_eq!(core.stats().control.divergences, 0);
    Ok(())
}

#[test]
fn test_warps_take_different_paths() -> eyre::Result<()> {
    let program = vec![
        encode::b(Opcode::BNE, WARP_IDX, 0, 12),
        // 0x04: warp 0
        encode::li(7, 10),
        encode::ret(),
        // 0x0c: every other warp
        encode::i(Opcode::ADDI, 7, WARP_IDX, 20),
        encode::ret(),
    ];
    let core = run(config(4), program, launch(0b1111))?;
    assert_eq!(core.registers().read(0, 7), [10; WARP_SIZE]);
    for warp_id in 1..4 {
        assert_eq!(core.registers().read(warp_id, 7), [20 + warp_id as u32; WARP_SIZE]);
    }
    assert_eq!(core.stats().control.divergences, 0);
    Ok(())
}

#[test]
fn test_call_and_return_through_link_register() -> eyre::Result<()> {
    let program = vec![
        // 0x00: call 0x10, link in r20
        encode::u(Opcode::JAL, 20, 16),
        encode::i(Opcode::ADDI, 8, 7, 1),
        encode::ret(),
        encode::nop(),
        // 0x10: callee
        encode::li(7, 41),
        encode::i(Opcode::JALR, 0, 20, 0),
    ];
    let core = run(config(1), program, launch(0b1))?;
    assert_eq!(core.registers().read(0, 20), [4; WARP_SIZE]);
    assert_eq!(core.registers().read(0, 8), [42; WARP_SIZE]);
    Ok(())
}
