use super::{lanes, launch, run};
use crate::config;
use crate::instruction::{encode, Opcode, ShuffleOp, VoteOp};
use crate::register_file::special::{LANE_IDX, THREAD_IDX, WARP_IDX};
use crate::warp::WARP_SIZE;
use color_eyre::eyre;
use pretty_assertions_sorted as diff;

fn config(num_warps: usize) -> config::Core {
    config::Core {
        num_warps,
        ..config::Core::default()
    }
}

#[test]
fn test_barrier_orders_stores_before_loads() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::SLLI, 7, THREAD_IDX, 2),
        encode::s(Opcode::SW, THREAD_IDX, 7, 0),
        encode::bar(0),
        // read the value stored by the same lane of the other warp
        encode::i(Opcode::XORI, 8, THREAD_IDX, 32),
        encode::i(Opcode::SLLI, 8, 8, 2),
        encode::i(Opcode::LW, 9, 8, 0),
        encode::ret(),
    ];
    let core = run(config(2), program, launch(0b11))?;

    for warp_id in 0..2 {
        let base = (warp_id * WARP_SIZE) as u32;
        diff::assert_eq!(
            core.registers().read(warp_id, 9),
            lanes(|lane| (base + lane) ^ 32)
        );
    }
    for thread in 0..64 {
        assert_eq!(core.dmem().read_word(4 * thread), Some(thread));
    }
    assert_eq!(core.stats().control.barrier_releases, 1);
    Ok(())
}

#[test]
fn test_exited_warp_releases_barrier() -> eyre::Result<()> {
    let program = vec![
        // warp 0 skips the barrier and exits
        encode::b(Opcode::BEQ, WARP_IDX, 0, 8),
        encode::bar(3),
        encode::li(7, 1),
        encode::ret(),
    ];
    let core = run(config(2), program, launch(0b11))?;
    assert_eq!(core.registers().read(0, 7), [1; WARP_SIZE]);
    assert_eq!(core.registers().read(1, 7), [1; WARP_SIZE]);
    assert_eq!(core.stats().control.barrier_releases, 1);
    Ok(())
}

#[test]
fn test_barrier_inside_loop() -> eyre::Result<()> {
    let program = vec![
        encode::li(7, 0),
        // 0x04
        encode::i(Opcode::ADDI, 7, 7, 1),
        encode::bar(1),
        encode::i(Opcode::SLTI, 8, 7, 3),
        encode::b(Opcode::BNE, 8, 0, -12),
        encode::ret(),
    ];
    let core = run(config(4), program, launch(0b1111))?;
    for warp_id in 0..4 {
        assert_eq!(core.registers().read(warp_id, 7), [3; WARP_SIZE]);
    }
    assert_eq!(core.stats().control.barrier_releases, 3);
    Ok(())
}

#[test]
fn test_vote_and_shuffle() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::ANDI, 7, LANE_IDX, 1),
        encode::vote(VoteOp::Ballot, 8, 7),
        encode::li(10, 1),
        encode::shfl(ShuffleOp::Xor, 9, LANE_IDX, 10),
        encode::vote(VoteOp::Any, 11, 7),
        encode::vote(VoteOp::All, 12, 7),
        encode::wsync(),
        encode::shfl(ShuffleOp::Idx, 13, 8, 0),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;
    let regs = core.registers();
    assert_eq!(regs.read(0, 8), [0xAAAA_AAAA; WARP_SIZE]);
    diff::assert_eq!(regs.read(0, 9), lanes(|lane| lane ^ 1));
    assert_eq!(regs.read(0, 11), [1; WARP_SIZE]);
    assert_eq!(regs.read(0, 12), [0; WARP_SIZE]);
    assert_eq!(regs.read(0, 13), [0xAAAA_AAAA; WARP_SIZE]);
    Ok(())
}
