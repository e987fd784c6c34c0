use super::{lanes, launch, run, run_core};
use crate::config;
use crate::core::{self, LaunchError, State};
use crate::instruction::{encode, Opcode};
use crate::register_file::special::{LANE_IDX, THREAD_IDX};
use crate::warp::{warp_mask_from_bits, Status, WARP_SIZE};
use color_eyre::eyre;
use pretty_assertions_sorted as diff;

fn config(num_warps: usize) -> config::Core {
    config::Core {
        num_warps,
        ..config::Core::default()
    }
}

#[test]
fn test_every_launched_warp_runs_to_completion() -> eyre::Result<()> {
    let program = vec![encode::i(Opcode::ADDI, 7, THREAD_IDX, 100), encode::ret()];
    let mut core = run(config(4), program, launch(0b1111))?;

    let stats = core.stats();
    for warp_id in 0..4 {
        let base = (warp_id * WARP_SIZE) as u32;
        diff::assert_eq!(
            core.registers().read(warp_id, 7),
            lanes(|lane| base + lane + 100)
        );
        assert_eq!(core.warps().get(warp_id).status, Status::Done);
        assert!(core.stack(warp_id).is_empty());
        assert!(stats.warps[warp_id].fetched > 0, "warp {warp_id} never fetched");
        assert_eq!(stats.warps[warp_id].completed, 2);
    }
    assert_eq!(stats.completed, 8);
    assert_eq!(stats.thread_instructions, 8 * WARP_SIZE as u64);
    assert_eq!(stats.simd_efficiency(), WARP_SIZE as f64);

    // done is a one cycle pulse
    assert_eq!(core.state(), State::Done);
    core.cycle()?;
    assert_eq!(core.state(), State::Idle);
    Ok(())
}

#[test]
fn test_forwarding_chain() -> eyre::Result<()> {
    let program = vec![
        encode::li(7, 1),
        encode::i(Opcode::ADDI, 8, 7, 2),
        encode::r(Opcode::ADD, 9, 8, 7),
        encode::r(Opcode::ADD, 10, 9, 7),
        encode::r(Opcode::ADD, 11, 10, 8),
        encode::r(Opcode::MUL, 12, 11, LANE_IDX),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;
    let regs = core.registers();
    assert_eq!(regs.read(0, 7), [1; WARP_SIZE]);
    assert_eq!(regs.read(0, 8), [3; WARP_SIZE]);
    assert_eq!(regs.read(0, 9), [4; WARP_SIZE]);
    assert_eq!(regs.read(0, 10), [5; WARP_SIZE]);
    assert_eq!(regs.read(0, 11), [8; WARP_SIZE]);
    diff::assert_eq!(regs.read(0, 12), lanes(|lane| 8 * lane));
    assert_eq!(core.stats().stalls.load_use, 0);
    Ok(())
}

#[test]
fn test_load_use_stalls_decode() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::SLLI, 7, LANE_IDX, 2),
        encode::i(Opcode::LW, 8, 7, 0),
        encode::i(Opcode::ADDI, 9, 8, 5),
        encode::ret(),
    ];
    let data: Vec<u32> = (0..WARP_SIZE as u32).map(|lane| 1000 + 3 * lane).collect();

    let mut core = core::Simple::from_program(config(1), program)?;
    core.dmem_mut()
        .load_words(0, &data)
        .ok_or_else(|| eyre::eyre!("data does not fit"))?;
    run_core(&mut core, launch(0b1))?;

    diff::assert_eq!(core.registers().read(0, 8), lanes(|lane| 1000 + 3 * lane));
    diff::assert_eq!(core.registers().read(0, 9), lanes(|lane| 1005 + 3 * lane));
    let stats = core.stats();
    assert!(stats.stalls.load_use > 0);
    assert!(stats.stalls.memory > 0);
    assert_eq!(stats.data_memory_requests, 1);
    Ok(())
}

#[test]
fn test_sub_word_load_extension() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::LB, 7, 0, 0),
        encode::i(Opcode::LBU, 8, 0, 0),
        encode::i(Opcode::LH, 9, 0, 2),
        encode::i(Opcode::LHU, 10, 0, 2),
        encode::ret(),
    ];
    let mut core = core::Simple::from_program(config(1), program)?;
    core.dmem_mut()
        .write_word(0, 0x8001_00F0)
        .ok_or_else(|| eyre::eyre!("out of range"))?;
    run_core(&mut core, launch(0b1))?;

    let regs = core.registers();
    assert_eq!(regs.read(0, 7)[0], 0xFFFF_FFF0);
    assert_eq!(regs.read(0, 8)[0], 0xF0);
    assert_eq!(regs.read(0, 9)[0], 0xFFFF_8001);
    assert_eq!(regs.read(0, 10)[0], 0x8001);
    Ok(())
}

#[test]
fn test_fpu_divide_stalls_pipeline() -> eyre::Result<()> {
    let program = vec![
        encode::r(Opcode::FCVTSW, 7, LANE_IDX, 0),
        encode::li(8, 2),
        encode::r(Opcode::FCVTSW, 8, 8, 0),
        encode::r(Opcode::FDIV, 9, 7, 8),
        encode::r(Opcode::FCVTWS, 10, 9, 0),
        encode::ret(),
    ];
    let core = run(config(1), program, launch(0b1))?;
    let regs = core.registers();
    diff::assert_eq!(
        regs.read(0, 9),
        lanes(|lane| (lane as f32 / 2.0).to_bits())
    );
    diff::assert_eq!(regs.read(0, 10), lanes(|lane| lane / 2));
    assert!(core.stats().stalls.fpu > 0);
    Ok(())
}

#[test]
fn test_block_dim_limits_active_lanes() -> eyre::Result<()> {
    let program = vec![encode::li(7, 9), encode::ret()];
    let launch = core::Launch {
        block_dim: 40,
        ..launch(0b111)
    };
    let core = run(config(4), program, launch)?;

    assert_eq!(core.registers().read(0, 7), [9; WARP_SIZE]);
    diff::assert_eq!(
        core.registers().read(1, 7),
        lanes(|lane| if lane < 8 { 9 } else { 0 })
    );
    // no thread of warp 2 is part of the block
    assert_eq!(core.registers().read(2, 7), [0; WARP_SIZE]);
    assert_eq!(core.stats().warps[2].fetched, 0);
    assert_eq!(core.stats().thread_instructions, 2 * (32 + 8));
    Ok(())
}

#[test]
fn test_init_one_warp_per_cycle() -> eyre::Result<()> {
    let mut core = core::Simple::from_program(config(4), vec![encode::ret()])?;
    core.start(launch(0b101))?;
    assert_eq!(core.state(), State::Init { next_warp: 0 });
    core.cycle()?;
    assert_eq!(core.state(), State::Init { next_warp: 1 });
    core.cycle()?;
    assert_eq!(core.state(), State::Init { next_warp: 3 });
    core.cycle()?;
    assert_eq!(core.state(), State::Run);
    assert_eq!(core.warps().get(0).status, Status::Ready);
    assert_eq!(core.warps().get(1).status, Status::Idle);
    assert_eq!(core.warps().get(2).status, Status::Ready);
    Ok(())
}

#[test]
fn test_relaunch_after_done() -> eyre::Result<()> {
    let program = vec![encode::i(Opcode::ADDI, 7, THREAD_IDX, 0), encode::ret()];
    let mut core = core::Simple::from_program(config(2), program)?;
    run_core(&mut core, launch(0b1))?;
    assert_eq!(core.registers().read(0, 7), lanes(|lane| lane));

    let relaunch = core::Launch {
        thread_base: 64,
        ..launch(0b10)
    };
    run_core(&mut core, relaunch)?;
    diff::assert_eq!(core.registers().read(1, 7), lanes(|lane| 64 + 32 + lane));
    Ok(())
}

#[test]
fn test_launch_errors() -> eyre::Result<()> {
    let mut core = core::Simple::from_program(config(8), vec![encode::ret()])?;
    assert_eq!(core.start(launch(0)), Err(LaunchError::NoWarps));
    assert_eq!(
        core.start(core::Launch {
            warp_enable: warp_mask_from_bits(1 << 9),
            ..launch(0)
        }),
        Err(LaunchError::WarpOutOfRange {
            warp_id: 9,
            num_warps: 8
        })
    );
    assert_eq!(core.state(), State::Idle);

    core.start(launch(0b1))?;
    assert_eq!(core.start(launch(0b1)), Err(LaunchError::Busy));
    Ok(())
}
