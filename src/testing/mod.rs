pub mod control_flow;
pub mod faults;
pub mod pipeline;
pub mod sync;

use crate::{
    config,
    core::{self, Core},
    func_unit::Fpu,
    mem::{DataMemory, InstructionMemory},
    warp::{self, Lanes},
};
use color_eyre::eyre;

pub const MAX_CYCLES: u64 = 20_000;

static LOGGER: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

/// Launch of the warps in `warps` with every lane enabled.
#[must_use]
pub fn launch(warps: u32) -> core::Launch {
    core::Launch {
        pc: 0,
        warp_enable: warp::warp_mask_from_bits(warps),
        thread_base: 0,
        block_idx: 0,
        block_dim: 0,
        grid_dim: 1,
    }
}

#[must_use]
pub fn lanes(f: impl Fn(u32) -> u32) -> Lanes {
    std::array::from_fn(|lane| f(lane as u32))
}

/// Launch on an idle core and step until the block finished.
pub fn run_core<I, D, F>(core: &mut Core<I, D, F>, launch: core::Launch) -> eyre::Result<u64>
where
    I: InstructionMemory,
    D: DataMemory,
    F: Fpu,
{
    init_logging();
    core.start(launch)?;
    let cycles = core.run(MAX_CYCLES)?;
    assert!(core.done(), "core finished without the done pulse");
    log::info!("finished after {} cycles: {:#?}", cycles, core.stats());
    Ok(cycles)
}

pub fn run(
    config: config::Core,
    program: Vec<u32>,
    launch: core::Launch,
) -> eyre::Result<core::Simple> {
    let mut core = core::Simple::from_program(config, program)?;
    run_core(&mut core, launch)?;
    Ok(core)
}
