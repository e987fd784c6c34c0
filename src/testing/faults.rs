use super::{init_logging, launch};
use crate::barrier::InvalidBarrier;
use crate::config;
use crate::core::{self, Core, Error};
use crate::engine::cycle::Component;
use crate::func_unit::SoftFpu;
use crate::instruction::{encode, Opcode};
use crate::mem::{self, DataMemory, ProgramMemory};
use crate::register_file::special::LANE_IDX;
use crate::simt_stack;
use color_eyre::eyre;

/// Data memory that accepts requests and never answers.
#[derive(Debug, Default)]
struct Unresponsive {
    num_requests: u64,
}

impl Component for Unresponsive {
    fn cycle(&mut self, _cycle: u64) {}
}

impl DataMemory for Unresponsive {
    fn ready(&self) -> bool {
        true
    }

    fn send(&mut self, _request: mem::Request) {
        self.num_requests += 1;
    }

    fn take_response(&mut self) -> Option<mem::Response> {
        None
    }
}

fn run_to_error(config: config::Core, program: Vec<u32>) -> eyre::Result<Error> {
    init_logging();
    let mut core = core::Simple::from_program(config, program)?;
    core.start(launch(0b1))?;
    match core.run(super::MAX_CYCLES) {
        Ok(cycles) => Err(eyre::eyre!("finished after {cycles} cycles")),
        Err(err) => Ok(err),
    }
}

#[test]
fn test_illegal_instruction() -> eyre::Result<()> {
    let program = vec![encode::nop(), 0xFC00_0000, encode::ret()];
    let err = run_to_error(config::Core::default(), program)?;
    assert_eq!(
        err,
        Error::IllegalInstruction {
            warp_id: 0,
            pc: 4,
            raw: 0xFC00_0000
        }
    );
    Ok(())
}

#[test]
fn test_out_of_range_load_faults() -> eyre::Result<()> {
    let program = vec![encode::i(Opcode::LW, 7, 0, -4), encode::ret()];
    let err = run_to_error(config::Core::default(), program)?;
    assert_eq!(
        err,
        Error::MemoryFault {
            warp_id: 0,
            pc: 0,
            lanes: u32::MAX
        }
    );
    Ok(())
}

#[test]
fn test_nested_divergence_overflows_stack() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::ANDI, 7, LANE_IDX, 1),
        encode::b(Opcode::BEQ, 7, 0, 16),
        encode::ret(),
        encode::nop(),
        encode::nop(),
        // 0x14: even lanes diverge again
        encode::i(Opcode::ANDI, 8, LANE_IDX, 2),
        encode::b(Opcode::BEQ, 8, 0, 8),
        encode::ret(),
        encode::ret(),
    ];
    let config = config::Core {
        simt_stack_depth: 1,
        ..config::Core::default()
    };
    let err = run_to_error(config, program)?;
    assert_eq!(
        err,
        Error::Stack {
            warp_id: 0,
            source: simt_stack::Error::Overflow { depth: 1 }
        }
    );
    Ok(())
}

#[test]
fn test_invalid_barrier_id() -> eyre::Result<()> {
    let err = run_to_error(config::Core::default(), vec![encode::bar(20), encode::ret()])?;
    assert_eq!(
        err,
        Error::InvalidBarrier {
            warp_id: 0,
            source: InvalidBarrier {
                bar_id: 20,
                num_barriers: 16
            }
        }
    );
    Ok(())
}

#[test]
fn test_cycle_limit() -> eyre::Result<()> {
    init_logging();
    let mut core = core::Simple::from_program(config::Core::default(), vec![encode::j(0)])?;
    core.start(launch(0b1))?;
    assert_eq!(core.run(200), Err(Error::CycleLimit { max_cycles: 200 }));
    assert!(core.busy());
    Ok(())
}

#[test]
fn test_watchdog_names_memory_stall() -> eyre::Result<()> {
    init_logging();
    let config = config::Core {
        watchdog_cycles: Some(50),
        ..config::Core::default()
    };
    let imem = ProgramMemory::new(
        vec![encode::i(Opcode::LW, 7, 0, 0), encode::ret()],
        config.instruction_memory_latency,
    );
    let fpu = SoftFpu::new(&config);
    let mut core = Core::new(config, imem, Unresponsive::default(), fpu)?;
    core.start(launch(0b1))?;

    let err = core.run(super::MAX_CYCLES).err();
    assert_eq!(
        err,
        Some(Error::Watchdog {
            cycles: 50,
            reason: "Memory".to_string()
        })
    );
    assert_eq!(core.dmem().num_requests, 1);
    assert!(core.stats().stalls.memory > 0);
    Ok(())
}

#[test]
fn test_lone_warp_passes_barrier() -> eyre::Result<()> {
    init_logging();
    let config = config::Core {
        num_warps: 2,
        ..config::Core::default()
    };
    let mut core = core::Simple::from_program(config, vec![encode::bar(0), encode::ret()])?;
    core.start(launch(0b1))?;
    core.run(super::MAX_CYCLES)?;
    assert_eq!(core.stats().control.barrier_releases, 1);
    Ok(())
}

#[test]
fn test_rejects_out_of_range_config() {
    let too_many_warps = config::Core {
        num_warps: 33,
        ..config::Core::default()
    };
    let err = core::Simple::from_program(too_many_warps, vec![encode::ret()]).err();
    assert_eq!(
        err,
        Some(config::Error::NumWarps { got: 33, max: 32 })
    );

    let no_stack = config::Core {
        simt_stack_depth: 0,
        ..config::Core::default()
    };
    let imem = ProgramMemory::new(vec![encode::ret()], 1);
    let fpu = SoftFpu::new(&no_stack);
    let err = Core::new(no_stack, imem, Unresponsive::default(), fpu).err();
    assert_eq!(
        err,
        Some(config::Error::TooSmall {
            name: "simt_stack_depth",
            got: 0,
            min: 1
        })
    );
}

#[test]
fn test_indirect_jump_with_lane_dependent_target() -> eyre::Result<()> {
    let program = vec![
        encode::i(Opcode::SLLI, 7, LANE_IDX, 2),
        encode::i(Opcode::JALR, 0, 7, 8),
        encode::ret(),
        encode::ret(),
    ];
    let err = run_to_error(config::Core::default(), program)?;
    assert_eq!(
        err,
        Error::DivergentJump {
            warp_id: 0,
            pc: 4,
            target: 8,
            other: 12
        }
    );
    Ok(())
}
