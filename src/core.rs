use crate::{
    barrier,
    branch_predictor::Btfn,
    config,
    func_unit::{Fpu, FpuOp, SoftFpu},
    mem::{DataMemory, InstructionMemory, LatencyMemory, ProgramMemory},
    pipeline::{
        decode, execute,
        fetch::{self, Fetch},
        memory::MemoryStage,
        writeback, Completed, Executed, Fetched, Issued, Stall,
    },
    register_file::{RegisterFile, Seed},
    scheduler::{self, Scheduler, Selection},
    scoreboard::{self, Access, Scoreboard},
    simt_stack::{self, SimtStack},
    stats::Stats,
    warp::{self, ActiveMask, Lanes, Status, WarpMask, WARP_SIZE},
};
use console::style;

/// Fatal simulation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("warp {warp_id}: {source}")]
    Stack {
        warp_id: usize,
        source: simt_stack::Error,
    },
    #[error("warp {warp_id}: illegal instruction {raw:#010x} at pc {pc:#06x}")]
    IllegalInstruction { warp_id: usize, pc: u32, raw: u32 },
    #[error("warp {warp_id}: memory access at pc {pc:#06x} faulted for lanes {lanes:#010x}")]
    MemoryFault { warp_id: usize, pc: u32, lanes: u32 },
    #[error("warp {warp_id}: indirect jump at pc {pc:#06x} to both {target:#06x} and {other:#06x}")]
    DivergentJump {
        warp_id: usize,
        pc: u32,
        target: u32,
        other: u32,
    },
    #[error("warp {warp_id}: {source}")]
    InvalidBarrier {
        warp_id: usize,
        source: barrier::InvalidBarrier,
    },
    #[error("no instruction completed for {cycles} cycles (waiting on {reason})")]
    Watchdog { cycles: u64, reason: String },
    #[error("kernel did not finish within {max_cycles} cycles")]
    CycleLimit { max_cycles: u64 },
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchError {
    #[error("core is busy")]
    Busy,
    #[error("no warp enabled")]
    NoWarps,
    #[error("warp {warp_id} enabled but the core only has {num_warps} warps")]
    WarpOutOfRange { warp_id: usize, num_warps: usize },
}

/// Launch parameters of a thread block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub pc: u32,
    pub warp_enable: WarpMask,
    pub thread_base: u32,
    pub block_idx: u32,
    /// Threads in the block, 0 enables every lane of the enabled warps.
    pub block_dim: u32,
    pub grid_dim: u32,
}

impl Launch {
    #[must_use]
    pub fn seed(&self) -> Seed {
        Seed {
            thread_base: self.thread_base,
            block_idx: self.block_idx,
            block_dim: self.block_dim,
            grid_dim: self.grid_dim,
        }
    }

    /// Initial active mask of a warp.
    #[must_use]
    pub fn active_mask(&self, warp_id: usize) -> ActiveMask {
        let mut mask = ActiveMask::ZERO;
        for lane in 0..WARP_SIZE {
            let thread = (warp_id * WARP_SIZE + lane) as u64;
            mask.set(lane, self.block_dim == 0 || thread < u64::from(self.block_dim));
        }
        mask
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum State {
    #[default]
    Idle,
    /// Initializes one enabled warp per cycle.
    Init { next_warp: usize },
    Run,
    /// One cycle pulse after the last warp finished.
    Done,
}

#[derive(Debug, Clone, Copy)]
struct FpuOperation {
    uid: u64,
    result: Option<Lanes>,
}

/// SIMT core.
///
/// All warps share one fetch, decode, execute, memory and writeback pipeline.
pub struct Core<I, D, F> {
    pub config: config::Core,
    state: State,
    launch: Option<Launch>,
    cycle: u64,

    imem: I,
    dmem: D,
    fpu: F,

    warps: warp::Contexts,
    stacks: Box<[SimtStack]>,
    registers: RegisterFile,
    scoreboard: Scoreboard,
    predictor: Btfn,
    barriers: barrier::BarrierSet,
    scheduler: Box<dyn Scheduler>,

    fetch: Fetch,
    memory: MemoryStage,
    if_id: Option<Fetched>,
    id_ex: Option<Issued>,
    ex_mem: Option<Executed>,
    mem_wb: Option<Completed>,
    fpu_operation: Option<FpuOperation>,

    next_uid: u64,
    cycles_without_completion: u64,
    stats: Stats,
}

impl<I, D, F> std::fmt::Debug for Core<I, D, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state)
            .field("cycle", &self.cycle)
            .finish()
    }
}

/// Core with the reference memories and FPU.
pub type Simple = Core<ProgramMemory, LatencyMemory, SoftFpu>;

impl Simple {
    pub fn from_program(config: config::Core, program: Vec<u32>) -> Result<Self, config::Error> {
        let imem = ProgramMemory::new(program, config.instruction_memory_latency);
        let dmem = LatencyMemory::new(config.data_memory_size, config.data_memory_latency);
        let fpu = SoftFpu::new(&config);
        Self::new(config, imem, dmem, fpu)
    }
}

impl<I, D, F> Core<I, D, F>
where
    I: InstructionMemory,
    D: DataMemory,
    F: Fpu,
{
    /// Build a core around its collaborators.
    ///
    /// # Errors
    /// When the configuration is out of range.
    pub fn new(config: config::Core, imem: I, dmem: D, fpu: F) -> Result<Self, config::Error> {
        config.validate()?;
        let num_warps = config.num_warps;
        Ok(Self {
            state: State::Idle,
            launch: None,
            cycle: 0,
            imem,
            dmem,
            fpu,
            warps: warp::Contexts::new(num_warps),
            stacks: (0..num_warps)
                .map(|_| SimtStack::new(config.simt_stack_depth))
                .collect(),
            registers: RegisterFile::new(num_warps),
            scoreboard: Scoreboard::new(num_warps),
            predictor: Btfn::new(num_warps),
            barriers: barrier::BarrierSet::new(config.num_barriers),
            scheduler: scheduler::from_config(&config),
            fetch: Fetch::default(),
            memory: MemoryStage::default(),
            if_id: None,
            id_ex: None,
            ex_mem: None,
            mem_wb: None,
            fpu_operation: None,
            next_uid: 1,
            cycles_without_completion: 0,
            stats: Stats::new(num_warps),
            config,
        })
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn busy(&self) -> bool {
        matches!(self.state, State::Init { .. } | State::Run)
    }

    /// The block finished in the previous cycle.
    #[must_use]
    pub fn done(&self) -> bool {
        self.state == State::Done
    }

    #[must_use]
    pub fn current_cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn warps(&self) -> &warp::Contexts {
        &self.warps
    }

    #[must_use]
    pub fn stack(&self, warp_id: usize) -> &SimtStack {
        &self.stacks[warp_id]
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    #[must_use]
    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    #[must_use]
    pub fn imem(&self) -> &I {
        &self.imem
    }

    #[must_use]
    pub fn dmem(&self) -> &D {
        &self.dmem
    }

    pub fn dmem_mut(&mut self) -> &mut D {
        &mut self.dmem
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let mut stats = self.stats.clone();
        stats.branch = self.predictor.stats;
        stats.control.barrier_releases = self.barriers.num_releases;
        stats.data_memory_requests = self.memory.num_requests;
        stats
    }

    /// Launch a thread block.
    pub fn start(&mut self, launch: Launch) -> Result<(), LaunchError> {
        if self.busy() {
            return Err(LaunchError::Busy);
        }
        if launch.warp_enable.not_any() {
            return Err(LaunchError::NoWarps);
        }
        let num_warps = self.warps.len();
        if let Some(warp_id) = launch.warp_enable.iter_ones().find(|&w| w >= num_warps) {
            return Err(LaunchError::WarpOutOfRange { warp_id, num_warps });
        }

        for warp_id in 0..num_warps {
            self.warps.reset(warp_id);
            self.stacks[warp_id].clear();
        }
        self.scoreboard.clear();
        self.predictor.reset();
        self.scheduler.reset();
        self.fetch.reset();
        self.memory.retire();
        self.if_id = None;
        self.id_ex = None;
        self.ex_mem = None;
        self.mem_wb = None;
        self.fpu_operation = None;
        self.cycles_without_completion = 0;

        log::debug!(
            "core: launch at pc {:#06x} with warps {:?}",
            launch.pc,
            launch.warp_enable.iter_ones().collect::<Vec<_>>()
        );
        self.launch = Some(launch);
        self.state = State::Init { next_warp: 0 };
        Ok(())
    }

    /// Step until the launched block finished.
    ///
    /// Returns the number of cycles it took.
    pub fn run(&mut self, max_cycles: u64) -> Result<u64, Error> {
        let start = self.cycle;
        while self.busy() {
            if self.cycle - start >= max_cycles {
                return Err(Error::CycleLimit { max_cycles });
            }
            self.cycle()?;
        }
        Ok(self.cycle - start)
    }

    /// Advance the core by one cycle.
    #[tracing::instrument(name = "core_cycle", skip(self), fields(cycle = self.cycle))]
    pub fn cycle(&mut self) -> Result<(), Error> {
        let cycle = self.cycle;
        self.imem.cycle(cycle);
        self.dmem.cycle(cycle);
        self.fpu.cycle(cycle);

        let result = match self.state {
            State::Idle => Ok(()),
            State::Done => {
                self.state = State::Idle;
                Ok(())
            }
            State::Init { next_warp } => {
                self.init_warp(next_warp);
                Ok(())
            }
            State::Run => self.run_cycle(),
        };
        self.cycle += 1;
        result
    }

    fn init_warp(&mut self, next_warp: usize) {
        let Some(launch) = self.launch else {
            self.state = State::Idle;
            return;
        };
        let enabled = launch
            .warp_enable
            .iter_ones()
            .find(|&warp_id| warp_id >= next_warp && warp_id < self.warps.len());

        let Some(warp_id) = enabled else {
            self.barriers.launch(self.warps.active_warps());
            self.state = State::Run;
            log::debug!("core: {} warps initialized", launch.warp_enable.count_ones());
            return;
        };
        let mask = launch.active_mask(warp_id);
        self.warps.init(warp_id, launch.pc, mask);
        self.registers.seed(warp_id, &launch.seed());
        self.stacks[warp_id].clear();
        log::debug!(
            "core: init warp {} at pc {:#06x} with mask {:#010x}",
            warp_id,
            launch.pc,
            mask.data[0]
        );
        self.state = State::Init {
            next_warp: warp_id + 1,
        };
    }

    /// Start the FPU for the instruction in execute and collect its result.
    fn poll_fpu(&mut self) {
        let Some(issued) = self.id_ex.as_ref().filter(|issued| issued.instr.is_fpu()) else {
            return;
        };
        let uid = issued.instr.uid;
        let started = self.fpu_operation.is_some_and(|op| op.uid == uid);
        if !started && !self.fpu.busy() {
            let Some(op) = issued.instr.opcode.and_then(FpuOp::from_opcode) else {
                return;
            };
            let mask = execute::effective_mask(&issued.instr, &self.stacks[issued.instr.warp_id]);
            let [a, b, c] = &issued.operands;
            self.fpu.start(op, a, b, c, mask);
            self.fpu_operation = Some(FpuOperation { uid, result: None });
        }
        if let Some(operation) = self.fpu_operation.as_mut() {
            if operation.uid == uid && operation.result.is_none() && self.fpu.result_valid() {
                operation.result = self.fpu.take_result();
            }
        }
    }

    fn fpu_result(&self, uid: u64) -> Option<&Lanes> {
        self.fpu_operation
            .as_ref()
            .filter(|op| op.uid == uid)
            .and_then(|op| op.result.as_ref())
    }

    fn stall(&self) -> Option<Stall> {
        if self.memory.busy(self.ex_mem.as_ref()) {
            return Some(Stall::Memory);
        }
        let fpu_busy = self
            .id_ex
            .as_ref()
            .is_some_and(|issued| issued.instr.is_fpu() && self.fpu_result(issued.instr.uid).is_none());
        if fpu_busy {
            return Some(Stall::Fpu);
        }
        None
    }

    fn watchdog(&mut self, stall: Option<Stall>) -> Result<(), Error> {
        let Some(limit) = self.config.watchdog_cycles else {
            return Ok(());
        };
        if self.cycles_without_completion < limit {
            return Ok(());
        }
        let reason = match stall {
            Some(stall) => stall.as_ref().to_string(),
            None if self.warps.iter().any(|warp| warp.status == Status::Blocked) => {
                "barrier".to_string()
            }
            None => "fetch".to_string(),
        };
        Err(Error::Watchdog {
            cycles: self.cycles_without_completion,
            reason,
        })
    }

    /// Wake warps released from a barrier.
    fn wake(&mut self, warps: WarpMask) {
        for warp_id in warps.iter_ones() {
            if self.warps.get(warp_id).status == Status::Blocked {
                self.warps.set_status(warp_id, Status::Ready);
            }
        }
    }

    /// Terminal return of a warp left writeback.
    fn exit_warp(&mut self, warp_id: usize) {
        self.warps.set_mask(warp_id, ActiveMask::ZERO);
        self.stacks[warp_id].clear();
        self.predictor.clear(warp_id);
        let released = self.barriers.warp_exited(warp_id);
        self.wake(released);
        log::debug!("core: warp {} done", warp_id);
    }

    fn run_cycle(&mut self) -> Result<(), Error> {
        let cycle = self.cycle;
        let verbose = self.config.should_log(cycle);
        self.stats.cycles += 1;

        // collaborator handshakes
        if let Some(event) = self.fetch.poll(&mut self.imem) {
            let (fetch::Event::Arrived { warp_id } | fetch::Event::Dropped { warp_id }) = event;
            if self.warps.get(warp_id).status == Status::Running {
                self.warps.set_status(warp_id, Status::Ready);
            }
        }
        self.memory.poll(self.ex_mem.as_ref(), &mut self.dmem);
        self.poll_fpu();

        if let Some(stall) = self.stall() {
            if verbose {
                log::debug!(
                    "{}",
                    style(format!("cycle {cycle:03} core: stall ({})", stall.as_ref())).magenta()
                );
            }
            self.stats.stall(stall);
            self.stats.idle_cycles += 1;
            self.cycles_without_completion += 1;
            return self.watchdog(Some(stall));
        }

        // compute every stage from the current latches
        let mem_out = self
            .ex_mem
            .as_ref()
            .map(|executed| self.memory.output(executed))
            .transpose()?;

        let ex_out = match &self.id_ex {
            Some(issued) => Some(execute::execute(
                issued,
                &self.stacks[issued.instr.warp_id],
                &self.predictor,
                self.fpu_result(issued.instr.uid),
            )?),
            None => None,
        };
        let ex_redirect = ex_out
            .as_ref()
            .filter(|outcome| outcome.redirect)
            .map(|outcome| outcome.executed.instr.warp_id);

        let decoded = self.if_id.as_ref().map(|fetched| {
            let producers = crate::forwarding::Producers {
                ex: ex_out.as_ref().and_then(|outcome| outcome.executed.producer()),
                mem: mem_out.as_ref().and_then(Completed::producer),
                wb: self.mem_wb.as_ref().and_then(Completed::producer),
            };
            decode::decode(
                fetched,
                self.next_uid,
                &producers,
                &self.registers,
                &self.scoreboard,
            )
        });
        let decode_squashed = decoded
            .as_ref()
            .is_some_and(|out| Some(out.issued.instr.warp_id) == ex_redirect);
        let load_use = !decode_squashed && decoded.as_ref().is_some_and(|out| out.load_use);
        let decode_redirect = decoded
            .as_ref()
            .filter(|_| !decode_squashed && !load_use)
            .and_then(|out| {
                let prediction = out.prediction.filter(|prediction| prediction.taken)?;
                Some((out.issued.instr.warp_id, prediction.target))
            });

        let if_id_free = self.if_id.is_none() || !load_use;
        let fetch_free = self.fetch.is_idle()
            || (self.fetch.state() == fetch::State::Done && if_id_free);
        // a warp held by the fetch unit is handed to decode before the next fetch is accepted
        let mut stalled = WarpMask::ZERO;
        for warp_id in [ex_redirect, decode_redirect.map(|(warp_id, _)| warp_id)]
            .into_iter()
            .flatten()
        {
            stalled.set(warp_id, true);
        }
        let selection = if fetch_free {
            self.scheduler.select(&self.warps, &stalled)
        } else {
            Selection::default()
        };

        // commit
        let completed = self.mem_wb.take();
        if let Some(completed) = &completed {
            let warp_id = completed.instr.warp_id;
            writeback::writeback(completed, &mut self.registers);
            self.stats.completed += 1;
            self.stats.thread_instructions += completed.mask.count_ones() as u64;
            self.stats.warps[warp_id].completed += 1;
            if verbose {
                log::debug!(
                    "{} {}",
                    style(format!("cycle {cycle:03} core: writeback")).cyan(),
                    completed.instr
                );
            }
            if completed.terminal {
                self.exit_warp(warp_id);
            }
        }

        if let Some(instr) = self.ex_mem.as_ref().map(|executed| &executed.instr) {
            if let Some(reg) = instr.dest() {
                self.scoreboard
                    .advance(instr.warp_id, reg, scoreboard::Stage::MEM, instr.uid);
            }
        }
        if let Some(instr) = self.id_ex.as_ref().map(|issued| &issued.instr) {
            if let Some(reg) = instr.dest() {
                self.scoreboard
                    .advance(instr.warp_id, reg, scoreboard::Stage::EX, instr.uid);
            }
        }
        if let Some(instr) = completed.as_ref().map(|completed| &completed.instr) {
            if let Some(reg) = instr.dest() {
                self.scoreboard.release(instr.warp_id, reg, instr.uid);
            }
        }

        if let Some(outcome) = &ex_out {
            self.commit_execute(outcome, verbose)?;
        }

        // shift latches
        if self.ex_mem.take().is_some() {
            self.memory.retire();
        }
        self.mem_wb = mem_out;
        self.ex_mem = ex_out.map(|outcome| outcome.executed);
        self.id_ex = None;
        self.fpu_operation = None;

        match decoded {
            Some(_) if load_use => {
                self.stats.stall(Stall::LoadUse);
                if verbose {
                    log::debug!(
                        "{}",
                        style(format!("cycle {cycle:03} core: decode (load use)")).magenta()
                    );
                }
            }
            Some(out) if !decode_squashed => {
                let instr = &out.issued.instr;
                let warp_id = instr.warp_id;
                if let Some(reg) = instr.dest() {
                    self.scoreboard
                        .reserve(warp_id, reg, instr.is_load(), instr.uid);
                }
                if let Some(prediction) = out.prediction {
                    self.predictor.record(warp_id, instr.pc, prediction);
                }
                if let Some((_, target)) = decode_redirect {
                    self.warps.set_pc(warp_id, target);
                    self.fetch.squash(warp_id);
                    self.stats.control.predicted_redirects += 1;
                }
                if verbose {
                    log::debug!(
                        "{} {}",
                        style(format!("cycle {cycle:03} core: decode")).blue(),
                        instr
                    );
                }
                self.next_uid += 1;
                self.stats.issued += 1;
                self.stats.warps[warp_id].issued += 1;
                self.if_id = None;
                self.id_ex = Some(out.issued);
            }
            Some(_) | None => self.if_id = None,
        }

        if self.if_id.is_none() {
            self.if_id = self.fetch.take();
        }

        match selection.warp_id {
            Some(warp_id) if self.fetch.is_idle() => {
                let warp = *self.warps.get(warp_id);
                self.fetch
                    .accept(warp_id, warp.pc, warp.active_mask, &mut self.imem);
                self.warps.set_status(warp_id, Status::Running);
                self.warps
                    .set_pc(warp_id, warp.pc.wrapping_add(crate::instruction::INSTRUCTION_SIZE));
                self.scheduler.issued(&mut self.warps, warp_id);
                self.stats.fetched += 1;
                self.stats.warps[warp_id].fetched += 1;
                if verbose {
                    log::debug!(
                        "{} warp {} pc {:#06x}",
                        style(format!("cycle {cycle:03} core: fetch")).green(),
                        warp_id,
                        warp.pc
                    );
                }
            }
            _ => self.stats.idle_cycles += 1,
        }

        if completed.is_some() {
            self.cycles_without_completion = 0;
        } else {
            self.cycles_without_completion += 1;
        }

        let drained = self.if_id.is_none()
            && self.id_ex.is_none()
            && self.ex_mem.is_none()
            && self.mem_wb.is_none()
            && !self.fetch.outstanding();
        if self.warps.all_done() && drained {
            log::debug!(
                "{}",
                style(format!("cycle {cycle:03} core: all warps done")).bold()
            );
            self.fetch.reset();
            self.state = State::Done;
            return Ok(());
        }
        self.watchdog(None)
    }

    fn commit_execute(&mut self, outcome: &execute::Outcome, verbose: bool) -> Result<(), Error> {
        let instr = &outcome.executed.instr;
        let warp_id = instr.warp_id;
        let cycle = self.cycle;
        if verbose {
            log::debug!(
                "{} {} mask={:#010x} next_pc={:#06x} redirect={}",
                style(format!("cycle {cycle:03} core: execute")).red(),
                instr,
                outcome.executed.mask.data[0],
                outcome.next_pc,
                outcome.redirect
            );
        }

        self.stacks[warp_id] = outcome.stack.clone();
        if let Some(resolution) = &outcome.resolution {
            self.predictor.resolve(warp_id, resolution);
        }
        let control = &mut self.stats.control;
        control.divergences += u64::from(outcome.control.diverged);
        control.reconvergences += u64::from(outcome.control.reconverged);
        control.resumes += u64::from(outcome.control.resumed);

        if outcome.redirect {
            self.fetch.squash(warp_id);
            self.scoreboard.flush_warp(warp_id);
            self.warps.set_pc(warp_id, outcome.next_pc);
            if outcome.next_mask.any() {
                self.warps.set_mask(warp_id, outcome.next_mask);
            }
            self.stats.control.flushes += 1;
            self.stats.warps[warp_id].flushes += 1;
        }

        match outcome.barrier {
            Some((barrier::Kind::Sync, bar_id)) => {
                let released = self
                    .barriers
                    .arrive(bar_id, warp_id)
                    .map_err(|source| Error::InvalidBarrier { warp_id, source })?;
                match released {
                    Some(warps) => self.wake(warps),
                    None => self.warps.set_status(warp_id, Status::Blocked),
                }
            }
            Some((barrier::Kind::Warp, _)) => {
                let woken = self.barriers.warp_sync(warp_id);
                self.wake(woken);
            }
            None => {}
        }

        if outcome.terminal {
            self.warps.set_status(warp_id, Status::Waiting);
        }
        Ok(())
    }
}
