use crate::branch_predictor;
use crate::pipeline::Stall;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stalls {
    pub memory: u64,
    pub fpu: u64,
    pub load_use: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warp {
    pub fetched: u64,
    pub issued: u64,
    pub completed: u64,
    pub flushes: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub divergences: u64,
    pub reconvergences: u64,
    /// Lanes parked on the stack resumed after the running lanes returned.
    pub resumes: u64,
    /// Per-warp flushes after execute redirected a warp.
    pub flushes: u64,
    /// Fetch redirects of predicted taken branches.
    pub predicted_redirects: u64,
    pub barrier_releases: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub cycles: u64,
    /// Cycles without an accepted fetch.
    pub idle_cycles: u64,
    pub fetched: u64,
    /// Instructions leaving decode.
    pub issued: u64,
    pub completed: u64,
    /// Sum of active lanes over completed instructions.
    pub thread_instructions: u64,
    pub control: Control,
    pub branch: branch_predictor::Stats,
    pub stalls: Stalls,
    pub data_memory_requests: u64,
    pub warps: Vec<Warp>,
}

impl Stats {
    #[must_use]
    pub fn new(num_warps: usize) -> Self {
        Self {
            warps: vec![Warp::default(); num_warps],
            ..Self::default()
        }
    }

    pub fn stall(&mut self, stall: Stall) {
        match stall {
            Stall::Memory => self.stalls.memory += 1,
            Stall::Fpu => self.stalls.fpu += 1,
            Stall::LoadUse => self.stalls.load_use += 1,
        }
    }

    /// Average active lanes per completed instruction.
    #[must_use]
    pub fn simd_efficiency(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.thread_instructions as f64 / self.completed as f64
    }
}
