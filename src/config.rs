use crate::warp::MAX_WARPS_PER_CORE;
use color_eyre::eyre::{self, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Warp scheduler policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr)]
pub enum SchedulerKind {
    /// Greedy then oldest.
    #[default]
    GTO,
    /// Oldest ready warp only, no greedy continuation.
    OLDEST,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("num_warps must be in 1..={max} (got {got})")]
    NumWarps { got: usize, max: usize },
    #[error("{name} must be at least {min} (got {got})")]
    TooSmall {
        name: &'static str,
        got: u64,
        min: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Core {
    /// Number of warp slots.
    pub num_warps: usize,
    /// Maximum nesting of divergent branches per warp.
    pub simt_stack_depth: usize,
    /// Number of named block barriers.
    pub num_barriers: usize,
    /// Warp scheduling policy.
    pub scheduler: SchedulerKind,
    /// Cycles from instruction request to response.
    pub instruction_memory_latency: u64,
    /// Cycles from data request to response.
    pub data_memory_latency: u64,
    /// Size of the data memory in bytes.
    pub data_memory_size: usize,
    /// FPU divide latency.
    pub fpu_div_latency: u64,
    /// FPU square root latency.
    pub fpu_sqrt_latency: u64,
    /// Fail when no instruction retires for this many cycles.
    pub watchdog_cycles: Option<u64>,
    /// Only log the pipeline after this cycle.
    pub log_after_cycle: Option<u64>,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            num_warps: 8,
            simt_stack_depth: crate::simt_stack::DEFAULT_DEPTH,
            num_barriers: 16,
            scheduler: SchedulerKind::GTO,
            instruction_memory_latency: 1,
            data_memory_latency: 2,
            data_memory_size: 64 * 1024,
            fpu_div_latency: 8,
            fpu_sqrt_latency: 8,
            watchdog_cycles: Some(10_000),
            log_after_cycle: None,
        }
    }
}

impl Core {
    pub fn from_yaml(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let reader = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to open config {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(std::io::BufReader::new(reader))
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_warps == 0 || self.num_warps > MAX_WARPS_PER_CORE {
            return Err(Error::NumWarps {
                got: self.num_warps,
                max: MAX_WARPS_PER_CORE,
            });
        }
        let minimums = [
            ("simt_stack_depth", self.simt_stack_depth as u64, 1),
            ("num_barriers", self.num_barriers as u64, 1),
            (
                "instruction_memory_latency",
                self.instruction_memory_latency,
                1,
            ),
            ("data_memory_latency", self.data_memory_latency, 1),
            ("fpu_div_latency", self.fpu_div_latency, 1),
            ("fpu_sqrt_latency", self.fpu_sqrt_latency, 1),
            ("watchdog_cycles", self.watchdog_cycles.unwrap_or(1), 1),
        ];
        for (name, got, min) in minimums {
            if got < min {
                return Err(Error::TooSmall { name, got, min });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn should_log(&self, cycle: u64) -> bool {
        self.log_after_cycle.map_or(true, |after| cycle >= after)
    }
}
