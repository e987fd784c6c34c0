use super::{Fpu, FpuOp};
use crate::engine::cycle::Component;
use crate::{
    config,
    warp::{ActiveMask, Lanes, WARP_SIZE},
};

/// Software single precision FPU.
#[derive(Debug, Clone)]
pub struct SoftFpu {
    div_latency: u64,
    sqrt_latency: u64,
    remaining: u64,
    result: Option<Lanes>,
    pub num_operations: u64,
}

impl SoftFpu {
    #[must_use]
    pub fn new(config: &config::Core) -> Self {
        Self {
            div_latency: config.fpu_div_latency,
            sqrt_latency: config.fpu_sqrt_latency,
            remaining: 0,
            result: None,
            num_operations: 0,
        }
    }

    fn latency(&self, op: FpuOp) -> u64 {
        match op {
            FpuOp::Div => self.div_latency,
            FpuOp::Sqrt => self.sqrt_latency,
            _ => 1,
        }
    }
}

/// Evaluate one lane.
#[must_use]
pub fn evaluate(op: FpuOp, a: u32, b: u32, c: u32) -> u32 {
    let (fa, fb, fc) = (f32::from_bits(a), f32::from_bits(b), f32::from_bits(c));
    match op {
        FpuOp::Add => (fa + fb).to_bits(),
        FpuOp::Sub => (fa - fb).to_bits(),
        FpuOp::Mul => (fa * fb).to_bits(),
        FpuOp::Div => (fa / fb).to_bits(),
        FpuOp::Madd => fa.mul_add(fb, fc).to_bits(),
        FpuOp::Msub => fa.mul_add(fb, -fc).to_bits(),
        FpuOp::Sqrt => fa.sqrt().to_bits(),
        FpuOp::Abs => a & 0x7FFF_FFFF,
        FpuOp::Neg => a ^ 0x8000_0000,
        FpuOp::Min => fa.min(fb).to_bits(),
        FpuOp::Max => fa.max(fb).to_bits(),
        // saturating, NaN converts to 0
        FpuOp::CvtWS => (fa as i32) as u32,
        FpuOp::CvtSW => (a as i32 as f32).to_bits(),
        FpuOp::CmpEq => u32::from(fa == fb),
        FpuOp::CmpLt => u32::from(fa < fb),
        FpuOp::CmpLe => u32::from(fa <= fb),
    }
}

impl Component for SoftFpu {
    fn cycle(&mut self, _cycle: u64) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

impl Fpu for SoftFpu {
    fn start(&mut self, op: FpuOp, a: &Lanes, b: &Lanes, c: &Lanes, active_mask: ActiveMask) {
        debug_assert!(!self.busy(), "fpu started while busy");
        let mut result = [0; WARP_SIZE];
        for lane in active_mask.iter_ones() {
            result[lane] = evaluate(op, a[lane], b[lane], c[lane]);
        }
        self.num_operations += 1;
        self.remaining = self.latency(op).saturating_sub(1);
        self.result = Some(result);
    }

    fn busy(&self) -> bool {
        self.remaining > 0
    }

    fn result_valid(&self) -> bool {
        self.result.is_some() && self.remaining == 0
    }

    fn take_result(&mut self) -> Option<Lanes> {
        if self.busy() {
            return None;
        }
        self.result.take()
    }
}
