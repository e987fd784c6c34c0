use serde::{Deserialize, Serialize};

/// Outstanding prediction of one warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub branch_pc: u32,
    pub predicted_taken: bool,
    pub predicted_target: u32,
    pub fallthrough_pc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub taken: bool,
    pub target: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub misprediction: bool,
    pub correct_pc: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub predictions: u64,
    pub predicted_taken: u64,
    pub resolved: u64,
    pub mispredictions: u64,
}

/// Static backward-taken / forward-not-taken predictor.
#[derive(Debug, Clone)]
pub struct Btfn {
    records: Box<[Option<Record>]>,
    pub stats: Stats,
}

impl Btfn {
    #[must_use]
    pub fn new(num_warps: usize) -> Self {
        Self {
            records: vec![None; num_warps].into_boxed_slice(),
            stats: Stats::default(),
        }
    }

    /// Predict a branch with a pc-relative offset.
    #[must_use]
    pub fn predict(pc: u32, offset: i32) -> Prediction {
        let taken = offset < 0;
        let target = if taken {
            pc.wrapping_add_signed(offset)
        } else {
            pc.wrapping_add(4)
        };
        Prediction { taken, target }
    }

    /// Record the prediction made for a branch leaving decode.
    pub fn record(&mut self, warp_id: usize, pc: u32, prediction: Prediction) {
        if let Some(stale) = self.records[warp_id] {
            log::warn!(
                "branch predictor: warp {} overwrites unresolved prediction for {:#06x}",
                warp_id,
                stale.branch_pc
            );
        }
        self.stats.predictions += 1;
        if prediction.taken {
            self.stats.predicted_taken += 1;
        }
        self.records[warp_id] = Some(Record {
            branch_pc: pc,
            predicted_taken: prediction.taken,
            predicted_target: prediction.target,
            fallthrough_pc: pc.wrapping_add(4),
        });
    }

    #[must_use]
    pub fn outstanding(&self, warp_id: usize) -> Option<&Record> {
        self.records[warp_id].as_ref()
    }

    /// Compare the actual outcome of a control transfer against the outstanding record.
    #[must_use]
    pub fn evaluate(
        &self,
        warp_id: usize,
        pc: u32,
        actual_taken: bool,
        actual_target: u32,
    ) -> Resolution {
        let record = self.records[warp_id].filter(|record| record.branch_pc == pc);
        match record {
            None if actual_taken => Resolution {
                misprediction: true,
                correct_pc: actual_target,
            },
            None => Resolution {
                misprediction: false,
                correct_pc: pc.wrapping_add(4),
            },
            Some(record) if record.predicted_taken != actual_taken => Resolution {
                misprediction: true,
                correct_pc: if actual_taken {
                    actual_target
                } else {
                    record.fallthrough_pc
                },
            },
            Some(record) if actual_taken && record.predicted_target != actual_target => {
                Resolution {
                    misprediction: true,
                    correct_pc: actual_target,
                }
            }
            Some(record) => Resolution {
                misprediction: false,
                correct_pc: if actual_taken {
                    actual_target
                } else {
                    record.fallthrough_pc
                },
            },
        }
    }

    /// Retire the outstanding record of a warp after execute resolved it.
    pub fn resolve(&mut self, warp_id: usize, resolution: &Resolution) {
        self.records[warp_id] = None;
        self.stats.resolved += 1;
        if resolution.misprediction {
            self.stats.mispredictions += 1;
        }
    }

    /// Drop a warp's record when its branch was squashed.
    pub fn clear(&mut self, warp_id: usize) {
        self.records[warp_id] = None;
    }

    pub fn reset(&mut self) {
        self.records.fill(None);
    }
}
