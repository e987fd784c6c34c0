use super::{Completed, Executed};
use crate::core::Error;
use crate::mem::{self, DataMemory};
use crate::warp::ActiveMask;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum State {
    #[default]
    Idle,
    /// The data memory was not ready to accept the request.
    Request,
    Wait,
    Done,
}

/// Memory stage.
///
/// Drives the coalesced data memory for the instruction in the EX/MEM latch.
#[derive(Debug, Default, Clone)]
pub struct MemoryStage {
    state: State,
    uid: Option<u64>,
    response: Option<mem::Response>,
    pub num_requests: u64,
}

impl MemoryStage {
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Handshake with the data memory.
    pub fn poll(&mut self, executed: Option<&Executed>, dmem: &mut dyn DataMemory) {
        let Some((uid, request)) =
            executed.and_then(|executed| Some((executed.instr.uid, executed.access.as_ref()?)))
        else {
            return;
        };
        if self.uid != Some(uid) {
            self.retire();
            self.uid = Some(uid);
        }
        match self.state {
            State::Idle | State::Request => {
                if dmem.ready() {
                    dmem.send(request.clone());
                    self.num_requests += 1;
                    self.state = State::Wait;
                } else {
                    self.state = State::Request;
                }
            }
            State::Wait => {
                if let Some(response) = dmem.take_response() {
                    self.response = Some(response);
                    self.state = State::Done;
                }
            }
            State::Done => {}
        }
    }

    /// The instruction in the EX/MEM latch still waits for its data.
    #[must_use]
    pub fn busy(&self, executed: Option<&Executed>) -> bool {
        match executed {
            Some(executed) if executed.access.is_some() => {
                self.uid != Some(executed.instr.uid) || self.state != State::Done
            }
            _ => false,
        }
    }

    /// Result handed to writeback.
    pub fn output(&self, executed: &Executed) -> Result<Completed, Error> {
        let instr = &executed.instr;
        let mut result = executed.result;
        if let Some(request) = &executed.access {
            let response = self
                .response
                .as_ref()
                .filter(|_| self.uid == Some(instr.uid) && self.state == State::Done);
            let lane_valid = response.map_or(ActiveMask::ZERO, |response| response.lane_valid);
            let missing = request.lane_valid & !lane_valid;
            if missing.any() {
                return Err(Error::MemoryFault {
                    warp_id: instr.warp_id,
                    pc: instr.pc,
                    lanes: missing.data[0],
                });
            }
            if let (false, Some(response), Some((size, signed))) = (
                request.is_write,
                response,
                instr.opcode.and_then(|op| op.access()),
            ) {
                for lane in request.lane_valid.iter_ones() {
                    result[lane] = size.extend(response.lane_rdata[lane], signed);
                }
            }
        }
        Ok(Completed {
            instr: instr.clone(),
            mask: executed.mask,
            result,
            terminal: executed.terminal,
        })
    }

    /// The instruction left the memory stage.
    pub fn retire(&mut self) {
        self.state = State::Idle;
        self.uid = None;
        self.response = None;
    }
}
