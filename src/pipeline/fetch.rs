use super::Fetched;
use crate::mem::InstructionMemory;
use crate::warp::ActiveMask;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum State {
    #[default]
    Idle,
    /// Accepted a warp, the instruction memory was not ready yet.
    Requesting,
    /// Request sent, waiting for the response.
    Waiting,
    /// Holds an instruction for decode.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Request {
    warp_id: usize,
    pc: u32,
    active_mask: ActiveMask,
}

/// What happened to an outstanding request this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The instruction word arrived for a warp.
    Arrived { warp_id: usize },
    /// The response of a squashed request was dropped.
    Dropped { warp_id: usize },
}

/// Fetch unit.
///
/// Holds at most one instruction request at a time.
#[derive(Debug, Default, Clone)]
pub struct Fetch {
    state: State,
    request: Option<Request>,
    fetched: Option<Fetched>,
    squashed: bool,
    pub num_fetches: u64,
    pub num_squashed: u64,
}

impl Fetch {
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Warp of the request held by the unit, if any.
    #[must_use]
    pub fn warp_id(&self) -> Option<usize> {
        match self.state {
            State::Idle => None,
            State::Requesting | State::Waiting => self.request.map(|req| req.warp_id),
            State::Done => self.fetched.as_ref().map(|fetched| fetched.warp_id),
        }
    }

    /// Instruction ready for decode.
    #[must_use]
    pub fn fetched(&self) -> Option<&Fetched> {
        self.fetched.as_ref()
    }

    /// Accept the warp selected by the scheduler.
    pub fn accept(
        &mut self,
        warp_id: usize,
        pc: u32,
        active_mask: ActiveMask,
        imem: &mut dyn InstructionMemory,
    ) {
        debug_assert!(self.is_idle(), "fetch accepted warp {warp_id} while busy");
        self.request = Some(Request {
            warp_id,
            pc,
            active_mask,
        });
        self.squashed = false;
        self.num_fetches += 1;
        self.state = State::Requesting;
        self.send(imem);
    }

    fn send(&mut self, imem: &mut dyn InstructionMemory) {
        let Some(request) = self.request else {
            return;
        };
        if imem.ready() {
            imem.request(request.pc);
            self.state = State::Waiting;
        }
    }

    /// Handshake with the instruction memory.
    pub fn poll(&mut self, imem: &mut dyn InstructionMemory) -> Option<Event> {
        match self.state {
            State::Requesting => {
                self.send(imem);
                None
            }
            State::Waiting => {
                let response = imem.take_response()?;
                let request = self.request.take()?;
                debug_assert_eq!(response.pc, request.pc);
                if self.squashed {
                    self.state = State::Idle;
                    self.squashed = false;
                    return Some(Event::Dropped {
                        warp_id: request.warp_id,
                    });
                }
                if !response.valid {
                    log::warn!(
                        "fetch: warp {} pc {:#06x} is outside of the program",
                        request.warp_id,
                        request.pc
                    );
                }
                self.fetched = Some(Fetched {
                    warp_id: request.warp_id,
                    pc: request.pc,
                    raw: response.instr,
                    valid: response.valid,
                    active_mask: request.active_mask,
                });
                self.state = State::Done;
                Some(Event::Arrived {
                    warp_id: request.warp_id,
                })
            }
            State::Idle | State::Done => None,
        }
    }

    /// Hand the fetched instruction to decode.
    pub fn take(&mut self) -> Option<Fetched> {
        if self.state != State::Done {
            return None;
        }
        self.state = State::Idle;
        self.fetched.take()
    }

    /// Drop the work held for `warp_id`.
    ///
    /// A request already sent cannot be withdrawn, its response is dropped on arrival.
    pub fn squash(&mut self, warp_id: usize) -> bool {
        if self.warp_id() != Some(warp_id) {
            return false;
        }
        self.num_squashed += 1;
        match self.state {
            State::Requesting => {
                self.request = None;
                self.state = State::Idle;
            }
            State::Waiting => self.squashed = true,
            State::Done => {
                self.fetched = None;
                self.state = State::Idle;
            }
            State::Idle => {}
        }
        true
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.request = None;
        self.fetched = None;
        self.squashed = false;
    }

    /// The unit still waits on the instruction memory.
    #[must_use]
    pub fn outstanding(&self) -> bool {
        matches!(self.state, State::Requesting | State::Waiting)
    }
}
