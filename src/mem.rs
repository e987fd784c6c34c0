//! Instruction and data memory interfaces of the core.

use crate::engine::cycle::Component;
use crate::warp::{ActiveMask, Lanes, WARP_SIZE};
use bitvec::array::BitArray;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
}

impl AccessSize {
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }

    /// Sign or zero extend a loaded value.
    #[must_use]
    pub fn extend(self, value: u32, signed: bool) -> u32 {
        match (self, signed) {
            (Self::Byte, true) => value as u8 as i8 as i32 as u32,
            (Self::Byte, false) => value & 0xFF,
            (Self::Half, true) => value as u16 as i16 as i32 as u32,
            (Self::Half, false) => value & 0xFFFF,
            (Self::Word, _) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionResponse {
    pub pc: u32,
    pub instr: u32,
    pub valid: bool,
}

/// Instruction memory.
///
/// One outstanding request at a time.
pub trait InstructionMemory: Component {
    #[must_use]
    fn ready(&self) -> bool;

    fn request(&mut self, pc: u32);

    fn take_response(&mut self) -> Option<InstructionResponse>;
}

/// Coalesced lane-indexed data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub lane_valid: ActiveMask,
    pub lane_addr: Lanes,
    pub lane_wdata: Lanes,
    pub is_write: bool,
    pub size: AccessSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub lane_valid: ActiveMask,
    pub lane_rdata: Lanes,
}

/// Data memory.
pub trait DataMemory: Component {
    #[must_use]
    fn ready(&self) -> bool;

    fn send(&mut self, request: Request);

    fn take_response(&mut self) -> Option<Response>;
}

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    ready_in: u64,
}

impl<T> Pending<T> {
    fn tick(&mut self) {
        self.ready_in = self.ready_in.saturating_sub(1);
    }

    fn is_ready(&self) -> bool {
        self.ready_in == 0
    }
}

/// Read-only word memory holding the program.
#[derive(Debug, Clone)]
pub struct ProgramMemory {
    base: u32,
    words: Vec<u32>,
    latency: u64,
    pending: Option<Pending<InstructionResponse>>,
}

impl ProgramMemory {
    #[must_use]
    pub fn new(words: Vec<u32>, latency: u64) -> Self {
        Self::with_base(0, words, latency)
    }

    #[must_use]
    pub fn with_base(base: u32, words: Vec<u32>, latency: u64) -> Self {
        Self {
            base,
            words,
            latency,
            pending: None,
        }
    }

    #[must_use]
    pub fn read(&self, pc: u32) -> Option<u32> {
        let offset = pc.checked_sub(self.base)?;
        if offset % 4 != 0 {
            return None;
        }
        self.words.get((offset / 4) as usize).copied()
    }
}

impl Component for ProgramMemory {
    fn cycle(&mut self, _cycle: u64) {
        if let Some(pending) = &mut self.pending {
            pending.tick();
        }
    }
}

impl InstructionMemory for ProgramMemory {
    fn ready(&self) -> bool {
        self.pending.is_none()
    }

    fn request(&mut self, pc: u32) {
        debug_assert!(self.pending.is_none(), "one outstanding instruction request");
        let word = self.read(pc);
        self.pending = Some(Pending {
            value: InstructionResponse {
                pc,
                instr: word.unwrap_or(0),
                valid: word.is_some(),
            },
            ready_in: self.latency,
        });
    }

    fn take_response(&mut self) -> Option<InstructionResponse> {
        if !self.pending.as_ref()?.is_ready() {
            return None;
        }
        self.pending.take().map(|pending| pending.value)
    }
}

/// Byte-addressed little endian memory with a fixed access latency.
///
/// Lanes addressing bytes outside of the memory come back not valid.
#[derive(Debug, Clone)]
pub struct LatencyMemory {
    data: Vec<u8>,
    latency: u64,
    pending: Option<Pending<Response>>,
    pub num_reads: u64,
    pub num_writes: u64,
}

impl LatencyMemory {
    #[must_use]
    pub fn new(size: usize, latency: u64) -> Self {
        Self {
            data: vec![0; size],
            latency,
            pending: None,
            num_reads: 0,
            num_writes: 0,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, addr: u32, size: AccessSize) -> Option<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(size.bytes())?;
        (end <= self.data.len()).then_some(start..end)
    }

    #[must_use]
    pub fn read_word(&self, addr: u32) -> Option<u32> {
        let range = self.range(addr, AccessSize::Word)?;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.data[range]);
        Some(u32::from_le_bytes(bytes))
    }

    pub fn write_word(&mut self, addr: u32, value: u32) -> Option<()> {
        let range = self.range(addr, AccessSize::Word)?;
        self.data[range].copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    /// Copy words into memory starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> Option<()> {
        for (i, word) in words.iter().enumerate() {
            self.write_word(addr.checked_add(4 * i as u32)?, *word)?;
        }
        Some(())
    }

    fn access(&mut self, request: &Request) -> Response {
        let mut response = Response {
            lane_valid: BitArray::ZERO,
            lane_rdata: [0; WARP_SIZE],
        };
        for lane in request.lane_valid.iter_ones() {
            let addr = request.lane_addr[lane];
            let Some(range) = self.range(addr, request.size) else {
                continue;
            };
            if request.is_write {
                let bytes = request.lane_wdata[lane].to_le_bytes();
                self.data[range].copy_from_slice(&bytes[..request.size.bytes()]);
            } else {
                let mut bytes = [0; 4];
                bytes[..request.size.bytes()].copy_from_slice(&self.data[range]);
                response.lane_rdata[lane] = u32::from_le_bytes(bytes);
            }
            response.lane_valid.set(lane, true);
        }
        response
    }
}

impl Component for LatencyMemory {
    fn cycle(&mut self, _cycle: u64) {
        if let Some(pending) = &mut self.pending {
            pending.tick();
        }
    }
}

impl DataMemory for LatencyMemory {
    fn ready(&self) -> bool {
        self.pending.is_none()
    }

    fn send(&mut self, request: Request) {
        debug_assert!(self.pending.is_none(), "one outstanding data request");
        if request.is_write {
            self.num_writes += 1;
        } else {
            self.num_reads += 1;
        }
        let response = self.access(&request);
        log::trace!(
            "data memory: {} {} lanes={:#010x} valid={:#010x}",
            if request.is_write { "write" } else { "read" },
            request.size.as_ref(),
            request.lane_valid.data[0],
            response.lane_valid.data[0],
        );
        self.pending = Some(Pending {
            value: response,
            ready_in: self.latency,
        });
    }

    fn take_response(&mut self) -> Option<Response> {
        if !self.pending.as_ref()?.is_ready() {
            return None;
        }
        self.pending.take().map(|pending| pending.value)
    }
}
