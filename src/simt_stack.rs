use crate::warp::ActiveMask;
use bitvec::array::BitArray;

/// Default bound on nested divergence per warp.
pub const DEFAULT_DEPTH: usize = 32;

/// A reconvergence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub reconvergence_pc: u32,
    /// Lanes that were active when the warp diverged.
    pub active_mask: ActiveMask,
    /// Lanes that took the branch.
    pub taken_mask: ActiveMask,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            reconvergence_pc: 0,
            active_mask: BitArray::ZERO,
            taken_mask: BitArray::ZERO,
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entry(rpc={:#06x}, active={:#010x}, taken={:#010x})",
            self.reconvergence_pc, self.active_mask.data[0], self.taken_mask.data[0]
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("divergence nesting exceeds stack depth of {depth}")]
    Overflow { depth: usize },
    #[error("reconvergence with an empty stack")]
    Underflow,
}

/// Per-warp divergence stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimtStack {
    entries: Vec<Entry>,
    max_depth: usize,
}

impl Default for SimtStack {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl SimtStack {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.entries.iter().rev()
    }

    pub fn push(&mut self, entry: Entry) -> Result<(), Error> {
        if self.entries.len() >= self.max_depth {
            return Err(Error::Overflow {
                depth: self.max_depth,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Entry, Error> {
        self.entries.pop().ok_or(Error::Underflow)
    }

    /// Combined update of one cycle.
    ///
    /// A simultaneous push and pop replaces the top entry.
    pub fn update(&mut self, push: Option<Entry>, pop: bool) -> Result<(), Error> {
        match (push, pop) {
            (Some(entry), true) => {
                let top = self.entries.last_mut().ok_or(Error::Underflow)?;
                *top = entry;
                Ok(())
            }
            (Some(entry), false) => self.push(entry),
            (None, true) => self.pop().map(|_| ()),
            (None, false) => Ok(()),
        }
    }

    /// The current top, or the zero entry if the stack is empty.
    #[must_use]
    pub fn top(&self) -> Entry {
        self.entries.last().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn at_reconvergence(&self, pc: u32) -> bool {
        self.entries
            .last()
            .is_some_and(|top| top.reconvergence_pc == pc)
    }

    /// Remove lanes that have exited from every record.
    pub fn retire_lanes(&mut self, lanes: ActiveMask) {
        for entry in &mut self.entries {
            entry.active_mask &= !lanes;
            entry.taken_mask &= !lanes;
        }
    }
}
