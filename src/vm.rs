//! VM state and the checked stack operations built on top of the arena.
//!
//! `Vm` is the single owning record spec.md §9 calls for: every opcode
//! handler takes `&mut Vm` and nothing else is mutable global state.

use crate::cell::Cell;
use crate::diag::StackSnapshot;
use crate::dictionary::Dictionary;
use crate::digest::Digest;
use crate::error::{Result, TacitError};
use crate::host::{NullOutput, Output, Trace};
use crate::memory::{Arena, Segment, GLOBAL_BASE, RSTACK_BASE, STACK_BASE};
use crate::opcode::Handlers;

pub struct Vm {
    pub arena: Arena,
    pub digest: Digest,
    pub dictionary: Dictionary,
    pub handlers: Handlers,
    /// Where `print` sends its formatted output; the host installs its own
    /// sink (stdout, a buffer, a test collector). Defaults to discarding.
    pub output: Box<dyn Output>,
    /// Optional per-opcode trace sink, consulted only when `debug` is set.
    pub trace: Option<Box<dyn Trace>>,

    /// Next free data-stack cell.
    pub sp: usize,
    /// Next free return-stack cell.
    pub rp: usize,
    /// Base of the current return-stack frame.
    pub bp: usize,
    /// Instruction pointer: a byte offset into the CODE segment.
    pub ip: usize,
    /// Next free global-heap cell.
    pub gp: usize,
    /// Compile pointer: a byte offset into the CODE segment.
    pub cp: usize,

    /// Holds the host's receiver/self value across `dispatch`/capsule calls.
    pub receiver: Option<Cell>,
    /// Depth of in-progress `( ... )` list construction.
    pub list_depth: usize,
    pub running: bool,
    pub debug: bool,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Vm {
            arena: Arena::new(),
            digest: Digest::new(),
            dictionary: Dictionary::new(),
            handlers: crate::opcode::build_handlers(),
            output: Box::new(NullOutput),
            trace: None,
            sp: STACK_BASE,
            rp: RSTACK_BASE,
            bp: RSTACK_BASE,
            ip: 0,
            gp: GLOBAL_BASE,
            cp: 0,
            receiver: None,
            list_depth: 0,
            running: false,
            debug: false,
        };
        crate::builtins::install(&mut vm).expect("builtin dictionary install cannot fail");
        vm
    }

    // --- data stack ---

    pub fn push(&mut self, value: Cell) -> Result<()> {
        if self.sp >= RSTACK_BASE {
            return Err(TacitError::StackOverflow {
                op: "push",
                stack: self.stack_snapshot(),
            });
        }
        self.arena.write_cell(self.sp, value)?;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Cell> {
        self.ensure_size(1, "pop")?;
        self.sp -= 1;
        self.arena.read_cell(self.sp)
    }

    pub fn peek(&self) -> Result<Cell> {
        self.peek_at(0)
    }

    pub fn peek_at(&self, offset_from_top: usize) -> Result<Cell> {
        self.ensure_size(offset_from_top + 1, "peek")?;
        self.arena.read_cell(self.sp - 1 - offset_from_top)
    }

    pub fn ensure_size(&self, n: usize, op_name: &'static str) -> Result<()> {
        let available = self.sp.saturating_sub(STACK_BASE);
        if available < n {
            return Err(TacitError::StackUnderflow {
                op: op_name,
                needed: n,
                available,
                stack: self.stack_snapshot(),
            });
        }
        Ok(())
    }

    pub fn stack_snapshot(&self) -> StackSnapshot {
        let cells: Vec<Cell> = (STACK_BASE..self.sp)
            .filter_map(|addr| self.arena.read_cell(addr).ok())
            .collect();
        StackSnapshot::capture(&cells)
    }

    // --- return stack ---

    pub fn rpush(&mut self, value: Cell) -> Result<()> {
        if self.rp >= crate::memory::ARENA_SIZE_CELLS {
            return Err(TacitError::ReturnStackOverflow {
                op: "rpush",
                stack: self.stack_snapshot(),
            });
        }
        self.arena.write_cell(self.rp, value)?;
        self.rp += 1;
        Ok(())
    }

    pub fn rpop(&mut self) -> Result<Cell> {
        if self.rp <= RSTACK_BASE {
            return Err(TacitError::ReturnStackUnderflow {
                op: "rpop",
                stack: self.stack_snapshot(),
            });
        }
        self.rp -= 1;
        self.arena.read_cell(self.rp)
    }

    pub fn rpeek(&self) -> Result<Cell> {
        if self.rp <= RSTACK_BASE {
            return Err(TacitError::ReturnStackUnderflow {
                op: "rpeek",
                stack: self.stack_snapshot(),
            });
        }
        self.arena.read_cell(self.rp - 1)
    }

    pub fn classify(&self, abs_cell: usize) -> Option<Segment> {
        self.arena.classify(abs_cell)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;

    #[test]
    fn push_pop_round_trips() {
        let mut vm = Vm::new();
        vm.push(encode_number(5.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), encode_number(3.0).decode());
        assert_eq!(vm.pop().unwrap().decode(), encode_number(5.0).decode());
    }

    #[test]
    fn underflow_is_reported() {
        let mut vm = Vm::new();
        assert!(matches!(
            vm.pop(),
            Err(TacitError::StackUnderflow { .. })
        ));
    }

    #[test]
    fn overflow_is_reported() {
        let mut vm = Vm::new();
        vm.sp = RSTACK_BASE - 1;
        vm.push(encode_number(1.0)).unwrap();
        assert!(matches!(
            vm.push(encode_number(1.0)),
            Err(TacitError::StackOverflow { .. })
        ));
    }

    #[test]
    fn sp_stays_in_bounds_across_pushes_and_pops() {
        let mut vm = Vm::new();
        for i in 0..100 {
            vm.push(encode_number(i as f32)).unwrap();
        }
        for _ in 0..100 {
            vm.pop().unwrap();
        }
        assert_eq!(vm.sp, STACK_BASE);
    }
}
