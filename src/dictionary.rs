//! Symbol table: a singly-linked chain of `LIST:3` entries (`[prevRef,
//! value, nameTagged]`) living in the global heap, plus the locals bound
//! in the function scope currently being compiled.
//!
//! Lookup order is locals-of-current-scope first, then the heap chain from
//! head to tail (spec.md §4.4). Each new entry is prepended, so shadowing
//! falls out for free: an older definition of the same name is only
//! reachable again after a [`revert`](Dictionary::revert) past the newer
//! one.

use crate::cell::{encode, Cell, Tag};
use crate::digest::Digest;
use crate::error::{Result, TacitError};
use crate::memory::Arena;

/// Absolute cell address of an entry's header, or `None` for an empty
/// chain.
type EntryAddr = Option<usize>;

pub struct Dictionary {
    head: EntryAddr,
    /// Stack of local-variable scopes; compiling a colon definition pushes
    /// one, `;` pops it. Nested definitions are disallowed by the
    /// compiler, so this never holds more than one entry in practice, but
    /// a stack keeps the shape honest against a future relaxation.
    locals: Vec<Vec<(String, u16)>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    gp: usize,
    head: EntryAddr,
    local_depth: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FoundEntry {
    pub value: Cell,
    pub immediate: bool,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            head: None,
            locals: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.locals.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        self.locals.pop();
    }

    /// Binds `name` to the next sequential LOCAL slot in the current
    /// scope. Panics if called outside a scope — the compiler only emits
    /// `var` inside a colon definition.
    pub fn define_local(&mut self, name: &str) -> u16 {
        let scope = self.locals.last_mut().expect("var outside a definition");
        let slot = scope.len() as u16;
        scope.push((name.to_string(), slot));
        slot
    }

    fn find_local(&self, name: &str) -> Option<u16> {
        self.locals.last()?.iter().rev().find_map(|(n, slot)| {
            if n == name {
                Some(*slot)
            } else {
                None
            }
        })
    }

    pub fn define_builtin(
        &mut self,
        arena: &mut Arena,
        digest: &mut Digest,
        gp: &mut usize,
        name: &str,
        opcode: u8,
        immediate: bool,
    ) -> Result<()> {
        let value = encode(opcode as i32, Tag::Builtin, immediate);
        self.insert(arena, digest, gp, name, value)
    }

    pub fn define_code(
        &mut self,
        arena: &mut Arena,
        digest: &mut Digest,
        gp: &mut usize,
        name: &str,
        addr: u16,
        immediate: bool,
    ) -> Result<()> {
        let value = encode(addr as i32, Tag::Code, immediate);
        self.insert(arena, digest, gp, name, value)
    }

    fn insert(
        &mut self,
        arena: &mut Arena,
        digest: &mut Digest,
        gp: &mut usize,
        name: &str,
        value: Cell,
    ) -> Result<()> {
        let name_addr = digest.intern(arena, name)?;
        let name_cell = encode(name_addr as i32, Tag::String, false);
        let prev_cell = match self.head {
            Some(addr) => encode(addr as i32, Tag::DataRef, false),
            None => Cell::nil(),
        };

        let base = *gp;
        if base + 4 > crate::memory::STACK_BASE {
            return Err(TacitError::HeapExhausted);
        }
        arena.write_cell(base, prev_cell)?;
        arena.write_cell(base + 1, value)?;
        arena.write_cell(base + 2, name_cell)?;
        let header = encode(3, Tag::List, false);
        arena.write_cell(base + 3, header)?;
        *gp = base + 4;
        self.head = Some(base + 3);
        Ok(())
    }

    /// Locals first (current scope only), then the heap chain head to
    /// tail.
    pub fn find_entry(&self, arena: &Arena, digest: &Digest, name: &str) -> Result<Option<FoundEntry>> {
        if let Some(slot) = self.find_local(name) {
            return Ok(Some(FoundEntry {
                value: encode(slot as i32, Tag::Local, false),
                immediate: false,
            }));
        }
        let mut cursor = self.head;
        while let Some(header) = cursor {
            let n = 3usize;
            let base = header - n;
            let prev = arena.read_cell(base)?;
            let value = arena.read_cell(base + 1)?;
            let name_cell = arena.read_cell(base + 2)?;
            if let crate::cell::Decoded::Tagged {
                tag: Tag::String,
                value: addr,
                ..
            } = name_cell.decode()
            {
                if digest.get(arena, addr as u16)? == name {
                    let immediate = value.decode().meta();
                    return Ok(Some(FoundEntry { value, immediate }));
                }
            }
            cursor = match prev.decode() {
                crate::cell::Decoded::Tagged {
                    tag: Tag::DataRef,
                    value: addr,
                    ..
                } => Some(addr as usize),
                _ => None,
            };
        }
        Ok(None)
    }

    pub fn find(&self, arena: &Arena, digest: &Digest, name: &str) -> Result<Option<Cell>> {
        Ok(self.find_entry(arena, digest, name)?.map(|e| e.value))
    }

    pub fn mark(&self, gp: usize) -> Checkpoint {
        Checkpoint {
            gp,
            head: self.head,
            local_depth: self.locals.last().map_or(0, Vec::len),
        }
    }

    pub fn revert(&mut self, checkpoint: Checkpoint, gp: &mut usize) {
        *gp = checkpoint.gp;
        self.head = checkpoint.head;
        if let Some(scope) = self.locals.last_mut() {
            scope.truncate(checkpoint.local_depth);
        }
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}
