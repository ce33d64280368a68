//! Append-only string digest with length-prefixed entries and interning.
//!
//! Mirrors the byte-level read/write discipline of the teacher's
//! `ida_reader` unpackers: every entry is a 1-byte length followed by that
//! many bytes of text, addressed by byte offset from the segment base.

use crate::error::{Result, TacitError};
use crate::memory::Arena;

/// Owns the digest's write cursor; the backing bytes live in [`Arena`].
pub struct Digest {
    next: usize,
}

impl Digest {
    pub fn new() -> Self {
        Digest { next: 0 }
    }

    /// Writes a length byte then the bytes of `s`, returning the entry's
    /// start offset. Fails if `s` is longer than 255 bytes or the digest
    /// segment is exhausted.
    pub fn add(&mut self, arena: &mut Arena, s: &str) -> Result<u16> {
        let bytes = s.as_bytes();
        if bytes.len() > 255 {
            return Err(TacitError::StringTooLong);
        }
        let needed = 1 + bytes.len();
        if self.next + needed > crate::memory::STRING_SIZE {
            return Err(TacitError::DigestOverflow);
        }
        let addr = self.next;
        arena.string_write8(addr, bytes.len() as u8)?;
        for (i, b) in bytes.iter().enumerate() {
            arena.string_write8(addr + 1 + i, *b)?;
        }
        self.next += needed;
        Ok(addr as u16)
    }

    pub fn length(&self, arena: &Arena, addr: u16) -> Result<u8> {
        arena.string_read8(addr as usize)
    }

    pub fn get(&self, arena: &Arena, addr: u16) -> Result<String> {
        let len = self.length(arena, addr)? as usize;
        let bytes = arena.string_slice(addr as usize + 1, len)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    /// Linear scan from the start of the digest to the write cursor.
    pub fn find(&self, arena: &Arena, s: &str) -> Result<Option<u16>> {
        let mut offset = 0usize;
        while offset < self.next {
            let len = arena.string_read8(offset)? as usize;
            let entry = arena.string_slice(offset + 1, len)?;
            if entry.iter().map(|&b| b as char).eq(s.chars()) {
                return Ok(Some(offset as u16));
            }
            offset += 1 + len;
        }
        Ok(None)
    }

    pub fn intern(&mut self, arena: &mut Arena, s: &str) -> Result<u16> {
        if let Some(addr) = self.find(arena, s)? {
            return Ok(addr);
        }
        self.add(arena, s)
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}
