//! Stable, serializable diagnostic shapes.
//!
//! The core never formats or prints; it hands back data. The host decides
//! whether to render it as a one-line message, a JSON blob, or (in tests)
//! an `insta` snapshot.

use serde::{Deserialize, Serialize};

use crate::cell::{decode, Cell, Decoded, Tag};

/// A `Cell`'s decoded form, in a shape that can be serialized and compared
/// across test runs (the raw bit pattern is reproducible but unreadable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedCell {
    Number(f32),
    Tagged { tag: String, value: i32, meta: bool },
}

impl From<Cell> for DecodedCell {
    fn from(cell: Cell) -> Self {
        match decode(cell) {
            Decoded::Number(n) => DecodedCell::Number(n),
            Decoded::Tagged { tag, value, meta } => DecodedCell::Tagged {
                tag: tag_name(tag).to_string(),
                value,
                meta,
            },
        }
    }
}

fn tag_name(tag: Tag) -> &'static str {
    match tag {
        Tag::Integer => "INTEGER",
        Tag::String => "STRING",
        Tag::Code => "CODE",
        Tag::Builtin => "BUILTIN",
        Tag::List => "LIST",
        Tag::Local => "LOCAL",
        Tag::DataRef => "DATA_REF",
        Tag::Nil => "NIL",
        Tag::Invalid => "INVALID",
    }
}

/// A copy of the data stack's contents at the moment an error was raised,
/// deep-to-shallow (index 0 is the bottom of the captured range).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot(pub Vec<DecodedCell>);

impl StackSnapshot {
    pub fn capture(cells: &[Cell]) -> Self {
        StackSnapshot(cells.iter().copied().map(DecodedCell::from).collect())
    }
}

impl std::fmt::Display for StackSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, cell) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match cell {
                DecodedCell::Number(n) => write!(f, "{n}")?,
                DecodedCell::Tagged { tag, value, .. } => write!(f, "{tag}:{value}")?,
            }
        }
        write!(f, "]")
    }
}

/// Full diagnostic payload for a core error: what spec.md §7 calls
/// "operation name, required operand count, and a printed snapshot of the
/// stack", plus the instruction pointer at the point of failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub ip: Option<usize>,
    pub stack: StackSnapshot,
}
