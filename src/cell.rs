//! NaN-boxed tagged value codec.
//!
//! A [`Cell`] is the 32-bit unit backing every stack slot, heap slot, and
//! code operand. Bit-for-bit it is an IEEE-754 `f32`; when the exponent is
//! all-ones and the quiet bit is set, the cell is tagged instead of
//! numeric, and we steal the sign bit for a meta flag plus the low 22
//! mantissa bits to carry a [`Tag`] and a 16-bit payload. Any other bit
//! pattern is a plain number.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Quiet-NaN exponent/quiet-bit mask: bits 22..30 set marks a tagged cell.
/// `f32` exponent is all-ones (bits 23..30) and the quiet bit (22) is set.
/// Deliberately excludes the sign bit (31) — that bit carries the meta
/// flag instead, so it stays free to be 0 or 1 without affecting whether
/// a cell reads as tagged (a NaN's sign bit is never significant to its
/// NaN-ness).
const TAG_MASK_BITS: u32 = 0x7FC0_0000;
const TAG_SHIFT: u32 = 16;
const TAG_BITS: u32 = 0x3F;
const META_SHIFT: u32 = 31;
const PAYLOAD_MASK: u32 = 0xFFFF;

/// The closed set of tags a non-NUMBER cell may carry.
///
/// `NUMBER` itself is not a variant here: it is recognized by the absence
/// of the tagged-NaN bit pattern, not by a discriminant (see
/// [`decode`]/[`encode_number`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    Integer = 0,
    String = 1,
    Code = 2,
    Builtin = 3,
    List = 4,
    Local = 5,
    DataRef = 6,
    Nil = 7,
    Invalid = 8,
}

/// A decoded cell: either a plain float or a tag/payload/meta triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    Number(f32),
    Tagged { tag: Tag, value: i32, meta: bool },
}

impl Decoded {
    pub fn is_number(&self) -> bool {
        matches!(self, Decoded::Number(_))
    }

    pub fn tag(&self) -> Option<Tag> {
        match self {
            Decoded::Number(_) => None,
            Decoded::Tagged { tag, .. } => Some(*tag),
        }
    }

    pub fn value(&self) -> Option<i32> {
        match self {
            Decoded::Number(_) => None,
            Decoded::Tagged { value, .. } => Some(*value),
        }
    }

    pub fn meta(&self) -> bool {
        matches!(self, Decoded::Tagged { meta: true, .. })
    }
}

/// A raw 32-bit cell. Stored and compared by bit pattern, never by float
/// equality (NaN payloads would otherwise never compare equal to
/// themselves).
#[derive(Clone, Copy)]
pub struct Cell(u32);

impl Cell {
    pub fn from_bits(bits: u32) -> Self {
        Cell(bits)
    }

    pub fn to_bits(self) -> u32 {
        self.0
    }

    pub fn nil() -> Self {
        encode(0, Tag::Nil, false)
    }

    pub fn decode(self) -> Decoded {
        decode(self)
    }

    pub fn is_tag(self, tag: Tag) -> bool {
        matches!(self.decode(), Decoded::Tagged { tag: t, .. } if t == tag)
    }

    pub fn is_nil(self) -> bool {
        self.is_tag(Tag::Nil)
    }

    pub fn is_ref(self) -> bool {
        matches!(self.decode().tag(), Some(Tag::DataRef))
    }

    pub fn is_list(self) -> bool {
        matches!(self.decode().tag(), Some(Tag::List))
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.decode() {
            Decoded::Number(n) => write!(f, "{n}"),
            Decoded::Tagged { tag, value, meta } => {
                write!(f, "{tag:?}({value})")?;
                if meta {
                    write!(f, "*")?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Encode `payload` under `tag` with the given meta bit. `payload` must fit
/// 16 signed bits for [`Tag::Integer`], 16 unsigned bits otherwise.
///
/// # Panics
/// Panics if `payload` doesn't fit the tag's width; callers at the
/// compiler/VM boundary are expected to have validated this already (e.g.
/// `define_local` assigning sequential slot numbers), so this is an
/// invariant violation rather than user-facing input.
pub fn encode(payload: i32, tag: Tag, meta: bool) -> Cell {
    let payload16: u32 = match tag {
        Tag::Integer => {
            assert!((i16::MIN as i32..=i16::MAX as i32).contains(&payload));
            (payload as i16 as u16).into()
        }
        _ => {
            assert!((0..=u16::MAX as i32).contains(&payload));
            payload as u32
        }
    };
    let tag_byte: u8 = tag.into();
    let bits = TAG_MASK_BITS
        | ((meta as u32) << META_SHIFT)
        | ((tag_byte as u32 & TAG_BITS) << TAG_SHIFT)
        | (payload16 & PAYLOAD_MASK);
    Cell(bits)
}

/// Encode a finite or non-signaling `f32` as a NUMBER cell. The bit pattern
/// is preserved exactly for later decoding; this function never produces a
/// tagged-NaN bit pattern for ordinary numeric input (callers must not
/// pass a quiet NaN through this path — use [`encode`] for tagged values).
pub fn encode_number(f: f32) -> Cell {
    Cell(f.to_bits())
}

/// Total: recognizes NUMBER by a clear quiet-bit or non-all-ones exponent;
/// otherwise extracts tag and sign-extended payload.
pub fn decode(cell: Cell) -> Decoded {
    let bits = cell.0;
    if bits & TAG_MASK_BITS != TAG_MASK_BITS {
        return Decoded::Number(f32::from_bits(bits));
    }
    let meta = (bits >> META_SHIFT) & 1 != 0;
    let tag_byte = ((bits >> TAG_SHIFT) & TAG_BITS) as u8;
    let Ok(tag) = Tag::try_from_primitive(tag_byte) else {
        return Decoded::Tagged {
            tag: Tag::Invalid,
            value: 0,
            meta,
        };
    };
    let payload = (bits & PAYLOAD_MASK) as u16;
    let value = match tag {
        Tag::Integer => payload as i16 as i32,
        _ => payload as i32,
    };
    Decoded::Tagged { tag, value, meta }
}

pub fn is_ref(cell: Cell) -> bool {
    cell.is_ref()
}

pub fn is_list(cell: Cell) -> bool {
    cell.is_list()
}

pub fn is_nil(cell: Cell) -> bool {
    cell.is_nil()
}

pub fn get_tag(cell: Cell) -> Option<Tag> {
    decode(cell).tag()
}

pub fn get_value(cell: Cell) -> Option<i32> {
    decode(cell).value()
}
