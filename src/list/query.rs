//! Non-destructive LIST queries: every op here leaves its list operand (and
//! any ref) in place on the stack and pushes its result(s) on top, so a
//! chain like `list 0 slot fetch` reads naturally left to right.

use crate::cell::{encode, encode_number, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::vm::Vm;

use super::{peek_list, pop_index, span_at, ListRef};

/// `length`: raw payload slot count (spec.md §4.8, "length returns slot
/// count or NIL for non-list").
pub fn op_length(vm: &mut Vm) -> Result<()> {
    match non_list_top(vm)? {
        Some(()) => vm.push(crate::cell::Cell::nil()),
        None => {
            let list = peek_list(vm, "length")?;
            vm.push(encode_number(list.count as f32))
        }
    }
}

fn non_list_top(vm: &Vm) -> Result<Option<()>> {
    let top = vm.peek()?;
    Ok(match top.decode() {
        Decoded::Tagged {
            tag: Tag::List, ..
        }
        | Decoded::Tagged {
            tag: Tag::DataRef, ..
        } => None,
        _ => Some(()),
    })
}

/// `size`: number of logical elements, each nested list counting as one
/// regardless of its own slot count.
pub fn op_size(vm: &mut Vm) -> Result<()> {
    let list = peek_list(vm, "size")?;
    let base = list.base();
    let mut pos = base;
    let mut count = 0usize;
    while pos < list.header_addr {
        let span = span_at(vm, pos)?;
        pos += span;
        count += 1;
    }
    vm.push(encode_number(count as f32))
}

/// `slot i`: a `DATA_REF` to the i-th raw payload cell (0-based), or NIL
/// if out of range.
pub fn op_slot(vm: &mut Vm) -> Result<()> {
    let i = pop_index(vm, "slot")?;
    let list = peek_list(vm, "slot")?;
    if i >= list.count {
        return vm.push(crate::cell::Cell::nil());
    }
    let addr = list.base() + i;
    vm.push(encode(addr as i32, Tag::DataRef, false))
}

/// `elem i`: a `DATA_REF` to the i-th logical element (walking by span),
/// or NIL if out of range.
pub fn op_elem(vm: &mut Vm) -> Result<()> {
    let i = pop_index(vm, "elem")?;
    let list = peek_list(vm, "elem")?;
    match elem_addr(vm, &list, i)? {
        Some(addr) => vm.push(encode(addr as i32, Tag::DataRef, false)),
        None => vm.push(crate::cell::Cell::nil()),
    }
}

/// Address of the top cell (header, for a nested element) of the i-th
/// logical element, walking payload deep-to-shallow from `list.base()`.
fn elem_addr(vm: &Vm, list: &ListRef, i: usize) -> Result<Option<usize>> {
    let base = list.base();
    let mut pos = base;
    let mut idx = 0usize;
    while pos < list.header_addr {
        let span = span_at(vm, pos)?;
        let top_of_elem = pos + span - 1;
        if idx == i {
            return Ok(Some(top_of_elem));
        }
        pos += span;
        idx += 1;
    }
    Ok(None)
}

/// `find key`: linear scan of an even-sized maplist payload `[k0 v0 k1 v1
/// …]` (elements, not raw slots — a key or value may itself be a nested
/// list). Falls back to a key literally named `"default"`, else NIL.
pub fn op_find(vm: &mut Vm) -> Result<()> {
    let key = vm.pop()?;
    let list = peek_list(vm, "find")?;
    let size = element_count(vm, &list)?;

    let mut default_value: Option<usize> = None;
    let mut i = 0usize;
    while i + 1 < size {
        let k_addr = elem_addr(vm, &list, i)?.expect("within size");
        let v_addr = elem_addr(vm, &list, i + 1)?.expect("within size");
        let k_cell = vm.arena.read_cell(k_addr)?;
        if cell_eq_key(vm, k_cell, key)? {
            return vm.push(encode(v_addr as i32, Tag::DataRef, false));
        }
        if is_default_key(vm, k_cell)? {
            default_value = Some(v_addr);
        }
        i += 2;
    }
    match default_value {
        Some(v_addr) => vm.push(encode(v_addr as i32, Tag::DataRef, false)),
        None => vm.push(crate::cell::Cell::nil()),
    }
}

fn element_count(vm: &Vm, list: &ListRef) -> Result<usize> {
    let mut pos = list.base();
    let mut count = 0;
    while pos < list.header_addr {
        pos += span_at(vm, pos)?;
        count += 1;
    }
    Ok(count)
}

fn cell_eq_key(vm: &Vm, candidate: crate::cell::Cell, key: crate::cell::Cell) -> Result<bool> {
    if candidate.to_bits() == key.to_bits() {
        return Ok(true);
    }
    // Two STRING cells compare by interned text, not raw digest address,
    // since callers may build the key string separately from the literal
    // baked into the maplist.
    if let (
        Decoded::Tagged {
            tag: Tag::String,
            value: a,
            ..
        },
        Decoded::Tagged {
            tag: Tag::String,
            value: b,
            ..
        },
    ) = (candidate.decode(), key.decode())
    {
        return Ok(vm.digest.get(&vm.arena, a as u16)? == vm.digest.get(&vm.arena, b as u16)?);
    }
    Ok(false)
}

fn is_default_key(vm: &Vm, candidate: crate::cell::Cell) -> Result<bool> {
    if let Decoded::Tagged {
        tag: Tag::String,
        value,
        ..
    } = candidate.decode()
    {
        return Ok(vm.digest.get(&vm.arena, value as u16)? == "default");
    }
    Ok(false)
}

/// `walk ref idx -> ref idx' val`: returns the value at logical position
/// `idx` (a raw value, or a `DATA_REF` for a nested LIST element), and the
/// next index — wrapping to 0 once `idx` runs past the last element.
pub fn op_walk(vm: &mut Vm) -> Result<()> {
    let idx = pop_index(vm, "walk")?;
    let ref_cell = vm.pop()?;
    let list = super::resolve(vm, ref_cell, "walk")?;
    let size = element_count(vm, &list)?;

    let (next_idx, val) = match elem_addr(vm, &list, idx)? {
        Some(addr) => {
            let cell = vm.arena.read_cell(addr)?;
            let val = if super::header_count(cell).is_some() {
                encode(addr as i32, Tag::DataRef, false)
            } else {
                cell
            };
            let next = if idx + 1 < size { idx + 1 } else { 0 };
            (next, val)
        }
        None => (0, crate::cell::Cell::nil()),
    };

    vm.push(ref_cell)?;
    vm.push(encode_number(next_idx as f32))?;
    vm.push(val)
}

/// `keys` / `values`: materializes the even/odd elements of a maplist
/// payload as a freshly-built LIST on top of the stack.
pub fn op_keys(vm: &mut Vm) -> Result<()> {
    materialize_alternating(vm, 0)
}

pub fn op_values(vm: &mut Vm) -> Result<()> {
    materialize_alternating(vm, 1)
}

fn materialize_alternating(vm: &mut Vm, start: usize) -> Result<()> {
    let list = peek_list(vm, "keys/values")?;
    let size = element_count(vm, &list)?;
    let mut addrs = Vec::new();
    let mut i = start;
    while i < size {
        if let Some(addr) = elem_addr(vm, &list, i)? {
            addrs.push(addr);
        }
        i += 2;
    }
    let n = addrs.len();
    for addr in addrs {
        let v = vm.arena.read_cell(addr)?;
        vm.push(v)?;
    }
    vm.push(encode(n as i32, Tag::List, false))
}

/// `ref`: pushes a `DATA_REF` to the list header currently at TOS, leaving
/// the header (and its payload) exactly where they are.
pub fn op_ref(vm: &mut Vm) -> Result<()> {
    let top = vm.peek()?;
    if super::header_count(top).is_none() {
        return Err(TacitError::TypeMismatch {
            op: "ref",
            message: "expected a direct LIST header".into(),
        });
    }
    let header_addr = vm.sp - 1;
    vm.push(encode(header_addr as i32, Tag::DataRef, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::construct::{op_close_list, op_open_list, op_pack};
    use crate::cell::encode_number;

    fn push_list_123(vm: &mut Vm) {
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_pack(vm).unwrap();
    }

    #[test]
    fn length_is_nondestructive() {
        let mut vm = Vm::new();
        push_list_123(&mut vm);
        op_length(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
        assert_eq!(vm.peek().unwrap().decode().tag(), Some(Tag::List));
    }

    #[test]
    fn size_counts_nested_as_one() {
        let mut vm = Vm::new();
        op_open_list(&mut vm).unwrap();
        vm.push(encode_number(1.0)).unwrap();
        op_open_list(&mut vm).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_close_list(&mut vm).unwrap();
        vm.push(encode_number(4.0)).unwrap();
        op_close_list(&mut vm).unwrap();

        op_size(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
    }

    #[test]
    fn elem_then_fetch_roundtrips_every_position() {
        let mut vm = Vm::new();
        push_list_123(&mut vm);
        for (i, expect) in [(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)] {
            vm.push(encode_number(i)).unwrap();
            op_elem(&mut vm).unwrap();
            let r = vm.pop().unwrap();
            let addr = match r.decode() {
                Decoded::Tagged {
                    tag: Tag::DataRef,
                    value,
                    ..
                } => value as usize,
                other => panic!("expected DATA_REF, got {other:?}"),
            };
            assert_eq!(vm.arena.read_cell(addr).unwrap(), encode_number(expect));
        }
    }

    #[test]
    fn find_locates_value_by_string_key() {
        let mut vm = Vm::new();
        let a = vm.digest.intern(&mut vm.arena, "a").unwrap();
        let b = vm.digest.intern(&mut vm.arena, "b").unwrap();
        op_open_list(&mut vm).unwrap();
        vm.push(encode(a as i32, Tag::String, false)).unwrap();
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode(b as i32, Tag::String, false)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        op_close_list(&mut vm).unwrap();

        vm.push(encode(b as i32, Tag::String, false)).unwrap();
        op_find(&mut vm).unwrap();
        let r = vm.pop().unwrap();
        let addr = match r.decode() {
            Decoded::Tagged {
                tag: Tag::DataRef,
                value,
                ..
            } => value as usize,
            other => panic!("expected DATA_REF, got {other:?}"),
        };
        assert_eq!(vm.arena.read_cell(addr).unwrap(), encode_number(2.0));
    }
}
