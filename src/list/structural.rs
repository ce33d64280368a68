//! Structural LIST operations that change element count or order: `head`,
//! `tail`, `reverse`, `concat` (spec.md §4.8).

use crate::cell::{encode, Cell, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::vm::Vm;

use super::{peek_list, span_at, ListRef};

fn require_nonempty(list: &ListRef, op: &'static str) -> Result<()> {
    if list.count == 0 {
        Err(TacitError::TypeMismatch {
            op,
            message: "list is empty".into(),
        })
    } else {
        Ok(())
    }
}

/// `head`: removes the first (deepest) element and pushes just that
/// element. For a direct list, the remaining payload is shifted down to
/// close the gap, the header is rewritten in place lower in memory, and
/// `SP` shrinks by the removed element's span before the element is
/// pushed back on top. For a ref, the source list is left untouched and
/// the element is copied out.
pub fn op_head(vm: &mut Vm) -> Result<()> {
    let top = vm.peek()?;
    match top.decode() {
        Decoded::Tagged { tag: Tag::List, .. } => {
            let list = peek_list(vm, "head")?;
            require_nonempty(&list, "head")?;
            let base = list.base();
            let first_span = span_at(vm, base)?;
            let first_cells = read_range(vm, base, first_span)?;
            shift_down(vm, base, base + first_span, list.header_addr)?;
            let remaining = list.count - first_span;
            let new_header_addr = base + remaining;
            vm.arena
                .write_cell(new_header_addr, encode(remaining as i32, Tag::List, false))?;
            vm.sp -= first_span;
            for c in first_cells {
                vm.push(c)?;
            }
            Ok(())
        }
        Decoded::Tagged {
            tag: Tag::DataRef, ..
        } => {
            let list = super::resolve(vm, top, "head")?;
            require_nonempty(&list, "head")?;
            let base = list.base();
            let first_span = span_at(vm, base)?;
            let first_cells = read_range(vm, base, first_span)?;
            for c in first_cells {
                vm.push(c)?;
            }
            Ok(())
        }
        _ => Err(TacitError::TypeMismatch {
            op: "head",
            message: "expected a LIST or a ref to one".into(),
        }),
    }
}

/// `tail`: removes the first element and pushes (or, for a direct list,
/// leaves in place) a list of the remainder.
pub fn op_tail(vm: &mut Vm) -> Result<()> {
    let top = vm.peek()?;
    match top.decode() {
        Decoded::Tagged { tag: Tag::List, .. } => {
            let list = peek_list(vm, "tail")?;
            require_nonempty(&list, "tail")?;
            let base = list.base();
            let first_span = span_at(vm, base)?;
            shift_down(vm, base, base + first_span, list.header_addr)?;
            let remaining = list.count - first_span;
            let new_header_addr = base + remaining;
            vm.arena
                .write_cell(new_header_addr, encode(remaining as i32, Tag::List, false))?;
            vm.sp -= first_span;
            Ok(())
        }
        Decoded::Tagged {
            tag: Tag::DataRef, ..
        } => {
            let list = super::resolve(vm, top, "tail")?;
            require_nonempty(&list, "tail")?;
            let base = list.base();
            let first_span = span_at(vm, base)?;
            let rest = read_range(vm, base + first_span, list.count - first_span)?;
            let n = rest.len();
            for c in rest {
                vm.push(c)?;
            }
            vm.push(encode(n as i32, Tag::List, false))
        }
        _ => Err(TacitError::TypeMismatch {
            op: "tail",
            message: "expected a LIST or a ref to one".into(),
        }),
    }
}

fn read_range(vm: &Vm, start: usize, len: usize) -> Result<Vec<Cell>> {
    (start..start + len).map(|a| vm.arena.read_cell(a)).collect()
}

fn shift_down(vm: &mut Vm, dest_base: usize, src_start: usize, src_end: usize) -> Result<()> {
    for (i, addr) in (src_start..src_end).enumerate() {
        let v = vm.arena.read_cell(addr)?;
        vm.arena.write_cell(dest_base + i, v)?;
    }
    Ok(())
}

/// Logical elements (each a contiguous span of cells, in declaration
/// order) of the list's payload.
fn elements(vm: &Vm, list: &ListRef) -> Result<Vec<Vec<Cell>>> {
    let mut pos = list.base();
    let mut out = Vec::new();
    while pos < list.header_addr {
        let span = span_at(vm, pos)?;
        out.push(read_range(vm, pos, span)?);
        pos += span;
    }
    Ok(out)
}

/// `reverse`: reverses logical element order, leaving each element's own
/// internal cells (e.g. a nested list's header-on-top layout) untouched.
/// Destructive in place for a direct list; for a ref, the source is left
/// alone and a new reversed LIST is pushed.
pub fn op_reverse(vm: &mut Vm) -> Result<()> {
    let top = vm.peek()?;
    match top.decode() {
        Decoded::Tagged { tag: Tag::List, .. } => {
            let list = peek_list(vm, "reverse")?;
            let mut elems = elements(vm, &list)?;
            elems.reverse();
            let base = list.base();
            let mut i = 0;
            for elem in elems {
                for c in elem {
                    vm.arena.write_cell(base + i, c)?;
                    i += 1;
                }
            }
            Ok(())
        }
        Decoded::Tagged {
            tag: Tag::DataRef, ..
        } => {
            let list = super::resolve(vm, top, "reverse")?;
            let mut elems = elements(vm, &list)?;
            elems.reverse();
            vm.pop()?;
            for elem in &elems {
                for c in elem {
                    vm.push(*c)?;
                }
            }
            vm.push(encode(list.count as i32, Tag::List, false))
        }
        _ => Err(TacitError::TypeMismatch {
            op: "reverse",
            message: "expected a LIST or a ref to one".into(),
        }),
    }
}

/// Consumes TOS as a value: a direct LIST's full header+payload, a ref's
/// payload (source left untouched), or a single non-list cell.
fn pop_value_cells(vm: &mut Vm, op: &'static str) -> Result<Vec<Cell>> {
    let top = vm.pop()?;
    match top.decode() {
        Decoded::Tagged {
            tag: Tag::List,
            value,
            ..
        } => {
            let n = value as usize;
            let mut cells = Vec::with_capacity(n);
            for _ in 0..n {
                cells.push(vm.pop()?);
            }
            cells.reverse();
            Ok(cells)
        }
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => {
            let addr = value as usize;
            let header = vm.arena.read_cell(addr)?;
            let n = super::header_count(header).ok_or(TacitError::TypeMismatch {
                op,
                message: "ref does not point at a LIST".into(),
            })?;
            read_range(vm, addr - n, n)
        }
        _ => Ok(vec![top]),
    }
}

/// `concat`: concatenates two values into one LIST whose slot count is
/// the sum of their cell counts; a non-list operand is a single-slot
/// element.
pub fn op_concat(vm: &mut Vm) -> Result<()> {
    let b_cells = pop_value_cells(vm, "concat")?;
    let a_cells = pop_value_cells(vm, "concat")?;
    let n = a_cells.len() + b_cells.len();
    for c in a_cells {
        vm.push(c)?;
    }
    for c in b_cells {
        vm.push(c)?;
    }
    vm.push(encode(n as i32, Tag::List, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;
    use crate::list::construct::op_pack;
    use crate::list::query::op_length;

    fn push_list(vm: &mut Vm, vals: &[f32]) {
        for v in vals {
            vm.push(encode_number(*v)).unwrap();
        }
        vm.push(encode_number(vals.len() as f32)).unwrap();
        op_pack(vm).unwrap();
    }

    #[test]
    fn head_then_tail_destructure() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0, 3.0]);
        op_head(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
        assert_eq!(vm.peek().unwrap().decode().value(), Some(2));
    }

    #[test]
    fn tail_shrinks_list_in_place() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0, 3.0]);
        op_tail(&mut vm).unwrap();
        op_length(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
    }

    #[test]
    fn reverse_is_involution() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0, 3.0]);
        op_reverse(&mut vm).unwrap();
        op_reverse(&mut vm).unwrap();
        vm.pop().unwrap(); // header
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
    }

    #[test]
    fn reverse_materializes_final_order() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0, 3.0]);
        op_reverse(&mut vm).unwrap();
        vm.pop().unwrap(); // header LIST:3
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
    }

    #[test]
    fn concat_sums_lengths() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0]);
        push_list(&mut vm, &[3.0]);
        op_concat(&mut vm).unwrap();
        op_length(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
    }

    #[test]
    fn concat_with_empty_is_identity() {
        let mut vm = Vm::new();
        push_list(&mut vm, &[1.0, 2.0]);
        vm.push(encode_number(0.0)).unwrap();
        op_pack(&mut vm).unwrap();
        op_concat(&mut vm).unwrap();
        op_length(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
    }
}
