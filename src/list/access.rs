//! Read/write-through-a-ref operations: `fetch`, `load`, `store` (spec.md
//! §4.8).

use crate::cell::{encode, Cell, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::memory::{Segment, STACK_BASE};
use crate::vm::Vm;

fn read_range(vm: &Vm, start: usize, len: usize) -> Result<Vec<Cell>> {
    (start..start + len).map(|a| vm.arena.read_cell(a)).collect()
}

fn deref_addr(cell: Cell, op: &'static str) -> Result<usize> {
    match cell.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => Ok(value as usize),
        _ => Err(TacitError::TypeMismatch {
            op,
            message: "expected a DATA_REF".into(),
        }),
    }
}

/// Materializes the cell at `addr`: a LIST header is expanded to
/// payload+header, anything else is pushed as-is.
fn push_dereferenced(vm: &mut Vm, addr: usize) -> Result<()> {
    let cell = vm.arena.read_cell(addr)?;
    match super::header_count(cell) {
        Some(n) => {
            for c in read_range(vm, addr - n, n)? {
                vm.push(c)?;
            }
            vm.push(cell)
        }
        None => vm.push(cell),
    }
}

/// `fetch ref`: a single dereference, materializing a LIST result.
pub fn op_fetch(vm: &mut Vm) -> Result<()> {
    let r = vm.pop()?;
    let addr = deref_addr(r, "fetch")?;
    push_dereferenced(vm, addr)
}

/// `load x`: identity on a non-ref; one dereference for a ref, a second
/// if that also reads as a ref, materializing the final LIST result.
pub fn op_load(vm: &mut Vm) -> Result<()> {
    let x = vm.pop()?;
    let addr1 = match x.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => value as usize,
        _ => return vm.push(x),
    };
    let v1 = vm.arena.read_cell(addr1)?;
    let final_addr = match v1.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => value as usize,
        _ => {
            return match super::header_count(v1) {
                Some(n) => {
                    for c in read_range(vm, addr1 - n, n)? {
                        vm.push(c)?;
                    }
                    vm.push(v1)
                }
                None => vm.push(v1),
            }
        }
    };
    push_dereferenced(vm, final_addr)
}

enum StoreValue {
    Scalar(Cell),
    Compound(Vec<Cell>),
}

fn pop_store_value(vm: &mut Vm) -> Result<StoreValue> {
    let top = vm.pop()?;
    match super::header_count(top) {
        Some(n) => {
            let mut cells = Vec::with_capacity(n);
            for _ in 0..n {
                cells.push(vm.pop()?);
            }
            cells.reverse();
            Ok(StoreValue::Compound(cells))
        }
        None => Ok(StoreValue::Scalar(top)),
    }
}

/// `store v ref`: writes `v` through `ref`. Simple-to-simple overwrites
/// the cell; compound-to-compound updates an existing heap allocation in
/// place if the shapes match; simple/compound mismatches raise
/// `TypeMismatch`. Storing a compound into a NIL global slot allocates
/// the value on the global heap and leaves a `DATA_REF` in the slot.
pub fn op_store(vm: &mut Vm) -> Result<()> {
    let ref_cell = vm.pop()?;
    let addr = deref_addr(ref_cell, "store")?;
    let value = pop_store_value(vm)?;
    let existing = vm.arena.read_cell(addr)?;
    let existing_target = match existing.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => Some(value as usize),
        _ => None,
    };

    match (value, existing_target) {
        (StoreValue::Scalar(_), Some(_)) => Err(TacitError::TypeMismatch {
            op: "store",
            message: "cannot overwrite a compound slot with a simple value".into(),
        }),
        (StoreValue::Scalar(s), None) => vm.arena.write_cell(addr, s),
        (StoreValue::Compound(cells), Some(existing_header_addr)) => {
            let existing_header = vm.arena.read_cell(existing_header_addr)?;
            let existing_n =
                super::header_count(existing_header).ok_or(TacitError::TypeMismatch {
                    op: "store",
                    message: "existing ref does not point at a LIST".into(),
                })?;
            if existing_n != cells.len() {
                return Err(TacitError::TypeMismatch {
                    op: "store",
                    message: "incompatible list shapes".into(),
                });
            }
            let base = existing_header_addr - existing_n;
            for (i, c) in cells.into_iter().enumerate() {
                vm.arena.write_cell(base + i, c)?;
            }
            Ok(())
        }
        (StoreValue::Compound(cells), None) if existing.is_nil() && is_global(vm, addr) => {
            allocate_on_global_heap(vm, &cells, addr)
        }
        (StoreValue::Compound(_), None) => Err(TacitError::TypeMismatch {
            op: "store",
            message: "cannot overwrite a simple slot with a compound value".into(),
        }),
    }
}

fn is_global(vm: &Vm, addr: usize) -> bool {
    matches!(vm.classify(addr), Some(Segment::Global))
}

fn allocate_on_global_heap(vm: &mut Vm, cells: &[Cell], slot_addr: usize) -> Result<()> {
    let n = cells.len();
    let base = vm.gp;
    if base + n + 1 > STACK_BASE {
        return Err(TacitError::HeapExhausted);
    }
    for (i, c) in cells.iter().enumerate() {
        vm.arena.write_cell(base + i, *c)?;
    }
    let header_addr = base + n;
    vm.arena
        .write_cell(header_addr, encode(n as i32, Tag::List, false))?;
    vm.gp = header_addr + 1;
    vm.arena
        .write_cell(slot_addr, encode(header_addr as i32, Tag::DataRef, false))
}
