//! Locals, globals, and global-heap primitives (spec.md §4.9).
//!
//! Locals live on the return stack between `BP` and `RP`; `InitVar`
//! grows that range as each `var` declaration executes, so `RP` always
//! marks the return stack's actual high-water mark even though the
//! compiler assigns slot numbers purely from a compile-time counter.
//! Globals are fixed-offset cells in the GLOBAL window, reserved by the
//! compiler outside of this module's concern — `globals` here only
//! reads and writes whatever offset it is given.

use crate::cell::{encode, Cell, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::memory::{GLOBAL_BASE, STACK_BASE};
use crate::vm::Vm;

fn read_operand(vm: &mut Vm) -> Result<usize> {
    let v = vm.arena.read16(vm.ip)?;
    vm.ip += 2;
    Ok(v as usize)
}

/// `LoadLocal slot`: pushes a `DATA_REF` to `BP + slot`.
pub fn op_load_local(vm: &mut Vm) -> Result<()> {
    let slot = read_operand(vm)?;
    let addr = vm.bp + slot;
    vm.push(encode(addr as i32, Tag::DataRef, false))
}

/// `InitVar slot`: pops TOS and writes it at `BP + slot`, extending `RP`
/// if this is the first write to that slot.
pub fn op_init_var(vm: &mut Vm) -> Result<()> {
    let slot = read_operand(vm)?;
    let addr = vm.bp + slot;
    let v = vm.pop()?;
    vm.arena.write_cell(addr, v)?;
    if addr >= vm.rp {
        vm.rp = addr + 1;
    }
    Ok(())
}

/// `GlobalRef offset`: pushes a `DATA_REF` to `GLOBAL_BASE + offset`.
pub fn op_global_ref(vm: &mut Vm) -> Result<()> {
    let offset = read_operand(vm)?;
    vm.push(encode((GLOBAL_BASE + offset) as i32, Tag::DataRef, false))
}

fn pop_heap_value(vm: &mut Vm) -> Result<Vec<Cell>> {
    let top = vm.pop()?;
    match crate::list::header_count(top) {
        Some(n) => {
            let mut cells = Vec::with_capacity(n + 1);
            for _ in 0..n {
                cells.push(vm.pop()?);
            }
            cells.reverse();
            cells.push(top);
            Ok(cells)
        }
        None => Ok(vec![top]),
    }
}

fn copy_to_heap(vm: &mut Vm, cells: &[Cell]) -> Result<usize> {
    let base = vm.gp;
    if base + cells.len() > STACK_BASE {
        return Err(TacitError::HeapExhausted);
    }
    for (i, c) in cells.iter().enumerate() {
        vm.arena.write_cell(base + i, *c)?;
    }
    vm.gp = base + cells.len();
    Ok(base + cells.len() - 1)
}

/// `InitGlobal offset`: pops TOS and writes it to `GLOBAL_BASE + offset`;
/// a compound value is deep-copied onto the global heap first and the
/// cell instead receives a `DATA_REF` to the copy.
pub fn op_init_global(vm: &mut Vm) -> Result<()> {
    let offset = read_operand(vm)?;
    let addr = GLOBAL_BASE + offset;
    let cells = pop_heap_value(vm)?;
    if cells.len() == 1 && crate::list::header_count(cells[0]).is_none() {
        return vm.arena.write_cell(addr, cells[0]);
    }
    let top_addr = copy_to_heap(vm, &cells)?;
    vm.arena
        .write_cell(addr, encode(top_addr as i32, Tag::DataRef, false))
}

/// `gpush`: copies TOS onto the top of the global heap (the full span,
/// for a list) and replaces it with a `DATA_REF` to the copy.
pub fn op_gpush(vm: &mut Vm) -> Result<()> {
    let cells = pop_heap_value(vm)?;
    let top_addr = copy_to_heap(vm, &cells)?;
    vm.push(encode(top_addr as i32, Tag::DataRef, false))
}

fn ref_addr(cell: Cell, op: &'static str) -> Result<usize> {
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

/// `gpop ref`: requires `ref` to name the current heap top and rewinds
/// `GP` by its span (1 for a scalar, `1 + n` for a LIST).
pub fn op_gpop(vm: &mut Vm) -> Result<()> {
    let r = vm.pop()?;
    let addr = ref_addr(r, "gpop")?;
    let span = crate::list::span_at(vm, addr)?;
    if addr + 1 != vm.gp {
        return Err(TacitError::TypeMismatch {
            op: "gpop",
            message: "ref does not refer to the current heap top".into(),
        });
    }
    vm.gp = addr + 1 - span;
    Ok(())
}

/// `gpeek ref`: materializes the LIST `ref` points to onto the data
/// stack without moving `GP`.
pub fn op_gpeek(vm: &mut Vm) -> Result<()> {
    let r = vm.pop()?;
    let list = crate::list::resolve(vm, r, "gpeek")?;
    crate::list::materialize(vm, list)
}

/// `gmark`: pushes the current `GP` as an opaque mark.
pub fn op_gmark(vm: &mut Vm) -> Result<()> {
    vm.push(encode(vm.gp as i32, Tag::DataRef, false))
}

/// `gsweep mark`: restores `GP` to a mark taken by `gmark`.
pub fn op_gsweep(vm: &mut Vm) -> Result<()> {
    let mark = vm.pop()?;
    vm.gp = ref_addr(mark, "gsweep")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;
    use crate::memory::RSTACK_BASE;
    use crate::opcode::Opcode;

    fn emit16(vm: &mut Vm, at: usize, op: Opcode, operand: u16) -> usize {
        vm.arena.write8(at, op as u8).unwrap();
        vm.arena.write16(at + 1, operand).unwrap();
        at + 3
    }

    #[test]
    fn init_var_then_load_local_roundtrips() {
        let mut vm = Vm::new();
        assert_eq!(vm.bp, RSTACK_BASE);
        let mut cp = 0;
        vm.push(encode_number(9.0)).unwrap();
        cp = emit16(&mut vm, cp, Opcode::InitVar, 0);
        emit16(&mut vm, cp, Opcode::LoadLocal, 0);
        vm.arena.write8(cp + 3, Opcode::Abort as u8).unwrap();
        crate::interpreter::run(&mut vm, 0).unwrap();

        let r = vm.pop().unwrap();
        let addr = ref_addr(r, "test").unwrap();
        assert_eq!(addr, RSTACK_BASE);
        assert_eq!(vm.arena.read_cell(addr).unwrap(), encode_number(9.0));
        assert_eq!(vm.rp, RSTACK_BASE + 1);
    }

    #[test]
    fn init_global_heap_copies_compound_value() {
        let mut vm = Vm::new();
        let offset = 0x1000;
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode(2, Tag::List, false)).unwrap();
        let mut cp = 0;
        emit16(&mut vm, cp, Opcode::InitGlobal, offset as u16);
        cp += 3;
        vm.arena.write8(cp, Opcode::Abort as u8).unwrap();
        crate::interpreter::run(&mut vm, 0).unwrap();

        let slot = vm.arena.read_cell(GLOBAL_BASE + offset).unwrap();
        let addr = ref_addr(slot, "test").unwrap();
        assert_eq!(vm.arena.read_cell(addr).unwrap().decode().value(), Some(2));
    }

    #[test]
    fn gpush_then_gpop_rewinds_heap() {
        let mut vm = Vm::new();
        let before = vm.gp;
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode(2, Tag::List, false)).unwrap();
        op_gpush(&mut vm).unwrap();
        assert!(vm.gp > before);

        let r = vm.pop().unwrap();
        vm.push(r).unwrap();
        op_gpop(&mut vm).unwrap();
        assert_eq!(vm.gp, before);
    }

    #[test]
    fn gmark_and_gsweep_restore_heap_pointer() {
        let mut vm = Vm::new();
        op_gmark(&mut vm).unwrap();
        let mark = vm.peek().unwrap();
        vm.push(encode_number(1.0)).unwrap();
        op_gpush(&mut vm).unwrap();
        vm.pop().unwrap();
        assert!(vm.gp > ref_addr(mark, "test").unwrap());

        op_gsweep(&mut vm).unwrap();
        assert_eq!(vm.gp, ref_addr(mark, "test").unwrap());
    }
}
