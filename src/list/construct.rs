//! List construction: `( ... )` literal compilation support (`OpenList`,
//! `CloseList`), plus `pack`/`unpack`/`enlist`.

use crate::cell::{encode, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::vm::Vm;

/// Pushes a placeholder `LIST:0` header and records its stack address on
/// the return stack so the matching `CloseList` can find it again, even
/// across arbitrary nesting (each `(` gets its own placeholder).
pub fn op_open_list(vm: &mut Vm) -> Result<()> {
    let header_addr = vm.sp;
    vm.push(encode(0, Tag::List, false))?;
    vm.rpush(encode(header_addr as i32, Tag::DataRef, false))?;
    vm.list_depth += 1;
    Ok(())
}

/// Finalizes the most recently opened list: the slot count is everything
/// pushed since the matching `OpenList` (spec.md §8's invariant: "the
/// header's slot count equals the number of cells pushed in between").
/// The header started at the *bottom* of that span (it was pushed first);
/// rotating the span left by one cell moves it to the top, which is what
/// "header-at-top" traversal requires, while leaving every other cell's
/// relative order — including an already-finalized nested list's own
/// header-on-top layout — untouched. Doing this at every close (not only
/// the outermost) is what makes nested lists come out oriented correctly
/// without any recursive re-walk (see DESIGN.md).
pub fn op_close_list(vm: &mut Vm) -> Result<()> {
    let saved = vm.rpop()?;
    let header_addr = match saved.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => value as usize,
        _ => return Err(TacitError::Fatal("corrupt OpenList marker".into())),
    };
    vm.list_depth = vm.list_depth.saturating_sub(1);

    let slot_count = vm.sp - header_addr - 1;
    let header = encode(slot_count as i32, Tag::List, false);
    vm.arena.write_cell(header_addr, header)?;
    rotate_left_one(vm, header_addr, slot_count + 1)
}

fn rotate_left_one(vm: &mut Vm, base: usize, len: usize) -> Result<()> {
    if len <= 1 {
        return Ok(());
    }
    let first = vm.arena.read_cell(base)?;
    for i in 0..len - 1 {
        let v = vm.arena.read_cell(base + i + 1)?;
        vm.arena.write_cell(base + i, v)?;
    }
    vm.arena.write_cell(base + len - 1, first)
}

/// `( v_n-1 … v_0 n -- LIST:n )`: pops the count, pops that many values,
/// then re-pushes them in the reverse of pop order (restoring declaration
/// order) before pushing the header.
pub fn op_pack(vm: &mut Vm) -> Result<()> {
    let n = super::pop_index(vm, "pack")?;
    let mut popped = Vec::with_capacity(n);
    for _ in 0..n {
        popped.push(vm.pop()?);
    }
    for v in popped.into_iter().rev() {
        vm.push(v)?;
    }
    vm.push(encode(n as i32, Tag::List, false))
}

/// The inverse of `pack`, without re-supplying a count: a direct LIST
/// header at TOS simply has its header dropped (the payload remains in
/// declaration order below); a `DATA_REF` to one is materialized onto the
/// stack instead, since there is nothing in place yet to drop.
pub fn op_unpack(vm: &mut Vm) -> Result<()> {
    let top = vm.peek()?;
    match top.decode() {
        Decoded::Tagged { tag: Tag::List, .. } => {
            vm.pop()?;
            Ok(())
        }
        Decoded::Tagged {
            tag: Tag::DataRef, ..
        } => {
            let list = super::resolve(vm, top, "unpack")?;
            vm.pop()?;
            super::materialize(vm, list)
        }
        _ => Err(TacitError::TypeMismatch {
            op: "unpack",
            message: "expected a LIST or a ref to one".into(),
        }),
    }
}

/// Wraps TOS in a `LIST:1`.
pub fn op_enlist(vm: &mut Vm) -> Result<()> {
    vm.push(encode(1, Tag::List, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{encode_number, Tag};
    use crate::memory::STACK_BASE;

    #[test]
    fn flat_list_literal() {
        let mut vm = Vm::new();
        op_open_list(&mut vm).unwrap();
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_close_list(&mut vm).unwrap();

        assert_eq!(vm.pop().unwrap().decode().tag(), Some(Tag::List));
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
        assert_eq!(vm.sp, STACK_BASE);
    }

    #[test]
    fn nested_list_literal_spatial_order() {
        // ( 1 ( 2 3 ) 4 )
        let mut vm = Vm::new();
        op_open_list(&mut vm).unwrap();
        vm.push(encode_number(1.0)).unwrap();
        op_open_list(&mut vm).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_close_list(&mut vm).unwrap();
        vm.push(encode_number(4.0)).unwrap();
        op_close_list(&mut vm).unwrap();

        let cells: Vec<_> = (STACK_BASE..vm.sp)
            .map(|a| vm.arena.read_cell(a).unwrap())
            .collect();
        assert_eq!(cells[0], encode_number(1.0));
        assert_eq!(cells[1], encode_number(2.0));
        assert_eq!(cells[2], encode_number(3.0));
        assert_eq!(cells[3].decode().tag(), Some(Tag::List));
        assert_eq!(cells[3].decode().value(), Some(2));
        assert_eq!(cells[4], encode_number(4.0));
        assert_eq!(cells[5].decode().tag(), Some(Tag::List));
    }

    #[test]
    fn pack_then_unpack_round_trips() {
        let mut vm = Vm::new();
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_pack(&mut vm).unwrap();
        assert_eq!(vm.peek().unwrap().decode().tag(), Some(Tag::List));

        op_unpack(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
    }

    #[test]
    fn enlist_wraps_single_value() {
        let mut vm = Vm::new();
        vm.push(encode_number(9.0)).unwrap();
        op_enlist(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap().decode().value(), Some(1));
    }
}
