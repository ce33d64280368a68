//! Capsule dispatch (spec.md §4.9): object-like records whose last
//! payload slot is a CODE reference, living on the return stack as a
//! LIST built from the current call frame's locals.

use crate::cell::{encode, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::vm::Vm;

/// `capsule`: finalizes the current frame's locals (everything pushed
/// between `BP` and `RP`) as a LIST in place, and returns a `DATA_REF`
/// handle to its header — the same return-stack layout `CloseList` uses
/// on the data stack, just over the locals range instead.
pub fn op_capsule(vm: &mut Vm) -> Result<()> {
    let count = vm.rp - vm.bp;
    let header_addr = vm.rp;
    vm.rpush(encode(count as i32, Tag::List, false))?;
    vm.push(encode(header_addr as i32, Tag::DataRef, false))
}

/// `dispatch`: pops a capsule handle off the data stack, leaving any
/// `arg0 … argK method_selector` beneath it for the method body to
/// consume on its own terms. Saves the caller's IP and BP on the return
/// stack (mirroring `Call`'s prologue) then sets `BP` to the capsule's
/// base and jumps to its CODE slot (the header's last payload cell).
pub fn op_dispatch(vm: &mut Vm) -> Result<()> {
    let handle = vm.pop()?;
    let header_addr = match handle.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => value as usize,
        _ => {
            return Err(TacitError::TypeMismatch {
                op: "dispatch",
                message: "expected a capsule DATA_REF".into(),
            })
        }
    };
    let header = vm.arena.read_cell(header_addr)?;
    let count = crate::list::header_count(header).ok_or(TacitError::TypeMismatch {
        op: "dispatch",
        message: "handle does not refer to a capsule LIST".into(),
    })?;
    if count == 0 {
        return Err(TacitError::TypeMismatch {
            op: "dispatch",
            message: "capsule has no method slot".into(),
        });
    }
    let base = header_addr - count;
    let code_cell = vm.arena.read_cell(base + count - 1)?;
    let entry = match code_cell.decode() {
        Decoded::Tagged {
            tag: Tag::Code,
            value,
            ..
        } => value as usize,
        _ => {
            return Err(TacitError::TypeMismatch {
                op: "dispatch",
                message: "capsule's last slot is not a CODE reference".into(),
            })
        }
    };

    let ret_ip = encode(vm.ip as i32, Tag::Code, false);
    vm.rpush(ret_ip)?;
    let saved_bp_rel = vm.bp - crate::memory::RSTACK_BASE;
    vm.rpush(encode(saved_bp_rel as i32, Tag::DataRef, false))?;
    vm.bp = base;
    vm.ip = entry;
    Ok(())
}

/// `exit-dispatch`: restores IP and BP. Unlike `Exit`, this never
/// rewinds `RP` down to a frame base first — the capsule's fields are
/// persistent state, not a transient frame to reclaim, so only the two
/// cells `dispatch` itself pushed come off.
pub fn op_exit_dispatch(vm: &mut Vm) -> Result<()> {
    let saved_bp = vm.rpop()?;
    let ret_ip = vm.rpop()?;
    vm.bp = match saved_bp.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => crate::memory::RSTACK_BASE + value as usize,
        _ => return Err(TacitError::Fatal("corrupt saved BP on return stack".into())),
    };
    vm.ip = match ret_ip.decode() {
        Decoded::Tagged {
            tag: Tag::Code,
            value,
            ..
        } => value as usize,
        _ => return Err(TacitError::Fatal("corrupt return address on return stack".into())),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;
    use crate::opcode::Opcode;

    fn emit_op(vm: &mut Vm, at: usize, op: Opcode) -> usize {
        vm.arena.write8(at, op as u8).unwrap();
        at + 1
    }

    #[test]
    fn capsule_then_dispatch_runs_method_with_locals_as_bp() {
        let mut vm = Vm::new();

        // method: LoadLocal 0; Fetch; Dup; Add; ExitDispatch — doubles
        // the capsule's one field.
        let mut cp = 0;
        let method_addr = cp;
        cp = emit_op(&mut vm, cp, Opcode::LoadLocal);
        vm.arena.write16(cp, 0).unwrap();
        cp += 2;
        cp = emit_op(&mut vm, cp, Opcode::Fetch);
        cp = emit_op(&mut vm, cp, Opcode::Dup);
        cp = emit_op(&mut vm, cp, Opcode::Add);
        cp = emit_op(&mut vm, cp, Opcode::ExitDispatch);

        // main: Dispatch; Abort.
        let main_addr = cp;
        cp = emit_op(&mut vm, cp, Opcode::Dispatch);
        emit_op(&mut vm, cp, Opcode::Abort);

        // Build a one-field capsule directly on the return stack: field
        // value, then the method's CODE reference as the last slot.
        vm.bp = vm.rp;
        vm.rpush(encode_number(21.0)).unwrap();
        vm.rpush(encode(method_addr as i32, Tag::Code, false)).unwrap();
        super::op_capsule(&mut vm).unwrap();

        crate::interpreter::run(&mut vm, main_addr).unwrap();
        assert_eq!(vm.pop().unwrap(), encode_number(42.0));
    }
}
