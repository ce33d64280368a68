//! Fetch-decode-execute loop and the opcode handlers spec.md §4.7 assigns
//! directly to the interpreter rather than to the list/globals/capsule
//! subsystems: literals, call/return, branches, `eval`, `print`, `sym`.

use crate::builtins::is_truthy;
use crate::cell::{encode, encode_number, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::memory::{RSTACK_BASE, STACK_BASE};
use crate::vm::Vm;

/// Runs bytecode starting at `entry` until `running` goes false (`Abort`,
/// or an `Exit` with no enclosing frame) or a handler errors.
pub fn run(vm: &mut Vm, entry: usize) -> Result<()> {
    vm.ip = entry;
    vm.running = true;
    while vm.running {
        let op_byte = vm.arena.read8(vm.ip)?;
        let handler = vm.handlers[op_byte as usize].ok_or(TacitError::InvalidOpcode {
            opcode: op_byte,
            ip: vm.ip,
        })?;
        if vm.debug {
            if let Some(trace) = vm.trace.as_deref_mut() {
                let name = crate::opcode::Opcode::try_from(op_byte)
                    .map(|o| format!("{o:?}"))
                    .unwrap_or_else(|_| format!("0x{op_byte:02x}"));
                trace.on_opcode(vm.ip, &name);
            }
        }
        vm.ip += 1;
        handler(vm)?;
    }
    Ok(())
}

pub fn op_literal_number(vm: &mut Vm) -> Result<()> {
    let v = vm.arena.read_float32(vm.ip)?;
    vm.ip += 4;
    vm.push(encode_number(v))
}

pub fn op_literal_string(vm: &mut Vm) -> Result<()> {
    let addr = vm.arena.read16(vm.ip)?;
    vm.ip += 2;
    vm.push(encode(addr as i32, Tag::String, false))
}

/// Pushes the caller's return address and a frame-relative saved BP, then
/// jumps. `addr` is a 16-bit absolute CODE offset.
fn call(vm: &mut Vm, addr: usize) -> Result<()> {
    let ret_ip = encode(vm.ip as i32, Tag::Code, false);
    vm.rpush(ret_ip)?;
    let saved_bp_rel = vm.bp - RSTACK_BASE;
    vm.rpush(encode(saved_bp_rel as i32, Tag::DataRef, false))?;
    vm.bp = vm.rp;
    vm.ip = addr;
    Ok(())
}

pub fn op_call(vm: &mut Vm) -> Result<()> {
    let addr = vm.arena.read16(vm.ip)? as usize;
    vm.ip += 2;
    call(vm, addr)
}

/// Unwinds locals above BP, then pops the saved BP and return address
/// beneath it. With nothing beneath the outermost frame's BP, this is the
/// top-level program's return and stops the VM (spec.md §4.7).
pub fn op_exit(vm: &mut Vm) -> Result<()> {
    if vm.bp < RSTACK_BASE + 2 {
        vm.running = false;
        return Ok(());
    }
    vm.rp = vm.bp;
    let saved_bp = vm.rpop()?;
    let ret_ip = vm.rpop()?;
    vm.bp = match saved_bp.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => RSTACK_BASE + value as usize,
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

pub fn op_branch(vm: &mut Vm) -> Result<()> {
    let offset = vm.arena.read_i16(vm.ip)?;
    let after = vm.ip + 2;
    vm.ip = (after as i64 + offset as i64) as usize;
    Ok(())
}

pub fn op_branch_if_false(vm: &mut Vm) -> Result<()> {
    let offset = vm.arena.read_i16(vm.ip)?;
    let after = vm.ip + 2;
    let cond = vm.pop()?;
    vm.ip = if is_truthy(cond) {
        after
    } else {
        (after as i64 + offset as i64) as usize
    };
    Ok(())
}

/// Pops TOS: a CODE value calls (or tail-calls, when its meta bit is set,
/// reusing the current frame instead of pushing a new one); a BUILTIN
/// value dispatches directly; anything else is pushed back unchanged.
pub fn op_eval(vm: &mut Vm) -> Result<()> {
    let v = vm.pop()?;
    match v.decode() {
        Decoded::Tagged {
            tag: Tag::Code,
            value,
            meta,
        } => {
            let addr = value as usize;
            if meta {
                vm.ip = addr;
                Ok(())
            } else {
                call(vm, addr)
            }
        }
        Decoded::Tagged {
            tag: Tag::Builtin,
            value,
            ..
        } => {
            let opcode = value as u8;
            let handler = vm.handlers[opcode as usize].ok_or(TacitError::InvalidOpcode {
                opcode,
                ip: vm.ip,
            })?;
            handler(vm)
        }
        _ => vm.push(v),
    }
}

pub fn op_abort(vm: &mut Vm) -> Result<()> {
    vm.running = false;
    Ok(())
}

/// Records the current data-stack depth on the return stack so a matching
/// `GroupRight` can compute how many values were pushed in between.
pub fn op_group_left(vm: &mut Vm) -> Result<()> {
    let depth = (vm.sp - STACK_BASE) as i32;
    vm.rpush(encode(depth, Tag::Integer, false))
}

pub fn op_group_right(vm: &mut Vm) -> Result<()> {
    let recorded = vm.rpop()?;
    let recorded = match recorded.decode() {
        Decoded::Tagged {
            tag: Tag::Integer,
            value,
            ..
        } => value,
        _ => return Err(TacitError::Fatal("corrupt GroupLeft marker".into())),
    };
    let depth = (vm.sp - STACK_BASE) as i32;
    vm.push(encode_number((depth - recorded) as f32))
}

pub fn op_print(vm: &mut Vm) -> Result<()> {
    let v = vm.pop()?;
    let text = format!("{v:?}");
    vm.output.print(&text);
    Ok(())
}

pub fn op_push_symbol_ref(vm: &mut Vm) -> Result<()> {
    let v = vm.pop()?;
    let name = match v.decode() {
        Decoded::Tagged {
            tag: Tag::String,
            value,
            ..
        } => vm.digest.get(&vm.arena, value as u16)?,
        _ => {
            return Err(TacitError::TypeMismatch {
                op: "sym",
                message: "expected a STRING".into(),
            })
        }
    };
    let entry = vm
        .dictionary
        .find(&vm.arena, &vm.digest, &name)?
        .ok_or(TacitError::UnknownWord { name })?;
    vm.push(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Tag;
    use crate::opcode::Opcode;

    fn emit_op(vm: &mut Vm, at: usize, op: Opcode) -> usize {
        vm.arena.write8(at, op as u8).unwrap();
        at + 1
    }

    #[test]
    fn literal_number_then_abort() {
        let mut vm = Vm::new();
        let mut cp = 0;
        cp = emit_op(&mut vm, cp, Opcode::LiteralNumber);
        vm.arena.write_float32(cp, 42.0).unwrap();
        cp += 4;
        emit_op(&mut vm, cp, Opcode::Abort);
        run(&mut vm, 0).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(42.0));
    }

    #[test]
    fn call_and_exit_round_trip() {
        let mut vm = Vm::new();
        // main: Call square_addr; Abort
        let mut cp = 0;
        cp = emit_op(&mut vm, cp, Opcode::Call);
        let call_operand_at = cp;
        cp += 2;
        emit_op(&mut vm, cp, Opcode::Abort);
        cp += 1;

        // square: Dup; Mul; Exit
        let square_addr = cp;
        vm.arena.write16(call_operand_at, square_addr as u16).unwrap();
        cp = emit_op(&mut vm, cp, Opcode::Dup);
        cp = emit_op(&mut vm, cp, Opcode::Mul);
        emit_op(&mut vm, cp, Opcode::Exit);

        vm.push(encode_number(5.0)).unwrap();
        run(&mut vm, 0).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(25.0));
    }

    #[test]
    fn branch_if_false_skips_on_false() {
        let mut vm = Vm::new();
        let mut cp = 0;
        cp = emit_op(&mut vm, cp, Opcode::BranchIfFalse);
        let offset_at = cp;
        cp += 2;
        cp = emit_op(&mut vm, cp, Opcode::LiteralNumber);
        vm.arena.write_float32(cp, 1.0).unwrap();
        cp += 4;
        let skip_target = cp;
        cp = emit_op(&mut vm, cp, Opcode::LiteralNumber);
        vm.arena.write_float32(cp, 2.0).unwrap();
        cp += 4;
        emit_op(&mut vm, cp, Opcode::Abort);

        let offset = (skip_target as i64 - (offset_at + 2) as i64) as i16;
        vm.arena.write_i16(offset_at, offset).unwrap();

        vm.push(encode(0, Tag::Integer, false)).unwrap();
        run(&mut vm, 0).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(2.0));
    }

    #[test]
    fn eval_dispatches_builtin() {
        let mut vm = Vm::new();
        let mut cp = 0;
        cp = emit_op(&mut vm, cp, Opcode::Eval);
        emit_op(&mut vm, cp, Opcode::Abort);

        vm.push(encode_number(5.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        vm.push(encode(Opcode::Add as i32, Tag::Builtin, false)).unwrap();
        run(&mut vm, 0).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(8.0));
    }

    #[test]
    fn sym_resolves_builtin_name() {
        let mut vm = Vm::new();
        let addr = vm.digest.intern(&mut vm.arena, "+").unwrap();
        let mut cp = 0;
        cp = emit_op(&mut vm, cp, Opcode::PushSymbolRef);
        emit_op(&mut vm, cp, Opcode::Abort);

        vm.push(encode(addr as i32, Tag::String, false)).unwrap();
        run(&mut vm, 0).unwrap();
        let resolved = vm.pop().unwrap();
        assert_eq!(resolved.decode().tag(), Some(Tag::Builtin));
    }
}
