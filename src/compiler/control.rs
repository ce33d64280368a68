//! `if/else/endif`, `when/do/enddo/endwhen`, and `case/of/endof/endcase`
//! (spec.md §4.6, §4.10) as immediate words: each emits a conditional or
//! unconditional branch with a placeholder 16-bit offset, and the matching
//! closer patches it once the target address is known. Placeholders live
//! on the VM's own data stack for the duration of one compile — that's the
//! one piece of compile-time state these forms need, and spec.md already
//! names the data stack as where it belongs.

use crate::cell::Cell;
use crate::error::{Result, TacitError};
use crate::opcode::Opcode;
use crate::vm::Vm;

use super::{compile_opcode, patch_forward, pop_addr, push_addr};

// --- if / else / endif ---

pub fn compile_if(vm: &mut Vm) -> Result<()> {
    compile_opcode(vm, Opcode::BranchIfFalse)?;
    let operand = vm.cp;
    super::compile16(vm, 0)?;
    push_addr(vm, operand)
}

pub fn compile_else(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    compile_opcode(vm, Opcode::Branch)?;
    let operand = vm.cp;
    super::compile16(vm, 0)?;
    let if_operand = pop_addr(vm, "else", line, col)?;
    patch_forward(vm, if_operand)?;
    push_addr(vm, operand)
}

pub fn compile_endif(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    let operand = pop_addr(vm, "endif", line, col)?;
    patch_forward(vm, operand)
}

// --- when / do / enddo / endwhen ---
//
// Read as a while-loop: `when` marks the loop top (the condition-testing
// code that follows runs every iteration), `do` consumes the condition's
// boolean and branches past the body on false, `enddo` unconditionally
// branches back to the loop top, and `endwhen` is where that `do` branch
// lands on exit. Two addresses are live across the body at once (the loop
// top, needed by `enddo`, and `do`'s forward patch, needed by `endwhen`),
// so they're threaded on the data stack as [loop_top, do_patch].

pub fn compile_when(vm: &mut Vm) -> Result<()> {
    push_addr(vm, vm.cp)
}

pub fn compile_do(vm: &mut Vm) -> Result<()> {
    compile_opcode(vm, Opcode::BranchIfFalse)?;
    let operand = vm.cp;
    super::compile16(vm, 0)?;
    push_addr(vm, operand)
}

pub fn compile_enddo(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    let do_patch = pop_addr(vm, "enddo", line, col)?;
    let loop_top = pop_addr(vm, "enddo", line, col)?;
    compile_opcode(vm, Opcode::Branch)?;
    let operand = vm.cp;
    let offset = (loop_top as i64 - (operand + 2) as i64) as i16;
    super::compile16(vm, offset as u16)?;
    push_addr(vm, do_patch)
}

pub fn compile_endwhen(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    let do_patch = pop_addr(vm, "endwhen", line, col)?;
    patch_forward(vm, do_patch)
}

// --- case / of / endof / endcase ---
//
// `case` leaves the runtime selector on the stack and pushes a NIL
// sentinel on the compile-time stack marking where this case's `endof`
// patches start. Each `of` duplicates the selector (`Over`), compares it
// to the value just compiled before it (`=`), and branches past the arm's
// body on mismatch; the matched path drops the selector before the body
// runs. Each `endof` branches unconditionally to `endcase` and patches the
// preceding `of`'s mismatch branch to land on the next arm. `endcase` pops
// every pending `endof` patch down to the sentinel and patches them all to
// the address right after the whole statement — an unmatched selector
// simply falls through with nothing dropped, per standard CASE semantics.

pub fn compile_case(vm: &mut Vm) -> Result<()> {
    vm.push(Cell::nil())
}

pub fn compile_of(vm: &mut Vm) -> Result<()> {
    compile_opcode(vm, Opcode::Over)?;
    compile_opcode(vm, Opcode::Eq)?;
    compile_opcode(vm, Opcode::BranchIfFalse)?;
    let operand = vm.cp;
    super::compile16(vm, 0)?;
    push_addr(vm, operand)?;
    compile_opcode(vm, Opcode::Drop)
}

pub fn compile_endof(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    let of_patch = pop_addr(vm, "endof", line, col)?;
    compile_opcode(vm, Opcode::Branch)?;
    let operand = vm.cp;
    super::compile16(vm, 0)?;
    patch_forward(vm, of_patch)?;
    push_addr(vm, operand)
}

pub fn compile_endcase(vm: &mut Vm, line: u32, col: u32) -> Result<()> {
    loop {
        let top = vm.pop().map_err(|_| TacitError::Syntax {
            message: "`endcase` without a matching `case`".into(),
            line,
            col,
        })?;
        if top.is_nil() {
            return Ok(());
        }
        let operand = match top.decode() {
            crate::cell::Decoded::Tagged {
                tag: crate::cell::Tag::DataRef,
                value,
                ..
            } => value as usize,
            _ => {
                return Err(TacitError::Syntax {
                    message: "`endcase` without a matching `case`".into(),
                    line,
                    col,
                })
            }
        };
        patch_forward(vm, operand)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;
    use crate::compiler::compile_into;

    fn run(src: &str) -> Cell {
        let mut vm = Vm::new();
        let entry = compile_into(&mut vm, src).unwrap();
        crate::interpreter::run(&mut vm, entry).unwrap();
        vm.pop().unwrap()
    }

    #[test]
    fn when_do_loop_counts_down_to_zero() {
        // Counter lives on the data stack, not in a variable: each pass
        // dups it for the test, `do` consumes the dup, the body replaces
        // the original with its decrement, so depth never grows.
        let result = run("3 when dup do 1 - enddo endwhen");
        assert_eq!(result, encode_number(0.0));
    }

    #[test]
    fn case_picks_matching_arm() {
        let result = run("2 case 1 of 10 endof 2 of 20 endof 3 of 30 endof endcase");
        assert_eq!(result, encode_number(20.0));
    }

    #[test]
    fn case_falls_through_selector_on_no_match() {
        let result = run("9 case 1 of 10 endof endcase");
        assert_eq!(result, encode_number(9.0));
    }
}
