//! Numeric, comparison, and basic stack primitives (spec.md §1: "Built-in
//! numeric primitives... their implementations are trivial and not
//! elaborated") plus [`install`], which seeds the dictionary with every
//! builtin's name at VM construction.

use crate::cell::{encode, encode_number, Cell, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::opcode::Opcode;
use crate::vm::Vm;

pub fn install(vm: &mut Vm) -> Result<()> {
    let mut gp = vm.gp;
    macro_rules! def {
        ($name:expr, $op:expr) => {
            vm.dictionary
                .define_builtin(&mut vm.arena, &mut vm.digest, &mut gp, $name, $op as u8, false)?;
        };
    }

    def!("dup", Opcode::Dup);
    def!("drop", Opcode::Drop);
    def!("swap", Opcode::Swap);
    def!("over", Opcode::Over);
    def!("+", Opcode::Add);
    def!("-", Opcode::Sub);
    def!("*", Opcode::Mul);
    def!("/", Opcode::Div);
    def!("mod", Opcode::Mod);
    def!("<", Opcode::Lt);
    def!(">", Opcode::Gt);
    def!("<=", Opcode::Le);
    def!(">=", Opcode::Ge);
    def!("=", Opcode::Eq);
    def!("!=", Opcode::Ne);
    def!("&", Opcode::And);
    def!("|", Opcode::Or);
    def!("!", Opcode::Not);
    def!("neg", Opcode::Neg);
    def!("eval", Opcode::Eval);
    def!("print", Opcode::Print);
    def!("sym", Opcode::PushSymbolRef);

    def!("pack", Opcode::Pack);
    def!("unpack", Opcode::Unpack);
    def!("enlist", Opcode::Enlist);
    def!("length", Opcode::Length);
    def!("size", Opcode::Size);
    def!("slot", Opcode::Slot);
    def!("elem", Opcode::Elem);
    def!("find", Opcode::Find);
    def!("walk", Opcode::Walk);
    def!("keys", Opcode::Keys);
    def!("values", Opcode::Values);
    def!("ref", Opcode::Ref);
    def!("head", Opcode::Head);
    def!("tail", Opcode::Tail);
    def!("reverse", Opcode::Reverse);
    def!("concat", Opcode::Concat);
    def!("fetch", Opcode::Fetch);
    def!("load", Opcode::Load);
    def!("store", Opcode::Store);

    def!("gpush", Opcode::GlobalPush);
    def!("gpop", Opcode::GlobalPop);
    def!("gpeek", Opcode::GlobalPeek);
    def!("gmark", Opcode::GlobalMark);
    def!("gsweep", Opcode::GlobalSweep);

    def!("capsule", Opcode::Capsule);
    def!("dispatch", Opcode::Dispatch);
    def!("exit-dispatch", Opcode::ExitDispatch);

    vm.gp = gp;
    Ok(())
}

/// Accepts a NUMBER cell directly, or an INTEGER-tagged cell widened to
/// float; anything else is a type error. The numeric primitives this crate
/// enumerates don't otherwise distinguish int/float at runtime (spec.md
/// treats both as interchangeable cell contents for arithmetic).
fn as_f32(op: &'static str, cell: Cell) -> Result<f32> {
    match cell.decode() {
        Decoded::Number(n) => Ok(n),
        Decoded::Tagged {
            tag: Tag::Integer,
            value,
            ..
        } => Ok(value as f32),
        _ => Err(TacitError::TypeMismatch {
            op,
            message: "expected a number".into(),
        }),
    }
}

fn bool_cell(b: bool) -> Cell {
    encode(if b { 1 } else { 0 }, Tag::Integer, false)
}

macro_rules! binary_numeric {
    ($name:ident, $op_name:expr, $f:expr) => {
        pub fn $name(vm: &mut Vm) -> Result<()> {
            let b = vm.pop()?;
            let a = vm.pop()?;
            let a = as_f32($op_name, a)?;
            let b = as_f32($op_name, b)?;
            vm.push(encode_number($f(a, b)))
        }
    };
}

macro_rules! binary_compare {
    ($name:ident, $op_name:expr, $f:expr) => {
        pub fn $name(vm: &mut Vm) -> Result<()> {
            let b = vm.pop()?;
            let a = vm.pop()?;
            let a = as_f32($op_name, a)?;
            let b = as_f32($op_name, b)?;
            vm.push(bool_cell($f(a, b)))
        }
    };
}

binary_numeric!(op_add, "+", |a, b| a + b);
binary_numeric!(op_sub, "-", |a, b| a - b);
binary_numeric!(op_mul, "*", |a, b| a * b);

pub fn op_div(vm: &mut Vm) -> Result<()> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    let a = as_f32("/", a)?;
    let b = as_f32("/", b)?;
    if b == 0.0 {
        return Err(TacitError::DivisionByZero { op: "/" });
    }
    vm.push(encode_number(a / b))
}

pub fn op_mod(vm: &mut Vm) -> Result<()> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    let a = as_f32("mod", a)?;
    let b = as_f32("mod", b)?;
    if b == 0.0 {
        return Err(TacitError::DivisionByZero { op: "mod" });
    }
    vm.push(encode_number(a % b))
}

binary_compare!(op_lt, "<", |a, b| a < b);
binary_compare!(op_gt, ">", |a, b| a > b);
binary_compare!(op_le, "<=", |a, b| a <= b);
binary_compare!(op_ge, ">=", |a, b| a >= b);
binary_compare!(op_eq, "=", |a, b| a == b);
binary_compare!(op_ne, "!=", |a, b| a != b);

pub(crate) fn is_truthy(cell: Cell) -> bool {
    match cell.decode() {
        Decoded::Number(n) => n != 0.0,
        Decoded::Tagged {
            tag: Tag::Integer,
            value,
            ..
        } => value != 0,
        Decoded::Tagged { tag: Tag::Nil, .. } => false,
        _ => true,
    }
}

pub fn op_and(vm: &mut Vm) -> Result<()> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.push(bool_cell(is_truthy(a) && is_truthy(b)))
}

pub fn op_or(vm: &mut Vm) -> Result<()> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.push(bool_cell(is_truthy(a) || is_truthy(b)))
}

pub fn op_not(vm: &mut Vm) -> Result<()> {
    let a = vm.pop()?;
    vm.push(bool_cell(!is_truthy(a)))
}

pub fn op_neg(vm: &mut Vm) -> Result<()> {
    let a = vm.pop()?;
    let a = as_f32("neg", a)?;
    vm.push(encode_number(-a))
}

pub fn op_dup(vm: &mut Vm) -> Result<()> {
    let v = vm.peek()?;
    vm.push(v)
}

pub fn op_drop(vm: &mut Vm) -> Result<()> {
    vm.pop().map(|_| ())
}

pub fn op_swap(vm: &mut Vm) -> Result<()> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.push(b)?;
    vm.push(a)
}

pub fn op_over(vm: &mut Vm) -> Result<()> {
    let v = vm.peek_at(1)?;
    vm.push(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;

    #[test]
    fn arithmetic() {
        let mut vm = Vm::new();
        vm.push(encode_number(5.0)).unwrap();
        vm.push(encode_number(3.0)).unwrap();
        op_add(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(8.0));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let mut vm = Vm::new();
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(0.0)).unwrap();
        assert!(matches!(op_div(&mut vm), Err(TacitError::DivisionByZero { .. })));
    }

    #[test]
    fn stack_shuffles() {
        let mut vm = Vm::new();
        vm.push(encode_number(1.0)).unwrap();
        vm.push(encode_number(2.0)).unwrap();
        op_swap(&mut vm).unwrap();
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(1.0));
        assert_eq!(vm.pop().unwrap().decode(), Decoded::Number(2.0));
    }

    #[test]
    fn comparisons_push_integer_bool() {
        let mut vm = Vm::new();
        vm.push(encode_number(3.0)).unwrap();
        vm.push(encode_number(5.0)).unwrap();
        op_lt(&mut vm).unwrap();
        assert_eq!(
            vm.pop().unwrap().decode(),
            Decoded::Tagged {
                tag: Tag::Integer,
                value: 1,
                meta: false
            }
        );
    }

    #[test]
    fn install_seeds_dictionary() {
        let vm = Vm::new();
        let entry = vm.dictionary.find(&vm.arena, &vm.digest, "+").unwrap();
        assert!(entry.is_some());
    }
}
