//! `var name` declarations (spec.md §4.6, §4.9): bind the next local slot
//! in the current definition's scope and emit the store that seeds it from
//! whatever is on top of the data stack.

use crate::error::Result;
use crate::opcode::Opcode;
use crate::vm::Vm;

pub(super) fn compile_var(vm: &mut Vm, name: &str) -> Result<()> {
    let slot = vm.dictionary.define_local(name);
    super::compile_opcode(vm, Opcode::InitVar)?;
    super::compile16(vm, slot)
}
