//! Single-pass compiler: lowers a token stream to bytecode in the CODE
//! segment (spec.md §4.6).
//!
//! The emitter primitives (`compile8`/`compile16`/`compile_float32`/
//! `compile_opcode`) and the colon-definition/number/string/dictionary-word
//! dispatch live here; list-literal bracket handling, `var` declarations,
//! and the `if/else/endif` · `when/do/enddo/endwhen` · `case/of/endof/
//! endcase` control forms are split into submodules matching spec.md §2's
//! module table. Every control form's compile-time placeholder addresses
//! live on the VM's own data stack while compiling (spec.md §4.6: "closers
//! pop placeholders off the data stack"), not in a separate Rust-side
//! structure — there is exactly one scratch area, and it is the one the
//! runtime already has.

pub mod control;
pub mod list;
pub mod locals;

use crate::cell::{encode, Decoded, Tag};
use crate::error::{Result, TacitError};
use crate::opcode::Opcode;
use crate::token::{Token, TokenKind, Tokenizer};
use crate::vm::Vm;

/// Threaded through one `compile_into` call: whether a colon definition is
/// currently open (nesting is disallowed) and the list-literal bracket
/// depth (balance is checked at EOF).
struct CompilerState {
    in_definition: bool,
    list_depth: u32,
}

pub(crate) fn compile8(vm: &mut Vm, b: u8) -> Result<()> {
    vm.arena.write8(vm.cp, b)?;
    vm.cp += 1;
    Ok(())
}

pub(crate) fn compile16(vm: &mut Vm, v: u16) -> Result<()> {
    vm.arena.write16(vm.cp, v)?;
    vm.cp += 2;
    Ok(())
}

pub(crate) fn compile_float32(vm: &mut Vm, f: f32) -> Result<()> {
    vm.arena.write_float32(vm.cp, f)?;
    vm.cp += 4;
    Ok(())
}

pub(crate) fn compile_opcode(vm: &mut Vm, op: Opcode) -> Result<()> {
    compile8(vm, op as u8)
}

/// Tokenizes and compiles `source` into `vm`'s code segment starting at its
/// current compile pointer, returning the entry address to run. Always
/// ends with `Abort` so the interpreter has a definite stop even when the
/// source is a bare expression with no `Exit` of its own.
pub fn compile_into(vm: &mut Vm, source: &str) -> Result<usize> {
    let mut tz = Tokenizer::new(source);
    let entry = vm.cp;
    let mut state = CompilerState {
        in_definition: false,
        list_depth: 0,
    };

    loop {
        let tok = next_token(&mut tz)?;
        if tok.kind == TokenKind::Eof {
            if state.in_definition {
                return Err(TacitError::Syntax {
                    message: "unterminated definition".into(),
                    line: tok.line,
                    col: tok.col,
                });
            }
            if state.list_depth != 0 {
                return Err(TacitError::Syntax {
                    message: "unbalanced `(`".into(),
                    line: tok.line,
                    col: tok.col,
                });
            }
            break;
        }
        compile_token(vm, &mut tz, &mut state, tok)?;
    }

    compile_opcode(vm, Opcode::Abort)?;
    Ok(entry)
}

fn next_token(tz: &mut Tokenizer) -> Result<Token> {
    tz.next().map_err(|(message, line, col)| TacitError::Syntax {
        message,
        line,
        col,
    })
}

fn expect_word(tz: &mut Tokenizer, context: &'static str) -> Result<Token> {
    let tok = next_token(tz)?;
    if tok.kind != TokenKind::Word {
        return Err(TacitError::Syntax {
            message: format!("expected a name after `{context}`"),
            line: tok.line,
            col: tok.col,
        });
    }
    Ok(tok)
}

fn compile_token(
    vm: &mut Vm,
    tz: &mut Tokenizer,
    state: &mut CompilerState,
    tok: Token,
) -> Result<()> {
    match tok.kind {
        TokenKind::Number => compile_number(vm, &tok),
        TokenKind::String => compile_string(vm, &tok),
        TokenKind::Special => list::compile_bracket(vm, state, &tok),
        TokenKind::Word => compile_word(vm, tz, state, tok),
        TokenKind::Eof => unreachable!("EOF is handled by the caller"),
    }
}

fn compile_number(vm: &mut Vm, tok: &Token) -> Result<()> {
    let value: f32 = tok.text.parse().map_err(|_| TacitError::Syntax {
        message: format!("invalid number literal `{}`", tok.text),
        line: tok.line,
        col: tok.col,
    })?;
    compile_opcode(vm, Opcode::LiteralNumber)?;
    compile_float32(vm, value)
}

fn compile_string(vm: &mut Vm, tok: &Token) -> Result<()> {
    let addr = vm.digest.intern(&mut vm.arena, &tok.text)?;
    compile_opcode(vm, Opcode::LiteralString)?;
    compile16(vm, addr)
}

fn compile_word(vm: &mut Vm, tz: &mut Tokenizer, state: &mut CompilerState, tok: Token) -> Result<()> {
    match tok.text.as_str() {
        ":" => compile_colon_definition(vm, tz, state, &tok),
        ";" => Err(TacitError::Syntax {
            message: "`;` without a matching `:`".into(),
            line: tok.line,
            col: tok.col,
        }),
        "var" => {
            if !state.in_definition {
                return Err(TacitError::Syntax {
                    message: "`var` outside a definition".into(),
                    line: tok.line,
                    col: tok.col,
                });
            }
            let name = expect_word(tz, "var")?;
            locals::compile_var(vm, &name.text)
        }
        "if" => control::compile_if(vm),
        "else" => control::compile_else(vm, tok.line, tok.col),
        "endif" => control::compile_endif(vm, tok.line, tok.col),
        "when" => control::compile_when(vm),
        "do" => control::compile_do(vm),
        "enddo" => control::compile_enddo(vm, tok.line, tok.col),
        "endwhen" => control::compile_endwhen(vm, tok.line, tok.col),
        "case" => control::compile_case(vm),
        "of" => control::compile_of(vm, tok.line, tok.col),
        "endof" => control::compile_endof(vm, tok.line, tok.col),
        "endcase" => control::compile_endcase(vm, tok.line, tok.col),
        name => compile_dictionary_word(vm, name, tok.line, tok.col),
    }
}

/// `: name … ;` — emits a skip branch so straight-line execution bypasses
/// the body, binds `name` to the body's start address immediately (so a
/// definition can call itself), compiles the body under a fresh locals
/// scope, emits `Exit`, then patches the skip branch to land after it.
fn compile_colon_definition(
    vm: &mut Vm,
    tz: &mut Tokenizer,
    state: &mut CompilerState,
    tok: &Token,
) -> Result<()> {
    if state.in_definition {
        return Err(TacitError::Syntax {
            message: "nested definitions are not allowed".into(),
            line: tok.line,
            col: tok.col,
        });
    }
    let name = expect_word(tz, ":")?;

    compile_opcode(vm, Opcode::Branch)?;
    let skip_operand = vm.cp;
    compile16(vm, 0)?;

    let start = vm.cp;
    vm.dictionary.define_code(
        &mut vm.arena,
        &mut vm.digest,
        &mut vm.gp,
        &name.text,
        start as u16,
        false,
    )?;
    vm.dictionary.push_scope();
    state.in_definition = true;

    loop {
        let body_tok = next_token(tz)?;
        match (body_tok.kind, body_tok.text.as_str()) {
            (TokenKind::Eof, _) => {
                vm.dictionary.pop_scope();
                state.in_definition = false;
                return Err(TacitError::Syntax {
                    message: "unterminated definition".into(),
                    line: body_tok.line,
                    col: body_tok.col,
                });
            }
            (TokenKind::Word, ";") => break,
            (TokenKind::Word, ":") => {
                vm.dictionary.pop_scope();
                state.in_definition = false;
                return Err(TacitError::Syntax {
                    message: "nested definitions are not allowed".into(),
                    line: body_tok.line,
                    col: body_tok.col,
                });
            }
            _ => compile_token(vm, tz, state, body_tok)?,
        }
    }

    compile_opcode(vm, Opcode::Exit)?;
    vm.dictionary.pop_scope();
    state.in_definition = false;

    let offset = (vm.cp as i64 - (skip_operand + 2) as i64) as i16;
    vm.arena.write16(skip_operand, offset as u16)
}

/// A WORD that isn't a reserved control keyword resolves through the
/// dictionary: a BUILTIN emits its opcode byte directly, a CODE definition
/// emits `Call` + its address, and a LOCAL emits `LoadLocal` + slot
/// immediately followed by `Fetch` — referencing a local by name reads its
/// current value, the way `var`-bound names are used as plain variables in
/// spec.md §8 scenario 5 (`x y +`), rather than leaving a ref on the stack.
fn compile_dictionary_word(vm: &mut Vm, name: &str, line: u32, col: u32) -> Result<()> {
    let entry = vm
        .dictionary
        .find_entry(&vm.arena, &vm.digest, name)?
        .ok_or_else(|| TacitError::UnknownWord {
            name: name.to_string(),
        })?;
    match entry.value.decode() {
        Decoded::Tagged {
            tag: Tag::Builtin,
            value,
            ..
        } => compile8(vm, value as u8),
        Decoded::Tagged {
            tag: Tag::Code,
            value,
            ..
        } => {
            compile_opcode(vm, Opcode::Call)?;
            compile16(vm, value as u16)
        }
        Decoded::Tagged {
            tag: Tag::Local,
            value,
            ..
        } => {
            compile_opcode(vm, Opcode::LoadLocal)?;
            compile16(vm, value as u16)?;
            compile_opcode(vm, Opcode::Fetch)
        }
        _ => Err(TacitError::Syntax {
            message: format!("`{name}` has no compilable form"),
            line,
            col,
        }),
    }
}

pub(crate) fn push_addr(vm: &mut Vm, addr: usize) -> Result<()> {
    vm.push(encode(addr as i32, Tag::DataRef, false))
}

pub(crate) fn pop_addr(vm: &mut Vm, construct: &'static str, line: u32, col: u32) -> Result<usize> {
    let mismatched = || TacitError::Syntax {
        message: format!("`{construct}` without a matching opener"),
        line,
        col,
    };
    let cell = vm.pop().map_err(|_| mismatched())?;
    match cell.decode() {
        Decoded::Tagged {
            tag: Tag::DataRef,
            value,
            ..
        } => Ok(value as usize),
        _ => Err(mismatched()),
    }
}

/// Patches the 16-bit forward-branch operand at `operand_addr` to target
/// the current compile pointer.
pub(crate) fn patch_forward(vm: &mut Vm, operand_addr: usize) -> Result<()> {
    let offset = (vm.cp as i64 - (operand_addr + 2) as i64) as i16;
    vm.arena.write16(operand_addr, offset as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::encode_number;

    fn run_source(vm: &mut Vm, src: &str) {
        let entry = compile_into(vm, src).unwrap();
        crate::interpreter::run(vm, entry).unwrap();
    }

    #[test]
    fn compiles_arithmetic_expression() {
        let mut vm = Vm::new();
        run_source(&mut vm, "5 3 +");
        assert_eq!(vm.pop().unwrap(), encode_number(8.0));
    }

    #[test]
    fn compiles_colon_definition_and_call() {
        let mut vm = Vm::new();
        run_source(&mut vm, ": square dup * ; 5 square");
        assert_eq!(vm.pop().unwrap(), encode_number(25.0));
    }

    #[test]
    fn compiles_locals_as_variables() {
        let mut vm = Vm::new();
        run_source(&mut vm, ": addxy 10 var x 20 var y x y + ; addxy");
        assert_eq!(vm.pop().unwrap(), encode_number(30.0));
    }

    #[test]
    fn unmatched_semicolon_is_syntax_error() {
        let mut vm = Vm::new();
        assert!(matches!(
            compile_into(&mut vm, ";"),
            Err(TacitError::Syntax { .. })
        ));
    }

    #[test]
    fn nested_definition_is_syntax_error() {
        let mut vm = Vm::new();
        assert!(matches!(
            compile_into(&mut vm, ": outer : inner ; ;"),
            Err(TacitError::Syntax { .. })
        ));
    }

    #[test]
    fn unknown_word_is_reported() {
        let mut vm = Vm::new();
        assert!(matches!(
            compile_into(&mut vm, "nope"),
            Err(TacitError::UnknownWord { .. })
        ));
    }

    #[test]
    fn list_literal_compiles_and_runs() {
        let mut vm = Vm::new();
        run_source(&mut vm, "( 1 2 3 )");
        assert_eq!(vm.pop().unwrap().decode().tag(), Some(Tag::List));
        assert_eq!(vm.pop().unwrap(), encode_number(3.0));
        assert_eq!(vm.pop().unwrap(), encode_number(2.0));
        assert_eq!(vm.pop().unwrap(), encode_number(1.0));
    }

    #[test]
    fn if_else_endif_picks_the_taken_branch() {
        let mut vm = Vm::new();
        run_source(&mut vm, "1 if 10 else 20 endif");
        assert_eq!(vm.pop().unwrap(), encode_number(10.0));

        let mut vm = Vm::new();
        run_source(&mut vm, "0 if 10 else 20 endif");
        assert_eq!(vm.pop().unwrap(), encode_number(20.0));
    }
}
