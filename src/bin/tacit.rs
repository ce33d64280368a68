//! Host driver: REPL and file-batch runner over the `tacit` core.
//!
//! Everything here is a thin shell over [`tacit::Vm`] and [`tacit::eval`]
//! (spec.md §1: "the REPL driver, file loader, command-line argument
//! parsing, and formatted tracing/printing" are external collaborators).
//! No VM logic lives in this binary.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use tacit::host::{Output, Trace};
use tacit::{TacitError, Vm};

/// Tacit: a concatenative, stack-oriented bytecode VM.
#[derive(Debug, Parser)]
struct Args {
    /// Source files to run in sequence. With none given, starts an
    /// interactive REPL instead.
    files: Vec<PathBuf>,

    /// Trace every dispatched opcode to stderr.
    #[arg(long)]
    debug: bool,
}

struct StdoutSink;

impl Output for StdoutSink {
    fn print(&mut self, text: &str) {
        println!("{text}");
    }
}

struct StderrTrace;

impl Trace for StderrTrace {
    fn on_opcode(&mut self, ip: usize, opcode: &str) {
        eprintln!("  [{ip:04x}] {opcode}");
    }
}

fn new_vm(debug: bool) -> Vm {
    let mut vm = Vm::new();
    vm.output = Box::new(StdoutSink);
    if debug {
        vm.debug = true;
        vm.trace = Some(Box::new(StderrTrace));
    }
    vm
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.files.is_empty() {
        repl(args.debug)
    } else {
        run_files(&args.files, args.debug)
    }
}

/// Appends `.tacit` to any file path with no extension, per spec.md §6.
fn resolve_path(path: &Path) -> PathBuf {
    if path.extension().is_none() {
        path.with_extension("tacit")
    } else {
        path.to_path_buf()
    }
}

/// Drops blank lines and lines beginning with `#` before handing the rest
/// to the compiler (spec.md §6: "Lines beginning with `#` and blank lines
/// are skipped by the file driver"). This is a host-side filter distinct
/// from the core tokenizer's own `//` comment handling.
fn filter_source(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs each file in turn against one shared VM, stopping at the first
/// error. Exit code 1 on failure, 0 on full success (spec.md §6).
fn run_files(files: &[PathBuf], debug: bool) -> Result<()> {
    let mut vm = new_vm(debug);
    for path in files {
        let resolved = resolve_path(path);
        let raw = fs::read_to_string(&resolved)
            .with_context(|| format!("reading {}", resolved.display()))?;
        let source = filter_source(&raw);
        if let Err(err) = tacit::eval(&mut vm, &source) {
            eprintln!("{}: {}", resolved.display(), report(&err));
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Interactive read-eval-print loop: one line of input per iteration,
/// against one persistent VM so definitions and globals accumulate across
/// lines.
fn repl(debug: bool) -> Result<()> {
    let mut vm = new_vm(debug);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("tacit> ");
        stdout.flush().ok();

        let mut line = String::new();
        let bytes = stdin
            .lock()
            .read_line(&mut line)
            .context("reading from stdin")?;
        if bytes == 0 {
            println!();
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match tacit::eval(&mut vm, &line) {
            Ok(()) => {
                if let Ok(top) = vm.peek() {
                    println!("{top:?}");
                }
            }
            Err(err) => eprintln!("{}", report(&err)),
        }
    }
    Ok(())
}

/// Formats a core error the way spec.md §7 describes: the message plus a
/// printed stack snapshot, when the error carries one.
fn report(err: &TacitError) -> String {
    format!("error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_appends_extension() {
        assert_eq!(resolve_path(Path::new("foo")), PathBuf::from("foo.tacit"));
        assert_eq!(resolve_path(Path::new("foo.tacit")), PathBuf::from("foo.tacit"));
    }

    #[test]
    fn filter_source_drops_blank_and_hash_lines() {
        let filtered = filter_source("# a comment\n\n5 3 +\n   \n# another\n");
        assert_eq!(filtered, "5 3 +");
    }
}
