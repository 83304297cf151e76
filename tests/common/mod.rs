// Shared helpers for running programs against in-memory I/O

#![allow(dead_code)]

use forge::lexer::Lexer;
use forge::primitives::{ForthError, VM};
use forge::{Interpreter, InterpreterConfig, RunError};
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

/// A `Write` sink whose contents stay readable after it is boxed into the VM.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Session {
    pub interpreter: Interpreter,
    output: SharedBuffer,
}

impl Session {
    pub fn new(config: InterpreterConfig, input: &str) -> Self {
        let output = SharedBuffer::default();
        let vm = VM::with_io(
            Box::new(Cursor::new(input.as_bytes().to_vec())),
            Box::new(output.clone()),
        );
        Session {
            interpreter: Interpreter::with_vm(vm, config),
            output,
        }
    }

    pub fn run(&mut self, src: &str) -> Result<(), RunError> {
        let tokens = Lexer::new("test.fth", src).tokenize();
        self.interpreter.run(&tokens)
    }

    pub fn output(&self) -> String {
        self.output.contents()
    }

    pub fn stack(&self) -> Vec<i64> {
        self.interpreter.vm.data_stack.iter().copied().collect()
    }
}

/// Run `src` with default settings and return (stack, output).
pub fn eval(src: &str) -> (Vec<i64>, String) {
    let mut session = Session::new(InterpreterConfig::default(), "");
    if let Err(e) = session.run(src) {
        panic!("program failed: {}\n{}", e, src);
    }
    (session.stack(), session.output())
}

pub fn stack_of(src: &str) -> Vec<i64> {
    eval(src).0
}

pub fn output_of(src: &str) -> String {
    eval(src).1
}

/// Run `src` expecting a runtime failure and return its error.
pub fn error_of(src: &str) -> ForthError {
    let mut session = Session::new(InterpreterConfig::default(), "");
    match session.run(src) {
        Ok(()) => panic!("expected failure from: {}", src),
        Err(e) => e
            .error()
            .cloned()
            .unwrap_or_else(|| panic!("unexpected error kind: {}", e)),
    }
}
