//! A small Forth-like stack language.
//!
//! Source text is split into located tokens by [`lexer`], then walked once,
//! top to bottom, by the [`interpreter::Interpreter`]. Word definitions are
//! checked and have their control flow resolved by [`compiler`] when the
//! closing `;` is reached.

pub mod compiler;
pub mod dictionary;
pub mod interpreter;
pub mod lexer;
pub mod primitives;

pub use interpreter::{Interpreter, InterpreterConfig, RunError};
