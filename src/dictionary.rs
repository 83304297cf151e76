// dictionary.rs - Names for user words, variables and constants

use crate::compiler::CompiledWord;
use crate::primitives::Address;
use std::collections::HashMap;
use std::rc::Rc;

/// What a variable or constant name is bound to.
///
/// Variables and constants share one namespace, so a name is never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Variable(Address),
    Constant(i64),
}

/// Result of looking up an identifier.
#[derive(Debug, Clone)]
pub enum Lookup {
    Constant(i64),
    Variable(Address),
    Word(Rc<CompiledWord>),
    Undefined,
}

/// Word definitions live apart from variable/constant bindings: a word may
/// share a name with a binding, in which case the binding wins.
#[derive(Debug, Default)]
pub struct Dictionary {
    words: HashMap<String, Rc<CompiledWord>>,
    bindings: HashMap<String, Binding>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a word, replacing any previous definition of the same name.
    /// Callers already running the old body keep their own reference.
    pub fn define_word(&mut self, word: CompiledWord) -> Option<Rc<CompiledWord>> {
        self.words.insert(word.name.clone(), Rc::new(word))
    }

    /// Bind `name` to a memory cell, dropping any constant of the same name.
    pub fn define_variable(&mut self, name: &str, addr: Address) -> Option<Binding> {
        self.bindings.insert(name.to_string(), Binding::Variable(addr))
    }

    /// Bind `name` to a literal value, dropping any variable of the same name.
    pub fn define_constant(&mut self, name: &str, value: i64) -> Option<Binding> {
        self.bindings.insert(name.to_string(), Binding::Constant(value))
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match self.bindings.get(name) {
            Some(Binding::Constant(value)) => Lookup::Constant(*value),
            Some(Binding::Variable(addr)) => Lookup::Variable(*addr),
            None => match self.words.get(name) {
                Some(word) => Lookup::Word(Rc::clone(word)),
                None => Lookup::Undefined,
            },
        }
    }
}
