// interpreter.rs - Executes a token stream against the VM and dictionary

use crate::compiler::{self, find_closing, string_literal, CompiledWord};
use crate::dictionary::{Dictionary, Lookup};
use crate::lexer::{tokenize_bytes, Location, LexerError, Token, TokenKind};
use crate::primitives::{ForthError, Primitive, VM};
use std::rc::Rc;
use tracing::{debug, trace, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Treat an identifier with no definition as an error instead of a no-op.
    pub strict: bool,
    /// Deepest allowed nesting of word calls.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            strict: false,
            max_call_depth: 1024,
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Lex(#[from] LexerError),

    #[error("{location}: {error}")]
    Runtime { location: Location, error: ForthError },

    #[error("failed to flush output: {0}")]
    Flush(ForthError),
}

impl RunError {
    /// The underlying runtime error, if this is not a lexing failure.
    pub fn error(&self) -> Option<&ForthError> {
        match self {
            RunError::Lex(_) => None,
            RunError::Runtime { error, .. } | RunError::Flush(error) => Some(error),
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            RunError::Runtime { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// Attach the location of the token being executed to a runtime error.
pub trait At<T> {
    fn at(self, location: &Location) -> Result<T, RunError>;
}

impl<T> At<T> for Result<T, ForthError> {
    fn at(self, location: &Location) -> Result<T, RunError> {
        self.map_err(|error| RunError::Runtime {
            location: location.clone(),
            error,
        })
    }
}

// ============================================================================
// INTERPRETER
// ============================================================================

pub struct Interpreter {
    pub vm: VM,
    pub dictionary: Dictionary,
    config: InterpreterConfig,
}

/// A word body being executed and the index of its next token.
struct Frame {
    word: Rc<CompiledWord>,
    ip: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self::with_vm(VM::new(), config)
    }

    pub fn with_vm(vm: VM, config: InterpreterConfig) -> Self {
        Interpreter {
            vm,
            dictionary: Dictionary::new(),
            config,
        }
    }

    /// Tokenize and run a whole source file.
    pub fn run_source(&mut self, source: &str, bytes: &[u8]) -> Result<(), RunError> {
        let tokens = tokenize_bytes(source, bytes)?;
        self.run(&tokens)
    }

    /// Run a top-level token sequence, flushing output whether or not it fails.
    pub fn run(&mut self, tokens: &[Token]) -> Result<(), RunError> {
        let result = self.interpret(tokens);
        let flushed = self.vm.flush();
        result?;
        flushed.map_err(RunError::Flush)
    }

    fn interpret(&mut self, tokens: &[Token]) -> Result<(), RunError> {
        let mut ip = 0;
        while ip < tokens.len() {
            let token = &tokens[ip];
            match token.kind {
                TokenKind::Colon => {
                    ip = self.define_word(tokens, ip)?;
                }
                TokenKind::Semicolon => {
                    return Err(ForthError::Unmatched(";".into())).at(&token.location);
                }
                TokenKind::If
                | TokenKind::Else
                | TokenKind::Then
                | TokenKind::Do
                | TokenKind::Loop
                | TokenKind::Primitive(Primitive::I) => {
                    return Err(ForthError::ControlOutsideWord(token.text.clone()))
                        .at(&token.location);
                }
                TokenKind::OpenParen => {
                    ip = find_closing(tokens, ip, TokenKind::CloseParen)
                        .ok_or_else(|| ForthError::Unterminated("comment".into()))
                        .at(&token.location)?;
                }
                TokenKind::DotQuote => {
                    let end = find_closing(tokens, ip, TokenKind::Quote)
                        .ok_or_else(|| ForthError::Unterminated("string literal".into()))
                        .at(&token.location)?;
                    self.print_literal(&tokens[ip + 1..end], &token.location)?;
                    ip = end;
                }
                TokenKind::Variable | TokenKind::Constant => {
                    let name = expect_name(tokens, ip)?;
                    self.define_storage(token, name)?;
                    ip += 1;
                }
                _ => {
                    if let Some(word) = self.step(token)? {
                        self.execute_word(word, &token.location)?;
                    }
                }
            }
            ip += 1;
        }
        Ok(())
    }

    /// Capture `: name ... ;` starting at the colon and install the word.
    /// Returns the index of the closing semicolon.
    fn define_word(&mut self, tokens: &[Token], colon: usize) -> Result<usize, RunError> {
        let colon_token = &tokens[colon];
        let name = match tokens.get(colon + 1) {
            Some(t) if t.is(TokenKind::Word) => t,
            Some(t) => return Err(ForthError::InvalidWordName(t.text.clone())).at(&t.location),
            None => return Err(ForthError::MissingName(":".into())).at(&colon_token.location),
        };

        let start = colon + 2;
        let mut ip = start;
        while ip < tokens.len() {
            let token = &tokens[ip];
            match token.kind {
                TokenKind::Semicolon => {
                    let word = compiler::compile(&name.text, tokens[start..ip].to_vec())?;
                    debug!(word = %name.text, tokens = word.body.len(), "defined word");
                    self.dictionary.define_word(word);
                    return Ok(ip);
                }
                // Copied verbatim: markers inside these regions do not end the definition
                TokenKind::OpenParen => {
                    ip = find_closing(tokens, ip, TokenKind::CloseParen)
                        .ok_or_else(|| ForthError::Unterminated("comment".into()))
                        .at(&token.location)?;
                }
                TokenKind::DotQuote => {
                    ip = find_closing(tokens, ip, TokenKind::Quote)
                        .ok_or_else(|| ForthError::Unterminated("string literal".into()))
                        .at(&token.location)?;
                }
                TokenKind::Colon => {
                    return Err(ForthError::NestedDefinition).at(&token.location);
                }
                _ => {}
            }
            ip += 1;
        }

        Err(ForthError::Unterminated(format!("definition of `{}`", name.text)))
            .at(&colon_token.location)
    }

    /// Execute a word called at `location`. Nested calls push frames onto
    /// a local stack instead of recursing.
    fn execute_word(&mut self, word: Rc<CompiledWord>, location: &Location) -> Result<(), RunError> {
        let mut frames: Vec<Frame> = Vec::new();
        self.enter(&mut frames, word, location)?;

        while let Some(frame) = frames.last_mut() {
            let word = Rc::clone(&frame.word);
            let ip = frame.ip;
            if ip >= word.body.len() {
                frames.pop();
                continue;
            }

            let (next, callee) = self.execute_token(&word, ip)?;
            frame.ip = next;
            if let Some(callee) = callee {
                self.enter(&mut frames, callee, &word.body[ip].location)?;
            }
        }
        Ok(())
    }

    fn enter(
        &self,
        frames: &mut Vec<Frame>,
        word: Rc<CompiledWord>,
        location: &Location,
    ) -> Result<(), RunError> {
        if frames.len() >= self.config.max_call_depth {
            return Err(ForthError::CallDepthExceeded(self.config.max_call_depth)).at(location);
        }
        trace!(word = %word.name, depth = frames.len() + 1, "call");
        frames.push(Frame { word, ip: 0 });
        Ok(())
    }

    /// Execute the token at `ip` in a word body. Returns the index of the
    /// next token and the word to enter, if the token called one.
    fn execute_token(
        &mut self,
        word: &CompiledWord,
        ip: usize,
    ) -> Result<(usize, Option<Rc<CompiledWord>>), RunError> {
        let body = &word.body;
        let token = &body[ip];
        let next = match token.kind {
            TokenKind::If => {
                let flag = self.vm.data_stack.pop().at(&token.location)?;
                if flag == 0 {
                    jump(word, ip)?
                } else {
                    ip + 1
                }
            }
            // Reached by falling out of the true branch
            TokenKind::Else => jump(word, ip)?,
            TokenKind::Then => ip + 1,
            TokenKind::Do => {
                self.vm.begin_loop().at(&token.location)?;
                ip + 1
            }
            TokenKind::Loop => {
                if self.vm.step_loop().at(&token.location)? {
                    trace!(word = %word.name, "loop");
                    jump(word, ip)?
                } else {
                    ip + 1
                }
            }
            TokenKind::OpenParen => jump(word, ip)? + 1,
            TokenKind::DotQuote => {
                let end = jump(word, ip)?;
                self.print_literal(&body[ip + 1..end], &token.location)?;
                end + 1
            }
            TokenKind::Variable | TokenKind::Constant => {
                let name = expect_name(body, ip)?;
                self.define_storage(token, name)?;
                ip + 2
            }
            _ => return Ok((ip + 1, self.step(token)?)),
        };
        Ok((next, None))
    }

    /// Execute a token whose meaning does not depend on its neighbours.
    /// A user word is returned for the caller to enter.
    fn step(&mut self, token: &Token) -> Result<Option<Rc<CompiledWord>>, RunError> {
        match token.kind {
            TokenKind::Number => {
                let value = token
                    .text
                    .parse::<i64>()
                    .map_err(|_| ForthError::InvalidNumber(token.text.clone()))
                    .at(&token.location)?;
                self.vm.data_stack.push(value);
                Ok(None)
            }
            TokenKind::Primitive(prim) => {
                self.vm.execute_primitive(prim).at(&token.location)?;
                Ok(None)
            }
            TokenKind::Word => self.resolve(token),
            TokenKind::Colon => Err(ForthError::NestedDefinition).at(&token.location),
            _ => Err(ForthError::Unmatched(token.text.clone())).at(&token.location),
        }
    }

    /// Resolve an identifier: constant, then variable, then user word.
    fn resolve(&mut self, token: &Token) -> Result<Option<Rc<CompiledWord>>, RunError> {
        match self.dictionary.lookup(&token.text) {
            Lookup::Constant(value) => self.vm.data_stack.push(value),
            Lookup::Variable(addr) => self.vm.data_stack.push(addr.as_cell()),
            Lookup::Word(word) => return Ok(Some(word)),
            Lookup::Undefined => {
                if self.config.strict {
                    return Err(ForthError::UndefinedWord(token.text.clone()))
                        .at(&token.location);
                }
                warn!(word = %token.text, location = %token.location, "undefined word ignored");
            }
        }
        Ok(None)
    }

    /// `variable NAME` or `constant NAME`.
    fn define_storage(&mut self, keyword: &Token, name: &Token) -> Result<(), RunError> {
        if keyword.is(TokenKind::Variable) {
            let addr = self.vm.memory.allot(1).at(&keyword.location)?;
            self.dictionary.define_variable(&name.text, addr);
            debug!(name = %name.text, address = addr.index(), "defined variable");
        } else {
            let value = self.vm.data_stack.pop().at(&keyword.location)?;
            self.dictionary.define_constant(&name.text, value);
            debug!(name = %name.text, value, "defined constant");
        }
        Ok(())
    }

    fn print_literal(&mut self, tokens: &[Token], location: &Location) -> Result<(), RunError> {
        self.vm.print(&string_literal(tokens)).at(location)
    }
}

/// The name token following `variable` / `constant` at `ip`.
fn expect_name(tokens: &[Token], ip: usize) -> Result<&Token, RunError> {
    let keyword = &tokens[ip];
    match tokens.get(ip + 1) {
        Some(name) if name.is(TokenKind::Word) => Ok(name),
        _ => Err(ForthError::MissingName(keyword.text.clone())).at(&keyword.location),
    }
}

fn jump(word: &CompiledWord, ip: usize) -> Result<usize, RunError> {
    let token = &word.body[ip];
    word.target(ip)
        .ok_or_else(|| ForthError::Unmatched(token.text.clone()))
        .at(&token.location)
}
