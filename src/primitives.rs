// primitives.rs - Stack, memory and the built-in operations that act on them

use std::io::{self, Read, Write};

/// Size of one memory cell in address units. Addresses are plain cell indices.
pub const CELL_SIZE: i64 = 1;

// ============================================================================
// OPERAND STACK
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Stack {
    data: Vec<i64>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            data: Vec::with_capacity(256),
        }
    }

    pub fn push(&mut self, value: i64) {
        self.data.push(value);
    }

    pub fn pop(&mut self) -> Result<i64, ForthError> {
        self.data.pop().ok_or(ForthError::StackUnderflow)
    }

    pub fn peek(&self) -> Result<i64, ForthError> {
        self.data.last().copied().ok_or(ForthError::StackUnderflow)
    }

    /// Read the value `n` places below the top without removing it (0 = top).
    pub fn pick(&self, n: usize) -> Result<i64, ForthError> {
        self.data
            .len()
            .checked_sub(n + 1)
            .map(|index| self.data[index])
            .ok_or(ForthError::StackUnderflow)
    }

    pub fn depth(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over stack values from bottom to top
    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.data.iter()
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// A cell index that is known to lie inside [`Memory`].
///
/// Memory only grows, so an address stays valid for the rest of the run.
/// The only ways to obtain one are [`Memory::allot`] and the bounds check in
/// [`Memory::address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(usize);

impl Address {
    pub fn index(self) -> usize {
        self.0
    }

    /// The address as it appears on the operand stack.
    pub fn as_cell(self) -> i64 {
        self.0 as i64
    }
}

/// Flat, append-only array of zero-initialized integer cells.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    cells: Vec<i64>,
}

impl Memory {
    pub fn new() -> Self {
        Memory { cells: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Append `count` zeroed cells and return the address of the first one.
    pub fn allot(&mut self, count: usize) -> Result<Address, ForthError> {
        let start = self.cells.len();
        self.cells
            .try_reserve(count)
            .map_err(|_| ForthError::MemoryExhausted(count))?;
        self.cells.resize(start + count, 0);
        Ok(Address(start))
    }

    /// Bounds-check a raw stack value as a cell address.
    pub fn address(&self, raw: i64) -> Result<Address, ForthError> {
        usize::try_from(raw)
            .ok()
            .filter(|&index| index < self.cells.len())
            .map(Address)
            .ok_or(ForthError::InvalidMemoryAddress(raw))
    }

    pub fn fetch(&self, addr: Address) -> i64 {
        self.cells[addr.0]
    }

    pub fn store(&mut self, addr: Address, value: i64) {
        self.cells[addr.0] = value;
    }
}

// ============================================================================
// LOOP CONTEXT
// ============================================================================

/// State of one active `do ... loop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    pub index: i64,
    pub limit: i64,
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForthError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid memory address {0}")]
    InvalidMemoryAddress(i64),
    #[error("cannot allot a negative number of cells ({0})")]
    NegativeAllot(i64),
    #[error("memory exhausted allotting {0} cells")]
    MemoryExhausted(usize),
    #[error("{0} is not a valid character code")]
    InvalidCharacter(i64),
    #[error("`i` used outside of a loop")]
    NoActiveLoop,
    #[error("`{0}` used outside of a word definition")]
    ControlOutsideWord(String),
    #[error("unmatched `{0}`")]
    Unmatched(String),
    #[error("unterminated {0}")]
    Unterminated(String),
    #[error("`{0}` expects a name")]
    MissingName(String),
    #[error("`{0}` cannot be used as a word name")]
    InvalidWordName(String),
    #[error("definitions cannot be nested")]
    NestedDefinition,
    #[error("undefined word `{0}`")]
    UndefinedWord(String),
    #[error("number out of range: {0}")]
    InvalidNumber(String),
    #[error("word calls nested deeper than {0}")]
    CallDepthExceeded(usize),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for ForthError {
    fn from(e: io::Error) -> Self {
        ForthError::Io(e.to_string())
    }
}

// ============================================================================
// PRIMITIVE OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    // Arithmetic
    Add,        // + ( a b -- a+b )
    Sub,        // - ( a b -- a-b )
    Mul,        // * ( a b -- a*b )
    Div,        // / ( a b -- a/b )
    Mod,        // mod ( a b -- a%b )

    // Comparison
    Equals,     // = ( a b -- flag )
    Less,       // < ( a b -- flag )
    Greater,    // > ( a b -- flag )

    // Logical
    And,        // and ( a b -- flag )
    Or,         // or ( a b -- flag )
    Invert,     // invert ( n -- -n-1 )

    // Stack manipulation
    Drop,       // drop ( n -- )
    Dup,        // dup ( n -- n n )
    Swap,       // swap ( a b -- b a )
    Over,       // over ( a b -- a b a )
    Rot,        // rot ( a b c -- b c a )

    // I/O
    Dot,        // . ( n -- )
    Emit,       // emit ( c -- )
    Cr,         // cr ( -- )
    Key,        // key ( -- c )

    // Memory
    Fetch,      // @ ( addr -- n )
    Store,      // ! ( n addr -- )
    PlusStore,  // +! ( n addr -- )
    Question,   // ? ( addr -- )
    Cells,      // cells ( n -- n*cell )
    Allot,      // allot ( n -- )

    // Loop
    I,          // i ( -- index )
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Add => "+",
            Primitive::Sub => "-",
            Primitive::Mul => "*",
            Primitive::Div => "/",
            Primitive::Mod => "mod",
            Primitive::Equals => "=",
            Primitive::Less => "<",
            Primitive::Greater => ">",
            Primitive::And => "and",
            Primitive::Or => "or",
            Primitive::Invert => "invert",
            Primitive::Drop => "drop",
            Primitive::Dup => "dup",
            Primitive::Swap => "swap",
            Primitive::Over => "over",
            Primitive::Rot => "rot",
            Primitive::Dot => ".",
            Primitive::Emit => "emit",
            Primitive::Cr => "cr",
            Primitive::Key => "key",
            Primitive::Fetch => "@",
            Primitive::Store => "!",
            Primitive::PlusStore => "+!",
            Primitive::Question => "?",
            Primitive::Cells => "cells",
            Primitive::Allot => "allot",
            Primitive::I => "i",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        let prim = match name {
            "+" => Primitive::Add,
            "-" => Primitive::Sub,
            "*" => Primitive::Mul,
            "/" => Primitive::Div,
            "mod" => Primitive::Mod,
            "=" => Primitive::Equals,
            "<" => Primitive::Less,
            ">" => Primitive::Greater,
            "and" => Primitive::And,
            "or" => Primitive::Or,
            "invert" => Primitive::Invert,
            "drop" => Primitive::Drop,
            "dup" => Primitive::Dup,
            "swap" => Primitive::Swap,
            "over" => Primitive::Over,
            "rot" => Primitive::Rot,
            "." => Primitive::Dot,
            "emit" => Primitive::Emit,
            "cr" => Primitive::Cr,
            "key" => Primitive::Key,
            "@" => Primitive::Fetch,
            "!" => Primitive::Store,
            "+!" => Primitive::PlusStore,
            "?" => Primitive::Question,
            "cells" => Primitive::Cells,
            "allot" => Primitive::Allot,
            "i" => Primitive::I,
            _ => return None,
        };
        Some(prim)
    }
}

fn flag(condition: bool) -> i64 {
    if condition {
        -1
    } else {
        0
    }
}

// ============================================================================
// VIRTUAL MACHINE
// ============================================================================

pub struct VM {
    pub data_stack: Stack,
    pub memory: Memory,
    pub loop_stack: Vec<LoopFrame>,
    output: Box<dyn Write>,
    input: Box<dyn Read>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// A VM wired to the process's stdin and (buffered) stdout.
    pub fn new() -> Self {
        VM::with_io(Box::new(io::stdin()), Box::new(io::BufWriter::new(io::stdout())))
    }

    pub fn with_io(input: Box<dyn Read>, output: Box<dyn Write>) -> Self {
        VM {
            data_stack: Stack::new(),
            memory: Memory::new(),
            loop_stack: Vec::new(),
            output,
            input,
        }
    }

    pub fn flush(&mut self) -> Result<(), ForthError> {
        self.output.flush()?;
        Ok(())
    }

    /// Write text produced by the program (used for `."` strings).
    pub fn print(&mut self, text: &str) -> Result<(), ForthError> {
        self.output.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn execute_primitive(&mut self, prim: Primitive) -> Result<(), ForthError> {
        match prim {
            // Arithmetic
            Primitive::Add => self.binary(|a, b| Ok(a.wrapping_add(b))),
            Primitive::Sub => self.binary(|a, b| Ok(a.wrapping_sub(b))),
            Primitive::Mul => self.binary(|a, b| Ok(a.wrapping_mul(b))),
            Primitive::Div => self.binary(|a, b| {
                if b == 0 {
                    return Err(ForthError::DivisionByZero);
                }
                Ok(a.wrapping_div(b))
            }),
            Primitive::Mod => self.binary(|a, b| {
                if b == 0 {
                    return Err(ForthError::DivisionByZero);
                }
                Ok(a.wrapping_rem(b))
            }),

            // Comparison
            Primitive::Equals => self.binary(|a, b| Ok(flag(a == b))),
            Primitive::Less => self.binary(|a, b| Ok(flag(a < b))),
            Primitive::Greater => self.binary(|a, b| Ok(flag(a > b))),

            // Logical
            Primitive::And => self.binary(|a, b| Ok(flag(a != 0 && b != 0))),
            Primitive::Or => self.binary(|a, b| Ok(flag(a != 0 || b != 0))),
            Primitive::Invert => self.op_invert(),

            // Stack manipulation
            Primitive::Drop => self.op_drop(),
            Primitive::Dup => self.op_dup(),
            Primitive::Swap => self.op_swap(),
            Primitive::Over => self.op_over(),
            Primitive::Rot => self.op_rot(),

            // I/O
            Primitive::Dot => self.op_dot(),
            Primitive::Emit => self.op_emit(),
            Primitive::Cr => self.op_cr(),
            Primitive::Key => self.op_key(),

            // Memory
            Primitive::Fetch => self.op_fetch(),
            Primitive::Store => self.op_store(),
            Primitive::PlusStore => self.op_plus_store(),
            Primitive::Question => self.op_question(),
            Primitive::Cells => self.op_cells(),
            Primitive::Allot => self.op_allot().map(|_| ()),

            // Loop index
            Primitive::I => self.op_i(),
        }
    }

    /// Pop the right operand, then the left, and push `op(left, right)`.
    fn binary(
        &mut self,
        op: impl FnOnce(i64, i64) -> Result<i64, ForthError>,
    ) -> Result<(), ForthError> {
        let b = self.data_stack.pop()?;
        let a = self.data_stack.pop()?;
        self.data_stack.push(op(a, b)?);
        Ok(())
    }

    fn op_invert(&mut self) -> Result<(), ForthError> {
        // invert ( n -- -n-1 )
        let value = self.data_stack.pop()?;
        self.data_stack.push(!value);
        Ok(())
    }

    // ========================================================================
    // STACK MANIPULATION
    // ========================================================================

    fn op_drop(&mut self) -> Result<(), ForthError> {
        self.data_stack.pop()?;
        Ok(())
    }

    fn op_dup(&mut self) -> Result<(), ForthError> {
        let value = self.data_stack.peek()?;
        self.data_stack.push(value);
        Ok(())
    }

    fn op_swap(&mut self) -> Result<(), ForthError> {
        // swap ( a b -- b a )
        let b = self.data_stack.pop()?;
        let a = self.data_stack.pop()?;
        self.data_stack.push(b);
        self.data_stack.push(a);
        Ok(())
    }

    fn op_over(&mut self) -> Result<(), ForthError> {
        // over ( a b -- a b a )
        let a = self.data_stack.pick(1)?;
        self.data_stack.push(a);
        Ok(())
    }

    fn op_rot(&mut self) -> Result<(), ForthError> {
        // rot ( a b c -- b c a )
        let c = self.data_stack.pop()?;
        let b = self.data_stack.pop()?;
        let a = self.data_stack.pop()?;
        self.data_stack.push(b);
        self.data_stack.push(c);
        self.data_stack.push(a);
        Ok(())
    }

    // ========================================================================
    // I/O
    // ========================================================================

    fn op_dot(&mut self) -> Result<(), ForthError> {
        let n = self.data_stack.pop()?;
        write!(self.output, "{}", n)?;
        Ok(())
    }

    fn op_emit(&mut self) -> Result<(), ForthError> {
        let code = self.data_stack.pop()?;
        let ch = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or(ForthError::InvalidCharacter(code))?;
        let mut buf = [0u8; 4];
        self.output.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
        Ok(())
    }

    fn op_cr(&mut self) -> Result<(), ForthError> {
        writeln!(self.output)?;
        Ok(())
    }

    fn op_key(&mut self) -> Result<(), ForthError> {
        // Anything printed so far must be visible before blocking on input
        self.output.flush()?;
        let mut buffer = [0u8; 4];
        self.input.read_exact(&mut buffer[..1])?;

        // Continuation bytes implied by the lead byte
        let len = match buffer[0] {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        self.input.read_exact(&mut buffer[1..len])?;

        let ch = std::str::from_utf8(&buffer[..len])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.data_stack.push(i64::from(u32::from(ch)));
        Ok(())
    }

    // ========================================================================
    // MEMORY OPERATIONS
    // ========================================================================

    fn pop_address(&mut self) -> Result<Address, ForthError> {
        let raw = self.data_stack.pop()?;
        self.memory.address(raw)
    }

    fn op_fetch(&mut self) -> Result<(), ForthError> {
        // @ ( addr -- n )
        let addr = self.pop_address()?;
        self.data_stack.push(self.memory.fetch(addr));
        Ok(())
    }

    fn op_store(&mut self) -> Result<(), ForthError> {
        // ! ( n addr -- )
        let addr = self.pop_address()?;
        let value = self.data_stack.pop()?;
        self.memory.store(addr, value);
        Ok(())
    }

    fn op_plus_store(&mut self) -> Result<(), ForthError> {
        // +! ( n addr -- )
        let addr = self.pop_address()?;
        let value = self.data_stack.pop()?;
        let sum = self.memory.fetch(addr).wrapping_add(value);
        self.memory.store(addr, sum);
        Ok(())
    }

    fn op_question(&mut self) -> Result<(), ForthError> {
        // ? ( addr -- )
        let addr = self.pop_address()?;
        write!(self.output, "{}", self.memory.fetch(addr))?;
        Ok(())
    }

    fn op_cells(&mut self) -> Result<(), ForthError> {
        let count = self.data_stack.pop()?;
        self.data_stack.push(count.wrapping_mul(CELL_SIZE));
        Ok(())
    }

    /// allot ( n -- ): reserve `n` cells, returning where they start.
    pub fn op_allot(&mut self) -> Result<Address, ForthError> {
        let count = self.data_stack.pop()?;
        let count = usize::try_from(count).map_err(|_| ForthError::NegativeAllot(count))?;
        self.memory.allot(count)
    }

    // ========================================================================
    // LOOPS
    // ========================================================================

    /// do ( limit start -- ): the start index is on top.
    pub fn begin_loop(&mut self) -> Result<(), ForthError> {
        let index = self.data_stack.pop()?;
        let limit = self.data_stack.pop()?;
        self.loop_stack.push(LoopFrame { index, limit });
        Ok(())
    }

    /// Advance the innermost loop. Returns `true` if the body should run again;
    /// a finished loop is popped.
    pub fn step_loop(&mut self) -> Result<bool, ForthError> {
        let frame = self.loop_stack.last_mut().ok_or(ForthError::NoActiveLoop)?;
        if frame.index.saturating_add(1) < frame.limit {
            frame.index += 1;
            Ok(true)
        } else {
            self.loop_stack.pop();
            Ok(false)
        }
    }

    fn op_i(&mut self) -> Result<(), ForthError> {
        let frame = self.loop_stack.last().ok_or(ForthError::NoActiveLoop)?;
        self.data_stack.push(frame.index);
        Ok(())
    }
}
