// lexer.rs - Source text to located tokens

use crate::primitives::Primitive;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// TOKEN TYPES
// ============================================================================

/// Where a token starts in its source file (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,             // 42 (decimal text, parsed when executed)

    // Built-in operations
    Primitive(Primitive),

    // Definitions
    Colon,              // :
    Semicolon,          // ;
    Variable,           // variable
    Constant,           // constant

    // Control flow
    If,                 // if
    Else,               // else
    Then,               // then
    Do,                 // do
    Loop,               // loop

    // Strings and comments
    DotQuote,           // ."
    Quote,              // "
    OpenParen,          // (
    CloseParen,         // )

    // Anything else, resolved against the dictionary at run time
    Word,
}

impl TokenKind {
    /// Classify an identifier run against the reserved word table.
    pub fn from_word(word: &str) -> TokenKind {
        match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "then" => TokenKind::Then,
            "do" => TokenKind::Do,
            "loop" => TokenKind::Loop,
            "variable" => TokenKind::Variable,
            "constant" => TokenKind::Constant,
            _ => match Primitive::from_name(word) {
                Some(prim) => TokenKind::Primitive(prim),
                None => TokenKind::Word,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

// ============================================================================
// LEXER
// ============================================================================

const OPERATORS: &[char] = &[
    '+', '-', '*', '/', '=', '<', '>', '.', ':', ';', '@', '!', '?', '(', ')', '"',
];

fn is_operator(ch: char) -> bool {
    OPERATORS.contains(&ch)
}

fn is_space(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\t' | '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{85}' | '\u{a0}'
    )
}

/// Decode raw source bytes and tokenize them.
pub fn tokenize_bytes(source: &str, bytes: &[u8]) -> Result<Vec<Token>, LexerError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Lexer::new(source, text).tokenize()),
        Err(e) => {
            // Report the position of the first undecodable byte
            let valid = String::from_utf8_lossy(&bytes[..e.valid_up_to()]);
            let line = valid.matches('\n').count() + 1;
            let column = valid.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
            Err(LexerError::InvalidEncoding { line, column })
        }
    }
}

pub struct Lexer {
    source: Arc<str>,
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str, input: &str) -> Self {
        Lexer {
            source: Arc::from(source),
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if is_space(ch) {
                self.advance();
                continue;
            }

            let location = self.location();
            let (text, kind) = if ch.is_ascii_digit() {
                self.parse_number()
            } else if is_operator(ch) {
                self.parse_operator()
            } else {
                self.parse_word()
            };

            tokens.push(Token { text, kind, location });
        }

        tokens
    }

    fn parse_number(&mut self) -> (String, TokenKind) {
        let text = self.take_while(|ch| ch.is_ascii_digit());
        (text, TokenKind::Number)
    }

    fn parse_operator(&mut self) -> (String, TokenKind) {
        let starts_word = self.at_word_start();
        let ch = self.peek().unwrap_or_default();
        self.advance();

        // Two-character forms; `."` opens a string only at the start of a word
        match (ch, self.peek()) {
            ('.', Some('"')) if starts_word => {
                self.advance();
                return (".\"".to_string(), TokenKind::DotQuote);
            }
            ('+', Some('!')) => {
                self.advance();
                return ("+!".to_string(), TokenKind::Primitive(Primitive::PlusStore));
            }
            _ => {}
        }

        let kind = match ch {
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '"' => TokenKind::Quote,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            _ => {
                let text = ch.to_string();
                match Primitive::from_name(&text) {
                    Some(prim) => TokenKind::Primitive(prim),
                    None => TokenKind::Word,
                }
            }
        };

        (ch.to_string(), kind)
    }

    fn parse_word(&mut self) -> (String, TokenKind) {
        let word = self.take_while(|ch| !is_space(ch) && !is_operator(ch));
        let kind = TokenKind::from_word(&word);
        (word, kind)
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while let Some(ch) = self.peek() {
            if !accept(ch) {
                break;
            }
            self.advance();
        }
        self.input[start..self.position].iter().collect()
    }

    fn location(&self) -> Location {
        Location {
            source: Arc::clone(&self.source),
            line: self.line,
            column: self.column,
        }
    }

    fn at_word_start(&self) -> bool {
        self.position == 0 || self.input.get(self.position - 1).copied().is_some_and(is_space)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexerError {
    #[error("invalid UTF-8 in source at line {line}, column {column}")]
    InvalidEncoding { line: usize, column: usize },
}

// ============================================================================
// TESTS
// ============================================================================
