// compiler.rs - Resolves control flow in a word body once, when `;` is reached

use crate::interpreter::{At, RunError};
use crate::lexer::{Token, TokenKind};
use crate::primitives::ForthError;

/// A user word: its token body plus a jump target for every control marker.
///
/// | marker | target |
/// |--------|--------|
/// | `if`   | first token to run when the flag is zero (after `else`, or after `then`) |
/// | `else` | first token after the matching `then` |
/// | `do`   | (none) |
/// | `loop` | first token of the loop body |
/// | `."`   | index of the closing `"` |
/// | `(`    | index of the closing `)` |
#[derive(Debug, Clone)]
pub struct CompiledWord {
    pub name: String,
    pub body: Vec<Token>,
    jumps: Vec<Option<usize>>,
}

impl CompiledWord {
    pub fn target(&self, ip: usize) -> Option<usize> {
        self.jumps.get(ip).copied().flatten()
    }
}

/// Control flow frame used while matching markers
#[derive(Debug, Clone, Copy)]
enum ControlFrame {
    If { at: usize },
    IfElse { else_at: usize },
    Do { at: usize },
}

impl ControlFrame {
    fn position(&self) -> usize {
        match *self {
            ControlFrame::If { at } => at,
            ControlFrame::IfElse { else_at } => else_at,
            ControlFrame::Do { at } => at,
        }
    }
}

/// Index of the first token of `kind` after `start`.
pub fn find_closing(tokens: &[Token], start: usize, kind: TokenKind) -> Option<usize> {
    tokens
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, t)| t.is(kind))
        .map(|(i, _)| i)
}

/// Text of a `."` literal: the tokens up to the closing quote, joined by single spaces.
pub fn string_literal(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn compile(name: &str, body: Vec<Token>) -> Result<CompiledWord, RunError> {
    let mut jumps = vec![None; body.len()];
    let mut control_stack: Vec<ControlFrame> = Vec::new();

    let mut ip = 0;
    while ip < body.len() {
        let token = &body[ip];
        match token.kind {
            TokenKind::OpenParen => {
                let end = find_closing(&body, ip, TokenKind::CloseParen)
                    .ok_or_else(|| ForthError::Unterminated("comment".into()))
                    .at(&token.location)?;
                jumps[ip] = Some(end);
                ip = end;
            }
            TokenKind::DotQuote => {
                let end = find_closing(&body, ip, TokenKind::Quote)
                    .ok_or_else(|| ForthError::Unterminated("string literal".into()))
                    .at(&token.location)?;
                jumps[ip] = Some(end);
                ip = end;
            }
            TokenKind::CloseParen | TokenKind::Quote => {
                return Err(ForthError::Unmatched(token.text.clone())).at(&token.location);
            }
            TokenKind::Colon => {
                return Err(ForthError::NestedDefinition).at(&token.location);
            }
            TokenKind::Variable | TokenKind::Constant => {
                // The name is consumed along with the keyword
                match body.get(ip + 1) {
                    Some(next) if next.is(TokenKind::Word) => ip += 1,
                    _ => {
                        return Err(ForthError::MissingName(token.text.clone()))
                            .at(&token.location)
                    }
                }
            }
            TokenKind::If => control_stack.push(ControlFrame::If { at: ip }),
            TokenKind::Else => match control_stack.pop() {
                Some(ControlFrame::If { at }) => {
                    jumps[at] = Some(ip + 1);
                    control_stack.push(ControlFrame::IfElse { else_at: ip });
                }
                _ => return Err(ForthError::Unmatched("else".into())).at(&token.location),
            },
            TokenKind::Then => match control_stack.pop() {
                Some(ControlFrame::If { at }) | Some(ControlFrame::IfElse { else_at: at }) => {
                    jumps[at] = Some(ip + 1);
                }
                _ => return Err(ForthError::Unmatched("then".into())).at(&token.location),
            },
            TokenKind::Do => control_stack.push(ControlFrame::Do { at: ip }),
            TokenKind::Loop => match control_stack.pop() {
                Some(ControlFrame::Do { at }) => jumps[ip] = Some(at + 1),
                _ => return Err(ForthError::Unmatched("loop".into())).at(&token.location),
            },
            _ => {}
        }
        ip += 1;
    }

    if let Some(frame) = control_stack.pop() {
        let token = &body[frame.position()];
        let what = match frame {
            ControlFrame::Do { .. } => "`do` (missing `loop`)",
            _ => "`if` (missing `then`)",
        };
        return Err(ForthError::Unterminated(what.into())).at(&token.location);
    }

    Ok(CompiledWord {
        name: name.to_string(),
        body,
        jumps,
    })
}
