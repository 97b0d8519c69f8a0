//! S-expression tokenizer for BDDL problem files.
//!
//! Produces nested token lists (parenthesized groups) consumed by the
//! section parser. Comments start with `;` and run to end of line.

use crate::error::ParseError;

/// One element of the token tree: a bare atom or a parenthesized group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    List(Vec<Token>),
}

impl Token {
    /// The atom's text, or `None` for a list.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Token::Atom(s) => Some(s),
            Token::List(_) => None,
        }
    }

    /// The group's elements, or `None` for an atom.
    pub fn as_list(&self) -> Option<&[Token]> {
        match self {
            Token::Atom(_) => None,
            Token::List(items) => Some(items),
        }
    }

    /// Parses the atom as a float. Used for range and color literals.
    pub fn as_number(&self) -> Result<f64, ParseError> {
        let text = self
            .as_atom()
            .ok_or_else(|| ParseError::InvalidNumber("(list)".to_string()))?;
        text.parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber(text.to_string()))
    }
}

/// Splits source text into the top-level groups of the outermost
/// parenthesized expression.
///
/// A BDDL problem is one `(define ...)` form; the returned vector holds the
/// contents of that form (the `define` atom followed by the section groups).
pub fn scan_tokens(source: &str) -> Result<Vec<Token>, ParseError> {
    let raw = lex(source);
    let mut position = 0;
    let top = parse_group(&raw, &mut position)?;
    if position != raw.len() {
        return Err(ParseError::UnbalancedParens(position));
    }
    match top {
        Token::List(items) => Ok(items),
        Token::Atom(_) => Err(ParseError::MissingDefine),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RawToken {
    Open,
    Close,
    Atom(String),
}

fn lex(source: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut atom = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ';' => {
                // comment to end of line
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '(' | ')' => {
                if !atom.is_empty() {
                    tokens.push(RawToken::Atom(std::mem::take(&mut atom)));
                }
                tokens.push(if c == '(' {
                    RawToken::Open
                } else {
                    RawToken::Close
                });
            }
            c if c.is_whitespace() => {
                if !atom.is_empty() {
                    tokens.push(RawToken::Atom(std::mem::take(&mut atom)));
                }
            }
            c => atom.push(c),
        }
    }
    if !atom.is_empty() {
        tokens.push(RawToken::Atom(atom));
    }
    tokens
}

fn parse_group(raw: &[RawToken], position: &mut usize) -> Result<Token, ParseError> {
    match raw.get(*position) {
        Some(RawToken::Open) => {
            *position += 1;
            let mut items = Vec::new();
            loop {
                match raw.get(*position) {
                    Some(RawToken::Close) => {
                        *position += 1;
                        return Ok(Token::List(items));
                    }
                    Some(_) => items.push(parse_group(raw, position)?),
                    None => return Err(ParseError::UnbalancedParens(*position)),
                }
            }
        }
        Some(RawToken::Atom(text)) => {
            *position += 1;
            Ok(Token::Atom(text.clone()))
        }
        Some(RawToken::Close) | None => Err(ParseError::UnbalancedParens(*position)),
    }
}
