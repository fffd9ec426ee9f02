//! Rapids expression syntax.
//!
//! ```text
//! (rows= (cols fr [0:2]) 0 [0,5:3:2])
//! ```

use std::fmt;

use strata_error::{DbError, Result};

use crate::rangelist::RangeList;

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Num(f64),
    Str(String),
    NumList(RangeList),
    /// Name of a frame or a scope variable.
    Ident(String),
    Call { op: String, args: Vec<Ast> },
}

impl Ast {
    pub fn parse(src: &str) -> Result<Ast> {
        let toks = Tokenizer::new(src).tokenize()?;
        let mut parser = Parser { toks, idx: 0 };
        let ast = parser.parse_expr()?;
        if let Some(tok) = parser.toks.get(parser.idx) {
            return Err(DbError::validation("Unexpected input after expression")
                .with_field("token", &tok.token)
                .with_field("position", tok.pos));
        }
        Ok(ast)
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::NumList(list) => write!(f, "{list}"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::Call { op, args } => {
                write!(f, "({op}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    LeftParen,
    RightParen,
    Number(f64),
    Str(&'a str),
    /// Raw range list text, brackets included.
    NumList(&'a str),
    Word(&'a str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::NumList(s) | Self::Word(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TokenWithLocation<'a> {
    token: Token<'a>,
    /// Byte offset into the source.
    pos: usize,
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Tokenizer { src, pos: 0 }
    }

    fn tokenize(mut self) -> Result<Vec<TokenWithLocation<'a>>> {
        let mut toks = Vec::new();
        while let Some(c) = self.peek() {
            let pos = self.pos;
            let token = match c {
                c if c.is_whitespace() => {
                    self.pos += c.len_utf8();
                    continue;
                }
                '(' => {
                    self.pos += 1;
                    Token::LeftParen
                }
                ')' => {
                    self.pos += 1;
                    Token::RightParen
                }
                '"' | '\'' => Token::Str(self.quoted(c)?),
                '[' => Token::NumList(self.numlist()?),
                '#' => {
                    self.pos += 1;
                    Token::Number(self.number()?)
                }
                c if c.is_ascii_digit() || c == '.' || (c == '-' && self.next_is_numeric()) => {
                    Token::Number(self.number()?)
                }
                _ => Token::Word(self.word()),
            };
            toks.push(TokenWithLocation { token, pos });
        }
        Ok(toks)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_is_numeric(&self) -> bool {
        self.rest()
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
    }

    fn is_delimiter(c: char) -> bool {
        c.is_whitespace() || c == '(' || c == ')'
    }

    fn word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest.find(Self::is_delimiter).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        let text = self.word();
        text.parse::<f64>().map_err(|_| {
            DbError::validation("Invalid number")
                .with_field("value", text)
                .with_field("position", start)
        })
    }

    fn quoted(&mut self, quote: char) -> Result<&'a str> {
        let start = self.pos;
        let body = &self.src[start + 1..];
        match body.find(quote) {
            Some(end) => {
                self.pos = start + 1 + end + 1;
                Ok(&body[..end])
            }
            None => Err(DbError::validation("Unterminated string").with_field("position", start)),
        }
    }

    fn numlist(&mut self) -> Result<&'a str> {
        let start = self.pos;
        match self.rest().find(']') {
            Some(end) => {
                self.pos = start + end + 1;
                Ok(&self.src[start..self.pos])
            }
            None => Err(DbError::validation("Unterminated number list").with_field("position", start)),
        }
    }
}

#[derive(Debug)]
struct Parser<'a> {
    toks: Vec<TokenWithLocation<'a>>,
    /// Index of token we should process next.
    idx: usize,
}

impl<'a> Parser<'a> {
    fn next_token(&mut self) -> Option<&TokenWithLocation<'a>> {
        let tok = self.toks.get(self.idx)?;
        self.idx += 1;
        Some(tok)
    }

    fn parse_expr(&mut self) -> Result<Ast> {
        let tok = match self.next_token() {
            Some(tok) => tok.clone(),
            None => return Err(DbError::validation("Unexpected end of expression")),
        };

        Ok(match tok.token {
            Token::LeftParen => self.parse_call(tok.pos)?,
            Token::RightParen => {
                return Err(DbError::validation("Unexpected ')'").with_field("position", tok.pos));
            }
            Token::Number(v) => Ast::Num(v),
            Token::Str(s) => Ast::Str(s.to_string()),
            Token::NumList(s) => Ast::NumList(RangeList::parse(s)?),
            Token::Word("TRUE") => Ast::Num(1.0),
            Token::Word("FALSE") => Ast::Num(0.0),
            Token::Word("NA") => Ast::Num(f64::NAN),
            Token::Word(w) => Ast::Ident(w.to_string()),
        })
    }

    fn parse_call(&mut self, open_pos: usize) -> Result<Ast> {
        let op = match self.next_token() {
            Some(TokenWithLocation {
                token: Token::Word(w), ..
            }) => w.to_string(),
            Some(other) => {
                return Err(DbError::validation("Expected an operator name")
                    .with_field("got", &other.token)
                    .with_field("position", other.pos));
            }
            None => return Err(DbError::validation("Unclosed '('").with_field("position", open_pos)),
        };

        let mut args = Vec::new();
        loop {
            match self.toks.get(self.idx) {
                Some(TokenWithLocation {
                    token: Token::RightParen,
                    ..
                }) => {
                    self.idx += 1;
                    return Ok(Ast::Call { op, args });
                }
                Some(_) => args.push(self.parse_expr()?),
                None => {
                    return Err(DbError::validation("Unclosed '('")
                        .with_field("op", op)
                        .with_field("position", open_pos));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(op: &str, args: Vec<Ast>) -> Ast {
        Ast::Call {
            op: op.to_string(),
            args,
        }
    }

    #[test]
    fn parse_nested() {
        let ast = Ast::parse("(rows= (cols fr [0:2]) #-1.5 [0,5:3:2])").unwrap();
        assert_eq!(
            call(
                "rows=",
                vec![
                    call(
                        "cols",
                        vec![
                            Ast::Ident("fr".to_string()),
                            Ast::NumList(RangeList::parse("[0:2]").unwrap()),
                        ]
                    ),
                    Ast::Num(-1.5),
                    Ast::NumList(RangeList::parse("[0,5:3:2]").unwrap()),
                ]
            ),
            ast
        );
    }

    #[test]
    fn parse_literals() {
        assert_eq!(Ast::Num(1.0), Ast::parse("TRUE").unwrap());
        assert_eq!(Ast::Str("a b".to_string()), Ast::parse("'a b'").unwrap());
        assert_eq!(Ast::Str("c".to_string()), Ast::parse(" \"c\" ").unwrap());
        assert_eq!(call("ls", vec![]), Ast::parse("(ls)").unwrap());
        assert_eq!(Ast::Ident("-".to_string()), Ast::parse("-").unwrap());
    }

    #[test]
    fn parse_errors() {
        Ast::parse("(cols fr").unwrap_err();
        Ast::parse("(cols fr))").unwrap_err();
        Ast::parse("()").unwrap_err();
        Ast::parse("'open").unwrap_err();
        Ast::parse("[1,2").unwrap_err();
        Ast::parse("[3,1]").unwrap_err();
        Ast::parse("").unwrap_err();
    }

    #[test]
    fn display_round_trips() {
        let src = "(merge a b 1 [0] [0])";
        let ast = Ast::parse(src).unwrap();
        assert_eq!(ast, Ast::parse(&ast.to_string()).unwrap());
    }
}
