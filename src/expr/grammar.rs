//! Minimal recursive-descent parser for the filter/trigger expression
//! grammar (spec.md §6):
//!
//!     expr   := term ("||" term)*
//!     term   := factor ("&&" factor)*
//!     factor := predicate | "!" factor | "(" expr ")"
//!     predicate := ident relop value
//!     relop  := "==" | "!=" | "<" | "<=" | ">" | ">="
//!     value  := bareword | '"' quoted '"'
//!
//! Kept intentionally small — no precedence beyond `||`/`&&`/`!`, no
//! functions — the way `rpglot-core`'s own line-oriented log parser
//! (`collector/log_collector/parser.rs`) hand-rolls just enough grammar for
//! its input rather than pulling in a parser-combinator crate.

use super::ast::{Expr, RelOp};
use crate::error::{ConfluoError, Result};

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Value(String),
    RelOp(RelOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Eof,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Tokenizer<'a> {
        Tokenizer { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.rest().chars().next() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_ws();
        if self.rest().is_empty() {
            return Ok(Token::Eof);
        }
        for (lit, tok) in [
            ("||", Token::Or),
            ("&&", Token::And),
            ("==", Token::RelOp(RelOp::Eq)),
            ("!=", Token::RelOp(RelOp::Neq)),
            ("<=", Token::RelOp(RelOp::Le)),
            (">=", Token::RelOp(RelOp::Ge)),
            ("<", Token::RelOp(RelOp::Lt)),
            (">", Token::RelOp(RelOp::Gt)),
            ("!", Token::Not),
            ("(", Token::LParen),
            (")", Token::RParen),
        ] {
            if self.starts_with(lit) {
                self.pos += lit.len();
                return Ok(tok);
            }
        }
        if self.rest().starts_with('"') {
            let rest = &self.rest()[1..];
            let end = rest
                .find('"')
                .ok_or_else(|| ConfluoError::ParseError("unterminated quoted value".into()))?;
            let value = rest[..end].to_string();
            self.pos += end + 2;
            return Ok(Token::Value(value));
        }
        let ident_len = self
            .rest()
            .find(|c: char| c.is_whitespace() || "()!<>=&|".contains(c))
            .unwrap_or_else(|| self.rest().len());
        if ident_len == 0 {
            return Err(ConfluoError::ParseError(format!("unexpected character near '{}'", self.rest())));
        }
        let text = self.rest()[..ident_len].to_string();
        self.pos += ident_len;
        Ok(Token::Ident(text))
    }
}

/// Recursive-descent parser with one token of lookahead.
pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    lookahead: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Parser<'a>> {
        let mut tokenizer = Tokenizer::new(input);
        let lookahead = tokenizer.next_token()?;
        Ok(Parser { tokenizer, lookahead })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.tokenizer.next_token()?;
        Ok(std::mem::replace(&mut self.lookahead, next))
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if &self.lookahead == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(ConfluoError::ParseError(format!("expected {expected:?}, found {:?}", self.lookahead)))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut node = self.parse_term()?;
        while self.lookahead == Token::Or {
            self.advance()?;
            let rhs = self.parse_term()?;
            node = Expr::or(node, rhs);
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut node = self.parse_factor()?;
        while self.lookahead == Token::And {
            self.advance()?;
            let rhs = self.parse_factor()?;
            node = Expr::and(node, rhs);
        }
        Ok(node)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        match &self.lookahead {
            Token::Not => {
                self.advance()?;
                Ok(Expr::not(self.parse_factor()?))
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(_) => self.parse_predicate(),
            other => Err(ConfluoError::ParseError(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr> {
        let attr = match self.advance()? {
            Token::Ident(name) => name,
            other => return Err(ConfluoError::ParseError(format!("expected identifier, found {other:?}"))),
        };
        let op = match self.advance()? {
            Token::RelOp(op) => op,
            other => return Err(ConfluoError::ParseError(format!("expected relational operator, found {other:?}"))),
        };
        let value = match self.advance()? {
            Token::Ident(v) | Token::Value(v) => v,
            other => return Err(ConfluoError::ParseError(format!("expected value, found {other:?}"))),
        };
        Ok(Expr::predicate(attr, op, value))
    }
}

/// Parses a full filter/trigger expression string into an [`Expr`] tree.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    if parser.lookahead != Token::Eof {
        return Err(ConfluoError::ParseError(format!("trailing input near {:?}", parser.lookahead)));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_predicate() {
        let e = parse("a == true").unwrap();
        match e {
            Expr::Predicate { attr, op, value } => {
                assert_eq!(attr, "a");
                assert_eq!(op, RelOp::Eq);
                assert_eq!(value, "true");
            }
            _ => panic!("expected predicate"),
        }
    }

    #[test]
    fn parses_and_or_precedence() {
        // && binds tighter than ||
        let e = parse("a == true || b > 4 && c < 1").unwrap();
        match e {
            Expr::Or(_, r) => match *r {
                Expr::And(_, _) => {}
                _ => panic!("expected and on right of or"),
            },
            _ => panic!("expected or at top level"),
        }
    }

    #[test]
    fn parses_negation_and_parens() {
        let e = parse("!(a == true)").unwrap();
        matches!(e, Expr::Not(_));
    }

    #[test]
    fn parses_quoted_values() {
        let e = parse(r#"h == "abc""#).unwrap();
        match e {
            Expr::Predicate { value, .. } => assert_eq!(value, "abc"),
            _ => panic!("expected predicate"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("a == 1 b == 2").is_err());
    }
}
