//! Recursive-descent parser producing an [`Expr`] tree from tokens.
//!
//! Grammar (spec.md §4.3):
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | primary
//! primary:= number | ident ['(' (expr (',' expr)*)? ')'] | '(' expr ')'
//! ```

use std::iter::Peekable;
use std::slice::Iter;

use super::ast::{BinOp, Expr, Func, UnOp};
use super::lexer::{tokenize, Token};
use crate::error::ExprError;

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
    };
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.tokens.next() {
        let mut rest = format!("{tok:?}");
        for t in parser.tokens {
            rest.push_str(&format!(" {t:?}"));
        }
        return Err(ExprError::TrailingInput(rest));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Peekable<Iter<'a, Token>>,
}

impl<'a> Parser<'a> {
    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.tokens.peek() {
                Some(Token::Plus) => {
                    self.tokens.next();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.tokens.next();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.tokens.peek() {
                Some(Token::Star) => {
                    self.tokens.next();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.tokens.next();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.tokens.peek(), Some(Token::Minus)) {
            self.tokens.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.tokens.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.tokens.peek(), Some(Token::LParen)) {
                    self.tokens.next();
                    let args = self.parse_args()?;
                    let func = Func::from_name(name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    if args.len() != func.arity() {
                        return Err(ExprError::ArityMismatch {
                            name: name.clone(),
                            expected: func.arity_description(),
                            got: args.len(),
                        });
                    }
                    Ok(Expr::Call(func, args))
                } else {
                    Ok(Expr::Ident(name.clone()))
                }
            }
            Some(other) => Err(ExprError::Expected {
                expected: "a number, identifier, or '('",
                found: format!("{other:?}"),
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.tokens.peek(), Some(Token::RParen)) {
            self.tokens.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.tokens.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(other) => {
                    return Err(ExprError::Expected {
                        expected: "',' or ')'",
                        found: format!("{other:?}"),
                    })
                }
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
        Ok(args)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.tokens.next() {
            Some(tok) if *tok == expected => Ok(()),
            Some(other) => Err(ExprError::Expected {
                expected: "')'",
                found: format!("{other:?}"),
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Every identifier referenced by `expr`, including inside nested
/// calls — used by `schema::validate` (invariant 3) and `planner`
/// (spec.md §4.4) without re-walking the tree by hand each time.
pub fn identifiers(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ident(name) => out.push(name.clone()),
        Expr::Unary(_, inner) => identifiers(inner, out),
        Expr::Binary(_, lhs, rhs) => {
            identifiers(lhs, out);
            identifiers(rhs, out);
        }
        Expr::Call(_, args) => {
            for arg in args {
                identifiers(arg, out);
            }
        }
    }
}
