//! Recursive-descent parser for the declaration-surface expression language

use ngen_model::ModelError;

use crate::error::Result;
use crate::expr::ast::{BinOp, Expr, UnaryOp};
use crate::expr::token::{tokenize, Token};

/// Parse an expression string into an AST
pub fn parse_expression(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(ModelError::malformed(text, "trailing tokens after expression").into());
    }
    Ok(expr)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Token, what: &str) -> Result<()> {
        match self.bump() {
            Some(t) if &t == tok => Ok(()),
            _ => Err(ModelError::malformed(self.text, format!("expected {}", what)).into()),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::If) {
            return self.conditional();
        }
        self.or_expr()
    }

    fn conditional(&mut self) -> Result<Expr> {
        self.expect(&Token::If, "'if'")?;
        let cond = self.or_expr()?;
        self.expect(&Token::Then, "'then'")?;
        let then = self.expression()?;
        self.expect(&Token::Else, "'else'")?;
        let otherwise = self.expression()?;
        Ok(Expr::Ite(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Expr::bin(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.peek() == Some(&Token::And) {
            self.bump();
            let rhs = self.not_expr()?;
            lhs = Expr::bin(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Not) | Some(Token::Bang)) {
            self.bump();
            let inner = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Ge) => Some(BinOp::Ge),
            Some(Token::EqEq) => Some(BinOp::Eq),
            Some(Token::Ne) => Some(BinOp::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let rhs = self.additive()?;
            return Ok(Expr::bin(op, lhs, rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::bin(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::bin(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.bump();
            let inner = self.unary()?;
            return Ok(Expr::neg(inner));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.bump();
            // Right-associative; unary minus binds tighter on the exponent
            let exponent = self.unary()?;
            return Ok(Expr::bin(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')'")?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::If) => {
                // `if` in operand position, e.g. `1.0 + if c then a else b`
                self.pos -= 1;
                self.conditional()
            }
            other => Err(ModelError::malformed(
                self.text,
                format!("unexpected token {:?}", other),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_of_arithmetic() {
        let e = parse_expression("a + b * c").unwrap();
        assert_eq!(
            e,
            Expr::bin(
                BinOp::Add,
                Expr::ident("a"),
                Expr::bin(BinOp::Mul, Expr::ident("b"), Expr::ident("c"))
            )
        );
    }

    #[test]
    fn power_is_right_associative() {
        let e = parse_expression("a ^ b ^ c").unwrap();
        assert_eq!(
            e,
            Expr::bin(
                BinOp::Pow,
                Expr::ident("a"),
                Expr::bin(BinOp::Pow, Expr::ident("b"), Expr::ident("c"))
            )
        );
    }

    #[test]
    fn calls_with_arguments() {
        let e = parse_expression("max(0.0, v - v_rest)").unwrap();
        match e {
            Expr::Call(name, args) => {
                assert_eq!(name, "max");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn conditional_expression() {
        let e = parse_expression("if v > v_thresh then 1.0 else 0.0").unwrap();
        assert!(matches!(e, Expr::Ite(_, _, _)));
    }

    #[test]
    fn boolean_connectives() {
        let e = parse_expression("v > v_thresh and not refractory").unwrap();
        assert!(matches!(e, Expr::Binary(BinOp::And, _, _)));
    }

    #[test]
    fn trailing_tokens_fail() {
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("(a").is_err());
    }
}
