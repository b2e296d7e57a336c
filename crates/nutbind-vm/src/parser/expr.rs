//! Expression parsing

use super::precedence::{binary_operator, Precedence};
use super::{ParseError, Parser};
use crate::ast::{AssignOp, ClassMember, Expr, ExprKind, UnaryOp};
use crate::lexer::Token;
use std::rc::Rc;

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_expression_inner)
    }

    fn parse_expression_inner(&mut self) -> Result<Expr, ParseError> {
        let span = self.current_span();
        let target = self.parse_ternary()?;

        let op = match self.current() {
            Token::Equal => AssignOp::Set,
            Token::NewSlot => AssignOp::NewSlot,
            Token::PlusEqual => AssignOp::Add,
            Token::MinusEqual => AssignOp::Sub,
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(ParseError::invalid_target(span));
        }
        self.advance();
        let value = self.parse_expression()?;
        let line = target.line;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            line,
        ))
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(Precedence::LogicalOr)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then_value = self.parse_expression()?;
        self.expect(Token::Colon)?;
        let else_value = self.parse_expression()?;
        let line = cond.line;
        Ok(Expr::new(
            ExprKind::Ternary(Box::new(cond), Box::new(then_value), Box::new(else_value)),
            line,
        ))
    }

    fn parse_binary(&mut self, min: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = binary_operator(self.current()) {
            if prec < min {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec.next())?;
            let line = left.line;
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), line);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            Token::Typeof => UnaryOp::Typeof,
            Token::PlusPlus | Token::MinusMinus => {
                let delta = if self.check(&Token::PlusPlus) { 1 } else { -1 };
                let span = self.current_span();
                self.advance();
                let target = self.parse_unary()?;
                if !is_assignable(&target) {
                    return Err(ParseError::invalid_target(span));
                }
                return Ok(Expr::new(
                    ExprKind::Increment {
                        target: Box::new(target),
                        delta,
                        postfix: false,
                    },
                    line,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(ExprKind::Unary(op, Box::new(operand)), line))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let line = self.line();
            match self.current() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let key = Expr::new(ExprKind::String(name), line);
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(key)), line);
                }
                Token::LeftBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(key)), line);
                }
                Token::LeftParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = Expr::new(ExprKind::Call(Box::new(expr), args), line);
                }
                Token::PlusPlus | Token::MinusMinus if is_assignable(&expr) => {
                    let delta = if self.check(&Token::PlusPlus) { 1 } else { -1 };
                    self.advance();
                    return Ok(Expr::new(
                        ExprKind::Increment {
                            target: Box::new(expr),
                            delta,
                            postfix: true,
                        },
                        line,
                    ));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let kind = match self.current().clone() {
            Token::Null => ExprKind::Null,
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::IntLiteral(n) => ExprKind::Integer(n),
            Token::FloatLiteral(n) => ExprKind::Float(n),
            Token::StringLiteral(s) => ExprKind::String(Rc::from(s.as_str())),
            Token::Identifier(name) => ExprKind::Ident(Rc::from(name.as_str())),
            Token::This => ExprKind::This,
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                return Ok(inner);
            }
            Token::LeftBrace => return self.parse_table_literal(),
            Token::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&Token::RightBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RightBracket)?;
                return Ok(Expr::new(ExprKind::Array(items), line));
            }
            Token::Function => {
                self.advance();
                let proto = self.parse_function_rest(None, line)?;
                return Ok(Expr::new(ExprKind::Function(Rc::new(proto)), line));
            }
            Token::Class => {
                self.advance();
                return self.parse_class_rest(line);
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(Expr::new(kind, line))
    }

    fn parse_table_literal(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        self.expect(Token::LeftBrace)?;
        let mut slots = Vec::new();
        while !self.check(&Token::RightBrace) {
            let slot_line = self.line();
            let slot = match self.current().clone() {
                Token::Function => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let proto = self.parse_function_rest(Some(name.clone()), slot_line)?;
                    (
                        Expr::new(ExprKind::String(name), slot_line),
                        Expr::new(ExprKind::Function(Rc::new(proto)), slot_line),
                    )
                }
                Token::StringLiteral(key) => {
                    self.advance();
                    if !self.eat(&Token::Colon) {
                        self.expect(Token::Equal)?;
                    }
                    let value = self.parse_expression()?;
                    (
                        Expr::new(ExprKind::String(Rc::from(key.as_str())), slot_line),
                        value,
                    )
                }
                _ => self.parse_slot_key_value(slot_line)?,
            };
            slots.push(slot);
            self.eat(&Token::Comma);
        }
        self.advance();
        Ok(Expr::new(ExprKind::Table(slots), line))
    }

    /// `name = value` or `[key] = value`
    fn parse_slot_key_value(&mut self, line: u32) -> Result<(Expr, Expr), ParseError> {
        let key = if self.eat(&Token::LeftBracket) {
            let key = self.parse_expression()?;
            self.expect(Token::RightBracket)?;
            key
        } else {
            Expr::new(ExprKind::String(self.expect_identifier()?), line)
        };
        self.expect(Token::Equal)?;
        Ok((key, self.parse_expression()?))
    }

    /// Parses `[extends base] { members }` after the `class` keyword and optional name
    pub(crate) fn parse_class_rest(&mut self, line: u32) -> Result<Expr, ParseError> {
        let base = if self.eat(&Token::Extends) {
            Some(Box::new(self.parse_postfix()?))
        } else {
            None
        };

        self.expect(Token::LeftBrace)?;
        let mut members = Vec::new();
        while !self.check(&Token::RightBrace) {
            let member_line = self.line();
            let is_static = self.eat(&Token::Static);
            let is_constructor = matches!(self.current(), Token::Identifier(name) if name == "constructor")
                && matches!(self.peek(), Some(Token::LeftParen));

            let (key, value) = if is_constructor {
                let name = self.expect_identifier()?;
                let proto = self.parse_function_rest(Some(name.clone()), member_line)?;
                (
                    Expr::new(ExprKind::String(name), member_line),
                    Expr::new(ExprKind::Function(Rc::new(proto)), member_line),
                )
            } else if self.eat(&Token::Function) {
                let name = self.expect_identifier()?;
                let proto = self.parse_function_rest(Some(name.clone()), member_line)?;
                (
                    Expr::new(ExprKind::String(name), member_line),
                    Expr::new(ExprKind::Function(Rc::new(proto)), member_line),
                )
            } else {
                self.parse_slot_key_value(member_line)?
            };
            members.push(ClassMember {
                key,
                value,
                is_static,
            });
            if !self.eat(&Token::Semicolon) {
                self.eat(&Token::Comma);
            }
        }
        self.advance();
        Ok(Expr::new(ExprKind::Class { base, members }, line))
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Index(..))
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, ExprKind, Stmt};
    use crate::parser::parse;

    fn first_expr(source: &str) -> ExprKind {
        let mut proto = parse(source, "t.nut").unwrap();
        match proto.body.remove(0) {
            Stmt::Expr(expr) => expr.kind,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_precedence() {
        let ExprKind::Binary(op, _, right) = first_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let ExprKind::Binary(BinaryOp::Sub, left, _) = first_expr("5 - 2 - 1") else {
            panic!("expected binary");
        };
        assert!(matches!(left.kind, ExprKind::Binary(BinaryOp::Sub, _, _)));
    }

    #[test]
    fn test_method_call_chain() {
        let ExprKind::Call(callee, args) = first_expr("a.b(1, 2)") else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(callee.kind, ExprKind::Index(..)));
    }

    #[test]
    fn test_table_literal_forms() {
        let ExprKind::Table(slots) =
            first_expr("x <- { a = 1, [\"b\"] = 2, \"c\": 3, function d() {} }")
                .into_assign_value()
        else {
            panic!("expected table");
        };
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn test_class_with_constructor_and_static() {
        let ExprKind::Class { members, base } =
            first_expr("X <- class { static count = 0; constructor(a) {} function f() {} }")
                .into_assign_value()
        else {
            panic!("expected class");
        };
        assert!(base.is_none());
        assert_eq!(members.len(), 3);
        assert!(members[0].is_static);
    }

    impl ExprKind {
        fn into_assign_value(self) -> ExprKind {
            match self {
                ExprKind::Assign { value, .. } => value.kind,
                other => other,
            }
        }
    }
}
