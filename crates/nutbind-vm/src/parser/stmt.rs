//! Statement parsing

use super::{ParseError, Parser};
use crate::ast::{AssignOp, Expr, ExprKind, Stmt};
use crate::lexer::Token;
use std::rc::Rc;

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let stmt = match self.current() {
            Token::Semicolon => {
                self.advance();
                return Ok(Stmt::Block(Vec::new()));
            }
            Token::LeftBrace => return Ok(Stmt::Block(self.parse_block_body()?)),
            Token::Local => self.parse_local()?,
            Token::Function => {
                self.advance();
                let name = self.expect_identifier()?;
                let proto = self.parse_function_rest(Some(name.clone()), line)?;
                let value = Expr::new(ExprKind::Function(Rc::new(proto)), line);
                return Ok(Stmt::Expr(new_slot(name, value, line)));
            }
            Token::Class => {
                self.advance();
                let name = self.expect_identifier()?;
                let class = self.parse_class_rest(line)?;
                return Ok(Stmt::Expr(new_slot(name, class, line)));
            }
            Token::Return => {
                self.advance();
                let value = if self.ends_statement() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Stmt::Return(value, line)
            }
            Token::If => return self.parse_if(),
            Token::While => {
                self.advance();
                let cond = self.parse_condition()?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::While { cond, body });
            }
            Token::For => return self.parse_for(),
            Token::Foreach => return self.parse_foreach(),
            Token::Break => {
                self.advance();
                Stmt::Break(line)
            }
            Token::Continue => {
                self.advance();
                Stmt::Continue(line)
            }
            Token::Throw => {
                self.advance();
                Stmt::Throw(self.parse_expression()?, line)
            }
            Token::Try => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect(Token::Catch)?;
                self.expect(Token::LeftParen)?;
                let var = self.expect_identifier()?;
                self.expect(Token::RightParen)?;
                let handler = Box::new(self.parse_statement()?);
                return Ok(Stmt::Try { body, var, handler });
            }
            _ => Stmt::Expr(self.parse_expression()?),
        };
        self.eat(&Token::Semicolon);
        Ok(stmt)
    }

    fn ends_statement(&self) -> bool {
        matches!(
            self.current(),
            Token::Semicolon | Token::RightBrace | Token::Eof
        )
    }

    fn parse_local(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        if self.check(&Token::Function) {
            self.advance();
            let name = self.expect_identifier()?;
            let proto = self.parse_function_rest(Some(name.clone()), line)?;
            let value = Expr::new(ExprKind::Function(Rc::new(proto)), line);
            return Ok(Stmt::Local {
                names: vec![(name, Some(value))],
                line,
            });
        }

        let mut names = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let init = if self.eat(&Token::Equal) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            names.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Local { names, line })
    }

    fn parse_condition(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::LeftParen)?;
        let cond = self.parse_expression()?;
        self.expect(Token::RightParen)?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let cond = self.parse_condition()?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect(Token::LeftParen)?;

        let init = if self.check(&Token::Semicolon) {
            None
        } else if self.check(&Token::Local) {
            Some(Box::new(self.parse_local()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expression()?)))
        };
        self.expect(Token::Semicolon)?;

        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;

        let step = if self.check(&Token::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::RightParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_foreach(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect(Token::LeftParen)?;
        let first = self.expect_identifier()?;
        let (key, value) = if self.eat(&Token::Comma) {
            (Some(first), self.expect_identifier()?)
        } else {
            (None, first)
        };
        self.expect(Token::In)?;
        let iterable = self.parse_expression()?;
        self.expect(Token::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::Foreach {
            key,
            value,
            iterable,
            body,
        })
    }
}

fn new_slot(name: Rc<str>, value: Expr, line: u32) -> Expr {
    Expr::new(
        ExprKind::Assign {
            op: AssignOp::NewSlot,
            target: Box::new(Expr::new(ExprKind::Ident(name), line)),
            value: Box::new(value),
        },
        line,
    )
}
