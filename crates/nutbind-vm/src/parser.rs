//! Parser for the script language
//!
//! A recursive descent parser that turns the token stream into the syntax tree
//! in [`crate::ast`]. The whole source becomes the body of an anonymous main
//! function.

pub mod error;
mod expr;
pub mod precedence;
mod stmt;

use crate::ast::{FunctionProto, Stmt};
use crate::lexer::{Lexer, Span, Token};
use std::rc::Rc;

pub use error::{ParseError, ParseErrorKind};

/// Maximum nesting of statements and expressions. Deeper source is rejected
/// before the parser's own recursion can exhaust the native stack.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parser state.
pub struct Parser {
    /// Pre-tokenized input, always terminated by `Token::Eof`
    tokens: Vec<(Token, Span)>,
    pos: usize,
    source_name: Rc<str>,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str, source_name: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            source_name: Rc::from(source_name),
            depth: 0,
        })
    }

    /// Parses the whole source into the main function.
    pub fn parse(mut self) -> Result<FunctionProto, ParseError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(FunctionProto {
            name: None,
            source: self.source_name.clone(),
            params: Vec::new(),
            body,
            line: 1,
        })
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    #[inline]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.current_span().line
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(tok, _)| tok)
    }

    /// Advance to the next token, returning the previous current token.
    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Check if the current token matches the given kind.
    #[inline]
    pub fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    /// Consumes the current token if it matches
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected.to_string()))
        }
    }

    pub fn expect_identifier(&mut self) -> Result<Rc<str>, ParseError> {
        match self.current() {
            Token::Identifier(name) => {
                let name = Rc::from(name.as_str());
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    pub fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::unexpected(expected, self.current().clone(), self.current_span())
    }

    /// Runs `parse` one nesting level deeper
    pub(crate) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::too_deep(self.current_span()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Parses `(params) { body }`
    pub(crate) fn parse_function_rest(
        &mut self,
        name: Option<Rc<str>>,
        line: u32,
    ) -> Result<FunctionProto, ParseError> {
        self.expect(Token::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        let body = self.parse_block_body()?;
        Ok(FunctionProto {
            name,
            source: self.source_name.clone(),
            params,
            body,
            line,
        })
    }

    /// Parses `{ statements }`
    pub(crate) fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }
}

/// Parses a complete source buffer
pub fn parse(source: &str, source_name: &str) -> Result<FunctionProto, ParseError> {
    Parser::new(source, source_name)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, ExprKind};

    #[test]
    fn test_parse_empty_source() {
        let proto = parse("", "empty.nut").unwrap();
        assert!(proto.body.is_empty());
        assert!(proto.name.is_none());
        assert_eq!(&*proto.source, "empty.nut");
    }

    #[test]
    fn test_function_declaration_becomes_new_slot() {
        let proto = parse("function add(a, b) { return a + b }", "t.nut").unwrap();
        let Stmt::Expr(expr) = &proto.body[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { op, value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert_eq!(*op, AssignOp::NewSlot);
        let ExprKind::Function(f) = &value.kind else {
            panic!("expected function");
        };
        assert_eq!(f.name.as_deref(), Some("add"));
        assert_eq!(f.params.len(), 2);
    }

    #[test]
    fn test_error_reports_line() {
        let err = parse("local a = 1\nlocal = 2", "bad.nut").unwrap_err();
        assert_eq!(err.span.line, 2);
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedToken { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 = 2", "bad.nut").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidAssignmentTarget);
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("return {}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&source, "deep.nut").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);
        assert_eq!(err.span.line, 1);

        let blocks = format!("{}{}", "{".repeat(10_000), "}".repeat(10_000));
        let err = parse(&blocks, "deep.nut").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);

        let negations = format!("return {}1", "-".repeat(10_000));
        assert_eq!(
            parse(&negations, "deep.nut").unwrap_err().kind,
            ParseErrorKind::NestingTooDeep
        );
    }

    #[test]
    fn test_nesting_below_limit_parses() {
        let depth = MAX_NESTING_DEPTH / 2;
        let source = format!("return {}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse(&source, "nested.nut").is_ok());
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("if (x) {", "bad.nut").unwrap_err();
        assert!(err.message.contains("'}'"));
    }
}
