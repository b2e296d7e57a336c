//! Binary operator precedence table

use crate::ast::BinaryOp;
use crate::lexer::Token;

/// Operator precedence level (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    LogicalOr = 1,      // ||
    LogicalAnd = 2,     // &&
    Equality = 3,       // ==, !=
    Relational = 4,     // <, >, <=, >=
    Additive = 5,       // +, -
    Multiplicative = 6, // *, /, %
    Unary = 7,          // -, !, typeof
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::LogicalOr,
            Precedence::LogicalOr => Precedence::LogicalAnd,
            Precedence::LogicalAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Relational,
            Precedence::Relational => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative | Precedence::Unary => Precedence::Unary,
        }
    }
}

/// Precedence and operator of a binary operator token, if it is one.
pub fn binary_operator(token: &Token) -> Option<(Precedence, BinaryOp)> {
    let entry = match token {
        Token::PipePipe => (Precedence::LogicalOr, BinaryOp::Or),
        Token::AmpAmp => (Precedence::LogicalAnd, BinaryOp::And),
        Token::EqualEqual => (Precedence::Equality, BinaryOp::Eq),
        Token::BangEqual => (Precedence::Equality, BinaryOp::Ne),
        Token::Less => (Precedence::Relational, BinaryOp::Lt),
        Token::LessEqual => (Precedence::Relational, BinaryOp::Le),
        Token::Greater => (Precedence::Relational, BinaryOp::Gt),
        Token::GreaterEqual => (Precedence::Relational, BinaryOp::Ge),
        Token::Plus => (Precedence::Additive, BinaryOp::Add),
        Token::Minus => (Precedence::Additive, BinaryOp::Sub),
        Token::Star => (Precedence::Multiplicative, BinaryOp::Mul),
        Token::Slash => (Precedence::Multiplicative, BinaryOp::Div),
        Token::Percent => (Precedence::Multiplicative, BinaryOp::Mod),
        _ => return None,
    };
    Some(entry)
}
