//! Lexer for the script language.
//!
//! Tokens are produced by logos; the driver loop attaches line and column
//! information used in compile errors.

use logos::Logos;
use std::fmt;

/// Source token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*", lex_block_comment)]
    BlockComment,

    // Keywords (must come before identifiers)
    #[token("local")]
    Local,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("foreach")]
    Foreach,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("class")]
    Class,
    #[token("extends")]
    Extends,
    #[token("static")]
    Static,
    #[token("this")]
    This,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("typeof")]
    Typeof,

    // Literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+", parse_int)]
    IntLiteral(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", parse_float)]
    FloatLiteral(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, parse_string)]
    StringLiteral(String),

    // Multi-character operators (must come before single-character)
    #[token("<-")]
    NewSlot,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Single-character operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Equal,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "identifier '{}'", name),
            Token::IntLiteral(n) => write!(f, "'{}'", n),
            Token::FloatLiteral(n) => write!(f, "'{}'", n),
            Token::StringLiteral(s) => write!(f, "\"{}\"", s),
            Token::Eof => f.write_str("end of script"),
            other => write!(f, "'{}'", other.text()),
        }
    }
}

impl Token {
    fn text(&self) -> &'static str {
        match self {
            Token::Local => "local",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::Foreach => "foreach",
            Token::In => "in",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Class => "class",
            Token::Extends => "extends",
            Token::Static => "static",
            Token::This => "this",
            Token::Null => "null",
            Token::True => "true",
            Token::False => "false",
            Token::Throw => "throw",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Typeof => "typeof",
            Token::NewSlot => "<-",
            Token::EqualEqual => "==",
            Token::BangEqual => "!=",
            Token::LessEqual => "<=",
            Token::GreaterEqual => ">=",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::PlusEqual => "+=",
            Token::MinusEqual => "-=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Less => "<",
            Token::Greater => ">",
            Token::Equal => "=",
            Token::Question => "?",
            Token::Dot => ".",
            Token::Colon => ":",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            _ => "",
        }
    }
}

/// Source position of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character '{char}'")]
    UnexpectedCharacter { char: char, span: Span },
    #[error("unfinished string")]
    UnterminatedString { span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. } | LexError::UnterminatedString { span } => {
                *span
            }
        }
    }
}

fn lex_block_comment(lex: &mut logos::Lexer<Token>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_hex(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    i64::from_str_radix(&lex.slice()[2..], 16).ok()
}

fn parse_int(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let s = lex.slice();
    Some(unescape_string(&s[1..s.len() - 1]))
}

fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('0') => result.push('\0'),
                Some(c) => result.push(c),
                None => break,
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// Tokenizes the whole source, stopping at the first error
    pub fn tokenize(self) -> Result<Vec<(Token, Span)>, LexError> {
        let mut logos_lexer = Token::lexer(self.source);
        let mut tokens = Vec::new();
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0;

        while let Some(result) = logos_lexer.next() {
            let range = logos_lexer.span();
            advance(&self.source[last_end..range.start], &mut line, &mut column);
            let span = Span::new(range.start, range.end, line, column);

            match result {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    let char = self.source[range.start..].chars().next().unwrap_or('\0');
                    return Err(if char == '"' || char == '\'' {
                        LexError::UnterminatedString { span }
                    } else {
                        LexError::UnexpectedCharacter { char, span }
                    });
                }
            }

            advance(&self.source[range.start..range.end], &mut line, &mut column);
            last_end = range.end;
        }

        advance(&self.source[last_end..], &mut line, &mut column);
        let eof = Span::new(self.source.len(), self.source.len(), line, column);
        tokens.push((Token::Eof, eof));
        Ok(tokens)
    }
}

fn advance(text: &str, line: &mut u32, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("local localx = foreach"),
            vec![
                Token::Local,
                Token::Identifier("localx".to_string()),
                Token::Equal,
                Token::Foreach,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 0x1F 3.5 1e3"),
            vec![
                Token::IntLiteral(42),
                Token::IntLiteral(31),
                Token::FloatLiteral(3.5),
                Token::FloatLiteral(1000.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\nb" 'c'"#),
            vec![
                Token::StringLiteral("a\nb".to_string()),
                Token::StringLiteral("c".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n# hash\n/* block\n */ b"),
            vec![
                Token::Identifier("a".to_string()),
                Token::Identifier("b".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_new_slot_before_less() {
        assert_eq!(
            kinds("x <- 1 < 2"),
            vec![
                Token::Identifier("x".to_string()),
                Token::NewSlot,
                Token::IntLiteral(1),
                Token::Less,
                Token::IntLiteral(2),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[0].1.line, tokens[0].1.column), (1, 1));
        assert_eq!((tokens[1].1.line, tokens[1].1.column), (2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a @ b").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedCharacter { char: '@', .. }));
        assert_eq!(err.span().column, 3);
    }
}
