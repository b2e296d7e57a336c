//! Syntax tree produced by the parser and walked by the interpreter

use std::rc::Rc;

/// A compiled function body
#[derive(Debug)]
pub struct FunctionProto {
    /// `None` for the main chunk and anonymous function expressions
    pub name: Option<Rc<str>>,
    pub source: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug)]
pub enum Stmt {
    Local {
        names: Vec<(Rc<str>, Option<Expr>)>,
        line: u32,
    },
    Expr(Expr),
    Return(Option<Expr>, u32),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Foreach {
        key: Option<Rc<str>>,
        value: Rc<str>,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Break(u32),
    Continue(u32),
    Block(Vec<Stmt>),
    Throw(Expr, u32),
    Try {
        body: Box<Stmt>,
        var: Rc<str>,
        handler: Box<Stmt>,
    },
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    NewSlot,
    Add,
    Sub,
}

#[derive(Debug)]
pub struct ClassMember {
    pub key: Expr,
    pub value: Expr,
    pub is_static: bool,
}

#[derive(Debug)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Ident(Rc<str>),
    This,
    Table(Vec<(Expr, Expr)>),
    Array(Vec<Expr>),
    Function(Rc<FunctionProto>),
    Class {
        base: Option<Box<Expr>>,
        members: Vec<ClassMember>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `++x`, `x--` and friends
    Increment {
        target: Box<Expr>,
        delta: i64,
        postfix: bool,
    },
}
