//! Abstract Syntax Tree for the script dialect

use std::rc::Rc;

/// A function body: either a `function(...) { }` expression or a whole
/// compiled buffer (no parameters)
#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    /// `local a = 1, b;`
    Local(Vec<(Rc<str>, Option<Expr>)>),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// `foreach (k, v in expr)` or `foreach (v in expr)`
    Foreach {
        key: Option<Rc<str>>,
        value: Rc<str>,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Block(Vec<Stmt>),
    Empty,
}

#[derive(Debug)]
pub enum Literal {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    TypeOf,
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
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `<-`: create the slot if it does not exist
    NewSlot,
    /// `=`: the slot (or local) must already exist
    Set,
    AddSet,
    SubSet,
}

#[derive(Debug)]
pub enum Expr {
    Literal(Literal),
    Ident(Rc<str>),
    /// `::name`, always looked up in the root table
    Root(Rc<str>),
    This,
    Table(Vec<(Expr, Expr)>),
    Array(Vec<Expr>),
    Function(Rc<FunctionDef>),
    Member(Box<Expr>, Rc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
}
