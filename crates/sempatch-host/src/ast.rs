//! AST for the host-language subset.
//!
//! The subset covers what the patch rewriter emits and what candidate target
//! methods are written in: classes with string fields and methods, local
//! variable declarations, `if`/`else`, `return`, and a small expression
//! language. Every statement carries the 1-based source line it starts on;
//! line identity is load-bearing for anchor resolution.

use std::fmt;

/// 1-based source line of a syntactic element.
pub type Line = usize;

/// A top-level class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

impl Class {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A field with a literal initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ty: String,
    pub name: String,
    pub value: Lit,
    pub line: Line,
}

/// A method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub modifiers: Vec<String>,
    pub ret_ty: String,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub line: Line,
}

impl Method {
    /// Parameter-typed signature, without the return type.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Signature including the return type, used for header-change detection.
    pub fn full_signature(&self) -> String {
        format!("{} {}", self.ret_ty, self.signature())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: String,
    pub name: String,
}

/// A brace-delimited statement sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Local {
        ty: String,
        name: String,
        init: Option<Expr>,
        line: Line,
    },
    Expr {
        expr: Expr,
        line: Line,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        line: Line,
    },
    Return {
        value: Option<Expr>,
        line: Line,
    },
}

impl Stmt {
    pub fn line(&self) -> Line {
        match self {
            Stmt::Local { line, .. }
            | Stmt::Expr { line, .. }
            | Stmt::If { line, .. }
            | Stmt::Return { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Str(String),
    Char(char),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
}

/// Expressions. Structural equality (`PartialEq`) is the engine's notion of
/// semantic equality for metavariable bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Lit(Lit),
    FieldRead {
        target: Box<Expr>,
        name: String,
    },
    Invocation {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Int(v) => write!(f, "{v}"),
            Lit::Str(s) => write!(f, "\"{s}\""),
            Lit::Char(c) => write!(f, "'{c}'"),
            Lit::Bool(b) => write!(f, "{b}"),
            Lit::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Lit(lit) => write!(f, "{lit}"),
            Expr::FieldRead { target, name } => write!(f, "{target}.{name}"),
            Expr::Invocation { target, name, args } => {
                if let Some(t) = target {
                    write!(f, "{t}.")?;
                }
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({})", args.join(", "))
            }
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::Assign { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Local { ty, name, init, .. } => match init {
                Some(e) => write!(f, "{ty} {name} = {e};"),
                None => write!(f, "{ty} {name};"),
            },
            Stmt::Expr { expr, .. } => write!(f, "{expr};"),
            Stmt::If {
                cond, else_block, ..
            } => {
                write!(f, "if ({cond}) {{ … }}")?;
                if else_block.is_some() {
                    write!(f, " else {{ … }}")?;
                }
                Ok(())
            }
            Stmt::Return { value, .. } => match value {
                Some(e) => write!(f, "return {e};"),
                None => write!(f, "return;"),
            },
        }
    }
}
