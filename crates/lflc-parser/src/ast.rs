use std::fmt;

use lflc_common::Span;

/// A complete LFL module: a flat list of function definitions.
#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<Function>,
}

/// `int name(params) { ... }` or `void name(params) { ... }`.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    /// True for `int` functions, false for `void`.
    pub returns_value: bool,
    pub body: Vec<Statement>,
    pub span: Span,
}

/// Function parameter. Parameters are untyped names; everything is an i32.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// `name = expr;`, which also introduces `name` on first assignment.
    Assign {
        name: String,
        name_span: Span,
        expr: Expr,
        span: Span,
    },
    /// `name op= expr;`
    CompoundAssign {
        name: String,
        name_span: Span,
        op: BinOp,
        expr: Expr,
        span: Span,
    },
    /// A call in statement position; must target a void function.
    Call { call: CallExpr, span: Span },
    /// `if c { } else if c { } ... else { }`, one arm per condition.
    If {
        arms: Vec<IfArm>,
        else_body: Option<Vec<Statement>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
        span: Span,
    },
    /// `return;` or `return expr;`
    Return { value: Option<Expr>, span: Span },
    Break { span: Span },
    Continue { span: Span },
}

/// An `if` or `else if` arm.
#[derive(Debug, Clone)]
pub struct IfArm {
    pub condition: Expr,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub name: String,
    pub name_span: Span,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit {
        /// Held as i64 so out-of-range literals survive until sema rejects
        /// them with a proper diagnostic.
        value: i64,
        span: Span,
    },
    Var {
        name: String,
        span: Span,
    },
    Call(CallExpr),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit { span, .. }
            | Expr::Var { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. } => *span,
            Expr::Call(call) => call.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
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
pub enum UnOp {
    /// Bitwise not, `~`.
    Not,
    /// Arithmetic negation, unary `-`.
    Neg,
}

// ── Pretty printing ─────────────────────────────────────
//
// Prints a parseable rendition of the tree. Expressions are fully
// parenthesised so that re-parsing the output reproduces the exact same
// grouping regardless of operator precedence.

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&",
            BinOp::Or => "|",
        })
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnOp::Not => "~",
            UnOp::Neg => "-",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLit { value, .. } => write!(f, "{value}"),
            Expr::Var { name, .. } => f.write_str(name),
            Expr::Call(call) => write!(f, "{call}"),
            Expr::Unary { op, operand, .. } => write!(f, "{op}({operand})"),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
        }
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &[Statement], indent: usize) -> fmt::Result {
    writeln!(f, "{{")?;
    for statement in block {
        write_statement(f, statement, indent + 1)?;
    }
    write!(f, "{:indent$}}}", "", indent = indent * 4)
}

fn write_statement(f: &mut fmt::Formatter<'_>, statement: &Statement, indent: usize) -> fmt::Result {
    write!(f, "{:indent$}", "", indent = indent * 4)?;
    match statement {
        Statement::Assign { name, expr, .. } => writeln!(f, "{name} = {expr};"),
        Statement::CompoundAssign { name, op, expr, .. } => writeln!(f, "{name} {op}= {expr};"),
        Statement::Call { call, .. } => writeln!(f, "{call};"),
        Statement::If {
            arms, else_body, ..
        } => {
            for (idx, arm) in arms.iter().enumerate() {
                if idx > 0 {
                    f.write_str(" else ")?;
                }
                write!(f, "if {} ", arm.condition)?;
                write_block(f, &arm.body, indent)?;
            }
            if let Some(else_body) = else_body {
                f.write_str(" else ")?;
                write_block(f, else_body, indent)?;
            }
            writeln!(f)
        }
        Statement::While {
            condition, body, ..
        } => {
            write!(f, "while {condition} ")?;
            write_block(f, body, indent)?;
            writeln!(f)
        }
        Statement::Return { value: None, .. } => writeln!(f, "return;"),
        Statement::Return {
            value: Some(expr), ..
        } => writeln!(f, "return {expr};"),
        Statement::Break { .. } => writeln!(f, "break;"),
        Statement::Continue { .. } => writeln!(f, "continue;"),
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.returns_value { "int" } else { "void" };
        write!(f, "{kind} {}(", self.name)?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&param.name)?;
        }
        f.write_str(") ")?;
        write_block(f, &self.body, 0)?;
        writeln!(f)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, function) in self.functions.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
