use crate::utils::ast::*;
use crate::utils::info::*;

use itertools::Itertools;

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub id: String,
    pub value: Expr,
    pub i: Info
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Name {id: String, i: Info},
    Int {v: i128, i: Info},
    Float {v: f64, i: Info},
    Bool {v: bool, i: Info},
    String {v: String, i: Info},
    None {i: Info},
    UnOp {op: UnOp, arg: Box<Expr>, i: Info},
    BinOp {lhs: Box<Expr>, op: BinOp, rhs: Box<Expr>, i: Info},
    BoolOp {op: BinOp, values: Vec<Expr>, i: Info},
    Compare {lhs: Box<Expr>, ops: Vec<BinOp>, comparators: Vec<Expr>, i: Info},
    Subscript {target: Box<Expr>, idx: Box<Expr>, i: Info},
    Slice {lo: Option<Box<Expr>>, hi: Option<Box<Expr>>, step: Option<Box<Expr>>, i: Info},
    Tuple {elems: Vec<Expr>, i: Info},
    Attribute {value: Box<Expr>, attr: String, i: Info},
    Call {func: Box<Expr>, args: Vec<Expr>, kwargs: Vec<Keyword>, i: Info},
    // Any expression form of the host language outside the kernel subset, kept by its node
    // name so the builder can report it.
    Unsupported {kind: String, i: Info},
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Name {id, ..} => write!(f, "{id}"),
            Expr::Int {v, ..} => write!(f, "{v}"),
            Expr::Float {v, ..} => write!(f, "{v}"),
            Expr::Bool {v, ..} => if *v { write!(f, "True") } else { write!(f, "False") },
            Expr::String {v, ..} => write!(f, "\"{v}\""),
            Expr::None {..} => write!(f, "None"),
            Expr::UnOp {op, arg, ..} => write!(f, "{op}{arg}"),
            Expr::BinOp {lhs, op, rhs, ..} => write!(f, "({lhs} {op} {rhs})"),
            Expr::BoolOp {op, values, ..} => {
                let sep = format!(" {op} ");
                write!(f, "({})", values.iter().join(&sep))
            },
            Expr::Compare {lhs, ops, comparators, ..} => {
                write!(f, "({lhs}")?;
                for (op, c) in ops.iter().zip(comparators.iter()) {
                    write!(f, " {op} {c}")?;
                }
                write!(f, ")")
            },
            Expr::Subscript {target, idx, ..} => write!(f, "{target}[{idx}]"),
            Expr::Slice {lo, hi, step, ..} => {
                let opt = |e: &Option<Box<Expr>>| match e {
                    Some(e) => e.to_string(),
                    None => String::new()
                };
                write!(f, "{0}:{1}", opt(lo), opt(hi))?;
                if step.is_some() {
                    write!(f, ":{0}", opt(step))?;
                }
                Ok(())
            },
            Expr::Tuple {elems, ..} => write!(f, "({})", elems.iter().join(", ")),
            Expr::Attribute {value, attr, ..} => write!(f, "{value}.{attr}"),
            Expr::Call {func, args, kwargs, ..} => {
                let args = args.iter()
                    .map(|a| a.to_string())
                    .chain(kwargs.iter().map(|kw| format!("{0}={1}", kw.id, kw.value)))
                    .join(", ");
                write!(f, "{func}({args})")
            },
            Expr::Unsupported {kind, ..} => write!(f, "<{kind}>"),
        }
    }
}

impl InfoNode for Expr {
    fn get_info(&self) -> Info {
        match self {
            Expr::Name {i, ..} => i.clone(),
            Expr::Int {i, ..} => i.clone(),
            Expr::Float {i, ..} => i.clone(),
            Expr::Bool {i, ..} => i.clone(),
            Expr::String {i, ..} => i.clone(),
            Expr::None {i} => i.clone(),
            Expr::UnOp {i, ..} => i.clone(),
            Expr::BinOp {i, ..} => i.clone(),
            Expr::BoolOp {i, ..} => i.clone(),
            Expr::Compare {i, ..} => i.clone(),
            Expr::Subscript {i, ..} => i.clone(),
            Expr::Slice {i, ..} => i.clone(),
            Expr::Tuple {i, ..} => i.clone(),
            Expr::Attribute {i, ..} => i.clone(),
            Expr::Call {i, ..} => i.clone(),
            Expr::Unsupported {i, ..} => i.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign {dst: Expr, expr: Expr, i: Info},
    AnnAssign {dst: Expr, ann: Expr, expr: Option<Expr>, i: Info},
    AugAssign {dst: Expr, op: BinOp, expr: Expr, i: Info},
    Return {value: Option<Expr>, i: Info},
    Expr {e: Expr, i: Info},
    Pass {i: Info},
    Delete {i: Info},
    If {i: Info},
    Loop {i: Info},
    Unsupported {kind: String, i: Info},
}

impl InfoNode for Stmt {
    fn get_info(&self) -> Info {
        match self {
            Stmt::Assign {i, ..} => i.clone(),
            Stmt::AnnAssign {i, ..} => i.clone(),
            Stmt::AugAssign {i, ..} => i.clone(),
            Stmt::Return {i, ..} => i.clone(),
            Stmt::Expr {i, ..} => i.clone(),
            Stmt::Pass {i} => i.clone(),
            Stmt::Delete {i} => i.clone(),
            Stmt::If {i} => i.clone(),
            Stmt::Loop {i} => i.clone(),
            Stmt::Unsupported {i, ..} => i.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub id: String,
    pub ann: Option<Expr>,
    pub i: Info
}

/// The return annotation of a kernel function. A missing annotation makes the return type
/// depend on the call site, while an explicit `None` declares a function returning nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnAnnotation {
    Missing,
    Void,
    Type(Expr)
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunDef {
    pub id: String,
    pub params: Vec<Param>,
    pub ret: ReturnAnnotation,
    pub body: Vec<Stmt>,
    pub i: Info
}

impl FunDef {
    pub fn is_template(&self) -> bool {
        self.params.iter().any(|p| p.ann.is_none())
    }
}

impl InfoNode for FunDef {
    fn get_info(&self) -> Info {
        self.i.clone()
    }
}

pub type Ast = Vec<FunDef>;
