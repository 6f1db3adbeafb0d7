use crate::py::ast::*;
use crate::utils::ast::*;
use crate::utils::info::*;

pub fn i() -> Info {
    Info::default()
}

pub fn var(s: &str) -> Expr {
    Expr::Name {id: s.to_string(), i: i()}
}

pub fn int(v: i128) -> Expr {
    Expr::Int {v, i: i()}
}

pub fn float(v: f64) -> Expr {
    Expr::Float {v, i: i()}
}

pub fn boolean(v: bool) -> Expr {
    Expr::Bool {v, i: i()}
}

pub fn unop(op: UnOp, arg: Expr) -> Expr {
    Expr::UnOp {op, arg: Box::new(arg), i: i()}
}

pub fn binop(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), i: i()}
}

pub fn boolop(op: BinOp, values: Vec<Expr>) -> Expr {
    Expr::BoolOp {op, values, i: i()}
}

pub fn compare(lhs: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    let (ops, comparators) = rest.into_iter().unzip();
    Expr::Compare {lhs: Box::new(lhs), ops, comparators, i: i()}
}

pub fn subscript(target: Expr, idx: Expr) -> Expr {
    Expr::Subscript {target: Box::new(target), idx: Box::new(idx), i: i()}
}

pub fn slice(lo: Option<Expr>, hi: Option<Expr>, step: Option<Expr>) -> Expr {
    Expr::Slice {
        lo: lo.map(Box::new),
        hi: hi.map(Box::new),
        step: step.map(Box::new),
        i: i()
    }
}

pub fn tuple(elems: Vec<Expr>) -> Expr {
    Expr::Tuple {elems, i: i()}
}

pub fn attr(value: Expr, attr: &str) -> Expr {
    Expr::Attribute {value: Box::new(value), attr: attr.to_string(), i: i()}
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {func: Box::new(func), args, kwargs: vec![], i: i()}
}

pub fn call_kw(func: Expr, args: Vec<Expr>, kwargs: Vec<(&str, Expr)>) -> Expr {
    let kwargs = kwargs.into_iter()
        .map(|(id, value)| Keyword {id: id.to_string(), value, i: i()})
        .collect::<Vec<Keyword>>();
    Expr::Call {func: Box::new(func), args, kwargs, i: i()}
}

pub fn np_call(f: &str, args: Vec<Expr>) -> Expr {
    call(attr(var("np"), f), args)
}

// Builds an annotation such as 'int32[M, N]', where dimensions are given either as shape
// symbols or as integer literals.
pub fn tensor_ann(sz: &str, dims: Vec<Expr>) -> Expr {
    let idx = if dims.len() == 1 {
        dims.into_iter().next().unwrap()
    } else {
        tuple(dims)
    };
    subscript(var(sz), idx)
}

pub fn scalar_ann(sz: &str) -> Expr {
    var(sz)
}

pub fn assign(dst: Expr, expr: Expr) -> Stmt {
    Stmt::Assign {dst, expr, i: i()}
}

pub fn ann_assign(dst: Expr, ann: Expr, expr: Expr) -> Stmt {
    Stmt::AnnAssign {dst, ann, expr: Some(expr), i: i()}
}

pub fn aug_assign(dst: Expr, op: BinOp, expr: Expr) -> Stmt {
    Stmt::AugAssign {dst, op, expr, i: i()}
}

pub fn ret(e: Expr) -> Stmt {
    Stmt::Return {value: Some(e), i: i()}
}

pub fn pass() -> Stmt {
    Stmt::Pass {i: i()}
}

pub fn param(id: &str, ann: Expr) -> Param {
    Param {id: id.to_string(), ann: Some(ann), i: i()}
}

pub fn untyped_param(id: &str) -> Param {
    Param {id: id.to_string(), ann: None, i: i()}
}

pub fn fun_def(id: &str, params: Vec<Param>, ret: ReturnAnnotation, body: Vec<Stmt>) -> FunDef {
    FunDef {id: id.to_string(), params, ret, body, i: i()}
}

pub fn returns(e: Expr) -> ReturnAnnotation {
    ReturnAnnotation::Type(e)
}
