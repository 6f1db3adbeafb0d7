use crate::graph::types::Literal;
use crate::utils::name::Name;

pub use crate::utils::ast::ElemSize;

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Index,
    Scalar(ElemSize),
    // A buffer with the given dimensions, where unknown dimensions are represented by None.
    MemRef {sz: ElemSize, shape: Vec<Option<i64>>},
    // A view of a buffer with dynamic strides and offset, as produced by a subview.
    StridedMemRef {sz: ElemSize, rank: usize},
}

impl Type {
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Scalar(sz) if sz.is_floating_point())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArithOp {
    AddI, AddF, SubI, SubF, MulI, MulF, DivF, FloorDivSI, RemSI, RemF,
    IPowI, PowF, AndI, OrI, XOrI, MaxSI, MinSI, MaximumF, MinimumF,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp {
    NegF, Floor,
}

// Comparison predicates, printed as the signed-integer or the floating-point variant depending
// on the type of the operands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CmpPredicate {
    Eq, Ne, Lt, Le, Gt, Ge,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CastOp {
    ExtSI, ExtUI, TruncI, SIToFP, UIToFP, FPToSI, ExtF, TruncF, IndexCast,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AffineExpr {
    Dim(usize),
    Zero,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AffineMap {
    pub ndims: usize,
    pub results: Vec<AffineExpr>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IteratorType {
    Parallel,
}

/// A value of the emitted program together with its type.
#[derive(Clone, Debug, PartialEq)]
pub struct Operand {
    pub id: Name,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Constant {dst: Name, value: Literal, ty: Type},
    Arith {dst: Name, op: ArithOp, lhs: Name, rhs: Name, ty: Type},
    Unary {dst: Name, op: UnaryOp, arg: Name, ty: Type},
    Compare {dst: Name, pred: CmpPredicate, lhs: Name, rhs: Name, ty: Type},
    Select {dst: Name, cond: Name, thn: Name, els: Name, ty: Type},
    Cast {dst: Name, op: CastOp, arg: Name, from: Type, to: Type},
    Dim {dst: Name, src: Operand, axis: Name},
    Alloc {dst: Name, sizes: Vec<Name>, ty: Type},
    Alloca {dst: Name, ty: Type},
    Load {dst: Name, src: Operand, indices: Vec<Name>},
    Store {value: Name, dst: Operand, indices: Vec<Name>},
    Copy {src: Operand, dst: Operand},
    SubView {
        dst: Name, src: Operand, offsets: Vec<Name>, sizes: Vec<Name>, strides: Vec<Name>,
        ty: Type
    },
    CollapseShape {dst: Name, src: Operand, reassociation: Vec<Vec<usize>>, ty: Type},
    Fill {value: Operand, dst: Operand},
    Generic {
        maps: Vec<AffineMap>,
        iterators: Vec<IteratorType>,
        ins: Vec<Operand>,
        outs: Vec<Operand>,
        args: Vec<Operand>,
        body: Vec<Stmt>,
    },
    Reduce {
        ins: Vec<Operand>,
        outs: Vec<Operand>,
        dims: Vec<usize>,
        args: Vec<Operand>,
        body: Vec<Stmt>,
    },
    Yield {values: Vec<Operand>},
    Return {values: Vec<Operand>},
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunDef {
    pub id: String,
    pub params: Vec<Operand>,
    pub results: Vec<Type>,
    pub body: Vec<Stmt>,
}
