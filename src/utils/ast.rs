use lazy_static::lazy_static;
use pyo3::prelude::*;
use strum_macros::EnumIter;

use std::collections::BTreeMap;
use std::fmt;

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum ElemSize {
    #[default] Bool, I8, I16, I32, I64, F16, F32, F64
}

lazy_static! {
    static ref TYPE_NAMES: BTreeMap<&'static str, ElemSize> = vec![
        ("bool", ElemSize::Bool),
        ("int8", ElemSize::I8),
        ("int16", ElemSize::I16),
        ("int32", ElemSize::I32),
        ("int64", ElemSize::I64),
        ("float16", ElemSize::F16),
        ("float32", ElemSize::F32),
        ("float64", ElemSize::F64),
    ].into_iter().collect::<_>();
}

impl ElemSize {
    // Looks up the element size referred to by a kernel type name, as used in annotations.
    pub fn from_type_name(s: &str) -> Option<ElemSize> {
        TYPE_NAMES.get(s).copied()
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ElemSize::Bool)
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, ElemSize::I8 | ElemSize::I16 | ElemSize::I32 | ElemSize::I64)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, ElemSize::F16 | ElemSize::F32 | ElemSize::F64)
    }

    pub fn bits(&self) -> usize {
        match self {
            ElemSize::Bool => 1,
            ElemSize::I8 => 8,
            ElemSize::I16 | ElemSize::F16 => 16,
            ElemSize::I32 | ElemSize::F32 => 32,
            ElemSize::I64 | ElemSize::F64 => 64,
        }
    }

    // The least upper bound of two element sizes. Within the integer and floating-point
    // categories, the wider type is chosen. Mixing integers and floats yields the float type,
    // and booleans are promoted to the type of the other operand.
    pub fn lub(&self, other: &ElemSize) -> ElemSize {
        match (self, other) {
            (ElemSize::Bool, _) => *other,
            (_, ElemSize::Bool) => *self,
            (l, r) if l.is_floating_point() == r.is_floating_point() => {
                if l.bits() >= r.bits() { *l } else { *r }
            },
            (l, _) if l.is_floating_point() => *l,
            (_, r) => *r
        }
    }
}

impl fmt::Display for ElemSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElemSize::Bool => write!(f, "bool"),
            ElemSize::I8 => write!(f, "int8"),
            ElemSize::I16 => write!(f, "int16"),
            ElemSize::I32 => write!(f, "int32"),
            ElemSize::I64 => write!(f, "int64"),
            ElemSize::F16 => write!(f, "float16"),
            ElemSize::F32 => write!(f, "float32"),
            ElemSize::F64 => write!(f, "float64"),
        }
    }
}

#[pymethods]
impl ElemSize {
    #[new]
    fn new(s: &str) -> PyResult<ElemSize> {
        ElemSize::from_type_name(s).ok_or_else(|| {
            pyo3::exceptions::PyValueError::new_err(format!("Unknown kernel type name {s}"))
        })
    }

    fn __str__(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnOp {
    Sub, Not, BitNeg
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnOp::Sub => write!(f, "-"),
            UnOp::Not => write!(f, "not "),
            UnOp::BitNeg => write!(f, "~"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOp {
    Add, Sub, Mul, FloorDiv, Div, Rem, Pow, And, Or,
    BitAnd, BitOr, BitXor,
    Eq, Neq, Leq, Geq, Lt, Gt,
    Max, Min
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq | BinOp::Leq | BinOp::Geq | BinOp::Lt | BinOp::Gt)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }

    // The element size of the result of applying the operator to operands of the given sizes.
    pub fn result_elem_size(&self, lhs: &ElemSize, rhs: &ElemSize) -> ElemSize {
        if self.is_comparison() || self.is_boolean() {
            ElemSize::Bool
        } else {
            let sz = lhs.lub(rhs);
            match self {
                BinOp::Div if !sz.is_floating_point() => ElemSize::F64,
                _ => sz
            }
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::FloorDiv => write!(f, "//"),
            BinOp::Div => write!(f, "/"),
            BinOp::Rem => write!(f, "%"),
            BinOp::Pow => write!(f, "**"),
            BinOp::And => write!(f, "and"),
            BinOp::Or => write!(f, "or"),
            BinOp::BitAnd => write!(f, "&"),
            BinOp::BitOr => write!(f, "|"),
            BinOp::BitXor => write!(f, "^"),
            BinOp::Eq => write!(f, "=="),
            BinOp::Neq => write!(f, "!="),
            BinOp::Leq => write!(f, "<="),
            BinOp::Geq => write!(f, ">="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Gt => write!(f, ">"),
            BinOp::Max => write!(f, "max"),
            BinOp::Min => write!(f, "min"),
        }
    }
}
