use crate::kernel_range_error;
use crate::utils::ast::ElemSize;
use crate::utils::err::*;
use crate::utils::info::Info;
use super::ir::NodeId;

use itertools::Itertools;

use std::fmt;

/// A dimension of a tensor shape. Symbolic dimensions are introduced by shape symbols in
/// parameter annotations and are identified by their name. A dimension may also be computed
/// within the graph, in which case it refers to the scalar node holding its size.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dim {
    Const(i64),
    Sym {name: String},
    Node(NodeId),
}

impl Dim {
    pub fn sym(name: &str) -> Dim {
        Dim::Sym {name: name.to_string()}
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Dim::Const(1))
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Dim::Const(_))
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dim::Const(n) => write!(f, "{n}"),
            Dim::Sym {name, ..} => write!(f, "{name}"),
            Dim::Node(id) => write!(f, "{id}"),
        }
    }
}

pub fn dims_compatible(l: &Dim, r: &Dim) -> bool {
    l == r || l.is_one() || r.is_one()
}

/// Determines whether two shapes can be combined in an elementwise operation. Shapes are aligned
/// on their trailing dimensions, and the missing leading dimensions of the shorter shape are
/// broadcast.
pub fn shapes_compatible(l: &[Dim], r: &[Dim]) -> bool {
    l.iter().rev()
        .zip(r.iter().rev())
        .all(|(l, r)| dims_compatible(l, r))
}

pub fn broadcast_shape(l: &[Dim], r: &[Dim]) -> Option<Vec<Dim>> {
    if !shapes_compatible(l, r) {
        return None;
    }
    let n = l.len().max(r.len());
    let lookup = |sh: &[Dim], idx: usize| -> Option<Dim> {
        let ofs = n - sh.len();
        if idx >= ofs { Some(sh[idx - ofs].clone()) } else { None }
    };
    let shape = (0..n)
        .map(|idx| match (lookup(l, idx), lookup(r, idx)) {
            (Some(l), Some(r)) if l.is_one() => r,
            (Some(l), _) => l,
            (None, Some(r)) => r,
            (None, None) => Dim::Const(1)
        })
        .collect::<Vec<Dim>>();
    Some(shape)
}

#[derive(Clone, Debug, PartialEq)]
pub enum KernelType {
    Scalar(ElemSize),
    Tensor {sz: ElemSize, shape: Vec<Dim>},
}

impl KernelType {
    pub fn elem_size(&self) -> ElemSize {
        match self {
            KernelType::Scalar(sz) => *sz,
            KernelType::Tensor {sz, ..} => *sz,
        }
    }

    pub fn shape(&self) -> &[Dim] {
        match self {
            KernelType::Scalar(_) => &[],
            KernelType::Tensor {shape, ..} => shape,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, KernelType::Scalar(_))
    }

    /// Same element type, same rank and pairwise compatible dimensions.
    pub fn is_compatible(&self, other: &KernelType) -> bool {
        self.elem_size() == other.elem_size() &&
            self.is_scalar() == other.is_scalar() &&
            self.rank() == other.rank() &&
            self.shape().iter().zip(other.shape().iter()).all(|(l, r)| dims_compatible(l, r))
    }

    /// Equality ignoring the element type. An assignment between types related this way is
    /// permitted, and the value is converted when the graph is lowered.
    pub fn shape_eq(&self, other: &KernelType) -> bool {
        self.is_scalar() == other.is_scalar() && self.shape() == other.shape()
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelType::Scalar(sz) => write!(f, "{sz}"),
            KernelType::Tensor {sz, shape} => write!(f, "{sz}[{}]", shape.iter().join(", ")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Literal {
    pub fn as_i64(&self) -> i64 {
        match self {
            Literal::Bool(b) => *b as i64,
            Literal::Int(v) => *v,
            Literal::Float(v) => *v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Literal::Bool(b) => if *b { 1.0 } else { 0.0 },
            Literal::Int(v) => *v as f64,
            Literal::Float(v) => *v,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Bool(b) => if *b { write!(f, "True") } else { write!(f, "False") },
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
        }
    }
}

const INT_SIZES: [(ElemSize, i128, i128); 4] = [
    (ElemSize::I8, i8::MIN as i128, i8::MAX as i128),
    (ElemSize::I16, i16::MIN as i128, i16::MAX as i128),
    (ElemSize::I32, i32::MIN as i128, i32::MAX as i128),
    (ElemSize::I64, i64::MIN as i128, i64::MAX as i128),
];

const FLOAT_SIZES: [(ElemSize, f64); 3] = [
    (ElemSize::F16, 65504.0),
    (ElemSize::F32, f32::MAX as f64),
    (ElemSize::F64, f64::MAX),
];

/// The narrowest signed integer type containing the given literal value.
pub fn dtype_of_int(v: i128, i: &Info) -> CompileResult<ElemSize> {
    match INT_SIZES.iter().find(|(_, lo, hi)| *lo <= v && v <= *hi) {
        Some((sz, _, _)) => Ok(*sz),
        None => kernel_range_error!(i, "Integer literal {v} cannot be represented by any \
                                        supported integer type")
    }
}

/// The narrowest floating-point type whose range contains the given literal value.
pub fn dtype_of_float(v: f64, i: &Info) -> CompileResult<ElemSize> {
    match FLOAT_SIZES.iter().find(|(_, max)| v.abs() <= *max) {
        Some((sz, _)) => Ok(*sz),
        None => kernel_range_error!(i, "Float literal {v} cannot be represented by any \
                                        supported floating-point type")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::*;

    fn sample_dims() -> Vec<Dim> {
        vec![
            Dim::Const(1), Dim::Const(3), Dim::Const(4),
            Dim::sym("M"), Dim::sym("N"), Dim::Node(NodeId(7))
        ]
    }

    fn sample_shapes() -> Vec<Vec<Dim>> {
        let dims = sample_dims();
        let mut shapes = vec![vec![]];
        for d in dims.iter() {
            shapes.push(vec![d.clone()]);
            for d2 in dims.iter() {
                shapes.push(vec![d.clone(), d2.clone()]);
            }
        }
        shapes
    }

    #[test]
    fn dims_compatibility_is_symmetric() {
        for l in sample_dims() {
            for r in sample_dims() {
                assert_eq!(dims_compatible(&l, &r), dims_compatible(&r, &l));
            }
        }
    }

    #[test]
    fn shape_compatibility_is_symmetric() {
        let shapes = sample_shapes();
        for l in shapes.iter() {
            for r in shapes.iter() {
                assert_eq!(shapes_compatible(l, r), shapes_compatible(r, l), "{l:?} {r:?}");
            }
        }
    }

    #[test]
    fn symbols_compare_by_name() {
        assert_eq!(Dim::Sym {name: "M".to_string()}, Dim::sym("M"));
        assert_ne!(Dim::sym("M"), Dim::sym("N"));
        assert_ne!(Dim::sym("M"), Dim::Const(3));
    }

    #[test]
    fn broadcast_trailing_dimensions() {
        let l = vec![Dim::sym("M"), Dim::sym("N")];
        let r = vec![Dim::sym("N")];
        assert_eq!(broadcast_shape(&l, &r), Some(l.clone()));
        assert_eq!(broadcast_shape(&r, &l), Some(l.clone()));
    }

    #[test]
    fn broadcast_singleton_dimension() {
        let l = vec![Dim::Const(1), Dim::Const(4)];
        let r = vec![Dim::Const(3), Dim::Const(1)];
        assert_eq!(broadcast_shape(&l, &r), Some(vec![Dim::Const(3), Dim::Const(4)]));
    }

    #[test]
    fn broadcast_incompatible_shapes() {
        let l = vec![Dim::sym("M"), Dim::sym("N")];
        let r = vec![Dim::sym("M")];
        assert_eq!(broadcast_shape(&l, &r), None);
    }

    #[test]
    fn assignment_tolerates_dtype_mismatch() {
        let shape = vec![Dim::sym("M")];
        let l = KernelType::Tensor {sz: ElemSize::I32, shape: shape.clone()};
        let r = KernelType::Tensor {sz: ElemSize::F32, shape};
        assert!(l.shape_eq(&r));
        assert!(!l.is_compatible(&r));
        assert!(!l.shape_eq(&KernelType::Scalar(ElemSize::I32)));
    }

    #[test]
    fn narrowest_integer_type() {
        let i = Info::default();
        for v in (i8::MIN as i128)..=(i8::MAX as i128) {
            assert_eq!(dtype_of_int(v, &i).unwrap(), ElemSize::I8);
        }
        assert_eq!(dtype_of_int(128, &i).unwrap(), ElemSize::I16);
        assert_eq!(dtype_of_int(-32769, &i).unwrap(), ElemSize::I32);
        assert_eq!(dtype_of_int(1 << 40, &i).unwrap(), ElemSize::I64);
    }

    #[test]
    fn integer_literal_out_of_range() {
        let i = Info::default();
        assert_error_kind(dtype_of_int(i64::MAX as i128 + 1, &i), ErrorKind::Range);
        assert_error_kind(dtype_of_int(i64::MIN as i128 - 1, &i), ErrorKind::Range);
    }

    #[test]
    fn narrowest_float_type() {
        let i = Info::default();
        assert_eq!(dtype_of_float(1.5, &i).unwrap(), ElemSize::F16);
        assert_eq!(dtype_of_float(-65504.0, &i).unwrap(), ElemSize::F16);
        assert_eq!(dtype_of_float(1e10, &i).unwrap(), ElemSize::F32);
        assert_eq!(dtype_of_float(1e300, &i).unwrap(), ElemSize::F64);
        assert_error_kind(dtype_of_float(f64::INFINITY, &i), ErrorKind::Range);
        assert_error_kind(dtype_of_float(f64::NAN, &i), ErrorKind::Range);
    }
}
