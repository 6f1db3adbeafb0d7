use crate::graph::types::Literal;
use crate::utils::ast::{BinOp, ElemSize};

fn min_value(sz: &ElemSize) -> Literal {
    match sz {
        ElemSize::Bool => Literal::Bool(false),
        ElemSize::I8 => Literal::Int(i8::MIN as i64),
        ElemSize::I16 => Literal::Int(i16::MIN as i64),
        ElemSize::I32 => Literal::Int(i32::MIN as i64),
        ElemSize::I64 => Literal::Int(i64::MIN),
        ElemSize::F16 => Literal::Float(-65504.0),
        ElemSize::F32 => Literal::Float(f32::MIN as f64),
        ElemSize::F64 => Literal::Float(f64::MIN),
    }
}

fn max_value(sz: &ElemSize) -> Literal {
    match sz {
        ElemSize::Bool => Literal::Bool(true),
        ElemSize::I8 => Literal::Int(i8::MAX as i64),
        ElemSize::I16 => Literal::Int(i16::MAX as i64),
        ElemSize::I32 => Literal::Int(i32::MAX as i64),
        ElemSize::I64 => Literal::Int(i64::MAX),
        ElemSize::F16 => Literal::Float(65504.0),
        ElemSize::F32 => Literal::Float(f32::MAX as f64),
        ElemSize::F64 => Literal::Float(f64::MAX),
    }
}

fn literal_of(v: i64, sz: &ElemSize) -> Literal {
    match sz {
        ElemSize::Bool => Literal::Bool(v != 0),
        _ if sz.is_floating_point() => Literal::Float(v as f64),
        _ => Literal::Int(v)
    }
}

/// The value an accumulator of the given element size is initialized to when reducing with the
/// given operator, such that combining it with any element yields that element.
pub fn neutral_element(op: &BinOp, sz: &ElemSize) -> Option<Literal> {
    match op {
        BinOp::Add => Some(literal_of(0, sz)),
        BinOp::Mul => Some(literal_of(1, sz)),
        BinOp::Max => Some(min_value(sz)),
        BinOp::Min => Some(max_value(sz)),
        _ => None
    }
}

/// The element size of the accumulator used when reducing elements of the given size. Sums and
/// products of integers accumulate in 64 bits, while all other reductions keep the element size.
pub fn accumulator_elem_size(op: &BinOp, sz: &ElemSize) -> ElemSize {
    match op {
        BinOp::Add | BinOp::Mul if !sz.is_floating_point() => ElemSize::I64,
        _ => *sz
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use strum::IntoEnumIterator;

    #[test]
    fn neutral_elements_exist_for_reductions() {
        for sz in ElemSize::iter() {
            for op in [BinOp::Add, BinOp::Mul, BinOp::Max, BinOp::Min] {
                assert!(neutral_element(&op, &sz).is_some());
            }
            assert!(neutral_element(&BinOp::Sub, &sz).is_none());
        }
    }

    #[test]
    fn integer_sums_widen() {
        assert_eq!(accumulator_elem_size(&BinOp::Add, &ElemSize::I32), ElemSize::I64);
        assert_eq!(accumulator_elem_size(&BinOp::Mul, &ElemSize::Bool), ElemSize::I64);
        assert_eq!(accumulator_elem_size(&BinOp::Add, &ElemSize::F16), ElemSize::F16);
        assert_eq!(accumulator_elem_size(&BinOp::Max, &ElemSize::I8), ElemSize::I8);
    }

    #[test]
    fn max_starts_from_lowest_value() {
        assert_eq!(neutral_element(&BinOp::Max, &ElemSize::I16), Some(Literal::Int(-32768)));
        assert_eq!(neutral_element(&BinOp::Min, &ElemSize::I8), Some(Literal::Int(127)));
        assert_eq!(neutral_element(&BinOp::Add, &ElemSize::F32), Some(Literal::Float(0.0)));
    }
}
