use crate::kernel_internal_error;
use crate::kernel_runtime_error;
use crate::utils::ast::*;
use crate::utils::err::*;
use crate::utils::info::Info;
use super::builder::FunctionGraph;
use super::ir::*;
use super::types::*;

use itertools::Itertools;

use std::collections::BTreeMap;

/// A concrete value passed to or produced by the reference evaluator. Tensors store their
/// elements in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(Literal),
    Tensor {shape: Vec<usize>, data: Vec<Literal>},
}

impl Value {
    pub fn tensor(shape: Vec<usize>, data: Vec<Literal>) -> Value {
        Value::Tensor {shape, data}
    }

    pub fn ints(shape: Vec<usize>, data: &[i64]) -> Value {
        Value::tensor(shape, data.iter().map(|v| Literal::Int(*v)).collect())
    }

    pub fn floats(shape: Vec<usize>, data: &[f64]) -> Value {
        Value::tensor(shape, data.iter().map(|v| Literal::Float(*v)).collect())
    }

    fn shape(&self) -> &[usize] {
        match self {
            Value::Scalar(_) => &[],
            Value::Tensor {shape, ..} => shape,
        }
    }
}

fn is_truthy(v: &Literal) -> bool {
    match v {
        Literal::Bool(b) => *b,
        Literal::Int(v) => *v != 0,
        Literal::Float(v) => *v != 0.0,
    }
}

/// Converts a value to the representation of the given element size, wrapping integers to the
/// width of the target.
pub fn convert(v: Literal, sz: &ElemSize) -> Literal {
    match sz {
        ElemSize::Bool => Literal::Bool(is_truthy(&v)),
        ElemSize::I8 => Literal::Int(v.as_i64() as i8 as i64),
        ElemSize::I16 => Literal::Int(v.as_i64() as i16 as i64),
        ElemSize::I32 => Literal::Int(v.as_i64() as i32 as i64),
        ElemSize::I64 => Literal::Int(v.as_i64()),
        ElemSize::F16 | ElemSize::F64 => Literal::Float(v.as_f64()),
        ElemSize::F32 => Literal::Float(v.as_f64() as f32 as f64),
    }
}

fn floor_div(l: i64, r: i64) -> i64 {
    let q = l.wrapping_div(r);
    if l.wrapping_rem(r) != 0 && ((l < 0) != (r < 0)) { q - 1 } else { q }
}

fn floor_mod(l: i64, r: i64) -> i64 {
    let m = l.wrapping_rem(r);
    if m != 0 && ((m < 0) != (r < 0)) { m + r } else { m }
}

fn apply_unop(op: &UnOp, v: Literal, sz: &ElemSize) -> CompileResult<Literal> {
    let r = match (op, v) {
        (UnOp::Sub, Literal::Float(f)) => Literal::Float(-f),
        (UnOp::Sub, v) => Literal::Int(v.as_i64().wrapping_neg()),
        (UnOp::Not, v) => Literal::Bool(!is_truthy(&v)),
        (UnOp::BitNeg, Literal::Bool(b)) => Literal::Bool(!b),
        (UnOp::BitNeg, Literal::Int(i)) => Literal::Int(!i),
        (UnOp::BitNeg, Literal::Float(_)) => {
            return kernel_internal_error!("Bitwise negation of a floating-point value")
        }
    };
    Ok(convert(r, sz))
}

fn apply_float_binop(op: &BinOp, l: f64, r: f64) -> CompileResult<f64> {
    match op {
        BinOp::Add => Ok(l + r),
        BinOp::Sub => Ok(l - r),
        BinOp::Mul => Ok(l * r),
        BinOp::Div => Ok(l / r),
        BinOp::FloorDiv => Ok((l / r).floor()),
        BinOp::Rem => {
            let m = l % r;
            Ok(if m != 0.0 && ((m < 0.0) != (r < 0.0)) { m + r } else { m })
        },
        BinOp::Pow => Ok(l.powf(r)),
        BinOp::Max => Ok(l.max(r)),
        BinOp::Min => Ok(l.min(r)),
        _ => kernel_internal_error!("Operator {op} is not defined on floating-point values")
    }
}

fn apply_int_binop(op: &BinOp, l: i64, r: i64) -> CompileResult<i64> {
    let i = Info::default();
    match op {
        BinOp::Add => Ok(l.wrapping_add(r)),
        BinOp::Sub => Ok(l.wrapping_sub(r)),
        BinOp::Mul => Ok(l.wrapping_mul(r)),
        BinOp::FloorDiv | BinOp::Rem if r == 0 => {
            kernel_runtime_error!(i, "Integer division by zero")
        },
        BinOp::FloorDiv => Ok(floor_div(l, r)),
        BinOp::Rem => Ok(floor_mod(l, r)),
        BinOp::Pow if r < 0 => {
            kernel_runtime_error!(i, "Integers cannot be raised to the negative power {r}")
        },
        BinOp::Pow => Ok(l.wrapping_pow(r.min(u32::MAX as i64) as u32)),
        BinOp::BitAnd => Ok(l & r),
        BinOp::BitOr => Ok(l | r),
        BinOp::BitXor => Ok(l ^ r),
        BinOp::Max => Ok(l.max(r)),
        BinOp::Min => Ok(l.min(r)),
        _ => kernel_internal_error!("Operator {op} is not defined on integer values")
    }
}

fn apply_binop(op: &BinOp, l: Literal, r: Literal, sz: &ElemSize) -> CompileResult<Literal> {
    let is_float = matches!(l, Literal::Float(_)) || matches!(r, Literal::Float(_));
    if op.is_comparison() {
        let ord = if is_float {
            l.as_f64().partial_cmp(&r.as_f64())
        } else {
            Some(l.as_i64().cmp(&r.as_i64()))
        };
        let b = match (op, ord) {
            (BinOp::Eq, Some(o)) => o.is_eq(),
            (BinOp::Neq, o) => !o.is_some_and(|o| o.is_eq()),
            (BinOp::Lt, Some(o)) => o.is_lt(),
            (BinOp::Leq, Some(o)) => o.is_le(),
            (BinOp::Gt, Some(o)) => o.is_gt(),
            (BinOp::Geq, Some(o)) => o.is_ge(),
            _ => false
        };
        Ok(Literal::Bool(b))
    } else if op.is_boolean() {
        let b = match op {
            BinOp::And => is_truthy(&l) && is_truthy(&r),
            _ => is_truthy(&l) || is_truthy(&r)
        };
        Ok(Literal::Bool(b))
    } else if sz.is_floating_point() {
        let v = apply_float_binop(op, l.as_f64(), r.as_f64())?;
        Ok(convert(Literal::Float(v), sz))
    } else {
        let v = apply_int_binop(op, l.as_i64(), r.as_i64())?;
        Ok(convert(Literal::Int(v), sz))
    }
}

fn row_major_indices(shape: &[usize]) -> Vec<Vec<usize>> {
    shape.iter()
        .map(|n| 0..*n)
        .multi_cartesian_product()
        .collect()
}

fn linear_index(shape: &[usize], idx: &[usize]) -> usize {
    shape.iter()
        .zip(idx.iter())
        .fold(0, |acc, (n, i)| acc * n + i)
}

// Maps an index into the iteration space of an elementwise operator to an index of an operand,
// aligning trailing dimensions and reading the single element of unit dimensions.
fn broadcast_index(shape: &[usize], idx: &[usize]) -> Vec<usize> {
    let ofs = idx.len() - shape.len();
    shape.iter()
        .enumerate()
        .map(|(axis, n)| if *n == 1 { 0 } else { idx[ofs + axis] })
        .collect()
}

struct Evaluator<'a> {
    graph: &'a Graph,
    symbols: BTreeMap<String, usize>,
    scopes: Vec<BTreeMap<NodeId, Value>>,
}

impl<'a> Evaluator<'a> {
    fn lookup(&self, id: NodeId) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(&id))
    }

    fn bind(&mut self, id: NodeId, v: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(id, v);
        }
    }

    fn scalar(&mut self, id: NodeId) -> CompileResult<Literal> {
        match self.eval(id)? {
            Value::Scalar(v) => Ok(v),
            Value::Tensor {..} => kernel_internal_error!("Expected {id} to be a scalar")
        }
    }

    fn index(&mut self, id: NodeId, n: usize) -> CompileResult<usize> {
        let v = self.scalar(id)?.as_i64();
        if v < 0 || v as usize >= n {
            kernel_runtime_error!(Info::default(), "Index {v} is out of bounds for a dimension \
                                                    of size {n}")
        } else {
            Ok(v as usize)
        }
    }

    fn resolve_dim(&mut self, d: &Dim) -> CompileResult<usize> {
        match d {
            Dim::Const(n) => Ok(*n as usize),
            Dim::Sym {name} => match self.symbols.get(name) {
                Some(v) => Ok(*v),
                None => kernel_internal_error!("Unbound shape symbol {name}")
            },
            Dim::Node(id) => Ok(self.scalar(*id)?.as_i64().max(0) as usize),
        }
    }

    fn resolve_shape(&mut self, id: NodeId) -> CompileResult<Vec<usize>> {
        let shape = self.graph.node(id).shape().to_vec();
        shape.iter()
            .map(|d| self.resolve_dim(d))
            .collect::<CompileResult<Vec<usize>>>()
    }

    fn tensor(&mut self, id: NodeId) -> CompileResult<(Vec<usize>, Vec<Literal>)> {
        match self.eval(id)? {
            Value::Tensor {shape, data} => Ok((shape, data)),
            Value::Scalar(_) => kernel_internal_error!("Expected {id} to be a tensor")
        }
    }

    fn eval(&mut self, id: NodeId) -> CompileResult<Value> {
        if let Some(v) = self.lookup(id) {
            return Ok(v.clone());
        }
        let graph = self.graph;
        let node = graph.node(id);
        match (node.value(), node.producer) {
            (Some(v), _) if node.is_internal_constant() => {
                let v = Value::Scalar(convert(v, &node.elem_size()));
                self.bind(id, v.clone());
                Ok(v)
            },
            (_, Some(op)) => {
                self.eval_op(op)?;
                match self.lookup(id) {
                    Some(v) => Ok(v.clone()),
                    None => kernel_internal_error!("Operator did not produce {id}")
                }
            },
            _ => kernel_internal_error!("Node {id} has no value")
        }
    }

    fn eval_body(
        &mut self,
        body: &SubGraph,
        bindings: Vec<(NodeId, Literal)>
    ) -> CompileResult<Vec<Literal>> {
        self.scopes.push(BTreeMap::new());
        for (id, v) in bindings {
            self.bind(id, Value::Scalar(v));
        }
        let result = body.outputs.iter()
            .map(|(inner, outer)| {
                let sz = self.graph.node(*outer).elem_size();
                Ok(convert(self.scalar(*inner)?, &sz))
            })
            .collect::<CompileResult<Vec<Literal>>>();
        self.scopes.pop();
        result
    }

    fn eval_elementwise(&mut self, op: &Op, body: &SubGraph) -> CompileResult<()> {
        for inp in op.inputs.iter() {
            self.eval(*inp)?;
        }
        let out = match body.outputs.first() {
            Some((_, out)) => *out,
            None => return kernel_internal_error!("Elementwise operator without outputs")
        };
        let shape = self.resolve_shape(out)?;
        let operands = body.inputs.iter()
            .map(|(outer, inner)| Ok((*inner, self.tensor(*outer)?)))
            .collect::<CompileResult<Vec<_>>>()?;
        let mut results = vec![vec![]; body.outputs.len()];
        for idx in row_major_indices(&shape) {
            let bindings = operands.iter()
                .map(|(inner, (sh, data))| {
                    let i = linear_index(sh, &broadcast_index(sh, &idx));
                    (*inner, data[i])
                })
                .collect::<Vec<_>>();
            let values = self.eval_body(body, bindings)?;
            for (res, v) in results.iter_mut().zip(values.into_iter()) {
                res.push(v);
            }
        }
        for ((_, outer), data) in body.outputs.iter().zip(results.into_iter()) {
            self.bind(*outer, Value::tensor(shape.clone(), data));
        }
        Ok(())
    }

    fn eval_reduction(&mut self, op: &Op, dims: &[usize], body: &SubGraph) -> CompileResult<()> {
        let (arg, init) = match (op.inputs.as_slice(), body.inputs.as_slice()) {
            ([arg, init], [(_, x), (_, acc)]) => ((*arg, *x), (*init, *acc)),
            _ => return kernel_internal_error!("Malformed reduction operator")
        };
        let dst = match body.outputs.as_slice() {
            [(_, dst)] => *dst,
            _ => return kernel_internal_error!("Malformed reduction operator")
        };
        let (shape, data) = self.tensor(arg.0)?;
        let init_value = self.scalar(init.0)?;
        let out_shape = shape.iter()
            .enumerate()
            .filter(|(axis, _)| !dims.contains(axis))
            .map(|(_, n)| *n)
            .collect::<Vec<usize>>();
        let mut acc = vec![init_value; out_shape.iter().product()];
        for (i, idx) in row_major_indices(&shape).into_iter().enumerate() {
            let out_idx = idx.iter()
                .enumerate()
                .filter(|(axis, _)| !dims.contains(axis))
                .map(|(_, v)| *v)
                .collect::<Vec<usize>>();
            let j = linear_index(&out_shape, &out_idx);
            let values = self.eval_body(body, vec![(arg.1, data[i]), (init.1, acc[j])])?;
            if let Some(v) = values.first() {
                acc[j] = *v;
            }
        }
        let v = if self.graph.is_scalar(dst) {
            Value::Scalar(acc[0])
        } else {
            Value::tensor(out_shape, acc)
        };
        self.bind(dst, v);
        Ok(())
    }

    fn eval_slice(&mut self, op: &Op, indices: &[SliceIndex], sizes: &[Dim]) -> CompileResult<()> {
        let (target, dst) = match (op.inputs.first(), op.outputs.first()) {
            (Some(t), Some(d)) => (*t, *d),
            _ => return kernel_internal_error!("Malformed slice operator")
        };
        let (shape, data) = self.tensor(target)?;
        let sizes = sizes.iter()
            .map(|d| self.resolve_dim(d))
            .collect::<CompileResult<Vec<usize>>>()?;
        let mut starts = vec![];
        for (axis, n) in shape.iter().enumerate() {
            let (start, step) = match indices.get(axis) {
                Some(SliceIndex::Index(i)) => (self.index(*i, *n)? as i64, 1),
                Some(SliceIndex::Range {lower, step, ..}) => {
                    (self.scalar(*lower)?.as_i64(), self.scalar(*step)?.as_i64())
                },
                None => (0, 1)
            };
            starts.push((start, step));
        }
        let mut out = vec![];
        for idx in row_major_indices(&sizes) {
            let src = idx.iter()
                .zip(starts.iter())
                .zip(shape.iter())
                .map(|((i, (start, step)), n)| {
                    let v = start + (*i as i64) * step;
                    if v < 0 || v >= *n as i64 {
                        kernel_runtime_error!(Info::default(), "Slice index {v} is out of \
                                                                bounds for a dimension of size {n}")
                    } else {
                        Ok(v as usize)
                    }
                })
                .collect::<CompileResult<Vec<usize>>>()?;
            out.push(data[linear_index(&shape, &src)]);
        }
        let out_shape = self.resolve_shape(dst)?;
        self.bind(dst, Value::tensor(out_shape, out));
        Ok(())
    }

    fn eval_op(&mut self, id: OpId) -> CompileResult<()> {
        let graph = self.graph;
        let op = graph.op(id);
        let dst = match op.outputs.first() {
            Some(dst) => *dst,
            None => return kernel_internal_error!("Operator without outputs")
        };
        let sz = graph.node(dst).elem_size();
        match &op.kind {
            OpKind::UnaryElementWise {op: unop} => {
                let v = self.scalar(op.inputs[0])?;
                let v = apply_unop(unop, v, &sz)?;
                self.bind(dst, Value::Scalar(v));
            },
            OpKind::BinaryElementWise {op: binop} => {
                let l = self.scalar(op.inputs[0])?;
                let r = self.scalar(op.inputs[1])?;
                let v = apply_binop(binop, l, r, &sz)?;
                self.bind(dst, Value::Scalar(v));
            },
            OpKind::ElementWise {body} => self.eval_elementwise(op, body)?,
            OpKind::Reduction {dims, body, ..} => self.eval_reduction(op, dims, body)?,
            OpKind::GetItem => {
                let (shape, data) = self.tensor(op.inputs[0])?;
                let idx = op.inputs[1..].iter()
                    .zip(shape.iter())
                    .map(|(i, n)| self.index(*i, *n))
                    .collect::<CompileResult<Vec<usize>>>()?;
                let v = convert(data[linear_index(&shape, &idx)], &sz);
                self.bind(dst, Value::Scalar(v));
            },
            OpKind::SetItem => {
                let (shape, mut data) = self.tensor(op.inputs[0])?;
                let v = self.scalar(op.inputs[1])?;
                let idx = op.inputs[2..].iter()
                    .zip(shape.iter())
                    .map(|(i, n)| self.index(*i, *n))
                    .collect::<CompileResult<Vec<usize>>>()?;
                data[linear_index(&shape, &idx)] = convert(v, &sz);
                self.bind(dst, Value::tensor(shape, data));
            },
            OpKind::Slice {indices, sizes} => self.eval_slice(op, indices, sizes)?,
            OpKind::Copy | OpKind::DeepCopy => {
                let v = match self.eval(op.inputs[0])? {
                    Value::Scalar(v) => Value::Scalar(convert(v, &sz)),
                    Value::Tensor {shape, data} => {
                        let data = data.into_iter().map(|v| convert(v, &sz)).collect();
                        Value::tensor(shape, data)
                    }
                };
                self.bind(dst, v);
            },
        };
        Ok(())
    }
}

fn bind_argument(g: &Graph, param: &str, id: NodeId, v: Value) -> CompileResult<Value> {
    let node = g.node(id);
    let sz = node.elem_size();
    match (node.is_scalar(), v) {
        (true, Value::Scalar(v)) => Ok(Value::Scalar(convert(v, &sz))),
        (false, Value::Tensor {shape, data}) if shape.len() == node.shape().len() => {
            if shape.iter().product::<usize>() != data.len() {
                return kernel_runtime_error!(Info::default(), "Argument {param} has {0} elements \
                                                               but its shape requires {1}",
                                             data.len(), shape.iter().product::<usize>());
            }
            let data = data.into_iter().map(|v| convert(v, &sz)).collect();
            Ok(Value::tensor(shape, data))
        },
        (_, v) => {
            kernel_runtime_error!(Info::default(), "Argument {param} of type {0} cannot be bound \
                                                    to a value of shape {1:?}", node.ty(), v.shape())
        }
    }
}

/// Interprets the graph of a kernel function on concrete arguments, given in the order of the
/// parameters of the function, and produces the values of its outputs.
pub fn eval(f: &FunctionGraph, args: Vec<Value>) -> CompileResult<Vec<Value>> {
    if args.len() != f.inputs.len() {
        return kernel_runtime_error!(Info::default(), "Function {0} expects {1} arguments but \
                                                       {2} were given",
                                     f.name, f.inputs.len(), args.len());
    }
    let mut scope = BTreeMap::new();
    for ((param, id), v) in f.inputs.iter().zip(args.into_iter()) {
        scope.insert(*id, bind_argument(&f.graph, param, *id, v)?);
    }
    let mut symbols = BTreeMap::new();
    for (name, sym) in f.shape_symbols.iter() {
        let n = match scope.get(&sym.arg).and_then(|v| v.shape().get(sym.axis)) {
            Some(n) => *n,
            None => return kernel_internal_error!("Shape symbol {name} refers to a missing axis")
        };
        symbols.insert(name.clone(), n);
        let sz = f.graph.node(sym.node).elem_size();
        scope.insert(sym.node, Value::Scalar(convert(Literal::Int(n as i64), &sz)));
    }
    for (id, v) in scope.iter() {
        let expected = f.graph.node(*id).shape().to_vec();
        for (d, n) in expected.iter().zip(v.shape().iter()) {
            let bound = match d {
                Dim::Const(c) => Some(*c as usize),
                Dim::Sym {name, ..} => symbols.get(name).copied(),
                Dim::Node(_) => None
            };
            if bound.is_some_and(|b| b != *n) {
                return kernel_runtime_error!(Info::default(), "Argument {id} has dimension {n} \
                                                               where {d} was expected");
            }
        }
    }
    let mut ev = Evaluator {graph: &f.graph, symbols, scopes: vec![scope]};
    f.outputs.iter()
        .map(|out| ev.eval(*out))
        .collect::<CompileResult<Vec<Value>>>()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::build_graph;
    use crate::option::CompileOptions;
    use crate::py::ast::*;
    use crate::py::ast_builder::*;
    use crate::test::*;

    fn build(params: Vec<Param>, ret_ann: ReturnAnnotation, body: Vec<Stmt>) -> FunctionGraph {
        let def = fun_def("foo", params, ret_ann, body);
        build_graph(vec![def], "foo", &CompileOptions::default()).unwrap()
    }

    fn reduce_foo(f: &str) -> FunctionGraph {
        build(
            vec![param("a", tensor_ann("int32", vec![var("M"), var("N")]))],
            returns(scalar_ann("int64")),
            vec![ret(np_call(f, vec![var("a")]))]
        )
    }

    fn sample() -> Value {
        Value::ints(vec![2, 3], &[1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn sum_of_all_elements() {
        let g = reduce_foo("sum");
        assert_eq!(eval(&g, vec![sample()]).unwrap(), vec![Value::Scalar(Literal::Int(21))]);
    }

    #[test]
    fn product_of_all_elements() {
        let g = reduce_foo("prod");
        assert_eq!(eval(&g, vec![sample()]).unwrap(), vec![Value::Scalar(Literal::Int(720))]);
    }

    #[test]
    fn max_and_min_of_all_elements() {
        let g = build(
            vec![param("a", tensor_ann("int32", vec![var("M"), var("N")]))],
            returns(scalar_ann("int32")),
            vec![ret(binop(
                np_call("max", vec![var("a")]), BinOp::Sub, np_call("min", vec![var("a")])
            ))]
        );
        assert_eq!(eval(&g, vec![sample()]).unwrap(), vec![Value::Scalar(Literal::Int(5))]);
    }

    #[test]
    fn sum_along_axis() {
        let g = build(
            vec![param("a", tensor_ann("int32", vec![var("M"), var("N")]))],
            ReturnAnnotation::Missing,
            vec![ret(call_kw(attr(var("np"), "sum"), vec![var("a")], vec![("axis", int(0))]))]
        );
        assert_eq!(eval(&g, vec![sample()]).unwrap(), vec![Value::ints(vec![3], &[5, 7, 9])]);
    }

    #[test]
    fn broadcast_addition() {
        let g = build(
            vec![
                param("a", tensor_ann("int32", vec![var("M"), var("N")])),
                param("b", tensor_ann("int32", vec![var("N")])),
            ],
            ReturnAnnotation::Missing,
            vec![ret(binop(var("a"), BinOp::Add, var("b")))]
        );
        let b = Value::ints(vec![3], &[10, 20, 30]);
        let expected = Value::ints(vec![2, 3], &[11, 22, 33, 14, 25, 36]);
        assert_eq!(eval(&g, vec![sample(), b]).unwrap(), vec![expected]);
    }

    #[test]
    fn singleton_dimension_broadcasts() {
        let g = build(
            vec![
                param("a", tensor_ann("float64", vec![int(1), var("N")])),
                param("b", tensor_ann("float64", vec![var("M"), int(1)])),
            ],
            ReturnAnnotation::Missing,
            vec![ret(binop(var("a"), BinOp::Mul, var("b")))]
        );
        let a = Value::floats(vec![1, 2], &[1.0, 2.0]);
        let b = Value::floats(vec![2, 1], &[3.0, 4.0]);
        let expected = Value::floats(vec![2, 2], &[3.0, 6.0, 4.0, 8.0]);
        assert_eq!(eval(&g, vec![a, b]).unwrap(), vec![expected]);
    }

    #[test]
    fn slice_with_step() {
        let g = build(
            vec![param("a", tensor_ann("int32", vec![var("N")]))],
            ReturnAnnotation::Missing,
            vec![ret(subscript(var("a"), slice(Some(int(1)), None, Some(int(2)))))]
        );
        let a = Value::ints(vec![6], &[0, 1, 2, 3, 4, 5]);
        assert_eq!(eval(&g, vec![a]).unwrap(), vec![Value::ints(vec![3], &[1, 3, 5])]);
    }

    #[test]
    fn row_of_matrix() {
        let g = build(
            vec![param("a", tensor_ann("int32", vec![var("M"), var("N")]))],
            ReturnAnnotation::Missing,
            vec![ret(subscript(var("a"), tuple(vec![int(1), slice(None, None, None)])))]
        );
        assert_eq!(eval(&g, vec![sample()]).unwrap(), vec![Value::ints(vec![3], &[4, 5, 6])]);
    }

    #[test]
    fn set_item_then_sum() {
        let g = build(
            vec![param("a", tensor_ann("int32", vec![var("N")]))],
            ReturnAnnotation::Missing,
            vec![
                assign(var("b"), binop(var("a"), BinOp::Mul, int(2))),
                assign(subscript(var("b"), int(0)), int(100)),
                ret(np_call("sum", vec![var("b")])),
            ]
        );
        let a = Value::ints(vec![3], &[1, 2, 3]);
        assert_eq!(eval(&g, vec![a]).unwrap(), vec![Value::Scalar(Literal::Int(110))]);
    }

    #[test]
    fn floor_division_rounds_down() {
        let g = build(
            vec![param("x", scalar_ann("int32"))],
            ReturnAnnotation::Missing,
            vec![ret(binop(var("x"), BinOp::FloorDiv, int(2)))]
        );
        let r = eval(&g, vec![Value::Scalar(Literal::Int(-3))]).unwrap();
        assert_eq!(r, vec![Value::Scalar(Literal::Int(-2))]);
    }

    #[test]
    fn remainder_takes_sign_of_divisor() {
        assert_eq!(apply_int_binop(&BinOp::Rem, -7, 3).unwrap(), 2);
        assert_eq!(apply_int_binop(&BinOp::Rem, 7, -3).unwrap(), -2);
        assert_eq!(apply_float_binop(&BinOp::Rem, -1.5, 1.0).unwrap(), 0.5);
    }

    #[test]
    fn division_by_zero_fails() {
        assert_error_kind(apply_int_binop(&BinOp::FloorDiv, 1, 0), ErrorKind::Runtime);
    }

    #[test]
    fn integer_conversion_wraps() {
        assert_eq!(convert(Literal::Int(300), &ElemSize::I8), Literal::Int(44));
        assert_eq!(convert(Literal::Float(2.7), &ElemSize::I32), Literal::Int(2));
        assert_eq!(convert(Literal::Int(0), &ElemSize::Bool), Literal::Bool(false));
    }

    #[test]
    fn mismatched_symbol_binding_fails() {
        let g = build(
            vec![
                param("a", tensor_ann("int32", vec![var("N")])),
                param("b", tensor_ann("int32", vec![var("N")])),
            ],
            ReturnAnnotation::Missing,
            vec![ret(binop(var("a"), BinOp::Add, var("b")))]
        );
        let a = Value::ints(vec![2], &[1, 2]);
        let b = Value::ints(vec![3], &[1, 2, 3]);
        assert_error_kind(eval(&g, vec![a, b]), ErrorKind::Runtime);
    }

    #[test]
    fn inlined_call_is_evaluated() {
        let ann = tensor_ann("int32", vec![var("K")]);
        let double = fun_def(
            "double", vec![param("x", ann.clone())], returns(ann),
            vec![ret(binop(var("x"), BinOp::Add, var("x")))]
        );
        let main = fun_def(
            "foo", vec![param("a", tensor_ann("int32", vec![var("N")]))],
            ReturnAnnotation::Missing,
            vec![ret(call(var("double"), vec![var("a")]))]
        );
        let g = build_graph(vec![double, main], "foo", &CompileOptions::default()).unwrap();
        let a = Value::ints(vec![2], &[3, 4]);
        assert_eq!(eval(&g, vec![a]).unwrap(), vec![Value::ints(vec![2], &[6, 8])]);
    }
}
