use super::ast::*;
use crate::kernel_internal_error;
use crate::graph::builder::FunctionGraph;
use crate::graph::ir::{Graph, NodeId, OpId, OpKind, SliceIndex, SubGraph};
use crate::graph::types::{Dim, Literal};
use crate::option::CompileOptions;
use crate::utils::ast::{BinOp, UnOp};
use crate::utils::err::*;
use crate::utils::name::Name;

use std::collections::{BTreeMap, BTreeSet};

// The names bound while emitting one region of the output. Nested regions, such as the body of
// an elementwise operator, push a scope of their own which is dropped when the region is closed.
#[derive(Default)]
struct Scope {
    names: BTreeMap<NodeId, Name>,
    ops: BTreeSet<OpId>,
    index_consts: BTreeMap<i64, Name>,
}

struct LinalgEnv<'a> {
    graph: &'a Graph,
    scopes: Vec<Scope>,
    blocks: Vec<Vec<Stmt>>,
    symbols: BTreeMap<String, Name>,
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn tmp(base: &str) -> Name {
    Name::sym_str(base)
}

fn memref_type(sz: ElemSize, shape: &[Dim]) -> Type {
    let shape = shape.iter()
        .map(|d| match d {
            Dim::Const(n) => Some(*n),
            _ => None
        })
        .collect();
    Type::MemRef {sz, shape}
}

// Maps the iteration space of an elementwise operator to the dimensions of an operand. Operands
// of lower rank are aligned with the trailing dimensions, and unit dimensions broadcast along a
// larger iteration dimension always read their first element.
fn affine_map(shape: &[Dim], iter: &[Dim]) -> AffineMap {
    let ndims = iter.len();
    let ofs = ndims.saturating_sub(shape.len());
    let results = shape.iter()
        .enumerate()
        .map(|(axis, d)| {
            let idx = ofs + axis;
            match iter.get(idx) {
                Some(it) if d.is_one() && !it.is_one() => AffineExpr::Zero,
                _ => AffineExpr::Dim(idx)
            }
        })
        .collect();
    AffineMap {ndims, results}
}

fn compare_predicate(op: &BinOp) -> Option<CmpPredicate> {
    match op {
        BinOp::Eq => Some(CmpPredicate::Eq),
        BinOp::Neq => Some(CmpPredicate::Ne),
        BinOp::Lt => Some(CmpPredicate::Lt),
        BinOp::Leq => Some(CmpPredicate::Le),
        BinOp::Gt => Some(CmpPredicate::Gt),
        BinOp::Geq => Some(CmpPredicate::Ge),
        _ => None
    }
}

impl<'a> LinalgEnv<'a> {
    fn new(graph: &'a Graph) -> LinalgEnv<'a> {
        LinalgEnv {
            graph,
            scopes: vec![Scope::default()],
            blocks: vec![vec![]],
            symbols: BTreeMap::new(),
        }
    }

    fn lookup(&self, id: NodeId) -> Option<Name> {
        self.scopes.iter().rev().find_map(|s| s.names.get(&id)).cloned()
    }

    fn bind(&mut self, id: NodeId, name: Name) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(id, name);
        }
    }

    fn emit(&mut self, stmt: Stmt) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(stmt);
        }
    }

    fn enter_region(&mut self) {
        self.scopes.push(Scope::default());
        self.blocks.push(vec![]);
    }

    fn exit_region(&mut self) -> Vec<Stmt> {
        self.scopes.pop();
        self.blocks.pop().unwrap_or_default()
    }

    fn node_name(&self, id: NodeId, default: &str) -> Name {
        match &self.graph.node(id).name {
            Some(s) => tmp(&sanitize(s)),
            None => tmp(default)
        }
    }

    fn node_type(&self, id: NodeId) -> Type {
        let node = self.graph.node(id);
        if node.is_scalar() {
            Type::Scalar(node.elem_size())
        } else {
            memref_type(node.elem_size(), node.shape())
        }
    }

    fn elem_size(&self, id: NodeId) -> ElemSize {
        self.graph.node(id).elem_size()
    }

    ////////////
    // VALUES //
    ////////////

    fn value(&mut self, id: NodeId) -> CompileResult<Name> {
        if let Some(name) = self.lookup(id) {
            return Ok(name);
        }
        let graph = self.graph;
        let node = graph.node(id);
        match (node.value(), node.producer) {
            (Some(v), _) if node.is_internal_constant() => {
                let name = self.constant(v, node.elem_size());
                self.bind(id, name.clone());
                Ok(name)
            },
            (_, Some(op)) => {
                self.visit_op(op)?;
                match self.lookup(id) {
                    Some(name) => Ok(name),
                    None => kernel_internal_error!("Operator producing {id} did not bind it")
                }
            },
            _ => kernel_internal_error!("Reference to unbound node {id}")
        }
    }

    fn operand(&mut self, id: NodeId) -> CompileResult<Operand> {
        let name = self.value(id)?;
        Ok(Operand {id: name, ty: self.node_type(id)})
    }

    fn constant(&mut self, value: Literal, sz: ElemSize) -> Name {
        let dst = tmp("cst");
        self.emit(Stmt::Constant {dst: dst.clone(), value, ty: Type::Scalar(sz)});
        dst
    }

    fn index_const(&mut self, n: i64) -> Name {
        let cached = self.scopes.iter().rev().find_map(|s| s.index_consts.get(&n)).cloned();
        match cached {
            Some(name) => name,
            None => {
                let dst = tmp(&format!("c{0}", n.max(0)));
                self.emit(Stmt::Constant {dst: dst.clone(), value: Literal::Int(n), ty: Type::Index});
                if let Some(scope) = self.scopes.last_mut() {
                    scope.index_consts.insert(n, dst.clone());
                }
                dst
            }
        }
    }

    fn to_index(&mut self, v: Name, sz: ElemSize) -> Name {
        let dst = tmp("idx");
        let stmt = Stmt::Cast {
            dst: dst.clone(), op: CastOp::IndexCast, arg: v, from: Type::Scalar(sz), to: Type::Index
        };
        self.emit(stmt);
        dst
    }

    fn index_value(&mut self, id: NodeId) -> CompileResult<Name> {
        let v = self.value(id)?;
        Ok(self.to_index(v, self.elem_size(id)))
    }

    fn dim_index(&mut self, d: &Dim) -> CompileResult<Name> {
        match d {
            Dim::Const(n) => Ok(self.index_const(*n)),
            Dim::Sym {name, ..} => match self.symbols.get(name) {
                Some(v) => Ok(v.clone()),
                None => kernel_internal_error!("Shape symbol {name} is not bound")
            },
            Dim::Node(id) => self.index_value(*id),
        }
    }

    fn alloc(&mut self, sz: ElemSize, shape: &[Dim], base: &str) -> CompileResult<Operand> {
        let sizes = shape.iter()
            .filter(|d| !d.is_static())
            .map(|d| self.dim_index(d))
            .collect::<CompileResult<Vec<Name>>>()?;
        let dst = tmp(base);
        let ty = memref_type(sz, shape);
        self.emit(Stmt::Alloc {dst: dst.clone(), sizes, ty: ty.clone()});
        Ok(Operand {id: dst, ty})
    }

    fn alloc_node(&mut self, id: NodeId) -> CompileResult<Operand> {
        let graph = self.graph;
        let node = graph.node(id);
        self.alloc(node.elem_size(), node.shape(), "buf")
    }

    ////////////////////////
    // SCALAR OPERATIONS  //
    ////////////////////////

    fn cast(&mut self, v: Name, from: ElemSize, to: ElemSize) -> Name {
        if from == to {
            return v;
        }
        let dst = tmp("cast");
        let stmt = if to.is_boolean() {
            let zero = if from.is_floating_point() {
                self.constant(Literal::Float(0.0), from)
            } else {
                self.constant(Literal::Int(0), from)
            };
            Stmt::Compare {
                dst: dst.clone(), pred: CmpPredicate::Ne, lhs: v, rhs: zero, ty: Type::Scalar(from)
            }
        } else {
            let op = match (from, to) {
                (f, t) if f.is_boolean() && t.is_floating_point() => CastOp::UIToFP,
                (f, _) if f.is_boolean() => CastOp::ExtUI,
                (f, t) if f.is_floating_point() && t.is_floating_point() => {
                    if t.bits() > f.bits() { CastOp::ExtF } else { CastOp::TruncF }
                },
                (f, _) if f.is_floating_point() => CastOp::FPToSI,
                (_, t) if t.is_floating_point() => CastOp::SIToFP,
                (f, t) => if t.bits() > f.bits() { CastOp::ExtSI } else { CastOp::TruncI },
            };
            Stmt::Cast {dst: dst.clone(), op, arg: v, from: Type::Scalar(from), to: Type::Scalar(to)}
        };
        self.emit(stmt);
        dst
    }

    fn arith(&mut self, op: ArithOp, lhs: Name, rhs: Name, sz: ElemSize) -> Name {
        let dst = tmp("t");
        self.emit(Stmt::Arith {dst: dst.clone(), op, lhs, rhs, ty: Type::Scalar(sz)});
        dst
    }

    fn compare(&mut self, pred: CmpPredicate, lhs: Name, rhs: Name, sz: ElemSize) -> Name {
        let dst = tmp("cmp");
        self.emit(Stmt::Compare {dst: dst.clone(), pred, lhs, rhs, ty: Type::Scalar(sz)});
        dst
    }

    // The remainder takes the sign of the divisor, so the remainder computed by truncating
    // division is adjusted by the divisor when their signs differ.
    fn floor_rem(&mut self, lhs: Name, rhs: Name, sz: ElemSize) -> Name {
        let is_float = sz.is_floating_point();
        let rem = if is_float { ArithOp::RemF } else { ArithOp::RemSI };
        let m = self.arith(rem, lhs, rhs.clone(), sz);
        let zero = if is_float {
            self.constant(Literal::Float(0.0), sz)
        } else {
            self.constant(Literal::Int(0), sz)
        };
        let nonzero = self.compare(CmpPredicate::Ne, m.clone(), zero.clone(), sz);
        let m_neg = self.compare(CmpPredicate::Lt, m.clone(), zero.clone(), sz);
        let r_neg = self.compare(CmpPredicate::Lt, rhs.clone(), zero, sz);
        let signs_differ = self.arith(ArithOp::XOrI, m_neg, r_neg, ElemSize::Bool);
        let adjust = self.arith(ArithOp::AndI, nonzero, signs_differ, ElemSize::Bool);
        let add = if is_float { ArithOp::AddF } else { ArithOp::AddI };
        let adjusted = self.arith(add, m.clone(), rhs, sz);
        let dst = tmp("rem");
        self.emit(Stmt::Select {
            dst: dst.clone(), cond: adjust, thn: adjusted, els: m, ty: Type::Scalar(sz)
        });
        dst
    }

    fn binary(
        &mut self,
        op: &BinOp,
        lhs: (Name, ElemSize),
        rhs: (Name, ElemSize),
        sz: ElemSize
    ) -> CompileResult<Name> {
        if let Some(pred) = compare_predicate(op) {
            let operand_sz = lhs.1.lub(&rhs.1);
            let l = self.cast(lhs.0, lhs.1, operand_sz);
            let r = self.cast(rhs.0, rhs.1, operand_sz);
            let c = self.compare(pred, l, r, operand_sz);
            return Ok(self.cast(c, ElemSize::Bool, sz));
        }
        let l = self.cast(lhs.0, lhs.1, sz);
        let r = self.cast(rhs.0, rhs.1, sz);
        let f = sz.is_floating_point();
        let pick = |float_op: ArithOp, int_op: ArithOp| if f { float_op } else { int_op };
        let v = match op {
            BinOp::Add => self.arith(pick(ArithOp::AddF, ArithOp::AddI), l, r, sz),
            BinOp::Sub => self.arith(pick(ArithOp::SubF, ArithOp::SubI), l, r, sz),
            BinOp::Mul => self.arith(pick(ArithOp::MulF, ArithOp::MulI), l, r, sz),
            BinOp::Div if f => self.arith(ArithOp::DivF, l, r, sz),
            BinOp::Div => {
                return kernel_internal_error!("True division with non-float result type {sz}")
            },
            BinOp::FloorDiv if f => {
                let q = self.arith(ArithOp::DivF, l, r, sz);
                let dst = tmp("floor");
                self.emit(Stmt::Unary {dst: dst.clone(), op: UnaryOp::Floor, arg: q, ty: Type::Scalar(sz)});
                dst
            },
            BinOp::FloorDiv => self.arith(ArithOp::FloorDivSI, l, r, sz),
            BinOp::Rem => self.floor_rem(l, r, sz),
            BinOp::Pow => self.arith(pick(ArithOp::PowF, ArithOp::IPowI), l, r, sz),
            BinOp::And | BinOp::BitAnd if !f => self.arith(ArithOp::AndI, l, r, sz),
            BinOp::Or | BinOp::BitOr if !f => self.arith(ArithOp::OrI, l, r, sz),
            BinOp::BitXor if !f => self.arith(ArithOp::XOrI, l, r, sz),
            BinOp::Max => self.arith(pick(ArithOp::MaximumF, ArithOp::MaxSI), l, r, sz),
            BinOp::Min => self.arith(pick(ArithOp::MinimumF, ArithOp::MinSI), l, r, sz),
            _ => return kernel_internal_error!("Operator {op} cannot be applied to {sz}")
        };
        Ok(v)
    }

    fn unary(&mut self, op: &UnOp, arg: (Name, ElemSize), sz: ElemSize) -> CompileResult<Name> {
        match op {
            UnOp::Sub if sz.is_floating_point() => {
                let a = self.cast(arg.0, arg.1, sz);
                let dst = tmp("neg");
                self.emit(Stmt::Unary {dst: dst.clone(), op: UnaryOp::NegF, arg: a, ty: Type::Scalar(sz)});
                Ok(dst)
            },
            UnOp::Sub => {
                let a = self.cast(arg.0, arg.1, sz);
                let zero = self.constant(Literal::Int(0), sz);
                Ok(self.arith(ArithOp::SubI, zero, a, sz))
            },
            UnOp::Not => {
                let a = self.cast(arg.0, arg.1, ElemSize::Bool);
                let t = self.constant(Literal::Bool(true), ElemSize::Bool);
                let v = self.arith(ArithOp::XOrI, a, t, ElemSize::Bool);
                Ok(self.cast(v, ElemSize::Bool, sz))
            },
            UnOp::BitNeg if sz.is_floating_point() => {
                kernel_internal_error!("Bitwise negation of {sz}")
            },
            UnOp::BitNeg => {
                let a = self.cast(arg.0, arg.1, sz);
                let ones = self.constant(Literal::Int(-1), sz);
                Ok(self.arith(ArithOp::XOrI, a, ones, sz))
            },
        }
    }

    /////////////////////////
    // TENSOR OPERATIONS   //
    /////////////////////////

    // Emits the region of an elementwise or reduction operator. The placeholders of the body are
    // bound to the arguments of the region, and the values computed for the outputs are yielded
    // after converting them to the element type of the corresponding output.
    fn region(
        &mut self,
        body: &SubGraph,
        args: &[(NodeId, Operand)]
    ) -> CompileResult<Vec<Stmt>> {
        self.enter_region();
        for (inner, arg) in args {
            self.bind(*inner, arg.id.clone());
        }
        let result = body.outputs.iter()
            .map(|(inner, outer)| {
                let v = self.value(*inner)?;
                let sz = self.elem_size(*outer);
                let v = self.cast(v, self.elem_size(*inner), sz);
                Ok(Operand {id: v, ty: Type::Scalar(sz)})
            })
            .collect::<CompileResult<Vec<Operand>>>();
        match result {
            Ok(values) => {
                self.emit(Stmt::Yield {values});
                Ok(self.exit_region())
            },
            Err(e) => {
                self.exit_region();
                Err(e)
            }
        }
    }

    fn visit_elementwise(&mut self, inputs: &[NodeId], body: &SubGraph) -> CompileResult<()> {
        let graph = self.graph;
        for inp in inputs {
            self.value(*inp)?;
        }
        let iter_shape = match body.outputs.first() {
            Some((_, out)) => graph.node(*out).shape().to_vec(),
            None => return kernel_internal_error!("Elementwise operator without outputs")
        };
        let ins = body.inputs.iter()
            .map(|(outer, _)| self.operand(*outer))
            .collect::<CompileResult<Vec<Operand>>>()?;
        let outs = body.outputs.iter()
            .map(|(_, outer)| self.alloc_node(*outer))
            .collect::<CompileResult<Vec<Operand>>>()?;
        let maps = body.inputs.iter()
            .map(|(outer, _)| outer)
            .chain(body.outputs.iter().map(|(_, outer)| outer))
            .map(|id| affine_map(graph.node(*id).shape(), &iter_shape))
            .collect::<Vec<AffineMap>>();
        let mut args = body.inputs.iter()
            .map(|(outer, inner)| {
                let id = self.node_name(*inner, "in");
                (*inner, Operand {id, ty: Type::Scalar(self.elem_size(*outer))})
            })
            .collect::<Vec<(NodeId, Operand)>>();
        let region = self.region(body, &args)?;
        args.extend(body.outputs.iter().map(|(inner, outer)| {
            (*inner, Operand {id: tmp("out"), ty: Type::Scalar(self.elem_size(*outer))})
        }));
        self.emit(Stmt::Generic {
            maps,
            iterators: vec![IteratorType::Parallel; iter_shape.len()],
            ins,
            outs: outs.clone(),
            args: args.into_iter().map(|(_, arg)| arg).collect(),
            body: region,
        });
        for ((_, outer), buf) in body.outputs.iter().zip(outs.into_iter()) {
            self.bind(*outer, buf.id);
        }
        Ok(())
    }

    fn visit_reduction(
        &mut self,
        inputs: &[NodeId],
        dims: &[usize],
        body: &SubGraph
    ) -> CompileResult<()> {
        let (arg, init) = match (inputs, body.inputs.as_slice()) {
            ([arg, init], [(_, x), (_, acc)]) => ((*arg, *x), (*init, *acc)),
            _ => return kernel_internal_error!("Malformed reduction operator")
        };
        let dst = match body.outputs.as_slice() {
            [(_, dst)] => *dst,
            _ => return kernel_internal_error!("Reduction operator must have one output")
        };
        let src = self.operand(arg.0)?;
        let init_value = self.value(init.0)?;
        let sz = self.elem_size(dst);
        let is_full = self.graph.is_scalar(dst);
        let cell = if is_full {
            let id = tmp("acc");
            let ty = Type::MemRef {sz, shape: vec![]};
            self.emit(Stmt::Alloca {dst: id.clone(), ty: ty.clone()});
            let cell = Operand {id, ty};
            self.emit(Stmt::Store {value: init_value, dst: cell.clone(), indices: vec![]});
            cell
        } else {
            let cell = self.alloc_node(dst)?;
            let value = Operand {id: init_value, ty: Type::Scalar(sz)};
            self.emit(Stmt::Fill {value, dst: cell.clone()});
            cell
        };
        let args = vec![
            (arg.1, Operand {id: self.node_name(arg.1, "in"), ty: Type::Scalar(self.elem_size(arg.0))}),
            (init.1, Operand {id: tmp("acc"), ty: Type::Scalar(sz)}),
        ];
        let region = self.region(body, &args)?;
        self.emit(Stmt::Reduce {
            ins: vec![src],
            outs: vec![cell.clone()],
            dims: dims.to_vec(),
            args: args.into_iter().map(|(_, arg)| arg).collect(),
            body: region,
        });
        if is_full {
            let v = tmp("t");
            self.emit(Stmt::Load {dst: v.clone(), src: cell, indices: vec![]});
            self.bind(dst, v);
        } else {
            self.bind(dst, cell.id);
        }
        Ok(())
    }

    fn visit_get_item(&mut self, inputs: &[NodeId], dst: NodeId) -> CompileResult<()> {
        let src = self.operand(inputs[0])?;
        let indices = inputs[1..].iter()
            .map(|i| self.index_value(*i))
            .collect::<CompileResult<Vec<Name>>>()?;
        let v = tmp("elem");
        self.emit(Stmt::Load {dst: v.clone(), src, indices});
        self.bind(dst, v);
        Ok(())
    }

    fn visit_set_item(&mut self, inputs: &[NodeId], dst: NodeId) -> CompileResult<()> {
        let src = self.operand(inputs[0])?;
        let value = self.value(inputs[1])?;
        let indices = inputs[2..].iter()
            .map(|i| self.index_value(*i))
            .collect::<CompileResult<Vec<Name>>>()?;
        let buf = self.alloc_node(dst)?;
        self.emit(Stmt::Copy {src, dst: buf.clone()});
        let value = self.cast(value, self.elem_size(inputs[1]), self.elem_size(dst));
        self.emit(Stmt::Store {value, dst: buf.clone(), indices});
        self.bind(dst, buf.id);
        Ok(())
    }

    fn visit_slice(
        &mut self,
        inputs: &[NodeId],
        indices: &[SliceIndex],
        sizes: &[Dim],
        dst: NodeId
    ) -> CompileResult<()> {
        let graph = self.graph;
        let src = self.operand(inputs[0])?;
        let sz = self.elem_size(inputs[0]);
        let rank = graph.node(inputs[0]).shape().len();
        let (mut offsets, mut view_sizes, mut strides) = (vec![], vec![], vec![]);
        for (axis, size) in sizes.iter().enumerate().take(rank) {
            let (offset, stride) = match indices.get(axis) {
                Some(SliceIndex::Index(i)) => (self.index_value(*i)?, self.index_const(1)),
                Some(SliceIndex::Range {lower, step, ..}) => {
                    (self.index_value(*lower)?, self.index_value(*step)?)
                },
                None => (self.index_const(0), self.index_const(1))
            };
            offsets.push(offset);
            view_sizes.push(self.dim_index(size)?);
            strides.push(stride);
        }
        let view = Operand {id: tmp("view"), ty: Type::StridedMemRef {sz, rank}};
        self.emit(Stmt::SubView {
            dst: view.id.clone(), src, offsets, sizes: view_sizes, strides, ty: view.ty.clone()
        });
        let buf = self.alloc(sz, sizes, "buf")?;
        self.emit(Stmt::Copy {src: view, dst: buf.clone()});
        let dst_shape = graph.node(dst).shape();
        let trim = rank.saturating_sub(dst_shape.len());
        if trim > 0 {
            let reassociation = std::iter::once((0..=trim).collect::<Vec<usize>>())
                .chain((trim + 1..rank).map(|axis| vec![axis]))
                .collect::<Vec<Vec<usize>>>();
            let id = tmp("slice");
            let ty = memref_type(sz, dst_shape);
            self.emit(Stmt::CollapseShape {dst: id.clone(), src: buf, reassociation, ty});
            self.bind(dst, id);
        } else {
            self.bind(dst, buf.id);
        }
        Ok(())
    }

    // Copies the elements of a tensor into a buffer of another element type using a generic
    // operator converting one element at a time.
    fn convert_tensor(&mut self, src: NodeId, dst: NodeId) -> CompileResult<Operand> {
        let graph = self.graph;
        let input = self.operand(src)?;
        let buf = self.alloc_node(dst)?;
        let shape = graph.node(dst).shape();
        let (from, to) = (self.elem_size(src), self.elem_size(dst));
        let x = Operand {id: self.node_name(src, "in"), ty: Type::Scalar(from)};
        let out = Operand {id: tmp("out"), ty: Type::Scalar(to)};
        self.enter_region();
        let v = self.cast(x.id.clone(), from, to);
        self.emit(Stmt::Yield {values: vec![Operand {id: v, ty: Type::Scalar(to)}]});
        let body = self.exit_region();
        self.emit(Stmt::Generic {
            maps: vec![affine_map(shape, shape), affine_map(shape, shape)],
            iterators: vec![IteratorType::Parallel; shape.len()],
            ins: vec![input],
            outs: vec![buf.clone()],
            args: vec![x, out],
            body,
        });
        Ok(buf)
    }

    fn visit_copy(&mut self, src: NodeId, dst: NodeId, deep: bool) -> CompileResult<()> {
        let (from, to) = (self.elem_size(src), self.elem_size(dst));
        if self.graph.is_scalar(dst) {
            let v = self.value(src)?;
            let v = self.cast(v, from, to);
            self.bind(dst, v);
        } else if from != to {
            let buf = self.convert_tensor(src, dst)?;
            self.bind(dst, buf.id);
        } else if deep {
            let input = self.operand(src)?;
            let buf = self.alloc_node(dst)?;
            self.emit(Stmt::Copy {src: input, dst: buf.clone()});
            self.bind(dst, buf.id);
        } else {
            let v = self.value(src)?;
            self.bind(dst, v);
        }
        Ok(())
    }

    fn visit_op(&mut self, id: OpId) -> CompileResult<()> {
        if self.scopes.iter().any(|s| s.ops.contains(&id)) {
            return Ok(());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.ops.insert(id);
        }
        let graph = self.graph;
        let op = graph.op(id);
        let dst = match op.outputs.first() {
            Some(dst) => *dst,
            None => return kernel_internal_error!("Operator without outputs")
        };
        match &op.kind {
            OpKind::UnaryElementWise {op: unop} => {
                let arg = (self.value(op.inputs[0])?, self.elem_size(op.inputs[0]));
                let v = self.unary(unop, arg, self.elem_size(dst))?;
                self.bind(dst, v);
            },
            OpKind::BinaryElementWise {op: binop} => {
                let lhs = (self.value(op.inputs[0])?, self.elem_size(op.inputs[0]));
                let rhs = (self.value(op.inputs[1])?, self.elem_size(op.inputs[1]));
                let v = self.binary(binop, lhs, rhs, self.elem_size(dst))?;
                self.bind(dst, v);
            },
            OpKind::ElementWise {body} => self.visit_elementwise(&op.inputs, body)?,
            OpKind::Reduction {dims, body, ..} => self.visit_reduction(&op.inputs, dims, body)?,
            OpKind::GetItem => self.visit_get_item(&op.inputs, dst)?,
            OpKind::SetItem => self.visit_set_item(&op.inputs, dst)?,
            OpKind::Slice {indices, sizes} => self.visit_slice(&op.inputs, indices, sizes, dst)?,
            OpKind::Copy => self.visit_copy(op.inputs[0], dst, false)?,
            OpKind::DeepCopy => self.visit_copy(op.inputs[0], dst, true)?,
        };
        Ok(())
    }

    // Binds every shape symbol to the size of the argument dimension it was introduced by, both
    // as an index and as a scalar of the element type used for shape symbols in the kernel.
    fn bind_shape_symbols(&mut self, f: &FunctionGraph) -> CompileResult<()> {
        for (s, sym) in f.shape_symbols.iter() {
            let src = self.operand(sym.arg)?;
            let axis = self.index_const(sym.axis as i64);
            let idx = tmp(&format!("{0}_idx", sanitize(s)));
            self.emit(Stmt::Dim {dst: idx.clone(), src, axis});
            self.symbols.insert(s.clone(), idx.clone());
            let v = tmp(&sanitize(s));
            let to = Type::Scalar(self.elem_size(sym.node));
            self.emit(Stmt::Cast {dst: v.clone(), op: CastOp::IndexCast, arg: idx, from: Type::Index, to});
            self.bind(sym.node, v);
        }
        Ok(())
    }
}

/// Lowers the graph of a kernel function to a function of the linalg dialect operating on
/// buffers. Operators are emitted in dependency order starting from the outputs of the function.
pub fn from_graph(f: &FunctionGraph, opts: &CompileOptions) -> CompileResult<FunDef> {
    let mut env = LinalgEnv::new(&f.graph);
    let params = f.inputs.iter()
        .map(|(id, node)| {
            let name = Name::new(sanitize(id));
            env.bind(*node, name.clone());
            Operand {id: name, ty: env.node_type(*node)}
        })
        .collect::<Vec<Operand>>();
    env.bind_shape_symbols(f)?;
    let values = f.outputs.iter()
        .map(|out| env.operand(*out))
        .collect::<CompileResult<Vec<Operand>>>()?;
    let results = values.iter().map(|v| v.ty.clone()).collect::<Vec<Type>>();
    env.emit(Stmt::Return {values});
    let id = opts.func_name.clone().unwrap_or_else(|| f.name.clone());
    let body = env.blocks.pop().unwrap_or_default();
    Ok(FunDef {id, params, results, body})
}
