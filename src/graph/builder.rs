use crate::kernel_internal_error;
use crate::kernel_not_implemented_error;
use crate::kernel_range_error;
use crate::kernel_runtime_error;
use crate::kernel_syntax_error;
use crate::option::CompileOptions;
use crate::py::ast::*;
use crate::utils::ast::*;
use crate::utils::err::*;
use crate::utils::info::*;
use super::ir::*;
use super::registry::*;
use super::types::*;

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReturnKind {
    // Declared to return nothing.
    Void,
    // No return annotation; the returned value determines the return type.
    Template,
    // Annotated with a type whose dimensions are all known from the parameters. The result is
    // copied into a node allocated up-front.
    Static,
    // Annotated with a type referring to shape symbols not introduced by any parameter. The
    // returned value determines the actual return type.
    Dynamic,
}

/// Records the parameter and dimension a shape symbol was introduced by, along with the scalar
/// node holding its value.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeSymbol {
    pub node: NodeId,
    pub arg: NodeId,
    pub axis: usize,
}

/// The result of building the graph of a kernel function.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionGraph {
    pub name: String,
    pub graph: Graph,
    pub inputs: Vec<(String, NodeId)>,
    pub outputs: Vec<NodeId>,
    pub shape_symbols: BTreeMap<String, ShapeSymbol>,
    pub return_kind: ReturnKind,
    pub return_type: Option<KernelType>,
    pub can_inline: bool,
}

fn convert_annotation(ann: &Expr) -> CompileResult<KernelType> {
    let elem_size = |e: &Expr| match e {
        Expr::Name {id, i} => match ElemSize::from_type_name(id) {
            Some(sz) => Ok(sz),
            None => kernel_syntax_error!(i, "Unknown element type {id} in annotation")
        },
        _ => kernel_syntax_error!(e.get_info(), "Unsupported annotation {ann}")
    };
    match ann {
        Expr::Name {..} => Ok(KernelType::Scalar(elem_size(ann)?)),
        Expr::Subscript {target, idx, ..} => {
            let sz = elem_size(target)?;
            let dims = match idx.as_ref() {
                Expr::Tuple {elems, ..} => elems.iter().collect::<Vec<&Expr>>(),
                e => vec![e]
            };
            let shape = dims.into_iter()
                .map(|d| match d {
                    Expr::Name {id, ..} => Ok(Dim::sym(id)),
                    Expr::Int {v, ..} if *v > 0 && *v <= i64::MAX as i128 => Ok(Dim::Const(*v as i64)),
                    _ => kernel_syntax_error!(d.get_info(), "Unsupported dimension {d} in annotation")
                })
                .collect::<CompileResult<Vec<Dim>>>()?;
            Ok(KernelType::Tensor {sz, shape})
        },
        _ => kernel_syntax_error!(ann.get_info(), "Unsupported annotation {ann}")
    }
}

fn floor_div(l: i128, r: i128) -> i128 {
    let q = l / r;
    if l % r != 0 && ((l < 0) != (r < 0)) { q - 1 } else { q }
}

fn integer_literal(e: &Expr) -> Option<i128> {
    match e {
        Expr::Int {v, ..} => Some(*v),
        Expr::UnOp {op: UnOp::Sub, arg, ..} => match arg.as_ref() {
            Expr::Int {v, ..} => Some(-*v),
            _ => None
        },
        _ => None
    }
}

struct FunctionParser<'a> {
    name: String,
    kernels: &'a mut KernelRegistry,
    numeric: &'a NumericRegistry,
    opts: &'a CompileOptions,
    graph: Graph,
    inputs: Vec<(String, NodeId)>,
    args: BTreeMap<String, NodeId>,
    tmp_scalars: BTreeMap<String, NodeId>,
    tmp_tensors: BTreeMap<String, NodeId>,
    shape_symbols: BTreeMap<String, ShapeSymbol>,
    ssa_counter: usize,
    return_kind: ReturnKind,
    return_type: Option<KernelType>,
    return_node: Option<NodeId>,
    outputs: Vec<NodeId>,
    returned: bool,
}

impl<'a> FunctionParser<'a> {
    fn new(
        name: &str,
        kernels: &'a mut KernelRegistry,
        numeric: &'a NumericRegistry,
        opts: &'a CompileOptions
    ) -> FunctionParser<'a> {
        FunctionParser {
            name: name.to_string(),
            kernels, numeric, opts,
            graph: Graph::new(),
            inputs: vec![],
            args: BTreeMap::new(),
            tmp_scalars: BTreeMap::new(),
            tmp_tensors: BTreeMap::new(),
            shape_symbols: BTreeMap::new(),
            ssa_counter: 0,
            return_kind: ReturnKind::Template,
            return_type: None,
            return_node: None,
            outputs: vec![],
            returned: false,
        }
    }

    ////////////////
    // PARAMETERS //
    ////////////////

    fn add_params(
        &mut self,
        def: &FunDef,
        param_types: Option<&[KernelType]>
    ) -> CompileResult<()> {
        for (idx, param) in def.params.iter().enumerate() {
            if self.args.contains_key(&param.id) {
                kernel_syntax_error!(param.i, "Duplicate parameter {0}", param.id)?
            }
            let ty = match (&param.ann, param_types.and_then(|tys| tys.get(idx))) {
                (Some(ann), _) => convert_annotation(ann)?,
                (None, Some(ty)) => ty.clone(),
                (None, None) => {
                    kernel_syntax_error!(param.i, "Parameter {0} of function {1} must be \
                                                   annotated", param.id, def.id)?
                }
            };
            let arg = self.graph.add_of_type(Some(param.id.clone()), ty.clone());
            self.args.insert(param.id.clone(), arg);
            self.inputs.push((param.id.clone(), arg));
            for (axis, dim) in ty.shape().iter().enumerate() {
                if let Dim::Sym {name, ..} = dim {
                    if !self.shape_symbols.contains_key(name) {
                        let node = self.graph.add_scalar(Some(name.clone()), self.opts.index_dtype);
                        self.shape_symbols.insert(name.clone(), ShapeSymbol {node, arg, axis});
                    }
                }
            }
        }
        match def.params.iter().find(|p| self.shape_symbols.contains_key(&p.id)) {
            Some(p) => kernel_syntax_error!(p.i, "Parameter {0} has the same name as a shape \
                                                  symbol", p.id),
            None => Ok(())
        }
    }

    fn unknown_symbol(&self, ty: &KernelType) -> Option<String> {
        ty.shape().iter()
            .find_map(|d| match d {
                Dim::Sym {name, ..} if !self.shape_symbols.contains_key(name) => Some(name.clone()),
                _ => None
            })
    }

    fn set_return_kind(&mut self, def: &FunDef) -> CompileResult<()> {
        self.return_kind = match &def.ret {
            ReturnAnnotation::Void => ReturnKind::Void,
            ReturnAnnotation::Missing => ReturnKind::Template,
            ReturnAnnotation::Type(ann) => {
                let ty = convert_annotation(ann)?;
                self.return_type = Some(ty.clone());
                if self.unknown_symbol(&ty).is_some() {
                    ReturnKind::Dynamic
                } else {
                    self.return_node = Some(self.graph.add_of_type(None, ty));
                    ReturnKind::Static
                }
            }
        };
        Ok(())
    }

    ////////////////
    // STATEMENTS //
    ////////////////

    fn visit_body(&mut self, body: &[Stmt]) -> CompileResult<()> {
        for stmt in body {
            if self.returned {
                kernel_syntax_error!(stmt.get_info(), "Unreachable statement after return")?
            }
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Assign {dst, expr, i} => self.visit_assign(dst, expr, i),
            Stmt::AnnAssign {dst, ann, expr, i} => match (dst, expr) {
                (Expr::Name {id, ..}, Some(expr)) => {
                    let ty = convert_annotation(ann)?;
                    if let Some(s) = self.unknown_symbol(&ty) {
                        kernel_syntax_error!(i, "Unknown shape symbol {s} in annotation of {id}")?
                    }
                    let value = self.visit_expr(expr)?;
                    self.assign_name(id, value, Some(ty), i)
                },
                (Expr::Name {id, ..}, None) => {
                    kernel_syntax_error!(i, "Declaration of {id} must assign a value")
                },
                (Expr::Subscript {..}, _) => {
                    kernel_not_implemented_error!(i, "Annotated assignment to a subscript is not \
                                                      supported")
                },
                _ => kernel_syntax_error!(i, "Unsupported assignment target {dst}")
            },
            Stmt::AugAssign {dst, op, expr, i} => {
                let rhs = Expr::BinOp {
                    lhs: Box::new(dst.clone()),
                    op: *op,
                    rhs: Box::new(expr.clone()),
                    i: i.clone()
                };
                self.visit_assign(dst, &rhs, i)
            },
            Stmt::Return {value, i} => self.visit_return(value.as_ref(), i),
            Stmt::Expr {e: Expr::Call {func, args, kwargs, i}, ..} => {
                self.visit_call(func, args, kwargs, i)?;
                Ok(())
            },
            Stmt::Expr {e: Expr::String {..}, ..} | Stmt::Pass {..} => Ok(()),
            Stmt::Expr {i, ..} => {
                kernel_syntax_error!(i, "Only function calls may be used as statements")
            },
            Stmt::Delete {i} => kernel_syntax_error!(i, "The del statement is not allowed"),
            Stmt::If {i} => {
                kernel_not_implemented_error!(i, "Conditional statements are not supported")
            },
            Stmt::Loop {i} => kernel_not_implemented_error!(i, "Loops are not supported"),
            Stmt::Unsupported {kind, i} => {
                kernel_syntax_error!(i, "Unsupported statement {kind}")
            },
        }
    }

    fn visit_assign(&mut self, dst: &Expr, expr: &Expr, i: &Info) -> CompileResult<()> {
        match dst {
            Expr::Name {id, ..} => {
                let value = self.visit_expr(expr)?;
                self.assign_name(id, value, None, i)
            },
            Expr::Subscript {target, idx, ..} => {
                let value = self.visit_expr(expr)?;
                self.assign_item(target, idx, value, i)
            },
            _ => kernel_syntax_error!(i, "Unsupported assignment target {dst}")
        }
    }

    fn fresh_name(&mut self, id: &str) -> String {
        self.ssa_counter += 1;
        format!("{id}_{0}", self.ssa_counter)
    }

    // Binds a name to a new node holding the given value. Names are never rebound to an
    // existing node, so every assignment introduces a node of its own.
    fn assign_name(
        &mut self,
        id: &str,
        value: NodeId,
        ann: Option<KernelType>,
        i: &Info
    ) -> CompileResult<()> {
        if self.args.contains_key(id) {
            kernel_syntax_error!(i, "Reassigning the function argument {id} is not allowed")?
        }
        if self.shape_symbols.contains_key(id) {
            kernel_syntax_error!(i, "Reassigning the shape symbol {id} is not allowed")?
        }
        let value_ty = self.graph.ty(value);
        let prev = self.tmp_scalars.get(id).or_else(|| self.tmp_tensors.get(id)).copied();
        let prev_ty = prev.map(|p| self.graph.ty(p));
        let ty = match (ann, prev_ty) {
            (Some(ann), Some(prev_ty)) if ann != prev_ty => {
                kernel_syntax_error!(i, "Re-declaring {id} of type {prev_ty} with type {ann} is \
                                         not allowed")?
            },
            (Some(ann), _) => ann,
            (None, Some(prev_ty)) => prev_ty,
            (None, None) => value_ty.clone()
        };
        if !ty.shape_eq(&value_ty) {
            kernel_syntax_error!(i, "Assigning a value of type {value_ty} to {id} of type {ty} \
                                     is not allowed")?
        }
        let name = if prev.is_some() { self.fresh_name(id) } else { id.to_string() };
        let is_scalar = ty.is_scalar();
        let dst = self.graph.add_of_type(Some(name), ty);
        let kind = if prev.is_some() && !is_scalar { OpKind::DeepCopy } else { OpKind::Copy };
        self.graph.add_op(kind, vec![value], vec![dst]);
        if is_scalar {
            self.tmp_scalars.insert(id.to_string(), dst);
        } else {
            self.tmp_tensors.insert(id.to_string(), dst);
        }
        Ok(())
    }

    fn assign_item(
        &mut self,
        target: &Expr,
        idx: &Expr,
        value: NodeId,
        i: &Info
    ) -> CompileResult<()> {
        let id = match target {
            Expr::Name {id, ..} => id,
            _ => return kernel_syntax_error!(i, "Unsupported assignment target {target}")
        };
        if self.args.contains_key(id) {
            kernel_syntax_error!(i, "Assigning to elements of the function argument {id} is not \
                                     allowed")?
        }
        let dst = match self.tmp_tensors.get(id) {
            Some(dst) => *dst,
            None if self.tmp_scalars.contains_key(id) => {
                return kernel_syntax_error!(i, "Cannot assign to an element of scalar {id}")
            },
            None => return kernel_syntax_error!(i, "Assignment to undefined tensor {id}")
        };
        let rank = self.graph.node(dst).shape().len();
        let indices = self.visit_indices(idx, dst, i)?;
        let idx_nodes = indices.iter()
            .map(|(idx, _)| match idx {
                SliceIndex::Index(n) => Some(*n),
                SliceIndex::Range {..} => None
            })
            .collect::<Option<Vec<NodeId>>>();
        let idx_nodes = match idx_nodes {
            Some(nodes) if nodes.len() == rank => nodes,
            _ => return kernel_syntax_error!(i, "Assignment to {id} must index every dimension \
                                                 by an integer")
        };
        if !self.graph.is_scalar(value) {
            kernel_syntax_error!(i, "Only scalar values can be assigned to an element of {id}")?
        }
        let ty = self.graph.ty(dst);
        let name = self.fresh_name(id);
        let result = self.graph.add_of_type(Some(name), ty);
        let mut inputs = vec![dst, value];
        inputs.extend(idx_nodes);
        self.graph.add_op(OpKind::SetItem, inputs, vec![result]);
        self.tmp_tensors.insert(id.clone(), result);
        Ok(())
    }

    fn visit_return(&mut self, value: Option<&Expr>, i: &Info) -> CompileResult<()> {
        self.returned = true;
        let e = match (self.return_kind, value) {
            (ReturnKind::Void, None) => return Ok(()),
            (ReturnKind::Void, Some(_)) => {
                return kernel_syntax_error!(i, "Function {0} is declared to return nothing",
                                            self.name)
            },
            (_, None) => return kernel_syntax_error!(i, "Function {0} must return a value",
                                                     self.name),
            (_, Some(e)) => e
        };
        let node = self.visit_expr(e)?;
        let ty = self.graph.ty(node);
        match self.return_kind {
            ReturnKind::Template | ReturnKind::Dynamic => {
                self.return_type = Some(ty);
                self.outputs.push(node);
                Ok(())
            },
            ReturnKind::Static => {
                let (declared, dst) = match (&self.return_type, self.return_node) {
                    (Some(ty), Some(dst)) => (ty.clone(), dst),
                    _ => return kernel_internal_error!("Missing return node in {0}", self.name)
                };
                if !declared.shape_eq(&ty) {
                    kernel_runtime_error!(i, "The returned value of type {ty} does not match the \
                                              declared return type {declared}")?
                }
                let kind = if ty.is_scalar() { OpKind::Copy } else { OpKind::DeepCopy };
                self.graph.add_op(kind, vec![node], vec![dst]);
                self.outputs.push(dst);
                Ok(())
            },
            ReturnKind::Void => kernel_internal_error!("Void return in {0}", self.name)
        }
    }

    /////////////////
    // EXPRESSIONS //
    /////////////////

    fn lookup_name(&self, id: &str) -> Option<NodeId> {
        self.tmp_scalars.get(id)
            .or_else(|| self.tmp_tensors.get(id))
            .or_else(|| self.shape_symbols.get(id).map(|s| &s.node))
            .or_else(|| self.args.get(id))
            .copied()
    }

    fn int_constant(&mut self, v: i128, i: &Info) -> CompileResult<NodeId> {
        let sz = dtype_of_int(v, i)?;
        Ok(self.graph.add_constant(Literal::Int(v as i64), sz))
    }

    fn float_constant(&mut self, v: f64, i: &Info) -> CompileResult<NodeId> {
        let sz = dtype_of_float(v, i)?;
        Ok(self.graph.add_constant(Literal::Float(v), sz))
    }

    fn visit_expr(&mut self, e: &Expr) -> CompileResult<NodeId> {
        match e {
            Expr::Name {id, i} => match self.lookup_name(id) {
                Some(n) => Ok(n),
                None => kernel_syntax_error!(i, "Undefined variable {id}")
            },
            Expr::Int {v, i} => self.int_constant(*v, i),
            Expr::Float {v, i} => self.float_constant(*v, i),
            Expr::Bool {v, ..} => Ok(self.graph.add_constant(Literal::Bool(*v), ElemSize::Bool)),
            Expr::String {i, ..} => kernel_syntax_error!(i, "String literals are not supported"),
            Expr::None {i} => kernel_syntax_error!(i, "None is not supported in kernels"),
            Expr::UnOp {op: UnOp::Sub, arg, i} if matches!(arg.as_ref(), Expr::Int {..}) => {
                match integer_literal(e) {
                    Some(v) => self.int_constant(v, i),
                    None => kernel_internal_error!("Expected a negated integer literal")
                }
            },
            Expr::UnOp {op: UnOp::Sub, arg, i} if matches!(arg.as_ref(), Expr::Float {..}) => {
                match arg.as_ref() {
                    Expr::Float {v, ..} => self.float_constant(-*v, i),
                    _ => kernel_internal_error!("Expected a negated float literal")
                }
            },
            Expr::UnOp {op, arg, i} => {
                let arg = self.visit_expr(arg)?;
                self.visit_unop(*op, arg, i)
            },
            Expr::BinOp {lhs, op, rhs, i} => {
                let lhs = self.visit_expr(lhs)?;
                let rhs = self.visit_expr(rhs)?;
                self.visit_binop(*op, lhs, rhs, i)
            },
            Expr::BoolOp {op, values, i} => {
                let values = values.iter()
                    .map(|v| self.visit_expr(v))
                    .collect::<CompileResult<Vec<NodeId>>>()?;
                self.fold_scalar_chain(values[0], values[1..].iter().map(|v| (*op, *v)), i)
            },
            Expr::Compare {lhs, ops, comparators, i} => {
                let lhs = self.visit_expr(lhs)?;
                let rhs = comparators.iter()
                    .map(|c| self.visit_expr(c))
                    .collect::<CompileResult<Vec<NodeId>>>()?;
                self.fold_scalar_chain(lhs, ops.iter().copied().zip(rhs.into_iter()), i)
            },
            Expr::Subscript {target, idx, i} => {
                let target = self.visit_expr(target)?;
                self.visit_subscript(target, idx, i)
            },
            Expr::Slice {i, ..} => {
                kernel_syntax_error!(i, "Slices may only be used to index tensors")
            },
            Expr::Tuple {i, ..} => {
                kernel_syntax_error!(i, "Tuples are only supported as indices and in annotations")
            },
            Expr::Attribute {i, ..} => {
                kernel_syntax_error!(i, "Attribute {e} may only be used as a function")
            },
            Expr::Call {func, args, kwargs, i} => self.visit_call(func, args, kwargs, i),
            Expr::Unsupported {kind, i} => {
                kernel_syntax_error!(i, "Unsupported expression {kind}")
            },
        }
    }

    fn visit_unop(&mut self, op: UnOp, arg: NodeId, i: &Info) -> CompileResult<NodeId> {
        let sz = self.graph.node(arg).elem_size();
        let result_sz = match op {
            UnOp::Sub if sz.is_boolean() => {
                return kernel_syntax_error!(i, "Cannot negate a boolean value")
            },
            UnOp::BitNeg if sz.is_floating_point() => {
                return kernel_syntax_error!(i, "Bitwise negation of {sz} is not supported")
            },
            UnOp::Not => ElemSize::Bool,
            _ => sz
        };
        Ok(self.graph.apply_unary(op, arg, result_sz))
    }

    fn visit_binop(
        &mut self,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        i: &Info
    ) -> CompileResult<NodeId> {
        let lty = self.graph.ty(lhs);
        let rty = self.graph.ty(rhs);
        let (lsz, rsz) = (lty.elem_size(), rty.elem_size());
        if op.is_bitwise() && (lsz.is_floating_point() || rsz.is_floating_point()) {
            kernel_syntax_error!(i, "Bitwise operator {op} is not supported on {lsz} and {rsz}")?
        }
        let sz = op.result_elem_size(&lsz, &rsz);
        let shape = if lty.is_scalar() && rty.is_scalar() {
            None
        } else {
            match broadcast_shape(lty.shape(), rty.shape()) {
                Some(shape) => Some(shape),
                None => {
                    return kernel_syntax_error!(i, "Operands of {op} have incompatible types \
                                                    {lty} and {rty}")
                }
            }
        };
        Ok(self.graph.apply_binary(op, lhs, rhs, sz, shape))
    }

    // Folds a sequence of boolean or comparison operators from left to right, where the result
    // of each step is the left operand of the next step.
    fn fold_scalar_chain<I: Iterator<Item=(BinOp, NodeId)>>(
        &mut self,
        init: NodeId,
        rest: I,
        i: &Info
    ) -> CompileResult<NodeId> {
        rest.fold(Ok(init), |acc, (op, rhs)| {
            let lhs = acc?;
            if self.graph.is_scalar(lhs) && self.graph.is_scalar(rhs) {
                self.visit_binop(op, lhs, rhs, i)
            } else {
                kernel_syntax_error!(i, "Operator {op} is only supported on scalar operands")
            }
        })
    }

    fn require_integer_index(&self, n: NodeId, i: &Info) -> CompileResult<NodeId> {
        let ty = self.graph.ty(n);
        match ty {
            KernelType::Scalar(sz) if sz.is_signed_integer() => Ok(n),
            _ => kernel_syntax_error!(i, "Index of type {ty} is not a signed integer")
        }
    }

    fn dim_node(&mut self, dim: &Dim, i: &Info) -> CompileResult<NodeId> {
        match dim {
            Dim::Const(n) => self.int_constant(*n as i128, i),
            Dim::Sym {name, ..} => match self.shape_symbols.get(name) {
                Some(sym) => Ok(sym.node),
                None => kernel_internal_error!("Unbound shape symbol {name}")
            },
            Dim::Node(id) => Ok(*id)
        }
    }

    // Translates the index of a subscript into one index per dimension it refers to. The
    // boolean flag is set for ranges whose upper bound was omitted.
    fn visit_indices(
        &mut self,
        idx: &Expr,
        target: NodeId,
        i: &Info
    ) -> CompileResult<Vec<(SliceIndex, bool)>> {
        let elems = match idx {
            Expr::Tuple {elems, ..} => elems.iter().collect::<Vec<&Expr>>(),
            e => vec![e]
        };
        let shape = self.graph.node(target).shape().to_vec();
        if shape.is_empty() {
            kernel_syntax_error!(i, "Cannot index a scalar value")?
        }
        if elems.len() > shape.len() {
            kernel_syntax_error!(i, "Too many indices for a tensor of rank {0}", shape.len())?
        }
        elems.into_iter()
            .zip(shape.iter())
            .map(|(e, dim)| match e {
                Expr::Slice {lo, hi, step, i} => {
                    let lower = match lo {
                        Some(lo) => self.visit_expr(lo)?,
                        None => self.graph.add_constant(Literal::Int(0), ElemSize::I8)
                    };
                    let (upper, omitted) = match hi {
                        Some(hi) => (self.visit_expr(hi)?, false),
                        None => (self.dim_node(dim, i)?, true)
                    };
                    let step = match step {
                        Some(step) => self.visit_expr(step)?,
                        None => self.graph.add_constant(Literal::Int(1), ElemSize::I8)
                    };
                    for n in [lower, upper, step] {
                        self.require_integer_index(n, i)?;
                    }
                    if self.constant_value(step) == Some(0) {
                        kernel_syntax_error!(i, "The step of a slice cannot be zero")?
                    }
                    Ok((SliceIndex::Range {lower, upper, step}, omitted))
                },
                _ => {
                    let n = self.visit_expr(e)?;
                    Ok((SliceIndex::Index(self.require_integer_index(n, i)?), false))
                }
            })
            .collect::<CompileResult<Vec<(SliceIndex, bool)>>>()
    }

    fn constant_value(&self, n: NodeId) -> Option<i64> {
        let node = self.graph.node(n);
        match node.value() {
            Some(Literal::Int(v)) if node.is_internal_constant() => Some(v),
            _ => None
        }
    }

    fn slice_size(
        &mut self,
        idx: &SliceIndex,
        omitted_upper: bool,
        dim: &Dim,
        i: &Info
    ) -> CompileResult<Dim> {
        let (lower, upper, step) = match idx {
            SliceIndex::Index(_) => return Ok(Dim::Const(1)),
            SliceIndex::Range {lower, upper, step} => (*lower, *upper, *step)
        };
        let consts = (
            self.constant_value(lower), self.constant_value(upper), self.constant_value(step)
        );
        match consts {
            (Some(l), Some(u), Some(s)) => {
                let (l, u, s) = (l as i128, u as i128, s as i128);
                let n = (floor_div(u - l - 1, s) + 1).max(0);
                match i64::try_from(n) {
                    Ok(n) => Ok(Dim::Const(n)),
                    Err(_) => kernel_range_error!(i, "Slice length {n} does not fit in a 64-bit integer")
                }
            },
            (Some(0), _, Some(1)) if omitted_upper => Ok(dim.clone()),
            _ => {
                let one = self.int_constant(1, i)?;
                let diff = self.visit_binop(BinOp::Sub, upper, lower, i)?;
                let last = self.visit_binop(BinOp::Sub, diff, one, i)?;
                let steps = self.visit_binop(BinOp::FloorDiv, last, step, i)?;
                let size = self.visit_binop(BinOp::Add, steps, one, i)?;
                Ok(Dim::Node(size))
            }
        }
    }

    fn visit_subscript(&mut self, target: NodeId, idx: &Expr, i: &Info) -> CompileResult<NodeId> {
        let indices = self.visit_indices(idx, target, i)?;
        let node = self.graph.node(target);
        let sz = node.elem_size();
        let shape = node.shape().to_vec();
        let is_get = indices.len() == shape.len() &&
            indices.iter().all(|(idx, _)| matches!(idx, SliceIndex::Index(_)));
        let mut inputs = vec![target];
        for (idx, _) in indices.iter() {
            match idx {
                SliceIndex::Index(n) => inputs.push(*n),
                SliceIndex::Range {lower, upper, step} => inputs.extend([*lower, *upper, *step]),
            }
        }
        if is_get {
            let dst = self.graph.add_scalar(None, sz);
            self.graph.add_op(OpKind::GetItem, inputs, vec![dst]);
            Ok(dst)
        } else {
            let mut sizes = vec![];
            for ((idx, omitted), dim) in indices.iter().zip(shape.iter()) {
                sizes.push(self.slice_size(idx, *omitted, dim, i)?);
            }
            sizes.extend(shape[indices.len()..].iter().cloned());
            let trim = sizes[..sizes.len() - 1].iter()
                .take_while(|d| d.is_one())
                .count();
            let dst = self.graph.add_tensor(None, sz, sizes[trim..].to_vec());
            let indices = indices.into_iter().map(|(idx, _)| idx).collect();
            self.graph.add_op(OpKind::Slice {indices, sizes}, inputs, vec![dst]);
            Ok(dst)
        }
    }

    fn literal_kwargs(&self, kwargs: &[Keyword]) -> CompileResult<BTreeMap<String, i64>> {
        kwargs.iter()
            .map(|kw| match integer_literal(&kw.value) {
                Some(v) if i64::try_from(v).is_ok() => Ok((kw.id.clone(), v as i64)),
                _ => kernel_syntax_error!(kw.i, "Keyword argument {0} must be an integer \
                                                 literal", kw.id)
            })
            .collect::<CompileResult<BTreeMap<String, i64>>>()
    }

    fn visit_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[Keyword],
        i: &Info
    ) -> CompileResult<NodeId> {
        match func {
            Expr::Attribute {value, attr, ..} => match value.as_ref() {
                Expr::Name {id: package, ..} => {
                    let numeric = self.numeric;
                    let f = numeric.lookup(package, attr, i)?;
                    let kwargs = self.literal_kwargs(kwargs)?;
                    let args = args.iter()
                        .map(|a| self.visit_expr(a))
                        .collect::<CompileResult<Vec<NodeId>>>()?;
                    f.apply(&mut self.graph, &args, &kwargs, i)
                },
                _ => kernel_not_implemented_error!(i, "Unsupported call to {func}")
            },
            Expr::Name {id, ..} => {
                if !kwargs.is_empty() {
                    kernel_syntax_error!(i, "Keyword arguments are not supported in calls to \
                                             kernel function {id}")?
                }
                let args = args.iter()
                    .map(|a| self.visit_expr(a))
                    .collect::<CompileResult<Vec<NodeId>>>()?;
                self.inline_call(id, args, i)
            },
            _ => kernel_syntax_error!(i, "Unsupported call to {func}")
        }
    }

    // Splices the graph of the called kernel function into this graph. The parameters and shape
    // symbols of the callee are bound to the arguments and their dimensions by copies.
    fn inline_call(&mut self, id: &str, args: Vec<NodeId>, i: &Info) -> CompileResult<NodeId> {
        let arg_types = args.iter()
            .map(|a| self.graph.ty(*a))
            .collect::<Vec<KernelType>>();
        let callee = self.kernels.instantiate(id, &arg_types, self.numeric, self.opts, i)?;
        if !callee.can_inline {
            kernel_not_implemented_error!(i, "Calls to function {id}, which cannot be inlined, \
                                              are not supported")?
        }
        if callee.inputs.len() != args.len() {
            kernel_syntax_error!(i, "Function {id} expects {0} arguments but {1} were given",
                                 callee.inputs.len(), args.len())?
        }

        let mut bindings: BTreeMap<String, Dim> = BTreeMap::new();
        for ((param, pnode), arg_ty) in callee.inputs.iter().zip(arg_types.iter()) {
            let param_ty = callee.graph.ty(*pnode);
            if param_ty.is_scalar() != arg_ty.is_scalar() || param_ty.rank() != arg_ty.rank() {
                kernel_syntax_error!(i, "Parameter {param} of {id} has type {param_ty}, but the \
                                         argument has type {arg_ty}")?
            }
            for (pdim, adim) in param_ty.shape().iter().zip(arg_ty.shape().iter()) {
                match pdim {
                    Dim::Sym {name, ..} => match bindings.get(name) {
                        Some(prev) if prev != adim => {
                            kernel_syntax_error!(i, "Shape symbol {name} of {id} is bound to \
                                                     both {prev} and {adim}")?
                        },
                        Some(_) => (),
                        None => {
                            bindings.insert(name.clone(), adim.clone());
                        }
                    },
                    _ if pdim != adim => {
                        kernel_syntax_error!(i, "Parameter {param} of {id} has type {param_ty}, \
                                                 but the argument has type {arg_ty}")?
                    },
                    _ => ()
                }
            }
        }

        let nodes = self.graph.splice(&callee.graph, |d| match d {
            Dim::Sym {name, ..} => bindings.get(name).cloned().unwrap_or_else(|| d.clone()),
            _ => d.clone()
        });
        for ((_, pnode), arg) in callee.inputs.iter().zip(args.iter()) {
            self.graph.add_op(OpKind::Copy, vec![*arg], vec![nodes[pnode.0]]);
        }
        for (name, sym) in callee.shape_symbols.iter() {
            let dim = match bindings.get(name) {
                Some(dim) => dim.clone(),
                None => return kernel_internal_error!("Shape symbol {name} of {id} is unbound")
            };
            let src = self.dim_node(&dim, i)?;
            self.graph.add_op(OpKind::Copy, vec![src], vec![nodes[sym.node.0]]);
        }
        match callee.outputs.first() {
            Some(out) => Ok(nodes[out.0]),
            None => kernel_internal_error!("Inlined function {id} has no output")
        }
    }

    fn finish(self, def: &FunDef) -> CompileResult<FunctionGraph> {
        let declares_value = matches!(self.return_kind, ReturnKind::Static | ReturnKind::Dynamic);
        if declares_value && self.outputs.is_empty() {
            kernel_syntax_error!(def.i, "Function {0} must return a value", def.id)?
        }
        let can_inline = self.return_kind != ReturnKind::Void && !self.outputs.is_empty();
        Ok(FunctionGraph {
            name: self.name,
            graph: self.graph,
            inputs: self.inputs,
            outputs: self.outputs,
            shape_symbols: self.shape_symbols,
            return_kind: self.return_kind,
            return_type: self.return_type,
            can_inline,
        })
    }
}

/// Builds the graph of a kernel function. The types of unannotated parameters are given by the
/// provided parameter types, which are required when the function is a template.
pub fn build_function(
    def: &FunDef,
    param_types: Option<&[KernelType]>,
    kernels: &mut KernelRegistry,
    numeric: &NumericRegistry,
    opts: &CompileOptions
) -> CompileResult<FunctionGraph> {
    let mut p = FunctionParser::new(&def.id, kernels, numeric, opts);
    p.add_params(def, param_types)?;
    p.set_return_kind(def)?;
    p.visit_body(&def.body)?;
    p.finish(def)
}
