use crate::utils::ast::*;
use super::types::*;

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{0}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Scalar {value: Option<Literal>, sz: ElemSize, is_internal_constant: bool},
    Tensor {sz: ElemSize, shape: Vec<Dim>},
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub kind: NodeKind,
    pub producer: Option<OpId>,
    pub consumers: Vec<OpId>,
}

impl Node {
    pub fn ty(&self) -> KernelType {
        match &self.kind {
            NodeKind::Scalar {sz, ..} => KernelType::Scalar(*sz),
            NodeKind::Tensor {sz, shape} => KernelType::Tensor {sz: *sz, shape: shape.clone()},
        }
    }

    pub fn elem_size(&self) -> ElemSize {
        match &self.kind {
            NodeKind::Scalar {sz, ..} | NodeKind::Tensor {sz, ..} => *sz
        }
    }

    pub fn shape(&self) -> &[Dim] {
        match &self.kind {
            NodeKind::Scalar {..} => &[],
            NodeKind::Tensor {shape, ..} => shape,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar {..})
    }

    pub fn value(&self) -> Option<Literal> {
        match &self.kind {
            NodeKind::Scalar {value, ..} => *value,
            NodeKind::Tensor {..} => None,
        }
    }

    pub fn is_internal_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar {is_internal_constant: true, ..})
    }
}

/// Describes the per-element computation of an elementwise or reduction operator. Tensor inputs
/// of the operator are bound to scalar placeholder nodes of the body, and the results computed
/// in the body are bound to the outputs of the operator. Scalar inputs are read directly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubGraph {
    pub inputs: Vec<(NodeId, NodeId)>,
    pub outputs: Vec<(NodeId, NodeId)>,
}

impl SubGraph {
    pub fn inner_input(&self, outer: NodeId) -> Option<NodeId> {
        self.inputs.iter()
            .find(|(o, _)| *o == outer)
            .map(|(_, inner)| *inner)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SliceIndex {
    Index(NodeId),
    Range {lower: NodeId, upper: NodeId, step: NodeId},
}

#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    UnaryElementWise {op: UnOp},
    BinaryElementWise {op: BinOp},
    ElementWise {body: SubGraph},
    Reduction {dims: Vec<usize>, body: SubGraph, init_values: Vec<NodeId>},
    // Inputs are the tensor followed by one index per dimension.
    GetItem,
    // Inputs are the tensor, the stored value, and one index per dimension.
    SetItem,
    // Inputs are the tensor followed by the nodes referred to by the indices. The sizes give
    // the extent of every dimension of the selected region, before leading unit dimensions are
    // dropped from the shape of the result.
    Slice {indices: Vec<SliceIndex>, sizes: Vec<Dim>},
    Copy,
    DeepCopy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Op {
    pub kind: OpKind,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GraphItem {
    Node(NodeId),
    Op(OpId),
}

/// An arena of nodes and operators. Both are referred to by their index in the arena, and the
/// items are additionally recorded in the order they were created.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    ops: Vec<Op>,
    items: Vec<GraphItem>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn op(&self, id: OpId) -> &Op {
        &self.ops[id.0]
    }

    pub fn items(&self) -> &[GraphItem] {
        &self.items
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn ty(&self, id: NodeId) -> KernelType {
        self.node(id).ty()
    }

    pub fn is_scalar(&self, id: NodeId) -> bool {
        self.node(id).is_scalar()
    }

    fn add_node(&mut self, name: Option<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {name, kind, producer: None, consumers: vec![]});
        self.items.push(GraphItem::Node(id));
        id
    }

    pub fn add_scalar(&mut self, name: Option<String>, sz: ElemSize) -> NodeId {
        let kind = NodeKind::Scalar {value: None, sz, is_internal_constant: false};
        self.add_node(name, kind)
    }

    pub fn add_constant(&mut self, value: Literal, sz: ElemSize) -> NodeId {
        let kind = NodeKind::Scalar {value: Some(value), sz, is_internal_constant: true};
        self.add_node(None, kind)
    }

    pub fn add_tensor(&mut self, name: Option<String>, sz: ElemSize, shape: Vec<Dim>) -> NodeId {
        self.add_node(name, NodeKind::Tensor {sz, shape})
    }

    pub fn add_of_type(&mut self, name: Option<String>, ty: KernelType) -> NodeId {
        match ty {
            KernelType::Scalar(sz) => self.add_scalar(name, sz),
            KernelType::Tensor {sz, shape} => self.add_tensor(name, sz, shape),
        }
    }

    /// Records an operator reading the given inputs and producing the given outputs, and wires
    /// up the producer and consumer edges of the involved nodes.
    pub fn add_op(&mut self, kind: OpKind, inputs: Vec<NodeId>, outputs: Vec<NodeId>) -> OpId {
        let id = OpId(self.ops.len());
        for inp in inputs.iter() {
            self.nodes[inp.0].consumers.push(id);
        }
        for out in outputs.iter() {
            self.nodes[out.0].producer = Some(id);
        }
        self.ops.push(Op {kind, inputs, outputs});
        self.items.push(GraphItem::Op(id));
        id
    }

    fn placeholder(&mut self, outer: NodeId, sz: ElemSize) -> NodeId {
        let name = self.node(outer).name.clone();
        self.add_scalar(name, sz)
    }

    /// Applies a unary operator. Scalar arguments yield a scalar operator, while a tensor
    /// argument yields an elementwise operator whose body applies the operator to one element.
    pub fn apply_unary(&mut self, op: UnOp, arg: NodeId, sz: ElemSize) -> NodeId {
        if self.is_scalar(arg) {
            let dst = self.add_scalar(None, sz);
            self.add_op(OpKind::UnaryElementWise {op}, vec![arg], vec![dst]);
            dst
        } else {
            let shape = self.node(arg).shape().to_vec();
            let x = self.placeholder(arg, self.node(arg).elem_size());
            let y = self.apply_unary(op, x, sz);
            let dst = self.add_tensor(None, sz, shape);
            let body = SubGraph {inputs: vec![(arg, x)], outputs: vec![(y, dst)]};
            self.add_op(OpKind::ElementWise {body}, vec![arg], vec![dst]);
            dst
        }
    }

    /// Applies a binary operator. When either operand is a tensor, the result is a tensor of the
    /// given shape computed by an elementwise operator, where scalar operands are used as-is in
    /// its body.
    pub fn apply_binary(
        &mut self,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        sz: ElemSize,
        shape: Option<Vec<Dim>>
    ) -> NodeId {
        match shape {
            None => {
                let dst = self.add_scalar(None, sz);
                self.add_op(OpKind::BinaryElementWise {op}, vec![lhs, rhs], vec![dst]);
                dst
            },
            Some(shape) => {
                let mut body = SubGraph::default();
                let mut bind = |g: &mut Graph, id: NodeId| {
                    if g.is_scalar(id) {
                        id
                    } else if let Some(inner) = body.inner_input(id) {
                        inner
                    } else {
                        let x = g.placeholder(id, g.node(id).elem_size());
                        body.inputs.push((id, x));
                        x
                    }
                };
                let x = bind(self, lhs);
                let y = bind(self, rhs);
                let z = self.apply_binary(op, x, y, sz, None);
                let dst = self.add_tensor(None, sz, shape);
                body.outputs.push((z, dst));
                self.add_op(OpKind::ElementWise {body}, vec![lhs, rhs], vec![dst]);
                dst
            }
        }
    }

    /// Reduces the given dimensions of a tensor by repeatedly combining an accumulator,
    /// initialized to the given value, with the elements of the tensor.
    pub fn apply_reduction(
        &mut self,
        op: BinOp,
        arg: NodeId,
        dims: Vec<usize>,
        sz: ElemSize,
        init: Literal
    ) -> NodeId {
        let init = self.add_constant(init, sz);
        let x = self.placeholder(arg, self.node(arg).elem_size());
        let acc = self.add_scalar(None, sz);
        let next = self.apply_binary(op, x, acc, sz, None);
        let shape = self.node(arg).shape().iter()
            .enumerate()
            .filter(|(idx, _)| !dims.contains(idx))
            .map(|(_, d)| d.clone())
            .collect::<Vec<Dim>>();
        let dst = if shape.is_empty() {
            self.add_scalar(None, sz)
        } else {
            self.add_tensor(None, sz, shape)
        };
        let body = SubGraph {inputs: vec![(arg, x), (init, acc)], outputs: vec![(next, dst)]};
        let kind = OpKind::Reduction {dims, body, init_values: vec![init]};
        self.add_op(kind, vec![arg, init], vec![dst]);
        dst
    }

    /// Appends all nodes and operators of another graph to this graph, preserving their order.
    /// The symbolic dimensions of the appended nodes are replaced using the provided function.
    /// Returns the identifiers of the appended nodes, indexed by their identifier in the other
    /// graph.
    pub fn splice<F: Fn(&Dim) -> Dim>(&mut self, other: &Graph, subst: F) -> Vec<NodeId> {
        let node_ofs = self.nodes.len();
        let op_ofs = self.ops.len();
        let rn = |id: &NodeId| NodeId(id.0 + node_ofs);
        let ro = |id: &OpId| OpId(id.0 + op_ofs);
        let rdim = |d: &Dim| match d {
            Dim::Node(id) => Dim::Node(rn(id)),
            Dim::Sym {..} => subst(d),
            Dim::Const(_) => d.clone()
        };
        let rsub = |s: &SubGraph| SubGraph {
            inputs: s.inputs.iter().map(|(o, i)| (rn(o), rn(i))).collect(),
            outputs: s.outputs.iter().map(|(i, o)| (rn(i), rn(o))).collect(),
        };
        for node in other.nodes.iter() {
            let kind = match &node.kind {
                NodeKind::Tensor {sz, shape} => {
                    NodeKind::Tensor {sz: *sz, shape: shape.iter().map(rdim).collect()}
                },
                k @ NodeKind::Scalar {..} => k.clone()
            };
            self.nodes.push(Node {
                name: node.name.clone(),
                kind,
                producer: node.producer.as_ref().map(ro),
                consumers: node.consumers.iter().map(ro).collect(),
            });
        }
        for op in other.ops.iter() {
            let kind = match &op.kind {
                OpKind::ElementWise {body} => OpKind::ElementWise {body: rsub(body)},
                OpKind::Reduction {dims, body, init_values} => OpKind::Reduction {
                    dims: dims.clone(),
                    body: rsub(body),
                    init_values: init_values.iter().map(rn).collect()
                },
                OpKind::Slice {indices, sizes} => OpKind::Slice {
                    sizes: sizes.iter().map(rdim).collect(),
                    indices: indices.iter()
                        .map(|idx| match idx {
                            SliceIndex::Index(id) => SliceIndex::Index(rn(id)),
                            SliceIndex::Range {lower, upper, step} => SliceIndex::Range {
                                lower: rn(lower), upper: rn(upper), step: rn(step)
                            }
                        })
                        .collect()
                },
                k => k.clone()
            };
            self.ops.push(Op {
                kind,
                inputs: op.inputs.iter().map(rn).collect(),
                outputs: op.outputs.iter().map(rn).collect(),
            });
        }
        for item in other.items.iter() {
            let item = match item {
                GraphItem::Node(id) => GraphItem::Node(rn(id)),
                GraphItem::Op(id) => GraphItem::Op(ro(id)),
            };
            self.items.push(item);
        }
        (0..other.nodes.len()).map(|idx| NodeId(idx + node_ofs)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tensor(g: &mut Graph, sz: ElemSize, dims: &[&str]) -> NodeId {
        let shape = dims.iter().map(|s| Dim::sym(s)).collect::<Vec<Dim>>();
        g.add_tensor(None, sz, shape)
    }

    #[test]
    fn operator_wires_edges() {
        let mut g = Graph::new();
        let a = g.add_scalar(Some("a".to_string()), ElemSize::I32);
        let b = g.add_constant(Literal::Int(2), ElemSize::I8);
        let c = g.apply_binary(BinOp::Add, a, b, ElemSize::I32, None);
        let op = g.node(c).producer.unwrap();
        assert_eq!(g.op(op).inputs, vec![a, b]);
        assert_eq!(g.op(op).outputs, vec![c]);
        assert_eq!(g.node(a).consumers, vec![op]);
        assert_eq!(g.node(b).consumers, vec![op]);
    }

    #[test]
    fn items_follow_creation_order() {
        let mut g = Graph::new();
        let a = g.add_scalar(None, ElemSize::I32);
        let b = g.apply_unary(UnOp::Sub, a, ElemSize::I32);
        assert_eq!(g.items(), &[
            GraphItem::Node(a), GraphItem::Node(b), GraphItem::Op(OpId(0))
        ]);
    }

    #[test]
    fn elementwise_body_binds_tensor_inputs_only() {
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::F32, &["M", "N"]);
        let s = g.add_constant(Literal::Float(1.5), ElemSize::F16);
        let shape = g.node(a).shape().to_vec();
        let c = g.apply_binary(BinOp::Mul, a, s, ElemSize::F32, Some(shape));
        let op = g.op(g.node(c).producer.unwrap());
        match &op.kind {
            OpKind::ElementWise {body} => {
                assert_eq!(body.inputs.len(), 1);
                assert_eq!(body.inputs[0].0, a);
                assert!(body.inner_input(s).is_none());
                let (inner, outer) = body.outputs[0];
                assert_eq!(outer, c);
                let inner_op = g.op(g.node(inner).producer.unwrap());
                assert_eq!(inner_op.inputs, vec![body.inputs[0].1, s]);
            },
            k => panic!("unexpected operator {k:?}")
        }
    }

    #[test]
    fn elementwise_same_operand_bound_once() {
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::I32, &["N"]);
        let shape = g.node(a).shape().to_vec();
        let c = g.apply_binary(BinOp::Add, a, a, ElemSize::I32, Some(shape));
        match &g.op(g.node(c).producer.unwrap()).kind {
            OpKind::ElementWise {body} => assert_eq!(body.inputs.len(), 1),
            k => panic!("unexpected operator {k:?}")
        }
    }

    #[test]
    fn reduction_rank_law() {
        for (rank, dims) in [(1, vec![0]), (2, vec![1]), (3, vec![0, 2]), (3, vec![0, 1, 2])] {
            let mut g = Graph::new();
            let names = ["A", "B", "C"];
            let a = tensor(&mut g, ElemSize::I32, &names[..rank]);
            let k = dims.len();
            let r = g.apply_reduction(BinOp::Add, a, dims, ElemSize::I64, Literal::Int(0));
            assert_eq!(g.node(r).shape().len(), rank - k);
            assert_eq!(g.node(r).is_scalar(), rank == k);
        }
    }

    #[test]
    fn reduction_keeps_remaining_dimensions() {
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::F32, &["M", "N"]);
        let r = g.apply_reduction(BinOp::Max, a, vec![0], ElemSize::F32, Literal::Float(0.0));
        assert_eq!(g.node(r).shape(), &[Dim::sym("N")]);
    }

    #[test]
    fn splice_remaps_identifiers() {
        let mut callee = Graph::new();
        let a = tensor(&mut callee, ElemSize::I32, &["M"]);
        let shape = callee.node(a).shape().to_vec();
        let b = callee.apply_binary(BinOp::Add, a, a, ElemSize::I32, Some(shape));

        let mut g = Graph::new();
        let x = g.add_scalar(None, ElemSize::I64);
        let nodes = g.splice(&callee, |_| Dim::Const(5));
        assert_eq!(nodes.len(), callee.num_nodes());
        let b2 = nodes[b.0];
        assert_ne!(b2, b);
        assert!(nodes.iter().all(|n| *n != x));
        assert_eq!(g.node(b2).shape(), &[Dim::Const(5)]);
        let op = g.op(g.node(b2).producer.unwrap());
        assert_eq!(op.inputs, vec![nodes[a.0], nodes[a.0]]);
        assert_eq!(g.items().len(), 1 + callee.items().len());
    }
}
