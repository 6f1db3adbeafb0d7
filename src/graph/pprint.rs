use crate::utils::pprint::*;
use super::builder::*;
use super::ir::*;

use itertools::Itertools;

fn pprint_nodes(ids: &[NodeId]) -> String {
    ids.iter().join(", ")
}

fn pprint_subgraph(body: &SubGraph) -> String {
    let ins = body.inputs.iter()
        .map(|(outer, inner)| format!("{inner} <- {outer}"))
        .join(", ");
    let outs = body.outputs.iter()
        .map(|(inner, outer)| format!("{outer} <- {inner}"))
        .join(", ");
    format!("{{{ins}; {outs}}}")
}

fn pprint_node(g: &Graph, id: NodeId) -> String {
    let node = g.node(id);
    let name = match &node.name {
        Some(s) => format!(" ({s})"),
        None => String::new()
    };
    match node.value() {
        Some(v) if node.is_internal_constant() => format!("{id}: {0} = {v}", node.ty()),
        _ => format!("{id}: {0}{name}", node.ty())
    }
}

fn pprint_op(g: &Graph, id: OpId) -> String {
    let op = g.op(id);
    let ins = pprint_nodes(&op.inputs);
    let outs = pprint_nodes(&op.outputs);
    match &op.kind {
        OpKind::UnaryElementWise {op} => format!("{outs} = unary[{op}]({ins})"),
        OpKind::BinaryElementWise {op} => format!("{outs} = binary[{op}]({ins})"),
        OpKind::ElementWise {body} => {
            format!("{outs} = elementwise({ins}) {0}", pprint_subgraph(body))
        },
        OpKind::Reduction {dims, body, ..} => {
            let dims = dims.iter().join(", ");
            format!("{outs} = reduce[{dims}]({ins}) {0}", pprint_subgraph(body))
        },
        OpKind::GetItem => format!("{outs} = getitem({ins})"),
        OpKind::SetItem => format!("{outs} = setitem({ins})"),
        OpKind::Slice {sizes, ..} => {
            format!("{outs} = slice[{0}]({ins})", sizes.iter().join(", "))
        },
        OpKind::Copy => format!("{outs} = copy({ins})"),
        OpKind::DeepCopy => format!("{outs} = deepcopy({ins})"),
    }
}

impl PrettyPrint for FunctionGraph {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let params = self.inputs.iter()
            .map(|(id, n)| format!("{id}: {0}", self.graph.ty(*n)))
            .join(", ");
        let ret = match &self.return_type {
            Some(ty) => format!(" -> {ty}"),
            None => String::new()
        };
        let env = env.incr_indent();
        let indent = env.print_indent();
        let symbols = self.shape_symbols.iter()
            .map(|(s, sym)| format!("{indent}{0} = {s} = dim({1}, {2})", sym.node, sym.arg, sym.axis));
        let items = self.graph.items().iter()
            .map(|item| match item {
                GraphItem::Node(id) => format!("{indent}{0}", pprint_node(&self.graph, *id)),
                GraphItem::Op(id) => format!("{indent}{0}", pprint_op(&self.graph, *id)),
            });
        let body = symbols.chain(items).join("\n");
        let env = env.decr_indent();
        let outs = pprint_nodes(&self.outputs);
        let s = format!(
            "def {0}({params}){ret}: # {1:?}, inline: {2}\n{body}\n{3}return {outs}",
            self.name, self.return_kind, self.can_inline, env.print_indent()
        );
        (env, s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::build_graph;
    use crate::option::CompileOptions;
    use crate::py::ast::*;
    use crate::py::ast_builder::*;
    use crate::utils::ast::BinOp;
    use crate::utils::err::CompileResult;

    use regex::Regex;

    #[test]
    fn print_elementwise_function() -> CompileResult<()> {
        let ann = tensor_ann("float32", vec![var("N")]);
        let def = fun_def(
            "inc", vec![param("x", ann.clone())], returns(ann),
            vec![ret(binop(var("x"), BinOp::Add, float(1.0)))]
        );
        let g = build_graph(vec![def], "inc", &CompileOptions::default())?;
        let s = g.pprint_default();
        assert!(s.starts_with("def inc(x: float32[N]) -> float32[N]: # Static, inline: true\n"));
        assert!(s.contains("  n0: float32[N] (x)\n"));
        assert!(s.contains(" = dim(n0, 0)"));
        assert!(Regex::new(r"n\d+ = elementwise\(n0, n\d+\) \{n\d+ <- n0; n\d+ <- n\d+\}")
            .unwrap()
            .is_match(&s));
        assert!(Regex::new(r"n\d+ = deepcopy\(n\d+\)").unwrap().is_match(&s));
        assert!(s.ends_with(&format!("\nreturn {0}", g.outputs[0])));
        Ok(())
    }

    #[test]
    fn print_constants_with_value() -> CompileResult<()> {
        let def = fun_def(
            "f", vec![param("x", scalar_ann("int32"))], ReturnAnnotation::Missing,
            vec![ret(binop(var("x"), BinOp::Mul, int(3)))]
        );
        let g = build_graph(vec![def], "f", &CompileOptions::default())?;
        let s = g.pprint_default();
        assert!(s.contains("n1: int8 = 3"));
        assert!(s.contains("n2 = binary[*](n0, n1)"));
        Ok(())
    }
}
