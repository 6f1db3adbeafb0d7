use crate::kernel_internal_error;
use crate::kernel_not_implemented_error;
use crate::kernel_syntax_error;
use crate::option::CompileOptions;
use crate::py::ast::{FunDef, Param};
use crate::utils::ast::{BinOp, ElemSize};
use crate::utils::err::*;
use crate::utils::info::Info;
use crate::utils::reduce;
use super::builder::{build_function, FunctionGraph};
use super::ir::*;
use super::types::*;

use itertools::Itertools;

use std::collections::{BTreeMap, BTreeSet};

/// A function of an external numeric library that can be called from a kernel. Applying it
/// appends the operators computing its result to the graph.
pub trait NumericFunction {
    fn apply(
        &self,
        graph: &mut Graph,
        args: &[NodeId],
        kwargs: &BTreeMap<String, i64>,
        i: &Info
    ) -> CompileResult<NodeId>;
}

struct Reduce {
    name: &'static str,
    op: BinOp
}

impl Reduce {
    fn reduced_dims(
        &self,
        rank: usize,
        kwargs: &BTreeMap<String, i64>,
        i: &Info
    ) -> CompileResult<Vec<usize>> {
        if let Some(kw) = kwargs.keys().find(|k| k.as_str() != "axis") {
            return kernel_syntax_error!(i, "Unsupported keyword argument {kw} to {0}", self.name);
        }
        match kwargs.get("axis") {
            Some(&axis) => {
                let idx = if axis < 0 { axis + rank as i64 } else { axis };
                if idx < 0 || idx >= rank as i64 {
                    kernel_syntax_error!(i, "Axis {axis} is out of bounds for a tensor of rank {rank}")
                } else {
                    Ok(vec![idx as usize])
                }
            },
            None => Ok((0..rank).collect())
        }
    }
}

impl NumericFunction for Reduce {
    fn apply(
        &self,
        graph: &mut Graph,
        args: &[NodeId],
        kwargs: &BTreeMap<String, i64>,
        i: &Info
    ) -> CompileResult<NodeId> {
        let arg = match args {
            [arg] => *arg,
            _ => return kernel_syntax_error!(i, "{0} expects exactly one argument", self.name)
        };
        if graph.is_scalar(arg) {
            return kernel_syntax_error!(i, "The argument of {0} must be a tensor", self.name);
        }
        let rank = graph.node(arg).shape().len();
        let dims = self.reduced_dims(rank, kwargs, i)?;
        let sz = reduce::accumulator_elem_size(&self.op, &graph.node(arg).elem_size());
        match reduce::neutral_element(&self.op, &sz) {
            Some(init) => Ok(graph.apply_reduction(self.op, arg, dims, sz, init)),
            None => kernel_internal_error!("No neutral element for reduction {0}", self.op)
        }
    }
}

/// The functions of external numeric libraries callable from kernels, looked up by the package
/// alias and the function name used at the call site.
pub struct NumericRegistry {
    packages: BTreeSet<String>,
    functions: BTreeMap<String, Box<dyn NumericFunction>>,
}

impl NumericRegistry {
    pub fn empty() -> NumericRegistry {
        NumericRegistry {packages: BTreeSet::new(), functions: BTreeMap::new()}
    }

    pub fn with_package(mut self, alias: &str) -> NumericRegistry {
        self.packages.insert(alias.to_string());
        self
    }

    pub fn with_function(mut self, name: &str, f: Box<dyn NumericFunction>) -> NumericRegistry {
        self.functions.insert(name.to_string(), f);
        self
    }

    pub fn lookup(
        &self,
        package: &str,
        name: &str,
        i: &Info
    ) -> CompileResult<&dyn NumericFunction> {
        if !self.packages.contains(package) {
            kernel_not_implemented_error!(i, "Calls to functions of package {package} are not \
                                              supported")
        } else if let Some(f) = self.functions.get(name) {
            Ok(f.as_ref())
        } else {
            kernel_not_implemented_error!(i, "Function {package}.{name} is not supported")
        }
    }
}

impl Default for NumericRegistry {
    fn default() -> Self {
        let reductions = [
            ("sum", BinOp::Add), ("prod", BinOp::Mul), ("max", BinOp::Max), ("min", BinOp::Min)
        ];
        reductions.into_iter()
            .fold(NumericRegistry::empty(), |reg, (name, op)| {
                reg.with_function(name, Box::new(Reduce {name, op}))
            })
            .with_package("np")
            .with_package("numpy")
    }
}

/// The kernel functions of a module. Functions are parsed on demand the first time they are
/// called, and template functions are parsed once per distinct list of argument types.
pub struct KernelRegistry {
    defs: BTreeMap<String, FunDef>,
    parsed: BTreeMap<String, FunctionGraph>,
    in_progress: BTreeSet<String>,
}

// Replaces the dimensions of the template arguments by fresh symbols, so that the parsed template
// is independent of the shapes of the caller. Only constant dimensions are kept. Dimensions that
// are equal in the caller are replaced by the same symbol, named after the first parameter and
// axis where they occur, so the cache key records which dimensions are shared.
fn generalize_types(params: &[Param], arg_types: &[KernelType]) -> Vec<KernelType> {
    let mut fresh: BTreeMap<Dim, Dim> = BTreeMap::new();
    params.iter()
        .zip(arg_types.iter())
        .map(|(p, ty)| match ty {
            KernelType::Scalar(sz) => KernelType::Scalar(*sz),
            KernelType::Tensor {sz, shape} => {
                let shape = shape.iter()
                    .enumerate()
                    .map(|(axis, d)| match d {
                        Dim::Const(n) => Dim::Const(*n),
                        _ => fresh.entry(d.clone())
                            .or_insert_with(|| Dim::sym(&format!("{0}_dim{axis}", p.id)))
                            .clone()
                    })
                    .collect::<Vec<Dim>>();
                KernelType::Tensor {sz: *sz, shape}
            }
        })
        .collect()
}

impl KernelRegistry {
    pub fn new(defs: Vec<FunDef>) -> KernelRegistry {
        let defs = defs.into_iter()
            .map(|def| (def.id.clone(), def))
            .collect::<BTreeMap<String, FunDef>>();
        KernelRegistry {defs, parsed: BTreeMap::new(), in_progress: BTreeSet::new()}
    }

    /// Produces the graph of the kernel function with the given name, as called with arguments
    /// of the given types. For template functions, the unannotated parameters take the types of
    /// the arguments.
    pub fn instantiate(
        &mut self,
        id: &str,
        arg_types: &[KernelType],
        numeric: &NumericRegistry,
        opts: &CompileOptions,
        i: &Info
    ) -> CompileResult<FunctionGraph> {
        let def = match self.defs.get(id) {
            Some(def) => def.clone(),
            None => return kernel_syntax_error!(i, "Call to unknown function {id}")
        };
        let param_types = if def.is_template() {
            if def.params.len() != arg_types.len() {
                return kernel_syntax_error!(
                    i, "Function {id} expects {0} arguments but {1} were given",
                    def.params.len(), arg_types.len()
                );
            }
            Some(generalize_types(&def.params, arg_types))
        } else {
            None
        };
        let key = match &param_types {
            Some(types) => format!("{id}({})", types.iter().join(", ")),
            None => id.to_string()
        };
        if let Some(g) = self.parsed.get(&key) {
            return Ok(g.clone());
        }
        if self.in_progress.contains(id) {
            return kernel_not_implemented_error!(i, "Recursive call to function {id} is not \
                                                     supported");
        }
        self.in_progress.insert(id.to_string());
        let result = build_function(&def, param_types.as_deref(), self, numeric, opts);
        self.in_progress.remove(id);
        let g = result?;
        self.parsed.insert(key, g.clone());
        Ok(g)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::py::ast_builder::untyped_param;
    use crate::test::*;

    fn tensor(g: &mut Graph, sz: ElemSize, n: usize) -> NodeId {
        let shape = (0..n).map(|i| Dim::sym(&format!("D{i}"))).collect::<Vec<Dim>>();
        g.add_tensor(Some("a".to_string()), sz, shape)
    }

    fn kwargs(axis: Option<i64>) -> BTreeMap<String, i64> {
        axis.into_iter().map(|a| ("axis".to_string(), a)).collect()
    }

    #[test]
    fn numpy_aliases_resolve() {
        let reg = NumericRegistry::default();
        let i = Info::default();
        assert!(reg.lookup("np", "sum", &i).is_ok());
        assert!(reg.lookup("numpy", "prod", &i).is_ok());
        assert_error_kind(reg.lookup("np", "cumsum", &i).map(|_| ()), ErrorKind::NotImplemented);
        assert_error_kind(reg.lookup("math", "sum", &i).map(|_| ()), ErrorKind::NotImplemented);
    }

    #[test]
    fn sum_of_integers_accumulates_in_int64() -> CompileResult<()> {
        let reg = NumericRegistry::default();
        let i = Info::default();
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::I32, 2);
        let r = reg.lookup("np", "sum", &i)?.apply(&mut g, &[a], &kwargs(None), &i)?;
        assert_eq!(g.ty(r), KernelType::Scalar(ElemSize::I64));
        Ok(())
    }

    #[test]
    fn max_keeps_element_type() -> CompileResult<()> {
        let reg = NumericRegistry::default();
        let i = Info::default();
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::F32, 2);
        let r = reg.lookup("np", "max", &i)?.apply(&mut g, &[a], &kwargs(Some(-1)), &i)?;
        assert_eq!(g.ty(r), KernelType::Tensor {sz: ElemSize::F32, shape: vec![Dim::sym("D0")]});
        Ok(())
    }

    #[test]
    fn axis_out_of_bounds() {
        let reg = NumericRegistry::default();
        let i = Info::default();
        let mut g = Graph::new();
        let a = tensor(&mut g, ElemSize::F32, 2);
        let r = reg.lookup("np", "sum", &i)
            .and_then(|f| f.apply(&mut g, &[a], &kwargs(Some(2)), &i));
        assert_error_kind(r, ErrorKind::Syntax);
    }

    #[test]
    fn reduction_of_scalar_fails() {
        let reg = NumericRegistry::default();
        let i = Info::default();
        let mut g = Graph::new();
        let s = g.add_scalar(None, ElemSize::I32);
        let r = reg.lookup("np", "sum", &i)
            .and_then(|f| f.apply(&mut g, &[s], &kwargs(None), &i));
        assert_error_kind(r, ErrorKind::Syntax);
    }

    #[test]
    fn generalized_template_types() {
        let tensor = |shape| KernelType::Tensor {sz: ElemSize::I32, shape};
        let params = vec![untyped_param("x"), untyped_param("y"), untyped_param("z")];
        let args = vec![
            tensor(vec![Dim::sym("M"), Dim::Const(3), Dim::Node(NodeId(4))]),
            tensor(vec![Dim::sym("N"), Dim::sym("M")]),
            KernelType::Scalar(ElemSize::F32),
        ];
        let expected = vec![
            tensor(vec![Dim::sym("x_dim0"), Dim::Const(3), Dim::sym("x_dim2")]),
            tensor(vec![Dim::sym("y_dim0"), Dim::sym("x_dim0")]),
            KernelType::Scalar(ElemSize::F32),
        ];
        assert_eq!(generalize_types(&params, &args), expected);
    }
}
