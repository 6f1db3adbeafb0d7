pub mod builder;
pub mod eval;
pub mod ir;
pub mod pprint;
pub mod registry;
pub mod types;

use crate::kernel_syntax_error;
use crate::option::CompileOptions;
use crate::py::ast::FunDef;
use crate::utils::err::*;
use crate::utils::info::{Info, InfoNode};

pub use builder::FunctionGraph;
use registry::{KernelRegistry, NumericRegistry};

/// Builds the graph of the main kernel function of a module. The remaining function definitions
/// are available to the main function as inlinable callees.
pub fn build_graph(
    defs: Vec<FunDef>,
    main: &str,
    opts: &CompileOptions
) -> CompileResult<FunctionGraph> {
    let info = match defs.iter().find(|def| def.id == main) {
        Some(def) if def.is_template() => {
            return kernel_syntax_error!(def.get_info(), "The main kernel function {main} \
                                                         must annotate all its parameters")
        },
        Some(def) => def.get_info(),
        None => Info::default()
    };
    let mut kernels = KernelRegistry::new(defs);
    let numeric = NumericRegistry::default();
    kernels.instantiate(main, &[], &numeric, opts, &info)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::py::ast_builder::*;
    use crate::py::ast::ReturnAnnotation;
    use crate::test::*;

    #[test]
    fn template_main_is_rejected() {
        let def = fun_def("f", vec![untyped_param("x")], ReturnAnnotation::Missing,
                          vec![ret(var("x"))]);
        let r = build_graph(vec![def], "f", &CompileOptions::default());
        assert_error_kind(r, ErrorKind::Syntax);
    }

    #[test]
    fn unknown_main_is_rejected() {
        let r = build_graph(vec![], "main", &CompileOptions::default());
        assert_error_message(r, "unknown function main");
    }
}
