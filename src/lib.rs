pub mod graph;
pub mod linalg;
pub mod option;
pub mod py;
pub mod utils;


use crate::option::CompileOptions;
use crate::utils::debug::DebugEnv;
use crate::utils::err::CompileResult;
use crate::utils::pprint::PrettyPrint;

use std::ffi::CString;

use pyo3::prelude::*;
use pyo3::types::PyCapsule;

/// Builds the graph of the main kernel function among the given definitions and prints it as a
/// function of the linalg dialect. The remaining definitions may be called from the main
/// function.
pub fn compile_to_linalg(
    defs: py::ast::Ast,
    main: &str,
    opts: &CompileOptions
) -> CompileResult<String> {
    let mut debug_env = DebugEnv::new(opts);

    // Walk the AST of the main function to construct its graph, inlining or specializing the
    // kernel functions it calls along the way.
    let g = graph::build_graph(defs, main, opts)?;
    debug_env.print("Kernel graph", &g);
    debug_env.report_time("builder");

    // Lower the graph to buffer-based operations and render them as text.
    let def = linalg::from_graph(&g, opts)?;
    let s = def.pprint_default();
    debug_env.print_text("Linalg output", &s);
    debug_env.report_time("printer");

    Ok(s)
}

#[pyfunction]
fn parse_kernels<'py>(
    py_ast : Bound<'py, PyAny>,
    filepath : String,
    fst_line : usize
) -> PyResult<Bound<'py, PyCapsule>> {
    let py = py_ast.py();

    // Convert the function definitions of the provided Python module (parsed by the 'ast'
    // module of Python) to the kernel AST using Rust data types.
    let defs = py::to_kernel_defs(py_ast, filepath, fst_line)?;

    // Wrap the AST in a capsule that we return to Python, so that it can be compiled later
    // without being converted again.
    let name = CString::new("matxkernel kernel AST")?;
    Ok(PyCapsule::new::<py::ast::Ast>(py, defs, Some(name))?)
}

#[pyfunction]
fn compile_kernel<'py>(
    ast_cap : Bound<'py, PyCapsule>,
    main : String,
    opts : CompileOptions
) -> PyResult<String> {
    // Extract a reference to the AST parsed earlier.
    let defs : &py::ast::Ast = unsafe {
        ast_cap.reference()
    };
    Ok(compile_to_linalg(defs.clone(), &main, &opts)?)
}

#[pymodule]
fn matxkernel(m : &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_kernels, m)?)?;
    m.add_function(wrap_pyfunction!(compile_kernel, m)?)?;
    m.add_function(wrap_pyfunction!(option::debug, m)?)?;
    m.add_class::<option::CompileOptions>()?;
    m.add_class::<utils::ast::ElemSize>()?;
    Ok(())
}
