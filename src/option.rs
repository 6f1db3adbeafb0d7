use crate::utils::ast::ElemSize;

use pyo3::prelude::*;
use pyo3::exceptions::PyValueError;

#[pyclass]
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /////////////////////
    // FRONT-END FLAGS //
    /////////////////////

    // The element type of the scalar values bound to shape symbols, such as 'M' in an argument
    // annotated as 'int32[M, N]', when they are referenced in the body of a kernel.
    #[pyo3(get)]
    pub index_dtype: ElemSize,

    ///////////////////
    // CODEGEN FLAGS //
    ///////////////////

    // Overrides the symbol name of the emitted function. By default, the name of the main
    // kernel function is used.
    #[pyo3(get, set)]
    pub func_name: Option<String>,

    // Enable to make the compiler print the constructed graph and the emitted text to standard
    // output.
    #[pyo3(get, set)]
    pub debug_print: bool,

    // Enable to have the compiler report the time spent in the builder and the printer.
    #[pyo3(get, set)]
    pub debug_perf: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            index_dtype: ElemSize::I64,
            func_name: None,
            debug_print: false,
            debug_perf: false,
        }
    }
}

impl CompileOptions {
    pub fn is_debug_enabled(&self) -> bool {
        self.debug_print || self.debug_perf
    }
}

#[pymethods]
impl CompileOptions {
    #[new]
    fn _compile_options_new() -> Self {
        CompileOptions::default()
    }

    // Shape symbols are sizes, so only signed integer element types can represent them.
    #[setter]
    fn set_index_dtype(&mut self, sz: ElemSize) -> PyResult<()> {
        if sz.is_signed_integer() {
            self.index_dtype = sz;
            Ok(())
        } else {
            Err(PyValueError::new_err(format!("Shape symbols cannot have element type {sz}")))
        }
    }

    #[pyo3(name = "is_debug_enabled")]
    fn py_is_debug_enabled(&self) -> bool {
        self.is_debug_enabled()
    }
}

// Constructs the default options object with debug printing enabled.
#[pyfunction]
pub fn debug() -> PyResult<CompileOptions> {
    let mut opts = CompileOptions::default();
    opts.debug_print = true;
    Ok(opts)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_options_are_quiet() {
        let opts = CompileOptions::default();
        assert!(!opts.is_debug_enabled());
        assert_eq!(opts.index_dtype, ElemSize::I64);
    }

    #[test]
    fn index_dtype_rejects_floats() {
        let mut opts = CompileOptions::default();
        assert!(opts.set_index_dtype(ElemSize::F32).is_err());
        assert!(opts.set_index_dtype(ElemSize::I32).is_ok());
        assert_eq!(opts.index_dtype, ElemSize::I32);
    }
}
