pub mod ast;
#[cfg(test)]
pub mod ast_builder;
mod from_py;

pub use from_py::to_kernel_defs;

#[macro_export]
macro_rules! py_syntax_error {
    ($i:expr, $($t:tt)*) => {
        Err(Into::<PyErr>::into(CompileError::syntax_err($i.error_msg(format!($($t)*)))))
    }
}
