use pyo3::PyErr;
use pyo3::exceptions::*;

use std::error;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    Syntax,
    Range,
    Runtime,
    NotImplemented,
    Internal
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "Kernel syntax error"),
            ErrorKind::Range => write!(f, "Kernel range error"),
            ErrorKind::Runtime => write!(f, "Kernel runtime error"),
            ErrorKind::NotImplemented => write!(f, "Kernel feature not implemented"),
            ErrorKind::Internal => write!(f, "Internal kernel compiler error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    msg: String,
    kind: ErrorKind
}

impl CompileError {
    pub fn syntax_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Syntax}
    }

    pub fn range_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Range}
    }

    pub fn runtime_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Runtime}
    }

    pub fn not_implemented_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::NotImplemented}
    }

    pub fn internal_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Internal}
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl error::Error for CompileError {}
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{0}: {1}", self.kind, &self.msg)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[macro_export]
macro_rules! kernel_syntax_error {
    ($i:expr,$($t:tt)*) => {{
        Err(CompileError::syntax_err($i.error_msg(format!($($t)*))))
    }}
}

#[macro_export]
macro_rules! kernel_range_error {
    ($i:expr,$($t:tt)*) => {{
        Err(CompileError::range_err($i.error_msg(format!($($t)*))))
    }}
}

#[macro_export]
macro_rules! kernel_runtime_error {
    ($i:expr,$($t:tt)*) => {{
        Err(CompileError::runtime_err($i.error_msg(format!($($t)*))))
    }}
}

#[macro_export]
macro_rules! kernel_not_implemented_error {
    ($i:expr,$($t:tt)*) => {{
        Err(CompileError::not_implemented_err($i.error_msg(format!($($t)*))))
    }}
}

// Internal errors indicate that the graph handed to a later stage breaks an invariant the
// builder is responsible for. They carry no source position.
#[macro_export]
macro_rules! kernel_internal_error {
    ($($t:tt)*) => {{
        Err(CompileError::internal_err(format!($($t)*)))
    }}
}

impl From<CompileError> for PyErr {
    fn from(err: CompileError) -> PyErr {
        match err.kind {
            ErrorKind::Syntax => PySyntaxError::new_err(err.msg),
            ErrorKind::Range => PyOverflowError::new_err(err.msg),
            ErrorKind::Runtime => PyRuntimeError::new_err(err.msg),
            ErrorKind::NotImplemented => PyNotImplementedError::new_err(err.msg),
            ErrorKind::Internal => PyAssertionError::new_err(err.msg),
        }
    }
}
