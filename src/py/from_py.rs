use crate::py_syntax_error;
use crate::utils::ast::*;
use crate::utils::err::*;
use crate::utils::info::*;
use super::ast::*;

use pyo3::PyTypeInfo;
use pyo3::prelude::*;
use pyo3::types;

struct ConvertEnv<'py, 'a> {
    ast: Bound<'py, PyModule>,
    filepath: &'a str,
    line_ofs: usize,
}

fn extract_node_info<'py>(node: &Bound<'py, PyAny>) -> PyResult<Info> {
    let l1 = node.getattr("lineno")?.extract::<usize>()?;
    let c1 = node.getattr("col_offset")?.extract::<usize>()?;
    let start = FilePos::new(l1, c1);
    let l2 = match node.getattr("end_lineno") {
        Ok(line) if !line.is_none() => line.extract::<usize>()?,
        _ => l1
    };
    let c2 = match node.getattr("end_col_offset") {
        Ok(col) if !col.is_none() => col.extract::<usize>()?,
        _ => c1
    };
    let end = FilePos::new(l2, c2);
    Ok(Info::new("", start, end))
}

fn extract_info<'py, 'a>(node: &Bound<'py, PyAny>, env: &ConvertEnv<'py, 'a>) -> Info {
    if let Ok(i) = extract_node_info(node) {
        i.with_file(env.filepath).with_line_offset(env.line_ofs)
    } else {
        Info::default()
    }
}

fn is_node<'py, 'a>(
    node: &Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>,
    kind: &str
) -> PyResult<bool> {
    node.is_instance(&env.ast.getattr(kind)?)
}

fn node_kind<'py>(node: &Bound<'py, PyAny>) -> PyResult<String> {
    Ok(node.get_type().name()?.to_string())
}

fn convert_unary_op<'py, 'a>(
    unop: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>,
    i: &Info
) -> PyResult<Option<UnOp>> {
    if is_node(&unop, env, "USub")? {
        Ok(Some(UnOp::Sub))
    } else if is_node(&unop, env, "Not")? {
        Ok(Some(UnOp::Not))
    } else if is_node(&unop, env, "Invert")? {
        Ok(Some(UnOp::BitNeg))
    } else if is_node(&unop, env, "UAdd")? {
        Ok(None)
    } else {
        py_syntax_error!(i, "Unsupported unary operator {0}", node_kind(&unop)?)
    }
}

fn convert_bin_op<'py, 'a>(
    binop: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>,
    i: &Info
) -> PyResult<BinOp> {
    if is_node(&binop, env, "Add")? {
        Ok(BinOp::Add)
    } else if is_node(&binop, env, "Sub")? {
        Ok(BinOp::Sub)
    } else if is_node(&binop, env, "Mult")? {
        Ok(BinOp::Mul)
    } else if is_node(&binop, env, "Div")? {
        Ok(BinOp::Div)
    } else if is_node(&binop, env, "FloorDiv")? {
        Ok(BinOp::FloorDiv)
    } else if is_node(&binop, env, "Mod")? {
        Ok(BinOp::Rem)
    } else if is_node(&binop, env, "Pow")? {
        Ok(BinOp::Pow)
    } else if is_node(&binop, env, "BitAnd")? {
        Ok(BinOp::BitAnd)
    } else if is_node(&binop, env, "BitOr")? {
        Ok(BinOp::BitOr)
    } else if is_node(&binop, env, "BitXor")? {
        Ok(BinOp::BitXor)
    } else if is_node(&binop, env, "Eq")? {
        Ok(BinOp::Eq)
    } else if is_node(&binop, env, "NotEq")? {
        Ok(BinOp::Neq)
    } else if is_node(&binop, env, "LtE")? {
        Ok(BinOp::Leq)
    } else if is_node(&binop, env, "GtE")? {
        Ok(BinOp::Geq)
    } else if is_node(&binop, env, "Lt")? {
        Ok(BinOp::Lt)
    } else if is_node(&binop, env, "Gt")? {
        Ok(BinOp::Gt)
    } else {
        py_syntax_error!(i, "Unsupported binary operator {0}", node_kind(&binop)?)
    }
}

fn convert_bool_op<'py, 'a>(
    boolop: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>,
    i: &Info
) -> PyResult<BinOp> {
    if is_node(&boolop, env, "And")? {
        Ok(BinOp::And)
    } else if is_node(&boolop, env, "Or")? {
        Ok(BinOp::Or)
    } else {
        py_syntax_error!(i, "Unsupported boolean operator {0}", node_kind(&boolop)?)
    }
}

fn convert_optional_expr<'py, 'a>(
    expr: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Option<Box<Expr>>> {
    if expr.is_none() {
        Ok(None)
    } else {
        Ok(Some(Box::new(convert_expr(expr, env)?)))
    }
}

fn convert_exprs<'py, 'a>(
    exprs: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Vec<Expr>> {
    exprs.try_iter()?
        .map(|e| convert_expr(e?, env))
        .collect::<PyResult<Vec<Expr>>>()
}

fn convert_keyword<'py, 'a>(
    kw: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>,
    i: &Info
) -> PyResult<Keyword> {
    let arg = kw.getattr("arg")?;
    if arg.is_none() {
        py_syntax_error!(i, "Unpacking keyword arguments is not supported")
    } else {
        let id = arg.extract::<String>()?;
        let value = convert_expr(kw.getattr("value")?, env)?;
        Ok(Keyword {id, value, i: i.clone()})
    }
}

fn convert_constant<'py>(val: Bound<'py, PyAny>, i: Info) -> PyResult<Expr> {
    let py = val.py();
    if val.is_none() {
        Ok(Expr::None {i})
    } else if val.is_instance(&types::PyBool::type_object(py))? {
        Ok(Expr::Bool {v: val.extract::<bool>()?, i})
    } else if val.is_instance(&types::PyInt::type_object(py))? {
        match val.extract::<i128>() {
            Ok(v) => Ok(Expr::Int {v, i}),
            Err(_) => {
                let err = CompileError::range_err(i.error_msg(
                    format!("Integer literal {val} is too large")
                ));
                Err(err.into())
            }
        }
    } else if val.is_instance(&types::PyFloat::type_object(py))? {
        Ok(Expr::Float {v: val.extract::<f64>()?, i})
    } else if val.is_instance(&types::PyString::type_object(py))? {
        Ok(Expr::String {v: val.extract::<String>()?, i})
    } else {
        let kind = node_kind(&val)?;
        Ok(Expr::Unsupported {kind: format!("{kind} constant"), i})
    }
}

fn convert_expr<'py, 'a>(
    expr: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Expr> {
    let i = extract_info(&expr, env);
    if is_node(&expr, env, "Name")? {
        let id = expr.getattr("id")?.extract::<String>()?;
        Ok(Expr::Name {id, i})
    } else if is_node(&expr, env, "Constant")? {
        convert_constant(expr.getattr("value")?, i)
    } else if is_node(&expr, env, "UnaryOp")? {
        let arg = convert_expr(expr.getattr("operand")?, env)?;
        match convert_unary_op(expr.getattr("op")?, env, &i)? {
            Some(op) => Ok(Expr::UnOp {op, arg: Box::new(arg), i}),
            None => Ok(arg)
        }
    } else if is_node(&expr, env, "BinOp")? {
        let lhs = convert_expr(expr.getattr("left")?, env)?;
        let op = convert_bin_op(expr.getattr("op")?, env, &i)?;
        let rhs = convert_expr(expr.getattr("right")?, env)?;
        Ok(Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), i})
    } else if is_node(&expr, env, "BoolOp")? {
        let op = convert_bool_op(expr.getattr("op")?, env, &i)?;
        let values = convert_exprs(expr.getattr("values")?, env)?;
        Ok(Expr::BoolOp {op, values, i})
    } else if is_node(&expr, env, "Compare")? {
        let lhs = convert_expr(expr.getattr("left")?, env)?;
        let ops = expr.getattr("ops")?
            .try_iter()?
            .map(|op| convert_bin_op(op?, env, &i))
            .collect::<PyResult<Vec<BinOp>>>()?;
        let comparators = convert_exprs(expr.getattr("comparators")?, env)?;
        Ok(Expr::Compare {lhs: Box::new(lhs), ops, comparators, i})
    } else if is_node(&expr, env, "Subscript")? {
        let target = convert_expr(expr.getattr("value")?, env)?;
        let idx = convert_expr(expr.getattr("slice")?, env)?;
        Ok(Expr::Subscript {target: Box::new(target), idx: Box::new(idx), i})
    } else if is_node(&expr, env, "Slice")? {
        let lo = convert_optional_expr(expr.getattr("lower")?, env)?;
        let hi = convert_optional_expr(expr.getattr("upper")?, env)?;
        let step = convert_optional_expr(expr.getattr("step")?, env)?;
        Ok(Expr::Slice {lo, hi, step, i})
    } else if is_node(&expr, env, "Tuple")? {
        let elems = convert_exprs(expr.getattr("elts")?, env)?;
        Ok(Expr::Tuple {elems, i})
    } else if is_node(&expr, env, "Attribute")? {
        let value = convert_expr(expr.getattr("value")?, env)?;
        let attr = expr.getattr("attr")?.extract::<String>()?;
        Ok(Expr::Attribute {value: Box::new(value), attr, i})
    } else if is_node(&expr, env, "Call")? {
        let func = convert_expr(expr.getattr("func")?, env)?;
        let args = convert_exprs(expr.getattr("args")?, env)?;
        let kwargs = expr.getattr("keywords")?
            .try_iter()?
            .map(|kw| convert_keyword(kw?, env, &i))
            .collect::<PyResult<Vec<Keyword>>>()?;
        Ok(Expr::Call {func: Box::new(func), args, kwargs, i})
    } else {
        Ok(Expr::Unsupported {kind: node_kind(&expr)?, i})
    }
}

fn convert_stmt<'py, 'a>(
    stmt: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Stmt> {
    let i = extract_info(&stmt, env);
    if is_node(&stmt, env, "Assign")? {
        let targets = stmt.getattr("targets")?;
        if targets.len()? > 1 {
            py_syntax_error!(i, "Assigning to multiple targets is not allowed")
        } else {
            let dst = convert_expr(targets.get_item(0)?, env)?;
            let expr = convert_expr(stmt.getattr("value")?, env)?;
            Ok(Stmt::Assign {dst, expr, i})
        }
    } else if is_node(&stmt, env, "AnnAssign")? {
        let dst = convert_expr(stmt.getattr("target")?, env)?;
        let ann = convert_expr(stmt.getattr("annotation")?, env)?;
        let expr = convert_optional_expr(stmt.getattr("value")?, env)?.map(|e| *e);
        Ok(Stmt::AnnAssign {dst, ann, expr, i})
    } else if is_node(&stmt, env, "AugAssign")? {
        let dst = convert_expr(stmt.getattr("target")?, env)?;
        let op = convert_bin_op(stmt.getattr("op")?, env, &i)?;
        let expr = convert_expr(stmt.getattr("value")?, env)?;
        Ok(Stmt::AugAssign {dst, op, expr, i})
    } else if is_node(&stmt, env, "Return")? {
        let value = convert_optional_expr(stmt.getattr("value")?, env)?.map(|e| *e);
        Ok(Stmt::Return {value, i})
    } else if is_node(&stmt, env, "Expr")? {
        let e = convert_expr(stmt.getattr("value")?, env)?;
        Ok(Stmt::Expr {e, i})
    } else if is_node(&stmt, env, "Pass")? {
        Ok(Stmt::Pass {i})
    } else if is_node(&stmt, env, "Delete")? {
        Ok(Stmt::Delete {i})
    } else if is_node(&stmt, env, "If")? {
        Ok(Stmt::If {i})
    } else if is_node(&stmt, env, "For")? || is_node(&stmt, env, "While")? {
        Ok(Stmt::Loop {i})
    } else {
        Ok(Stmt::Unsupported {kind: node_kind(&stmt)?, i})
    }
}

fn convert_stmts<'py, 'a>(
    body: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Vec<Stmt>> {
    body.try_iter()?
        .map(|stmt| stmt.and_then(|s| convert_stmt(s, env)))
        .collect::<PyResult<Vec<Stmt>>>()
}

fn convert_param<'py, 'a>(
    arg: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<Param> {
    let i = extract_info(&arg, env);
    let id = arg.getattr("arg")?.extract::<String>()?;
    let ann = convert_optional_expr(arg.getattr("annotation")?, env)?.map(|e| *e);
    Ok(Param {id, ann, i})
}

fn convert_fun_def<'py, 'a>(
    def: Bound<'py, PyAny>,
    env: &ConvertEnv<'py, 'a>
) -> PyResult<FunDef> {
    let i = extract_info(&def, env);
    let id = def.getattr("name")?.extract::<String>()?;
    let args = def.getattr("args")?;
    for kind in ["posonlyargs", "kwonlyargs"] {
        if args.getattr(kind)?.len()? > 0 {
            py_syntax_error!(i, "Kernel function {id} may only use positional parameters")?
        }
    }
    if !args.getattr("vararg")?.is_none() || !args.getattr("kwarg")?.is_none() {
        py_syntax_error!(i, "Kernel function {id} cannot take variadic parameters")?
    }
    if args.getattr("defaults")?.len()? > 0 {
        py_syntax_error!(i, "Parameters of kernel function {id} cannot have default values")?
    }
    let params = args.getattr("args")?
        .try_iter()?
        .map(|arg| convert_param(arg?, env))
        .collect::<PyResult<Vec<Param>>>()?;
    let ret = def.getattr("returns")?;
    let ret = if ret.is_none() {
        ReturnAnnotation::Missing
    } else {
        match convert_expr(ret, env)? {
            Expr::None {..} => ReturnAnnotation::Void,
            e => ReturnAnnotation::Type(e)
        }
    };
    let body = convert_stmts(def.getattr("body")?, env)?;
    Ok(FunDef {id, params, ret, body, i})
}

/// Converts every top-level function definition of a Python module AST into a kernel function
/// definition. Other top-level statements, such as imports, are ignored.
pub fn to_kernel_defs<'py>(
    module: Bound<'py, PyAny>,
    filepath: String,
    line_ofs: usize
) -> PyResult<Ast> {
    let env = ConvertEnv {
        ast: module.py().import("ast")?,
        filepath: &filepath,
        line_ofs
    };
    let mut defs = vec![];
    for stmt in module.getattr("body")?.try_iter()? {
        let stmt = stmt?;
        if is_node(&stmt, &env, "FunctionDef")? {
            defs.push(convert_fun_def(stmt, &env)?);
        }
    }
    Ok(defs)
}

#[cfg(test)]
mod test {
    use super::*;

    use pyo3::types::*;

    fn parse_module<'py>(py: Python<'py>, s: &str) -> PyResult<Bound<'py, PyAny>> {
        let ast_module = py.import("ast")?;
        let py_args = PyTuple::new(py, vec![PyString::new(py, s)])?;
        ast_module.call_method1("parse", py_args)
    }

    fn convert_str(s: &str) -> PyResult<Ast> {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let module = parse_module(py, s)?;
            to_kernel_defs(module, String::new(), 0)
        })
    }

    fn convert_single_expr(s: &str) -> PyResult<Expr> {
        let src = format!("def f():\n    return {s}\n");
        let mut defs = convert_str(&src)?;
        match defs.remove(0).body.remove(0) {
            Stmt::Return {value: Some(e), ..} => Ok(e),
            s => panic!("unexpected statement {s:?}")
        }
    }

    #[test]
    fn convert_annotated_params() -> PyResult<()> {
        let defs = convert_str("def foo(a: int32[M, N], b) -> int64:\n    return a\n")?;
        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert_eq!(def.id, "foo");
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].id, "a");
        assert!(matches!(def.params[0].ann, Some(Expr::Subscript {..})));
        assert!(def.params[1].ann.is_none());
        assert!(def.is_template());
        assert!(matches!(def.ret, ReturnAnnotation::Type(Expr::Name {..})));
        Ok(())
    }

    #[test]
    fn convert_void_and_missing_returns() -> PyResult<()> {
        let defs = convert_str("def f() -> None:\n    pass\ndef g():\n    pass\n")?;
        assert_eq!(defs[0].ret, ReturnAnnotation::Void);
        assert_eq!(defs[1].ret, ReturnAnnotation::Missing);
        assert!(matches!(defs[0].body[0], Stmt::Pass {..}));
        Ok(())
    }

    #[test]
    fn convert_ignores_imports() -> PyResult<()> {
        let defs = convert_str("import numpy as np\ndef f():\n    pass\n")?;
        assert_eq!(defs.len(), 1);
        Ok(())
    }

    #[test]
    fn convert_chained_comparison() -> PyResult<()> {
        match convert_single_expr("a < b <= c")? {
            Expr::Compare {ops, comparators, ..} => {
                assert_eq!(ops, vec![BinOp::Lt, BinOp::Leq]);
                assert_eq!(comparators.len(), 2);
            },
            e => panic!("unexpected expression {e:?}")
        };
        Ok(())
    }

    #[test]
    fn convert_slice_with_missing_bounds() -> PyResult<()> {
        match convert_single_expr("a[:, 1:n:2]")? {
            Expr::Subscript {idx, ..} => match *idx {
                Expr::Tuple {elems, ..} => {
                    assert!(matches!(
                        &elems[0], Expr::Slice {lo: None, hi: None, step: None, ..}
                    ));
                    assert!(matches!(
                        &elems[1], Expr::Slice {lo: Some(_), hi: Some(_), step: Some(_), ..}
                    ));
                },
                e => panic!("unexpected index {e:?}")
            },
            e => panic!("unexpected expression {e:?}")
        };
        Ok(())
    }

    #[test]
    fn convert_numpy_call_with_keyword() -> PyResult<()> {
        match convert_single_expr("np.sum(a, axis=-1)")? {
            Expr::Call {func, args, kwargs, ..} => {
                assert!(matches!(*func, Expr::Attribute {..}));
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs[0].id, "axis");
            },
            e => panic!("unexpected expression {e:?}")
        };
        Ok(())
    }

    #[test]
    fn convert_literals() -> PyResult<()> {
        assert!(matches!(convert_single_expr("True")?, Expr::Bool {v: true, ..}));
        assert!(matches!(convert_single_expr("None")?, Expr::None {..}));
        assert!(matches!(convert_single_expr("2.5")?, Expr::Float {..}));
        assert!(matches!(convert_single_expr("+3")?, Expr::Int {v: 3, ..}));
        Ok(())
    }

    #[test]
    fn convert_huge_integer_literal_fails() {
        assert!(convert_single_expr(&format!("{}", i64::MAX)).is_ok());
        assert!(convert_single_expr(&format!("{}", u128::MAX)).is_err());
    }

    #[test]
    fn convert_unsupported_forms_are_kept() -> PyResult<()> {
        let defs = convert_str("def f(a):\n    if a:\n        pass\n    del a\n    with a:\n        pass\n")?;
        let body = &defs[0].body;
        assert!(matches!(body[0], Stmt::If {..}));
        assert!(matches!(body[1], Stmt::Delete {..}));
        assert!(matches!(&body[2], Stmt::Unsupported {kind, ..} if kind == "With"));
        Ok(())
    }

    #[test]
    fn convert_rejects_multiple_targets() {
        assert!(convert_str("def f():\n    a = b = 1\n").is_err());
    }

    #[test]
    fn convert_rejects_default_values() {
        assert!(convert_str("def f(a=1):\n    pass\n").is_err());
    }
}
