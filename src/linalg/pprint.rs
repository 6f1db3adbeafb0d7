use super::ast::*;
use crate::graph::types::Literal;
use crate::utils::name::Name;
use crate::utils::pprint::*;

use itertools::Itertools;

fn pprint_value(env: PrettyPrintEnv, id: &Name) -> (PrettyPrintEnv, String) {
    let (env, s) = id.pprint(env);
    (env, format!("%{s}"))
}

fn pprint_values<'a, I: Iterator<Item=&'a Name>>(
    env: PrettyPrintEnv,
    ids: I
) -> (PrettyPrintEnv, Vec<String>) {
    ids.fold((env, vec![]), |(env, mut strs), id| {
        let (env, s) = pprint_value(env, id);
        strs.push(s);
        (env, strs)
    })
}

// Prints operands as a list of names followed by a list of their types, as used in the 'ins'
// and 'outs' clauses of structured operations.
fn pprint_operand_clause(env: PrettyPrintEnv, ops: &[Operand]) -> (PrettyPrintEnv, String) {
    let (env, ids) = pprint_values(env, ops.iter().map(|op| &op.id));
    let tys = ops.iter().map(|op| op.ty.pprint_default()).join(", ");
    (env, format!("{0} : {tys}", ids.join(", ")))
}

fn pprint_typed_values(env: PrettyPrintEnv, ops: &[Operand]) -> (PrettyPrintEnv, String) {
    let (env, strs) = ops.iter()
        .fold((env, vec![]), |(env, mut strs), op| {
            let (env, id) = pprint_value(env, &op.id);
            strs.push(format!("{id}: {0}", op.ty.pprint_default()));
            (env, strs)
        });
    (env, strs.join(", "))
}

fn pprint_elem_size(sz: &ElemSize) -> &'static str {
    match sz {
        ElemSize::Bool => "i1",
        ElemSize::I8 => "i8",
        ElemSize::I16 => "i16",
        ElemSize::I32 => "i32",
        ElemSize::I64 => "i64",
        ElemSize::F16 => "f16",
        ElemSize::F32 => "f32",
        ElemSize::F64 => "f64",
    }
}

impl PrettyPrint for Type {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            Type::Index => "index".to_string(),
            Type::Scalar(sz) => pprint_elem_size(sz).to_string(),
            Type::MemRef {sz, shape} => {
                let dims = shape.iter()
                    .map(|d| match d {
                        Some(n) => format!("{n}x"),
                        None => "?x".to_string()
                    })
                    .join("");
                format!("memref<{dims}{0}>", pprint_elem_size(sz))
            },
            Type::StridedMemRef {sz, rank} => {
                let dims = "?x".repeat(*rank);
                let strides = vec!["?"; *rank].join(", ");
                format!("memref<{dims}{0}, strided<[{strides}], offset: ?>>", pprint_elem_size(sz))
            },
        };
        (env, s)
    }
}

// Float constants must contain a decimal point to be parsed as floats.
fn pprint_float(v: f64) -> String {
    let s = format!("{v:e}");
    if s.contains('.') {
        s
    } else {
        s.replacen('e', ".0e", 1)
    }
}

fn pprint_literal(value: &Literal, ty: &Type) -> String {
    match (value, ty) {
        (Literal::Bool(b), _) => format!("{b}"),
        (v, Type::Scalar(ElemSize::Bool)) => format!("{0}", v.as_i64() != 0),
        (v, t) if t.is_float() => format!("{0} : {1}", pprint_float(v.as_f64()), t.pprint_default()),
        (v, t) => format!("{0} : {1}", v.as_i64(), t.pprint_default()),
    }
}

impl PrettyPrint for ArithOp {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            ArithOp::AddI => "arith.addi",
            ArithOp::AddF => "arith.addf",
            ArithOp::SubI => "arith.subi",
            ArithOp::SubF => "arith.subf",
            ArithOp::MulI => "arith.muli",
            ArithOp::MulF => "arith.mulf",
            ArithOp::DivF => "arith.divf",
            ArithOp::FloorDivSI => "arith.floordivsi",
            ArithOp::RemSI => "arith.remsi",
            ArithOp::RemF => "arith.remf",
            ArithOp::IPowI => "math.ipowi",
            ArithOp::PowF => "math.powf",
            ArithOp::AndI => "arith.andi",
            ArithOp::OrI => "arith.ori",
            ArithOp::XOrI => "arith.xori",
            ArithOp::MaxSI => "arith.maxsi",
            ArithOp::MinSI => "arith.minsi",
            ArithOp::MaximumF => "arith.maximumf",
            ArithOp::MinimumF => "arith.minimumf",
        };
        (env, s.to_string())
    }
}

impl PrettyPrint for UnaryOp {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            UnaryOp::NegF => "arith.negf",
            UnaryOp::Floor => "math.floor",
        };
        (env, s.to_string())
    }
}

impl PrettyPrint for CastOp {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let s = match self {
            CastOp::ExtSI => "arith.extsi",
            CastOp::ExtUI => "arith.extui",
            CastOp::TruncI => "arith.trunci",
            CastOp::SIToFP => "arith.sitofp",
            CastOp::UIToFP => "arith.uitofp",
            CastOp::FPToSI => "arith.fptosi",
            CastOp::ExtF => "arith.extf",
            CastOp::TruncF => "arith.truncf",
            CastOp::IndexCast => "arith.index_cast",
        };
        (env, s.to_string())
    }
}

fn pprint_compare(pred: &CmpPredicate, is_float: bool) -> String {
    let (int, float) = match pred {
        CmpPredicate::Eq => ("eq", "oeq"),
        CmpPredicate::Ne => ("ne", "une"),
        CmpPredicate::Lt => ("slt", "olt"),
        CmpPredicate::Le => ("sle", "ole"),
        CmpPredicate::Gt => ("sgt", "ogt"),
        CmpPredicate::Ge => ("sge", "oge"),
    };
    if is_float {
        format!("arith.cmpf {float}")
    } else {
        format!("arith.cmpi {int}")
    }
}

impl PrettyPrint for AffineMap {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let dims = (0..self.ndims).map(|i| format!("idx{i}")).join(", ");
        let results = self.results.iter()
            .map(|e| match e {
                AffineExpr::Dim(i) => format!("idx{i}"),
                AffineExpr::Zero => "0".to_string(),
            })
            .join(", ");
        (env, format!("affine_map<({dims}) -> ({results})>"))
    }
}

impl PrettyPrint for IteratorType {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            IteratorType::Parallel => (env, "\"parallel\"".to_string()),
        }
    }
}

fn pprint_indices(env: PrettyPrintEnv, indices: &[Name]) -> (PrettyPrintEnv, String) {
    let (env, strs) = pprint_values(env, indices.iter());
    (env, format!("[{0}]", strs.join(", ")))
}

// Prints the region of a structured operation. The arguments of a generic operation are
// declared by the label of its entry block, while a reduction lists them before the region.
fn pprint_region(
    env: PrettyPrintEnv,
    header: String,
    args: &[Operand],
    body: &[Stmt],
    entry_label: bool
) -> (PrettyPrintEnv, String) {
    let indent = env.print_indent();
    let (env, args) = pprint_typed_values(env, args);
    let env = env.incr_indent();
    let (env, body) = pprint_iter(body.iter(), env, "\n");
    let env = env.decr_indent();
    let s = if entry_label {
        format!("{indent}{header} {{\n{indent}^bb0({args}):\n{body}\n{indent}}}")
    } else {
        format!("{indent}{header} ({args}) {{\n{body}\n{indent}}}")
    };
    (env, s)
}

impl PrettyPrint for Stmt {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let indent = env.print_indent();
        match self {
            Stmt::Constant {dst, value, ty} => {
                let (env, dst) = pprint_value(env, dst);
                (env, format!("{indent}{dst} = arith.constant {0}", pprint_literal(value, ty)))
            },
            Stmt::Arith {dst, op, lhs, rhs, ty} => {
                let (env, op) = op.pprint(env);
                let (env, lhs) = pprint_value(env, lhs);
                let (env, rhs) = pprint_value(env, rhs);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = {op} {lhs}, {rhs} : {ty}"))
            },
            Stmt::Unary {dst, op, arg, ty} => {
                let (env, op) = op.pprint(env);
                let (env, arg) = pprint_value(env, arg);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = {op} {arg} : {ty}"))
            },
            Stmt::Compare {dst, pred, lhs, rhs, ty} => {
                let op = pprint_compare(pred, ty.is_float());
                let (env, lhs) = pprint_value(env, lhs);
                let (env, rhs) = pprint_value(env, rhs);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = {op}, {lhs}, {rhs} : {ty}"))
            },
            Stmt::Select {dst, cond, thn, els, ty} => {
                let (env, cond) = pprint_value(env, cond);
                let (env, thn) = pprint_value(env, thn);
                let (env, els) = pprint_value(env, els);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = arith.select {cond}, {thn}, {els} : {ty}"))
            },
            Stmt::Cast {dst, op, arg, from, to} => {
                let (env, op) = op.pprint(env);
                let (env, arg) = pprint_value(env, arg);
                let (env, dst) = pprint_value(env, dst);
                let (env, from) = from.pprint(env);
                let (env, to) = to.pprint(env);
                (env, format!("{indent}{dst} = {op} {arg} : {from} to {to}"))
            },
            Stmt::Dim {dst, src, axis} => {
                let (env, src_id) = pprint_value(env, &src.id);
                let (env, axis) = pprint_value(env, axis);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = src.ty.pprint(env);
                (env, format!("{indent}{dst} = memref.dim {src_id}, {axis} : {ty}"))
            },
            Stmt::Alloc {dst, sizes, ty} => {
                let (env, sizes) = pprint_values(env, sizes.iter());
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = memref.alloc({0}) : {ty}", sizes.join(", ")))
            },
            Stmt::Alloca {dst, ty} => {
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = memref.alloca() : {ty}"))
            },
            Stmt::Load {dst, src, indices} => {
                let (env, src_id) = pprint_value(env, &src.id);
                let (env, indices) = pprint_indices(env, indices);
                let (env, dst) = pprint_value(env, dst);
                let (env, ty) = src.ty.pprint(env);
                (env, format!("{indent}{dst} = memref.load {src_id}{indices} : {ty}"))
            },
            Stmt::Store {value, dst, indices} => {
                let (env, value) = pprint_value(env, value);
                let (env, dst_id) = pprint_value(env, &dst.id);
                let (env, indices) = pprint_indices(env, indices);
                let (env, ty) = dst.ty.pprint(env);
                (env, format!("{indent}memref.store {value}, {dst_id}{indices} : {ty}"))
            },
            Stmt::Copy {src, dst} => {
                let (env, src_id) = pprint_value(env, &src.id);
                let (env, dst_id) = pprint_value(env, &dst.id);
                let (env, src_ty) = src.ty.pprint(env);
                let (env, dst_ty) = dst.ty.pprint(env);
                (env, format!("{indent}memref.copy {src_id}, {dst_id} : {src_ty} to {dst_ty}"))
            },
            Stmt::SubView {dst, src, offsets, sizes, strides, ty} => {
                let (env, src_id) = pprint_value(env, &src.id);
                let (env, offsets) = pprint_indices(env, offsets);
                let (env, sizes) = pprint_indices(env, sizes);
                let (env, strides) = pprint_indices(env, strides);
                let (env, dst) = pprint_value(env, dst);
                let (env, src_ty) = src.ty.pprint(env);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = memref.subview {src_id}{offsets}{sizes}{strides} \
                               : {src_ty} to {ty}"))
            },
            Stmt::CollapseShape {dst, src, reassociation, ty} => {
                let (env, src_id) = pprint_value(env, &src.id);
                let (env, dst) = pprint_value(env, dst);
                let groups = reassociation.iter()
                    .map(|g| format!("[{0}]", g.iter().join(", ")))
                    .join(", ");
                let (env, src_ty) = src.ty.pprint(env);
                let (env, ty) = ty.pprint(env);
                (env, format!("{indent}{dst} = memref.collapse_shape {src_id} [{groups}] : \
                               {src_ty} into {ty}"))
            },
            Stmt::Fill {value, dst} => {
                let (env, value) = pprint_operand_clause(env, std::slice::from_ref(value));
                let (env, dst) = pprint_operand_clause(env, std::slice::from_ref(dst));
                (env, format!("{indent}linalg.fill ins({value}) outs({dst})"))
            },
            Stmt::Generic {maps, iterators, ins, outs, args, body} => {
                let (env, maps) = pprint_iter(maps.iter(), env, ", ");
                let (env, iterators) = pprint_iter(iterators.iter(), env, ", ");
                let (env, ins) = pprint_operand_clause(env, ins);
                let (env, outs) = pprint_operand_clause(env, outs);
                let header = format!(
                    "linalg.generic {{indexing_maps = [{maps}], iterator_types = [{iterators}]}} \
                     ins({ins}) outs({outs})"
                );
                pprint_region(env, header, args, body, true)
            },
            Stmt::Reduce {ins, outs, dims, args, body} => {
                let (env, ins) = pprint_operand_clause(env, ins);
                let (env, outs) = pprint_operand_clause(env, outs);
                let header = format!(
                    "linalg.reduce ins({ins}) outs({outs}) dimensions = [{0}]",
                    dims.iter().join(", ")
                );
                pprint_region(env, header, args, body, false)
            },
            Stmt::Yield {values} => {
                let (env, values) = pprint_operand_clause(env, values);
                (env, format!("{indent}linalg.yield {values}"))
            },
            Stmt::Return {values} if values.is_empty() => (env, format!("{indent}func.return")),
            Stmt::Return {values} => {
                let (env, values) = pprint_operand_clause(env, values);
                (env, format!("{indent}func.return {values}"))
            },
        }
    }
}

impl PrettyPrint for FunDef {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, params) = pprint_typed_values(env, &self.params);
        let results = match self.results.as_slice() {
            [] => String::new(),
            [ty] => format!(" -> {0}", ty.pprint_default()),
            tys => format!(" -> ({0})", tys.iter().map(|ty| ty.pprint_default()).join(", "))
        };
        let env = env.incr_indent();
        let (env, body) = pprint_iter(self.body.iter(), env, "\n");
        let env = env.decr_indent();
        (env, format!("func.func @{0}({params}){results} {{\n{body}\n}}", self.id))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(s: &str) -> Name {
        Name::new(s.to_string())
    }

    fn operand(s: &str, ty: Type) -> Operand {
        Operand {id: var(s), ty}
    }

    fn memref(sz: ElemSize, shape: Vec<Option<i64>>) -> Type {
        Type::MemRef {sz, shape}
    }

    #[test]
    fn memref_types() {
        assert_eq!(memref(ElemSize::I32, vec![None, Some(4)]).pprint_default(), "memref<?x4xi32>");
        assert_eq!(memref(ElemSize::I64, vec![]).pprint_default(), "memref<i64>");
        let strided = Type::StridedMemRef {sz: ElemSize::F32, rank: 2};
        assert_eq!(strided.pprint_default(), "memref<?x?xf32, strided<[?, ?], offset: ?>>");
    }

    #[test]
    fn float_constants_contain_a_decimal_point() {
        assert_eq!(pprint_float(1.0), "1.0e0");
        assert_eq!(pprint_float(1.5), "1.5e0");
        assert_eq!(pprint_float(-65504.0), "-6.5504e4");
    }

    #[test]
    fn constants() {
        let s = Stmt::Constant {dst: var("c"), value: Literal::Int(3), ty: Type::Scalar(ElemSize::I8)};
        assert_eq!(s.pprint_default(), "%c = arith.constant 3 : i8");
        let s = Stmt::Constant {dst: var("t"), value: Literal::Bool(true), ty: Type::Scalar(ElemSize::Bool)};
        assert_eq!(s.pprint_default(), "%t = arith.constant true");
        let s = Stmt::Constant {dst: var("f"), value: Literal::Int(0), ty: Type::Scalar(ElemSize::F32)};
        assert_eq!(s.pprint_default(), "%f = arith.constant 0.0e0 : f32");
    }

    #[test]
    fn comparison_of_floats() {
        let s = Stmt::Compare {
            dst: var("r"), pred: CmpPredicate::Lt, lhs: var("a"), rhs: var("b"),
            ty: Type::Scalar(ElemSize::F64)
        };
        assert_eq!(s.pprint_default(), "%r = arith.cmpf olt, %a, %b : f64");
    }

    #[test]
    fn generic_block() {
        let i32_ty = Type::Scalar(ElemSize::I32);
        let mat = memref(ElemSize::I32, vec![None, None]);
        let vec_ty = memref(ElemSize::I32, vec![None]);
        let s = Stmt::Generic {
            maps: vec![
                AffineMap {ndims: 2, results: vec![AffineExpr::Dim(0), AffineExpr::Dim(1)]},
                AffineMap {ndims: 2, results: vec![AffineExpr::Dim(1)]},
                AffineMap {ndims: 2, results: vec![AffineExpr::Dim(0), AffineExpr::Dim(1)]},
            ],
            iterators: vec![IteratorType::Parallel; 2],
            ins: vec![operand("a", mat.clone()), operand("b", vec_ty)],
            outs: vec![operand("c", mat)],
            args: vec![
                operand("x", i32_ty.clone()), operand("y", i32_ty.clone()),
                operand("z", i32_ty.clone())
            ],
            body: vec![
                Stmt::Arith {
                    dst: var("s"), op: ArithOp::AddI, lhs: var("x"), rhs: var("y"),
                    ty: i32_ty.clone()
                },
                Stmt::Yield {values: vec![operand("s", i32_ty)]},
            ]
        };
        let expected = "\
linalg.generic {indexing_maps = [affine_map<(idx0, idx1) -> (idx0, idx1)>, \
affine_map<(idx0, idx1) -> (idx1)>, affine_map<(idx0, idx1) -> (idx0, idx1)>], \
iterator_types = [\"parallel\", \"parallel\"]} \
ins(%a, %b : memref<?x?xi32>, memref<?xi32>) outs(%c : memref<?x?xi32>) {
^bb0(%x: i32, %y: i32, %z: i32):
  %s = arith.addi %x, %y : i32
  linalg.yield %s : i32
}";
        assert_eq!(s.pprint_default(), expected);
    }

    #[test]
    fn reduce_block() {
        let acc_ty = memref(ElemSize::I64, vec![]);
        let s = Stmt::Reduce {
            ins: vec![operand("a", memref(ElemSize::I64, vec![None]))],
            outs: vec![operand("acc", acc_ty)],
            dims: vec![0],
            args: vec![
                operand("x", Type::Scalar(ElemSize::I64)),
                operand("y", Type::Scalar(ElemSize::I64))
            ],
            body: vec![Stmt::Yield {values: vec![operand("x", Type::Scalar(ElemSize::I64))]}]
        };
        let expected = "\
linalg.reduce ins(%a : memref<?xi64>) outs(%acc : memref<i64>) dimensions = [0] \
(%x: i64, %y: i64) {
  linalg.yield %x : i64
}";
        assert_eq!(s.pprint_default(), expected);
    }

    #[test]
    fn function_without_results() {
        let def = FunDef {
            id: "f".to_string(),
            params: vec![operand("a", memref(ElemSize::F32, vec![Some(3)]))],
            results: vec![],
            body: vec![Stmt::Return {values: vec![]}]
        };
        assert_eq!(def.pprint_default(), "func.func @f(%a: memref<3xf32>) {\n  func.return\n}");
    }
}
