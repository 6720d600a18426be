//! Parser tests over complete source snippets.

use crate::{parse, ParseTree};
use tern_diagnostic::ErrorCode;
use tern_ir::{
    LitValue, NodeId, NodeKind, OpKind, ParseArena, StringInterner,
};

fn parse_src(src: &str) -> (ParseTree, StringInterner) {
    let interner = StringInterner::new();
    let tokens = tern_lexer::lex(src, &interner).tokens;
    let tree = parse(&tokens, &interner);
    (tree, interner)
}

fn root_statements(tree: &ParseTree) -> Vec<NodeId> {
    let root = tree.arena.get(tree.root);
    tree.arena.siblings(root.body).collect()
}

fn kind(arena: &ParseArena, id: NodeId) -> NodeKind {
    arena.get(id).kind
}

#[test]
fn test_variable_declaration() {
    let (tree, interner) = parse_src("let x: i32 = 4 + 5;");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    assert_eq!(stmts.len(), 1);

    let var = tree.arena.get(stmts[0]);
    assert_eq!(var.kind, NodeKind::Variable);
    assert_eq!(interner.resolve(var.name.unwrap()), "x");
    assert_eq!(kind(&tree.arena, var.data_type.unwrap()), NodeKind::TypeSpecifier);

    let init = tree.arena.get(var.initializer.unwrap());
    assert_eq!(init.op, Some(OpKind::Add));
}

#[test]
fn test_const_has_modifier() {
    let (tree, _) = parse_src("const x = 1;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let modifier = tree.arena.get(var.modifier.unwrap());
    assert_eq!(modifier.kind, NodeKind::Modifier);
    assert_eq!(modifier.modifier_kind, Some(tern_ir::ModKind::Const));
}

#[test]
fn test_object_decompositor() {
    let (tree, _) = parse_src("let { a, b } = point;");
    let stmts = root_statements(&tree);
    let decomp = tree.arena.get(stmts[0]);
    assert_eq!(decomp.kind, NodeKind::ObjectDecompositor);
    assert_eq!(tree.arena.sibling_count(decomp.parameters), 2);
    assert!(decomp.initializer.is_some());
    assert!(!tree.has_errors());
}

#[test]
fn test_precedence_mul_binds_tighter() {
    let (tree, _) = parse_src("let x = 1 + 2 * 3;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let add = tree.arena.get(var.initializer.unwrap());
    assert_eq!(add.op, Some(OpKind::Add));
    let rhs = tree.arena.get(add.rvalue.unwrap());
    assert_eq!(rhs.op, Some(OpKind::Mul));
}

#[test]
fn test_assignment_right_associative() {
    let (tree, _) = parse_src("a = b = c;");
    let stmts = root_statements(&tree);
    let outer = tree.arena.get(stmts[0]);
    assert_eq!(outer.op, Some(OpKind::Assign));
    let rhs = tree.arena.get(outer.rvalue.unwrap());
    assert_eq!(rhs.op, Some(OpKind::Assign));
}

#[test]
fn test_conditional_expression() {
    let (tree, _) = parse_src("let x = c ? 1 : 2;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let cond = tree.arena.get(var.initializer.unwrap());
    assert_eq!(cond.op, Some(OpKind::Conditional));
    assert!(cond.cond.is_some());
    assert!(cond.lvalue.is_some());
    assert!(cond.rvalue.is_some());
}

#[test]
fn test_call_member_index_chain() {
    let (tree, interner) = parse_src("a.b(1, 2)[3];");
    let stmts = root_statements(&tree);
    let index = tree.arena.get(stmts[0]);
    assert_eq!(index.op, Some(OpKind::Index));
    let call = tree.arena.get(index.lvalue.unwrap());
    assert_eq!(call.op, Some(OpKind::Call));
    assert_eq!(tree.arena.sibling_count(call.parameters), 2);
    let member = tree.arena.get(call.lvalue.unwrap());
    assert_eq!(member.op, Some(OpKind::Member));
    assert_eq!(interner.resolve(member.name.unwrap()), "b");
}

#[test]
fn test_cast_expression() {
    let (tree, _) = parse_src("let x = y as f32;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let cast = tree.arena.get(var.initializer.unwrap());
    assert_eq!(cast.op, Some(OpKind::Cast));
    assert!(cast.data_type.is_some());
}

#[test]
fn test_arrow_function_parenthesized() {
    let (tree, _) = parse_src("let f = (a: i32, b: i32) => a + b;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let func = tree.arena.get(var.initializer.unwrap());
    assert_eq!(func.kind, NodeKind::Function);
    assert!(func.name.is_none());
    assert_eq!(tree.arena.sibling_count(func.parameters), 2);
    assert!(!tree.has_errors());
}

#[test]
fn test_arrow_function_single_param() {
    let (tree, _) = parse_src("let f = x => x * 2;");
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let func = tree.arena.get(var.initializer.unwrap());
    assert_eq!(func.kind, NodeKind::Function);
    assert_eq!(tree.arena.sibling_count(func.parameters), 1);
}

#[test]
fn test_paren_expr_not_arrow() {
    let (tree, _) = parse_src("let x = (a + b) * c;");
    assert!(!tree.has_errors());
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let mul = tree.arena.get(var.initializer.unwrap());
    assert_eq!(mul.op, Some(OpKind::Mul));
}

#[test]
fn test_function_declaration() {
    let (tree, interner) = parse_src("function add(a: i32, b: i32): i32 { return a + b; }");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let func = tree.arena.get(stmts[0]);
    assert_eq!(func.kind, NodeKind::Function);
    assert_eq!(interner.resolve(func.name.unwrap()), "add");
    assert_eq!(tree.arena.sibling_count(func.parameters), 2);
    assert!(func.data_type.is_some());
    let body = tree.arena.get(func.body.unwrap());
    assert_eq!(body.kind, NodeKind::Block);
    assert_eq!(kind(&tree.arena, body.body.unwrap()), NodeKind::Return);
}

#[test]
fn test_template_function() {
    let (tree, _) = parse_src("function id<T>(v: T): T { return v; }");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let func = tree.arena.get(stmts[0]);
    assert_eq!(tree.arena.sibling_count(func.template_parameters), 1);
}

#[test]
fn test_class_definition() {
    let src = "
        class Vec2 extends Base {
            x: f32;
            private y: f32;
            constructor(x: f32, y: f32) { this.x = x; }
            length(): f32 { return x; }
            static zero(): Vec2 { return new Vec2(0.0f, 0.0f); }
            get magnitude(): f32 { return x; }
            operator +(rhs: Vec2): Vec2 { return rhs; }
            operator f32() { return x; }
        }
    ";
    let (tree, interner) = parse_src(src);
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let class = tree.arena.get(stmts[0]);
    assert_eq!(class.kind, NodeKind::Class);
    assert_eq!(interner.resolve(class.name.unwrap()), "Vec2");
    assert_eq!(tree.arena.sibling_count(class.inheritance), 1);

    let members: Vec<_> = tree.arena.siblings(class.body).collect();
    assert_eq!(members.len(), 8);
    assert_eq!(kind(&tree.arena, members[0]), NodeKind::Property);
    assert_eq!(kind(&tree.arena, members[1]), NodeKind::Property);
    // `private y` carries a Private modifier.
    let y = tree.arena.get(members[1]);
    assert_eq!(
        tree.arena.get(y.modifier.unwrap()).modifier_kind,
        Some(tern_ir::ModKind::Private)
    );
    // Operator overload carries the Operator modifier and the op tag.
    let op_add = tree.arena.get(members[6]);
    assert_eq!(op_add.kind, NodeKind::Function);
    assert_eq!(op_add.op, Some(OpKind::Add));
    // Conversion operator records the target type.
    let conv = tree.arena.get(members[7]);
    assert!(conv.alias.is_some());
}

#[test]
fn test_template_class() {
    let (tree, _) = parse_src("class Box<T> { v: T; get value(): T { return v; } }");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let class = tree.arena.get(stmts[0]);
    assert_eq!(tree.arena.sibling_count(class.template_parameters), 1);
}

#[test]
fn test_empty_class_body_is_error() {
    let (tree, _) = parse_src("class Empty { }");
    assert!(tree.errors.iter().any(|e| e.code == ErrorCode::E1007));
}

#[test]
fn test_control_flow_statements() {
    let src = "
        while (a < 10) { a = a + 1; }
        do { a = a - 1; } while (a > 0);
        for (let i = 0; i < 10; i = i + 1) { total = total + i; }
        if (a == b) { c(); } else { d(); }
    ";
    let (tree, _) = parse_src(src);
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    assert_eq!(kind(&tree.arena, stmts[0]), NodeKind::WhileLoop);
    assert_eq!(kind(&tree.arena, stmts[1]), NodeKind::DoWhileLoop);
    assert_eq!(kind(&tree.arena, stmts[2]), NodeKind::ForLoop);
    assert_eq!(kind(&tree.arena, stmts[3]), NodeKind::If);

    let for_loop = tree.arena.get(stmts[2]);
    assert!(for_loop.initializer.is_some());
    assert!(for_loop.cond.is_some());
    assert!(for_loop.rvalue.is_some());
}

#[test]
fn test_switch_statement() {
    let src = "
        switch (x) {
            case 1: a(); break;
            case 2: b(); break;
            default: c();
        }
    ";
    let (tree, _) = parse_src(src);
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let switch = tree.arena.get(stmts[0]);
    assert_eq!(switch.kind, NodeKind::Switch);
    let cases: Vec<_> = tree.arena.siblings(switch.body).collect();
    assert_eq!(cases.len(), 3);
    assert!(tree.arena.get(cases[0]).cond.is_some());
    assert!(tree.arena.get(cases[2]).cond.is_none()); // default
}

#[test]
fn test_try_catch_requires_typed_parameter() {
    let (tree, _) = parse_src("try { risky(); } catch (e) { }");
    assert!(tree.errors.iter().any(|e| e.code == ErrorCode::E1009));

    let (tree, _) = parse_src("try { risky(); } catch (e: Error) { handle(e); }");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let try_node = tree.arena.get(stmts[0]);
    assert_eq!(try_node.kind, NodeKind::Try);
    assert_eq!(kind(&tree.arena, try_node.else_body.unwrap()), NodeKind::Catch);
}

#[test]
fn test_import_symbols() {
    let (tree, interner) = parse_src("import { x, y as z } from \"vectors\";");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let import = tree.arena.get(stmts[0]);
    assert_eq!(import.kind, NodeKind::Import);
    let LitValue::Str(module) = import.value else {
        panic!("expected module name");
    };
    assert_eq!(interner.resolve(module), "vectors");

    let symbols: Vec<_> = tree.arena.siblings(import.body).collect();
    assert_eq!(symbols.len(), 2);
    let aliased = tree.arena.get(symbols[1]);
    assert_eq!(interner.resolve(aliased.name.unwrap()), "y");
    let alias = tree.arena.get(aliased.alias.unwrap());
    assert_eq!(interner.resolve(alias.name.unwrap()), "z");
}

#[test]
fn test_import_star() {
    let (tree, interner) = parse_src("import { * as M } from \"mathx\";");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let import = tree.arena.get(stmts[0]);
    let sym = tree.arena.get(import.body.unwrap());
    assert_eq!(interner.resolve(sym.name.unwrap()), "*");
}

#[test]
fn test_export_wraps_declaration() {
    let (tree, _) = parse_src("export function f(): i32 { return 1; }");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let export = tree.arena.get(stmts[0]);
    assert_eq!(export.kind, NodeKind::Export);
    assert_eq!(kind(&tree.arena, export.body.unwrap()), NodeKind::Function);
}

#[test]
fn test_placement_new() {
    let (tree, _) = parse_src("new Vec2(1.0f, 2.0f) => slot;");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let new_node = tree.arena.get(stmts[0]);
    assert_eq!(new_node.kind, NodeKind::New);
    assert!(new_node.lvalue.is_some());
    assert_eq!(tree.arena.sibling_count(new_node.parameters), 2);
}

#[test]
fn test_new_expression_statement() {
    let (tree, _) = parse_src("new Thing().run();");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let call = tree.arena.get(stmts[0]);
    assert_eq!(call.op, Some(OpKind::Call));
}

#[test]
fn test_sizeof() {
    let (tree, _) = parse_src("let n = sizeof(Vec2);");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let sizeof = tree.arena.get(var.initializer.unwrap());
    assert_eq!(sizeof.op, Some(OpKind::Sizeof));
    assert!(sizeof.data_type.is_some());
}

#[test]
fn test_type_alias() {
    let (tree, interner) = parse_src("type Id = u64;");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let alias = tree.arena.get(stmts[0]);
    assert_eq!(alias.kind, NodeKind::TypeAlias);
    assert_eq!(interner.resolve(alias.name.unwrap()), "Id");
}

#[test]
fn test_template_type_argument_vs_comparison() {
    // `Array<i32>` in type position consumes template args...
    let (tree, _) = parse_src("let xs: Array<i32> = make();");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let spec = tree.arena.get(var.data_type.unwrap());
    assert_eq!(tree.arena.sibling_count(spec.template_parameters), 1);

    // ...while `a < b` in expression position stays a comparison.
    let (tree, _) = parse_src("let t = a < b;");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let stmts = root_statements(&tree);
    let var = tree.arena.get(stmts[0]);
    let cmp = tree.arena.get(var.initializer.unwrap());
    assert_eq!(cmp.op, Some(OpKind::Less));
}

#[test]
fn test_recovery_emits_error_node_and_continues() {
    let (tree, _) = parse_src("let = 5;\nlet ok = 1;");
    assert!(tree.has_errors());
    let stmts = root_statements(&tree);
    // An error placeholder followed by the recovered statement.
    assert_eq!(kind(&tree.arena, stmts[0]), NodeKind::Error);
    assert_eq!(kind(&tree.arena, stmts[1]), NodeKind::Variable);
}

#[test]
fn test_missing_semicolon_recorded_once() {
    let (tree, _) = parse_src("let a = 1\nlet b = 2;");
    let missing: Vec<_> = tree
        .errors
        .iter()
        .filter(|e| e.code == ErrorCode::E1006)
        .collect();
    assert_eq!(missing.len(), 1);
    // Both statements still parsed.
    assert_eq!(root_statements(&tree).len(), 2);
}

#[test]
fn test_error_count_restored_on_backtrack() {
    // The failed arrow-function speculation must not leave errors behind.
    let (tree, _) = parse_src("let x = (a + b);");
    assert!(!tree.has_errors(), "{:?}", tree.errors);
}

#[test]
fn test_full_span_covers_statement() {
    let src = "let x = 1 + 2;";
    let (tree, _) = parse_src(src);
    let stmts = root_statements(&tree);
    let span = tree.arena.full_span(stmts[0]);
    assert_eq!(span.start, 0);
    // Up to at least the last literal.
    assert!(span.end >= 13);
}

#[test]
fn test_comma_operator_lowest_precedence() {
    let (tree, _) = parse_src("a = 1, b = 2;");
    let stmts = root_statements(&tree);
    let comma = tree.arena.get(stmts[0]);
    assert_eq!(comma.op, Some(OpKind::Comma));
}
