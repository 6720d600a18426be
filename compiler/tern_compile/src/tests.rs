//! Compiler tests: snippets in, IR shape and diagnostics out.

use crate::{compile, NoModules};
use tern_diagnostic::{Diagnostics, ErrorCode, Severity};
use tern_ir::{Instruction, Op, StringInterner, TypeId};
use tern_module::Module;
use tern_types::{ArgKind, FunctionRegistry, TypeRegistry};

struct Compiled {
    module: Module,
    types: TypeRegistry,
    funcs: FunctionRegistry,
    diags: Vec<tern_diagnostic::Diagnostic>,
    interner: StringInterner,
}

fn compile_src(src: &str) -> Compiled {
    let interner = StringInterner::new();
    let mut types = TypeRegistry::new();
    let mut funcs = FunctionRegistry::new();
    let mut diags = Diagnostics::new();

    let tokens = tern_lexer::lex(src, &interner);
    diags.extend(tokens.diagnostics);
    let tree = tern_parse::parse(&tokens.tokens, &interner);
    let module = compile(
        tree,
        "test",
        "test.tn",
        src,
        &mut types,
        &mut funcs,
        &interner,
        &mut diags,
        &NoModules,
    );
    Compiled {
        module,
        types,
        funcs,
        diags: diags.take(),
        interner,
    }
}

impl Compiled {
    fn assert_clean(&self) {
        let errors: Vec<_> = self
            .diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:#?}");
    }

    fn has_error(&self, code: ErrorCode) -> bool {
        self.diags
            .iter()
            .any(|d| d.code == code && d.severity == Severity::Error)
    }

    fn function_named(&self, name: &str) -> &tern_types::ScriptFunction {
        self.funcs
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("function `{name}` not found"))
    }

    fn code_of(&self, name: &str) -> &[Instruction] {
        self.function_named(name)
            .code
            .as_ref()
            .unwrap_or_else(|| panic!("function `{name}` has no code"))
            .code()
    }

    fn init_code(&self) -> &[Instruction] {
        self.funcs
            .get(self.module.init)
            .unwrap()
            .code
            .as_ref()
            .unwrap()
            .code()
    }

    /// Display names of every function targeted by a `call` in `code`.
    fn called_names(&self, code: &[Instruction]) -> Vec<String> {
        code.iter()
            .filter(|i| i.op == Op::Call)
            .filter_map(|i| match i.operands[0] {
                tern_ir::Operand::Func(id, _) => {
                    self.funcs.get(id).map(|f| f.display_name.clone())
                }
                _ => None,
            })
            .collect()
    }
}

// ── Overload resolution (spec scenario 1) ────────────────────────────

#[test]
fn test_overload_selects_exact_match() {
    let out = compile_src(
        "function f(a: i32): i32 { return a; }\n\
         function f(a: f32): f32 { return a; }\n\
         f(1);",
    );
    out.assert_clean();
    let calls = out.called_names(out.init_code());
    assert_eq!(calls, vec!["f(i32)"]);
}

#[test]
fn test_overload_prefers_float_family() {
    let out = compile_src(
        "function f(a: i32): i32 { return a; }\n\
         function f(a: f32): f32 { return a; }\n\
         f(1.0);",
    );
    out.assert_clean();
    let calls = out.called_names(out.init_code());
    assert_eq!(calls, vec!["f(f32)"]);
}

#[test]
fn test_overload_no_match_on_class_argument() {
    let out = compile_src(
        "class S { v: i32; }\n\
         function f(a: i32): i32 { return a; }\n\
         function f(a: f32): f32 { return a; }\n\
         let s = new S();\n\
         f(s);",
    );
    assert!(out.has_error(ErrorCode::E2005), "{:#?}", out.diags);
}

#[test]
fn test_ambiguous_overload_reports_candidates_as_info() {
    let out = compile_src(
        "class A { v: i32; }\n\
         class B { v: i32; constructor(a: A) { } }\n\
         class C { v: i32; constructor(a: A) { } }\n\
         function g(b: B): void { }\n\
         function g(c: C): void { }\n\
         let a = new A();\n\
         g(a);",
    );
    assert!(out.has_error(ErrorCode::E2004), "{:#?}", out.diags);
    let infos: Vec<_> = out
        .diags
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .collect();
    assert_eq!(infos.len(), 2, "{:#?}", out.diags);
    assert!(infos.iter().all(|d| d.message.starts_with("could be")));
}

// ── Implicit arguments (spec invariant 3) ────────────────────────────

#[test]
fn test_free_function_has_three_implicit_slots() {
    let out = compile_src("function f(a: i32): i32 { return a; }");
    out.assert_clean();
    let function = out.function_named("f");
    let sig = out
        .types
        .get(function.signature.unwrap())
        .unwrap()
        .signature()
        .unwrap()
        .clone();
    assert_eq!(sig.implicit_arity(), 3);
    assert_eq!(sig.explicit_arity(), 1);
    // Implicit slots precede explicit slots.
    assert_eq!(sig.args[0].kind, ArgKind::FuncPtr);
    assert_eq!(sig.args[1].kind, ArgKind::RetPtr);
    assert_eq!(sig.args[2].kind, ArgKind::ContextPtr);
    assert_eq!(sig.args[3].kind, ArgKind::Value);
}

#[test]
fn test_method_has_four_implicit_slots() {
    let out = compile_src("class K { v: i32; m(a: i32): i32 { return a; } }");
    out.assert_clean();
    let method = out.function_named("m");
    let sig = out
        .types
        .get(method.signature.unwrap())
        .unwrap()
        .signature()
        .unwrap()
        .clone();
    assert_eq!(sig.implicit_arity(), 4);
    assert_eq!(sig.args[3].kind, ArgKind::ThisPtr);
    // The this pointer is typed as the owning class.
    assert!(out.types.is_equal_to(sig.args[3].ty, method.owner.unwrap()));
}

#[test]
fn test_static_method_has_three_implicit_slots() {
    let out = compile_src("class K { v: i32; static m(a: i32): i32 { return a; } }");
    out.assert_clean();
    let method = out.function_named("m");
    let sig = out
        .types
        .get(method.signature.unwrap())
        .unwrap()
        .signature()
        .unwrap()
        .clone();
    assert_eq!(sig.implicit_arity(), 3);
}

// ── Destructor emission (spec scenario 3 + invariant 5) ──────────────

#[test]
fn test_destructor_and_stack_free_order() {
    let out = compile_src(
        "class R { v: i32; constructor() { } destructor() { } }\n\
         function main(): void { let r = new R(); }",
    );
    out.assert_clean();
    let code = out.code_of("main");

    let alloc_pos = code.iter().position(|i| i.op == Op::StackAllocate).unwrap();
    let calls: Vec<usize> = code
        .iter()
        .enumerate()
        .filter(|(_, i)| i.op == Op::Call)
        .map(|(idx, _)| idx)
        .collect();
    let free_pos = code.iter().position(|i| i.op == Op::StackFree).unwrap();

    // stack_allocate, constructor call, destructor call, stack_free.
    assert_eq!(calls.len(), 2, "{code:#?}");
    assert!(alloc_pos < calls[0]);
    assert!(calls[0] < calls[1]);
    assert!(calls[1] < free_pos);

    let names = out.called_names(code);
    assert!(names[0].contains("constructor"));
    assert!(names[1].contains("destructor"));

    // The allocation freed is the one allocated.
    let alloc_id = code[alloc_pos].operands[2].imm();
    let free_id = code[free_pos].operands[0].imm();
    assert_eq!(alloc_id, free_id);
}

#[test]
fn test_every_alloc_has_matching_free() {
    let out = compile_src(
        "function f(n: i32): i32 {\n\
             let a = 1;\n\
             if (n > 0) { let b = 2; return b; }\n\
             return a;\n\
         }",
    );
    out.assert_clean();
    let code = out.code_of("f");
    let allocs = code.iter().filter(|i| i.op == Op::StackAllocate).count();
    let frees = code.iter().filter(|i| i.op == Op::StackFree).count();
    // Each return path frees everything live on it, so frees can exceed
    // allocs; every alloc id must be freed at least once.
    assert!(frees >= allocs, "{code:#?}");
}

// ── Scope-aware break (spec scenario 4 + invariant 6) ────────────────

#[test]
fn test_break_unwinds_if_and_loop_body_scopes() {
    let out = compile_src(
        "class R { v: i32; constructor() { } destructor() { } }\n\
         function main(): void {\n\
             while (true) {\n\
                 let outer = new R();\n\
                 if (true) {\n\
                     let inner = new R();\n\
                     break;\n\
                 }\n\
             }\n\
         }",
    );
    out.assert_clean();
    let code = out.code_of("main");

    // Find the jump emitted by `break` (the jump immediately after the
    // destructor calls inside the if-block). Before it there must be two
    // destructor calls (inner first, then outer) and two stack_frees.
    let names = out.called_names(code);
    let dtor_calls = names.iter().filter(|n| n.contains("destructor")).count();
    // inner+outer on the break path, plus the normal loop-exit path for
    // outer (and the if-exit path for inner).
    assert!(dtor_calls >= 2, "{names:?}");

    // On the break path specifically: locate `break`'s jump: it is the
    // first Jump that follows two consecutive call+stack_free pairs.
    let mut saw_pairs = 0;
    let mut break_jump_found = false;
    let mut idx = 0;
    while idx < code.len() {
        match code[idx].op {
            Op::Call => {
                if code[idx + 1].op == Op::StackFree {
                    saw_pairs += 1;
                    idx += 2;
                    continue;
                }
                saw_pairs = 0;
            }
            Op::Jump if saw_pairs >= 2 => {
                break_jump_found = true;
                break;
            }
            Op::StackAllocate | Op::Label | Op::Param => {}
            _ => saw_pairs = 0,
        }
        idx += 1;
    }
    assert!(break_jump_found, "{code:#?}");
}

#[test]
fn test_break_outside_loop_is_diagnosed() {
    let out = compile_src("function f(): void { break; }");
    assert!(out.has_error(ErrorCode::E2014));
    let out = compile_src("function f(): void { continue; }");
    assert!(out.has_error(ErrorCode::E2015));
}

// ── Labels (spec invariant 4) ────────────────────────────────────────

#[test]
fn test_labels_defined_exactly_once() {
    let out = compile_src(
        "function f(n: i32): i32 {\n\
             let total = 0;\n\
             for (let i = 0; i < n; i = i + 1) {\n\
                 if (i == 3) { continue; }\n\
                 if (i == 7) { break; }\n\
                 total = total + i;\n\
             }\n\
             switch (total) { case 0: return 0; default: return total; }\n\
         }",
    );
    out.assert_clean();
    for function in out.funcs.iter() {
        if let Some(code) = &function.code {
            assert!(code.validate_labels(), "{}: {:#?}", function.name, code);
        }
    }
}

// ── Templates (spec scenario 2, idempotence) ─────────────────────────

#[test]
fn test_class_template_instantiation_cached() {
    let out = compile_src(
        "class Box<T> {\n\
             v: T;\n\
             value(): T { return v; }\n\
         }\n\
         let a: Box<i32> = new Box<i32>();\n\
         let b: Box<i32> = new Box<i32>();\n\
         let c: Box<f64> = new Box<f64>();",
    );
    out.assert_clean();

    let i32_box = out.types.by_fqn("test::Box<i32>").expect("Box<i32> registered");
    let f64_box = out.types.by_fqn("test::Box<f64>").expect("Box<f64> registered");
    assert_ne!(i32_box, f64_box);

    // Instantiated name and fqn per the spec.
    let ty = out.types.get(i32_box).unwrap();
    assert_eq!(ty.name, "Box<i32>");
    assert_eq!(ty.fqn, "test::Box<i32>");

    // The property took the substituted type and the method's implicit
    // this argument is the instantiation.
    let info = ty.class().unwrap();
    assert!(out.types.is_equal_to(info.properties[0].ty, out.types.primitives().i32));
    let value_method = info.methods[0];
    let sig_ty = out.funcs.get(value_method).unwrap().signature.unwrap();
    let sig = out.types.get(sig_ty).unwrap().signature().unwrap().clone();
    let this_arg = sig.args.iter().find(|a| a.kind == ArgKind::ThisPtr).unwrap();
    assert!(out.types.is_equal_to(this_arg.ty, i32_box));

    // Exactly one Box<i32> instantiation exists (cached on reuse).
    let count = out
        .types
        .iter()
        .filter(|t| t.fqn == "test::Box<i32>")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn test_template_arity_mismatch() {
    let out = compile_src(
        "class Pair<A, B> { first: A; second: B; }\n\
         let p: Pair<i32> = new Pair<i32>();",
    );
    assert!(out.has_error(ErrorCode::E2009), "{:#?}", out.diags);
}

#[test]
fn test_function_template_inference_and_cache() {
    let out = compile_src(
        "function id<T>(v: T): T { return v; }\n\
         let a = id(4);\n\
         let b = id(7);\n\
         let c = id(1.5);",
    );
    out.assert_clean();
    let instances: Vec<_> = out
        .funcs
        .iter()
        .filter(|f| f.fqn.starts_with("test::id<"))
        .map(|f| f.fqn.clone())
        .collect();
    // i32 cached across two calls, plus one f64 instance.
    assert_eq!(instances.len(), 2, "{instances:?}");
}

// ── Classes ──────────────────────────────────────────────────────────

#[test]
fn test_class_layout_and_privacy() {
    let out = compile_src(
        "class V {\n\
             x: f32;\n\
             private y: f32;\n\
             get_y(): f32 { return y; }\n\
         }\n\
         let v = new V();\n\
         let ok = v.x;\n\
         let bad = v.y;",
    );
    assert!(out.has_error(ErrorCode::E2008), "{:#?}", out.diags);

    let ty = out.types.by_fqn("test::V").unwrap();
    let ty = out.types.get(ty).unwrap();
    assert_eq!(ty.meta.size, 8);
    let info = ty.class().unwrap();
    assert_eq!(info.properties[0].offset, 0);
    assert_eq!(info.properties[1].offset, 4);
}

#[test]
fn test_inherited_property_access() {
    let out = compile_src(
        "class Base { tag: i32; }\n\
         class Derived extends Base { v: f32; }\n\
         function f(d: Derived): i32 { return d.tag; }",
    );
    out.assert_clean();
    let derived = out.types.get(out.types.by_fqn("test::Derived").unwrap()).unwrap();
    assert_eq!(derived.meta.size, 8);
    assert_eq!(derived.class().unwrap().bases[0].offset, 0);
    assert_eq!(derived.class().unwrap().properties[0].offset, 4);
}

#[test]
fn test_operator_overload_dispatch() {
    let out = compile_src(
        "class Vec {\n\
             x: f32;\n\
             constructor(x: f32) { this.x = x; }\n\
             operator +(rhs: Vec): Vec { return new Vec(x); }\n\
         }\n\
         function f(a: Vec, b: Vec): void { let c = a + b; }",
    );
    out.assert_clean();
    let code = out.code_of("f");
    let names = out.called_names(code);
    assert!(
        names.iter().any(|n| n.contains("operator+")),
        "{names:?}"
    );
}

#[test]
fn test_conversion_operator_enables_convertibility() {
    let out = compile_src(
        "class Meters {\n\
             v: f64;\n\
             operator f64() { return v; }\n\
         }\n\
         function f(m: Meters): f64 { return m as f64; }",
    );
    out.assert_clean();
}

#[test]
fn test_duplicate_destructor_diagnosed() {
    let out = compile_src(
        "class R { v: i32; destructor() { } destructor() { } }",
    );
    assert!(out.has_error(ErrorCode::E2011));
}

#[test]
fn test_getter_setter_accessors() {
    let out = compile_src(
        "class Temp {\n\
             celsius: f64;\n\
             get fahrenheit(): f64 { return celsius * 1.8 + 32.0; }\n\
             set fahrenheit(v: f64) { celsius = (v - 32.0) / 1.8; }\n\
         }\n\
         function f(t: Temp): f64 { t.fahrenheit = 100.0; return t.fahrenheit; }",
    );
    out.assert_clean();
    let code = out.code_of("f");
    let names = out.called_names(code);
    assert!(names.iter().any(|n| n.contains("$set_fahrenheit")), "{names:?}");
    assert!(names.iter().any(|n| n.contains("$get_fahrenheit")), "{names:?}");
}

// ── Poison suppression ───────────────────────────────────────────────

#[test]
fn test_poison_suppresses_cascades() {
    // Three unknown identifiers, three diagnostics; the member access,
    // call, multiplication, and addition over the poisoned values stay
    // silent.
    let out = compile_src("let x = missing + 1 * missing2(missing.f);");
    let errors: Vec<_> = out
        .diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 3, "{errors:#?}");
    assert!(errors.iter().all(|e| e.code == ErrorCode::E2001));
}

// ── Misc semantics ───────────────────────────────────────────────────

#[test]
fn test_const_assignment_diagnosed() {
    let out = compile_src("function f(): void { const x = 1; x = 2; }");
    assert!(out.has_error(ErrorCode::E2024));
}

#[test]
fn test_this_outside_class() {
    let out = compile_src("function f(): void { let a = this; }");
    assert!(out.has_error(ErrorCode::E2013));
}

#[test]
fn test_return_value_required() {
    let out = compile_src("function f(): i32 { let x = 1; }");
    assert!(out.has_error(ErrorCode::E2012));
}

#[test]
fn test_capture_rejected() {
    let out = compile_src(
        "function f(): void {\n\
             let local = 4;\n\
             let g = (v: i32) => v + local;\n\
         }",
    );
    assert!(out.has_error(ErrorCode::E2029), "{:#?}", out.diags);
}

#[test]
fn test_conditional_expression_reserve_resolve() {
    let out = compile_src("function f(c: bool): i32 { return c ? 1 : 2; }");
    out.assert_clean();
    let code = out.code_of("f");
    let reserves = code.iter().filter(|i| i.op == Op::Reserve).count();
    let resolves = code.iter().filter(|i| i.op == Op::Resolve).count();
    assert_eq!(reserves, 1, "{code:#?}");
    assert_eq!(resolves, 2, "{code:#?}");
}

#[test]
fn test_module_level_let_becomes_data_slot() {
    let out = compile_src("let counter = 10;");
    out.assert_clean();
    assert_eq!(out.module.data.len(), 1);
    assert_eq!(out.module.data[0].name, "counter");
    // __init__ stores into the slot.
    let init = out.init_code();
    assert!(init.iter().any(|i| i.op == Op::ModuleData));
    assert!(init.iter().any(|i| i.op == Op::Store));
}

#[test]
fn test_export_sets_public_access() {
    let out = compile_src(
        "export function api(): i32 { return 1; }\n\
         function internal(): i32 { return 2; }",
    );
    out.assert_clean();
    assert_eq!(out.function_named("api").access, tern_types::Access::Public);
    assert_eq!(
        out.function_named("internal").access,
        tern_types::Access::Private
    );
}

#[test]
fn test_import_unknown_module() {
    let out = compile_src("import { x } from \"nowhere\";");
    assert!(out.has_error(ErrorCode::E2021));
}

#[test]
fn test_sizeof_is_constant() {
    let out = compile_src(
        "class P { x: f32; y: f32; }\n\
         let n = sizeof(P);",
    );
    out.assert_clean();
    let interner = &out.interner;
    let _ = interner;
    // The slot is initialized from an immediate 8.
    let init = out.init_code();
    let store = init.iter().find(|i| i.op == Op::Store).unwrap();
    assert_eq!(store.operands[0].imm(), Some(tern_ir::Imm::UInt(8)));
}

#[test]
fn test_forward_reference_through_init() {
    // `f` is declared after its use site at module root.
    let out = compile_src(
        "let x = f(2);\n\
         function f(a: i32): i32 { return a * 2; }",
    );
    out.assert_clean();
}

#[test]
fn test_type_id_matches_fqn_hash() {
    let out = compile_src("class T { v: i32; }");
    out.assert_clean();
    let id = out.types.by_fqn("test::T").unwrap();
    assert_eq!(id, TypeId::of("test::T"));
    assert_eq!(out.types.get(id).unwrap().id, id);
}
