//! VM execution tests over hand-assembled IR.

use crate::{HostTable, HostValue, RuntimeError, Vm, VmConfig, VmEnv};
use tern_ir::{
    CodeHolder, FunctionId, Imm, Instruction, Op, Operand, Span, TypeId,
};
use tern_module::Module;
use tern_types::{
    Access, ArgKind, ClassInfo, DataType, FunctionArgument, FunctionRegistry, MetaFlags,
    ScriptFunction, Signature, TypeKind, TypeMeta, TypeRegistry,
};

struct Fixture {
    types: TypeRegistry,
    funcs: FunctionRegistry,
    host: HostTable,
}

impl Fixture {
    fn new() -> Fixture {
        Fixture {
            types: TypeRegistry::new(),
            funcs: FunctionRegistry::new(),
            host: HostTable::new(),
        }
    }

    fn sig(&mut self, ret: TypeId, explicit: &[(ArgKind, TypeId)]) -> TypeId {
        let ptr = self.types.primitives().ptr;
        let mut args = vec![
            FunctionArgument { kind: ArgKind::FuncPtr, ty: ptr },
            FunctionArgument { kind: ArgKind::RetPtr, ty: ptr },
            FunctionArgument { kind: ArgKind::ContextPtr, ty: ptr },
        ];
        args.extend(explicit.iter().map(|&(kind, ty)| FunctionArgument { kind, ty }));
        self.types.function_type(Signature::new(ret, args), &[])
    }

    fn bytecode_fn(&mut self, name: &str, sig: TypeId, code: CodeHolder) -> FunctionId {
        let mut function = ScriptFunction::new(name, format!("t::{name}"));
        function.signature = Some(sig);
        function.code = Some(code);
        self.funcs.register(function)
    }

    fn run(&mut self, vm: &mut Vm, function: FunctionId, args: &[u64]) -> Result<u64, RuntimeError> {
        let mut env = VmEnv {
            types: &self.types,
            funcs: &self.funcs,
            host: &mut self.host,
        };
        vm.execute(&mut env, function, args)
    }
}

fn reg(r: u32, ty: TypeId) -> Operand {
    Operand::Reg(tern_ir::RegId(r), ty)
}

fn int(v: i64, ty: TypeId) -> Operand {
    Operand::Imm(Imm::Int(v), ty)
}

/// Spec scenario 5: arithmetic, compare, branch.
#[test]
fn test_arithmetic_and_branch() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let boolean = fx.types.primitives().boolean;
    let sig = fx.sig(i32_ty, &[]);

    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg(); // implicit arg registers 0..2
    }
    let r1 = code.alloc_reg();
    let r2 = code.alloc_reg();
    let r3 = code.alloc_reg();
    let r4 = code.alloc_reg();
    let l_true = code.alloc_label();
    let l_false = code.alloc_label();
    let span = Span::DUMMY;

    code.emit(Instruction::new(Op::IAdd, span).with_operands(&[
        Operand::Reg(r1, i32_ty),
        int(0, i32_ty),
        int(3, i32_ty),
    ]));
    code.emit(Instruction::new(Op::IAdd, span).with_operands(&[
        Operand::Reg(r2, i32_ty),
        int(0, i32_ty),
        int(4, i32_ty),
    ]));
    code.emit(Instruction::new(Op::IAdd, span).with_operands(&[
        Operand::Reg(r3, i32_ty),
        Operand::Reg(r1, i32_ty),
        Operand::Reg(r2, i32_ty),
    ]));
    code.emit(Instruction::new(Op::IEq, span).with_operands(&[
        Operand::Reg(r4, boolean),
        Operand::Reg(r3, i32_ty),
        int(7, i32_ty),
    ]));
    code.emit(
        Instruction::new(Op::Branch, span)
            .with_operands(&[Operand::Reg(r4, boolean)])
            .with_labels(&[l_true, l_false]),
    );
    code.place_label(l_true, span);
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(r3, i32_ty)]));
    code.place_label(l_false, span);
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[int(0, i32_ty)]));

    let function = fx.bytecode_fn("main", sig, code);
    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    let result = fx.run(&mut vm, function, &[0, 0, 0]).unwrap();
    assert_eq!(result, 7);
}

/// Spec scenario 6: stack overflow at the guard, success below it.
#[test]
fn test_stack_guard_boundary() {
    let mut fx = Fixture::new();
    let u64_ty = fx.types.primitives().u64;
    let void = fx.types.primitives().void;
    let sig = fx.sig(void, &[]);

    let store_at = |fx: &mut Fixture, addr: u64| {
        let u64_ty = fx.types.primitives().u64;
        let mut code = CodeHolder::new();
        for _ in 0..3 {
            code.alloc_reg();
        }
        code.emit(Instruction::new(Op::Store, Span::DUMMY).with_operands(&[
            Operand::Imm(Imm::UInt(7), u64_ty),
            Operand::Imm(Imm::UInt(addr), u64_ty),
        ]));
        code.emit(Instruction::new(Op::Ret, Span::DUMMY));
        code
    };

    let at_guard = store_at(&mut fx, 64);
    let below = store_at(&mut fx, 56);
    let f_guard = fx.bytecode_fn("at_guard", sig, at_guard);
    let f_below = fx.bytecode_fn("below", sig, below);

    let mut vm = Vm::new(VmConfig { stack_size: 64, ..VmConfig::default() });
    // The prepare-state push occupies the bottom 16 stack bytes; the
    // addresses here are absolute, so that does not interfere.
    let err = fx.run(&mut vm, f_guard, &[0, 0, 0]).unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow { address: 64 }));
    assert!(fx.run(&mut vm, f_below, &[0, 0, 0]).is_ok());
    let _ = u64_ty;
}

#[test]
fn test_stack_allocate_load_store_free() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let ptr = fx.types.primitives().ptr;
    let sig = fx.sig(i32_ty, &[]);

    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let addr = code.alloc_reg();
    let loaded = code.alloc_reg();
    let alloc = code.alloc_stack_id();
    let span = Span::DUMMY;

    code.emit(Instruction::new(Op::StackAllocate, span).with_operands(&[
        Operand::Reg(addr, ptr),
        Operand::Imm(Imm::UInt(4), i32_ty),
        Operand::Imm(Imm::UInt(u64::from(alloc.0)), i32_ty),
    ]));
    code.emit(Instruction::new(Op::Store, span).with_operands(&[
        int(41, i32_ty),
        Operand::Reg(addr, ptr),
    ]));
    code.emit(Instruction::new(Op::Load, span).with_operands(&[
        Operand::Reg(loaded, i32_ty),
        Operand::Reg(addr, ptr),
    ]));
    code.emit(Instruction::new(Op::IInc, span).with_operands(&[
        Operand::Reg(loaded, i32_ty),
        Operand::Reg(loaded, i32_ty),
    ]));
    code.emit(Instruction::new(Op::StackFree, span).with_operands(&[Operand::Imm(
        Imm::UInt(u64::from(alloc.0)),
        i32_ty,
    )]));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(loaded, i32_ty)]));

    let function = fx.bytecode_fn("f", sig, code);
    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, function, &[0, 0, 0]).unwrap(), 42);
}

#[test]
fn test_bytecode_call_and_return() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let sig1 = fx.sig(i32_ty, &[(ArgKind::Value, i32_ty)]);
    let span = Span::DUMMY;

    // callee: return arg * 2 (arg is register 3 after the implicit
    // prefix).
    let mut callee = CodeHolder::new();
    for _ in 0..4 {
        callee.alloc_reg();
    }
    let doubled = callee.alloc_reg();
    callee.emit(Instruction::new(Op::IMul, span).with_operands(&[
        Operand::Reg(doubled, i32_ty),
        reg(3, i32_ty),
        int(2, i32_ty),
    ]));
    callee.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(doubled, i32_ty)]));
    let callee = fx.bytecode_fn("double", sig1, callee);

    // caller: return double(21)
    let sig0 = fx.sig(i32_ty, &[]);
    let mut caller = CodeHolder::new();
    for _ in 0..3 {
        caller.alloc_reg();
    }
    let result = caller.alloc_reg();
    let ptr = fx.types.primitives().ptr;
    for value in [0u64, 0, 0] {
        caller.emit(Instruction::new(Op::Param, span).with_operands(&[
            Operand::Imm(Imm::UInt(value), ptr),
            Operand::Func(callee, ptr),
        ]));
    }
    caller.emit(Instruction::new(Op::Param, span).with_operands(&[
        int(21, i32_ty),
        Operand::Func(callee, ptr),
    ]));
    caller.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Func(callee, ptr),
        Operand::Imm(Imm::UInt(u64::from(sig1.0)), ptr),
        Operand::Reg(result, i32_ty),
    ]));
    caller.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(result, i32_ty)]));
    let caller = fx.bytecode_fn("main", sig0, caller);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, caller, &[0, 0, 0]).unwrap(), 42);
    assert!(!vm.is_executing());
}

#[test]
fn test_host_function_bridge() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let sig = fx.sig(i32_ty, &[(ArgKind::Value, i32_ty), (ArgKind::Value, i32_ty)]);

    // Host: add the two i32 arguments.
    let handle = fx.host.register(Box::new(|call| {
        let (HostValue::I32(a), HostValue::I32(b)) = (call.arg(0), call.arg(1)) else {
            panic!("bad unwrap");
        };
        call.set_return(HostValue::I32(a + b));
        Ok(())
    }));
    let mut function = ScriptFunction::new("host_add", "t::host_add");
    function.signature = Some(sig);
    function.host = Some(handle);
    let host_add = fx.funcs.register(function);

    // caller: return host_add(19, 23)
    let sig0 = fx.sig(i32_ty, &[]);
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;
    let mut caller = CodeHolder::new();
    for _ in 0..3 {
        caller.alloc_reg();
    }
    let result = caller.alloc_reg();
    for operand in [
        Operand::Imm(Imm::UInt(0), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
        int(19, i32_ty),
        int(23, i32_ty),
    ] {
        caller.emit(
            Instruction::new(Op::Param, span)
                .with_operands(&[operand, Operand::Func(host_add, ptr)]),
        );
    }
    caller.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Func(host_add, ptr),
        Operand::Imm(Imm::UInt(u64::from(sig.0)), ptr),
        Operand::Reg(result, i32_ty),
    ]));
    caller.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(result, i32_ty)]));
    let caller = fx.bytecode_fn("main", sig0, caller);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, caller, &[0, 0, 0]).unwrap(), 42);
}

#[test]
fn test_host_signature_mismatch() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;

    // A class declared pass-by-value: a bridge contract violation.
    let class = fx.types.insert(DataType {
        id: TypeId::POISON,
        name: "Blob".into(),
        fqn: "t::Blob".into(),
        access: Access::Public,
        owner: None,
        meta: TypeMeta::new(MetaFlags::TRIVIAL, 16),
        kind: TypeKind::Class(ClassInfo::default()),
    });
    let sig = fx.sig(i32_ty, &[(ArgKind::Value, class)]);
    let handle = fx.host.register(Box::new(|_| Ok(())));
    let mut function = ScriptFunction::new("bad", "t::bad");
    function.signature = Some(sig);
    function.host = Some(handle);
    let bad = fx.funcs.register(function);

    let sig0 = fx.sig(i32_ty, &[]);
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;
    let mut caller = CodeHolder::new();
    for _ in 0..3 {
        caller.alloc_reg();
    }
    for _ in 0..4 {
        caller.emit(
            Instruction::new(Op::Param, span)
                .with_operands(&[Operand::Imm(Imm::UInt(0), ptr), Operand::Func(bad, ptr)]),
        );
    }
    caller.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Func(bad, ptr),
        Operand::Imm(Imm::UInt(u64::from(sig.0)), ptr),
    ]));
    caller.emit(Instruction::new(Op::Ret, span));
    let caller = fx.bytecode_fn("main", sig0, caller);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    let err = fx.run(&mut vm, caller, &[0, 0, 0]).unwrap_err();
    assert!(matches!(err, RuntimeError::HostSignatureMismatch { arg: 3, .. }));
}

#[test]
fn test_invalid_callback() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let sig0 = fx.sig(i32_ty, &[]);
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;

    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let bogus = code.alloc_reg();
    // Register holds a nonsense function id.
    code.emit(Instruction::new(Op::UAdd, span).with_operands(&[
        Operand::Reg(bogus, ptr),
        Operand::Imm(Imm::UInt(9999), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
    ]));
    code.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Reg(bogus, ptr),
        Operand::Imm(Imm::UInt(0), ptr),
    ]));
    let function = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    let err = fx.run(&mut vm, function, &[0, 0, 0]).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidCallback { value: 9999 }));
}

#[test]
fn test_try_catch_unwinds_to_handler() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let u64_ty = fx.types.primitives().u64;
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;

    // Host intrinsic that raises.
    let throw_sig = fx.sig(fx.types.primitives().void, &[(ArgKind::Value, u64_ty)]);
    let handle = fx.host.register(Box::new(|call| {
        let HostValue::U64(value) = call.arg(0) else { panic!() };
        Err(crate::raise(value, TypeId::of("u64")))
    }));
    let mut function = ScriptFunction::new("__throw", "__throw");
    function.signature = Some(throw_sig);
    function.host = Some(handle);
    let throw_fn = fx.funcs.register(function);

    // main: try { throw 5; return 0; } catch (e) { return e + 1; }
    let sig0 = fx.sig(i32_ty, &[]);
    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let caught = code.alloc_reg();
    let bumped = code.alloc_reg();
    let l_catch = code.alloc_label();
    code.emit(
        Instruction::new(Op::TryBegin, span)
            .with_operands(&[Operand::Reg(caught, u64_ty)])
            .with_labels(&[l_catch]),
    );
    for operand in [
        Operand::Imm(Imm::UInt(0), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
        Operand::Imm(Imm::UInt(5), u64_ty),
    ] {
        code.emit(
            Instruction::new(Op::Param, span)
                .with_operands(&[operand, Operand::Func(throw_fn, ptr)]),
        );
    }
    code.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Func(throw_fn, ptr),
        Operand::Imm(Imm::UInt(u64::from(throw_sig.0)), ptr),
    ]));
    code.emit(Instruction::new(Op::TryEnd, span));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[int(0, i32_ty)]));
    code.place_label(l_catch, span);
    code.emit(Instruction::new(Op::UAdd, span).with_operands(&[
        Operand::Reg(bumped, u64_ty),
        Operand::Reg(caught, u64_ty),
        Operand::Imm(Imm::UInt(1), u64_ty),
    ]));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(bumped, u64_ty)]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, main, &[0, 0, 0]).unwrap(), 6);
}

#[test]
fn test_uncaught_exception_propagates() {
    let mut fx = Fixture::new();
    let u64_ty = fx.types.primitives().u64;
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;

    let throw_sig = fx.sig(fx.types.primitives().void, &[(ArgKind::Value, u64_ty)]);
    let handle = fx
        .host
        .register(Box::new(|_| Err(crate::raise(9, TypeId::of("u64")))));
    let mut function = ScriptFunction::new("__throw", "__throw");
    function.signature = Some(throw_sig);
    function.host = Some(handle);
    let throw_fn = fx.funcs.register(function);

    let sig0 = fx.sig(fx.types.primitives().void, &[]);
    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    for _ in 0..4 {
        code.emit(
            Instruction::new(Op::Param, span)
                .with_operands(&[Operand::Imm(Imm::UInt(0), ptr), Operand::Func(throw_fn, ptr)]),
        );
    }
    code.emit(Instruction::new(Op::Call, span).with_operands(&[
        Operand::Func(throw_fn, ptr),
        Operand::Imm(Imm::UInt(u64::from(throw_sig.0)), ptr),
    ]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    let err = fx.run(&mut vm, main, &[0, 0, 0]).unwrap_err();
    assert!(matches!(err, RuntimeError::ScriptException { value: 9, .. }));
}

#[test]
fn test_module_data_access() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let ptr = fx.types.primitives().ptr;
    let span = Span::DUMMY;

    let mut module = Module::new("m", "m.tn");
    let slot = module.add_data("g", i32_ty, 4, Access::Public);
    module.data[slot].bytes.copy_from_slice(&42i32.to_le_bytes());

    let sig0 = fx.sig(i32_ty, &[]);
    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let addr = code.alloc_reg();
    let value = code.alloc_reg();
    code.emit(Instruction::new(Op::ModuleData, span).with_operands(&[
        Operand::Reg(addr, ptr),
        Operand::Imm(Imm::UInt(u64::from(module.id.0)), ptr),
        Operand::Imm(Imm::UInt(0), ptr),
    ]));
    code.emit(Instruction::new(Op::Load, span).with_operands(&[
        Operand::Reg(value, i32_ty),
        Operand::Reg(addr, ptr),
    ]));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(value, i32_ty)]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    vm.load_module(&module);
    assert_eq!(fx.run(&mut vm, main, &[0, 0, 0]).unwrap(), 42);
}

#[test]
fn test_cvt_between_numeric_classes() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let f64_ty = fx.types.primitives().f64;
    let span = Span::DUMMY;

    let sig0 = fx.sig(f64_ty, &[]);
    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let as_f64 = code.alloc_reg();
    code.emit(Instruction::new(Op::Cvt, span).with_operands(&[
        Operand::Reg(as_f64, f64_ty),
        int(21, i32_ty),
        Operand::Imm(Imm::UInt(u64::from(f64_ty.0)), f64_ty),
    ]));
    let doubled = code.alloc_reg();
    code.emit(Instruction::new(Op::DMul, span).with_operands(&[
        Operand::Reg(doubled, f64_ty),
        Operand::Reg(as_f64, f64_ty),
        Operand::Imm(Imm::Float(2.0), f64_ty),
    ]));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(doubled, f64_ty)]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    let bits = fx.run(&mut vm, main, &[0, 0, 0]).unwrap();
    assert_eq!(f64::from_bits(bits), 42.0);
}

#[test]
fn test_term_stops_execution() {
    let mut fx = Fixture::new();
    let i32_ty = fx.types.primitives().i32;
    let sig0 = fx.sig(i32_ty, &[]);
    let span = Span::DUMMY;

    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    code.emit(Instruction::new(Op::Term, span));
    // Unreachable.
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[int(1, i32_ty)]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, main, &[0, 0, 0]).unwrap(), 0);
}

#[test]
fn test_narrow_arithmetic_wraps() {
    let mut fx = Fixture::new();
    let u8_ty = fx.types.primitives().u8;
    let sig0 = fx.sig(u8_ty, &[]);
    let span = Span::DUMMY;

    let mut code = CodeHolder::new();
    for _ in 0..3 {
        code.alloc_reg();
    }
    let sum = code.alloc_reg();
    code.emit(Instruction::new(Op::UAdd, span).with_operands(&[
        Operand::Reg(sum, u8_ty),
        Operand::Imm(Imm::UInt(200), u8_ty),
        Operand::Imm(Imm::UInt(100), u8_ty),
    ]));
    code.emit(Instruction::new(Op::Ret, span).with_operands(&[Operand::Reg(sum, u8_ty)]));
    let main = fx.bytecode_fn("main", sig0, code);

    let mut vm = Vm::new(VmConfig { stack_size: 1024, ..VmConfig::default() });
    assert_eq!(fx.run(&mut vm, main, &[0, 0, 0]).unwrap(), 44); // (200+100) & 0xff
}
