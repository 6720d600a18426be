//! The register-based interpreter.
//!
//! Executes the three-address IR directly. Each call frame owns a bank
//! of virtual registers sized from the function's register counter; the
//! fixed special registers (`zero`, `ip`, `sp`, `ra`, `v0`, `f0`) live
//! in the VM-wide [`Registers`] file. The dispatch loop is a dense
//! switch over the op-code; loads and stores bounds-check against the
//! stack guard on every access.

use crate::{HostCall, HostTable, HostValue, Memory, Registers, RuntimeError, VmReg};
use tern_ir::{FunctionId, Imm, Instruction, LabelId, ModuleId, Op, Operand, RegId, TypeId};
use tern_module::Module;
use tern_types::{ArgKind, FunctionRegistry, TypeRegistry};
use tracing::trace;

/// VM configuration.
#[derive(Clone, Debug)]
pub struct VmConfig {
    /// Usable stack bytes (the 8-byte guard is appended on top).
    pub stack_size: u64,
    /// Log each dispatched instruction at `trace` level.
    pub log_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 8 * 1024 * 1024,
            log_instructions: false,
        }
    }
}

/// Main-loop state: running until `term` or until the code vector ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VmState {
    Running,
    Terminated,
}

/// Registry access the VM needs while executing.
pub struct VmEnv<'a> {
    pub types: &'a TypeRegistry,
    pub funcs: &'a FunctionRegistry,
    pub host: &'a mut HostTable,
}

/// One bytecode call frame.
struct Frame {
    func: FunctionId,
    ip: usize,
    regs: Vec<u64>,
    /// Label id -> instruction index, built once per frame entry.
    labels: Vec<usize>,
    /// Live stack allocations: id -> (address, size).
    allocs: Vec<Option<(u64, u64)>>,
    sp_entry: u64,
    /// Caller register receiving a primitive return value.
    dst: Option<RegId>,
}

/// An armed `try` region.
struct Handler {
    /// Frame count when the handler was armed; unwinding truncates back
    /// to this depth.
    frame_depth: usize,
    target_ip: usize,
    catch_reg: RegId,
    sp: u64,
}

/// The virtual machine: memory, special registers, and re-entry depth.
pub struct Vm {
    pub memory: Memory,
    registers: Registers,
    config: VmConfig,
    nest: u32,
}

impl Vm {
    pub fn new(config: VmConfig) -> Vm {
        let memory = Memory::new(config.stack_size);
        Vm {
            memory,
            registers: Registers::new(),
            config,
            nest: 0,
        }
    }

    /// Map a module's data area into VM memory (idempotent).
    pub fn load_module(&mut self, module: &Module) -> u64 {
        self.memory.map_module(module)
    }

    /// Whether an `execute` nest is currently on the (host) stack.
    pub fn is_executing(&self) -> bool {
        self.nest > 0
    }

    /// Push `ip`/`ra` so host code can re-enter the VM; pairs with
    /// `restore_state`.
    fn prepare_state(&mut self) -> Result<(), RuntimeError> {
        if self.nest == 0 {
            self.registers.set(VmReg::Sp, self.memory.stack_base());
            self.registers.set(VmReg::Ip, 0);
            self.registers.set(VmReg::Ra, 0);
        }
        let sp = self.registers.get(VmReg::Sp);
        self.memory.store(sp, self.registers.get(VmReg::Ip), 8)?;
        self.memory.store(sp + 8, self.registers.get(VmReg::Ra), 8)?;
        self.registers.set(VmReg::Sp, sp + 16);
        self.nest += 1;
        Ok(())
    }

    fn restore_state(&mut self) {
        self.nest -= 1;
        let sp = self.registers.get(VmReg::Sp).saturating_sub(16);
        if let (Ok(ip), Ok(ra)) = (self.memory.load(sp, 8), self.memory.load(sp + 8, 8)) {
            self.registers.set(VmReg::Ip, ip);
            self.registers.set(VmReg::Ra, ra);
        }
        self.registers.set(VmReg::Sp, sp);
    }

    /// Execute a function with raw argument values (one per declared
    /// argument, implicit prefix included). Returns the value of `v0`
    /// at termination.
    pub fn execute(
        &mut self,
        env: &mut VmEnv<'_>,
        function: FunctionId,
        args: &[u64],
    ) -> Result<u64, RuntimeError> {
        self.prepare_state()?;
        let result = self.run(env, function, args);
        self.restore_state();
        result
    }

    fn build_frame(
        &self,
        env: &VmEnv<'_>,
        function: FunctionId,
        args: &[u64],
        dst: Option<RegId>,
    ) -> Result<Frame, RuntimeError> {
        let record = env
            .funcs
            .get(function)
            .ok_or(RuntimeError::InvalidFunction { id: function })?;
        let code = record
            .code
            .as_ref()
            .ok_or(RuntimeError::InvalidFunction { id: function })?;

        let mut regs = vec![0u64; (code.next_reg_id() as usize).max(args.len())];
        regs[..args.len()].copy_from_slice(args);

        let mut labels = vec![usize::MAX; code.next_label_id() as usize];
        for (idx, instr) in code.code().iter().enumerate() {
            if instr.op == Op::Label {
                if let Some(label) = instr.labels[0] {
                    labels[label.0 as usize] = idx;
                }
            }
        }

        Ok(Frame {
            func: function,
            ip: 0,
            regs,
            labels,
            allocs: vec![None; code.next_alloc_id() as usize],
            sp_entry: self.registers.get(VmReg::Sp),
            dst,
        })
    }

    fn run(
        &mut self,
        env: &mut VmEnv<'_>,
        function: FunctionId,
        args: &[u64],
    ) -> Result<u64, RuntimeError> {
        let mut frames = vec![self.build_frame(env, function, args, None)?];
        let mut handlers: Vec<Handler> = Vec::new();
        let mut params: Vec<u64> = Vec::new();
        let mut state = VmState::Running;

        while state == VmState::Running {
            let depth = frames.len();
            let Some((func, ip, sp_entry)) =
                frames.last().map(|f| (f.func, f.ip, f.sp_entry))
            else {
                break;
            };
            let record = env
                .funcs
                .get(func)
                .ok_or(RuntimeError::InvalidFunction { id: func })?;
            let code = record
                .code
                .as_ref()
                .ok_or(RuntimeError::InvalidFunction { id: func })?
                .code();

            // Falling off the end of the code vector terminates the
            // frame (and the whole run once the last frame is gone).
            if ip >= code.len() {
                frames.pop();
                self.registers.set(VmReg::Sp, sp_entry);
                if frames.is_empty() {
                    state = VmState::Terminated;
                }
                continue;
            }

            let instr = code[ip];
            if self.config.log_instructions {
                trace!(func = ?func, ip, "{instr}");
            }

            let step = self.step(env, &mut frames, &mut params, instr, depth);
            match step {
                Ok(next) => match next {
                    Step::Next => {
                        if let Some(frame) = frames.last_mut() {
                            frame.ip += 1;
                        } else {
                            state = VmState::Terminated;
                        }
                    }
                    Step::Stay => {}
                    Step::Terminate => state = VmState::Terminated,
                    Step::ArmHandler(handler) => {
                        handlers.push(handler);
                        if let Some(frame) = frames.last_mut() {
                            frame.ip += 1;
                        }
                    }
                    Step::DisarmHandler => {
                        handlers.pop();
                        if let Some(frame) = frames.last_mut() {
                            frame.ip += 1;
                        }
                    }
                },
                Err(RuntimeError::ScriptException { value, ty }) => {
                    // Unwind to the innermost armed handler, or out of
                    // this execute nest entirely.
                    let Some(handler) = handlers.pop() else {
                        return Err(RuntimeError::ScriptException { value, ty });
                    };
                    frames.truncate(handler.frame_depth);
                    let Some(frame) = frames.last_mut() else {
                        return Err(RuntimeError::ScriptException { value, ty });
                    };
                    frame.regs[handler.catch_reg.0 as usize] = value;
                    frame.ip = handler.target_ip;
                    self.registers.set(VmReg::Sp, handler.sp);
                }
                Err(other) => return Err(other),
            }
            // Handlers armed by frames that have since returned are
            // dead; drop them so unwinding never targets a gone frame.
            handlers.retain(|h| h.frame_depth <= frames.len());
        }

        Ok(self.registers.get(VmReg::V0))
    }

    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        env: &mut VmEnv<'_>,
        frames: &mut Vec<Frame>,
        params: &mut Vec<u64>,
        instr: Instruction,
        depth: usize,
    ) -> Result<Step, RuntimeError> {
        let frame = frames.last_mut().expect("active frame");
        match instr.op {
            Op::Noop | Op::Label | Op::Reserve => Ok(Step::Next),
            Op::Term => Ok(Step::Terminate),

            Op::StackAllocate => {
                let size = read(frame, &instr.operands[1]).max(1);
                let alloc = read(frame, &instr.operands[2]) as usize;
                let sp = self.registers.get(VmReg::Sp);
                let aligned = (size + 7) & !7;
                if sp + aligned > self.memory.guard_start() {
                    return Err(RuntimeError::StackOverflow { address: sp + aligned });
                }
                if let Some(slot) = frame.allocs.get_mut(alloc) {
                    *slot = Some((sp, aligned));
                }
                write_dst(frame, &instr.operands[0], sp)?;
                self.registers.set(VmReg::Sp, sp + aligned);
                Ok(Step::Next)
            }
            Op::StackFree => {
                let alloc = read(frame, &instr.operands[0]) as usize;
                if let Some(slot) = frame.allocs.get_mut(alloc) {
                    if let Some((addr, size)) = slot.take() {
                        // LIFO frees move the stack pointer back down;
                        // out-of-order frees resolve when the frame
                        // exits.
                        if addr + size == self.registers.get(VmReg::Sp) {
                            self.registers.set(VmReg::Sp, addr);
                        }
                    }
                }
                Ok(Step::Next)
            }
            Op::ModuleData => {
                let module = ModuleId(read(frame, &instr.operands[1]) as u32);
                let offset = read(frame, &instr.operands[2]);
                let base = self
                    .memory
                    .module_base(module)
                    .ok_or(RuntimeError::InvalidCallback { value: u64::from(module.0) })?;
                write_dst(frame, &instr.operands[0], base + offset)?;
                Ok(Step::Next)
            }
            Op::Load => {
                let address = read(frame, &instr.operands[1]);
                let width = operand_width(env.types, &instr.operands[0]);
                let value = self.memory.load(address, width)?;
                write_dst(frame, &instr.operands[0], value)?;
                Ok(Step::Next)
            }
            Op::Store => {
                let value = read(frame, &instr.operands[0]);
                let address = read(frame, &instr.operands[1]);
                let width = operand_width(env.types, &instr.operands[0]);
                self.memory.store(address, value, width)?;
                Ok(Step::Next)
            }

            Op::Resolve => {
                let value = read(frame, &instr.operands[1]);
                write_dst(frame, &instr.operands[0], value)?;
                Ok(Step::Next)
            }
            Op::Cvt => {
                let value = read(frame, &instr.operands[1]);
                let from = class_of(env.types, &instr.operands[1]);
                let to = class_of(env.types, &instr.operands[0]);
                let converted = numeric_convert(value, from, to);
                let width = operand_width(env.types, &instr.operands[0]);
                write_dst(frame, &instr.operands[0], mask(converted, width))?;
                Ok(Step::Next)
            }

            Op::Jump => {
                jump_to(frame, instr.labels[0])?;
                Ok(Step::Stay)
            }
            Op::Branch => {
                let cond = read(frame, &instr.operands[0]);
                let target = if cond != 0 {
                    instr.labels[0]
                } else {
                    instr.labels[1]
                };
                jump_to(frame, target)?;
                Ok(Step::Stay)
            }
            Op::Param => {
                params.push(read(frame, &instr.operands[0]));
                Ok(Step::Next)
            }
            Op::Call => self.dispatch_call(env, frames, params, &instr, depth),
            Op::Ret => {
                let value = match instr.operands[0] {
                    Operand::None => None,
                    ref op => Some(read(frames.last_mut().expect("frame"), op)),
                };
                let finished = frames.pop().expect("frame");
                self.registers.set(VmReg::Sp, finished.sp_entry);
                if let Some(value) = value {
                    self.registers.set(VmReg::V0, value);
                    self.registers.set(VmReg::F0, value);
                    if let (Some(dst), Some(caller)) = (finished.dst, frames.last_mut()) {
                        caller.regs[dst.0 as usize] = value;
                    }
                }
                if frames.is_empty() {
                    Ok(Step::Terminate)
                } else {
                    Ok(Step::Stay)
                }
            }

            Op::TryBegin => {
                let catch_reg = instr.operands[0]
                    .reg()
                    .ok_or(RuntimeError::InvalidInstruction { function: frame.func, ip: frame.ip })?;
                let label = instr.labels[0]
                    .ok_or(RuntimeError::InvalidInstruction { function: frame.func, ip: frame.ip })?;
                let target_ip = *frame
                    .labels
                    .get(label.0 as usize)
                    .filter(|&&at| at != usize::MAX)
                    .ok_or(RuntimeError::InvalidInstruction { function: frame.func, ip: frame.ip })?;
                Ok(Step::ArmHandler(Handler {
                    frame_depth: depth,
                    target_ip,
                    catch_reg,
                    sp: self.registers.get(VmReg::Sp),
                }))
            }
            Op::TryEnd => Ok(Step::DisarmHandler),

            // Logic / bitwise
            Op::Not => {
                let a = read(frame, &instr.operands[1]);
                write_dst(frame, &instr.operands[0], u64::from(a == 0))?;
                Ok(Step::Next)
            }
            Op::Inv => {
                let a = read(frame, &instr.operands[1]);
                let width = operand_width(env.types, &instr.operands[0]);
                write_dst(frame, &instr.operands[0], mask(!a, width))?;
                Ok(Step::Next)
            }
            Op::Shl | Op::Shr | Op::Land | Op::Band | Op::Lor | Op::Bor | Op::Xor => {
                let a = read(frame, &instr.operands[1]);
                let b = read(frame, &instr.operands[2]);
                let signed = is_signed(env.types, &instr.operands[1]);
                let value = match instr.op {
                    Op::Shl => a.wrapping_shl(b as u32),
                    Op::Shr if signed => ((a as i64).wrapping_shr(b as u32)) as u64,
                    Op::Shr => a.wrapping_shr(b as u32),
                    Op::Land => u64::from(a != 0 && b != 0),
                    Op::Lor => u64::from(a != 0 || b != 0),
                    Op::Band => a & b,
                    Op::Bor => a | b,
                    _ => a ^ b,
                };
                let width = operand_width(env.types, &instr.operands[0]);
                write_dst(frame, &instr.operands[0], mask(value, width))?;
                Ok(Step::Next)
            }

            // Typed arithmetic families
            _ => {
                let value = arith(env.types, frame, &instr)?;
                write_dst(frame, &instr.operands[0], value)?;
                Ok(Step::Next)
            }
        }
    }

    fn dispatch_call(
        &mut self,
        env: &mut VmEnv<'_>,
        frames: &mut Vec<Frame>,
        params: &mut Vec<u64>,
        instr: &Instruction,
        depth: usize,
    ) -> Result<Step, RuntimeError> {
        let frame = frames.last_mut().expect("active frame");
        let callee = match instr.operands[0] {
            Operand::Func(id, _) => id,
            Operand::Reg(reg, _) => {
                // Runtime closure reference: the register holds the
                // function id.
                let raw = frame.regs[reg.0 as usize];
                let id = FunctionId(raw as u32);
                if env.funcs.get(id).is_none() {
                    return Err(RuntimeError::InvalidCallback { value: raw });
                }
                id
            }
            _ => {
                return Err(RuntimeError::InvalidInstruction {
                    function: frame.func,
                    ip: frame.ip,
                })
            }
        };
        let record = env
            .funcs
            .get(callee)
            .ok_or(RuntimeError::InvalidFunction { id: callee })?;

        let dst = instr.operands[2].reg();
        let args: Vec<u64> = params.drain(..).collect();

        if let Some(handle) = record.host {
            let ret = self.call_host(env, callee, handle, &args)?;
            let frame = frames.last_mut().expect("active frame");
            self.registers.set(VmReg::V0, ret);
            self.registers.set(VmReg::F0, ret);
            if let Some(dst) = dst {
                frame.regs[dst.0 as usize] = ret;
            }
            frame.ip += 1;
            return Ok(Step::Stay);
        }

        // Bytecode call: ra <- return site, push the callee frame.
        let _ = depth;
        self.registers.set(VmReg::Ra, frame.ip as u64 + 1);
        frame.ip += 1;
        let callee_frame = self.build_frame(env, callee, &args, dst)?;
        frames.push(callee_frame);
        Ok(Step::Stay)
    }

    /// Bridge one host call: unwrap declared arguments, invoke the
    /// entry point, return the primitive return bits.
    fn call_host(
        &mut self,
        env: &mut VmEnv<'_>,
        callee: FunctionId,
        handle: tern_types::HostFnHandle,
        raw_args: &[u64],
    ) -> Result<u64, RuntimeError> {
        let record = env
            .funcs
            .get(callee)
            .ok_or(RuntimeError::InvalidFunction { id: callee })?;
        let sig = record
            .signature
            .and_then(|s| env.types.get(s))
            .and_then(|t| t.signature())
            .ok_or(RuntimeError::InvalidFunction { id: callee })?;

        let mut unwrapped = Vec::with_capacity(sig.args.len());
        let mut ret_ptr = 0u64;
        for (idx, arg) in sig.args.iter().enumerate() {
            let raw = raw_args.get(idx).copied().unwrap_or(0);
            match arg.kind {
                ArgKind::FuncPtr | ArgKind::ContextPtr => {}
                ArgKind::RetPtr => ret_ptr = raw,
                ArgKind::ThisPtr => unwrapped.push(HostValue::Ptr(raw)),
                ArgKind::Value => {
                    let prim = env
                        .types
                        .effective_type(arg.ty)
                        .and_then(|t| t.primitive_kind());
                    match prim {
                        Some(prim) => unwrapped.push(HostValue::from_bits(raw, prim)),
                        None => {
                            return Err(RuntimeError::HostSignatureMismatch {
                                function: callee,
                                arg: idx,
                            })
                        }
                    }
                }
                ArgKind::Pointer => unwrapped.push(HostValue::Ptr(raw)),
            }
        }

        let entry = env
            .host
            .get_mut(handle)
            .ok_or(RuntimeError::InvalidFunction { id: callee })?;
        let mut call = HostCall::new(&unwrapped, &mut self.memory, env.types, ret_ptr);
        entry(&mut call)?;
        Ok(call.return_bits())
    }
}

/// Dispatch-step outcome.
enum Step {
    /// Advance `ip` past the instruction.
    Next,
    /// `ip` already updated (jumps, calls, returns).
    Stay,
    Terminate,
    ArmHandler(Handler),
    DisarmHandler,
}

#[inline]
fn read(frame: &Frame, operand: &Operand) -> u64 {
    match operand {
        Operand::None => 0,
        Operand::Reg(reg, _) => frame.regs[reg.0 as usize],
        Operand::Stack(alloc, _) => frame
            .allocs
            .get(alloc.0 as usize)
            .and_then(|a| *a)
            .map(|(addr, _)| addr)
            .unwrap_or(0),
        Operand::Imm(imm, _) => match imm {
            Imm::Int(v) => *v as u64,
            Imm::UInt(v) => *v,
            Imm::Float(v) => v.to_bits(),
        },
        Operand::Func(id, _) => u64::from(id.0),
    }
}

#[inline]
fn write_dst(frame: &mut Frame, operand: &Operand, value: u64) -> Result<(), RuntimeError> {
    match operand {
        Operand::Reg(reg, _) => {
            frame.regs[reg.0 as usize] = value;
            Ok(())
        }
        _ => Err(RuntimeError::InvalidInstruction {
            function: frame.func,
            ip: frame.ip,
        }),
    }
}

fn jump_to(frame: &mut Frame, label: Option<LabelId>) -> Result<(), RuntimeError> {
    let target = label
        .and_then(|l| frame.labels.get(l.0 as usize).copied())
        .filter(|&at| at != usize::MAX)
        .ok_or(RuntimeError::InvalidInstruction {
            function: frame.func,
            ip: frame.ip,
        })?;
    frame.ip = target;
    Ok(())
}

/// Numeric class used for typed arithmetic.
#[derive(Copy, Clone, PartialEq, Eq)]
enum NumClass {
    Signed,
    Unsigned,
    Float,
    Double,
}

fn class_of(types: &TypeRegistry, operand: &Operand) -> NumClass {
    let Some(ty) = operand.ty() else { return NumClass::Unsigned };
    let Some(t) = types.effective_type(ty) else { return NumClass::Unsigned };
    if t.meta.is_floating_point() {
        if t.meta.size == 4 {
            NumClass::Float
        } else {
            NumClass::Double
        }
    } else if t.meta.is_unsigned() {
        NumClass::Unsigned
    } else {
        NumClass::Signed
    }
}

fn is_signed(types: &TypeRegistry, operand: &Operand) -> bool {
    class_of(types, operand) == NumClass::Signed
}

fn operand_width(types: &TypeRegistry, operand: &Operand) -> u64 {
    let Some(ty) = operand.ty() else { return 8 };
    let size = types.size_of(ty);
    match size {
        1 | 2 | 4 | 8 => u64::from(size),
        0 => 8,
        _ => 8,
    }
}

fn mask(value: u64, width: u64) -> u64 {
    match width {
        1 => value & 0xff,
        2 => value & 0xffff,
        4 => value & 0xffff_ffff,
        _ => value,
    }
}

/// Sign-extend a masked value of `width` bytes.
fn sext(value: u64, width: u64) -> i64 {
    match width {
        1 => value as u8 as i8 as i64,
        2 => value as u16 as i16 as i64,
        4 => value as u32 as i32 as i64,
        _ => value as i64,
    }
}

fn numeric_convert(value: u64, from: NumClass, to: NumClass) -> u64 {
    let float = |v: f64, to: NumClass| match to {
        NumClass::Float => u64::from((v as f32).to_bits()),
        NumClass::Double => v.to_bits(),
        NumClass::Signed => (v as i64) as u64,
        NumClass::Unsigned => v as u64,
    };
    match from {
        NumClass::Float => float(f64::from(f32::from_bits(value as u32)), to),
        NumClass::Double => float(f64::from_bits(value), to),
        NumClass::Signed => match to {
            NumClass::Float => u64::from(((value as i64) as f32).to_bits()),
            NumClass::Double => ((value as i64) as f64).to_bits(),
            _ => value,
        },
        NumClass::Unsigned => match to {
            NumClass::Float => u64::from((value as f32).to_bits()),
            NumClass::Double => (value as f64).to_bits(),
            _ => value,
        },
    }
}

/// Typed arithmetic and comparison families.
fn arith(
    types: &TypeRegistry,
    frame: &Frame,
    instr: &Instruction,
) -> Result<u64, RuntimeError> {
    use Op::*;
    let a_raw = read(frame, &instr.operands[1]);
    let b_raw = read(frame, &instr.operands[2]);
    let width = operand_width(types, &instr.operands[1]).max(operand_width(types, &instr.operands[0]));

    let out = match instr.op {
        // Signed
        IAdd | ISub | IMul | IDiv | IMod | IInc | IDec | INeg | ILt | ILte | IGt | IGte | IEq
        | INeq => {
            let a = sext(mask(a_raw, width), width);
            let b = sext(mask(b_raw, width), width);
            match instr.op {
                IAdd => a.wrapping_add(b) as u64,
                ISub => a.wrapping_sub(b) as u64,
                IMul => a.wrapping_mul(b) as u64,
                IDiv => a.checked_div(b).unwrap_or(0) as u64,
                IMod => a.checked_rem(b).unwrap_or(0) as u64,
                IInc => a.wrapping_add(1) as u64,
                IDec => a.wrapping_sub(1) as u64,
                INeg => a.wrapping_neg() as u64,
                ILt => u64::from(a < b),
                ILte => u64::from(a <= b),
                IGt => u64::from(a > b),
                IGte => u64::from(a >= b),
                IEq => u64::from(a == b),
                _ => u64::from(a != b),
            }
        }
        // Unsigned
        UAdd | USub | UMul | UDiv | UMod | UInc | UDec | UNeg | ULt | ULte | UGt | UGte | UEq
        | UNeq => {
            let a = mask(a_raw, width);
            let b = mask(b_raw, width);
            match instr.op {
                UAdd => a.wrapping_add(b),
                USub => a.wrapping_sub(b),
                UMul => a.wrapping_mul(b),
                UDiv => a.checked_div(b).unwrap_or(0),
                UMod => a.checked_rem(b).unwrap_or(0),
                UInc => a.wrapping_add(1),
                UDec => a.wrapping_sub(1),
                UNeg => a.wrapping_neg(),
                ULt => u64::from(a < b),
                ULte => u64::from(a <= b),
                UGt => u64::from(a > b),
                UGte => u64::from(a >= b),
                UEq => u64::from(a == b),
                _ => u64::from(a != b),
            }
        }
        // f32
        FAdd | FSub | FMul | FDiv | FMod | FInc | FDec | FNeg | FLt | FLte | FGt | FGte | FEq
        | FNeq => {
            let a = f32::from_bits(a_raw as u32);
            let b = f32::from_bits(b_raw as u32);
            let bits = |v: f32| u64::from(v.to_bits());
            match instr.op {
                FAdd => bits(a + b),
                FSub => bits(a - b),
                FMul => bits(a * b),
                FDiv => bits(a / b),
                FMod => bits(a % b),
                FInc => bits(a + 1.0),
                FDec => bits(a - 1.0),
                FNeg => bits(-a),
                FLt => u64::from(a < b),
                FLte => u64::from(a <= b),
                FGt => u64::from(a > b),
                FGte => u64::from(a >= b),
                FEq => u64::from(a == b),
                _ => u64::from(a != b),
            }
        }
        // f64
        DAdd | DSub | DMul | DDiv | DMod | DInc | DDec | DNeg | DLt | DLte | DGt | DGte | DEq
        | DNeq => {
            let a = f64::from_bits(a_raw);
            let b = f64::from_bits(b_raw);
            match instr.op {
                DAdd => (a + b).to_bits(),
                DSub => (a - b).to_bits(),
                DMul => (a * b).to_bits(),
                DDiv => (a / b).to_bits(),
                DMod => (a % b).to_bits(),
                DInc => (a + 1.0).to_bits(),
                DDec => (a - 1.0).to_bits(),
                DNeg => (-a).to_bits(),
                DLt => u64::from(a < b),
                DLte => u64::from(a <= b),
                DGt => u64::from(a > b),
                DGte => u64::from(a >= b),
                DEq => u64::from(a == b),
                _ => u64::from(a != b),
            }
        }
        _ => {
            return Err(RuntimeError::InvalidInstruction {
                function: frame.func,
                ip: frame.ip,
            })
        }
    };

    let is_compare = matches!(
        instr.op,
        ILt | ILte | IGt | IGte | IEq | INeq | ULt | ULte | UGt | UGte | UEq | UNeq | FLt | FLte
            | FGt | FGte | FEq | FNeq | DLt | DLte | DGt | DGte | DEq | DNeq
    );
    if is_compare {
        Ok(out)
    } else {
        Ok(mask(out, operand_width(types, &instr.operands[0])))
    }
}

/// A thrown script value, raised from the `__throw` intrinsic.
pub fn raise(value: u64, ty: TypeId) -> RuntimeError {
    RuntimeError::ScriptException { value, ty }
}
