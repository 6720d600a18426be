//! Three-address intermediate representation.
//!
//! A function's body is a linear vector of typed instructions over
//! unbounded virtual registers, with explicit stack allocations, labels,
//! branches, and calls. Binary ops require matching operand types; the
//! type selects the concrete op-code variant (`iadd` vs `uadd` vs `fadd`
//! vs `dadd`). Every instruction carries the source span it was emitted
//! for, which is how the source map attributes runtime locations.

use crate::{AllocId, FunctionId, LabelId, RegId, Span, TypeId};
use bitflags::bitflags;
use std::fmt;

/// IR op-codes.
///
/// The `i`/`u`/`f`/`d` prefixes are the signed-integer, unsigned-integer,
/// float, and double variants of the arithmetic and comparison family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Op {
    // Memory
    Noop,
    Term,
    Label,
    StackAllocate,
    StackFree,
    ModuleData,
    Load,
    Store,

    // Movement
    Reserve,
    Resolve,
    Cvt,

    // Control
    Jump,
    Branch,
    Call,
    Param,
    Ret,
    TryBegin,
    TryEnd,

    // Signed integer arithmetic / comparison
    IAdd,
    ISub,
    IMul,
    IDiv,
    IMod,
    IInc,
    IDec,
    INeg,
    ILt,
    ILte,
    IGt,
    IGte,
    IEq,
    INeq,

    // Unsigned integer arithmetic / comparison
    UAdd,
    USub,
    UMul,
    UDiv,
    UMod,
    UInc,
    UDec,
    UNeg,
    ULt,
    ULte,
    UGt,
    UGte,
    UEq,
    UNeq,

    // 32-bit float arithmetic / comparison
    FAdd,
    FSub,
    FMul,
    FDiv,
    FMod,
    FInc,
    FDec,
    FNeg,
    FLt,
    FLte,
    FGt,
    FGte,
    FEq,
    FNeq,

    // 64-bit float arithmetic / comparison
    DAdd,
    DSub,
    DMul,
    DDiv,
    DMod,
    DInc,
    DDec,
    DNeg,
    DLt,
    DLte,
    DGt,
    DGte,
    DEq,
    DNeq,

    // Logic / bitwise
    Not,
    Inv,
    Shl,
    Shr,
    Land,
    Band,
    Lor,
    Bor,
    Xor,
}

impl Op {
    /// Stable numeric encoding for serialization.
    pub const fn encode(self) -> u8 {
        self as u8
    }

    /// Decode a serialized op-code.
    pub fn decode(raw: u8) -> Option<Op> {
        if raw <= Op::Xor as u8 {
            // Transmute-free decode: the enum is dense from 0.
            ALL_OPS.get(raw as usize).copied()
        } else {
            None
        }
    }

    /// Spec-level mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Op::Noop => "noop",
            Op::Term => "term",
            Op::Label => "label",
            Op::StackAllocate => "stack_allocate",
            Op::StackFree => "stack_free",
            Op::ModuleData => "module_data",
            Op::Load => "load",
            Op::Store => "store",
            Op::Reserve => "reserve",
            Op::Resolve => "resolve",
            Op::Cvt => "cvt",
            Op::Jump => "jump",
            Op::Branch => "branch",
            Op::Call => "call",
            Op::Param => "param",
            Op::Ret => "ret",
            Op::TryBegin => "try_begin",
            Op::TryEnd => "try_end",
            Op::IAdd => "iadd",
            Op::ISub => "isub",
            Op::IMul => "imul",
            Op::IDiv => "idiv",
            Op::IMod => "imod",
            Op::IInc => "iinc",
            Op::IDec => "idec",
            Op::INeg => "ineg",
            Op::ILt => "ilt",
            Op::ILte => "ilte",
            Op::IGt => "igt",
            Op::IGte => "igte",
            Op::IEq => "ieq",
            Op::INeq => "ineq",
            Op::UAdd => "uadd",
            Op::USub => "usub",
            Op::UMul => "umul",
            Op::UDiv => "udiv",
            Op::UMod => "umod",
            Op::UInc => "uinc",
            Op::UDec => "udec",
            Op::UNeg => "uneg",
            Op::ULt => "ult",
            Op::ULte => "ulte",
            Op::UGt => "ugt",
            Op::UGte => "ugte",
            Op::UEq => "ueq",
            Op::UNeq => "uneq",
            Op::FAdd => "fadd",
            Op::FSub => "fsub",
            Op::FMul => "fmul",
            Op::FDiv => "fdiv",
            Op::FMod => "fmod",
            Op::FInc => "finc",
            Op::FDec => "fdec",
            Op::FNeg => "fneg",
            Op::FLt => "flt",
            Op::FLte => "flte",
            Op::FGt => "fgt",
            Op::FGte => "fgte",
            Op::FEq => "feq",
            Op::FNeq => "fneq",
            Op::DAdd => "dadd",
            Op::DSub => "dsub",
            Op::DMul => "dmul",
            Op::DDiv => "ddiv",
            Op::DMod => "dmod",
            Op::DInc => "dinc",
            Op::DDec => "ddec",
            Op::DNeg => "dneg",
            Op::DLt => "dlt",
            Op::DLte => "dlte",
            Op::DGt => "dgt",
            Op::DGte => "dgte",
            Op::DEq => "deq",
            Op::DNeq => "dneq",
            Op::Not => "not",
            Op::Inv => "inv",
            Op::Shl => "shl",
            Op::Shr => "shr",
            Op::Land => "land",
            Op::Band => "band",
            Op::Lor => "lor",
            Op::Bor => "bor",
            Op::Xor => "xor",
        }
    }
}

const ALL_OPS: [Op; 83] = [
    Op::Noop,
    Op::Term,
    Op::Label,
    Op::StackAllocate,
    Op::StackFree,
    Op::ModuleData,
    Op::Load,
    Op::Store,
    Op::Reserve,
    Op::Resolve,
    Op::Cvt,
    Op::Jump,
    Op::Branch,
    Op::Call,
    Op::Param,
    Op::Ret,
    Op::TryBegin,
    Op::TryEnd,
    Op::IAdd,
    Op::ISub,
    Op::IMul,
    Op::IDiv,
    Op::IMod,
    Op::IInc,
    Op::IDec,
    Op::INeg,
    Op::ILt,
    Op::ILte,
    Op::IGt,
    Op::IGte,
    Op::IEq,
    Op::INeq,
    Op::UAdd,
    Op::USub,
    Op::UMul,
    Op::UDiv,
    Op::UMod,
    Op::UInc,
    Op::UDec,
    Op::UNeg,
    Op::ULt,
    Op::ULte,
    Op::UGt,
    Op::UGte,
    Op::UEq,
    Op::UNeq,
    Op::FAdd,
    Op::FSub,
    Op::FMul,
    Op::FDiv,
    Op::FMod,
    Op::FInc,
    Op::FDec,
    Op::FNeg,
    Op::FLt,
    Op::FLte,
    Op::FGt,
    Op::FGte,
    Op::FEq,
    Op::FNeq,
    Op::DAdd,
    Op::DSub,
    Op::DMul,
    Op::DDiv,
    Op::DMod,
    Op::DInc,
    Op::DDec,
    Op::DNeg,
    Op::DLt,
    Op::DLte,
    Op::DGt,
    Op::DGte,
    Op::DEq,
    Op::DNeq,
    Op::Not,
    Op::Inv,
    Op::Shl,
    Op::Shr,
    Op::Land,
    Op::Band,
    Op::Lor,
    Op::Bor,
    Op::Xor,
];

/// Immediate payload, typed by the operand's [`TypeId`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Imm {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Imm {
    /// Raw 64-bit encoding for serialization.
    pub fn to_bits(self) -> u64 {
        match self {
            Imm::Int(v) => v as u64,
            Imm::UInt(v) => v,
            Imm::Float(v) => v.to_bits(),
        }
    }
}

bitflags! {
    /// Serialized operand classification bits.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct OperandFlags: u8 {
        const REG = 1 << 0;
        const STACK = 1 << 1;
        const IMM = 1 << 2;
        const FUNC = 1 << 3;
        /// Immediate payload is signed.
        const IMM_SIGNED = 1 << 4;
        /// Immediate payload is floating point.
        const IMM_FLOAT = 1 << 5;
    }
}

/// One instruction operand: a payload plus the value's type.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Operand {
    #[default]
    None,
    Reg(RegId, TypeId),
    Stack(AllocId, TypeId),
    Imm(Imm, TypeId),
    Func(FunctionId, TypeId),
}

impl Operand {
    pub fn ty(&self) -> Option<TypeId> {
        match self {
            Operand::None => None,
            Operand::Reg(_, t)
            | Operand::Stack(_, t)
            | Operand::Imm(_, t)
            | Operand::Func(_, t) => Some(*t),
        }
    }

    pub fn reg(&self) -> Option<RegId> {
        match self {
            Operand::Reg(r, _) => Some(*r),
            _ => None,
        }
    }

    pub fn imm(&self) -> Option<Imm> {
        match self {
            Operand::Imm(v, _) => Some(*v),
            _ => None,
        }
    }

    /// Serialized form: (flags, type id, 64-bit payload).
    pub fn encode(&self) -> (OperandFlags, TypeId, u64) {
        match self {
            Operand::None => (OperandFlags::empty(), TypeId::POISON, 0),
            Operand::Reg(r, t) => (OperandFlags::REG, *t, u64::from(r.0)),
            Operand::Stack(a, t) => (OperandFlags::STACK, *t, u64::from(a.0)),
            Operand::Imm(Imm::Int(v), t) => {
                (OperandFlags::IMM | OperandFlags::IMM_SIGNED, *t, *v as u64)
            }
            Operand::Imm(Imm::UInt(v), t) => (OperandFlags::IMM, *t, *v),
            Operand::Imm(Imm::Float(v), t) => {
                (OperandFlags::IMM | OperandFlags::IMM_FLOAT, *t, v.to_bits())
            }
            Operand::Func(f, t) => (OperandFlags::FUNC, *t, u64::from(f.0)),
        }
    }

    /// Rebuild an operand from its serialized form.
    pub fn decode(flags: OperandFlags, ty: TypeId, raw: u64) -> Operand {
        if flags.contains(OperandFlags::REG) {
            Operand::Reg(RegId(raw as u32), ty)
        } else if flags.contains(OperandFlags::STACK) {
            Operand::Stack(AllocId(raw as u32), ty)
        } else if flags.contains(OperandFlags::FUNC) {
            Operand::Func(FunctionId(raw as u32), ty)
        } else if flags.contains(OperandFlags::IMM) {
            let imm = if flags.contains(OperandFlags::IMM_FLOAT) {
                Imm::Float(f64::from_bits(raw))
            } else if flags.contains(OperandFlags::IMM_SIGNED) {
                Imm::Int(raw as i64)
            } else {
                Imm::UInt(raw)
            };
            Operand::Imm(imm, ty)
        } else {
            Operand::None
        }
    }
}

/// One IR instruction: op-code, up to three operands, up to two label
/// slots, and the source span it was emitted for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub operands: [Operand; 3],
    pub labels: [Option<LabelId>; 2],
    pub span: Span,
}

impl Instruction {
    pub fn new(op: Op, span: Span) -> Self {
        Instruction {
            op,
            operands: [Operand::None; 3],
            labels: [None; 2],
            span,
        }
    }

    #[must_use]
    pub fn with_operands(mut self, operands: &[Operand]) -> Self {
        debug_assert!(operands.len() <= 3);
        for (slot, operand) in self.operands.iter_mut().zip(operands) {
            *slot = *operand;
        }
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: &[LabelId]) -> Self {
        debug_assert!(labels.len() <= 2);
        for (slot, label) in self.labels.iter_mut().zip(labels) {
            *slot = Some(*label);
        }
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op.mnemonic())?;
        let mut first = true;
        for operand in &self.operands {
            if matches!(operand, Operand::None) {
                break;
            }
            let sep = if first { " " } else { ", " };
            first = false;
            match operand {
                Operand::None => unreachable!(),
                Operand::Reg(r, _) => write!(f, "{sep}{r:?}")?,
                Operand::Stack(a, _) => write!(f, "{sep}{a:?}")?,
                Operand::Imm(Imm::Int(v), _) => write!(f, "{sep}{v}")?,
                Operand::Imm(Imm::UInt(v), _) => write!(f, "{sep}{v}")?,
                Operand::Imm(Imm::Float(v), _) => write!(f, "{sep}{v}")?,
                Operand::Func(id, _) => write!(f, "{sep}{id:?}")?,
            }
        }
        for label in self.labels.iter().flatten() {
            let sep = if first { " " } else { ", " };
            first = false;
            write!(f, "{sep}{label:?}")?;
        }
        Ok(())
    }
}

/// Per-function code vector with id allocation.
///
/// Owns the instruction stream plus the next label / register / stack
/// allocation counters. Appending another holder rewrites its ids so the
/// two streams cannot collide (used for inlining and for splicing the
/// module initializer together).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeHolder {
    code: Vec<Instruction>,
    next_label: u32,
    next_reg: u32,
    next_alloc: u32,
}

impl CodeHolder {
    pub fn new() -> Self {
        CodeHolder::default()
    }

    /// Rebuild from serialized parts.
    pub fn from_parts(code: Vec<Instruction>, next_label: u32, next_reg: u32, next_alloc: u32) -> Self {
        CodeHolder {
            code,
            next_label,
            next_reg,
            next_alloc,
        }
    }

    #[inline]
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn next_label_id(&self) -> u32 {
        self.next_label
    }

    pub fn next_reg_id(&self) -> u32 {
        self.next_reg
    }

    pub fn next_alloc_id(&self) -> u32 {
        self.next_alloc
    }

    /// Allocate a fresh virtual register.
    pub fn alloc_reg(&mut self) -> RegId {
        let id = RegId(self.next_reg);
        self.next_reg += 1;
        id
    }

    /// Allocate a fresh label id (not yet placed).
    pub fn alloc_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    /// Allocate a fresh stack allocation id.
    pub fn alloc_stack_id(&mut self) -> AllocId {
        let id = AllocId(self.next_alloc);
        self.next_alloc += 1;
        id
    }

    /// Append an instruction, returning its index.
    pub fn emit(&mut self, instr: Instruction) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Place a label at the current position.
    pub fn place_label(&mut self, label: LabelId, span: Span) -> usize {
        self.emit(Instruction::new(Op::Label, span).with_labels(&[label]))
    }

    /// Insert an instruction at an index (labels are symbolic, so existing
    /// references stay valid).
    pub fn insert(&mut self, idx: usize, instr: Instruction) {
        self.code.insert(idx, instr);
    }

    /// Remove and return the instruction at an index.
    pub fn remove(&mut self, idx: usize) -> Instruction {
        self.code.remove(idx)
    }

    /// Replace the instruction at an index.
    pub fn replace(&mut self, idx: usize, instr: Instruction) {
        self.code[idx] = instr;
    }

    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.code.get(idx)
    }

    /// Index of the `label` instruction defining `label`, if placed.
    pub fn label_position(&self, label: LabelId) -> Option<usize> {
        self.code
            .iter()
            .position(|i| i.op == Op::Label && i.labels[0] == Some(label))
    }

    /// Check that every referenced label is defined exactly once.
    pub fn validate_labels(&self) -> bool {
        let mut defined = vec![0u32; self.next_label as usize];
        for instr in &self.code {
            if instr.op == Op::Label {
                match instr.labels[0] {
                    Some(l) if (l.0 as usize) < defined.len() => defined[l.0 as usize] += 1,
                    _ => return false,
                }
            }
        }
        for instr in &self.code {
            if instr.op == Op::Label {
                continue;
            }
            for label in instr.labels.iter().flatten() {
                if defined.get(label.0 as usize) != Some(&1) {
                    return false;
                }
            }
        }
        true
    }

    /// Append another holder's code, rewriting its label, register, and
    /// stack ids past this holder's counters.
    pub fn append(&mut self, other: &CodeHolder) {
        let label_base = self.next_label;
        let reg_base = self.next_reg;
        let alloc_base = self.next_alloc;
        for instr in &other.code {
            let mut rewritten = *instr;
            for operand in &mut rewritten.operands {
                match operand {
                    Operand::Reg(r, _) => r.0 += reg_base,
                    Operand::Stack(a, _) => a.0 += alloc_base,
                    _ => {}
                }
            }
            for label in rewritten.labels.iter_mut().flatten() {
                label.0 += label_base;
            }
            self.code.push(rewritten);
        }
        self.next_label += other.next_label;
        self.next_reg += other.next_reg;
        self.next_alloc += other.next_alloc;
    }

    /// Spans of every instruction in order (the function's source map).
    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.code.iter().map(|i| i.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_encode_decode_round_trip() {
        for (idx, op) in ALL_OPS.iter().enumerate() {
            assert_eq!(op.encode() as usize, idx);
            assert_eq!(Op::decode(op.encode()), Some(*op));
        }
        assert_eq!(Op::decode(200), None);
    }

    #[test]
    fn test_operand_encode_decode() {
        let ty = TypeId::of("i32");
        let cases = [
            Operand::None,
            Operand::Reg(RegId(7), ty),
            Operand::Stack(AllocId(2), ty),
            Operand::Imm(Imm::Int(-5), ty),
            Operand::Imm(Imm::UInt(u64::MAX), ty),
            Operand::Imm(Imm::Float(1.5), ty),
            Operand::Func(FunctionId(3), ty),
        ];
        for operand in cases {
            let (flags, t, raw) = operand.encode();
            let back = Operand::decode(flags, t, raw);
            match operand {
                // `None` loses its (unused) type id.
                Operand::None => assert_eq!(back, Operand::None),
                _ => assert_eq!(back, operand),
            }
        }
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let mut code = CodeHolder::new();
        assert_eq!(code.alloc_reg(), RegId(0));
        assert_eq!(code.alloc_reg(), RegId(1));
        assert_eq!(code.alloc_label(), LabelId(0));
        assert_eq!(code.alloc_stack_id(), AllocId(0));
        assert_eq!(code.alloc_stack_id(), AllocId(1));
    }

    #[test]
    fn test_validate_labels() {
        let ty = TypeId::of("i32");
        let mut code = CodeHolder::new();
        let l = code.alloc_label();
        code.emit(
            Instruction::new(Op::Jump, Span::DUMMY).with_labels(&[l]),
        );
        // Referenced but not yet defined.
        assert!(!code.validate_labels());
        code.place_label(l, Span::DUMMY);
        assert!(code.validate_labels());
        // Defined twice.
        code.place_label(l, Span::DUMMY);
        assert!(!code.validate_labels());
        let _ = ty;
    }

    #[test]
    fn test_append_rewrites_ids() {
        let ty = TypeId::of("i32");
        let mut a = CodeHolder::new();
        let ra = a.alloc_reg();
        let la = a.alloc_label();
        a.place_label(la, Span::DUMMY);
        a.emit(
            Instruction::new(Op::IAdd, Span::DUMMY).with_operands(&[
                Operand::Reg(ra, ty),
                Operand::Imm(Imm::Int(1), ty),
                Operand::Imm(Imm::Int(2), ty),
            ]),
        );

        let mut b = CodeHolder::new();
        let rb = b.alloc_reg();
        let lb = b.alloc_label();
        b.place_label(lb, Span::DUMMY);
        b.emit(
            Instruction::new(Op::Jump, Span::DUMMY).with_labels(&[lb]),
        );
        b.emit(
            Instruction::new(Op::INeg, Span::DUMMY)
                .with_operands(&[Operand::Reg(rb, ty), Operand::Reg(rb, ty)]),
        );

        a.append(&b);
        assert!(a.validate_labels());
        // b's register 0 became register 1 in a.
        let last = a.code()[a.len() - 1];
        assert_eq!(last.operands[0].reg(), Some(RegId(1)));
        // b's label 0 became label 1 in a.
        let jump = a.code()[a.len() - 2];
        assert_eq!(jump.labels[0], Some(LabelId(1)));
        assert_eq!(a.next_reg_id(), 2);
        assert_eq!(a.next_label_id(), 2);
    }

    #[test]
    fn test_display() {
        let ty = TypeId::of("i32");
        let instr = Instruction::new(Op::IAdd, Span::DUMMY).with_operands(&[
            Operand::Reg(RegId(3), ty),
            Operand::Reg(RegId(1), ty),
            Operand::Imm(Imm::Int(7), ty),
        ]);
        assert_eq!(instr.to_string(), "iadd r3, r1, 7");
    }
}
