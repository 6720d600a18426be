//! Optimization pass framework.
//!
//! Passes transform per-function [`CodeHolder`]s in place. The framework
//! is deliberately minimal: a pass trait, a named group that runs passes
//! to a fixed point, and a switch to disable the whole pipeline.
//! Individual optimization passes plug in from outside the core.

use tern_ir::CodeHolder;

/// One IR-to-IR transformation over a function body.
pub trait IrPass {
    fn name(&self) -> &str;

    /// Run over one function's code; returns `true` when anything
    /// changed (the group re-runs until quiescent).
    fn run(&self, code: &mut CodeHolder) -> bool;
}

/// An ordered group of passes run to a fixed point.
#[derive(Default)]
pub struct PassGroup {
    passes: Vec<Box<dyn IrPass>>,
    /// Safety bound on fixed-point iteration.
    max_rounds: usize,
}

impl PassGroup {
    pub fn new() -> Self {
        PassGroup {
            passes: Vec::new(),
            max_rounds: 8,
        }
    }

    pub fn add(&mut self, pass: Box<dyn IrPass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass over one function until nothing changes.
    pub fn run(&self, code: &mut CodeHolder) {
        for _ in 0..self.max_rounds {
            let mut changed = false;
            for pass in &self.passes {
                changed |= pass.run(code);
            }
            if !changed {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ir::{Instruction, Op, Span};

    /// A toy pass that strips `noop` instructions.
    struct StripNoops;

    impl IrPass for StripNoops {
        fn name(&self) -> &str {
            "strip-noops"
        }

        fn run(&self, code: &mut CodeHolder) -> bool {
            let before = code.len();
            let mut idx = 0;
            while idx < code.len() {
                if code.code()[idx].op == Op::Noop {
                    code.remove(idx);
                } else {
                    idx += 1;
                }
            }
            code.len() != before
        }
    }

    #[test]
    fn test_group_runs_to_fixed_point() {
        let mut code = CodeHolder::new();
        code.emit(Instruction::new(Op::Noop, Span::DUMMY));
        code.emit(Instruction::new(Op::Ret, Span::DUMMY));
        code.emit(Instruction::new(Op::Noop, Span::DUMMY));

        let mut group = PassGroup::new();
        group.add(Box::new(StripNoops));
        group.run(&mut code);

        assert_eq!(code.len(), 1);
        assert_eq!(code.code()[0].op, Op::Ret);
    }

    #[test]
    fn test_empty_group_is_noop() {
        let mut code = CodeHolder::new();
        code.emit(Instruction::new(Op::Ret, Span::DUMMY));
        PassGroup::new().run(&mut code);
        assert_eq!(code.len(), 1);
    }
}
