// Statement `k` of the list covers the bytecode from its start offset (the smallest offset of any
// node in it) up to the start of statement `k + 1`, so every branch target resolves to a position in
// the list. The list is structured recursively over half-open ranges of positions ("regions").

use super::FastBuildError;
use crate::arena::{Arena, InsnId};
use crate::model::iterate::{contains, start_offset};
use crate::model::{ExceptionHandler, FastCatch, InsnKind, SwitchArm, equality};
use core::ops::Range;
use tracing::trace;

/// Where `break` and `continue` lead from inside the innermost loop or switch.
#[derive(Clone, Copy, Debug, Default)]
struct Jumps {
    break_to: Option<usize>,
    continue_to: [Option<usize>; 2],
}

impl Jumps {
    fn in_loop(exit: usize, continue_to: [Option<usize>; 2]) -> Self {
        Self {
            break_to: Some(exit),
            continue_to,
        }
    }

    fn is_continue(&self, position: usize) -> bool {
        self.continue_to.contains(&Some(position))
    }
}

pub struct Builder<'a> {
    arena: &'a mut Arena,
    list: &'a [InsnId],
    starts: Vec<u32>,
    handlers: &'a [ExceptionHandler],
    handled: Vec<bool>,
    // A slot no local uses, for catch clauses that drop the exception.
    max_locals: u16,
}

impl<'a> Builder<'a> {
    pub fn new(
        arena: &'a mut Arena,
        list: &'a [InsnId],
        handlers: &'a [ExceptionHandler],
        max_locals: u16,
    ) -> Self {
        let starts = list.iter().map(|stmt| start_offset(arena, *stmt)).collect();
        Self {
            arena,
            list,
            starts,
            handlers,
            handled: vec![false; handlers.len()],
            max_locals,
        }
    }

    pub fn build(mut self) -> Result<Vec<InsnId>, FastBuildError> {
        self.region(0, self.list.len(), Jumps::default())
    }

    fn position_of(&self, offset: u32) -> usize {
        self.starts.partition_point(|start| *start < offset)
    }

    fn kind(&self, position: usize) -> &InsnKind {
        &self.arena[self.list[position]].kind
    }

    fn target(&self, position: usize) -> Option<usize> {
        self.kind(position)
            .branch_target()
            .map(|target| self.position_of(target))
    }

    fn region(
        &mut self,
        lo: usize,
        hi: usize,
        jumps: Jumps,
    ) -> Result<Vec<InsnId>, FastBuildError> {
        let mut out = Vec::new();
        let mut position = lo;
        while position < hi {
            position = self.statement(position, hi, jumps, &mut out)?;
        }
        Ok(out)
    }

    /// Structures the statement at `position` together with everything it governs. Returns the
    /// position to continue from.
    fn statement(
        &mut self,
        position: usize,
        hi: usize,
        jumps: Jumps,
        out: &mut Vec<InsnId>,
    ) -> Result<usize, FastBuildError> {
        // The body of a loop starting at its header must not find the loop again.
        let back_edge = if jumps.is_continue(position) {
            None
        } else {
            self.back_edge(position, hi)
        };
        if let Some(end_pc) = self.protected_block(position, hi)
            && back_edge.is_none_or(|back_edge| self.position_of(end_pc) > back_edge)
        {
            return self.try_catch(position, end_pc, hi, jumps, out);
        }
        if let Some(back_edge) = back_edge {
            return self.back_edge_loop(position, back_edge, out);
        }

        let kind = self.kind(position);
        if matches!(kind, InsnKind::Switch { .. }) {
            return self.switch(position, hi, jumps, out);
        }
        if kind.is_conditional_branch() {
            return self.conditional(position, hi, jumps, out);
        }
        if matches!(kind, InsnKind::Goto { .. }) {
            if let Some(test) = self.bottom_tested_loop(position, hi) {
                let condition = self.list[test];
                self.while_loop(position + 1..test, condition, test, test + 1, out)?;
                return Ok(test + 1);
            }
            self.jump(position, hi, jumps, out);
            return Ok(position + 1);
        }
        out.push(self.list[position]);
        Ok(position + 1)
    }

    /// The last statement of the region that jumps back to `header`.
    fn back_edge(&self, header: usize, hi: usize) -> Option<usize> {
        (header..hi)
            .rev()
            .find(|&source| self.target(source) == Some(header))
    }

    fn back_edge_loop(
        &mut self,
        header: usize,
        back_edge: usize,
        out: &mut Vec<InsnId>,
    ) -> Result<usize, FastBuildError> {
        let exit = back_edge + 1;
        let source = self.list[back_edge];
        if self.arena[source].kind.is_conditional_branch() {
            let jumps = Jumps::in_loop(exit, [Some(back_edge), Some(header)]);
            let body = self.region(header, back_edge, jumps)?;
            let node = self.arena.alloc_at(
                source,
                InsnKind::FastDoWhile {
                    condition: source,
                    body,
                },
            );
            out.push(node);
        } else if self.kind(header).is_conditional_branch() && self.target(header) == Some(exit) {
            let condition = self.list[header];
            self.arena[condition].kind.negate_condition();
            self.while_loop(header + 1..back_edge, condition, header, exit, out)?;
        } else {
            let jumps = Jumps::in_loop(exit, [Some(header), None]);
            let body = self.region(header, back_edge, jumps)?;
            let node = self
                .arena
                .alloc_at(self.list[header], InsnKind::FastInfiniteLoop { body });
            out.push(node);
        }
        trace!("Structured a loop at offset {}", self.starts[header]);
        Ok(exit)
    }

    /// `goto TEST; BODY: ...; TEST: if (c) goto BODY;`
    fn bottom_tested_loop(&self, position: usize, hi: usize) -> Option<usize> {
        let test = self.target(position)?;
        (test > position
            && test < hi
            && self.kind(test).is_conditional_branch()
            && self.target(test) == Some(position + 1))
            .then_some(test)
    }

    /// Emits `while (condition) body`, or a `for` loop when the previous statement initializes and
    /// the last statement of the body updates a local the condition tests.
    fn while_loop(
        &mut self,
        body: Range<usize>,
        condition: InsnId,
        continue_to: usize,
        exit: usize,
        out: &mut Vec<InsnId>,
    ) -> Result<(), FastBuildError> {
        let kind = match self.for_parts(&body, condition, out) {
            Some((init, update)) => {
                out.pop();
                let jumps = Jumps::in_loop(exit, [Some(continue_to), Some(update)]);
                InsnKind::FastFor {
                    init,
                    condition,
                    update: self.list[update],
                    body: self.region(body.start, update, jumps)?,
                }
            }
            None => {
                let jumps = Jumps::in_loop(exit, [Some(continue_to), None]);
                InsnKind::FastWhile {
                    condition,
                    body: self.region(body.start, body.end, jumps)?,
                }
            }
        };
        let node = self.arena.alloc_at(condition, kind);
        out.push(node);
        Ok(())
    }

    fn for_parts(
        &self,
        body: &Range<usize>,
        condition: InsnId,
        out: &[InsnId],
    ) -> Option<(InsnId, usize)> {
        let &init = out.last()?;
        let InsnKind::Store { index, .. } = self.arena[init].kind else {
            return None;
        };
        let update = body.end.checked_sub(1).filter(|update| body.contains(update))?;
        if updated_local(self.arena, self.kind(update)) != Some(index) {
            return None;
        }
        let tests_local = contains(self.arena, condition, |insn| {
            matches!(insn.kind, InsnKind::Load { index: i, .. } if i == index)
        });
        tests_local.then_some((init, update))
    }

    fn conditional(
        &mut self,
        position: usize,
        hi: usize,
        jumps: Jumps,
        out: &mut Vec<InsnId>,
    ) -> Result<usize, FastBuildError> {
        let branch = self.list[position];
        let Some(target) = self.target(position) else {
            out.push(branch);
            return Ok(position + 1);
        };

        // The branch skips the `then` block, so it holds the negated condition.
        if target > position && target <= hi {
            let (then_end, end) = match self.else_jump(position, target, hi) {
                Some(end) => (target - 1, end),
                None => (target, target),
            };
            self.arena[branch].kind.negate_condition();
            let then = self.region(position + 1, then_end, jumps)?;
            let else_ = self.region(target, end, jumps)?;
            let node = self.arena.alloc_at(
                branch,
                InsnKind::FastIf {
                    condition: branch,
                    then,
                    else_,
                },
            );
            out.push(node);
            return Ok(end);
        }

        // `if (c) break;` and `if (c) continue;`
        let exit = if jumps.break_to == Some(target) {
            Some(InsnKind::FastBreak)
        } else if jumps.is_continue(target) {
            Some(InsnKind::FastContinue)
        } else {
            None
        };
        match exit {
            Some(kind) => {
                let jump = self.arena.alloc_at(branch, kind);
                let node = self.arena.alloc_at(
                    branch,
                    InsnKind::FastIf {
                        condition: branch,
                        then: vec![jump],
                        else_: Vec::new(),
                    },
                );
                out.push(node);
            }
            None => {
                trace!("Keeping a branch at offset {}", self.starts[position]);
                out.push(branch);
            }
        }
        Ok(position + 1)
    }

    /// The end of the `else` block when the `then` block ends by jumping over it.
    fn else_jump(&self, position: usize, target: usize, hi: usize) -> Option<usize> {
        let last = target.checked_sub(1).filter(|last| *last > position)?;
        if !matches!(self.kind(last), InsnKind::Goto { .. }) {
            return None;
        }
        self.target(last).filter(|end| *end > target && *end <= hi)
    }

    fn jump(&mut self, position: usize, hi: usize, jumps: Jumps, out: &mut Vec<InsnId>) {
        let stmt = self.list[position];
        let Some(target) = self.target(position) else {
            return;
        };
        if target == hi && position + 1 == hi {
            // Falls through anyway.
        } else if jumps.break_to == Some(target) {
            self.arena.replace_kind(stmt, InsnKind::FastBreak);
            out.push(stmt);
        } else if jumps.is_continue(target) {
            self.arena.replace_kind(stmt, InsnKind::FastContinue);
            out.push(stmt);
        } else {
            trace!("Keeping a goto at offset {}", self.starts[position]);
            out.push(stmt);
        }
    }

    fn switch(
        &mut self,
        position: usize,
        hi: usize,
        jumps: Jumps,
        out: &mut Vec<InsnId>,
    ) -> Result<usize, FastBuildError> {
        let stmt = self.list[position];
        let InsnKind::Switch {
            key,
            default,
            ref cases,
        } = self.arena[stmt].kind
        else {
            out.push(stmt);
            return Ok(position + 1);
        };
        let cases = cases.clone();
        let default = self.position_of(default);
        let cases: Vec<(i32, usize)> = cases
            .iter()
            .map(|&(value, target)| (value, self.position_of(target)))
            .collect();

        let mut arm_starts: Vec<usize> = cases
            .iter()
            .map(|case| case.1)
            .chain([default])
            .filter(|start| *start > position && *start <= hi)
            .collect();
        arm_starts.sort_unstable();
        arm_starts.dedup();
        let Some(&last) = arm_starts.last() else {
            out.push(stmt);
            return Ok(position + 1);
        };

        // Arms other than the last one leave the switch by jumping to its end. Without such jumps,
        // a default target that no case shares is taken to be the end.
        let breaks = (position + 1..last)
            .filter(|p| matches!(self.kind(*p), InsnKind::Goto { .. }))
            .filter_map(|p| self.target(p))
            .filter(|target| *target >= last && *target <= hi)
            .min();
        let end = breaks.unwrap_or(if default == last && cases.iter().all(|case| case.1 != last) {
            last
        } else {
            hi
        });

        let jumps = Jumps {
            break_to: Some(end),
            ..jumps
        };
        let mut arms = Vec::new();
        for (k, &start) in arm_starts.iter().enumerate() {
            if start >= end {
                break;
            }
            let stop = arm_starts.get(k + 1).map_or(end, |next| (*next).min(end));
            arms.push(SwitchArm {
                values: cases
                    .iter()
                    .filter(|case| case.1 == start)
                    .map(|case| case.0)
                    .collect(),
                is_default: default == start,
                body: self.region(start, stop, jumps)?,
            });
        }
        self.arena
            .replace_kind(stmt, InsnKind::FastSwitch { key, arms });
        out.push(stmt);
        Ok(end)
    }

    /// The end offset of the widest unstructured handler range starting at `position`.
    fn protected_block(&self, position: usize, hi: usize) -> Option<u32> {
        self.handlers
            .iter()
            .zip(&self.handled)
            .filter(|(handler, handled)| {
                let end = self.position_of(handler.end_pc);
                !**handled
                    && self.position_of(handler.start_pc) == position
                    && end > position
                    && end <= hi
            })
            .map(|(handler, _)| handler.end_pc)
            .max()
    }

    fn try_catch(
        &mut self,
        position: usize,
        end_pc: u32,
        hi: usize,
        jumps: Jumps,
        out: &mut Vec<InsnId>,
    ) -> Result<usize, FastBuildError> {
        let group: Vec<usize> = (0..self.handlers.len())
            .filter(|&k| {
                !self.handled[k]
                    && self.handlers[k].end_pc == end_pc
                    && self.position_of(self.handlers[k].start_pc) == position
            })
            .collect();
        let mut handlers = Vec::with_capacity(group.len());
        for k in group {
            self.handled[k] = true;
            let handler = self.handlers[k];
            handlers.push((self.position_of(handler.handler_pc), handler));
        }
        // Alternatives of a multi-catch share the handler; the first type stands for all.
        handlers.sort_by_key(|(start, _)| *start);
        handlers.dedup_by_key(|(start, _)| *start);

        let body_end = self.position_of(end_pc);
        for &(start, handler) in &handlers {
            if start < body_end {
                return Err(FastBuildError::HandlerInsideBody {
                    handler_pc: handler.handler_pc,
                });
            }
            if start >= hi {
                return Err(FastBuildError::HandlerOutOfRange {
                    handler_pc: handler.handler_pc,
                });
            }
        }
        let first_handler = handlers[0].0;
        let last_handler = handlers[handlers.len() - 1].0;

        // The protected block and every handler but the last end by jumping past the last handler.
        let gap_jump = first_handler
            .checked_sub(1)
            .filter(|p| *p >= body_end && matches!(self.kind(*p), InsnKind::Goto { .. }));
        let after = gap_jump
            .and_then(|p| self.target(p))
            .or_else(|| {
                handlers.windows(2).find_map(|pair| {
                    let p = pair[1].0 - 1;
                    matches!(self.kind(p), InsnKind::Goto { .. })
                        .then(|| self.target(p))
                        .flatten()
                })
            })
            .filter(|after| *after > last_handler && *after <= hi)
            .unwrap_or(hi);

        let stop = self.strip_jump(position, first_handler, after);
        let mut body = self.region(position, stop, jumps)?;
        let mut catches = Vec::new();
        let mut finally = Vec::new();
        for (k, &(start, handler)) in handlers.iter().enumerate() {
            let stop = handlers.get(k + 1).map_or(after, |next| next.0);
            let stop = self.strip_jump(start, stop, after);
            let (local_index, first) = match *self.kind(start) {
                InsnKind::Store { index, value, .. } if self.is_exception(value) => {
                    (index, start + 1)
                }
                InsnKind::Pop { value } if self.is_exception(value) => {
                    (self.max_locals, start + 1)
                }
                _ => (self.max_locals, start),
            };
            let mut handler_body = self.region(first.min(stop), stop, jumps)?;
            if handler.catch_type == 0 {
                if handler_body
                    .last()
                    .is_some_and(|stmt| self.rethrows(*stmt, local_index))
                {
                    handler_body.pop();
                }
                finally = handler_body;
            } else {
                catches.push(FastCatch {
                    class_index: handler.catch_type,
                    local_index,
                    body: handler_body,
                });
            }
        }

        // The `finally` block is also inlined at the end of every path leaving normally.
        self.strip_copy(&mut body, &finally);
        for catch in &mut catches {
            self.strip_copy(&mut catch.body, &finally);
        }

        let node = self.arena.alloc_at(
            self.list[position],
            InsnKind::FastTry {
                body,
                catches,
                finally,
            },
        );
        out.push(node);
        trace!("Structured a try statement at offset {}", self.starts[position]);
        Ok(after)
    }

    /// Excludes a trailing jump to `after` from `start..stop`.
    fn strip_jump(&self, start: usize, stop: usize, after: usize) -> usize {
        match stop.checked_sub(1) {
            Some(last)
                if last > start
                    && matches!(self.kind(last), InsnKind::Goto { .. })
                    && self.target(last) == Some(after) =>
            {
                last
            }
            _ => stop,
        }
    }

    fn strip_copy(&self, list: &mut Vec<InsnId>, finally: &[InsnId]) {
        let Some(split) = list.len().checked_sub(finally.len()) else {
            return;
        };
        if !finally.is_empty()
            && list[split..]
                .iter()
                .zip(finally)
                .all(|(x, y)| equality::compare(self.arena, *x, *y))
        {
            list.truncate(split);
        }
    }

    fn is_exception(&self, value: InsnId) -> bool {
        matches!(self.arena[value].kind, InsnKind::ExceptionLoad { .. })
    }

    fn rethrows(&self, stmt: InsnId, local_index: u16) -> bool {
        let InsnKind::AThrow { value } = self.arena[stmt].kind else {
            return false;
        };
        matches!(self.arena[value].kind, InsnKind::Load { index, .. } if index == local_index)
    }
}

/// The local a `for` update statement steps.
fn updated_local(arena: &Arena, kind: &InsnKind) -> Option<u16> {
    match *kind {
        InsnKind::IInc { index, .. } | InsnKind::Store { index, .. } => Some(index),
        InsnKind::Inc { target, .. } | InsnKind::Assignment { target, .. } => {
            match arena[target].kind {
                InsnKind::Load { index, .. } => Some(index),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CmpOp, Code, ValueType};
    use crate::test_utils::CodeBuilder;
    use proptest::prelude::*;

    fn structure(code: &mut Code) -> Result<Vec<InsnId>, FastBuildError> {
        let Code {
            arena,
            instructions,
            exception_handlers,
            max_locals,
            ..
        } = code;
        Builder::new(arena, instructions, exception_handlers, *max_locals).build()
    }

    fn store(code: &mut CodeBuilder, index: u16, value: i32) -> InsnId {
        let value = code.iconst(value);
        code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index,
            value,
        })
    }

    #[test]
    fn if_else() {
        let mut code = CodeBuilder::new();
        let x = code.load(ValueType::Int, 1);
        let branch = code.stmt(InsnKind::If {
            cmp: CmpOp::Eq,
            value: x,
            target: 10,
        });
        let then = store(&mut code, 2, 1);
        code.stmt(InsnKind::Goto { target: 20 });
        code.at(10);
        let else_ = store(&mut code, 2, 2);
        code.at(20);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        let InsnKind::FastIf {
            condition,
            then: ref then_block,
            else_: ref else_block,
        } = code.arena[list[0]].kind
        else {
            panic!("expected an if, got {}", code.arena.debug(&list));
        };
        assert_eq!(condition, branch);
        assert_eq!(then_block[..], [then]);
        assert_eq!(else_block[..], [else_]);
        assert!(matches!(
            code.arena[branch].kind,
            InsnKind::If { cmp: CmpOp::Ne, .. }
        ));
    }

    #[test]
    fn counted_loop() {
        // for (int i = 0; i < n; i++) { k = 7; }
        let mut code = CodeBuilder::new();
        let init = store(&mut code, 2, 0);
        code.stmt(InsnKind::Goto { target: 10 });
        code.at(5);
        let body = store(&mut code, 3, 7);
        code.at(8);
        let update = code.stmt(InsnKind::IInc { index: 2, delta: 1 });
        code.at(10);
        let i = code.load(ValueType::Int, 2);
        let n = code.load(ValueType::Int, 1);
        let test = code.stmt(InsnKind::IfCmp {
            cmp: CmpOp::Lt,
            lhs: i,
            rhs: n,
            target: 5,
        });
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        assert!(matches!(
            code.arena[list[0]].kind,
            InsnKind::FastFor {
                init: a,
                condition: b,
                update: c,
                body: ref body_block,
            } if (a, b, c) == (init, test, update) && body_block[..] == [body]
        ), "got {}", code.arena.debug(&list));
    }

    #[test]
    fn top_tested_loop() {
        let mut code = CodeBuilder::new();
        let x = code.load(ValueType::Int, 1);
        let branch = code.stmt(InsnKind::If {
            cmp: CmpOp::Eq,
            value: x,
            target: 10,
        });
        let body = store(&mut code, 2, 7);
        code.stmt(InsnKind::Goto { target: 0 });
        code.at(10);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        assert!(matches!(
            code.arena[list[0]].kind,
            InsnKind::FastWhile { condition, body: ref body_block } if condition == branch && body_block[..] == [body]
        ));
        assert!(matches!(
            code.arena[branch].kind,
            InsnKind::If { cmp: CmpOp::Ne, .. }
        ));
    }

    #[test]
    fn infinite_loop_with_break() {
        let mut code = CodeBuilder::new();
        let first = store(&mut code, 2, 7);
        let x = code.load(ValueType::Int, 1);
        let branch = code.stmt(InsnKind::If {
            cmp: CmpOp::Eq,
            value: x,
            target: 10,
        });
        let second = store(&mut code, 3, 8);
        code.stmt(InsnKind::Goto { target: 0 });
        code.at(10);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        let InsnKind::FastInfiniteLoop { ref body } = code.arena[list[0]].kind else {
            panic!("expected a loop, got {}", code.arena.debug(&list));
        };
        let [a, guard, b] = body[..] else {
            panic!("unexpected body {}", code.arena.debug(body));
        };
        assert_eq!((a, b), (first, second));
        let InsnKind::FastIf {
            condition,
            ref then,
            ref else_,
        } = code.arena[guard].kind
        else {
            panic!("expected a guard, got {}", code.arena.debug(&guard));
        };
        assert_eq!(condition, branch);
        assert!(else_.is_empty());
        assert!(matches!(code.arena[then[0]].kind, InsnKind::FastBreak));
        assert!(matches!(
            code.arena[branch].kind,
            InsnKind::If { cmp: CmpOp::Eq, .. }
        ));
    }

    #[test]
    fn do_while() {
        let mut code = CodeBuilder::new();
        let body = store(&mut code, 2, 7);
        let x = code.load(ValueType::Int, 2);
        let branch = code.stmt(InsnKind::If {
            cmp: CmpOp::Ne,
            value: x,
            target: 0,
        });
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        assert!(matches!(
            code.arena[list[0]].kind,
            InsnKind::FastDoWhile { condition, body: ref body_block } if condition == branch && body_block[..] == [body]
        ));
    }

    #[test]
    fn switch_with_break() {
        let mut code = CodeBuilder::new();
        let key = code.load(ValueType::Int, 1);
        let switch = code.stmt(InsnKind::Switch {
            key,
            default: 30,
            cases: vec![(1, 10), (2, 20), (3, 20)],
        });
        code.at(10);
        let a = store(&mut code, 2, 1);
        let jump = code.stmt(InsnKind::Goto { target: 30 });
        code.at(20);
        let b = store(&mut code, 2, 2);
        code.at(30);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();

        let list = structure(&mut code).unwrap();
        assert_eq!(list, [switch, ret]);
        let InsnKind::FastSwitch { ref arms, .. } = code.arena[switch].kind else {
            panic!("expected a switch, got {}", code.arena.debug(&list));
        };
        assert_eq!(arms.len(), 2);
        assert_eq!((&arms[0].values[..], &arms[0].body[..]), (&[1][..], &[a, jump][..]));
        assert_eq!((&arms[1].values[..], &arms[1].body[..]), (&[2, 3][..], &[b][..]));
        assert!(arms.iter().all(|arm| !arm.is_default));
        assert!(matches!(code.arena[jump].kind, InsnKind::FastBreak));
    }

    fn exception_store(code: &mut CodeBuilder, class_index: u16, index: u16) -> InsnId {
        let exception = code.node(InsnKind::ExceptionLoad { class_index });
        code.stmt(InsnKind::Store {
            ty: ValueType::Reference,
            index,
            value: exception,
        })
    }

    #[test]
    fn try_catch() {
        let mut code = CodeBuilder::new();
        let protected = store(&mut code, 2, 1);
        code.stmt(InsnKind::Goto { target: 20 });
        code.at(10);
        exception_store(&mut code, 7, 3);
        let handled = store(&mut code, 2, 2);
        code.at(20);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();
        code.exception_handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 10,
            catch_type: 7,
        });

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        let InsnKind::FastTry {
            ref body,
            ref catches,
            ref finally,
        } = code.arena[list[0]].kind
        else {
            panic!("expected a try, got {}", code.arena.debug(&list));
        };
        assert_eq!(body[..], [protected]);
        assert!(finally.is_empty());
        let [ref catch] = catches[..] else {
            panic!("expected one catch");
        };
        assert_eq!((catch.class_index, catch.local_index), (7, 3));
        assert_eq!(catch.body[..], [handled]);
    }

    #[test]
    fn try_finally() {
        let mut code = CodeBuilder::new();
        let protected = store(&mut code, 2, 1);
        store(&mut code, 4, 3);
        code.stmt(InsnKind::Goto { target: 20 });
        code.at(10);
        exception_store(&mut code, 0, 3);
        let cleanup = store(&mut code, 4, 3);
        let exception = code.load(ValueType::Reference, 3);
        code.stmt(InsnKind::AThrow { value: exception });
        code.at(20);
        let ret = code.stmt(InsnKind::Return);
        let mut code = code.build();
        code.exception_handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 10,
            catch_type: 0,
        });

        let list = structure(&mut code).unwrap();
        assert_eq!(list[1..], [ret]);
        let InsnKind::FastTry {
            ref body,
            ref catches,
            ref finally,
        } = code.arena[list[0]].kind
        else {
            panic!("expected a try, got {}", code.arena.debug(&list));
        };
        assert_eq!(body[..], [protected]);
        assert!(catches.is_empty());
        assert_eq!(finally[..], [cleanup]);
    }

    #[test]
    fn handler_past_the_end() {
        let mut code = CodeBuilder::new();
        store(&mut code, 2, 1);
        code.stmt(InsnKind::Return);
        let mut code = code.build();
        code.exception_handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 50,
            catch_type: 0,
        });
        assert!(matches!(
            structure(&mut code),
            Err(FastBuildError::HandlerOutOfRange { handler_pc: 50 })
        ));
    }

    proptest! {
        #[test]
        fn straight_line_code_is_kept(values in proptest::collection::vec((0..6u16, any::<i32>()), 0..20)) {
            let mut code = CodeBuilder::new();
            for (index, value) in values {
                store(&mut code, index, value);
            }
            code.stmt(InsnKind::Return);
            let mut code = code.build();
            let list = structure(&mut code).unwrap();
            prop_assert_eq!(list, code.instructions);
        }
    }
}
