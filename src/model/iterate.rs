use super::{InsnKind, Instruction};
use crate::arena::{Arena, InsnId};
use core::ops::ControlFlow;

// Subexpressions are yielded in evaluation order. Nested statement lists of fast statements are not
// subexpressions and are exposed separately through `bodies`.

impl InsnKind {
    pub fn subexprs(&self) -> Vec<InsnId> {
        let mut out = Vec::new();
        match self {
            Self::Load { .. }
            | Self::ExceptionLoad { .. }
            | Self::IConst(_)
            | Self::LConst(_)
            | Self::FConst(_)
            | Self::DConst(_)
            | Self::AConstNull
            | Self::Ldc { .. }
            | Self::GetStatic { .. }
            | Self::New { .. }
            | Self::DupLoad { .. }
            | Self::OuterThis { .. }
            | Self::Goto { .. }
            | Self::IInc { .. }
            | Self::Return
            | Self::FastBreak
            | Self::FastContinue
            | Self::FastInfiniteLoop { .. }
            | Self::FastTry { .. } => {}

            Self::GetField { object: expr, .. }
            | Self::ArrayLength { array: expr }
            | Self::UnaryOp { value: expr, .. }
            | Self::Convert { value: expr, .. }
            | Self::CheckCast { object: expr, .. }
            | Self::InstanceOf { object: expr, .. }
            | Self::NewArray { length: expr, .. }
            | Self::ANewArray { length: expr, .. }
            | Self::DupStore { value: expr }
            | Self::TernaryOpStore { value: expr, .. }
            | Self::Inc { target: expr, .. }
            | Self::If { value: expr, .. }
            | Self::IfNull { value: expr, .. }
            | Self::Switch { key: expr, .. }
            | Self::Store { value: expr, .. }
            | Self::PutStatic { value: expr, .. }
            | Self::Pop { value: expr }
            | Self::XReturn { value: expr }
            | Self::AThrow { value: expr }
            | Self::MonitorEnter { object: expr }
            | Self::MonitorExit { object: expr }
            | Self::FastIf {
                condition: expr, ..
            }
            | Self::FastWhile {
                condition: expr, ..
            }
            | Self::FastDoWhile {
                condition: expr, ..
            }
            | Self::FastSwitch { key: expr, .. } => out.push(*expr),

            Self::ArrayLoad {
                array: a, index: b, ..
            }
            | Self::BinaryOp { lhs: a, rhs: b, .. }
            | Self::IfCmp { lhs: a, rhs: b, .. }
            | Self::PutField {
                object: a,
                value: b,
                ..
            }
            | Self::Assignment {
                target: a,
                value: b,
                ..
            } => out.extend([*a, *b]),

            Self::ArrayStore {
                array,
                index,
                value,
                ..
            } => out.extend([*array, *index, *value]),

            Self::Invoke { object, args, .. } => {
                out.extend(*object);
                out.extend(args);
            }
            Self::InvokeNew { args, .. } => out.extend(args),
            Self::MultiANewArray { dimensions, .. } => out.extend(dimensions),
            Self::InitArray { new_array, values } => {
                out.push(*new_array);
                out.extend(values);
            }
            Self::Ternary {
                condition,
                branches,
            } => {
                out.push(*condition);
                out.extend(branches);
            }
            Self::FastFor {
                init,
                condition,
                update,
                ..
            } => out.extend([*init, *condition, *update]),
            Self::FastDeclaration { value, .. } => out.extend(*value),
        }
        out
    }

    /// Nested statement lists of fast statements, in source order.
    pub fn bodies(&self) -> Vec<&Vec<InsnId>> {
        match self {
            Self::FastIf { then, else_, .. } => vec![then, else_],
            Self::FastWhile { body, .. }
            | Self::FastDoWhile { body, .. }
            | Self::FastFor { body, .. }
            | Self::FastInfiniteLoop { body } => vec![body],
            Self::FastSwitch { arms, .. } => arms.iter().map(|arm| &arm.body).collect(),
            Self::FastTry {
                body,
                catches,
                finally,
            } => {
                let mut out = vec![body];
                out.extend(catches.iter().map(|catch| &catch.body));
                out.push(finally);
                out
            }
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<InsnId>> {
        match self {
            Self::FastIf { then, else_, .. } => vec![then, else_],
            Self::FastWhile { body, .. }
            | Self::FastDoWhile { body, .. }
            | Self::FastFor { body, .. }
            | Self::FastInfiniteLoop { body } => vec![body],
            Self::FastSwitch { arms, .. } => arms.iter_mut().map(|arm| &mut arm.body).collect(),
            Self::FastTry {
                body,
                catches,
                finally,
            } => {
                let mut out = vec![body];
                out.extend(catches.iter_mut().map(|catch| &mut catch.body));
                out.push(finally);
                out
            }
            _ => Vec::new(),
        }
    }
}

impl Instruction {
    pub fn subexprs(&self) -> Vec<InsnId> {
        self.kind.subexprs()
    }
}

/// Visits `root` and everything reachable from it (subexpressions first, then nested bodies) in
/// pre-order. The callback can stop the walk early.
pub fn walk<B>(
    arena: &Arena,
    root: InsnId,
    visit: &mut impl FnMut(InsnId, &Instruction) -> ControlFlow<B>,
) -> ControlFlow<B> {
    let insn = &arena[root];
    visit(root, insn)?;
    for child in insn.kind.subexprs() {
        walk(arena, child, visit)?;
    }
    for body in insn.kind.bodies() {
        for &stmt in body {
            walk(arena, stmt, visit)?;
        }
    }
    ControlFlow::Continue(())
}

pub fn walk_list<B>(
    arena: &Arena,
    list: &[InsnId],
    visit: &mut impl FnMut(InsnId, &Instruction) -> ControlFlow<B>,
) -> ControlFlow<B> {
    for &stmt in list {
        walk(arena, stmt, visit)?;
    }
    ControlFlow::Continue(())
}

/// The smallest bytecode offset of any node under `root`, i.e. where execution of a statement
/// begins.
pub fn start_offset(arena: &Arena, root: InsnId) -> u32 {
    let mut start = arena[root].offset;
    let _ = walk::<()>(arena, root, &mut |_, insn| {
        start = start.min(insn.offset);
        ControlFlow::Continue(())
    });
    start
}

/// Returns the first node under `root` satisfying `predicate`.
pub fn find(
    arena: &Arena,
    root: InsnId,
    mut predicate: impl FnMut(&Instruction) -> bool,
) -> Option<InsnId> {
    match walk(arena, root, &mut |id, insn| {
        if predicate(insn) {
            ControlFlow::Break(id)
        } else {
            ControlFlow::Continue(())
        }
    }) {
        ControlFlow::Break(id) => Some(id),
        ControlFlow::Continue(()) => None,
    }
}

/// Returns the first `DupLoad` of `store` under `root`.
pub fn find_dup_load(arena: &Arena, root: InsnId, store: InsnId) -> Option<InsnId> {
    find(arena, root, |insn| {
        matches!(insn.kind, InsnKind::DupLoad { store: s } if s == store)
    })
}

pub fn count_dup_loads(arena: &Arena, list: &[InsnId], store: InsnId) -> usize {
    let mut count = 0;
    let _ = walk_list::<()>(arena, list, &mut |_, insn| {
        if matches!(insn.kind, InsnKind::DupLoad { store: s } if s == store) {
            count += 1;
        }
        ControlFlow::Continue(())
    });
    count
}

/// Whether any node under `root` satisfies `predicate`.
pub fn contains(arena: &Arena, root: InsnId, predicate: impl FnMut(&Instruction) -> bool) -> bool {
    find(arena, root, predicate).is_some()
}

/// Every node reachable from `list`, children before their parents. Rewriting nodes in this order
/// lets a rewrite see its operands in their final form.
pub fn post_order(arena: &Arena, list: &[InsnId]) -> Vec<InsnId> {
    fn visit(arena: &Arena, id: InsnId, out: &mut Vec<InsnId>) {
        let kind = &arena[id].kind;
        for child in kind.subexprs() {
            visit(arena, child, out);
        }
        for body in kind.bodies() {
            for &stmt in body {
                visit(arena, stmt, out);
            }
        }
        out.push(id);
    }

    let mut out = Vec::new();
    for &stmt in list {
        visit(arena, stmt, &mut out);
    }
    out
}
