// Reconstructors fold bytecode idioms on the flat statement list of a method back into the
// expressions they were compiled from. Each pass recognizes one idiom and is a no-op on lists that
// don't contain it. Passes never look at text, only at node kinds, constant pool entries and
// positions.
//
// Statement removals are two-phase: a pass records removed positions in a `Splice` while
// scanning, consults it to skip dead statements, and compacts the list once at the end. Scans go
// from the tail to the head, so that a match sees the already folded form of the statements after
// it, e.g. the inner assignment of `a = b = c`.

mod array_initializer;
mod assignment;
mod assignment_operator;
mod dot_class;
mod increment;
mod new_instruction;
mod outer_reference;
mod string_concat;
mod ternary;

use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::flag_method;
use crate::model::{
    ClassFile, ClassId, ClassTable, Code, ConstantPool, InsnKind, equality, iterate::walk,
};
use core::ops::ControlFlow;
use rustc_hash::FxHashSet;
use tracing::debug;

/// What a pass can see besides the method body: the class being reconstructed and, through the
/// table, its enclosing classes.
pub struct PassContext<'a> {
    pub classes: &'a mut ClassTable,
    pub class: ClassId,
    /// Index of the method being rewritten. Its `code` is detached while the passes run.
    pub method: usize,
}

impl PassContext<'_> {
    pub fn class(&self) -> &ClassFile {
        &self.classes[self.class]
    }

    pub fn is_constructor(&self) -> bool {
        let class = self.class();
        class
            .methods
            .get(self.method)
            .is_some_and(|method| method.is_constructor(&class.constant_pool))
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.classes[self.class].constant_pool
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.classes[self.class].constant_pool
    }
}

type Pass = fn(&mut PassContext<'_>, &mut Code) -> Result<(), MethodAnalysisError>;

// The order is significant: earlier patterns are sub-patterns of later ones.
const PASSES: &[(&str, Pass)] = &[
    ("outer references", outer_reference::reconstruct),
    ("new instructions", new_instruction::reconstruct),
    ("increments", increment::reconstruct),
    (".class literals", dot_class::reconstruct),
    ("string concatenations", string_concat::reconstruct),
    ("assignments", assignment::reconstruct),
    ("array initializers", array_initializer::reconstruct),
    ("assignment operators", assignment_operator::reconstruct),
    ("ternary operators", ternary::reconstruct),
];

/// Seeds the reconstructed list of every method of `class` from its raw list and runs all passes
/// on it. A failing method is flagged and rolled back to its raw list.
pub fn reconstruct_methods(classes: &mut ClassTable, class: ClassId) {
    for index in 0..classes[class].methods.len() {
        let method = &mut classes[class].methods[index];
        if method.contains_error {
            continue;
        }
        // The body is detached for the duration of the passes, so that they can freely access
        // other parts of the class table.
        let Some(mut code) = method.code.take() else {
            continue;
        };
        code.fast_nodes = code.instructions.clone();
        // Passes rewrite nodes in place, and the raw list shares them.
        let pristine = code.arena.clone();

        let mut cx = PassContext {
            classes: &mut *classes,
            class,
            method: index,
        };
        let result = run_passes(&mut cx, &mut code);
        if result.is_err() {
            code.arena = pristine;
            code.fast_nodes = code.instructions.clone();
        }
        classes[class].methods[index].code = Some(code);
        if let Err(error) = result {
            flag_method(&mut classes[class], index, &error);
        }
    }
}

fn run_passes(cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    for (name, pass) in PASSES {
        debug!("Reconstructing {name}");
        pass(cx, code)?;
    }
    Ok(())
}

/// Pending removals from a statement list.
pub struct Splice {
    removed: Vec<bool>,
}

impl Splice {
    pub fn new(list: &[InsnId]) -> Self {
        Self {
            removed: vec![false; list.len()],
        }
    }

    pub fn remove(&mut self, position: usize) {
        self.removed[position] = true;
    }

    pub fn is_live(&self, position: usize) -> bool {
        !self.removed[position]
    }

    /// The closest live position after `position`.
    pub fn next(&self, position: usize) -> Option<usize> {
        (position + 1..self.removed.len()).find(|position| self.is_live(*position))
    }

    /// The closest live position before `position`.
    pub fn prev(&self, position: usize) -> Option<usize> {
        (0..position).rev().find(|position| self.is_live(*position))
    }

    pub fn apply(self, list: &mut Vec<InsnId>) {
        let mut removed = self.removed.into_iter();
        list.retain(|_| !removed.next().unwrap_or(false));
    }
}

/// Offsets control can reach other than by falling through: branch and switch targets, and the
/// bounds of protected ranges and their handlers.
pub fn jump_targets(code: &Code) -> FxHashSet<u32> {
    let mut targets = FxHashSet::default();
    for &stmt in &code.fast_nodes {
        match code.arena[stmt].kind {
            InsnKind::Switch {
                default, ref cases, ..
            } => {
                targets.insert(default);
                targets.extend(cases.iter().map(|(_, target)| *target));
            }
            ref kind => targets.extend(kind.branch_target()),
        }
    }
    for handler in &code.exception_handlers {
        targets.extend([handler.start_pc, handler.end_pc, handler.handler_pc]);
    }
    targets
}

pub fn is_dup_load_of(arena: &Arena, id: InsnId, store: InsnId) -> bool {
    matches!(arena[id].kind, InsnKind::DupLoad { store: s } if s == store)
}

/// All `DupLoad`s of `store` in live statements, with the position of the statement containing
/// each of them.
pub fn dup_loads(
    arena: &Arena,
    list: &[InsnId],
    splice: &Splice,
    store: InsnId,
) -> Vec<(usize, InsnId)> {
    let mut out = Vec::new();
    for (position, &stmt) in list.iter().enumerate() {
        if !splice.is_live(position) {
            continue;
        }
        let _ = walk::<()>(arena, stmt, &mut |id, insn| {
            if matches!(insn.kind, InsnKind::DupLoad { store: s } if s == store) {
                out.push((position, id));
            }
            ControlFlow::Continue(())
        });
    }
    out
}

/// Folds `dup` statements whose only remaining use is under `root` into that use. Called after a
/// rewrite has dropped the other uses, e.g. the object operand of `x.f = x.f + 1`.
pub fn inline_single_use_dups(
    arena: &mut Arena,
    list: &[InsnId],
    splice: &mut Splice,
    root: InsnId,
) {
    let mut loads = Vec::new();
    let _ = walk::<()>(arena, root, &mut |id, insn| {
        if let InsnKind::DupLoad { store } = insn.kind {
            loads.push((id, store));
        }
        ControlFlow::Continue(())
    });
    for (load, store) in loads {
        let Some(position) = list
            .iter()
            .enumerate()
            .position(|(position, stmt)| *stmt == store && splice.is_live(position))
        else {
            continue;
        };
        let InsnKind::DupStore { value } = arena[store].kind else {
            continue;
        };
        if dup_loads(arena, list, splice, store).len() == 1 {
            let kind = arena[value].kind.clone();
            arena.replace_kind(load, kind);
            splice.remove(position);
        }
    }
}

/// Whether `get` reads the location written by the store-like statement `put`.
pub fn reads_stored_location(arena: &Arena, put: &InsnKind, get: InsnId) -> bool {
    match (put, &arena[get].kind) {
        (InsnKind::Store { index, .. }, InsnKind::Load { index: i2, .. }) => index == i2,
        (InsnKind::PutStatic { index, .. }, InsnKind::GetStatic { index: i2 }) => index == i2,
        (
            InsnKind::PutField { index, object, .. },
            InsnKind::GetField {
                index: i2,
                object: o2,
            },
        ) => index == i2 && equality::compare(arena, *object, *o2),
        (
            InsnKind::ArrayStore { array, index, .. },
            InsnKind::ArrayLoad {
                array: a2,
                index: i2,
                ..
            },
        ) => equality::compare(arena, *array, *a2) && equality::compare(arena, *index, *i2),
        _ => false,
    }
}

/// The value written by a store-like statement.
pub fn stored_value(kind: &InsnKind) -> Option<InsnId> {
    match *kind {
        InsnKind::Store { value, .. }
        | InsnKind::PutStatic { value, .. }
        | InsnKind::PutField { value, .. }
        | InsnKind::ArrayStore { value, .. } => Some(value),
        _ => None,
    }
}

/// Replaces the value written by a store-like statement.
pub fn set_stored_value(kind: &mut InsnKind, new_value: InsnId) {
    if let InsnKind::Store { value, .. }
    | InsnKind::PutStatic { value, .. }
    | InsnKind::PutField { value, .. }
    | InsnKind::ArrayStore { value, .. } = kind
    {
        *value = new_value;
    }
}

/// The read of the location written by a store-like statement. Operand nodes are shared with the
/// statement, so the statement has to be dropped or its operands duplicated afterwards.
pub fn read_of_store(kind: &InsnKind) -> Option<InsnKind> {
    match *kind {
        InsnKind::Store { ty, index, .. } => Some(InsnKind::Load { ty, index }),
        InsnKind::PutStatic { index, .. } => Some(InsnKind::GetStatic { index }),
        InsnKind::PutField { index, object, .. } => Some(InsnKind::GetField { index, object }),
        InsnKind::ArrayStore {
            ty, array, index, ..
        } => Some(InsnKind::ArrayLoad { ty, array, index }),
        _ => None,
    }
}

/// Copies a side-effect free operand so that it can be evaluated in a second place. Returns
/// `None` for operands that can't be safely repeated.
pub fn duplicate_simple(arena: &mut Arena, id: InsnId) -> Option<InsnId> {
    let kind = match arena[id].kind.clone() {
        InsnKind::GetField { index, object } => InsnKind::GetField {
            index,
            object: duplicate_simple(arena, object)?,
        },
        kind @ (InsnKind::Load { .. }
        | InsnKind::IConst(_)
        | InsnKind::LConst(_)
        | InsnKind::FConst(_)
        | InsnKind::DConst(_)
        | InsnKind::AConstNull
        | InsnKind::Ldc { .. }
        | InsnKind::GetStatic { .. }
        | InsnKind::OuterThis { .. }) => kind,
        _ => return None,
    };
    Some(arena.alloc_at(id, kind))
}

/// Whether `id` is the constant 1 of any numeric type.
pub fn is_one(arena: &Arena, id: InsnId) -> bool {
    match arena[id].kind {
        InsnKind::IConst(value) => value == 1,
        InsnKind::LConst(value) => value == 1,
        InsnKind::FConst(value) => value == 1.0,
        InsnKind::DConst(value) => value == 1.0,
        _ => false,
    }
}

/// Runs a single pass on a detached body of `class`, as the driver would.
#[cfg(test)]
pub(crate) fn run_in(pass: Pass, classes: &mut ClassTable, class: ClassId, code: &mut Code) {
    code.fast_nodes = code.instructions.clone();
    let mut cx = PassContext {
        classes,
        class,
        method: usize::MAX,
    };
    if let Err(error) = pass(&mut cx, code) {
        panic!("pass failed: {error}");
    }
}

/// Like `run_in`, for passes that only look at the body.
#[cfg(test)]
pub(crate) fn run_alone(pass: Pass, code: &mut Code) -> ClassTable {
    let mut classes = ClassTable::new();
    let class = classes.insert(crate::test_utils::ClassBuilder::new("a/Test").build(), None);
    run_in(pass, &mut classes, class, code);
    classes
}
