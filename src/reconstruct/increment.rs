// Increments and decrements by one whose value is used:
//
//     dup := x;      x = dup + 1;   ... dup ...    ->  ... x++ ...
//     dup := x + 1;  x = dup;       ... dup ...    ->  ... ++x ...
//     iinc i 1;      ... i ...                     ->  ... ++i ...   (load after the iinc)
//     iinc i 1;      ... i ...                     ->  ... i++ ...   (load before the iinc)
//
// Only `+ 1` and `- 1` are folded. An increment of a field or an array element duplicates the
// object or array reference as well; that `dup` is folded back into the target.

use super::{
    PassContext, Splice, dup_loads, inline_single_use_dups, is_dup_load_of, is_one, jump_targets,
    reads_stored_location, stored_value,
};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::iterate::{find, start_offset};
use crate::model::{BinOp, Code, IncPosition, InsnKind};
use rustc_hash::FxHashSet;
use tracing::trace;

pub fn reconstruct(_cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let targets = jump_targets(code);
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if !splice.is_live(position) {
            continue;
        }
        match arena[fast_nodes[position]].kind {
            InsnKind::DupStore { .. } => fold_dup(arena, fast_nodes, &mut splice, position),
            InsnKind::IInc { index, delta } if delta.abs() == 1 => {
                fold_iinc(arena, fast_nodes, &mut splice, &targets, position, index, delta);
            }
            _ => {}
        }
    }

    splice.apply(fast_nodes);
    Ok(())
}

/// `lhs + 1` or `lhs - 1`, as `(lhs, delta)`.
fn step(arena: &Arena, id: InsnId) -> Option<(InsnId, i32)> {
    match arena[id].kind {
        InsnKind::BinaryOp {
            op: BinOp::Add,
            lhs,
            rhs,
        } if is_one(arena, rhs) => Some((lhs, 1)),
        InsnKind::BinaryOp {
            op: BinOp::Sub,
            lhs,
            rhs,
        } if is_one(arena, rhs) => Some((lhs, -1)),
        _ => None,
    }
}

fn fold_dup(arena: &mut Arena, list: &[InsnId], splice: &mut Splice, position: usize) {
    let store = list[position];
    let InsnKind::DupStore { value } = arena[store].kind else {
        return;
    };
    let Some(put_position) = splice.next(position) else {
        return;
    };
    let put = list[put_position];
    let Some(stored) = stored_value(&arena[put].kind) else {
        return;
    };

    let (increment, target, delta) = match (step(arena, stored), step(arena, value)) {
        // dup := x; x = dup + 1
        (Some((lhs, delta)), _)
            if is_dup_load_of(arena, lhs, store)
                && reads_stored_location(arena, &arena[put].kind, value) =>
        {
            (IncPosition::Post, value, delta)
        }
        // dup := x + 1; x = dup
        (_, Some((lhs, delta)))
            if is_dup_load_of(arena, stored, store)
                && reads_stored_location(arena, &arena[put].kind, lhs) =>
        {
            (IncPosition::Pre, lhs, delta)
        }
        _ => return,
    };

    let uses: Vec<(usize, InsnId)> = dup_loads(arena, list, splice, store)
        .into_iter()
        .filter(|(position, _)| *position != put_position)
        .collect();
    let kind = InsnKind::Inc {
        position: increment,
        target,
        delta,
    };
    match uses[..] {
        [] => {
            arena.replace_kind(put, kind);
            splice.remove(position);
        }
        [(_, use_)] => {
            arena.replace_kind(use_, kind);
            splice.remove(position);
            splice.remove(put_position);
        }
        _ => return,
    }
    trace!("Folded an increment at offset {}", arena[store].offset);

    inline_single_use_dups(arena, list, splice, target);
}

fn fold_iinc(
    arena: &mut Arena,
    list: &[InsnId],
    splice: &mut Splice,
    targets: &FxHashSet<u32>,
    position: usize,
    index: u16,
    delta: i32,
) {
    let iinc = &arena[list[position]];
    let (iinc_offset, iinc_line) = (iinc.offset, iinc.line_number);
    let Some(next) = splice.next(position) else {
        return;
    };
    // A statement entered by a jump runs without the `iinc` before it, as in the condition of a
    // `for` loop.
    let next_start = start_offset(arena, list[next]);
    if next_start > iinc_offset && targets.contains(&next_start) {
        return;
    }
    let Some(load) = find(arena, list[next], |insn| {
        matches!(insn.kind, InsnKind::Load { index: i, .. } if i == index)
    }) else {
        return;
    };

    let load_insn = &arena[load];
    let increment = if load_insn.offset < iinc_offset {
        IncPosition::Post
    } else if load_insn.line_number == iinc_line {
        // A load right after an `iinc` on the same line is `++i`; on a later line it's a separate
        // statement reading the updated value.
        IncPosition::Pre
    } else {
        return;
    };

    let kind = load_insn.kind.clone();
    let target = arena.alloc_at(load, kind);
    arena.replace_kind(
        load,
        InsnKind::Inc {
            position: increment,
            target,
            delta,
        },
    );
    splice.remove(position);
    trace!("Folded an iinc at offset {iinc_offset}");
}

#[cfg(test)]
mod tests {
    use super::super::run_alone;
    use super::*;
    use crate::model::{CmpOp, ValueType};
    use crate::test_utils::CodeBuilder;

    /// `dup := iload 3; istore 3 (dup op rhs)`
    fn post_increment(op: BinOp, rhs: i32) -> (Code, InsnId) {
        let mut code = CodeBuilder::new();
        let load = code.load(ValueType::Int, 3);
        let store = code.stmt(InsnKind::DupStore { value: load });
        let dup = code.node(InsnKind::DupLoad { store });
        let rhs = code.iconst(rhs);
        let sum = code.node(InsnKind::BinaryOp { op, lhs: dup, rhs });
        code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 3,
            value: sum,
        });
        (code.build(), load)
    }

    #[test]
    fn post_increment_of_local() {
        for (op, delta) in [(BinOp::Add, 1), (BinOp::Sub, -1)] {
            let (mut code, load) = post_increment(op, 1);
            run_alone(reconstruct, &mut code);

            assert_eq!(code.fast_nodes.len(), 1);
            let InsnKind::Inc {
                position,
                target,
                delta: d,
            } = code.arena[code.fast_nodes[0]].kind
            else {
                panic!("expected an increment, got {}", code.arena.debug(&code.fast_nodes));
            };
            assert_eq!((position, target, d), (IncPosition::Post, load, delta));
            assert!(matches!(code.arena[target].kind, InsnKind::Load { index: 3, .. }));
        }
    }

    #[test]
    fn only_steps_of_one() {
        let (mut code, _) = post_increment(BinOp::Add, 2);
        let before = code.arena.debug(&code.instructions).to_string();
        run_alone(reconstruct, &mut code);
        assert_eq!(code.fast_nodes, code.instructions);
        assert_eq!(code.arena.debug(&code.fast_nodes).to_string(), before);
    }

    #[test]
    fn pre_increment_of_static_used_as_value() {
        let mut code = CodeBuilder::new();
        let get = code.node(InsnKind::GetStatic { index: 7 });
        let one = code.iconst(1);
        let sum = code.node(InsnKind::BinaryOp {
            op: BinOp::Add,
            lhs: get,
            rhs: one,
        });
        let store = code.stmt(InsnKind::DupStore { value: sum });
        let dup = code.node(InsnKind::DupLoad { store });
        code.stmt(InsnKind::PutStatic {
            index: 7,
            value: dup,
        });
        let dup = code.node(InsnKind::DupLoad { store });
        let ret = code.stmt(InsnKind::XReturn { value: dup });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [ret]);
        assert!(matches!(
            code.arena[dup].kind,
            InsnKind::Inc {
                position: IncPosition::Pre,
                target,
                delta: 1,
            } if target == get
        ));
    }

    #[test]
    fn iinc_then_load() {
        let mut code = CodeBuilder::new();
        code.line(4);
        code.stmt(InsnKind::IInc { index: 1, delta: 1 });
        let load = code.load(ValueType::Int, 1);
        let ret = code.stmt(InsnKind::XReturn { value: load });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [ret]);
        let InsnKind::Inc {
            position: IncPosition::Pre,
            target,
            delta: 1,
        } = code.arena[load].kind
        else {
            panic!("expected ++i, got {}", code.arena.debug(&load));
        };
        assert!(matches!(code.arena[target].kind, InsnKind::Load { index: 1, .. }));
    }

    #[test]
    fn load_before_iinc() {
        let mut code = CodeBuilder::new();
        let load = code.load(ValueType::Int, 1);
        code.stmt(InsnKind::IInc {
            index: 1,
            delta: -1,
        });
        code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 2,
            value: load,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes.len(), 1);
        assert!(matches!(
            code.arena[load].kind,
            InsnKind::Inc {
                position: IncPosition::Post,
                delta: -1,
                ..
            }
        ));
    }

    #[test]
    fn iinc_before_jump_target_is_kept() {
        // for (...; i < n; i++) with the update and the test on one line
        let mut code = CodeBuilder::new();
        code.line(3);
        code.stmt(InsnKind::Goto { target: 2 });
        let iinc = code.stmt(InsnKind::IInc { index: 1, delta: 1 });
        let i = code.load(ValueType::Int, 1);
        let n = code.load(ValueType::Int, 0);
        code.stmt(InsnKind::IfCmp {
            cmp: CmpOp::Lt,
            lhs: i,
            rhs: n,
            target: 1,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, code.instructions);
        assert!(matches!(code.arena[iinc].kind, InsnKind::IInc { .. }));
        assert!(matches!(code.arena[i].kind, InsnKind::Load { .. }));
    }
}
