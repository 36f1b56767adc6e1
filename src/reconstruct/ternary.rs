// `c ? a : b` compiles to
//
//     if (!c) goto ELSE;  push a;  goto END;  ELSE: push b;  END: ... consume ...
//
// The list builder leaves `a` in a `TernaryOpStore` and `b` inside the consuming statement, at the
// offset recorded in the store. The branch jumps to `b`, so the condition is negated back.

use super::{PassContext, Splice};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{Code, InsnKind, iterate::find};
use tracing::trace;

pub fn reconstruct(_cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if splice.is_live(position) {
            fold(arena, fast_nodes, &mut splice, position)?;
        }
    }

    splice.apply(fast_nodes);
    Ok(())
}

fn fold(
    arena: &mut Arena,
    list: &[InsnId],
    splice: &mut Splice,
    position: usize,
) -> Result<(), MethodAnalysisError> {
    let branch = list[position];
    if !arena[branch].kind.is_conditional_branch() {
        return Ok(());
    }
    let Some(store_position) = splice.next(position) else {
        return Ok(());
    };
    let InsnKind::TernaryOpStore {
        value: if_true,
        second_value_offset,
    } = arena[list[store_position]].kind
    else {
        return Ok(());
    };
    let Some(goto_position) = splice.next(store_position) else {
        return Ok(());
    };
    if !matches!(arena[list[goto_position]].kind, InsnKind::Goto { .. }) {
        return Ok(());
    }
    let Some(use_position) = splice.next(goto_position) else {
        return Err(MethodAnalysisError::Invariant(
            "ternary operator has no consumer",
        ));
    };
    let Some(if_false) = find(arena, list[use_position], |insn| {
        insn.offset == second_value_offset
    }) else {
        return Ok(());
    };

    // The second operand is replaced in place by the whole expression, so it moves to a new node.
    let kind = arena[if_false].kind.clone();
    let moved = arena.alloc_at(if_false, kind);
    arena[branch].kind.negate_condition();
    arena.replace_kind(
        if_false,
        InsnKind::Ternary {
            condition: branch,
            branches: [if_true, moved],
        },
    );
    splice.remove(position);
    splice.remove(store_position);
    splice.remove(goto_position);
    trace!("Folded a ternary operator at offset {}", arena[branch].offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::run_alone;
    use super::*;
    use crate::model::{CmpOp, ValueType};
    use crate::test_utils::CodeBuilder;

    #[test]
    fn conditional_store() {
        // int y = x == 0 ? 1 : 2;
        let mut code = CodeBuilder::new();
        let x = code.load(ValueType::Int, 1);
        let branch = code.stmt(InsnKind::If {
            cmp: CmpOp::Ne,
            value: x,
            target: 10,
        });
        let one = code.iconst(1);
        code.stmt(InsnKind::TernaryOpStore {
            value: one,
            second_value_offset: 10,
        });
        code.stmt(InsnKind::Goto { target: 11 });
        code.at(10);
        let two = code.iconst(2);
        let store = code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 2,
            value: two,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [store]);
        let InsnKind::Ternary {
            condition,
            branches: [if_true, if_false],
        } = code.arena[two].kind
        else {
            panic!("expected a ternary, got {}", code.arena.debug(&two));
        };
        assert_eq!((condition, if_true), (branch, one));
        assert!(matches!(code.arena[if_false].kind, InsnKind::IConst(2)));
        assert!(matches!(
            code.arena[branch].kind,
            InsnKind::If { cmp: CmpOp::Eq, .. }
        ));
    }

    #[test]
    fn plain_branches_are_kept() {
        let mut code = CodeBuilder::new();
        let x = code.load(ValueType::Int, 1);
        code.stmt(InsnKind::If {
            cmp: CmpOp::Eq,
            value: x,
            target: 4,
        });
        code.stmt(InsnKind::Return);
        let mut code = code.build();
        run_alone(reconstruct, &mut code);
        assert_eq!(code.fast_nodes, code.instructions);
    }
}
