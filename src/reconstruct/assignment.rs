// Assignments used as values, e.g. `a = b = c`:
//
//     dup := c;  b = dup;  ... dup ...
//
// When both stores are on the same line, this is a chained assignment and the use becomes
// `(b = c)`. Otherwise the code was written as two statements, `b = c; a = b;`, and the `dup` only
// exists because the compiler reused the value on the stack, so the use becomes a read of `b`.
// A missing line number on either side counts as the same line.

use super::{
    PassContext, Splice, dup_loads, duplicate_simple, is_dup_load_of, read_of_store,
    set_stored_value, stored_value,
};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{AssignOp, Code, InsnKind};
use tracing::trace;

pub fn reconstruct(_cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if splice.is_live(position) {
            fold(arena, fast_nodes, &mut splice, position);
        }
    }

    splice.apply(fast_nodes);
    Ok(())
}

fn fold(arena: &mut Arena, list: &[InsnId], splice: &mut Splice, position: usize) {
    let store = list[position];
    let InsnKind::DupStore { value } = arena[store].kind else {
        return;
    };
    let Some(put_position) = splice.next(position) else {
        return;
    };
    let put = list[put_position];
    if !stored_value(&arena[put].kind).is_some_and(|stored| is_dup_load_of(arena, stored, store)) {
        return;
    }

    let uses: Vec<(usize, InsnId)> = dup_loads(arena, list, splice, store)
        .into_iter()
        .filter(|(position, _)| *position != put_position)
        .collect();
    let [(use_position, use_)] = uses[..] else {
        return;
    };
    if use_position < put_position {
        return;
    }

    let (put_line, use_line) = (arena[put].line_number, arena[list[use_position]].line_number);
    let same_line = put_line.is_none() || use_line.is_none() || put_line == use_line;

    if same_line {
        let Some(read) = read_of_store(&arena[put].kind) else {
            return;
        };
        let target = arena.alloc_at(put, read);
        arena.replace_kind(
            use_,
            InsnKind::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            },
        );
        splice.remove(position);
        splice.remove(put_position);
        trace!("Folded a chained assignment at offset {}", arena[put].offset);
    } else {
        let mut put_kind = arena[put].kind.clone();
        let Some(read) = separate_read(arena, &put_kind) else {
            return;
        };
        set_stored_value(&mut put_kind, value);
        arena.replace_kind(put, put_kind);
        arena.replace_kind(use_, read);
        splice.remove(position);
        trace!("Split an assignment at offset {}", arena[put].offset);
    }
}

/// A read of the location written by `put` that doesn't share operands with it.
fn separate_read(arena: &mut Arena, put: &InsnKind) -> Option<InsnKind> {
    Some(match *put {
        InsnKind::PutField { index, object, .. } => InsnKind::GetField {
            index,
            object: duplicate_simple(arena, object)?,
        },
        InsnKind::ArrayStore {
            ty, array, index, ..
        } => InsnKind::ArrayLoad {
            ty,
            array: duplicate_simple(arena, array)?,
            index: duplicate_simple(arena, index)?,
        },
        _ => read_of_store(put)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::run_alone;
    use super::*;
    use crate::model::ValueType;
    use crate::test_utils::CodeBuilder;

    /// `dup := 7; istore 1 dup; istore 2 dup`, the second store on `second_line`.
    fn two_stores(second_line: u32) -> (Code, [InsnId; 4]) {
        let mut code = CodeBuilder::new();
        code.line(3);
        let value = code.iconst(7);
        let store = code.stmt(InsnKind::DupStore { value });
        let dup = code.node(InsnKind::DupLoad { store });
        let first = code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 1,
            value: dup,
        });
        code.line(second_line);
        let dup = code.node(InsnKind::DupLoad { store });
        let second = code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 2,
            value: dup,
        });
        (code.build(), [value, first, second, dup])
    }

    #[test]
    fn chained_assignment_on_one_line() {
        let (mut code, [value, _, second, dup]) = two_stores(3);
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [second]);
        assert_eq!(code.instructions.len() - code.fast_nodes.len(), 2);
        let InsnKind::Assignment {
            op: AssignOp::Assign,
            target,
            value: assigned,
        } = code.arena[dup].kind
        else {
            panic!("expected an assignment, got {}", code.arena.debug(&dup));
        };
        assert_eq!(assigned, value);
        assert!(matches!(code.arena[target].kind, InsnKind::Load { index: 1, .. }));
    }

    #[test]
    fn separate_statements_on_different_lines() {
        let (mut code, [value, first, second, dup]) = two_stores(4);
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [first, second]);
        assert!(matches!(
            code.arena[first].kind,
            InsnKind::Store { index: 1, value: v, .. } if v == value
        ));
        assert!(matches!(code.arena[dup].kind, InsnKind::Load { index: 1, .. }));
    }

    #[test]
    fn field_store_on_another_line_is_read_back() {
        let mut code = CodeBuilder::new();
        code.line(1);
        let value = code.iconst(0);
        let store = code.stmt(InsnKind::DupStore { value });
        let this = code.this();
        let dup = code.node(InsnKind::DupLoad { store });
        let put = code.stmt(InsnKind::PutField {
            index: 9,
            object: this,
            value: dup,
        });
        code.line(2);
        let dup = code.node(InsnKind::DupLoad { store });
        let ret = code.stmt(InsnKind::XReturn { value: dup });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [put, ret]);
        let InsnKind::GetField { index: 9, object } = code.arena[dup].kind else {
            panic!("expected a field read, got {}", code.arena.debug(&dup));
        };
        // The object is copied, not shared with the store.
        assert_ne!(object, this);
        assert!(matches!(code.arena[object].kind, InsnKind::Load { index: 0, .. }));
    }
}
