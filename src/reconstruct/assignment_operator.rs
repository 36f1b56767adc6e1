// `x = x op y` back to `x op= y`, for locals, static and instance fields and array elements, both
// as statements and as values of chained assignments. For fields and array elements the object or
// array reference is often evaluated once and `dup`ed; that `dup` is folded into the target.

use super::{PassContext, Splice, inline_single_use_dups, reads_stored_location, stored_value};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{AssignOp, BinOp, Code, InsnKind, equality, iterate::post_order};
use tracing::trace;

pub fn reconstruct(_cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if !splice.is_live(position) {
            continue;
        }
        let stmt = fast_nodes[position];
        let Some(value) = stored_value(&arena[stmt].kind) else {
            continue;
        };
        let Some((op, lhs, rhs)) = compound_operands(arena, value) else {
            continue;
        };
        if !reads_stored_location(arena, &arena[stmt].kind, lhs) {
            continue;
        }
        arena.replace_kind(
            stmt,
            InsnKind::Assignment {
                op: AssignOp::Compound(op),
                target: lhs,
                value: rhs,
            },
        );
        inline_single_use_dups(arena, fast_nodes, &mut splice, lhs);
        trace!("Folded `{}=` at offset {}", op, arena[stmt].offset);
    }
    splice.apply(fast_nodes);

    // `a = (b = b + 1)` nested in another expression.
    for id in post_order(arena, fast_nodes) {
        let InsnKind::Assignment {
            op: AssignOp::Assign,
            target,
            value,
        } = arena[id].kind
        else {
            continue;
        };
        let Some((op, lhs, rhs)) = compound_operands(arena, value) else {
            continue;
        };
        if equality::compare(arena, target, lhs) {
            arena.replace_kind(
                id,
                InsnKind::Assignment {
                    op: AssignOp::Compound(op),
                    target,
                    value: rhs,
                },
            );
        }
    }
    Ok(())
}

/// `lhs op rhs` where `op` has a compound assignment form.
fn compound_operands(arena: &Arena, value: InsnId) -> Option<(BinOp, InsnId, InsnId)> {
    match arena[value].kind {
        InsnKind::BinaryOp { op, lhs, rhs } if op.has_compound_form() => Some((op, lhs, rhs)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::run_alone;
    use super::*;
    use crate::model::ValueType;
    use crate::test_utils::CodeBuilder;

    #[test]
    fn field_compound_assignment() {
        let mut code = CodeBuilder::new();
        let object = code.load(ValueType::Reference, 1);
        let get_object = code.load(ValueType::Reference, 1);
        let get = code.node(InsnKind::GetField {
            index: 4,
            object: get_object,
        });
        let k = code.iconst(3);
        let sum = code.node(InsnKind::BinaryOp {
            op: BinOp::Add,
            lhs: get,
            rhs: k,
        });
        let put = code.stmt(InsnKind::PutField {
            index: 4,
            object,
            value: sum,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [put]);
        let InsnKind::Assignment {
            op: AssignOp::Compound(BinOp::Add),
            target,
            value,
        } = code.arena[put].kind
        else {
            panic!("expected `+=`, got {}", code.arena.debug(&put));
        };
        assert_eq!(value, k);
        assert!(equality::compare(&code.arena, target, get));
    }

    #[test]
    fn duplicated_array_reference_is_inlined() {
        // a[i] *= 2, with `a` and `i` evaluated once
        let mut code = CodeBuilder::new();
        let array = code.load(ValueType::Reference, 1);
        let array_store = code.stmt(InsnKind::DupStore { value: array });
        let index = code.load(ValueType::Int, 2);
        let index_store = code.stmt(InsnKind::DupStore { value: index });
        let array_dup = code.node(InsnKind::DupLoad { store: array_store });
        let index_dup = code.node(InsnKind::DupLoad { store: index_store });
        let get_array = code.node(InsnKind::DupLoad { store: array_store });
        let get_index = code.node(InsnKind::DupLoad { store: index_store });
        let get = code.node(InsnKind::ArrayLoad {
            ty: ValueType::Int,
            array: get_array,
            index: get_index,
        });
        let two = code.iconst(2);
        let product = code.node(InsnKind::BinaryOp {
            op: BinOp::Mul,
            lhs: get,
            rhs: two,
        });
        let put = code.stmt(InsnKind::ArrayStore {
            ty: ValueType::Int,
            array: array_dup,
            index: index_dup,
            value: product,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);

        assert_eq!(code.fast_nodes, [put]);
        assert!(matches!(
            code.arena[put].kind,
            InsnKind::Assignment {
                op: AssignOp::Compound(BinOp::Mul),
                target,
                ..
            } if target == get
        ));
        assert!(matches!(code.arena[get_array].kind, InsnKind::Load { index: 1, .. }));
        assert!(matches!(code.arena[get_index].kind, InsnKind::Load { index: 2, .. }));
    }

    #[test]
    fn other_locations_are_kept() {
        let mut code = CodeBuilder::new();
        let other = code.load(ValueType::Int, 2);
        let one = code.iconst(1);
        let sum = code.node(InsnKind::BinaryOp {
            op: BinOp::Add,
            lhs: other,
            rhs: one,
        });
        let store = code.stmt(InsnKind::Store {
            ty: ValueType::Int,
            index: 1,
            value: sum,
        });
        let mut code = code.build();
        run_alone(reconstruct, &mut code);
        assert!(matches!(code.arena[store].kind, InsnKind::Store { .. }));
    }
}
