// A local is declared by its first store in a block. Nested blocks see the declarations of their
// enclosing blocks but not of their siblings, so a slot reused by two loops is declared twice.

use crate::arena::{Arena, InsnId};
use crate::model::InsnKind;
use rustc_hash::FxHashSet;

pub fn declare_locals(arena: &mut Arena, list: &[InsnId], first_local: u16) {
    declare_in(arena, list, first_local, &mut FxHashSet::default());
}

fn declare_in(
    arena: &mut Arena,
    list: &[InsnId],
    first_local: u16,
    declared: &mut FxHashSet<u16>,
) {
    for &stmt in list {
        if declare(arena, stmt, first_local, declared) {
            continue;
        }
        match arena[stmt].kind {
            InsnKind::FastFor { init, ref body, .. } => {
                let body = body.clone();
                let mut scope = declared.clone();
                declare(arena, init, first_local, &mut scope);
                declare_in(arena, &body, first_local, &mut scope);
            }
            InsnKind::FastTry {
                ref body,
                ref catches,
                ref finally,
            } => {
                let body = body.clone();
                let finally = finally.clone();
                let catches: Vec<(u16, Vec<InsnId>)> = catches
                    .iter()
                    .map(|catch| (catch.local_index, catch.body.clone()))
                    .collect();
                declare_in(arena, &body, first_local, &mut declared.clone());
                for (local_index, body) in catches {
                    let mut scope = declared.clone();
                    scope.insert(local_index);
                    declare_in(arena, &body, first_local, &mut scope);
                }
                declare_in(arena, &finally, first_local, &mut declared.clone());
            }
            ref kind => {
                let bodies: Vec<Vec<InsnId>> = kind.bodies().into_iter().cloned().collect();
                for body in bodies {
                    declare_in(arena, &body, first_local, &mut declared.clone());
                }
            }
        }
    }
}

/// Turns `stmt` into a declaration if it is the first store to its slot.
fn declare(
    arena: &mut Arena,
    stmt: InsnId,
    first_local: u16,
    declared: &mut FxHashSet<u16>,
) -> bool {
    let InsnKind::Store { index, value, .. } = arena[stmt].kind else {
        return false;
    };
    if index < first_local || !declared.insert(index) {
        return false;
    }
    arena.replace_kind(
        stmt,
        InsnKind::FastDeclaration {
            index,
            value: Some(value),
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FastCatch, ValueType};
    use crate::test_utils::CodeBuilder;

    fn store(code: &mut CodeBuilder, index: u16) -> InsnId {
        let value = code.iconst(1);
        code.node(InsnKind::Store {
            ty: ValueType::Int,
            index,
            value,
        })
    }

    fn is_declaration(arena: &Arena, stmt: InsnId) -> bool {
        matches!(arena[stmt].kind, InsnKind::FastDeclaration { .. })
    }

    #[test]
    fn first_store_declares() {
        let mut code = CodeBuilder::new();
        let first = store(&mut code, 2);
        let second = store(&mut code, 2);
        let mut code = code.build();
        declare_locals(&mut code.arena, &[first, second], 1);
        assert!(is_declaration(&code.arena, first));
        assert!(!is_declaration(&code.arena, second));
    }

    #[test]
    fn sibling_blocks_declare_separately() {
        let mut code = CodeBuilder::new();
        let in_then = store(&mut code, 2);
        let in_else = store(&mut code, 2);
        let after = store(&mut code, 2);
        let condition = code.load(ValueType::Int, 0);
        let branch = code.node(InsnKind::FastIf {
            condition,
            then: vec![in_then],
            else_: vec![in_else],
        });
        let mut code = code.build();
        declare_locals(&mut code.arena, &[branch, after], 1);
        assert!(is_declaration(&code.arena, in_then));
        assert!(is_declaration(&code.arena, in_else));
        assert!(is_declaration(&code.arena, after));
    }

    #[test]
    fn catch_variable_is_declared_by_the_clause() {
        let mut code = CodeBuilder::new();
        let reassigned = store(&mut code, 3);
        let try_ = code.node(InsnKind::FastTry {
            body: Vec::new(),
            catches: vec![FastCatch {
                class_index: 7,
                local_index: 3,
                body: vec![reassigned],
            }],
            finally: Vec::new(),
        });
        let mut code = code.build();
        declare_locals(&mut code.arena, &[try_], 1);
        assert!(!is_declaration(&code.arena, reassigned));
    }
}
