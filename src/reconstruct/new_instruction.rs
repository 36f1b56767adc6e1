// `new C(args)` compiles to `new C; dup; args; invokespecial C.<init>`, which the list builder
// turns into
//
//     dup := new C
//     dup.<init>(args)
//     ... dup ...
//
// This pass merges the allocation and the constructor call into a single `InvokeNew`.

use super::{PassContext, Splice, dup_loads, is_dup_load_of};
use crate::MethodAnalysisError;
use crate::model::{Code, InsnKind, InvokeKind};
use tracing::trace;

pub fn reconstruct(cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        let stmt = fast_nodes[position];
        match arena[stmt].kind {
            // `new C(args)` whose result is dropped without a `dup`
            InsnKind::Invoke {
                kind: InvokeKind::Special,
                index,
                object: Some(object),
                ref args,
            } if matches!(arena[object].kind, InsnKind::New { .. }) => {
                if cx.pool().member_ref(index)?.name != "<init>" {
                    continue;
                }
                let args = args.clone();
                arena.replace_kind(stmt, InsnKind::InvokeNew { index, args });
            }

            InsnKind::DupStore { value } if matches!(arena[value].kind, InsnKind::New { .. }) => {
                let Some(init_position) = splice.next(position) else {
                    continue;
                };
                let init = fast_nodes[init_position];
                let InsnKind::Invoke {
                    kind: InvokeKind::Special,
                    index,
                    object: Some(object),
                    ref args,
                } = arena[init].kind
                else {
                    continue;
                };
                if !is_dup_load_of(arena, object, stmt)
                    || cx.pool().member_ref(index)?.name != "<init>"
                {
                    continue;
                }
                let new = InsnKind::InvokeNew {
                    index,
                    args: args.clone(),
                };
                splice.remove(init_position);

                let uses = dup_loads(arena, fast_nodes, &splice, stmt);
                match uses[..] {
                    // Used once: the use becomes the expression.
                    [(_, use_)] => {
                        arena.replace_kind(use_, new);
                        splice.remove(position);
                    }
                    // Never used: a statement on its own.
                    [] => {
                        arena.replace_kind(stmt, new);
                    }
                    // Used several times, e.g. by a chained assignment: keep the `dup`.
                    _ => {
                        arena.replace_kind(value, new);
                    }
                }
                trace!("Merged `new` at offset {}", arena[stmt].offset);
            }
            _ => {}
        }
    }

    splice.apply(fast_nodes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::run_in;
    use super::*;
    use crate::model::{ClassTable, ValueType};
    use crate::test_utils::{ClassBuilder, CodeBuilder};

    #[test]
    fn new_with_dup() {
        let mut builder = ClassBuilder::new("a/Factory");
        let list_class = builder.pool().add_class("java/util/ArrayList").unwrap();
        let init = builder
            .pool()
            .add_method_ref("java/util/ArrayList", "<init>", "(I)V")
            .unwrap();
        let mut classes = ClassTable::new();
        let class = classes.insert(builder.build(), None);

        let mut code = CodeBuilder::new();
        let new = code.node(InsnKind::New {
            class_index: list_class,
        });
        let store = code.stmt(InsnKind::DupStore { value: new });
        let object = code.node(InsnKind::DupLoad { store });
        let capacity = code.iconst(10);
        code.stmt(InsnKind::Invoke {
            kind: InvokeKind::Special,
            index: init,
            object: Some(object),
            args: vec![capacity],
        });
        let value = code.node(InsnKind::DupLoad { store });
        let assign = code.stmt(InsnKind::Store {
            ty: ValueType::Reference,
            index: 1,
            value,
        });
        let mut code = code.build();
        run_in(reconstruct, &mut classes, class, &mut code);

        assert_eq!(code.fast_nodes, [assign]);
        assert!(matches!(
            code.arena[value].kind,
            InsnKind::InvokeNew { index, ref args } if index == init && *args == [capacity]
        ));
    }

    #[test]
    fn super_calls_are_not_allocations() {
        let mut builder = ClassBuilder::new("a/Child");
        let init = builder
            .pool()
            .add_method_ref("java/lang/Object", "<init>", "()V")
            .unwrap();
        let mut classes = ClassTable::new();
        let class = classes.insert(builder.build(), None);

        let mut code = CodeBuilder::new();
        let this = code.this();
        let call = code.stmt(InsnKind::Invoke {
            kind: InvokeKind::Special,
            index: init,
            object: Some(this),
            args: Vec::new(),
        });
        let mut code = code.build();
        run_in(reconstruct, &mut classes, class, &mut code);
        assert_eq!(code.fast_nodes, [call]);
        assert!(matches!(code.arena[call].kind, InsnKind::Invoke { .. }));
    }
}
