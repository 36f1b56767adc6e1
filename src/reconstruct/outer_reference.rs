// Nested classes reach private members of each other through synthetic `access$NNN` methods and
// reach the enclosing instance through a synthetic `this$N` field. Both are folded back here:
//
//     Outer.access$000(this.this$0)     ->  Outer.this.secret
//     Outer.access$102(this.this$0, 5)  ->  Outer.this.counter = 5

use super::{PassContext, Splice};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{
    AssignOp, Accessor, ClassId, Code, InsnKind, InvokeKind, PoolError, iterate::post_order,
};
use tracing::trace;

pub fn reconstruct(cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;

    drop_outer_this_store(cx, arena, fast_nodes);

    // Setters called for their side effect become plain stores.
    for &stmt in fast_nodes.iter() {
        let call = match arena[stmt].kind {
            InsnKind::Pop { value } => value,
            InsnKind::Invoke { .. } => stmt,
            _ => continue,
        };
        let Some((accessor, owner)) = resolve_accessor(cx, arena, call)? else {
            continue;
        };
        let InsnKind::Invoke { ref args, .. } = arena[call].kind else {
            continue;
        };
        let kind = match (accessor, &args[..]) {
            (Accessor::PutStatic { index }, [value]) => InsnKind::PutStatic {
                index: import_member(cx, owner, index, false)?,
                value: *value,
            },
            (Accessor::PutField { index }, [object, value]) => InsnKind::PutField {
                index: import_member(cx, owner, index, false)?,
                object: *object,
                value: *value,
            },
            _ => continue,
        };
        trace!("Inlined setter accessor at offset {}", arena[stmt].offset);
        arena.replace_kind(stmt, kind);
    }

    for id in post_order(arena, fast_nodes) {
        rewrite_node(cx, arena, id)?;
    }
    Ok(())
}

/// Inner class constructors start by storing the enclosing instance, which isn't source code.
fn drop_outer_this_store(cx: &PassContext<'_>, arena: &Arena, list: &mut Vec<InsnId>) {
    let Some(outer_this) = cx.class().outer_this_field else {
        return;
    };
    if !cx.is_constructor() {
        return;
    }
    let mut splice = Splice::new(list);
    if let Some(position) = list.iter().position(|stmt| {
        matches!(
            arena[*stmt].kind,
            InsnKind::PutField { index, object, value }
                if index == outer_this.field_ref_index
                    && matches!(arena[object].kind, InsnKind::Load { index: 0, .. })
                    && matches!(arena[value].kind, InsnKind::Load { index: 1, .. })
        )
    }) {
        splice.remove(position);
    }
    splice.apply(list);
}

fn rewrite_node(
    cx: &mut PassContext<'_>,
    arena: &mut Arena,
    id: InsnId,
) -> Result<(), PoolError> {
    match arena[id].kind {
        InsnKind::Invoke {
            kind: InvokeKind::Static,
            ..
        } => {
            if let Some((accessor, owner)) = resolve_accessor(cx, arena, id)? {
                inline_accessor(cx, arena, id, accessor, owner)?;
            }
        }
        InsnKind::GetField { index, object } => {
            if let Some(class_index) = outer_this_read(cx, arena, index, object)? {
                trace!("Found an outer-this reference at offset {}", arena[id].offset);
                arena.replace_kind(id, InsnKind::OuterThis { class_index });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Finds the accessor a static call targets, along with the class declaring it.
fn resolve_accessor(
    cx: &PassContext<'_>,
    arena: &Arena,
    call: InsnId,
) -> Result<Option<(Accessor, ClassId)>, PoolError> {
    let InsnKind::Invoke {
        kind: InvokeKind::Static,
        index,
        ..
    } = arena[call].kind
    else {
        return Ok(None);
    };
    let member = cx.pool().member_ref(index)?;
    if !crate::pre_analyzer::is_accessor_name(member.name) {
        return Ok(None);
    }
    let Some(owner) = cx.classes.find_by_name(member.class_name) else {
        return Ok(None);
    };
    let owner_class = &cx.classes[owner];
    let Some(method) = owner_class.find_method(member.name, member.descriptor) else {
        return Ok(None);
    };
    Ok(owner_class
        .accessors
        .get(&method)
        .map(|accessor| (*accessor, owner)))
}

/// Re-creates a member reference of `owner`'s pool in the pool of the class being rewritten.
fn import_member(
    cx: &mut PassContext<'_>,
    owner: ClassId,
    index: u16,
    is_method: bool,
) -> Result<u16, PoolError> {
    if owner == cx.class {
        return Ok(index);
    }
    let member = cx.classes[owner].constant_pool.member_ref(index)?;
    let (class_name, name, descriptor) = (
        member.class_name.to_owned(),
        member.name.to_owned(),
        member.descriptor.to_owned(),
    );
    if is_method {
        cx.pool_mut().add_method_ref(&class_name, &name, &descriptor)
    } else {
        cx.pool_mut().add_field_ref(&class_name, &name, &descriptor)
    }
}

fn inline_accessor(
    cx: &mut PassContext<'_>,
    arena: &mut Arena,
    id: InsnId,
    accessor: Accessor,
    owner: ClassId,
) -> Result<(), PoolError> {
    let InsnKind::Invoke { ref args, .. } = arena[id].kind else {
        return Ok(());
    };
    let args = args.clone();
    let kind = match (accessor, &args[..]) {
        (Accessor::GetStatic { index }, []) => InsnKind::GetStatic {
            index: import_member(cx, owner, index, false)?,
        },
        (Accessor::GetField { index }, [object]) => InsnKind::GetField {
            index: import_member(cx, owner, index, false)?,
            object: *object,
        },
        (Accessor::PutStatic { index }, [value]) => {
            let index = import_member(cx, owner, index, false)?;
            InsnKind::Assignment {
                op: AssignOp::Assign,
                target: arena.alloc_at(id, InsnKind::GetStatic { index }),
                value: *value,
            }
        }
        (Accessor::PutField { index }, [object, value]) => {
            let index = import_member(cx, owner, index, false)?;
            InsnKind::Assignment {
                op: AssignOp::Assign,
                target: arena.alloc_at(
                    id,
                    InsnKind::GetField {
                        index,
                        object: *object,
                    },
                ),
                value: *value,
            }
        }
        (
            Accessor::Invoke {
                index,
                is_static: true,
            },
            _,
        ) => InsnKind::Invoke {
            kind: InvokeKind::Static,
            index: import_member(cx, owner, index, true)?,
            object: None,
            args: args.clone(),
        },
        (
            Accessor::Invoke {
                index,
                is_static: false,
            },
            [object, rest @ ..],
        ) => InsnKind::Invoke {
            kind: InvokeKind::Virtual,
            index: import_member(cx, owner, index, true)?,
            object: Some(*object),
            args: rest.to_vec(),
        },
        _ => return Ok(()),
    };
    trace!("Inlined accessor call at offset {}", arena[id].offset);
    arena.replace_kind(id, kind);
    Ok(())
}

/// If `object.field` reads the enclosing instance, returns the class constant of the enclosing
/// class. `object` is either `this` or an already rewritten `Outer.this`, which handles chains
/// like `this.this$1.this$0`.
fn outer_this_read(
    cx: &mut PassContext<'_>,
    arena: &Arena,
    field: u16,
    object: InsnId,
) -> Result<Option<u16>, PoolError> {
    let holder = match arena[object].kind {
        InsnKind::Load { index: 0, .. } => cx.class,
        InsnKind::OuterThis { class_index } => {
            let name = cx.pool().class_name(class_index)?;
            match cx.classes.find_by_name(name) {
                Some(holder) => holder,
                None => return Ok(None),
            }
        }
        _ => return Ok(None),
    };

    let holder_class = &cx.classes[holder];
    let (Some(outer_this), Some(outer)) = (holder_class.outer_this_field, holder_class.outer_class)
    else {
        return Ok(None);
    };
    let member = cx.pool().member_ref(field)?;
    let declared = holder_class.field_name(&holder_class.fields[outer_this.field])?;
    if member.class_name != holder_class.name()? || member.name != declared {
        return Ok(None);
    }
    let outer_name = cx.classes[outer].name()?.to_owned();
    cx.pool_mut().add_class(&outer_name).map(Some)
}
