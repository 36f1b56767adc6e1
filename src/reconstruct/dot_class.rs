// Before Java 5, `Foo.class` compiled to a call to a synthetic `class$(String)` helper that wraps
// `Class.forName`, with the result cached in a synthetic static field:
//
//     if (class$Foo == null) { dup := class$("Foo"); class$Foo = dup; push dup; goto L }
//     L: ... (class$Foo or dup) ...
//
// The cached form is six statements long; the operand left across the `goto` is the
// `TernaryOpStore`, and the node at its `second_value_offset` in the following statement is the
// cache read. Some compilers call the helper directly, without a cache.

use super::{PassContext, Splice, is_dup_load_of};
use crate::MethodAnalysisError;
use crate::arena::{Arena, InsnId};
use crate::model::{
    AccessFlags, Code, InsnKind, InvokeKind, PoolError, ValueType,
    iterate::{find, post_order},
};
use tracing::trace;

const HELPER_DESCRIPTOR: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

pub fn reconstruct(cx: &mut PassContext<'_>, code: &mut Code) -> Result<(), MethodAnalysisError> {
    let Code {
        arena, fast_nodes, ..
    } = code;
    let mut splice = Splice::new(fast_nodes);

    for position in (0..fast_nodes.len()).rev() {
        if splice.is_live(position) {
            fold_cached(cx, arena, fast_nodes, &mut splice, position)?;
        }
    }
    splice.apply(fast_nodes);

    for id in post_order(arena, fast_nodes) {
        let InsnKind::Invoke {
            kind: InvokeKind::Static,
            index,
            ref args,
            ..
        } = arena[id].kind
        else {
            continue;
        };
        if !is_helper(cx, index)? {
            continue;
        }
        let Some(name) = class_name_argument(cx, arena, args)? else {
            continue;
        };
        let kind = class_literal(cx, arena, id, &name)?;
        arena.replace_kind(id, kind);
        mark_synthetic(cx, index, true)?;
        trace!("Found an uncached class literal of `{name}`");
    }
    Ok(())
}

fn fold_cached(
    cx: &mut PassContext<'_>,
    arena: &mut Arena,
    list: &[InsnId],
    splice: &mut Splice,
    position: usize,
) -> Result<(), MethodAnalysisError> {
    let InsnKind::IfNull { value: test, .. } = arena[list[position]].kind else {
        return Ok(());
    };
    let InsnKind::GetStatic { index: cache } = arena[test].kind else {
        return Ok(());
    };

    let mut positions = [position; 6];
    for k in 1..positions.len() {
        let Some(next) = splice.next(positions[k - 1]) else {
            return Ok(());
        };
        positions[k] = next;
    }
    let [_, store_position, put_position, ternary_position, goto_position, use_position] =
        positions;

    let store = list[store_position];
    let InsnKind::DupStore { value: call } = arena[store].kind else {
        return Ok(());
    };
    let InsnKind::Invoke {
        kind: InvokeKind::Static,
        index: helper,
        ref args,
        ..
    } = arena[call].kind
    else {
        return Ok(());
    };
    if !is_helper(cx, helper)? {
        return Ok(());
    }
    let Some(name) = class_name_argument(cx, arena, args)? else {
        return Ok(());
    };

    if !matches!(
        arena[list[put_position]].kind,
        InsnKind::PutStatic { index, value } if index == cache && is_dup_load_of(arena, value, store)
    ) {
        return Ok(());
    }
    let InsnKind::TernaryOpStore {
        value,
        second_value_offset,
    } = arena[list[ternary_position]].kind
    else {
        return Ok(());
    };
    if !is_dup_load_of(arena, value, store)
        || !matches!(arena[list[goto_position]].kind, InsnKind::Goto { .. })
    {
        return Ok(());
    }

    let Some(read) = find(arena, list[use_position], |insn| {
        insn.offset == second_value_offset
            && matches!(insn.kind, InsnKind::GetStatic { index } if index == cache)
    }) else {
        return Err(MethodAnalysisError::Invariant(
            "class literal cache is not read after its guard",
        ));
    };

    let kind = class_literal(cx, arena, read, &name)?;
    arena.replace_kind(read, kind);
    for removed in &positions[..5] {
        splice.remove(*removed);
    }
    mark_synthetic(cx, cache, false)?;
    mark_synthetic(cx, helper, true)?;
    trace!("Found a class literal of `{name}`");
    Ok(())
}

fn is_helper(cx: &PassContext<'_>, index: u16) -> Result<bool, PoolError> {
    let member = cx.pool().member_ref(index)?;
    Ok(member.name == "class$" && member.descriptor == HELPER_DESCRIPTOR)
}

fn class_name_argument(
    cx: &PassContext<'_>,
    arena: &Arena,
    args: &[InsnId],
) -> Result<Option<String>, PoolError> {
    let [arg] = args else {
        return Ok(None);
    };
    let InsnKind::Ldc { index } = arena[*arg].kind else {
        return Ok(None);
    };
    Ok(cx.pool().string(index)?.map(str::to_owned))
}

/// Builds the expression for `name.class`, with `name` in `Class.forName` syntax. There's no
/// class constant syntax for arrays in old class files, so those are rendered as
/// `new T[0].getClass()`.
fn class_literal(
    cx: &mut PassContext<'_>,
    arena: &mut Arena,
    at: InsnId,
    name: &str,
) -> Result<InsnKind, PoolError> {
    let internal_name = name.replace('.', "/");
    let Some(element) = internal_name.strip_prefix('[') else {
        return Ok(InsnKind::Ldc {
            index: cx.pool_mut().add_class(&internal_name)?,
        });
    };

    let length = arena.alloc_at(at, InsnKind::IConst(0));
    let new_array = if element.len() == 1 {
        InsnKind::NewArray {
            ty: ValueType::from_descriptor(element),
            length,
        }
    } else {
        let element_class = element
            .strip_prefix('L')
            .and_then(|element| element.strip_suffix(';'))
            .unwrap_or(element);
        InsnKind::ANewArray {
            class_index: cx.pool_mut().add_class(element_class)?,
            length,
        }
    };
    let object = arena.alloc_at(at, new_array);
    Ok(InsnKind::Invoke {
        kind: InvokeKind::Virtual,
        index: cx.pool_mut().add_method_ref(
            "java/lang/Object",
            "getClass",
            "()Ljava/lang/Class;",
        )?,
        object: Some(object),
        args: Vec::new(),
    })
}

/// Flags the cache field or the helper as synthetic on the class declaring it, which is either the
/// current class or one of its enclosing classes.
fn mark_synthetic(cx: &mut PassContext<'_>, index: u16, is_method: bool) -> Result<(), PoolError> {
    let member = cx.pool().member_ref(index)?;
    let (class_name, name, descriptor) = (
        member.class_name.to_owned(),
        member.name.to_owned(),
        member.descriptor.to_owned(),
    );
    let Some(owner) = cx
        .classes
        .find_in_outer_chain(cx.class, &class_name)
        .or_else(|| cx.classes.find_by_name(&class_name))
    else {
        return Ok(());
    };
    let owner = &mut cx.classes[owner];
    if is_method {
        if let Some(method) = owner.find_method(&name, &descriptor) {
            owner.methods[method].access_flags |= AccessFlags::SYNTHETIC;
        }
    } else if let Some(field) = owner.find_field(&name, &descriptor) {
        owner.fields[field].access_flags |= AccessFlags::SYNTHETIC;
    }
    Ok(())
}
