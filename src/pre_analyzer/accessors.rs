use crate::arena::{Arena, InsnId};
use crate::model::signature::parameter_descriptors;
use crate::model::{Accessor, ClassFile, InsnKind, InvokeKind, Method, PoolError, ValueType};

/// Whether `name` has the shape of a compiler-generated accessor, `access$` followed by digits.
pub fn is_accessor_name(name: &str) -> bool {
    name.strip_prefix("access$")
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

fn is_load(arena: &Arena, id: InsnId, slot: Option<u16>) -> bool {
    matches!(arena[id].kind, InsnKind::Load { index, .. } if slot.is_none_or(|slot| slot == index))
}

/// Whether the operands of a forwarded call are the accessor's parameters, each loaded once and in
/// declaration order.
fn forwards_parameters(
    arena: &Arena,
    object: Option<InsnId>,
    args: &[InsnId],
    parameter_count: usize,
) -> bool {
    if object.iter().count() + args.len() != parameter_count {
        return false;
    }
    let mut slot = 0;
    object.iter().chain(args).all(|operand| match arena[*operand].kind {
        InsnKind::Load { ty, index } if index == slot => {
            slot += if matches!(ty, ValueType::Long | ValueType::Double) { 2 } else { 1 };
            true
        }
        _ => false,
    })
}

fn is_dup_load_of(arena: &Arena, id: InsnId, store: InsnId) -> bool {
    matches!(arena[id].kind, InsnKind::DupLoad { store: s } if s == store)
}

/// Recognizes the body of a synthetic accessor method and returns the member it exposes.
pub fn analyze_accessor(class: &ClassFile, method: &Method) -> Result<Option<Accessor>, PoolError> {
    if !method.access_flags.is_static() || !is_accessor_name(class.method_name(method)?) {
        return Ok(None);
    }
    let Some(code) = &method.code else {
        return Ok(None);
    };
    let arena = &code.arena;
    let parameter_count = parameter_descriptors(class.method_descriptor(method)?).len();
    let forwards = |kind: &InsnKind| match *kind {
        InsnKind::Invoke {
            object, ref args, ..
        } => forwards_parameters(arena, object, args, parameter_count),
        _ => false,
    };
    let kinds: Vec<&InsnKind> = code.instructions.iter().map(|id| &arena[*id].kind).collect();

    let accessor = match kinds[..] {
        // return Outer.field;
        [InsnKind::XReturn { value }] => match arena[*value].kind {
            InsnKind::GetStatic { index } => Some(Accessor::GetStatic { index }),
            InsnKind::GetField { index, object } if is_load(arena, object, Some(0)) => {
                Some(Accessor::GetField { index })
            }
            ref call @ InsnKind::Invoke { kind, index, .. } if forwards(call) => {
                Some(Accessor::Invoke {
                    index,
                    is_static: kind == InvokeKind::Static,
                })
            }
            _ => None,
        },

        // Outer.field = arg0; return;
        [InsnKind::PutStatic { index, value }, InsnKind::Return]
            if is_load(arena, *value, Some(0)) =>
        {
            Some(Accessor::PutStatic { index: *index })
        }

        // arg0.field = arg1; return;
        [
            InsnKind::PutField {
                index,
                object,
                value,
            },
            InsnKind::Return,
        ] if is_load(arena, *object, Some(0)) && is_load(arena, *value, None) => {
            Some(Accessor::PutField { index: *index })
        }

        // arg0.method(args); return;
        [call @ InsnKind::Invoke { kind, index, .. }, InsnKind::Return] if forwards(call) => {
            Some(Accessor::Invoke {
                index: *index,
                is_static: *kind == InvokeKind::Static,
            })
        }
        [InsnKind::Pop { value }, InsnKind::Return] => match arena[*value].kind {
            ref call @ InsnKind::Invoke { kind, index, .. } if forwards(call) => {
                Some(Accessor::Invoke {
                    index,
                    is_static: kind == InvokeKind::Static,
                })
            }
            _ => None,
        },

        // Setters returning the assigned value:
        //     dup := arg; Outer.field = dup; return dup;
        [
            InsnKind::DupStore { value: stored },
            put,
            InsnKind::XReturn { value: returned },
        ] => {
            let store = code.instructions[0];
            if !is_load(arena, *stored, None) || !is_dup_load_of(arena, *returned, store) {
                None
            } else {
                match *put {
                    InsnKind::PutStatic { index, value } if is_dup_load_of(arena, value, store) => {
                        Some(Accessor::PutStatic { index })
                    }
                    InsnKind::PutField {
                        index,
                        object,
                        value,
                    } if is_load(arena, object, Some(0)) && is_dup_load_of(arena, value, store) => {
                        Some(Accessor::PutField { index })
                    }
                    _ => None,
                }
            }
        }

        _ => None,
    };
    Ok(accessor)
}
