use crate::arena::{Arena, InsnId};
use crate::model::{ClassFile, InsnKind, InvokeKind, Method, OuterThisField, PoolError};

/// What a single constructor says about the outer-this field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructorOuterThis {
    /// `this.f = arg1` precedes any `this(...)` call.
    Assigns(u16),
    /// Delegates to another constructor, which does the assignment instead.
    Delegates,
    Missing,
}

fn is_load(arena: &Arena, id: InsnId, slot: u16) -> bool {
    matches!(arena[id].kind, InsnKind::Load { index, .. } if index == slot)
}

/// Scans a constructor of an inner class for the store of the enclosing instance.
pub fn scan_constructor(
    class: &ClassFile,
    method: &Method,
) -> Result<ConstructorOuterThis, PoolError> {
    let Some(code) = &method.code else {
        return Ok(ConstructorOuterThis::Missing);
    };
    let class_name = class.name()?;
    let arena = &code.arena;
    for &stmt in &code.instructions {
        match arena[stmt].kind {
            InsnKind::PutField {
                index,
                object,
                value,
            } if is_load(arena, object, 0) && is_load(arena, value, 1) => {
                return Ok(ConstructorOuterThis::Assigns(index));
            }
            InsnKind::Invoke {
                kind: InvokeKind::Special,
                index,
                object: Some(object),
                ..
            } if is_load(arena, object, 0) => {
                let callee = class.constant_pool.member_ref(index)?;
                if callee.name == "<init>" && callee.class_name == class_name {
                    return Ok(ConstructorOuterThis::Delegates);
                }
            }
            _ => {}
        }
    }
    Ok(ConstructorOuterThis::Missing)
}

/// Combines the per-constructor results. Every constructor that doesn't delegate must assign the
/// same field of this class.
pub fn resolve_outer_this(
    class: &ClassFile,
    scans: impl IntoIterator<Item = ConstructorOuterThis>,
) -> Result<Option<OuterThisField>, PoolError> {
    let mut candidate = None;
    for scan in scans {
        match scan {
            ConstructorOuterThis::Assigns(index) => match candidate {
                None => candidate = Some(index),
                Some(other) if other == index => {}
                Some(_) => return Ok(None),
            },
            ConstructorOuterThis::Delegates => {}
            ConstructorOuterThis::Missing => return Ok(None),
        }
    }
    let Some(field_ref_index) = candidate else {
        return Ok(None);
    };

    let field_ref = class.constant_pool.member_ref(field_ref_index)?;
    if field_ref.class_name != class.name()? {
        return Ok(None);
    }
    Ok(class
        .find_field(field_ref.name, field_ref.descriptor)
        .map(|field| OuterThisField {
            field_ref_index,
            field,
        }))
}

/// The number of arguments an anonymous class constructor forwards to `super(...)`.
pub fn super_constructor_parameter_count(
    class: &ClassFile,
    method: &Method,
) -> Result<Option<usize>, PoolError> {
    let (Some(code), Some(super_name)) = (&method.code, class.super_name()?) else {
        return Ok(None);
    };
    let arena = &code.arena;
    for &stmt in &code.instructions {
        if let InsnKind::Invoke {
            kind: InvokeKind::Special,
            index,
            object: Some(object),
            ref args,
        } = arena[stmt].kind
            && is_load(arena, object, 0)
        {
            let callee = class.constant_pool.member_ref(index)?;
            if callee.name == "<init>" && callee.class_name == super_name {
                return Ok(Some(args.len()));
            }
        }
    }
    Ok(None)
}
