// Field initializers are compiled into every constructor, right after the `super(...)` call, and
// into `<clinit>` for static fields. They are lifted back into the field declarations when it's
// unambiguous:
//
// - instance fields: every constructor that calls `super(...)` starts with the same run of
//   `this.f = value` stores, with values that don't depend on constructor parameters. Constructors
//   delegating to `this(...)` don't repeat the initializers and are ignored. Only the common
//   prefix is lifted; if a single constructor disagrees on the first store, nothing is.
// - static fields: the leading run of `C.f = value` stores of `<clinit>`.
//
// Values stay in the arena of the method they were found in, which `ValueAndMethod` records.

use crate::arena::{Arena, InsnId};
use crate::model::{
    ClassFile, InsnKind, InvokeKind, PoolError, ValueAndMethod,
    equality::compare_across, iterate::contains,
};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// A `this.f = value` or `C.f = value` store that can become an initializer.
#[derive(Clone, Copy, Debug)]
struct Initializer {
    field: usize,
    value: InsnId,
}

pub fn reconstruct_instance_field_initializers(class: &mut ClassFile) -> Result<(), PoolError> {
    let class_name = class.name()?.to_owned();

    // (method index, position of the first statement after `super(...)`, candidate stores, arena)
    let mut constructors = Vec::new();
    for (index, method) in class.methods.iter().enumerate() {
        if !method.is_constructor(&class.constant_pool)
            || method.access_flags.is_synthetic()
            || method.contains_error
        {
            continue;
        }
        let Some(code) = &method.code else {
            continue;
        };
        let Some((position, callee)) = constructor_call(class, &code.arena, &code.fast_nodes)?
        else {
            // Can't tell where the initializers start.
            return Ok(());
        };
        if callee == class_name {
            continue;
        }
        let run = instance_run(class, &class_name, &code.arena, &code.fast_nodes[position..])?;
        constructors.push((index, position, run, &code.arena));
    }

    let Some(((first, _, first_run, first_arena), rest)) = constructors.split_first() else {
        return Ok(());
    };
    let mut common = first_run.len();
    for (_, _, run, arena) in rest {
        common = common.min(
            first_run
                .iter()
                .zip(run)
                .take_while(|(x, y)| {
                    x.field == y.field && compare_across(first_arena, x.value, arena, y.value)
                })
                .count(),
        );
    }
    if common == 0 {
        return Ok(());
    }

    debug!("Lifting {common} instance field initializers of {class_name}");
    let first = *first;
    let lifted = first_run[..common].to_vec();
    let edits: Vec<(usize, usize)> = constructors
        .iter()
        .map(|(method, position, ..)| (*method, *position))
        .collect();
    for initializer in lifted {
        class.fields[initializer.field].value_and_method = Some(ValueAndMethod {
            value: initializer.value,
            method: first,
        });
    }
    for (method, position) in edits {
        if let Some(code) = &mut class.methods[method].code {
            code.fast_nodes.drain(position..position + common);
        }
    }
    Ok(())
}

pub fn reconstruct_static_field_initializers(class: &mut ClassFile) -> Result<(), PoolError> {
    let Some(method) = class.methods.iter().position(|method| {
        method.is_static_initializer(&class.constant_pool) && !method.contains_error
    }) else {
        return Ok(());
    };
    let class_name = class.name()?.to_owned();
    let Some(code) = &class.methods[method].code else {
        return Ok(());
    };

    let mut seen = FxHashSet::default();
    let mut run = Vec::new();
    for &stmt in &code.fast_nodes {
        let InsnKind::PutStatic { index, value } = code.arena[stmt].kind else {
            break;
        };
        let Some(field) = own_field(class, &class_name, index)? else {
            break;
        };
        if class.fields[field].constant_value_index.is_some()
            || !class.fields[field].access_flags.is_static()
            || !seen.insert(field)
            || depends_on_locals(&code.arena, value)
        {
            break;
        }
        run.push(Initializer { field, value });
    }
    if run.is_empty() {
        return Ok(());
    }

    debug!("Lifting {} static field initializers of {class_name}", run.len());
    for initializer in &run {
        trace!("Lifting the initializer of field {}", initializer.field);
        class.fields[initializer.field].value_and_method = Some(ValueAndMethod {
            value: initializer.value,
            method,
        });
    }
    if let Some(code) = &mut class.methods[method].code {
        code.fast_nodes.drain(..run.len());
    }
    Ok(())
}

/// Finds the `super(...)` or `this(...)` call of a constructor. Returns the position after it and
/// the name of the class whose constructor is called.
fn constructor_call(
    class: &ClassFile,
    arena: &Arena,
    list: &[InsnId],
) -> Result<Option<(usize, String)>, PoolError> {
    for (position, &stmt) in list.iter().enumerate() {
        if let InsnKind::Invoke {
            kind: InvokeKind::Special,
            index,
            object: Some(object),
            ..
        } = arena[stmt].kind
            && matches!(arena[object].kind, InsnKind::Load { index: 0, .. })
        {
            let callee = class.constant_pool.member_ref(index)?;
            if callee.name == "<init>" {
                return Ok(Some((position + 1, callee.class_name.to_owned())));
            }
        }
    }
    Ok(None)
}

/// The leading `this.f = value` stores of `list` that can be lifted.
fn instance_run(
    class: &ClassFile,
    class_name: &str,
    arena: &Arena,
    list: &[InsnId],
) -> Result<Vec<Initializer>, PoolError> {
    let mut seen = FxHashSet::default();
    let mut run = Vec::new();
    for &stmt in list {
        let InsnKind::PutField {
            index,
            object,
            value,
        } = arena[stmt].kind
        else {
            break;
        };
        if !matches!(arena[object].kind, InsnKind::Load { index: 0, .. }) {
            break;
        }
        let Some(field) = own_field(class, class_name, index)? else {
            break;
        };
        if class.fields[field].access_flags.is_static()
            || !seen.insert(field)
            || depends_on_locals(arena, value)
        {
            break;
        }
        run.push(Initializer { field, value });
    }
    Ok(run)
}

/// The field of this class a `Fieldref` points to.
fn own_field(class: &ClassFile, class_name: &str, index: u16) -> Result<Option<usize>, PoolError> {
    let field_ref = class.constant_pool.member_ref(index)?;
    if field_ref.class_name != class_name {
        return Ok(None);
    }
    Ok(class.find_field(field_ref.name, field_ref.descriptor))
}

/// Whether `value` reads anything but `this`: parameters, locals or stack values shared with other
/// statements.
fn depends_on_locals(arena: &Arena, value: InsnId) -> bool {
    contains(arena, value, |insn| match insn.kind {
        InsnKind::Load { index, .. } => index != 0,
        InsnKind::DupLoad { .. } | InsnKind::ExceptionLoad { .. } | InsnKind::IInc { .. } => true,
        InsnKind::Inc { .. } | InsnKind::Assignment { .. } => true,
        _ => false,
    })
}
