use crate::model::{
    AccessFlags, ClassFile, ConstantPool, InsnKind, LocalVariable, PoolError, ValueType,
    iterate::walk_list, signature,
};
use core::ops::ControlFlow;
use rustc_hash::FxHashSet;

/// Deterministic variable names derived from types: `paramInt`, `paramInt1`, `localString`, ...
#[derive(Default)]
pub struct NameGenerator {
    used: FxHashSet<String>,
}

impl NameGenerator {
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_owned());
    }

    pub fn generate(&mut self, prefix: &str, descriptor: &str) -> String {
        let base = format!("{prefix}{}", signature::type_base_name(descriptor));
        let mut name = base.clone();
        let mut counter = 1;
        while self.used.contains(&name) {
            name = format!("{base}{counter}");
            counter += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

fn descriptor_of(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Int => "I",
        ValueType::Long => "J",
        ValueType::Float => "F",
        ValueType::Double => "D",
        ValueType::Reference => "Ljava/lang/Object;",
        ValueType::Byte => "B",
        ValueType::Char => "C",
        ValueType::Short => "S",
        ValueType::Boolean => "Z",
    }
}

fn push_variable(
    pool: &mut ConstantPool,
    out: &mut Vec<LocalVariable>,
    index: u16,
    name: &str,
    descriptor: &str,
    length: u32,
) -> Result<(), PoolError> {
    out.push(LocalVariable {
        start_pc: 0,
        length,
        name_index: pool.add_utf8(name)?,
        signature_index: pool.add_utf8(descriptor)?,
        index,
        is_generic: false,
    });
    Ok(())
}

/// Synthesizes a local variable table for a method that lacks one. Synthetic and bridge methods
/// are never printed with their bodies, so they're skipped.
pub fn synthesize_local_variables(
    class: &mut ClassFile,
    method_index: usize,
) -> Result<(), PoolError> {
    let method = &class.methods[method_index];
    if method
        .access_flags
        .intersects(AccessFlags::SYNTHETIC | AccessFlags::BRIDGE)
    {
        return Ok(());
    }
    let has_table = match &method.code {
        Some(code) => code.local_variables.is_some(),
        None => method.local_variables.is_some(),
    };
    if has_table {
        return Ok(());
    }

    let is_static = method.access_flags.is_static();
    let descriptor = class.method_descriptor(method)?.to_owned();
    let this_descriptor = format!("L{};", class.name()?);

    // Reference-typed locals get a more precise type when the stored value reveals it.
    let mut locals: Vec<(u16, String)> = Vec::new();
    let mut length = 0;
    if let Some(code) = &method.code {
        let pool = &class.constant_pool;
        let mut seen = FxHashSet::default();
        let _ = walk_list::<()>(&code.arena, &code.instructions, &mut |_, insn| {
            length = length.max(insn.offset + 1);
            let (index, descriptor) = match insn.kind {
                InsnKind::Store { ty, index, value } => {
                    let descriptor = match code.arena[value].kind {
                        InsnKind::ExceptionLoad { class_index: 0 } => {
                            "Ljava/lang/Throwable;".to_owned()
                        }
                        InsnKind::ExceptionLoad { class_index }
                        | InsnKind::CheckCast { class_index, .. }
                        | InsnKind::New { class_index } => match pool.class_name(class_index) {
                            Ok(name) if name.starts_with('[') => name.to_owned(),
                            Ok(name) => format!("L{name};"),
                            Err(_) => descriptor_of(ty).to_owned(),
                        },
                        InsnKind::InvokeNew { index, .. } => match pool.member_ref(index) {
                            Ok(member) => format!("L{};", member.class_name),
                            Err(_) => descriptor_of(ty).to_owned(),
                        },
                        _ => descriptor_of(ty).to_owned(),
                    };
                    (index, descriptor)
                }
                InsnKind::IInc { index, .. } => (index, "I".to_owned()),
                _ => return ControlFlow::Continue(()),
            };
            if seen.insert(index) {
                locals.push((index, descriptor));
            }
            ControlFlow::Continue(())
        });
    }

    let pool = &mut class.constant_pool;
    let mut names = NameGenerator::default();
    names.reserve("this");
    let mut variables = Vec::new();
    let mut slot: u16 = 0;
    if !is_static {
        push_variable(pool, &mut variables, 0, "this", &this_descriptor, length)?;
        slot = 1;
    }
    for parameter in signature::parameter_descriptors(&descriptor) {
        let name = names.generate("param", parameter);
        push_variable(pool, &mut variables, slot, &name, parameter, length)?;
        slot += if matches!(parameter, "J" | "D") { 2 } else { 1 };
    }
    locals.sort_by_key(|(index, _)| *index);
    for (index, descriptor) in locals {
        if index < slot {
            continue;
        }
        let name = names.generate("local", &descriptor);
        push_variable(pool, &mut variables, index, &name, &descriptor, length)?;
    }

    let method = &mut class.methods[method_index];
    match &mut method.code {
        Some(code) => code.local_variables = Some(variables),
        None => method.local_variables = Some(variables),
    }
    Ok(())
}
