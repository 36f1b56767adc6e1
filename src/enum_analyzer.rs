// Enums carry compiler-generated members that aren't written in source:
//
// - `$VALUES` (javac) or `ENUM$VALUES` (Eclipse), initialized in `<clinit>` with an array literal of
//   all constants, or with a call to a synthetic `$values()` method returning one (newer javac);
// - `values()` and `valueOf(String)`.
//
// The array literal gives the declaration order of the constants. A `switch` over an enum in
// another class compiles to a lookup in a `$SwitchMap$...` table of a synthetic class, filled in its
// `<clinit>`; the tables are decoded here as well.

use crate::arena::{Arena, InsnId};
use crate::model::{AccessFlags, ClassFile, InsnKind, InvokeKind, PoolError};
use crate::pre_analyzer::{case_order, ordinal_stores};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

const SWITCH_MAP_PREFIX: &str = "$SwitchMap$";

pub fn analyze_enum(class: &mut ClassFile) -> Result<(), PoolError> {
    analyze_switch_maps(class)?;
    if class.is_enum() {
        analyze_values(class)?;
    }
    Ok(())
}

fn static_initializer(class: &ClassFile) -> Option<usize> {
    class.methods.iter().position(|method| {
        method.is_static_initializer(&class.constant_pool) && !method.contains_error
    })
}

fn analyze_switch_maps(class: &mut ClassFile) -> Result<(), PoolError> {
    let Some(clinit) = static_initializer(class) else {
        return Ok(());
    };
    let Some(code) = &class.methods[clinit].code else {
        return Ok(());
    };
    let class_name = class.name()?;
    let pool = &class.constant_pool;

    let mut maps: FxHashMap<u16, Vec<_>> = FxHashMap::default();
    for store in ordinal_stores(pool, &code.arena, &code.fast_nodes)? {
        let InsnKind::GetStatic { index } = code.arena[store.map].kind else {
            continue;
        };
        let field = pool.member_ref(index)?;
        if field.class_name == class_name && field.name.starts_with(SWITCH_MAP_PREFIX) {
            maps.entry(field.name_index).or_default().push(store);
        }
    }

    for (key, stores) in maps {
        let names = case_order(stores);
        let name = class.constant_pool.utf8(key)?;
        trace!("{name} maps {} enum constants", names.len());
        if let Some(field) = class
            .fields
            .iter()
            .position(|field| field.name_index == key || class.field_name(field).is_ok_and(|n| n == name))
        {
            class.fields[field].access_flags |= AccessFlags::SYNTHETIC;
        }
        class.switch_maps.insert(key, names);
    }
    Ok(())
}

fn analyze_values(class: &mut ClassFile) -> Result<(), PoolError> {
    let class_name = class.name()?.to_owned();
    let array_descriptor = format!("[L{class_name};");

    let Some(values_field) = ["$VALUES", "ENUM$VALUES"]
        .into_iter()
        .find_map(|name| class.find_field(name, &array_descriptor))
    else {
        return Ok(());
    };
    class.fields[values_field].access_flags |= AccessFlags::SYNTHETIC;

    // The initializer was either lifted into the field, or is still a store in `<clinit>`.
    let initializer = match class.fields[values_field].value_and_method {
        Some(value_and_method) => Some((value_and_method.method, value_and_method.value)),
        None => values_store(class, &class_name, values_field)?,
    };
    let Some((method, value)) = initializer else {
        return Ok(());
    };
    let Some(code) = &class.methods[method].code else {
        return Ok(());
    };

    let names = match code.arena[value].kind {
        InsnKind::Invoke {
            kind: InvokeKind::Static,
            index,
            ..
        } => {
            let callee = class.constant_pool.member_ref(index)?;
            if callee.class_name != class_name || callee.name != "$values" {
                return Ok(());
            }
            let Some(values_method) = class.find_method(callee.name, callee.descriptor) else {
                return Ok(());
            };
            class.methods[values_method].access_flags |= AccessFlags::SYNTHETIC;
            returned_constants(class, values_method)?
        }
        _ => array_constants(class, &code.arena, value)?,
    };
    let Some(names) = names else {
        return Ok(());
    };
    debug!("{class_name} declares {} enum constants", names.len());
    class.enum_values = Some(names);

    for (name, descriptor) in [
        ("values", format!("()[L{class_name};")),
        ("valueOf", format!("(Ljava/lang/String;)L{class_name};")),
    ] {
        if let Some(method) = class.find_method(name, &descriptor) {
            class.methods[method].access_flags |= AccessFlags::SYNTHETIC;
        }
    }
    Ok(())
}

/// Finds `$VALUES = value` in `<clinit>`.
fn values_store(
    class: &ClassFile,
    class_name: &str,
    field: usize,
) -> Result<Option<(usize, InsnId)>, PoolError> {
    let Some(clinit) = static_initializer(class) else {
        return Ok(None);
    };
    let Some(code) = &class.methods[clinit].code else {
        return Ok(None);
    };
    let field_name = class.field_name(&class.fields[field])?;
    for &stmt in &code.fast_nodes {
        if let InsnKind::PutStatic { index, value } = code.arena[stmt].kind {
            let target = class.constant_pool.member_ref(index)?;
            if target.class_name == class_name && target.name == field_name {
                return Ok(Some((clinit, value)));
            }
        }
    }
    Ok(None)
}

/// The constants of `return new E[] { A, B, ... }`, the body of `$values()`.
fn returned_constants(class: &ClassFile, method: usize) -> Result<Option<Vec<u16>>, PoolError> {
    let Some(code) = &class.methods[method].code else {
        return Ok(None);
    };
    for &stmt in &code.fast_nodes {
        if let InsnKind::XReturn { value } = code.arena[stmt].kind {
            return array_constants(class, &code.arena, value);
        }
    }
    Ok(None)
}

/// Name indices of the constants listed in `new E[] { E.A, E.B, ... }`.
fn array_constants(
    class: &ClassFile,
    arena: &Arena,
    value: InsnId,
) -> Result<Option<Vec<u16>>, PoolError> {
    let InsnKind::InitArray { ref values, .. } = arena[value].kind else {
        return Ok(None);
    };
    let mut names = Vec::with_capacity(values.len());
    for value in values {
        let InsnKind::GetStatic { index } = arena[*value].kind else {
            return Ok(None);
        };
        names.push(class.constant_pool.member_ref(index)?.name_index);
    }
    Ok(Some(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Code, ValueType};
    use crate::test_utils::{ClassBuilder, CodeBuilder};

    const ENUM: AccessFlags = AccessFlags::PUBLIC
        .union(AccessFlags::FINAL)
        .union(AccessFlags::ENUM);

    /// `new Color[] { RED, GREEN }`
    fn constants_array(builder: &mut ClassBuilder, code: &mut CodeBuilder) -> InsnId {
        let red = builder.own_field_ref("RED", "La/Color;");
        let green = builder.own_field_ref("GREEN", "La/Color;");
        let class_index = builder.pool().add_class("a/Color").unwrap();
        let length = code.iconst(2);
        let new_array = code.node(InsnKind::ANewArray {
            class_index,
            length,
        });
        let values = vec![
            code.node(InsnKind::GetStatic { index: red }),
            code.node(InsnKind::GetStatic { index: green }),
        ];
        code.node(InsnKind::InitArray { new_array, values })
    }

    fn color() -> ClassBuilder {
        let mut builder = ClassBuilder::new("a/Color")
            .super_class("java/lang/Enum")
            .access(ENUM);
        let constant = AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL;
        builder.field("RED", "La/Color;", constant);
        builder.field("GREEN", "La/Color;", constant);
        builder.field("$VALUES", "[La/Color;", AccessFlags::PRIVATE | AccessFlags::STATIC);
        builder.method("values", "()[La/Color;", AccessFlags::STATIC, None);
        builder.method(
            "valueOf",
            "(Ljava/lang/String;)La/Color;",
            AccessFlags::STATIC,
            None,
        );
        builder
    }

    fn reconstructed(code: CodeBuilder) -> Code {
        let mut code = code.build();
        code.fast_nodes = code.instructions.clone();
        code
    }

    fn constant_names(class: &ClassFile) -> Vec<&str> {
        class
            .enum_values
            .as_ref()
            .unwrap()
            .iter()
            .map(|index| class.constant_pool.utf8(*index).unwrap())
            .collect()
    }

    #[test]
    fn values_array_in_static_initializer() {
        let mut builder = color();
        let values = builder.own_field_ref("$VALUES", "[La/Color;");
        let mut code = CodeBuilder::new();
        let value = constants_array(&mut builder, &mut code);
        code.stmt(InsnKind::PutStatic {
            index: values,
            value,
        });
        code.stmt(InsnKind::Return);
        builder.method(
            "<clinit>",
            "()V",
            AccessFlags::STATIC,
            Some(reconstructed(code)),
        );
        let mut class = builder.build();

        analyze_enum(&mut class).unwrap();
        assert_eq!(constant_names(&class), ["RED", "GREEN"]);
        assert!(class.fields[2].access_flags.is_synthetic());
        assert!(class.methods[0].access_flags.is_synthetic());
        assert!(class.methods[1].access_flags.is_synthetic());
    }

    #[test]
    fn values_method() {
        let mut builder = color();
        let values = builder.own_field_ref("$VALUES", "[La/Color;");
        let values_method = builder
            .pool()
            .add_method_ref("a/Color", "$values", "()[La/Color;")
            .unwrap();

        let mut body = CodeBuilder::new();
        let array = constants_array(&mut builder, &mut body);
        body.stmt(InsnKind::XReturn { value: array });
        let method = builder.method(
            "$values",
            "()[La/Color;",
            AccessFlags::PRIVATE | AccessFlags::STATIC,
            Some(reconstructed(body)),
        );

        let mut code = CodeBuilder::new();
        let call = code.node(InsnKind::Invoke {
            kind: InvokeKind::Static,
            index: values_method,
            object: None,
            args: Vec::new(),
        });
        code.stmt(InsnKind::PutStatic {
            index: values,
            value: call,
        });
        code.stmt(InsnKind::Return);
        builder.method(
            "<clinit>",
            "()V",
            AccessFlags::STATIC,
            Some(reconstructed(code)),
        );
        let mut class = builder.build();

        analyze_enum(&mut class).unwrap();
        assert_eq!(constant_names(&class), ["RED", "GREEN"]);
        assert!(class.methods[method].access_flags.is_synthetic());
    }

    #[test]
    fn javac_switch_map() {
        let mut builder = ClassBuilder::new("a/Main$1").access(AccessFlags::SYNTHETIC);
        builder.field(
            "$SwitchMap$a$Color",
            "[I",
            AccessFlags::STATIC | AccessFlags::FINAL,
        );
        let map_ref = builder.own_field_ref("$SwitchMap$a$Color", "[I");
        let ordinal = builder
            .pool()
            .add_method_ref("a/Color", "ordinal", "()I")
            .unwrap();

        let mut code = CodeBuilder::new();
        for (constant, case) in [("GREEN", 2), ("RED", 1)] {
            let constant = builder
                .pool()
                .add_field_ref("a/Color", constant, "La/Color;")
                .unwrap();
            let array = code.node(InsnKind::GetStatic { index: map_ref });
            let object = code.node(InsnKind::GetStatic { index: constant });
            let index = code.node(InsnKind::Invoke {
                kind: InvokeKind::Virtual,
                index: ordinal,
                object: Some(object),
                args: Vec::new(),
            });
            let value = code.iconst(case);
            code.stmt(InsnKind::ArrayStore {
                ty: ValueType::Int,
                array,
                index,
                value,
            });
        }
        code.stmt(InsnKind::Return);
        builder.method(
            "<clinit>",
            "()V",
            AccessFlags::STATIC,
            Some(reconstructed(code)),
        );
        let mut class = builder.build();

        analyze_enum(&mut class).unwrap();
        let key = class.fields[0].name_index;
        let names: Vec<&str> = class.switch_maps[&key]
            .iter()
            .map(|index| class.constant_pool.utf8(*index).unwrap())
            .collect();
        assert_eq!(names, ["RED", "GREEN"]);
        assert!(class.fields[0].access_flags.is_synthetic());
        assert_eq!(class.enum_values, None);
    }
}
