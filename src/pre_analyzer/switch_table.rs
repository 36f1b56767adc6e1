// Enum switches compile to an `int[]` indexed by `ordinal()`. The table is filled by a run of
//
//     try { map[E.X.ordinal()] = n; } catch (NoSuchFieldError e) {}
//
// blocks, where `n` is the dense case label used by the `tableswitch`. javac stores the table in a
// `$SwitchMap$...` field of a synthetic class, Eclipse and d8 lazily fill it in a static synthetic
// `()[I` method. Both are recognized through the same store scanner.

use crate::arena::{Arena, InsnId};
use crate::model::{
    ClassFile, ConstantPool, InsnKind, InvokeKind, Method, PoolError, iterate::walk_list,
};
use core::ops::ControlFlow;

/// One `map[E.X.ordinal()] = case` store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrdinalStore {
    /// The array expression being filled.
    pub map: InsnId,
    /// Name index of the enum constant `X`, as referenced by the `getstatic`.
    pub constant_name_index: u16,
    pub case: i32,
}

fn ordinal_store(
    pool: &ConstantPool,
    arena: &Arena,
    id: InsnId,
) -> Result<Option<OrdinalStore>, PoolError> {
    let InsnKind::ArrayStore {
        array,
        index,
        value,
        ..
    } = arena[id].kind
    else {
        return Ok(None);
    };
    let InsnKind::IConst(case) = arena[value].kind else {
        return Ok(None);
    };
    let InsnKind::Invoke {
        kind: InvokeKind::Virtual,
        index: method,
        object: Some(object),
        ref args,
    } = arena[index].kind
    else {
        return Ok(None);
    };
    let InsnKind::GetStatic { index: constant } = arena[object].kind else {
        return Ok(None);
    };
    if !args.is_empty() {
        return Ok(None);
    }
    let method = pool.member_ref(method)?;
    if method.name != "ordinal" || method.descriptor != "()I" {
        return Ok(None);
    }
    Ok(Some(OrdinalStore {
        map: array,
        constant_name_index: pool.member_ref(constant)?.name_index,
        case,
    }))
}

/// Collects every ordinal store in `list`, including the ones nested in other statements.
pub fn ordinal_stores(
    pool: &ConstantPool,
    arena: &Arena,
    list: &[InsnId],
) -> Result<Vec<OrdinalStore>, PoolError> {
    let mut out = Vec::new();
    let result = walk_list(arena, list, &mut |id, _| match ordinal_store(pool, arena, id) {
        Ok(Some(store)) => {
            out.push(store);
            ControlFlow::Continue(())
        }
        Ok(None) => ControlFlow::Continue(()),
        Err(error) => ControlFlow::Break(error),
    });
    match result {
        ControlFlow::Continue(()) => Ok(out),
        ControlFlow::Break(error) => Err(error),
    }
}

/// Orders the enum constants of a switch map by their case label.
pub fn case_order(stores: impl IntoIterator<Item = OrdinalStore>) -> Vec<u16> {
    let mut cases: Vec<(i32, u16)> = stores
        .into_iter()
        .map(|store| (store.case, store.constant_name_index))
        .collect();
    cases.sort_by_key(|(case, _)| *case);
    cases.dedup_by_key(|(case, _)| *case);
    cases.into_iter().map(|(_, name)| name).collect()
}

/// Whether `name` is the name of an Eclipse (`$SWITCH_TABLE$pkg$E`) or d8
/// (`-getpkg-ESwitchesValues`) switch table method.
pub fn is_switch_table_name(name: &str) -> bool {
    name.starts_with("$SWITCH_TABLE$")
        || (name.starts_with("-get") && name.ends_with("SwitchesValues"))
}

/// Recovers the switch map computed by an Eclipse/d8 switch table method. Returns the method's
/// name index, which is the key call sites look it up by, and the enum constants in case order.
pub fn analyze_switch_table(
    class: &ClassFile,
    method: &Method,
) -> Result<Option<(u16, Vec<u16>)>, PoolError> {
    if !method.access_flags.is_static()
        || !method.access_flags.is_synthetic()
        || class.method_descriptor(method)? != "()[I"
        || !is_switch_table_name(class.method_name(method)?)
    {
        return Ok(None);
    }
    let Some(code) = &method.code else {
        return Ok(None);
    };

    // The table is filled through a local holding the freshly allocated array.
    let stores = ordinal_stores(&class.constant_pool, &code.arena, &code.instructions)?;
    let stores: Vec<OrdinalStore> = stores
        .into_iter()
        .filter(|store| matches!(code.arena[store.map].kind, InsnKind::Load { .. }))
        .collect();
    if stores.is_empty() {
        return Ok(None);
    }
    Ok(Some((method.name_index, case_order(stores))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessFlags, ValueType};
    use crate::test_utils::{ClassBuilder, CodeBuilder};

    fn store_case(
        code: &mut CodeBuilder,
        pool: &mut ConstantPool,
        map: InsnId,
        constant: &str,
        case: i32,
    ) {
        let ordinal = pool.add_method_ref("a/Color", "ordinal", "()I").unwrap();
        let constant = pool.add_field_ref("a/Color", constant, "La/Color;").unwrap();
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
            array: map,
            index,
            value,
        });
    }

    #[test]
    fn eclipse_switch_table() {
        let mut builder = ClassBuilder::new("a/User");
        let mut code = CodeBuilder::new();
        for (constant, case) in [("GREEN", 2), ("RED", 1), ("BLUE", 3)] {
            let map = code.load(ValueType::Reference, 0);
            store_case(&mut code, builder.pool(), map, constant, case);
        }
        let map = code.load(ValueType::Reference, 0);
        code.stmt(InsnKind::XReturn { value: map });
        let method = builder.method(
            "$SWITCH_TABLE$a$Color",
            "()[I",
            AccessFlags::STATIC | AccessFlags::SYNTHETIC,
            Some(code.build()),
        );
        let class = builder.build();

        let (key, names) = analyze_switch_table(&class, &class.methods[method])
            .unwrap()
            .unwrap();
        assert_eq!(key, class.methods[method].name_index);
        let names: Vec<&str> = names
            .iter()
            .map(|index| class.constant_pool.utf8(*index).unwrap())
            .collect();
        assert_eq!(names, ["RED", "GREEN", "BLUE"]);
    }

    #[test]
    fn regular_methods_are_ignored() {
        let mut builder = ClassBuilder::new("a/User");
        let mut code = CodeBuilder::new();
        let map = code.load(ValueType::Reference, 0);
        store_case(&mut code, builder.pool(), map, "RED", 1);
        code.stmt(InsnKind::Return);
        let method = builder.method(
            "$SWITCH_TABLE$a$Color",
            "()[I",
            AccessFlags::STATIC,
            Some(code.build()),
        );
        let class = builder.build();
        assert_eq!(
            analyze_switch_table(&class, &class.methods[method]).unwrap(),
            None
        );
    }

    #[test]
    fn switch_table_names() {
        assert!(is_switch_table_name("$SWITCH_TABLE$a$Color"));
        assert!(is_switch_table_name("-geta-ColorSwitchesValues"));
        assert!(!is_switch_table_name("values"));
    }
}
