mod accessors;
mod local_variables;
mod outer_this;
mod switch_table;

pub use self::accessors::{analyze_accessor, is_accessor_name};
pub use self::local_variables::synthesize_local_variables;
pub use self::outer_this::{
    resolve_outer_this, scan_constructor, super_constructor_parameter_count,
};
pub use self::switch_table::{analyze_switch_table, case_order, ordinal_stores};

use crate::config::Config;
use crate::flag_method;
use crate::model::{AccessFlags, Accessor, ClassFile, PoolError};
use tracing::{debug, trace, warn};

/// Collects per-class facts the reconstructors rely on: synthetic accessors, switch tables, the
/// outer-this field and local variable names. Failures are confined to the method they occur in.
pub fn pre_analyze(class: &mut ClassFile, config: &Config) -> Result<(), PoolError> {
    debug!("Pre-analyzing {}", class.name()?);
    for index in 0..class.methods.len() {
        if let Err(error) = pre_analyze_method(class, index, config) {
            flag_method(class, index, &error.into());
        }
    }
    analyze_outer_this(class);
    Ok(())
}

fn pre_analyze_method(class: &mut ClassFile, index: usize, config: &Config) -> Result<(), PoolError> {
    if let Some(accessor) = analyze_accessor(class, &class.methods[index])? {
        trace!("{} is an accessor: {accessor:?}", class.method_name(&class.methods[index])?);
        class.accessors.insert(index, accessor);
        class.methods[index].access_flags |= AccessFlags::SYNTHETIC;
    }

    if let Some((key, names)) = analyze_switch_table(class, &class.methods[index])? {
        // The table is cached in a static field named after the method.
        let name = class.method_name(&class.methods[index])?;
        let cache = class
            .fields
            .iter()
            .position(|field| class.field_name(field).is_ok_and(|n| n == name));
        trace!("{name} computes a switch map of {} constants", names.len());
        if let Some(cache) = cache {
            class.fields[cache].access_flags |= AccessFlags::SYNTHETIC;
        }
        class.switch_maps.insert(key, names);
    }

    let method = &class.methods[index];
    if class.is_anonymous && method.is_constructor(&class.constant_pool) {
        if let Some(count) = super_constructor_parameter_count(class, method)? {
            class.methods[index].super_constructor_parameter_count = count;
        }
    }

    if config.rebuild_local_variables {
        synthesize_local_variables(class, index)?;
    }
    Ok(())
}

fn analyze_outer_this(class: &mut ClassFile) {
    if !class.is_inner() {
        return;
    }

    let mut scans = Vec::new();
    for index in 0..class.methods.len() {
        let method = &class.methods[index];
        if method.contains_error || !method.is_constructor(&class.constant_pool) {
            continue;
        }
        match scan_constructor(class, method) {
            Ok(scan) => scans.push(scan),
            Err(error) => {
                flag_method(class, index, &error.into());
                return;
            }
        }
    }

    let outer_this = match resolve_outer_this(class, scans) {
        Ok(Some(outer_this)) => outer_this,
        Ok(None) => return,
        Err(error) => {
            warn!("Cannot resolve the outer-this field: {error}");
            return;
        }
    };
    class.fields[outer_this.field].access_flags |= AccessFlags::SYNTHETIC;

    // Accessors returning the enclosing instance are never rendered either.
    let field_name = class.field_name(&class.fields[outer_this.field]).ok();
    let exposing: Vec<usize> = class
        .accessors
        .iter()
        .filter_map(|(method, accessor)| match *accessor {
            Accessor::GetField { index } => {
                let name = class.constant_pool.member_ref(index).ok()?.name;
                (Some(name) == field_name).then_some(*method)
            }
            _ => None,
        })
        .collect();
    for method in exposing {
        class.methods[method].access_flags |= AccessFlags::SYNTHETIC;
    }
    class.outer_this_field = Some(outer_this);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassTable, InsnKind, InvokeKind, ValueType};
    use crate::test_utils::{ClassBuilder, CodeBuilder};

    #[test]
    fn inner_class_outer_this() {
        let mut table = ClassTable::new();
        let outer = table.insert(ClassBuilder::new("a/Outer").build(), None);

        let mut builder = ClassBuilder::new("a/Outer$Inner").nested(AccessFlags::PRIVATE);
        let field = builder.field("this$0", "La/Outer;", AccessFlags::FINAL);
        let field_ref = builder.own_field_ref("this$0", "La/Outer;");
        let super_init = builder
            .pool()
            .add_method_ref("java/lang/Object", "<init>", "()V")
            .unwrap();
        let mut code = CodeBuilder::new();
        let this = code.this();
        let value = code.load(ValueType::Reference, 1);
        code.stmt(InsnKind::PutField {
            index: field_ref,
            object: this,
            value,
        });
        let this = code.this();
        code.stmt(InsnKind::Invoke {
            kind: InvokeKind::Special,
            index: super_init,
            object: Some(this),
            args: Vec::new(),
        });
        code.stmt(InsnKind::Return);
        builder.method("<init>", "(La/Outer;)V", AccessFlags::empty(), Some(code.build()));
        let inner = table.insert(builder.build(), Some(outer));

        pre_analyze(&mut table[inner], &Config::default()).unwrap();
        let class = &table[inner];
        assert_eq!(
            class.outer_this_field.map(|outer_this| outer_this.field),
            Some(field)
        );
        assert!(class.fields[field].access_flags.is_synthetic());
    }

    #[test]
    fn static_nested_classes_have_no_outer_this() {
        let mut table = ClassTable::new();
        let outer = table.insert(ClassBuilder::new("a/Outer").build(), None);
        let mut builder = ClassBuilder::new("a/Outer$Nested").nested(AccessFlags::STATIC);
        builder.field("this$0", "La/Outer;", AccessFlags::FINAL);
        let nested = table.insert(builder.build(), Some(outer));

        pre_analyze(&mut table[nested], &Config::default()).unwrap();
        assert!(table[nested].outer_this_field.is_none());
    }

    #[test]
    fn malformed_method_is_flagged() {
        let mut builder = ClassBuilder::new("a/Broken");
        let mut code = CodeBuilder::new();
        code.stmt(InsnKind::Return);
        let broken = builder.method("access$000", "()V", AccessFlags::STATIC, Some(code.build()));
        let mut code = CodeBuilder::new();
        code.stmt(InsnKind::Return);
        let healthy = builder.method("run", "()V", AccessFlags::PUBLIC, Some(code.build()));
        let mut class = builder.build();
        // A name pointing past the end of the pool.
        class.methods[broken].name_index = 999;

        pre_analyze(&mut class, &Config::default()).unwrap();
        assert!(class.methods[broken].contains_error);
        assert!(!class.methods[healthy].contains_error);
        assert!(
            class.methods[healthy]
                .code
                .as_ref()
                .unwrap()
                .local_variables
                .is_some()
        );
    }
}
