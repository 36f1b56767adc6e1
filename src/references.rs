//! Collection of the types a class refers to, from which the import list is generated.

use crate::arena::{Arena, InsnId};
use crate::model::iterate::walk_list;
use crate::model::signature::{package_name, referenced_class_names, simple_name};
use crate::model::{
    Annotation, ClassFile, ClassId, ClassTable, Code, Constant, ConstantPool, ElementValue,
    InsnKind, LocalVariable, Method, PoolError,
};
use core::ops::ControlFlow;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// Internal names of referenced types with the number of times each was seen.
#[derive(Clone, Debug, Default)]
pub struct ReferenceMap {
    counts: FxHashMap<String, usize>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, internal_name: &str) {
        if internal_name.is_empty() {
            return;
        }
        *self.counts.entry(internal_name.to_owned()).or_default() += 1;
    }

    pub fn count(&self, internal_name: &str) -> usize {
        self.counts.get(internal_name).copied().unwrap_or(0)
    }

    pub fn contains(&self, internal_name: &str) -> bool {
        self.counts.contains_key(internal_name)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Drops references that cannot be imported into the package of `current_class_name`: those
    /// whose simple name is taken by the class itself or by a referenced type of its package.
    pub fn reduce(&mut self, current_class_name: &str) {
        let package = package_name(current_class_name);
        let local: FxHashSet<String> = self
            .counts
            .keys()
            .map(String::as_str)
            .filter(|name| package_name(name) == package)
            .chain([current_class_name])
            .map(|name| simple_name(name).to_owned())
            .collect();
        let before = self.counts.len();
        self.counts
            .retain(|name, _| package_name(name) == package || !local.contains(simple_name(name)));
        debug!(
            "Reduced {before} references to {} for {current_class_name}",
            self.counts.len(),
        );
    }

    /// Whether another referenced type shares the simple name, so that neither can be imported.
    pub fn is_ambiguous(&self, internal_name: &str) -> bool {
        let simple = simple_name(internal_name);
        self.counts
            .keys()
            .any(|other| other != internal_name && simple_name(other) == simple)
    }
}

/// Counts every type referenced by `root` and its nested classes, except for those classes
/// themselves.
pub fn count_references(
    classes: &ClassTable,
    root: ClassId,
    references: &mut ReferenceMap,
) -> Result<(), PoolError> {
    let subtree = classes.subtree(root);
    let own = subtree
        .iter()
        .map(|id| classes[*id].name())
        .collect::<Result<FxHashSet<&str>, _>>()?;
    let mut counter = Counter { references, own };
    for id in subtree {
        counter.class(&classes[id])?;
    }
    Ok(())
}

struct Counter<'a> {
    references: &'a mut ReferenceMap,
    own: FxHashSet<&'a str>,
}

impl Counter<'_> {
    fn name(&mut self, internal_name: &str) {
        if !self.own.contains(internal_name) {
            self.references.add(internal_name);
        }
    }

    /// A descriptor or a generic signature.
    fn signature(&mut self, signature: &str) {
        for name in referenced_class_names(signature) {
            self.name(&name);
        }
    }

    /// A `Class` constant, which names an array type by its descriptor.
    fn class_constant(&mut self, pool: &ConstantPool, index: u16) -> Result<(), PoolError> {
        let name = pool.class_name(index)?;
        if name.starts_with('[') {
            self.signature(name);
        } else {
            self.name(name);
        }
        Ok(())
    }

    fn class(&mut self, class: &ClassFile) -> Result<(), PoolError> {
        let pool = &class.constant_pool;
        if let Some(super_name) = class.super_name()? {
            self.name(super_name);
        }
        for &interface in &class.interfaces {
            self.class_constant(pool, interface)?;
        }
        if let Some(signature) = class.signature_index {
            self.signature(pool.utf8(signature)?);
        }
        self.annotations(pool, &class.annotations)?;

        for field in &class.fields {
            let signature = field.signature_index.unwrap_or(field.descriptor_index);
            self.signature(pool.utf8(signature)?);
            self.annotations(pool, &field.annotations)?;
            if let Some(initializer) = field.value_and_method
                && let Some(code) = class
                    .methods
                    .get(initializer.method)
                    .and_then(|method| method.code.as_ref())
            {
                self.instructions(pool, &code.arena, &[initializer.value])?;
            }
        }

        for method in &class.methods {
            let signature = method.signature_index.unwrap_or(method.descriptor_index);
            self.signature(pool.utf8(signature)?);
            for &exception in &method.exceptions {
                self.class_constant(pool, exception)?;
            }
            self.annotations(pool, &method.annotations)?;
            for annotations in &method.parameter_annotations {
                self.annotations(pool, annotations)?;
            }
            if let Some(locals) = &method.local_variables {
                self.local_variables(pool, locals)?;
            }
            let Some(code) = &method.code else {
                continue;
            };
            // A broken body only loses its own references.
            if let Err(error) = self.code(pool, method, code) {
                warn!(
                    "Skipping references in the body of `{}`: {error}",
                    pool.utf8(method.name_index).unwrap_or("??"),
                );
            }
        }
        Ok(())
    }

    fn code(&mut self, pool: &ConstantPool, method: &Method, code: &Code) -> Result<(), PoolError> {
        if let Some(locals) = &code.local_variables {
            self.local_variables(pool, locals)?;
        }
        for handler in &code.exception_handlers {
            if handler.catch_type != 0 {
                self.class_constant(pool, handler.catch_type)?;
            }
        }
        // Flagged methods are rendered from their raw list.
        let list = if method.contains_error {
            &code.instructions
        } else {
            &code.fast_nodes
        };
        self.instructions(pool, &code.arena, list)
    }

    fn local_variables(
        &mut self,
        pool: &ConstantPool,
        locals: &[LocalVariable],
    ) -> Result<(), PoolError> {
        for local in locals {
            self.signature(pool.utf8(local.signature_index)?);
        }
        Ok(())
    }

    fn annotations(
        &mut self,
        pool: &ConstantPool,
        annotations: &[Annotation],
    ) -> Result<(), PoolError> {
        for annotation in annotations {
            self.signature(pool.utf8(annotation.type_index)?);
            for (_, value) in &annotation.elements {
                self.element_value(pool, value)?;
            }
        }
        Ok(())
    }

    fn element_value(&mut self, pool: &ConstantPool, value: &ElementValue) -> Result<(), PoolError> {
        match value {
            ElementValue::Const { .. } => {}
            ElementValue::Enum {
                type_name_index, ..
            } => self.signature(pool.utf8(*type_name_index)?),
            ElementValue::Class { class_info_index } => {
                self.signature(pool.utf8(*class_info_index)?);
            }
            ElementValue::Annotation(annotation) => {
                self.annotations(pool, core::slice::from_ref(annotation))?;
            }
            ElementValue::Array(values) => {
                for value in values {
                    self.element_value(pool, value)?;
                }
            }
        }
        Ok(())
    }

    fn instructions(
        &mut self,
        pool: &ConstantPool,
        arena: &Arena,
        list: &[InsnId],
    ) -> Result<(), PoolError> {
        let flow = walk_list(arena, list, &mut |_, insn| {
            match self.instruction(pool, &insn.kind) {
                Ok(()) => ControlFlow::Continue(()),
                Err(error) => ControlFlow::Break(error),
            }
        });
        match flow {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(error) => Err(error),
        }
    }

    fn instruction(&mut self, pool: &ConstantPool, kind: &InsnKind) -> Result<(), PoolError> {
        match *kind {
            InsnKind::New { class_index }
            | InsnKind::CheckCast { class_index, .. }
            | InsnKind::InstanceOf { class_index, .. }
            | InsnKind::ANewArray { class_index, .. }
            | InsnKind::MultiANewArray { class_index, .. }
            | InsnKind::OuterThis { class_index } => self.class_constant(pool, class_index)?,
            InsnKind::ExceptionLoad { class_index } if class_index != 0 => {
                self.class_constant(pool, class_index)?;
            }
            InsnKind::Ldc { index } => {
                if let Constant::Class { .. } = pool.get(index)? {
                    self.class_constant(pool, index)?;
                }
            }
            InsnKind::GetStatic { index }
            | InsnKind::PutStatic { index, .. }
            | InsnKind::GetField { index, .. }
            | InsnKind::PutField { index, .. }
            | InsnKind::Invoke { index, .. }
            | InsnKind::InvokeNew { index, .. } => {
                let owner = pool.member_ref(index)?.class_name;
                if owner.starts_with('[') {
                    self.signature(owner);
                } else {
                    self.name(owner);
                }
            }
            InsnKind::FastTry { ref catches, .. } => {
                for catch in catches {
                    if catch.class_index != 0 {
                        self.class_constant(pool, catch.class_index)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessFlags, Code, InvokeKind, ValueType};
    use crate::test_utils::{ClassBuilder, CodeBuilder};
    use proptest::prelude::*;

    fn reduced(current: &str, names: &[&str]) -> ReferenceMap {
        let mut references = ReferenceMap::new();
        for name in names {
            references.add(name);
        }
        references.reduce(current);
        references
    }

    #[test]
    fn colliding_name_outside_the_package_is_dropped() {
        let references = reduced("a/Main", &["a/Foo", "b/Foo", "b/Bar"]);
        assert!(references.contains("a/Foo"));
        assert!(!references.contains("b/Foo"));
        assert!(references.contains("b/Bar"));
        assert!(!references.is_ambiguous("a/Foo"));
    }

    #[test]
    fn collisions_elsewhere_are_kept_but_ambiguous() {
        let references = reduced("c/Main", &["a/Foo", "b/Foo"]);
        assert_eq!(references.len(), 2);
        assert!(references.is_ambiguous("a/Foo"));
        assert!(references.is_ambiguous("b/Foo"));
    }

    #[test]
    fn own_simple_name_shadows_imports() {
        let references = reduced("a/List", &["java/util/List", "java/util/Map"]);
        assert!(!references.contains("java/util/List"));
        assert!(references.contains("java/util/Map"));
    }

    fn code(build: impl FnOnce(&mut CodeBuilder)) -> Code {
        let mut builder = CodeBuilder::new();
        build(&mut builder);
        let mut code = builder.build();
        code.fast_nodes = code.instructions.clone();
        code
    }

    #[test]
    fn counts_declarations_and_bodies() {
        let mut builder = ClassBuilder::new("a/Main").super_class("b/Base");
        let list = builder.pool().add_class("java/util/List").unwrap();
        builder.class.interfaces.push(list);
        builder.field("inner", "La/Main$Inner;", AccessFlags::PRIVATE);
        builder.field("names", "[Ljava/lang/String;", AccessFlags::PRIVATE);

        let thing = builder.pool().add_class("d/Thing").unwrap();
        let array = builder.pool().add_class("[Le/Element;").unwrap();
        let println = builder
            .pool()
            .add_method_ref("java/io/PrintStream", "println", "(Ljava/lang/Object;)V")
            .unwrap();
        let body = code(|code| {
            let new = code.node(InsnKind::New { class_index: thing });
            code.stmt(InsnKind::Pop { value: new });
            let literal = code.node(InsnKind::Ldc { index: array });
            let stream = code.load(ValueType::Reference, 1);
            code.stmt(InsnKind::Invoke {
                kind: InvokeKind::Virtual,
                index: println,
                object: Some(stream),
                args: vec![literal],
            });
        });
        builder.method("run", "(Lc/Arg;)V", AccessFlags::PUBLIC, Some(body));

        let mut classes = ClassTable::new();
        let root = classes.insert(builder.build(), None);
        let inner = ClassBuilder::new("a/Main$Inner")
            .nested(AccessFlags::PRIVATE)
            .build();
        classes.insert(inner, Some(root));

        let mut references = ReferenceMap::new();
        count_references(&classes, root, &mut references).unwrap();
        for name in [
            "b/Base",
            "java/util/List",
            "java/lang/String",
            "c/Arg",
            "d/Thing",
            "e/Element",
            "java/io/PrintStream",
        ] {
            assert!(references.contains(name), "{name} is missing");
        }
        assert!(!references.contains("a/Main"));
        assert!(!references.contains("a/Main$Inner"));
        // Only the nested class extends `Object`.
        assert_eq!(references.count("java/lang/Object"), 1);
    }

    proptest! {
        #[test]
        fn reduction_only_removes(
            names in proptest::collection::vec((0..3usize, 0..3usize), 0..12),
        ) {
            const PACKAGES: [&str; 3] = ["a", "b", "c"];
            const SIMPLE: [&str; 3] = ["Foo", "Bar", "Main"];
            let names: Vec<String> = names
                .into_iter()
                .map(|(package, simple)| format!("{}/{}", PACKAGES[package], SIMPLE[simple]))
                .collect();
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let references = reduced("a/Main", &names);

            for (name, _) in references.iter() {
                prop_assert!(names.contains(&name));
            }
            for name in &names {
                let local = package_name(name) == "a";
                prop_assert_eq!(references.contains(name), local || !names.iter().any(|other| {
                    package_name(other) == "a" && simple_name(other) == simple_name(name)
                }) && simple_name(name) != "Main");
            }
        }
    }
}
