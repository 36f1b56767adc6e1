use super::{AccessFlags, ConstantPool, PoolError};
use crate::arena::{Arena, InsnId};
use core::ops::{Index, IndexMut};
use rustc_hash::FxHashMap;

/// An index into a `ClassTable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

/// Owns a top-level class and all of its nested classes. Nesting is expressed through IDs: the
/// owning direction is `inner_classes`, `outer_class` is a lookup-only back edge.
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: Vec<ClassFile>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut class: ClassFile, outer: Option<ClassId>) -> ClassId {
        let id = ClassId(self.classes.len());
        class.outer_class = outer;
        self.classes.push(class);
        if let Some(outer) = outer {
            self.classes[outer.0].inner_classes.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + use<> {
        (0..self.classes.len()).map(ClassId)
    }

    /// `id` followed by its enclosing classes, innermost first.
    pub fn outer_chain(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        core::iter::successors(Some(id), |id| self[*id].outer_class)
    }

    /// `id` followed by all of its nested classes, depth-first.
    pub fn subtree(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self[id].inner_classes.iter().rev());
        }
        out
    }

    pub fn find_by_name(&self, internal_name: &str) -> Option<ClassId> {
        self.ids()
            .find(|id| self[*id].name().is_ok_and(|name| name == internal_name))
    }

    /// Finds the class named `internal_name` among `from` and its enclosing classes.
    pub fn find_in_outer_chain(&self, from: ClassId, internal_name: &str) -> Option<ClassId> {
        self.outer_chain(from)
            .find(|id| self[*id].name().is_ok_and(|name| name == internal_name))
    }
}

impl Index<ClassId> for ClassTable {
    type Output = ClassFile;

    fn index(&self, id: ClassId) -> &Self::Output {
        &self.classes[id.0]
    }
}

impl IndexMut<ClassId> for ClassTable {
    fn index_mut(&mut self, id: ClassId) -> &mut Self::Output {
        &mut self.classes[id.0]
    }
}

#[derive(Debug, Default)]
pub struct ClassFile {
    pub major_version: u16,
    pub minor_version: u16,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    // 0 for `java/lang/Object`
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub constant_pool: ConstantPool,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub signature_index: Option<u16>,
    pub annotations: Vec<Annotation>,
    /// Flags from the `InnerClasses` entry describing this class, for nested classes.
    pub inner_access_flags: Option<AccessFlags>,
    pub is_anonymous: bool,

    pub outer_class: Option<ClassId>,
    pub inner_classes: Vec<ClassId>,

    // Populated by analysis
    /// Keyed by the name index of the `$SwitchMap$`/`$SWITCH_TABLE$` field or method; values are
    /// the name indices of enum constants in switch-case order.
    pub switch_maps: FxHashMap<u16, Vec<u16>>,
    pub outer_this_field: Option<OuterThisField>,
    /// Name indices of enum constants in declaration order.
    pub enum_values: Option<Vec<u16>>,
    /// Synthetic accessors declared by this class, keyed by method index.
    pub accessors: FxHashMap<usize, Accessor>,
}

impl ClassFile {
    pub fn name(&self) -> Result<&str, PoolError> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&str>, PoolError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Whether this is a nested class holding a reference to an enclosing instance.
    pub fn is_inner(&self) -> bool {
        self.outer_class.is_some() && self.inner_access_flags.is_some_and(|flags| !flags.is_static())
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags.contains(AccessFlags::ENUM)
    }

    pub fn method_name(&self, method: &Method) -> Result<&str, PoolError> {
        self.constant_pool.utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &Method) -> Result<&str, PoolError> {
        self.constant_pool.utf8(method.descriptor_index)
    }

    pub fn field_name(&self, field: &Field) -> Result<&str, PoolError> {
        self.constant_pool.utf8(field.name_index)
    }

    pub fn field_descriptor(&self, field: &Field) -> Result<&str, PoolError> {
        self.constant_pool.utf8(field.descriptor_index)
    }

    /// Finds a method declared by this class.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|method| {
            self.method_name(method).is_ok_and(|n| n == name)
                && self.method_descriptor(method).is_ok_and(|d| d == descriptor)
        })
    }

    /// Finds a field declared by this class.
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.fields.iter().position(|field| {
            self.field_name(field).is_ok_and(|n| n == name)
                && self.field_descriptor(field).is_ok_and(|d| d == descriptor)
        })
    }
}

#[derive(Debug, Default)]
pub struct Field {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub signature_index: Option<u16>,
    pub constant_value_index: Option<u16>,
    pub annotations: Vec<Annotation>,
    /// The initial value promoted out of a constructor or the static initializer.
    pub value_and_method: Option<ValueAndMethod>,
}

/// A field initializer expression, owned by the arena of `methods[method]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueAndMethod {
    pub value: InsnId,
    pub method: usize,
}

#[derive(Debug, Default)]
pub struct Method {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub signature_index: Option<u16>,
    pub exceptions: Vec<u16>,
    pub annotations: Vec<Annotation>,
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub code: Option<Code>,
    /// Local variables synthesized for methods without code.
    pub local_variables: Option<Vec<LocalVariable>>,
    pub contains_error: bool,
    /// For constructors of anonymous classes: the number of arguments forwarded to `super(...)`.
    pub super_constructor_parameter_count: usize,
}

impl Method {
    pub fn is_constructor(&self, pool: &ConstantPool) -> bool {
        pool.utf8(self.name_index).is_ok_and(|name| name == "<init>")
    }

    pub fn is_static_initializer(&self, pool: &ConstantPool) -> bool {
        pool.utf8(self.name_index).is_ok_and(|name| name == "<clinit>")
    }
}

#[derive(Debug, Default)]
pub struct Code {
    pub arena: Arena,
    pub max_locals: u16,
    /// The flat, bytecode-ordered list produced by the instruction list builder.
    pub instructions: Vec<InsnId>,
    /// The reconstructed list. Starts as a copy of `instructions` and is structured by the fast
    /// instruction builder.
    pub fast_nodes: Vec<InsnId>,
    pub exception_handlers: Vec<ExceptionHandler>,
    pub local_variables: Option<Vec<LocalVariable>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    // 0 for catch-any
    pub catch_type: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u32,
    pub length: u32,
    pub name_index: u16,
    /// A descriptor, or a generic signature when `is_generic` is set.
    pub signature_index: u16,
    pub index: u16,
    pub is_generic: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Utf8 field descriptor of the annotation type.
    pub type_index: u16,
    pub elements: Vec<(u16, ElementValue)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    Const { tag: u8, const_value_index: u16 },
    Enum { type_name_index: u16, const_name_index: u16 },
    /// Utf8 return descriptor of the class literal.
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OuterThisField {
    /// The `Fieldref` assigned by every constructor.
    pub field_ref_index: u16,
    /// Index into `ClassFile::fields`.
    pub field: usize,
}

/// What a synthetic `access$NNN` method exposes. Member references are `Fieldref`/`Methodref`
/// indices in the pool of the class declaring the accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accessor {
    GetStatic { index: u16 },
    PutStatic { index: u16 },
    GetField { index: u16 },
    PutField { index: u16 },
    Invoke { index: u16, is_static: bool },
}
