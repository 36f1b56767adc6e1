// Compact builders for hand-written class files and instruction lists.

use crate::arena::InsnId;
use crate::model::{
    AccessFlags, ClassFile, Code, ConstantPool, Field, InsnKind, Instruction, Method, ValueType,
};

pub struct ClassBuilder {
    pub class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.add_class(name).unwrap();
        let super_class = constant_pool.add_class("java/lang/Object").unwrap();
        Self {
            class: ClassFile {
                major_version: 52,
                access_flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
                this_class,
                super_class,
                constant_pool,
                ..ClassFile::default()
            },
        }
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.class.super_class = self.class.constant_pool.add_class(name).unwrap();
        self
    }

    pub fn access(mut self, flags: AccessFlags) -> Self {
        self.class.access_flags = flags;
        self
    }

    /// Marks the class as nested; `flags` come from the `InnerClasses` entry.
    pub fn nested(mut self, flags: AccessFlags) -> Self {
        self.class.inner_access_flags = Some(flags);
        self
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.class.constant_pool
    }

    pub fn name(&self) -> String {
        self.class.name().unwrap().to_owned()
    }

    pub fn field(&mut self, name: &str, descriptor: &str, flags: AccessFlags) -> usize {
        let field = Field {
            access_flags: flags,
            name_index: self.pool().add_utf8(name).unwrap(),
            descriptor_index: self.pool().add_utf8(descriptor).unwrap(),
            ..Field::default()
        };
        self.class.fields.push(field);
        self.class.fields.len() - 1
    }

    pub fn method(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        code: Option<Code>,
    ) -> usize {
        let method = Method {
            access_flags: flags,
            name_index: self.pool().add_utf8(name).unwrap(),
            descriptor_index: self.pool().add_utf8(descriptor).unwrap(),
            code,
            ..Method::default()
        };
        self.class.methods.push(method);
        self.class.methods.len() - 1
    }

    /// A `Fieldref` to a field of this class.
    pub fn own_field_ref(&mut self, name: &str, descriptor: &str) -> u16 {
        let class_name = self.name();
        self.pool().add_field_ref(&class_name, name, descriptor).unwrap()
    }

    pub fn build(self) -> ClassFile {
        self.class
    }
}

/// Allocates instructions at consecutive offsets. Statements are appended to the raw list.
pub struct CodeBuilder {
    pub code: Code,
    offset: u32,
    line: Option<u32>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            code: Code {
                max_locals: 8,
                ..Code::default()
            },
            offset: 0,
            line: None,
        }
    }

    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = Some(line);
        self
    }

    /// Moves the offset of the next allocated node.
    pub fn at(&mut self, offset: u32) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn node(&mut self, kind: InsnKind) -> InsnId {
        let id = self
            .code
            .arena
            .alloc(Instruction::new(self.offset, self.line, kind));
        self.offset += 1;
        id
    }

    pub fn stmt(&mut self, kind: InsnKind) -> InsnId {
        let id = self.node(kind);
        self.code.instructions.push(id);
        id
    }

    pub fn this(&mut self) -> InsnId {
        self.load(ValueType::Reference, 0)
    }

    pub fn load(&mut self, ty: ValueType, index: u16) -> InsnId {
        self.node(InsnKind::Load { ty, index })
    }

    pub fn iconst(&mut self, value: i32) -> InsnId {
        self.node(InsnKind::IConst(value))
    }

    pub fn build(self) -> Code {
        self.code
    }
}

