use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Constant pool index {0} is out of bounds")]
    OutOfBounds(u16),

    #[error("Constant pool index {index} refers to a {found}, expected a {expected}")]
    UnexpectedKind {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Constant pool cannot grow past 65535 entries")]
    AppendOverflow,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
}

impl Constant {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Utf8(_) => "Utf8",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Long(_) => "Long",
            Self::Double(_) => "Double",
            Self::Class { .. } => "Class",
            Self::String { .. } => "String",
            Self::FieldRef { .. } => "Fieldref",
            Self::MethodRef { .. } => "Methodref",
            Self::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Self::NameAndType { .. } => "NameAndType",
            Self::MethodHandle { .. } => "MethodHandle",
            Self::MethodType { .. } => "MethodType",
            Self::InvokeDynamic { .. } => "InvokeDynamic",
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// A resolved field or method reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub name_index: u16,
    pub descriptor_index: u16,
}

/// Append-only constant table. Index 0 and the upper halves of `long`/`double` entries are
/// unusable, as in the class file format. Indices never change once assigned.
#[derive(Clone, Debug)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
        }
    }

    /// The value of `constant_pool_count`: one past the last usable index.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Result<&Constant, PoolError> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(PoolError::OutOfBounds(index))
    }

    pub fn push(&mut self, constant: Constant) -> Result<u16, PoolError> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(PoolError::AppendOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(Some(constant));
        if slots == 2 {
            self.entries.push(None);
        }
        Ok(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| Some((index as u16, entry.as_ref()?)))
    }

    fn mismatch(&self, index: u16, expected: &'static str) -> PoolError {
        match self.get(index) {
            Ok(found) => PoolError::UnexpectedKind {
                index,
                expected,
                found: found.kind_name(),
            },
            Err(err) => err,
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, PoolError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(self.mismatch(index, "Utf8")),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, PoolError> {
        match *self.get(index)? {
            Constant::Class { name_index } => self.utf8(name_index),
            _ => Err(self.mismatch(index, "Class")),
        }
    }

    pub fn class_name_index(&self, index: u16) -> Result<u16, PoolError> {
        match *self.get(index)? {
            Constant::Class { name_index } => Ok(name_index),
            _ => Err(self.mismatch(index, "Class")),
        }
    }

    /// Returns `(name_index, descriptor_index)`.
    pub fn name_and_type(&self, index: u16) -> Result<(u16, u16), PoolError> {
        match *self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((name_index, descriptor_index)),
            _ => Err(self.mismatch(index, "NameAndType")),
        }
    }

    /// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref`.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, PoolError> {
        let (class_index, name_and_type_index) = match *self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (class_index, name_and_type_index),
            _ => return Err(self.mismatch(index, "member reference")),
        };
        let (name_index, descriptor_index) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            class_name: self.class_name(class_index)?,
            name: self.utf8(name_index)?,
            descriptor: self.utf8(descriptor_index)?,
            name_index,
            descriptor_index,
        })
    }

    /// The string value of an `ldc` operand, if it's a `String` constant.
    pub fn string(&self, index: u16) -> Result<Option<&str>, PoolError> {
        match *self.get(index)? {
            Constant::String { string_index } => self.utf8(string_index).map(Some),
            _ => Ok(None),
        }
    }

    fn find(&self, predicate: impl Fn(&Constant) -> bool) -> Option<u16> {
        self.iter()
            .find(|(_, constant)| predicate(constant))
            .map(|(index, _)| index)
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16, PoolError> {
        if let Some(index) = self.find(|c| matches!(c, Constant::Utf8(v) if v == value)) {
            return Ok(index);
        }
        self.push(Constant::Utf8(value.to_owned()))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, PoolError> {
        let name_index = self.add_utf8(internal_name)?;
        if let Some(index) = self.find(|c| *c == Constant::Class { name_index }) {
            return Ok(index);
        }
        self.push(Constant::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16, PoolError> {
        let string_index = self.add_utf8(value)?;
        if let Some(index) = self.find(|c| *c == Constant::String { string_index }) {
            return Ok(index);
        }
        self.push(Constant::String { string_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, PoolError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        let constant = Constant::NameAndType {
            name_index,
            descriptor_index,
        };
        if let Some(index) = self.find(|c| *c == constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    pub fn add_field_ref(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, PoolError> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        let constant = Constant::FieldRef {
            class_index,
            name_and_type_index,
        };
        if let Some(index) = self.find(|c| *c == constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    pub fn add_method_ref(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, PoolError> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        let constant = Constant::MethodRef {
            class_index,
            name_and_type_index,
        };
        if let Some(index) = self.find(|c| *c == constant) {
            return Ok(index);
        }
        self.push(constant)
    }
}
