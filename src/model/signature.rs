// Helpers for JVM descriptors and generic signatures. Descriptors are a subset of signatures, so the
// reader below handles both.

/// Splits a method descriptor into its parameter descriptors.
pub fn parameter_descriptors(method_descriptor: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let Some(rest) = method_descriptor.strip_prefix('(') else {
        return out;
    };
    let bytes = rest.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] != b')' {
        let start = pos;
        while bytes.get(pos) == Some(&b'[') {
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'L') => match rest[pos..].find(';') {
                Some(end) => pos += end + 1,
                None => return out,
            },
            Some(_) => pos += 1,
            None => return out,
        }
        out.push(&rest[start..pos]);
    }
    out
}

pub fn return_descriptor(method_descriptor: &str) -> &str {
    method_descriptor
        .rfind(')')
        .map_or("", |end| &method_descriptor[end + 1..])
}

/// The internal class name of an object descriptor (`Lpkg/Name;` -> `pkg/Name`), or of the element
/// type of an array descriptor.
pub fn class_name_of_descriptor(descriptor: &str) -> Option<&str> {
    descriptor
        .trim_start_matches('[')
        .strip_prefix('L')?
        .strip_suffix(';')
}

/// `java/util/Map$Entry` -> `Map$Entry`
pub fn simple_name(internal_name: &str) -> &str {
    internal_name
        .rfind('/')
        .map_or(internal_name, |index| &internal_name[index + 1..])
}

/// `java/util/Map$Entry` -> `java/util`, empty for the default package.
pub fn package_name(internal_name: &str) -> &str {
    internal_name
        .rfind('/')
        .map_or("", |index| &internal_name[..index])
}

/// A readable, identifier-friendly name of a type descriptor, used to derive variable names:
/// `I` -> `Int`, `[Ljava/lang/String;` -> `ArrayOfString`, `Lpkg/Outer$Inner;` -> `Inner`.
pub fn type_base_name(descriptor: &str) -> String {
    if let Some(element) = descriptor.strip_prefix('[') {
        return format!("ArrayOf{}", type_base_name(element));
    }
    match descriptor.as_bytes().first() {
        Some(b'B') => "Byte".into(),
        Some(b'C') => "Char".into(),
        Some(b'D') => "Double".into(),
        Some(b'F') => "Float".into(),
        Some(b'I') => "Int".into(),
        Some(b'J') => "Long".into(),
        Some(b'S') => "Short".into(),
        Some(b'Z') => "Boolean".into(),
        Some(b'L') => {
            let name = class_name_of_descriptor(descriptor).unwrap_or("Object");
            let name = simple_name(name);
            let name = name.rsplit('$').next().unwrap_or(name);
            if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                "Object".into()
            } else {
                name.into()
            }
        }
        _ => "Object".into(),
    }
}

/// Collects the internal names of all classes mentioned by a descriptor or a generic signature
/// (class, method or field). Nested class types (`LOuter<TT;>.Inner;`) are reported as
/// `Outer$Inner`. Parsing stops silently at the first malformed character.
pub fn referenced_class_names(signature: &str) -> Vec<String> {
    let mut reader = SignatureReader {
        bytes: signature.as_bytes(),
        pos: 0,
        out: Vec::new(),
    };
    reader.read_signature();
    reader.out
}

struct SignatureReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    out: Vec<String>,
}

impl SignatureReader<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn read_signature(&mut self) -> Option<()> {
        if self.eat(b'<') {
            self.read_formal_type_parameters()?;
        }
        if self.eat(b'(') {
            while !self.eat(b')') {
                self.read_type()?;
            }
            self.read_type()?;
            while self.eat(b'^') {
                self.read_type()?;
            }
        } else {
            while self.peek().is_some() {
                self.read_type()?;
            }
        }
        Some(())
    }

    fn read_formal_type_parameters(&mut self) -> Option<()> {
        while !self.eat(b'>') {
            // Identifier, then a possibly empty class bound and any number of interface bounds.
            while self.peek()? != b':' {
                self.pos += 1;
            }
            while self.eat(b':') {
                if matches!(self.peek()?, b'L' | b'[' | b'T') {
                    self.read_type()?;
                }
            }
        }
        Some(())
    }

    fn read_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.pos += 1;
            }
            b'[' => {
                self.pos += 1;
                self.read_type()?;
            }
            b'T' => {
                while self.peek()? != b';' {
                    self.pos += 1;
                }
                self.pos += 1;
            }
            b'L' => {
                self.pos += 1;
                self.read_class_type()?;
            }
            _ => return None,
        }
        Some(())
    }

    fn read_class_type(&mut self) -> Option<()> {
        let mut name = String::new();
        loop {
            let start = self.pos;
            while !matches!(self.peek()?, b'<' | b';' | b'.') {
                self.pos += 1;
            }
            name.push_str(core::str::from_utf8(&self.bytes[start..self.pos]).ok()?);
            if self.eat(b'<') {
                while !self.eat(b'>') {
                    if self.eat(b'*') {
                        continue;
                    }
                    self.eat(b'+');
                    self.eat(b'-');
                    self.read_type()?;
                }
            }
            if self.eat(b'.') {
                name.push('$');
                continue;
            }
            if self.eat(b';') {
                self.out.push(name);
                return Some(());
            }
            return None;
        }
    }
}
