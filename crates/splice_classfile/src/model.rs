//! In-memory structural model of a class file.
//!
//! Attributes are kept as raw bytes keyed by their name index; callers
//! decode the ones they need (see [`crate::CodeAttribute`]). Members that
//! are never touched therefore write back byte-for-byte.

use crate::constant::ConstantPool;
use crate::error::{ClassFileError, ClassFileResult};
use crate::reader::{self, ByteReader};
use crate::writer::{self, ByteWriter};

/// Access flag bits shared by classes, fields, and methods.
pub mod access {
    /// `ACC_PUBLIC`
    pub const PUBLIC: u16 = 0x0001;
    /// `ACC_PRIVATE`
    pub const PRIVATE: u16 = 0x0002;
    /// `ACC_PROTECTED`
    pub const PROTECTED: u16 = 0x0004;
    /// `ACC_STATIC`
    pub const STATIC: u16 = 0x0008;
    /// `ACC_FINAL`
    pub const FINAL: u16 = 0x0010;
    /// `ACC_SUPER` (classes)
    pub const SUPER: u16 = 0x0020;
    /// `ACC_NATIVE`
    pub const NATIVE: u16 = 0x0100;
    /// `ACC_INTERFACE`
    pub const INTERFACE: u16 = 0x0200;
    /// `ACC_ABSTRACT`
    pub const ABSTRACT: u16 = 0x0400;
    /// `ACC_SYNTHETIC`
    pub const SYNTHETIC: u16 = 0x1000;
}

/// A raw attribute: name index plus undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Utf8 index of the attribute name.
    pub name_index: u16,
    /// Attribute payload.
    pub info: Vec<u8>,
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Access flags.
    pub access_flags: u16,
    /// Utf8 index of the member name.
    pub name_index: u16,
    /// Utf8 index of the member descriptor.
    pub descriptor_index: u16,
    /// Member attributes.
    pub attributes: Vec<Attribute>,
}

/// A field declaration.
pub type FieldInfo = MemberInfo;

/// A method declaration.
pub type MethodInfo = MemberInfo;

impl MemberInfo {
    /// Returns true if `ACC_STATIC` is set.
    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    /// Decodes the member name.
    pub fn name(&self, pool: &ConstantPool) -> ClassFileResult<String> {
        pool.utf8(self.name_index)
    }

    /// Decodes the member descriptor.
    pub fn descriptor(&self, pool: &ConstantPool) -> ClassFileResult<String> {
        pool.utf8(self.descriptor_index)
    }

    /// Finds the first attribute with the given name.
    pub fn attribute<'a>(&'a self, pool: &ConstantPool, name: &str) -> Option<&'a Attribute> {
        find_attribute(&self.attributes, pool, name)
    }

    /// Finds the first attribute with the given name, mutably.
    pub fn attribute_mut<'a>(
        &'a mut self,
        pool: &ConstantPool,
        name: &str,
    ) -> Option<&'a mut Attribute> {
        self.attributes
            .iter_mut()
            .find(|a| attribute_named(a, pool, name))
    }
}

/// Finds the first attribute in `attributes` whose name is `name`.
pub fn find_attribute<'a>(
    attributes: &'a [Attribute],
    pool: &ConstantPool,
    name: &str,
) -> Option<&'a Attribute> {
    attributes.iter().find(|a| attribute_named(a, pool, name))
}

fn attribute_named(attribute: &Attribute, pool: &ConstantPool, name: &str) -> bool {
    pool.utf8(attribute.name_index)
        .map(|n| n == name)
        .unwrap_or(false)
}

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// `MethodHandle` index of the bootstrap method.
    pub method_ref: u16,
    /// Static argument indices.
    pub arguments: Vec<u16>,
}

impl BootstrapMethod {
    /// Decodes a `BootstrapMethods` attribute payload.
    pub fn parse_table(info: &[u8]) -> ClassFileResult<Vec<Self>> {
        let mut reader = ByteReader::new(info);
        let count = reader.u2()?;
        let mut methods = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let method_ref = reader.u2()?;
            let argc = reader.u2()?;
            let mut arguments = Vec::with_capacity(usize::from(argc));
            for _ in 0..argc {
                arguments.push(reader.u2()?);
            }
            methods.push(Self {
                method_ref,
                arguments,
            });
        }
        reader.finish()?;
        Ok(methods)
    }

    /// Encodes a `BootstrapMethods` attribute payload.
    pub fn encode_table(methods: &[Self]) -> ClassFileResult<Vec<u8>> {
        let mut out = ByteWriter::new();
        out.count_u2("bootstrap methods", methods.len())?;
        for method in methods {
            out.u2(method.method_ref);
            out.count_u2("bootstrap arguments", method.arguments.len())?;
            for argument in &method.arguments {
                out.u2(*argument);
            }
        }
        Ok(out.into_bytes())
    }
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor version.
    pub minor_version: u16,
    /// Major version.
    pub major_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// Class access flags.
    pub access_flags: u16,
    /// `Class` index of this class.
    pub this_class: u16,
    /// `Class` index of the superclass (0 for `java/lang/Object`).
    pub super_class: u16,
    /// `Class` indices of implemented interfaces.
    pub interfaces: Vec<u16>,
    /// Declared fields in declaration order.
    pub fields: Vec<FieldInfo>,
    /// Declared methods in declaration order.
    pub methods: Vec<MethodInfo>,
    /// Class-level attributes.
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parses a complete class file.
    pub fn parse(bytes: &[u8]) -> ClassFileResult<Self> {
        reader::parse_class(bytes)
    }

    /// Serialises the class file.
    pub fn to_bytes(&self) -> ClassFileResult<Vec<u8>> {
        writer::write_class(self)
    }

    /// Internal name of this class.
    pub fn name(&self) -> ClassFileResult<String> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass, if any.
    pub fn super_name(&self) -> ClassFileResult<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Finds the first method with the given name.
    pub fn method_named(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            m.name(&self.constant_pool)
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    /// Finds the field with the given name.
    pub fn field_named(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| {
            f.name(&self.constant_pool)
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    /// Decodes the class-level `BootstrapMethods` attribute (empty if absent).
    pub fn bootstrap_methods(&self) -> ClassFileResult<Vec<BootstrapMethod>> {
        match find_attribute(&self.attributes, &self.constant_pool, "BootstrapMethods") {
            Some(attribute) => BootstrapMethod::parse_table(&attribute.info),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the `BootstrapMethods` attribute.
    ///
    /// An empty table removes the attribute; a table equal to the current
    /// one leaves the class untouched.
    pub fn set_bootstrap_methods(&mut self, methods: &[BootstrapMethod]) -> ClassFileResult<()> {
        if self.bootstrap_methods()? == methods {
            return Ok(());
        }
        let position = self
            .attributes
            .iter()
            .position(|a| attribute_named(a, &self.constant_pool, "BootstrapMethods"));
        if methods.is_empty() {
            if let Some(position) = position {
                self.attributes.remove(position);
            }
            return Ok(());
        }
        let info = BootstrapMethod::encode_table(methods)?;
        match position {
            Some(position) => self.attributes[position].info = info,
            None => {
                let name_index = self.constant_pool.utf8_index("BootstrapMethods")?;
                self.attributes.push(Attribute { name_index, info });
            }
        }
        Ok(())
    }

    /// Checks that `this_class` and `super_class` resolve.
    pub(crate) fn validate_header(&self) -> ClassFileResult<()> {
        self.name()?;
        self.super_name()?;
        for interface in &self.interfaces {
            self.constant_pool.class_name(*interface)?;
        }
        if self.major_version < 45 {
            return Err(ClassFileError::malformed(format!(
                "unsupported major version {}",
                self.major_version
            )));
        }
        Ok(())
    }
}
