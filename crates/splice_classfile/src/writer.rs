//! Class-file writer.

use crate::constant::Constant;
use crate::error::{ClassFileError, ClassFileResult};
use crate::model::{Attribute, ClassFile, MemberInfo};

/// Serialise a class file.
///
/// The output is a pure function of the model: writing the same model
/// twice yields identical bytes, and a model produced by the reader
/// writes back exactly the bytes it was read from.
///
/// # Errors
///
/// Returns an error if a table exceeds its `u2` count limit.
pub fn write_class(class: &ClassFile) -> ClassFileResult<Vec<u8>> {
    let mut out = ByteWriter::with_capacity(1024);
    out.u4(0xCAFE_BABE);
    out.u2(class.minor_version);
    out.u2(class.major_version);

    let pool = &class.constant_pool;
    out.count_u2("constant pool", pool.count())?;
    for (_, constant) in pool.iter() {
        write_constant(&mut out, constant)?;
    }

    out.u2(class.access_flags);
    out.u2(class.this_class);
    out.u2(class.super_class);
    out.count_u2("interfaces", class.interfaces.len())?;
    for interface in &class.interfaces {
        out.u2(*interface);
    }
    write_members(&mut out, "fields", &class.fields)?;
    write_members(&mut out, "methods", &class.methods)?;
    write_attributes(&mut out, &class.attributes)?;
    Ok(out.into_bytes())
}

fn write_constant(out: &mut ByteWriter, constant: &Constant) -> ClassFileResult<()> {
    let Some(tag) = constant.tag() else {
        return Ok(());
    };
    out.u1(tag);
    match constant {
        Constant::Unusable => {}
        Constant::Utf8(bytes) => {
            out.count_u2("utf8 constant", bytes.len())?;
            out.bytes(bytes);
        }
        Constant::Integer(value) => out.u4(*value as u32),
        Constant::Float(bits) => out.u4(*bits),
        Constant::Long(value) => out.u8(*value as u64),
        Constant::Double(bits) => out.u8(*bits),
        Constant::Class(index)
        | Constant::String(index)
        | Constant::MethodType(index)
        | Constant::Module(index)
        | Constant::Package(index) => out.u2(*index),
        Constant::FieldRef {
            class,
            name_and_type,
        }
        | Constant::MethodRef {
            class,
            name_and_type,
        }
        | Constant::InterfaceMethodRef {
            class,
            name_and_type,
        } => {
            out.u2(*class);
            out.u2(*name_and_type);
        }
        Constant::NameAndType { name, descriptor } => {
            out.u2(*name);
            out.u2(*descriptor);
        }
        Constant::MethodHandle { kind, reference } => {
            out.u1(*kind);
            out.u2(*reference);
        }
        Constant::Dynamic {
            bootstrap,
            name_and_type,
        }
        | Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } => {
            out.u2(*bootstrap);
            out.u2(*name_and_type);
        }
    }
    Ok(())
}

fn write_members(
    out: &mut ByteWriter,
    what: &'static str,
    members: &[MemberInfo],
) -> ClassFileResult<()> {
    out.count_u2(what, members.len())?;
    for member in members {
        out.u2(member.access_flags);
        out.u2(member.name_index);
        out.u2(member.descriptor_index);
        write_attributes(out, &member.attributes)?;
    }
    Ok(())
}

/// Writes an attribute table (`u2 count` followed by attributes).
pub(crate) fn write_attributes(out: &mut ByteWriter, attributes: &[Attribute]) -> ClassFileResult<()> {
    out.count_u2("attributes", attributes.len())?;
    for attribute in attributes {
        out.u2(attribute.name_index);
        let len = u32::try_from(attribute.info.len()).map_err(|_| ClassFileError::LimitExceeded {
            what: "attribute length",
            count: attribute.info.len(),
            max: u32::MAX as usize,
        })?;
        out.u4(len);
        out.bytes(&attribute.info);
    }
    Ok(())
}

/// Big-endian output buffer.
pub(crate) struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn u1(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub(crate) fn u2(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn u4(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn u8(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a `u2` element count, checking the limit.
    pub(crate) fn count_u2(&mut self, what: &'static str, count: usize) -> ClassFileResult<()> {
        ClassFileError::check_limit(what, count, usize::from(u16::MAX))?;
        self.u2(count as u16);
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
