//! Class-file reader.

use crate::constant::{tag, Constant, ConstantPool};
use crate::error::{ClassFileError, ClassFileResult};
use crate::model::{Attribute, ClassFile, MemberInfo};

const MAGIC: u32 = 0xCAFE_BABE;

/// Parse a class file into its structural model.
///
/// # Errors
///
/// Returns an error on bad magic, truncated input, unknown constant tags,
/// dangling `this_class`/`super_class` references, or trailing bytes.
pub fn parse_class(bytes: &[u8]) -> ClassFileResult<ClassFile> {
    let mut reader = ByteReader::new(bytes);

    let magic = reader.u4()?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic { found: magic });
    }
    let minor_version = reader.u2()?;
    let major_version = reader.u2()?;
    let constant_pool = read_constant_pool(&mut reader)?;
    let access_flags = reader.u2()?;
    let this_class = reader.u2()?;
    let super_class = reader.u2()?;

    let interface_count = reader.u2()?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));
    for _ in 0..interface_count {
        interfaces.push(reader.u2()?);
    }

    let fields = read_members(&mut reader)?;
    let methods = read_members(&mut reader)?;
    let attributes = read_attributes(&mut reader)?;
    reader.finish()?;

    let class = ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };
    class.validate_header()?;
    Ok(class)
}

fn read_constant_pool(reader: &mut ByteReader<'_>) -> ClassFileResult<ConstantPool> {
    let count = reader.u2()?;
    if count == 0 {
        return Err(ClassFileError::malformed("constant pool count is zero"));
    }
    let mut pool = ConstantPool::new();
    while pool.count() < usize::from(count) {
        let index = pool.count() as u16;
        let constant = read_constant(reader, index)?;
        if constant.is_wide() && pool.count() + 2 > usize::from(count) {
            return Err(ClassFileError::malformed(
                "wide constant overruns the constant pool",
            ));
        }
        pool.push(constant)?;
    }
    Ok(pool)
}

fn read_constant(reader: &mut ByteReader<'_>, index: u16) -> ClassFileResult<Constant> {
    let tag_byte = reader.u1()?;
    Ok(match tag_byte {
        tag::UTF8 => {
            let len = reader.u2()?;
            Constant::Utf8(reader.bytes(usize::from(len))?.to_vec())
        }
        tag::INTEGER => Constant::Integer(reader.u4()? as i32),
        tag::FLOAT => Constant::Float(reader.u4()?),
        tag::LONG => {
            let high = u64::from(reader.u4()?);
            let low = u64::from(reader.u4()?);
            Constant::Long(((high << 32) | low) as i64)
        }
        tag::DOUBLE => {
            let high = u64::from(reader.u4()?);
            let low = u64::from(reader.u4()?);
            Constant::Double((high << 32) | low)
        }
        tag::CLASS => Constant::Class(reader.u2()?),
        tag::STRING => Constant::String(reader.u2()?),
        tag::FIELD_REF => Constant::FieldRef {
            class: reader.u2()?,
            name_and_type: reader.u2()?,
        },
        tag::METHOD_REF => Constant::MethodRef {
            class: reader.u2()?,
            name_and_type: reader.u2()?,
        },
        tag::INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
            class: reader.u2()?,
            name_and_type: reader.u2()?,
        },
        tag::NAME_AND_TYPE => Constant::NameAndType {
            name: reader.u2()?,
            descriptor: reader.u2()?,
        },
        tag::METHOD_HANDLE => Constant::MethodHandle {
            kind: reader.u1()?,
            reference: reader.u2()?,
        },
        tag::METHOD_TYPE => Constant::MethodType(reader.u2()?),
        tag::DYNAMIC => Constant::Dynamic {
            bootstrap: reader.u2()?,
            name_and_type: reader.u2()?,
        },
        tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap: reader.u2()?,
            name_and_type: reader.u2()?,
        },
        tag::MODULE => Constant::Module(reader.u2()?),
        tag::PACKAGE => Constant::Package(reader.u2()?),
        other => {
            return Err(ClassFileError::UnknownTag { tag: other, index });
        }
    })
}

fn read_members(reader: &mut ByteReader<'_>) -> ClassFileResult<Vec<MemberInfo>> {
    let count = reader.u2()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        members.push(MemberInfo {
            access_flags: reader.u2()?,
            name_index: reader.u2()?,
            descriptor_index: reader.u2()?,
            attributes: read_attributes(reader)?,
        });
    }
    Ok(members)
}

/// Reads an attribute table (`u2 count` followed by attributes).
pub(crate) fn read_attributes(reader: &mut ByteReader<'_>) -> ClassFileResult<Vec<Attribute>> {
    let count = reader.u2()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = reader.u2()?;
        let len = reader.u4()? as usize;
        attributes.push(Attribute {
            name_index,
            info: reader.bytes(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

/// Big-endian cursor over a byte slice.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub(crate) fn bytes(&mut self, len: usize) -> ClassFileResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFileError::UnexpectedEof { offset: self.pos })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    #[inline]
    pub(crate) fn u1(&mut self) -> ClassFileResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    #[inline]
    pub(crate) fn u2(&mut self) -> ClassFileResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    #[inline]
    pub(crate) fn u4(&mut self) -> ClassFileResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i1(&mut self) -> ClassFileResult<i8> {
        Ok(self.u1()? as i8)
    }

    pub(crate) fn i2(&mut self) -> ClassFileResult<i16> {
        Ok(self.u2()? as i16)
    }

    pub(crate) fn i4(&mut self) -> ClassFileResult<i32> {
        Ok(self.u4()? as i32)
    }

    /// Skips to the next multiple of four (switch padding).
    pub(crate) fn align4(&mut self) -> ClassFileResult<()> {
        let padding = (4 - self.pos % 4) % 4;
        self.bytes(padding).map(|_| ())
    }

    /// Fails if any bytes are left.
    pub(crate) fn finish(&self) -> ClassFileResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ClassFileError::TrailingBytes {
                count: self.data.len() - self.pos,
            })
        }
    }
}
