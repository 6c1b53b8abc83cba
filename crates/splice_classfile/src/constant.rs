//! Constant pool model.
//!
//! Entries are stored at their class-file index. Slot 0 and the slot
//! after every `Long`/`Double` hold [`Constant::Unusable`] so indices line
//! up with the on-disk numbering.

use crate::error::{ClassFileError, ClassFileResult};
use crate::mutf8;
use std::collections::HashMap;

/// Constant-pool tags.
pub mod tag {
    /// `CONSTANT_Utf8`
    pub const UTF8: u8 = 1;
    /// `CONSTANT_Integer`
    pub const INTEGER: u8 = 3;
    /// `CONSTANT_Float`
    pub const FLOAT: u8 = 4;
    /// `CONSTANT_Long`
    pub const LONG: u8 = 5;
    /// `CONSTANT_Double`
    pub const DOUBLE: u8 = 6;
    /// `CONSTANT_Class`
    pub const CLASS: u8 = 7;
    /// `CONSTANT_String`
    pub const STRING: u8 = 8;
    /// `CONSTANT_Fieldref`
    pub const FIELD_REF: u8 = 9;
    /// `CONSTANT_Methodref`
    pub const METHOD_REF: u8 = 10;
    /// `CONSTANT_InterfaceMethodref`
    pub const INTERFACE_METHOD_REF: u8 = 11;
    /// `CONSTANT_NameAndType`
    pub const NAME_AND_TYPE: u8 = 12;
    /// `CONSTANT_MethodHandle`
    pub const METHOD_HANDLE: u8 = 15;
    /// `CONSTANT_MethodType`
    pub const METHOD_TYPE: u8 = 16;
    /// `CONSTANT_Dynamic`
    pub const DYNAMIC: u8 = 17;
    /// `CONSTANT_InvokeDynamic`
    pub const INVOKE_DYNAMIC: u8 = 18;
    /// `CONSTANT_Module`
    pub const MODULE: u8 = 19;
    /// `CONSTANT_Package`
    pub const PACKAGE: u8 = 20;
}

/// A single constant-pool entry.
///
/// Floating-point values are kept as raw bits so that equality is exact
/// and entries can be used as hash keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Slot 0, or the second slot of a `Long`/`Double`.
    Unusable,
    /// Modified UTF-8 bytes.
    Utf8(Vec<u8>),
    /// 32-bit integer.
    Integer(i32),
    /// 32-bit float bits.
    Float(u32),
    /// 64-bit integer.
    Long(i64),
    /// 64-bit float bits.
    Double(u64),
    /// Class reference (name index).
    Class(u16),
    /// String literal (utf8 index).
    String(u16),
    /// Field reference.
    FieldRef {
        /// Class index.
        class: u16,
        /// NameAndType index.
        name_and_type: u16,
    },
    /// Method reference.
    MethodRef {
        /// Class index.
        class: u16,
        /// NameAndType index.
        name_and_type: u16,
    },
    /// Interface method reference.
    InterfaceMethodRef {
        /// Class index.
        class: u16,
        /// NameAndType index.
        name_and_type: u16,
    },
    /// Name and descriptor pair.
    NameAndType {
        /// Name utf8 index.
        name: u16,
        /// Descriptor utf8 index.
        descriptor: u16,
    },
    /// Method handle.
    MethodHandle {
        /// Reference kind (1..=9).
        kind: u8,
        /// Referenced member index.
        reference: u16,
    },
    /// Method type (descriptor utf8 index).
    MethodType(u16),
    /// Dynamically computed constant.
    Dynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap: u16,
        /// NameAndType index.
        name_and_type: u16,
    },
    /// Dynamically computed call site.
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap: u16,
        /// NameAndType index.
        name_and_type: u16,
    },
    /// Module (name utf8 index).
    Module(u16),
    /// Package (name utf8 index).
    Package(u16),
}

impl Constant {
    /// Builds a `Utf8` constant from a Rust string.
    pub fn utf8(text: &str) -> Self {
        Self::Utf8(mutf8::encode(text))
    }

    /// Returns the tag byte for this entry, or `None` for unusable slots.
    pub fn tag(&self) -> Option<u8> {
        Some(match self {
            Self::Unusable => return None,
            Self::Utf8(_) => tag::UTF8,
            Self::Integer(_) => tag::INTEGER,
            Self::Float(_) => tag::FLOAT,
            Self::Long(_) => tag::LONG,
            Self::Double(_) => tag::DOUBLE,
            Self::Class(_) => tag::CLASS,
            Self::String(_) => tag::STRING,
            Self::FieldRef { .. } => tag::FIELD_REF,
            Self::MethodRef { .. } => tag::METHOD_REF,
            Self::InterfaceMethodRef { .. } => tag::INTERFACE_METHOD_REF,
            Self::NameAndType { .. } => tag::NAME_AND_TYPE,
            Self::MethodHandle { .. } => tag::METHOD_HANDLE,
            Self::MethodType(_) => tag::METHOD_TYPE,
            Self::Dynamic { .. } => tag::DYNAMIC,
            Self::InvokeDynamic { .. } => tag::INVOKE_DYNAMIC,
            Self::Module(_) => tag::MODULE,
            Self::Package(_) => tag::PACKAGE,
        })
    }

    /// Returns true if this entry occupies two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// The constant pool of a class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool (only the reserved slot 0).
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Returns the `constant_pool_count` value (highest index + 1).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over `(index, constant)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Appends an entry without deduplication and returns its index.
    ///
    /// Used by the reader, which must preserve the original numbering.
    pub fn push(&mut self, constant: Constant) -> ClassFileResult<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        ClassFileError::check_limit("constant pool", self.entries.len() + slots, 0xFFFF)?;
        let index = self.entries.len() as u16;
        self.lookup.entry(constant.clone()).or_insert(index);
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Returns the index of an equal entry, appending one if none exists.
    pub fn intern(&mut self, constant: Constant) -> ClassFileResult<u16> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    /// Gets the entry at `index`.
    pub fn get(&self, index: u16) -> ClassFileResult<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(ClassFileError::bad_constant(
                index,
                format!("out of range or unusable (pool count {})", self.entries.len()),
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Decodes the `Utf8` entry at `index`.
    pub fn utf8(&self, index: u16) -> ClassFileResult<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes),
            other => Err(ClassFileError::bad_constant(
                index,
                format!("expected Utf8, found {other:?}"),
            )),
        }
    }

    /// Decodes the name of the `Class` entry at `index`.
    pub fn class_name(&self, index: u16) -> ClassFileResult<String> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(ClassFileError::bad_constant(
                index,
                format!("expected Class, found {other:?}"),
            )),
        }
    }

    /// Interns a `Utf8` entry.
    pub fn utf8_index(&mut self, text: &str) -> ClassFileResult<u16> {
        self.intern(Constant::utf8(text))
    }

    /// Interns a `Class` entry for an internal name.
    pub fn class_index(&mut self, name: &str) -> ClassFileResult<u16> {
        let name = self.utf8_index(name)?;
        self.intern(Constant::Class(name))
    }

    /// Interns a `String` literal entry.
    pub fn string_index(&mut self, value: &str) -> ClassFileResult<u16> {
        let utf8 = self.utf8_index(value)?;
        self.intern(Constant::String(utf8))
    }

    /// Interns a `NameAndType` entry.
    pub fn name_and_type_index(&mut self, name: &str, descriptor: &str) -> ClassFileResult<u16> {
        let name = self.utf8_index(name)?;
        let descriptor = self.utf8_index(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Interns a `Methodref` entry.
    pub fn method_ref_index(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ClassFileResult<u16> {
        let class = self.class_index(class)?;
        let name_and_type = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Interns a `Fieldref` entry.
    pub fn field_ref_index(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ClassFileResult<u16> {
        let class = self.class_index(class)?;
        let name_and_type = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Resolves a member reference to `(class, name, descriptor)`.
    pub fn member_ref(&self, index: u16) -> ClassFileResult<(String, String, String)> {
        let (class, name_and_type) = match self.get(index)? {
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
            } => (*class, *name_and_type),
            other => {
                return Err(ClassFileError::bad_constant(
                    index,
                    format!("expected member reference, found {other:?}"),
                ))
            }
        };
        let (name, descriptor) = match self.get(name_and_type)? {
            Constant::NameAndType { name, descriptor } => (*name, *descriptor),
            other => {
                return Err(ClassFileError::bad_constant(
                    name_and_type,
                    format!("expected NameAndType, found {other:?}"),
                ))
            }
        };
        Ok((
            self.class_name(class)?,
            self.utf8(name)?,
            self.utf8(descriptor)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_is_reserved() {
        let pool = ConstantPool::new();
        assert_eq!(pool.count(), 1);
        assert!(pool.get(0).is_err());
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.push(Constant::Long(7)).unwrap();
        let next = pool.push(Constant::Integer(1)).unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
        assert_eq!(pool.iter().count(), 2);
    }

    #[test]
    fn intern_reuses_existing_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.class_index("com/example/Solver").unwrap();
        let b = pool.class_index("com/example/Solver").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn push_keeps_duplicates_but_lookup_prefers_first() {
        let mut pool = ConstantPool::new();
        let first = pool.push(Constant::utf8("x")).unwrap();
        let second = pool.push(Constant::utf8("x")).unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.utf8_index("x").unwrap(), first);
    }

    #[test]
    fn member_ref_resolves_names() {
        let mut pool = ConstantPool::new();
        let index = pool
            .method_ref_index("hooks/Probe", "inject", "(Ljava/lang/Object;)V")
            .unwrap();
        let (class, name, descriptor) = pool.member_ref(index).unwrap();
        assert_eq!(class, "hooks/Probe");
        assert_eq!(name, "inject");
        assert_eq!(descriptor, "(Ljava/lang/Object;)V");
    }

    #[test]
    fn wrong_kind_is_reported() {
        let mut pool = ConstantPool::new();
        let index = pool.push(Constant::Integer(3)).unwrap();
        assert!(matches!(
            pool.utf8(index),
            Err(ClassFileError::BadConstant { index: 1, .. })
        ));
    }
}
