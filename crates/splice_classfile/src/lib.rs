//! # Splice Class Files
//!
//! Reading, editing, and writing JVM class files for Splice.
//!
//! The model is deliberately shallow: the constant pool is fully decoded,
//! attributes stay as raw bytes until someone asks for them. A class that
//! is parsed and written back without edits is byte-identical.
//!
//! ## Layers
//!
//! - [`ClassFile`] / [`ConstantPool`]: structural model, reader, writer
//! - [`CodeAttribute`] / [`Insn`]: bytecode decoding and relocating re-assembly
//! - [`StackMapTable`]: frame decoding so frames survive re-assembly
//! - [`PoolImporter`]: moving members from one class into another
//!
//! ## Usage
//!
//! ```
//! use splice_classfile::{ClassFile, ConstantPool};
//!
//! let mut pool = ConstantPool::new();
//! let this_class = pool.class_index("demo/Empty").unwrap();
//! let super_class = pool.class_index("java/lang/Object").unwrap();
//! let class = ClassFile {
//!     minor_version: 0,
//!     major_version: 52,
//!     constant_pool: pool,
//!     access_flags: 0x21,
//!     this_class,
//!     super_class,
//!     interfaces: vec![],
//!     fields: vec![],
//!     methods: vec![],
//!     attributes: vec![],
//! };
//! let bytes = class.to_bytes().unwrap();
//! assert_eq!(ClassFile::parse(&bytes).unwrap().name().unwrap(), "demo/Empty");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod code;
mod constant;
mod error;
mod frames;
mod model;
pub mod mutf8;
mod reader;
mod remap;
mod writer;

pub use code::{
    assemble, decode, opcode, CodeAttribute, ExceptionHandler, Insn, Instruction, Relocation,
};
pub use constant::{tag, Constant, ConstantPool};
pub use error::{ClassFileError, ClassFileResult};
pub use frames::{FrameKind, StackMapFrame, StackMapTable, VerificationType};
pub use model::{
    access, find_attribute, Attribute, BootstrapMethod, ClassFile, FieldInfo, MemberInfo,
    MethodInfo,
};
pub use reader::parse_class;
pub use remap::PoolImporter;
pub use writer::write_class;
