//! Moving members between classes with different constant pools.
//!
//! [`PoolImporter`] copies constants from a source class into a target
//! pool on demand, following references recursively and reusing equal
//! entries already present in the target. Bootstrap methods referenced by
//! `invokedynamic` or dynamic constants are appended to the target's
//! bootstrap table; the caller installs the table returned by
//! [`PoolImporter::finish`].

use crate::code::CodeAttribute;
use crate::constant::{Constant, ConstantPool};
use crate::error::{ClassFileError, ClassFileResult};
use crate::frames::StackMapTable;
use crate::model::{Attribute, BootstrapMethod, ClassFile, MemberInfo};
use crate::reader::ByteReader;
use crate::writer::ByteWriter;
use std::collections::HashMap;
use tracing::warn;

/// Deepest chain of constant references followed before giving up.
const MAX_DEPTH: usize = 64;

/// Imports constants and members from one class into another pool.
pub struct PoolImporter<'a> {
    source: &'a ClassFile,
    source_bootstrap: Vec<BootstrapMethod>,
    target: &'a mut ConstantPool,
    bootstrap: Vec<BootstrapMethod>,
    constants: HashMap<u16, u16>,
    bootstrap_indices: HashMap<u16, u16>,
}

impl<'a> PoolImporter<'a> {
    /// Creates an importer from `source` into `target`.
    ///
    /// `target_bootstrap` is the target class's current bootstrap table.
    pub fn new(
        source: &'a ClassFile,
        target: &'a mut ConstantPool,
        target_bootstrap: Vec<BootstrapMethod>,
    ) -> ClassFileResult<Self> {
        Ok(Self {
            source_bootstrap: source.bootstrap_methods()?,
            source,
            target,
            bootstrap: target_bootstrap,
            constants: HashMap::new(),
            bootstrap_indices: HashMap::new(),
        })
    }

    /// Imports the source constant at `index`, returning its target index.
    ///
    /// Index 0 ("no constant") maps to 0.
    pub fn import(&mut self, index: u16) -> ClassFileResult<u16> {
        self.import_at(index, 0)
    }

    /// Imports a field or method with all attributes that can be remapped.
    pub fn import_member(&mut self, member: &MemberInfo) -> ClassFileResult<MemberInfo> {
        Ok(MemberInfo {
            access_flags: member.access_flags,
            name_index: self.import(member.name_index)?,
            descriptor_index: self.import(member.descriptor_index)?,
            attributes: self.import_attributes(&member.attributes)?,
        })
    }

    /// Consumes the importer, returning the target bootstrap table.
    pub fn finish(self) -> Vec<BootstrapMethod> {
        self.bootstrap
    }

    fn import_at(&mut self, index: u16, depth: usize) -> ClassFileResult<u16> {
        if index == 0 {
            return Ok(0);
        }
        if let Some(&mapped) = self.constants.get(&index) {
            return Ok(mapped);
        }
        if depth > MAX_DEPTH {
            return Err(ClassFileError::bad_constant(index, "reference chain too deep"));
        }
        let next = depth + 1;
        let source = self.source;
        let imported = match source.constant_pool.get(index)?.clone() {
            Constant::Unusable => {
                return Err(ClassFileError::bad_constant(index, "unusable slot"));
            }
            constant @ (Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => constant,
            Constant::Class(name) => Constant::Class(self.import_at(name, next)?),
            Constant::String(value) => Constant::String(self.import_at(value, next)?),
            Constant::MethodType(descriptor) => {
                Constant::MethodType(self.import_at(descriptor, next)?)
            }
            Constant::Module(name) => Constant::Module(self.import_at(name, next)?),
            Constant::Package(name) => Constant::Package(self.import_at(name, next)?),
            Constant::FieldRef {
                class,
                name_and_type,
            } => Constant::FieldRef {
                class: self.import_at(class, next)?,
                name_and_type: self.import_at(name_and_type, next)?,
            },
            Constant::MethodRef {
                class,
                name_and_type,
            } => Constant::MethodRef {
                class: self.import_at(class, next)?,
                name_and_type: self.import_at(name_and_type, next)?,
            },
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => Constant::InterfaceMethodRef {
                class: self.import_at(class, next)?,
                name_and_type: self.import_at(name_and_type, next)?,
            },
            Constant::NameAndType { name, descriptor } => Constant::NameAndType {
                name: self.import_at(name, next)?,
                descriptor: self.import_at(descriptor, next)?,
            },
            Constant::MethodHandle { kind, reference } => Constant::MethodHandle {
                kind,
                reference: self.import_at(reference, next)?,
            },
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => Constant::Dynamic {
                bootstrap: self.import_bootstrap(bootstrap, next)?,
                name_and_type: self.import_at(name_and_type, next)?,
            },
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => Constant::InvokeDynamic {
                bootstrap: self.import_bootstrap(bootstrap, next)?,
                name_and_type: self.import_at(name_and_type, next)?,
            },
        };
        let mapped = self.target.intern(imported)?;
        self.constants.insert(index, mapped);
        Ok(mapped)
    }

    fn import_bootstrap(&mut self, index: u16, depth: usize) -> ClassFileResult<u16> {
        if let Some(&mapped) = self.bootstrap_indices.get(&index) {
            return Ok(mapped);
        }
        let method = self
            .source_bootstrap
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| {
                ClassFileError::malformed(format!("bootstrap method {index} does not exist"))
            })?;
        let method_ref = self.import_at(method.method_ref, depth)?;
        let mut arguments = Vec::with_capacity(method.arguments.len());
        for argument in method.arguments {
            arguments.push(self.import_at(argument, depth)?);
        }
        let imported = BootstrapMethod {
            method_ref,
            arguments,
        };
        let position = match self.bootstrap.iter().position(|m| *m == imported) {
            Some(position) => position,
            None => {
                self.bootstrap.push(imported);
                self.bootstrap.len() - 1
            }
        };
        ClassFileError::check_limit("bootstrap methods", position + 1, usize::from(u16::MAX))?;
        let mapped = position as u16;
        self.bootstrap_indices.insert(index, mapped);
        Ok(mapped)
    }

    fn import_attributes(&mut self, attributes: &[Attribute]) -> ClassFileResult<Vec<Attribute>> {
        let mut imported = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let name = self.source.constant_pool.utf8(attribute.name_index)?;
            let info = match name.as_str() {
                "Code" => self.import_code(&attribute.info)?,
                "ConstantValue" | "Signature" => self.remap_u2_list(&attribute.info, false)?,
                "Exceptions" => self.remap_u2_list(&attribute.info, true)?,
                "Synthetic" | "Deprecated" => attribute.info.clone(),
                "MethodParameters" => self.import_method_parameters(&attribute.info)?,
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    self.rewrite(&attribute.info, Self::copy_annotations)?
                }
                "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                    self.rewrite(&attribute.info, |importer, reader, out| {
                        let parameters = reader.u1()?;
                        out.u1(parameters);
                        for _ in 0..parameters {
                            importer.copy_annotations(reader, out)?;
                        }
                        Ok(())
                    })?
                }
                "AnnotationDefault" => self.rewrite(&attribute.info, Self::copy_element_value)?,
                _ => {
                    warn!(attribute = %name, "dropping attribute that cannot be remapped");
                    continue;
                }
            };
            imported.push(Attribute {
                name_index: self.target.utf8_index(&name)?,
                info,
            });
        }
        Ok(imported)
    }

    fn import_code(&mut self, info: &[u8]) -> ClassFileResult<Vec<u8>> {
        let code = CodeAttribute::parse(info)?;
        let mut insns = code.instructions()?;
        for insn in &mut insns {
            if let Some(index) = insn.instruction.constant_index_mut() {
                *index = self.import(*index)?;
            }
        }
        let mut rebuilt = code.reassemble(&self.source.constant_pool, &insns)?;
        for handler in &mut rebuilt.exception_table {
            handler.catch_type = self.import(handler.catch_type)?;
        }

        let mut attributes = Vec::with_capacity(rebuilt.attributes.len());
        for attribute in &rebuilt.attributes {
            let name = self.source.constant_pool.utf8(attribute.name_index)?;
            let info = match name.as_str() {
                "LocalVariableTable" | "LocalVariableTypeTable" => {
                    self.rewrite(&attribute.info, |importer, reader, out| {
                        let count = reader.u2()?;
                        out.u2(count);
                        for _ in 0..count {
                            out.u2(reader.u2()?);
                            out.u2(reader.u2()?);
                            out.u2(importer.import(reader.u2()?)?);
                            out.u2(importer.import(reader.u2()?)?);
                            out.u2(reader.u2()?);
                        }
                        Ok(())
                    })?
                }
                "StackMapTable" => {
                    let mut table = StackMapTable::parse(&attribute.info)?;
                    table.remap_classes(|index| self.import(index))?;
                    table.encode()?
                }
                _ => attribute.info.clone(),
            };
            attributes.push(Attribute {
                name_index: self.target.utf8_index(&name)?,
                info,
            });
        }
        rebuilt.attributes = attributes;
        rebuilt.to_bytes()
    }

    fn remap_u2_list(&mut self, info: &[u8], counted: bool) -> ClassFileResult<Vec<u8>> {
        self.rewrite(info, |importer, reader, out| {
            let count = if counted {
                let count = reader.u2()?;
                out.u2(count);
                count
            } else {
                1
            };
            for _ in 0..count {
                out.u2(importer.import(reader.u2()?)?);
            }
            Ok(())
        })
    }

    fn import_method_parameters(&mut self, info: &[u8]) -> ClassFileResult<Vec<u8>> {
        self.rewrite(info, |importer, reader, out| {
            let count = reader.u1()?;
            out.u1(count);
            for _ in 0..count {
                out.u2(importer.import(reader.u2()?)?);
                out.u2(reader.u2()?);
            }
            Ok(())
        })
    }

    fn rewrite<F>(&mut self, info: &[u8], body: F) -> ClassFileResult<Vec<u8>>
    where
        F: FnOnce(&mut Self, &mut ByteReader<'_>, &mut ByteWriter) -> ClassFileResult<()>,
    {
        let mut reader = ByteReader::new(info);
        let mut out = ByteWriter::with_capacity(info.len());
        body(self, &mut reader, &mut out)?;
        reader.finish()?;
        Ok(out.into_bytes())
    }

    fn copy_annotations(
        &mut self,
        reader: &mut ByteReader<'_>,
        out: &mut ByteWriter,
    ) -> ClassFileResult<()> {
        let count = reader.u2()?;
        out.u2(count);
        for _ in 0..count {
            self.copy_annotation(reader, out)?;
        }
        Ok(())
    }

    fn copy_annotation(
        &mut self,
        reader: &mut ByteReader<'_>,
        out: &mut ByteWriter,
    ) -> ClassFileResult<()> {
        out.u2(self.import(reader.u2()?)?);
        let pairs = reader.u2()?;
        out.u2(pairs);
        for _ in 0..pairs {
            out.u2(self.import(reader.u2()?)?);
            self.copy_element_value(reader, out)?;
        }
        Ok(())
    }

    fn copy_element_value(
        &mut self,
        reader: &mut ByteReader<'_>,
        out: &mut ByteWriter,
    ) -> ClassFileResult<()> {
        let tag = reader.u1()?;
        out.u1(tag);
        match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
                out.u2(self.import(reader.u2()?)?);
            }
            b'e' => {
                out.u2(self.import(reader.u2()?)?);
                out.u2(self.import(reader.u2()?)?);
            }
            b'@' => self.copy_annotation(reader, out)?,
            b'[' => {
                let count = reader.u2()?;
                out.u2(count);
                for _ in 0..count {
                    self.copy_element_value(reader, out)?;
                }
            }
            other => {
                return Err(ClassFileError::malformed(format!(
                    "unknown annotation element tag {other:#04x}"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{opcode, Instruction};

    fn class_with(pool: ConstantPool, name: &str) -> ClassFile {
        let mut pool = pool;
        let this_class = pool.class_index(name).unwrap();
        let super_class = pool.class_index("java/lang/Object").unwrap();
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: 0x21,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn imports_references_recursively_and_reuses_entries() {
        let mut source_pool = ConstantPool::new();
        let call = source_pool
            .method_ref_index("demo/Helper", "help", "()V")
            .unwrap();
        let source = class_with(source_pool, "demo/Source");

        let mut target_pool = ConstantPool::new();
        let existing = target_pool.class_index("demo/Helper").unwrap();
        let mut importer = PoolImporter::new(&source, &mut target_pool, Vec::new()).unwrap();
        let imported = importer.import(call).unwrap();
        assert_eq!(importer.import(call).unwrap(), imported);
        importer.finish();

        assert_eq!(
            target_pool.member_ref(imported).unwrap(),
            ("demo/Helper".into(), "help".into(), "()V".into())
        );
        assert_eq!(target_pool.class_index("demo/Helper").unwrap(), existing);
    }

    #[test]
    fn imports_bootstrap_methods() {
        let mut source_pool = ConstantPool::new();
        let factory = source_pool
            .method_ref_index(
                "java/lang/invoke/LambdaMetafactory",
                "metafactory",
                "()Ljava/lang/invoke/CallSite;",
            )
            .unwrap();
        let handle = source_pool
            .intern(Constant::MethodHandle {
                kind: 6,
                reference: factory,
            })
            .unwrap();
        let nat = source_pool
            .name_and_type_index("run", "()Ljava/lang/Runnable;")
            .unwrap();
        let indy = source_pool
            .intern(Constant::InvokeDynamic {
                bootstrap: 0,
                name_and_type: nat,
            })
            .unwrap();
        let mut source = class_with(source_pool, "demo/Source");
        source
            .set_bootstrap_methods(&[BootstrapMethod {
                method_ref: handle,
                arguments: Vec::new(),
            }])
            .unwrap();

        let existing = BootstrapMethod {
            method_ref: 1,
            arguments: vec![2],
        };
        let mut target_pool = ConstantPool::new();
        let mut importer =
            PoolImporter::new(&source, &mut target_pool, vec![existing.clone()]).unwrap();
        let imported = importer.import(indy).unwrap();
        let table = importer.finish();

        assert_eq!(table.len(), 2);
        assert_eq!(table[0], existing);
        match target_pool.get(imported).unwrap() {
            Constant::InvokeDynamic { bootstrap, .. } => assert_eq!(*bootstrap, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imports_method_code_into_a_crowded_pool() {
        let mut source_pool = ConstantPool::new();
        let greeting = source_pool.string_index("hello").unwrap();
        let code_name = source_pool.utf8_index("Code").unwrap();
        let name = source_pool.utf8_index("greet").unwrap();
        let descriptor = source_pool.utf8_index("()Ljava/lang/String;").unwrap();
        let code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![opcode::LDC, greeting as u8, opcode::ARETURN],
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        let mut source = class_with(source_pool, "demo/Source");
        source.methods.push(MemberInfo {
            access_flags: 1,
            name_index: name,
            descriptor_index: descriptor,
            attributes: vec![Attribute {
                name_index: code_name,
                info: code.to_bytes().unwrap(),
            }],
        });

        // push the target pool past the one-byte ldc range
        let mut target_pool = ConstantPool::new();
        for i in 0..300 {
            target_pool.push(Constant::Integer(i)).unwrap();
        }
        let mut importer = PoolImporter::new(&source, &mut target_pool, Vec::new()).unwrap();
        let method = importer.import_member(&source.methods[0]).unwrap();
        importer.finish();

        let hello = target_pool.utf8_index("hello").unwrap();
        assert_eq!(method.name(&target_pool).unwrap(), "greet");
        let attribute = method.attribute(&target_pool, "Code").unwrap();
        let imported = CodeAttribute::parse(&attribute.info).unwrap();
        let insns = imported.instructions().unwrap();
        match &insns[0].instruction {
            Instruction::Constant { index, .. } => {
                assert!(*index > 255);
                assert_eq!(
                    target_pool.get(*index).unwrap(),
                    &Constant::String(hello)
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(imported.code[0], opcode::LDC_W);
    }

    #[test]
    fn unknown_attributes_are_dropped() {
        let mut source_pool = ConstantPool::new();
        let custom = source_pool.utf8_index("com.example.Custom").unwrap();
        let name = source_pool.utf8_index("x").unwrap();
        let descriptor = source_pool.utf8_index("I").unwrap();
        let source = class_with(source_pool, "demo/Source");
        let field = MemberInfo {
            access_flags: 2,
            name_index: name,
            descriptor_index: descriptor,
            attributes: vec![Attribute {
                name_index: custom,
                info: vec![1, 2, 3],
            }],
        };
        let mut target_pool = ConstantPool::new();
        let mut importer = PoolImporter::new(&source, &mut target_pool, Vec::new()).unwrap();
        let imported = importer.import_member(&field).unwrap();
        assert!(imported.attributes.is_empty());
    }
}
