//! Synthesising small class files for tests.
//!
//! Method bodies are written with symbolic [`Op`]s; labels, frames, line
//! numbers, and exception handlers are pseudo-ops that emit no code.

use splice_classfile::{
    access, opcode, Attribute, ClassFile, CodeAttribute, Constant, ConstantPool, ExceptionHandler,
    FrameKind, MemberInfo, StackMapFrame, StackMapTable, VerificationType,
};
use std::collections::HashMap;

/// A symbolic bytecode operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Push an int constant (`iconst_*`, `bipush`, `sipush`, or `ldc`).
    Iconst(i32),
    /// Push a string literal.
    Ldc(String),
    /// Load a reference local.
    Aload(u8),
    /// Load an int local.
    Iload(u8),
    /// Store an int local.
    Istore(u8),
    /// `iadd`
    Iadd,
    /// `dup`
    Dup,
    /// `pop`
    Pop,
    /// `ireturn`
    Ireturn,
    /// `areturn`
    Areturn,
    /// `return`
    Return,
    /// `athrow`
    Athrow,
    /// `new`
    New(String),
    /// `getfield owner.name:descriptor`
    GetField(String, String, String),
    /// `putfield owner.name:descriptor`
    PutField(String, String, String),
    /// `invokestatic owner.name:descriptor`
    InvokeStatic(String, String, String),
    /// `invokespecial owner.name:descriptor`
    InvokeSpecial(String, String, String),
    /// `invokevirtual owner.name:descriptor`
    InvokeVirtual(String, String, String),
    /// `ifeq label`
    IfEq(String),
    /// `ifne label`
    IfNe(String),
    /// `goto label`
    Goto(String),
    /// Marks the current offset.
    Label(String),
    /// A `same` stack-map frame at the current offset.
    Frame,
    /// A frame with one object on the stack (exception handlers).
    StackFrame(String),
    /// A line-number entry at the current offset.
    Line(u16),
    /// Exception handler covering `start..end`, entered at `handler`.
    Handler {
        /// Start label.
        start: String,
        /// End label (exclusive).
        end: String,
        /// Handler label.
        handler: String,
        /// Caught class, or any.
        catch: Option<String>,
    },
}

impl Op {
    /// `invokestatic` shorthand.
    pub fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::InvokeStatic(owner.into(), name.into(), descriptor.into())
    }

    /// `invokespecial` shorthand.
    pub fn invoke_special(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::InvokeSpecial(owner.into(), name.into(), descriptor.into())
    }

    /// `getfield` shorthand.
    pub fn get_field(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::GetField(owner.into(), name.into(), descriptor.into())
    }

    /// `putfield` shorthand.
    pub fn put_field(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::PutField(owner.into(), name.into(), descriptor.into())
    }

    /// Label shorthand.
    pub fn label(name: &str) -> Self {
        Self::Label(name.into())
    }
}

/// Builds a version-52 class file.
pub struct ClassBuilder {
    name: String,
    pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    fields: Vec<MemberInfo>,
    methods: Vec<MemberInfo>,
}

impl ClassBuilder {
    /// A public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.class_index(name).expect("pool");
        let super_class = pool.class_index("java/lang/Object").expect("pool");
        Self {
            name: name.to_string(),
            pool,
            this_class,
            super_class,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Internal name of the class being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access_flags, name, descriptor);
        self.fields.push(member);
        self
    }

    /// Adds a `private static final String` with a constant value.
    #[must_use]
    pub fn string_constant(mut self, name: &str, value: &str) -> Self {
        let mut member = self.member(
            access::PRIVATE | access::STATIC | access::FINAL,
            name,
            "Ljava/lang/String;",
        );
        let name_index = self.pool.utf8_index("ConstantValue").expect("pool");
        let value = self.pool.string_index(value).expect("pool");
        member.attributes.push(Attribute {
            name_index,
            info: value.to_be_bytes().to_vec(),
        });
        self.fields.push(member);
        self
    }

    /// Adds the default `<init>` calling `Object.<init>`.
    #[must_use]
    pub fn default_constructor(self) -> Self {
        self.method(
            access::PUBLIC,
            "<init>",
            "()V",
            vec![
                Op::Aload(0),
                Op::invoke_special("java/lang/Object", "<init>", "()V"),
                Op::Return,
            ],
        )
    }

    /// Adds a method with a body.
    #[must_use]
    pub fn method(mut self, access_flags: u16, name: &str, descriptor: &str, ops: Vec<Op>) -> Self {
        let mut member = self.member(access_flags, name, descriptor);
        let code = self.assemble(&ops);
        let name_index = self.pool.utf8_index("Code").expect("pool");
        member.attributes.push(Attribute {
            name_index,
            info: code.to_bytes().expect("code"),
        });
        self.methods.push(member);
        self
    }

    /// Adds an `abstract` or `native` method with no body.
    #[must_use]
    pub fn bodiless_method(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access_flags, name, descriptor);
        self.methods.push(member);
        self
    }

    /// Finishes the class model.
    pub fn build(self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.pool,
            access_flags: access::PUBLIC | access::SUPER,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: Vec::new(),
            fields: self.fields,
            methods: self.methods,
            attributes: Vec::new(),
        }
    }

    /// Finishes and serialises the class.
    pub fn bytes(self) -> Vec<u8> {
        self.build().to_bytes().expect("serialise class")
    }

    fn member(&mut self, access_flags: u16, name: &str, descriptor: &str) -> MemberInfo {
        MemberInfo {
            access_flags,
            name_index: self.pool.utf8_index(name).expect("pool"),
            descriptor_index: self.pool.utf8_index(descriptor).expect("pool"),
            attributes: Vec::new(),
        }
    }

    fn assemble(&mut self, ops: &[Op]) -> CodeAttribute {
        // first pass: intern constants and lay out labels
        let mut operands = Vec::with_capacity(ops.len());
        let mut labels = HashMap::new();
        let mut pc: u32 = 0;
        for op in ops {
            let operand = self.operand(op);
            if let Op::Label(name) = op {
                labels.insert(name.clone(), pc);
            }
            pc += op_size(op, operand);
            operands.push(operand);
        }
        let target = |name: &String| -> u32 {
            *labels
                .get(name)
                .unwrap_or_else(|| panic!("unknown label {name}"))
        };

        let mut code = Vec::with_capacity(pc as usize);
        let mut frames = Vec::new();
        let mut lines = Vec::new();
        let mut handlers = Vec::new();
        let mut max_locals: u16 = 1;
        for (op, operand) in ops.iter().zip(operands) {
            let at = code.len() as u32;
            match op {
                Op::Iconst(value) => match *value {
                    -1..=5 => code.push((0x03 + value) as u8),
                    v if i8::try_from(v).is_ok() => code.extend([opcode::BIPUSH, v as i8 as u8]),
                    v if i16::try_from(v).is_ok() => {
                        code.push(opcode::SIPUSH);
                        code.extend((v as i16).to_be_bytes());
                    }
                    _ => push_ldc(&mut code, operand),
                },
                Op::Ldc(_) => push_ldc(&mut code, operand),
                Op::Aload(slot) => push_local(&mut code, 0x2a, opcode::ALOAD, *slot, &mut max_locals),
                Op::Iload(slot) => push_local(&mut code, 0x1a, opcode::ILOAD, *slot, &mut max_locals),
                Op::Istore(slot) => push_local(&mut code, 0x3b, opcode::ISTORE, *slot, &mut max_locals),
                Op::Iadd => code.push(0x60),
                Op::Dup => code.push(0x59),
                Op::Pop => code.push(0x57),
                Op::Ireturn => code.push(opcode::IRETURN),
                Op::Areturn => code.push(opcode::ARETURN),
                Op::Return => code.push(opcode::RETURN),
                Op::Athrow => code.push(opcode::ATHROW),
                Op::New(_) => push_indexed(&mut code, opcode::NEW, operand),
                Op::GetField(..) => push_indexed(&mut code, opcode::GETFIELD, operand),
                Op::PutField(..) => push_indexed(&mut code, opcode::PUTFIELD, operand),
                Op::InvokeStatic(..) => push_indexed(&mut code, opcode::INVOKESTATIC, operand),
                Op::InvokeSpecial(..) => push_indexed(&mut code, opcode::INVOKESPECIAL, operand),
                Op::InvokeVirtual(..) => push_indexed(&mut code, opcode::INVOKEVIRTUAL, operand),
                Op::IfEq(label) => push_branch(&mut code, opcode::IFEQ, at, target(label)),
                Op::IfNe(label) => push_branch(&mut code, 0x9a, at, target(label)),
                Op::Goto(label) => push_branch(&mut code, opcode::GOTO, at, target(label)),
                Op::Label(_) => {}
                Op::Frame => frames.push(StackMapFrame {
                    offset: at,
                    kind: FrameKind::Same,
                }),
                Op::StackFrame(_) => frames.push(StackMapFrame {
                    offset: at,
                    kind: FrameKind::SameLocals1StackItem(VerificationType::Object(operand)),
                }),
                Op::Line(line) => lines.push((at as u16, *line)),
                Op::Handler {
                    start,
                    end,
                    handler,
                    ..
                } => handlers.push(ExceptionHandler {
                    start_pc: target(start) as u16,
                    end_pc: target(end) as u16,
                    handler_pc: target(handler) as u16,
                    catch_type: operand,
                }),
            }
        }

        let mut attributes = Vec::new();
        if !lines.is_empty() {
            let mut info = (lines.len() as u16).to_be_bytes().to_vec();
            for (start, line) in lines {
                info.extend(start.to_be_bytes());
                info.extend(line.to_be_bytes());
            }
            attributes.push(Attribute {
                name_index: self.pool.utf8_index("LineNumberTable").expect("pool"),
                info,
            });
        }
        if !frames.is_empty() {
            let info = StackMapTable { frames }.encode().expect("frames");
            attributes.push(Attribute {
                name_index: self.pool.utf8_index("StackMapTable").expect("pool"),
                info,
            });
        }

        CodeAttribute {
            max_stack: 4,
            max_locals: max_locals.max(4),
            code,
            exception_table: handlers,
            attributes,
        }
    }

    fn operand(&mut self, op: &Op) -> u16 {
        let pool = &mut self.pool;
        match op {
            Op::Iconst(value) if i16::try_from(*value).is_err() => {
                pool.intern(Constant::Integer(*value)).expect("pool")
            }
            Op::Ldc(text) => pool.string_index(text).expect("pool"),
            Op::New(class) | Op::StackFrame(class) => pool.class_index(class).expect("pool"),
            Op::GetField(owner, name, descriptor) | Op::PutField(owner, name, descriptor) => {
                pool.field_ref_index(owner, name, descriptor).expect("pool")
            }
            Op::InvokeStatic(owner, name, descriptor)
            | Op::InvokeSpecial(owner, name, descriptor)
            | Op::InvokeVirtual(owner, name, descriptor) => {
                pool.method_ref_index(owner, name, descriptor).expect("pool")
            }
            Op::Handler {
                catch: Some(class), ..
            } => pool.class_index(class).expect("pool"),
            _ => 0,
        }
    }
}

fn op_size(op: &Op, operand: u16) -> u32 {
    match op {
        Op::Iconst(value) => match *value {
            -1..=5 => 1,
            v if i8::try_from(v).is_ok() => 2,
            v if i16::try_from(v).is_ok() => 3,
            _ => ldc_size(operand),
        },
        Op::Ldc(_) => ldc_size(operand),
        Op::Aload(slot) | Op::Iload(slot) | Op::Istore(slot) => {
            if *slot <= 3 {
                1
            } else {
                2
            }
        }
        Op::Iadd | Op::Dup | Op::Pop | Op::Ireturn | Op::Areturn | Op::Return | Op::Athrow => 1,
        Op::New(_)
        | Op::GetField(..)
        | Op::PutField(..)
        | Op::InvokeStatic(..)
        | Op::InvokeSpecial(..)
        | Op::InvokeVirtual(..)
        | Op::IfEq(_)
        | Op::IfNe(_)
        | Op::Goto(_) => 3,
        Op::Label(_) | Op::Frame | Op::StackFrame(_) | Op::Line(_) | Op::Handler { .. } => 0,
    }
}

fn ldc_size(index: u16) -> u32 {
    if index <= 0xFF {
        2
    } else {
        3
    }
}

fn push_ldc(code: &mut Vec<u8>, index: u16) {
    if index <= 0xFF {
        code.extend([opcode::LDC, index as u8]);
    } else {
        code.push(opcode::LDC_W);
        code.extend(index.to_be_bytes());
    }
}

fn push_local(code: &mut Vec<u8>, short_base: u8, long: u8, slot: u8, max_locals: &mut u16) {
    if slot <= 3 {
        code.push(short_base + slot);
    } else {
        code.extend([long, slot]);
    }
    *max_locals = (*max_locals).max(u16::from(slot) + 1);
}

fn push_indexed(code: &mut Vec<u8>, op: u8, index: u16) {
    code.push(op);
    code.extend(index.to_be_bytes());
}

fn push_branch(code: &mut Vec<u8>, op: u8, at: u32, target: u32) {
    let delta = (i64::from(target) - i64::from(at)) as i16;
    code.push(op);
    code.extend(delta.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_classfile::Instruction;

    #[test]
    fn built_class_parses() {
        let bytes = ClassBuilder::new("demo/Widget")
            .field(access::PRIVATE, "count", "I")
            .default_constructor()
            .method(
                access::PUBLIC,
                "size",
                "()I",
                vec![Op::Aload(0), Op::get_field("demo/Widget", "count", "I"), Op::Ireturn],
            )
            .bytes();
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.name().unwrap(), "demo/Widget");
        assert!(class.field_named("count").is_some());
        assert_eq!(class.methods.len(), 2);
    }

    #[test]
    fn labels_resolve_to_offsets() {
        let class = ClassBuilder::new("demo/Branchy")
            .method(
                access::PUBLIC,
                "pick",
                "(I)I",
                vec![
                    Op::Iload(1),
                    Op::IfEq("zero".into()),
                    Op::Iconst(1),
                    Op::Ireturn,
                    Op::label("zero"),
                    Op::Frame,
                    Op::Iconst(0),
                    Op::Ireturn,
                ],
            )
            .build();
        let method = class.method_named("pick").unwrap();
        let code =
            CodeAttribute::parse(&method.attribute(&class.constant_pool, "Code").unwrap().info)
                .unwrap();
        assert_eq!(code.code, vec![0x1b, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]);
        let insns = code.instructions().unwrap();
        assert_eq!(
            insns[1].instruction,
            Instruction::Branch {
                opcode: opcode::IFEQ,
                target: 6
            }
        );
    }
}
