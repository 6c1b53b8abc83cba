//! `Code` attribute decoding and bytecode re-assembly.
//!
//! Bytecode is decoded into a list of [`Insn`]s whose branch targets are
//! absolute offsets in the *original* code. Callers may insert new
//! instructions (with no origin) or rewrite operands, then call
//! [`CodeAttribute::reassemble`], which lays the code out again and
//! relocates everything that points into it: branches, switch tables,
//! exception ranges, line and local-variable tables, and stack-map frames.
//!
//! Inserted instructions bind to the next original instruction: a branch
//! that targeted that instruction now lands on the first inserted one.

use crate::constant::ConstantPool;
use crate::error::{ClassFileError, ClassFileResult};
use crate::frames::StackMapTable;
use crate::model::Attribute;
use crate::reader::{read_attributes, ByteReader};
use crate::writer::{write_attributes, ByteWriter};
use std::collections::HashMap;
use tracing::warn;

/// JVM opcodes referenced by name in this workspace.
pub mod opcode {
    /// `bipush`
    pub const BIPUSH: u8 = 0x10;
    /// `sipush`
    pub const SIPUSH: u8 = 0x11;
    /// `ldc`
    pub const LDC: u8 = 0x12;
    /// `ldc_w`
    pub const LDC_W: u8 = 0x13;
    /// `ldc2_w`
    pub const LDC2_W: u8 = 0x14;
    /// `iload`
    pub const ILOAD: u8 = 0x15;
    /// `aload`
    pub const ALOAD: u8 = 0x19;
    /// `aload_0`
    pub const ALOAD_0: u8 = 0x2a;
    /// `istore`
    pub const ISTORE: u8 = 0x36;
    /// `astore`
    pub const ASTORE: u8 = 0x3a;
    /// `iinc`
    pub const IINC: u8 = 0x84;
    /// `ifeq`
    pub const IFEQ: u8 = 0x99;
    /// `goto`
    pub const GOTO: u8 = 0xa7;
    /// `jsr`
    pub const JSR: u8 = 0xa8;
    /// `ret`
    pub const RET: u8 = 0xa9;
    /// `tableswitch`
    pub const TABLESWITCH: u8 = 0xaa;
    /// `lookupswitch`
    pub const LOOKUPSWITCH: u8 = 0xab;
    /// `ireturn`
    pub const IRETURN: u8 = 0xac;
    /// `areturn`
    pub const ARETURN: u8 = 0xb0;
    /// `return`
    pub const RETURN: u8 = 0xb1;
    /// `getstatic`
    pub const GETSTATIC: u8 = 0xb2;
    /// `getfield`
    pub const GETFIELD: u8 = 0xb4;
    /// `putfield`
    pub const PUTFIELD: u8 = 0xb5;
    /// `invokevirtual`
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    /// `invokespecial`
    pub const INVOKESPECIAL: u8 = 0xb7;
    /// `invokestatic`
    pub const INVOKESTATIC: u8 = 0xb8;
    /// `invokeinterface`
    pub const INVOKEINTERFACE: u8 = 0xb9;
    /// `invokedynamic`
    pub const INVOKEDYNAMIC: u8 = 0xba;
    /// `new`
    pub const NEW: u8 = 0xbb;
    /// `newarray`
    pub const NEWARRAY: u8 = 0xbc;
    /// `anewarray`
    pub const ANEWARRAY: u8 = 0xbd;
    /// `athrow`
    pub const ATHROW: u8 = 0xbf;
    /// `checkcast`
    pub const CHECKCAST: u8 = 0xc0;
    /// `instanceof`
    pub const INSTANCEOF: u8 = 0xc1;
    /// `wide`
    pub const WIDE: u8 = 0xc4;
    /// `multianewarray`
    pub const MULTIANEWARRAY: u8 = 0xc5;
    /// `ifnull`
    pub const IFNULL: u8 = 0xc6;
    /// `ifnonnull`
    pub const IFNONNULL: u8 = 0xc7;
    /// `goto_w`
    pub const GOTO_W: u8 = 0xc8;
    /// `jsr_w`
    pub const JSR_W: u8 = 0xc9;

    /// Returns true for the six normal-return opcodes.
    pub fn is_return(op: u8) -> bool {
        (IRETURN..=RETURN).contains(&op)
    }
}

/// A decoded bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Instruction without operands.
    Simple(u8),
    /// `bipush` (value is the signed byte) or `newarray` (array type).
    Byte {
        /// Opcode.
        opcode: u8,
        /// Operand byte.
        value: u8,
    },
    /// `sipush`.
    Short {
        /// Opcode.
        opcode: u8,
        /// Operand.
        value: u16,
    },
    /// Instruction with a single constant-pool operand.
    ///
    /// `ldc` with an index above 255 is emitted as `ldc_w`.
    Constant {
        /// Opcode.
        opcode: u8,
        /// Constant-pool index.
        index: u16,
    },
    /// Load, store, or `ret` of a local variable slot.
    Local {
        /// Opcode.
        opcode: u8,
        /// Local slot.
        index: u16,
        /// Whether the original used the `wide` prefix.
        wide: bool,
    },
    /// `iinc`.
    Iinc {
        /// Local slot.
        index: u16,
        /// Increment.
        delta: i16,
        /// Whether the original used the `wide` prefix.
        wide: bool,
    },
    /// `invokeinterface`.
    InvokeInterface {
        /// Constant-pool index.
        index: u16,
        /// Argument slot count.
        count: u8,
    },
    /// `invokedynamic`.
    InvokeDynamic {
        /// Constant-pool index.
        index: u16,
    },
    /// `multianewarray`.
    MultiANewArray {
        /// Constant-pool index.
        index: u16,
        /// Dimensions.
        dimensions: u8,
    },
    /// Conditional or unconditional branch.
    Branch {
        /// Opcode.
        opcode: u8,
        /// Absolute target offset in the original code.
        target: u32,
    },
    /// `tableswitch`.
    TableSwitch {
        /// Default target.
        default: u32,
        /// Lowest key.
        low: i32,
        /// Targets for `low..=low + targets.len() - 1`.
        targets: Vec<u32>,
    },
    /// `lookupswitch`.
    LookupSwitch {
        /// Default target.
        default: u32,
        /// Sorted `(key, target)` pairs.
        pairs: Vec<(i32, u32)>,
    },
}

impl Instruction {
    /// The opcode this instruction is written with.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Simple(op) => *op,
            Self::Byte { opcode, .. }
            | Self::Short { opcode, .. }
            | Self::Constant { opcode, .. }
            | Self::Local { opcode, .. }
            | Self::Branch { opcode, .. } => *opcode,
            Self::Iinc { .. } => opcode::IINC,
            Self::InvokeInterface { .. } => opcode::INVOKEINTERFACE,
            Self::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
            Self::MultiANewArray { .. } => opcode::MULTIANEWARRAY,
            Self::TableSwitch { .. } => opcode::TABLESWITCH,
            Self::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
        }
    }

    /// The constant-pool operand, if any.
    pub fn constant_index(&self) -> Option<u16> {
        match self {
            Self::Constant { index, .. }
            | Self::InvokeInterface { index, .. }
            | Self::InvokeDynamic { index }
            | Self::MultiANewArray { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Mutable access to the constant-pool operand, if any.
    pub fn constant_index_mut(&mut self) -> Option<&mut u16> {
        match self {
            Self::Constant { index, .. }
            | Self::InvokeInterface { index, .. }
            | Self::InvokeDynamic { index }
            | Self::MultiANewArray { index, .. } => Some(index),
            _ => None,
        }
    }

    fn size_at(&self, pc: u32) -> u32 {
        match self {
            Self::Simple(_) => 1,
            Self::Byte { .. } => 2,
            Self::Short { .. } => 3,
            Self::Constant { opcode, index } => {
                if *opcode == opcode::LDC && *index <= 0xFF {
                    2
                } else {
                    3
                }
            }
            Self::Local { index, wide, .. } => {
                if *wide || *index > 0xFF {
                    4
                } else {
                    2
                }
            }
            Self::Iinc { index, delta, wide } => {
                if needs_wide_iinc(*index, *delta, *wide) {
                    6
                } else {
                    3
                }
            }
            Self::InvokeInterface { .. } | Self::InvokeDynamic { .. } => 5,
            Self::MultiANewArray { .. } => 4,
            Self::Branch { opcode, .. } => {
                if is_wide_branch(*opcode) {
                    5
                } else {
                    3
                }
            }
            Self::TableSwitch { targets, .. } => 1 + padding(pc) + 12 + 4 * targets.len() as u32,
            Self::LookupSwitch { pairs, .. } => 1 + padding(pc) + 8 + 8 * pairs.len() as u32,
        }
    }

    fn encode(&self, out: &mut ByteWriter, pc: u32, relocation: &Relocation) -> ClassFileResult<()> {
        match self {
            Self::Simple(op) => out.u1(*op),
            Self::Byte { opcode, value } => {
                out.u1(*opcode);
                out.u1(*value);
            }
            Self::Short { opcode, value } => {
                out.u1(*opcode);
                out.u2(*value);
            }
            Self::Constant { opcode, index } => {
                if *opcode == opcode::LDC && *index <= 0xFF {
                    out.u1(opcode::LDC);
                    out.u1(*index as u8);
                } else {
                    out.u1(if *opcode == opcode::LDC {
                        opcode::LDC_W
                    } else {
                        *opcode
                    });
                    out.u2(*index);
                }
            }
            Self::Local {
                opcode,
                index,
                wide,
            } => {
                if *wide || *index > 0xFF {
                    out.u1(opcode::WIDE);
                    out.u1(*opcode);
                    out.u2(*index);
                } else {
                    out.u1(*opcode);
                    out.u1(*index as u8);
                }
            }
            Self::Iinc { index, delta, wide } => {
                if needs_wide_iinc(*index, *delta, *wide) {
                    out.u1(opcode::WIDE);
                    out.u1(opcode::IINC);
                    out.u2(*index);
                    out.u2(*delta as u16);
                } else {
                    out.u1(opcode::IINC);
                    out.u1(*index as u8);
                    out.u1(*delta as i8 as u8);
                }
            }
            Self::InvokeInterface { index, count } => {
                out.u1(opcode::INVOKEINTERFACE);
                out.u2(*index);
                out.u1(*count);
                out.u1(0);
            }
            Self::InvokeDynamic { index } => {
                out.u1(opcode::INVOKEDYNAMIC);
                out.u2(*index);
                out.u2(0);
            }
            Self::MultiANewArray { index, dimensions } => {
                out.u1(opcode::MULTIANEWARRAY);
                out.u2(*index);
                out.u1(*dimensions);
            }
            Self::Branch { opcode, target } => {
                let target = relocation.map(*target)?;
                let delta = i64::from(target) - i64::from(pc);
                out.u1(*opcode);
                if is_wide_branch(*opcode) {
                    out.u4(delta as i32 as u32);
                } else {
                    let short = i16::try_from(delta).map_err(|_| ClassFileError::BranchOverflow {
                        offset: pc,
                        target,
                    })?;
                    out.u2(short as u16);
                }
            }
            Self::TableSwitch {
                default,
                low,
                targets,
            } => {
                out.u1(opcode::TABLESWITCH);
                write_padding(out, pc);
                out.u4(switch_delta(relocation, *default, pc)?);
                out.u4(*low as u32);
                let high = i64::from(*low) + targets.len() as i64 - 1;
                out.u4(high as i32 as u32);
                for target in targets {
                    out.u4(switch_delta(relocation, *target, pc)?);
                }
            }
            Self::LookupSwitch { default, pairs } => {
                out.u1(opcode::LOOKUPSWITCH);
                write_padding(out, pc);
                out.u4(switch_delta(relocation, *default, pc)?);
                out.u4(pairs.len() as u32);
                for (key, target) in pairs {
                    out.u4(*key as u32);
                    out.u4(switch_delta(relocation, *target, pc)?);
                }
            }
        }
        Ok(())
    }
}

fn needs_wide_iinc(index: u16, delta: i16, wide: bool) -> bool {
    wide || index > 0xFF || i8::try_from(delta).is_err()
}

fn is_wide_branch(op: u8) -> bool {
    op == opcode::GOTO_W || op == opcode::JSR_W
}

fn padding(pc: u32) -> u32 {
    (4 - (pc + 1) % 4) % 4
}

fn write_padding(out: &mut ByteWriter, pc: u32) {
    for _ in 0..padding(pc) {
        out.u1(0);
    }
}

fn switch_delta(relocation: &Relocation, target: u32, pc: u32) -> ClassFileResult<u32> {
    let target = relocation.map(target)?;
    Ok((i64::from(target) - i64::from(pc)) as i32 as u32)
}

/// An instruction plus the offset it was decoded from.
///
/// Instructions created by a rewriter have no origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Offset in the original code, if decoded.
    pub origin: Option<u32>,
    /// The instruction.
    pub instruction: Instruction,
}

impl Insn {
    /// A new instruction with no origin.
    pub fn inserted(instruction: Instruction) -> Self {
        Self {
            origin: None,
            instruction,
        }
    }
}

/// Decode a bytecode array.
///
/// # Errors
///
/// Returns an error on truncated instructions, reserved opcodes, or
/// branch targets outside the code array.
pub fn decode(code: &[u8]) -> ClassFileResult<Vec<Insn>> {
    let mut reader = ByteReader::new(code);
    let mut insns = Vec::new();
    while !reader.is_empty() {
        let pc = reader.position() as u32;
        let instruction = decode_one(&mut reader, pc, code.len())?;
        insns.push(Insn {
            origin: Some(pc),
            instruction,
        });
    }
    Ok(insns)
}

fn decode_one(reader: &mut ByteReader<'_>, pc: u32, len: usize) -> ClassFileResult<Instruction> {
    let op = reader.u1()?;
    let branch = |delta: i64| -> ClassFileResult<u32> {
        let target = i64::from(pc) + delta;
        if target < 0 || target as usize >= len {
            return Err(ClassFileError::invalid_bytecode(
                pc,
                format!("branch target {target} outside code"),
            ));
        }
        Ok(target as u32)
    };
    Ok(match op {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => Instruction::Simple(op),
        opcode::BIPUSH | opcode::NEWARRAY => Instruction::Byte {
            opcode: op,
            value: reader.u1()?,
        },
        opcode::SIPUSH => Instruction::Short {
            opcode: op,
            value: reader.u2()?,
        },
        opcode::LDC => Instruction::Constant {
            opcode: op,
            index: u16::from(reader.u1()?),
        },
        opcode::LDC_W | opcode::LDC2_W | 0xb2..=0xb8 | opcode::NEW | opcode::ANEWARRAY
        | opcode::CHECKCAST | opcode::INSTANCEOF => Instruction::Constant {
            opcode: op,
            index: reader.u2()?,
        },
        opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET => {
            Instruction::Local {
                opcode: op,
                index: u16::from(reader.u1()?),
                wide: false,
            }
        }
        opcode::IINC => Instruction::Iinc {
            index: u16::from(reader.u1()?),
            delta: i16::from(reader.i1()?),
            wide: false,
        },
        opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL => Instruction::Branch {
            opcode: op,
            target: branch(i64::from(reader.i2()?))?,
        },
        opcode::GOTO_W | opcode::JSR_W => Instruction::Branch {
            opcode: op,
            target: branch(i64::from(reader.i4()?))?,
        },
        opcode::TABLESWITCH => {
            reader.align4()?;
            let default = branch(i64::from(reader.i4()?))?;
            let low = reader.i4()?;
            let high = reader.i4()?;
            if high < low {
                return Err(ClassFileError::invalid_bytecode(pc, "tableswitch high < low"));
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            if count > len {
                return Err(ClassFileError::invalid_bytecode(pc, "tableswitch too large"));
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(branch(i64::from(reader.i4()?))?);
            }
            Instruction::TableSwitch {
                default,
                low,
                targets,
            }
        }
        opcode::LOOKUPSWITCH => {
            reader.align4()?;
            let default = branch(i64::from(reader.i4()?))?;
            let count = reader.i4()?;
            if count < 0 || count as usize > len {
                return Err(ClassFileError::invalid_bytecode(pc, "bad lookupswitch count"));
            }
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = reader.i4()?;
                pairs.push((key, branch(i64::from(reader.i4()?))?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        opcode::INVOKEINTERFACE => {
            let index = reader.u2()?;
            let count = reader.u1()?;
            reader.u1()?;
            Instruction::InvokeInterface { index, count }
        }
        opcode::INVOKEDYNAMIC => {
            let index = reader.u2()?;
            reader.u2()?;
            Instruction::InvokeDynamic { index }
        }
        opcode::MULTIANEWARRAY => Instruction::MultiANewArray {
            index: reader.u2()?,
            dimensions: reader.u1()?,
        },
        opcode::WIDE => {
            let inner = reader.u1()?;
            match inner {
                opcode::IINC => Instruction::Iinc {
                    index: reader.u2()?,
                    delta: reader.i2()?,
                    wide: true,
                },
                opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET => {
                    Instruction::Local {
                        opcode: inner,
                        index: reader.u2()?,
                        wide: true,
                    }
                }
                other => {
                    return Err(ClassFileError::invalid_bytecode(
                        pc,
                        format!("opcode {other:#04x} cannot be widened"),
                    ))
                }
            }
        }
        other => {
            return Err(ClassFileError::invalid_bytecode(
                pc,
                format!("reserved or unknown opcode {other:#04x}"),
            ))
        }
    })
}

/// Mapping from original code offsets to re-assembled offsets.
#[derive(Debug, Clone, Default)]
pub struct Relocation {
    offsets: HashMap<u32, u32>,
}

impl Relocation {
    /// Maps an original instruction offset (or the original code length).
    pub fn map(&self, offset: u32) -> ClassFileResult<u32> {
        self.offsets
            .get(&offset)
            .copied()
            .ok_or(ClassFileError::UnmappedOffset { offset })
    }

    /// Maps a `(start, length)` range.
    pub fn map_range(&self, start: u32, length: u32) -> ClassFileResult<(u32, u32)> {
        let new_start = self.map(start)?;
        let new_end = self.map(start + length)?;
        Ok((new_start, new_end - new_start))
    }

    /// Returns true if every offset maps to itself.
    pub fn is_identity(&self) -> bool {
        self.offsets.iter().all(|(from, to)| from == to)
    }
}

/// Lay out and encode instructions.
///
/// `original_len` is the length of the code the instructions were decoded
/// from; it is mapped so that exclusive range ends can be relocated.
///
/// # Errors
///
/// Returns an error if a branch no longer fits its encoding, a target is
/// not an instruction boundary, or the code exceeds 65535 bytes.
pub fn assemble(insns: &[Insn], original_len: u32) -> ClassFileResult<(Vec<u8>, Relocation)> {
    let mut relocation = Relocation::default();
    let mut positions = Vec::with_capacity(insns.len());
    let mut pending: Option<u32> = None;
    let mut pc: u32 = 0;
    for insn in insns {
        positions.push(pc);
        match insn.origin {
            Some(origin) => {
                relocation
                    .offsets
                    .insert(origin, pending.take().unwrap_or(pc));
            }
            None => {
                pending.get_or_insert(pc);
            }
        }
        pc += insn.instruction.size_at(pc);
        ClassFileError::check_limit("code length", pc as usize, 0xFFFF)?;
    }
    relocation
        .offsets
        .insert(original_len, pending.take().unwrap_or(pc));

    let mut out = ByteWriter::with_capacity(pc as usize);
    for (insn, position) in insns.iter().zip(positions) {
        insn.instruction.encode(&mut out, position, &relocation)?;
    }
    debug_assert_eq!(out.len(), pc as usize);
    Ok((out.into_bytes(), relocation))
}

/// One entry of a method's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive).
    pub start_pc: u16,
    /// End of the protected range (exclusive).
    pub end_pc: u16,
    /// Handler entry point.
    pub handler_pc: u16,
    /// `Class` index of the caught type, or 0 for any.
    pub catch_type: u16,
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth.
    pub max_stack: u16,
    /// Number of local variable slots.
    pub max_locals: u16,
    /// Raw bytecode.
    pub code: Vec<u8>,
    /// Exception table.
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes (`LineNumberTable`, `StackMapTable`, ...).
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decodes a `Code` attribute payload.
    pub fn parse(info: &[u8]) -> ClassFileResult<Self> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.u2()?;
        let max_locals = reader.u2()?;
        let code_length = reader.u4()? as usize;
        let code = reader.bytes(code_length)?.to_vec();
        let handler_count = reader.u2()?;
        let mut exception_table = Vec::with_capacity(usize::from(handler_count));
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: reader.u2()?,
                end_pc: reader.u2()?,
                handler_pc: reader.u2()?,
                catch_type: reader.u2()?,
            });
        }
        let attributes = read_attributes(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Encodes the attribute payload.
    pub fn to_bytes(&self) -> ClassFileResult<Vec<u8>> {
        let mut out = ByteWriter::with_capacity(self.code.len() + 64);
        out.u2(self.max_stack);
        out.u2(self.max_locals);
        ClassFileError::check_limit("code length", self.code.len(), 0xFFFF)?;
        out.u4(self.code.len() as u32);
        out.bytes(&self.code);
        out.count_u2("exception table", self.exception_table.len())?;
        for handler in &self.exception_table {
            out.u2(handler.start_pc);
            out.u2(handler.end_pc);
            out.u2(handler.handler_pc);
            out.u2(handler.catch_type);
        }
        write_attributes(&mut out, &self.attributes)?;
        Ok(out.into_bytes())
    }

    /// Decodes the bytecode.
    pub fn instructions(&self) -> ClassFileResult<Vec<Insn>> {
        decode(&self.code)
    }

    /// Re-assembles the method from an edited instruction list.
    ///
    /// `pool` is used to recognise nested attribute names. Stack sizes are
    /// left unchanged; callers adjust `max_stack` for what they inserted.
    /// Nested attributes that cannot be relocated are dropped.
    pub fn reassemble(&self, pool: &ConstantPool, insns: &[Insn]) -> ClassFileResult<Self> {
        let (code, relocation) = assemble(insns, self.code.len() as u32)?;

        let mut exception_table = Vec::with_capacity(self.exception_table.len());
        for handler in &self.exception_table {
            exception_table.push(ExceptionHandler {
                start_pc: map_u16(&relocation, handler.start_pc)?,
                end_pc: map_u16(&relocation, handler.end_pc)?,
                handler_pc: map_u16(&relocation, handler.handler_pc)?,
                catch_type: handler.catch_type,
            });
        }

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            let name = pool.utf8(attribute.name_index)?;
            let info = match name.as_str() {
                "LineNumberTable" => relocate_line_numbers(&attribute.info, &relocation)?,
                "LocalVariableTable" | "LocalVariableTypeTable" => {
                    relocate_local_variables(&attribute.info, &relocation)?
                }
                "StackMapTable" => {
                    let mut table = StackMapTable::parse(&attribute.info)?;
                    table.relocate(&relocation)?;
                    table.encode()?
                }
                _ => {
                    warn!(attribute = %name, "dropping code attribute that cannot be relocated");
                    continue;
                }
            };
            attributes.push(Attribute {
                name_index: attribute.name_index,
                info,
            });
        }

        Ok(Self {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

fn map_u16(relocation: &Relocation, offset: u16) -> ClassFileResult<u16> {
    let mapped = relocation.map(u32::from(offset))?;
    u16::try_from(mapped).map_err(|_| ClassFileError::LimitExceeded {
        what: "code offset",
        count: mapped as usize,
        max: usize::from(u16::MAX),
    })
}

fn relocate_line_numbers(info: &[u8], relocation: &Relocation) -> ClassFileResult<Vec<u8>> {
    let mut reader = ByteReader::new(info);
    let mut out = ByteWriter::with_capacity(info.len());
    let count = reader.u2()?;
    out.u2(count);
    for _ in 0..count {
        out.u2(map_u16(relocation, reader.u2()?)?);
        out.u2(reader.u2()?);
    }
    reader.finish()?;
    Ok(out.into_bytes())
}

fn relocate_local_variables(info: &[u8], relocation: &Relocation) -> ClassFileResult<Vec<u8>> {
    let mut reader = ByteReader::new(info);
    let mut out = ByteWriter::with_capacity(info.len());
    let count = reader.u2()?;
    out.u2(count);
    for _ in 0..count {
        let start = reader.u2()?;
        let length = reader.u2()?;
        let (start, length) = relocation.map_range(u32::from(start), u32::from(length))?;
        out.u2(start as u16);
        out.u2(length as u16);
        out.u2(reader.u2()?);
        out.u2(reader.u2()?);
        out.u2(reader.u2()?);
    }
    reader.finish()?;
    Ok(out.into_bytes())
}
