//! `StackMapTable` decoding, relocation, and encoding.

use crate::code::Relocation;
use crate::error::{ClassFileError, ClassFileResult};
use crate::reader::ByteReader;
use crate::writer::ByteWriter;

/// A verification type in a stack-map frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    /// `Top`
    Top,
    /// `Integer`
    Integer,
    /// `Float`
    Float,
    /// `Double`
    Double,
    /// `Long`
    Long,
    /// `Null`
    Null,
    /// `UninitializedThis`
    UninitializedThis,
    /// Object of the given `Class` index.
    Object(u16),
    /// Result of the `new` at the given code offset.
    Uninitialized(u32),
}

impl VerificationType {
    fn read(reader: &mut ByteReader<'_>) -> ClassFileResult<Self> {
        Ok(match reader.u1()? {
            0 => Self::Top,
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Long,
            5 => Self::Null,
            6 => Self::UninitializedThis,
            7 => Self::Object(reader.u2()?),
            8 => Self::Uninitialized(u32::from(reader.u2()?)),
            other => {
                return Err(ClassFileError::malformed(format!(
                    "unknown verification type tag {other}"
                )))
            }
        })
    }

    fn write(&self, out: &mut ByteWriter) {
        match self {
            Self::Top => out.u1(0),
            Self::Integer => out.u1(1),
            Self::Float => out.u1(2),
            Self::Double => out.u1(3),
            Self::Long => out.u1(4),
            Self::Null => out.u1(5),
            Self::UninitializedThis => out.u1(6),
            Self::Object(class) => {
                out.u1(7);
                out.u2(*class);
            }
            Self::Uninitialized(offset) => {
                out.u1(8);
                out.u2(*offset as u16);
            }
        }
    }
}

/// The shape of a frame relative to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals, empty stack.
    Same,
    /// Same locals, one stack item.
    SameLocals1StackItem(VerificationType),
    /// The last `n` locals are removed (1..=3).
    Chop(u8),
    /// Locals are appended (1..=3 of them).
    Append(Vec<VerificationType>),
    /// Full frame.
    Full {
        /// All locals.
        locals: Vec<VerificationType>,
        /// All stack entries.
        stack: Vec<VerificationType>,
    },
}

/// A frame at an absolute code offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Absolute code offset.
    pub offset: u32,
    /// Frame contents.
    pub kind: FrameKind,
}

/// A decoded `StackMapTable` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackMapTable {
    /// Frames in ascending offset order.
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    /// Decodes an attribute payload.
    pub fn parse(info: &[u8]) -> ClassFileResult<Self> {
        let mut reader = ByteReader::new(info);
        let count = reader.u2()?;
        let mut frames = Vec::with_capacity(usize::from(count));
        let mut previous: Option<u32> = None;
        for _ in 0..count {
            let frame_type = reader.u1()?;
            let (delta, kind) = match frame_type {
                0..=63 => (u32::from(frame_type), FrameKind::Same),
                64..=127 => (
                    u32::from(frame_type - 64),
                    FrameKind::SameLocals1StackItem(VerificationType::read(&mut reader)?),
                ),
                247 => {
                    let delta = u32::from(reader.u2()?);
                    (
                        delta,
                        FrameKind::SameLocals1StackItem(VerificationType::read(&mut reader)?),
                    )
                }
                248..=250 => (u32::from(reader.u2()?), FrameKind::Chop(251 - frame_type)),
                251 => (u32::from(reader.u2()?), FrameKind::Same),
                252..=254 => {
                    let delta = u32::from(reader.u2()?);
                    let locals = read_types(&mut reader, usize::from(frame_type - 251))?;
                    (delta, FrameKind::Append(locals))
                }
                255 => {
                    let delta = u32::from(reader.u2()?);
                    let local_count = usize::from(reader.u2()?);
                    let locals = read_types(&mut reader, local_count)?;
                    let stack_count = usize::from(reader.u2()?);
                    let stack = read_types(&mut reader, stack_count)?;
                    (delta, FrameKind::Full { locals, stack })
                }
                reserved => {
                    return Err(ClassFileError::malformed(format!(
                        "reserved stack map frame type {reserved}"
                    )))
                }
            };
            let offset = match previous {
                None => delta,
                Some(previous) => previous + delta + 1,
            };
            previous = Some(offset);
            frames.push(StackMapFrame { offset, kind });
        }
        reader.finish()?;
        Ok(Self { frames })
    }

    /// Encodes the table, choosing the compact form for each frame.
    pub fn encode(&self) -> ClassFileResult<Vec<u8>> {
        let mut out = ByteWriter::new();
        out.count_u2("stack map frames", self.frames.len())?;
        let mut previous: Option<u32> = None;
        for frame in &self.frames {
            let delta = match previous {
                None => frame.offset,
                Some(previous) => frame
                    .offset
                    .checked_sub(previous + 1)
                    .ok_or_else(|| ClassFileError::malformed("stack map frames out of order"))?,
            };
            ClassFileError::check_limit("stack map offset delta", delta as usize, 0xFFFF)?;
            previous = Some(frame.offset);
            match &frame.kind {
                FrameKind::Same if delta <= 63 => out.u1(delta as u8),
                FrameKind::Same => {
                    out.u1(251);
                    out.u2(delta as u16);
                }
                FrameKind::SameLocals1StackItem(item) => {
                    if delta <= 63 {
                        out.u1(64 + delta as u8);
                    } else {
                        out.u1(247);
                        out.u2(delta as u16);
                    }
                    item.write(&mut out);
                }
                FrameKind::Chop(removed) => {
                    if !(1..=3).contains(removed) {
                        return Err(ClassFileError::malformed("chop frame removes 1..=3 locals"));
                    }
                    out.u1(251 - removed);
                    out.u2(delta as u16);
                }
                FrameKind::Append(locals) => {
                    if !(1..=3).contains(&locals.len()) {
                        return Err(ClassFileError::malformed("append frame adds 1..=3 locals"));
                    }
                    out.u1(251 + locals.len() as u8);
                    out.u2(delta as u16);
                    for local in locals {
                        local.write(&mut out);
                    }
                }
                FrameKind::Full { locals, stack } => {
                    out.u1(255);
                    out.u2(delta as u16);
                    out.count_u2("frame locals", locals.len())?;
                    for local in locals {
                        local.write(&mut out);
                    }
                    out.count_u2("frame stack", stack.len())?;
                    for item in stack {
                        item.write(&mut out);
                    }
                }
            }
        }
        Ok(out.into_bytes())
    }

    /// Moves every frame and `Uninitialized` offset to its new position.
    pub fn relocate(&mut self, relocation: &Relocation) -> ClassFileResult<()> {
        for frame in &mut self.frames {
            frame.offset = relocation.map(frame.offset)?;
            for ty in frame.types_mut() {
                if let VerificationType::Uninitialized(offset) = ty {
                    *offset = relocation.map(*offset)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrites every `Object` class index through `remap`.
    pub fn remap_classes<F>(&mut self, mut remap: F) -> ClassFileResult<()>
    where
        F: FnMut(u16) -> ClassFileResult<u16>,
    {
        for frame in &mut self.frames {
            for ty in frame.types_mut() {
                if let VerificationType::Object(class) = ty {
                    *class = remap(*class)?;
                }
            }
        }
        Ok(())
    }
}

impl StackMapFrame {
    fn types_mut(&mut self) -> Vec<&mut VerificationType> {
        match &mut self.kind {
            FrameKind::Same | FrameKind::Chop(_) => Vec::new(),
            FrameKind::SameLocals1StackItem(item) => vec![item],
            FrameKind::Append(locals) => locals.iter_mut().collect(),
            FrameKind::Full { locals, stack } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }
}

fn read_types(reader: &mut ByteReader<'_>, count: usize) -> ClassFileResult<Vec<VerificationType>> {
    (0..count).map(|_| VerificationType::read(reader)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{assemble, decode, Insn, Instruction};

    fn table() -> StackMapTable {
        StackMapTable {
            frames: vec![
                StackMapFrame {
                    offset: 6,
                    kind: FrameKind::Same,
                },
                StackMapFrame {
                    offset: 90,
                    kind: FrameKind::SameLocals1StackItem(VerificationType::Object(3)),
                },
                StackMapFrame {
                    offset: 95,
                    kind: FrameKind::Full {
                        locals: vec![VerificationType::Integer, VerificationType::Uninitialized(7)],
                        stack: vec![],
                    },
                },
                StackMapFrame {
                    offset: 99,
                    kind: FrameKind::Chop(2),
                },
            ],
        }
    }

    #[test]
    fn encoding_reads_back() {
        let table = table();
        let bytes = table.encode().unwrap();
        assert_eq!(StackMapTable::parse(&bytes).unwrap(), table);
    }

    #[test]
    fn large_deltas_use_extended_forms() {
        let bytes = table().encode().unwrap();
        // first frame: same (6); second: delta 83 needs same_locals_1_extended
        assert_eq!(bytes[2], 6);
        assert_eq!(bytes[3], 247);
    }

    #[test]
    fn relocation_moves_frames() {
        // iload_1; ifeq L; iconst_1; ireturn; L: iconst_0; ireturn
        let code = [0x1b, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let mut insns = decode(&code).unwrap();
        insns.insert(4, Insn::inserted(Instruction::Simple(0x00)));
        let (_, relocation) = assemble(&insns, code.len() as u32).unwrap();

        let mut table = StackMapTable {
            frames: vec![StackMapFrame {
                offset: 6,
                kind: FrameKind::Same,
            }],
        };
        table.relocate(&relocation).unwrap();
        assert_eq!(table.frames[0].offset, 6);

        let mut insns = decode(&code).unwrap();
        insns.insert(0, Insn::inserted(Instruction::Simple(0x00)));
        let (_, relocation) = assemble(&insns, code.len() as u32).unwrap();
        table.frames[0].offset = 6;
        table.relocate(&relocation).unwrap();
        assert_eq!(table.frames[0].offset, 7);
    }

    #[test]
    fn remaps_object_types() {
        let mut table = table();
        table.remap_classes(|index| Ok(index + 10)).unwrap();
        assert_eq!(
            table.frames[1].kind,
            FrameKind::SameLocals1StackItem(VerificationType::Object(13))
        );
    }
}
