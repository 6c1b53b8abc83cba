//! Method-exit instrumentation.
//!
//! Every normal return of a targeted method is preceded by
//! `aload_0; invokestatic hook_class.hook_method(Ljava/lang/Object;)V`.
//! `athrow` exits are left alone.

use crate::error::{SpliceError, SpliceResult};
use crate::segment::Injector;
use crate::tree::{top_level, ClassTree};
use serde::Serialize;
use splice_classfile::{opcode, ClassFile, ClassFileError, CodeAttribute, Insn, Instruction};
use std::fs;
use tracing::{debug, info};

/// Descriptor of every hook method.
pub const HOOK_DESCRIPTOR: &str = "(Ljava/lang/Object;)V";

/// A method that received hook calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WovenMethod {
    /// Internal class name.
    pub class: String,
    /// Method name.
    pub method: String,
    /// Method descriptor.
    pub descriptor: String,
    /// Number of instrumented return sites.
    pub exits: usize,
}

/// Applies `injectors` to the classes in `tree`.
///
/// An injector applies to its target class and to the nested classes that
/// share its top-level name. Nested classes are matched leniently: methods
/// they lack, and static or bodiless methods, are skipped.
///
/// A target class missing from the tree is a `MissingArtifact` error unless
/// it, or its top-level class, is listed in `redacted`.
pub fn weave(
    tree: &ClassTree,
    injectors: &[Injector],
    redacted: &[String],
) -> SpliceResult<Vec<WovenMethod>> {
    if injectors.is_empty() {
        return Ok(Vec::new());
    }
    let mut targets: Vec<&str> = Vec::new();
    for injector in injectors {
        if !targets.contains(&injector.target_class.as_str()) {
            targets.push(&injector.target_class);
        }
    }
    for target in targets {
        let path = tree.path_for(target);
        if path.is_file() {
            continue;
        }
        if redacted
            .iter()
            .any(|r| r == target || r == top_level(target))
        {
            debug!(class = target, "injector target redacted, skipping");
        } else {
            return Err(SpliceError::missing_artifact("injector target class", path));
        }
    }

    let mut woven = Vec::new();
    for entry in tree.class_files()? {
        let applicable: Vec<&Injector> = injectors
            .iter()
            .filter(|i| i.target_class == entry.name || i.target_class == entry.top_level())
            .collect();
        if applicable.is_empty() {
            continue;
        }
        let bytes = fs::read(&entry.path)?;
        if let Some((rewritten, methods)) = weave_class(&bytes, &entry.name, &applicable)? {
            fs::write(&entry.path, rewritten)?;
            info!(class = %entry.name, methods = methods.len(), "woven hook calls");
            woven.extend(methods);
        }
    }
    Ok(woven)
}

/// Rewrites one class body.
///
/// Returns `None` when no method needed rewriting. For each method the
/// first injector naming it applies. An injector whose target is exactly
/// `class_name` must name an instance method with code; injectors reaching
/// the class through its top-level name only apply where they can.
pub fn weave_class(
    bytes: &[u8],
    class_name: &str,
    injectors: &[&Injector],
) -> SpliceResult<Option<(Vec<u8>, Vec<WovenMethod>)>> {
    let rewrite_err = |method: &str, e: &dyn std::fmt::Display| {
        SpliceError::binary_rewrite(class_name, method, e.to_string())
    };
    let mut class = ClassFile::parse(bytes).map_err(|e| rewrite_err("", &e))?;

    let mut names = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        names.push(
            method
                .name(&class.constant_pool)
                .map_err(|e| rewrite_err("", &e))?,
        );
    }
    for injector in injectors.iter().filter(|i| i.target_class == class_name) {
        if !names.contains(&injector.target_method) {
            return Err(SpliceError::binary_rewrite(
                class_name,
                injector.target_method.clone(),
                "no such method",
            ));
        }
    }

    let mut woven = Vec::new();
    for (index, name) in names.iter().enumerate() {
        let Some(injector) = injectors.iter().find(|i| &i.target_method == name) else {
            continue;
        };
        let outcome = match weave_method(&mut class, index, injector) {
            Ok(outcome) => outcome,
            Err(WeaveError::Rewrite(reason)) if injector.target_class != class_name => {
                debug!(class = class_name, method = %name, reason, "skipping nested method");
                continue;
            }
            Err(WeaveError::Rewrite(message)) => {
                return Err(SpliceError::binary_rewrite(class_name, name.as_str(), message))
            }
            Err(WeaveError::ClassFile(e)) => return Err(rewrite_err(name.as_str(), &e)),
        };
        if let Some((descriptor, exits)) = outcome {
            woven.push(WovenMethod {
                class: class_name.to_string(),
                method: name.clone(),
                descriptor,
                exits,
            });
        }
    }

    if woven.is_empty() {
        return Ok(None);
    }
    let out = class.to_bytes().map_err(|e| rewrite_err("", &e))?;
    Ok(Some((out, woven)))
}

enum WeaveError {
    Rewrite(&'static str),
    ClassFile(ClassFileError),
}

impl From<ClassFileError> for WeaveError {
    fn from(e: ClassFileError) -> Self {
        Self::ClassFile(e)
    }
}

/// Instruments method `index`, returning its descriptor and exit count.
fn weave_method(
    class: &mut ClassFile,
    index: usize,
    injector: &Injector,
) -> Result<Option<(String, usize)>, WeaveError> {
    let method = &class.methods[index];
    if method.is_static() {
        return Err(WeaveError::Rewrite("static method has no enclosing instance"));
    }
    let descriptor = method.descriptor(&class.constant_pool)?;
    let Some(attribute) = method.attribute(&class.constant_pool, "Code") else {
        return Err(WeaveError::Rewrite("method has no code"));
    };
    let code = CodeAttribute::parse(&attribute.info)?;
    let insns = code.instructions()?;
    let exits = insns
        .iter()
        .filter(|insn| opcode::is_return(insn.instruction.opcode()))
        .count();
    if exits == 0 {
        return Ok(None);
    }

    let hook = class.constant_pool.method_ref_index(
        &injector.hook_class,
        &injector.hook_method,
        HOOK_DESCRIPTOR,
    )?;
    let mut rewritten = Vec::with_capacity(insns.len() + exits * 2);
    for insn in insns {
        if opcode::is_return(insn.instruction.opcode()) {
            rewritten.push(Insn::inserted(Instruction::Simple(opcode::ALOAD_0)));
            rewritten.push(Insn::inserted(Instruction::Constant {
                opcode: opcode::INVOKESTATIC,
                index: hook,
            }));
        }
        rewritten.push(insn);
    }

    let mut code = code.reassemble(&class.constant_pool, &rewritten)?;
    code.max_stack = code
        .max_stack
        .checked_add(1)
        .ok_or(WeaveError::Rewrite("operand stack limit exceeded"))?;
    let info = code.to_bytes()?;

    let pool = &class.constant_pool;
    if let Some(attribute) = class.methods[index].attribute_mut(pool, "Code") {
        attribute.info = info;
    }
    debug!(method = %descriptor, exits, "instrumented method");
    Ok(Some((descriptor, exits)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_classfile::{access, StackMapTable};
    use splice_testkit::{ClassBuilder, Op};

    fn injector(method: &str) -> Injector {
        Injector {
            target_class: "Solver".into(),
            target_method: method.into(),
            hook_class: "Grader".into(),
            hook_method: "inject".into(),
        }
    }

    fn solver() -> Vec<u8> {
        ClassBuilder::new("Solver")
            .default_constructor()
            .method(
                access::PUBLIC,
                "solve",
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
            .method(access::PUBLIC | access::STATIC, "helper", "()V", vec![Op::Return])
            .bytes()
    }

    fn code_of(bytes: &[u8], method: &str) -> CodeAttribute {
        let class = ClassFile::parse(bytes).unwrap();
        let method = class.method_named(method).unwrap();
        let attribute = method.attribute(&class.constant_pool, "Code").unwrap();
        CodeAttribute::parse(&attribute.info).unwrap()
    }

    #[test]
    fn hooks_precede_every_return() {
        let original = solver();
        let (out, woven) = weave_class(&original, "Solver", &[&injector("solve")])
            .unwrap()
            .unwrap();
        assert_eq!(woven.len(), 1);
        assert_eq!(woven[0].descriptor, "(I)I");
        assert_eq!(woven[0].exits, 2);

        let before = code_of(&original, "solve");
        let after = code_of(&out, "solve");
        assert_eq!(after.max_stack, before.max_stack + 1);
        let ops: Vec<u8> = after
            .instructions()
            .unwrap()
            .iter()
            .map(|i| i.instruction.opcode())
            .collect();
        assert_eq!(
            ops,
            vec![
                0x1b,
                opcode::IFEQ,
                0x04,
                opcode::ALOAD_0,
                opcode::INVOKESTATIC,
                opcode::IRETURN,
                0x03,
                opcode::ALOAD_0,
                opcode::INVOKESTATIC,
                opcode::IRETURN,
            ]
        );
    }

    fn code_attribute(bytes: &[u8], method: &str, name: &str) -> Option<Vec<u8>> {
        let class = ClassFile::parse(bytes).unwrap();
        let code = code_of(bytes, method);
        code.attributes
            .into_iter()
            .find(|a| class.constant_pool.utf8(a.name_index).unwrap() == name)
            .map(|a| a.info)
    }

    fn line_numbers(bytes: &[u8], method: &str) -> Vec<(u16, u16)> {
        let info = code_attribute(bytes, method, "LineNumberTable").unwrap();
        info[2..]
            .chunks(4)
            .map(|c| (u16::from_be_bytes([c[0], c[1]]), u16::from_be_bytes([c[2], c[3]])))
            .collect()
    }

    fn frame_offsets(bytes: &[u8], method: &str) -> Vec<u32> {
        let info = code_attribute(bytes, method, "StackMapTable").unwrap();
        StackMapTable::parse(&info)
            .unwrap()
            .frames
            .iter()
            .map(|f| f.offset)
            .collect()
    }

    fn guarded() -> Vec<u8> {
        ClassBuilder::new("Solver")
            .default_constructor()
            .method(
                access::PUBLIC,
                "solve",
                "()I",
                vec![
                    Op::label("start"),
                    Op::Line(10),
                    Op::Iconst(1),
                    Op::Ireturn,
                    Op::label("end"),
                    Op::StackFrame("java/lang/Exception".into()),
                    Op::Line(11),
                    Op::Pop,
                    Op::Iconst(0),
                    Op::Ireturn,
                    Op::Handler {
                        start: "start".into(),
                        end: "end".into(),
                        handler: "end".into(),
                        catch: Some("java/lang/Exception".into()),
                    },
                ],
            )
            .bytes()
    }

    #[test]
    fn exception_handlers_follow_relocated_code() {
        let original = guarded();
        let before = code_of(&original, "solve");
        assert_eq!(before.exception_table.len(), 1);
        assert_eq!(
            (
                before.exception_table[0].start_pc,
                before.exception_table[0].end_pc,
                before.exception_table[0].handler_pc
            ),
            (0, 2, 2)
        );

        let (out, _) = weave_class(&original, "Solver", &[&injector("solve")])
            .unwrap()
            .unwrap();
        let after = code_of(&out, "solve");
        // iconst_1, aload_0, invokestatic, ireturn | pop, iconst_0, aload_0, invokestatic, ireturn
        assert_eq!(after.code.len(), 13);
        let handler = after.exception_table[0];
        assert_eq!((handler.start_pc, handler.end_pc, handler.handler_pc), (0, 6, 6));
        assert_eq!(handler.catch_type, before.exception_table[0].catch_type);
        assert_eq!(after.code[usize::from(handler.handler_pc)], 0x57);
        assert_eq!(frame_offsets(&out, "solve"), vec![6]);
    }

    #[test]
    fn line_numbers_follow_relocated_code() {
        let original = guarded();
        assert_eq!(line_numbers(&original, "solve"), vec![(0, 10), (2, 11)]);
        let (out, _) = weave_class(&original, "Solver", &[&injector("solve")])
            .unwrap()
            .unwrap();
        assert_eq!(line_numbers(&out, "solve"), vec![(0, 10), (6, 11)]);
    }

    #[test]
    fn jumps_to_a_return_land_on_the_hook_call() {
        let original = ClassBuilder::new("Solver")
            .default_constructor()
            .method(
                access::PUBLIC,
                "solve",
                "(I)V",
                vec![
                    Op::Iload(1),
                    Op::IfNe("skip".into()),
                    Op::Return,
                    Op::label("skip"),
                    Op::Frame,
                    Op::Iconst(5),
                    Op::Istore(1),
                    Op::Goto("end".into()),
                    Op::label("end"),
                    Op::Frame,
                    Op::Return,
                ],
            )
            .bytes();
        let (out, woven) = weave_class(&original, "Solver", &[&injector("solve")])
            .unwrap()
            .unwrap();
        assert_eq!(woven[0].exits, 2);

        let after = code_of(&out, "solve");
        let insns = after.instructions().unwrap();
        let at = |offset: u32| {
            insns
                .iter()
                .find(|i| i.origin == Some(offset))
                .map(|i| i.instruction.opcode())
        };
        let targets: Vec<(u8, u32)> = insns
            .iter()
            .filter_map(|i| match &i.instruction {
                Instruction::Branch { opcode: op, target } => Some((*op, *target)),
                _ => None,
            })
            .collect();
        // ifne skips the first hook call; goto lands on the second one
        assert_eq!(targets, vec![(0x9a, 9), (opcode::GOTO, 14)]);
        assert_eq!(at(9), Some(0x08));
        assert_eq!(at(14), Some(opcode::ALOAD_0));
        assert_eq!(at(15), Some(opcode::INVOKESTATIC));
        assert_eq!(at(18), Some(opcode::RETURN));
        assert_eq!(frame_offsets(&out, "solve"), vec![9, 14]);
    }

    #[test]
    fn untargeted_class_is_untouched() {
        assert!(weave_class(&solver(), "Solver", &[]).unwrap().is_none());
    }

    #[test]
    fn static_target_is_rejected() {
        let err = weave_class(&solver(), "Solver", &[&injector("helper")]).unwrap_err();
        match err {
            SpliceError::BinaryRewrite { class, method, .. } => {
                assert_eq!(class, "Solver");
                assert_eq!(method, "helper");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_method_is_rejected() {
        let err = weave_class(&solver(), "Solver", &[&injector("solv")]).unwrap_err();
        assert!(err.to_string().contains("Solver.solv"));
    }

    #[test]
    fn first_matching_injector_wins() {
        let mut second = injector("solve");
        second.hook_class = "Other".into();
        let first = injector("solve");
        let (out, _) = weave_class(&solver(), "Solver", &[&first, &second])
            .unwrap()
            .unwrap();
        let class = ClassFile::parse(&out).unwrap();
        let hooks: Vec<String> = class
            .constant_pool
            .iter()
            .filter_map(|(index, _)| class.constant_pool.member_ref(index).ok())
            .filter(|(_, _, descriptor)| descriptor == HOOK_DESCRIPTOR)
            .map(|(owner, _, _)| owner)
            .collect();
        assert_eq!(hooks, vec!["Grader"]);
    }

    #[test]
    fn nested_classes_share_the_top_level_injector() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Solver.class"), solver()).unwrap();
        let callback = ClassBuilder::new("Solver$1")
            .default_constructor()
            .method(access::PUBLIC, "solve", "(I)I", vec![Op::Iconst(7), Op::Ireturn])
            .bytes();
        std::fs::write(dir.path().join("Solver$1.class"), &callback).unwrap();
        let helper = ClassBuilder::new("Solver$Helper").default_constructor().bytes();
        std::fs::write(dir.path().join("Solver$Helper.class"), &helper).unwrap();

        let tree = ClassTree::new(dir.path(), "");
        let woven = weave(&tree, &[injector("solve")], &[]).unwrap();
        let classes: Vec<&str> = woven.iter().map(|m| m.class.as_str()).collect();
        assert_eq!(classes, vec!["Solver$1", "Solver"]);
        assert_eq!(
            std::fs::read(dir.path().join("Solver$Helper.class")).unwrap(),
            helper
        );
    }

    #[test]
    fn absent_target_is_a_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Solver.class"), solver()).unwrap();
        let tree = ClassTree::new(dir.path(), "");
        let mut typo = injector("solve");
        typo.target_class = "Solvr".into();

        match weave(&tree, &[typo.clone()], &[]).unwrap_err() {
            SpliceError::MissingArtifact { path, .. } => {
                assert_eq!(path, dir.path().join("Solvr.class"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(weave(&tree, &[typo], &["Solvr".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nested_target_of_a_redacted_class_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ClassTree::new(dir.path(), "");
        let mut nested = injector("run");
        nested.target_class = "Solver$Inner".into();
        let woven = weave(&tree, &[nested], &["Solver".to_string()]).unwrap();
        assert!(woven.is_empty());
    }
}
