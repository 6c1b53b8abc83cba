//! Inspect command implementation.

use serde::Serialize;
use splice_classfile::{ClassFile, ClassFileResult, CodeAttribute, MemberInfo};
use std::fs;
use std::path::Path;

/// Summary of one class file.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Internal class name.
    pub name: String,
    /// Superclass, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    /// `major.minor` class-file version.
    pub version: String,
    /// Class access flags.
    pub access_flags: u16,
    /// Number of constant-pool slots.
    pub constant_pool_count: usize,
    /// Declared fields.
    pub fields: Vec<MemberSummary>,
    /// Declared methods.
    pub methods: Vec<MemberSummary>,
    /// Number of bootstrap methods.
    pub bootstrap_methods: usize,
}

/// One field or method.
#[derive(Debug, Serialize)]
pub struct MemberSummary {
    /// Member name.
    pub name: String,
    /// Member descriptor.
    pub descriptor: String,
    /// Access flags.
    pub access_flags: u16,
    /// Bytecode length, for methods with a body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_length: Option<usize>,
}

/// Decodes `bytes` into a summary.
pub fn describe(bytes: &[u8]) -> ClassFileResult<InspectResult> {
    let class = ClassFile::parse(bytes)?;
    let fields = class
        .fields
        .iter()
        .map(|f| summarize(&class, f))
        .collect::<ClassFileResult<Vec<_>>>()?;
    let methods = class
        .methods
        .iter()
        .map(|m| summarize(&class, m))
        .collect::<ClassFileResult<Vec<_>>>()?;
    Ok(InspectResult {
        name: class.name()?,
        super_name: class.super_name()?,
        version: format!("{}.{}", class.major_version, class.minor_version),
        access_flags: class.access_flags,
        constant_pool_count: class.constant_pool.count(),
        fields,
        methods,
        bootstrap_methods: class.bootstrap_methods()?.len(),
    })
}

fn summarize(class: &ClassFile, member: &MemberInfo) -> ClassFileResult<MemberSummary> {
    let pool = &class.constant_pool;
    let code_length = match member.attribute(pool, "Code") {
        Some(attribute) => Some(CodeAttribute::parse(&attribute.info)?.code.len()),
        None => None,
    };
    Ok(MemberSummary {
        name: member.name(pool)?,
        descriptor: member.descriptor(pool)?,
        access_flags: member.access_flags,
        code_length,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let result = describe(&bytes)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Class {}", result.name);
    println!("==========================");
    println!();
    println!("Super:     {}", result.super_name.as_deref().unwrap_or("-"));
    println!("Version:   {}", result.version);
    println!("Access:    0x{:04x}", result.access_flags);
    println!("Constants: {}", result.constant_pool_count);
    println!();
    println!("Fields:");
    for field in &result.fields {
        println!(
            "  0x{:04x} {} {}",
            field.access_flags, field.name, field.descriptor
        );
    }
    println!();
    println!("Methods:");
    for method in &result.methods {
        match method.code_length {
            Some(length) => println!(
                "  0x{:04x} {}{} ({} bytes)",
                method.access_flags, method.name, method.descriptor, length
            ),
            None => println!(
                "  0x{:04x} {}{}",
                method.access_flags, method.name, method.descriptor
            ),
        }
    }
    if result.bootstrap_methods > 0 {
        println!();
        println!("Bootstrap methods: {}", result.bootstrap_methods);
    }
}
