//! Error types for the class-file crate.

use thiserror::Error;

/// Result type for class-file operations.
pub type ClassFileResult<T> = Result<T, ClassFileError>;

/// Errors that can occur while reading, rewriting, or writing class files.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    /// The input does not start with `0xCAFEBABE`.
    #[error("bad magic number: {found:#010x}")]
    BadMagic {
        /// The four bytes found instead.
        found: u32,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more bytes were needed.
        offset: usize,
    },

    /// Bytes left over after the class structure ended.
    #[error("{count} trailing bytes after class structure")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// A constant-pool index is out of range or points at the wrong kind of entry.
    #[error("bad constant pool index {index}: {message}")]
    BadConstant {
        /// The offending index.
        index: u16,
        /// What was expected.
        message: String,
    },

    /// Unknown constant-pool tag.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag {
        /// The tag byte.
        tag: u8,
        /// Constant-pool index being read.
        index: u16,
    },

    /// Invalid modified UTF-8.
    #[error("invalid modified UTF-8 in constant pool")]
    InvalidUtf8,

    /// Bytecode could not be decoded.
    #[error("invalid bytecode at {offset}: {message}")]
    InvalidBytecode {
        /// Code offset of the failing instruction.
        offset: u32,
        /// Description of the problem.
        message: String,
    },

    /// A branch no longer fits its encoding after relocation.
    #[error("branch at {offset} to {target} does not fit a 16-bit offset")]
    BranchOverflow {
        /// New offset of the branch instruction.
        offset: u32,
        /// New offset of its target.
        target: u32,
    },

    /// A code offset referenced by a table does not start an instruction.
    #[error("code offset {offset} is not an instruction boundary")]
    UnmappedOffset {
        /// The offending offset.
        offset: u32,
    },

    /// A table, pool, or code array exceeded its format limit.
    #[error("{what} exceeds class-file limit ({count} > {max})")]
    LimitExceeded {
        /// What overflowed.
        what: &'static str,
        /// Actual count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Structurally malformed class file.
    #[error("malformed class file: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl ClassFileError {
    /// Create a malformed-structure error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a bad-constant error.
    pub fn bad_constant(index: u16, message: impl Into<String>) -> Self {
        Self::BadConstant {
            index,
            message: message.into(),
        }
    }

    /// Create an invalid-bytecode error.
    pub fn invalid_bytecode(offset: u32, message: impl Into<String>) -> Self {
        Self::InvalidBytecode {
            offset,
            message: message.into(),
        }
    }

    /// Check a count against a format limit.
    pub(crate) fn check_limit(what: &'static str, count: usize, max: usize) -> ClassFileResult<()> {
        if count > max {
            Err(Self::LimitExceeded { what, count, max })
        } else {
            Ok(())
        }
    }
}
