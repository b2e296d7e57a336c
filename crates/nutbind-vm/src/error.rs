//! Error types for the VM

use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

/// A script-level error. Carries whatever value was thrown.
#[derive(Clone)]
pub struct VmError(pub Value);

impl VmError {
    /// Error carrying a string message
    pub fn msg(message: impl AsRef<str>) -> Self {
        VmError(Value::string(message.as_ref()))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_display_string())
    }
}

impl fmt::Debug for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VmError({:?})", self.0)
    }
}

impl std::error::Error for VmError {}

/// Failure reported by the compiler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{source_name}:{line}:{column}: {description}")]
pub struct CompileError {
    pub description: String,
    pub source_name: String,
    pub line: u32,
    pub column: u32,
}

/// Location of an uncaught runtime error, handed to the runtime error handler
#[derive(Debug, Clone)]
pub struct RuntimeErrorInfo {
    pub error: Value,
    pub source_name: Rc<str>,
    /// `None` for the anonymous main chunk of a script
    pub function: Option<Rc<str>>,
    pub line: u32,
}
