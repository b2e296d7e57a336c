//! Error types surfaced across the host/VM boundary

use nutbind_vm::{CompileError, RuntimeErrorInfo, Value, VmError};

/// Result type for binding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds raised by handles, views and the VM wrapper
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A name lookup found nothing
    #[error("Not found: {name}")]
    NotFound {
        /// Name or index that was looked up
        name: String,
    },

    /// A VM value did not have the requested type
    #[error("Type error {message} expected: {expected} got: {actual}")]
    Type {
        /// What was being attempted
        message: String,
        /// Expected type name
        expected: String,
        /// Actual type name
        actual: String,
    },

    /// A script failed to compile
    #[error("Compile error at {source_name}:{line}:{column} {message}")]
    Compile {
        /// Compiler diagnostic
        message: String,
        /// Name the source was compiled under
        source_name: String,
        /// 1-based line, 0 when unknown
        line: u32,
        /// 1-based column, 0 when unknown
        column: u32,
    },

    /// A script raised an uncaught error, or a call into the VM failed
    #[error("Runtime error at ({function}) {source_name}:{line}: {message}")]
    Runtime {
        /// The thrown message
        message: String,
        /// Source the failing function was compiled from
        source_name: String,
        /// Failing function, `"unknown"` when it has no name
        function: String,
        /// Line of the failing statement
        line: u32,
    },
}

impl Error {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    pub(crate) fn bad_cast(expected: &str, actual: &str) -> Self {
        Error::Type {
            message: "bad cast".to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Runtime failure that did not come from a script frame
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
            source_name: "null".to_string(),
            function: "unknown".to_string(),
            line: 0,
        }
    }

    pub(crate) fn not_initialised() -> Self {
        Error::runtime("VM is not initialised")
    }
}

impl From<&CompileError> for Error {
    fn from(err: &CompileError) -> Self {
        Error::Compile {
            message: err.description.clone(),
            source_name: err.source_name.clone(),
            line: err.line,
            column: err.column,
        }
    }
}

impl From<&RuntimeErrorInfo> for Error {
    fn from(info: &RuntimeErrorInfo) -> Self {
        let message = match &info.error {
            Value::String(s) => s.to_string(),
            _ => "unknown error".to_string(),
        };
        Error::Runtime {
            message,
            source_name: info.source_name.to_string(),
            function: info
                .function
                .as_deref()
                .unwrap_or("unknown")
                .to_string(),
            line: info.line,
        }
    }
}

/// Stack API failures that escape a binding operation
impl From<VmError> for Error {
    fn from(err: VmError) -> Self {
        Error::runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_display_formats() {
        assert_eq!(Error::not_found("foo").to_string(), "Not found: foo");
        assert_eq!(
            Error::bad_cast("TABLE", "ARRAY").to_string(),
            "Type error bad cast expected: TABLE got: ARRAY"
        );
        let compile = Error::Compile {
            message: "expected ')' but found end of input".to_string(),
            source_name: "bad.nut".to_string(),
            line: 3,
            column: 7,
        };
        assert_eq!(
            compile.to_string(),
            "Compile error at bad.nut:3:7 expected ')' but found end of input"
        );
    }

    #[test]
    fn test_runtime_info_without_function_name() {
        let info = RuntimeErrorInfo {
            error: Value::string("boom"),
            source_name: Rc::from("main.nut"),
            function: None,
            line: 4,
        };
        let err = Error::from(&info);
        assert_eq!(err.to_string(), "Runtime error at (unknown) main.nut:4: boom");
    }

    #[test]
    fn test_non_string_error_value() {
        let info = RuntimeErrorInfo {
            error: Value::Integer(5),
            source_name: Rc::from("main.nut"),
            function: Some(Rc::from("f")),
            line: 1,
        };
        match Error::from(&info) {
            Error::Runtime { message, function, .. } => {
                assert_eq!(message, "unknown error");
                assert_eq!(function, "f");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
