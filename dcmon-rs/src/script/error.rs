//! Error type shared by both sides of the Lua boundary.
//!
//! Every bridge operation (`eval`, `call`, `call_member`, the get/set
//! family) reports failure as a [`ScriptError`].  Errors travel in both
//! directions: a Lua `error(...)` surfaces to the host as
//! [`ScriptError::Runtime`] carrying the error value, and a failing host
//! method surfaces to the script as an ordinary Lua error that `pcall`
//! can catch.

use std::fmt;

use crate::script::value::Value;

/// An error raised on either side of the host/Lua boundary.
#[derive(Debug, Clone)]
pub enum ScriptError {
    /// Malformed source rejected by the compiler.
    Compile(String),
    /// Raised during execution.  The payload is the script-side error
    /// value — commonly a string such as `[chunk]:3: boom`.
    Runtime(Value),
    /// Allocation failure inside the runtime.
    Memory(String),
    /// A value could not be converted to an expected type.
    TypeConversion {
        from: &'static str,
        to: &'static str,
    },
    /// No descriptor in an overload set accepted the supplied arguments.
    NoMatchingOverload { name: String, arity: usize },
    /// Attempted to call a value that is not a function.
    NotCallable {
        key: String,
        type_name: &'static str,
    },
    /// A handle was used after its engine, or the weakly-held host object
    /// it dispatches to, was destroyed.
    StaleHandle,
    /// Descriptor-table misuse detected at bind time (unknown method,
    /// overload name mismatch, handle from a different engine).
    Bind(String),
}

impl ScriptError {
    /// Shorthand for a [`ScriptError::Runtime`] with a string payload.
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(Value::Str(message.into()))
    }

    /// The script-side error payload, if this error carries one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ScriptError::Runtime(v) => Some(v),
            _ => None,
        }
    }

    /// Translate a raw `mlua` error into the bridge taxonomy.
    ///
    /// Callback errors are unwrapped to their cause so that an error
    /// raised inside a host trampoline keeps its original text after the
    /// round trip through the interpreter.
    pub(crate) fn from_lua_error(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => ScriptError::Compile(message),
            mlua::Error::MemoryError(message) => ScriptError::Memory(message),
            mlua::Error::RuntimeError(message) => ScriptError::Runtime(Value::Str(message)),
            mlua::Error::CallbackError { cause, .. } => Self::from_lua_error((*cause).clone()),
            mlua::Error::WithContext { cause, .. } => Self::from_lua_error((*cause).clone()),
            other => ScriptError::Runtime(Value::Str(other.to_string())),
        }
    }

    /// Re-raise this error on the script side of the boundary.
    pub(crate) fn into_lua_error(self) -> mlua::Error {
        mlua::Error::RuntimeError(self.to_string())
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Compile(m) => write!(f, "compile error: {m}"),
            ScriptError::Runtime(v) => write!(f, "{v}"),
            ScriptError::Memory(m) => write!(f, "out of memory: {m}"),
            ScriptError::TypeConversion { from, to } => {
                write!(f, "cannot convert {from} to {to}")
            }
            ScriptError::NoMatchingOverload { name, arity } => {
                write!(f, "no overload of `{name}` accepts {arity} argument(s)")
            }
            ScriptError::NotCallable { key, type_name } => {
                write!(f, "`{key}` is a {type_name}, not a function")
            }
            ScriptError::StaleHandle => write!(f, "stale handle: target no longer exists"),
            ScriptError::Bind(m) => write!(f, "bind error: {m}"),
        }
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_payload_is_inspectable() {
        let err = ScriptError::runtime("boom");
        assert_eq!(err.payload().and_then(Value::as_str), Some("boom"));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn display_covers_taxonomy() {
        let e = ScriptError::NoMatchingOverload { name: "add".into(), arity: 3 };
        assert_eq!(e.to_string(), "no overload of `add` accepts 3 argument(s)");

        let e = ScriptError::NotCallable { key: "hide".into(), type_name: "boolean" };
        assert_eq!(e.to_string(), "`hide` is a boolean, not a function");

        let e = ScriptError::TypeConversion { from: "table", to: "integer" };
        assert_eq!(e.to_string(), "cannot convert table to integer");
    }

    #[test]
    fn lua_runtime_errors_keep_their_message() {
        let e = ScriptError::from_lua_error(mlua::Error::RuntimeError("bad".into()));
        match e {
            ScriptError::Runtime(payload) => assert_eq!(payload.as_str(), Some("bad")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
