//! Lua embedding bridge.
//!
//! User configuration is a Lua script; the host is statically typed.
//! This module is the boundary between the two: it marshals values
//! across ([`Value`]), hands scripts callable host capabilities
//! ([`FuncRef`] with overload sets built from [`MethodDesc`] tables),
//! hands the host shared references to script tables and functions
//! ([`TableRef`], captured [`FuncRef`]s), and carries errors
//! symmetrically in both directions ([`ScriptError`]).
//!
//! # Quick start
//!
//! ```rust
//! use dcmon::script::{ScriptEngine, Value};
//!
//! let engine = ScriptEngine::new().unwrap();
//! engine.eval("containers = { web = { hide = true } }", "inline").unwrap();
//! let containers = engine.get("containers").unwrap();
//! let web = containers.as_table().unwrap().get("web").unwrap();
//! assert_eq!(web.as_table().unwrap().get("hide").unwrap(), Value::Bool(true));
//! ```

pub mod engine;
pub mod error;
pub mod function;
pub mod table;
pub mod value;

pub use engine::ScriptEngine;
pub use error::ScriptError;
pub use function::{FuncRef, HostApi, MethodDesc};
pub use table::{TableKey, TableRef};
pub use value::{TypeTag, Value};
