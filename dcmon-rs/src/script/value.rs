//! The boundary value type.
//!
//! [`Value`] is the only type that crosses between host code and the Lua
//! runtime; every host-native value is converted to or from it.  The
//! mapping is total in both directions:
//!
//! | Lua            | `Value`              |
//! |----------------|----------------------|
//! | nil            | `Nil`                |
//! | boolean        | `Bool`               |
//! | integer        | `Int` (i64)          |
//! | number         | `Float` (f64)        |
//! | string         | `Str` (UTF-8)        |
//! | light userdata | `Ptr`                |
//! | table          | `Table(TableRef)`    |
//! | function       | `Func(FuncRef)`      |
//!
//! Pulling always dispatches on the type tag the runtime actually
//! reports; kinds the bridge does not model (threads, full userdata)
//! fail with [`ScriptError::TypeConversion`] rather than being coerced
//! silently.

use std::fmt;
use std::os::raw::c_void;
use std::rc::Rc;

use mlua::LightUserData;

use super::engine::EngineContext;
use super::error::ScriptError;
use super::function::FuncRef;
use super::table::TableRef;

// ── Value ─────────────────────────────────────────────────────────────────

/// A dynamically-typed value exchanged across the host/Lua boundary.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// UTF-8 text.  A Lua byte string that is not valid UTF-8 fails to
    /// cross the boundary with a conversion error.
    Str(String),
    /// Opaque host pointer.  Carried through untouched; dereferencing it
    /// is the caller's unsafe business.
    Ptr(*mut c_void),
    Table(TableRef),
    Func(FuncRef),
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl Value {
    /// The Lua-style name of this value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Ptr(_) => "userdata",
            Value::Table(_) => "table",
            Value::Func(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Lua truthiness: everything except `nil` and `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncRef> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    // ── Lua interop ───────────────────────────────────────────────────────

    /// Pull a value off the runtime.
    pub(crate) fn from_lua(
        v: mlua::Value,
        ctx: &Rc<EngineContext>,
    ) -> Result<Self, ScriptError> {
        Ok(match v {
            mlua::Value::Nil => Value::Nil,
            mlua::Value::Boolean(b) => Value::Bool(b),
            mlua::Value::Integer(i) => Value::Int(i),
            mlua::Value::Number(n) => Value::Float(n),
            mlua::Value::String(s) => Value::Str(
                s.to_str()
                    .map_err(|_| ScriptError::TypeConversion {
                        from: "string",
                        to: "utf-8 string",
                    })?
                    .to_owned(),
            ),
            mlua::Value::LightUserData(p) => Value::Ptr(p.0),
            mlua::Value::Table(t) => Value::Table(TableRef::from_table(ctx, t)?),
            mlua::Value::Function(f) => Value::Func(FuncRef::from_function(ctx, f)?),
            other => {
                return Err(ScriptError::TypeConversion {
                    from: other.type_name(),
                    to: "bridge value",
                })
            }
        })
    }

    /// Push this value onto the runtime.
    ///
    /// Handles must belong to `ctx`; a handle bound to a different engine
    /// is rejected, and one whose engine is gone reports a stale handle.
    pub(crate) fn into_lua(self, ctx: &Rc<EngineContext>) -> Result<mlua::Value, ScriptError> {
        Ok(match self {
            Value::Nil => mlua::Value::Nil,
            Value::Bool(b) => mlua::Value::Boolean(b),
            Value::Int(i) => mlua::Value::Integer(i),
            Value::Float(n) => mlua::Value::Number(n),
            Value::Str(s) => mlua::Value::String(
                ctx.lua
                    .create_string(&s)
                    .map_err(ScriptError::from_lua_error)?,
            ),
            Value::Ptr(p) => mlua::Value::LightUserData(LightUserData(p)),
            Value::Table(t) => mlua::Value::Table(t.to_table(ctx)?),
            Value::Func(f) => mlua::Value::Function(f.to_function(ctx)?),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Ptr(p) => write!(f, "userdata: {p:p}"),
            Value::Table(_) => write!(f, "table"),
            Value::Func(_) => write!(f, "function"),
        }
    }
}

/// Equality is value equality for primitives and handle identity for
/// tables and functions (two clones of one handle compare equal;
/// distinct handles to the same underlying table do not — use
/// [`TableRef::same_table`] for aliasing checks).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ptr(a), Value::Ptr(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.same_slot(b),
            (Value::Func(a), Value::Func(b)) => a.same_slot(b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<FuncRef> for Value {
    fn from(f: FuncRef) -> Self {
        Value::Func(f)
    }
}

// ── TypeTag ───────────────────────────────────────────────────────────────

/// Expected-type tag for one parameter of a bound host method.
///
/// Overload resolution converts each supplied argument to the
/// descriptor's tag via [`Value::convert_to`]; a descriptor matches only
/// if every argument converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Accepts any value unchanged, including nil.
    Any,
    Bool,
    Int,
    Float,
    Str,
    Table,
    Func,
    Ptr,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Any => "any",
            TypeTag::Bool => "boolean",
            TypeTag::Int => "integer",
            TypeTag::Float => "number",
            TypeTag::Str => "string",
            TypeTag::Table => "table",
            TypeTag::Func => "function",
            TypeTag::Ptr => "userdata",
        }
    }
}

impl Value {
    /// Convert this value to the parameter type named by `tag`.
    ///
    /// The matrix is permissive in the directions Lua itself coerces
    /// (string↔number, boolean→number) and strict everywhere else: nil
    /// converts only to `Any`, and tables, functions, and pointers
    /// convert only to their own tags.
    pub fn convert_to(&self, tag: TypeTag) -> Result<Value, ScriptError> {
        let fail = || ScriptError::TypeConversion {
            from: self.type_name(),
            to: tag.name(),
        };
        match tag {
            TypeTag::Any => Ok(self.clone()),
            TypeTag::Bool => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
                _ => Err(fail()),
            },
            TypeTag::Int => match self {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f)
                    if f.is_finite()
                        && f.trunc() >= i64::MIN as f64
                        && f.trunc() <= i64::MAX as f64 =>
                {
                    Ok(Value::Int(f.trunc() as i64))
                }
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
                _ => Err(fail()),
            },
            TypeTag::Float => match self {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail()),
                _ => Err(fail()),
            },
            TypeTag::Str => match self {
                Value::Str(s) => Ok(Value::Str(s.clone())),
                Value::Int(i) => Ok(Value::Str(i.to_string())),
                Value::Float(f) => Ok(Value::Str(f.to_string())),
                Value::Bool(b) => Ok(Value::Str(b.to_string())),
                _ => Err(fail()),
            },
            TypeTag::Table => match self {
                Value::Table(t) => Ok(Value::Table(t.clone())),
                _ => Err(fail()),
            },
            TypeTag::Func => match self {
                Value::Func(f) => Ok(Value::Func(f.clone())),
                _ => Err(fail()),
            },
            TypeTag::Ptr => match self {
                Value::Ptr(p) => Ok(Value::Ptr(*p)),
                _ => Err(fail()),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_lua() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn int_conversions() {
        assert_eq!(Value::Int(7).convert_to(TypeTag::Int).unwrap(), Value::Int(7));
        assert_eq!(Value::Float(7.9).convert_to(TypeTag::Int).unwrap(), Value::Int(7));
        assert_eq!(
            Value::Str(" 42 ".into()).convert_to(TypeTag::Int).unwrap(),
            Value::Int(42)
        );
        assert_eq!(Value::Bool(true).convert_to(TypeTag::Int).unwrap(), Value::Int(1));
        assert!(Value::Nil.convert_to(TypeTag::Int).is_err());
        assert!(Value::Str("pony".into()).convert_to(TypeTag::Int).is_err());
        assert!(Value::Float(f64::NAN).convert_to(TypeTag::Int).is_err());
        assert!(Value::Float(f64::INFINITY).convert_to(TypeTag::Int).is_err());
    }

    #[test]
    fn float_conversions() {
        assert_eq!(Value::Int(2).convert_to(TypeTag::Float).unwrap(), Value::Float(2.0));
        assert_eq!(
            Value::Str("2.5".into()).convert_to(TypeTag::Float).unwrap(),
            Value::Float(2.5)
        );
        assert!(Value::Nil.convert_to(TypeTag::Float).is_err());
    }

    #[test]
    fn string_conversions() {
        assert_eq!(
            Value::Int(12).convert_to(TypeTag::Str).unwrap(),
            Value::Str("12".into())
        );
        assert_eq!(
            Value::Bool(false).convert_to(TypeTag::Str).unwrap(),
            Value::Str("false".into())
        );
        assert!(Value::Nil.convert_to(TypeTag::Str).is_err());
    }

    #[test]
    fn nil_converts_only_to_any() {
        assert_eq!(Value::Nil.convert_to(TypeTag::Any).unwrap(), Value::Nil);
        for tag in [
            TypeTag::Bool,
            TypeTag::Int,
            TypeTag::Float,
            TypeTag::Str,
            TypeTag::Table,
            TypeTag::Func,
            TypeTag::Ptr,
        ] {
            assert!(Value::Nil.convert_to(tag).is_err(), "nil -> {}", tag.name());
        }
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(3.25).to_string(), "3.25");
        assert_eq!(Value::Str("x".into()).to_string(), "x");
    }
}
