//! Shared handles to Lua tables.
//!
//! A [`TableRef`] pins a table living inside the interpreter by holding a
//! registry slot for it.  Clones share the slot; the slot is released
//! when the last clone drops, after which the interpreter's collector is
//! free to reclaim the table once no script-side reference remains.
//!
//! Handles hold only a weak reference to the engine, so a `TableRef`
//! that outlives its [`ScriptEngine`](super::ScriptEngine) degrades into
//! a defined [`ScriptError::StaleHandle`] instead of touching freed
//! interpreter state.  Every operation leaves the interpreter's
//! evaluation stack exactly as deep as it found it, on success and on
//! failure alike.

use std::fmt;
use std::rc::{Rc, Weak};

use mlua::RegistryKey;

use super::engine::{collect_results, EngineContext};
use super::error::ScriptError;
use super::value::Value;

// ── TableKey ──────────────────────────────────────────────────────────────

/// A table index: integer or string.
#[derive(Debug, Clone, PartialEq)]
pub enum TableKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::Int(i) => write!(f, "{i}"),
            TableKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for TableKey {
    fn from(i: i64) -> Self {
        TableKey::Int(i)
    }
}

impl From<i32> for TableKey {
    fn from(i: i32) -> Self {
        TableKey::Int(i64::from(i))
    }
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self {
        TableKey::Str(s.to_owned())
    }
}

impl From<String> for TableKey {
    fn from(s: String) -> Self {
        TableKey::Str(s)
    }
}

// ── TableRef ──────────────────────────────────────────────────────────────

/// A shared handle to a mutable table inside the interpreter.
#[derive(Clone)]
pub struct TableRef {
    ctx: Weak<EngineContext>,
    slot: Rc<RegistryKey>,
}

impl TableRef {
    /// Pin `table` in the registry and wrap the slot.
    pub(crate) fn from_table(
        ctx: &Rc<EngineContext>,
        table: mlua::Table,
    ) -> Result<Self, ScriptError> {
        let slot = ctx
            .lua
            .create_registry_value(table)
            .map_err(ScriptError::from_lua_error)?;
        Ok(Self { ctx: Rc::downgrade(ctx), slot: Rc::new(slot) })
    }

    fn context(&self) -> Result<Rc<EngineContext>, ScriptError> {
        self.ctx.upgrade().ok_or(ScriptError::StaleHandle)
    }

    fn table(&self, ctx: &Rc<EngineContext>) -> Result<mlua::Table, ScriptError> {
        ctx.lua
            .registry_value(&self.slot)
            .map_err(ScriptError::from_lua_error)
    }

    /// Materialize the underlying table for pushing.  Rejects handles
    /// bound to a different engine.
    pub(crate) fn to_table(&self, ctx: &Rc<EngineContext>) -> Result<mlua::Table, ScriptError> {
        let own = self.context()?;
        if !Rc::ptr_eq(&own, ctx) {
            return Err(ScriptError::Bind(
                "table handle belongs to a different engine".into(),
            ));
        }
        self.table(ctx)
    }

    /// Whether this handle's engine is still alive.
    pub fn is_valid(&self) -> bool {
        self.ctx.upgrade().is_some()
    }

    /// Whether two handles share the same registry slot (clone-of
    /// relationship, cheaper than [`same_table`](Self::same_table)).
    pub fn same_slot(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    /// Whether two handles alias the same underlying table.
    pub fn same_table(&self, other: &TableRef) -> Result<bool, ScriptError> {
        if self.same_slot(other) {
            return Ok(true);
        }
        let ctx = self.context()?;
        let a = self.table(&ctx)?;
        let b = other.to_table(&ctx)?;
        Ok(a == b)
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Read the value at `key`.  An absent key yields `Nil`, not an
    /// error.
    pub fn get(&self, key: impl Into<TableKey>) -> Result<Value, ScriptError> {
        let ctx = self.context()?;
        let t = self.table(&ctx)?;
        let v: mlua::Value = match key.into() {
            TableKey::Int(i) => t.get(i),
            TableKey::Str(s) => t.get(s),
        }
        .map_err(ScriptError::from_lua_error)?;
        Value::from_lua(v, &ctx)
    }

    /// Whether `key` holds a non-nil value.
    pub fn has(&self, key: impl Into<TableKey>) -> Result<bool, ScriptError> {
        let ctx = self.context()?;
        let t = self.table(&ctx)?;
        match key.into() {
            TableKey::Int(i) => t.contains_key(i),
            TableKey::Str(s) => t.contains_key(s),
        }
        .map_err(ScriptError::from_lua_error)
    }

    /// Write `value` at `key`.
    pub fn set(
        &self,
        key: impl Into<TableKey>,
        value: impl Into<Value>,
    ) -> Result<(), ScriptError> {
        let ctx = self.context()?;
        let t = self.table(&ctx)?;
        let v = value.into().into_lua(&ctx)?;
        match key.into() {
            TableKey::Int(i) => t.set(i, v),
            TableKey::Str(s) => t.set(s, v),
        }
        .map_err(ScriptError::from_lua_error)
    }

    /// All keys currently present.  Enumeration order is whatever the
    /// interpreter's iteration yields; callers must not rely on it.
    pub fn keys(&self) -> Result<Vec<Value>, ScriptError> {
        let ctx = self.context()?;
        let t = self.table(&ctx)?;
        let mut keys = Vec::new();
        for pair in t.pairs::<mlua::Value, mlua::Value>() {
            let (k, _) = pair.map_err(ScriptError::from_lua_error)?;
            keys.push(Value::from_lua(k, &ctx)?);
        }
        Ok(keys)
    }

    /// Call the function stored at `key` with `args`.
    ///
    /// Fails with [`ScriptError::NotCallable`] when the member is not a
    /// function; multiple results are packed as a sequence table.
    pub fn call_member(
        &self,
        key: impl Into<TableKey>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, ScriptError> {
        let key = key.into();
        let ctx = self.context()?;
        let t = self.table(&ctx)?;
        let member: mlua::Value = match &key {
            TableKey::Int(i) => t.get(*i),
            TableKey::Str(s) => t.get(s.as_str()),
        }
        .map_err(ScriptError::from_lua_error)?;
        let f = match member {
            mlua::Value::Function(f) => f,
            other => {
                return Err(ScriptError::NotCallable {
                    key: key.to_string(),
                    type_name: other.type_name(),
                })
            }
        };
        let mut lua_args = Vec::new();
        for a in args {
            lua_args.push(a.into_lua(&ctx)?);
        }
        let lua_args: mlua::MultiValue = lua_args.into();
        let results = f
            .call::<mlua::MultiValue>(lua_args)
            .map_err(ScriptError::from_lua_error)?;
        collect_results(results, &ctx)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRef")
            .field("slot", &Rc::as_ptr(&self.slot))
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::ScriptEngine;
    use super::*;

    fn make_engine() -> ScriptEngine {
        ScriptEngine::new().unwrap()
    }

    #[test]
    fn get_set_roundtrip_by_string_and_int_key() {
        let eng = make_engine();
        let t = eng.new_table().unwrap();
        t.set("name", "web").unwrap();
        t.set(1, 99i64).unwrap();
        assert_eq!(t.get("name").unwrap(), Value::Str("web".into()));
        assert_eq!(t.get(1).unwrap(), Value::Int(99));
    }

    #[test]
    fn absent_key_reads_nil_and_has_is_false() {
        let eng = make_engine();
        let t = eng.new_table().unwrap();
        assert_eq!(t.get("ghost").unwrap(), Value::Nil);
        assert!(!t.has("ghost").unwrap());
        t.set("ghost", 1i64).unwrap();
        assert!(t.has("ghost").unwrap());
    }

    #[test]
    fn keys_enumerates_both_kinds() {
        let eng = make_engine();
        let t = eng.new_table().unwrap();
        t.set("a", 1i64).unwrap();
        t.set(2, "two").unwrap();
        let mut keys = t.keys().unwrap();
        keys.sort_by_key(|k| k.type_name());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&Value::Int(2)));
        assert!(keys.contains(&Value::Str("a".into())));
    }

    #[test]
    fn clones_share_one_slot() {
        let eng = make_engine();
        let t = eng.new_table().unwrap();
        let u = t.clone();
        assert!(t.same_slot(&u));
        t.set("k", 5i64).unwrap();
        assert_eq!(u.get("k").unwrap(), Value::Int(5));
    }

    #[test]
    fn distinct_handles_to_one_table_alias() {
        let eng = make_engine();
        eng.eval("shared = {}", "setup").unwrap();
        let a = eng.get("shared").unwrap();
        let b = eng.get("shared").unwrap();
        let (a, b) = (a.as_table().unwrap().clone(), b.as_table().unwrap().clone());
        assert!(!a.same_slot(&b));
        assert!(a.same_table(&b).unwrap());
        a.set("k", 1i64).unwrap();
        assert_eq!(b.get("k").unwrap(), Value::Int(1));
    }

    #[test]
    fn call_member_dispatches_and_rejects_non_functions() {
        let eng = make_engine();
        eng.eval("t = { double = function(n) return n * 2 end, num = 4 }", "setup")
            .unwrap();
        let t = eng.get("t").unwrap().as_table().unwrap().clone();
        assert_eq!(
            t.call_member("double", [Value::Int(21)]).unwrap(),
            Value::Int(42)
        );
        match t.call_member("num", []) {
            Err(ScriptError::NotCallable { key, type_name }) => {
                assert_eq!(key, "num");
                assert_eq!(type_name, "number");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stale_after_engine_drop() {
        let eng = make_engine();
        let t = eng.new_table().unwrap();
        drop(eng);
        assert!(!t.is_valid());
        assert!(matches!(t.get("k"), Err(ScriptError::StaleHandle)));
        assert!(matches!(t.set("k", 1i64), Err(ScriptError::StaleHandle)));
        assert!(matches!(t.keys(), Err(ScriptError::StaleHandle)));
    }
}
