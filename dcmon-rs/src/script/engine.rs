//! The embedded Lua 5.4 interpreter.
//!
//! [`ScriptEngine`] owns the single `mlua::Lua` instance for the
//! process.  Exactly one engine exists for the lifetime of the bridge's
//! use; dropping it invalidates every outstanding [`TableRef`] and
//! [`FuncRef`], which from then on report [`ScriptError::StaleHandle`].
//!
//! Everything that needs the interpreter — handles, trampolines — holds
//! an explicit `Weak<EngineContext>` rather than recovering it from
//! hidden global state, and every chunk and call runs in protected
//! mode: a runtime fault that would abort a raw embedding (stack
//! overflow from unbounded recursion, allocation failure) surfaces as a
//! catchable [`ScriptError`] at the `eval`/`call` boundary instead.
//!
//! The engine is strictly single-threaded.  Re-entrancy is supported in
//! one direction only: a script may call a bound host method, and that
//! method may call back into a different script function; both nested
//! calls share the one interpreter.

use std::io::Read;
use std::rc::Rc;

use mlua::Lua;

use super::error::ScriptError;
use super::function::{FuncRef, HostApi, MethodDesc};
use super::table::{TableKey, TableRef};
use super::value::Value;

/// Interpreter state shared (weakly) with every handle and trampoline.
pub(crate) struct EngineContext {
    pub(crate) lua: Lua,
}

/// Collapse a call's results to a single [`Value`]: zero results is
/// `Nil`, one is the value itself, more are packed into a fresh
/// 1-based sequence table.
pub(crate) fn collect_results(
    results: mlua::MultiValue,
    ctx: &Rc<EngineContext>,
) -> Result<Value, ScriptError> {
    let mut values: Vec<mlua::Value> = results.into_iter().collect();
    match values.len() {
        0 => Ok(Value::Nil),
        1 => Value::from_lua(values.pop().unwrap_or(mlua::Value::Nil), ctx),
        _ => {
            let t = ctx.lua.create_table().map_err(ScriptError::from_lua_error)?;
            for (i, v) in values.into_iter().enumerate() {
                t.raw_set(i as i64 + 1, v).map_err(ScriptError::from_lua_error)?;
            }
            Ok(Value::Table(TableRef::from_table(ctx, t)?))
        }
    }
}

// ── ScriptEngine ──────────────────────────────────────────────────────────

/// The single embedded interpreter instance.
///
/// Create once with [`ScriptEngine::new`], evaluate configuration
/// scripts with [`eval`](Self::eval), and bind host capabilities with
/// [`bind_method`](Self::bind_method) / [`bind_object`](Self::bind_object).
/// Drop to close the interpreter.
pub struct ScriptEngine {
    ctx: Rc<EngineContext>,
    globals: TableRef,
    registry: TableRef,
}

impl ScriptEngine {
    /// Create a fresh interpreter with the standard libraries open.
    pub fn new() -> Result<Self, ScriptError> {
        let ctx = Rc::new(EngineContext { lua: Lua::new() });
        let globals = TableRef::from_table(&ctx, ctx.lua.globals())?;
        // Private bookkeeping table.  It lives in the registry only;
        // scripts cannot reach it through the global namespace.
        let registry_table = ctx.lua.create_table().map_err(ScriptError::from_lua_error)?;
        let registry = TableRef::from_table(&ctx, registry_table)?;
        Ok(Self { ctx, globals, registry })
    }

    /// The global namespace, as a table handle.
    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    /// The private registry table: host-side bookkeeping invisible to
    /// scripts.  Components use it to keep values alive across calls.
    pub fn registry(&self) -> &TableRef {
        &self.registry
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// Compile and immediately execute `source` under the diagnostic
    /// chunk name `name` (used only in error messages).
    ///
    /// Returns the chunk's results collapsed per [`collect_results`]:
    /// `Nil` for none, the value for one, a sequence table for several.
    pub fn eval(&self, source: &str, name: &str) -> Result<Value, ScriptError> {
        let results = self
            .ctx
            .lua
            .load(source)
            .set_name(name)
            .eval::<mlua::MultiValue>()
            .map_err(ScriptError::from_lua_error)?;
        collect_results(results, &self.ctx)
    }

    /// Read all of `source` and evaluate it under `name`.
    pub fn eval_reader(&self, mut source: impl Read, name: &str) -> Result<Value, ScriptError> {
        let mut buf = String::new();
        source
            .read_to_string(&mut buf)
            .map_err(|e| ScriptError::Compile(format!("cannot read {name}: {e}")))?;
        self.eval(&buf, name)
    }

    // ── Global-namespace conveniences ─────────────────────────────────────

    /// Read a global.
    pub fn get(&self, key: impl Into<TableKey>) -> Result<Value, ScriptError> {
        self.globals.get(key)
    }

    /// Write a global.
    pub fn set(
        &self,
        key: impl Into<TableKey>,
        value: impl Into<Value>,
    ) -> Result<(), ScriptError> {
        self.globals.set(key, value)
    }

    /// Whether a global holds a non-nil value.
    pub fn has(&self, key: impl Into<TableKey>) -> Result<bool, ScriptError> {
        self.globals.has(key)
    }

    /// All global names.
    pub fn keys(&self) -> Result<Vec<Value>, ScriptError> {
        self.globals.keys()
    }

    /// Call a global function by name.
    pub fn call_member(
        &self,
        key: impl Into<TableKey>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Value, ScriptError> {
        self.globals.call_member(key, args)
    }

    // ── Construction of bridge objects ────────────────────────────────────

    /// Create a fresh, empty table inside the interpreter.
    pub fn new_table(&self) -> Result<TableRef, ScriptError> {
        let t = self.ctx.lua.create_table().map_err(ScriptError::from_lua_error)?;
        TableRef::from_table(&self.ctx, t)
    }

    /// Bind one method descriptor on `target` as a callable handle.
    pub fn bind_method<T: HostApi>(
        &self,
        target: &Rc<T>,
        desc: MethodDesc<T>,
    ) -> Result<FuncRef, ScriptError> {
        FuncRef::bind_host(&self.ctx, target, desc)
    }

    /// Bind every descriptor of `target`'s capability table that shares
    /// `name` into one overload set, in declaration order.
    pub fn bind_named<T: HostApi>(
        &self,
        target: &Rc<T>,
        name: &str,
    ) -> Result<FuncRef, ScriptError> {
        let mut descs = T::capabilities().iter().filter(|d| d.name == name);
        let first = descs
            .next()
            .ok_or_else(|| ScriptError::Bind(format!("unknown method `{name}`")))?;
        let binding = FuncRef::bind_host(&self.ctx, target, *first)?;
        for desc in descs {
            binding.add_overload(*desc)?;
        }
        Ok(binding)
    }

    /// Expose `target`'s whole capability table as a table of callable
    /// members, one overload set per logical name.
    pub fn bind_object<T: HostApi>(&self, target: &Rc<T>) -> Result<TableRef, ScriptError> {
        let table = self.new_table()?;
        let mut seen: Vec<&'static str> = Vec::new();
        for desc in T::capabilities() {
            if seen.contains(&desc.name) {
                continue;
            }
            seen.push(desc.name);
            let binding = self.bind_named(target, desc.name)?;
            table.set(desc.name, binding)?;
        }
        Ok(table)
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine").finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
