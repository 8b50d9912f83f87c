//! Callable handles bridging the two worlds.
//!
//! A [`FuncRef`] is either:
//!
//! - a **host-method binding**: an ordered overload set of capability
//!   descriptors ([`MethodDesc`]) dispatching on a weakly-held host
//!   object, fronted on the script side by a single trampoline closure;
//!   or
//! - a **captured script function**: an opaque Lua closure pinned in a
//!   registry slot, callable from host code.
//!
//! # Overload resolution
//!
//! Resolution is **first-match in registration order**, not best-match:
//! descriptors are tried in the order they were added, and the first one
//! whose arity matches and whose parameter tags accept every supplied
//! argument (see [`Value::convert_to`]) wins.  This means a descriptor
//! registered earlier that can *lossily* convert the arguments beats a
//! later exact match — an `(integer)` then `(string)` set called with
//! `"12"` picks `(integer)` via parsing.  Surprising, but part of the
//! contract: callers order `add_overload` calls accordingly.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use mlua::RegistryKey;

use super::engine::{collect_results, EngineContext};
use super::error::ScriptError;
use super::value::{TypeTag, Value};

// ── Capability descriptors ────────────────────────────────────────────────

/// One entry of a host type's capability table: a method the type
/// exposes to scripts, with its expected parameter types.
///
/// `invoke` receives the target object and the arguments *after*
/// conversion, so each argument is guaranteed to match its
/// [`TypeTag`].
pub struct MethodDesc<T: ?Sized> {
    /// Logical, script-visible name.  All descriptors in one overload
    /// set share it.
    pub name: &'static str,
    /// Expected parameter types; the arity is `params.len()`.
    pub params: &'static [TypeTag],
    /// Native trampoline for this signature.
    pub invoke: fn(&T, &[Value]) -> Result<Value, ScriptError>,
}

impl<T: ?Sized> Clone for MethodDesc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for MethodDesc<T> {}

impl<T: ?Sized> fmt::Debug for MethodDesc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A host type that exposes methods to scripts.
///
/// The capability table is built once, statically; there is no runtime
/// reflection.  Descriptor order is registration order, which overload
/// resolution observes.
pub trait HostApi: 'static {
    fn capabilities() -> &'static [MethodDesc<Self>]
    where
        Self: Sized;
}

// ── Overload sets ─────────────────────────────────────────────────────────

/// Type-erased view of an overload set, shared between the host handle
/// and the script-side trampoline.
pub(crate) trait Dispatch: Any {
    fn logical_name(&self) -> &str;
    fn target_alive(&self) -> bool;
    fn dispatch(&self, args: &[Value]) -> Result<Value, ScriptError>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The overload set for one logical name on one host object.
struct HostOverloads<T: 'static> {
    name: String,
    target: Weak<T>,
    methods: Vec<MethodDesc<T>>,
}

impl<T: 'static> Dispatch for HostOverloads<T> {
    fn logical_name(&self) -> &str {
        &self.name
    }

    fn target_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn dispatch(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let target = self.target.upgrade().ok_or(ScriptError::StaleHandle)?;
        'candidates: for m in &self.methods {
            if m.params.len() != args.len() {
                continue;
            }
            let mut converted = Vec::with_capacity(args.len());
            for (arg, &tag) in args.iter().zip(m.params) {
                match arg.convert_to(tag) {
                    Ok(v) => converted.push(v),
                    Err(_) => continue 'candidates,
                }
            }
            return (m.invoke)(&target, &converted);
        }
        Err(ScriptError::NoMatchingOverload {
            name: self.name.clone(),
            arity: args.len(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type SharedDispatch = Rc<RefCell<Box<dyn Dispatch>>>;

// ── FuncRef ───────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Inner {
    /// A script-defined function pinned in a registry slot.
    Script(Rc<RegistryKey>),
    /// A host-method binding: the shared overload set plus the registry
    /// slot of the trampoline closure that fronts it inside the
    /// interpreter.  The closure holds another `Rc` of the set, so the
    /// set lives until both the interpreter's collector and the host
    /// have let go.
    Host { set: SharedDispatch, slot: Rc<RegistryKey> },
}

/// A callable handle usable from either side of the boundary.
#[derive(Clone)]
pub struct FuncRef {
    ctx: Weak<EngineContext>,
    inner: Inner,
}

impl FuncRef {
    // ── Construction: captured script function ────────────────────────────

    /// Capture a live script function by pinning it in a registry slot.
    pub(crate) fn from_function(
        ctx: &Rc<EngineContext>,
        f: mlua::Function,
    ) -> Result<Self, ScriptError> {
        let slot = ctx
            .lua
            .create_registry_value(f)
            .map_err(ScriptError::from_lua_error)?;
        Ok(Self {
            ctx: Rc::downgrade(ctx),
            inner: Inner::Script(Rc::new(slot)),
        })
    }

    // ── Construction: host method ─────────────────────────────────────────

    /// Bind one method descriptor on `target`, producing an overload set
    /// of one.  Further signatures under the same name are attached with
    /// [`add_overload`](Self::add_overload).
    ///
    /// The binding holds `target` weakly: destroying the object leaves
    /// the handle callable but every call fails with
    /// [`ScriptError::StaleHandle`] instead of reaching freed memory.
    pub(crate) fn bind_host<T: HostApi>(
        ctx: &Rc<EngineContext>,
        target: &Rc<T>,
        desc: MethodDesc<T>,
    ) -> Result<Self, ScriptError> {
        let set: SharedDispatch = Rc::new(RefCell::new(Box::new(HostOverloads {
            name: desc.name.to_owned(),
            target: Rc::downgrade(target),
            methods: vec![desc],
        })));

        // The trampoline: recover the engine context and overload set
        // from the captured handles, convert the arguments, resolve, and
        // invoke.  Any failure is raised as a script-level error so the
        // caller sees `pcall` semantics, never a silent nil.
        let weak_ctx = Rc::downgrade(ctx);
        let closure_set = Rc::clone(&set);
        let trampoline = ctx
            .lua
            .create_function(move |_, lua_args: mlua::MultiValue| {
                let ctx = weak_ctx
                    .upgrade()
                    .ok_or_else(|| ScriptError::StaleHandle.into_lua_error())?;
                let mut args = Vec::new();
                for v in lua_args {
                    args.push(Value::from_lua(v, &ctx).map_err(ScriptError::into_lua_error)?);
                }
                let result = closure_set
                    .borrow()
                    .dispatch(&args)
                    .map_err(ScriptError::into_lua_error)?;
                result.into_lua(&ctx).map_err(ScriptError::into_lua_error)
            })
            .map_err(ScriptError::from_lua_error)?;

        let slot = ctx
            .lua
            .create_registry_value(trampoline)
            .map_err(ScriptError::from_lua_error)?;
        Ok(Self {
            ctx: Rc::downgrade(ctx),
            inner: Inner::Host { set, slot: Rc::new(slot) },
        })
    }

    /// Append another signature to this binding's overload set.
    ///
    /// The descriptor's logical name must equal the set's name; a
    /// mismatch is rejected.  The addition is visible to script-side
    /// callers immediately (the set is shared with the trampoline, not
    /// copied into it).
    pub fn add_overload<T: HostApi>(&self, desc: MethodDesc<T>) -> Result<(), ScriptError> {
        let set = match &self.inner {
            Inner::Script(_) => {
                return Err(ScriptError::Bind(
                    "cannot add overloads to a captured script function".into(),
                ))
            }
            Inner::Host { set, .. } => set,
        };
        let mut set = set.borrow_mut();
        if set.logical_name() != desc.name {
            return Err(ScriptError::Bind(format!(
                "overload name mismatch: set is `{}`, descriptor is `{}`",
                set.logical_name(),
                desc.name
            )));
        }
        let overloads = set
            .as_any_mut()
            .downcast_mut::<HostOverloads<T>>()
            .ok_or_else(|| ScriptError::Bind("overload target type mismatch".into()))?;
        overloads.methods.push(desc);
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────────────────

    /// Whether calling this handle can possibly succeed: the engine is
    /// alive and, for host bindings, so is the target object.
    pub fn is_valid(&self) -> bool {
        if self.ctx.upgrade().is_none() {
            return false;
        }
        match &self.inner {
            Inner::Script(_) => true,
            Inner::Host { set, .. } => set.borrow().target_alive(),
        }
    }

    /// Whether two handles share the same underlying slot or set.
    pub fn same_slot(&self, other: &FuncRef) -> bool {
        match (&self.inner, &other.inner) {
            (Inner::Script(a), Inner::Script(b)) => Rc::ptr_eq(a, b),
            (Inner::Host { slot: a, .. }, Inner::Host { slot: b, .. }) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Materialize the script-side callable for pushing.  Rejects
    /// handles bound to a different engine.
    pub(crate) fn to_function(
        &self,
        ctx: &Rc<EngineContext>,
    ) -> Result<mlua::Function, ScriptError> {
        let own = self.ctx.upgrade().ok_or(ScriptError::StaleHandle)?;
        if !Rc::ptr_eq(&own, ctx) {
            return Err(ScriptError::Bind(
                "function handle belongs to a different engine".into(),
            ));
        }
        let slot = match &self.inner {
            Inner::Script(slot) => slot,
            Inner::Host { slot, .. } => slot,
        };
        ctx.lua
            .registry_value(slot)
            .map_err(ScriptError::from_lua_error)
    }

    // ── Calling ───────────────────────────────────────────────────────────

    /// Invoke the callable with `args`.
    ///
    /// Host-method bindings run overload resolution directly (the same
    /// path the script-side trampoline runs), so the typed error
    /// taxonomy survives at the host call site.  Captured script
    /// functions are pushed and called inside the interpreter; multiple
    /// results are packed as a sequence table.
    pub fn call(&self, args: impl IntoIterator<Item = Value>) -> Result<Value, ScriptError> {
        let ctx = self.ctx.upgrade().ok_or(ScriptError::StaleHandle)?;
        match &self.inner {
            Inner::Host { set, .. } => {
                let args: Vec<Value> = args.into_iter().collect();
                set.borrow().dispatch(&args)
            }
            Inner::Script(slot) => {
                let f: mlua::Function = ctx
                    .lua
                    .registry_value(slot)
                    .map_err(ScriptError::from_lua_error)?;
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
    }
}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Inner::Script(_) => "script",
            Inner::Host { .. } => "host",
        };
        f.debug_struct("FuncRef")
            .field("kind", &kind)
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::ScriptEngine;
    use super::*;
    use std::cell::Cell;

    fn make_engine() -> ScriptEngine {
        ScriptEngine::new().unwrap()
    }

    struct Counter {
        total: Cell<i64>,
    }

    fn counter_add(c: &Counter, args: &[Value]) -> Result<Value, ScriptError> {
        let n = args[0].as_int().unwrap_or(0);
        c.total.set(c.total.get() + n);
        Ok(Value::Int(c.total.get()))
    }

    fn counter_add_str(c: &Counter, args: &[Value]) -> Result<Value, ScriptError> {
        let s = args[0].as_str().unwrap_or("");
        c.total.set(c.total.get() + s.len() as i64);
        Ok(Value::Str(format!("len:{}", s.len())))
    }

    impl HostApi for Counter {
        fn capabilities() -> &'static [MethodDesc<Self>] {
            &[
                MethodDesc { name: "add", params: &[TypeTag::Int], invoke: counter_add },
                MethodDesc { name: "add", params: &[TypeTag::Str], invoke: counter_add_str },
            ]
        }
    }

    #[test]
    fn captured_script_function_is_callable() {
        let eng = make_engine();
        eng.eval("function triple(n) return n * 3 end", "setup").unwrap();
        let f = eng.get("triple").unwrap().as_func().unwrap().clone();
        assert_eq!(f.call([Value::Int(5)]).unwrap(), Value::Int(15));
    }

    #[test]
    fn script_function_with_no_results_returns_nil() {
        let eng = make_engine();
        eng.eval("function noop() end", "setup").unwrap();
        let f = eng.get("noop").unwrap().as_func().unwrap().clone();
        assert_eq!(f.call([]).unwrap(), Value::Nil);
    }

    #[test]
    fn script_function_multiple_results_pack_as_sequence() {
        let eng = make_engine();
        eng.eval("function pair() return 'a', 'b' end", "setup").unwrap();
        let f = eng.get("pair").unwrap().as_func().unwrap().clone();
        let packed = f.call([]).unwrap();
        let t = packed.as_table().expect("sequence table");
        assert_eq!(t.get(1).unwrap(), Value::Str("a".into()));
        assert_eq!(t.get(2).unwrap(), Value::Str("b".into()));
    }

    #[test]
    fn host_binding_dispatches_from_both_sides() {
        let eng = make_engine();
        let counter = Rc::new(Counter { total: Cell::new(0) });
        let caps = Counter::capabilities();
        let add = eng.bind_method(&counter, caps[0]).unwrap();

        // Host-side call.
        assert_eq!(add.call([Value::Int(4)]).unwrap(), Value::Int(4));

        // Script-side call through the trampoline.
        eng.set("add", add).unwrap();
        assert_eq!(eng.eval("return add(3)", "call").unwrap(), Value::Int(7));
        assert_eq!(counter.total.get(), 7);
    }

    #[test]
    fn overload_mismatch_is_rejected_by_name() {
        let eng = make_engine();
        let counter = Rc::new(Counter { total: Cell::new(0) });
        let add = eng.bind_method(&counter, Counter::capabilities()[0]).unwrap();
        let wrong = MethodDesc::<Counter> {
            name: "sub",
            params: &[TypeTag::Int],
            invoke: counter_add,
        };
        assert!(matches!(add.add_overload(wrong), Err(ScriptError::Bind(_))));
    }

    #[test]
    fn dead_target_fails_with_stale_handle() {
        let eng = make_engine();
        let counter = Rc::new(Counter { total: Cell::new(0) });
        let add = eng.bind_method(&counter, Counter::capabilities()[0]).unwrap();
        drop(counter);
        assert!(!add.is_valid());
        assert!(matches!(
            add.call([Value::Int(1)]),
            Err(ScriptError::StaleHandle)
        ));
    }

    #[test]
    fn dead_target_raises_catchable_error_in_script() {
        let eng = make_engine();
        let counter = Rc::new(Counter { total: Cell::new(0) });
        let add = eng.bind_method(&counter, Counter::capabilities()[0]).unwrap();
        eng.set("add", add).unwrap();
        drop(counter);
        let caught = eng
            .eval("local ok, err = pcall(add, 1) return tostring(err)", "call")
            .unwrap();
        let text = caught.as_str().unwrap().to_owned();
        assert!(text.contains("stale handle"), "got: {text}");
    }
}
