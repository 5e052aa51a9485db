//! The per-run execution environment.
//!
//! One `Env` serves one logical run: it owns the global and local
//! variable maps, the id-indexed function/class/constant tables, the
//! static-field storage, the diagnostic call stack, the output-buffer
//! stack, and error dispatch. Entering a call swaps the current
//! variable map for a fresh one and restores it on exit; the global
//! map itself is never copied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use alder_diagnostic::{
    Diagnostic, Handlers, HandlerOutcome, Level, Location, RuntimeError, RuntimeResult, Sink,
};
use alder_intern::Name;
use alder_value::{
    resolve_class as link_class, ArrayValue, ClassDef, DefSource, ObjectRef, ObjectValue,
    ResolveKey, ResolvedClass, Value, Var,
};

use crate::output::OutputStack;
use crate::runtime::{FunctionDecl, Runtime};
use crate::snapshot::EnvSnapshot;
use crate::stack::{CallFrame, CallStack};
use crate::superglobal::{HostContext, Superglobal};
use crate::tables::IdTable;

pub struct Env {
    runtime: Arc<Runtime>,
    host: Box<dyn HostContext>,

    globals: FxHashMap<Name, Var>,
    /// Per-call maps; the innermost is the current scope, the global
    /// map when empty.
    locals: Vec<FxHashMap<Name, Var>>,

    funs: IdTable<Arc<FunctionDecl>>,
    class_defs: IdTable<Arc<ClassDef>>,
    classes: IdTable<Arc<ResolvedClass>>,
    constants: IdTable<Value>,

    /// Static-field cells keyed by `(declaring class, field)`.
    statics: FxHashMap<(Name, Name), Var>,
    statics_initialized: FxHashSet<Name>,

    stack: CallStack,
    output: OutputStack,

    handlers: Handlers,
    error_mask: Level,
    log: Sink,
    location: Location,

    deadline: Arc<AtomicBool>,
}

impl Env {
    pub fn new(runtime: Arc<Runtime>, host: Box<dyn HostContext>, sink: Sink) -> Env {
        debug!("environment created");
        Env {
            funs: runtime.fun_pool.checkout(),
            class_defs: runtime.class_def_pool.checkout(),
            classes: runtime.class_pool.checkout(),
            constants: IdTable::new(),
            runtime,
            host,
            globals: FxHashMap::default(),
            locals: Vec::new(),
            statics: FxHashMap::default(),
            statics_initialized: FxHashSet::default(),
            stack: CallStack::new(),
            output: OutputStack::new(sink),
            handlers: Handlers::new(),
            error_mask: Level::DEFAULT_MASK,
            log: Sink::Stdout,
            location: Location::default(),
            deadline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn intern(&self, text: &str) -> Name {
        self.runtime.intern(text)
    }

    pub fn set_log(&mut self, sink: Sink) {
        self.log = sink;
    }

    /// Location attached to subsequently raised diagnostics.
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    // --- variables ------------------------------------------------------

    fn current_map(&mut self) -> &mut FxHashMap<Name, Var> {
        match self.locals.last_mut() {
            Some(map) => map,
            None => &mut self.globals,
        }
    }

    /// Reads a variable in the current scope; `Unset` when unbound.
    pub fn get_value(&mut self, name: Name) -> Value {
        if let Some(var) = self.current_map().get(&name).cloned() {
            return var.get();
        }
        match self.superglobal_var(name) {
            Some(var) => var.get(),
            None => Value::Unset,
        }
    }

    /// Cell for a variable in the current scope, created on first use.
    /// Reserved names resolve to the global map from any scope.
    pub fn get_var(&mut self, name: Name) -> Var {
        if let Some(var) = self.superglobal_var(name) {
            return var;
        }
        self.current_map()
            .entry(name)
            .or_insert_with(|| Var::new(Value::Null))
            .clone()
    }

    pub fn set_value(&mut self, name: Name, value: Value) {
        self.get_var(name).set(value);
    }

    pub fn unset_var(&mut self, name: Name) {
        self.current_map().remove(&name);
    }

    /// Cell in the global map regardless of scope, as `global $x`
    /// needs.
    pub fn get_global_var(&mut self, name: Name) -> Var {
        if let Some(var) = self.superglobal_var(name) {
            return var;
        }
        self.globals
            .entry(name)
            .or_insert_with(|| Var::new(Value::Null))
            .clone()
    }

    /// Cell for a reserved global, materialized from the host on first
    /// use and cached in the global map after that.
    fn superglobal_var(&mut self, name: Name) -> Option<Var> {
        let text = self.runtime.interner().lookup(name);
        let which = Superglobal::from_name(text)?;
        if let Some(var) = self.globals.get(&name) {
            return Some(var.clone());
        }
        trace!(name = text, "superglobal materialized");
        let value = match which {
            Superglobal::Globals => {
                // A by-value view of the current globals.
                let mut array = ArrayValue::new();
                for (&global, var) in &self.globals {
                    let key = self.runtime.interner().lookup(global);
                    array.insert(key.into(), var.get().copy());
                }
                Value::array(array)
            }
            other => other.materialize(self.host.as_ref()),
        };
        let var = Var::new(value);
        self.globals.insert(name, var.clone());
        Some(var)
    }

    // --- calls and scopes -----------------------------------------------

    /// Enters a call: fresh local map, diagnostic frame pushed.
    pub fn push_call(&mut self, frame: CallFrame) {
        self.locals.push(FxHashMap::default());
        self.stack.push(frame);
    }

    /// Leaves a call, restoring the previous scope.
    pub fn pop_call(&mut self) {
        self.locals.pop();
        self.stack.pop();
    }

    pub fn call_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn stack_trace(&self) -> String {
        self.stack.trace()
    }

    // --- functions, constants, classes ----------------------------------

    /// Registers a function under its lower-cased name. Redefinition
    /// is a fatal error.
    pub fn define_function(&mut self, decl: Arc<FunctionDecl>) -> RuntimeResult<()> {
        let lower = self.runtime.lower(decl.name);
        let id = self.runtime.fun_id(lower);
        if self.funs.get(id).is_some() {
            return Err(RuntimeError::fatal(format!(
                "cannot redeclare function {}()",
                self.runtime.interner().lookup(decl.name)
            ))
            .at(self.location.clone()));
        }
        self.funs.set(id, decl);
        Ok(())
    }

    pub fn find_function(&self, lower_name: Name) -> Option<Arc<FunctionDecl>> {
        let id = self.runtime.fun_id(lower_name);
        self.funs.get(id).cloned()
    }

    /// Defines a constant once; a second definition is refused.
    pub fn define_constant(&mut self, name: Name, value: Value) -> bool {
        let id = self.runtime.const_id(name);
        if self.constants.get(id).is_some() {
            return false;
        }
        self.constants.set(id, value);
        true
    }

    pub fn constant(&self, name: Name) -> Option<Value> {
        let id = self.runtime.const_id(name);
        self.constants.get(id).map(Value::copy)
    }

    pub fn define_class(&mut self, def: Arc<ClassDef>) {
        let lower = self.runtime.lower(def.name);
        let id = self.runtime.class_id(lower);
        // Redefinition invalidates whatever was resolved from the old
        // definition.
        if self.classes.take(id).is_some() {
            self.runtime.class_cache().invalidate(def.id);
        }
        self.class_defs.set(id, def);
    }

    /// Resolves a class by name, linking and caching as needed.
    pub fn resolve_class(&mut self, name: Name) -> RuntimeResult<Arc<ResolvedClass>> {
        let lower = self.runtime.lower(name);
        let id = self.runtime.class_id(lower);
        if let Some(class) = self.classes.get(id) {
            return Ok(class.clone());
        }
        let def = self.class_defs.get(id).cloned().ok_or_else(|| {
            RuntimeError::fatal(format!(
                "class '{}' not found",
                self.runtime.interner().lookup(name)
            ))
            .at(self.location.clone())
        })?;

        let parent = match def.parent {
            Some(parent) => Some(self.resolve_class(parent)?),
            None => None,
        };

        if def.is_modified() {
            self.runtime.class_cache().invalidate(def.id);
            def.clear_modified();
        }

        let key = ResolveKey {
            def: def.id,
            parent_identity: parent.as_ref().map(|p| p.identity()).unwrap_or(0),
        };
        let resolved = match self.runtime.class_cache().get(&key) {
            Some(cached) => {
                trace!(class = self.runtime.interner().lookup(name), "class cache hit");
                cached
            }
            None => {
                let source = EnvDefSource {
                    runtime: &self.runtime,
                    defs: &self.class_defs,
                };
                let linked = link_class(&def, parent, &source)?;
                self.runtime.class_cache().publish(key, linked)
            }
        };
        self.classes.set(id, resolved.clone());
        Ok(resolved)
    }

    /// Instantiates a class: declared fields appear in declaration
    /// order, initialized to null until the evaluator runs their
    /// default expressions. Abstract classes refuse.
    pub fn new_object(&mut self, class: &Arc<ResolvedClass>) -> RuntimeResult<ObjectRef> {
        if class.is_abstract || class.is_interface {
            return Err(RuntimeError::fatal(format!(
                "cannot instantiate abstract class {}",
                class.class_name()
            ))
            .at(self.location.clone()));
        }
        let mut object = ObjectValue::new(class.clone());
        for field in class.declared_fields() {
            let name = self.runtime.interner().lookup(field.name);
            object.init_field(name.into(), field.visibility, Value::Null);
        }
        Ok(ObjectRef::new(object))
    }

    // --- static fields --------------------------------------------------

    /// Storage cell of a static field, shared along the inheritance
    /// chain: the declaring class keys the cell, so a subclass reads
    /// its parent's storage.
    pub fn static_var(&mut self, class: &ResolvedClass, field: Name) -> Option<Var> {
        let (declaring, decl) = class
            .static_fields()
            .iter()
            .find(|(_, decl)| decl.name == field)?;
        let key = (*declaring, decl.name);
        Some(
            self.statics
                .entry(key)
                .or_insert_with(|| Var::new(Value::Null))
                .clone(),
        )
    }

    /// True the first time a class's statics need their initializers
    /// run this execution.
    pub fn needs_static_init(&mut self, class_name: Name) -> bool {
        self.statics_initialized.insert(class_name)
    }

    // --- output ---------------------------------------------------------

    pub fn write_output(&mut self, bytes: &[u8]) {
        self.output.write(bytes);
    }

    pub fn print(&mut self, value: &Value) {
        let s = value.to_str();
        self.output.write(s.as_bytes());
    }

    pub fn push_output_buffer(&mut self) {
        self.output.push_buffer();
    }

    pub fn pop_output_buffer(&mut self) -> bool {
        self.output.pop_flush()
    }

    pub fn discard_output_buffer(&mut self) -> Option<Vec<u8>> {
        self.output.pop_discard()
    }

    pub fn output_contents(&self) -> Option<&[u8]> {
        self.output.contents()
    }

    pub fn output_depth(&self) -> usize {
        self.output.depth()
    }

    pub fn flush_output(&mut self) {
        self.output.flush_all();
    }

    // --- diagnostics ----------------------------------------------------

    pub fn set_error_mask(&mut self, mask: Level) {
        self.error_mask = mask;
    }

    pub fn set_error_handler<F>(&mut self, mask: Level, handler: F)
    where
        F: FnMut(&Diagnostic) -> HandlerOutcome + 'static,
    {
        self.handlers.set(mask, handler);
    }

    pub fn clear_error_handler(&mut self, mask: Level) {
        self.handlers.clear(mask);
    }

    /// Raises a leveled diagnostic. A registered handler runs first
    /// (detached for the duration of its own call); unhandled fatal
    /// levels abort by returning an error, unhandled non-fatal levels
    /// go to the log subject to the mask.
    pub fn diagnostic(
        &mut self,
        level: Level,
        message: impl Into<String>,
    ) -> RuntimeResult<()> {
        let message = format!("{}{}", message.into(), self.stack.context_suffix());
        let diag = Diagnostic::new(level, message).at(self.location.clone());

        if let Some(HandlerOutcome::Handled) = self.handlers.dispatch(&diag) {
            return Ok(());
        }
        if level.is_fatal() {
            return Err(RuntimeError::fatal(diag.message.clone()).at(self.location.clone()));
        }
        if self.error_mask.intersects(level) {
            self.log.writeln(&diag.to_string());
        }
        Ok(())
    }

    /// Non-fatal convenience: execution always continues.
    pub fn warning(&mut self, message: impl Into<String>) {
        let _ = self.diagnostic(Level::WARNING, message);
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        let _ = self.diagnostic(Level::NOTICE, message);
    }

    pub fn deprecated(&mut self, message: impl Into<String>) {
        let _ = self.diagnostic(Level::DEPRECATED, message);
    }

    // --- deadline -------------------------------------------------------

    /// Flag handle a host thread may set to stop the run at the next
    /// checkpoint.
    pub fn deadline_handle(&self) -> Arc<AtomicBool> {
        self.deadline.clone()
    }

    /// Called between statements by the evaluator; refuses further
    /// work once the deadline flag is set.
    pub fn checkpoint(&self) -> RuntimeResult<()> {
        if self.deadline.load(Ordering::Relaxed) {
            return Err(
                RuntimeError::fatal("execution deadline exceeded").at(self.location.clone())
            );
        }
        Ok(())
    }

    // --- snapshot -------------------------------------------------------

    /// Captures the warm tables and globals for reuse by a later run.
    pub fn save_state(&self) -> EnvSnapshot {
        EnvSnapshot::capture(&self.funs, &self.class_defs, &self.constants, &self.globals)
    }

    /// Installs a snapshot. Globals are written *through* any cells
    /// that already exist, so aliases handed out before the restore
    /// keep observing the restored values.
    pub fn restore_state(&mut self, snapshot: &EnvSnapshot) {
        snapshot.install(
            &mut self.funs,
            &mut self.class_defs,
            &mut self.constants,
            &mut self.globals,
        );
        debug!("environment state restored");
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        self.output.flush_all();
        self.runtime.fun_pool.park(std::mem::take(&mut self.funs));
        self.runtime
            .class_def_pool
            .park(std::mem::take(&mut self.class_defs));
        self.runtime
            .class_pool
            .park(std::mem::take(&mut self.classes));
    }
}

struct EnvDefSource<'a> {
    runtime: &'a Runtime,
    defs: &'a IdTable<Arc<ClassDef>>,
}

impl DefSource for EnvDefSource<'_> {
    fn lower(&self, name: Name) -> Name {
        self.runtime.lower(name)
    }

    fn lower_of_str(&self, text: &str) -> Name {
        self.runtime.interner().intern_lower(text)
    }

    fn class_def(&self, name: Name) -> Option<&ClassDef> {
        let id = self.runtime.class_id(self.runtime.lower(name));
        self.defs.get(id).map(Arc::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superglobal::EmptyHost;
    use alder_value::{ClassDefId, StaticFieldDecl};
    use pretty_assertions::assert_eq;

    fn test_env(runtime: &Arc<Runtime>) -> Env {
        Env::new(runtime.clone(), Box::new(EmptyHost), Sink::buffer())
    }

    fn class_def(runtime: &Runtime, id: u32, name: &str) -> ClassDef {
        ClassDef::new(ClassDefId(id), runtime.intern(name), name.into())
    }

    #[test]
    fn calls_get_fresh_scopes_over_shared_globals() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let x = env.intern("x");

        env.set_value(x, Value::Int(1));
        env.push_call(CallFrame::named("main"));
        assert!(env.get_value(x).is_unset());

        env.set_value(x, Value::Int(2));
        assert_eq!(env.get_value(x), Value::Int(2));

        env.pop_call();
        assert_eq!(env.get_value(x), Value::Int(1));
    }

    #[test]
    fn global_var_reaches_past_a_local_scope() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let x = env.intern("x");

        env.set_value(x, Value::Int(10));
        env.push_call(CallFrame::named("main"));
        let alias = env.get_global_var(x);
        alias.set(Value::Int(11));
        env.pop_call();
        assert_eq!(env.get_value(x), Value::Int(11));
    }

    #[test]
    fn superglobals_materialize_once_and_cache() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let server = env.intern("_SERVER");

        let first = env.get_var(server);
        let second = env.get_var(server);
        assert!(first.ptr_eq(&second));
        assert!(first.get().is_array());
    }

    #[test]
    fn globals_array_reflects_current_globals() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let x = env.intern("x");
        let globals = env.intern("GLOBALS");

        env.set_value(x, Value::Int(7));
        let snapshot = env.get_value(globals);
        assert_eq!(snapshot.index_get(&Value::from("x")), Value::Int(7));
    }

    #[test]
    fn constants_define_once() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let pi = env.intern("PI");

        assert!(env.define_constant(pi, Value::Float(3.25)));
        assert!(!env.define_constant(pi, Value::Int(0)));
        assert_eq!(env.constant(pi), Some(Value::Float(3.25)));
    }

    #[test]
    fn redeclaring_a_function_is_fatal() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let name = env.intern("foo");

        env.define_function(Arc::new(FunctionDecl { name, body: 0 }))
            .unwrap();
        let err = env
            .define_function(Arc::new(FunctionDecl { name, body: 1 }))
            .unwrap_err();
        assert!(err.message.contains("redeclare"));
        assert!(env.find_function(runtime.lower(name)).is_some());
    }

    #[test]
    fn subclass_statics_share_the_parent_cell() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let count = env.intern("count");

        let mut base = class_def(&runtime, 0, "Counter");
        base.static_fields.push(StaticFieldDecl {
            name: count,
            default: None,
        });
        let mut sub = class_def(&runtime, 1, "SubCounter");
        sub.parent = Some(env.intern("Counter"));

        env.define_class(Arc::new(base));
        env.define_class(Arc::new(sub));

        let base_class = env.resolve_class(runtime.intern("Counter")).unwrap();
        let sub_class = env.resolve_class(runtime.intern("SubCounter")).unwrap();

        let through_base = env.static_var(&base_class, count).unwrap();
        let through_sub = env.static_var(&sub_class, count).unwrap();
        assert!(through_base.ptr_eq(&through_sub));

        through_sub.set(Value::Int(3));
        assert_eq!(through_base.get(), Value::Int(3));
    }

    #[test]
    fn resolutions_are_shared_across_environments() {
        let runtime = Runtime::new();
        let name = runtime.intern("Shared");

        let first = {
            let mut env = test_env(&runtime);
            env.define_class(Arc::new(class_def(&runtime, 0, "Shared")));
            env.resolve_class(name).unwrap()
        };
        let second = {
            let mut env = test_env(&runtime);
            env.define_class(Arc::new(class_def(&runtime, 0, "Shared")));
            env.resolve_class(name).unwrap()
        };
        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn modified_definitions_relink() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let name = runtime.intern("Hot");
        let def = Arc::new(class_def(&runtime, 0, "Hot"));

        env.define_class(def.clone());
        let before = env.resolve_class(name).unwrap();

        def.set_modified();
        env.define_class(def.clone());
        let after = env.resolve_class(name).unwrap();
        assert_ne!(before.identity(), after.identity());
    }

    #[test]
    fn abstract_classes_refuse_instantiation() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let mut def = class_def(&runtime, 0, "Shape");
        def.is_abstract = true;
        env.define_class(Arc::new(def));

        let class = env.resolve_class(runtime.intern("Shape")).unwrap();
        assert!(env.new_object(&class).is_err());
    }

    #[test]
    fn handled_diagnostics_never_reach_the_log() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let log = Sink::buffer();
        let seen = std::rc::Rc::new(std::cell::Cell::new(0u32));
        let seen_in_handler = seen.clone();

        env.set_log(log);
        env.set_error_handler(Level::WARNING, move |_| {
            seen_in_handler.set(seen_in_handler.get() + 1);
            HandlerOutcome::Handled
        });
        env.warning("quiet");
        assert_eq!(seen.get(), 1);

        env.clear_error_handler(Level::WARNING);
        env.warning("loud");
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn unhandled_fatal_levels_abort() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        env.push_call(CallFrame::named("boom"));

        let err = env.diagnostic(Level::ERROR, "bad call").unwrap_err();
        assert!(err.message.contains("bad call"));
        assert!(err.message.contains("boom()"));
    }

    #[test]
    fn masked_levels_are_suppressed() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let log = Sink::buffer();

        env.set_log(log);
        env.set_error_mask(Level::DEFAULT_MASK.difference(Level::NOTICE));
        env.notice("invisible");
        env.warning("visible");
        let text = String::from_utf8(env.log.contents()).unwrap();
        assert!(!text.contains("invisible"));
        assert!(text.contains("visible"));
    }

    #[test]
    fn deadline_stops_the_next_checkpoint() {
        let runtime = Runtime::new();
        let env = test_env(&runtime);

        assert!(env.checkpoint().is_ok());
        env.deadline_handle().store(true, Ordering::Relaxed);
        assert!(env.checkpoint().is_err());
    }

    #[test]
    fn parked_tables_come_back_empty_but_warm() {
        let runtime = Runtime::new();
        let name = runtime.intern("f");
        {
            let mut env = test_env(&runtime);
            env.define_function(Arc::new(FunctionDecl { name, body: 0 }))
                .unwrap();
        }
        let env = test_env(&runtime);
        assert!(env.find_function(runtime.lower(name)).is_none());
        assert!(env.funs.capacity() > 0);
    }

    #[test]
    fn restore_writes_through_live_aliases() {
        let runtime = Runtime::new();
        let mut env = test_env(&runtime);
        let x = env.intern("x");

        env.set_value(x, Value::Int(1));
        let snapshot = env.save_state();

        let alias = env.get_var(x);
        alias.set(Value::Int(99));
        env.restore_state(&snapshot);

        assert_eq!(alias.get(), Value::Int(1));
        assert_eq!(env.get_value(x), Value::Int(1));
    }
}
