//! Object instances: a resolved class plus ordered dynamic fields.
//!
//! Field storage is insertion-ordered and keyed by byte-string name,
//! since field names are runtime values. The miss paths of reads and
//! writes defer to the class's `__get`/`__set` hooks through a
//! [`HookInvoker`], with a per-object reentry flag so a hook that
//! touches the same missing field falls through instead of recursing.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use alder_diagnostic::RuntimeResult;

use crate::class::{MethodBinding, ResolvedClass, Visibility};
use crate::string::StrValue;
use crate::value::Value;
use crate::var::Var;
use std::cmp::Ordering;

/// Calls back into the evaluator to run a bound method.
pub trait HookInvoker {
    fn call_method(
        &mut self,
        target: &ObjectRef,
        method: &MethodBinding,
        args: &[Value],
    ) -> RuntimeResult<Value>;
}

/// A hook invoker for contexts with no evaluator; every hook answers
/// `Unset`.
pub struct NoHooks;

impl HookInvoker for NoHooks {
    fn call_method(
        &mut self,
        _target: &ObjectRef,
        _method: &MethodBinding,
        _args: &[Value],
    ) -> RuntimeResult<Value> {
        Ok(Value::Unset)
    }
}

#[derive(Clone)]
pub struct FieldEntry {
    pub name: StrValue,
    pub visibility: Visibility,
    pub value: Value,
}

pub struct ObjectValue {
    class: Arc<ResolvedClass>,
    entries: Vec<FieldEntry>,
    index: FxHashMap<StrValue, usize>,
    in_field_get: bool,
    in_field_set: bool,
}

impl ObjectValue {
    pub fn new(class: Arc<ResolvedClass>) -> ObjectValue {
        ObjectValue {
            class,
            entries: Vec::new(),
            index: FxHashMap::default(),
            in_field_get: false,
            in_field_set: false,
        }
    }

    pub fn class(&self) -> &Arc<ResolvedClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.class_name()
    }

    pub fn field_count(&self) -> usize {
        self.entries.len()
    }

    /// Declared and dynamic fields in insertion order.
    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Direct read, no hook. `None` when the field does not exist.
    pub fn get_entry(&self, name: &StrValue) -> Option<&Value> {
        self.index.get(name).map(|&i| &self.entries[i].value)
    }

    /// Creates or overwrites a field with explicit visibility;
    /// instance initialization uses this for declared fields.
    pub fn init_field(&mut self, name: StrValue, visibility: Visibility, value: Value) {
        match self.index.get(&name) {
            Some(&i) => {
                self.entries[i].visibility = visibility;
                self.entries[i].value = value;
            }
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(FieldEntry {
                    name,
                    visibility,
                    value,
                });
            }
        }
    }

    /// Writes an existing field through any alias cell, or creates a
    /// public one.
    pub fn set_entry(&mut self, name: &StrValue, value: Value) {
        match self.index.get(name) {
            Some(&i) => {
                let slot = &mut self.entries[i].value;
                if let Value::Ref(var) = slot {
                    var.set(value);
                } else {
                    *slot = value;
                }
            }
            None => self.init_field(name.clone(), Visibility::Public, value),
        }
    }

    pub fn remove_field(&mut self, name: &StrValue) -> Option<Value> {
        let i = self.index.remove(name)?;
        let entry = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(entry.value)
    }

    /// Shared cell aliasing a field, creating a public null field when
    /// missing.
    pub fn field_var(&mut self, name: &StrValue) -> Var {
        if let Some(&i) = self.index.get(name) {
            return Var::promote(&mut self.entries[i].value);
        }
        let var = Var::new(Value::Null);
        self.init_field(name.clone(), Visibility::Public, Value::Ref(var.clone()));
        var
    }

    /// Runs `f` over every field value in insertion order.
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        for entry in &mut self.entries {
            f(&mut entry.value);
        }
    }

    /// Public fields as `(name, value)` pairs, for `foreach` from
    /// outside the class.
    pub fn iter_pairs(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .filter(|e| e.visibility == Visibility::Public)
            .map(|e| (Value::Str(e.name.clone()), e.value.deref()))
            .collect()
    }

    /// Loose equality: same class and loosely equal fields.
    pub fn eq_loose(&self, other: &ObjectValue) -> bool {
        if self.class.name != other.class.name || self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|e| {
            other
                .get_entry(&e.name)
                .is_some_and(|v| e.value.eq_loose(v))
        })
    }

    /// Field-count order first, then the first unequal field decides;
    /// a field missing on the right reads as greater.
    pub fn cmp_loose(&self, other: &ObjectValue) -> Ordering {
        match self.entries.len().cmp(&other.entries.len()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        for entry in &self.entries {
            match other.get_entry(&entry.name) {
                None => return Ordering::Greater,
                Some(rhs) => match entry.value.cmp_loose(rhs) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                },
            }
        }
        Ordering::Equal
    }

    /// Shallow copy for the `clone` operator: arrays detach, object
    /// fields keep their handles.
    fn clone_fields(&self) -> ObjectValue {
        let mut copy = ObjectValue::new(self.class.clone());
        for entry in &self.entries {
            copy.init_field(
                entry.name.clone(),
                entry.visibility,
                entry.value.copy_as_array_item(),
            );
        }
        copy
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.class_name());
        for entry in &self.entries {
            s.field(&entry.name.to_string_lossy(), &entry.value);
        }
        s.finish()
    }
}

/// Shared handle to an object instance. Assignment shares the handle;
/// identity is handle identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectValue>>);

impl ObjectRef {
    pub fn new(object: ObjectValue) -> ObjectRef {
        ObjectRef(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, ObjectValue> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectValue> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Reads a field. A miss consults `__get` unless the class has
    /// none or a `__get` call is already on the stack for this object;
    /// either way no entry is created.
    pub fn get_field(
        &self,
        name: &StrValue,
        hooks: &mut dyn HookInvoker,
    ) -> RuntimeResult<Value> {
        let hook = {
            let obj = self.borrow();
            if let Some(value) = obj.get_entry(name) {
                return Ok(value.deref());
            }
            if obj.in_field_get {
                return Ok(Value::Unset);
            }
            obj.class.get_hook().copied()
        };
        match hook {
            Some(hook) => {
                let _guard = ReentryGuard::enter(self, HookKind::Get);
                hooks.call_method(self, &hook, &[Value::Str(name.clone())])
            }
            None => Ok(Value::Unset),
        }
    }

    /// Writes a field. A hit writes in place; a miss consults `__set`
    /// before falling back to creating a public field.
    pub fn put_field(
        &self,
        name: &StrValue,
        value: Value,
        hooks: &mut dyn HookInvoker,
    ) -> RuntimeResult<()> {
        let hook = {
            let mut obj = self.borrow_mut();
            if obj.index.contains_key(name) {
                obj.set_entry(name, value);
                return Ok(());
            }
            if obj.in_field_set {
                None
            } else {
                obj.class.set_hook().copied()
            }
        };
        match hook {
            Some(hook) => {
                let _guard = ReentryGuard::enter(self, HookKind::Set);
                hooks
                    .call_method(self, &hook, &[Value::Str(name.clone()), value])
                    .map(|_| ())
            }
            None => {
                self.borrow_mut()
                    .init_field(name.clone(), Visibility::Public, value);
                Ok(())
            }
        }
    }

    /// `isset($obj->field)`: present and not null, hooks not consulted.
    pub fn field_isset(&self, name: &StrValue) -> bool {
        self.borrow()
            .get_entry(name)
            .is_some_and(|v| v.is_set())
    }

    /// Instance copy for the `clone` operator.
    pub fn clone_instance(&self) -> ObjectRef {
        ObjectRef::new(self.borrow().clone_fields())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.borrow().fmt(f)
    }
}

#[derive(Clone, Copy)]
enum HookKind {
    Get,
    Set,
}

/// Sets the reentry flag for one hook call and clears it on the way
/// out, even when the hook errors.
struct ReentryGuard {
    obj: ObjectRef,
    kind: HookKind,
}

impl ReentryGuard {
    fn enter(obj: &ObjectRef, kind: HookKind) -> ReentryGuard {
        let mut inner = obj.borrow_mut();
        match kind {
            HookKind::Get => inner.in_field_get = true,
            HookKind::Set => inner.in_field_set = true,
        }
        drop(inner);
        ReentryGuard {
            obj: obj.clone(),
            kind,
        }
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        let mut inner = self.obj.borrow_mut();
        match self.kind {
            HookKind::Get => inner.in_field_get = false,
            HookKind::Set => inner.in_field_set = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ResolvedClass;
    use alder_intern::StringInterner;
    use pretty_assertions::assert_eq;

    fn plain_class(name: &str) -> Arc<ResolvedClass> {
        let interner = StringInterner::new();
        ResolvedClass::incomplete(interner.intern(name), Arc::from(name))
    }

    fn object(name: &str) -> ObjectRef {
        ObjectRef::new(ObjectValue::new(plain_class(name)))
    }

    #[test]
    fn fields_keep_insertion_order() {
        let obj = object("Point");
        obj.put_field(&"y".into(), Value::Int(2), &mut NoHooks).unwrap();
        obj.put_field(&"x".into(), Value::Int(1), &mut NoHooks).unwrap();
        let names: Vec<String> = obj
            .borrow()
            .entries()
            .iter()
            .map(|e| e.name.to_string_lossy())
            .collect();
        assert_eq!(names, vec!["y", "x"]);
    }

    #[test]
    fn missing_field_reads_unset_without_creating_an_entry() {
        let obj = object("Point");
        let got = obj.get_field(&"nope".into(), &mut NoHooks).unwrap();
        assert_eq!(got, Value::Unset);
        assert_eq!(obj.borrow().field_count(), 0);
    }

    #[test]
    fn writes_through_an_aliased_field() {
        let obj = object("Point");
        obj.put_field(&"x".into(), Value::Int(1), &mut NoHooks).unwrap();
        let var = obj.borrow_mut().field_var(&"x".into());
        obj.put_field(&"x".into(), Value::Int(7), &mut NoHooks).unwrap();
        assert_eq!(var.get(), Value::Int(7));
    }

    #[test]
    fn remove_field_reindexes() {
        let obj = object("Bag");
        for (name, v) in [("a", 1), ("b", 2), ("c", 3)] {
            obj.put_field(&name.into(), Value::Int(v), &mut NoHooks).unwrap();
        }
        obj.borrow_mut().remove_field(&"b".into());
        assert_eq!(obj.borrow().get_entry(&"c".into()), Some(&Value::Int(3)));
        assert_eq!(obj.borrow().field_count(), 2);
    }

    #[test]
    fn loose_equality_compares_fields_identity_does_not() {
        let a = object("Point");
        a.put_field(&"x".into(), Value::Int(1), &mut NoHooks).unwrap();
        let b = object("Point");
        b.put_field(&"x".into(), Value::from("1"), &mut NoHooks).unwrap();
        assert!(a.borrow().eq_loose(&b.borrow()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn clone_detaches_array_fields() {
        let a = object("Holder");
        let mut arr = crate::array::ArrayValue::new();
        arr.append(Value::Int(1));
        a.put_field(&"items".into(), Value::array(arr), &mut NoHooks).unwrap();

        let b = a.clone_instance();
        if let Some(Value::Array(items)) = b.borrow().get_entry(&"items".into()).cloned() {
            items.borrow_mut().append(Value::Int(2));
        }
        if let Some(Value::Array(items)) = a.borrow().get_entry(&"items".into()) {
            assert_eq!(items.borrow().len(), 1);
        } else {
            panic!("items field lost");
        };
    }

    struct CountingHooks {
        calls: usize,
        reenter: bool,
    }

    impl HookInvoker for CountingHooks {
        fn call_method(
            &mut self,
            target: &ObjectRef,
            method: &MethodBinding,
            args: &[Value],
        ) -> RuntimeResult<Value> {
            self.calls += 1;
            if self.reenter {
                // A hook reading the same missing field must fall
                // through instead of recursing.
                let name = args[0].to_str();
                return target.get_field(&name, self);
            }
            let _ = method;
            Ok(Value::Int(42))
        }
    }

    fn hooked_class(name: &str) -> Arc<ResolvedClass> {
        use crate::class::{resolve_class, ClassDef, ClassDefId, DefSource, MethodDecl};

        struct Src(StringInterner);
        impl DefSource for Src {
            fn lower(&self, name: alder_intern::Name) -> alder_intern::Name {
                self.0.intern_lower(self.0.lookup(name))
            }
            fn lower_of_str(&self, text: &str) -> alder_intern::Name {
                self.0.intern_lower(text)
            }
            fn class_def(&self, _name: alder_intern::Name) -> Option<&ClassDef> {
                None
            }
        }

        let src = Src(StringInterner::new());
        let mut def = ClassDef::new(ClassDefId(0), src.0.intern(name), Arc::from(name));
        def.methods.push(MethodDecl {
            name: src.0.intern("__get"),
            fun: 1,
            is_abstract: false,
            is_static: false,
        });
        resolve_class(&def, None, &src).unwrap()
    }

    #[test]
    fn get_hook_fires_on_miss_only() {
        let obj = ObjectRef::new(ObjectValue::new(hooked_class("Magic")));
        let mut hooks = CountingHooks {
            calls: 0,
            reenter: false,
        };
        obj.put_field(&"real".into(), Value::Int(1), &mut hooks).unwrap();
        assert_eq!(obj.get_field(&"real".into(), &mut hooks).unwrap(), Value::Int(1));
        assert_eq!(hooks.calls, 0);
        assert_eq!(obj.get_field(&"ghost".into(), &mut hooks).unwrap(), Value::Int(42));
        assert_eq!(hooks.calls, 1);
        // The hook never created the field.
        assert_eq!(obj.borrow().field_count(), 1);
    }

    #[test]
    fn get_hook_does_not_recurse() {
        let obj = ObjectRef::new(ObjectValue::new(hooked_class("Magic")));
        let mut hooks = CountingHooks {
            calls: 0,
            reenter: true,
        };
        let got = obj.get_field(&"ghost".into(), &mut hooks).unwrap();
        assert_eq!(got, Value::Unset);
        assert_eq!(hooks.calls, 1);
        // The reentry flag is cleared afterwards.
        assert!(!obj.borrow().in_field_get);
    }
}
