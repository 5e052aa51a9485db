//! Class definitions and their resolved, linked form.
//!
//! A [`ClassDef`] is the declaration as written: its own methods,
//! fields, constants, and the names of its parent and interfaces. A
//! [`ResolvedClass`] is the flattened result of linking a definition
//! against its resolved parent: one case-insensitive method table, the
//! full declared-field list in root-to-leaf order, and the transitive
//! `instanceof` set. Resolved classes are immutable and shared behind
//! `Arc`, so a cache may hand the same resolution to many runtimes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use rustc_hash::{FxHashMap, FxHashSet};

use alder_diagnostic::{RuntimeError, RuntimeResult};
use alder_intern::Name;

/// Handle to a function body owned by the evaluator.
pub type FunId = u32;

/// Handle to a constant or default-value expression owned by the
/// evaluator; resolution never evaluates these.
pub type ExprId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDecl {
    pub name: Name,
    pub visibility: Visibility,
    pub default: Option<ExprId>,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodDecl {
    /// Original-case method name.
    pub name: Name,
    pub fun: FunId,
    pub is_abstract: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StaticFieldDecl {
    pub name: Name,
    pub default: Option<ExprId>,
}

/// A class as declared, before linking.
pub struct ClassDef {
    pub id: ClassDefId,
    /// Original-case class name.
    pub name: Name,
    pub name_text: Arc<str>,
    pub parent: Option<Name>,
    pub interfaces: Vec<Name>,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub is_final: bool,
    pub methods: Vec<MethodDecl>,
    pub fields: Vec<FieldDecl>,
    pub consts: Vec<(Name, ExprId)>,
    pub static_fields: Vec<StaticFieldDecl>,
    modified: AtomicBool,
}

impl ClassDef {
    pub fn new(id: ClassDefId, name: Name, name_text: Arc<str>) -> ClassDef {
        ClassDef {
            id,
            name,
            name_text,
            parent: None,
            interfaces: Vec::new(),
            is_abstract: false,
            is_interface: false,
            is_final: false,
            methods: Vec::new(),
            fields: Vec::new(),
            consts: Vec::new(),
            static_fields: Vec::new(),
            modified: AtomicBool::new(false),
        }
    }

    /// Marks the definition changed since it was last resolved. Caches
    /// key resolutions on `(def id, parent identity)` and must drop
    /// entries for modified definitions.
    pub fn set_modified(&self) {
        self.modified.store(true, AtomicOrdering::Release);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(AtomicOrdering::Acquire)
    }

    /// Clears the modified flag once dependents were invalidated.
    pub fn clear_modified(&self) {
        self.modified.store(false, AtomicOrdering::Release);
    }
}

/// A method as it appears in a resolved table: which class declared it
/// and which function body it binds to.
#[derive(Debug, Clone, Copy)]
pub struct MethodBinding {
    pub declaring_class: Name,
    pub name: Name,
    pub fun: FunId,
    pub is_abstract: bool,
    pub is_static: bool,
}

/// How a resolved class was identified for lookup-table purposes: the
/// name used for declared fields and the serialize format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    pub def: ClassDefId,
    /// Address of the parent resolution, 0 when none. Distinguishes
    /// re-resolutions of the same definition against changed parents.
    pub parent_identity: usize,
}

pub struct ResolvedClass {
    pub def_id: ClassDefId,
    pub name: Name,
    pub name_text: Arc<str>,
    pub parent: Option<Arc<ResolvedClass>>,
    pub is_abstract: bool,
    pub is_interface: bool,
    /// Methods keyed by lower-cased name.
    methods: FxHashMap<Name, MethodBinding>,
    constructor: Option<MethodBinding>,
    get_hook: Option<MethodBinding>,
    set_hook: Option<MethodBinding>,
    call_hook: Option<MethodBinding>,
    /// Lower-cased names of every class and interface this one is.
    instanceof: FxHashSet<Name>,
    /// Declared fields, root class first.
    fields: Vec<FieldDecl>,
    consts: FxHashMap<Name, (Name, ExprId)>,
    static_fields: Vec<(Name, StaticFieldDecl)>,
}

impl ResolvedClass {
    pub fn identity(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    pub fn class_name(&self) -> &str {
        &self.name_text
    }

    /// Looks a method up by lower-cased name.
    pub fn method(&self, lower_name: Name) -> Option<&MethodBinding> {
        self.methods.get(&lower_name)
    }

    pub fn constructor(&self) -> Option<&MethodBinding> {
        self.constructor.as_ref()
    }

    pub fn get_hook(&self) -> Option<&MethodBinding> {
        self.get_hook.as_ref()
    }

    pub fn set_hook(&self) -> Option<&MethodBinding> {
        self.set_hook.as_ref()
    }

    pub fn call_hook(&self) -> Option<&MethodBinding> {
        self.call_hook.as_ref()
    }

    /// `instanceof` against a lower-cased class or interface name.
    pub fn is_a(&self, lower_name: Name) -> bool {
        self.instanceof.contains(&lower_name)
    }

    /// Declared fields in initialization order, root class first.
    pub fn declared_fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Constant expression and declaring class, by lower-cased name.
    pub fn constant(&self, lower_name: Name) -> Option<(Name, ExprId)> {
        self.consts.get(&lower_name).copied()
    }

    /// Static field declarations with their declaring class, root
    /// first. Storage lives in the runtime, keyed per declaring class.
    pub fn static_fields(&self) -> &[(Name, StaticFieldDecl)] {
        &self.static_fields
    }

    /// Synthesized stand-in for a class that was named but never
    /// declared, as deserialization needs.
    pub fn incomplete(name: Name, name_text: Arc<str>) -> Arc<ResolvedClass> {
        Arc::new(ResolvedClass {
            def_id: ClassDefId(u32::MAX),
            name,
            name_text,
            parent: None,
            is_abstract: false,
            is_interface: false,
            methods: FxHashMap::default(),
            constructor: None,
            get_hook: None,
            set_hook: None,
            call_hook: None,
            instanceof: FxHashSet::default(),
            fields: Vec::new(),
            consts: FxHashMap::default(),
            static_fields: Vec::new(),
        })
    }
}

impl fmt::Debug for ResolvedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedClass")
            .field("name", &self.name_text)
            .field("methods", &self.methods.len())
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Name access the linker needs: lower-casing for method tables and
/// definition lookup for interfaces.
pub trait DefSource {
    /// Lower-cased interned form of an interned name.
    fn lower(&self, name: Name) -> Name;
    /// Interned name for already-lower-cased text.
    fn lower_of_str(&self, text: &str) -> Name;
    /// Definition of an interface or class by name.
    fn class_def(&self, name: Name) -> Option<&ClassDef>;
}

/// Links a definition against its resolved parent.
///
/// Interfaces fold in first, recursively, then the concrete ancestry
/// from the root down, so a leaf method always wins over an inherited
/// one while an abstract declaration never displaces a concrete body.
pub fn resolve_class(
    def: &ClassDef,
    parent: Option<Arc<ResolvedClass>>,
    source: &dyn DefSource,
) -> RuntimeResult<Arc<ResolvedClass>> {
    let mut linker = Linker {
        source,
        class_name: def.name,
        methods: FxHashMap::default(),
        constructor: None,
        get_hook: None,
        set_hook: None,
        call_hook: None,
        instanceof: FxHashSet::default(),
        fields: Vec::new(),
        consts: FxHashMap::default(),
        static_fields: Vec::new(),
    };

    // Inherited surface first.
    if let Some(parent) = &parent {
        linker.fold_resolved(parent);
    }
    for &iface in &def.interfaces {
        linker.fold_interface(iface)?;
    }
    linker.instanceof.insert(source.lower(def.name));

    // The class's own declarations override everything folded so far.
    for field in &def.fields {
        linker.add_field(*field);
    }
    for &(name, expr) in &def.consts {
        linker.consts.insert(source.lower(name), (def.name, expr));
    }
    for decl in &def.static_fields {
        linker.static_fields.push((def.name, *decl));
    }
    for method in &def.methods {
        linker.add_method(MethodBinding {
            declaring_class: def.name,
            name: method.name,
            fun: method.fun,
            is_abstract: method.is_abstract,
            is_static: method.is_static,
        })?;
    }

    linker.bind_constructor(def, parent.as_deref());
    linker.bind_hooks();

    tracing::debug!(
        class = &*def.name_text,
        methods = linker.methods.len(),
        "class linked"
    );

    Ok(Arc::new(ResolvedClass {
        def_id: def.id,
        name: def.name,
        name_text: def.name_text.clone(),
        parent,
        is_abstract: def.is_abstract,
        is_interface: def.is_interface,
        methods: linker.methods,
        constructor: linker.constructor,
        get_hook: linker.get_hook,
        set_hook: linker.set_hook,
        call_hook: linker.call_hook,
        instanceof: linker.instanceof,
        fields: linker.fields,
        consts: linker.consts,
        static_fields: linker.static_fields,
    }))
}

struct Linker<'a> {
    source: &'a dyn DefSource,
    class_name: Name,
    methods: FxHashMap<Name, MethodBinding>,
    constructor: Option<MethodBinding>,
    get_hook: Option<MethodBinding>,
    set_hook: Option<MethodBinding>,
    call_hook: Option<MethodBinding>,
    instanceof: FxHashSet<Name>,
    fields: Vec<FieldDecl>,
    consts: FxHashMap<Name, (Name, ExprId)>,
    static_fields: Vec<(Name, StaticFieldDecl)>,
}

impl Linker<'_> {
    fn fold_resolved(&mut self, parent: &ResolvedClass) {
        self.instanceof.extend(parent.instanceof.iter().copied());
        self.fields.extend_from_slice(&parent.fields);
        for (&name, &binding) in &parent.methods {
            self.methods.insert(name, binding);
        }
        for (&name, &entry) in &parent.consts {
            self.consts.insert(name, entry);
        }
        self.static_fields
            .extend_from_slice(&parent.static_fields);
    }

    fn fold_interface(&mut self, iface: Name) -> RuntimeResult<()> {
        let lower = self.source.lower(iface);
        if !self.instanceof.insert(lower) {
            return Ok(());
        }
        let Some(def) = self.source.class_def(iface) else {
            return Err(RuntimeError::fatal(format!(
                "interface '{}' not found",
                // The numeric id is all that is known here.
                iface.raw(),
            )));
        };
        for &nested in &def.interfaces {
            self.fold_interface(nested)?;
        }
        for &(name, expr) in &def.consts {
            self.consts
                .entry(self.source.lower(name))
                .or_insert((def.name, expr));
        }
        for method in &def.methods {
            // Interface methods are declarations only.
            self.add_method(MethodBinding {
                declaring_class: def.name,
                name: method.name,
                fun: method.fun,
                is_abstract: true,
                is_static: method.is_static,
            })?;
        }
        Ok(())
    }

    fn add_field(&mut self, field: FieldDecl) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// An abstract declaration never replaces a concrete body, and a
    /// concrete body may not re-abstract an inherited method.
    fn add_method(&mut self, binding: MethodBinding) -> RuntimeResult<()> {
        let key = self.source.lower(binding.name);
        match self.methods.get(&key) {
            None => {
                self.methods.insert(key, binding);
            }
            Some(_) if !binding.is_abstract => {
                self.methods.insert(key, binding);
            }
            Some(_) => {
                // Abstract over existing: keep what is there.
            }
        }
        Ok(())
    }

    /// Registers under the given key only when nothing is there yet.
    fn add_method_if_absent(&mut self, key: Name, binding: MethodBinding) {
        if binding.is_abstract {
            return;
        }
        self.methods.entry(key).or_insert(binding);
    }

    /// Constructor discovery: `__construct` wins, a method named after
    /// the class is the legacy fallback, and the parent's constructor
    /// is inherited last. The winner is registered under both names.
    fn bind_constructor(&mut self, def: &ClassDef, parent: Option<&ResolvedClass>) {
        let construct_key = self.source.lower_of_str("__construct");
        let class_key = self.source.lower(self.class_name);

        let ctor = self
            .methods
            .get(&construct_key)
            .copied()
            .filter(|m| !m.is_abstract)
            .or_else(|| {
                self.methods
                    .get(&class_key)
                    .copied()
                    .filter(|m| !m.is_abstract && m.declaring_class == def.name)
            })
            .or_else(|| parent.and_then(|p| p.constructor));

        if let Some(ctor) = ctor {
            self.add_method_if_absent(construct_key, ctor);
            self.add_method_if_absent(class_key, ctor);
            self.constructor = Some(ctor);
        }
    }

    fn bind_hooks(&mut self) {
        let concrete = |m: Option<&MethodBinding>| m.copied().filter(|m| !m.is_abstract);
        self.get_hook = concrete(self.methods.get(&self.source.lower_of_str("__get")));
        self.set_hook = concrete(self.methods.get(&self.source.lower_of_str("__set")));
        self.call_hook = concrete(self.methods.get(&self.source.lower_of_str("__call")));
    }
}
