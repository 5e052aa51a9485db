//! Saved environment state for warm restarts.
//!
//! A host that runs the same script repeatedly can capture the
//! declaration tables and global values after a priming run, then
//! install them into a fresh environment instead of re-declaring
//! everything. Declarations are shared by `Arc`; values are captured
//! by copy so later runs cannot mutate the snapshot.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use alder_intern::Name;
use alder_value::{ClassDef, Value, Var};

use crate::runtime::FunctionDecl;
use crate::tables::IdTable;

pub struct EnvSnapshot {
    funs: Vec<(u32, Arc<FunctionDecl>)>,
    class_defs: Vec<(u32, Arc<ClassDef>)>,
    constants: Vec<(u32, Value)>,
    globals: Vec<(Name, Value)>,
}

impl EnvSnapshot {
    pub(crate) fn capture(
        funs: &IdTable<Arc<FunctionDecl>>,
        class_defs: &IdTable<Arc<ClassDef>>,
        constants: &IdTable<Value>,
        globals: &FxHashMap<Name, Var>,
    ) -> EnvSnapshot {
        EnvSnapshot {
            funs: funs.iter().map(|(id, f)| (id, f.clone())).collect(),
            class_defs: class_defs.iter().map(|(id, d)| (id, d.clone())).collect(),
            constants: constants.iter().map(|(id, v)| (id, v.copy())).collect(),
            globals: globals
                .iter()
                .map(|(&name, var)| (name, var.get().copy()))
                .collect(),
        }
    }

    pub(crate) fn install(
        &self,
        funs: &mut IdTable<Arc<FunctionDecl>>,
        class_defs: &mut IdTable<Arc<ClassDef>>,
        constants: &mut IdTable<Value>,
        globals: &mut FxHashMap<Name, Var>,
    ) {
        for (id, decl) in &self.funs {
            funs.set(*id, decl.clone());
        }
        for (id, def) in &self.class_defs {
            class_defs.set(*id, def.clone());
        }
        for (id, value) in &self.constants {
            constants.set(*id, value.copy());
        }
        for (name, value) in &self.globals {
            // Write through existing cells so aliases handed out
            // before the restore keep tracking the variable.
            match globals.get(name) {
                Some(var) => var.set(value.copy()),
                None => {
                    globals.insert(*name, Var::new(value.copy()));
                }
            }
        }
    }

    pub fn function_count(&self) -> usize {
        self.funs.len()
    }

    pub fn class_count(&self) -> usize {
        self.class_defs.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }
}
