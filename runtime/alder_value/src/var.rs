//! Reference cells backing `&$x`-style aliasing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A shared, mutable cell holding one value.
///
/// Aliased variables, by-reference parameters, and by-reference array
/// entries all point at the same `Var`. Identity is cell identity, not
/// value equality.
#[derive(Clone)]
#[repr(transparent)]
pub struct Var(Rc<RefCell<Value>>);

impl Var {
    pub fn new(value: Value) -> Var {
        Var(Rc::new(RefCell::new(value)))
    }

    /// Current value, dereferenced out of the cell.
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// Runs `f` against the value in place, without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.0.borrow())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// True when both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Var) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the cell, for identity maps.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Number of live handles to this cell.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Promotes a storage slot into a shared cell.
    ///
    /// If the slot already holds a reference the existing cell is
    /// returned; otherwise the plain value moves into a fresh cell and
    /// the slot is rewritten to alias it.
    pub fn promote(slot: &mut Value) -> Var {
        if let Value::Ref(var) = slot {
            return var.clone();
        }
        let var = Var::new(std::mem::replace(slot, Value::Null));
        *slot = Value::Ref(var.clone());
        var
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var({:?})", self.0.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn promote_installs_a_shared_cell() {
        let mut slot = Value::Int(3);
        let var = Var::promote(&mut slot);
        assert!(matches!(slot, Value::Ref(_)));
        var.set(Value::Int(9));
        assert_eq!(slot.to_int(), 9);
    }

    #[test]
    fn promote_is_idempotent() {
        let mut slot = Value::Int(1);
        let a = Var::promote(&mut slot);
        let b = Var::promote(&mut slot);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn writes_are_visible_through_every_handle() {
        let a = Var::new(Value::Null);
        let b = a.clone();
        b.set(Value::from("shared"));
        assert_eq!(a.get().to_str().to_string_lossy(), "shared");
    }
}
