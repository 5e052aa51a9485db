//! The runtime value and its weak-typing conversion and comparison
//! rules.
//!
//! Everything a program manipulates is a [`Value`]. Scalars are inline;
//! arrays and objects are behind shared handles; `Ref` aliases a
//! [`Var`] cell and is transparent to every conversion. `Unset` is the
//! out-of-band "no value here" answer and is distinct from an explicit
//! `Null`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use alder_diagnostic::RuntimeError;

use crate::array::{ArrayKey, ArrayRef, ArrayValue};
use crate::class::ResolvedClass;
use crate::object::{HookInvoker, ObjectRef};
use crate::string::{NumericType, StrValue};
use crate::var::Var;

#[derive(Clone)]
pub enum Value {
    Null,
    /// Missing value: an unread variable or absent array entry.
    Unset,
    /// Placeholder for a defaulted call argument.
    Default,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(StrValue),
    Array(ArrayRef),
    Object(ObjectRef),
    /// A class used as a value, for static access.
    Class(Arc<ResolvedClass>),
    /// Alias of a shared cell; transparent to conversions.
    Ref(Var),
}

impl Value {
    pub fn str(s: impl Into<StrValue>) -> Value {
        Value::Str(s.into())
    }

    pub fn array(array: ArrayValue) -> Value {
        Value::Array(ArrayRef::new(array))
    }

    pub fn empty_array() -> Value {
        Value::Array(ArrayRef::new(ArrayValue::new()))
    }

    // --- predicates -----------------------------------------------------

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null | Value::Unset | Value::Default => true,
            Value::Ref(var) => var.with(Value::is_null),
            _ => false,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset | Value::Default)
    }

    /// `isset` semantics: present and not null.
    pub fn is_set(&self) -> bool {
        !self.is_null()
    }

    pub fn is_array(&self) -> bool {
        match self {
            Value::Array(_) => true,
            Value::Ref(var) => var.with(Value::is_array),
            _ => false,
        }
    }

    pub fn is_object(&self) -> bool {
        match self {
            Value::Object(_) => true,
            Value::Ref(var) => var.with(Value::is_object),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Int(_) | Value::Float(_) => true,
            Value::Str(s) => s.classify().is_numeric(),
            Value::Ref(var) => var.with(Value::is_numeric),
            _ => false,
        }
    }

    /// The `gettype` name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null | Value::Unset | Value::Default => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Ref(var) => var.with(Value::type_name),
        }
    }

    /// Follows `Ref` cells to the plain value.
    pub fn deref(&self) -> Value {
        match self {
            Value::Ref(var) => var.with(Value::deref),
            other => other.clone(),
        }
    }

    /// Maps the missing-value markers to an explicit null.
    pub fn unset_to_null(self) -> Value {
        match self {
            Value::Unset | Value::Default => Value::Null,
            other => other,
        }
    }

    // --- conversions ----------------------------------------------------

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null | Value::Unset | Value::Default => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => s.to_bool(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Object(_) => true,
            Value::Class(_) => true,
            Value::Ref(var) => var.with(Value::to_bool),
        }
    }

    pub fn to_int(&self) -> i64 {
        match self {
            Value::Null | Value::Unset | Value::Default => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Str(s) => s.to_int(),
            Value::Array(a) => i64::from(!a.borrow().is_empty()),
            Value::Object(_) | Value::Class(_) => 1,
            Value::Ref(var) => var.with(Value::to_int),
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Value::Null | Value::Unset | Value::Default => 0.0,
            Value::Bool(b) => f64::from(*b),
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => s.to_float(),
            Value::Array(a) => f64::from(!a.borrow().is_empty()),
            Value::Object(_) | Value::Class(_) => 1.0,
            Value::Ref(var) => var.with(Value::to_float),
        }
    }

    pub fn to_str(&self) -> StrValue {
        match self {
            Value::Null | Value::Unset | Value::Default => StrValue::empty(),
            Value::Bool(true) => StrValue::from_str("1"),
            Value::Bool(false) => StrValue::empty(),
            Value::Int(i) => StrValue::from(i.to_string()),
            Value::Float(f) => StrValue::from(float_to_str(*f)),
            Value::Str(s) => s.clone(),
            Value::Array(_) => StrValue::from_str("Array"),
            Value::Object(o) => StrValue::from(o.borrow().class_name().to_string()),
            Value::Class(c) => StrValue::from_str(c.class_name()),
            Value::Ref(var) => var.with(Value::to_str),
        }
    }

    /// Canonical array-key form. Integer-looking strings become integer
    /// keys; bools, floats and null fold the way array subscripts do.
    pub fn to_key(&self) -> ArrayKey {
        match self {
            Value::Null | Value::Unset | Value::Default => {
                ArrayKey::Str(StrValue::empty())
            }
            Value::Bool(b) => ArrayKey::Int(i64::from(*b)),
            Value::Int(i) => ArrayKey::Int(*i),
            Value::Float(f) => ArrayKey::Int(*f as i64),
            Value::Str(s) => str_to_key(s),
            Value::Array(_) => ArrayKey::Str(StrValue::from_str("Array")),
            Value::Object(_) => ArrayKey::Str(StrValue::from_str("Object")),
            Value::Class(c) => ArrayKey::Str(StrValue::from_str(c.class_name())),
            Value::Ref(var) => var.with(Value::to_key),
        }
    }

    // --- copying --------------------------------------------------------

    /// Assignment copy. Arrays duplicate, references materialize their
    /// current value, objects keep their handle.
    pub fn copy(&self) -> Value {
        match self {
            Value::Ref(var) => var.with(Value::copy),
            Value::Array(a) => Value::Array(ArrayRef::new(a.borrow().copy())),
            other => other.clone(),
        }
    }

    /// Copy rule for array entries: like [`Value::copy`] except that
    /// reference cells keep their identity, so aliasing survives an
    /// array copy.
    pub fn copy_as_array_item(&self) -> Value {
        match self {
            Value::Ref(var) => Value::Ref(var.clone()),
            Value::Array(a) => Value::Array(ArrayRef::new(a.borrow().copy())),
            other => other.clone(),
        }
    }

    // --- loose and strict comparison -----------------------------------

    /// Loose (`==`) equality.
    pub fn eq_loose(&self, other: &Value) -> bool {
        let a = self.deref();
        let b = other.deref();

        if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
            return match (x.classify(), y.classify()) {
                (NumericType::NonNumeric, _) | (_, NumericType::NonNumeric) => x == y,
                (nx, ny) => numeric_eq(nx, ny),
            };
        }
        // A string against null compares against the empty string,
        // ahead of the boolean short-circuit: null == "0" is false.
        if let (Value::Str(s), Value::Null | Value::Unset | Value::Default)
        | (Value::Null | Value::Unset | Value::Default, Value::Str(s)) = (&a, &b)
        {
            return s.is_empty();
        }
        // Null and bool short-circuit everything else to bool equality.
        if matches!(a, Value::Null | Value::Unset | Value::Default | Value::Bool(_))
            || matches!(b, Value::Null | Value::Unset | Value::Default | Value::Bool(_))
        {
            return a.to_bool() == b.to_bool();
        }
        match (&a, &b) {
            (Value::Array(x), Value::Array(y)) => x.borrow().eq_loose(&y.borrow()),
            (Value::Array(_), _) | (_, Value::Array(_)) => false,
            (Value::Object(x), Value::Object(y)) => {
                x.ptr_eq(y) || x.borrow().eq_loose(&y.borrow())
            }
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
            (Value::Class(_), _) | (_, Value::Class(_)) => false,
            _ => {
                if a.is_int_convertible() && b.is_int_convertible() {
                    a.to_int() == b.to_int()
                } else {
                    a.to_float() == b.to_float()
                }
            }
        }
    }

    /// Strict (`===`) equality: same type, same value; objects by
    /// instance, arrays element-wise in order.
    pub fn eq_strict(&self, other: &Value) -> bool {
        let a = self.deref();
        let b = other.deref();
        match (&a, &b) {
            (Value::Null | Value::Unset | Value::Default, Value::Null | Value::Unset | Value::Default) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => x.borrow().eq_strict(&y.borrow()),
            (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
            (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Loose ordering, as used by `<` joins of scalars, arrays, and
    /// objects.
    pub fn cmp_loose(&self, other: &Value) -> Ordering {
        self.cmp_with(other, Ordering::Greater)
    }

    /// Loose ordering with an explicit answer for a right-hand array
    /// missing one of the left's keys. The relational operators pass
    /// different answers from each side, which is what makes `<` and
    /// `>` disagree on arrays with disjoint keys.
    pub fn cmp_with(&self, other: &Value, missing: Ordering) -> Ordering {
        let a = self.deref();
        let b = other.deref();

        if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
            return match (x.classify(), y.classify()) {
                (NumericType::NonNumeric, _) | (_, NumericType::NonNumeric) => x.cmp(y),
                _ => float_cmp(x.to_float(), y.to_float()),
            };
        }
        // Null against a string orders as the empty string would, so
        // "0" ranks above null even though both are falsy.
        match (&a, &b) {
            (Value::Str(x), Value::Null | Value::Unset | Value::Default) => {
                return if x.is_empty() {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                };
            }
            (Value::Null | Value::Unset | Value::Default, Value::Str(y)) => {
                return if y.is_empty() {
                    Ordering::Equal
                } else {
                    Ordering::Less
                };
            }
            _ => {}
        }
        if matches!(a, Value::Null | Value::Unset | Value::Default | Value::Bool(_))
            || matches!(b, Value::Null | Value::Unset | Value::Default | Value::Bool(_))
        {
            return a.to_bool().cmp(&b.to_bool());
        }
        match (&a, &b) {
            (Value::Array(x), Value::Array(y)) => x.borrow().cmp_with(&y.borrow(), missing),
            (Value::Array(_), _) => Ordering::Greater,
            (_, Value::Array(_)) => Ordering::Less,
            (Value::Object(x), Value::Object(y)) => x.borrow().cmp_loose(&y.borrow()),
            (Value::Object(_), _) => Ordering::Greater,
            (_, Value::Object(_)) => Ordering::Less,
            _ => float_cmp(a.to_float(), b.to_float()),
        }
    }

    pub fn lt(&self, other: &Value) -> bool {
        self.cmp_with(other, Ordering::Greater) == Ordering::Less
    }

    pub fn leq(&self, other: &Value) -> bool {
        self.cmp_with(other, Ordering::Greater) != Ordering::Greater
    }

    pub fn gt(&self, other: &Value) -> bool {
        self.cmp_with(other, Ordering::Less) == Ordering::Greater
    }

    pub fn geq(&self, other: &Value) -> bool {
        self.cmp_with(other, Ordering::Less) != Ordering::Less
    }

    fn is_int_convertible(&self) -> bool {
        match self {
            Value::Int(_) => true,
            Value::Str(s) => matches!(s.classify(), NumericType::Int(_)),
            _ => false,
        }
    }

    // --- subscripting ---------------------------------------------------

    /// Reads one element. Arrays index by canonical key, strings by
    /// byte offset; anything else, or a missing entry, answers `Unset`.
    pub fn index_get(&self, key: &Value) -> Value {
        match self {
            Value::Array(a) => a
                .borrow()
                .get(&key.to_key())
                .map(Value::deref)
                .unwrap_or(Value::Unset),
            Value::Str(s) => s
                .char_at(key.to_int())
                .map(Value::Str)
                .unwrap_or(Value::Unset),
            Value::Ref(var) => var.with(|v| v.index_get(key)),
            _ => Value::Unset,
        }
    }

    /// Writes one element, auto-vivifying null, `false`, and the empty
    /// string into a fresh array. `key: None` is a bare append.
    /// Writing into any other scalar fails.
    pub fn index_set(&mut self, key: Option<&Value>, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Ref(var) => var.with_mut(|v| v.index_set(key, value)),
            Value::Array(a) => {
                let mut array = a.borrow_mut();
                match key {
                    Some(k) => array.insert(k.to_key(), value),
                    None => {
                        array.append(value);
                    }
                }
                Ok(())
            }
            Value::Null | Value::Unset | Value::Default | Value::Bool(false) => {
                let mut array = ArrayValue::new();
                match key {
                    Some(k) => array.insert(k.to_key(), value),
                    None => {
                        array.append(value);
                    }
                }
                *self = Value::array(array);
                Ok(())
            }
            Value::Str(s) if s.is_empty() => {
                // The empty string vivifies like null.
                *self = Value::Null;
                self.index_set(key, value)
            }
            Value::Str(s) => match key {
                Some(k) => {
                    *s = set_char_at(s, k.to_int(), &value.to_str());
                    Ok(())
                }
                None => Err(RuntimeError::recoverable(
                    "cannot append to a string value",
                )),
            },
            other => Err(RuntimeError::recoverable(format!(
                "cannot use a value of type {} as an array",
                other.type_name()
            ))),
        }
    }

    /// Shared cell aliasing one element, auto-vivifying along the way.
    pub fn index_var(&mut self, key: &Value) -> Result<Var, RuntimeError> {
        match self {
            Value::Ref(var) => var.with_mut(|v| v.index_var(key)),
            Value::Array(a) => Ok(a.borrow_mut().entry_var(key.to_key())),
            Value::Null | Value::Unset | Value::Default | Value::Bool(false) => {
                *self = Value::empty_array();
                self.index_var(key)
            }
            other => Err(RuntimeError::recoverable(format!(
                "cannot take a reference into a value of type {}",
                other.type_name()
            ))),
        }
    }

    pub fn index_unset(&mut self, key: &Value) {
        match self {
            Value::Ref(var) => var.with_mut(|v| v.index_unset(key)),
            Value::Array(a) => {
                a.borrow_mut().remove(&key.to_key());
            }
            _ => {}
        }
    }

    /// `isset($v[$k])`: entry exists and is not null.
    pub fn index_isset(&self, key: &Value) -> bool {
        self.index_get(key).is_set()
    }

    // --- field access ---------------------------------------------------

    /// Reads an object field, consulting `__get` on a miss. On a
    /// non-object the answer is `Unset`.
    pub fn field_get(
        &self,
        name: &StrValue,
        hooks: &mut dyn HookInvoker,
    ) -> Result<Value, RuntimeError> {
        match self {
            Value::Object(o) => o.get_field(name, hooks),
            Value::Ref(var) => var.with(|v| v.field_get(name, hooks)),
            _ => Ok(Value::Unset),
        }
    }

    /// Writes an object field, consulting `__set` on a miss. Writing a
    /// field of a scalar fails.
    pub fn field_set(
        &mut self,
        name: &StrValue,
        value: Value,
        hooks: &mut dyn HookInvoker,
    ) -> Result<(), RuntimeError> {
        match self {
            Value::Object(o) => o.put_field(name, value, hooks),
            Value::Ref(var) => var.with_mut(|v| v.field_set(name, value, hooks)),
            other => Err(RuntimeError::recoverable(format!(
                "cannot set a field of a value of type {}",
                other.type_name()
            ))),
        }
    }

    pub fn field_unset(&mut self, name: &StrValue) {
        match self {
            Value::Object(o) => {
                o.borrow_mut().remove_field(name);
            }
            Value::Ref(var) => var.with_mut(|v| v.field_unset(name)),
            _ => {}
        }
    }

    pub fn iter_keys(&self) -> impl Iterator<Item = Value> {
        self.iter_entries().map(|(k, _)| k)
    }

    pub fn iter_values(&self) -> impl Iterator<Item = Value> {
        self.iter_entries().map(|(_, v)| v)
    }

    /// Lazy entry iteration. Arrays yield `(key, value)` in insertion
    /// order; objects yield their public fields; scalars yield nothing.
    pub fn iter_entries(&self) -> ValueIter {
        match self {
            Value::Array(a) => ValueIter {
                inner: IterInner::Array {
                    array: a.clone(),
                    id: a.borrow().first_id(),
                },
            },
            Value::Object(o) => ValueIter {
                inner: IterInner::Pairs(o.borrow().iter_pairs().into_iter()),
            },
            Value::Ref(var) => var.with(Value::iter_entries),
            _ => ValueIter {
                inner: IterInner::Empty,
            },
        }
    }
}

fn numeric_eq(a: NumericType, b: NumericType) -> bool {
    match (a, b) {
        (NumericType::Int(x), NumericType::Int(y)) => x == y,
        (NumericType::Int(x), NumericType::Float(y)) => x as f64 == y,
        (NumericType::Float(x), NumericType::Int(y)) => x == y as f64,
        (NumericType::Float(x), NumericType::Float(y)) => x == y,
        _ => false,
    }
}

fn float_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Key canonicalization for strings: an optional minus sign followed by
/// decimal digits becomes the integer key when it round-trips exactly;
/// everything else stays a string key.
fn str_to_key(s: &StrValue) -> ArrayKey {
    let bytes = s.as_bytes();
    let digits = match bytes.first() {
        Some(b'-') => &bytes[1..],
        _ => bytes,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return ArrayKey::Str(s.clone());
    }
    match std::str::from_utf8(bytes).ok().and_then(|t| t.parse::<i64>().ok()) {
        Some(i) if i.to_string().as_bytes() == bytes => ArrayKey::Int(i),
        _ => ArrayKey::Str(s.clone()),
    }
}

/// Byte assignment into a string, padding with spaces past the end.
fn set_char_at(s: &StrValue, index: i64, value: &StrValue) -> StrValue {
    let Ok(index) = usize::try_from(index) else {
        return s.clone();
    };
    let byte = value.as_bytes().first().copied().unwrap_or(b' ');
    let mut bytes = s.as_bytes().to_vec();
    if index >= bytes.len() {
        bytes.resize(index + 1, b' ');
    }
    bytes[index] = byte;
    StrValue::from_vec(bytes)
}

/// Numbers print without a trailing `.0` when integral; non-finite
/// floats use the conventional uppercase spellings.
pub fn float_to_str(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        format!("{f}")
    }
}

pub struct ValueIter {
    inner: IterInner,
}

enum IterInner {
    Empty,
    Array { array: ArrayRef, id: i32 },
    Pairs(std::vec::IntoIter<(Value, Value)>),
}

impl Iterator for ValueIter {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Empty => None,
            IterInner::Array { array, id } => {
                let arr = array.borrow();
                let (key, value) = arr.entry_at(*id)?;
                let item = (key.to_value(), value.deref());
                *id = arr.next_id(*id);
                Some(item)
            }
            IterInner::Pairs(pairs) => pairs.next(),
        }
    }
}

/// Structural equality for tests and containers; this is strict (`===`)
/// equality, not the loose operator.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.eq_strict(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unset => write!(f, "unset"),
            Value::Default => write!(f, "default"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", float_to_str(*x)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(a) => a.fmt(f),
            Value::Object(o) => o.fmt(f),
            Value::Class(c) => write!(f, "class {}", c.class_name()),
            Value::Ref(var) => var.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(StrValue::from_str(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(StrValue::from(s))
    }
}

impl From<StrValue> for Value {
    fn from(s: StrValue) -> Value {
        Value::Str(s)
    }
}

impl From<ArrayValue> for Value {
    fn from(a: ArrayValue) -> Value {
        Value::array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn truthiness_table() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::Unset.to_bool());
        assert!(!Value::Int(0).to_bool());
        assert!(!Value::Float(0.0).to_bool());
        assert!(!Value::from("").to_bool());
        assert!(!Value::from("0").to_bool());
        assert!(!Value::empty_array().to_bool());
        assert!(Value::from("0.0").to_bool());
        assert!(Value::Int(-1).to_bool());
    }

    #[test]
    fn null_and_bool_short_circuit_loose_equality() {
        assert!(Value::Null.eq_loose(&Value::Bool(false)));
        assert!(Value::Null.eq_loose(&Value::from("")));
        assert!(Value::Null.eq_loose(&Value::empty_array()));
        assert!(Value::Bool(true).eq_loose(&Value::Int(7)));
        assert!(Value::Bool(true).eq_loose(&Value::from("anything")));
        assert!(!Value::Bool(true).eq_loose(&Value::Int(0)));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert!(Value::from("10").eq_loose(&Value::from("1e1")));
        assert!(Value::from("0100").eq_loose(&Value::from("100")));
        assert!(Value::from("10").eq_loose(&Value::Int(10)));
        assert!(!Value::from("abc").eq_loose(&Value::from("0")));
        assert_eq!(
            Value::from("9").cmp_loose(&Value::from("10")),
            Ordering::Less
        );
        assert_eq!(
            Value::from("9a").cmp_loose(&Value::from("10a")),
            Ordering::Greater
        );
    }

    #[test]
    fn hex_strings_stay_textual_in_comparison() {
        assert!(!Value::from("0x1A").eq_loose(&Value::from("26")));
        assert!(Value::from("0x1A").eq_loose(&Value::from("0x1A")));
    }

    #[test]
    fn null_compares_against_strings_as_the_empty_string() {
        assert_eq!(Value::from("0").cmp_loose(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.cmp_loose(&Value::from("a")), Ordering::Less);
        assert_eq!(Value::Null.cmp_loose(&Value::from("")), Ordering::Equal);

        assert!(!Value::Null.eq_loose(&Value::from("0")));
        assert!(!Value::from("0").eq_loose(&Value::Null));
        assert!(Value::from("").eq_loose(&Value::Null));
    }

    #[test]
    fn strict_equality_separates_types() {
        assert!(!Value::Int(1).eq_strict(&Value::Float(1.0)));
        assert!(!Value::Int(0).eq_strict(&Value::from("0")));
        assert!(Value::Int(1).eq_loose(&Value::Float(1.0)));
        assert!(Value::Null.eq_strict(&Value::Unset));
        assert!(!Value::Float(f64::NAN).eq_strict(&Value::Float(f64::NAN)));
    }

    #[test]
    fn refs_are_transparent_to_comparison() {
        let var = Var::new(Value::Int(5));
        let aliased = Value::Ref(var);
        assert!(aliased.eq_loose(&Value::from("5")));
        assert!(aliased.eq_strict(&Value::Int(5)));
        assert_eq!(aliased.to_int(), 5);
    }

    #[test]
    fn disjoint_key_arrays_make_lt_and_gt_agree_on_neither() {
        let mut a = ArrayValue::new();
        a.insert("x".into(), Value::Int(1));
        let mut b = ArrayValue::new();
        b.insert("y".into(), Value::Int(1));
        let a = Value::array(a);
        let b = Value::array(b);
        // Each side claims the other is smaller.
        assert!(!a.lt(&b));
        assert!(!a.gt(&b));
        assert!(!b.lt(&a));
        assert!(!b.gt(&a));
    }

    #[test]
    fn arrays_order_above_scalars() {
        let a = Value::empty_array();
        assert!(a.gt(&Value::Int(999_999)));
        assert!(Value::Int(999_999).lt(&a));
        // But against bool the bool rule wins.
        assert!(!a.gt(&Value::Bool(true)));
    }

    #[test]
    fn key_canonicalization() {
        assert_eq!(Value::from("42").to_key(), ArrayKey::Int(42));
        assert_eq!(Value::from("-3").to_key(), ArrayKey::Int(-3));
        assert_eq!(Value::from("08").to_key(), ArrayKey::from("08"));
        assert_eq!(Value::from("1.5").to_key(), ArrayKey::from("1.5"));
        assert_eq!(Value::from(" 42").to_key(), ArrayKey::from(" 42"));
        assert_eq!(Value::Bool(true).to_key(), ArrayKey::Int(1));
        assert_eq!(Value::Float(3.9).to_key(), ArrayKey::Int(3));
        assert_eq!(Value::Null.to_key(), ArrayKey::Str(StrValue::empty()));
        assert_eq!(
            Value::from("99999999999999999999").to_key(),
            ArrayKey::from("99999999999999999999")
        );
    }

    #[test]
    fn copy_detaches_arrays_but_not_objects() {
        let mut inner = ArrayValue::new();
        inner.append(Value::Int(1));
        let original = Value::array(inner);
        let copy = original.copy();
        if let Value::Array(a) = &copy {
            a.borrow_mut().append(Value::Int(2));
        }
        if let Value::Array(a) = &original {
            assert_eq!(a.borrow().len(), 1);
        }
    }

    #[test]
    fn index_set_vivifies_null() {
        let mut v = Value::Null;
        v.index_set(Some(&Value::from("k")), Value::Int(1)).unwrap();
        assert!(v.is_array());
        assert_eq!(v.index_get(&Value::from("k")), Value::Int(1));

        let mut empty = Value::from("");
        empty.index_set(None, Value::Int(5)).unwrap();
        assert!(empty.is_array());
    }

    #[test]
    fn index_set_vivifies_false() {
        let mut v = Value::Bool(false);
        v.index_set(None, Value::Int(1)).unwrap();
        assert!(v.is_array());
        assert_eq!(v.index_get(&Value::Int(0)), Value::Int(1));

        let mut aliased = Value::Bool(false);
        let cell = aliased.index_var(&Value::Int(0)).unwrap();
        cell.set(Value::Int(2));
        assert_eq!(aliased.index_get(&Value::Int(0)), Value::Int(2));
    }

    #[test]
    fn index_set_rejects_scalars() {
        let mut v = Value::Int(3);
        assert!(v.index_set(Some(&Value::Int(0)), Value::Int(1)).is_err());
        assert_eq!(v, Value::Int(3));

        // Only false vivifies; true is an ordinary scalar receiver.
        let mut t = Value::Bool(true);
        assert!(t.index_set(None, Value::Int(1)).is_err());
    }

    #[test]
    fn string_subscripts_read_and_write_bytes() {
        let s = Value::from("abc");
        assert_eq!(s.index_get(&Value::Int(1)), Value::from("b"));
        assert_eq!(s.index_get(&Value::Int(9)), Value::Unset);

        let mut s = Value::from("abc");
        s.index_set(Some(&Value::Int(5)), Value::from("z")).unwrap();
        assert_eq!(s.to_str().as_bytes(), b"abc  z");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(float_to_str(2.0), "2");
        assert_eq!(float_to_str(2.5), "2.5");
        assert_eq!(float_to_str(-0.25), "-0.25");
        assert_eq!(float_to_str(f64::NAN), "NAN");
        assert_eq!(float_to_str(f64::INFINITY), "INF");
    }

    #[test]
    fn iter_entries_walks_arrays_in_order() {
        let mut a = ArrayValue::new();
        a.insert("b".into(), Value::Int(2));
        a.insert("a".into(), Value::Int(1));
        let v = Value::array(a);
        let pairs: Vec<(Value, Value)> = v.iter_entries().collect();
        assert_eq!(
            pairs,
            vec![
                (Value::from("b"), Value::Int(2)),
                (Value::from("a"), Value::Int(1)),
            ]
        );
        assert_eq!(Value::Int(3).iter_entries().count(), 0);
    }
}
