//! The textual serialization format and its reader.
//!
//! Scalars are `N;`, `b:0;`/`b:1;`, `i:<n>;`, `d:<x>;`, and
//! `s:<len>:"<bytes>";`. Arrays are `a:<count>:{key value ...}` and
//! objects `O:<len>:"<Class>":<count>:{...}`. Every serialized value is
//! numbered in traversal order (keys are not numbered); a repeated
//! object handle writes `r:<n>` and a repeated reference cell writes
//! `R:<n>`, so shared structure and aliasing survive a round trip.
//! Protected fields serialize under a `\0*\0` name prefix and private
//! fields under `\0A\0`.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use alder_diagnostic::{RuntimeError, RuntimeResult};
use alder_intern::Name;

use crate::array::{ArrayKey, ArrayValue};
use crate::class::{ResolvedClass, Visibility};
use crate::object::{ObjectRef, ObjectValue};
use crate::string::StrValue;
use crate::value::{float_to_str, Value};
use crate::var::Var;

const PROTECTED_PREFIX: &[u8] = b"\0*\0";
const PRIVATE_PREFIX: &[u8] = b"\0A\0";

/// Resolves class names while reading object payloads.
pub trait ClassSource {
    fn resolve(&mut self, name: &str) -> Option<Arc<ResolvedClass>>;
}

/// A class source that knows no classes; objects come back as
/// instances of a synthesized incomplete class.
pub struct NoClasses;

impl ClassSource for NoClasses {
    fn resolve(&mut self, _name: &str) -> Option<Arc<ResolvedClass>> {
        None
    }
}

pub fn serialize(value: &Value) -> Vec<u8> {
    let mut ser = Serializer {
        out: Vec::new(),
        counter: 0,
        vars: FxHashMap::default(),
        objects: FxHashMap::default(),
    };
    ser.write_value(value);
    ser.out
}

struct Serializer {
    out: Vec<u8>,
    /// Traversal-order value number; back-references index into it.
    counter: u32,
    vars: FxHashMap<usize, u32>,
    objects: FxHashMap<usize, u32>,
}

impl Serializer {
    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Ref(var) => self.write_var(var),
            Value::Null | Value::Unset | Value::Default => {
                self.counter += 1;
                self.out.extend_from_slice(b"N;");
            }
            Value::Bool(b) => {
                self.counter += 1;
                self.out
                    .extend_from_slice(if *b { b"b:1;" } else { b"b:0;" });
            }
            Value::Int(i) => {
                self.counter += 1;
                self.push(format!("i:{i};"));
            }
            Value::Float(f) => {
                self.counter += 1;
                self.push(format!("d:{};", float_to_str(*f)));
            }
            Value::Str(s) => {
                self.counter += 1;
                self.write_str_body(s.as_bytes());
            }
            Value::Array(a) => {
                self.counter += 1;
                let array = a.borrow();
                self.push(format!("a:{}:{{", array.len()));
                for (key, entry) in array.iter() {
                    self.write_key(key);
                    self.write_value(entry);
                }
                self.out.push(b'}');
            }
            Value::Object(o) => self.write_object(o),
            // A class value serializes as its name.
            Value::Class(c) => {
                self.counter += 1;
                self.write_str_body(c.class_name().as_bytes());
            }
        }
    }

    fn write_var(&mut self, var: &Var) {
        if let Some(&n) = self.vars.get(&var.addr()) {
            self.push(format!("R:{n};"));
            return;
        }
        // The cell shares its value's number.
        self.vars.insert(var.addr(), self.counter + 1);
        var.with(|inner| self.write_value(inner));
    }

    fn write_object(&mut self, obj: &ObjectRef) {
        if let Some(&n) = self.objects.get(&obj.addr()) {
            self.push(format!("r:{n};"));
            return;
        }
        self.counter += 1;
        self.objects.insert(obj.addr(), self.counter);

        let inner = obj.borrow();
        let name = inner.class_name().as_bytes();
        self.push(format!("O:{}:\"", name.len()));
        self.out.extend_from_slice(name);
        self.push(format!("\":{}:{{", inner.field_count()));
        for entry in inner.entries() {
            let mut key = Vec::new();
            match entry.visibility {
                Visibility::Public => {}
                Visibility::Protected => key.extend_from_slice(PROTECTED_PREFIX),
                Visibility::Private => key.extend_from_slice(PRIVATE_PREFIX),
            }
            key.extend_from_slice(entry.name.as_bytes());
            self.write_str_body(&key);
            self.write_value(&entry.value);
        }
        self.out.push(b'}');
    }

    /// Keys are not numbered by the back-reference counter.
    fn write_key(&mut self, key: &ArrayKey) {
        match key {
            ArrayKey::Int(i) => self.push(format!("i:{i};")),
            ArrayKey::Str(s) => self.write_str_body(s.as_bytes()),
        }
    }

    fn write_str_body(&mut self, bytes: &[u8]) {
        self.push(format!("s:{}:\"", bytes.len()));
        self.out.extend_from_slice(bytes);
        self.out.extend_from_slice(b"\";");
    }

    fn push(&mut self, s: String) {
        self.out.extend_from_slice(s.as_bytes());
    }
}

pub fn unserialize(bytes: &[u8], classes: &mut dyn ClassSource) -> RuntimeResult<Value> {
    let mut reader = Reader {
        bytes,
        pos: 0,
        registry: Vec::new(),
        classes,
    };
    let var = reader.read_value()?;
    if reader.pos != bytes.len() {
        return Err(reader.error("trailing bytes after value"));
    }
    drop(reader);
    let mut value = Value::Ref(var);
    collapse_unshared(&mut value);
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Parsed values by number, 1-based; `R:`/`r:` resolve here.
    registry: Vec<Var>,
    classes: &'a mut dyn ClassSource,
}

impl Reader<'_> {
    fn error(&self, message: &str) -> RuntimeError {
        RuntimeError::recoverable(format!(
            "unserialize: {message} at offset {}",
            self.pos
        ))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> RuntimeResult<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn read_int(&mut self) -> RuntimeResult<i64> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an integer"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("integer out of range"))
    }

    fn read_value(&mut self) -> RuntimeResult<Var> {
        match self.peek() {
            Some(b'N') => {
                self.pos += 1;
                self.expect(b';')?;
                Ok(self.register(Value::Null))
            }
            Some(b'b') => {
                self.pos += 1;
                self.expect(b':')?;
                let b = match self.peek() {
                    Some(b'0') => false,
                    Some(b'1') => true,
                    _ => return Err(self.error("expected '0' or '1'")),
                };
                self.pos += 1;
                self.expect(b';')?;
                Ok(self.register(Value::Bool(b)))
            }
            Some(b'i') => {
                self.pos += 1;
                self.expect(b':')?;
                let i = self.read_int()?;
                self.expect(b';')?;
                Ok(self.register(Value::Int(i)))
            }
            Some(b'd') => {
                self.pos += 1;
                self.expect(b':')?;
                let f = self.read_float()?;
                self.expect(b';')?;
                Ok(self.register(Value::Float(f)))
            }
            Some(b's') => {
                self.pos += 1;
                let s = self.read_str_body()?;
                Ok(self.register(Value::Str(s)))
            }
            Some(b'a') => self.read_array(),
            Some(b'O') => self.read_object(),
            Some(b'R') => {
                self.pos += 1;
                self.expect(b':')?;
                let n = self.read_int()?;
                self.expect(b';')?;
                // Aliasing: hand back the same cell.
                self.lookup(n)
            }
            Some(b'r') => {
                self.pos += 1;
                self.expect(b':')?;
                let n = self.read_int()?;
                self.expect(b';')?;
                // Shared handle, but a fresh cell; back-references do
                // not take a number of their own.
                let var = self.lookup(n)?;
                Ok(Var::new(var.get()))
            }
            _ => Err(self.error("unknown type tag")),
        }
    }

    fn read_float(&mut self) -> RuntimeResult<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b != b';') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("malformed float"))?;
        match text {
            "NAN" => Ok(f64::NAN),
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            _ => text.parse().map_err(|_| self.error("malformed float")),
        }
    }

    fn read_str_body(&mut self) -> RuntimeResult<StrValue> {
        self.expect(b':')?;
        let len = self.read_int()?;
        let len = usize::try_from(len).map_err(|_| self.error("negative length"))?;
        self.expect(b':')?;
        self.expect(b'"')?;
        if self.pos + len > self.bytes.len() {
            return Err(self.error("string runs past the end"));
        }
        let s = StrValue::from_bytes(&self.bytes[self.pos..self.pos + len]);
        self.pos += len;
        self.expect(b'"')?;
        self.expect(b';')?;
        Ok(s)
    }

    fn read_array(&mut self) -> RuntimeResult<Var> {
        self.pos += 1;
        self.expect(b':')?;
        let count = self.read_int()?;
        self.expect(b':')?;
        self.expect(b'{')?;

        // The array takes its number before its children, so a child
        // may refer back to it.
        let var = self.register(Value::Array(crate::array::ArrayRef::new(ArrayValue::new())));
        for _ in 0..count {
            let key = self.read_key()?;
            let value = self.read_value()?;
            var.with_mut(|v| {
                if let Value::Array(a) = v {
                    a.borrow_mut().insert(key, Value::Ref(value));
                }
            });
        }
        self.expect(b'}')?;
        Ok(var)
    }

    fn read_key(&mut self) -> RuntimeResult<ArrayKey> {
        match self.peek() {
            Some(b'i') => {
                self.pos += 1;
                self.expect(b':')?;
                let i = self.read_int()?;
                self.expect(b';')?;
                Ok(ArrayKey::Int(i))
            }
            Some(b's') => {
                self.pos += 1;
                Ok(ArrayKey::Str(self.read_str_body()?))
            }
            _ => Err(self.error("array keys must be integers or strings")),
        }
    }

    fn read_object(&mut self) -> RuntimeResult<Var> {
        self.pos += 1;
        // The class name is quoted but, unlike an `s:` body, ends at
        // the quote with no semicolon.
        self.expect(b':')?;
        let len = self.read_int()?;
        let len = usize::try_from(len).map_err(|_| self.error("negative length"))?;
        self.expect(b':')?;
        self.expect(b'"')?;
        if self.pos + len > self.bytes.len() {
            return Err(self.error("class name runs past the end"));
        }
        let name = StrValue::from_bytes(&self.bytes[self.pos..self.pos + len]);
        self.pos += len;
        self.expect(b'"')?;
        let name_text = name.to_string_lossy();
        self.expect(b':')?;
        let count = self.read_int()?;
        self.expect(b':')?;
        self.expect(b'{')?;

        let class = self
            .classes
            .resolve(&name_text)
            .unwrap_or_else(|| ResolvedClass::incomplete(Name::EMPTY, Arc::from(&*name_text)));
        let obj = ObjectRef::new(ObjectValue::new(class));
        let var = self.register(Value::Object(obj.clone()));

        for _ in 0..count {
            let raw_name = match self.read_key()? {
                ArrayKey::Str(s) => s,
                ArrayKey::Int(i) => StrValue::from(i.to_string()),
            };
            let (field, visibility) = split_visibility(&raw_name);
            let value = self.read_value()?;
            obj.borrow_mut()
                .init_field(field, visibility, Value::Ref(value));
        }
        self.expect(b'}')?;
        Ok(var)
    }

    fn register(&mut self, value: Value) -> Var {
        let var = Var::new(value);
        self.registry.push(var.clone());
        var
    }

    fn lookup(&self, n: i64) -> RuntimeResult<Var> {
        usize::try_from(n)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.registry.get(i))
            .cloned()
            .ok_or_else(|| self.error("back-reference out of range"))
    }
}

fn split_visibility(raw: &StrValue) -> (StrValue, Visibility) {
    let bytes = raw.as_bytes();
    if let Some(rest) = bytes.strip_prefix(PROTECTED_PREFIX) {
        (StrValue::from_bytes(rest), Visibility::Protected)
    } else if let Some(rest) = bytes.strip_prefix(PRIVATE_PREFIX) {
        (StrValue::from_bytes(rest), Visibility::Private)
    } else {
        (raw.clone(), Visibility::Public)
    }
}

/// Strips the reader's universal `Var` wrapping wherever nothing
/// aliases the cell, leaving `Ref` only where the payload demanded it.
fn collapse_unshared(value: &mut Value) {
    if let Value::Ref(var) = value {
        // One handle for this slot plus one per additional alias.
        if var.handle_count() == 1 {
            let mut inner = var.get();
            collapse_unshared(&mut inner);
            *value = inner;
            return;
        }
        var.with_mut(|inner| match inner {
            Value::Array(_) | Value::Object(_) => collapse_children(inner),
            _ => {}
        });
        return;
    }
    collapse_children(value);
}

fn collapse_children(value: &mut Value) {
    match value {
        Value::Array(a) => a.borrow_mut().for_each_value_mut(collapse_unshared),
        Value::Object(o) => o.borrow_mut().for_each_value_mut(collapse_unshared),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(value: &Value) -> Value {
        unserialize(&serialize(value), &mut NoClasses).unwrap()
    }

    #[test]
    fn scalar_forms() {
        assert_eq!(serialize(&Value::Null), b"N;");
        assert_eq!(serialize(&Value::Bool(true)), b"b:1;");
        assert_eq!(serialize(&Value::Int(-5)), b"i:-5;");
        assert_eq!(serialize(&Value::Float(2.5)), b"d:2.5;");
        assert_eq!(serialize(&Value::from("hi")), b"s:2:\"hi\";");
    }

    #[test]
    fn array_form_nests() {
        let mut inner = ArrayValue::new();
        inner.append(Value::Int(1));
        let mut outer = ArrayValue::new();
        outer.insert("k".into(), Value::array(inner));
        assert_eq!(
            serialize(&Value::array(outer)),
            b"a:1:{s:1:\"k\";a:1:{i:0;i:1;}}"
        );
    }

    #[test]
    fn strings_may_carry_arbitrary_bytes() {
        let s = Value::Str(StrValue::from_bytes(b"a\"b;\0c"));
        assert_eq!(serialize(&s), b"s:6:\"a\"b;\0c\";");
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn scalars_round_trip() {
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(i64::MIN),
            Value::Float(-0.125),
            Value::from("déjà"),
        ] {
            assert_eq!(round_trip(&v), v);
        }
        assert!(matches!(
            round_trip(&Value::Float(f64::INFINITY)),
            Value::Float(f) if f.is_infinite()
        ));
    }

    #[test]
    fn arrays_round_trip_with_order_and_keys() {
        let mut a = ArrayValue::new();
        a.insert("z".into(), Value::Int(1));
        a.insert(ArrayKey::Int(10), Value::from("ten"));
        a.insert("08".into(), Value::Bool(true));
        let v = Value::array(a);
        let back = round_trip(&v);
        assert!(v.eq_strict(&back));
    }

    #[test]
    fn shared_objects_serialize_as_handles() {
        use crate::object::{ObjectRef, ObjectValue};
        let obj = ObjectRef::new(ObjectValue::new(ResolvedClass::incomplete(
            Name::EMPTY,
            Arc::from("Point"),
        )));
        let mut a = ArrayValue::new();
        a.append(Value::Object(obj.clone()));
        a.append(Value::Object(obj));
        let v = Value::array(a);
        assert_eq!(
            serialize(&v),
            b"a:2:{i:0;O:5:\"Point\":0:{}i:1;r:2;}".to_vec()
        );

        let back = round_trip(&v);
        let first = back.index_get(&Value::Int(0));
        let second = back.index_get(&Value::Int(1));
        match (first, second) {
            (Value::Object(x), Value::Object(y)) => assert!(x.ptr_eq(&y)),
            other => panic!("expected objects, got {other:?}"),
        }
    }

    #[test]
    fn aliased_cells_serialize_as_references() {
        let var = Var::new(Value::Int(1));
        let mut a = ArrayValue::new();
        a.append(Value::Ref(var.clone()));
        a.append(Value::Ref(var));
        let v = Value::array(a);
        assert_eq!(serialize(&v), b"a:2:{i:0;i:1;i:1;R:2;}".to_vec());

        let back = round_trip(&v);
        // Writing through one slot shows through the other.
        if let Value::Array(arr) = &back {
            let var = arr.borrow_mut().entry_var(ArrayKey::Int(0));
            var.set(Value::Int(9));
        }
        assert_eq!(back.index_get(&Value::Int(1)), Value::Int(9));
    }

    #[test]
    fn unshared_entries_come_back_plain() {
        let mut a = ArrayValue::new();
        a.append(Value::Int(1));
        let back = round_trip(&Value::array(a));
        if let Value::Array(arr) = &back {
            let arr = arr.borrow();
            assert!(matches!(arr.get(&ArrayKey::Int(0)), Some(Value::Int(1))));
        } else {
            panic!("expected an array");
        }
    }

    #[test]
    fn object_field_visibility_prefixes() {
        use crate::object::{ObjectRef, ObjectValue};
        let obj = ObjectValue::new(ResolvedClass::incomplete(Name::EMPTY, Arc::from("C")));
        let obj = ObjectRef::new(obj);
        obj.borrow_mut()
            .init_field("pub".into(), Visibility::Public, Value::Int(1));
        obj.borrow_mut()
            .init_field("prot".into(), Visibility::Protected, Value::Int(2));
        obj.borrow_mut()
            .init_field("priv".into(), Visibility::Private, Value::Int(3));
        let v = Value::Object(obj);
        let out = serialize(&v);
        assert_eq!(
            out,
            b"O:1:\"C\":3:{s:3:\"pub\";i:1;s:6:\"\0*\0prot\";i:2;s:6:\"\0A\0priv\";i:3;}".to_vec()
        );

        let back = round_trip(&v);
        if let Value::Object(o) = &back {
            let o = o.borrow();
            let entries = o.entries();
            assert_eq!(entries[1].visibility, Visibility::Protected);
            assert_eq!(entries[1].name.as_bytes(), b"prot");
            assert_eq!(entries[2].visibility, Visibility::Private);
        } else {
            panic!("expected an object");
        }
    }

    #[test]
    fn malformed_input_errors_cleanly() {
        for bad in [
            &b"x:1;"[..],
            b"i:;",
            b"s:5:\"ab\";",
            b"a:1:{i:0;",
            b"R:9;",
            b"i:1;i:2;",
        ] {
            assert!(unserialize(bad, &mut NoClasses).is_err(), "{bad:?}");
        }
    }
}
