//! Human-readable value rendering: `print_r` and `var_dump` forms.

use rustc_hash::FxHashSet;

use crate::array::ArrayKey;
use crate::class::Visibility;
use crate::string::{StrBuilder, StrValue};
use crate::value::{float_to_str, Value};

/// `print_r` rendering: scalars bare, containers as indented
/// `(key => value)` blocks. Cycles print `*RECURSION*`.
pub fn print_r(value: &Value) -> StrValue {
    let mut p = Printer::new();
    p.print_r(value, 0);
    p.out.finish()
}

/// `var_dump` rendering: every value with its type and size.
pub fn var_dump(value: &Value) -> StrValue {
    let mut p = Printer::new();
    p.var_dump(value, 0);
    p.out.finish()
}

/// `var_export` rendering: a literal expression that reconstructs the
/// value. Cycles print `NULL` where the back edge would be.
pub fn var_export(value: &Value) -> StrValue {
    let mut p = Printer::new();
    p.var_export(value, 0);
    p.out.finish()
}

struct Printer {
    out: StrBuilder,
    visiting: FxHashSet<usize>,
}

impl Printer {
    fn new() -> Printer {
        Printer {
            out: StrBuilder::new(),
            visiting: FxHashSet::default(),
        }
    }

    fn print_r(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Ref(var) => var.with(|inner| self.print_r(inner, depth)),
            Value::Array(a) => {
                if !self.visiting.insert(a.addr()) {
                    self.out.push_str("Array\n *RECURSION*");
                    return;
                }
                self.out.push_str("Array\n");
                let entries: Vec<(ArrayKey, Value)> = a
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.print_r_block(&entries_as_values(entries), depth);
                self.visiting.remove(&a.addr());
            }
            Value::Object(o) => {
                if !self.visiting.insert(o.addr()) {
                    self.out.push_str(" *RECURSION*");
                    return;
                }
                self.out.push_str(&o.borrow().class_name().to_string());
                self.out.push_str(" Object\n");
                let entries: Vec<(Value, Value)> = o
                    .borrow()
                    .entries()
                    .iter()
                    .map(|e| (Value::Str(e.name.clone()), e.value.clone()))
                    .collect();
                self.print_r_block(&entries, depth);
                self.visiting.remove(&o.addr());
            }
            scalar => self.out.push_value(&scalar.to_str()),
        }
    }

    fn print_r_block(&mut self, entries: &[(Value, Value)], depth: usize) {
        let paren_indent = 8 * depth;
        let entry_indent = 4 * (2 * depth + 1);
        self.indent(paren_indent);
        self.out.push_str("(\n");
        for (key, value) in entries {
            self.indent(entry_indent);
            self.out.push_byte(b'[');
            self.out.push_value(&key.to_str());
            self.out.push_str("] => ");
            self.print_r(value, depth + 1);
            self.out.push_byte(b'\n');
        }
        self.indent(paren_indent);
        self.out.push_str(")\n");
    }

    fn var_dump(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Ref(var) => {
                self.out.push_byte(b'&');
                var.with(|inner| self.var_dump(inner, depth));
            }
            Value::Null | Value::Unset | Value::Default => self.out.push_str("NULL"),
            Value::Bool(b) => {
                self.out.push_str(if *b { "bool(true)" } else { "bool(false)" })
            }
            Value::Int(i) => self.out.push_str(&format!("int({i})")),
            Value::Float(f) => self.out.push_str(&format!("float({})", float_to_str(*f))),
            Value::Str(s) => {
                self.out.push_str(&format!("string({}) \"", s.len()));
                self.out.push_value(s);
                self.out.push_byte(b'"');
            }
            Value::Array(a) => {
                if !self.visiting.insert(a.addr()) {
                    self.out.push_str("*RECURSION*");
                    return;
                }
                let entries: Vec<(ArrayKey, Value)> = a
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.out.push_str(&format!("array({}) {{\n", entries.len()));
                for (key, value) in &entries {
                    self.indent(2 * (depth + 1));
                    match key {
                        ArrayKey::Int(i) => self.out.push_str(&format!("[{i}]=>\n")),
                        ArrayKey::Str(s) => {
                            self.out.push_str("[\"");
                            self.out.push_value(s);
                            self.out.push_str("\"]=>\n");
                        }
                    }
                    self.indent(2 * (depth + 1));
                    self.var_dump(value, depth + 1);
                    self.out.push_byte(b'\n');
                }
                self.indent(2 * depth);
                self.out.push_byte(b'}');
                self.visiting.remove(&a.addr());
            }
            Value::Object(o) => {
                if !self.visiting.insert(o.addr()) {
                    self.out.push_str("*RECURSION*");
                    return;
                }
                let (class_name, entries) = {
                    let inner = o.borrow();
                    let entries: Vec<(StrValue, Visibility, Value)> = inner
                        .entries()
                        .iter()
                        .map(|e| (e.name.clone(), e.visibility, e.value.clone()))
                        .collect();
                    (inner.class_name().to_string(), entries)
                };
                self.out
                    .push_str(&format!("object({}) ({}) {{\n", class_name, entries.len()));
                for (name, visibility, value) in &entries {
                    self.indent(2 * (depth + 1));
                    self.out.push_str("[\"");
                    self.out.push_value(name);
                    self.out.push_byte(b'"');
                    match visibility {
                        Visibility::Public => {}
                        Visibility::Protected => self.out.push_str(":protected"),
                        Visibility::Private => self.out.push_str(":private"),
                    }
                    self.out.push_str("]=>\n");
                    self.indent(2 * (depth + 1));
                    self.var_dump(value, depth + 1);
                    self.out.push_byte(b'\n');
                }
                self.indent(2 * depth);
                self.out.push_byte(b'}');
                self.visiting.remove(&o.addr());
            }
            Value::Class(c) => {
                self.out.push_str(&format!("class({})", c.class_name()));
            }
        }
    }

    fn var_export(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Ref(var) => var.with(|inner| self.var_export(inner, depth)),
            Value::Null | Value::Unset | Value::Default => self.out.push_str("NULL"),
            Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => self.out.push_str(&i.to_string()),
            Value::Float(f) => self.out.push_str(&float_to_str(*f)),
            Value::Str(s) => self.export_str(s),
            Value::Class(c) => self.export_str(&StrValue::from_str(c.class_name())),
            Value::Array(a) => {
                if !self.visiting.insert(a.addr()) {
                    self.out.push_str("NULL");
                    return;
                }
                let entries: Vec<(ArrayKey, Value)> = a
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.out.push_str("array (\n");
                for (key, value) in &entries {
                    self.indent(2 * (depth + 1));
                    match key {
                        ArrayKey::Int(i) => self.out.push_str(&format!("{i} => ")),
                        ArrayKey::Str(s) => {
                            self.export_str(s);
                            self.out.push_str(" => ");
                        }
                    }
                    if matches!(value, Value::Array(_)) {
                        // A nested array literal starts on its own line.
                        self.out.push_byte(b'\n');
                        self.indent(2 * (depth + 1));
                    }
                    self.var_export(value, depth + 1);
                    self.out.push_str(",\n");
                }
                self.indent(2 * depth);
                self.out.push_byte(b')');
                self.visiting.remove(&a.addr());
            }
            Value::Object(o) => {
                if !self.visiting.insert(o.addr()) {
                    self.out.push_str("NULL");
                    return;
                }
                let (class_name, entries) = {
                    let inner = o.borrow();
                    let entries: Vec<(StrValue, Value)> = inner
                        .entries()
                        .iter()
                        .map(|e| (e.name.clone(), e.value.clone()))
                        .collect();
                    (inner.class_name().to_string(), entries)
                };
                self.out
                    .push_str(&format!("\\{class_name}::__set_state(array(\n"));
                for (name, value) in &entries {
                    self.indent(2 * (depth + 1));
                    self.out.push_str("'");
                    self.out.push_value(name);
                    self.out.push_str("' => ");
                    self.var_export(value, depth + 1);
                    self.out.push_str(",\n");
                }
                self.indent(2 * depth);
                self.out.push_str("))");
                self.visiting.remove(&o.addr());
            }
        }
    }

    fn export_str(&mut self, s: &StrValue) {
        self.out.push_byte(b'\'');
        for &b in s.as_bytes() {
            if b == b'\'' || b == b'\\' {
                self.out.push_byte(b'\\');
            }
            self.out.push_byte(b);
        }
        self.out.push_byte(b'\'');
    }

    fn indent(&mut self, width: usize) {
        for _ in 0..width {
            self.out.push_byte(b' ');
        }
    }
}

fn entries_as_values(entries: Vec<(ArrayKey, Value)>) -> Vec<(Value, Value)> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_value(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn print_r_scalars_are_bare() {
        assert_eq!(print_r(&Value::Int(5)).to_string_lossy(), "5");
        assert_eq!(print_r(&Value::from("hi")).to_string_lossy(), "hi");
        assert_eq!(print_r(&Value::Bool(true)).to_string_lossy(), "1");
        assert_eq!(print_r(&Value::Null).to_string_lossy(), "");
    }

    #[test]
    fn print_r_arrays_use_paren_blocks() {
        let mut a = ArrayValue::new();
        a.append(Value::Int(1));
        a.insert("k".into(), Value::from("v"));
        assert_eq!(
            print_r(&Value::array(a)).to_string_lossy(),
            "Array\n(\n    [0] => 1\n    [k] => v\n)\n"
        );
    }

    #[test]
    fn print_r_nests_with_deeper_indentation() {
        let mut inner = ArrayValue::new();
        inner.append(Value::Int(2));
        let mut outer = ArrayValue::new();
        outer.append(Value::array(inner));
        assert_eq!(
            print_r(&Value::array(outer)).to_string_lossy(),
            "Array\n(\n    [0] => Array\n        (\n            [0] => 2\n        )\n\n)\n"
        );
    }

    #[test]
    fn var_dump_scalars() {
        assert_eq!(var_dump(&Value::Int(-2)).to_string_lossy(), "int(-2)");
        assert_eq!(var_dump(&Value::Float(1.5)).to_string_lossy(), "float(1.5)");
        assert_eq!(
            var_dump(&Value::from("ab")).to_string_lossy(),
            "string(2) \"ab\""
        );
        assert_eq!(var_dump(&Value::Null).to_string_lossy(), "NULL");
    }

    #[test]
    fn var_dump_arrays_nest() {
        let mut a = ArrayValue::new();
        a.append(Value::Int(1));
        assert_eq!(
            var_dump(&Value::array(a)).to_string_lossy(),
            "array(1) {\n  [0]=>\n  int(1)\n}"
        );
    }

    #[test]
    fn var_dump_objects_annotate_visibility() {
        use crate::class::ResolvedClass;
        use crate::object::{ObjectRef, ObjectValue};
        use alder_intern::Name;
        use std::sync::Arc;

        let mut obj =
            ObjectValue::new(ResolvedClass::incomplete(Name::EMPTY, Arc::from("Point")));
        obj.init_field("x".into(), Visibility::Public, Value::Int(1));
        obj.init_field("y".into(), Visibility::Protected, Value::Int(2));
        obj.init_field("z".into(), Visibility::Private, Value::Int(3));
        assert_eq!(
            var_dump(&Value::Object(ObjectRef::new(obj))).to_string_lossy(),
            "object(Point) (3) {\n  [\"x\"]=>\n  int(1)\n  [\"y\":protected]=>\n  int(2)\n  [\"z\":private]=>\n  int(3)\n}"
        );
    }

    #[test]
    fn var_export_is_a_literal() {
        let mut inner = ArrayValue::new();
        inner.insert("k".into(), Value::from("it's"));
        let mut outer = ArrayValue::new();
        outer.append(Value::array(inner));
        outer.append(Value::Bool(false));
        assert_eq!(
            var_export(&Value::array(outer)).to_string_lossy(),
            "array (\n  0 => \n  array (\n    'k' => 'it\\'s',\n  ),\n  1 => false,\n)"
        );
    }

    #[test]
    fn cycles_do_not_hang() {
        let arr = crate::array::ArrayRef::new(ArrayValue::new());
        arr.borrow_mut().append(Value::Array(arr.clone()));
        let rendered = var_dump(&Value::Array(arr)).to_string_lossy();
        assert!(rendered.contains("*RECURSION*"));
    }
}
