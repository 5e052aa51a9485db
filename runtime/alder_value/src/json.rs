//! JSON encoding of runtime values.
//!
//! An array whose keys are exactly `0..n` in order encodes as a JSON
//! array; any other array, and every object, encodes as a JSON object
//! with stringified keys. Non-finite floats encode as `0`.

use crate::array::{ArrayKey, ArrayValue};
use crate::string::{StrBuilder, StrValue};
use crate::value::{float_to_str, Value};

pub fn json_encode(value: &Value) -> StrValue {
    let mut out = StrBuilder::new();
    encode(value, &mut out);
    out.finish()
}

fn encode(value: &Value, out: &mut StrBuilder) {
    match value {
        Value::Null | Value::Unset | Value::Default => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) if f.is_finite() => out.push_str(&float_to_str(*f)),
        Value::Float(_) => out.push_str("0"),
        Value::Str(s) => encode_str(s.as_bytes(), out),
        Value::Array(a) => {
            let array = a.borrow();
            if is_list(&array) {
                out.push_byte(b'[');
                for (i, (_, v)) in array.iter().enumerate() {
                    if i > 0 {
                        out.push_byte(b',');
                    }
                    encode(v, out);
                }
                out.push_byte(b']');
            } else {
                out.push_byte(b'{');
                for (i, (k, v)) in array.iter().enumerate() {
                    if i > 0 {
                        out.push_byte(b',');
                    }
                    match k {
                        ArrayKey::Int(n) => encode_str(n.to_string().as_bytes(), out),
                        ArrayKey::Str(s) => encode_str(s.as_bytes(), out),
                    }
                    out.push_byte(b':');
                    encode(v, out);
                }
                out.push_byte(b'}');
            }
        }
        Value::Object(o) => {
            out.push_byte(b'{');
            for (i, (name, v)) in o.borrow().iter_pairs().iter().enumerate() {
                if i > 0 {
                    out.push_byte(b',');
                }
                encode_str(name.to_str().as_bytes(), out);
                out.push_byte(b':');
                encode(v, out);
            }
            out.push_byte(b'}');
        }
        Value::Class(c) => encode_str(c.class_name().as_bytes(), out),
        Value::Ref(var) => var.with(|inner| encode(inner, out)),
    }
}

/// Dense integer keys starting at zero, in order.
fn is_list(array: &ArrayValue) -> bool {
    array
        .keys()
        .enumerate()
        .all(|(i, k)| *k == ArrayKey::Int(i as i64))
}

fn encode_str(bytes: &[u8], out: &mut StrBuilder) {
    out.push_byte(b'"');
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'/' => out.push_str("\\/"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x00..=0x1f => out.push_str(&format!("\\u{b:04x}")),
            0x20..=0x7f => out.push_byte(b),
            _ => {
                // Multi-byte UTF-8 decodes to \uXXXX escapes; bytes
                // that are not valid UTF-8 pass through untouched.
                if let Some((cp, width)) = decode_utf8(&bytes[i..]) {
                    push_code_point(cp, out);
                    i += width;
                    continue;
                }
                out.push_byte(b);
            }
        }
        i += 1;
    }
    out.push_byte(b'"');
}

fn decode_utf8(bytes: &[u8]) -> Option<(u32, usize)> {
    let first = bytes[0] as u32;
    let (width, mut cp) = match bytes[0] {
        0xc2..=0xdf => (2, first & 0x1f),
        0xe0..=0xef => (3, first & 0x0f),
        0xf0..=0xf4 => (4, first & 0x07),
        _ => return None,
    };
    if bytes.len() < width {
        return None;
    }
    for &b in &bytes[1..width] {
        if b & 0xc0 != 0x80 {
            return None;
        }
        cp = cp << 6 | (b as u32 & 0x3f);
    }
    Some((cp, width))
}

/// Escapes one code point, as a surrogate pair above the basic plane.
fn push_code_point(cp: u32, out: &mut StrBuilder) {
    if cp >= 0x10000 {
        let v = cp - 0x10000;
        out.push_str(&format!("\\u{:04x}", 0xd800 + (v >> 10)));
        out.push_str(&format!("\\u{:04x}", 0xdc00 + (v & 0x3ff)));
    } else {
        out.push_str(&format!("\\u{cp:04x}"));
    }
}
