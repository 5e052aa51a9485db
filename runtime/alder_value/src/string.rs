//! Binary string values and the builder used to assemble them.
//!
//! Strings are byte strings, not UTF-8 text. Three physical layouts sit
//! behind [`StrValue`]: single-byte strings resolve into a static pool,
//! ordinary strings share one contiguous buffer, and strings past
//! [`LARGE_THRESHOLD`] keep the chunk list their builder accumulated so
//! growth never copies what was already written. Chunked strings flatten
//! lazily the first time byte access is needed.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Byte length at which a builder stops growing one buffer and starts
/// chaining fixed-size chunks instead.
pub const LARGE_THRESHOLD: usize = 1 << 15;

/// Chunk size for the large representation.
const CHUNK_SIZE: usize = 1 << 12;

/// Static backing store for every single-byte string.
static SINGLE_BYTES: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table
};

/// An immutable byte string.
#[derive(Clone)]
pub enum StrValue {
    /// One byte, backed by the shared single-byte pool.
    Byte(u8),
    /// A contiguous shared buffer.
    Buf(Rc<[u8]>),
    /// A chunked buffer for strings past [`LARGE_THRESHOLD`].
    Large(Rc<LargeStr>),
}

/// Chunked storage for large strings, with a lazily flattened view.
pub struct LargeStr {
    chunks: Vec<Box<[u8]>>,
    len: usize,
    flat: OnceCell<Box<[u8]>>,
}

impl LargeStr {
    fn bytes(&self) -> &[u8] {
        self.flat.get_or_init(|| {
            let mut out = Vec::with_capacity(self.len);
            for chunk in &self.chunks {
                out.extend_from_slice(chunk);
            }
            out.into_boxed_slice()
        })
    }
}

impl StrValue {
    pub fn empty() -> StrValue {
        StrValue::Buf(Rc::from(&[][..]))
    }

    pub fn from_bytes(bytes: &[u8]) -> StrValue {
        match bytes.len() {
            1 => StrValue::Byte(bytes[0]),
            _ => StrValue::Buf(Rc::from(bytes)),
        }
    }

    pub fn from_str(s: &str) -> StrValue {
        StrValue::from_bytes(s.as_bytes())
    }

    /// Takes ownership of a buffer, picking the layout by size.
    pub fn from_vec(bytes: Vec<u8>) -> StrValue {
        match bytes.len() {
            1 => StrValue::Byte(bytes[0]),
            _ => StrValue::Buf(Rc::from(bytes)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StrValue::Byte(b) => {
                let i = *b as usize;
                &SINGLE_BYTES[i..=i]
            }
            StrValue::Buf(buf) => buf,
            StrValue::Large(large) => large.bytes(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StrValue::Byte(_) => 1,
            StrValue::Buf(buf) => buf.len(),
            StrValue::Large(large) => large.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at `index`, as a pooled single-byte string.
    pub fn char_at(&self, index: i64) -> Option<StrValue> {
        if index < 0 {
            return None;
        }
        self.as_bytes()
            .get(index as usize)
            .map(|&b| StrValue::Byte(b))
    }

    /// False for the empty string and for `"0"`.
    pub fn to_bool(&self) -> bool {
        let bytes = self.as_bytes();
        !(bytes.is_empty() || bytes == b"0")
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// Classifies the whole string as an integer, a float, or neither.
    pub fn classify(&self) -> NumericType {
        classify(self.as_bytes())
    }

    /// Integer value of the leading numeric run.
    pub fn to_int(&self) -> i64 {
        parse_int(self.as_bytes())
    }

    /// Float value of the leading numeric run.
    pub fn to_float(&self) -> f64 {
        parse_float(self.as_bytes())
    }
}

impl PartialEq for StrValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for StrValue {}

impl PartialOrd for StrValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StrValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for StrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for StrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for StrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl From<&str> for StrValue {
    fn from(s: &str) -> StrValue {
        StrValue::from_str(s)
    }
}

impl From<String> for StrValue {
    fn from(s: String) -> StrValue {
        StrValue::from_vec(s.into_bytes())
    }
}

/// Result of classifying a byte string numerically.
///
/// Classification is what drives loose comparison and array-key
/// canonicalization. A hex literal like `"0x1A"` is deliberately
/// *not* numeric here even though the parse functions accept it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericType {
    Int(i64),
    Float(f64),
    NonNumeric,
}

impl NumericType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, NumericType::NonNumeric)
    }
}

/// Single-pass numeric classification of a byte string.
///
/// Accepts optional surrounding whitespace, an optional sign, a digit
/// run, an optional fraction, and an optional exponent. Anything else,
/// including `0x` prefixes and the empty string, is non-numeric.
pub fn classify(bytes: &[u8]) -> NumericType {
    let len = bytes.len();
    let mut i = 0;

    while i < len && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let mut end = len;
    while end > i && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if i == end {
        return NumericType::NonNumeric;
    }

    let start = i;
    let negative = match bytes[i] {
        b'-' => {
            i += 1;
            true
        }
        b'+' => {
            i += 1;
            false
        }
        _ => false,
    };

    let int_start = i;
    let mut int_value: i64 = 0;
    let mut int_overflow = false;
    while i < end && bytes[i].is_ascii_digit() {
        let digit = (bytes[i] - b'0') as i64;
        match int_value.checked_mul(10).and_then(|v| v.checked_add(digit)) {
            Some(v) => int_value = v,
            None => int_overflow = true,
        }
        i += 1;
    }
    let int_digits = i - int_start;

    if i == end {
        if int_digits == 0 {
            return NumericType::NonNumeric;
        }
        if int_overflow {
            return NumericType::Float(float_of(&bytes[start..end]));
        }
        // i64::MIN has no positive counterpart, so the negation below is
        // only safe because overflow was checked digit by digit.
        return NumericType::Int(if negative { -int_value } else { int_value });
    }

    let mut frac_digits = 0;
    if bytes[i] == b'.' {
        i += 1;
        while i < end && bytes[i].is_ascii_digit() {
            i += 1;
            frac_digits += 1;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return NumericType::NonNumeric;
    }

    if i < end && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < end && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < end && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return NumericType::NonNumeric;
        }
    }

    if i != end {
        return NumericType::NonNumeric;
    }
    NumericType::Float(float_of(&bytes[start..end]))
}

fn float_of(bytes: &[u8]) -> f64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parses the leading integer run of a byte string.
///
/// Skips leading whitespace, accepts a sign, then consumes digits until
/// the first non-digit, saturating on overflow. A `0x`/`0X` prefix
/// switches to hexadecimal. Strings with no leading digits yield 0.
pub fn parse_int(bytes: &[u8]) -> i64 {
    let len = bytes.len();
    let mut i = 0;
    while i < len && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let negative = match bytes.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };

    if bytes.get(i) == Some(&b'0') && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
        return parse_hex(&bytes[i + 2..], negative);
    }

    let mut value: i64 = 0;
    let mut saturated = false;
    while i < len && bytes[i].is_ascii_digit() {
        let digit = (bytes[i] - b'0') as i64;
        match value.checked_mul(10).and_then(|v| v.checked_add(digit)) {
            Some(v) => value = v,
            None => saturated = true,
        }
        i += 1;
    }

    if saturated {
        if negative { i64::MIN } else { i64::MAX }
    } else if negative {
        -value
    } else {
        value
    }
}

fn parse_hex(bytes: &[u8], negative: bool) -> i64 {
    let mut value: i64 = 0;
    let mut saturated = false;
    for &b in bytes {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as i64,
            b'a'..=b'f' => (b - b'a' + 10) as i64,
            b'A'..=b'F' => (b - b'A' + 10) as i64,
            _ => break,
        };
        match value.checked_mul(16).and_then(|v| v.checked_add(digit)) {
            Some(v) => value = v,
            None => saturated = true,
        }
    }
    if saturated {
        if negative { i64::MIN } else { i64::MAX }
    } else if negative {
        -value
    } else {
        value
    }
}

/// Parses the leading float run of a byte string.
///
/// Consumes sign, digits, an optional fraction, and an optional
/// exponent, then stops. `0x` prefixes parse as hex integers. Strings
/// with no leading numeric run yield 0.0.
pub fn parse_float(bytes: &[u8]) -> f64 {
    let len = bytes.len();
    let mut i = 0;
    while i < len && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let start = i;

    if i < len && (bytes[i] == b'-' || bytes[i] == b'+') {
        i += 1;
    }

    if bytes.get(i) == Some(&b'0') && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
        let negative = bytes[start] == b'-';
        return parse_hex(&bytes[i + 2..], negative) as f64;
    }

    let mut digits = 0;
    while i < len && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < len && bytes[i] == b'.' {
        let mark = i;
        i += 1;
        let mut frac = 0;
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
            frac += 1;
        }
        if digits == 0 && frac == 0 {
            i = mark;
        } else {
            digits += frac;
        }
    }
    if digits == 0 {
        return 0.0;
    }
    if i < len && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mark = i;
        i += 1;
        if i < len && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            i = mark;
        }
    }

    float_of(&bytes[start..i])
}

/// Incremental string assembly.
///
/// Small builders double one buffer; past [`LARGE_THRESHOLD`] growth
/// switches to appending fixed-size chunks so the bytes already written
/// are never moved again.
pub struct StrBuilder {
    head: Vec<u8>,
    chunks: Vec<Box<[u8]>>,
    len: usize,
}

impl StrBuilder {
    pub fn new() -> StrBuilder {
        StrBuilder {
            head: Vec::new(),
            chunks: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> StrBuilder {
        StrBuilder {
            head: Vec::with_capacity(capacity.min(LARGE_THRESHOLD)),
            chunks: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_byte(&mut self, b: u8) {
        self.push_bytes(&[b]);
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_value(&mut self, s: &StrValue) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_bytes(&mut self, mut bytes: &[u8]) {
        self.len += bytes.len();
        if self.chunks.is_empty() {
            if self.head.len() + bytes.len() <= LARGE_THRESHOLD {
                self.head.extend_from_slice(bytes);
                return;
            }
            // Crossing the threshold: seal the head as the first chunk.
            let head = std::mem::take(&mut self.head);
            self.chunks.push(head.into_boxed_slice());
            self.head = Vec::with_capacity(CHUNK_SIZE);
        }
        while !bytes.is_empty() {
            let room = CHUNK_SIZE - self.head.len();
            let take = room.min(bytes.len());
            self.head.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.head.len() == CHUNK_SIZE {
                let full = std::mem::replace(&mut self.head, Vec::with_capacity(CHUNK_SIZE));
                self.chunks.push(full.into_boxed_slice());
            }
        }
    }

    pub fn finish(mut self) -> StrValue {
        if self.chunks.is_empty() {
            return StrValue::from_vec(self.head);
        }
        if !self.head.is_empty() {
            self.chunks.push(self.head.into_boxed_slice());
        }
        StrValue::Large(Rc::new(LargeStr {
            chunks: self.chunks,
            len: self.len,
            flat: OnceCell::new(),
        }))
    }
}

impl Default for StrBuilder {
    fn default() -> Self {
        StrBuilder::new()
    }
}

impl fmt::Write for StrBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_byte_strings_share_the_pool() {
        let a = StrValue::from_bytes(b"a");
        assert!(matches!(a, StrValue::Byte(b'a')));
        assert_eq!(a.as_bytes(), b"a");
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn classify_integers() {
        assert_eq!(classify(b"42"), NumericType::Int(42));
        assert_eq!(classify(b"-7"), NumericType::Int(-7));
        assert_eq!(classify(b"+13"), NumericType::Int(13));
        assert_eq!(classify(b"  42  "), NumericType::Int(42));
    }

    #[test]
    fn classify_floats() {
        assert_eq!(classify(b"1.5"), NumericType::Float(1.5));
        assert_eq!(classify(b".5"), NumericType::Float(0.5));
        assert_eq!(classify(b"2."), NumericType::Float(2.0));
        assert_eq!(classify(b"1e3"), NumericType::Float(1000.0));
        assert_eq!(classify(b"-2.5E-1"), NumericType::Float(-0.25));
    }

    #[test]
    fn classify_rejects_non_numeric() {
        assert_eq!(classify(b""), NumericType::NonNumeric);
        assert_eq!(classify(b"   "), NumericType::NonNumeric);
        assert_eq!(classify(b"abc"), NumericType::NonNumeric);
        assert_eq!(classify(b"12abc"), NumericType::NonNumeric);
        assert_eq!(classify(b"1.2.3"), NumericType::NonNumeric);
        assert_eq!(classify(b"."), NumericType::NonNumeric);
        assert_eq!(classify(b"-"), NumericType::NonNumeric);
        assert_eq!(classify(b"1e"), NumericType::NonNumeric);
    }

    #[test]
    fn hex_is_conversion_only() {
        assert_eq!(classify(b"0x1A"), NumericType::NonNumeric);
        assert_eq!(parse_int(b"0x1A"), 26);
        assert_eq!(parse_int(b"-0xff"), -255);
        assert_eq!(parse_float(b"0x10"), 16.0);
    }

    #[test]
    fn classify_overflowing_digits_as_float() {
        assert_eq!(
            classify(b"99999999999999999999"),
            NumericType::Float(1e20)
        );
    }

    #[test]
    fn parse_int_takes_the_leading_run() {
        assert_eq!(parse_int(b"12abc"), 12);
        assert_eq!(parse_int(b"abc"), 0);
        assert_eq!(parse_int(b"  -8xyz"), -8);
        assert_eq!(parse_int(b""), 0);
        assert_eq!(parse_int(b"99999999999999999999"), i64::MAX);
        assert_eq!(parse_int(b"-99999999999999999999"), i64::MIN);
    }

    #[test]
    fn parse_float_takes_the_leading_run() {
        assert_eq!(parse_float(b"1.5kg"), 1.5);
        assert_eq!(parse_float(b"1e2m"), 100.0);
        assert_eq!(parse_float(b"abc"), 0.0);
        assert_eq!(parse_float(b"1e"), 1.0);
        assert_eq!(parse_float(b"-3.25"), -3.25);
    }

    #[test]
    fn string_truthiness() {
        assert!(!StrValue::empty().to_bool());
        assert!(!StrValue::from_str("0").to_bool());
        assert!(StrValue::from_str("00").to_bool());
        assert!(StrValue::from_str("false").to_bool());
    }

    #[test]
    fn builder_round_trips_small_strings() {
        let mut b = StrBuilder::new();
        b.push_str("hello");
        b.push_byte(b' ');
        b.push_str("world");
        let s = b.finish();
        assert_eq!(s.as_bytes(), b"hello world");
    }

    #[test]
    fn builder_switches_to_chunks_past_the_threshold() {
        let mut b = StrBuilder::new();
        let piece = [b'x'; 1000];
        let total = LARGE_THRESHOLD * 2 + 17;
        let mut written = 0;
        while written < total {
            let take = piece.len().min(total - written);
            b.push_bytes(&piece[..take]);
            written += take;
        }
        assert_eq!(b.len(), total);
        let s = b.finish();
        assert!(matches!(s, StrValue::Large(_)));
        assert_eq!(s.len(), total);
        assert!(s.as_bytes().iter().all(|&b| b == b'x'));
    }

    #[test]
    fn char_at_returns_pooled_bytes() {
        let s = StrValue::from_str("abc");
        assert_eq!(s.char_at(1), Some(StrValue::Byte(b'b')));
        assert_eq!(s.char_at(3), None);
        assert_eq!(s.char_at(-1), None);
    }
}
