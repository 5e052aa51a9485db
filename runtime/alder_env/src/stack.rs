//! Diagnostic call-stack bookkeeping.
//!
//! Frames exist purely for stack traces and "in function X" message
//! suffixes; scoping never consults them.

use alder_diagnostic::Location;
use alder_value::Value;

pub struct CallFrame {
    pub function: String,
    pub location: Location,
    pub receiver: Value,
    pub args: Vec<Value>,
}

impl CallFrame {
    /// A frame carrying only a function name.
    pub fn named(function: impl Into<String>) -> CallFrame {
        CallFrame {
            function: function.into(),
            location: Location::default(),
            receiver: Value::Null,
            args: Vec::new(),
        }
    }
}

pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> CallStack {
        CallStack { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Suffix for diagnostics raised inside a call, empty at top level.
    pub fn context_suffix(&self) -> String {
        match self.frames.last() {
            Some(frame) => format!(" in {}()", frame.function),
            None => String::new(),
        }
    }

    /// One line per frame, innermost first.
    pub fn trace(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.frames.iter().rev().enumerate() {
            out.push_str(&format!(
                "#{i} {}({} args) called at {}\n",
                frame.function,
                frame.args.len(),
                frame.location,
            ));
        }
        out
    }
}

impl Default for CallStack {
    fn default() -> Self {
        CallStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(name: &str, line: u32) -> CallFrame {
        CallFrame {
            function: name.to_string(),
            location: Location::new("main.ald", line),
            receiver: Value::Null,
            args: vec![Value::Int(1), Value::Int(2)],
        }
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = CallStack::new();
        stack.push(frame("outer", 3));
        stack.push(frame("inner", 9));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.context_suffix(), " in inner()");
        assert_eq!(stack.pop().unwrap().function, "inner");
        assert_eq!(stack.context_suffix(), " in outer()");
    }

    #[test]
    fn trace_lists_innermost_first() {
        let mut stack = CallStack::new();
        stack.push(frame("outer", 3));
        stack.push(frame("inner", 9));
        let trace = stack.trace();
        let lines: Vec<&str> = trace.lines().collect();
        assert!(lines[0].starts_with("#0 inner"));
        assert!(lines[1].starts_with("#1 outer"));
    }
}
