//! Handler dispatch and output sinks.
//!
//! At most one handler is registered per level bit. Dispatch detaches the
//! handler from its slot for the duration of the call and reinstates it
//! unconditionally afterwards, so a handler that itself raises at the same
//! level falls through to standard reporting instead of recursing.

use crate::{Diagnostic, Level, NUM_LEVELS};
use std::cell::RefCell;
use std::rc::Rc;

/// What a handler did with the diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler consumed the diagnostic; standard reporting is skipped.
    Handled,
    /// Continue with standard reporting.
    Fallthrough,
}

/// A registered handler callable.
pub type HandlerRef = Rc<RefCell<dyn FnMut(&Diagnostic) -> HandlerOutcome>>;

/// Per-level handler slots.
#[derive(Default)]
pub struct Handlers {
    slots: [Option<HandlerRef>; NUM_LEVELS],
}

/// Reinstates a detached handler when dropped, including on unwind.
struct Reinstate<'a> {
    slot: &'a mut Option<HandlerRef>,
    handler: Option<HandlerRef>,
}

impl Drop for Reinstate<'_> {
    fn drop(&mut self) {
        *self.slot = self.handler.take();
    }
}

impl Handlers {
    /// Create an empty handler table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every level bit in `mask`, replacing any
    /// previous registration on those bits.
    pub fn set<F>(&mut self, mask: Level, handler: F)
    where
        F: FnMut(&Diagnostic) -> HandlerOutcome + 'static,
    {
        let handler: HandlerRef = Rc::new(RefCell::new(handler));
        for bit in 0..NUM_LEVELS {
            if mask.bits() & (1 << bit) != 0 {
                self.slots[bit] = Some(handler.clone());
            }
        }
    }

    /// Remove the handler from every level bit in `mask`.
    pub fn clear(&mut self, mask: Level) {
        for bit in 0..NUM_LEVELS {
            if mask.bits() & (1 << bit) != 0 {
                self.slots[bit] = None;
            }
        }
    }

    /// True if a handler is registered for the given one-bit level.
    pub fn has_handler(&self, level: Level) -> bool {
        level
            .bit()
            .is_some_and(|bit| self.slots[bit as usize].is_some())
    }

    /// Dispatch to the handler registered for the diagnostic's level.
    ///
    /// Returns `None` when no handler is registered (or the handler is
    /// currently detached because this call is nested inside it).
    pub fn dispatch(&mut self, diag: &Diagnostic) -> Option<HandlerOutcome> {
        let bit = diag.level.bit()? as usize;
        let handler = self.slots[bit].take()?;

        let _reinstate = Reinstate {
            slot: &mut self.slots[bit],
            handler: Some(handler.clone()),
        };

        let outcome = (handler.borrow_mut())(diag);
        Some(outcome)
    }
}

/// Where non-fatal diagnostics and script output ultimately land.
pub enum Sink {
    /// Write to process stdout.
    Stdout,
    /// Capture into a buffer (hosts, tests).
    Buffer(BufferSink),
    /// Discard everything.
    Silent,
}

/// Buffering sink with interior mutability.
#[derive(Default)]
pub struct BufferSink {
    buffer: parking_lot::Mutex<Vec<u8>>,
}

impl BufferSink {
    /// Create an empty buffer sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes.
    pub fn write(&self, bytes: &[u8]) {
        self.buffer.lock().extend_from_slice(bytes);
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Discard captured bytes.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl Sink {
    /// Create a buffering sink.
    pub fn buffer() -> Self {
        Sink::Buffer(BufferSink::new())
    }

    /// Write bytes to the sink.
    pub fn write(&self, bytes: &[u8]) {
        match self {
            Sink::Stdout => {
                use std::io::Write;
                let _ = std::io::stdout().write_all(bytes);
            }
            Sink::Buffer(buf) => buf.write(bytes),
            Sink::Silent => {}
        }
    }

    /// Write a string followed by a newline.
    pub fn writeln(&self, msg: &str) {
        self.write(msg.as_bytes());
        self.write(b"\n");
    }

    /// Captured contents, empty for non-capturing sinks.
    pub fn contents(&self) -> Vec<u8> {
        match self {
            Sink::Buffer(buf) => buf.contents(),
            Sink::Stdout | Sink::Silent => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatch_without_handler_returns_none() {
        let mut handlers = Handlers::new();
        let diag = Diagnostic::new(Level::WARNING, "w");
        assert_eq!(handlers.dispatch(&diag), None);
    }

    #[test]
    fn handler_receives_diagnostic() {
        let mut handlers = Handlers::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        handlers.set(Level::WARNING, move |d: &Diagnostic| {
            seen2.borrow_mut().push(d.message.clone());
            HandlerOutcome::Handled
        });

        let diag = Diagnostic::new(Level::WARNING, "bad index");
        assert_eq!(handlers.dispatch(&diag), Some(HandlerOutcome::Handled));
        assert_eq!(seen.borrow().as_slice(), ["bad index".to_string()]);
    }

    #[test]
    fn handler_only_fires_for_registered_levels() {
        let mut handlers = Handlers::new();
        handlers.set(Level::WARNING, |_| HandlerOutcome::Handled);

        let notice = Diagnostic::new(Level::NOTICE, "n");
        assert_eq!(handlers.dispatch(&notice), None);
    }

    #[test]
    fn handler_is_reinstated_after_dispatch() {
        let mut handlers = Handlers::new();
        handlers.set(Level::WARNING, |_| HandlerOutcome::Handled);

        let diag = Diagnostic::new(Level::WARNING, "w");
        assert!(handlers.dispatch(&diag).is_some());
        assert!(handlers.has_handler(Level::WARNING));
        assert!(handlers.dispatch(&diag).is_some());
    }

    #[test]
    fn set_covers_every_bit_in_mask() {
        let mut handlers = Handlers::new();
        handlers.set(Level::WARNING | Level::NOTICE, |_| HandlerOutcome::Handled);
        assert!(handlers.has_handler(Level::WARNING));
        assert!(handlers.has_handler(Level::NOTICE));
        assert!(!handlers.has_handler(Level::STRICT));
    }

    #[test]
    fn clear_removes_handler() {
        let mut handlers = Handlers::new();
        handlers.set(Level::WARNING, |_| HandlerOutcome::Handled);
        handlers.clear(Level::WARNING);
        assert!(!handlers.has_handler(Level::WARNING));
    }

    #[test]
    fn buffer_sink_captures_writes() {
        let sink = Sink::buffer();
        sink.write(b"hello ");
        sink.writeln("world");
        assert_eq!(sink.contents(), b"hello world\n");
    }

    #[test]
    fn silent_sink_discards() {
        let sink = Sink::Silent;
        sink.write(b"hello");
        assert!(sink.contents().is_empty());
    }
}
