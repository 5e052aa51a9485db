//! The output-buffer stack.
//!
//! Writes always land in the innermost layer. Popping a layer either
//! flushes its bytes into the next layer out (or the base sink when no
//! layers remain) or discards them, per the pop call.

use alder_diagnostic::Sink;

pub struct OutputStack {
    sink: Sink,
    layers: Vec<Vec<u8>>,
}

impl OutputStack {
    pub fn new(sink: Sink) -> OutputStack {
        OutputStack {
            sink,
            layers: Vec::new(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        match self.layers.last_mut() {
            Some(layer) => layer.extend_from_slice(bytes),
            None => self.sink.write(bytes),
        }
    }

    pub fn push_buffer(&mut self) {
        self.layers.push(Vec::new());
    }

    /// Pops the innermost layer, flushing its content outward.
    pub fn pop_flush(&mut self) -> bool {
        match self.layers.pop() {
            Some(layer) => {
                self.write(&layer);
                true
            }
            None => false,
        }
    }

    /// Pops the innermost layer, dropping its content.
    pub fn pop_discard(&mut self) -> Option<Vec<u8>> {
        self.layers.pop()
    }

    /// Bytes buffered in the innermost layer, without popping.
    pub fn contents(&self) -> Option<&[u8]> {
        self.layers.last().map(Vec::as_slice)
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Flushes every layer, innermost first, down to the sink.
    pub fn flush_all(&mut self) {
        while self.pop_flush() {}
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }
}
