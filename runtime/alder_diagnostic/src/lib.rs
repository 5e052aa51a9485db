//! Alder Diagnostic - leveled diagnostics for the Alder runtime.
//!
//! - [`Level`]: one bit per reporting level, filterable by mask
//! - [`Diagnostic`]: a reported condition with optional location
//! - [`Handlers`]: per-level handler slots with a reentrancy guard
//! - [`Sink`]: where non-fatal reports and script output land
//! - [`RuntimeError`]: the propagating fatal condition

mod diagnostic;
mod handler;
mod level;

pub use diagnostic::{Diagnostic, Location, RuntimeError, RuntimeResult};
pub use handler::{BufferSink, HandlerOutcome, HandlerRef, Handlers, Sink};
pub use level::{Level, NUM_LEVELS};
pub use level::{
    B_COMPILE_ERROR, B_COMPILE_WARNING, B_CORE_ERROR, B_CORE_WARNING, B_DEPRECATED, B_ERROR,
    B_NOTICE, B_PARSE, B_RECOVERABLE_ERROR, B_STRICT, B_USER_DEPRECATED, B_USER_ERROR,
    B_USER_NOTICE, B_USER_WARNING, B_WARNING,
};
