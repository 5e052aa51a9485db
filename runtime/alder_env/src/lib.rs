//! Execution environments for the Alder runtime.
//!
//! A process hosts one shared [`Runtime`]: the interner, the global
//! name-to-id maps, the resolved-class cache, and pools of warm
//! declaration tables. Each script run gets its own [`Env`] on top of
//! it, holding variables, declarations, static-field storage, output
//! buffers, and diagnostic dispatch for that run alone. Environments
//! are single-threaded; the runtime is shared freely.

pub mod class_cache;
pub mod env;
pub mod output;
pub mod runtime;
pub mod snapshot;
pub mod stack;
pub mod superglobal;
pub mod tables;

pub use class_cache::ClassCache;
pub use env::Env;
pub use output::OutputStack;
pub use runtime::{FunctionDecl, Runtime};
pub use snapshot::EnvSnapshot;
pub use stack::{CallFrame, CallStack};
pub use superglobal::{EmptyHost, HostContext, Superglobal};
pub use tables::{IdTable, TablePool};
