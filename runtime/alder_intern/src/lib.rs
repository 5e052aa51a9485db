//! Alder Intern - interned names for the Alder runtime.
//!
//! Variable, function, class, constant and field identifiers are interned
//! once into 32-bit [`Name`]s; every table in the runtime keys on `Name`
//! instead of owned strings. The interner is shared across executions.

mod interner;
mod name;

pub use interner::{InternError, SharedInterner, StringInterner};
pub use name::Name;
