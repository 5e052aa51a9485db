//! Reserved global arrays sourced lazily from the host.
//!
//! Nothing is materialized until a program first reads the name; the
//! environment then builds the array once and caches it in the global
//! map for the rest of the run.

use alder_value::{ArrayValue, Value};

/// Request-derived inputs supplied by whatever hosts the run.
pub trait HostContext {
    fn query_args(&self) -> ArrayValue;
    fn post_args(&self) -> ArrayValue;
    fn cookies(&self) -> ArrayValue;
    fn server_vars(&self) -> ArrayValue;

    /// Process environment as the host chooses to expose it; empty by
    /// default.
    fn env_vars(&self) -> ArrayValue {
        ArrayValue::new()
    }

    /// Merge order for the combined request array: one letter per
    /// source, later sources overriding earlier ones.
    fn variables_order(&self) -> &str {
        "GPC"
    }
}

/// A host with no request; every source is empty.
pub struct EmptyHost;

impl HostContext for EmptyHost {
    fn query_args(&self) -> ArrayValue {
        ArrayValue::new()
    }
    fn post_args(&self) -> ArrayValue {
        ArrayValue::new()
    }
    fn cookies(&self) -> ArrayValue {
        ArrayValue::new()
    }
    fn server_vars(&self) -> ArrayValue {
        ArrayValue::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Superglobal {
    Get,
    Post,
    Cookie,
    Server,
    Env,
    Request,
    Globals,
}

impl Superglobal {
    pub fn from_name(name: &str) -> Option<Superglobal> {
        match name {
            "_GET" => Some(Superglobal::Get),
            "_POST" => Some(Superglobal::Post),
            "_COOKIE" => Some(Superglobal::Cookie),
            "_SERVER" => Some(Superglobal::Server),
            "_ENV" => Some(Superglobal::Env),
            "_REQUEST" => Some(Superglobal::Request),
            "GLOBALS" => Some(Superglobal::Globals),
            _ => None,
        }
    }

    /// Builds the array for one reserved name. `Globals` is handled by
    /// the environment itself, which owns the global map.
    pub fn materialize(self, host: &dyn HostContext) -> Value {
        match self {
            Superglobal::Get => Value::array(host.query_args()),
            Superglobal::Post => Value::array(host.post_args()),
            Superglobal::Cookie => Value::array(host.cookies()),
            Superglobal::Server => Value::array(host.server_vars()),
            Superglobal::Env => Value::array(host.env_vars()),
            Superglobal::Request => Value::array(merge_request(host)),
            Superglobal::Globals => Value::empty_array(),
        }
    }
}

/// Folds the sources named by the order string, later letters winning
/// on key collision. Unknown letters are ignored.
fn merge_request(host: &dyn HostContext) -> ArrayValue {
    let mut merged = ArrayValue::new();
    for ch in host.variables_order().chars() {
        let source = match ch.to_ascii_uppercase() {
            'G' => host.query_args(),
            'P' => host.post_args(),
            'C' => host.cookies(),
            _ => continue,
        };
        for (key, value) in source.iter() {
            merged.insert(key.clone(), value.copy_as_array_item());
        }
    }
    merged
}
