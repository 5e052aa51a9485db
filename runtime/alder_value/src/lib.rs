//! Runtime values for the Alder runtime.
//!
//! This crate is the data model the evaluator works over: the [`Value`]
//! enum and its weak-typing conversion and comparison rules, the
//! insertion-ordered [`ArrayValue`], byte-string [`StrValue`]s, shared
//! [`Var`] cells for aliasing, the class/object model, and the
//! serialize, JSON, and debug-print encodings.
//!
//! Nothing here evaluates code. Hooks back into an evaluator go
//! through the [`HookInvoker`] trait, and class constants and field
//! defaults are opaque [`ExprId`]s the evaluator owns.

pub mod array;
pub mod class;
pub mod json;
pub mod object;
pub mod printer;
pub mod serialize;
pub mod string;
pub mod value;
pub mod var;

pub use array::{ArrayKey, ArrayRef, ArrayValue};
pub use class::{
    resolve_class, ClassDef, ClassDefId, DefSource, ExprId, FieldDecl, FunId, MethodBinding,
    MethodDecl, ResolveKey, ResolvedClass, StaticFieldDecl, Visibility,
};
pub use json::json_encode;
pub use object::{FieldEntry, HookInvoker, NoHooks, ObjectRef, ObjectValue};
pub use printer::{print_r, var_dump, var_export};
pub use serialize::{serialize, unserialize, ClassSource, NoClasses};
pub use string::{classify, parse_float, parse_int, NumericType, StrBuilder, StrValue};
pub use value::{float_to_str, Value, ValueIter};
pub use var::Var;
