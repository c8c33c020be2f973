//! FilterQL - declarative boolean filters compiled into cached predicate trees
//!
//! This crate provides the filter compilation core:
//! - A small DSL combining named filters with `&`, `|`, `!` and parentheses
//! - A boolean simplifier (fixed-point rewrite system) over postfix form
//! - A structural normalizer producing value-independent cache keys
//! - A postfix condition builder emitting composable predicate trees
//! - A bounded LRU cache with single-flight compilation per key
//! - A projection planner compiling DTO field selections into batched
//!   multi-query execution plans over an abstract data source

pub mod cache;
pub mod compiler;
pub mod condition;
pub mod config;
pub mod dsl;
pub mod errors;
pub mod executor;
pub mod model;
pub mod normalize;
pub mod projection;
pub mod registry;
pub mod simplify;

pub use compiler::{CompiledFilter, ConditionCompiler};
pub use errors::Error;
