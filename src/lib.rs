//! A database-agnostic query IR and its backend compilers.
//!
//! Queries are built once (see [`dsl`], [`query`], or the JSON form in [`json`]) and
//! compiled into a relational [`sql_compiler`], document [`mongo_compiler`] or search
//! [`search_compiler`] form, or evaluated directly by the [`memory`] backend.

pub mod ast;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod function;
pub mod json;
pub mod memory;
pub mod mongo_compiler;
pub mod native;
pub mod paths;
pub mod query;
pub mod registry;
pub mod search_compiler;
pub mod sql_compiler;

pub use compiler::{ConditionCompiler, QueryCompiler};
pub use config::SchemaConfig;
pub use error::{CompileError, ConfigError, QuerityError, ValidationError};
pub use query::{AdvancedQuery, Query};
