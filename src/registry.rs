//! Per-backend dispatch tables.
//!
//! A backend lists, once and explicitly, which functions it can translate and which
//! native payload types it accepts. Anything missing from a table surfaces as a
//! named error instead of being dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::debug;

use crate::ast::FunctionCall;
use crate::error::CompileError;
use crate::function::Function;
use crate::native::Native;

/// Translates one function call given its already-compiled arguments.
pub type FunctionHandler<E> = fn(&FunctionCall, Vec<E>) -> Result<E, CompileError>;

pub struct FunctionTable<E> {
    backend: &'static str,
    handlers: HashMap<Function, FunctionHandler<E>>,
}

impl<E> FunctionTable<E> {
    pub fn new(
        backend: &'static str,
        entries: impl IntoIterator<Item = (Function, FunctionHandler<E>)>,
    ) -> Self {
        Self {
            backend,
            handlers: entries.into_iter().collect(),
        }
    }

    /// A table that supports no function at all.
    pub fn empty(backend: &'static str) -> Self {
        Self {
            backend,
            handlers: HashMap::new(),
        }
    }

    pub fn with(mut self, function: Function, handler: FunctionHandler<E>) -> Self {
        self.handlers.insert(function, handler);
        self
    }

    pub fn supports(&self, function: Function) -> bool {
        self.handlers.contains_key(&function)
    }

    pub fn apply(&self, call: &FunctionCall, arguments: Vec<E>) -> Result<E, CompileError> {
        let handler = self
            .handlers
            .get(&call.function())
            .ok_or(CompileError::UnsupportedFunction {
                backend: self.backend,
                function: call.function(),
            })?;
        handler(call, arguments)
    }
}

/// Destructures compiled arguments of a fixed-arity function.
pub fn fixed_args<E, const N: usize>(
    call: &FunctionCall,
    arguments: Vec<E>,
) -> Result<[E; N], CompileError> {
    let actual = arguments.len();
    arguments.try_into().map_err(|_| {
        CompileError::TypeMismatch(format!(
            "{} expects {} argument(s), got {}",
            call.function(),
            N,
            actual
        ))
    })
}

type NativeHandler<O> = Box<dyn Fn(&Native) -> Option<O> + Send + Sync>;

/// Native payload types a backend accepts for one kind of IR node.
pub struct NativeTable<O> {
    backend: &'static str,
    handlers: HashMap<TypeId, NativeHandler<O>>,
}

impl<O: 'static> NativeTable<O> {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Any + Send + Sync>(mut self, convert: fn(&T) -> O) -> Self {
        self.handlers.insert(
            TypeId::of::<T>(),
            Box::new(move |native: &Native| native.downcast_ref::<T>().map(convert)),
        );
        self
    }

    pub fn resolve(&self, native: &Native) -> Result<O, CompileError> {
        self.handlers
            .get(&native.type_id())
            .and_then(|handler| handler(native))
            .ok_or(CompileError::UnsupportedNative {
                backend: self.backend,
                type_name: native.type_name(),
            })
    }
}

/// Customizers of type `T`, skipping (never failing on) every other type.
pub fn matching_customizers<'a, T: Any>(
    backend: &'static str,
    customizers: &'a [Native],
) -> impl Iterator<Item = &'a T> + 'a {
    customizers.iter().filter_map(move |customizer| {
        let matched = customizer.downcast_ref::<T>();
        if matched.is_none() {
            debug!(
                backend,
                customizer = customizer.type_name(),
                "skipping customizer of a foreign type"
            );
        }
        matched
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, PropertyReference};

    fn upper(call: &FunctionCall, args: Vec<String>) -> Result<String, CompileError> {
        let [arg] = fixed_args(call, args)?;
        Ok(format!("UPPER({arg})"))
    }

    #[test]
    fn test_function_table_dispatch() {
        let table: FunctionTable<String> =
            FunctionTable::new("test", [(Function::Upper, upper as FunctionHandler<String>)]);
        let call = FunctionCall::new(
            Function::Upper,
            vec![PropertyReference::new("name").unwrap().into()],
        )
        .unwrap();
        assert_eq!(table.apply(&call, vec!["name".into()]).unwrap(), "UPPER(name)");
        assert!(table.supports(Function::Upper));
        assert!(!table.supports(Function::Lower));
    }

    #[test]
    fn test_function_table_names_missing_function() {
        let table: FunctionTable<String> = FunctionTable::empty("search");
        let call = FunctionCall::new(Function::Length, vec![Literal::from("x").into()]).unwrap();
        assert_eq!(
            table.apply(&call, vec!["'x'".into()]).unwrap_err(),
            CompileError::UnsupportedFunction {
                backend: "search",
                function: Function::Length
            }
        );
    }

    #[test]
    fn test_native_table_resolution() {
        let table = NativeTable::<String>::new("test").register(|s: &String| s.to_uppercase());
        assert_eq!(table.resolve(&Native::new("abc".to_string())).unwrap(), "ABC");
        let err = table.resolve(&Native::new(7u8)).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedNative {
                backend: "test",
                type_name: "u8"
            }
        );
    }

    #[test]
    fn test_matching_customizers_skips_foreign_types() {
        let customizers = vec![Native::new(1u32), Native::new("x".to_string()), Native::new(2u32)];
        let found: Vec<u32> = matching_customizers::<u32>("test", &customizers)
            .copied()
            .collect();
        assert_eq!(found, vec![1, 2]);
    }
}
