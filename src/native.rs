//! Opaque backend-specific payloads carried through the IR untouched.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A backend-typed value that bypasses IR compilation.
///
/// Used for native conditions, selects, sorts and group-bys, and for query
/// customizers. A backend recovers its own type through [`Native::downcast_ref`];
/// any other type is foreign to it.
#[derive(Clone)]
pub struct Native {
    payload: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Native {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native<{}>", self.type_name)
    }
}

/// Two payloads are equal only when they share the same allocation.
impl PartialEq for Native {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let native = Native::new(42u32);
        assert!(native.is::<u32>());
        assert_eq!(native.downcast_ref::<u32>(), Some(&42));
        assert!(native.downcast_ref::<String>().is_none());
        assert_eq!(native.type_name(), "u32");
    }

    #[test]
    fn test_identity_equality() {
        let a = Native::new("x".to_string());
        let b = a.clone();
        let c = Native::new("x".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
