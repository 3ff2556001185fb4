//! Service identity.
//!
//! A [`ServiceKey`] identifies one registration lookup: the requested
//! abstraction type plus an optional instance name. Keys work uniformly for
//! concrete types and trait objects (`TypeId::of::<dyn Widget>()` is valid
//! for any `'static` trait object).

use core::any::TypeId;

/// Identity of a registration lookup: requested type plus optional name.
///
/// # Example
///
/// ```
/// use plugboard_core::key::ServiceKey;
///
/// trait Widget: Send + Sync {}
///
/// let default = ServiceKey::of::<dyn Widget>();
/// let named = ServiceKey::named::<dyn Widget>("backup");
///
/// assert_eq!(default.type_id(), named.type_id());
/// assert_ne!(default, named);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl ServiceKey {
    /// Creates the key for the default instance of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            name: None,
        }
    }

    /// Creates the key for the instance of `T` registered under `name`.
    #[must_use]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::of::<T>()
        }
    }

    /// Returns the underlying `TypeId` of the requested abstraction.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the human-readable type name of the requested abstraction.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the instance name, or `None` for a default lookup.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Returns the same key with the instance name replaced.
    #[must_use]
    pub fn with_name(self, name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }
}

impl core::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} ('{}')", self.type_name, name),
            None => f.write_str(self.type_name),
        }
    }
}
