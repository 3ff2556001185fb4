//! Post-construction interception.
//!
//! Interceptors run after a descriptor's construction step and before the
//! instance is returned or cached. Two kinds exist:
//!
//! - [`Interceptor::activate`] — a side-effecting callback that sees the
//!   freshly built instance and returns it unchanged.
//! - [`Interceptor::decorate`] — wraps the instance in another instance of
//!   the same abstraction. Proxying (short-circuiting calls, memoizing
//!   results) is expressed as a decorator whose wrapper owns the inner
//!   instance and a chain of before/after hooks.
//!
//! Interceptors compose in configured order: decorator A followed by
//! decorator B means callers reach B first, which delegates into A, which
//! delegates into the raw instance.

use std::sync::Arc;

use crate::descriptor::{Descriptor, SharedInstance, erase, unerase};

type ActivateFn = Arc<dyn Fn(&SharedInstance) + Send + Sync>;
type DecorateFn = Arc<dyn Fn(SharedInstance) -> SharedInstance + Send + Sync>;

#[derive(Clone)]
pub(crate) enum InterceptorKind {
    Activate(ActivateFn),
    Decorate(DecorateFn),
}

/// One ordered step of the interception pipeline.
#[derive(Clone)]
pub struct Interceptor {
    kind: InterceptorKind,
}

impl Interceptor {
    /// A side-effecting activation callback; the instance passes through
    /// unchanged.
    ///
    /// The callback is typed; if the built instance is not a `T` (possible
    /// only for container-wide policies with a loose predicate) the callback
    /// is skipped.
    pub fn activate<T>(f: impl Fn(&Arc<T>) + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            kind: InterceptorKind::Activate(Arc::new(move |shared| {
                if let Some(typed) = unerase::<T>(shared) {
                    f(&typed);
                }
            })),
        }
    }

    /// Wraps the built instance in another implementation of the same
    /// abstraction.
    ///
    /// If the built instance is not a `T`, it passes through undecorated.
    pub fn decorate<T>(f: impl Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            kind: InterceptorKind::Decorate(Arc::new(move |shared| {
                match unerase::<T>(&shared) {
                    Some(typed) => erase(f(typed)),
                    None => shared,
                }
            })),
        }
    }

    /// Runs this step over a freshly built instance.
    pub(crate) fn apply(&self, instance: SharedInstance) -> SharedInstance {
        match &self.kind {
            InterceptorKind::Activate(f) => {
                f(&instance);
                instance
            }
            InterceptorKind::Decorate(f) => f(instance),
        }
    }
}

impl core::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            InterceptorKind::Activate(_) => f.write_str("Interceptor::Activate"),
            InterceptorKind::Decorate(_) => f.write_str("Interceptor::Decorate"),
        }
    }
}

/// A container-wide interceptor gated by a predicate over the descriptor
/// being built (e.g. "only decorate instances whose concrete type name
/// starts with 'B'").
#[derive(Clone)]
pub struct InterceptionPolicy {
    pub(crate) applies_to: Arc<dyn Fn(&Descriptor) -> bool + Send + Sync>,
    pub(crate) interceptor: Interceptor,
}

impl InterceptionPolicy {
    /// Creates a policy applying `interceptor` to every descriptor matching
    /// the predicate.
    pub fn new(
        applies_to: impl Fn(&Descriptor) -> bool + Send + Sync + 'static,
        interceptor: Interceptor,
    ) -> Self {
        Self {
            applies_to: Arc::new(applies_to),
            interceptor,
        }
    }
}
