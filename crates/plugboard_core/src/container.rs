//! Containers and the scope hierarchy.
//!
//! A [`Container`] is one scope over a configuration: the root owns the
//! singleton cache, child and profile containers layer configuration on
//! top of it, and nested containers are short-lived scopes for
//! per-request work. Every scope snapshots its configuration as an
//! immutable runtime generation; reconfiguring swaps in a new generation
//! (discarding compiled plans wholesale) without touching scopes that
//! were created earlier.
//!
//! Resolution itself is delegated to a per-request
//! [`BuildSession`](crate::session::BuildSession).

use core::any::TypeId;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};

use crate::descriptor::{SharedInstance, erase, unerase};
use crate::error::{ResolveError, ValidationReport};
use crate::graph::{InstanceGraph, Registry};
use crate::key::ServiceKey;
use crate::lifecycle::{DisposeBag, ObjectCache};
use crate::plan::{PlanCache, Planner};
use crate::session::{BuildSession, SessionEnv, typed};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_scope_id() -> u64 {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The position of a scope in the container hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRole {
    /// The root scope; owns the singleton cache.
    Root,
    /// A reconfigurable layer over its parent's configuration.
    Child,
    /// A short-lived scope for per-request work.
    Nested,
    /// A child materialized from a named profile.
    Profile(&'static str),
}

/// One immutable configuration generation: the sealed graph, the plans
/// compiled against it, and the misses remembered for `try_get_instance`.
struct Runtime {
    graph: InstanceGraph,
    plans: PlanCache,
    negatives: RwLock<HashSet<(TypeId, Option<&'static str>)>>,
}

impl Runtime {
    fn new(graph: InstanceGraph) -> Self {
        Self {
            graph,
            plans: PlanCache::default(),
            negatives: RwLock::new(HashSet::new()),
        }
    }
}

struct ScopeCore {
    id: u64,
    role: ScopeRole,
    runtime: RwLock<Arc<Runtime>>,
    singletons: Arc<ObjectCache>,
    scoped: ObjectCache,
    transients: DisposeBag,
    disposed: AtomicBool,
    children: Mutex<Vec<Weak<ScopeCore>>>,
}

impl ScopeCore {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let children = core::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.dispose();
            }
        }
        self.transients.dispose_all();
        self.scoped.eject_all();
        crate::lifecycle::retire_scope(self.id);
        if self.role == ScopeRole::Root {
            self.singletons.eject_all();
        }
        tracing::debug!(scope = self.id, role = ?self.role, "scope disposed");
    }
}

impl Drop for ScopeCore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// One row of [`Container::model`]: the introspectable shape of a
/// registration.
#[derive(Debug, Clone)]
pub struct DescriptorInfo {
    /// The registered abstraction.
    pub service_type: &'static str,
    /// The instance name, or `None` for an unnamed registration.
    pub instance_name: Option<&'static str>,
    /// The lifecycle label.
    pub lifecycle: &'static str,
    /// The concrete type, when known.
    pub plugged_type: Option<&'static str>,
    /// Whether this registration is its family's resolved default.
    pub is_default: bool,
}

/// A scope handle over a sealed configuration. Cheaply clonable; clones
/// share the scope.
///
/// # Example
///
/// ```ignore
/// let container = Container::new(|registry| {
///     registry.register_default::<dyn Mailer>(
///         Instance::built(Ctor::new((Dep::<Config>::auto(),), |(config,)| {
///             Arc::new(SmtpMailer::from(config)) as Arc<dyn Mailer>
///         }))
///         .singleton(),
///     );
/// });
///
/// let mailer = container.get_instance::<dyn Mailer>()?;
/// ```
#[derive(Clone)]
pub struct Container {
    core: Arc<ScopeCore>,
}

impl Container {
    /// Builds a root container from a registry configured in place.
    pub fn new(configure: impl FnOnce(&mut Registry)) -> Self {
        let mut registry = Registry::new();
        configure(&mut registry);
        Self::from_registry(registry)
    }

    /// Builds a root container from a prepared registry.
    #[must_use]
    pub fn from_registry(registry: Registry) -> Self {
        let core = Arc::new(ScopeCore {
            id: next_scope_id(),
            role: ScopeRole::Root,
            runtime: RwLock::new(Arc::new(Runtime::new(registry.seal()))),
            singletons: Arc::new(ObjectCache::default()),
            scoped: ObjectCache::default(),
            transients: DisposeBag::default(),
            disposed: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        });
        tracing::debug!(scope = core.id, "root container created");
        Self { core }
    }

    /// This scope's position in the hierarchy.
    #[must_use]
    pub fn role(&self) -> ScopeRole {
        self.core.role
    }

    /// Whether [`Container::dispose`] has run for this scope.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::SeqCst)
    }

    // ─── Resolution ─────────────────────────────────────────────────────────

    /// Resolves the default instance of `T`.
    ///
    /// # Errors
    ///
    /// Fails when nothing is registered, the family default is ambiguous
    /// or faulted, a dependency is unresolvable or cyclic, construction
    /// fails, or the scope is disposed.
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.get_with_args::<T>(HashMap::new())
    }

    /// Resolves the instance of `T` registered under `name`.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons as [`Container::get_instance`], with a
    /// miss reported against the named key.
    pub fn get_instance_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> Result<Arc<T>, ResolveError> {
        self.get_named_with_args::<T>(name, HashMap::new())
    }

    /// Resolves the default instance of `T`, mapping "nothing registered"
    /// to `None`. Misses are remembered per configuration generation, so
    /// repeated probing is cheap.
    ///
    /// # Errors
    ///
    /// Every failure other than a registration miss still fails.
    pub fn try_get_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        self.try_get(None)
    }

    /// Like [`Container::try_get_instance`], for a named instance.
    ///
    /// # Errors
    ///
    /// Every failure other than a registration miss still fails.
    pub fn try_get_instance_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        self.try_get(Some(name))
    }

    /// Resolves every registered instance of `T`, in registration order.
    /// An unregistered type yields an empty vector.
    ///
    /// # Errors
    ///
    /// Fails if any individual instance fails to build.
    pub fn get_all_instances<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<Arc<T>>, ResolveError> {
        let runtime = self.snapshot()?;
        self.resolve_in(&runtime, HashMap::new(), |session| {
            session.get_all_instances::<T>()
        })
    }

    /// Starts a resolution with an explicit argument: anywhere the object
    /// graph needs a `T`, this value is used instead of building one.
    #[must_use]
    pub fn with<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> ExplicitArgs<'_> {
        ExplicitArgs {
            container: self,
            args: HashMap::new(),
        }
        .with(value)
    }

    /// Applies the setter set registered for `C` to an externally
    /// constructed object.
    ///
    /// # Errors
    ///
    /// Fails when no setter set is registered for `C` or a setter
    /// dependency fails to resolve.
    pub fn build_up<C: Send + Sync + 'static>(&self, target: &mut C) -> Result<(), ResolveError> {
        let runtime = self.snapshot()?;
        self.resolve_in(&runtime, HashMap::new(), |session| session.build_up(target))
    }

    /// Removes a tracked or scope-cached instance from this scope,
    /// disposing it if it is disposable. Returns whether anything was
    /// released.
    pub fn release<T: ?Sized + Send + Sync + 'static>(&self, instance: &Arc<T>) -> bool {
        let matches = |candidate: &SharedInstance| {
            unerase::<T>(candidate).is_some_and(|typed| Arc::ptr_eq(&typed, instance))
        };
        self.core.transients.release_matching(&matches) || self.core.scoped.eject_matching(&matches)
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    /// Applies additional registrations on top of the current
    /// configuration, swapping in a new generation. Compiled plans and
    /// remembered misses are discarded wholesale; instances already cached
    /// stay alive. Scopes created earlier keep resolving against the
    /// generation they snapshot.
    ///
    /// # Errors
    ///
    /// Fails when this scope is disposed.
    pub fn configure(&self, configure: impl FnOnce(&mut Registry)) -> Result<(), ResolveError> {
        if self.is_disposed() {
            return Err(ResolveError::Disposed);
        }
        let mut guard = self.core.runtime.write();
        let mut registry = guard.graph.base();
        configure(&mut registry);
        *guard = Arc::new(Runtime::new(registry.seal()));
        tracing::debug!(scope = self.core.id, "scope reconfigured");
        Ok(())
    }

    /// Creates a reconfigurable child scope over the current
    /// configuration. Singletons stay shared with the root.
    ///
    /// # Errors
    ///
    /// Fails when this scope is disposed.
    pub fn create_child_container(&self) -> Result<Self, ResolveError> {
        let runtime = self.snapshot()?;
        Ok(self.spawn(ScopeRole::Child, runtime))
    }

    /// Creates a short-lived nested scope sharing the current
    /// configuration, with its own scoped-instance cache.
    ///
    /// # Errors
    ///
    /// Fails when this scope is disposed.
    pub fn nested_container(&self) -> Result<Self, ResolveError> {
        let runtime = self.snapshot()?;
        Ok(self.spawn(ScopeRole::Nested, runtime))
    }

    /// Materializes the named profile: a child scope running the base
    /// configuration plus the profile's overrides.
    ///
    /// # Errors
    ///
    /// Fails when the profile was never declared or this scope is
    /// disposed.
    pub fn profile(&self, name: &'static str) -> Result<Self, ResolveError> {
        let runtime = self.snapshot()?;
        let Some(overrides) = runtime.graph.profile_fn(name) else {
            return Err(ResolveError::Configuration {
                key: name.to_string(),
                issue: "no such profile is declared".to_string(),
            });
        };
        let mut registry = runtime.graph.base();
        overrides(&mut registry);
        Ok(self.spawn(
            ScopeRole::Profile(name),
            Arc::new(Runtime::new(registry.seal())),
        ))
    }

    /// Disposes this scope and every scope created from it: tracked
    /// transients first (newest-first), then scoped instances, then (for
    /// the root) singletons. All later resolution fails with
    /// [`ResolveError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    // ─── Diagnostics ────────────────────────────────────────────────────────

    /// Eagerly compiles a plan for every registration and reports every
    /// failure at once, together with seal-time configuration issues.
    ///
    /// # Errors
    ///
    /// Returns the aggregate report when anything is invalid.
    pub fn assert_configuration_is_valid(&self) -> Result<(), ValidationReport> {
        let Ok(runtime) = self.snapshot() else {
            return Err(ValidationReport::new(vec![
                "container has been disposed".to_string(),
            ]));
        };
        let mut failures: Vec<String> = runtime
            .graph
            .report()
            .issues()
            .iter()
            .map(ToString::to_string)
            .collect();
        for descriptor in runtime.graph.all_descriptors() {
            let mut planner = Planner::new(&runtime.graph, &runtime.plans);
            if let Err(err) = planner.plan_descriptor(&descriptor, descriptor.service_key()) {
                failures.push(format!("{}: {err}", descriptor.label()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport::new(failures))
        }
    }

    /// A row per registration describing what this scope would resolve:
    /// service type, instance name, lifecycle, concrete type, and default
    /// status.
    ///
    /// # Errors
    ///
    /// Fails when this scope is disposed.
    pub fn model(&self) -> Result<Vec<DescriptorInfo>, ResolveError> {
        let runtime = self.snapshot()?;
        Ok(runtime
            .graph
            .all_descriptors()
            .iter()
            .map(|descriptor| DescriptorInfo {
                service_type: descriptor.service_key().type_name(),
                instance_name: descriptor.name(),
                lifecycle: descriptor.lifecycle().label(),
                plugged_type: descriptor.plugged_type(),
                is_default: runtime.graph.is_default(descriptor),
            })
            .collect())
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn snapshot(&self) -> Result<Arc<Runtime>, ResolveError> {
        if self.is_disposed() {
            return Err(ResolveError::Disposed);
        }
        Ok(self.core.runtime.read().clone())
    }

    fn spawn(&self, role: ScopeRole, runtime: Arc<Runtime>) -> Self {
        let core = Arc::new(ScopeCore {
            id: next_scope_id(),
            role,
            runtime: RwLock::new(runtime),
            singletons: Arc::clone(&self.core.singletons),
            scoped: ObjectCache::default(),
            transients: DisposeBag::default(),
            disposed: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
        });
        self.core.children.lock().push(Arc::downgrade(&core));
        tracing::debug!(scope = core.id, parent = self.core.id, role = ?core.role, "scope created");
        Self { core }
    }

    fn resolve_in<R>(
        &self,
        runtime: &Runtime,
        explicit: HashMap<TypeId, SharedInstance>,
        resolve: impl FnOnce(&mut BuildSession<'_>) -> Result<R, ResolveError>,
    ) -> Result<R, ResolveError> {
        let mut session = BuildSession::new(
            SessionEnv {
                graph: &runtime.graph,
                plans: &runtime.plans,
                singletons: &self.core.singletons,
                scoped: &self.core.scoped,
                transients: &self.core.transients,
                scope_id: self.core.id,
                track_transients: runtime.graph.track_transients(),
            },
            explicit,
        );
        resolve(&mut session)
    }

    fn get_with_args<T: ?Sized + Send + Sync + 'static>(
        &self,
        args: HashMap<TypeId, SharedInstance>,
    ) -> Result<Arc<T>, ResolveError> {
        let runtime = self.snapshot()?;
        let shared = self.resolve_in(&runtime, args, |session| {
            session.resolve_default(ServiceKey::of::<T>())
        })?;
        typed::<T>(&shared, ServiceKey::of::<T>())
    }

    fn get_named_with_args<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
        args: HashMap<TypeId, SharedInstance>,
    ) -> Result<Arc<T>, ResolveError> {
        let runtime = self.snapshot()?;
        let shared = self.resolve_in(&runtime, args, |session| {
            session.resolve_named(ServiceKey::of::<T>(), name)
        })?;
        typed::<T>(&shared, ServiceKey::named::<T>(name))
    }

    fn try_get<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: Option<&'static str>,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        let runtime = self.snapshot()?;
        let probe = (TypeId::of::<T>(), name);
        if runtime.negatives.read().contains(&probe) {
            return Ok(None);
        }
        let resolved = self.resolve_in(&runtime, HashMap::new(), |session| match name {
            Some(name) => session.resolve_named(ServiceKey::of::<T>(), name),
            None => session.resolve_default(ServiceKey::of::<T>()),
        });
        match resolved {
            Ok(shared) => {
                let key = match name {
                    Some(name) => ServiceKey::named::<T>(name),
                    None => ServiceKey::of::<T>(),
                };
                typed::<T>(&shared, key).map(Some)
            }
            Err(miss) if miss.is_not_registered() => {
                runtime.negatives.write().insert(probe);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

/// Builder for a resolution carrying explicit arguments.
pub struct ExplicitArgs<'c> {
    container: &'c Container,
    args: HashMap<TypeId, SharedInstance>,
}

impl ExplicitArgs<'_> {
    /// Adds another explicit argument.
    #[must_use]
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.args.insert(TypeId::of::<T>(), erase(value));
        self
    }

    /// Resolves the default instance of `T` with the collected arguments
    /// in effect at every depth of the object graph.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons as [`Container::get_instance`].
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(self) -> Result<Arc<T>, ResolveError> {
        self.container.get_with_args::<T>(self.args)
    }

    /// Resolves a named instance of `T` with the collected arguments in
    /// effect.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons as [`Container::get_instance_named`].
    pub fn get_instance_named<T: ?Sized + Send + Sync + 'static>(
        self,
        name: &'static str,
    ) -> Result<Arc<T>, ResolveError> {
        self.container.get_named_with_args::<T>(name, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Ctor, Instance};

    struct Tick(u64);

    fn counter() -> Instance<Tick> {
        use core::sync::atomic::AtomicU64;
        static TICKS: AtomicU64 = AtomicU64::new(0);
        Instance::built(Ctor::new((), |()| {
            Arc::new(Tick(TICKS.fetch_add(1, Ordering::SeqCst)))
        }))
    }

    #[test]
    fn singletons_are_shared_across_scopes() {
        let container = Container::new(|registry| {
            registry.register_default(counter().singleton());
        });
        let nested = container.nested_container().unwrap();

        let root_copy = container.get_instance::<Tick>().unwrap();
        let nested_copy = nested.get_instance::<Tick>().unwrap();
        assert!(Arc::ptr_eq(&root_copy, &nested_copy));
    }

    #[test]
    fn scoped_instances_are_per_scope() {
        let container = Container::new(|registry| {
            registry.register_default(counter().scoped());
        });
        let nested = container.nested_container().unwrap();

        let root_copy = container.get_instance::<Tick>().unwrap();
        let nested_copy = nested.get_instance::<Tick>().unwrap();
        assert!(!Arc::ptr_eq(&root_copy, &nested_copy));
        assert!(Arc::ptr_eq(
            &nested_copy,
            &nested.get_instance::<Tick>().unwrap()
        ));
    }

    #[test]
    fn dispose_fails_later_resolution() {
        let container = Container::new(|registry| {
            registry.register_default(counter());
        });
        container.dispose();
        assert!(matches!(
            container.get_instance::<Tick>(),
            Err(ResolveError::Disposed)
        ));
        assert!(container.nested_container().is_err());
    }

    #[test]
    fn dispose_fails_configuration_and_introspection() {
        let container = Container::new(|registry| {
            registry.register_default(counter());
        });
        container.dispose();
        assert!(matches!(
            container.configure(|_| {}),
            Err(ResolveError::Disposed)
        ));
        assert!(matches!(container.model(), Err(ResolveError::Disposed)));
    }

    #[test]
    fn try_get_remembers_misses_until_reconfigured() {
        struct Ghost;

        let container = Container::new(|_| {});
        assert!(container.try_get_instance::<Ghost>().unwrap().is_none());
        // Second probe hits the negative cache.
        assert!(container.try_get_instance::<Ghost>().unwrap().is_none());

        container
            .configure(|registry| {
                registry.register_default::<Ghost>(Instance::value(Arc::new(Ghost)));
            })
            .unwrap();
        assert!(container.try_get_instance::<Ghost>().unwrap().is_some());
    }
}
