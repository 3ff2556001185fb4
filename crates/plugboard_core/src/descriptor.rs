//! Registration descriptors and their dependency shape.
//!
//! A [`Descriptor`] is one registered way to satisfy a [`ServiceKey`]: a
//! constant value, a factory closure, a constructed type with declared
//! dependencies, or a redirect to another registration. Descriptors are
//! created through the typed [`Instance`] builder, sealed into the instance
//! graph, and immutable afterwards.
//!
//! # Type erasure
//!
//! There is no runtime reflection; instances are stored as
//! `Arc<dyn Any + Send + Sync>` with the typed `Arc<T>` *inside* the erased
//! arc. Storing the typed arc (rather than the value) is what lets trait
//! objects work: `Arc<dyn Widget>` is itself a sized, `'static` value that
//! can round-trip through `Any`.
//!
//! # Dependency declaration
//!
//! Dependencies are declared as tuples of [`Dep`]/[`DepAll`] values. Each
//! carries exactly one resolution strategy (a literal, an inline child
//! descriptor, a named reference, "all registered", or "auto-resolve the
//! graph default") plus an optional language-level default that makes the
//! dependency optional. The tuple plumbing mirrors how system parameters
//! are assembled elsewhere in this workspace: a per-element trait and an
//! `all_tuples!`-generated tuple impl.

use core::any::{Any, TypeId};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use variadics_please::all_tuples;

use crate::error::BuildError;
use crate::intercept::Interceptor;
use crate::key::ServiceKey;
use crate::lifecycle::{Dispose, DisposeFn, Lifecycle};
use crate::session::BuildSession;

// ─────────────────────────────────────────────────────────────────────────────
// Erased instances
// ─────────────────────────────────────────────────────────────────────────────

/// A type-erased, shared, thread-safe instance.
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

/// Erases a typed instance for storage in caches and build plans.
pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> SharedInstance {
    Arc::new(value)
}

/// Recovers the typed instance, or `None` on a type mismatch.
pub(crate) fn unerase<T: ?Sized + Send + Sync + 'static>(shared: &SharedInstance) -> Option<Arc<T>> {
    shared.downcast_ref::<Arc<T>>().cloned()
}

/// Unique identity of a descriptor, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(u64);

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

impl DescriptorId {
    fn next() -> Self {
        Self(NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved values and assembly failures
// ─────────────────────────────────────────────────────────────────────────────

/// The value a single build step produced: one instance, or all registered
/// instances for a collection dependency.
#[derive(Clone)]
pub enum Resolved {
    /// One instance.
    One(SharedInstance),
    /// All registered instances, in registration order.
    Many(Vec<SharedInstance>),
}

/// A failure inside a construction closure, before resolution context is
/// attached.
#[derive(Debug)]
pub enum AssembleFailure {
    /// A resolved value was not the declared parameter type.
    Mismatch {
        /// The type the parameter declared.
        expected: &'static str,
    },
    /// Step count and parameter count disagreed; indicates a plan bug.
    Arity,
    /// User construction code returned an error.
    Failed(BuildError),
}

impl From<BuildError> for AssembleFailure {
    fn from(err: BuildError) -> Self {
        Self::Failed(err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency specs
// ─────────────────────────────────────────────────────────────────────────────

/// The single resolution strategy a dependency carries.
#[derive(Clone)]
pub(crate) enum DependencyKind {
    /// A literal value, embedded as a constant build step.
    Value(SharedInstance),
    /// An inline child descriptor, resolved recursively.
    Child(Descriptor),
    /// A named reference into the dependency's family.
    Named(&'static str),
    /// All registered descriptors for the element type, registration order.
    All,
    /// The family default, or a synthesized auto-wired descriptor.
    Auto,
}

/// One constructor parameter or settable property of a descriptor.
#[derive(Clone)]
pub struct DependencySpec {
    pub(crate) key: ServiceKey,
    pub(crate) kind: DependencyKind,
    pub(crate) param: &'static str,
    pub(crate) default: Option<Arc<dyn Fn() -> SharedInstance + Send + Sync>>,
}

impl DependencySpec {
    /// The abstraction this dependency resolves.
    #[must_use]
    pub fn service_type(&self) -> &'static str {
        self.key.type_name()
    }

    /// The declared parameter name.
    #[must_use]
    pub fn param_name(&self) -> &'static str {
        self.param
    }

    /// Whether the dependency carries a language-level default.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// Typed declaration of a single-valued dependency on `A`.
///
/// # Example
///
/// ```ignore
/// Ctor::new(
///     (Dep::<dyn Color>::auto(), Dep::<Title>::named("main").param("title")),
///     |(color, title)| Arc::new(AWidget { color, title }) as Arc<dyn Widget>,
/// )
/// ```
pub struct Dep<A: ?Sized> {
    spec: DependencySpec,
    _marker: PhantomData<fn() -> A>,
}

impl<A: ?Sized + Send + Sync + 'static> Dep<A> {
    fn with_kind(kind: DependencyKind) -> Self {
        Self {
            spec: DependencySpec {
                key: ServiceKey::of::<A>(),
                kind,
                param: core::any::type_name::<A>(),
                default: None,
            },
            _marker: PhantomData,
        }
    }

    /// Resolve from the instance graph default (or the auto-wire table).
    #[must_use]
    pub fn auto() -> Self {
        Self::with_kind(DependencyKind::Auto)
    }

    /// Resolve the instance registered under `name`.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self::with_kind(DependencyKind::Named(name))
    }

    /// Embed a literal value.
    #[must_use]
    pub fn value(value: Arc<A>) -> Self {
        Self::with_kind(DependencyKind::Value(erase(value)))
    }

    /// Resolve an inline descriptor private to this dependency.
    #[must_use]
    pub fn child(instance: Instance<A>) -> Self {
        Self::with_kind(DependencyKind::Child(instance.descriptor()))
    }

    /// Names the parameter for diagnostics; defaults to the type name.
    #[must_use]
    pub fn param(mut self, name: &'static str) -> Self {
        self.spec.param = name;
        self
    }

    /// Makes the dependency optional with a language-level default.
    ///
    /// A defaulted parameter is never a cause of an unresolvable-dependency
    /// error, even with no registration for its type.
    #[must_use]
    pub fn or(mut self, default: impl Fn() -> Arc<A> + Send + Sync + 'static) -> Self {
        self.spec.default = Some(Arc::new(move || erase(default())));
        self
    }
}

/// Typed declaration of a collection dependency: all registered instances
/// of `A`, in registration order.
pub struct DepAll<A: ?Sized> {
    spec: DependencySpec,
    _marker: PhantomData<fn() -> A>,
}

impl<A: ?Sized + Send + Sync + 'static> DepAll<A> {
    /// Declares the collection dependency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: DependencySpec {
                key: ServiceKey::of::<A>(),
                kind: DependencyKind::All,
                param: core::any::type_name::<A>(),
                default: None,
            },
            _marker: PhantomData,
        }
    }

    /// Names the parameter for diagnostics; defaults to the element type name.
    #[must_use]
    pub fn param(mut self, name: &'static str) -> Self {
        self.spec.param = name;
        self
    }
}

impl<A: ?Sized + Send + Sync + 'static> Default for DepAll<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// One element of a dependency tuple: its runtime spec plus the typed
/// extraction of its resolved value.
pub trait DepParam {
    /// The typed value handed to the construction closure.
    type Value;

    /// Consumes the declaration into its runtime spec.
    fn spec(self) -> DependencySpec;

    /// Recovers the typed value from a resolved build step.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleFailure::Mismatch`] if the step's value is not the
    /// declared type.
    fn extract(resolved: &Resolved) -> Result<Self::Value, AssembleFailure>;
}

impl<A: ?Sized + Send + Sync + 'static> DepParam for Dep<A> {
    type Value = Arc<A>;

    fn spec(self) -> DependencySpec {
        self.spec
    }

    fn extract(resolved: &Resolved) -> Result<Self::Value, AssembleFailure> {
        match resolved {
            Resolved::One(shared) => unerase::<A>(shared).ok_or(AssembleFailure::Mismatch {
                expected: core::any::type_name::<A>(),
            }),
            Resolved::Many(_) => Err(AssembleFailure::Mismatch {
                expected: core::any::type_name::<A>(),
            }),
        }
    }
}

impl<A: ?Sized + Send + Sync + 'static> DepParam for DepAll<A> {
    type Value = Vec<Arc<A>>;

    fn spec(self) -> DependencySpec {
        self.spec
    }

    fn extract(resolved: &Resolved) -> Result<Self::Value, AssembleFailure> {
        match resolved {
            Resolved::Many(all) => all
                .iter()
                .map(|shared| {
                    unerase::<A>(shared).ok_or(AssembleFailure::Mismatch {
                        expected: core::any::type_name::<A>(),
                    })
                })
                .collect(),
            Resolved::One(_) => Err(AssembleFailure::Mismatch {
                expected: core::any::type_name::<A>(),
            }),
        }
    }
}

/// A tuple of [`DepParam`] declarations forming a constructor's parameter
/// list.
pub trait DepTuple {
    /// The typed tuple of values handed to the construction closure.
    type Values;

    /// Consumes the declarations into ordered runtime specs.
    fn into_specs(self) -> Vec<DependencySpec>;

    /// Recovers the typed values from the resolved build steps, in order.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleFailure`] on a type or arity mismatch.
    fn extract(resolved: &[Resolved]) -> Result<Self::Values, AssembleFailure>;
}

impl DepTuple for () {
    type Values = ();

    fn into_specs(self) -> Vec<DependencySpec> {
        Vec::new()
    }

    fn extract(_resolved: &[Resolved]) -> Result<Self::Values, AssembleFailure> {
        Ok(())
    }
}

macro_rules! impl_dep_tuple {
    ($($D:ident),*) => {
        impl<$($D: DepParam),*> DepTuple for ($($D,)*) {
            type Values = ($($D::Value,)*);

            #[expect(non_snake_case, reason = "macro binds tuple fields by type ident")]
            fn into_specs(self) -> Vec<DependencySpec> {
                let ($($D,)*) = self;
                vec![$($D.spec(),)*]
            }

            fn extract(resolved: &[Resolved]) -> Result<Self::Values, AssembleFailure> {
                let mut steps = resolved.iter();
                Ok(($(
                    $D::extract(steps.next().ok_or(AssembleFailure::Arity)?)?,
                )*))
            }
        }
    };
}

// Generate impls for parameter lists of size 1 to 8
all_tuples!(impl_dep_tuple, 1, 8, D);

// ─────────────────────────────────────────────────────────────────────────────
// Setters
// ─────────────────────────────────────────────────────────────────────────────

type SetterApply<C> = Arc<dyn Fn(&mut C, &Resolved) -> Result<(), AssembleFailure> + Send + Sync>;

/// The settable-property dependencies of a concrete type `C`.
///
/// Registered on the `Registry` and used two ways: applied after the
/// construction step of a constructor created with [`Ctor::with_setters`],
/// and standalone through `Container::build_up` against an
/// already-constructed object.
pub struct SetterSet<C> {
    setters: Vec<(DependencySpec, SetterApply<C>)>,
}

impl<C: Send + Sync + 'static> SetterSet<C> {
    /// Creates an empty setter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            setters: Vec::new(),
        }
    }

    /// Adds one settable dependency and the closure that applies it.
    #[must_use]
    pub fn set<P: DepParam>(
        mut self,
        dep: P,
        apply: impl Fn(&mut C, P::Value) + Send + Sync + 'static,
    ) -> Self {
        let spec = dep.spec();
        self.setters.push((
            spec,
            Arc::new(move |target, resolved| {
                apply(target, P::extract(resolved)?);
                Ok(())
            }),
        ));
        self
    }

    pub(crate) fn erase(self) -> ErasedSetterSet {
        let specs = self.setters.iter().map(|(spec, _)| spec.clone()).collect();
        let appliers: Vec<SetterApply<C>> =
            self.setters.into_iter().map(|(_, apply)| apply).collect();
        ErasedSetterSet {
            target: TypeId::of::<C>(),
            target_name: core::any::type_name::<C>(),
            specs,
            apply: Arc::new(move |target, values| {
                let typed = target
                    .downcast_mut::<C>()
                    .ok_or(AssembleFailure::Mismatch {
                        expected: core::any::type_name::<C>(),
                    })?;
                for (applier, value) in appliers.iter().zip(values) {
                    applier(typed, value)?;
                }
                Ok(())
            }),
        }
    }
}

impl<C: Send + Sync + 'static> Default for SetterSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased setter set, stored in the instance graph keyed by the
/// concrete target type.
#[derive(Clone)]
pub(crate) struct ErasedSetterSet {
    pub(crate) target: TypeId,
    pub(crate) target_name: &'static str,
    pub(crate) specs: Vec<DependencySpec>,
    apply: Arc<dyn Fn(&mut dyn Any, &[Resolved]) -> Result<(), AssembleFailure> + Send + Sync>,
}

impl ErasedSetterSet {
    pub(crate) fn apply(
        &self,
        target: &mut dyn Any,
        values: &[Resolved],
    ) -> Result<(), AssembleFailure> {
        (self.apply)(target, values)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Constructors
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct AssembleArgs<'a> {
    pub(crate) values: &'a [Resolved],
    pub(crate) setters: Option<(&'a ErasedSetterSet, &'a [Resolved])>,
}

pub(crate) type AssembleFn =
    Arc<dyn Fn(AssembleArgs<'_>) -> Result<SharedInstance, AssembleFailure> + Send + Sync>;

/// One candidate constructor for a constructed descriptor: an ordered
/// parameter list plus the closure assembling the instance.
pub struct Ctor<T: ?Sized> {
    pub(crate) params: Vec<DependencySpec>,
    pub(crate) assemble: AssembleFn,
    pub(crate) designated: bool,
    pub(crate) setter_target: Option<(TypeId, &'static str)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> Ctor<T> {
    /// An infallible constructor.
    pub fn new<D, F>(deps: D, build: F) -> Self
    where
        D: DepTuple + 'static,
        F: Fn(D::Values) -> Arc<T> + Send + Sync + 'static,
    {
        Self::try_new(deps, move |values| Ok(build(values)))
    }

    /// A fallible constructor; its error becomes the cause of a
    /// build-execution failure.
    pub fn try_new<D, F>(deps: D, build: F) -> Self
    where
        D: DepTuple + 'static,
        F: Fn(D::Values) -> Result<Arc<T>, BuildError> + Send + Sync + 'static,
    {
        let params = deps.into_specs();
        let assemble: AssembleFn = Arc::new(move |args: AssembleArgs<'_>| {
            let values = D::extract(args.values)?;
            Ok(erase(build(values)?))
        });
        Self {
            params,
            assemble,
            designated: false,
            setter_target: None,
            _marker: PhantomData,
        }
    }

    /// A constructor that builds the concrete type `C`, applies the setter
    /// set registered for `C` (if any), then lifts into the abstraction.
    pub fn with_setters<C, D, F, G>(deps: D, build: F, finish: G) -> Self
    where
        C: Send + Sync + 'static,
        D: DepTuple + 'static,
        F: Fn(D::Values) -> C + Send + Sync + 'static,
        G: Fn(C) -> Arc<T> + Send + Sync + 'static,
    {
        let params = deps.into_specs();
        let assemble: AssembleFn = Arc::new(move |args: AssembleArgs<'_>| {
            let values = D::extract(args.values)?;
            let mut concrete = build(values);
            if let Some((set, setter_values)) = args.setters {
                set.apply(&mut concrete, setter_values)?;
            }
            Ok(erase(finish(concrete)))
        });
        Self {
            params,
            assemble,
            designated: false,
            setter_target: Some((TypeId::of::<C>(), core::any::type_name::<C>())),
            _marker: PhantomData,
        }
    }

    /// Marks this as the explicitly designated constructor, taking
    /// precedence over selection policies and the greediest-resolvable rule.
    #[must_use]
    pub fn designated(mut self) -> Self {
        self.designated = true;
        self
    }
}

/// Erased candidate constructor stored on a descriptor.
#[derive(Clone)]
pub(crate) struct ErasedCtor {
    pub(crate) params: Vec<DependencySpec>,
    pub(crate) assemble: AssembleFn,
    pub(crate) designated: bool,
    pub(crate) setter_target: Option<(TypeId, &'static str)>,
}

impl<T: ?Sized> Ctor<T> {
    fn erase(self) -> ErasedCtor {
        ErasedCtor {
            params: self.params,
            assemble: self.assemble,
            designated: self.designated,
            setter_target: self.setter_target,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance builder and sealed descriptor
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) type FactoryFn =
    Arc<dyn Fn(&mut BuildSession<'_>) -> Result<SharedInstance, AssembleFailure> + Send + Sync>;

pub(crate) enum DescriptorKind {
    Constant(SharedInstance),
    Factory(FactoryFn),
    Constructed { ctors: Vec<ErasedCtor> },
    Redirect(ServiceKey),
}

/// Typed builder for one registration of the abstraction `T`.
///
/// # Example
///
/// ```ignore
/// registry.register_default::<dyn Widget>(
///     Instance::built(Ctor::new((Dep::<dyn Color>::auto(),), |(color,)| {
///         Arc::new(AWidget { color }) as Arc<dyn Widget>
///     }))
///     .plugged::<AWidget>()
///     .singleton(),
/// );
/// ```
pub struct Instance<T: ?Sized> {
    name: Option<&'static str>,
    plugged_type: Option<&'static str>,
    lifecycle: Lifecycle,
    kind: DescriptorKind,
    interceptors: Vec<Interceptor>,
    disposer: Option<DisposeFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> Instance<T> {
    fn with_kind(kind: DescriptorKind) -> Self {
        Self {
            name: None,
            plugged_type: None,
            lifecycle: Lifecycle::Transient,
            kind,
            interceptors: Vec::new(),
            disposer: None,
            _marker: PhantomData,
        }
    }

    /// A constant instance; every resolution returns this value.
    #[must_use]
    pub fn value(value: Arc<T>) -> Self {
        Self::with_kind(DescriptorKind::Constant(erase(value)))
    }

    /// An infallible factory closure with access to the build session.
    pub fn factory(f: impl Fn(&mut BuildSession<'_>) -> Arc<T> + Send + Sync + 'static) -> Self {
        Self::with_kind(DescriptorKind::Factory(Arc::new(move |session| {
            Ok(erase(f(session)))
        })))
    }

    /// A fallible factory closure; its error becomes the cause of a
    /// build-execution failure.
    pub fn try_factory(
        f: impl Fn(&mut BuildSession<'_>) -> Result<Arc<T>, BuildError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_kind(DescriptorKind::Factory(Arc::new(move |session| {
            Ok(erase(f(session)?))
        })))
    }

    /// A constructed instance with declared dependencies.
    #[must_use]
    pub fn built(ctor: Ctor<T>) -> Self {
        let plugged = ctor.setter_target.map(|(_, name)| name);
        let mut instance = Self::with_kind(DescriptorKind::Constructed {
            ctors: vec![ctor.erase()],
        });
        instance.plugged_type = plugged;
        instance
    }

    /// Adds a candidate constructor; selection follows the designated
    /// mark, the registry's selection policy, then greediest-resolvable.
    ///
    /// # Panics
    ///
    /// Panics if this instance was not created with [`Instance::built`].
    #[must_use]
    pub fn alternate(mut self, ctor: Ctor<T>) -> Self {
        match &mut self.kind {
            DescriptorKind::Constructed { ctors } => ctors.push(ctor.erase()),
            _ => panic!("alternate constructors only apply to constructed instances"),
        }
        self
    }

    /// A delegation to another registration, resolved at execution time.
    #[must_use]
    pub fn redirect(key: ServiceKey) -> Self {
        Self::with_kind(DescriptorKind::Redirect(key))
    }

    /// Names this instance for `get_instance_named` lookups.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Records the concrete type for diagnostics and interception
    /// predicates.
    #[must_use]
    pub fn plugged<C: 'static>(mut self) -> Self {
        self.plugged_type = Some(core::any::type_name::<C>());
        self
    }

    /// Assigns the lifecycle; the default is [`Lifecycle::Transient`].
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// One instance at the root scope, shared by all descendant scopes.
    #[must_use]
    pub fn singleton(self) -> Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    /// One instance per container scope (root, child, and nested each get
    /// their own).
    #[must_use]
    pub fn scoped(self) -> Self {
        self.lifecycle(Lifecycle::Scoped)
    }

    /// A fresh instance per resolution, exempt even from per-request
    /// sharing.
    #[must_use]
    pub fn unique(self) -> Self {
        self.lifecycle(Lifecycle::AlwaysUnique)
    }

    /// One instance per thread.
    #[must_use]
    pub fn thread_local(self) -> Self {
        self.lifecycle(Lifecycle::ThreadLocal)
    }

    /// Appends an interception step, run in configured order after
    /// construction.
    #[must_use]
    pub fn intercept(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Marks built instances as disposable: they are disposed when their
    /// owning cache slot is ejected or their owning scope is disposed.
    #[must_use]
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.disposer = Some(Arc::new(|shared: &SharedInstance| {
            if let Some(typed) = unerase::<T>(shared) {
                typed.dispose();
            }
        }));
        self
    }

    /// Seals the builder into an immutable descriptor keyed by `T`.
    #[must_use]
    pub fn descriptor(self) -> Descriptor {
        let key = match self.name {
            Some(name) => ServiceKey::named::<T>(name),
            None => ServiceKey::of::<T>(),
        };
        Descriptor {
            inner: Arc::new(DescriptorInner {
                id: DescriptorId::next(),
                key,
                plugged_type: self.plugged_type,
                lifecycle: self.lifecycle,
                kind: self.kind,
                interceptors: self.interceptors,
                disposer: self.disposer,
            }),
        }
    }
}

pub(crate) struct DescriptorInner {
    pub(crate) id: DescriptorId,
    pub(crate) key: ServiceKey,
    pub(crate) plugged_type: Option<&'static str>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) kind: DescriptorKind,
    pub(crate) interceptors: Vec<Interceptor>,
    pub(crate) disposer: Option<DisposeFn>,
}

/// One sealed registration: immutable, cheaply clonable, owned by the
/// instance graph.
#[derive(Clone)]
pub struct Descriptor {
    pub(crate) inner: Arc<DescriptorInner>,
}

impl Descriptor {
    /// The descriptor's unique identity.
    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.inner.id
    }

    /// The abstraction this descriptor was registered for.
    #[must_use]
    pub fn service_key(&self) -> ServiceKey {
        self.inner.key
    }

    /// The instance name, or `None` for an unnamed registration.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.inner.key.name()
    }

    /// The concrete type satisfying the abstraction, when known.
    /// `None` for constants, factories, and redirects.
    #[must_use]
    pub fn plugged_type(&self) -> Option<&'static str> {
        self.inner.plugged_type
    }

    /// The assigned lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Human-readable label used in diagnostics and error paths.
    #[must_use]
    pub fn label(&self) -> String {
        match self.inner.plugged_type {
            Some(plugged) => format!("{plugged} ({})", self.inner.key),
            None => self.inner.key.to_string(),
        }
    }
}

impl core::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("plugged_type", &self.inner.plugged_type)
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}
