//! Per-request build sessions.
//!
//! A [`BuildSession`] is created for one resolution request and dropped
//! when it finishes. It carries the request-scoped state plans cannot:
//! the explicit-argument table, the per-request transient memo (one copy
//! of a transient per object graph), and the runtime build stack used for
//! factory context and re-entrancy detection.
//!
//! Factories receive `&mut BuildSession` and may resolve further services
//! through it; those nested resolutions share the same request state.

use core::any::{Any, TypeId};
use std::sync::Arc;

use hashbrown::HashMap;

use crate::descriptor::{
    AssembleArgs, AssembleFailure, DescriptorId, Resolved, SharedInstance, unerase,
};
use crate::error::ResolveError;
use crate::graph::InstanceGraph;
use crate::key::ServiceKey;
use crate::lifecycle::{
    DisposeBag, Lifecycle, ObjectCache, store_thread_instance, thread_instance,
};
use crate::plan::{BuildPlan, PlanAction, PlanCache, Planner, Step};

/// Borrowed view of the scope a session resolves against.
#[derive(Clone, Copy)]
pub(crate) struct SessionEnv<'s> {
    pub(crate) graph: &'s InstanceGraph,
    pub(crate) plans: &'s PlanCache,
    pub(crate) singletons: &'s ObjectCache,
    pub(crate) scoped: &'s ObjectCache,
    pub(crate) transients: &'s DisposeBag,
    pub(crate) scope_id: u64,
    pub(crate) track_transients: bool,
}

struct Frame {
    id: DescriptorId,
    service_type: &'static str,
    label: String,
}

/// The state of one resolution request.
pub struct BuildSession<'s> {
    env: SessionEnv<'s>,
    explicit: HashMap<TypeId, SharedInstance>,
    memo: HashMap<DescriptorId, SharedInstance>,
    stack: Vec<Frame>,
}

impl<'s> BuildSession<'s> {
    pub(crate) fn new(env: SessionEnv<'s>, explicit: HashMap<TypeId, SharedInstance>) -> Self {
        Self {
            env,
            explicit,
            memo: HashMap::new(),
            stack: Vec::new(),
        }
    }

    // ─── Factory context ────────────────────────────────────────────────────

    /// The service type currently being built, when inside a build.
    #[must_use]
    pub fn requested_type(&self) -> Option<&'static str> {
        self.stack.last().map(|frame| frame.service_type)
    }

    /// The service type of the immediate dependent, when one exists.
    #[must_use]
    pub fn parent_type(&self) -> Option<&'static str> {
        self.stack
            .len()
            .checked_sub(2)
            .and_then(|index| self.stack.get(index))
            .map(|frame| frame.service_type)
    }

    /// The service type the request started from.
    #[must_use]
    pub fn root_type(&self) -> Option<&'static str> {
        self.stack.first().map(|frame| frame.service_type)
    }

    /// Resolves the default instance of `T` within this request.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons a container-level resolution would.
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(
        &mut self,
    ) -> Result<Arc<T>, ResolveError> {
        let shared = self.resolve_default(ServiceKey::of::<T>())?;
        typed::<T>(&shared, ServiceKey::of::<T>())
    }

    /// Resolves the instance of `T` registered under `name` within this
    /// request.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons a container-level resolution would.
    pub fn get_instance_named<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &'static str,
    ) -> Result<Arc<T>, ResolveError> {
        let shared = self.resolve_named(ServiceKey::of::<T>(), name)?;
        typed::<T>(&shared, ServiceKey::named::<T>(name))
    }

    /// Resolves every registered instance of `T` within this request, in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Fails if any individual instance fails to build.
    pub fn get_all_instances<T: ?Sized + Send + Sync + 'static>(
        &mut self,
    ) -> Result<Vec<Arc<T>>, ResolveError> {
        let key = ServiceKey::of::<T>();
        self.resolve_all(key)?
            .iter()
            .map(|shared| typed::<T>(shared, key))
            .collect()
    }

    // ─── Request entry points ───────────────────────────────────────────────

    pub(crate) fn resolve_default(
        &mut self,
        key: ServiceKey,
    ) -> Result<SharedInstance, ResolveError> {
        if let Some(value) = self.explicit.get(&key.type_id()) {
            return Ok(value.clone());
        }
        let plan = Planner::new(self.env.graph, self.env.plans).plan_default(key)?;
        self.execute(&plan)
    }

    pub(crate) fn resolve_named(
        &mut self,
        key: ServiceKey,
        name: &'static str,
    ) -> Result<SharedInstance, ResolveError> {
        if let Some(value) = self.explicit.get(&key.type_id()) {
            return Ok(value.clone());
        }
        let plan = Planner::new(self.env.graph, self.env.plans).plan_named(key, name)?;
        self.execute(&plan)
    }

    pub(crate) fn resolve_all(
        &mut self,
        key: ServiceKey,
    ) -> Result<Vec<SharedInstance>, ResolveError> {
        let plans = Planner::new(self.env.graph, self.env.plans).plan_all(key)?;
        plans.iter().map(|plan| self.execute(plan)).collect()
    }

    /// Applies the setter set registered for `C` to an externally
    /// constructed target.
    pub(crate) fn build_up<C: Send + Sync + 'static>(
        &mut self,
        target: &mut C,
    ) -> Result<(), ResolveError> {
        let Some(set) = self.env.graph.setters_for(TypeId::of::<C>()) else {
            return Err(ResolveError::Configuration {
                key: core::any::type_name::<C>().to_string(),
                issue: "no setter set is registered for this type".to_string(),
            });
        };
        let set = set.clone();
        let steps = Planner::new(self.env.graph, self.env.plans).plan_setters(&set)?;
        let values = self.eval_steps(&steps)?;
        set.apply(target as &mut dyn Any, &values)
            .map_err(|failure| self.map_failure(failure, set.target_name.to_string()))
    }

    // ─── Execution ──────────────────────────────────────────────────────────

    /// Produces the instance for one plan, dispatching on the descriptor's
    /// lifecycle.
    pub(crate) fn execute(&mut self, plan: &Arc<BuildPlan>) -> Result<SharedInstance, ResolveError> {
        let descriptor = &plan.descriptor;
        if let Some(value) = self.explicit.get(&descriptor.service_key().type_id()) {
            return Ok(value.clone());
        }

        // Factories can re-enter resolution at runtime in ways planning
        // cannot see; a descriptor already on the build stack is a cycle.
        if let Some(start) = self
            .stack
            .iter()
            .position(|frame| frame.id == descriptor.id())
        {
            let mut members: Vec<String> = self.stack[start..]
                .iter()
                .map(|frame| frame.label.clone())
                .collect();
            members.push(descriptor.label());
            return Err(ResolveError::Cycle { members });
        }

        let id = descriptor.id();
        let disposer = descriptor.inner.disposer.clone();
        match descriptor.lifecycle() {
            Lifecycle::Transient => {
                if let Some(shared) = self.memo.get(&id) {
                    return Ok(shared.clone());
                }
                let built = self.build(plan)?;
                self.memo.insert(id, built.clone());
                if self.env.track_transients {
                    self.env.transients.track(built.clone(), disposer);
                }
                Ok(built)
            }
            Lifecycle::Singleton => {
                let cache = self.env.singletons;
                cache.get_or_build(id, disposer, &mut || self.build(plan))
            }
            Lifecycle::Scoped => {
                let cache = self.env.scoped;
                cache.get_or_build(id, disposer, &mut || self.build(plan))
            }
            Lifecycle::ThreadLocal => {
                if let Some(shared) = thread_instance(self.env.scope_id, id) {
                    return Ok(shared);
                }
                let built = self.build(plan)?;
                store_thread_instance(self.env.scope_id, id, built.clone());
                Ok(built)
            }
            Lifecycle::AlwaysUnique => {
                let built = self.build(plan)?;
                if self.env.track_transients {
                    self.env.transients.track(built.clone(), disposer);
                }
                Ok(built)
            }
            Lifecycle::Custom(policy) => {
                let policy = Arc::clone(policy);
                policy.resolve(descriptor, &mut || self.build(plan))
            }
        }
    }

    fn build(&mut self, plan: &BuildPlan) -> Result<SharedInstance, ResolveError> {
        self.stack.push(Frame {
            id: plan.descriptor.id(),
            service_type: plan.descriptor.service_key().type_name(),
            label: plan.descriptor.label(),
        });
        let built = self.build_frame(plan);
        self.stack.pop();
        built
    }

    fn build_frame(&mut self, plan: &BuildPlan) -> Result<SharedInstance, ResolveError> {
        let raw = match &plan.action {
            PlanAction::Constant(value) => value.clone(),
            PlanAction::Redirect(inner) => self.execute(inner)?,
            PlanAction::Factory(factory) => {
                let produced = factory(self);
                produced.map_err(|failure| {
                    self.map_failure(failure, plan.descriptor.label())
                })?
            }
            PlanAction::Construct {
                args,
                setters,
                assemble,
            } => {
                let values = self.eval_steps(args)?;
                let setter_values = match setters {
                    Some((set, steps)) => Some((set, self.eval_steps(steps)?)),
                    None => None,
                };
                let assembled = assemble(AssembleArgs {
                    values: &values,
                    setters: setter_values
                        .as_ref()
                        .map(|(set, values)| (*set, values.as_slice())),
                });
                assembled.map_err(|failure| {
                    self.map_failure(failure, plan.descriptor.label())
                })?
            }
        };

        let mut instance = raw;
        for interceptor in &plan.interceptors {
            instance = interceptor.apply(instance);
        }
        tracing::trace!(descriptor = %plan.descriptor.label(), "built instance");
        Ok(instance)
    }

    fn eval_steps(&mut self, steps: &[Step]) -> Result<Vec<Resolved>, ResolveError> {
        steps
            .iter()
            .map(|step| match step {
                Step::Constant(value) => Ok(Resolved::One(value.clone())),
                Step::DefaultValue(default) => Ok(Resolved::One(default())),
                Step::Plan(plan) => self.execute(plan).map(Resolved::One),
                Step::Collection(plans) => plans
                    .iter()
                    .map(|plan| self.execute(plan))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Resolved::Many),
            })
            .collect()
    }

    fn map_failure(&self, failure: AssembleFailure, descriptor: String) -> ResolveError {
        match failure {
            AssembleFailure::Mismatch { expected } => ResolveError::TypeMismatch {
                key: descriptor,
                expected,
            },
            AssembleFailure::Arity => ResolveError::BuildFailed {
                descriptor,
                depth: self.stack.len(),
                source: "constructor argument count mismatch".into(),
            },
            AssembleFailure::Failed(source) => ResolveError::BuildFailed {
                descriptor,
                depth: self.stack.len(),
                source,
            },
        }
    }
}

pub(crate) fn typed<T: ?Sized + Send + Sync + 'static>(
    shared: &SharedInstance,
    key: ServiceKey,
) -> Result<Arc<T>, ResolveError> {
    unerase::<T>(shared).ok_or_else(|| ResolveError::TypeMismatch {
        key: key.to_string(),
        expected: core::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Ctor, Dep, Instance, erase};
    use crate::graph::Registry;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Scaffold {
        graph: InstanceGraph,
        plans: PlanCache,
        singletons: ObjectCache,
        scoped: ObjectCache,
        transients: DisposeBag,
        track: bool,
    }

    impl Scaffold {
        fn new(registry: Registry) -> Self {
            let graph = registry.seal();
            let track = graph.track_transients();
            Self {
                graph,
                plans: PlanCache::default(),
                singletons: ObjectCache::default(),
                scoped: ObjectCache::default(),
                transients: DisposeBag::default(),
                track,
            }
        }

        fn session(&self) -> BuildSession<'_> {
            BuildSession::new(
                SessionEnv {
                    graph: &self.graph,
                    plans: &self.plans,
                    singletons: &self.singletons,
                    scoped: &self.scoped,
                    transients: &self.transients,
                    scope_id: 1,
                    track_transients: self.track,
                },
                HashMap::new(),
            )
        }
    }

    struct Leaf(usize);
    struct Pair {
        left: Arc<Leaf>,
        right: Arc<Leaf>,
    }

    static LEAVES: AtomicUsize = AtomicUsize::new(0);

    fn counting_leaf() -> Instance<Leaf> {
        Instance::built(Ctor::new((), |()| {
            Arc::new(Leaf(LEAVES.fetch_add(1, Ordering::SeqCst)))
        }))
    }

    #[test]
    fn transients_are_shared_within_one_request() {
        let mut registry = Registry::new();
        registry.register_default(counting_leaf());
        registry.register_default::<Pair>(Instance::built(Ctor::new(
            (Dep::<Leaf>::auto(), Dep::<Leaf>::auto()),
            |(left, right)| Arc::new(Pair { left, right }),
        )));
        let scaffold = Scaffold::new(registry);

        let pair = scaffold.session().get_instance::<Pair>().unwrap();
        assert!(Arc::ptr_eq(&pair.left, &pair.right));

        let again = scaffold.session().get_instance::<Pair>().unwrap();
        assert!(!Arc::ptr_eq(&pair.left, &again.left));
    }

    #[test]
    fn always_unique_is_fresh_even_within_a_request() {
        let mut registry = Registry::new();
        registry.register_default(counting_leaf().unique());
        registry.register_default::<Pair>(Instance::built(Ctor::new(
            (Dep::<Leaf>::auto(), Dep::<Leaf>::auto()),
            |(left, right)| Arc::new(Pair { left, right }),
        )));
        let scaffold = Scaffold::new(registry);

        let pair = scaffold.session().get_instance::<Pair>().unwrap();
        assert!(!Arc::ptr_eq(&pair.left, &pair.right));
    }

    #[test]
    fn explicit_arguments_short_circuit_every_depth() {
        let mut registry = Registry::new();
        registry.register_default(counting_leaf());
        registry.register_default::<Pair>(Instance::built(Ctor::new(
            (Dep::<Leaf>::auto(), Dep::<Leaf>::auto()),
            |(left, right)| Arc::new(Pair { left, right }),
        )));
        let scaffold = Scaffold::new(registry);

        let supplied = Arc::new(Leaf(999));
        let mut explicit = HashMap::new();
        explicit.insert(TypeId::of::<Leaf>(), erase(Arc::clone(&supplied)));

        let mut session = BuildSession::new(
            SessionEnv {
                graph: &scaffold.graph,
                plans: &scaffold.plans,
                singletons: &scaffold.singletons,
                scoped: &scaffold.scoped,
                transients: &scaffold.transients,
                scope_id: 1,
                track_transients: false,
            },
            explicit,
        );
        let pair = session.get_instance::<Pair>().unwrap();
        assert!(Arc::ptr_eq(&pair.left, &supplied));
        assert_eq!(pair.right.0, 999);
    }

    #[test]
    fn factories_observe_the_build_stack() {
        struct Probe {
            requested: Option<&'static str>,
            parent: Option<&'static str>,
        }
        struct Holder(Arc<Probe>);

        let mut registry = Registry::new();
        registry.register_default::<Probe>(Instance::factory(|session| {
            Arc::new(Probe {
                requested: session.requested_type(),
                parent: session.parent_type(),
            })
        }));
        registry.register_default::<Holder>(Instance::built(Ctor::new(
            (Dep::<Probe>::auto(),),
            |(probe,)| Arc::new(Holder(probe)),
        )));
        let scaffold = Scaffold::new(registry);

        let holder = scaffold.session().get_instance::<Holder>().unwrap();
        assert!(holder.0.requested.unwrap_or("").contains("Probe"));
        assert!(holder.0.parent.unwrap_or("").contains("Holder"));
    }

    #[test]
    fn factory_reentry_into_itself_is_a_cycle() {
        #[derive(Debug)]
        struct Snake;

        let mut registry = Registry::new();
        registry.register_default::<Snake>(Instance::try_factory(|session| {
            let _inner = session.get_instance::<Snake>()?;
            Ok(Arc::new(Snake))
        }));
        let scaffold = Scaffold::new(registry);

        let err = scaffold.session().get_instance::<Snake>().unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { .. }));
    }
}
