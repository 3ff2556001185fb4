//! Build-plan compilation.
//!
//! A [`BuildPlan`] is the compiled, structural recipe for one descriptor:
//! which action produces the instance, the ordered steps feeding its
//! parameters, and the interception pipeline to run afterwards. Plans hold
//! no instances and no lifecycle state, so one plan serves every scope and
//! thread of a configuration; they are cached per `(descriptor, requested
//! type)` and the whole cache is discarded on reconfiguration.
//!
//! Planning is where structural faults surface: missing registrations,
//! ambiguous defaults, unresolvable parameters, and dependency cycles are
//! all detected here, before any construction runs.

use core::any::TypeId;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::descriptor::{
    AssembleFn, DependencyKind, DependencySpec, Descriptor, DescriptorId, DescriptorKind,
    ErasedCtor, ErasedSetterSet, FactoryFn, SharedInstance,
};
use crate::error::ResolveError;
use crate::graph::{DefaultLookup, InstanceGraph};
use crate::intercept::Interceptor;
use crate::key::ServiceKey;

// ─────────────────────────────────────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────────────────────────────────────

/// One step feeding a constructor parameter or setter.
pub(crate) enum Step {
    /// A literal embedded at registration time.
    Constant(SharedInstance),
    /// The parameter's language-level default, used because nothing is
    /// registered for its type.
    DefaultValue(Arc<dyn Fn() -> SharedInstance + Send + Sync>),
    /// A nested plan, resolved recursively.
    Plan(Arc<BuildPlan>),
    /// All registered instances of the element type, registration order.
    Collection(Vec<Arc<BuildPlan>>),
}

pub(crate) enum PlanAction {
    Constant(SharedInstance),
    Factory(FactoryFn),
    Construct {
        args: Vec<Step>,
        setters: Option<(ErasedSetterSet, Vec<Step>)>,
        assemble: AssembleFn,
    },
    Redirect(Arc<BuildPlan>),
}

/// The compiled recipe for building one descriptor.
pub(crate) struct BuildPlan {
    pub(crate) descriptor: Descriptor,
    pub(crate) action: PlanAction,
    pub(crate) interceptors: Vec<Interceptor>,
}

impl core::fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BuildPlan").finish_non_exhaustive()
    }
}

/// Concurrent cache of compiled plans for one configuration generation.
#[derive(Default)]
pub(crate) struct PlanCache {
    plans: RwLock<HashMap<(DescriptorId, TypeId), Arc<BuildPlan>>>,
}

impl PlanCache {
    fn get(&self, id: DescriptorId, requested: TypeId) -> Option<Arc<BuildPlan>> {
        self.plans.read().get(&(id, requested)).cloned()
    }

    fn insert(&self, id: DescriptorId, requested: TypeId, plan: Arc<BuildPlan>) {
        self.plans.write().insert((id, requested), plan);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Planner
// ─────────────────────────────────────────────────────────────────────────────

/// One planning walk. Tracks the descriptors currently being planned (for
/// cycle detection) and the ancestor path (for error context).
pub(crate) struct Planner<'g> {
    graph: &'g InstanceGraph,
    cache: &'g PlanCache,
    in_progress: Vec<(DescriptorId, String)>,
    path: Vec<String>,
}

impl<'g> Planner<'g> {
    pub(crate) fn new(graph: &'g InstanceGraph, cache: &'g PlanCache) -> Self {
        Self {
            graph,
            cache,
            in_progress: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Plans the default instance for `key`: the family default first,
    /// then the auto-wire table, then the close templates.
    pub(crate) fn plan_default(&mut self, key: ServiceKey) -> Result<Arc<BuildPlan>, ResolveError> {
        let type_id = key.type_id();
        match self.graph.default_for(type_id) {
            DefaultLookup::Found(descriptor) => self.plan_descriptor(&descriptor, key),
            DefaultLookup::Faulted(issue) => Err(ResolveError::Configuration {
                key: key.to_string(),
                issue: issue.to_string(),
            }),
            DefaultLookup::Ambiguous(candidates) => Err(ResolveError::AmbiguousDefault {
                key: key.to_string(),
                candidates,
            }),
            DefaultLookup::Missing => {
                if let Some(descriptor) = self.graph.auto_for(type_id) {
                    return self.plan_descriptor(&descriptor, key);
                }
                if let Some(descriptor) = self.graph.close_template(type_id) {
                    return self.plan_descriptor(&descriptor, key);
                }
                Err(ResolveError::no_default(&key, self.path.clone()))
            }
        }
    }

    /// Plans the instance of `key`'s type registered under `name`.
    pub(crate) fn plan_named(
        &mut self,
        key: ServiceKey,
        name: &'static str,
    ) -> Result<Arc<BuildPlan>, ResolveError> {
        let named_key = key.with_name(name);
        match self.graph.named(key.type_id(), name) {
            Some(DefaultLookup::Found(descriptor)) => self.plan_descriptor(&descriptor, named_key),
            Some(DefaultLookup::Faulted(issue)) => Err(ResolveError::Configuration {
                key: named_key.to_string(),
                issue: issue.to_string(),
            }),
            _ => Err(ResolveError::no_default(&named_key, self.path.clone())),
        }
    }

    /// Plans every registration for `key`'s type, registration order. An
    /// unregistered type planfully yields an empty collection.
    pub(crate) fn plan_all(
        &mut self,
        key: ServiceKey,
    ) -> Result<Vec<Arc<BuildPlan>>, ResolveError> {
        self.graph
            .all(key.type_id())
            .iter()
            .map(|descriptor| self.plan_descriptor(descriptor, key))
            .collect()
    }

    /// Plans the steps for a standalone setter set, as used by
    /// `Container::build_up` against an already-constructed target.
    pub(crate) fn plan_setters(
        &mut self,
        set: &ErasedSetterSet,
    ) -> Result<Vec<Step>, ResolveError> {
        self.plan_specs(&set.specs, set.target_name)
    }

    pub(crate) fn plan_descriptor(
        &mut self,
        descriptor: &Descriptor,
        requested: ServiceKey,
    ) -> Result<Arc<BuildPlan>, ResolveError> {
        if let Some(plan) = self.cache.get(descriptor.id(), requested.type_id()) {
            return Ok(plan);
        }

        let label = descriptor.label();
        if let Some(start) = self
            .in_progress
            .iter()
            .position(|(id, _)| *id == descriptor.id())
        {
            let mut members: Vec<String> = self.in_progress[start..]
                .iter()
                .map(|(_, member)| member.clone())
                .collect();
            members.push(label);
            return Err(ResolveError::Cycle { members });
        }

        self.in_progress.push((descriptor.id(), label.clone()));
        self.path.push(label);
        let action = self.plan_action(descriptor);
        self.path.pop();
        self.in_progress.pop();
        let action = action?;

        let mut interceptors = descriptor.inner.interceptors.clone();
        for policy in self.graph.policies() {
            if (policy.applies_to)(descriptor) {
                interceptors.push(policy.interceptor.clone());
            }
        }

        let plan = Arc::new(BuildPlan {
            descriptor: descriptor.clone(),
            action,
            interceptors,
        });
        self.cache
            .insert(descriptor.id(), requested.type_id(), Arc::clone(&plan));
        tracing::debug!(
            descriptor = %plan.descriptor.label(),
            requested = %requested,
            "compiled build plan"
        );
        Ok(plan)
    }

    fn plan_action(&mut self, descriptor: &Descriptor) -> Result<PlanAction, ResolveError> {
        match &descriptor.inner.kind {
            DescriptorKind::Constant(value) => Ok(PlanAction::Constant(value.clone())),
            DescriptorKind::Factory(factory) => Ok(PlanAction::Factory(Arc::clone(factory))),
            DescriptorKind::Redirect(target) => {
                let inner = match target.name() {
                    Some(name) => self.plan_named(*target, name)?,
                    None => self.plan_default(*target)?,
                };
                Ok(PlanAction::Redirect(inner))
            }
            DescriptorKind::Constructed { ctors } => {
                let ctor = self.select_ctor(descriptor, ctors)?;
                let args = self.plan_specs(&ctor.params, &descriptor.label())?;
                let setters = match ctor.setter_target {
                    Some((target, _)) => self.graph.setters_for(target).cloned(),
                    None => None,
                };
                let setters = match setters {
                    Some(set) => {
                        let steps = self.plan_specs(&set.specs, set.target_name)?;
                        Some((set, steps))
                    }
                    None => None,
                };
                Ok(PlanAction::Construct {
                    args,
                    setters,
                    assemble: Arc::clone(&ctor.assemble),
                })
            }
        }
    }

    fn plan_specs(
        &mut self,
        specs: &[DependencySpec],
        declaring: &str,
    ) -> Result<Vec<Step>, ResolveError> {
        specs
            .iter()
            .map(|spec| self.plan_spec(spec, declaring))
            .collect()
    }

    fn plan_spec(
        &mut self,
        spec: &DependencySpec,
        declaring: &str,
    ) -> Result<Step, ResolveError> {
        let planned = match &spec.kind {
            DependencyKind::Value(value) => return Ok(Step::Constant(value.clone())),
            DependencyKind::Child(child) => {
                return Ok(Step::Plan(self.plan_descriptor(child, spec.key)?));
            }
            DependencyKind::All => return Ok(Step::Collection(self.plan_all(spec.key)?)),
            DependencyKind::Named(name) => self.plan_named(spec.key, name),
            DependencyKind::Auto => self.plan_default(spec.key),
        };
        match planned {
            Ok(plan) => Ok(Step::Plan(plan)),
            // A registration miss falls back to the parameter's own
            // default; every other fault (cycle, ambiguity, nested
            // failure) propagates.
            Err(miss) if miss.is_not_registered() => match &spec.default {
                Some(default) => Ok(Step::DefaultValue(Arc::clone(default))),
                None => Err(ResolveError::Unresolvable {
                    param: spec.param,
                    declaring: declaring.to_string(),
                    path: self.path.clone(),
                }),
            },
            Err(other) => Err(other),
        }
    }

    /// Selects the constructor: the designated one, then the installed
    /// policy, then the candidate with the most structurally resolvable
    /// parameters (earliest-registered on a tie).
    fn select_ctor<'c>(
        &mut self,
        descriptor: &Descriptor,
        ctors: &'c [ErasedCtor],
    ) -> Result<&'c ErasedCtor, ResolveError> {
        if ctors.len() == 1 {
            return Ok(&ctors[0]);
        }
        if let Some(designated) = ctors.iter().find(|ctor| ctor.designated) {
            return Ok(designated);
        }
        if let Some(policy) = self.graph.ctor_policy() {
            let candidates: Vec<&[DependencySpec]> =
                ctors.iter().map(|ctor| ctor.params.as_slice()).collect();
            if let Some(index) = policy.select(descriptor, &candidates) {
                if let Some(ctor) = ctors.get(index) {
                    return Ok(ctor);
                }
            }
        }

        let mut best: Option<(usize, &ErasedCtor)> = None;
        for ctor in ctors {
            if !ctor.params.iter().all(|spec| self.spec_is_resolvable(spec)) {
                continue;
            }
            let arity = ctor.params.len();
            if best.is_none_or(|(best_arity, _)| arity > best_arity) {
                best = Some((arity, ctor));
            }
        }
        match best {
            Some((_, ctor)) => Ok(ctor),
            // No candidate is fully resolvable; report against the
            // greediest one so the message names a concrete missing
            // parameter.
            None => {
                let greediest = ctors
                    .iter()
                    .max_by_key(|ctor| ctor.params.len())
                    .unwrap_or(&ctors[0]);
                let missing = greediest
                    .params
                    .iter()
                    .find(|spec| !self.spec_is_resolvable(spec));
                Err(ResolveError::Unresolvable {
                    param: missing.map_or("", |spec| spec.param),
                    declaring: descriptor.label(),
                    path: self.path.clone(),
                })
            }
        }
    }

    /// Structural resolvability, used only for constructor selection; the
    /// chosen candidate is still planned in full afterwards.
    fn spec_is_resolvable(&self, spec: &DependencySpec) -> bool {
        if spec.default.is_some() {
            return true;
        }
        let type_id = spec.key.type_id();
        match &spec.kind {
            DependencyKind::Value(_) | DependencyKind::Child(_) | DependencyKind::All => true,
            DependencyKind::Named(name) => self.graph.named(type_id, name).is_some(),
            DependencyKind::Auto => {
                // Ambiguous and faulted defaults would fail when planned,
                // so they must not make a candidate look satisfiable.
                matches!(self.graph.default_for(type_id), DefaultLookup::Found(_))
                    || self.graph.auto_for(type_id).is_some()
                    || self.graph.close_template(type_id).is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Ctor, Dep, Instance};
    use crate::graph::Registry;

    struct Alpha;
    struct Beta;
    struct Gamma;

    fn plan_for<T: ?Sized + Send + Sync + 'static>(
        registry: Registry,
    ) -> Result<Arc<BuildPlan>, ResolveError> {
        let graph = registry.seal();
        let cache = PlanCache::default();
        let mut planner = Planner::new(&graph, &cache);
        planner.plan_default(ServiceKey::of::<T>())
    }

    #[test]
    fn cycles_are_fatal_and_name_their_members() {
        let mut registry = Registry::new();
        registry.register_default::<Alpha>(Instance::built(Ctor::new(
            (Dep::<Beta>::auto(),),
            |(_beta,)| Arc::new(Alpha),
        )));
        registry.register_default::<Beta>(Instance::built(Ctor::new(
            (Dep::<Alpha>::auto(),),
            |(_alpha,)| Arc::new(Beta),
        )));

        let err = plan_for::<Alpha>(registry).unwrap_err();
        let ResolveError::Cycle { members } = err else {
            panic!("expected a cycle, got {err}");
        };
        assert_eq!(members.len(), 3);
        assert_eq!(members.first(), members.last());
    }

    #[test]
    fn missing_dependency_reports_the_parameter() {
        let mut registry = Registry::new();
        registry.register_default::<Alpha>(Instance::built(Ctor::new(
            (Dep::<Gamma>::auto().param("gamma"),),
            |(_gamma,)| Arc::new(Alpha),
        )));

        let err = plan_for::<Alpha>(registry).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Unresolvable { param: "gamma", .. }
        ));
    }

    #[test]
    fn defaulted_parameter_survives_a_missing_registration() {
        let mut registry = Registry::new();
        registry.register_default::<Alpha>(Instance::built(Ctor::new(
            (Dep::<Gamma>::auto().or(|| Arc::new(Gamma)),),
            |(_gamma,)| Arc::new(Alpha),
        )));

        let plan = plan_for::<Alpha>(registry).unwrap();
        let PlanAction::Construct { args, .. } = &plan.action else {
            panic!("expected a construct plan");
        };
        assert!(matches!(args[0], Step::DefaultValue(_)));
    }

    #[test]
    fn greediest_resolvable_ctor_wins() {
        let mut registry = Registry::new();
        registry.register_default::<Beta>(Instance::value(Arc::new(Beta)));
        registry.register_default::<Alpha>(
            Instance::built(Ctor::new((), |()| Arc::new(Alpha)))
                // Unresolvable: Gamma has no registration.
                .alternate(Ctor::new(
                    (Dep::<Beta>::auto(), Dep::<Gamma>::auto()),
                    |(_beta, _gamma)| Arc::new(Alpha),
                ))
                // Resolvable and greedier than the empty candidate.
                .alternate(Ctor::new((Dep::<Beta>::auto(),), |(_beta,)| {
                    Arc::new(Alpha)
                })),
        );

        let plan = plan_for::<Alpha>(registry).unwrap();
        let PlanAction::Construct { args, .. } = &plan.action else {
            panic!("expected a construct plan");
        };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn ambiguous_parameter_disqualifies_a_ctor_candidate() {
        let mut registry = Registry::new();
        // Two undesignated candidates: Beta's default is ambiguous, so a
        // constructor wanting Beta is not satisfiable.
        registry.register::<Beta>(Instance::value(Arc::new(Beta)));
        registry.register::<Beta>(Instance::value(Arc::new(Beta)));
        registry.register_default::<Alpha>(
            Instance::built(Ctor::new((), |()| Arc::new(Alpha))).alternate(Ctor::new(
                (Dep::<Beta>::auto(),),
                |(_beta,)| Arc::new(Alpha),
            )),
        );

        let plan = plan_for::<Alpha>(registry).unwrap();
        let PlanAction::Construct { args, .. } = &plan.action else {
            panic!("expected a construct plan");
        };
        assert!(args.is_empty());
    }

    #[test]
    fn designated_ctor_overrides_greediness() {
        let mut registry = Registry::new();
        registry.register_default::<Beta>(Instance::value(Arc::new(Beta)));
        registry.register_default::<Alpha>(
            Instance::built(Ctor::new((), |()| Arc::new(Alpha)).designated()).alternate(
                Ctor::new((Dep::<Beta>::auto(),), |(_beta,)| Arc::new(Alpha)),
            ),
        );

        let plan = plan_for::<Alpha>(registry).unwrap();
        let PlanAction::Construct { args, .. } = &plan.action else {
            panic!("expected a construct plan");
        };
        assert!(args.is_empty());
    }

    #[test]
    fn redirects_plan_through_their_target() {
        let mut registry = Registry::new();
        registry.register_default::<Beta>(Instance::value(Arc::new(Beta)));
        registry.register_default::<Alpha>(Instance::built(Ctor::new((), |()| Arc::new(Alpha))));
        registry.register::<Alpha>(
            Instance::redirect(ServiceKey::of::<Alpha>()).named("again"),
        );

        let graph = registry.seal();
        let cache = PlanCache::default();
        let mut planner = Planner::new(&graph, &cache);
        let plan = planner
            .plan_named(ServiceKey::of::<Alpha>(), "again")
            .unwrap();
        assert!(matches!(plan.action, PlanAction::Redirect(_)));
    }

    #[test]
    fn plans_are_cached_per_descriptor() {
        let mut registry = Registry::new();
        registry.register_default::<Alpha>(Instance::built(Ctor::new((), |()| Arc::new(Alpha))));
        let graph = registry.seal();
        let cache = PlanCache::default();

        let first = Planner::new(&graph, &cache)
            .plan_default(ServiceKey::of::<Alpha>())
            .unwrap();
        let second = Planner::new(&graph, &cache)
            .plan_default(ServiceKey::of::<Alpha>())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
