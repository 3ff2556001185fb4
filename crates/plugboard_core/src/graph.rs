//! Registration and the sealed instance graph.
//!
//! A [`Registry`] collects registrations through its builder API, then is
//! sealed into an immutable [`InstanceGraph`]: descriptors grouped into
//! per-type families with a resolved default slot and a name index.
//! Sealing never aborts on a malformed family; the fault is recorded as a
//! [`ConfigIssue`] and the affected lookup fails at resolution time, while
//! independently valid families stay usable.
//!
//! The graph also carries everything resolution consults besides families:
//! the auto-wire table, setter sets keyed by concrete type, close
//! templates, container-wide interception policies, and the constructor
//! selection policy.

use core::any::TypeId;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::descriptor::{
    Ctor, DependencySpec, Descriptor, ErasedSetterSet, Instance, SetterSet,
};
use crate::error::{ConfigIssue, ConfigReport};
use crate::intercept::{InterceptionPolicy, Interceptor};

// ─────────────────────────────────────────────────────────────────────────────
// Policies and templates
// ─────────────────────────────────────────────────────────────────────────────

/// Container-wide constructor selection policy.
///
/// Consulted for descriptors with several candidate constructors and no
/// designated one. Returning `None` falls back to the built-in rule: the
/// candidate with the most resolvable parameters, earliest-registered on a
/// tie.
pub trait CtorSelection: Send + Sync {
    /// Picks a candidate by index into `candidates`, each given as its
    /// ordered parameter list.
    fn select(&self, descriptor: &Descriptor, candidates: &[&[DependencySpec]]) -> Option<usize>;
}

/// A family of registrations served by one rule instead of one descriptor
/// per type.
///
/// When a lookup finds no registered family for the requested type, each
/// template is offered the request's type tag and may produce a descriptor
/// for it. Produced descriptors are cached per tag, so a template closes
/// each type at most once per configuration.
pub trait CloseTemplate: Send + Sync {
    /// Produces a descriptor for the given type tag, or `None` when this
    /// template does not serve it.
    fn close(&self, tag: TypeId) -> Option<Descriptor>;
}

type MakeDescriptor = Arc<dyn Fn() -> Descriptor + Send + Sync>;

/// A [`CloseTemplate`] backed by an explicit tag table.
///
/// # Example
///
/// ```ignore
/// let table = TemplateTable::new()
///     .provide::<dyn Validator<Order>>(|| {
///         Instance::value(Arc::new(OrderValidator) as Arc<dyn Validator<Order>>)
///     })
///     .provide::<dyn Validator<Invoice>>(|| {
///         Instance::value(Arc::new(InvoiceValidator) as Arc<dyn Validator<Invoice>>)
///     });
/// registry.template(table);
/// ```
#[derive(Default)]
pub struct TemplateTable {
    entries: HashMap<TypeId, MakeDescriptor>,
}

impl TemplateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the closing rule for `T`.
    #[must_use]
    pub fn provide<T: ?Sized + Send + Sync + 'static>(
        mut self,
        make: impl Fn() -> Instance<T> + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .insert(TypeId::of::<T>(), Arc::new(move || make().descriptor()));
        self
    }
}

impl CloseTemplate for TemplateTable {
    fn close(&self, tag: TypeId) -> Option<Descriptor> {
        self.entries.get(&tag).map(|make| make())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

type ProfileFn = Arc<dyn Fn(&mut Registry) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    descriptor: Descriptor,
    fallback: bool,
    is_default: bool,
}

/// Builder for a container configuration.
///
/// # Example
///
/// ```ignore
/// let container = Container::new(|registry| {
///     registry.register_default::<dyn Color>(Instance::value(Arc::new(Red)));
///     registry.register::<dyn Color>(Instance::value(Arc::new(Blue)).named("blue"));
/// });
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
    auto: HashMap<TypeId, Descriptor>,
    setters: HashMap<TypeId, ErasedSetterSet>,
    templates: Vec<Arc<dyn CloseTemplate>>,
    policies: Vec<InterceptionPolicy>,
    ctor_policy: Option<Arc<dyn CtorSelection>>,
    profiles: Vec<(&'static str, ProfileFn)>,
    track_transients: bool,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration without touching the family default.
    ///
    /// A family with exactly one registration still resolves it as the
    /// default; with several, an unnamed lookup is ambiguous until one is
    /// registered with [`Registry::register_default`].
    pub fn register<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Instance<T>) {
        self.registrations.push(Registration {
            descriptor: instance.descriptor(),
            fallback: false,
            is_default: false,
        });
    }

    /// Adds a registration designated as the family default.
    pub fn register_default<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Instance<T>) {
        self.registrations.push(Registration {
            descriptor: instance.descriptor(),
            fallback: false,
            is_default: true,
        });
    }

    /// Adds a registration used only if the family has no other
    /// registration when the registry is sealed.
    pub fn register_fallback<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Instance<T>) {
        self.registrations.push(Registration {
            descriptor: instance.descriptor(),
            fallback: true,
            is_default: true,
        });
    }

    /// Teaches the container to build the concrete type `C` on demand,
    /// without an explicit registration for it.
    pub fn auto_wire<C: Send + Sync + 'static>(&mut self, ctor: Ctor<C>) {
        self.auto.insert(
            TypeId::of::<C>(),
            Instance::built(ctor).plugged::<C>().descriptor(),
        );
    }

    /// Auto-wires `C` through its `Default` impl.
    pub fn auto_wire_default<C: Default + Send + Sync + 'static>(&mut self) {
        self.auto_wire(Ctor::new((), |()| Arc::new(C::default())));
    }

    /// Registers the settable dependencies of the concrete type `C`,
    /// applied by setter-aware constructors and by `Container::build_up`.
    pub fn setters<C: Send + Sync + 'static>(&mut self, set: SetterSet<C>) {
        self.setters.insert(TypeId::of::<C>(), set.erase());
    }

    /// Adds a close template, consulted in registration order for types
    /// with no registered family.
    pub fn template(&mut self, template: impl CloseTemplate + 'static) {
        self.templates.push(Arc::new(template));
    }

    /// Applies `interceptor` to every built instance whose descriptor
    /// matches the predicate, after the descriptor's own interceptors.
    pub fn intercept_where(
        &mut self,
        applies_to: impl Fn(&Descriptor) -> bool + Send + Sync + 'static,
        interceptor: Interceptor,
    ) {
        self.policies
            .push(InterceptionPolicy::new(applies_to, interceptor));
    }

    /// Installs the constructor selection policy; the last installed wins.
    pub fn ctor_policy(&mut self, policy: impl CtorSelection + 'static) {
        self.ctor_policy = Some(Arc::new(policy));
    }

    /// Declares a named profile: the base configuration plus the overrides
    /// applied by `configure`, materialized by `Container::profile`.
    pub fn profile(
        &mut self,
        name: &'static str,
        configure: impl Fn(&mut Registry) + Send + Sync + 'static,
    ) {
        self.profiles.push((name, Arc::new(configure)));
    }

    /// Enables tracking of transient instances for scope disposal and
    /// `Container::release`. Off by default.
    pub fn track_transients(&mut self, enabled: bool) {
        self.track_transients = enabled;
    }

    /// Seals the registry into an immutable graph, grouping registrations
    /// into families and recording configuration faults.
    pub(crate) fn seal(self) -> InstanceGraph {
        let base = self.clone();
        let mut report = ConfigReport::default();

        let mut family_order: Vec<TypeId> = Vec::new();
        let mut grouped: HashMap<TypeId, Vec<Registration>> = HashMap::new();
        for registration in self.registrations {
            let type_id = registration.descriptor.service_key().type_id();
            grouped
                .entry(type_id)
                .or_insert_with(|| {
                    family_order.push(type_id);
                    Vec::new()
                })
                .push(registration);
        }

        let mut families = HashMap::new();
        for type_id in &family_order {
            let registrations = grouped.remove(type_id).unwrap_or_default();
            let family = seal_family(registrations, &mut report);
            families.insert(*type_id, family);
        }

        InstanceGraph {
            families,
            family_order,
            auto: self.auto,
            setters: self.setters,
            templates: self.templates,
            closed: RwLock::new(HashMap::new()),
            policies: self.policies,
            ctor_policy: self.ctor_policy,
            profiles: self.profiles,
            track_transients: self.track_transients,
            base,
            report,
        }
    }
}

fn seal_family(registrations: Vec<Registration>, report: &mut ConfigReport) -> Family {
    // Fallbacks only survive when the family has no regular registration.
    let has_regular = registrations.iter().any(|r| !r.fallback);
    let survivors: Vec<Registration> = registrations
        .into_iter()
        .filter(|r| !has_regular || !r.fallback)
        .collect();

    let type_name = survivors
        .first()
        .map_or("", |r| r.descriptor.service_key().type_name());

    // The last designated registration wins the default slot; earlier
    // designated ones stay in the family as additional candidates. This
    // is what lets `configure` and child containers override a default by
    // registering a new one.
    let designated = survivors.iter().rposition(|r| r.is_default);
    let default = match designated {
        Some(index) => Slot::Unique(index),
        None if survivors.len() == 1 => Slot::Unique(0),
        None => Slot::Empty,
    };

    let mut named: HashMap<&'static str, Slot> = HashMap::new();
    for (index, registration) in survivors.iter().enumerate() {
        let Some(name) = registration.descriptor.name() else {
            continue;
        };
        match named.get(name) {
            None => {
                named.insert(name, Slot::Unique(index));
            }
            Some(Slot::Unique(_)) => {
                let issue = ConfigIssue::DuplicateName { type_name, name };
                report.push(issue.clone());
                named.insert(name, Slot::Conflict(issue));
            }
            Some(Slot::Conflict(_) | Slot::Empty) => {}
        }
    }

    Family {
        type_name,
        descriptors: survivors.into_iter().map(|r| r.descriptor).collect(),
        default,
        named,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sealed graph
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) enum Slot {
    Empty,
    Unique(usize),
    Conflict(ConfigIssue),
}

pub(crate) struct Family {
    pub(crate) type_name: &'static str,
    pub(crate) descriptors: Vec<Descriptor>,
    default: Slot,
    named: HashMap<&'static str, Slot>,
}

/// Outcome of a default-instance lookup against one family.
pub(crate) enum DefaultLookup {
    Found(Descriptor),
    /// No family, or an empty one. The caller may still consult the
    /// auto-wire table and close templates.
    Missing,
    /// Several candidates and none designated; carries candidate labels.
    Ambiguous(Vec<String>),
    /// The family slot has a seal-time fault.
    Faulted(ConfigIssue),
}

/// The immutable registration state one container runtime resolves
/// against.
pub(crate) struct InstanceGraph {
    families: HashMap<TypeId, Family>,
    family_order: Vec<TypeId>,
    auto: HashMap<TypeId, Descriptor>,
    setters: HashMap<TypeId, ErasedSetterSet>,
    templates: Vec<Arc<dyn CloseTemplate>>,
    closed: RwLock<HashMap<TypeId, Option<Descriptor>>>,
    policies: Vec<InterceptionPolicy>,
    ctor_policy: Option<Arc<dyn CtorSelection>>,
    profiles: Vec<(&'static str, ProfileFn)>,
    track_transients: bool,
    base: Registry,
    report: ConfigReport,
}

impl InstanceGraph {
    pub(crate) fn default_for(&self, type_id: TypeId) -> DefaultLookup {
        let Some(family) = self.families.get(&type_id) else {
            return DefaultLookup::Missing;
        };
        match &family.default {
            Slot::Unique(index) => DefaultLookup::Found(family.descriptors[*index].clone()),
            Slot::Conflict(issue) => DefaultLookup::Faulted(issue.clone()),
            Slot::Empty if family.descriptors.is_empty() => DefaultLookup::Missing,
            Slot::Empty => DefaultLookup::Ambiguous(
                family.descriptors.iter().map(Descriptor::label).collect(),
            ),
        }
    }

    pub(crate) fn named(&self, type_id: TypeId, name: &str) -> Option<DefaultLookup> {
        let family = self.families.get(&type_id)?;
        match family.named.get(name)? {
            Slot::Unique(index) => {
                Some(DefaultLookup::Found(family.descriptors[*index].clone()))
            }
            Slot::Conflict(issue) => Some(DefaultLookup::Faulted(issue.clone())),
            Slot::Empty => None,
        }
    }

    /// All surviving registrations for the type, in registration order.
    pub(crate) fn all(&self, type_id: TypeId) -> Vec<Descriptor> {
        self.families
            .get(&type_id)
            .map(|family| family.descriptors.clone())
            .unwrap_or_default()
    }

    pub(crate) fn auto_for(&self, type_id: TypeId) -> Option<Descriptor> {
        self.auto.get(&type_id).cloned()
    }

    /// Offers `tag` to the close templates in registration order; the
    /// produced descriptor (or the miss) is cached per tag.
    pub(crate) fn close_template(&self, tag: TypeId) -> Option<Descriptor> {
        if let Some(cached) = self.closed.read().get(&tag) {
            return cached.clone();
        }
        let produced = self
            .templates
            .iter()
            .find_map(|template| template.close(tag));
        let mut closed = self.closed.write();
        closed.entry(tag).or_insert(produced).clone()
    }

    pub(crate) fn setters_for(&self, target: TypeId) -> Option<&ErasedSetterSet> {
        self.setters.get(&target)
    }

    pub(crate) fn policies(&self) -> &[InterceptionPolicy] {
        &self.policies
    }

    pub(crate) fn ctor_policy(&self) -> Option<&Arc<dyn CtorSelection>> {
        self.ctor_policy.as_ref()
    }

    pub(crate) fn profile_fn(&self, name: &str) -> Option<ProfileFn> {
        self.profiles
            .iter()
            .rev()
            .find(|(profile, _)| *profile == name)
            .map(|(_, configure)| Arc::clone(configure))
    }

    pub(crate) fn track_transients(&self) -> bool {
        self.track_transients
    }

    /// The registry this graph was sealed from, for incremental
    /// reconfiguration and profile materialization.
    pub(crate) fn base(&self) -> Registry {
        self.base.clone()
    }

    pub(crate) fn report(&self) -> &ConfigReport {
        &self.report
    }

    /// Every surviving descriptor across all families, family registration
    /// order first, then within-family registration order.
    pub(crate) fn all_descriptors(&self) -> Vec<Descriptor> {
        self.family_order
            .iter()
            .filter_map(|type_id| self.families.get(type_id))
            .flat_map(|family| family.descriptors.iter().cloned())
            .collect()
    }

    /// Whether `descriptor` is its family's resolved default.
    pub(crate) fn is_default(&self, descriptor: &Descriptor) -> bool {
        let type_id = descriptor.service_key().type_id();
        matches!(
            self.default_for(type_id),
            DefaultLookup::Found(found) if found.id() == descriptor.id()
        )
    }
}
