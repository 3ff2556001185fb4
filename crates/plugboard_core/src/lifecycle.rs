//! Lifecycles, disposal, and the per-scope object caches.
//!
//! A lifecycle decides *where the shared copy of an instance lives*: at the
//! root scope, in the resolving scope, per thread, per resolution request,
//! or nowhere at all. The caches themselves keep insertion order so that
//! disposal can run newest-first, after the pattern that dependents are
//! created after their dependencies.

use core::cell::RefCell;
use std::sync::{Arc, LazyLock};

use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};

use crate::descriptor::{Descriptor, DescriptorId, SharedInstance};
use crate::error::ResolveError;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Where the shared copy of a built instance lives.
#[derive(Clone, Default)]
pub enum Lifecycle {
    /// No caching across requests; one copy is still shared *within* a
    /// single resolution request. The default.
    #[default]
    Transient,
    /// One instance at the root scope, shared by every descendant scope.
    Singleton,
    /// One instance per container scope.
    Scoped,
    /// A fresh instance on every appearance, even within one request.
    AlwaysUnique,
    /// One instance per thread. Cached copies are dropped with their
    /// thread, without disposal.
    ThreadLocal,
    /// A user-supplied policy.
    Custom(Arc<dyn LifecyclePolicy>),
}

impl Lifecycle {
    /// Short label used in diagnostics output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Singleton => "singleton",
            Self::Scoped => "scoped",
            Self::AlwaysUnique => "always-unique",
            Self::ThreadLocal => "thread-local",
            Self::Custom(policy) => policy.name(),
        }
    }
}

impl core::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// A user-defined caching policy, selected with [`Lifecycle::Custom`].
pub trait LifecyclePolicy: Send + Sync {
    /// Policy name shown in diagnostics.
    fn name(&self) -> &'static str;

    /// Produces the instance for one resolution, deciding whether to reuse
    /// a cached copy or invoke `build` for a fresh one.
    ///
    /// # Errors
    ///
    /// Propagates any error from `build`.
    fn resolve(
        &self,
        descriptor: &Descriptor,
        build: &mut dyn FnMut() -> Result<SharedInstance, ResolveError>,
    ) -> Result<SharedInstance, ResolveError>;
}

/// Cleanup hook for instances that hold releasable resources.
///
/// Disposal runs when the owning cache slot is ejected or the owning scope
/// is disposed, newest instance first.
pub trait Dispose: Send + Sync {
    /// Releases the instance's resources.
    fn dispose(&self);
}

pub(crate) type DisposeFn = Arc<dyn Fn(&SharedInstance) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Object caches
// ─────────────────────────────────────────────────────────────────────────────

struct CacheEntry {
    instance: SharedInstance,
    disposer: Option<DisposeFn>,
}

/// Insertion-ordered cache of built instances for one scope.
///
/// The slot for a descriptor is filled at most once: concurrent builders
/// race outside the lock and the first writer wins, so callers always
/// observe a single shared copy.
#[derive(Default)]
pub(crate) struct ObjectCache {
    entries: Mutex<Vec<(DescriptorId, CacheEntry)>>,
}

impl ObjectCache {
    pub(crate) fn get(&self, id: DescriptorId) -> Option<SharedInstance> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, entry)| entry.instance.clone())
    }

    /// Returns the cached instance for `id`, building one if the slot is
    /// empty. The lock is never held while `build` runs, since building
    /// may re-enter this cache for dependencies. A failed build leaves the
    /// slot empty.
    pub(crate) fn get_or_build(
        &self,
        id: DescriptorId,
        disposer: Option<DisposeFn>,
        build: &mut dyn FnMut() -> Result<SharedInstance, ResolveError>,
    ) -> Result<SharedInstance, ResolveError> {
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }
        let built = build()?;
        let mut entries = self.entries.lock();
        if let Some((_, entry)) = entries.iter().find(|(entry_id, _)| *entry_id == id) {
            let winner = entry.instance.clone();
            drop(entries);
            // Our copy lost the race; dispose it if it holds resources.
            if let Some(dispose) = &disposer {
                dispose(&built);
            }
            return Ok(winner);
        }
        entries.push((
            id,
            CacheEntry {
                instance: built.clone(),
                disposer,
            },
        ));
        Ok(built)
    }

    /// Removes and disposes the slot for `id`, so the next resolution
    /// builds fresh.
    pub(crate) fn eject(&self, id: DescriptorId) {
        let removed = {
            let mut entries = self.entries.lock();
            let position = entries.iter().position(|(entry_id, _)| *entry_id == id);
            position.map(|index| entries.remove(index))
        };
        if let Some((_, entry)) = removed {
            if let Some(dispose) = &entry.disposer {
                dispose(&entry.instance);
            }
        }
    }

    /// Removes and disposes the first entry matching `predicate`. Returns
    /// whether an entry was removed.
    pub(crate) fn eject_matching(
        &self,
        predicate: &dyn Fn(&SharedInstance) -> bool,
    ) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let position = entries
                .iter()
                .position(|(_, entry)| predicate(&entry.instance));
            position.map(|index| entries.remove(index))
        };
        match removed {
            Some((_, entry)) => {
                if let Some(dispose) = &entry.disposer {
                    dispose(&entry.instance);
                }
                true
            }
            None => false,
        }
    }

    /// Empties the cache, disposing instances newest-first.
    pub(crate) fn eject_all(&self) {
        let drained = {
            let mut entries = self.entries.lock();
            core::mem::take(&mut *entries)
        };
        for (_, entry) in drained.into_iter().rev() {
            if let Some(dispose) = &entry.disposer {
                dispose(&entry.instance);
            }
        }
    }
}

/// Holder for tracked transient instances, disposed with their owning
/// scope, newest-first.
#[derive(Default)]
pub(crate) struct DisposeBag {
    entries: Mutex<Vec<(SharedInstance, Option<DisposeFn>)>>,
}

impl DisposeBag {
    pub(crate) fn track(&self, instance: SharedInstance, disposer: Option<DisposeFn>) {
        self.entries.lock().push((instance, disposer));
    }

    /// Removes and disposes the first tracked instance matching
    /// `predicate`. Returns whether one was removed.
    pub(crate) fn release_matching(
        &self,
        predicate: &dyn Fn(&SharedInstance) -> bool,
    ) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let position = entries.iter().position(|(instance, _)| predicate(instance));
            position.map(|index| entries.remove(index))
        };
        match removed {
            Some((instance, disposer)) => {
                if let Some(dispose) = &disposer {
                    dispose(&instance);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn dispose_all(&self) {
        let drained = {
            let mut entries = self.entries.lock();
            core::mem::take(&mut *entries)
        };
        for (instance, disposer) in drained.into_iter().rev() {
            if let Some(dispose) = &disposer {
                dispose(&instance);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Thread-local instances
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    static THREAD_INSTANCES: RefCell<HashMap<(u64, DescriptorId), SharedInstance>> =
        RefCell::new(HashMap::new());
}

// Scope ids never recur, so the per-thread maps would otherwise pin every
// disposed scope's instances for the thread's life. Disposal records the
// scope here; the disposing thread purges its own map eagerly and other
// threads prune on their next store.
static RETIRED_SCOPES: LazyLock<RwLock<HashSet<u64>>> =
    LazyLock::new(|| RwLock::new(HashSet::new()));

pub(crate) fn retire_scope(scope: u64) {
    RETIRED_SCOPES.write().insert(scope);
    THREAD_INSTANCES.with(|map| {
        map.borrow_mut().retain(|(owner, _), _| *owner != scope);
    });
}

pub(crate) fn thread_instance(scope: u64, id: DescriptorId) -> Option<SharedInstance> {
    THREAD_INSTANCES.with(|map| map.borrow().get(&(scope, id)).cloned())
}

pub(crate) fn store_thread_instance(scope: u64, id: DescriptorId, instance: SharedInstance) {
    THREAD_INSTANCES.with(|map| {
        let mut map = map.borrow_mut();
        let retired = RETIRED_SCOPES.read();
        if !retired.is_empty() {
            map.retain(|(owner, _), _| !retired.contains(owner));
        }
        drop(retired);
        map.insert((scope, id), instance);
    });
}
