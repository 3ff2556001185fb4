//! Lifecycle, scoping, and disposal behavior across the container
//! hierarchy.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use plugboard_core::container::Container;
use plugboard_core::descriptor::{Ctor, Dep, Instance};
use plugboard_core::error::ResolveError;
use plugboard_core::lifecycle::{Dispose, Lifecycle, LifecyclePolicy};

static SERIAL: AtomicU64 = AtomicU64::new(0);

struct Stamp(u64);

fn stamp() -> Instance<Stamp> {
    Instance::built(Ctor::new((), |()| {
        Arc::new(Stamp(SERIAL.fetch_add(1, Ordering::SeqCst)))
    }))
}

#[test]
fn singletons_survive_nested_scopes_and_reconfiguration() {
    let container = Container::new(|registry| {
        registry.register_default(stamp().singleton());
    });

    let first = container.get_instance::<Stamp>().unwrap();
    let nested = container.nested_container().unwrap();
    assert_eq!(nested.get_instance::<Stamp>().unwrap().0, first.0);

    // Reconfiguring discards plans, not already-built singletons.
    container.configure(|_| {}).unwrap();
    assert_eq!(container.get_instance::<Stamp>().unwrap().0, first.0);
}

#[test]
fn scoped_instances_are_shared_within_and_not_across_scopes() {
    let container = Container::new(|registry| {
        registry.register_default(stamp().scoped());
    });

    let a = container.nested_container().unwrap();
    let b = container.nested_container().unwrap();

    let in_a = a.get_instance::<Stamp>().unwrap();
    let in_b = b.get_instance::<Stamp>().unwrap();
    assert_ne!(in_a.0, in_b.0);
    assert_eq!(a.get_instance::<Stamp>().unwrap().0, in_a.0);
}

#[test]
fn transients_are_per_request_but_shared_within_one_graph() {
    struct Pair {
        left: Arc<Stamp>,
        right: Arc<Stamp>,
    }

    let container = Container::new(|registry| {
        registry.register_default(stamp());
        registry.register_default::<Pair>(Instance::built(Ctor::new(
            (Dep::<Stamp>::auto(), Dep::<Stamp>::auto()),
            |(left, right)| Arc::new(Pair { left, right }),
        )));
    });

    let pair = container.get_instance::<Pair>().unwrap();
    assert_eq!(pair.left.0, pair.right.0);
    let again = container.get_instance::<Pair>().unwrap();
    assert_ne!(pair.left.0, again.left.0);
}

#[test]
fn always_unique_defeats_request_sharing() {
    struct Pair {
        left: Arc<Stamp>,
        right: Arc<Stamp>,
    }

    let container = Container::new(|registry| {
        registry.register_default(stamp().unique());
        registry.register_default::<Pair>(Instance::built(Ctor::new(
            (Dep::<Stamp>::auto(), Dep::<Stamp>::auto()),
            |(left, right)| Arc::new(Pair { left, right }),
        )));
    });

    let pair = container.get_instance::<Pair>().unwrap();
    assert_ne!(pair.left.0, pair.right.0);
}

#[test]
fn thread_local_instances_differ_across_threads() {
    let container = Container::new(|registry| {
        registry.register_default(stamp().thread_local());
    });

    let here_a = container.get_instance::<Stamp>().unwrap();
    let here_b = container.get_instance::<Stamp>().unwrap();
    assert_eq!(here_a.0, here_b.0);

    let elsewhere = {
        let container = container.clone();
        std::thread::spawn(move || container.get_instance::<Stamp>().unwrap().0)
            .join()
            .expect("thread panicked")
    };
    assert_ne!(here_a.0, elsewhere);
}

#[test]
fn thread_local_instances_are_released_when_their_scope_is_disposed() {
    let container = Container::new(|registry| {
        registry.register_default(stamp().thread_local());
    });

    let nested = container.nested_container().unwrap();
    let held = nested.get_instance::<Stamp>().unwrap();
    let watch = Arc::downgrade(&held);
    drop(held);

    // The thread's own cache entry must not outlive the scope.
    nested.dispose();
    drop(nested);
    assert!(watch.upgrade().is_none());

    // The root's slot is untouched by the nested disposal.
    let after = container.get_instance::<Stamp>().unwrap();
    let again = container.get_instance::<Stamp>().unwrap();
    assert_eq!(after.0, again.0);
}

#[test]
fn custom_lifecycles_control_caching() {
    /// Caches at most one instance, ever, across all scopes.
    struct Pinned {
        cell: Mutex<Option<Arc<dyn core::any::Any + Send + Sync>>>,
    }

    impl LifecyclePolicy for Pinned {
        fn name(&self) -> &'static str {
            "pinned"
        }

        fn resolve(
            &self,
            _descriptor: &plugboard_core::descriptor::Descriptor,
            build: &mut dyn FnMut()
                -> Result<Arc<dyn core::any::Any + Send + Sync>, ResolveError>,
        ) -> Result<Arc<dyn core::any::Any + Send + Sync>, ResolveError> {
            let mut cell = self.cell.lock();
            if let Some(cached) = cell.as_ref() {
                return Ok(Arc::clone(cached));
            }
            let built = build()?;
            *cell = Some(Arc::clone(&built));
            Ok(built)
        }
    }

    let container = Container::new(|registry| {
        registry.register_default(stamp().lifecycle(Lifecycle::Custom(Arc::new(Pinned {
            cell: Mutex::new(None),
        }))));
    });

    let first = container.get_instance::<Stamp>().unwrap();
    let second = container.get_instance::<Stamp>().unwrap();
    assert_eq!(first.0, second.0);

    let model = container.model().unwrap();
    assert_eq!(model[0].lifecycle, "pinned");
}

// ─────────────────────────────────────────────────────────────────────────────
// Disposal
// ─────────────────────────────────────────────────────────────────────────────

struct Resource {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Dispose for Resource {
    fn dispose(&self) {
        self.log.lock().push(self.name);
    }
}

#[test]
fn dispose_ejects_scoped_instances_newest_first() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new(|registry| {
        let log_a = Arc::clone(&log);
        let log_b = Arc::clone(&log);
        registry.register(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "a",
                    log: Arc::clone(&log_a),
                })
            })
            .named("a")
            .scoped()
            .disposable(),
        );
        registry.register(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "b",
                    log: Arc::clone(&log_b),
                })
            })
            .named("b")
            .scoped()
            .disposable(),
        );
    });

    let scope = container.nested_container().unwrap();
    scope.get_instance_named::<Resource>("a").unwrap();
    scope.get_instance_named::<Resource>("b").unwrap();

    scope.dispose();
    assert_eq!(*log.lock(), vec!["b", "a"]);
    // The parent scope is untouched.
    assert!(container.get_instance_named::<Resource>("a").is_ok());
}

#[test]
fn dispose_cascades_to_descendant_scopes() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new(|registry| {
        let log = Arc::clone(&log);
        registry.register_default(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "scoped",
                    log: Arc::clone(&log),
                })
            })
            .scoped()
            .disposable(),
        );
    });

    let nested = container.nested_container().unwrap();
    nested.get_instance::<Resource>().unwrap();

    container.dispose();
    assert_eq!(log.lock().len(), 1);
    assert!(nested.is_disposed());
    assert!(matches!(
        nested.get_instance::<Resource>(),
        Err(ResolveError::Disposed)
    ));
}

#[test]
fn tracked_transients_are_disposed_with_their_scope() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new(|registry| {
        registry.track_transients(true);
        let log = Arc::clone(&log);
        registry.register_default(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "transient",
                    log: Arc::clone(&log),
                })
            })
            .disposable(),
        );
    });

    let scope = container.nested_container().unwrap();
    scope.get_instance::<Resource>().unwrap();
    scope.get_instance::<Resource>().unwrap();

    scope.dispose();
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn release_disposes_one_tracked_instance_early() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new(|registry| {
        registry.track_transients(true);
        let log = Arc::clone(&log);
        registry.register_default(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "released",
                    log: Arc::clone(&log),
                })
            })
            .disposable(),
        );
    });

    let kept = container.get_instance::<Resource>().unwrap();
    let released = container.get_instance::<Resource>().unwrap();

    assert!(container.release(&released));
    assert_eq!(log.lock().len(), 1);
    // Releasing the same instance twice is a no-op.
    assert!(!container.release(&released));

    container.dispose();
    assert_eq!(log.lock().len(), 2);
    drop(kept);
}

#[test]
fn root_dispose_reaches_singletons() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new(|registry| {
        let log = Arc::clone(&log);
        registry.register_default(
            Instance::factory(move |_| {
                Arc::new(Resource {
                    name: "singleton",
                    log: Arc::clone(&log),
                })
            })
            .singleton()
            .disposable(),
        );
    });

    container.get_instance::<Resource>().unwrap();
    container.dispose();
    assert_eq!(*log.lock(), vec!["singleton"]);
}
