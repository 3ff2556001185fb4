//! Concurrent resolution across threads and scopes.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use plugboard_core::container::Container;
use plugboard_core::descriptor::{Ctor, Instance};

struct Expensive {
    serial: usize,
}

static BUILDS: AtomicUsize = AtomicUsize::new(0);

fn expensive() -> Instance<Expensive> {
    Instance::built(Ctor::new((), |()| {
        // Widen the race window so colliding builders actually collide.
        thread::yield_now();
        Arc::new(Expensive {
            serial: BUILDS.fetch_add(1, Ordering::SeqCst),
        })
    }))
}

/// All threads racing on a cold singleton observe the same instance.
#[test]
fn concurrent_singleton_resolution_yields_one_shared_instance() {
    let container = Container::new(|registry| {
        registry.register_default(expensive().singleton());
    });
    let container = Arc::new(container);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                container.get_instance::<Expensive>().unwrap().serial
            })
        })
        .collect();

    let serials: HashSet<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();
    assert_eq!(serials.len(), 1, "every thread saw the same singleton");
}

/// Scoped caching in one scope is also first-writer-wins under contention.
#[test]
fn concurrent_scoped_resolution_in_one_scope_is_shared() {
    let container = Container::new(|registry| {
        registry.register_default(expensive().scoped());
    });
    let scope = Arc::new(container.nested_container().unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scope = Arc::clone(&scope);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                scope.get_instance::<Expensive>().unwrap().serial
            })
        })
        .collect();

    let serials: HashSet<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();
    assert_eq!(serials.len(), 1);
}

/// Separate nested scopes never share scoped instances, even when racing.
#[test]
fn concurrent_scopes_stay_isolated() {
    let container = Container::new(|registry| {
        registry.register_default(expensive().scoped());
    });
    let container = Arc::new(container);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let scope = container.nested_container().unwrap();
                barrier.wait();
                scope.get_instance::<Expensive>().unwrap().serial
            })
        })
        .collect();

    let serials: HashSet<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();
    assert_eq!(serials.len(), 4, "each scope built its own instance");
}

/// Reconfiguring while other threads resolve is safe: each request runs
/// against one configuration generation.
#[test]
fn configure_races_with_resolution() {
    trait Flag: Send + Sync {
        fn value(&self) -> bool;
    }
    struct Off;
    impl Flag for Off {
        fn value(&self) -> bool {
            false
        }
    }
    struct On;
    impl Flag for On {
        fn value(&self) -> bool {
            true
        }
    }

    let container = Container::new(|registry| {
        registry.register_default(Instance::value(Arc::new(Off) as Arc<dyn Flag>));
    });
    let container = Arc::new(container);
    let barrier = Arc::new(Barrier::new(5));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    // Either generation is fine; failure is not.
                    let _ = container.get_instance::<dyn Flag>().unwrap();
                }
            })
        })
        .collect();

    let writer = {
        let container = Arc::clone(&container);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..20 {
                container
                    .configure(|registry| {
                        registry.register_default(Instance::value(Arc::new(On) as Arc<dyn Flag>));
                    })
                    .unwrap();
            }
        })
    };

    for handle in readers {
        handle.join().expect("reader panicked");
    }
    writer.join().expect("writer panicked");
    assert!(container.get_instance::<dyn Flag>().unwrap().value());
}
