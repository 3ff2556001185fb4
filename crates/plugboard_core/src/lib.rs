//! The runtime dependency-injection engine for Plugboard.
//!
//! `plugboard_core` resolves object graphs from typed registrations:
//!
//! - [`key`] - Service identity (type plus optional instance name)
//! - [`descriptor`] - Registrations, constructors, and dependency specs
//! - [`graph`] - The registry builder and the sealed instance graph
//! - [`plan`] - Build-plan compilation, caching, and cycle detection
//! - [`lifecycle`] - Lifecycles, object caches, and disposal
//! - [`session`] - Per-request resolution state and factory context
//! - [`intercept`] - Post-construction activation and decoration
//! - [`container`] - The public container and scope hierarchy
//!
//! # Architecture
//!
//! Resolution is split into a structural phase and an execution phase.
//! Planning compiles one immutable [`plan`] per registration, detecting
//! missing, ambiguous, and cyclic dependencies without constructing
//! anything; execution walks the plan inside a per-request
//! [`session`], consulting the lifecycle caches of the resolving scope.
//! Reconfiguring a container swaps in a new configuration generation and
//! discards compiled plans wholesale.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use plugboard_core::container::Container;
//! use plugboard_core::descriptor::{Ctor, Dep, Instance};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct Audience(&'static str);
//!
//! struct Spokesperson {
//!     audience: Arc<Audience>,
//! }
//!
//! impl Greeter for Spokesperson {
//!     fn greet(&self) -> String {
//!         format!("hello, {}", self.audience.0)
//!     }
//! }
//!
//! let container = Container::new(|registry| {
//!     registry.register_default(Instance::value(Arc::new(Audience("world"))));
//!     registry.register_default::<dyn Greeter>(Instance::built(Ctor::new(
//!         (Dep::<Audience>::auto(),),
//!         |(audience,)| Arc::new(Spokesperson { audience }) as Arc<dyn Greeter>,
//!     )));
//! });
//!
//! let greeter = container.get_instance::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "hello, world");
//! ```

/// The public container and scope hierarchy.
pub mod container;

/// Registrations, constructors, and dependency specs.
pub mod descriptor;

/// Resolution and configuration errors.
pub mod error;

/// The registry builder and the sealed instance graph.
pub mod graph;

/// Post-construction activation and decoration.
pub mod intercept;

/// Service identity.
pub mod key;

/// Lifecycles, object caches, and disposal.
pub mod lifecycle;

/// Build-plan compilation and caching.
pub mod plan;

/// Per-request resolution state and factory context.
pub mod session;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::container::{Container, DescriptorInfo, ScopeRole};
    pub use crate::descriptor::{Ctor, Dep, DepAll, Descriptor, Instance, SetterSet};
    pub use crate::error::{ConfigIssue, ConfigReport, ResolveError, ValidationReport};
    pub use crate::graph::{CloseTemplate, CtorSelection, Registry, TemplateTable};
    pub use crate::intercept::{InterceptionPolicy, Interceptor};
    pub use crate::key::ServiceKey;
    pub use crate::lifecycle::{Dispose, Lifecycle, LifecyclePolicy};
    pub use crate::session::BuildSession;
}
