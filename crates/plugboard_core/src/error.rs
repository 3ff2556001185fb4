//! Error taxonomy for resolution and configuration.
//!
//! All resolution failures are deterministic functions of the configuration,
//! so nothing here is ever retried internally. Errors carry the resolution
//! path that led to them; the path is never dropped for brevity.

use crate::key::ServiceKey;

/// A failure raised by user construction code (a factory or constructor
/// closure). Preserved as the source of [`ResolveError::BuildFailed`].
pub type BuildError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// Renders an ancestor chain for diagnostics, or nothing when empty.
fn fmt_path(path: &[String]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (while building: {})", path.join(" -> "))
    }
}

/// Errors raised while building a plan or executing a resolution request.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Nothing is registered for the requested key and no auto-resolution
    /// is possible.
    #[error("no registration for {key}{}", fmt_path(.path))]
    NoDefault {
        /// The key that missed.
        key: String,
        /// Ancestor chain of the resolution walk, outermost first.
        path: Vec<String>,
    },

    /// Multiple candidates are registered and none is designated default.
    #[error("ambiguous default for {key}: candidates are [{}]", .candidates.join(", "))]
    AmbiguousDefault {
        /// The key with competing registrations.
        key: String,
        /// Labels of the competing registrations, in registration order.
        candidates: Vec<String>,
    },

    /// A required dependency has no way to be satisfied.
    #[error("cannot resolve parameter '{param}' of {declaring}{}", fmt_path(.path))]
    Unresolvable {
        /// The declared parameter name.
        param: &'static str,
        /// Label of the descriptor declaring the parameter.
        declaring: String,
        /// Ancestor chain of the resolution walk, outermost first.
        path: Vec<String>,
    },

    /// A descriptor appeared as its own transitive dependency.
    #[error("bidirectional dependency detected: {}", .members.join(" -> "))]
    Cycle {
        /// The cycle members in walk order; the first member repeats last.
        members: Vec<String>,
    },

    /// The scope this request was issued against has been disposed.
    #[error("container has been disposed")]
    Disposed,

    /// User construction code failed; the cause is preserved.
    #[error("building {descriptor} failed at depth {depth}")]
    BuildFailed {
        /// Label of the descriptor whose construction failed.
        descriptor: String,
        /// Depth in the object graph at which the failure occurred.
        depth: usize,
        /// The originating failure.
        #[source]
        source: BuildError,
    },

    /// An erased instance did not hold the type the caller asked for.
    ///
    /// Registrations are typed, so this indicates a registration whose
    /// descriptor produces a different type than the family it was
    /// registered under.
    #[error("instance resolved for {key} is not a {expected}")]
    TypeMismatch {
        /// The key being resolved.
        key: String,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// The family has a configuration error recorded at seal time.
    #[error("configuration error for {key}: {issue}")]
    Configuration {
        /// The affected key.
        key: String,
        /// The seal-time issue, rendered.
        issue: String,
    },
}

impl ResolveError {
    pub(crate) fn no_default(key: &ServiceKey, path: Vec<String>) -> Self {
        Self::NoDefault {
            key: key.to_string(),
            path,
        }
    }

    /// Returns true when the error means "nothing registered", the only
    /// condition `try_get_instance` converts into an empty result.
    #[must_use]
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NoDefault { .. })
    }
}

/// A malformed or contradictory registration discovered at seal time.
///
/// Issues do not abort the configuration pass; the affected family fails at
/// resolution time with a [`ResolveError::Configuration`] referencing the
/// issue, while independently valid families stay usable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigIssue {
    /// Two registrations for the family share an instance name.
    #[error("{type_name}: instance name '{name}' is registered more than once")]
    DuplicateName {
        /// The affected service type.
        type_name: &'static str,
        /// The colliding instance name.
        name: &'static str,
    },
}

/// Aggregate of all [`ConfigIssue`]s discovered while sealing a registry.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    issues: Vec<ConfigIssue>,
}

impl ConfigReport {
    pub(crate) fn push(&mut self, issue: ConfigIssue) {
        self.issues.push(issue);
    }

    /// Returns true when sealing discovered no issues.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// All issues, in discovery order.
    #[must_use]
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }
}

impl core::fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.issues.is_empty() {
            return f.write_str("configuration is clean");
        }
        writeln!(f, "{} configuration issue(s):", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// The aggregate result of eagerly building a plan for every registered
/// descriptor, produced by `Container::assert_configuration_is_valid`.
#[derive(Debug, thiserror::Error)]
#[error("configuration is invalid:\n{}", .failures.join("\n"))]
pub struct ValidationReport {
    /// One rendered failure per descriptor that could not be planned.
    failures: Vec<String>,
}

impl ValidationReport {
    pub(crate) fn new(failures: Vec<String>) -> Self {
        Self { failures }
    }

    /// The individual failures, in registration order.
    #[must_use]
    pub fn failures(&self) -> &[String] {
        &self.failures
    }
}
