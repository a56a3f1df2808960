//! The provider contract: validate / plan / apply, plus the registry.
//!
//! A provider narrows the parser's dynamic attribute map at `validate` time,
//! queries the live system in `plan` without mutating it, and converges the
//! system in `apply`. `apply` must be idempotent: applying to an
//! already-converged system yields `Unchanged` and no side effects.

pub mod file;
pub mod package;
pub mod service;
pub mod windows_feature;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::dsl::{AttrMap, Value};
use crate::error::RegistryError;

/// Cooperative cancellation flag threaded through provider entry points.
///
/// Providers check it before starting side effects; a set token makes the
/// next `validate`/`plan`/`apply` call fail instead of touching the system.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Bail out of a provider operation when the run has been cancelled.
macro_rules! ensure_not_cancelled {
    ($token:expr) => {
        if $token.is_cancelled() {
            anyhow::bail!("operation cancelled");
        }
    };
}

pub(crate) use ensure_not_cancelled;

/// Terminal status of a resource after a provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unchanged,
    Planned,
    Created,
    Updated,
    Deleted,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unchanged => write!(f, "unchanged"),
            Status::Planned => write!(f, "planned"),
            Status::Created => write!(f, "created"),
            Status::Updated => write!(f, "updated"),
            Status::Deleted => write!(f, "deleted"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

/// The state of a resource as reported by a provider.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub kind: String,
    pub name: String,
    pub attributes: AttrMap,
    pub status: Status,
    /// Populated iff `status` is [`Status::Failed`].
    pub error: Option<String>,
}

impl ResourceState {
    /// A fresh state for `plan` output, starting from `Unchanged`.
    #[must_use]
    pub fn new(kind: &str, name: &str, attributes: AttrMap) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            attributes,
            status: Status::Unchanged,
            error: None,
        }
    }

    /// A failed state carrying the error message.
    #[must_use]
    pub fn failed(kind: &str, name: &str, attributes: AttrMap, error: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            attributes,
            status: Status::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// The capability set every resource provider implements.
pub trait ResourceProvider {
    /// Check that the attributes are valid. Must not touch the live system.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid attribute.
    fn validate(&self, token: &CancelToken, attributes: &AttrMap) -> Result<()>;

    /// Report what would change. May query the live system; must not mutate
    /// it. The returned state carries the desired attributes and a status of
    /// `Unchanged` or `Planned`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state cannot be determined.
    fn plan(&self, token: &CancelToken, current: &AttrMap, desired: &AttrMap)
        -> Result<ResourceState>;

    /// Converge the live system to the planned state. Idempotent: applying to
    /// an already-converged system yields `Unchanged` and no side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if a filesystem operation or subprocess fails.
    fn apply(&self, token: &CancelToken, state: &ResourceState) -> Result<ResourceState>;
}

impl fmt::Debug for dyn ResourceProvider + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ResourceProvider")
    }
}

/// Mapping from resource-type tag to provider instance. Registration is
/// one-shot at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a resource type.
    pub fn register(&mut self, kind: &str, provider: Box<dyn ResourceProvider>) {
        self.providers.insert(kind.to_string(), provider);
    }

    /// Look up the provider for a resource type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when no provider is registered for `kind`.
    pub fn get(&self, kind: &str) -> Result<&dyn ResourceProvider, RegistryError> {
        self.providers
            .get(kind)
            .map(Box::as_ref)
            .ok_or_else(|| RegistryError(kind.to_string()))
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The registry with every built-in provider registered.
#[must_use]
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register("file", Box::new(file::FileProvider::new()));
    registry.register("package", Box::new(package::PackageProvider::new()));
    registry.register("service", Box::new(service::ServiceProvider::new()));
    registry.register(
        "windows_feature",
        Box::new(windows_feature::WindowsFeatureProvider::new()),
    );
    registry
}

/// Narrow an attribute to a string, if present.
pub(crate) fn attr_str<'a>(attributes: &'a AttrMap, key: &str) -> Option<&'a str> {
    attributes.get(key).and_then(Value::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct NullProvider;

    impl ResourceProvider for NullProvider {
        fn validate(&self, _token: &CancelToken, _attributes: &AttrMap) -> Result<()> {
            Ok(())
        }

        fn plan(
            &self,
            _token: &CancelToken,
            _current: &AttrMap,
            desired: &AttrMap,
        ) -> Result<ResourceState> {
            Ok(ResourceState::new("null", "x", desired.clone()))
        }

        fn apply(&self, _token: &CancelToken, state: &ResourceState) -> Result<ResourceState> {
            Ok(state.clone())
        }
    }

    #[test]
    fn registry_round_trip() {
        let mut registry = ProviderRegistry::new();
        registry.register("null", Box::new(NullProvider));
        assert!(registry.get("null").is_ok());
    }

    #[test]
    fn registry_unknown_type_fails() {
        let registry = ProviderRegistry::new();
        let err = registry.get("mount").unwrap_err();
        assert_eq!(
            err.to_string(),
            "no provider registered for resource type mount"
        );
    }

    #[test]
    fn default_registry_covers_all_builtin_types() {
        let registry = default_registry();
        for kind in ["file", "package", "service", "windows_feature"] {
            assert!(registry.get(kind).is_ok(), "{kind} should be registered");
        }
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let cloned = token.clone();
        assert!(cloned.is_cancelled(), "clones share the flag");
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::Unchanged.to_string(), "unchanged");
        assert_eq!(Status::Planned.to_string(), "planned");
        assert_eq!(Status::Created.to_string(), "created");
        assert_eq!(Status::Updated.to_string(), "updated");
        assert_eq!(Status::Deleted.to_string(), "deleted");
        assert_eq!(Status::Failed.to_string(), "failed");
    }

    #[test]
    fn failed_state_carries_error() {
        let state = ResourceState::failed("file", "x", AttrMap::new(), "boom");
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }
}
