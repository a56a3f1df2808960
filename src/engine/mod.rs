//! The execution engine: graph → topological order → platform gate → two
//! phases.
//!
//! `plan` reports the diff against the live system without mutating it;
//! `apply` converges resource by resource, strictly sequentially, in an
//! order where dependencies precede dependents. Provider runtime failures
//! are recorded per resource and do not abort the run; graph and validation
//! errors are fatal before any apply.

pub mod graph;

use std::collections::BTreeMap;
use std::fmt;

use crate::dsl::{AttrMap, Resource, Value};
use crate::error::EngineError;
use crate::platform::Platform;
use crate::providers::{CancelToken, ProviderRegistry, ResourceState, Status};

use graph::ResourceGraph;

/// What the plan phase decided for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
    Error,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
            Action::NoOp => write!(f, "no-op"),
            Action::Error => write!(f, "error"),
        }
    }
}

/// A planned action for a resource.
#[derive(Debug, Clone)]
pub struct PlanAction {
    pub action: Action,
    pub details: String,
}

/// The core execution engine. The provider registry is injected at startup.
#[derive(Debug)]
pub struct Engine {
    registry: ProviderRegistry,
    platform: Platform,
}

impl Engine {
    #[must_use]
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::with_platform(registry, Platform::detect())
    }

    /// An engine gating against an explicit platform instead of the detected
    /// one.
    #[must_use]
    pub fn with_platform(registry: ProviderRegistry, platform: Platform) -> Self {
        Self { registry, platform }
    }

    /// Report the changes a run would make, without mutating the system.
    ///
    /// # Errors
    ///
    /// Fatal on missing dependency targets, dependency cycles, unknown
    /// provider types, and validation failures.
    pub fn plan(
        &self,
        token: &CancelToken,
        resources: Vec<Resource>,
    ) -> Result<BTreeMap<String, PlanAction>, EngineError> {
        let mut graph = ResourceGraph::build(resources)?;
        self.validate(token, &mut graph)?;
        let order = graph.topo_sort()?;

        let mut results = BTreeMap::new();
        for node_id in order {
            let resource = &graph.node(node_id).resource;
            if !self.is_supported(resource) {
                tracing::debug!("skipping {} (platform not supported)", resource.id());
                continue;
            }

            let id = resource.id();
            let provider = match self.registry.get(&resource.kind) {
                Ok(provider) => provider,
                Err(e) => {
                    results.insert(
                        id,
                        PlanAction {
                            action: Action::Error,
                            details: format!("error getting provider: {e}"),
                        },
                    );
                    continue;
                }
            };

            // The current map is an extension point; the live machine is the
            // system of record, so providers are planned against an empty
            // prior state.
            let current = AttrMap::new();
            let planned = match provider.plan(token, &current, &resource.attributes) {
                Ok(planned) => planned,
                Err(e) => {
                    results.insert(
                        id,
                        PlanAction {
                            action: Action::Error,
                            details: format!("error planning: {e}"),
                        },
                    );
                    continue;
                }
            };

            let (action, details) = match planned.status {
                Status::Planned => {
                    if current.contains_key("path") {
                        (Action::Update, "resource will be updated")
                    } else {
                        (Action::Create, "resource will be created")
                    }
                }
                _ => (Action::NoOp, "resource already in desired state"),
            };

            results.insert(
                id,
                PlanAction {
                    action,
                    details: details.to_string(),
                },
            );
        }

        Ok(results)
    }

    /// Converge the live system, resource by resource in dependency order.
    ///
    /// Provider failures are recorded on the resource and the run continues;
    /// the result map has one entry per supported, processed resource.
    ///
    /// # Errors
    ///
    /// Fatal on missing dependency targets, dependency cycles, unknown
    /// provider types, and validation failures — all before any apply.
    pub fn apply(
        &self,
        token: &CancelToken,
        resources: Vec<Resource>,
    ) -> Result<BTreeMap<String, ResourceState>, EngineError> {
        let mut graph = ResourceGraph::build(resources)?;
        self.validate(token, &mut graph)?;
        let order = graph.topo_sort()?;

        let mut results = BTreeMap::new();
        for node_id in order {
            let resource = &graph.node(node_id).resource;
            let id = resource.id();

            if !self.is_supported(resource) {
                tracing::info!("skipping {id} (platform not supported)");
                continue;
            }

            let provider = match self.registry.get(&resource.kind) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::error!("error getting provider for {id}: {e}");
                    results.insert(
                        id,
                        ResourceState::failed(
                            &resource.kind,
                            &resource.name,
                            resource.attributes.clone(),
                            &e.to_string(),
                        ),
                    );
                    continue;
                }
            };

            let planned = match provider.plan(token, &AttrMap::new(), &resource.attributes) {
                Ok(planned) => planned,
                Err(e) => {
                    tracing::error!("error planning {id}: {e}");
                    results.insert(
                        id,
                        ResourceState::failed(
                            &resource.kind,
                            &resource.name,
                            resource.attributes.clone(),
                            &e.to_string(),
                        ),
                    );
                    continue;
                }
            };

            tracing::info!("applying {id}");
            let state = match provider.apply(token, &planned) {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!("error applying {id}: {e}");
                    ResourceState::failed(
                        &resource.kind,
                        &resource.name,
                        resource.attributes.clone(),
                        &e.to_string(),
                    )
                }
            };

            results.insert(id, state);
        }

        Ok(results)
    }

    /// Validate every platform-supported resource, default-filling the
    /// `name` attribute from the block header first. Any failure is fatal.
    fn validate(&self, token: &CancelToken, graph: &mut ResourceGraph) -> Result<(), EngineError> {
        for node_id in graph.sorted_ids() {
            if !self.is_supported(&graph.node(node_id).resource) {
                continue;
            }

            let id = graph.node(node_id).resource.id();
            let provider = self
                .registry
                .get(&graph.node(node_id).resource.kind)
                .map_err(|source| EngineError::MissingProvider {
                    resource: id.clone(),
                    source,
                })?;

            let node = graph.node_mut(node_id);
            if !node.resource.attributes.contains_key("name") {
                node.resource
                    .attributes
                    .insert("name".to_string(), Value::Scalar(node.resource.name.clone()));
            }

            provider
                .validate(token, &node.resource.attributes)
                .map_err(|e| EngineError::Validation {
                    resource: id,
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// A resource is supported when it has no platform condition, or at
    /// least one condition entry matches the host (`unix` matching both
    /// Linux and macOS).
    fn is_supported(&self, resource: &Resource) -> bool {
        match resource.conditions.get("platform") {
            None => true,
            Some(platforms) => self.platform.is_supported(platforms),
        }
    }
}
