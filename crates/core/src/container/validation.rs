use crate::container::container::Container;
use crate::container::descriptor::{Activation, ServiceDescriptor, ServiceId};
use crate::container::resolver::ServiceResolver;
use crate::container::scope::{ScopeHandle, ServiceLifetime};
use crate::errors::ContainerError;
use std::collections::{HashMap, HashSet};

/// Dependency graph between implementation types, for cycle detection
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<ServiceId, Vec<ServiceId>>,
    order: Vec<ServiceId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service and its direct dependencies
    pub fn add_service(&mut self, service_id: ServiceId, dependencies: impl IntoIterator<Item = ServiceId>) {
        if !self.nodes.contains_key(&service_id) {
            self.order.push(service_id);
        }
        self.nodes.entry(service_id).or_default().extend(dependencies);
    }

    pub fn dependencies_of(&self, service_id: &ServiceId) -> &[ServiceId] {
        self.nodes.get(service_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Detect circular dependencies, reporting the first cycle found as `A -> B -> A`
    pub fn detect_cycles(&self) -> Result<(), ContainerError> {
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();

        for service_id in &self.order {
            if !visited.contains(service_id) {
                let mut path = Vec::new();
                self.detect_cycle_dfs(service_id, &mut visited, &mut in_progress, &mut path)?;
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        &self,
        service_id: &ServiceId,
        visited: &mut HashSet<ServiceId>,
        in_progress: &mut HashSet<ServiceId>,
        path: &mut Vec<ServiceId>,
    ) -> Result<(), ContainerError> {
        if in_progress.contains(service_id) {
            let start = path.iter().position(|id| id == service_id).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].iter().map(|id| id.type_name()).collect();
            cycle.push(service_id.type_name());
            return Err(ContainerError::CircularDependency {
                chain: cycle.join(" -> "),
            });
        }

        if visited.contains(service_id) {
            return Ok(());
        }

        in_progress.insert(*service_id);
        path.push(*service_id);

        for dependency in self.dependencies_of(service_id) {
            self.detect_cycle_dfs(dependency, visited, in_progress, path)?;
        }

        path.pop();
        in_progress.remove(service_id);
        visited.insert(*service_id);

        Ok(())
    }
}

fn is_builtin(service_id: &ServiceId) -> bool {
    service_id.is::<dyn ServiceResolver>() || service_id.is::<Container>() || service_id.is::<ScopeHandle>()
}

/// Check constructor registrations before the container is built.
///
/// Every constructor registration needs a viable constructor and a registered
/// (or built-in, defaulted, nullable or self-constructing) value for each
/// parameter; singletons may not depend on scoped services; and the
/// dependency graph must be acyclic.
pub(crate) fn validate_descriptors(descriptors: &[ServiceDescriptor]) -> Result<(), ContainerError> {
    let mut active: HashMap<ServiceId, &ServiceDescriptor> = HashMap::new();
    let mut keyed: HashMap<&str, &ServiceDescriptor> = HashMap::new();
    for descriptor in descriptors {
        match descriptor.key() {
            Some(key) => {
                keyed.insert(key, descriptor);
            }
            None => {
                active.insert(descriptor.service_id, descriptor);
            }
        }
    }

    let mut graph = DependencyGraph::new();

    for descriptor in descriptors {
        let Activation::Constructor(plan) = &descriptor.activation else {
            continue;
        };
        let parameters = plan.parameters().ok_or_else(|| ContainerError::NoViableConstructor {
            implementation: plan.implementation().type_name().to_string(),
            supplied: String::new(),
        })?;

        let mut dependencies = Vec::new();
        for parameter in parameters {
            let target = match parameter.key.as_deref() {
                Some(key) => match keyed.get(key) {
                    Some(found) if found.service_id != parameter.service_id => {
                        return Err(ContainerError::TypeMismatch {
                            expected: parameter.service_id.type_name().to_string(),
                            found: found.service_id.type_name().to_string(),
                        });
                    }
                    found => found.copied(),
                },
                None => active.get(&parameter.service_id).copied(),
            };
            let builtin = parameter.key.is_none() && is_builtin(&parameter.service_id);

            if target.is_none() && !builtin && parameter.is_required() {
                return Err(ContainerError::UnresolvableParameter {
                    parameter: parameter.name.to_string(),
                    parameter_type: parameter.service_id.type_name().to_string(),
                    implementation: plan.implementation().type_name().to_string(),
                    chain: String::new(),
                });
            }

            let captive = match target {
                Some(target) => target.lifetime == ServiceLifetime::Scoped,
                None => builtin && parameter.service_id.is::<ScopeHandle>(),
            };
            if descriptor.lifetime.is_singleton() && captive {
                return Err(ContainerError::scope_required(parameter.service_id.type_name()));
            }

            if let Some(target) = target {
                dependencies.push(target.entry_id());
            }
        }

        graph.add_service(descriptor.entry_id(), dependencies);
    }

    graph.detect_cycles()?;
    tracing::debug!(
        registrations = descriptors.len(),
        constructed_types = graph.len(),
        "Service registrations validated"
    );
    Ok(())
}
