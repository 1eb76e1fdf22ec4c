use crate::config::ConfigError;
use crate::container::container::{Container, Owner};
use crate::container::descriptor::{Activated, DescriptorId, Instance, ServiceId};
use crate::container::lifecycle::{dispose_all, Disposable};
use crate::container::resolver::{ServiceRequest, ServiceResolver};
use crate::errors::ContainerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Service lifetime enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLifetime {
    /// Single instance shared across the application and all scopes
    Singleton,
    /// One instance per scope
    Scoped,
    /// New instance created for each request
    Transient,
}

impl ServiceLifetime {
    pub fn is_singleton(&self) -> bool {
        matches!(self, ServiceLifetime::Singleton)
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, ServiceLifetime::Scoped)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceLifetime::Transient)
    }

    /// Get the lifetime name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceLifetime::Singleton => "singleton",
            ServiceLifetime::Scoped => "scoped",
            ServiceLifetime::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ServiceLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServiceLifetime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(ServiceLifetime::Singleton),
            "scoped" => Ok(ServiceLifetime::Scoped),
            "transient" => Ok(ServiceLifetime::Transient),
            _ => Err(ConfigError::invalid_value(
                "lifetime",
                s,
                "one of: singleton, scoped, transient",
            )),
        }
    }
}

/// State owned by one scope: its cache and its disposal list
pub(crate) struct ScopeState {
    id: Uuid,
    instances: Mutex<HashMap<DescriptorId, Instance>>,
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
    disposed: AtomicBool,
}

impl ScopeState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            instances: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn owner_name(&self) -> String {
        format!("scope {}", self.id)
    }
}

/// Cloneable reference to a live scope.
///
/// Handles are what factories and services receive when they ask for the
/// current scope. They can resolve services but cannot end the scope; that is
/// reserved for the owning [`Scope`].
#[derive(Clone)]
pub struct ScopeHandle {
    container: Container,
    state: Arc<ScopeState>,
}

impl ScopeHandle {
    pub fn id(&self) -> Uuid {
        self.state.id
    }

    /// Root container this scope was created from
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_active(&self) -> Result<(), ContainerError> {
        if self.is_disposed() {
            return Err(ContainerError::disposed(self.state.owner_name()));
        }
        Ok(())
    }

    pub(crate) fn cached(&self, id: DescriptorId) -> Result<Option<Instance>, ContainerError> {
        let instances = self
            .state
            .instances
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("scoped instance cache"))?;
        Ok(instances.get(&id).cloned())
    }

    /// Cache a newly created scoped instance.
    ///
    /// If another caller stored one first, the existing instance wins and the
    /// new one is disposed without being tracked.
    pub(crate) fn store(
        &self,
        id: DescriptorId,
        activated: Activated,
    ) -> Result<Instance, ContainerError> {
        {
            let mut instances = self
                .state
                .instances
                .lock()
                .map_err(|_| ContainerError::lock_poisoned("scoped instance cache"))?;

            if let Some(existing) = instances.get(&id).cloned() {
                drop(instances);
                discard_duplicate(activated, &self.state.owner_name());
                return Ok(existing);
            }

            instances.insert(id, activated.instance.clone());
        }

        if let Some(disposable) = activated.disposable {
            self.track(disposable)?;
        }
        Ok(activated.instance)
    }

    pub(crate) fn track(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        let mut disposables = self
            .state
            .disposables
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("scope disposables"))?;

        if self.is_disposed() {
            drop(disposables);
            if let Err(error) = disposable.dispose() {
                tracing::warn!(scope = %self.id(), error = %error, "Failed to dispose service created after scope disposal");
            }
            return Err(ContainerError::disposed(self.state.owner_name()));
        }

        disposables.push(disposable);
        Ok(())
    }

    fn dispose(&self) -> Result<(), ContainerError> {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let disposables = std::mem::take(
            &mut *self
                .state
                .disposables
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = disposables.len();
        let result = dispose_all(&self.state.owner_name(), disposables);

        let instances = std::mem::take(
            &mut *self
                .state
                .instances
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(instances);

        tracing::debug!(scope = %self.id(), disposed = count, "Scope disposed");
        result
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("id", &self.state.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl ServiceResolver for ScopeHandle {
    fn resolve_instance(
        &self,
        request: &ServiceRequest<'_>,
    ) -> Result<Option<Instance>, ContainerError> {
        self.container.resolve_request(Owner::Scope(self), request)
    }

    fn resolve_all_instances(&self, service_id: &ServiceId) -> Result<Vec<Instance>, ContainerError> {
        self.container.resolve_all(Owner::Scope(self), service_id)
    }

    fn track_disposable(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        self.track(disposable)
    }

    fn max_resolution_depth(&self) -> usize {
        self.container.max_resolution_depth()
    }
}

/// A bounded resolution context with its own cache of scoped instances.
///
/// Dropping the scope disposes it. Disposal failures during drop are logged.
pub struct Scope {
    handle: ScopeHandle,
}

impl Scope {
    pub(crate) fn new(container: Container) -> Self {
        let handle = ScopeHandle {
            container,
            state: Arc::new(ScopeState::new()),
        };
        tracing::debug!(scope = %handle.id(), "Scope created");
        Self { handle }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// Cloneable handle for passing this scope to other code
    pub fn handle(&self) -> ScopeHandle {
        self.handle.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    /// Dispose tracked instances in reverse creation order and clear the cache.
    ///
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) -> Result<(), ContainerError> {
        self.handle.dispose()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.handle.state.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Err(error) = self.handle.dispose() {
            tracing::error!(scope = %self.handle.id(), error = %error, "Scope disposal failed on drop");
        }
    }
}

impl ServiceResolver for Scope {
    fn resolve_instance(
        &self,
        request: &ServiceRequest<'_>,
    ) -> Result<Option<Instance>, ContainerError> {
        self.handle.resolve_instance(request)
    }

    fn resolve_all_instances(&self, service_id: &ServiceId) -> Result<Vec<Instance>, ContainerError> {
        self.handle.resolve_all_instances(service_id)
    }

    fn track_disposable(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        self.handle.track(disposable)
    }

    fn max_resolution_depth(&self) -> usize {
        self.handle.max_resolution_depth()
    }
}

/// Dispose the losing instance of a creation race
pub(crate) fn discard_duplicate(activated: Activated, owner: &str) {
    if let Some(disposable) = activated.disposable {
        tracing::warn!(owner = owner, "Discarding duplicate instance created by a concurrent resolution");
        if let Err(error) = disposable.dispose() {
            tracing::error!(owner = owner, error = %error, "Failed to dispose discarded instance");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_lifetime_parsing() {
        assert_eq!(ServiceLifetime::from_str("Singleton").unwrap(), ServiceLifetime::Singleton);
        assert_eq!(ServiceLifetime::from_str("scoped").unwrap(), ServiceLifetime::Scoped);
        assert_eq!(ServiceLifetime::from_str("TRANSIENT").unwrap(), ServiceLifetime::Transient);
        assert!(ServiceLifetime::from_str("request").is_err());
    }

    #[test]
    fn test_lifetime_predicates_and_display() {
        assert!(ServiceLifetime::Scoped.is_scoped());
        assert!(!ServiceLifetime::Scoped.is_singleton());
        assert_eq!(ServiceLifetime::Transient.to_string(), "transient");
    }

    #[test]
    fn test_lifetime_serde_lowercase() {
        let json = serde_json::to_string(&ServiceLifetime::Singleton).unwrap();
        assert_eq!(json, "\"singleton\"");
        let parsed: ServiceLifetime = serde_json::from_str("\"scoped\"").unwrap();
        assert_eq!(parsed, ServiceLifetime::Scoped);
    }
}
