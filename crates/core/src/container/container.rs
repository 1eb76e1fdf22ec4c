use crate::config::ContainerOptions;
use crate::container::chain;
use crate::container::debug::{ContainerDescription, RegistrationInfo};
use crate::container::descriptor::{DescriptorId, Instance, ServiceDescriptor, ServiceId};
use crate::container::gate::CreationGates;
use crate::container::lifecycle::{dispose_all, Disposable};
use crate::container::resolver::{ServiceRequest, ServiceResolver};
use crate::container::scope::{discard_duplicate, Scope, ScopeHandle, ServiceLifetime};
use crate::errors::ContainerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const ROOT_OWNER: &str = "container";

/// Who a resolution is performed for
#[derive(Clone, Copy)]
pub(crate) enum Owner<'a> {
    Root(&'a Container),
    Scope(&'a ScopeHandle),
}

impl Owner<'_> {
    fn resolver(&self) -> &dyn ServiceResolver {
        match self {
            Owner::Root(container) => *container,
            Owner::Scope(scope) => *scope,
        }
    }

    fn as_shared_resolver(&self) -> Arc<dyn ServiceResolver> {
        match self {
            Owner::Root(container) => Arc::new((*container).clone()),
            Owner::Scope(scope) => Arc::new((*scope).clone()),
        }
    }

    fn ensure_active(&self) -> Result<(), ContainerError> {
        match self {
            Owner::Root(_) => Ok(()),
            Owner::Scope(scope) => scope.ensure_active(),
        }
    }

    fn track(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        match self {
            Owner::Root(container) => container.track_root(disposable),
            Owner::Scope(scope) => scope.track(disposable),
        }
    }
}

struct ContainerState {
    /// Unkeyed registrations grouped by contract; the last entry is active
    table: HashMap<ServiceId, Vec<Arc<ServiceDescriptor>>>,
    keyed: HashMap<String, Arc<ServiceDescriptor>>,
    descriptors: Vec<Arc<ServiceDescriptor>>,
    singletons: Mutex<HashMap<DescriptorId, Instance>>,
    creation_gates: CreationGates,
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
    disposed: AtomicBool,
    options: ContainerOptions,
}

impl Drop for ContainerState {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let disposables = std::mem::take(
            self.disposables
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if let Err(error) = dispose_all(ROOT_OWNER, disposables) {
            tracing::error!(error = %error, "Container disposal failed on drop");
        }
    }
}

/// Root resolver compiled from a [`ServiceRegistry`](crate::container::ServiceRegistry).
///
/// The container is a cheap handle; clones share the same registrations,
/// singleton cache and disposal list.
///
/// Dropping the last handle disposes root-owned instances. A singleton that
/// keeps an injected `Container` or `Arc<dyn ServiceResolver>` is itself such
/// a handle, so the shared state is never dropped. Call [`dispose`](Self::dispose)
/// explicitly for those graphs; it empties the singleton cache and releases the cycle.
#[derive(Clone)]
pub struct Container {
    state: Arc<ContainerState>,
}

impl Container {
    pub(crate) fn from_descriptors(
        descriptors: Vec<ServiceDescriptor>,
        options: ContainerOptions,
    ) -> Self {
        let descriptors: Vec<Arc<ServiceDescriptor>> = descriptors.into_iter().map(Arc::new).collect();
        let mut table: HashMap<ServiceId, Vec<Arc<ServiceDescriptor>>> = HashMap::new();
        let mut keyed = HashMap::new();

        for descriptor in &descriptors {
            match &descriptor.key {
                Some(key) => {
                    keyed.insert(key.clone(), descriptor.clone());
                }
                None => table
                    .entry(descriptor.service_id)
                    .or_default()
                    .push(descriptor.clone()),
            }
        }

        tracing::info!(
            registrations = descriptors.len(),
            contracts = table.len(),
            keyed = keyed.len(),
            strict_singletons = options.strict_singletons,
            "Service container built"
        );

        Self {
            state: Arc::new(ContainerState {
                table,
                keyed,
                descriptors,
                singletons: Mutex::new(HashMap::new()),
                creation_gates: CreationGates::default(),
                disposables: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                options,
            }),
        }
    }

    /// Create a child scope sharing this container's registrations and singletons
    pub fn create_scope(&self) -> Result<Scope, ContainerError> {
        self.ensure_active()?;
        Ok(Scope::new(self.clone()))
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.state.options
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Whether an unkeyed registration exists for `T`
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.state.table.contains_key(&ServiceId::of::<T>())
    }

    /// Dispose root-owned instances in reverse creation order and clear the singleton cache.
    ///
    /// Scopes created earlier fail with `Disposed` afterwards. Calling this
    /// more than once has no further effect.
    pub fn dispose(&self) -> Result<(), ContainerError> {
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
        let result = dispose_all(ROOT_OWNER, disposables);

        let singletons = std::mem::take(
            &mut *self
                .state
                .singletons
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(singletons);

        tracing::info!(disposed = count, "Service container disposed");
        result
    }

    /// Snapshot of the registrations and the root-owned state
    pub fn describe(&self) -> ContainerDescription {
        let cached_singletons = self
            .state
            .singletons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let tracked_disposables = self
            .state
            .disposables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        let registrations = self
            .state
            .descriptors
            .iter()
            .map(|descriptor| RegistrationInfo::from_descriptor(descriptor, self.is_active(descriptor)))
            .collect();

        ContainerDescription {
            registrations,
            cached_singletons,
            tracked_disposables,
            disposed: self.is_disposed(),
            options: self.state.options.clone(),
        }
    }

    fn is_active(&self, descriptor: &ServiceDescriptor) -> bool {
        match &descriptor.key {
            Some(_) => true,
            None => self
                .state
                .table
                .get(&descriptor.service_id)
                .and_then(|entries| entries.last())
                .map_or(false, |active| active.id == descriptor.id),
        }
    }

    fn ensure_active(&self) -> Result<(), ContainerError> {
        if self.is_disposed() {
            return Err(ContainerError::disposed(ROOT_OWNER));
        }
        Ok(())
    }

    pub(crate) fn track_root(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        let mut disposables = self
            .state
            .disposables
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("root disposables"))?;

        if self.is_disposed() {
            drop(disposables);
            if let Err(error) = disposable.dispose() {
                tracing::warn!(error = %error, "Failed to dispose service created after container disposal");
            }
            return Err(ContainerError::disposed(ROOT_OWNER));
        }

        disposables.push(disposable);
        Ok(())
    }

    /// Active registration for a request, honoring keys
    fn lookup(&self, request: &ServiceRequest<'_>) -> Result<Option<&Arc<ServiceDescriptor>>, ContainerError> {
        match request.key {
            Some(key) => match self.state.keyed.get(key) {
                Some(descriptor) if descriptor.service_id != request.service_id => {
                    Err(ContainerError::TypeMismatch {
                        expected: request.service_id.type_name().to_string(),
                        found: descriptor.service_id.type_name().to_string(),
                    })
                }
                found => Ok(found),
            },
            None => Ok(self
                .state
                .table
                .get(&request.service_id)
                .and_then(|entries| entries.last())),
        }
    }

    /// Built-in identities answered without consulting the registrations
    fn resolve_builtin(
        &self,
        owner: Owner<'_>,
        request: &ServiceRequest<'_>,
    ) -> Result<Option<Option<Instance>>, ContainerError> {
        if request.key.is_some() {
            return Ok(None);
        }

        let id = request.service_id;
        if id.is::<dyn ServiceResolver>() {
            let instance: Instance = Arc::new(owner.as_shared_resolver());
            return Ok(Some(Some(instance)));
        }
        if id.is::<Container>() {
            let instance: Instance = Arc::new(Arc::new(self.clone()));
            return Ok(Some(Some(instance)));
        }
        if id.is::<ScopeHandle>() {
            return match owner {
                Owner::Scope(scope) => {
                    let instance: Instance = Arc::new(Arc::new(scope.clone()));
                    Ok(Some(Some(instance)))
                }
                Owner::Root(_) if request.required => Err(ContainerError::scope_required(id.type_name())),
                Owner::Root(_) => Ok(Some(None)),
            };
        }
        Ok(None)
    }

    pub(crate) fn resolve_request(
        &self,
        owner: Owner<'_>,
        request: &ServiceRequest<'_>,
    ) -> Result<Option<Instance>, ContainerError> {
        self.ensure_active()?;
        owner.ensure_active()?;

        if let Some(builtin) = self.resolve_builtin(owner, request)? {
            return Ok(builtin);
        }

        match self.lookup(request)? {
            Some(descriptor) => self.resolve_descriptor(owner, descriptor).map(Some),
            None => {
                if let Some(fallback) = request.fallback {
                    return fallback(owner.resolver()).map(Some);
                }
                if request.required {
                    let service = match request.key {
                        Some(key) => format!("{} [{}]", request.service_id, key),
                        None => request.service_id.type_name().to_string(),
                    };
                    return Err(ContainerError::not_registered(service, chain::current_path()));
                }
                tracing::trace!(service = %request.service_id, "Optional service not registered");
                Ok(None)
            }
        }
    }

    pub(crate) fn resolve_all(
        &self,
        owner: Owner<'_>,
        service_id: &ServiceId,
    ) -> Result<Vec<Instance>, ContainerError> {
        self.ensure_active()?;
        owner.ensure_active()?;

        match self.state.table.get(service_id) {
            Some(entries) => entries
                .iter()
                .map(|descriptor| self.resolve_descriptor(owner, descriptor))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn resolve_descriptor(
        &self,
        owner: Owner<'_>,
        descriptor: &ServiceDescriptor,
    ) -> Result<Instance, ContainerError> {
        match descriptor.lifetime {
            ServiceLifetime::Singleton => self.resolve_singleton(descriptor),
            ServiceLifetime::Scoped => match owner {
                Owner::Scope(scope) => self.resolve_scoped(scope, descriptor),
                Owner::Root(_) => Err(ContainerError::scope_required(descriptor.service_id.type_name())),
            },
            ServiceLifetime::Transient => {
                let _frame = self.enter(descriptor)?;
                let activated = descriptor.activate(owner.resolver())?;
                if let Some(disposable) = activated.disposable {
                    owner.track(disposable)?;
                }
                tracing::debug!(service = %descriptor.service_id, depth = chain::depth(), "Created transient instance");
                Ok(activated.instance)
            }
        }
    }

    fn enter(&self, descriptor: &ServiceDescriptor) -> Result<chain::ChainFrame, ContainerError> {
        chain::enter(descriptor.chain_entry(), self.state.options.max_resolution_depth)
    }

    fn cached_singleton(&self, id: DescriptorId) -> Result<Option<Instance>, ContainerError> {
        let singletons = self
            .state
            .singletons
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("singleton cache"))?;
        Ok(singletons.get(&id).cloned())
    }

    fn resolve_singleton(&self, descriptor: &ServiceDescriptor) -> Result<Instance, ContainerError> {
        if let Some(instance) = self.cached_singleton(descriptor.id)? {
            tracing::trace!(service = %descriptor.service_id, "Singleton cache hit");
            return Ok(instance);
        }

        // Cycle check happens before the gate so a self-dependency fails
        // instead of blocking on its own gate.
        let _frame = self.enter(descriptor)?;

        if !self.state.options.strict_singletons {
            return self.create_singleton(descriptor);
        }

        let _gate = self
            .state
            .creation_gates
            .acquire(descriptor.id, descriptor.service_id)?;
        if let Some(instance) = self.cached_singleton(descriptor.id)? {
            return Ok(instance);
        }
        self.create_singleton(descriptor)
    }

    fn create_singleton(&self, descriptor: &ServiceDescriptor) -> Result<Instance, ContainerError> {
        let activated = descriptor.activate(self)?;

        {
            let mut singletons = self
                .state
                .singletons
                .lock()
                .map_err(|_| ContainerError::lock_poisoned("singleton cache"))?;

            if let Some(existing) = singletons.get(&descriptor.id).cloned() {
                drop(singletons);
                discard_duplicate(activated, ROOT_OWNER);
                return Ok(existing);
            }
            singletons.insert(descriptor.id, activated.instance.clone());
        }

        if let Some(disposable) = activated.disposable {
            self.track_root(disposable)?;
        }
        tracing::debug!(service = %descriptor.service_id, depth = chain::depth(), "Created singleton instance");
        Ok(activated.instance)
    }

    fn resolve_scoped(
        &self,
        scope: &ScopeHandle,
        descriptor: &ServiceDescriptor,
    ) -> Result<Instance, ContainerError> {
        if let Some(instance) = scope.cached(descriptor.id)? {
            tracing::trace!(service = %descriptor.service_id, scope = %scope.id(), "Scoped cache hit");
            return Ok(instance);
        }

        let _frame = self.enter(descriptor)?;
        let activated = descriptor.activate(scope)?;
        let instance = scope.store(descriptor.id, activated)?;
        tracing::debug!(
            service = %descriptor.service_id,
            scope = %scope.id(),
            depth = chain::depth(),
            "Created scoped instance"
        );
        Ok(instance)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.state.descriptors.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl ServiceResolver for Container {
    fn resolve_instance(
        &self,
        request: &ServiceRequest<'_>,
    ) -> Result<Option<Instance>, ContainerError> {
        self.resolve_request(Owner::Root(self), request)
    }

    fn resolve_all_instances(&self, service_id: &ServiceId) -> Result<Vec<Instance>, ContainerError> {
        self.resolve_all(Owner::Root(self), service_id)
    }

    fn track_disposable(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError> {
        self.track_root(disposable)
    }

    fn max_resolution_depth(&self) -> usize {
        self.state.options.max_resolution_depth
    }
}
