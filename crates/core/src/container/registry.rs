use crate::config::ContainerOptions;
use crate::container::autowiring::{plan_for, Injectable, Upcast};
use crate::container::container::Container;
use crate::container::descriptor::{
    Activated, Activation, DescriptorId, FactoryFn, Instance, ServiceDescriptor, ServiceId,
};
use crate::container::lifecycle::Disposable;
use crate::container::module::ServiceModule;
use crate::container::resolver::ServiceResolver;
use crate::container::scope::ServiceLifetime;
use crate::container::validation::validate_descriptors;
use crate::errors::{BoxError, ContainerError};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered, append-only collection of registrations.
///
/// For a contract registered more than once, the last registration is the one
/// resolved singly; all of them are returned by `get_services`.
pub struct ServiceRegistry {
    descriptors: Vec<ServiceDescriptor>,
    keys: HashMap<String, ServiceId>,
    options: ContainerOptions,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            descriptors: Vec::new(),
            keys: HashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ContainerOptions) -> &mut Self {
        self.options = options;
        self
    }

    fn push(
        &mut self,
        service_id: ServiceId,
        lifetime: ServiceLifetime,
        key: Option<String>,
        activation: Activation,
    ) {
        let descriptor = ServiceDescriptor {
            id: DescriptorId(self.descriptors.len()),
            service_id,
            lifetime,
            key,
            activation,
        };
        tracing::trace!(
            service = %descriptor.service_id,
            implementation = descriptor.implementation_name(),
            lifetime = %descriptor.lifetime,
            key = ?descriptor.key,
            "Service registered"
        );
        self.descriptors.push(descriptor);
    }

    fn reserve_key(&mut self, key: &str, service_id: ServiceId, attempted: &str) -> Result<(), ContainerError> {
        if let Some(existing) = self.keys.get(key) {
            return Err(ContainerError::DuplicateKey {
                key: key.to_string(),
                existing: existing.type_name().to_string(),
                attempted: attempted.to_string(),
            });
        }
        self.keys.insert(key.to_string(), service_id);
        Ok(())
    }

    /// Register implementation `I` for contract `C`
    pub fn register_type<C, I>(&mut self, lifetime: ServiceLifetime) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable + Upcast<C>,
    {
        let plan = plan_for::<C, I>();
        self.push(ServiceId::of::<C>(), lifetime, None, Activation::Constructor(plan));
        self
    }

    /// Register implementation `I` for contract `C` under a unique key
    pub fn register_keyed_type<C, I>(
        &mut self,
        key: impl Into<String>,
        lifetime: ServiceLifetime,
    ) -> Result<&mut Self, ContainerError>
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable + Upcast<C>,
    {
        let key = key.into();
        self.reserve_key(&key, ServiceId::of::<C>(), std::any::type_name::<I>())?;
        let plan = plan_for::<C, I>();
        self.push(ServiceId::of::<C>(), lifetime, Some(key), Activation::Constructor(plan));
        Ok(self)
    }

    /// Register a factory for contract `C`.
    ///
    /// The container does not dispose what this factory returns; use
    /// [`register_disposable_factory`](Self::register_disposable_factory) for
    /// disposable results, or hand them to
    /// [`ServiceResolver::track_disposable`] on the resolver received.
    pub fn register_factory<C, F>(&mut self, lifetime: ServiceLifetime, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
    {
        self.push(ServiceId::of::<C>(), lifetime, None, Activation::Factory(erase(factory)));
        self
    }

    /// Register a factory for contract `C` under a unique key
    pub fn register_keyed_factory<C, F>(
        &mut self,
        key: impl Into<String>,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, ContainerError>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
    {
        let key = key.into();
        self.reserve_key(&key, ServiceId::of::<C>(), "factory")?;
        self.push(ServiceId::of::<C>(), lifetime, Some(key), Activation::Factory(erase(factory)));
        Ok(self)
    }

    /// Register a factory whose result the container disposes with its owner.
    ///
    /// The owner is the root for singletons and the requesting scope otherwise.
    /// A duplicate lost in a concurrent singleton or scoped creation race is
    /// disposed immediately.
    pub fn register_disposable_factory<C, I, F>(&mut self, lifetime: ServiceLifetime, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Disposable + Upcast<C>,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.push(
            ServiceId::of::<C>(),
            lifetime,
            None,
            Activation::Factory(erase_disposable::<C, I, F>(factory)),
        );
        self
    }

    /// Register a pre-built singleton. The container never disposes it.
    pub fn register_instance<C>(&mut self, instance: Arc<C>) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.register_factory::<C, _>(ServiceLifetime::Singleton, move |_| Ok(instance.clone()))
    }

    pub fn add_singleton<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable + Upcast<C>,
    {
        self.register_type::<C, I>(ServiceLifetime::Singleton)
    }

    pub fn add_scoped<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable + Upcast<C>,
    {
        self.register_type::<C, I>(ServiceLifetime::Scoped)
    }

    pub fn add_transient<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable + Upcast<C>,
    {
        self.register_type::<C, I>(ServiceLifetime::Transient)
    }

    pub fn add_singleton_factory<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
    {
        self.register_factory::<C, F>(ServiceLifetime::Singleton, factory)
    }

    pub fn add_scoped_factory<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
    {
        self.register_factory::<C, F>(ServiceLifetime::Scoped, factory)
    }

    pub fn add_transient_factory<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
    {
        self.register_factory::<C, F>(ServiceLifetime::Transient, factory)
    }

    pub fn add_singleton_disposable_factory<C, I, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Disposable + Upcast<C>,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register_disposable_factory::<C, I, F>(ServiceLifetime::Singleton, factory)
    }

    pub fn add_scoped_disposable_factory<C, I, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Disposable + Upcast<C>,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register_disposable_factory::<C, I, F>(ServiceLifetime::Scoped, factory)
    }

    pub fn add_transient_disposable_factory<C, I, F>(&mut self, factory: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Disposable + Upcast<C>,
        F: Fn(&dyn ServiceResolver) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register_disposable_factory::<C, I, F>(ServiceLifetime::Transient, factory)
    }

    /// Apply the registrations contributed by a module
    pub fn add_module(&mut self, module: &dyn ServiceModule) -> Result<&mut Self, ContainerError> {
        let before = self.descriptors.len();
        module.configure(self)?;
        tracing::info!(
            module = module.name(),
            registrations = self.descriptors.len() - before,
            "Service module configured"
        );
        Ok(self)
    }

    /// Whether an unkeyed registration exists for `C`
    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        let service_id = ServiceId::of::<C>();
        self.descriptors
            .iter()
            .any(|descriptor| descriptor.key.is_none() && descriptor.service_id == service_id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    /// Compile the registrations into a container
    pub fn build(self) -> Result<Container, ContainerError> {
        self.options.validate()?;
        if self.options.validate_on_build {
            validate_descriptors(&self.descriptors)?;
        }
        Ok(Container::from_descriptors(self.descriptors, self.options))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("descriptors", &self.descriptors)
            .field("options", &self.options)
            .finish()
    }
}

fn erase<C, F>(factory: F) -> FactoryFn
where
    C: ?Sized + Send + Sync + 'static,
    F: Fn(&dyn ServiceResolver) -> Result<Arc<C>, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |resolver: &dyn ServiceResolver| -> Result<Activated, BoxError> {
        let service = factory(resolver)?;
        let instance: Instance = Arc::new(service);
        Ok(Activated {
            instance,
            disposable: None,
        })
    })
}

fn erase_disposable<C, I, F>(factory: F) -> FactoryFn
where
    C: ?Sized + Send + Sync + 'static,
    I: Disposable + Upcast<C>,
    F: Fn(&dyn ServiceResolver) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |resolver: &dyn ServiceResolver| -> Result<Activated, BoxError> {
        let service = factory(resolver)?;
        let disposable: Arc<dyn Disposable> = service.clone();
        let contract: Arc<C> = <I as Upcast<C>>::upcast(service);
        let instance: Instance = Arc::new(contract);
        Ok(Activated {
            instance,
            disposable: Some(disposable),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::autowiring::Constructor;

    trait Clock: Send + Sync {}

    struct SystemClock;

    impl Clock for SystemClock {}

    impl Injectable for SystemClock {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(SystemClock))]
        }
    }

    crate::impl_upcast!(SystemClock => dyn Clock);

    #[test]
    fn test_registrations_are_appended_in_order() {
        let mut registry = ServiceRegistry::new();
        registry
            .add_singleton::<dyn Clock, SystemClock>()
            .add_transient::<SystemClock, SystemClock>();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains::<dyn Clock>());
        assert!(registry.contains::<SystemClock>());
        let ids: Vec<usize> = registry.descriptors().map(|d| d.id().index()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_keyed_type::<dyn Clock, SystemClock>("utc", ServiceLifetime::Singleton)
            .unwrap();

        let error = registry
            .register_keyed_factory::<dyn Clock, _>("utc", ServiceLifetime::Transient, |_| {
                Ok(Arc::new(SystemClock) as Arc<dyn Clock>)
            })
            .unwrap_err();

        match error {
            ContainerError::DuplicateKey { key, attempted, .. } => {
                assert_eq!(key, "utc");
                assert_eq!(attempted, "factory");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(registry.len(), 1);
        assert!(registry.contains_key("utc"));
        assert!(!registry.contains::<dyn Clock>());
    }

    #[test]
    fn test_instance_registration_is_a_singleton_factory() {
        let mut registry = ServiceRegistry::new();
        registry.register_instance::<dyn Clock>(Arc::new(SystemClock));

        let descriptor = registry.descriptors().next().unwrap();
        assert!(descriptor.lifetime().is_singleton());
        assert!(descriptor.is_factory());
        assert_eq!(descriptor.implementation_name(), "factory");
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let registry = ServiceRegistry::with_options(ContainerOptions::new().with_max_resolution_depth(0));
        assert!(matches!(
            registry.build(),
            Err(ContainerError::InvalidConfiguration(_))
        ));
    }
}
