use crate::config::DEFAULT_MAX_RESOLUTION_DEPTH;
use crate::container::autowiring::{construct_unregistered, Injectable, SelfConstructFn};
use crate::container::descriptor::{Instance, ServiceId};
use crate::container::lifecycle::Disposable;
use crate::errors::ContainerError;
use std::sync::Arc;

/// One lookup against a resolver
#[derive(Clone, Copy)]
pub struct ServiceRequest<'a> {
    pub service_id: ServiceId,
    pub key: Option<&'a str>,
    /// Fail with `NotRegistered` instead of returning `None`
    pub required: bool,
    /// Construct the type directly when nothing is registered for it
    pub fallback: Option<SelfConstructFn>,
}

impl std::fmt::Debug for ServiceRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("service_id", &self.service_id)
            .field("key", &self.key)
            .field("required", &self.required)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<'a> ServiceRequest<'a> {
    pub fn required(service_id: ServiceId) -> Self {
        Self {
            service_id,
            key: None,
            required: true,
            fallback: None,
        }
    }

    pub fn optional(service_id: ServiceId) -> Self {
        Self {
            required: false,
            ..Self::required(service_id)
        }
    }

    pub fn with_key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_fallback(mut self, fallback: SelfConstructFn) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Object-safe resolution interface shared by the container and its scopes.
///
/// Factories receive a `&dyn ServiceResolver`; typed access goes through
/// [`ServiceResolverExt`].
pub trait ServiceResolver: Send + Sync {
    /// Resolve a single instance. Returns `None` only for optional requests
    /// with no matching registration.
    fn resolve_instance(&self, request: &ServiceRequest<'_>)
        -> Result<Option<Instance>, ContainerError>;

    /// Resolve every unkeyed registration of a contract, in registration order
    fn resolve_all_instances(&self, service_id: &ServiceId) -> Result<Vec<Instance>, ContainerError>;

    /// Hand a factory-created instance to this resolver's owner for disposal
    fn track_disposable(&self, disposable: Arc<dyn Disposable>) -> Result<(), ContainerError>;

    fn max_resolution_depth(&self) -> usize {
        DEFAULT_MAX_RESOLUTION_DEPTH
    }
}

/// Typed helpers over [`ServiceResolver`]
pub trait ServiceResolverExt: ServiceResolver {
    /// Resolve an optional service
    fn get_service<T>(&self) -> Result<Option<Arc<T>>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let request = ServiceRequest::optional(ServiceId::of::<T>());
        self.resolve_instance(&request)?
            .map(|instance| downcast::<T>(&instance))
            .transpose()
    }

    /// Resolve a service that must be registered
    fn get_required_service<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service_id = ServiceId::of::<T>();
        let instance = self
            .resolve_instance(&ServiceRequest::required(service_id))?
            .ok_or_else(|| ContainerError::not_registered(service_id.type_name(), ""))?;
        downcast::<T>(&instance)
    }

    /// Resolve every registered implementation of a contract
    fn get_services<T>(&self) -> Result<Vec<Arc<T>>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_all_instances(&ServiceId::of::<T>())?
            .iter()
            .map(downcast::<T>)
            .collect()
    }

    fn get_keyed_service<T>(&self, key: &str) -> Result<Option<Arc<T>>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let request = ServiceRequest::optional(ServiceId::of::<T>()).with_key(key);
        self.resolve_instance(&request)?
            .map(|instance| downcast::<T>(&instance))
            .transpose()
    }

    fn get_required_keyed_service<T>(&self, key: &str) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service_id = ServiceId::of::<T>();
        let request = ServiceRequest::required(service_id).with_key(key);
        let instance = self
            .resolve_instance(&request)?
            .ok_or_else(|| ContainerError::not_registered(format!("{} [{}]", service_id, key), ""))?;
        downcast::<T>(&instance)
    }

    /// Resolve a concrete type, constructing it directly when it is not registered
    fn get_or_construct<T: Injectable>(&self) -> Result<Arc<T>, ContainerError> {
        let service_id = ServiceId::of::<T>();
        let request = ServiceRequest::required(service_id).with_fallback(construct_unregistered::<T>);
        let instance = self
            .resolve_instance(&request)?
            .ok_or_else(|| ContainerError::not_registered(service_id.type_name(), ""))?;
        downcast::<T>(&instance)
    }
}

impl<R: ServiceResolver + ?Sized> ServiceResolverExt for R {}

/// Recover the typed service from an erased instance
pub(crate) fn downcast<T>(instance: &Instance) -> Result<Arc<T>, ContainerError>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            found: "an instance of a different contract".to_string(),
        })
}
